use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Data, DataType, Location, Port, Step};

/// The pair of (input, output) port/data bindings attached to an `exec`.
/// Each set element is a `(port_name, data_name)` pair.
pub type Flow = (BTreeSet<(String, String)>, BTreeSet<(String, String)>);

/// The surface process-algebra grammar (spec §4.H):
///
/// ```text
/// E ::= exec(step, flow, mapping)
///     | send(data -> port, src, dst)
///     | recv(port, src, dst)
///     | E . E            (sequential)
///     | E | E             (parallel)
///     | ( E )
///     | < location, dataset, E >
/// ```
///
/// `Par` and `Seq` are n-ary here rather than strictly binary: the surface
/// parser is expected to flatten runs of `.`/`|` into a single node, which
/// is what lets the back-end visitor emit one `seq`/`par` boundary event
/// per adjacent pair without re-deriving associativity.
///
/// `Serialize`/`Deserialize` stand in for the out-of-scope surface parser's
/// hand-off to the core: `swirlc`'s `compile` subcommand reads a JSON
/// document shaped like this tree instead of parsing `.swirl` source text
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// `< location, dataset, E >` — dataset is a set of (port, data) bindings.
    Location {
        location: String,
        dataset: Vec<(String, String)>,
        body: Box<Expr>,
    },
    Par(Vec<Expr>),
    Seq(Vec<Expr>),
    Paren(Box<Expr>),
    Exec {
        step: Step,
        flow: Flow,
        /// Locations this step is permitted to run at; informational —
        /// placement itself is fixed by the enclosing `Expr::Location`.
        mapping: BTreeSet<String>,
    },
    Send {
        data: String,
        port: String,
        data_type: DataType,
        src: String,
        dst: String,
    },
    Recv {
        port: String,
        data_type: DataType,
        src: String,
        dst: String,
    },
    /// Reserved syntax. A back-end must reject any workflow containing it.
    Choice(Vec<Expr>),
}

/// A fully assigned workflow: locations, the port/data namespaces, and the
/// root of the composition tree. The source grammar already binds each
/// sub-expression to a location via `Expr::Location`, so there is no
/// separate placement/scheduling pass — `Workflow` and the conceptual
/// "post-placement" program are the same value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub locations: BTreeMap<String, Location>,
    pub ports: BTreeMap<String, Port>,
    /// Named dataset bindings, resolved by name from each
    /// `Expr::Location`'s `dataset` list (spec §3 `Data`).
    pub data: BTreeMap<String, Data>,
    pub root: Expr,
}

/// Alias kept for fidelity with the spec's entity list (spec §3): a
/// [`Workflow`] is always distributed across the locations named in it.
pub type DistributedWorkflow = Workflow;

impl Workflow {
    pub fn new(
        locations: BTreeMap<String, Location>,
        ports: BTreeMap<String, Port>,
        data: BTreeMap<String, Data>,
        root: Expr,
    ) -> Self {
        Self { locations, ports, data, root }
    }

    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.get(name)
    }

    pub fn data(&self, name: &str) -> Option<&Data> {
        self.data.get(name)
    }
}
