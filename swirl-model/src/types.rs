use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A named endpoint hosting a process that executes part of the workflow.
///
/// Identified by `name`; addresses used at runtime are resolved separately
/// via [`crate::addresses::Addresses`], not via `hostname`/`listen_port`
/// directly — those two are the values a generated `run.sh` uses to bind
/// the location's own listener and to populate the address map it hands
/// to every other location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub hostname: String,
    pub listen_port: u16,
    pub workdir: String,
}

/// A single-assignment channel identifier, local to a location's runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
}

impl Port {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The tag of a [`PortValue`] / [`Data`] value, independent of the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    File,
    String,
    Int,
    Bool,
}

/// A tagged union carried by a port once it becomes Ready. Once set, immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortValue {
    File(PathBuf),
    String(String),
    Int(i64),
    Bool(bool),
}

impl PortValue {
    pub fn data_type(&self) -> DataType {
        match self {
            PortValue::File(_) => DataType::File,
            PortValue::String(_) => DataType::String,
            PortValue::Int(_) => DataType::Int,
            PortValue::Bool(_) => DataType::Bool,
        }
    }

    /// Canonical wire/string form used both for argument substitution in
    /// exec's command line and for the String/Int/Bool payload framing of
    /// the wire codec (see `swirl_runtime::codec`).
    pub fn as_wire_string(&self) -> String {
        match self {
            PortValue::File(path) => path.display().to_string(),
            PortValue::String(s) => s.clone(),
            PortValue::Int(i) => i.to_string(),
            PortValue::Bool(b) => b.to_string(),
        }
    }
}

/// A workflow-level declaration bound to an initial [`PortValue`] at a
/// location via a dataset initialization step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub name: String,
    pub ty: DataType,
    pub value: PortValue,
}

/// Either a literal argument token or a reference to a port whose resolved
/// value is substituted in at exec time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    Literal(String),
    PortRef(String),
}

/// Per-output-port descriptor carrying the glob used to locate the output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processor {
    pub glob: String,
}

/// A shell command with declared input/output ports and an argument template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub display_name: String,
    pub command: String,
    pub arguments: Vec<Argument>,
    /// Keyed by output port name.
    pub processors: BTreeMap<String, Processor>,
}

impl Step {
    pub fn processor_for(&self, output_port: &str) -> Option<&Processor> {
        self.processors.get(output_port)
    }
}
