//! Hand-off format standing in for the out-of-scope surface-syntax parser
//! (spec §1): a JSON document shaped `{ "ports": {...}, "root": <Expr> }`
//! that a real parser would produce from `.swirl` source. Locations and
//! dataset values still come from the YAML config (spec §6) via
//! [`swirl_model::WorkflowConfig`] — this module only supplies the half of
//! [`Workflow`] the surface grammar owns: the port namespace and the
//! composition tree.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use swirl_model::{Expr, Port, Workflow, WorkflowConfig};

use crate::error::{CompileError, Result};

#[derive(Debug, Deserialize)]
pub struct WorkflowAst {
    #[serde(default)]
    pub ports: BTreeMap<String, Port>,
    pub root: Expr,
}

impl WorkflowAst {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| CompileError::MalformedAst(format!("{}: {e}", path.display())))
    }

    /// Combines this AST with a loaded YAML configuration into a full
    /// [`Workflow`], the shape the back-end and interpreter consume.
    pub fn into_workflow(self, config: WorkflowConfig) -> Workflow {
        Workflow::new(config.locations, self.ports, config.dependencies, self.root)
    }
}
