//! In-memory representation of a swirl workflow program.
//!
//! This crate owns the data the compilation back-end consumes (see
//! `swirlc`) and the data the generated per-location binaries are built
//! against (see `swirl-runtime`). It does not parse the surface
//! process-algebra syntax itself — callers build a [`Workflow`] directly,
//! typically from a parser or, for the YAML half of the configuration,
//! from [`config::WorkflowConfig`].

pub mod addresses;
pub mod config;
pub mod error;
pub mod types;
pub mod workflow;

pub use addresses::Addresses;
pub use config::WorkflowConfig;
pub use error::ConfigError;
pub use types::{Argument, Data, DataType, Location, Port, PortValue, Processor, Step};
pub use workflow::{DistributedWorkflow, Expr, Flow, Workflow};
