//! Component H: the compilation back-end, plus the templated-file
//! emission and in-process interpreter that make its output runnable.
//!
//! [`backend`] lowers a [`swirl_model::Workflow`] into one generated
//! source body per location (spec §4.H). [`codegen`] wraps those bodies
//! into a standalone Cargo project. [`interp`] walks the same tree
//! in-process against a live `swirl_runtime::Communicator`, for local
//! testing without a codegen → build → exec round trip.

pub mod ast_io;
pub mod backend;
pub mod codegen;
pub mod error;
pub mod interp;

pub use ast_io::WorkflowAst;
pub use backend::{compile_workflow, CompiledLocation};
pub use error::{CompileError, InterpError, Result};
