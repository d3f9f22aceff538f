/// Errors raised while lowering a workflow expression into per-location
/// source (spec §4.H, §7 compile-error).
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("workflow contains reserved syntax `{0}`, which is not implemented")]
    NotImplemented(String),

    #[error("unknown port `{0}` referenced in workflow")]
    UnknownPort(String),

    #[error("unknown location `{0}` referenced in workflow")]
    UnknownLocation(String),

    #[error("unknown dataset binding `{0}` referenced at a location")]
    UnknownData(String),

    #[error("unsupported data type `{0:?}` in dataset binding")]
    UnsupportedDataType(swirl_model::DataType),

    #[error("a location body contains a nested <location, ...> node; locations cannot nest")]
    NestedLocation,

    #[error("unbalanced group nesting at end of location `{0}`: depth {1}, expected 1")]
    UnbalancedGroups(String, usize),

    #[error("io error emitting generated project: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed workflow AST document: {0}")]
    MalformedAst(String),

    #[error("failed to load workflow configuration: {0}")]
    Config(#[from] swirl_model::ConfigError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors raised while interpreting a compiled location in-process (see
/// [`crate::interp`]) — a superset of [`CompileError`] (tree validation,
/// reached before any task is spawned) and [`swirl_runtime::RuntimeError`]
/// (once the task graph is actually running).
#[derive(Debug, thiserror::Error)]
pub enum InterpError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] swirl_runtime::RuntimeError),

    #[error("task panicked: {0}")]
    Join(String),
}

pub type InterpResult<T> = std::result::Result<T, InterpError>;
