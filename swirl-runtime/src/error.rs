/// Error kinds for the distributed runtime (spec §7). Each variant maps
/// directly onto one of the named error kinds; there is no cross-location
/// propagation — a failing peer causes dependents to hang, which is
/// accepted and documented, not modeled as an error here.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed handshake frame: {0}")]
    Handshake(String),

    #[error("peer disconnected mid-payload for port `{port}` from `{peer}`")]
    PeerDisconnect { port: String, peer: String },

    #[error("step `{step}` exited with code {exit_code}: {stderr}")]
    StepFailure {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("step `{step}` output glob `{glob}` matched no files in {dir}")]
    MissingOutput {
        step: String,
        glob: String,
        dir: String,
    },

    #[error("step `{step}` output glob `{glob}` matched {count} files in {dir}, expected exactly one")]
    AmbiguousOutput {
        step: String,
        glob: String,
        dir: String,
        count: usize,
    },

    #[error("port `{0}` was already set; ports are single-assignment")]
    PortAlreadySet(String),

    #[error("malformed port payload for `{port}` ({expected}): {reason}")]
    MalformedPayload {
        port: String,
        expected: String,
        reason: String,
    },

    #[error("address lookup failed: {0}")]
    Address(#[from] swirl_model::ConfigError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
