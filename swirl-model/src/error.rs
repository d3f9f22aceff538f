use std::path::PathBuf;

/// Errors raised while loading or validating workflow configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported data type `{0}` (expected one of file, string, int, bool)")]
    UnsupportedDataType(String),

    #[error("malformed address map line: `{0}`")]
    MalformedAddressLine(String),

    #[error("unknown location `{0}` in address map")]
    UnknownLocation(String),
}
