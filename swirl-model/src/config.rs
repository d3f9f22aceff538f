//! YAML configuration loader (spec §6).
//!
//! ```yaml
//! version: v1.0
//! locations:
//!   location0:
//!     hostname: 127.0.0.1
//!     port: 8080
//!     workdir: /workdir
//! dependencies:
//!   d1:
//!     type: file
//!     value: /data/message.txt
//! ```
//!
//! This is the "external collaborator" named in spec §1 — the surface
//! parser and scheduler are out of scope — but the document shape is part
//! of the core's interface, so it lives here rather than in `swirlc`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{Data, DataType, Location, PortValue};

#[derive(Debug, Clone, Deserialize)]
struct RawLocation {
    hostname: String,
    port: u16,
    workdir: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDependency {
    #[serde(rename = "type")]
    ty: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    version: String,
    #[serde(default)]
    locations: BTreeMap<String, RawLocation>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
}

/// Parsed form of the YAML configuration document.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub version: String,
    pub locations: BTreeMap<String, Location>,
    pub dependencies: BTreeMap<String, Data>,
}

impl WorkflowConfig {
    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        Self::from_raw(raw)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&text)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let locations = raw
            .locations
            .into_iter()
            .map(|(name, loc)| {
                (
                    name.clone(),
                    Location {
                        name,
                        hostname: loc.hostname,
                        listen_port: loc.port,
                        workdir: loc.workdir,
                    },
                )
            })
            .collect();

        let dependencies = raw
            .dependencies
            .into_iter()
            .map(|(name, dep)| parse_dependency(name, dep))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            version: raw.version,
            locations,
            dependencies,
        })
    }
}

fn parse_dependency(name: String, dep: RawDependency) -> Result<(String, Data), ConfigError> {
    let (ty, value) = match dep.ty.as_str() {
        "file" => (DataType::File, PortValue::File(dep.value.into())),
        "string" => (DataType::String, PortValue::String(dep.value)),
        "int" => {
            let parsed = dep
                .value
                .parse::<i64>()
                .map_err(|_| ConfigError::UnsupportedDataType(format!("int: {}", dep.value)))?;
            (DataType::Int, PortValue::Int(parsed))
        }
        "bool" => {
            let parsed = dep
                .value
                .parse::<bool>()
                .map_err(|_| ConfigError::UnsupportedDataType(format!("bool: {}", dep.value)))?;
            (DataType::Bool, PortValue::Bool(parsed))
        }
        other => return Err(ConfigError::UnsupportedDataType(other.to_string())),
    };
    Ok((
        name.clone(),
        Data {
            name,
            ty,
            value,
        },
    ))
}
