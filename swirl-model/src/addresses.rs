//! Runtime address map (spec §6): a text file, one record per line,
//! `<location_name>,<host>,<host:port>`. Loaded at start-up by each
//! generated binary via `--loc <name>`.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct Addresses {
    /// location name -> `host:port` dial string.
    location_map: BTreeMap<String, String>,
}

impl Addresses {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let mut location_map = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(',').collect();
            let [name, _host, dial] = parts[..] else {
                return Err(ConfigError::MalformedAddressLine(line.to_string()));
            };
            location_map.insert(name.to_string(), dial.to_string());
        }
        Ok(Self { location_map })
    }

    pub fn get(&self, location: &str) -> Result<&str, ConfigError> {
        self.location_map
            .get(location)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownLocation(location.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.location_map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records() {
        let text = "location0,127.0.0.1,127.0.0.1:8080\nlocation1,127.0.0.1,127.0.0.1:8081\n";
        let addrs = Addresses::from_str(text).unwrap();
        assert_eq!(addrs.get("location0").unwrap(), "127.0.0.1:8080");
        assert_eq!(addrs.get("location1").unwrap(), "127.0.0.1:8081");
    }

    #[test]
    fn unknown_location_errors() {
        let addrs = Addresses::from_str("location0,127.0.0.1,127.0.0.1:8080\n").unwrap();
        assert!(addrs.get("location9").is_err());
    }

    #[test]
    fn malformed_line_errors() {
        let err = Addresses::from_str("location0,127.0.0.1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedAddressLine(_)));
    }
}
