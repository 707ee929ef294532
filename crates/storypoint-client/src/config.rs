//! Client configuration file.
//!
//! ```toml
//! [client]
//! username = "amy"
//! session_id = "room-42"
//!
//! [log]
//! filter = "storypoint_client=debug"
//! ```
//!
//! Every field is optional. A missing file is not an error for callers that
//! use [`ClientConfig::load_or_default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storypoint_types::{SessionId, Username};
use thiserror::Error;

use crate::constants::DEFAULT_LOG_FILTER;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client: ClientSection,
    pub log: LogSection,
}

/// Who this client is and which room it joins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub username: Option<Username>,
    /// Snapshots of any other room are refused.
    pub session_id: Option<SessionId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { filter: DEFAULT_LOG_FILTER.to_string() }
    }
}

impl ClientConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = ClientConfig::from_toml_str(
            r#"
            [client]
            username = "amy"

            [log]
            filter = "storypoint_client=trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.client.username, Some(Username::from("amy")));
        assert_eq!(config.client.session_id, None);
        assert_eq!(config.log.filter, "storypoint_client=trace");
    }

    #[test]
    fn test_bad_type_is_parse_error() {
        let err = ClientConfig::from_toml_str("[client]\nusername = 42").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nsession_id = \"room-42\"\n\n[log]\nfilter = \"debug\"").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.client.session_id, Some(SessionId::from("room-42")));
        assert_eq!(config.log.filter, "debug");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storypoint.toml");

        assert!(matches!(ClientConfig::load(&path), Err(ConfigError::Io { .. })));
        assert_eq!(ClientConfig::load_or_default(&path).unwrap(), ClientConfig::default());
    }
}
