//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::protocol::SERVER_NAME;
use crate::registry::descriptor::QUALIFIED_NAME_SEPARATOR;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Identity of the aggregating server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Servers to mount in the registry.
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerEntry>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            server: ServerConfig::default(),
            servers: default_servers(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.servers {
            if entry.id.trim().is_empty() {
                return Err(invalid("Server id must not be empty".to_string()));
            }
            if entry.id.contains(QUALIFIED_NAME_SEPARATOR) {
                return Err(invalid(format!(
                    "Server id '{}' must not contain '{QUALIFIED_NAME_SEPARATOR}'",
                    entry.id
                )));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(invalid(format!("Duplicate server id '{}'", entry.id)));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

const fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError { message }
}

/// Identity reported by the aggregating server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name reported in `serverInfo`.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Usage hints returned from `initialize`.
    #[serde(default)]
    pub instructions: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            instructions: None,
        }
    }
}

fn default_server_name() -> String {
    SERVER_NAME.to_string()
}

/// Kind of built-in server to mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// The built-in echo server.
    Echo,
}

/// One server mounted in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerEntry {
    /// Registry ID; becomes the prefix of qualified tool names.
    pub id: String,

    /// Which built-in server to mount.
    pub kind: ServerKind,
}

fn default_servers() -> Vec<ServerEntry> {
    vec![ServerEntry {
        id: "echo".to_string(),
        kind: ServerKind::Echo,
    }]
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.servers, default_servers());
        assert_eq!(config.server.name, SERVER_NAME);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": {
                "name": "hub",
                "instructions": "Tools are named server:tool"
            },
            "servers": [
                { "id": "a", "kind": "echo" },
                { "id": "b", "kind": "echo" }
            ],
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.name, "hub");
        assert_eq!(
            config.server.instructions.as_deref(),
            Some("Tools are named server:tool")
        );
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[1].kind, ServerKind::Echo);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn empty_server_list_is_allowed() {
        let config: Config = serde_json::from_str(r#"{"servers": []}"#).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.servers.is_empty());
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_duplicate_ids() {
        let json = r#"{"servers": [{"id": "a", "kind": "echo"}, {"id": "a", "kind": "echo"}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate server id 'a'"));
    }

    #[test]
    fn reject_separator_in_id() {
        let json = r#"{"servers": [{"id": "a:b", "kind": "echo"}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_empty_id() {
        let json = r#"{"servers": [{"id": " ", "kind": "echo"}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_invalid_log_level() {
        let json = r#"{"logging": {"level": "loud"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_kind() {
        let json = r#"{"servers": [{"id": "a", "kind": "python"}]}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
