//! Configuration types for Stampede

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level load runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Database target and aggregation stage
    #[serde(default)]
    pub target: TargetConfig,

    /// Session and iteration settings
    #[serde(default)]
    pub load: LoadConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RunnerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file, falling back to defaults when it is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Validate the configuration and return any errors.
    /// Fatal errors are returned as `Err(Vec<String>)`.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.target.uri.trim().is_empty() {
            errors.push("target.uri must not be empty".to_string());
        } else if !self.target.uri.starts_with("mongodb://")
            && !self.target.uri.starts_with("mongodb+srv://")
        {
            errors.push(format!(
                "target.uri must use the mongodb:// or mongodb+srv:// scheme, got {}",
                redact_uri(&self.target.uri)
            ));
        }
        if self.target.database.is_empty() {
            errors.push("target.database must not be empty".to_string());
        }
        if self.target.collection.is_empty() {
            errors.push("target.collection must not be empty".to_string());
        }
        match &self.target.stage {
            serde_json::Value::Object(map) if map.len() == 1 => {}
            serde_json::Value::Object(map) => errors.push(format!(
                "target.stage must hold exactly one stage operator, got {}",
                map.len()
            )),
            other => errors.push(format!(
                "target.stage must be a table, got {}",
                json_kind(other)
            )),
        }

        if self.load.sessions == 0 {
            errors.push("load.sessions must be > 0".to_string());
        }
        if self.load.iterations == 0 {
            errors.push("load.iterations must be > 0".to_string());
        }
        if self.load.dial_timeout.is_zero() {
            errors.push("load.dial_timeout must be > 0".to_string());
        }
        if self.load.request_timeout.is_zero() {
            errors.push("load.request_timeout must be > 0".to_string());
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            errors.push(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Database target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Connection string (scheme, hosts, credentials, options)
    pub uri: String,

    /// Database name
    pub database: String,

    /// Collection name
    pub collection: String,

    /// Single aggregation stage, e.g. `{ "$match" = { status = "active" } }`
    #[serde(default = "default_stage")]
    pub stage: serde_json::Value,
}

fn default_stage() -> serde_json::Value {
    serde_json::json!({ "$match": {} })
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "test".to_string(),
            collection: "documents".to_string(),
            stage: default_stage(),
        }
    }
}

/// Session and iteration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Number of concurrent sessions
    #[serde(default = "default_sessions")]
    pub sessions: usize,

    /// Aggregations issued by each session
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Deadline for the dial phase of connect (the probe is not bounded by it)
    #[serde(default = "default_dial_timeout", with = "humantime_serde")]
    pub dial_timeout: Duration,

    /// Deadline for each aggregate call
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Pause between iterations of one session
    #[serde(default, with = "humantime_serde")]
    pub think_time: Duration,
}

fn default_sessions() -> usize {
    10
}

fn default_iterations() -> usize {
    100
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            sessions: default_sessions(),
            iterations: default_iterations(),
            dial_timeout: default_dial_timeout(),
            request_timeout: default_request_timeout(),
            think_time: Duration::ZERO,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or text)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log file path (None for stdout only)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

/// Strip the password from a connection string before it reaches a log line.
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find(&['/', '?'][..]).unwrap_or(rest.len());
    let authority = &rest[..authority_end];

    match authority.rfind('@') {
        Some(at) => {
            let user = authority[..at].split(':').next().unwrap_or_default();
            format!(
                "{}://{}:***@{}",
                &uri[..scheme_end],
                user,
                &rest[at + 1..]
            )
        }
        None => uri.to_string(),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a table",
    }
}

/// Duration serialization helper
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        s.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
