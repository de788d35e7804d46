//! Configuration knobs.
//!
//! ```text
//! settings.toml
//!     → toml::from_str (syntax, defaults)
//!     → Settings::validate (semantic checks)
//!     → DispatcherBuilder::settings / Server::from_settings
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", .0.join(", "))]
    Invalid(Vec<String>),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub trace: TraceSettings,
    pub transaction: TransactionSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Listen address, e.g. `"0.0.0.0:8080"`.
    pub bind_address: String,
    pub threads: ThreadSettings,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_owned(),
            threads: ThreadSettings::default(),
        }
    }
}

/// Worker pool bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThreadSettings {
    /// Threads kept for connection I/O.
    pub min: usize,
    /// Upper bound on threads processing requests concurrently.
    pub max: usize,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self { min: 100, max: 1000 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Registers the trace start/finish hooks.
    pub enable: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionSettings {
    /// Turns rollback on failure off entirely.
    pub disable: bool,
}

impl Settings {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let threads = &self.http.threads;
        if threads.max == 0 {
            problems.push("http.threads.max must be at least 1".to_owned());
        }
        if threads.min > threads.max {
            problems.push(format!(
                "http.threads.min ({}) exceeds http.threads.max ({})",
                threads.min, threads.max
            ));
        }
        if self.http.bind_address.parse::<SocketAddr>().is_err() {
            problems.push(format!("http.bind_address `{}` is not host:port", self.http.bind_address));
        }
        if problems.is_empty() { Ok(()) } else { Err(ConfigError::Invalid(problems)) }
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.http.bind_address.parse().map_err(|_| {
            ConfigError::Invalid(vec![format!("http.bind_address `{}` is not host:port", self.http.bind_address)])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.http.bind_address, "0.0.0.0:8080");
        assert_eq!((settings.http.threads.min, settings.http.threads.max), (100, 1000));
        assert!(!settings.trace.enable);
        assert!(!settings.transaction.disable);
    }

    #[test]
    fn reads_all_knobs() {
        let settings = Settings::from_toml_str(
            r#"
            [http]
            bind_address = "127.0.0.1:9000"
            [http.threads]
            min = 4
            max = 16
            [trace]
            enable = true
            [transaction]
            disable = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.bind_address().unwrap().port(), 9000);
        assert_eq!((settings.http.threads.min, settings.http.threads.max), (4, 16));
        assert!(settings.trace.enable);
        assert!(settings.transaction.disable);
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let err = Settings::from_toml_str("[http.threads]\nmin = 10\nmax = 2\n").unwrap_err();
        assert!(matches!(&err, ConfigError::Invalid(p) if p.len() == 1));
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn reports_every_problem() {
        let err = Settings::from_toml_str("[http]\nbind_address = \"nowhere\"\n[http.threads]\nmin = 0\nmax = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(p) if p.len() == 2));
    }

    #[test]
    fn syntax_errors_surface() {
        assert!(matches!(Settings::from_toml_str("[http"), Err(ConfigError::Parse(_))));
    }
}
