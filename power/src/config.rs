use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;

use crate::{Error, ErrorKind, Result, scanner::DEFAULT_SUFFIX};

/// Environment variable holding the default classpath, in the platform's
/// `PATH` syntax.
pub const CLASSPATH_ENV: &str = "POWER_CLASSPATH";

/// Classpath from [`CLASSPATH_ENV`], or the working directory.
#[must_use]
pub fn default_classpath() -> Vec<PathBuf> {
    match std::env::var_os(CLASSPATH_ENV) {
        Some(paths) if !paths.is_empty() => std::env::split_paths(&paths).collect(),
        _ => vec![PathBuf::from(".")],
    }
}

/// Construction parameters of a [`Power`](crate::Power) bootstrap.
#[serde_inline_default]
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct PowerConfig {
    #[serde_inline_default(8000)]
    pub port: u16,
    /// Dot-separated namespace holding the services, e.g. `server`.
    #[serde_inline_default("server".to_string())]
    pub namespace: String,
    /// Directories and archives searched for the namespace.
    #[serde_inline_default(default_classpath())]
    pub classpath: Vec<PathBuf>,
    #[serde_inline_default(true)]
    pub recursive: bool,
    #[serde_inline_default(DEFAULT_SUFFIX.to_string())]
    pub suffix: String,
    /// How long running calls may take to finish once shutdown begins.
    #[serde_inline_default(Duration::from_secs(5))]
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            namespace: "server".to_string(),
            classpath: default_classpath(),
            recursive: true,
            suffix: DEFAULT_SUFFIX.to_string(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PowerConfig {
    pub fn new(port: u16, namespace: impl Into<String>) -> Self {
        Self {
            port,
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_classpath<P: Into<PathBuf>>(mut self, classpath: impl IntoIterator<Item = P>) -> Self {
        self.classpath = classpath.into_iter().map(Into::into).collect();
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidArgument` for port 0 or an empty namespace.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "port must be positive".to_string(),
            ));
        }
        if self.namespace.split('.').any(str::is_empty) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("invalid namespace: {:?}", self.namespace),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: PowerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PowerConfig::default());
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.suffix, ".svc");
    }

    #[test]
    fn test_parse() {
        let config: PowerConfig = serde_json::from_str(
            r#"{"port": 9000, "namespace": "server.admin", "classpath": ["a", "b.jar"], "shutdown_grace": "500ms"}"#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.classpath, [PathBuf::from("a"), PathBuf::from("b.jar")]);
        assert_eq!(config.shutdown_grace, Duration::from_millis(500));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        assert!(PowerConfig::new(9000, "server").validate().is_ok());
        for config in [
            PowerConfig::new(0, "server"),
            PowerConfig::new(9000, ""),
            PowerConfig::new(9000, "server..admin"),
        ] {
            assert_eq!(config.validate().unwrap_err().kind, ErrorKind::InvalidArgument);
        }
    }
}
