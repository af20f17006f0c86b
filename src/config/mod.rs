//! Application configuration loading and validation.
//!
//! The top-level `Config` combines logging, the broker connection, and the
//! stdin producer. It is read from TOML once at startup, validated, and kept
//! immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::logger::LoggerConfig;

pub mod logger;

/// Timestamp prefix for the `print_*` macros.
#[doc(hidden)]
pub fn timestamp() -> String {
    time::format_description::parse(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z",
    )
    .ok()
    .and_then(|format| time::OffsetDateTime::now_utc().format(&format).ok())
    .unwrap_or_default()
}

/// Timestamped console messages for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style($crate::config::timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Where stdin lines are published.
#[derive(Serialize, Deserialize, Debug, Validate, Clone)]
#[serde(default)]
pub struct ProducerConfig {
    /// Topic suffix, joined under the broker's topic prefix.
    #[validate(length(min = 1, max = 255, message = "Topic must be 1-255 characters"))]
    pub topic: String,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: "lines".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    #[validate(nested)]
    pub mqtt: brokerlink_mqtt::Config,

    #[validate(nested)]
    pub producer: ProducerConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::load(&config_path)
    }

    /// `BROKERLINK_CONFIG`, then `/etc/brokerlink/config.toml`.
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(config_path) = std::env::var("BROKERLINK_CONFIG") {
            let path = PathBuf::from(config_path);
            print_info!("Using config from BROKERLINK_CONFIG: {}", path.display());
            return Ok(path);
        }

        let fallback = Path::new("/etc/brokerlink/config.toml");
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(
            "No configuration file found. Set BROKERLINK_CONFIG.".to_string(),
        ))
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
            [logger]
            level = "debug"

            [logger.console]
            format = "pretty"

            [mqtt]
            queue_limit = 50

            [mqtt.broker]
            host = "broker.local"
            client_id = "producer-1"
            topic_prefix = "lab"

            [producer]
            topic = "stdin"
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.mqtt.queue_limit, 50);
        assert_eq!(config.mqtt.broker.host, "broker.local");
        assert_eq!(config.producer.topic, "stdin");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logger.level, "info");
        assert_eq!(config.mqtt.broker.port, 1883);
        assert_eq!(config.producer.topic, "lines");
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/brokerlink.toml"));
        assert!(matches!(result, Err(ConfigError::Config(_))));
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("[mqtt\nqueue_limit = ");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_nested_validation_error() {
        let file = write_config("[mqtt.broker]\nqos = 7\n");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000000Z".len());
    }
}
