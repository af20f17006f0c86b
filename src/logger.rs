// ============================================================================
// logger.rs
// ============================================================================
//! Logging configuration and initialization.
//!
//! `LoggerManager` validates the logging section of the configuration and
//! installs the global `tracing` subscriber. Output goes to stdout in one of
//! three formats; `RUST_LOG` overrides the configured level when present.

use std::io;

use thiserror::Error;
use tracing::instrument;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, prelude::*, EnvFilter, Layer};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig},
    print_warn,
};

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Errors that can occur during logger configuration or initialization.
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger initialization error: {0}")]
    InitializationError(String),

    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// Console output is disabled, so nothing would be logged.
    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,
}

pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// Validates `config` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `LoggerError::ValidationError` if validation fails.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;

        Ok(LoggerManager { config })
    }

    /// Installs the global subscriber. Call once, before any events are emitted.
    ///
    /// # Errors
    ///
    /// Returns `NoLayersConfigured` when console output is disabled, or
    /// `InitializationError` when a global subscriber is already set.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<(), LoggerError> {
        let layer = self.build_layer()?;
        tracing_subscriber::registry()
            .with(layer)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    fn build_layer(&self) -> Result<BoxedLayer, LoggerError> {
        match &self.config.console {
            Some(console_config) if console_config.enabled => {
                let filter = EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(self.config.level.to_lowercase()));
                Ok(Self::console_layer(console_config, filter))
            }
            _ => {
                print_warn!("No logging layers were initialized. Please check your configuration.");
                Err(LoggerError::NoLayersConfigured)
            }
        }
    }

    fn console_layer(config: &ConsoleConfig, filter: EnvFilter) -> BoxedLayer {
        let span_events = if config.show_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_span_events(span_events)
            .with_ansi(config.ansi_colors)
            .with_writer(io::stdout);

        match config.format {
            LogFormat::Json => base.json().with_filter(filter).boxed(),
            LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
            LogFormat::Compact => base.compact().with_filter(filter).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggerConfig {
            level: "loud".into(),
            ..LoggerConfig::default()
        };
        assert!(matches!(
            LoggerManager::new(config),
            Err(LoggerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_disabled_console_has_no_layers() {
        let config = LoggerConfig {
            console: None,
            ..LoggerConfig::default()
        };
        let manager = LoggerManager::new(config).unwrap();
        assert!(matches!(
            manager.build_layer(),
            Err(LoggerError::NoLayersConfigured)
        ));
    }

    #[test]
    fn test_every_format_builds() {
        for format in [LogFormat::Compact, LogFormat::Pretty, LogFormat::Json] {
            let console = ConsoleConfig {
                format,
                ..ConsoleConfig::default()
            };
            let config = LoggerConfig {
                console: Some(console),
                ..LoggerConfig::default()
            };
            assert!(LoggerManager::new(config).unwrap().build_layer().is_ok());
        }
    }
}
