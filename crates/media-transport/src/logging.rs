//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events: rejections at trace level,
//! frame creation and completion at debug, bulk clears at info. Applications
//! and tests install a subscriber with [`setup_logging`], usually from the
//! same TOML document that carries the jitter buffer configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::Error;
use crate::Result;

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level, e.g. "info" or "trace"
    pub level: String,

    /// Extra filter directives, e.g. `rvoip_media_transport::buffer=trace`
    pub directives: Vec<String>,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,

    /// Include source file and line
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            json: false,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    /// Parse the settings from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.filter()?;
        Ok(config)
    }

    /// Build the filter: `RUST_LOG`, then the base level, then the directives
    fn filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(parse_log_level(&self.level)?.into());
        for directive in &self.directives {
            let parsed = Directive::from_str(directive)
                .map_err(|err| Error::Config(format!("Invalid log directive {}: {}", directive, err)))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install a global fmt subscriber.
///
/// Fails with [`Error::Config`] on a bad level or directive, or when a global
/// subscriber is already installed; tests that install one per binary ignore
/// the latter.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(config.filter()?)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|err| Error::Config(format!("Failed to install subscriber: {}", err)))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}
