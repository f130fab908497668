use thiserror::Error;

use crate::PayloadType;

/// Error type for media transport operations
///
/// Rejected packets (duplicates, late arrivals, packets after a marker) are
/// ordinary traffic and are reported through boolean results, never through
/// this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid parameter for a buffer or registry operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No stream metadata is registered for the payload type
    #[error("No stream metadata registered for payload type {0}")]
    UnknownStream(PayloadType),

    /// Calendar time cannot be represented as an NTP timestamp
    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(String),

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
