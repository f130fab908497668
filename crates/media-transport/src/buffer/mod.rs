//! Frame reassembly buffers
//!
//! - [`frame`]: aggregation of the packets sharing one media timestamp
//! - [`jitter`]: the per-stream jitter buffer routing packets into frames

pub mod frame;
pub mod jitter;

pub use frame::Frame;
pub use jitter::{AddOutcome, JitterBuffer, JitterBufferStats};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Default age after which an incomplete frame is considered stale
pub const DEFAULT_MAX_FRAME_AGE_MS: u32 = 500;

/// Default bound on incomplete frames tracked per stream
pub const DEFAULT_MAX_FRAMES_PER_STREAM: usize = 128;

/// Jitter buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterBufferConfig {
    /// Admit packets whose sequence number is already in the frame
    pub allow_duplicates: bool,

    /// Admit packets whose sequence number lies after the frame's marker
    pub allow_packets_after_marker: bool,

    /// Age in milliseconds after which `evict_stale` drops an incomplete frame
    pub max_frame_age_ms: u32,

    /// Incomplete frames kept per stream; the oldest is evicted beyond this
    pub max_frames_per_stream: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            allow_duplicates: false,
            allow_packets_after_marker: false,
            max_frame_age_ms: DEFAULT_MAX_FRAME_AGE_MS,
            max_frames_per_stream: DEFAULT_MAX_FRAMES_PER_STREAM,
        }
    }
}

impl JitterBufferConfig {
    /// Parse and validate a TOML document.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the buffer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_frames_per_stream == 0 {
            return Err(Error::Config("max_frames_per_stream must be at least 1".to_string()));
        }
        if self.max_frame_age_ms == 0 {
            return Err(Error::Config("max_frame_age_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Stale-frame horizon as a duration
    pub fn max_frame_age(&self) -> Duration {
        Duration::from_millis(self.max_frame_age_ms as u64)
    }
}
