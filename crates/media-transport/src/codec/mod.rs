//! Stream metadata and the payload type registry
//!
//! Session negotiation supplies a [`StreamInfo`] per payload type before the
//! jitter buffer can compute durations or describe its streams.

pub mod registry;

pub use registry::PayloadTypeRegistry;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{PayloadType, Result};

/// Kind of media a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
    Application,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Application => "application",
        };
        f.write_str(name)
    }
}

/// Metadata for one logical stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Payload type number
    pub payload_type: PayloadType,
    /// Media kind
    pub media_type: MediaType,
    /// Encoding name as used in `a=rtpmap` (e.g. "PCMU", "H264")
    pub encoding_name: String,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Channel count for audio
    pub channels: Option<u8>,
}

impl StreamInfo {
    /// Describe a stream
    pub fn new(
        payload_type: PayloadType,
        media_type: MediaType,
        encoding_name: impl Into<String>,
        clock_rate: u32,
    ) -> Self {
        Self {
            payload_type,
            media_type,
            encoding_name: encoding_name.into(),
            clock_rate,
            channels: None,
        }
    }

    /// Set the channel count
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Reject metadata that cannot drive timing computations
    pub fn validate(&self) -> Result<()> {
        if self.payload_type > 127 {
            return Err(Error::InvalidParameter(format!(
                "payload type {} exceeds 7 bits",
                self.payload_type
            )));
        }
        if self.clock_rate == 0 {
            return Err(Error::InvalidParameter(format!(
                "clock rate for payload type {} must be non-zero",
                self.payload_type
            )));
        }
        if self.encoding_name.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "encoding name for payload type {} is empty",
                self.payload_type
            )));
        }
        Ok(())
    }

    /// `<encoding>/<clock>[/<channels>]`, the body of an `a=rtpmap` line
    pub fn rtpmap(&self) -> String {
        match self.channels {
            Some(channels) if self.media_type == MediaType::Audio && channels > 1 => {
                format!("{}/{}/{}", self.encoding_name, self.clock_rate, channels)
            }
            _ => format!("{}/{}", self.encoding_name, self.clock_rate),
        }
    }
}
