//! Media transport core for the RVOIP project
//!
//! This crate reassembles application-level media frames from RTP packets
//! that arrive out of order, duplicated or incomplete, and provides the NTP
//! fixed-point timestamp arithmetic used for timing computations.
//!
//! The library is organized into several modules:
//!
//! - `packet`: received RTP packets and circular sequence number arithmetic
//! - `buffer`: frame aggregation and the concurrent jitter buffer
//! - `collections`: the concurrent multimap backing the jitter buffer
//! - `time`: RTP clock helpers and NTP timestamp conversion
//! - `codec`: payload type registry and per-stream metadata
//! - `sdp`: session description rendering for known streams
//! - `logging`: tracing subscriber setup

mod error;

// Main modules
pub mod buffer;
pub mod codec;
pub mod collections;
pub mod logging;
pub mod packet;
pub mod sdp;
pub mod time;

// Re-export core types
pub use error::Error;

pub use buffer::{AddOutcome, Frame, JitterBuffer, JitterBufferConfig, JitterBufferStats};
pub use codec::{MediaType, PayloadTypeRegistry, StreamInfo};
pub use collections::ConcurrentMultiMap;
pub use packet::RtpPacket;
pub use sdp::SessionDescription;
pub use time::ntp::{NtpEpoch, NtpTimestamp};

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Typedef for RTP payload type (the logical stream identifier)
pub type PayloadType = u8;

/// Result type for media transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        AddOutcome, Error, Frame, JitterBuffer, JitterBufferConfig, NtpTimestamp, PayloadType,
        Result, RtpPacket, RtpSequenceNumber, RtpSsrc, RtpTimestamp, StreamInfo,
    };
}
