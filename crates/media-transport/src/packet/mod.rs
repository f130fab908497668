//! Received RTP packets
//!
//! Header parsing belongs to the transport layer; by the time a packet reaches
//! this crate its header fields are already decoded. The payload is kept as
//! reference-counted [`Bytes`] so frames never copy packet data.

pub mod sequence;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use crate::{PayloadType, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// A decoded RTP packet as delivered by the transport layer
pub struct RtpPacket {
    /// Payload type (logical stream identifier)
    pub payload_type: PayloadType,

    /// Sequence number, wraps modulo 65536
    pub sequence_number: RtpSequenceNumber,

    /// Media timestamp shared by every packet of a frame
    pub timestamp: RtpTimestamp,

    /// Synchronization source identifier
    pub ssrc: RtpSsrc,

    /// Marker bit, set on the last packet of a frame
    pub marker: bool,

    /// Payload data
    pub payload: Bytes,

    disposed: AtomicBool,
}

impl RtpPacket {
    /// Create a new packet without the marker bit
    pub fn new(
        payload_type: PayloadType,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
        payload: Bytes,
    ) -> Self {
        Self {
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            marker: false,
            payload,
            disposed: AtomicBool::new(false),
        }
    }

    /// Set the marker bit
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Mark the packet as released by its producer.
    ///
    /// Disposed packets are ignored by the jitter buffer.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Whether the packet has been released by its producer
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Payload size in bytes
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

impl Clone for RtpPacket {
    fn clone(&self) -> Self {
        Self {
            payload_type: self.payload_type,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            marker: self.marker,
            payload: self.payload.clone(),
            disposed: AtomicBool::new(self.is_disposed()),
        }
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpPacket")
            .field("payload_type", &self.payload_type)
            .field("sequence_number", &self.sequence_number)
            .field("timestamp", &self.timestamp)
            .field("ssrc", &format_args!("{:#010x}", self.ssrc))
            .field("marker", &self.marker)
            .field("payload_len", &self.payload.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
