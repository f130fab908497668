//! Concurrent frame-reassembly jitter buffer
//!
//! Packets from any number of receive threads are routed into per-stream
//! [`Frame`]s keyed by media timestamp. The first packet of a new timestamp
//! creates a frame; the packet that completes a frame removes it from the
//! buffer and hands it back to the caller in the same call.
//!
//! Routing for a stream happens while that stream's frame list is locked, so
//! two threads racing to add the last missing packet of a frame can never both
//! observe completion, and at most one open frame exists per timestamp.
//! Streams are independent: adding to one never waits on another, and
//! `clear` detaches each stream's list atomically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use super::{Frame, JitterBufferConfig};
use crate::codec::{PayloadTypeRegistry, StreamInfo};
use crate::collections::ConcurrentMultiMap;
use crate::error::Error;
use crate::packet::RtpPacket;
use crate::sdp::SessionDescription;
use crate::time::{rtp_timestamp_diff, rtp_timestamp_to_duration};
use crate::{PayloadType, Result};

/// Result of offering a packet to the buffer
#[derive(Debug, Clone, Default)]
pub struct AddOutcome {
    /// The packet was admitted into a frame
    pub admitted: bool,

    /// The packet completed its frame, which has left the buffer
    pub completed: bool,

    /// The frame the packet went into, or the open frame that rejected it
    pub frame: Option<Arc<Frame>>,
}

impl AddOutcome {
    fn ignored() -> Self {
        Self::default()
    }

    fn rejected(frame: Arc<Frame>) -> Self {
        Self {
            admitted: false,
            completed: false,
            frame: Some(frame),
        }
    }

    fn admitted(frame: Arc<Frame>, completed: bool) -> Self {
        Self {
            admitted: true,
            completed,
            frame: Some(frame),
        }
    }
}

/// Statistics for the jitter buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterBufferStats {
    /// Packets offered, disposed ones excluded
    pub packets_received: u64,

    /// Packets no open frame would take
    pub packets_rejected: u64,

    /// Frames created for a new timestamp
    pub frames_created: u64,

    /// Frames handed out complete
    pub frames_completed: u64,

    /// Incomplete frames dropped by the stream bound or stale eviction
    pub frames_evicted: u64,

    /// Incomplete frames currently tracked
    pub frames_in_flight: usize,

    /// Streams with a frame list
    pub streams: usize,
}

#[derive(Default)]
struct Counters {
    packets_received: AtomicU64,
    packets_rejected: AtomicU64,
    frames_created: AtomicU64,
    frames_completed: AtomicU64,
    frames_evicted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Reassembles frames for any number of streams, safe for concurrent use
pub struct JitterBuffer {
    config: JitterBufferConfig,

    /// Incomplete frames per payload type, in creation order
    frames: ConcurrentMultiMap<PayloadType, Arc<Frame>>,

    /// Stream metadata supplied by session negotiation
    streams: RwLock<HashMap<PayloadType, StreamInfo>>,

    counters: Counters,

    disposed: AtomicBool,
}

impl JitterBuffer {
    /// Create an empty buffer
    pub fn new(config: JitterBufferConfig) -> Self {
        Self {
            config,
            frames: ConcurrentMultiMap::new(),
            streams: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Buffer configuration
    pub fn config(&self) -> &JitterBufferConfig {
        &self.config
    }

    /// Register or replace metadata for a stream
    pub fn register_stream(&self, info: StreamInfo) -> Result<()> {
        info.validate()?;
        debug!(
            "Registered stream metadata for payload type {}: {}",
            info.payload_type,
            info.rtpmap()
        );
        self.streams.write().insert(info.payload_type, info);
        Ok(())
    }

    /// Register metadata for a payload type taken from a registry
    pub fn register_from(&self, registry: &PayloadTypeRegistry, payload_type: PayloadType) -> Result<()> {
        let info = registry
            .get(payload_type)
            .cloned()
            .ok_or(Error::UnknownStream(payload_type))?;
        self.register_stream(info)
    }

    /// Forget a stream's metadata
    pub fn unregister_stream(&self, payload_type: PayloadType) -> Option<StreamInfo> {
        self.streams.write().remove(&payload_type)
    }

    /// Metadata for a stream, if known
    pub fn stream_info(&self, payload_type: PayloadType) -> Option<StreamInfo> {
        self.streams.read().get(&payload_type).cloned()
    }

    /// Metadata for a stream that must be known
    pub fn require_stream_info(&self, payload_type: PayloadType) -> Result<StreamInfo> {
        self.stream_info(payload_type)
            .ok_or(Error::UnknownStream(payload_type))
    }

    /// Offer a packet to a stream's frames.
    ///
    /// The first open frame with the packet's timestamp decides: it either
    /// admits the packet or rejects it (duplicate, after the marker). Only
    /// when no open frame has that timestamp is a new frame seeded with the
    /// packet. A frame that becomes complete leaves the buffer and is returned
    /// with `completed` set.
    ///
    /// Disposed packets and a disposed buffer make this a no-op.
    pub fn add(
        &self,
        payload_type: PayloadType,
        allow_duplicates: bool,
        allow_packets_after_marker: bool,
        packet: &Arc<RtpPacket>,
    ) -> AddOutcome {
        if self.is_disposed() || packet.is_disposed() {
            trace!(
                "Ignoring packet seq={} for payload type {}: disposed",
                packet.sequence_number, payload_type
            );
            return AddOutcome::ignored();
        }
        Counters::bump(&self.counters.packets_received, 1);

        let mut frames = self.frames.lock_or_insert(payload_type);

        let mut admitted = None;
        let mut open_match = None;
        for (index, frame) in frames.iter().enumerate() {
            if frame.timestamp() != packet.timestamp || !frame.is_open() {
                continue;
            }
            if let Some(completed) = frame.admit(packet, allow_duplicates, allow_packets_after_marker) {
                admitted = Some((index, Arc::clone(frame), completed));
                break;
            }
            open_match.get_or_insert_with(|| Arc::clone(frame));
        }

        if let Some((index, frame, completed)) = admitted {
            if completed {
                frames.remove(index);
                self.record_completion(&frame);
            }
            return AddOutcome::admitted(frame, completed);
        }

        if let Some(frame) = open_match {
            Counters::bump(&self.counters.packets_rejected, 1);
            trace!(
                "Rejected packet seq={} ts={} for payload type {}",
                packet.sequence_number, packet.timestamp, payload_type
            );
            return AddOutcome::rejected(frame);
        }

        let frame = Arc::new(Frame::new(payload_type, packet.timestamp));
        let Some(completed) = frame.admit(packet, allow_duplicates, allow_packets_after_marker) else {
            // A fresh frame with a matching timestamp takes any packet
            return AddOutcome::ignored();
        };
        Counters::bump(&self.counters.frames_created, 1);
        trace!(
            "Created frame ts={} for payload type {} from seq={}",
            packet.timestamp, payload_type, packet.sequence_number
        );

        if completed {
            self.record_completion(&frame);
        } else {
            // The new frame is always kept, even under a zero bound
            let bound = self.config.max_frames_per_stream.max(1);
            while frames.len() >= bound {
                let evicted = frames.remove(0);
                Counters::bump(&self.counters.frames_evicted, 1);
                warn!(
                    "Payload type {} exceeded {} open frames, evicting ts={} with {} packets",
                    payload_type,
                    bound,
                    evicted.timestamp(),
                    evicted.packet_count()
                );
            }
            frames.push(Arc::clone(&frame));
        }

        AddOutcome::admitted(frame, completed)
    }

    /// Offer a packet using its own payload type and the configured admission policy
    pub fn insert(&self, packet: &Arc<RtpPacket>) -> AddOutcome {
        self.add(
            packet.payload_type,
            self.config.allow_duplicates,
            self.config.allow_packets_after_marker,
            packet,
        )
    }

    /// Track an externally built, in-progress frame under its own payload type
    pub fn add_frame(&self, frame: Arc<Frame>) -> bool {
        self.add_frame_to(frame.payload_type(), frame)
    }

    /// Track an externally built, in-progress frame under a payload type.
    ///
    /// Disposed and already complete frames are ignored.
    pub fn add_frame_to(&self, payload_type: PayloadType, frame: Arc<Frame>) -> bool {
        if self.is_disposed() || !frame.is_open() {
            return false;
        }
        debug!(
            "Tracking external frame ts={} for payload type {}",
            frame.timestamp(),
            payload_type
        );
        self.frames.add(payload_type, frame);
        true
    }

    /// Snapshot of a stream's incomplete frames, in creation order
    pub fn try_get_frames(&self, payload_type: PayloadType) -> Option<Vec<Arc<Frame>>> {
        self.frames.get_values(&payload_type)
    }

    /// Number of incomplete frames across all streams
    pub fn frame_count(&self) -> usize {
        self.frames.value_count()
    }

    /// Media time spanned by a stream's incomplete frames.
    ///
    /// Measured between the first and last frame in storage order, using the
    /// stream's clock rate. Zero when the stream has no frames or no metadata.
    pub fn duration(&self, payload_type: PayloadType) -> Duration {
        let Some(info) = self.stream_info(payload_type) else {
            return Duration::ZERO;
        };
        let Some(frames) = self.try_get_frames(payload_type) else {
            return Duration::ZERO;
        };
        match (frames.first(), frames.last()) {
            (Some(first), Some(last)) => {
                let span = rtp_timestamp_diff(last.timestamp(), first.timestamp());
                rtp_timestamp_to_duration(span, info.clock_rate)
            }
            _ => Duration::ZERO,
        }
    }

    /// Drop every tracked frame, disposing them if asked.
    ///
    /// Each stream's list is detached as a whole; a concurrent `add` lands
    /// either in the detached list (and is removed with it) or in a new one.
    /// Returns the number of frames removed.
    pub fn clear(&self, dispose_frames: bool) -> usize {
        let mut removed = 0;
        for (payload_type, frames) in self.frames.drain() {
            removed += frames.len();
            if dispose_frames {
                frames.iter().for_each(|frame| frame.dispose());
            }
            debug!("Cleared {} frames for payload type {}", frames.len(), payload_type);
        }
        if removed > 0 {
            info!("Jitter buffer cleared {} frames", removed);
        }
        removed
    }

    /// Remove incomplete frames older than `max_frame_age_ms` as of `now`
    pub fn evict_stale(&self, now: Instant) -> Vec<Arc<Frame>> {
        let max_age = self.config.max_frame_age();
        let mut stale = Vec::new();

        for payload_type in self.frames.keys() {
            let Some(list) = self.frames.try_get_value_list(&payload_type) else {
                continue;
            };
            let Some(mut frames) = list.lock() else {
                continue;
            };
            let before = stale.len();
            let (old, fresh): (Vec<_>, Vec<_>) = frames
                .drain(..)
                .partition(|frame| frame.age(now) >= max_age);
            *frames = fresh;
            stale.extend(old);

            if stale.len() > before {
                debug!(
                    "Evicted {} stale frames for payload type {}",
                    stale.len() - before,
                    payload_type
                );
            }
        }

        Counters::bump(&self.counters.frames_evicted, stale.len() as u64);
        stale
    }

    /// Describe the streams this buffer has metadata for
    pub fn create_session_description(&self, version: u64) -> SessionDescription {
        let streams: Vec<StreamInfo> = self.streams.read().values().cloned().collect();
        SessionDescription::from_streams(version, streams)
    }

    /// Current statistics
    pub fn stats(&self) -> JitterBufferStats {
        JitterBufferStats {
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            packets_rejected: self.counters.packets_rejected.load(Ordering::Relaxed),
            frames_created: self.counters.frames_created.load(Ordering::Relaxed),
            frames_completed: self.counters.frames_completed.load(Ordering::Relaxed),
            frames_evicted: self.counters.frames_evicted.load(Ordering::Relaxed),
            frames_in_flight: self.frames.value_count(),
            streams: self.frames.len(),
        }
    }

    /// Dispose every frame and ignore further input. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clear(true);
        info!("Jitter buffer disposed");
    }

    /// Whether `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn record_completion(&self, frame: &Frame) {
        Counters::bump(&self.counters.frames_completed, 1);
        debug!(
            "Completed frame ts={} for payload type {} with {} packets",
            frame.timestamp(),
            frame.payload_type(),
            frame.packet_count()
        );
    }
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::new(JitterBufferConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MediaType;
    use bytes::Bytes;

    fn create_test_packet(seq: u16, ts: u32, marker: bool) -> Arc<RtpPacket> {
        let payload = Bytes::from_static(b"test");
        Arc::new(RtpPacket::new(96, seq, ts, 0x12345678, payload).with_marker(marker))
    }

    #[test]
    fn test_in_order_frame() {
        let buffer = JitterBuffer::default();

        let first = buffer.add(96, false, false, &create_test_packet(1, 0, false));
        assert!(first.admitted && !first.completed);
        let second = buffer.add(96, false, false, &create_test_packet(2, 0, false));
        assert!(Arc::ptr_eq(first.frame.as_ref().unwrap(), second.frame.as_ref().unwrap()));

        let last = buffer.add(96, false, false, &create_test_packet(3, 0, true));
        assert!(last.completed);
        assert_eq!(last.frame.unwrap().packet_count(), 3);
        assert_eq!(buffer.try_get_frames(96), Some(Vec::new()));
    }

    #[test]
    fn test_frames_routed_by_timestamp() {
        let buffer = JitterBuffer::default();

        buffer.add(96, false, false, &create_test_packet(1, 0, false));
        buffer.add(96, false, false, &create_test_packet(4, 3000, false));
        buffer.add(96, false, false, &create_test_packet(2, 0, false));

        let frames = buffer.try_get_frames(96).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].timestamp(), 0);
        assert_eq!(frames[0].packet_count(), 2);
        assert_eq!(frames[1].timestamp(), 3000);
    }

    #[test]
    fn test_duplicate_is_rejected_without_new_frame() {
        let buffer = JitterBuffer::default();
        let packet = create_test_packet(10, 160, false);

        assert!(buffer.add(96, false, false, &packet).admitted);
        let again = buffer.add(96, false, false, &packet);
        assert!(!again.admitted);
        assert!(!again.completed);
        assert_eq!(again.frame.unwrap().packet_count(), 1);
        assert_eq!(buffer.try_get_frames(96).unwrap().len(), 1);
        assert_eq!(buffer.stats().packets_rejected, 1);
    }

    #[test]
    fn test_single_packet_frame_never_stored() {
        let buffer = JitterBuffer::default();
        let outcome = buffer.add(0, false, false, &create_test_packet(5, 800, true));
        assert!(outcome.completed);
        assert_eq!(buffer.try_get_frames(0), Some(Vec::new()));
        assert_eq!(buffer.stats().frames_completed, 1);
    }

    #[test]
    fn test_disposed_packet_is_noop() {
        let buffer = JitterBuffer::default();
        let packet = create_test_packet(1, 0, false);
        packet.dispose();

        let outcome = buffer.add(96, false, false, &packet);
        assert!(!outcome.admitted);
        assert!(outcome.frame.is_none());
        assert!(buffer.try_get_frames(96).is_none());
        assert_eq!(buffer.stats().packets_received, 0);
    }

    #[test]
    fn test_add_external_frame() {
        let buffer = JitterBuffer::default();
        let frame = Arc::new(Frame::new(96, 640));
        assert!(frame.try_add(&create_test_packet(1, 640, false), false, false));
        assert!(buffer.add_frame(Arc::clone(&frame)));

        let outcome = buffer.add(96, false, false, &create_test_packet(2, 640, true));
        assert!(outcome.completed);
        assert!(Arc::ptr_eq(&outcome.frame.unwrap(), &frame));

        let disposed = Arc::new(Frame::new(96, 960));
        disposed.dispose();
        assert!(!buffer.add_frame_to(96, disposed));
        assert_eq!(buffer.frame_count(), 0);
    }

    #[test]
    fn test_stream_bound_evicts_oldest() {
        let config = JitterBufferConfig {
            max_frames_per_stream: 2,
            ..Default::default()
        };
        let buffer = JitterBuffer::new(config);

        for (seq, ts) in [(1, 0), (2, 160), (3, 320)] {
            buffer.add(96, false, false, &create_test_packet(seq, ts, false));
        }

        let timestamps: Vec<_> = buffer
            .try_get_frames(96)
            .unwrap()
            .iter()
            .map(|f| f.timestamp())
            .collect();
        assert_eq!(timestamps, vec![160, 320]);
        assert_eq!(buffer.stats().frames_evicted, 1);
    }

    #[test]
    fn test_zero_stream_bound_keeps_newest_frame() {
        let config = JitterBufferConfig {
            max_frames_per_stream: 0,
            ..Default::default()
        };
        let buffer = JitterBuffer::new(config);

        let first = buffer.add(96, false, false, &create_test_packet(1, 0, false));
        assert!(first.admitted && !first.completed);
        let second = buffer.add(96, false, false, &create_test_packet(2, 160, false));
        assert!(second.admitted);

        let frames = buffer.try_get_frames(96).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp(), 160);
        assert_eq!(buffer.stats().frames_evicted, 1);
    }

    #[test]
    fn test_complete_external_frame_is_ignored() {
        let buffer = JitterBuffer::default();
        let frame = Arc::new(Frame::new(96, 320));
        assert!(frame.try_add(&create_test_packet(4, 320, true), false, false));
        assert!(frame.is_complete());

        assert!(!buffer.add_frame(frame));
        assert!(buffer.try_get_frames(96).is_none());
        assert_eq!(buffer.frame_count(), 0);
    }

    #[test]
    fn test_duration() {
        let buffer = JitterBuffer::default();
        buffer.add(96, false, false, &create_test_packet(1, 1000, false));
        buffer.add(96, false, false, &create_test_packet(5, 9000, false));

        // No metadata yet
        assert_eq!(buffer.duration(96), Duration::ZERO);

        buffer
            .register_stream(StreamInfo::new(96, MediaType::Audio, "opus", 8000))
            .unwrap();
        assert_eq!(buffer.duration(96), Duration::from_secs(1));
        assert_eq!(buffer.duration(97), Duration::ZERO);
    }

    #[test]
    fn test_stream_metadata() {
        let buffer = JitterBuffer::default();
        let registry = PayloadTypeRegistry::new();

        buffer.register_from(&registry, 0).unwrap();
        assert_eq!(buffer.require_stream_info(0).unwrap().encoding_name, "PCMU");
        assert_eq!(buffer.register_from(&registry, 99), Err(Error::UnknownStream(99)));
        assert_eq!(buffer.require_stream_info(8), Err(Error::UnknownStream(8)));
        assert!(buffer
            .register_stream(StreamInfo::new(96, MediaType::Video, "VP8", 0))
            .is_err());

        let sdp = buffer.create_session_description(2).with_session_id(1);
        assert!(sdp.to_string().contains("a=rtpmap:0 PCMU/8000\r\n"));
        assert!(buffer.unregister_stream(0).is_some());
    }

    #[test]
    fn test_evict_stale() {
        let buffer = JitterBuffer::default();
        buffer.add(96, false, false, &create_test_packet(1, 0, false));

        assert!(buffer.evict_stale(Instant::now()).is_empty());

        let later = Instant::now() + Duration::from_secs(1);
        let stale = buffer.evict_stale(later);
        assert_eq!(stale.len(), 1);
        assert_eq!(buffer.frame_count(), 0);
        assert_eq!(buffer.stats().frames_evicted, 1);
    }

    #[test]
    fn test_clear_and_dispose() {
        let buffer = JitterBuffer::default();
        let outcome = buffer.add(96, false, false, &create_test_packet(1, 0, false));
        buffer.add(8, false, false, &create_test_packet(1, 0, false));

        assert_eq!(buffer.clear(true), 2);
        assert!(outcome.frame.unwrap().is_disposed());
        assert_eq!(buffer.clear(true), 0);

        buffer.dispose();
        buffer.dispose();
        assert!(buffer.is_disposed());
        let ignored = buffer.add(96, false, false, &create_test_packet(2, 0, false));
        assert!(ignored.frame.is_none());
        assert_eq!(buffer.frame_count(), 0);
    }
}
