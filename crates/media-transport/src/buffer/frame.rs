//! Per-timestamp packet aggregation
//!
//! A [`Frame`] collects the packets of one (payload type, timestamp) pair and
//! decides when the frame is whole. Completion policy: a marker packet has
//! been seen and every sequence number from the lowest one received up to the
//! marker is present, regardless of arrival order. Sequence comparisons are
//! circular so frames spanning the 65535 -> 0 rollover are judged correctly.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use crate::packet::RtpPacket;
use crate::packet::sequence::{seq_distance, seq_in_range, seq_is_newer, seq_is_older};
use crate::{PayloadType, RtpSequenceNumber, RtpTimestamp};

#[derive(Default)]
struct FrameState {
    /// Admitted packets in arrival order, duplicates included
    packets: Vec<Arc<RtpPacket>>,
    /// Distinct sequence numbers present
    sequences: HashSet<RtpSequenceNumber>,
    min_seq: Option<RtpSequenceNumber>,
    max_seq: Option<RtpSequenceNumber>,
    marker_seq: Option<RtpSequenceNumber>,
    complete: bool,
}

impl FrameState {
    fn is_after_marker(&self, seq: RtpSequenceNumber) -> bool {
        self.marker_seq.is_some_and(|marker| seq_is_newer(seq, marker))
    }

    fn insert(&mut self, packet: &Arc<RtpPacket>) {
        let seq = packet.sequence_number;

        self.packets.push(Arc::clone(packet));
        self.sequences.insert(seq);

        self.min_seq = Some(match self.min_seq {
            Some(min) if !seq_is_older(seq, min) => min,
            _ => seq,
        });
        self.max_seq = Some(match self.max_seq {
            Some(max) if !seq_is_newer(seq, max) => max,
            _ => seq,
        });

        if packet.marker {
            // Two markers in one frame: the earlier one ends it
            self.marker_seq = Some(match self.marker_seq {
                Some(marker) if !seq_is_older(seq, marker) => marker,
                _ => seq,
            });
        }
    }

    /// Drop members numbered past the marker, returning how many went
    fn drop_after_marker(&mut self) -> usize {
        let Some(marker) = self.marker_seq else {
            return 0;
        };

        let before = self.packets.len();
        self.packets
            .retain(|packet| !seq_is_newer(packet.sequence_number, marker));
        self.sequences.retain(|&seq| !seq_is_newer(seq, marker));

        let dropped = before - self.packets.len();
        if dropped > 0 {
            self.max_seq = Some(marker);
        }
        dropped
    }

    fn contiguous_to_marker(&self) -> bool {
        let (Some(min), Some(marker)) = (self.min_seq, self.marker_seq) else {
            return false;
        };

        let span = seq_distance(min, marker) as usize;
        let present = self
            .sequences
            .iter()
            .filter(|&&seq| seq_in_range(seq, min, marker))
            .count();
        present == span + 1
    }
}

/// Packets of one media frame, shared between the jitter buffer and the thread
/// that completes it
pub struct Frame {
    payload_type: PayloadType,
    timestamp: RtpTimestamp,
    created_at: Instant,
    state: Mutex<FrameState>,
    disposed: AtomicBool,
}

impl Frame {
    /// Create an empty frame for a stream and media timestamp
    pub fn new(payload_type: PayloadType, timestamp: RtpTimestamp) -> Self {
        Self {
            payload_type,
            timestamp,
            created_at: Instant::now(),
            state: Mutex::new(FrameState::default()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Try to admit a packet.
    ///
    /// Returns `false` when the frame is complete or disposed, the timestamp
    /// differs, the sequence number is already present (unless
    /// `allow_duplicates`), or the packet lies after the marker (unless
    /// `allow_packets_after_marker`). A rejected packet is ordinary traffic,
    /// not an error.
    ///
    /// A marker numbered below packets already admitted evicts those packets
    /// under the same rule, so the frame never holds members past its marker
    /// unless `allow_packets_after_marker` is set.
    pub fn try_add(
        &self,
        packet: &Arc<RtpPacket>,
        allow_duplicates: bool,
        allow_packets_after_marker: bool,
    ) -> bool {
        self.admit(packet, allow_duplicates, allow_packets_after_marker)
            .is_some()
    }

    /// Admit a packet and report, under the same lock, whether this packet
    /// completed the frame. `None` means the packet was rejected.
    pub(crate) fn admit(
        &self,
        packet: &Arc<RtpPacket>,
        allow_duplicates: bool,
        allow_packets_after_marker: bool,
    ) -> Option<bool> {
        if packet.timestamp != self.timestamp {
            return None;
        }

        let mut state = self.state.lock();
        if state.complete || self.is_disposed() {
            return None;
        }
        if !allow_duplicates && state.sequences.contains(&packet.sequence_number) {
            return None;
        }
        if !allow_packets_after_marker && state.is_after_marker(packet.sequence_number) {
            return None;
        }

        state.insert(packet);
        if packet.marker && !allow_packets_after_marker {
            // Members already past a late-arriving marker leave the frame
            let dropped = state.drop_after_marker();
            if dropped > 0 {
                trace!(
                    "Dropped {} packets past marker seq={} in frame ts={}",
                    dropped, packet.sequence_number, self.timestamp
                );
            }
        }
        state.complete = state.contiguous_to_marker();
        Some(state.complete)
    }

    /// Whether the frame can still take packets
    pub(crate) fn is_open(&self) -> bool {
        !self.is_disposed() && !self.is_complete()
    }

    /// Whether a contiguous run from the lowest sequence to the marker is present
    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    /// Media timestamp shared by every packet of the frame
    pub fn timestamp(&self) -> RtpTimestamp {
        self.timestamp
    }

    /// Payload type of the stream the frame belongs to
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    /// Whether the marker packet has arrived
    pub fn has_marker(&self) -> bool {
        self.state.lock().marker_seq.is_some()
    }

    pub fn marker_sequence(&self) -> Option<RtpSequenceNumber> {
        self.state.lock().marker_seq
    }

    pub fn min_sequence(&self) -> Option<RtpSequenceNumber> {
        self.state.lock().min_seq
    }

    pub fn max_sequence(&self) -> Option<RtpSequenceNumber> {
        self.state.lock().max_seq
    }

    /// Number of admitted packets, duplicates included
    pub fn packet_count(&self) -> usize {
        self.state.lock().packets.len()
    }

    /// Whether the sequence number has been admitted
    pub fn contains(&self, sequence_number: RtpSequenceNumber) -> bool {
        self.state.lock().sequences.contains(&sequence_number)
    }

    /// Member packets in sequence order, starting at the lowest sequence.
    ///
    /// Duplicates keep their arrival order relative to each other.
    pub fn packets(&self) -> Vec<Arc<RtpPacket>> {
        let state = self.state.lock();
        let mut packets = state.packets.clone();
        if let Some(min) = state.min_seq {
            packets.sort_by_key(|packet| seq_distance(min, packet.sequence_number));
        }
        packets
    }

    /// Concatenate member payloads in sequence order, one copy per sequence number
    pub fn assemble_payload(&self) -> Bytes {
        let packets = self.packets();
        let mut seen = HashSet::with_capacity(packets.len());
        let unique: Vec<_> = packets
            .iter()
            .filter(|packet| seen.insert(packet.sequence_number))
            .collect();

        let mut payload = BytesMut::with_capacity(unique.iter().map(|p| p.payload_len()).sum());
        for packet in unique {
            payload.extend_from_slice(&packet.payload);
        }
        payload.freeze()
    }

    /// When the frame was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the frame was created, as seen at `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Release member packets and refuse further admissions.
    ///
    /// Calling this more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        state.packets.clear();
        state.sequences.clear();
    }

    /// Whether the frame has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Frame")
            .field("payload_type", &self.payload_type)
            .field("timestamp", &self.timestamp)
            .field("packets", &state.packets.len())
            .field("min_seq", &state.min_seq)
            .field("marker_seq", &state.marker_seq)
            .field("complete", &state.complete)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
