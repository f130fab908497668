//! Circular arithmetic over the 16-bit RTP sequence number space
//!
//! Sequence numbers wrap from 65535 to 0. Two sequence numbers are compared
//! by the shorter way around the circle: `b` is newer than `a` when the
//! forward distance from `a` to `b` is less than half the space.

use std::cmp::Ordering;

use crate::RtpSequenceNumber;

/// Half of the sequence number space
pub const SEQ_HALF_RANGE: u16 = 0x8000;

/// Forward distance from `from` to `to`, modulo 65536
#[inline]
pub fn seq_distance(from: RtpSequenceNumber, to: RtpSequenceNumber) -> u16 {
    to.wrapping_sub(from)
}

/// Whether `a` comes strictly after `b` in circular order
#[inline]
pub fn seq_is_newer(a: RtpSequenceNumber, b: RtpSequenceNumber) -> bool {
    a != b && seq_distance(b, a) < SEQ_HALF_RANGE
}

/// Whether `a` comes strictly before `b` in circular order
#[inline]
pub fn seq_is_older(a: RtpSequenceNumber, b: RtpSequenceNumber) -> bool {
    seq_is_newer(b, a)
}

/// Circular ordering of two sequence numbers
pub fn seq_cmp(a: RtpSequenceNumber, b: RtpSequenceNumber) -> Ordering {
    if a == b {
        Ordering::Equal
    } else if seq_is_newer(a, b) {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Whether `seq` lies in the inclusive circular range `start..=end`
#[inline]
pub fn seq_in_range(seq: RtpSequenceNumber, start: RtpSequenceNumber, end: RtpSequenceNumber) -> bool {
    seq_distance(start, seq) <= seq_distance(start, end)
}
