//! Time and clock utilities
//!
//! RTP media clock helpers used for frame and session durations, plus the
//! NTP fixed-point wall-clock conversion in [`ntp`].

pub mod ntp;

use std::time::Duration;

use crate::RtpTimestamp;

/// Convert an RTP timestamp span to a duration at a given clock rate
pub fn rtp_timestamp_to_duration(span: RtpTimestamp, clock_rate: u32) -> Duration {
    if clock_rate == 0 {
        return Duration::ZERO;
    }

    let seconds = span / clock_rate;
    let remainder = span % clock_rate;
    let nanos = ((remainder as u64) * 1_000_000_000) / (clock_rate as u64);

    Duration::new(seconds as u64, nanos as u32)
}

/// Distance between two RTP timestamps the short way around the 32-bit space
pub fn rtp_timestamp_diff(a: RtpTimestamp, b: RtpTimestamp) -> u32 {
    a.wrapping_sub(b).min(b.wrapping_sub(a))
}
