//! NTP fixed-point timestamps
//!
//! An NTP timestamp is a 64-bit unsigned fixed-point number: the high 32 bits
//! count whole seconds since an epoch and the low 32 bits hold the binary
//! fraction of a second. The seconds field wraps on 2036-02-07T06:28:16Z, so
//! two epochs are in use (RFC 4330 section 3):
//!
//! - era 0 starts at 1900-01-01T00:00:00Z
//! - era 1 starts at 2036-02-07T06:28:16Z
//!
//! Without an explicit epoch, a seconds field with its most significant bit
//! set is read as era 0 (1968-2036) and one with the bit clear as era 1
//! (2036-2104). All conversions use integer arithmetic; converting a
//! nanosecond-resolution instant to a timestamp and back is exact.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Seconds between the NTP era 0 epoch (1900) and the UNIX epoch (1970)
pub const NTP_UNIX_OFFSET_SECS: i64 = 2_208_988_800;

/// UNIX time of the NTP era 1 epoch, 2036-02-07T06:28:16Z
pub const NTP_ERA1_UNIX_SECS: i64 = (1i64 << 32) - NTP_UNIX_OFFSET_SECS;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Reference date a fixed-point timestamp is counted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NtpEpoch {
    /// 1900-01-01T00:00:00Z
    Prime,
    /// 2036-02-07T06:28:16Z, used once the era 0 seconds field wraps
    Rollover,
}

impl NtpEpoch {
    /// UNIX time of the epoch in seconds
    pub const fn unix_seconds(self) -> i64 {
        match self {
            NtpEpoch::Prime => -NTP_UNIX_OFFSET_SECS,
            NtpEpoch::Rollover => NTP_ERA1_UNIX_SECS,
        }
    }

    /// The epoch as calendar time
    pub fn start(self) -> DateTime<Utc> {
        unix_to_datetime(self.unix_seconds(), 0)
    }

    /// Epoch implied by a seconds field when none is given explicitly
    pub const fn for_seconds(seconds: u32) -> Self {
        if seconds & 0x8000_0000 != 0 {
            NtpEpoch::Prime
        } else {
            NtpEpoch::Rollover
        }
    }

    /// Epoch a calendar instant is encoded against
    pub fn for_datetime(datetime: &DateTime<Utc>) -> Self {
        if datetime.timestamp() >= NTP_ERA1_UNIX_SECS {
            NtpEpoch::Rollover
        } else {
            NtpEpoch::Prime
        }
    }
}

/// NTP timestamp representation (64 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NtpTimestamp {
    /// Whole seconds since the epoch
    pub seconds: u32,

    /// Binary fraction of a second
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Build a timestamp from its two 32-bit halves
    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// Timestamp for the current system time
    pub fn now() -> Self {
        // The current time is always inside era 0 or era 1
        Self::from_datetime(&Utc::now()).unwrap_or_default()
    }

    /// Encode a calendar instant, picking the epoch from the instant itself.
    ///
    /// Fails for instants before 1900 or past the end of era 1 (2172).
    pub fn from_datetime(datetime: &DateTime<Utc>) -> Result<Self> {
        let epoch = NtpEpoch::for_datetime(datetime);
        let seconds = datetime.timestamp() - epoch.unix_seconds();
        let seconds = u32::try_from(seconds).map_err(|_| {
            Error::InvalidTimestamp(format!("{} is outside the NTP eras", datetime.to_rfc3339()))
        })?;

        // Leap seconds are reported as nanos >= 1e9; fold them into the last tick
        let nanos = (datetime.timestamp_subsec_nanos() as u64).min(NANOS_PER_SEC - 1);

        Ok(Self {
            seconds,
            fraction: nanos_to_fraction(nanos),
        })
    }

    /// Decode to calendar time, choosing the epoch from the seconds field
    pub fn to_datetime(&self) -> DateTime<Utc> {
        self.to_datetime_with_epoch(NtpEpoch::for_seconds(self.seconds))
    }

    /// Decode to calendar time against an explicit epoch
    pub fn to_datetime_with_epoch(&self, epoch: NtpEpoch) -> DateTime<Utc> {
        let mut unix = epoch.unix_seconds() + self.seconds as i64;
        let mut nanos = fraction_to_nanos(self.fraction);
        if nanos == NANOS_PER_SEC {
            unix += 1;
            nanos = 0;
        }
        unix_to_datetime(unix, nanos as u32)
    }

    /// Convert to a 64-bit representation
    pub const fn to_u64(&self) -> u64 {
        (self.seconds as u64) << 32 | (self.fraction as u64)
    }

    /// Convert from a 64-bit representation
    pub const fn from_u64(value: u64) -> Self {
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Middle 32 bits, the compact form carried in RTCP report blocks
    pub const fn to_u32(&self) -> u32 {
        ((self.seconds & 0x0000FFFF) << 16) | ((self.fraction & 0xFFFF0000) >> 16)
    }

    /// Time elapsed since `earlier`, computed on the raw 64-bit values.
    ///
    /// The subtraction wraps, so a span crossing the era boundary is still
    /// measured correctly as long as it is shorter than one era.
    pub fn duration_since(&self, earlier: &NtpTimestamp) -> Duration {
        fixed_to_duration(self.to_u64().wrapping_sub(earlier.to_u64()))
    }
}

impl fmt::Display for NtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}.{:08x}", self.seconds, self.fraction)
    }
}

impl From<u64> for NtpTimestamp {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<NtpTimestamp> for u64 {
    fn from(value: NtpTimestamp) -> Self {
        value.to_u64()
    }
}

/// Encode calendar time as a 64-bit fixed-point timestamp
pub fn to_fixed_point(datetime: &DateTime<Utc>) -> Result<u64> {
    NtpTimestamp::from_datetime(datetime).map(|ts| ts.to_u64())
}

/// Decode a 64-bit fixed-point timestamp
pub fn from_fixed_point(value: u64) -> DateTime<Utc> {
    NtpTimestamp::from_u64(value).to_datetime()
}

/// Decode from separate seconds and fraction halves
pub fn from_parts(seconds: u32, fraction: u32) -> DateTime<Utc> {
    NtpTimestamp::new(seconds, fraction).to_datetime()
}

/// Decode from separate halves against an explicit epoch
pub fn from_parts_with_epoch(seconds: u32, fraction: u32, epoch: NtpEpoch) -> DateTime<Utc> {
    NtpTimestamp::new(seconds, fraction).to_datetime_with_epoch(epoch)
}

/// nanos * 2^32 / 1e9, rounded to nearest
fn nanos_to_fraction(nanos: u64) -> u32 {
    let fraction = ((nanos << 32) + NANOS_PER_SEC / 2) / NANOS_PER_SEC;
    fraction.min(u32::MAX as u64) as u32
}

/// fraction * 1e9 / 2^32, rounded to nearest; may return exactly 1e9
fn fraction_to_nanos(fraction: u32) -> u64 {
    ((fraction as u64) * NANOS_PER_SEC + (1u64 << 31)) >> 32
}

fn fixed_to_duration(value: u64) -> Duration {
    let seconds = value >> 32;
    let nanos = fraction_to_nanos(value as u32);
    Duration::from_secs(seconds) + Duration::from_nanos(nanos)
}

fn unix_to_datetime(seconds: i64, nanos: u32) -> DateTime<Utc> {
    // Both NTP eras lie well inside chrono's representable range
    DateTime::<Utc>::from_timestamp(seconds, nanos).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn rfc_example() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1995, 11, 10, 11, 33, 25)
            .unwrap()
            .with_nanosecond(125_000_000)
            .unwrap()
    }

    #[test]
    fn test_rfc_worked_example() {
        let value = to_fixed_point(&rfc_example()).unwrap();
        assert_eq!(value >> 32, 0xb44db705);
        assert_eq!(value, 0xb44db705_20000000);
        assert_eq!(from_fixed_point(0xb44db705_20000000), rfc_example());
    }

    #[test]
    fn test_epoch_constants() {
        assert_eq!(NtpEpoch::Prime.start(), Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(NtpEpoch::Rollover.start(), Utc.with_ymd_and_hms(2036, 2, 7, 6, 28, 16).unwrap());
    }

    #[test]
    fn test_rollover_epoch_selection() {
        let era_start = NtpEpoch::Rollover.start();
        let ts = NtpTimestamp::from_datetime(&era_start).unwrap();
        assert_eq!(ts, NtpTimestamp::new(0, 0));
        assert_eq!(ts.to_datetime(), era_start);

        let last_era0 = DateTime::<Utc>::from_timestamp(NTP_ERA1_UNIX_SECS - 1, 0).unwrap();
        let ts = NtpTimestamp::from_datetime(&last_era0).unwrap();
        assert_eq!(ts.seconds, u32::MAX);
        assert_eq!(ts.to_datetime(), last_era0);
    }

    #[test]
    fn test_explicit_epoch_override() {
        // 1950 encodes with the high bit clear and reads back as era 1 unless told otherwise
        let early = Utc.with_ymd_and_hms(1950, 6, 1, 12, 0, 0).unwrap();
        let ts = NtpTimestamp::from_datetime(&early).unwrap();
        assert_eq!(ts.seconds & 0x8000_0000, 0);
        assert_ne!(ts.to_datetime(), early);
        assert_eq!(from_parts_with_epoch(ts.seconds, ts.fraction, NtpEpoch::Prime), early);
    }

    #[test]
    fn test_out_of_range() {
        let before = Utc.with_ymd_and_hms(1899, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(to_fixed_point(&before), Err(Error::InvalidTimestamp(_))));
    }

    #[test]
    fn test_fraction_rounding_carries() {
        let dt = from_parts(0x8000_0000, u32::MAX);
        assert_eq!(dt.timestamp_subsec_nanos(), 0);
        assert_eq!(dt, from_parts(0x8000_0001, 0));
    }

    #[test]
    fn test_compact_form() {
        let ts = NtpTimestamp::new(0x1234_5678, 0x9abc_def0);
        assert_eq!(ts.to_u32(), 0x5678_9abc);
        assert_eq!(NtpTimestamp::from_u64(ts.to_u64()), ts);
        assert_eq!(ts.to_string(), "12345678.9abcdef0");
    }

    #[test]
    fn test_duration_since_across_era_boundary() {
        let before = NtpTimestamp::new(u32::MAX, 0x8000_0000);
        let after = NtpTimestamp::new(1, 0);
        assert_eq!(after.duration_since(&before), Duration::from_millis(1500));
    }

    #[test]
    fn test_now_is_recent() {
        let now = NtpTimestamp::now();
        // Jan 1, 2020 in NTP time
        assert!(now.seconds > 3786825600);
    }
}
