//! Payload type registry
//!
//! An explicitly constructed registry of RFC 3551 static payload types plus
//! dynamically negotiated ones (96-127). Each session owns its own instance;
//! dynamic mappings negotiated for one session never leak into another.

use std::collections::HashMap;

use tracing::debug;

use super::{MediaType, StreamInfo};
use crate::error::Error;
use crate::{PayloadType, Result};

/// First dynamic payload type
pub const DYNAMIC_PAYLOAD_TYPE_START: PayloadType = 96;

/// Last dynamic payload type
pub const DYNAMIC_PAYLOAD_TYPE_END: PayloadType = 127;

// (payload type, media, encoding, clock rate, channels)
const RFC3551_STATIC_TYPES: &[(PayloadType, MediaType, &str, u32, Option<u8>)] = &[
    (0, MediaType::Audio, "PCMU", 8000, Some(1)),
    (3, MediaType::Audio, "GSM", 8000, Some(1)),
    (4, MediaType::Audio, "G723", 8000, Some(1)),
    (5, MediaType::Audio, "DVI4", 8000, Some(1)),
    (6, MediaType::Audio, "DVI4", 16000, Some(1)),
    (7, MediaType::Audio, "LPC", 8000, Some(1)),
    (8, MediaType::Audio, "PCMA", 8000, Some(1)),
    // G.722 keeps the 8000 Hz RTP clock for historical reasons
    (9, MediaType::Audio, "G722", 8000, Some(1)),
    (10, MediaType::Audio, "L16", 44100, Some(2)),
    (11, MediaType::Audio, "L16", 44100, Some(1)),
    (12, MediaType::Audio, "QCELP", 8000, Some(1)),
    (13, MediaType::Audio, "CN", 8000, Some(1)),
    (14, MediaType::Audio, "MPA", 90000, None),
    (15, MediaType::Audio, "G728", 8000, Some(1)),
    (16, MediaType::Audio, "DVI4", 11025, Some(1)),
    (17, MediaType::Audio, "DVI4", 22050, Some(1)),
    (18, MediaType::Audio, "G729", 8000, Some(1)),
    (25, MediaType::Video, "CelB", 90000, None),
    (26, MediaType::Video, "JPEG", 90000, None),
    (28, MediaType::Video, "nv", 90000, None),
    (31, MediaType::Video, "H261", 90000, None),
    (32, MediaType::Video, "MPV", 90000, None),
    (33, MediaType::Video, "MP2T", 90000, None),
    (34, MediaType::Video, "H263", 90000, None),
];

/// Payload type registry implementation
#[derive(Debug, Clone)]
pub struct PayloadTypeRegistry {
    static_types: HashMap<PayloadType, StreamInfo>,
    dynamic_types: HashMap<PayloadType, StreamInfo>,
}

impl PayloadTypeRegistry {
    /// Create a registry populated with the RFC 3551 static payload types
    pub fn new() -> Self {
        let static_types = RFC3551_STATIC_TYPES
            .iter()
            .map(|&(payload_type, media_type, name, clock_rate, channels)| {
                let mut info = StreamInfo::new(payload_type, media_type, name, clock_rate);
                info.channels = channels;
                (payload_type, info)
            })
            .collect();

        Self {
            static_types,
            dynamic_types: HashMap::new(),
        }
    }

    /// Register a negotiated dynamic payload type, replacing any earlier mapping
    pub fn register_dynamic(&mut self, info: StreamInfo) -> Result<()> {
        info.validate()?;
        if !is_dynamic(info.payload_type) {
            return Err(Error::InvalidParameter(format!(
                "payload type {} is not in the dynamic range {}-{}",
                info.payload_type, DYNAMIC_PAYLOAD_TYPE_START, DYNAMIC_PAYLOAD_TYPE_END
            )));
        }

        debug!(
            "Registered dynamic payload type {} as {}",
            info.payload_type,
            info.rtpmap()
        );
        self.dynamic_types.insert(info.payload_type, info);
        Ok(())
    }

    /// Drop a dynamic mapping
    pub fn unregister_dynamic(&mut self, payload_type: PayloadType) -> Option<StreamInfo> {
        self.dynamic_types.remove(&payload_type)
    }

    /// Look up metadata for a payload type
    pub fn get(&self, payload_type: PayloadType) -> Option<&StreamInfo> {
        if is_dynamic(payload_type) {
            self.dynamic_types.get(&payload_type)
        } else {
            self.static_types.get(&payload_type)
        }
    }

    /// Clock rate for a payload type
    pub fn clock_rate(&self, payload_type: PayloadType) -> Option<u32> {
        self.get(payload_type).map(|info| info.clock_rate)
    }

    /// Find a payload type by encoding name (case insensitive)
    pub fn find_by_name(&self, encoding_name: &str) -> Option<&StreamInfo> {
        self.dynamic_types
            .values()
            .chain(self.static_types.values())
            .filter(|info| info.encoding_name.eq_ignore_ascii_case(encoding_name))
            .min_by_key(|info| info.payload_type)
    }

    /// Whether the payload type is known
    pub fn contains(&self, payload_type: PayloadType) -> bool {
        self.get(payload_type).is_some()
    }
}

impl Default for PayloadTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_dynamic(payload_type: PayloadType) -> bool {
    (DYNAMIC_PAYLOAD_TYPE_START..=DYNAMIC_PAYLOAD_TYPE_END).contains(&payload_type)
}
