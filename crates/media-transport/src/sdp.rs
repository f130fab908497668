//! Session description for the streams a jitter buffer knows about
//!
//! Renders RFC 4566 text with one `m=` section per media kind and an
//! `a=rtpmap` line per payload type. Ports are left at 0: the transport layer
//! owns addressing and fills it in when it builds an offer or answer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{MediaType, StreamInfo};
use crate::PayloadType;

/// Default transport profile for media sections
pub const DEFAULT_PROTOCOL: &str = "RTP/AVP";

/// An `a=rtpmap` attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpMapAttribute {
    /// RTP payload type
    pub payload_type: PayloadType,
    /// `<encoding>/<clock>[/<channels>]`
    pub encoding: String,
}

impl fmt::Display for RtpMapAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a=rtpmap:{} {}", self.payload_type, self.encoding)
    }
}

/// An `m=` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescription {
    pub media_type: MediaType,
    pub port: u16,
    pub protocol: String,
    /// Payload types offered, ascending
    pub formats: Vec<PayloadType>,
    pub rtpmaps: Vec<RtpMapAttribute>,
}

impl fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={} {} {}", self.media_type, self.port, self.protocol)?;
        for format in &self.formats {
            write!(f, " {}", format)?;
        }
        write!(f, "\r\n")?;
        for rtpmap in &self.rtpmaps {
            write!(f, "{}\r\n", rtpmap)?;
        }
        Ok(())
    }
}

/// Session description aggregating known stream metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Session version carried in the origin line
    pub version: u64,
    /// Session identifier carried in the origin line
    pub session_id: u64,
    pub session_name: String,
    pub origin_address: String,
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    /// Build a description from stream metadata.
    ///
    /// Streams are grouped by media kind (audio, video, application) and
    /// listed by ascending payload type inside each group.
    pub fn from_streams(version: u64, streams: impl IntoIterator<Item = StreamInfo>) -> Self {
        let mut streams: Vec<StreamInfo> = streams.into_iter().collect();
        streams.sort_by_key(|info| info.payload_type);

        let media = [MediaType::Audio, MediaType::Video, MediaType::Application]
            .into_iter()
            .filter_map(|media_type| {
                let group: Vec<&StreamInfo> =
                    streams.iter().filter(|info| info.media_type == media_type).collect();
                if group.is_empty() {
                    return None;
                }
                Some(MediaDescription {
                    media_type,
                    port: 0,
                    protocol: DEFAULT_PROTOCOL.to_string(),
                    formats: group.iter().map(|info| info.payload_type).collect(),
                    rtpmaps: group
                        .iter()
                        .map(|info| RtpMapAttribute {
                            payload_type: info.payload_type,
                            encoding: info.rtpmap(),
                        })
                        .collect(),
                })
            })
            .collect();

        Self {
            version,
            session_id: rand::random::<u32>() as u64,
            session_name: "-".to_string(),
            origin_address: "0.0.0.0".to_string(),
            media,
        }
    }

    /// Replace the generated session identifier
    pub fn with_session_id(mut self, session_id: u64) -> Self {
        self.session_id = session_id;
        self
    }

    /// Media section for a payload type, if present
    pub fn media_for(&self, payload_type: PayloadType) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.formats.contains(&payload_type))
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v=0\r\n")?;
        write!(
            f,
            "o=- {} {} IN IP4 {}\r\n",
            self.session_id, self.version, self.origin_address
        )?;
        write!(f, "s={}\r\n", self.session_name)?;
        write!(f, "t=0 0\r\n")?;
        for media in &self.media {
            write!(f, "{}", media)?;
        }
        Ok(())
    }
}
