use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

const COMPRESSION_MASK: u16 = 0b0000_0111;
const TRANSACTIONAL_BIT: u16 = 1 << 4;
const CONTROL_BIT: u16 = 1 << 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
    Unknown,
}

impl CompressionKind {
    pub fn from_codec(codec: u16) -> Self {
        match codec {
            0 => CompressionKind::None,
            1 => CompressionKind::Gzip,
            2 => CompressionKind::Snappy,
            3 => CompressionKind::Lz4,
            4 => CompressionKind::Zstd,
            _ => CompressionKind::Unknown,
        }
    }

    pub fn display_name(self) -> String { self.to_string() }
}

#[rustfmt::skip]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RecordAttrs {
    pub is_control:       bool,
    pub is_transactional: bool,
    pub compression:      CompressionKind,
}

impl RecordAttrs {
    /// Decodes the attribute field of a kafka record batch.
    pub fn from_batch_attributes(attrs: u16) -> Self {
        RecordAttrs {
            is_control: attrs & CONTROL_BIT != 0,
            is_transactional: attrs & TRANSACTIONAL_BIT != 0,
            compression: CompressionKind::from_codec(attrs & COMPRESSION_MASK),
        }
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key:   String,
    pub value: Vec<u8>,
}

/// A record as handed over by the upstream client. Never modified after it is received.
#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub partition: i32,
    pub offset:    i64,
    pub timestamp: DateTime<Utc>,
    pub key:       Vec<u8>,
    pub value:     Vec<u8>,
    pub headers:   Vec<RecordHeader>,
    pub attrs:     RecordAttrs,
}

impl RawRecord {
    pub fn size(&self) -> i64 { (self.key.len() + self.value.len()) as i64 }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Control,
    Data,
}

/// Control records carry transaction markers, never user payload. The attribute flags are trusted.
pub fn classify(record: &RawRecord) -> RecordKind {
    if record.attrs.is_control {
        RecordKind::Control
    } else {
        RecordKind::Data
    }
}
