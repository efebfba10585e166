use crate::record::RawRecord;
use crate::record::RecordHeader;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;
use strum::Display;
use strum::EnumString;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, EnumString, Display, Serialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum PayloadEncoding {
    #[default]
    None,
    Avro,
    Protobuf,
    ProtobufSchema,
    Json,
    JsonSchema,
    Xml,
    Smile,
    Utf8,
    Uint,
    Binary,
    MessagePack,
    Text,
    Cbor,
    ConsumerOffsets,
    Unknown,
}

/// Decoded form of a key or value. The shape depends on the encoding that produced it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum DeserializedPayload {
    #[default]
    Empty,
    /// JSON, Avro and Protobuf payloads decoded into a structured document.
    Structured(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl DeserializedPayload {
    pub fn is_empty(&self) -> bool { matches!(self, DeserializedPayload::Empty) }
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TroubleshootReport {
    pub serde_name: String,
    pub message:    String,
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeserializedField {
    pub encoding:             PayloadEncoding,
    pub schema_id:            Option<u32>,
    pub deserialized_payload: DeserializedPayload,
    #[serde(serialize_with = "bytes_as_text")]
    pub normalized_payload:   Vec<u8>,
    #[serde(serialize_with = "optional_bytes_as_text", skip_serializing_if = "Option::is_none")]
    pub raw_bytes:            Option<Vec<u8>>,
    pub size:                 usize,
    pub is_payload_too_large: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub troubleshooting:      Vec<TroubleshootReport>,
}

/// Key/value pair as shown to downstream consumers, one per raw header entry.
#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageHeader {
    pub key:   String,
    #[serde(serialize_with = "bytes_as_text")]
    pub value: Vec<u8>,
}

impl From<&RecordHeader> for MessageHeader {
    fn from(header: &RecordHeader) -> Self {
        MessageHeader {
            key: header.key.clone(),
            value: header.value.clone(),
        }
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMessage {
    pub partition_id:     i32,
    pub offset:           i64,
    /// Milliseconds since the unix epoch.
    pub timestamp:        i64,
    pub headers:          Vec<MessageHeader>,
    pub compression:      String,
    pub is_transactional: bool,
    pub key:              DeserializedField,
    pub value:            DeserializedField,
    pub is_message_ok:    bool,
    pub error_message:    String,
    pub message_size:     i64,
}

impl TopicMessage {
    /// Acknowledges a control record without exposing anything but its position.
    pub fn control(record: &RawRecord) -> Self {
        TopicMessage {
            partition_id: record.partition,
            offset: record.offset,
            timestamp: record.timestamp.timestamp_millis(),
            is_message_ok: false,
            message_size: record.size(),
            ..TopicMessage::default()
        }
    }
}

fn bytes_as_text<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

fn optional_bytes_as_text<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => bytes_as_text(bytes, serializer),
        None => serializer.serialize_none(),
    }
}
