//! In-process implementations of the pipeline's collaborators.
//!
//! The real console plugs a schema-registry aware deserializer and a scripting filter in here. These
//! cover the plain encodings and are what `kafview replay` runs with.

use crate::configs::DeserializationOptions;
use crate::configs::EncodingHint;
use crate::interface::CanonicalSerializer;
use crate::interface::DeserializedRecord;
use crate::interface::FilterArguments;
use crate::interface::FilterOutcome;
use crate::interface::MessageFilter;
use crate::interface::RecordDeserializer;
use crate::message::DeserializedField;
use crate::message::DeserializedPayload;
use crate::message::PayloadEncoding;
use crate::message::TroubleshootReport;
use crate::record::RawRecord;
use serde_json::Value;
use std::convert::TryInto;

const WIRE_MAGIC_BYTE: u8 = 0;
const WIRE_HEADER_LEN: usize = 5;
const AUTO_DETECT_ORDER: [PayloadEncoding; 3] = [PayloadEncoding::Json, PayloadEncoding::Text, PayloadEncoding::Binary];

#[rustfmt::skip]
struct Decoded {
    encoding:   PayloadEncoding,
    payload:    DeserializedPayload,
    normalized: Vec<u8>,
    schema_id:  Option<u32>,
}

impl Decoded {
    fn plain(encoding: PayloadEncoding, payload: DeserializedPayload, normalized: &[u8]) -> Self {
        Decoded {
            encoding,
            payload,
            normalized: normalized.to_vec(),
            schema_id: None,
        }
    }
}

/// Decodes JSON, schema-registry framed JSON, text, unsigned integers and binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestEffortDeserializer;

#[async_trait]
impl RecordDeserializer for BestEffortDeserializer {
    async fn deserialize_record(&self, record: &RawRecord, options: &DeserializationOptions) -> DeserializedRecord {
        DeserializedRecord {
            key: deserialize_payload(&record.key, options.key_encoding, options),
            value: deserialize_payload(&record.value, options.value_encoding, options),
        }
    }
}

fn deserialize_payload(payload: &[u8], hint: EncodingHint, options: &DeserializationOptions) -> DeserializedField {
    let mut field = DeserializedField {
        size: payload.len(),
        ..DeserializedField::default()
    };
    if payload.is_empty() {
        return field;
    }
    if payload.len() > options.max_payload_size {
        field.encoding = PayloadEncoding::Binary;
        field.is_payload_too_large = true;
        return field;
    }
    if options.include_raw_data {
        field.raw_bytes = Some(payload.to_vec());
    }

    let attempts = match hint {
        Some(encoding) => vec![encoding, PayloadEncoding::Binary],
        None => AUTO_DETECT_ORDER.to_vec(),
    };
    for encoding in attempts {
        match decode(encoding, payload) {
            Ok(decoded) => {
                field.encoding = decoded.encoding;
                field.deserialized_payload = decoded.payload;
                field.normalized_payload = decoded.normalized;
                field.schema_id = decoded.schema_id;
                return field;
            },
            Err(message) => {
                if options.troubleshoot {
                    field.troubleshooting.push(TroubleshootReport {
                        serde_name: encoding.to_string(),
                        message,
                    });
                }
            },
        }
    }
    field
}

fn decode(encoding: PayloadEncoding, payload: &[u8]) -> Result<Decoded, String> {
    match encoding {
        PayloadEncoding::Json => decode_json(payload).map(|value| Decoded::plain(encoding, DeserializedPayload::Structured(value), payload)),
        PayloadEncoding::JsonSchema => {
            if payload.len() <= WIRE_HEADER_LEN || payload[0] != WIRE_MAGIC_BYTE {
                return Err("payload does not start with the schema registry wire header".to_owned());
            }
            let schema_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
            let body = &payload[WIRE_HEADER_LEN..];
            let value = decode_json(body)?;
            Ok(Decoded {
                encoding,
                payload: DeserializedPayload::Structured(value),
                normalized: body.to_vec(),
                schema_id: Some(schema_id),
            })
        },
        PayloadEncoding::Text | PayloadEncoding::Utf8 => match std::str::from_utf8(payload) {
            Ok(text) => Ok(Decoded::plain(encoding, DeserializedPayload::Text(text.to_owned()), payload)),
            Err(err) => Err(format!("payload is not valid UTF-8: {}", err)),
        },
        PayloadEncoding::Uint => {
            let number = match payload.len() {
                1 => payload[0] as u64,
                2 => u16::from_be_bytes(fixed(payload)?) as u64,
                4 => u32::from_be_bytes(fixed(payload)?) as u64,
                8 => u64::from_be_bytes(fixed(payload)?),
                n => return Err(format!("payload of {} bytes is not an unsigned integer", n)),
            };
            Ok(Decoded::plain(encoding, DeserializedPayload::Structured(Value::from(number)), number.to_string().as_bytes()))
        },
        PayloadEncoding::Binary => Ok(Decoded::plain(encoding, DeserializedPayload::Binary(payload.to_vec()), payload)),
        other => Err(format!("{} is not supported by the built-in deserializer", other)),
    }
}

fn decode_json(payload: &[u8]) -> Result<Value, String> {
    match payload.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => {},
        _ => return Err("payload does not start with { or [".to_owned()),
    }
    serde_json::from_slice(payload).map_err(|err| format!("invalid JSON: {}", err))
}

fn fixed<const N: usize>(payload: &[u8]) -> Result<[u8; N], String> { payload.try_into().map_err(|_| format!("expected {} bytes", N)) }

/// Writes structured values back as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCanonicalizer;

impl CanonicalSerializer for JsonCanonicalizer {
    fn to_canonical_bytes(&self, value: &Value) -> anyhow::Result<Vec<u8>> { Ok(serde_json::to_vec(value)?) }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl MessageFilter for AdmitAll {
    fn evaluate(&self, _args: &FilterArguments<'_>) -> FilterOutcome { FilterOutcome::admit() }
}

/// Adapts a closure into a [`MessageFilter`].
pub struct FnFilter<F>(F);

impl<F> FnFilter<F>
where
    F: Fn(&FilterArguments<'_>) -> FilterOutcome + Send + Sync,
{
    pub fn new(filter: F) -> Self { FnFilter(filter) }
}

impl<F> MessageFilter for FnFilter<F>
where
    F: Fn(&FilterArguments<'_>) -> FilterOutcome + Send + Sync,
{
    fn evaluate(&self, args: &FilterArguments<'_>) -> FilterOutcome { (self.0)(args) }
}
