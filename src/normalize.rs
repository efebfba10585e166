use crate::interface::CanonicalSerializer;
use crate::message::DeserializedField;
use crate::message::PayloadEncoding;
use serde_json::Value;

/// Encodings whose decoded form is a structured document that can be written back as JSON.
pub fn is_canonicalizable(encoding: PayloadEncoding) -> bool {
    matches!(
        encoding,
        PayloadEncoding::Json | PayloadEncoding::JsonSchema | PayloadEncoding::Protobuf | PayloadEncoding::ProtobufSchema | PayloadEncoding::Avro
    )
}

/// Replaces the normalized payload of `field` with the canonical form of a filter rewrite.
///
/// Returns whether the payload was replaced. A failed re-serialization keeps the previous payload.
pub fn normalize_field(field: &mut DeserializedField, rewritten: Option<&Value>, serializer: &dyn CanonicalSerializer) -> bool {
    let rewritten = match rewritten {
        Some(value) if !value.is_null() => value,
        _ => return false,
    };
    if !is_canonicalizable(field.encoding) {
        return false;
    }
    match serializer.to_canonical_bytes(rewritten) {
        Ok(bytes) => {
            field.normalized_payload = bytes;
            true
        },
        Err(err) => {
            trace!("keeping previous normalized payload: {}", err);
            false
        },
    }
}
