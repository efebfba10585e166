use crate::configs::DeserializationOptions;
use crate::error::FilterError;
use crate::message::DeserializedField;
use crate::message::DeserializedPayload;
use crate::record::RawRecord;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeserializedRecord {
    pub key:   DeserializedField,
    pub value: DeserializedField,
}

/// Turns raw key/value bytes into encoding-tagged fields.
///
/// Implementations never fail: a payload that cannot be decoded still yields a best-effort field.
#[async_trait]
pub trait RecordDeserializer: Send + Sync {
    async fn deserialize_record(&self, record: &RawRecord, options: &DeserializationOptions) -> DeserializedRecord;
}

/// Read-only view of one record handed to the filter.
#[rustfmt::skip]
#[derive(Debug, Clone)]
pub struct FilterArguments<'a> {
    pub partition_id:    i32,
    pub offset:          i64,
    pub timestamp:       DateTime<Utc>,
    pub key:             &'a DeserializedPayload,
    pub value:           &'a DeserializedPayload,
    pub headers_by_key:  HashMap<&'a str, &'a [u8]>,
    pub key_schema_id:   Option<u32>,
    pub value_schema_id: Option<u32>,
}

/// Decision returned by a filter. `admit` is meaningful even when `error` is set.
#[rustfmt::skip]
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub admit: bool,
    pub key:   Option<Value>,
    pub value: Option<Value>,
    pub error: Option<FilterError>,
}

impl FilterOutcome {
    pub fn admit() -> Self {
        FilterOutcome {
            admit: true,
            ..FilterOutcome::default()
        }
    }

    pub fn reject() -> Self { FilterOutcome::default() }

    pub fn failed(admit: bool, error: FilterError) -> Self {
        FilterOutcome {
            admit,
            error: Some(error),
            ..FilterOutcome::default()
        }
    }

    pub fn with_key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

pub trait MessageFilter: Send + Sync {
    fn evaluate(&self, args: &FilterArguments<'_>) -> FilterOutcome;
}

pub trait CanonicalSerializer: Send + Sync {
    fn to_canonical_bytes(&self, value: &Value) -> anyhow::Result<Vec<u8>>;
}
