//! Hooks that translate connector configs between the console and Kafka Connect.

pub mod mongo;

use serde::Deserialize;
use serde::Serialize;

/// Kafka Connect's answer to a config validation request.
#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub name:        String,
    pub error_count: i32,
    #[serde(default)]
    pub groups:      Vec<String>,
    #[serde(default)]
    pub configs:     Vec<ConfigDefinition>,
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDefinition {
    pub definition: ConfigDefinitionKey,
    pub value:      ConfigDefinitionValue,
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDefinitionKey {
    pub name:          String,
    #[serde(rename = "type")]
    pub kind:          String,
    pub default_value: String,
    pub importance:    String,
    pub required:      bool,
    pub display_name:  String,
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDefinitionValue {
    pub name:               String,
    pub value:              String,
    pub recommended_values: Vec<String>,
    pub visible:            bool,
    pub errors:             Vec<String>,
}

impl ConfigDefinition {
    /// An optional, visible, high-importance field with no default.
    pub fn optional_field(name: &str, kind: &str, display_name: &str) -> Self {
        ConfigDefinition {
            definition: ConfigDefinitionKey {
                name: name.to_owned(),
                kind: kind.to_owned(),
                default_value: String::new(),
                importance: "HIGH".to_owned(),
                required: false,
                display_name: display_name.to_owned(),
            },
            value: ConfigDefinitionValue {
                name: name.to_owned(),
                value: String::new(),
                recommended_values: vec![],
                visible: true,
                errors: vec![],
            },
        }
    }
}
