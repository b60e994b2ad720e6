use serde_json::{Map, Value as JsonValue};

use crate::error::RecordError;

/// One post as a source produced it: a loose JSON object whose keys follow
/// the private media shape (`code`, `pk`, `caption.text`,
/// `image_versions2.candidates`, `carousel_media`, `thumbnail_url`,
/// `taken_at`, `device_timestamp`). Every key is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPostRecord {
    fields: Map<String, JsonValue>,
}

impl RawPostRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only non-objects are rejected; missing keys are fine.
    pub fn from_value(value: JsonValue) -> Result<Self, RecordError> {
        match value {
            JsonValue::Object(fields) => Ok(Self { fields }),
            other => Err(RecordError::NotAnObject(kind_of(&other))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Non-empty string value for `key`, trimmed.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(JsonValue::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<JsonValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Builder form of [`set`](Self::set) used by the source adapters.
    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }
}

fn kind_of(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
