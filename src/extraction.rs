//! Extraction request/result types and the success gate applied to parsed payloads.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize};

/// Encoded image handed to the orchestrator for one scan
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
}

impl ExtractionRequest {
    pub fn new(image_bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            image_bytes: image_bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Build a request from base64 text, as sent by browser clients
    pub fn from_base64(data: &str, mime_type: impl Into<String>) -> Result<Self, base64::DecodeError> {
        let bytes = STANDARD.decode(data.trim())?;
        Ok(Self::new(bytes, mime_type))
    }

    pub fn base64(&self) -> String {
        STANDARD.encode(&self.image_bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

/// Fields read from a vehicle registration document.
///
/// Every field is optional: models answer `null` for anything they cannot read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub vin: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub plate_numbers: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub plate_letters: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_number: Option<String>,
}

/// Accepts strings and numbers; blank strings, booleans and nested values read as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl ExtractionResult {
    /// Convert a parsed JSON value; anything but an object is rejected
    pub fn from_value(value: serde_json::Value) -> Result<Self, String> {
        if !value.is_object() {
            return Err(format!("expected a JSON object, got {}", json_kind(&value)));
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    /// Number of fields that carry a value
    pub fn field_count(&self) -> usize {
        self.fields().iter().filter(|(_, v)| v.is_some()).count()
    }

    pub fn has_any_field(&self) -> bool {
        self.field_count() > 0
    }

    /// All fields with their wire names, in document order
    pub fn fields(&self) -> [(&'static str, Option<&str>); 9] {
        [
            ("vin", self.vin.as_deref()),
            ("brand", self.brand.as_deref()),
            ("model", self.model.as_deref()),
            ("year", self.year.as_deref()),
            ("color", self.color.as_deref()),
            ("plateNumbers", self.plate_numbers.as_deref()),
            ("plateLetters", self.plate_letters.as_deref()),
            ("customerName", self.customer_name.as_deref()),
            ("idNumber", self.id_number.as_deref()),
        ]
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// When a parsed payload counts as a successful attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessPolicy {
    /// Any JSON object is accepted, even if every field is null
    AnyParsedJson,
    /// At least one field must carry a value; all-null objects move on to the next provider
    #[default]
    RequireAnyField,
}

impl SuccessPolicy {
    pub fn accepts(&self, result: &ExtractionResult) -> bool {
        match self {
            SuccessPolicy::AnyParsedJson => true,
            SuccessPolicy::RequireAnyField => result.has_any_field(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessPolicy::AnyParsedJson => "any-parsed-json",
            SuccessPolicy::RequireAnyField => "require-any-field",
        }
    }
}

impl std::str::FromStr for SuccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any-parsed-json" | "any" => Ok(SuccessPolicy::AnyParsedJson),
            "require-any-field" | "require-field" => Ok(SuccessPolicy::RequireAnyField),
            other => Err(format!("unknown success policy '{}'", other)),
        }
    }
}
