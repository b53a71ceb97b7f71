//! Config Codec - YAML text <-> configuration value
//!
//! Decoding goes YAML text → `serde_yaml::Value` → `serde_json::Value`, so
//! the schema validator sees the same dynamic value regardless of how the
//! document was formatted. Encoding never reproduces the author's formatting;
//! it only guarantees semantic idempotence:
//!
//! ```text
//! decode(encode(decode(text))) == decode(text)
//! ```

use ic10lab_env::Environment;
use serde_json::Value;
use thiserror::Error;

/// Malformed structured text. Unrelated to schema conformance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,

    /// 1-based line of the offending token, when the parser reports one
    pub line: Option<usize>,

    /// 1-based column of the offending token
    pub column: Option<usize>,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    fn from_yaml(err: serde_yaml::Error) -> Self {
        let location = err.location();
        Self {
            message: err.to_string(),
            line: location.as_ref().map(|loc| loc.line()),
            column: location.as_ref().map(|loc| loc.column()),
        }
    }
}

/// A value could not be serialized back to text.
#[derive(Debug, Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

/// Decodes YAML text into a dynamic configuration value.
///
/// Fails on the first syntax error; no partial value is produced. Numbers
/// such as `.inf` or `.nan` have no JSON counterpart and are rejected.
pub fn decode(text: &str) -> Result<Value, DecodeError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(DecodeError::from_yaml)?;
    if let Some(number) = non_finite(&yaml) {
        return Err(DecodeError::new(format!("unsupported non-finite number {}", number)));
    }
    serde_json::to_value(yaml).map_err(|e| DecodeError::new(e.to_string()))
}

fn non_finite(value: &serde_yaml::Value) -> Option<f64> {
    match value {
        serde_yaml::Value::Number(number) => number.as_f64().filter(|n| !n.is_finite()),
        serde_yaml::Value::Sequence(items) => items.iter().find_map(non_finite),
        serde_yaml::Value::Mapping(map) => map
            .iter()
            .find_map(|(key, value)| non_finite(key).or_else(|| non_finite(value))),
        serde_yaml::Value::Tagged(tagged) => non_finite(&tagged.value),
        _ => None,
    }
}

/// Encodes a dynamic value as YAML text.
pub fn encode_value(value: &Value) -> Result<String, EncodeError> {
    serde_yaml::to_string(value).map_err(|e| EncodeError(e.to_string()))
}

/// Encodes a typed environment (a session snapshot) as YAML text.
///
/// `Environment` holds only strings, numbers and sequences, so this only
/// fails if the YAML emitter itself fails.
pub fn encode(env: &Environment) -> Result<String, EncodeError> {
    serde_yaml::to_string(env).map_err(|e| EncodeError(e.to_string()))
}

/// Converts a schema-checked dynamic value into the typed model.
pub fn to_environment(value: Value) -> Result<Environment, serde_json::Error> {
    serde_json::from_value(value)
}
