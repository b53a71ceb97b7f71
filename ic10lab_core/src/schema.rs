//! Schema Validator - compiled JSON Schema checks for decoded environments
//!
//! The schema is loaded once per process (bundled or from a file), compiled
//! once, and shared behind an `Arc`. Checking is pure: it reads the value and
//! reports one [`SchemaViolation`] per violated constraint.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Environment schema compiled into the binary.
pub const BUNDLED_SCHEMA: &str = include_str!("../schema/environment.schema.json");

/// Errors loading or compiling a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema I/O error: {0}")]
    Io(String),

    #[error("Schema is not valid JSON: {0}")]
    Parse(String),

    #[error("Schema failed to compile: {0}")]
    Compile(String),
}

/// Where the environment schema comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaSource {
    /// The schema shipped with this crate
    #[default]
    Bundled,

    /// A JSON schema document on disk
    File(PathBuf),
}

impl SchemaSource {
    /// Reads and parses the schema document.
    pub fn load(&self) -> Result<Value, SchemaError> {
        let text = match self {
            SchemaSource::Bundled => BUNDLED_SCHEMA.to_string(),
            SchemaSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| SchemaError::Io(format!("{}: {}", path.display(), e)))?,
        };
        serde_json::from_str(&text).map_err(|e| SchemaError::Parse(e.to_string()))
    }
}

/// One violated schema constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Validator message, e.g. `"id" is a required property`
    pub message: String,

    /// JSON pointer to the offending value (`""` for the document root)
    pub path: String,

    /// Violated keyword (`required`, `type`, `minimum`, ...)
    pub keyword: String,
}

/// Result of checking one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaOutcome {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

/// A compiled schema.
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compiles a schema document.
    pub fn compile(schema: &Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Compiles the bundled environment schema.
    pub fn bundled() -> Result<Self, SchemaError> {
        Self::from_source(&SchemaSource::Bundled)
    }

    /// Loads and compiles a schema from the given source.
    pub fn from_source(source: &SchemaSource) -> Result<Self, SchemaError> {
        Self::compile(&source.load()?)
    }

    /// Checks a decoded value against the schema.
    ///
    /// Absent input (`None` or `null`) is "nothing to validate": the outcome
    /// is invalid with no errors.
    pub fn check(&self, value: Option<&Value>) -> SchemaOutcome {
        let value = match value {
            None | Some(Value::Null) => return SchemaOutcome::default(),
            Some(value) => value,
        };

        let errors: Vec<SchemaViolation> = self
            .validator
            .iter_errors(value)
            .map(|error| {
                let schema_path = error.schema_path.to_string();
                SchemaViolation {
                    message: error.to_string(),
                    path: error.instance_path.to_string(),
                    keyword: schema_path
                        .rsplit('/')
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                }
            })
            .collect();

        SchemaOutcome {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundled_schema_compiles() {
        assert!(SchemaValidator::bundled().is_ok());
    }

    #[test]
    fn test_valid_environment_passes() {
        let validator = SchemaValidator::bundled().unwrap();
        let outcome = validator.check(Some(&json!({
            "version": 1,
            "chips": [{ "id": 1, "code": "yield" }],
            "networks": [{ "id": "base", "type": "data" }]
        })));

        assert!(outcome.valid);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_missing_chip_id_reports_path() {
        let validator = SchemaValidator::bundled().unwrap();
        let outcome = validator.check(Some(&json!({
            "chips": [{ "id": 1 }, { "code": "yield" }]
        })));

        assert!(!outcome.valid);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].path, "/chips/1");
        assert_eq!(outcome.errors[0].keyword, "required");
    }

    #[test]
    fn test_one_error_per_violation() {
        let validator = SchemaValidator::bundled().unwrap();
        let outcome = validator.check(Some(&json!({
            "chips": [{ "code": 5 }],
            "networks": [{ "id": "base", "type": "steam" }]
        })));

        // missing chip id, code not a string, unknown network type
        assert_eq!(outcome.errors.len(), 3);
    }

    #[test]
    fn test_absent_input_is_invalid_without_errors() {
        let validator = SchemaValidator::bundled().unwrap();

        let outcome = validator.check(None);
        assert!(!outcome.valid);
        assert!(outcome.errors.is_empty());

        let outcome = validator.check(Some(&Value::Null));
        assert!(!outcome.valid);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_check_does_not_mutate_value() {
        let validator = SchemaValidator::bundled().unwrap();
        let value = json!({ "chips": [{ "code": "yield" }] });
        let before = value.clone();

        let _ = validator.check(Some(&value));
        assert_eq!(value, before);
    }

    #[test]
    fn test_missing_schema_file() {
        let source = SchemaSource::File(PathBuf::from("/definitely/not/here.json"));
        assert!(matches!(SchemaValidator::from_source(&source), Err(SchemaError::Io(_))));
    }
}
