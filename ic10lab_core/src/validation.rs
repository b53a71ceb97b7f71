//! Validation Pipeline - codec + schema, without side effects
//! ===========================================================
//!
//! Used in two places:
//! - editor feedback on every edit ([`ValidationPipeline::validate`])
//! - the gate in front of `initialize` ([`ValidationPipeline::accept`])
//!
//! Both run the same sequence:
//!
//! ```text
//! text ──trim empty?──► nothing to validate (invalid, zero errors)
//!   │
//!   ├─ decode ──fail──► one Decode error
//!   │
//!   ├─ schema ──fail──► one Schema error per violated constraint
//!   │
//!   └─ typed conversion ──► Environment
//! ```

use std::sync::Arc;

use ic10lab_env::Environment;
use serde::Serialize;
use serde_json::Value;

use crate::codec::{self, DecodeError};
use crate::schema::{SchemaValidator, SchemaViolation};

/// Longest excerpt of an offending value quoted in a schema error.
const CONTEXT_LIMIT: usize = 60;

// =============================================================================
// VALIDATION ERROR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationErrorKind {
    /// Malformed YAML
    Decode,
    /// Well-formed but non-conforming document
    Schema,
}

/// A single problem found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,

    /// JSON pointer to the offending value (schema errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,

    /// Violated schema keyword
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    /// Excerpt of the offending decoded value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ValidationError {
    pub fn decode(err: &DecodeError) -> Self {
        Self {
            kind: ValidationErrorKind::Decode,
            message: err.message.clone(),
            path: None,
            line: err.line,
            column: err.column,
            keyword: None,
            context: None,
        }
    }

    pub fn schema(violation: SchemaViolation, document: &Value) -> Self {
        let context = document.pointer(&violation.path).map(excerpt);
        Self {
            kind: ValidationErrorKind::Schema,
            message: violation.message,
            path: Some(violation.path),
            line: None,
            column: None,
            keyword: Some(violation.keyword),
            context,
        }
    }

    /// Editor-facing one-line description.
    pub fn render(&self) -> String {
        match self.kind {
            ValidationErrorKind::Decode => {
                let mut line = format!("YAML Syntax Error: {}", self.message);
                if let (Some(l), Some(c)) = (self.line, self.column) {
                    line.push_str(&format!(" (line: {}, column: {})", l, c));
                }
                line
            }
            ValidationErrorKind::Schema => match self.path.as_deref() {
                Some(path) if !path.is_empty() => format!("{} at path \"{}\"", self.message, path),
                _ => self.message.clone(),
            },
        }
    }

    /// Terminal-facing description: [`render`](Self::render) plus the offending value.
    pub fn render_with_context(&self) -> String {
        match &self.context {
            Some(context) => format!("{} (found: {})", self.render(), context),
            None => self.render(),
        }
    }
}

fn excerpt(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= CONTEXT_LIMIT {
        return text;
    }
    let cut: String = text.chars().take(CONTEXT_LIMIT).collect();
    format!("{}...", cut)
}

// =============================================================================
// VALIDATION REPORT
// =============================================================================

/// Outcome of one validation pass. Transient; never cached across edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Decoded document, when decoding succeeded
    pub value: Option<Value>,
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// True when there was nothing to validate.
    pub fn is_empty_input(&self) -> bool {
        self.value.is_none() && self.errors.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        self.errors.iter().map(ValidationError::render).collect()
    }

    pub fn count(&self, kind: ValidationErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Codec + compiled schema, shared by the editor and the controller.
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    validator: Arc<SchemaValidator>,
}

impl ValidationPipeline {
    pub fn new(validator: Arc<SchemaValidator>) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &Arc<SchemaValidator> {
        &self.validator
    }

    /// Validates text without side effects.
    pub fn validate(&self, text: &str) -> ValidationReport {
        if text.trim().is_empty() {
            return ValidationReport::default();
        }

        let value = match codec::decode(text) {
            Ok(value) => value,
            Err(err) => {
                return ValidationReport {
                    value: None,
                    valid: false,
                    errors: vec![ValidationError::decode(&err)],
                }
            }
        };

        let outcome = self.validator.check(Some(&value));
        let errors = outcome
            .errors
            .into_iter()
            .map(|violation| ValidationError::schema(violation, &value))
            .collect();

        ValidationReport {
            value: Some(value),
            valid: outcome.valid,
            errors,
        }
    }

    /// Validates text and converts it into the typed model.
    ///
    /// An `Err` always carries at least one error: empty input is reported
    /// as a decode error here, since `initialize` has nothing to run.
    pub fn accept(&self, text: &str) -> Result<Environment, Vec<ValidationError>> {
        let report = self.validate(text);
        if report.is_empty_input() {
            return Err(vec![ValidationError::decode(&DecodeError::new(
                "configuration is empty",
            ))]);
        }
        if !report.valid {
            return Err(report.errors);
        }

        let value = report.value.unwrap_or(Value::Null);
        codec::to_environment(value).map_err(|e| {
            vec![ValidationError {
                kind: ValidationErrorKind::Schema,
                message: e.to_string(),
                path: Some(String::new()),
                line: None,
                column: None,
                keyword: None,
                context: None,
            }]
        })
    }
}
