//! Common types for the engine abstraction.

use serde::{Deserialize, Serialize};

/// Stable identifier of an execution unit (the chip id).
///
/// Assigned in the environment description, never renumbered while a
/// session is alive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UnitId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// Which evaluation context produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSource {
    /// Static pre-flight pass, drained only at initialization
    Sandbox,

    /// Authoritative live execution, drained after every transition
    Live,
}

/// A message produced by one unit during initialization or a step.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Unit that produced the message
    pub unit_id: UnitId,

    /// Human-readable text
    pub message: String,

    /// Severity level
    pub severity: Severity,

    /// Producing context
    pub source: DiagnosticSource,
}

impl DiagnosticRecord {
    /// Creates a sandbox-context diagnostic.
    pub fn sandbox(unit_id: UnitId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            unit_id,
            message: message.into(),
            severity,
            source: DiagnosticSource::Sandbox,
        }
    }

    /// Creates a live-context diagnostic.
    pub fn live(unit_id: UnitId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            unit_id,
            message: message.into(),
            severity,
            source: DiagnosticSource::Live,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_ordering() {
        let mut ids = vec![UnitId(7), UnitId(1), UnitId(3)];
        ids.sort();
        assert_eq!(ids, vec![UnitId(1), UnitId(3), UnitId(7)]);
    }

    #[test]
    fn test_diagnostic_constructors_tag_source() {
        let sandbox = DiagnosticRecord::sandbox(UnitId(1), Severity::Warning, "unused label");
        let live = DiagnosticRecord::live(UnitId(1), Severity::Error, "division by zero");

        assert_eq!(sandbox.source, DiagnosticSource::Sandbox);
        assert_eq!(live.source, DiagnosticSource::Live);
        assert!(!sandbox.is_error());
        assert!(live.is_error());
    }

    #[test]
    fn test_unit_id_serializes_transparently() {
        let json = serde_json::to_string(&UnitId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
