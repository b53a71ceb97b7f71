//! Diagnostic aggregation and the terminal log.
//!
//! After every lifecycle transition the controller asks the
//! [`DiagnosticAggregator`] to drain the session's units. Units are visited in
//! ascending id order; within a unit, messages keep the order the unit
//! produced them. Sandbox messages are drained only at initialization, live
//! messages after initialization and every step.

use ic10lab_env::{DiagnosticRecord, DiagnosticSource, ExecutionUnit, Session};
use serde::Serialize;
use tracing::warn;

use crate::validation::{ValidationError, ValidationErrorKind};

/// Category of a controller-produced log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Decode,
    Schema,
    Engine,
    Usage,
    Storage,
}

impl From<ValidationErrorKind> for DiagnosticKind {
    fn from(kind: ValidationErrorKind) -> Self {
        match kind {
            ValidationErrorKind::Decode => DiagnosticKind::Decode,
            ValidationErrorKind::Schema => DiagnosticKind::Schema,
        }
    }
}

/// One immutable line of the terminal log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum LogEntry {
    /// Message produced by an execution unit
    Unit(DiagnosticRecord),

    /// Message produced by the controller itself
    Controller { kind: DiagnosticKind, message: String },
}

impl LogEntry {
    pub fn controller(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        LogEntry::Controller {
            kind,
            message: message.into(),
        }
    }

    pub fn from_validation(error: &ValidationError) -> Self {
        LogEntry::controller(error.kind.into(), error.render_with_context())
    }

    /// Terminal rendering, e.g. `> [chip: 1] division by zero`.
    pub fn render(&self) -> String {
        match self {
            LogEntry::Unit(record) => format!("> [chip: {}] {}", record.unit_id, record.message),
            LogEntry::Controller { message, .. } => format!("> {}", message),
        }
    }

    pub fn kind(&self) -> Option<DiagnosticKind> {
        match self {
            LogEntry::Unit(_) => None,
            LogEntry::Controller { kind, .. } => Some(*kind),
        }
    }
}

/// Append-only terminal log, bounded only by [`TerminalLog::clear`].
#[derive(Debug, Clone, Default)]
pub struct TerminalLog {
    entries: Vec<LogEntry>,
}

impl TerminalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.entries.extend(entries);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(LogEntry::render).collect()
    }

    /// Number of controller entries of the given kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|e| e.kind() == Some(kind)).count()
    }
}

/// Drains per-unit diagnostic streams in a deterministic order.
pub struct DiagnosticAggregator;

impl DiagnosticAggregator {
    /// Collects sandbox and live diagnostics after initialization.
    pub fn collect_initial<S: Session + ?Sized>(session: &mut S) -> Vec<LogEntry> {
        Self::collect(session, true)
    }

    /// Collects live diagnostics after a step.
    pub fn collect_step<S: Session + ?Sized>(session: &mut S) -> Vec<LogEntry> {
        Self::collect(session, false)
    }

    fn collect<S: Session + ?Sized>(session: &mut S, include_sandbox: bool) -> Vec<LogEntry> {
        let mut units = session.units_mut();
        units.sort_by_key(|unit| unit.id());

        let mut entries = Vec::new();
        for unit in units {
            if include_sandbox {
                let drained = unit.drain_sandbox_diagnostics();
                entries.extend(Self::stamp(&*unit, drained, DiagnosticSource::Sandbox));
            }
            let drained = unit.drain_live_diagnostics();
            entries.extend(Self::stamp(&*unit, drained, DiagnosticSource::Live));
        }
        entries
    }

    /// Tags records with the unit they were drained from.
    fn stamp(
        unit: &dyn ExecutionUnit,
        records: Vec<DiagnosticRecord>,
        source: DiagnosticSource,
    ) -> impl Iterator<Item = LogEntry> {
        let id = unit.id();
        records.into_iter().map(move |mut record| {
            if record.unit_id != id {
                warn!(
                    "diagnostic from unit {} claimed unit {}, re-tagging",
                    id, record.unit_id
                );
                record.unit_id = id;
            }
            record.source = source;
            LogEntry::Unit(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ic10lab_env::{EngineError, Environment, Severity, UnitId};

    struct FakeUnit {
        id: UnitId,
        sandbox: Vec<DiagnosticRecord>,
        live: Vec<DiagnosticRecord>,
    }

    impl ExecutionUnit for FakeUnit {
        fn id(&self) -> UnitId {
            self.id
        }
        fn program(&self) -> &str {
            ""
        }
        fn program_counter(&self) -> usize {
            0
        }
        fn is_halted(&self) -> bool {
            false
        }
        fn drain_sandbox_diagnostics(&mut self) -> Vec<DiagnosticRecord> {
            std::mem::take(&mut self.sandbox)
        }
        fn drain_live_diagnostics(&mut self) -> Vec<DiagnosticRecord> {
            std::mem::take(&mut self.live)
        }
    }

    struct FakeSession {
        units: Vec<FakeUnit>,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn initialize_units(&mut self) -> Result<bool, EngineError> {
            Ok(true)
        }
        async fn step_once(&mut self) -> Result<bool, EngineError> {
            Ok(true)
        }
        fn snapshot(&self) -> Environment {
            Environment::default()
        }
        fn units(&self) -> Vec<&dyn ExecutionUnit> {
            self.units.iter().map(|u| u as &dyn ExecutionUnit).collect()
        }
        fn units_mut(&mut self) -> Vec<&mut dyn ExecutionUnit> {
            // deliberately unsorted
            self.units.iter_mut().map(|u| u as &mut dyn ExecutionUnit).collect()
        }
    }

    fn session() -> FakeSession {
        let unit = |id: u32| FakeUnit {
            id: UnitId(id),
            sandbox: vec![DiagnosticRecord::sandbox(UnitId(id), Severity::Warning, format!("s{}", id))],
            live: vec![
                DiagnosticRecord::live(UnitId(id), Severity::Info, format!("l{}a", id)),
                DiagnosticRecord::live(UnitId(id), Severity::Info, format!("l{}b", id)),
            ],
        };
        FakeSession {
            units: vec![unit(5), unit(2)],
        }
    }

    #[test]
    fn test_initial_drain_orders_by_unit_then_source() {
        let mut session = session();
        let lines: Vec<String> = DiagnosticAggregator::collect_initial(&mut session)
            .iter()
            .map(LogEntry::render)
            .collect();

        assert_eq!(
            lines,
            vec![
                "> [chip: 2] s2",
                "> [chip: 2] l2a",
                "> [chip: 2] l2b",
                "> [chip: 5] s5",
                "> [chip: 5] l5a",
                "> [chip: 5] l5b",
            ]
        );
    }

    #[test]
    fn test_step_drain_skips_sandbox_and_drains_once() {
        let mut session = session();
        let first = DiagnosticAggregator::collect_step(&mut session);
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|e| matches!(
            e,
            LogEntry::Unit(DiagnosticRecord { source: DiagnosticSource::Live, .. })
        )));

        let second = DiagnosticAggregator::collect_step(&mut session);
        assert!(second.is_empty());

        // sandbox messages are still pending for a later initialize drain
        let initial = DiagnosticAggregator::collect_initial(&mut session);
        assert_eq!(initial.len(), 2);
    }

    #[test]
    fn test_mislabelled_record_is_retagged() {
        let mut session = FakeSession {
            units: vec![FakeUnit {
                id: UnitId(1),
                sandbox: Vec::new(),
                live: vec![DiagnosticRecord::live(UnitId(99), Severity::Error, "oops")],
            }],
        };
        let entries = DiagnosticAggregator::collect_step(&mut session);
        assert_eq!(entries[0].render(), "> [chip: 1] oops");
    }

    #[test]
    fn test_terminal_log_clear() {
        let mut log = TerminalLog::new();
        log.push(LogEntry::controller(DiagnosticKind::Usage, "not initialized"));
        assert_eq!(log.count(DiagnosticKind::Usage), 1);
        assert_eq!(log.lines(), vec!["> not initialized"]);

        log.clear();
        assert!(log.is_empty());
    }
}
