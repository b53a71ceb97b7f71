//! Session Controller - orchestrates validation, the engine and diagnostics.
//!
//! The controller is the single owner of every piece of derived state:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SessionController                       │
//! │                                                              │
//! │  initial_text ──edit()──► persisted (sled)                   │
//! │       │                                                      │
//! │       ▼ initialize()                                         │
//! │  ValidationPipeline ──► Engine::construct ──► Session        │
//! │                                                │             │
//! │                           step() ──────────────┤             │
//! │                                                ▼             │
//! │  current_text ◄── encode(snapshot)    DiagnosticAggregator   │
//! │                                                │             │
//! │  lifecycle: Idle|Loading|Ready|Faulted|Finished ▼             │
//! │                                           TerminalLog        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All actions take `&self`, so the controller can be shared behind an `Arc`.
//! At most one `initialize` or `step` is outstanding at a time; a call issued
//! while another is pending is rejected with one usage diagnostic.
//!
//! # Usage
//!
//! ```ignore
//! use ic10lab_core::{LabConfig, SessionController};
//! use ic10lab_sim::SimEngine;
//!
//! let controller = SessionController::open(SimEngine::new(), LabConfig::default())?;
//! controller.edit(yaml);
//! controller.load().await;
//! controller.step().await;
//! for line in controller.log_lines() {
//!     println!("{}", line);
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ic10lab_env::{Engine, Environment, ExecutionUnit, Session, UnitId};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::LabConfig;
use crate::diagnostics::{DiagnosticAggregator, DiagnosticKind, LogEntry, TerminalLog};
use crate::error::{LabError, UsageError};
use crate::schema::SchemaValidator;
use crate::store::EditorStore;
use crate::validation::{ValidationPipeline, ValidationReport};

/// Lifecycle of the controller's live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Nothing initialized yet
    Idle,
    /// An `initialize` call is in flight
    Loading,
    /// A live session can be stepped
    Ready,
    /// The last initialize or step failed
    Faulted,
    /// The session reported that no unit can make progress
    Finished,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Loading => "loading",
            LifecycleState::Ready => "ready",
            LifecycleState::Faulted => "faulted",
            LifecycleState::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Read-only view of one execution unit, for tab rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitView {
    pub id: UnitId,
    pub program: String,
    pub program_counter: usize,
    pub halted: bool,
}

impl UnitView {
    fn of(unit: &dyn ExecutionUnit) -> Self {
        Self {
            id: unit.id(),
            program: unit.program().to_string(),
            program_counter: unit.program_counter(),
            halted: unit.is_halted(),
        }
    }
}

fn unit_views<S: Session + ?Sized>(session: &S) -> Vec<UnitView> {
    let mut views: Vec<UnitView> = session.units().into_iter().map(UnitView::of).collect();
    views.sort_by_key(|view| view.id);
    views
}

/// Derived state, guarded by a short-lived lock that is never held across an await.
#[derive(Debug)]
struct ControllerState {
    initial_text: String,
    current_text: String,
    lifecycle: LifecycleState,
    log: TerminalLog,
    units: Vec<UnitView>,
    ticks: u64,
    in_flight: bool,
}

impl ControllerState {
    fn new(initial_text: String) -> Self {
        Self {
            initial_text,
            current_text: String::new(),
            lifecycle: LifecycleState::Idle,
            log: TerminalLog::new(),
            units: Vec::new(),
            ticks: 0,
            in_flight: false,
        }
    }

    fn usage(&mut self, err: UsageError) {
        debug!("rejected: {}", err);
        self.log
            .push(LogEntry::controller(DiagnosticKind::Usage, err.to_string()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Initialize,
    Step,
}

/// Marks an `initialize` or `step` as outstanding.
///
/// Dropping it without completion (the caller dropped the future) faults the
/// controller, since the live session may no longer match `current_text`.
struct InFlight<'a> {
    state: &'a Mutex<ControllerState>,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        if !self.done {
            warn!("call abandoned before completion");
            state.lifecycle = LifecycleState::Faulted;
            state.usage(UsageError::Abandoned);
        }
    }
}

/// Owns the live session and every piece of state derived from it.
pub struct SessionController<E: Engine> {
    engine: E,
    pipeline: ValidationPipeline,
    store: Option<EditorStore>,
    config: LabConfig,
    state: Mutex<ControllerState>,
    session: tokio::sync::Mutex<Option<E::Session>>,
}

impl<E: Engine> SessionController<E> {
    /// Creates a controller with default configuration and no persistence.
    pub fn new(engine: E, validator: Arc<SchemaValidator>) -> Self {
        Self {
            engine,
            pipeline: ValidationPipeline::new(validator),
            store: None,
            config: LabConfig::default(),
            state: Mutex::new(ControllerState::new(String::new())),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Creates a controller from a configuration: compiles the schema once and
    /// restores the persisted editor text, if a store path is configured.
    pub fn open(engine: E, config: LabConfig) -> Result<Self, LabError> {
        let validator = Arc::new(SchemaValidator::from_source(&config.schema)?);
        let store = match &config.store_path {
            Some(path) => Some(EditorStore::open(path)?),
            None => None,
        };

        let mut controller = Self::new(engine, validator);
        controller.config = config;
        if let Some(store) = store {
            controller = controller.with_store(store)?;
        }
        Ok(controller)
    }

    /// Attaches a store and restores the editor text from it.
    pub fn with_store(mut self, store: EditorStore) -> Result<Self, LabError> {
        if let Some(text) = store.load()? {
            info!("restored persisted editor text ({} bytes)", text.len());
            self.lock_state().initial_text = text;
        }
        self.store = Some(store);
        Ok(self)
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // READ-ONLY VIEW
    // =========================================================================

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The editable configuration text.
    pub fn initial_text(&self) -> String {
        self.lock_state().initial_text.clone()
    }

    /// Serialization of the live session's present state.
    pub fn current_text(&self) -> String {
        self.lock_state().current_text.clone()
    }

    /// The current text decoded back into the typed model.
    pub fn current_environment(&self) -> Option<Environment> {
        let text = self.current_text();
        if text.is_empty() {
            return None;
        }
        codec::decode(&text)
            .ok()
            .and_then(|value| codec::to_environment(value).ok())
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lock_state().lifecycle
    }

    /// True while an `initialize` or `step` is outstanding.
    pub fn is_busy(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Ticks executed by the current session.
    pub fn ticks(&self) -> u64 {
        self.lock_state().ticks
    }

    pub fn units(&self) -> Vec<UnitView> {
        self.lock_state().units.clone()
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.lock_state().log.entries().to_vec()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.lock_state().log.lines()
    }

    /// Number of controller log entries of the given kind.
    pub fn log_count(&self, kind: DiagnosticKind) -> usize {
        self.lock_state().log.count(kind)
    }

    /// Side-effect-free editor feedback.
    pub fn validate(&self, text: &str) -> ValidationReport {
        self.pipeline.validate(text)
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Replaces the editable text. Never touches the session or the lifecycle.
    pub fn edit(&self, text: impl Into<String>) {
        let text = text.into();
        let persisted = self.store.as_ref().map(|store| store.save(&text));

        let mut state = self.lock_state();
        state.initial_text = text;
        if let Some(Err(err)) = persisted {
            warn!("failed to persist editor text: {}", err);
            state
                .log
                .push(LogEntry::controller(DiagnosticKind::Storage, err.to_string()));
        }
    }

    /// Empties the terminal log.
    pub fn clear_log(&self) {
        self.lock_state().log.clear();
    }

    fn begin(&self, call: Call) -> Option<InFlight<'_>> {
        let mut state = self.lock_state();
        let lifecycle = state.lifecycle;

        if call == Call::Step && lifecycle != LifecycleState::Ready {
            state.usage(UsageError::NotInitialized(lifecycle));
            return None;
        }
        if state.in_flight {
            state.usage(UsageError::Busy);
            return None;
        }

        state.in_flight = true;
        if call == Call::Initialize {
            state.lifecycle = LifecycleState::Loading;
        }
        Some(InFlight {
            state: &self.state,
            done: false,
        })
    }

    fn finish(
        &self,
        guard: &mut InFlight<'_>,
        apply: impl FnOnce(&mut ControllerState),
    ) -> LifecycleState {
        let mut state = self.lock_state();
        apply(&mut state);
        guard.done = true;
        state.lifecycle
    }

    /// Validates `text` and replaces the live session with a new one built from it.
    ///
    /// Decode and schema failures leave the prior session and the current
    /// text untouched; the lifecycle becomes `Faulted` until the next
    /// successful initialize.
    pub async fn initialize(&self, text: &str) -> LifecycleState {
        let Some(mut guard) = self.begin(Call::Initialize) else {
            return self.lifecycle();
        };
        info!("initializing session on engine '{}'", self.engine.name());

        let env = match self.pipeline.accept(text) {
            Ok(env) => env,
            Err(errors) => {
                warn!("configuration rejected: {} validation error(s)", errors.len());
                let entries: Vec<LogEntry> = errors.iter().map(LogEntry::from_validation).collect();
                return self.finish(&mut guard, |state| {
                    state.log.extend(entries);
                    state.lifecycle = LifecycleState::Faulted;
                });
            }
        };

        let mut candidate = match self.engine.construct(&env).await {
            Ok(session) => session,
            Err(err) => {
                error!("engine failed to construct session: {}", err);
                return self.finish(&mut guard, |state| {
                    state
                        .log
                        .push(LogEntry::controller(DiagnosticKind::Engine, err.to_string()));
                    state.lifecycle = LifecycleState::Faulted;
                });
            }
        };

        let accepted = candidate.initialize_units().await;
        let mut entries = DiagnosticAggregator::collect_initial(&mut candidate);

        let failure = match accepted {
            Ok(true) => None,
            Ok(false) => Some("Engine rejected environment at unit level".to_string()),
            Err(err) => Some(err.to_string()),
        };
        if let Some(message) = failure {
            error!("unit initialization failed: {}", message);
            entries.push(LogEntry::controller(DiagnosticKind::Engine, message));
            return self.finish(&mut guard, |state| {
                state.log.extend(entries);
                state.lifecycle = LifecycleState::Faulted;
            });
        }

        let current = match codec::encode(&candidate.snapshot()) {
            Ok(text) => text,
            Err(err) => {
                error!("snapshot could not be encoded: {}", err);
                entries.push(LogEntry::controller(DiagnosticKind::Engine, err.to_string()));
                return self.finish(&mut guard, |state| {
                    state.log.extend(entries);
                    state.lifecycle = LifecycleState::Faulted;
                });
            }
        };
        let units = unit_views(&candidate);

        // The prior session is dropped here, after its replacement is complete.
        *self.session.lock().await = Some(candidate);

        info!("session ready with {} unit(s)", units.len());
        self.finish(&mut guard, |state| {
            state.current_text = current;
            state.units = units;
            state.ticks = 0;
            state.log.extend(entries);
            state.lifecycle = LifecycleState::Ready;
        })
    }

    /// Advances the live session by one tick.
    ///
    /// Outside `Ready` this is a no-op that logs one usage diagnostic.
    pub async fn step(&self) -> LifecycleState {
        let Some(mut guard) = self.begin(Call::Step) else {
            return self.lifecycle();
        };

        let mut slot = self.session.lock().await;
        let Some(session) = slot.as_mut() else {
            error!("ready without a live session");
            return self.finish(&mut guard, |state| {
                state.log.push(LogEntry::controller(
                    DiagnosticKind::Engine,
                    "No live session to step",
                ));
                state.lifecycle = LifecycleState::Faulted;
            });
        };

        match session.step_once().await {
            Ok(progress) => {
                let entries = DiagnosticAggregator::collect_step(&mut *session);
                let snapshot = codec::encode(&session.snapshot());
                let units = unit_views(&*session);

                self.finish(&mut guard, |state| {
                    state.log.extend(entries);
                    state.ticks += 1;
                    match snapshot {
                        Ok(text) => {
                            state.current_text = text;
                            state.units = units;
                            state.lifecycle = if progress {
                                LifecycleState::Ready
                            } else {
                                info!("session finished after {} tick(s)", state.ticks);
                                LifecycleState::Finished
                            };
                        }
                        Err(err) => {
                            error!("snapshot could not be encoded: {}", err);
                            state
                                .log
                                .push(LogEntry::controller(DiagnosticKind::Engine, err.to_string()));
                            state.lifecycle = LifecycleState::Faulted;
                        }
                    }
                })
            }
            Err(err) => {
                error!("step failed: {}", err);
                let entries = DiagnosticAggregator::collect_step(&mut *session);
                self.finish(&mut guard, |state| {
                    state.log.extend(entries);
                    state
                        .log
                        .push(LogEntry::controller(DiagnosticKind::Engine, err.to_string()));
                    state.lifecycle = LifecycleState::Faulted;
                })
            }
        }
    }

    /// Clears the log and initializes from the editable text.
    pub async fn load(&self) -> LifecycleState {
        self.clear_log();
        let text = self.initial_text();
        self.initialize(&text).await
    }

    /// Adopts the live state as the new editable text and re-initializes from it.
    pub async fn promote_current(&self) -> LifecycleState {
        let current = self.current_text();
        {
            let mut state = self.lock_state();
            if state.in_flight {
                state.usage(UsageError::Busy);
                return state.lifecycle;
            }
            if current.trim().is_empty() {
                state.usage(UsageError::NothingToPromote);
                return state.lifecycle;
            }
        }

        self.edit(current.clone());
        self.clear_log();
        self.initialize(&current).await
    }

    /// Steps while `Ready`, at most `max_steps` times (default: `config.max_run_steps`).
    ///
    /// Returns the number of ticks executed.
    pub async fn run(&self, max_steps: Option<u64>) -> u64 {
        let limit = max_steps.unwrap_or(self.config.max_run_steps);
        let mut executed = 0;
        while executed < limit && self.lifecycle() == LifecycleState::Ready && !self.is_busy() {
            self.step().await;
            executed += 1;
        }
        debug!("run executed {} tick(s)", executed);
        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ic10lab_env::{DiagnosticRecord, EngineError, Register, Severity};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    // =========================================================================
    // SCRIPTED ENGINE
    // =========================================================================

    #[derive(Default, Clone)]
    struct ScriptedEngine {
        reject: Arc<AtomicBool>,
        refuse_units: bool,
        fail_step_at: Option<u64>,
        finish_at: Option<u64>,
        hang_on_step: bool,
    }

    struct ScriptedUnit {
        id: UnitId,
        sandbox: Vec<DiagnosticRecord>,
        live: Vec<DiagnosticRecord>,
    }

    impl ExecutionUnit for ScriptedUnit {
        fn id(&self) -> UnitId {
            self.id
        }
        fn program(&self) -> &str {
            "scripted"
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

    struct ScriptedSession {
        script: ScriptedEngine,
        env: Environment,
        units: Vec<ScriptedUnit>,
        counter: u64,
    }

    fn scripted_snapshot(env: &Environment, counter: u64) -> Environment {
        let mut env = env.clone();
        for chip in &mut env.chips {
            chip.registers = vec![Register {
                name: "r0".into(),
                value: counter as f64,
            }];
        }
        env
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        type Session = ScriptedSession;

        async fn construct(&self, env: &Environment) -> Result<ScriptedSession, EngineError> {
            tokio::task::yield_now().await;
            if self.reject.load(Ordering::SeqCst) {
                return Err(EngineError::rejected("scripted rejection"));
            }
            let units = env
                .chips
                .iter()
                .map(|chip| ScriptedUnit {
                    id: chip.id,
                    sandbox: vec![DiagnosticRecord::sandbox(chip.id, Severity::Info, "precheck ok")],
                    live: Vec::new(),
                })
                .collect();
            Ok(ScriptedSession {
                script: self.clone(),
                env: env.clone(),
                units,
                counter: 0,
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn initialize_units(&mut self) -> Result<bool, EngineError> {
            Ok(!self.script.refuse_units)
        }

        async fn step_once(&mut self) -> Result<bool, EngineError> {
            if self.script.hang_on_step {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            self.counter += 1;
            if self.script.fail_step_at == Some(self.counter) {
                return Err(EngineError::fault(UnitId(1), "scripted fault"));
            }
            for unit in &mut self.units {
                let message = format!("tick {}", self.counter);
                unit.live.push(DiagnosticRecord::live(unit.id, Severity::Info, message));
            }
            Ok(self.script.finish_at.map_or(true, |end| self.counter < end))
        }

        fn snapshot(&self) -> Environment {
            scripted_snapshot(&self.env, self.counter)
        }

        fn units(&self) -> Vec<&dyn ExecutionUnit> {
            self.units.iter().map(|u| u as &dyn ExecutionUnit).collect()
        }

        fn units_mut(&mut self) -> Vec<&mut dyn ExecutionUnit> {
            self.units.iter_mut().map(|u| u as &mut dyn ExecutionUnit).collect()
        }
    }

    const TWO_CHIPS: &str = "chips:\n  - id: 2\n    code: yield\n  - id: 1\n    code: yield\n";

    fn controller(script: ScriptedEngine) -> SessionController<ScriptedEngine> {
        SessionController::new(script, Arc::new(SchemaValidator::bundled().unwrap()))
    }

    fn r0(controller: &SessionController<ScriptedEngine>) -> f64 {
        controller.current_environment().unwrap().chips[0].register("r0")
    }

    // =========================================================================
    // TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_initialize_success() {
        let controller = controller(ScriptedEngine::default());
        let state = controller.initialize(TWO_CHIPS).await;

        assert_eq!(state, LifecycleState::Ready);
        assert!(!controller.is_busy());

        let accepted = controller.pipeline.accept(TWO_CHIPS).unwrap();
        let expected = codec::encode(&scripted_snapshot(&accepted, 0)).unwrap();
        assert_eq!(controller.current_text(), expected);

        let ids: Vec<UnitId> = controller.units().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![UnitId(1), UnitId(2)]);

        // sandbox diagnostics drained in ascending unit order
        assert_eq!(
            controller.log_lines(),
            vec!["> [chip: 1] precheck ok", "> [chip: 2] precheck ok"]
        );
    }

    #[tokio::test]
    async fn test_edit_never_touches_lifecycle_or_session() {
        let controller = controller(ScriptedEngine::default());
        controller.initialize(TWO_CHIPS).await;
        let current = controller.current_text();

        controller.edit("not: [valid");
        assert_eq!(controller.initial_text(), "not: [valid");
        assert_eq!(controller.lifecycle(), LifecycleState::Ready);
        assert_eq!(controller.current_text(), current);
    }

    #[tokio::test]
    async fn test_step_when_idle_is_noop_with_one_diagnostic() {
        let controller = controller(ScriptedEngine::default());
        let state = controller.step().await;

        assert_eq!(state, LifecycleState::Idle);
        assert_eq!(controller.current_text(), "");
        assert_eq!(controller.log_count(DiagnosticKind::Usage), 1);
        assert_eq!(controller.log_lines(), vec!["> Not initialized (state: idle)"]);
    }

    #[tokio::test]
    async fn test_step_refreshes_current_text() {
        let controller = controller(ScriptedEngine::default());
        controller.initialize(TWO_CHIPS).await;
        controller.clear_log();

        for expected in 1..=3 {
            assert_eq!(controller.step().await, LifecycleState::Ready);
            assert_eq!(r0(&controller), expected as f64);
        }
        assert_eq!(controller.ticks(), 3);

        // live diagnostics drained once per step, unit order stable
        let lines = controller.log_lines();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "> [chip: 1] tick 1");
        assert_eq!(lines[1], "> [chip: 2] tick 1");
        assert_eq!(lines[5], "> [chip: 2] tick 3");
    }

    #[tokio::test]
    async fn test_finished_still_refreshes_then_rejects_steps() {
        let controller = controller(ScriptedEngine {
            finish_at: Some(2),
            ..Default::default()
        });
        controller.initialize(TWO_CHIPS).await;

        assert_eq!(controller.step().await, LifecycleState::Ready);
        assert_eq!(controller.step().await, LifecycleState::Finished);
        assert_eq!(r0(&controller), 2.0);

        let current = controller.current_text();
        controller.clear_log();
        assert_eq!(controller.step().await, LifecycleState::Finished);
        assert_eq!(controller.current_text(), current);
        assert_eq!(controller.log_lines(), vec!["> Not initialized (state: finished)"]);
    }

    #[tokio::test]
    async fn test_step_error_keeps_last_good_snapshot() {
        let controller = controller(ScriptedEngine {
            fail_step_at: Some(2),
            ..Default::default()
        });
        controller.initialize(TWO_CHIPS).await;
        controller.step().await;
        let good = controller.current_text();
        controller.clear_log();

        assert_eq!(controller.step().await, LifecycleState::Faulted);
        assert_eq!(controller.current_text(), good);
        assert_eq!(controller.log_count(DiagnosticKind::Engine), 1);
        assert_eq!(controller.log_lines(), vec!["> [chip: 1] scripted fault"]);

        // a fresh initialize is always accepted
        assert_eq!(controller.initialize(TWO_CHIPS).await, LifecycleState::Ready);
        assert_eq!(controller.ticks(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_faults() {
        let controller = controller(ScriptedEngine::default());
        let state = controller.initialize("chips: [\n  - id: 1\n").await;

        assert_eq!(state, LifecycleState::Faulted);
        assert_eq!(controller.log_count(DiagnosticKind::Decode), 1);
        assert!(controller.log_lines()[0].starts_with("> YAML Syntax Error:"));
        assert!(controller.units().is_empty());
    }

    #[tokio::test]
    async fn test_schema_failure_leaves_prior_session_untouched() {
        let controller = controller(ScriptedEngine::default());
        controller.initialize(TWO_CHIPS).await;
        controller.step().await;
        let current = controller.current_text();
        let units = controller.units();
        controller.clear_log();

        let bad = "chips:\n  - code: yield\n  - id: 4\n  - code: yield\n";
        assert_eq!(controller.initialize(bad).await, LifecycleState::Faulted);

        assert_eq!(controller.log_count(DiagnosticKind::Schema), 2);
        assert_eq!(controller.log_lines().len(), 2);
        assert!(controller.log_lines()[0].contains("at path \"/chips/0\""));
        assert_eq!(controller.current_text(), current);
        assert_eq!(controller.units(), units);
    }

    #[tokio::test]
    async fn test_construction_rejection_then_retry() {
        let script = ScriptedEngine::default();
        script.reject.store(true, Ordering::SeqCst);
        let controller = controller(script.clone());

        assert_eq!(controller.initialize(TWO_CHIPS).await, LifecycleState::Faulted);
        assert_eq!(controller.log_count(DiagnosticKind::Engine), 1);
        assert!(controller.log_lines()[0].contains("scripted rejection"));

        script.reject.store(false, Ordering::SeqCst);
        assert_eq!(controller.initialize(TWO_CHIPS).await, LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_unit_level_refusal_reports_sandbox_diagnostics() {
        let controller = controller(ScriptedEngine {
            refuse_units: true,
            ..Default::default()
        });

        assert_eq!(controller.initialize(TWO_CHIPS).await, LifecycleState::Faulted);
        assert_eq!(
            controller.log_lines(),
            vec![
                "> [chip: 1] precheck ok",
                "> [chip: 2] precheck ok",
                "> Engine rejected environment at unit level",
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_log_keeps_lifecycle() {
        let controller = controller(ScriptedEngine::default());
        controller.step().await;
        controller.clear_log();
        assert!(controller.log_lines().is_empty());
        assert_eq!(controller.lifecycle(), LifecycleState::Idle);

        controller.initialize(TWO_CHIPS).await;
        controller.clear_log();
        assert!(controller.log_lines().is_empty());
        assert_eq!(controller.lifecycle(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_step_is_rejected() {
        let controller = controller(ScriptedEngine::default());
        controller.initialize(TWO_CHIPS).await;
        controller.clear_log();

        let (first, second) = tokio::join!(controller.step(), controller.step());
        assert_eq!(first, LifecycleState::Ready);
        assert_eq!(second, LifecycleState::Ready);
        assert_eq!(controller.ticks(), 1);
        assert_eq!(controller.log_count(DiagnosticKind::Usage), 1);
        assert!(controller
            .log_lines()
            .contains(&"> Busy: another initialize or step is still running".to_string()));
    }

    #[tokio::test]
    async fn test_step_while_loading_is_rejected() {
        let controller = controller(ScriptedEngine::default());

        let (init, step) = tokio::join!(controller.initialize(TWO_CHIPS), controller.step());
        assert_eq!(init, LifecycleState::Ready);
        assert_eq!(step, LifecycleState::Loading);
        assert!(controller
            .log_lines()
            .contains(&"> Not initialized (state: loading)".to_string()));
        assert_eq!(controller.ticks(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_step_faults_and_releases() {
        let controller = controller(ScriptedEngine {
            hang_on_step: true,
            ..Default::default()
        });
        controller.initialize(TWO_CHIPS).await;

        let result = tokio::time::timeout(Duration::from_millis(20), controller.step()).await;
        assert!(result.is_err());
        assert!(!controller.is_busy());
        assert_eq!(controller.lifecycle(), LifecycleState::Faulted);
        assert!(controller
            .log_lines()
            .contains(&"> Call abandoned before completion".to_string()));
    }

    #[tokio::test]
    async fn test_run_stops_at_finished() {
        let controller = controller(ScriptedEngine {
            finish_at: Some(3),
            ..Default::default()
        });
        controller.initialize(TWO_CHIPS).await;

        assert_eq!(controller.run(None).await, 3);
        assert_eq!(controller.lifecycle(), LifecycleState::Finished);
    }

    #[tokio::test]
    async fn test_run_respects_limit() {
        let controller = controller(ScriptedEngine::default());
        controller.initialize(TWO_CHIPS).await;

        assert_eq!(controller.run(Some(4)).await, 4);
        assert_eq!(controller.lifecycle(), LifecycleState::Ready);
        assert_eq!(r0(&controller), 4.0);
    }

    #[tokio::test]
    async fn test_promote_current() {
        let controller = controller(ScriptedEngine::default());
        controller.edit(TWO_CHIPS);
        controller.load().await;
        controller.run(Some(2)).await;
        let live = controller.current_text();

        assert_eq!(controller.promote_current().await, LifecycleState::Ready);
        assert_eq!(controller.initial_text(), live);
        assert_eq!(controller.ticks(), 0);
        assert_eq!(controller.log_lines().len(), 2);
    }

    #[tokio::test]
    async fn test_promote_without_session() {
        let controller = controller(ScriptedEngine::default());
        assert_eq!(controller.promote_current().await, LifecycleState::Idle);
        assert_eq!(controller.log_count(DiagnosticKind::Usage), 1);
    }

    #[tokio::test]
    async fn test_edit_persists_across_controllers() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = LabConfig::default().with_store_path(temp_dir.path().join("editor"));
        {
            let controller = SessionController::open(ScriptedEngine::default(), config.clone()).unwrap();
            controller.edit(TWO_CHIPS);
        }
        {
            let controller = SessionController::open(ScriptedEngine::default(), config).unwrap();
            assert_eq!(controller.initial_text(), TWO_CHIPS);
            assert_eq!(controller.lifecycle(), LifecycleState::Idle);
            assert_eq!(controller.load().await, LifecycleState::Ready);
        }
    }
}
