//! Lifecycle traits implemented by an execution engine.

use async_trait::async_trait;

use crate::error::EngineError;
use crate::model::Environment;
use crate::types::{DiagnosticRecord, UnitId};

/// Factory for live simulation sessions.
///
/// The engine is stateless from the controller's point of view: every call
/// to [`Engine::construct`] yields a fresh, independent [`Session`]. Sessions
/// are never updated in place.
///
/// # Implementations
///
/// - **External**: adapter around the real chip engine
/// - **Reference**: `SimEngine` - deterministic interpreter used in tests
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// The session type produced by this engine.
    type Session: Session;

    /// Builds a new session from a validated environment.
    ///
    /// # Returns
    /// * `Ok(session)` - Environment accepted, units not yet initialized
    /// * `Err(EngineError::Rejected)` - Environment is structurally valid but
    ///   the engine cannot instantiate it (duplicate ids, dangling references)
    async fn construct(&self, env: &Environment) -> Result<Self::Session, EngineError>;

    /// Short engine name, used in log lines.
    fn name(&self) -> &str;
}

/// One instantiated simulation.
///
/// Exclusively owned by the session controller. Only one session is stepped
/// at a time, and it is never stepped before `initialize_units` returned
/// `Ok(true)`.
#[async_trait]
pub trait Session: Send + 'static {
    /// Prepares every unit for execution.
    ///
    /// Returns `Ok(false)` if the configuration is rejected at the unit level;
    /// the units' sandbox diagnostics explain why.
    async fn initialize_units(&mut self) -> Result<bool, EngineError>;

    /// Advances the simulation by one tick.
    ///
    /// Returns `Ok(false)` once no unit can make further progress.
    async fn step_once(&mut self) -> Result<bool, EngineError>;

    /// Encodes the present live state back into configuration form.
    ///
    /// Total: never fails, and the result is always encodable.
    fn snapshot(&self) -> Environment;

    /// Read-only view of the units, in ascending id order.
    fn units(&self) -> Vec<&dyn ExecutionUnit>;

    /// Mutable view of the units, in ascending id order.
    fn units_mut(&mut self) -> Vec<&mut dyn ExecutionUnit>;

    /// Ids of all units, in ascending order.
    fn unit_ids(&self) -> Vec<UnitId> {
        self.units().iter().map(|unit| unit.id()).collect()
    }
}

/// One chip's execution context ("runner").
///
/// Each unit carries two evaluation contexts: a sandbox pass that pre-checks
/// the program, and the live context advanced by `step_once`. Diagnostics
/// from both are queued until drained; draining consumes them.
pub trait ExecutionUnit: Send {
    /// Stable id assigned at configuration time.
    fn id(&self) -> UnitId;

    /// Program source executed by this unit.
    fn program(&self) -> &str;

    /// Index of the next line to execute in the live context.
    fn program_counter(&self) -> usize;

    /// True once the live context can no longer make progress.
    fn is_halted(&self) -> bool;

    /// Takes all pending sandbox diagnostics, oldest first.
    fn drain_sandbox_diagnostics(&mut self) -> Vec<DiagnosticRecord>;

    /// Takes all pending live diagnostics, oldest first.
    fn drain_live_diagnostics(&mut self) -> Vec<DiagnosticRecord>;
}
