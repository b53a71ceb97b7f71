//! ic10lab Engine Abstraction Layer
//!
//! This crate provides the narrow seam between the ic10lab orchestration
//! layer and whatever execution engine actually runs the chips. The
//! controller in `ic10lab_core` never interprets programs itself; it only
//! drives an [`Engine`] through a small lifecycle:
//!
//! - `construct()` a [`Session`] from a typed [`Environment`]
//! - `initialize_units()` once
//! - `step_once()` repeatedly, re-reading `snapshot()` after each tick
//! - drain per-unit diagnostics from each [`ExecutionUnit`]
//!
//! Implementations:
//!
//! - **External**: a production engine wrapped behind these traits
//! - **Reference**: `ic10lab_sim::SimEngine`, a deterministic engine used by
//!   tests and the CLI
//!
//! # Example
//!
//! ```ignore
//! use ic10lab_env::{Engine, Session};
//!
//! async fn run_to_end<E: Engine>(engine: &E, env: &Environment) -> Result<(), EngineError> {
//!     let mut session = engine.construct(env).await?;
//!     if !session.initialize_units().await? {
//!         return Ok(());
//!     }
//!     while session.step_once().await? {}
//!     println!("{:?}", session.snapshot());
//!     Ok(())
//! }
//! ```

mod engine;
mod error;
mod model;
mod types;

pub use engine::{Engine, ExecutionUnit, Session};
pub use error::EngineError;
pub use model::{
    Chip, Device, Environment, Network, NetworkKind, Port, Prop, Reagent, Register, Slot,
    DEFAULT_REGISTER_LENGTH, DEFAULT_STACK_LENGTH, ENVIRONMENT_VERSION,
};
pub use types::{DiagnosticRecord, DiagnosticSource, Severity, UnitId};
