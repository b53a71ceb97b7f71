//! ic10lab Core - configuration validation and session orchestration
//!
//! This library sits between an editor surface and an [`Engine`](ic10lab_env::Engine):
//! 1. **Codec**: YAML text to generic documents and back, with located errors
//! 2. **Validation**: decode + JSON Schema checks producing flat, renderable errors
//! 3. **Controller**: the session lifecycle, the terminal log and the persisted editor text

pub mod codec;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod schema;
pub mod store;
pub mod validation;

// Re-export key types for convenience
pub use config::LabConfig;
pub use controller::{LifecycleState, SessionController, UnitView};
pub use diagnostics::{DiagnosticAggregator, DiagnosticKind, LogEntry, TerminalLog};
pub use error::{LabError, UsageError};
pub use schema::{SchemaSource, SchemaValidator};
pub use store::EditorStore;
pub use validation::{ValidationError, ValidationErrorKind, ValidationPipeline, ValidationReport};
