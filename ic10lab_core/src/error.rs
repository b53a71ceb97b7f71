//! Error types for the orchestration layer.

use thiserror::Error;

use crate::controller::LifecycleState;
use crate::schema::SchemaError;
use crate::store::StoreError;

/// Errors setting up a controller.
#[derive(Debug, Error)]
pub enum LabError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An action was dispatched in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Not initialized (state: {0})")]
    NotInitialized(LifecycleState),

    #[error("Busy: another initialize or step is still running")]
    Busy,

    #[error("Nothing to promote: no live environment")]
    NothingToPromote,

    #[error("Call abandoned before completion")]
    Abandoned,
}
