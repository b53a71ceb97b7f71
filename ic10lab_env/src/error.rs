//! Error types for the engine abstraction.

use thiserror::Error;

use crate::types::UnitId;

/// Errors raised by an execution engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The environment could not be instantiated (duplicate ids, dangling references)
    #[error("Engine rejected environment: {0}")]
    Rejected(String),

    /// A unit raised an unrecoverable fault while stepping
    #[error("[chip: {unit}] {message}")]
    Fault { unit: UnitId, message: String },

    /// Engine-internal failure unrelated to the environment
    #[error("Engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates a rejection error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Creates a fault raised by a specific unit.
    pub fn fault(unit: UnitId, msg: impl Into<String>) -> Self {
        Self::Fault {
            unit,
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::fault(UnitId(3), "halt and catch fire");
        assert_eq!(err.to_string(), "[chip: 3] halt and catch fire");

        let err = EngineError::rejected("duplicate chip id 1");
        assert_eq!(err.to_string(), "Engine rejected environment: duplicate chip id 1");
    }
}
