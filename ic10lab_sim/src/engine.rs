//! SimEngine - deterministic reference engine.

use async_trait::async_trait;
use ic10lab_env::{Engine, EngineError, Environment};
use tracing::debug;

use crate::session::SimSession;

/// Default seed for the `rand` instruction.
pub const DEFAULT_SEED: u64 = 42;

/// Builds [`SimSession`]s. Sessions built with the same seed from the same
/// environment execute identically.
#[derive(Debug, Clone)]
pub struct SimEngine {
    seed: u64,
}

impl Default for SimEngine {
    fn default() -> Self {
        Self { seed: DEFAULT_SEED }
    }
}

impl SimEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[async_trait]
impl Engine for SimEngine {
    type Session = SimSession;

    async fn construct(&self, env: &Environment) -> Result<SimSession, EngineError> {
        debug!(
            "constructing session: {} chip(s), {} device(s), {} network(s)",
            env.chips.len(),
            env.devices.len(),
            env.networks.len()
        );
        SimSession::new(env, self.seed)
    }

    fn name(&self) -> &str {
        "ic10lab-sim"
    }
}
