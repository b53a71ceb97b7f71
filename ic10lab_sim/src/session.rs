//! SimSession - one live instantiation of an environment.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ic10lab_env::{EngineError, Environment, ExecutionUnit, Session, UnitId};
use tracing::{debug, trace};

use crate::runner::SimRunner;
use crate::world::SimWorld;

/// Runners keyed by chip id plus the world they share.
///
/// A tick executes one instruction on every runner that has not halted, in
/// ascending chip id order. Writes made by a lower id are visible to higher
/// ids in the same tick.
pub struct SimSession {
    version: u32,
    world: SimWorld,
    runners: BTreeMap<UnitId, SimRunner>,

    /// Authored chip order, kept for snapshots
    chip_order: Vec<UnitId>,

    loaded: bool,
    tick_count: u64,
}

impl SimSession {
    pub(crate) fn new(env: &Environment, seed: u64) -> Result<Self, EngineError> {
        let world = SimWorld::new(env)?;

        let mut runners = BTreeMap::new();
        for chip in &env.chips {
            let runner = SimRunner::new(chip, &world, seed)?;
            if runners.insert(chip.id, runner).is_some() {
                return Err(EngineError::rejected(format!("duplicate chip id {}", chip.id)));
            }
        }

        Ok(Self {
            version: env.version,
            world,
            runners,
            chip_order: env.chips.iter().map(|chip| chip.id).collect(),
            loaded: false,
            tick_count: 0,
        })
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn runner(&self, id: UnitId) -> Option<&SimRunner> {
        self.runners.get(&id)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    fn can_progress(&self) -> bool {
        self.runners.values().any(|runner| !runner.is_halted())
    }
}

#[async_trait]
impl Session for SimSession {
    async fn initialize_units(&mut self) -> Result<bool, EngineError> {
        let rejected: Vec<UnitId> = self
            .runners
            .values()
            .filter(|runner| runner.has_sandbox_errors())
            .map(|runner| runner.id())
            .collect();

        if !rejected.is_empty() {
            debug!("sandbox rejected chips {:?}", rejected);
            return Ok(false);
        }

        self.loaded = true;
        debug!("loaded {} runner(s) into the live context", self.runners.len());
        Ok(true)
    }

    async fn step_once(&mut self) -> Result<bool, EngineError> {
        if !self.loaded {
            return Err(EngineError::Internal("units not initialized".to_string()));
        }

        self.tick_count += 1;
        for runner in self.runners.values_mut() {
            runner.execute(&mut self.world)?;
        }

        let progress = self.can_progress();
        trace!("tick {} done, progress={}", self.tick_count, progress);
        Ok(progress)
    }

    fn snapshot(&self) -> Environment {
        Environment {
            version: self.version,
            chips: self
                .chip_order
                .iter()
                .filter_map(|id| self.runners.get(id))
                .map(SimRunner::to_chip)
                .collect(),
            devices: self.world.devices().to_vec(),
            networks: self.world.networks().to_vec(),
        }
    }

    fn units(&self) -> Vec<&dyn ExecutionUnit> {
        self.runners
            .values()
            .map(|runner| runner as &dyn ExecutionUnit)
            .collect()
    }

    fn units_mut(&mut self) -> Vec<&mut dyn ExecutionUnit> {
        self.runners
            .values_mut()
            .map(|runner| runner as &mut dyn ExecutionUnit)
            .collect()
    }
}
