//! SimWorld - devices and networks shared by every runner of a session.

use std::collections::HashMap;

use ic10lab_env::{Device, EngineError, Environment, Network, Prop, UnitId};

use crate::program::Target;

/// Mutable device and network state of one session.
///
/// Devices and networks keep their authored order so snapshots encode in the
/// same order the user wrote them.
#[derive(Debug, Clone)]
pub struct SimWorld {
    devices: Vec<Device>,
    networks: Vec<Network>,
    device_index: HashMap<u32, usize>,
    network_index: HashMap<String, usize>,
    housings: HashMap<UnitId, u32>,
}

impl SimWorld {
    /// Builds the world, rejecting structurally inconsistent environments.
    pub fn new(env: &Environment) -> Result<Self, EngineError> {
        let mut network_index = HashMap::new();
        for (index, network) in env.networks.iter().enumerate() {
            if network_index.insert(network.id.clone(), index).is_some() {
                return Err(EngineError::rejected(format!(
                    "duplicate network id '{}'",
                    network.id
                )));
            }
        }

        let mut device_index = HashMap::new();
        let mut housings = HashMap::new();
        for (index, device) in env.devices.iter().enumerate() {
            if device_index.insert(device.id, index).is_some() {
                return Err(EngineError::rejected(format!("duplicate device id {}", device.id)));
            }

            for port in &device.ports {
                if !network_index.contains_key(&port.network) {
                    return Err(EngineError::rejected(format!(
                        "device {} port '{}' references unknown network '{}'",
                        device.id, port.port, port.network
                    )));
                }
            }

            if let Some(chip) = device.chip {
                if env.chip(chip).is_none() {
                    return Err(EngineError::rejected(format!(
                        "device {} houses unknown chip {}",
                        device.id, chip
                    )));
                }
                if let Some(other) = housings.insert(chip, device.id) {
                    return Err(EngineError::rejected(format!(
                        "chip {} is housed by both device {} and device {}",
                        chip, other, device.id
                    )));
                }
            }
        }

        Ok(Self {
            devices: env.devices.clone(),
            networks: env.networks.clone(),
            device_index,
            network_index,
            housings,
        })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    /// Device id housing the given chip.
    pub fn housing(&self, chip: UnitId) -> Option<u32> {
        self.housings.get(&chip).copied()
    }

    /// Checks that a target resolves for the given chip.
    pub fn resolves(&self, chip: UnitId, target: &Target) -> Result<(), String> {
        self.props(chip, target).map(|_| ())
    }

    /// Reads a property; unset properties read as 0.
    pub fn read(&self, chip: UnitId, target: &Target, prop: &str) -> Result<f64, String> {
        let props = self.props(chip, target)?;
        Ok(props
            .iter()
            .find(|p| p.name == prop)
            .map(|p| p.value)
            .unwrap_or(0.0))
    }

    /// Writes a property, creating it when unset.
    pub fn write(&mut self, chip: UnitId, target: &Target, prop: &str, value: f64) -> Result<(), String> {
        let props = self.props_mut(chip, target)?;
        match props.iter_mut().find(|p| p.name == prop) {
            Some(existing) => existing.value = value,
            None => props.push(Prop {
                name: prop.to_string(),
                value,
            }),
        }
        Ok(())
    }

    fn device_slot(&self, chip: UnitId, target: &Target) -> Result<Option<usize>, String> {
        match target {
            Target::Housing => {
                let id = self
                    .housing(chip)
                    .ok_or_else(|| "chip has no housing device (db)".to_string())?;
                Ok(self.device_index.get(&id).copied())
            }
            Target::Device(id) => self
                .device_index
                .get(id)
                .copied()
                .map(Some)
                .ok_or_else(|| format!("unknown device d{}", id)),
            Target::Network(_) => Ok(None),
        }
    }

    fn network_slot(&self, id: &str) -> Result<usize, String> {
        self.network_index
            .get(id)
            .copied()
            .ok_or_else(|| format!("unknown network '{}'", id))
    }

    fn props(&self, chip: UnitId, target: &Target) -> Result<&Vec<Prop>, String> {
        match target {
            Target::Network(id) => Ok(&self.networks[self.network_slot(id)?].props),
            _ => match self.device_slot(chip, target)? {
                Some(index) => Ok(&self.devices[index].props),
                None => Err(format!("unknown device {}", target)),
            },
        }
    }

    fn props_mut(&mut self, chip: UnitId, target: &Target) -> Result<&mut Vec<Prop>, String> {
        match target {
            Target::Network(id) => {
                let index = self.network_slot(id)?;
                Ok(&mut self.networks[index].props)
            }
            _ => match self.device_slot(chip, target)? {
                Some(index) => Ok(&mut self.devices[index].props),
                None => Err(format!("unknown device {}", target)),
            },
        }
    }
}
