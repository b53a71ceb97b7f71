//! Typed environment model: chips, devices, networks and programs.
//!
//! Field names follow the authored YAML (`PrefabName`, `SP`, `RA`, `type`),
//! so the same struct is used for decoding user input and for encoding
//! session snapshots.

use serde::{Deserialize, Serialize};

use crate::types::UnitId;

/// Current environment format version.
pub const ENVIRONMENT_VERSION: u32 = 1;

/// Register file size when a chip does not declare one (r0..r15, sp, ra).
pub const DEFAULT_REGISTER_LENGTH: usize = 18;

/// Stack size when a chip does not declare one.
pub const DEFAULT_STACK_LENGTH: usize = 512;

fn default_version() -> u32 {
    ENVIRONMENT_VERSION
}

fn default_register_length() -> usize {
    DEFAULT_REGISTER_LENGTH
}

fn default_stack_length() -> usize {
    DEFAULT_STACK_LENGTH
}

/// A complete simulated environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub chips: Vec<Chip>,

    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default)]
    pub networks: Vec<Network>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            version: ENVIRONMENT_VERSION,
            chips: Vec::new(),
            devices: Vec::new(),
            networks: Vec::new(),
        }
    }
}

impl Environment {
    pub fn chip(&self, id: UnitId) -> Option<&Chip> {
        self.chips.iter().find(|chip| chip.id == id)
    }

    pub fn device(&self, id: u32) -> Option<&Device> {
        self.devices.iter().find(|device| device.id == id)
    }

    pub fn network(&self, id: &str) -> Option<&Network> {
        self.networks.iter().find(|network| network.id == id)
    }

    /// The device housing the given chip, if any.
    pub fn housing_of(&self, chip: UnitId) -> Option<&Device> {
        self.devices.iter().find(|device| device.chip == Some(chip))
    }
}

/// A programmable chip. Each chip becomes one execution unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chip {
    pub id: UnitId,

    #[serde(default = "default_register_length")]
    pub register_length: usize,

    #[serde(default = "default_stack_length")]
    pub stack_length: usize,

    /// Register index aliased as `sp`
    #[serde(rename = "SP", default, skip_serializing_if = "Option::is_none")]
    pub sp: Option<usize>,

    /// Register index aliased as `ra`
    #[serde(rename = "RA", default, skip_serializing_if = "Option::is_none")]
    pub ra: Option<usize>,

    /// Sparse initial register values
    #[serde(default)]
    pub registers: Vec<Register>,

    #[serde(default)]
    pub stack: Vec<f64>,

    /// Program source
    #[serde(default)]
    pub code: String,
}

impl Chip {
    /// Creates a chip with default sizes and the given program.
    pub fn new(id: u32, code: impl Into<String>) -> Self {
        Self {
            id: UnitId(id),
            register_length: DEFAULT_REGISTER_LENGTH,
            stack_length: DEFAULT_STACK_LENGTH,
            sp: None,
            ra: None,
            registers: Vec::new(),
            stack: Vec::new(),
            code: code.into(),
        }
    }

    /// Value of a named register in this description (0 if absent).
    pub fn register(&self, name: &str) -> f64 {
        self.registers
            .iter()
            .find(|register| register.name == name)
            .map(|register| register.value)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub name: String,
    pub value: f64,
}

/// A device attached to one or more networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: u32,

    #[serde(rename = "PrefabName")]
    pub prefab_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Chip housed by this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chip: Option<UnitId>,

    #[serde(default)]
    pub ports: Vec<Port>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub props: Vec<Prop>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<Slot>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reagents: Vec<Reagent>,
}

impl Device {
    pub fn prop(&self, name: &str) -> Option<f64> {
        self.props.iter().find(|prop| prop.name == name).map(|prop| prop.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub port: String,
    pub network: String,
}

/// A named numeric property (device logic value or network channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prop {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub index: u32,
    pub item: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reagent {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Data,
    Power,
}

/// A data or power network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: NetworkKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub props: Vec<Prop>,
}

impl Network {
    pub fn prop(&self, name: &str) -> Option<f64> {
        self.props.iter().find(|prop| prop.name == name).map(|prop| prop.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults_fill_missing_fields() {
        let env: Environment = serde_json::from_value(serde_json::json!({
            "chips": [{ "id": 4, "code": "yield" }]
        }))
        .unwrap();

        assert_eq!(env.version, ENVIRONMENT_VERSION);
        let chip = env.chip(UnitId(4)).unwrap();
        assert_eq!(chip.register_length, DEFAULT_REGISTER_LENGTH);
        assert_eq!(chip.stack_length, DEFAULT_STACK_LENGTH);
        assert!(env.devices.is_empty());
    }

    #[test]
    fn test_yaml_field_names_are_preserved() {
        let env: Environment = serde_json::from_value(serde_json::json!({
            "devices": [{ "id": 1, "PrefabName": "StructureAutolathe", "chip": 2 }],
            "networks": [{ "id": "base", "type": "data" }]
        }))
        .unwrap();

        assert_eq!(env.housing_of(UnitId(2)).unwrap().prefab_name, "StructureAutolathe");
        assert_eq!(env.network("base").unwrap().kind, NetworkKind::Data);

        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["devices"][0]["PrefabName"], "StructureAutolathe");
        assert_eq!(value["networks"][0]["type"], "data");
    }

    #[test]
    fn test_chip_register_lookup() {
        let mut chip = Chip::new(1, "");
        chip.registers.push(Register { name: "r1".into(), value: 10.0 });

        assert_eq!(chip.register("r1"), 10.0);
        assert_eq!(chip.register("r2"), 0.0);
    }
}
