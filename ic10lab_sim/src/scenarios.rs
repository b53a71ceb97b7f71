//! Built-in sample environments.

/// Sample identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleId {
    /// One housed chip counting forever
    Counter,

    /// Two chips passing a value over a data network
    Relay,

    /// Housing, autolathe and two networks; a short straight-line program
    Showcase,

    /// A program the sandbox refuses to load
    Broken,
}

impl SampleId {
    /// Returns a list of all samples.
    pub fn all() -> Vec<SampleId> {
        vec![
            SampleId::Counter,
            SampleId::Relay,
            SampleId::Showcase,
            SampleId::Broken,
        ]
    }

    /// Returns the sample name.
    pub fn name(&self) -> &'static str {
        match self {
            SampleId::Counter => "counter",
            SampleId::Relay => "relay",
            SampleId::Showcase => "showcase",
            SampleId::Broken => "broken",
        }
    }

    /// Returns a description of the sample.
    pub fn description(&self) -> &'static str {
        match self {
            SampleId::Counter => "Increments r0 every other tick and mirrors it to the housing's Setting",
            SampleId::Relay => "Chip 1 publishes on Channel0 until 50, chip 2 forwards the final value to a console",
            SampleId::Showcase => "Every section of the format: registers, props, slots, reagents, two networks",
            SampleId::Broken => "Unknown instruction and a missing device; initialization faults",
        }
    }

    /// Parses a sample name.
    pub fn from_name(name: &str) -> Option<SampleId> {
        match name {
            "counter" => Some(SampleId::Counter),
            "relay" => Some(SampleId::Relay),
            "showcase" => Some(SampleId::Showcase),
            "broken" => Some(SampleId::Broken),
            _ => None,
        }
    }

    /// The sample's YAML text.
    pub fn yaml(&self) -> &'static str {
        match self {
            SampleId::Counter => COUNTER,
            SampleId::Relay => RELAY,
            SampleId::Showcase => SHOWCASE,
            SampleId::Broken => BROKEN,
        }
    }
}

const COUNTER: &str = r#"version: 1
chips:
  - id: 1
    code: |
      start:
      add r0 r0 1
      s db Setting r0
      yield
      j start
devices:
  - id: 1
    PrefabName: StructureCircuitHousing
    chip: 1
    ports:
      - port: default
        network: base
    props:
      - name: Setting
        value: 0
networks:
  - id: base
    type: data
"#;

const RELAY: &str = r#"version: 1
chips:
  - id: 1
    code: |
      move r0 0
      loop:
      add r0 r0 5
      s base Channel0 r0
      yield
      blt r0 50 loop
  - id: 2
    code: |
      wait:
      yield
      l r1 base Channel0
      blt r1 50 wait
      s d2 Setting r1
devices:
  - id: 2
    PrefabName: StructureConsole
    ports:
      - port: default
        network: base
networks:
  - id: base
    type: data
"#;

const SHOWCASE: &str = r#"version: 1
chips:
  - id: 1
    register_length: 18
    stack_length: 512
    SP: 16
    RA: 17
    registers:
      - name: r1
        value: 10
    stack: []
    code: |
      move r0 1
      move r2 2
      move r3 3
      move r4 4
devices:
  - id: 1
    PrefabName: StructureCircuitHousingCompact
    name: MyDevice
    chip: 1
    ports:
      - port: default
        network: base
    props:
      - name: Setting
        value: 10
      - name: Mode
        value: 12
  - id: 2
    PrefabName: StructureAutolathe
    ports:
      - port: default
        network: base
    slots:
      - index: 1
        item: ItemIronOre
        amount: 25
    reagents:
      - name: Iron
        amount: 100
networks:
  - id: base
    type: data
    props:
      - name: Channel0
        value: 10
      - name: Channel1
        value: 1
  - id: power
    type: power
"#;

const BROKEN: &str = r#"version: 1
chips:
  - id: 1
    code: |
      move r0 1
      jump r0
      l r1 d9 Setting
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use ic10lab_core::{SchemaValidator, ValidationPipeline};
    use std::sync::Arc;

    #[test]
    fn test_sample_names_round_trip() {
        for sample in SampleId::all() {
            assert_eq!(SampleId::from_name(sample.name()), Some(sample));
            assert!(!sample.description().is_empty());
        }
        assert_eq!(SampleId::from_name("nope"), None);
    }

    #[test]
    fn test_samples_pass_validation() {
        let pipeline = ValidationPipeline::new(Arc::new(SchemaValidator::bundled().unwrap()));
        for sample in SampleId::all() {
            let report = pipeline.validate(sample.yaml());
            assert!(report.valid, "{} failed: {:?}", sample.name(), report.lines());
        }
    }
}
