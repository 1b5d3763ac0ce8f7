//! Simulated devices and the bench they sit in.

pub mod bench;
pub mod logic;
pub mod memory;

use std::collections::HashMap;

pub use bench::{Bench, Edge};
pub use logic::Logic;
pub use memory::{Dram, ParallelMemory};

use crate::component::Component;
use crate::error::{Result, TesterError};
use crate::profile::{ChipProfile, ChipType};

type Constructor = fn(&ChipProfile) -> Option<Box<dyn Component>>;

/// Builds a device model for a chip profile.
pub struct DeviceFactory {
    registry: HashMap<ChipType, Constructor>,
}

impl DeviceFactory {
    pub fn new() -> Self {
        let mut factory = DeviceFactory {
            registry: HashMap::new(),
        };
        factory.register_default_models();
        factory
    }

    fn register_default_models(&mut self) {
        self.registry.insert(ChipType::Logic, |profile: &ChipProfile| {
            Logic::new(profile).map(|m| Box::new(m) as Box<dyn Component>)
        });
        self.registry.insert(ChipType::Dram, |profile: &ChipProfile| {
            Dram::new(profile).map(|m| Box::new(m) as Box<dyn Component>)
        });
        for chip_type in [ChipType::Sram, ChipType::Rom, ChipType::Fram, ChipType::Flash] {
            self.registry.insert(chip_type, |profile: &ChipProfile| {
                ParallelMemory::new(profile).map(|m| Box::new(m) as Box<dyn Component>)
            });
        }
    }

    /// Replaces the model used for one chip type.
    pub fn register(&mut self, chip_type: ChipType, constructor: Constructor) {
        self.registry.insert(chip_type, constructor);
    }

    pub fn create(&self, profile: &ChipProfile) -> Result<Box<dyn Component>> {
        self.registry
            .get(&profile.chip_type())
            .and_then(|constructor| constructor(profile))
            .ok_or_else(|| TesterError::Unsupported {
                family: profile.name.to_string(),
                operation: "simulation".to_string(),
            })
    }
}

impl Default for DeviceFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChipDatabase;

    #[test]
    fn test_every_builtin_family_has_a_model() {
        let db = ChipDatabase::builtin();
        let factory = DeviceFactory::new();
        for (_, profile) in db.iter() {
            let device = factory.create(profile).unwrap();
            assert_eq!(device.name(), profile.name);
            assert_eq!(device.pin_count(), profile.pin_count);
        }
    }
}
