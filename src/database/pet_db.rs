//! Tameable pet types (`pet_types.yaml`), keyed by the wild NPC's template id.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PetType {
    pub npc_id: i32,
    pub name: String,
    /// Item consumed when taming; 0 = no item needed.
    pub taming_item_id: i32,
    pub evolv_item_id: i32,
    /// Template the pet turns into on evolution.
    pub evolv_npc_id: i32,
    pub hp_up_min: i32,
    pub hp_up_max: i32,
    pub mp_up_min: i32,
    pub mp_up_max: i32,
    pub can_equip: bool,
    pub level_up_msg_id: i32,
    pub defy_msg_id: i32,
}

impl PetType {
    pub fn can_tame(&self) -> bool {
        self.npc_id != 0
    }

    pub fn can_evolve(&self) -> bool {
        self.evolv_npc_id != 0 && self.evolv_item_id != 0
    }
}

#[derive(Debug, Default, Deserialize)]
struct PetTypeFile {
    #[serde(default)]
    pet_types: Vec<PetType>,
}

#[derive(Debug, Default)]
pub struct PetTypeTable {
    types: HashMap<i32, PetType>,
}

impl PetTypeTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: PetTypeFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for t in file.pet_types {
            table.insert(t);
        }
        Ok(table)
    }

    pub fn insert(&mut self, pet: PetType) {
        self.types.insert(pet.npc_id, pet);
    }

    pub fn get(&self, npc_id: i32) -> Option<&PetType> {
        self.types.get(&npc_id)
    }

    pub fn count(&self) -> usize {
        self.types.len()
    }
}
