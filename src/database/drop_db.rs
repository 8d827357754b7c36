use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

/// Drop chance denominator (100% = 1,000,000).
pub const CHANCE_SCALE: u32 = 1_000_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DropItem {
    pub item_id: i32,
    pub min: i32,
    pub max: i32,
    pub chance: u32,
    pub enchant_level: i32,
}

#[derive(Debug, Default, Deserialize)]
struct MobDrops {
    mob_id: i32,
    #[serde(default)]
    items: Vec<DropItem>,
}

#[derive(Debug, Default, Deserialize)]
struct DropFile {
    #[serde(default)]
    drops: Vec<MobDrops>,
}

#[derive(Debug, Default)]
pub struct DropTable {
    drops: HashMap<i32, Vec<DropItem>>,
}

impl DropTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: DropFile = read_yaml_optional(path)?;
        Ok(Self {
            drops: file.drops.into_iter().map(|d| (d.mob_id, d.items)).collect(),
        })
    }

    pub fn insert(&mut self, mob_id: i32, items: Vec<DropItem>) {
        self.drops.insert(mob_id, items);
    }

    pub fn get(&self, mob_id: i32) -> &[DropItem] {
        self.drops.get(&mob_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self) -> usize {
        self.drops.len()
    }
}
