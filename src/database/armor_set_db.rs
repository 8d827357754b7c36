use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

/// A set is active when every item in `items` is equipped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArmorSet {
    pub id: i32,
    pub name: String,
    pub items: Vec<i32>,
    pub poly_id: i32,
    pub ac: i32,
    pub hp: i32,
    pub mp: i32,
    pub hpr: i32,
    pub mpr: i32,
    pub mr: i32,
    pub str: i32,
    pub dex: i32,
    pub con: i32,
    pub wis: i32,
    pub cha: i32,
    pub intl: i32,
    pub hit: i32,
    pub dmg: i32,
    pub bow_hit: i32,
    pub bow_dmg: i32,
    pub sp: i32,
    pub def_water: i32,
    pub def_wind: i32,
    pub def_fire: i32,
    pub def_earth: i32,
}

#[derive(Debug, Default, Deserialize)]
struct ArmorSetFile {
    #[serde(default)]
    armor_sets: Vec<ArmorSet>,
}

#[derive(Debug, Default)]
pub struct ArmorSetTable {
    sets: Vec<ArmorSet>,
    by_item: HashMap<i32, Vec<usize>>,
}

impl ArmorSetTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: ArmorSetFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for set in file.armor_sets {
            table.insert(set);
        }
        Ok(table)
    }

    pub fn insert(&mut self, set: ArmorSet) {
        let idx = self.sets.len();
        for &item in &set.items {
            self.by_item.entry(item).or_default().push(idx);
        }
        self.sets.push(set);
    }

    pub fn get(&self, id: i32) -> Option<&ArmorSet> {
        self.sets.iter().find(|s| s.id == id)
    }

    /// First set fully covered by `equipped` item ids.
    pub fn find_complete(&self, equipped: &[i32]) -> Option<&ArmorSet> {
        let mut candidates: Vec<usize> = equipped
            .iter()
            .filter_map(|id| self.by_item.get(id))
            .flatten()
            .copied()
            .collect();
        candidates.sort_unstable();
        candidates.dedup();
        candidates
            .into_iter()
            .map(|i| &self.sets[i])
            .find(|set| !set.items.is_empty() && set.items.iter().all(|id| equipped.contains(id)))
    }

    pub fn count(&self) -> usize {
        self.sets.len()
    }
}
