//! On-hit weapon procs (`weapon_skills.yaml`), keyed by weapon item id.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeaponSkill {
    pub item_id: i32,
    /// Percent, rolled 1..=100.
    pub probability: i32,
    pub fix_damage: i32,
    /// Extra damage rolled in 0..random_damage.
    pub random_damage: i32,
    pub effect_id: i32,
    /// Effect plays on the wielder instead of the target.
    pub effect_on_self: bool,
}

impl WeaponSkill {
    /// Rolls the proc. `None` when it does not fire.
    pub fn roll(&self) -> Option<i32> {
        if self.probability <= 0 || rand::random_range(1..=100) > self.probability {
            return None;
        }
        let extra = if self.random_damage > 0 { rand::random_range(0..self.random_damage) } else { 0 };
        Some((self.fix_damage + extra).max(0))
    }
}

#[derive(Debug, Default, Deserialize)]
struct WeaponSkillFile {
    #[serde(default)]
    weapon_skills: Vec<WeaponSkill>,
}

#[derive(Debug, Default)]
pub struct WeaponSkillTable {
    skills: HashMap<i32, WeaponSkill>,
}

impl WeaponSkillTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: WeaponSkillFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for s in file.weapon_skills {
            table.insert(s);
        }
        Ok(table)
    }

    pub fn insert(&mut self, skill: WeaponSkill) {
        self.skills.insert(skill.item_id, skill);
    }

    pub fn get(&self, item_id: i32) -> Option<&WeaponSkill> {
        self.skills.get(&item_id)
    }

    pub fn count(&self) -> usize {
        self.skills.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certain_proc_always_fires() {
        let s = WeaponSkill { item_id: 54, probability: 100, fix_damage: 10, random_damage: 5, effect_id: 1805, ..Default::default() };
        for _ in 0..50 {
            let dmg = s.roll().unwrap();
            assert!((10..15).contains(&dmg));
        }
        let never = WeaponSkill { probability: 0, ..s };
        assert!(never.roll().is_none());
    }
}
