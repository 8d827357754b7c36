//! Skill definitions (`skills.yaml`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

/// Skill type bits.
pub const TYPE_PROB: i32 = 1;
pub const TYPE_CHANGE: i32 = 2;
pub const TYPE_CURSE: i32 = 4;
pub const TYPE_HEAL: i32 = 16;
pub const TYPE_ATTACK: i32 = 64;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillInfo {
    pub skill_id: i32,
    pub name: String,
    /// 1-based level group
    pub skill_level: i32,
    /// 0..=7 position within the level group
    pub skill_number: i32,
    pub mp_consume: i32,
    pub hp_consume: i32,
    pub item_consume_id: i32,
    pub item_consume_count: i32,
    /// milliseconds
    pub reuse_delay: u64,
    /// seconds, 0 = instant
    pub buff_duration: u32,
    /// "attack", "buff", "none"
    pub target: String,
    pub target_to: i32,
    pub damage_value: i32,
    pub damage_dice: i32,
    pub damage_dice_count: i32,
    pub probability_value: i32,
    pub probability_dice: i32,
    pub attr: i32,
    #[serde(rename = "type")]
    pub skill_type: i32,
    pub lawful: i32,
    /// -1 touch, 0 self, positive range
    pub ranged: i32,
    pub area: i32,
    pub through: i32,
    pub action_id: i32,
    pub cast_gfx: i32,
    pub cast_gfx2: i32,
    pub sys_msg_happen: i32,
    pub sys_msg_stop: i32,
    pub sys_msg_fail: i32,
    /// Bit inside the level group's byte of the spell-list packet.
    #[serde(rename = "id")]
    pub id_bitmask: i32,
}

impl SkillInfo {
    pub fn is_attack(&self) -> bool {
        self.target == "attack" || self.skill_type & TYPE_ATTACK != 0
    }

    pub fn is_heal(&self) -> bool {
        self.skill_type & TYPE_HEAL != 0
    }

    pub fn is_buff(&self) -> bool {
        self.target == "buff" || self.skill_type & TYPE_CHANGE != 0
    }
}

#[derive(Debug, Default, Deserialize)]
struct SkillFile {
    #[serde(default)]
    skills: Vec<SkillInfo>,
}

#[derive(Debug, Default)]
pub struct SkillTable {
    skills: HashMap<i32, SkillInfo>,
    by_slot: HashMap<(i32, i32), i32>,
}

impl SkillTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: SkillFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for s in file.skills {
            table.insert(s);
        }
        Ok(table)
    }

    pub fn insert(&mut self, skill: SkillInfo) {
        self.by_slot.insert((skill.skill_level, skill.skill_number), skill.skill_id);
        self.skills.insert(skill.skill_id, skill);
    }

    pub fn get(&self, skill_id: i32) -> Option<&SkillInfo> {
        self.skills.get(&skill_id)
    }

    /// Resolves the client's `[row][column]` spell-book position.
    /// Rows are 0-based on the wire, skill levels 1-based.
    pub fn by_slot(&self, row: u8, col: u8) -> Option<&SkillInfo> {
        let id = self.by_slot.get(&(row as i32 + 1, col as i32))?;
        self.skills.get(id)
    }

    pub fn count(&self) -> usize {
        self.skills.len()
    }

    /// Every skill, by id.
    pub fn all(&self) -> Vec<&SkillInfo> {
        let mut all: Vec<_> = self.skills.values().collect();
        all.sort_by_key(|s| s.skill_id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lookup() {
        let mut t = SkillTable::default();
        t.insert(SkillInfo {
            skill_id: 4,
            name: "Energy Bolt".into(),
            skill_level: 1,
            skill_number: 3,
            target: "attack".into(),
            ..Default::default()
        });
        let s = t.by_slot(0, 3).unwrap();
        assert_eq!(s.skill_id, 4);
        assert!(s.is_attack());
        assert!(t.by_slot(1, 3).is_none());
    }
}
