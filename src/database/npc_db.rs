use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NpcTemplate {
    pub npc_id: i32,
    pub name: String,
    pub nameid: String,
    /// L1Monster, L1Merchant, L1Guard, L1Board, L1Teleporter, ...
    #[serde(rename = "impl")]
    pub impl_type: String,
    pub gfx_id: i32,
    pub level: i32,
    pub hp: i32,
    pub mp: i32,
    pub ac: i32,
    pub str: i32,
    pub dex: i32,
    pub con: i32,
    pub wis: i32,
    pub intel: i32,
    pub mr: i32,
    pub exp: i32,
    pub lawful: i32,
    /// "small" or "large"
    pub size: String,
    pub ranged: i32,
    pub atk_speed: i32,
    pub passive_speed: i32,
    pub undead: bool,
    /// Poison dealt on hit: 0 none, 1 damage, 2 silence, 4 paralysis.
    pub poison_atk: i32,
    pub agro: bool,
    pub tameable: bool,
    pub fire_res: i32,
    pub water_res: i32,
    pub wind_res: i32,
    pub earth_res: i32,
    /// Dialog shown on click; empty = no dialog.
    pub normal_html: String,
    /// Dialog shown to chaotic players, when set.
    pub chaotic_html: String,
}

impl NpcTemplate {
    pub fn is_large(&self) -> bool {
        self.size.eq_ignore_ascii_case("large")
    }

    /// Guards and other town staff give no rewards on death.
    pub fn is_guard(&self) -> bool {
        self.impl_type == "L1Guard"
    }

    pub fn is_monster(&self) -> bool {
        self.impl_type == "L1Monster"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpawnEntry {
    pub npc_id: i32,
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    pub count: u32,
    pub randomx: i32,
    pub randomy: i32,
    pub heading: u8,
    /// seconds
    pub respawn_delay: u32,
}

#[derive(Debug, Default, Deserialize)]
struct NpcFile {
    #[serde(default)]
    npcs: Vec<NpcTemplate>,
}

#[derive(Debug, Default, Deserialize)]
struct SpawnFile {
    #[serde(default)]
    spawns: Vec<SpawnEntry>,
}

#[derive(Debug, Default)]
pub struct NpcTable {
    templates: HashMap<i32, NpcTemplate>,
}

impl NpcTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: NpcFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for t in file.npcs {
            table.insert(t);
        }
        Ok(table)
    }

    pub fn insert(&mut self, template: NpcTemplate) {
        self.templates.insert(template.npc_id, template);
    }

    pub fn get(&self, npc_id: i32) -> Option<&NpcTemplate> {
        self.templates.get(&npc_id)
    }

    pub fn count(&self) -> usize {
        self.templates.len()
    }
}

pub fn load_spawns(path: &Path) -> Result<Vec<SpawnEntry>, DataError> {
    let file: SpawnFile = read_yaml_optional(path)?;
    Ok(file.spawns)
}
