//! NPC teleport destinations (`teleports.yaml`), keyed by (npc, action string).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeleportDest {
    pub action: String,
    pub npc_id: i32,
    pub x: i32,
    pub y: i32,
    pub map_id: i16,
    pub heading: u8,
    /// adena
    pub price: i32,
}

#[derive(Debug, Default, Deserialize)]
struct TeleportFile {
    #[serde(default)]
    teleports: Vec<TeleportDest>,
}

#[derive(Debug, Default)]
pub struct TeleportTable {
    dests: HashMap<(i32, String), TeleportDest>,
}

impl TeleportTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: TeleportFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for d in file.teleports {
            table.insert(d);
        }
        Ok(table)
    }

    pub fn insert(&mut self, dest: TeleportDest) {
        self.dests.insert((dest.npc_id, dest.action.clone()), dest);
    }

    pub fn get(&self, npc_id: i32, action: &str) -> Option<&TeleportDest> {
        self.dests.get(&(npc_id, action.to_string()))
    }

    pub fn count(&self) -> usize {
        self.dests.len()
    }
}
