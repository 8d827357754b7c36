//! Dungeon entrances and exits (`portals.yaml`), keyed by source tile.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Portal {
    pub src_x: i32,
    pub src_y: i32,
    pub src_map_id: i16,
    pub dst_x: i32,
    pub dst_y: i32,
    pub dst_map_id: i16,
    pub dst_heading: u8,
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
struct PortalFile {
    #[serde(default)]
    portals: Vec<Portal>,
}

#[derive(Debug, Default)]
pub struct PortalTable {
    portals: HashMap<(i16, i32, i32), Portal>,
}

impl PortalTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: PortalFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for p in file.portals {
            table.insert(p);
        }
        Ok(table)
    }

    pub fn insert(&mut self, portal: Portal) {
        self.portals.insert((portal.src_map_id, portal.src_x, portal.src_y), portal);
    }

    pub fn get(&self, map_id: i16, x: i32, y: i32) -> Option<&Portal> {
        self.portals.get(&(map_id, x, y))
    }

    pub fn count(&self) -> usize {
        self.portals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_and_keys_by_source_tile() {
        let raw = "portals:\n  - {src_x: 32700, src_y: 32800, src_map_id: 4, dst_x: 32600, dst_y: 32900, dst_map_id: 7, note: cave}\n";
        let file: PortalFile = serde_yaml::from_str(raw).unwrap();
        let mut t = PortalTable::default();
        for p in file.portals {
            t.insert(p);
        }
        assert_eq!(t.get(4, 32700, 32800).unwrap().dst_map_id, 7);
        assert!(t.get(7, 32700, 32800).is_none());
    }
}
