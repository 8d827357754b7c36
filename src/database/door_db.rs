//! Static door placements (`doors.yaml`).

use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DoorEntry {
    pub id: i32,
    pub gfx_id: i32,
    pub x: i32,
    pub y: i32,
    pub map_id: i16,
    /// 0 = door spans along X, 1 = along Y
    pub direction: i32,
    pub left_edge: i32,
    pub right_edge: i32,
    /// House/castle keeper; such doors ignore player toggles.
    pub keeper_id: i32,
    pub open: bool,
}

#[derive(Debug, Default, Deserialize)]
struct DoorFile {
    #[serde(default)]
    doors: Vec<DoorEntry>,
}

#[derive(Debug, Default)]
pub struct DoorTable {
    doors: Vec<DoorEntry>,
}

impl DoorTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: DoorFile = read_yaml_optional(path)?;
        Ok(Self { doors: file.doors })
    }

    pub fn insert(&mut self, door: DoorEntry) {
        self.doors.push(door);
    }

    pub fn all(&self) -> &[DoorEntry] {
        &self.doors
    }

    pub fn count(&self) -> usize {
        self.doors.len()
    }
}
