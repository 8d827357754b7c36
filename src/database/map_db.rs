//! Map metadata and tile passability.
//!
//! `map_list.yaml` lists every map with its bounds; tiles live in
//! `{maps_dir}/{map_id}.txt`, one comma-separated row of tile bytes per Y.
//! Tiles are stored flat as `[x * height + y]`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{read_yaml_optional, DataError};

pub const TILE_PASSABLE_EAST: u8 = 0x01;
pub const TILE_PASSABLE_NORTH: u8 = 0x02;
pub const TILE_ZONE_MASK: u8 = 0x30;
pub const TILE_ZONE_SAFETY: u8 = 0x10;
pub const TILE_ZONE_COMBAT: u8 = 0x20;

/// Heading deltas: 0=N, 1=NE, 2=E, 3=SE, 4=S, 5=SW, 6=W, 7=NW.
pub const HEADING_DX: [i32; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
pub const HEADING_DY: [i32; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];

/// Heading from (sx, sy) towards (tx, ty); 0 when both points coincide.
pub fn heading_to(sx: i32, sy: i32, tx: i32, ty: i32) -> u8 {
    let (dx, dy) = ((tx - sx).signum(), (ty - sy).signum());
    (0..8u8)
        .find(|&h| HEADING_DX[usize::from(h)] == dx && HEADING_DY[usize::from(h)] == dy)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapInfo {
    pub map_id: i16,
    pub name: String,
    pub start_x: i32,
    pub end_x: i32,
    pub start_y: i32,
    pub end_y: i32,
    pub underwater: bool,
    pub markable: bool,
    pub teleportable: bool,
    pub escapable: bool,
    pub take_pets: bool,
}

#[derive(Debug)]
struct MapEntry {
    info: MapInfo,
    tiles: Vec<u8>,
    width: i32,
    height: i32,
}

#[derive(Debug, Default, Deserialize)]
struct MapListFile {
    #[serde(default)]
    maps: Vec<MapInfo>,
}

#[derive(Debug, Default)]
pub struct MapTable {
    maps: HashMap<i16, MapEntry>,
}

/// Parses a CSV tile file into `[x * height + y]` order.
pub fn parse_map_file(path: &Path, width: i32, height: i32) -> Result<Vec<u8>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("map file not found: {}", path.display()))?;

    let (w, h) = (width as usize, height as usize);
    let mut tiles = vec![0u8; w * h];
    let rows = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    for (y, line) in rows.take(h).enumerate() {
        for (x, tok) in line.split(',').take(w).enumerate() {
            tiles[x * h + y] = tok.trim().parse::<u8>().unwrap_or(0);
        }
    }
    Ok(tiles)
}

impl MapTable {
    pub fn load(list_path: &Path, tile_dir: &Path) -> Result<Self, DataError> {
        let file: MapListFile = read_yaml_optional(list_path)?;
        let mut table = Self::default();

        for info in file.maps {
            let width = info.end_x - info.start_x + 1;
            let height = info.end_y - info.start_y + 1;
            if width <= 0 || height <= 0 {
                continue;
            }
            let path = tile_dir.join(format!("{}.txt", info.map_id));
            match parse_map_file(&path, width, height) {
                Ok(tiles) => {
                    table.maps.insert(info.map_id, MapEntry { info, tiles, width, height });
                }
                Err(e) => tracing::warn!("[data] [map_skipped] map={} err={:#}", info.map_id, e),
            }
        }
        Ok(table)
    }

    /// Registers a map whose every tile carries `tile`. Used by tooling and tests.
    pub fn insert_uniform(&mut self, map_id: i16, start_x: i32, start_y: i32, width: i32, height: i32, tile: u8) {
        let info = MapInfo {
            map_id,
            name: format!("map {}", map_id),
            start_x,
            end_x: start_x + width - 1,
            start_y,
            end_y: start_y + height - 1,
            markable: true,
            teleportable: true,
            escapable: true,
            take_pets: true,
            ..Default::default()
        };
        let tiles = vec![tile; (width * height) as usize];
        self.maps.insert(map_id, MapEntry { info, tiles, width, height });
    }

    /// Overwrites one tile. No-op outside the map.
    pub fn set_tile(&mut self, map_id: i16, x: i32, y: i32, tile: u8) {
        if let Some(e) = self.maps.get_mut(&map_id) {
            if let Some(idx) = index(e, x, y) {
                e.tiles[idx] = tile;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.maps.len()
    }

    pub fn info(&self, map_id: i16) -> Option<&MapInfo> {
        self.maps.get(&map_id).map(|e| &e.info)
    }

    /// Tile byte at world coordinates, 0 when out of bounds or unknown map.
    pub fn tile(&self, map_id: i16, x: i32, y: i32) -> u8 {
        self.maps
            .get(&map_id)
            .and_then(|e| index(e, x, y).map(|i| e.tiles[i]))
            .unwrap_or(0)
    }

    pub fn has_map(&self, map_id: i16) -> bool {
        self.maps.contains_key(&map_id)
    }

    pub fn is_in_map(&self, map_id: i16, x: i32, y: i32) -> bool {
        self.maps.get(&map_id).map(|e| index(e, x, y).is_some()).unwrap_or(false)
    }

    /// Static passability of a one-tile step from (x, y) towards `heading`.
    /// North/East steps test the source tile's bit, South/West the
    /// destination's; diagonals follow the client's corner rules.
    pub fn is_passable(&self, map_id: i16, x: i32, y: i32, heading: u8) -> bool {
        if heading > 7 {
            return false;
        }
        let h = heading as usize;
        let tile1 = self.tile(map_id, x, y);
        let tile2 = self.tile(map_id, x + HEADING_DX[h], y + HEADING_DY[h]);

        if tile2 & (TILE_PASSABLE_EAST | TILE_PASSABLE_NORTH) == 0 {
            return false;
        }

        match heading {
            0 => tile1 & TILE_PASSABLE_NORTH != 0,
            1 => {
                let tile3 = self.tile(map_id, x, y - 1);
                let tile4 = self.tile(map_id, x + 1, y);
                tile3 & TILE_PASSABLE_EAST != 0 || tile4 & TILE_PASSABLE_NORTH != 0
            }
            2 => tile1 & TILE_PASSABLE_EAST != 0,
            3 => self.tile(map_id, x, y + 1) & TILE_PASSABLE_EAST != 0,
            4 => tile2 & TILE_PASSABLE_NORTH != 0,
            5 => tile2 & (TILE_PASSABLE_EAST | TILE_PASSABLE_NORTH) != 0,
            6 => tile2 & TILE_PASSABLE_EAST != 0,
            _ => self.tile(map_id, x - 1, y) & TILE_PASSABLE_NORTH != 0,
        }
    }

    /// Whether (x, y) can be entered from any orthogonal neighbour. Spawn check.
    pub fn is_passable_point(&self, map_id: i16, x: i32, y: i32) -> bool {
        self.is_passable(map_id, x, y - 1, 4)
            || self.is_passable(map_id, x + 1, y, 6)
            || self.is_passable(map_id, x, y + 1, 0)
            || self.is_passable(map_id, x - 1, y, 2)
    }

    pub fn is_safety_zone(&self, map_id: i16, x: i32, y: i32) -> bool {
        self.tile(map_id, x, y) & TILE_ZONE_MASK == TILE_ZONE_SAFETY
    }

    pub fn is_combat_zone(&self, map_id: i16, x: i32, y: i32) -> bool {
        self.tile(map_id, x, y) & TILE_ZONE_MASK == TILE_ZONE_COMBAT
    }
}

fn index(e: &MapEntry, x: i32, y: i32) -> Option<usize> {
    let lx = x - e.info.start_x;
    let ly = y - e.info.start_y;
    if lx < 0 || lx >= e.width || ly < 0 || ly >= e.height {
        return None;
    }
    Some((lx * e.height + ly) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_to() {
        assert_eq!(heading_to(100, 100, 100, 90), 0);
        assert_eq!(heading_to(100, 100, 105, 95), 1);
        assert_eq!(heading_to(100, 100, 101, 100), 2);
        assert_eq!(heading_to(100, 100, 99, 101), 5);
        assert_eq!(heading_to(100, 100, 100, 100), 0);
    }

    fn open_map() -> MapTable {
        let mut t = MapTable::default();
        t.insert_uniform(4, 90, 90, 30, 30, TILE_PASSABLE_EAST | TILE_PASSABLE_NORTH);
        t
    }

    #[test]
    fn test_open_map_passable_all_headings() {
        let t = open_map();
        for h in 0..8 {
            assert!(t.is_passable(4, 100, 100, h), "heading {}", h);
        }
        assert!(!t.is_passable(4, 100, 100, 8));
    }

    #[test]
    fn test_wall_blocks_and_edges() {
        let mut t = open_map();
        t.set_tile(4, 100, 99, 0);
        assert!(!t.is_passable(4, 100, 100, 0));
        assert!(!t.is_passable_point(4, 100, 99));
        // leaving the map is never passable
        assert!(!t.is_passable(4, 90, 90, 7));
    }

    #[test]
    fn test_north_bit_on_source() {
        let mut t = open_map();
        t.set_tile(4, 100, 100, TILE_PASSABLE_EAST);
        assert!(!t.is_passable(4, 100, 100, 0));
        // moving south onto (100,100) checks the destination's north bit
        assert!(!t.is_passable(4, 100, 99, 4));
        assert!(t.is_passable(4, 100, 100, 2));
    }

    #[test]
    fn test_zones() {
        let mut t = open_map();
        t.set_tile(4, 95, 95, TILE_ZONE_SAFETY | 0x03);
        assert!(t.is_safety_zone(4, 95, 95));
        assert!(!t.is_combat_zone(4, 95, 95));
    }

    #[test]
    fn test_parse_map_file_layout() {
        let dir = std::env::temp_dir().join(format!("aden_map_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("7.txt");
        std::fs::write(&path, "# comment\n1,2,3\n4,5,6\n").unwrap();
        let tiles = parse_map_file(&path, 3, 2).unwrap();
        // [x * height + y]
        assert_eq!(tiles, vec![1, 4, 2, 5, 3, 6]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
