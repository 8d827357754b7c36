//! Dynamic tile occupancy overlay.
//!
//! Separate from the static passability bits in the map table: this only
//! records which living entity stands on a tile.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct EntityGrid {
    tiles: HashMap<(i16, i32, i32), i32>,
}

impl EntityGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the tile for `id`, overwriting any stale owner.
    pub fn occupy(&mut self, map: i16, x: i32, y: i32, id: i32) {
        if let Some(prev) = self.tiles.insert((map, x, y), id) {
            if prev != id {
                tracing::debug!("[world] [occupancy_overwrite] map={} x={} y={} prev={} new={}", map, x, y, prev, id);
            }
        }
    }

    /// Frees the tile only if `id` holds it.
    pub fn release(&mut self, map: i16, x: i32, y: i32, id: i32) {
        let key = (map, x, y);
        if self.tiles.get(&key) == Some(&id) {
            self.tiles.remove(&key);
        }
    }

    pub fn occupant(&self, map: i16, x: i32, y: i32) -> Option<i32> {
        self.tiles.get(&(map, x, y)).copied()
    }

    /// True when some entity other than `exclude` stands on the tile.
    pub fn is_occupied(&self, map: i16, x: i32, y: i32, exclude: i32) -> bool {
        matches!(self.occupant(map, x, y), Some(id) if id != exclude)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupy_release() {
        let mut g = EntityGrid::new();
        g.occupy(4, 100, 99, 7);
        assert!(g.is_occupied(4, 100, 99, 1));
        assert!(!g.is_occupied(4, 100, 99, 7));
        // someone else releasing does nothing
        g.release(4, 100, 99, 1);
        assert_eq!(g.occupant(4, 100, 99), Some(7));
        g.release(4, 100, 99, 7);
        assert!(g.is_empty());
    }
}
