//! Coarse spatial index for area-of-interest queries.
//!
//! Entities are bucketed into `CELL_SIZE` square cells per map. A query for a
//! radius no larger than the cell size touches the 3x3 neighbourhood of the
//! caller's cell and filters by Chebyshev distance.

use std::collections::HashMap;
use std::hash::Hash;

pub const CELL_SIZE: i32 = 20;

type CellKey = (i16, i32, i32);

#[inline]
fn cell_of(map: i16, x: i32, y: i32) -> CellKey {
    (map, x.div_euclid(CELL_SIZE), y.div_euclid(CELL_SIZE))
}

#[inline]
pub fn chebyshev(x1: i32, y1: i32, x2: i32, y2: i32) -> i32 {
    (x1 - x2).abs().max((y1 - y2).abs())
}

#[derive(Debug)]
pub struct AoiGrid<K> {
    cells: HashMap<CellKey, Vec<(K, i32, i32)>>,
    pos: HashMap<K, (i16, i32, i32)>,
}

impl<K> Default for AoiGrid<K> {
    fn default() -> Self {
        Self { cells: HashMap::new(), pos: HashMap::new() }
    }
}

impl<K: Copy + Eq + Hash> AoiGrid<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    pub fn position(&self, key: K) -> Option<(i16, i32, i32)> {
        self.pos.get(&key).copied()
    }

    /// Inserts or moves `key`.
    pub fn upsert(&mut self, key: K, map: i16, x: i32, y: i32) {
        if let Some(&(om, ox, oy)) = self.pos.get(&key) {
            let old = cell_of(om, ox, oy);
            let new = cell_of(map, x, y);
            if old == new {
                if let Some(bucket) = self.cells.get_mut(&old) {
                    if let Some(slot) = bucket.iter_mut().find(|(k, _, _)| *k == key) {
                        slot.1 = x;
                        slot.2 = y;
                    }
                }
                self.pos.insert(key, (map, x, y));
                return;
            }
            self.unlink(key, old);
        }
        self.cells.entry(cell_of(map, x, y)).or_default().push((key, x, y));
        self.pos.insert(key, (map, x, y));
    }

    pub fn remove(&mut self, key: K) -> bool {
        match self.pos.remove(&key) {
            Some((m, x, y)) => {
                self.unlink(key, cell_of(m, x, y));
                true
            }
            None => false,
        }
    }

    fn unlink(&mut self, key: K, cell: CellKey) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.retain(|(k, _, _)| *k != key);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// Keys within Chebyshev `radius` of (x, y) on `map`.
    pub fn query(&self, map: i16, x: i32, y: i32, radius: i32) -> Vec<K> {
        let mut out = Vec::new();
        self.for_each_near(map, x, y, radius, |k, _, _| out.push(k));
        out
    }

    pub fn for_each_near<F: FnMut(K, i32, i32)>(&self, map: i16, x: i32, y: i32, radius: i32, mut f: F) {
        let (_, cx, cy) = cell_of(map, x, y);
        let span = (radius + CELL_SIZE - 1).div_euclid(CELL_SIZE).max(1);
        for gx in cx - span..=cx + span {
            for gy in cy - span..=cy + span {
                let Some(bucket) = self.cells.get(&(map, gx, gy)) else { continue };
                for &(k, ex, ey) in bucket {
                    if chebyshev(x, y, ex, ey) <= radius {
                        f(k, ex, ey);
                    }
                }
            }
        }
    }

    /// Every key on `map`, in no particular order.
    pub fn keys_on_map(&self, map: i16) -> Vec<K> {
        self.pos.iter().filter(|(_, p)| p.0 == map).map(|(k, _)| *k).collect()
    }
}
