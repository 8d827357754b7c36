//! Object-id allocation.
//!
//! Every live entity gets a 32-bit object id from a per-kind sub-range so a
//! bare id in a packet can be classified without a lookup. Players use their
//! character id, which the database keeps far below every range here.

use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Door,
    Npc,
    Summon,
    Pet,
    Doll,
    Follower,
    Item,
    Ground,
    Projectile,
}

impl IdKind {
    const ALL: [IdKind; 9] = [
        IdKind::Door,
        IdKind::Npc,
        IdKind::Summon,
        IdKind::Pet,
        IdKind::Doll,
        IdKind::Follower,
        IdKind::Item,
        IdKind::Ground,
        IdKind::Projectile,
    ];

    /// First id of the kind's sub-range.
    pub const fn base(self) -> i32 {
        match self {
            IdKind::Door => 150_000_000,
            IdKind::Npc => 200_000_000,
            IdKind::Summon => 300_000_000,
            IdKind::Pet => 320_000_000,
            IdKind::Doll => 340_000_000,
            IdKind::Follower => 360_000_000,
            IdKind::Item => 500_000_000,
            IdKind::Ground => 700_000_000,
            IdKind::Projectile => 900_000_000,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Kind owning `id`, or `None` for player (character) ids.
    pub fn classify(id: i32) -> Option<IdKind> {
        Self::ALL.iter().rev().copied().find(|k| id >= k.base())
    }
}

/// Process-wide monotonic counters, one per kind. Ids are never reused.
#[derive(Debug)]
pub struct IdAllocator {
    next: [AtomicI32; 9],
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: IdKind::ALL.map(|k| AtomicI32::new(k.base())) }
    }

    pub fn next(&self, kind: IdKind) -> i32 {
        self.next[kind.index()].fetch_add(1, Ordering::Relaxed)
    }

    /// Moves the item counter past ids already persisted in the database, so
    /// stored object ids (hotkey bars, pet collars) stay unique.
    pub fn seed_items(&self, max_persisted: i32) {
        let floor = max_persisted.saturating_add(1).max(IdKind::Item.base());
        self.next[IdKind::Item.index()].fetch_max(floor, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_are_monotonic_and_disjoint() {
        let ids = IdAllocator::new();
        let a = ids.next(IdKind::Npc);
        let b = ids.next(IdKind::Npc);
        assert_eq!(b, a + 1);
        assert_eq!(IdKind::classify(a), Some(IdKind::Npc));
        assert_eq!(IdKind::classify(ids.next(IdKind::Ground)), Some(IdKind::Ground));
        assert_eq!(IdKind::classify(ids.next(IdKind::Door)), Some(IdKind::Door));
        assert_eq!(IdKind::classify(42), None);
    }

    #[test]
    fn test_seed_items_skips_persisted() {
        let ids = IdAllocator::new();
        ids.seed_items(500_000_100);
        assert_eq!(ids.next(IdKind::Item), 500_000_101);
        // seeding lower never rewinds
        ids.seed_items(0);
        assert_eq!(ids.next(IdKind::Item), 500_000_102);
    }
}
