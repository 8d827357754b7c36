//! Per-player record of what the client currently has on screen.

use std::collections::HashMap;

use super::EntityKind;

/// Last-seen position per object id, split by kind so visibility diffs stay
/// linear in the AOI size.
#[derive(Debug, Default, Clone)]
pub struct Known {
    pub players: HashMap<i32, (i32, i32)>,
    pub npcs: HashMap<i32, (i32, i32)>,
    pub summons: HashMap<i32, (i32, i32)>,
    pub pets: HashMap<i32, (i32, i32)>,
    pub dolls: HashMap<i32, (i32, i32)>,
    pub followers: HashMap<i32, (i32, i32)>,
    pub ground: HashMap<i32, (i32, i32)>,
    pub doors: HashMap<i32, (i32, i32)>,
}

impl Known {
    pub fn of(&self, kind: EntityKind) -> &HashMap<i32, (i32, i32)> {
        match kind {
            EntityKind::Player => &self.players,
            EntityKind::Npc => &self.npcs,
            EntityKind::Summon => &self.summons,
            EntityKind::Pet => &self.pets,
            EntityKind::Doll => &self.dolls,
            EntityKind::Follower => &self.followers,
            EntityKind::Ground => &self.ground,
            EntityKind::Door => &self.doors,
        }
    }

    pub fn of_mut(&mut self, kind: EntityKind) -> &mut HashMap<i32, (i32, i32)> {
        match kind {
            EntityKind::Player => &mut self.players,
            EntityKind::Npc => &mut self.npcs,
            EntityKind::Summon => &mut self.summons,
            EntityKind::Pet => &mut self.pets,
            EntityKind::Doll => &mut self.dolls,
            EntityKind::Follower => &mut self.followers,
            EntityKind::Ground => &mut self.ground,
            EntityKind::Door => &mut self.doors,
        }
    }

    pub fn insert(&mut self, kind: EntityKind, id: i32, x: i32, y: i32) {
        self.of_mut(kind).insert(id, (x, y));
    }

    pub fn remove(&mut self, kind: EntityKind, id: i32) -> bool {
        self.of_mut(kind).remove(&id).is_some()
    }

    pub fn contains(&self, kind: EntityKind, id: i32) -> bool {
        self.of(kind).contains_key(&id)
    }

    /// Drops an id from whichever kind holds it.
    pub fn forget(&mut self, id: i32) {
        for kind in EntityKind::ALL {
            if self.remove(kind, id) {
                return;
            }
        }
    }

    pub fn reset(&mut self) {
        for kind in EntityKind::ALL {
            self.of_mut(kind).clear();
        }
    }

    pub fn len(&self) -> usize {
        EntityKind::ALL.iter().map(|k| self.of(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every (kind, id) currently known.
    pub fn entries(&self) -> Vec<(EntityKind, i32)> {
        let mut out = Vec::with_capacity(self.len());
        for kind in EntityKind::ALL {
            out.extend(self.of(kind).keys().map(|id| (kind, *id)));
        }
        out
    }
}
