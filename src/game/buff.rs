//! Ordered buff registry with exact apply/revert bookkeeping.

use super::stats::{Attributes, StatDelta};

// ─── Reserved skill ids ─────────────────────────────────────────────────────

pub const SKILL_SHAPE_CHANGE: i32 = 67;
pub const SKILL_HASTE: i32 = 43;
pub const SKILL_GREATER_HASTE: i32 = 54;
pub const SKILL_HOLY_WALK: i32 = 52;
pub const STATUS_BRAVE: i32 = 1000;
pub const STATUS_HASTE: i32 = 1001;
pub const STATUS_BLUE_POTION: i32 = 1002;
pub const STATUS_WISDOM_POTION: i32 = 1004;
pub const STATUS_ELF_BRAVE: i32 = 1016;

/// Buffs that share a speed slot with a haste potion.
pub const HASTE_CONFLICTS: [i32; 3] = [SKILL_HASTE, SKILL_GREATER_HASTE, STATUS_HASTE];
/// Buffs that share the brave slot.
pub const BRAVE_CONFLICTS: [i32; 3] = [STATUS_BRAVE, STATUS_ELF_BRAVE, SKILL_HOLY_WALK];

/// Non-numeric consequences of a buff, restored on revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// 1 = haste, 2 = slow
    MoveSpeed(u8),
    /// 1 = brave, 3 = elf brave, 4 = holy walk
    BraveSpeed(u8),
    Invisible,
    /// Polymorph gfx id.
    Poly(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Buff {
    pub skill_id: i32,
    pub ticks_left: u32,
    pub delta: StatDelta,
    pub effect: Option<SideEffect>,
}

impl Buff {
    pub fn new(skill_id: i32, ticks: u32) -> Self {
        Self { skill_id, ticks_left: ticks, delta: StatDelta::default(), effect: None }
    }

    pub fn with_delta(mut self, delta: StatDelta) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_effect(mut self, effect: SideEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn apply(&self, attr: &mut Attributes) {
        self.delta.apply_to(attr);
    }

    pub fn revert(&self, attr: &mut Attributes) {
        self.delta.revert_from(attr);
    }

    /// Remaining whole seconds, for icon packets.
    pub fn secs_left(&self) -> u16 {
        (self.ticks_left / crate::core::TICKS_PER_SEC).min(u32::from(u16::MAX)) as u16
    }
}

/// Insertion-ordered so iteration (and therefore revert order on logout) is
/// deterministic.
#[derive(Debug, Default, Clone)]
pub struct BuffList {
    buffs: Vec<Buff>,
}

impl BuffList {
    /// Stores `buff`, returning any entry it displaced with the same skill id.
    /// The caller reverts the displaced entry before applying the new one.
    pub fn add(&mut self, buff: Buff) -> Option<Buff> {
        let displaced = self.remove(buff.skill_id);
        self.buffs.push(buff);
        displaced
    }

    pub fn remove(&mut self, skill_id: i32) -> Option<Buff> {
        let idx = self.buffs.iter().position(|b| b.skill_id == skill_id)?;
        Some(self.buffs.remove(idx))
    }

    /// Decrements every buff and returns the ones that reached zero, already
    /// removed from the list, in insertion order.
    pub fn tick(&mut self) -> Vec<Buff> {
        let mut expired = Vec::new();
        let mut i = 0;
        while i < self.buffs.len() {
            let b = &mut self.buffs[i];
            b.ticks_left = b.ticks_left.saturating_sub(1);
            if b.ticks_left == 0 {
                expired.push(self.buffs.remove(i));
            } else {
                i += 1;
            }
        }
        expired
    }

    pub fn get(&self, skill_id: i32) -> Option<&Buff> {
        self.buffs.iter().find(|b| b.skill_id == skill_id)
    }

    pub fn has(&self, skill_id: i32) -> bool {
        self.get(skill_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buff> {
        self.buffs.iter()
    }

    pub fn len(&self) -> usize {
        self.buffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffs.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Buff> {
        std::mem::take(&mut self.buffs)
    }
}
