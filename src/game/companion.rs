//! Owner-linked entities: summons, tamed pets, magic dolls and followers.

use crate::database::{NpcTemplate, PetType};
use crate::repo::PetRow;

use super::inventory::InvItem;
use super::npc::SpawnAnchor;
use super::stats::StatDelta;

/// Default CHA cost of a summon or pet.
pub const PET_COST: i32 = 6;
pub const PET_MAX_LEVEL: i32 = 50;
/// Level a pet must reach before it can evolve.
pub const PET_EVOLVE_LEVEL: i32 = 30;
/// Summon lifetime when the skill gives none (3600 s).
pub const SUMMON_LIFETIME_SECS: u32 = 3600;
/// How long an escorted NPC trails its owner before going home.
pub const FOLLOWER_LIFETIME_SECS: u32 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompanionStatus {
    Aggressive = 1,
    Defensive = 2,
    #[default]
    Rest = 3,
    Extend = 4,
    Alert = 5,
    Dismiss = 6,
    Whistle = 7,
}

impl CompanionStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Aggressive,
            2 => Self::Defensive,
            3 => Self::Rest,
            4 => Self::Extend,
            5 => Self::Alert,
            6 => Self::Dismiss,
            7 => Self::Whistle,
            _ => return None,
        })
    }

    /// Whether the companion seeks out its own fights.
    pub fn engages(self) -> bool {
        matches!(self, Self::Aggressive | Self::Alert)
    }
}

/// CHA bonus per class: royal, knight, elf, mage, darkelf, dragon knight, illusionist.
pub fn class_cha_bonus(class_type: i16) -> i32 {
    match class_type {
        1 => 0,
        2 => 12,
        0 | 3..=6 => 6,
        _ => 0,
    }
}

/// Total CHA budget before subtracting active companions.
pub fn cha_budget(cha: i32, class_type: i16, max_cost: i32) -> i32 {
    let budget = cha + class_cha_bonus(class_type);
    if max_cost > 0 {
        budget.min(max_cost)
    } else {
        budget
    }
}

/// Combat body shared by summons and pets.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub id: i32,
    pub npc_id: i32,
    pub name: String,
    pub nameid: String,
    pub gfx: i32,
    pub level: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub ac: i32,
    pub str: i32,
    pub dex: i32,
    pub mr: i32,
    pub ranged: i32,
    pub large: bool,
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    pub heading: u8,
    /// NPC object id being fought, 0 = none.
    pub target: i32,
    pub attack_wait: u32,
    pub move_wait: u32,
    pub dead: bool,
}

impl Body {
    pub fn from_template(id: i32, tpl: &NpcTemplate, map_id: i16, x: i32, y: i32) -> Self {
        Self {
            id,
            npc_id: tpl.npc_id,
            name: tpl.name.clone(),
            nameid: if tpl.nameid.is_empty() { tpl.name.clone() } else { tpl.nameid.clone() },
            gfx: tpl.gfx_id,
            level: tpl.level,
            hp: tpl.hp.max(1),
            max_hp: tpl.hp.max(1),
            mp: tpl.mp,
            max_mp: tpl.mp,
            ac: tpl.ac,
            str: tpl.str,
            dex: tpl.dex,
            mr: tpl.mr,
            ranged: tpl.ranged.max(1),
            large: tpl.is_large(),
            map_id,
            x,
            y,
            heading: 0,
            target: 0,
            attack_wait: 0,
            move_wait: 0,
            dead: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.dead && self.hp > 0
    }

    pub fn hp_percent(&self) -> u16 {
        if self.max_hp <= 0 {
            return 0;
        }
        ((self.hp.max(0) as i64 * 100) / self.max_hp as i64) as u16
    }
}

// ─── Summons ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Summon {
    pub body: Body,
    pub owner: i32,
    /// Tamed through a taming skill rather than conjured.
    pub tamed: bool,
    pub cost: i32,
    pub ticks_left: u32,
    pub status: CompanionStatus,
    /// Anchor for Alert mode.
    pub home: (i32, i32),
}

impl Summon {
    pub fn new(body: Body, owner: i32, ticks: u32) -> Self {
        let home = (body.x, body.y);
        Self { body, owner, tamed: false, cost: PET_COST, ticks_left: ticks, status: CompanionStatus::Rest, home }
    }
}

// ─── Pets ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Pet {
    pub body: Body,
    pub owner: i32,
    /// Collar object id; primary key of the persisted row.
    pub item_obj_id: i32,
    pub exp: i64,
    pub lawful: i32,
    pub status: CompanionStatus,
    pub home: (i32, i32),
    /// Gear held by the pet.
    pub items: Vec<InvItem>,
    pub weapon: Option<i32>,
    pub armor: Option<i32>,
    /// Bonus from equipped gear.
    pub bonus: StatDelta,
    pub dirty: bool,
}

impl Pet {
    pub fn new(body: Body, owner: i32, item_obj_id: i32) -> Self {
        let home = (body.x, body.y);
        Self {
            body,
            owner,
            item_obj_id,
            exp: 0,
            lawful: 0,
            status: CompanionStatus::Rest,
            home,
            items: Vec::new(),
            weapon: None,
            armor: None,
            bonus: StatDelta::default(),
            dirty: false,
        }
    }

    /// Rebuilds a pet from its persisted row over the template body.
    pub fn from_row(mut body: Body, owner: i32, row: &PetRow) -> Self {
        body.level = i32::from(row.level).max(1);
        body.max_hp = row.max_hp.max(1);
        body.hp = row.hp.clamp(1, body.max_hp);
        body.max_mp = row.max_mp.max(0);
        body.mp = row.mp.clamp(0, body.max_mp);
        if !row.name.is_empty() {
            body.name = row.name.clone();
        }
        let mut pet = Self::new(body, owner, row.item_obj_id);
        pet.exp = row.exp;
        pet.lawful = row.lawful;
        pet
    }

    pub fn to_row(&self) -> PetRow {
        PetRow {
            item_obj_id: self.item_obj_id,
            npc_id: self.body.npc_id,
            name: self.body.name.clone(),
            level: self.body.level as i16,
            hp: self.body.hp,
            max_hp: self.body.max_hp,
            mp: self.body.mp,
            max_mp: self.body.max_mp,
            exp: self.exp,
            lawful: self.lawful,
        }
    }

    /// Applies gained exp. `level_of` maps total exp to a level on the
    /// shared player table. Returns the number of levels gained.
    pub fn gain_exp(&mut self, amount: i64, pet_type: Option<&PetType>, level_of: impl Fn(i64) -> i32) -> i32 {
        if amount <= 0 {
            return 0;
        }
        self.exp = self.exp.saturating_add(amount);
        self.dirty = true;
        let target = level_of(self.exp).min(PET_MAX_LEVEL);
        let mut gained = 0;
        while self.body.level < target {
            self.body.level += 1;
            gained += 1;
            if let Some(pt) = pet_type {
                self.body.max_hp += roll(pt.hp_up_min, pt.hp_up_max);
                self.body.max_mp += roll(pt.mp_up_min, pt.mp_up_max);
            }
        }
        if gained > 0 {
            self.body.hp = self.body.max_hp;
            self.body.mp = self.body.max_mp;
        }
        gained
    }

    pub fn equipped_item(&self, obj_id: i32) -> bool {
        self.weapon == Some(obj_id) || self.armor == Some(obj_id)
    }
}

fn roll(lo: i32, hi: i32) -> i32 {
    if hi <= lo {
        return lo.max(0);
    }
    rand::random_range(lo..=hi)
}

// ─── Dolls ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Doll {
    pub id: i32,
    pub owner: i32,
    pub item_obj_id: i32,
    pub item_id: i32,
    pub gfx: i32,
    pub nameid: String,
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    pub heading: u8,
    pub ticks_left: u32,
    /// Bonus folded into the owner's attributes while summoned.
    pub bonus: StatDelta,
    /// Skill proc, 0 = none.
    pub skill_id: i32,
    pub skill_chance: i32,
}

/// Folds a doll template's powers into a stat bonus plus an optional proc.
pub fn doll_bonus(tpl: &crate::database::DollTemplate) -> (StatDelta, i32, i32) {
    let mut d = StatDelta::default();
    let mut skill = (0, 0);
    for p in &tpl.powers {
        let v = p.value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        match p.kind.as_str() {
            "ac" => d.ac = d.ac.saturating_sub(v),
            "hit" => d.hit = d.hit.saturating_add(v),
            "dmg" => d.dmg = d.dmg.saturating_add(v),
            "bow_hit" => d.bow_hit = d.bow_hit.saturating_add(v),
            "bow_dmg" => d.bow_dmg = d.bow_dmg.saturating_add(v),
            "hp" => d.max_hp = d.max_hp.saturating_add(v),
            "mp" => d.max_mp = d.max_mp.saturating_add(v),
            "hpr" => d.hpr = d.hpr.saturating_add(v),
            "mpr" => d.mpr = d.mpr.saturating_add(v),
            "mr" => d.mr = d.mr.saturating_add(v),
            "sp" => d.sp = d.sp.saturating_add(v),
            "str" => d.str = d.str.saturating_add(v),
            "dex" => d.dex = d.dex.saturating_add(v),
            "con" => d.con = d.con.saturating_add(v),
            "wis" => d.wis = d.wis.saturating_add(v),
            "int" => d.intel = d.intel.saturating_add(v),
            "skill" => skill = (p.value, p.chance),
            other => tracing::debug!("[doll] [unknown_power] kind={}", other),
        }
    }
    (d, skill.0, skill.1)
}

// ─── Followers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Follower {
    pub id: i32,
    pub owner: i32,
    pub npc_id: i32,
    pub gfx: i32,
    pub nameid: String,
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    pub heading: u8,
    pub ticks_left: u32,
    /// Where the original NPC stood; it respawns there once the escort ends.
    pub anchor: SpawnAnchor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::doll_db::DollPower;
    use crate::database::DollTemplate;

    #[test]
    fn test_cha_budget() {
        assert_eq!(cha_budget(14, 1, 0), 14);
        assert_eq!(cha_budget(14, 2, 0), 26);
        assert_eq!(cha_budget(14, 0, 0), 20);
        assert_eq!(cha_budget(30, 2, 24), 24);
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(CompanionStatus::from_u8(5), Some(CompanionStatus::Alert));
        assert_eq!(CompanionStatus::from_u8(9), None);
        assert!(CompanionStatus::Aggressive.engages());
        assert!(!CompanionStatus::Rest.engages());
    }

    #[test]
    fn test_pet_levels_and_caps() {
        let body = Body { level: 10, hp: 5, max_hp: 100, mp: 0, max_mp: 20, ..Default::default() };
        let mut pet = Pet::new(body, 1, 500_000_001);
        let pt = PetType { hp_up_min: 3, hp_up_max: 3, mp_up_min: 1, mp_up_max: 1, ..Default::default() };
        let gained = pet.gain_exp(1000, Some(&pt), |_| 12);
        assert_eq!(gained, 2);
        assert_eq!(pet.body.max_hp, 106);
        assert_eq!(pet.body.hp, 106);
        assert_eq!(pet.body.mp, 22);
        assert!(pet.dirty);

        let gained = pet.gain_exp(1, Some(&pt), |_| 80);
        assert_eq!(pet.body.level, PET_MAX_LEVEL);
        assert_eq!(gained, 38);
    }

    #[test]
    fn test_pet_row_roundtrip_fields() {
        let body = Body { npc_id: 45034, name: "Doberman".into(), level: 1, hp: 1, max_hp: 1, ..Default::default() };
        let row = PetRow { item_obj_id: 9, npc_id: 45034, name: "Rex".into(), level: 12, hp: 70, max_hp: 80, mp: 3, max_mp: 10, exp: 5000, lawful: 0 };
        let pet = Pet::from_row(body, 7, &row);
        assert_eq!(pet.body.name, "Rex");
        assert_eq!(pet.to_row(), row);
    }

    #[test]
    fn test_doll_bonus() {
        let tpl = DollTemplate {
            item_id: 41248,
            powers: vec![
                DollPower { kind: "ac".into(), value: 2, chance: 0 },
                DollPower { kind: "hpr".into(), value: 5, chance: 0 },
                DollPower { kind: "skill".into(), value: 4, chance: 10 },
            ],
            ..Default::default()
        };
        let (d, skill, chance) = doll_bonus(&tpl);
        assert_eq!(d.ac, -2);
        assert_eq!(d.hpr, 5);
        assert_eq!((skill, chance), (4, 10));
    }
}
