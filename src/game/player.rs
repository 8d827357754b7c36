//! In-world player state.
//!
//! A `Player` exclusively owns its inventory, equipment, bookmarks, known
//! cache and buffs. It reaches its connection only through the cloned
//! [`Outbox`]; the session itself stays with the network tasks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::database::StaticData;
use crate::repo::{CharacterRow, WarehouseItem};
use crate::session::Outbox;

use super::bookmark::Bookmarks;
use super::buff::{Buff, BuffList, SideEffect};
use super::char_reset::CharReset;
use super::equipment::{compute_overlay, weapon_visual, Equipment};
use super::inventory::{max_weight, Inventory};
use super::known::Known;
use super::poison::Poison;
use super::stats::Attributes;
use super::trade::TradeState;

pub const CLASS_ROYAL: i16 = 0;
pub const CLASS_KNIGHT: i16 = 1;
pub const CLASS_ELF: i16 = 2;
pub const CLASS_MAGE: i16 = 3;
pub const CLASS_DARKELF: i16 = 4;
pub const CLASS_DRAGONKNIGHT: i16 = 5;
pub const CLASS_ILLUSIONIST: i16 = 6;

pub const MAX_EXCLUDES: usize = 16;
pub const MAX_FOOD: i32 = 225;

/// Base walk interval and the haste interval.
pub const MOVE_INTERVAL: Duration = Duration::from_millis(200);
pub const MOVE_INTERVAL_HASTE: Duration = Duration::from_millis(133);

/// Yes/No dialog the client is answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingYesNo {
    /// Trade request from the given character id.
    Trade { from: i32 },
    /// Party invitation from the given character id.
    PartyInvite { from: i32, auto_share: bool },
    /// Someone asking to join the answering player's clan.
    ClanJoin { applicant: i32 },
}

impl PendingYesNo {
    pub const TRADE_MSG: u16 = 252;
    pub const PARTY_MSG: u16 = 953;
    pub const PARTY_AUTO_SHARE_MSG: u16 = 954;
    pub const CLAN_JOIN_MSG: u16 = 97;

    pub fn msg_code(self) -> u16 {
        match self {
            PendingYesNo::Trade { .. } => Self::TRADE_MSG,
            PendingYesNo::PartyInvite { auto_share: false, .. } => Self::PARTY_MSG,
            PendingYesNo::PartyInvite { auto_share: true, .. } => Self::PARTY_AUTO_SHARE_MSG,
            PendingYesNo::ClanJoin { .. } => Self::CLAN_JOIN_MSG,
        }
    }
}

/// Snapshot of an open warehouse window.
#[derive(Debug, Clone, Default)]
pub struct WarehouseView {
    pub wh_type: i16,
    pub items: Vec<WarehouseItem>,
}

#[derive(Debug)]
pub struct Player {
    // identity
    pub session_id: u64,
    pub outbox: Outbox,
    pub account: String,
    pub char_id: i32,
    pub name: String,
    pub title: String,
    pub clan_id: i32,
    pub clan_name: String,
    pub clan_rank: i16,
    pub class_type: i16,
    pub sex: i16,
    pub class_id: i32,
    pub access_level: i16,
    pub is_gm: bool,
    pub birthday: i32,

    // position
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    pub heading: u8,

    // vitals
    pub hp: i32,
    pub mp: i32,
    pub food: i32,
    pub level: i32,
    pub exp: i64,
    pub lawful: i32,
    pub pk_count: i32,
    pub karma: i32,
    pub bonus_stats: i32,
    pub elixir_stats: i32,

    /// Unmodified attributes; `attr` is base plus equipment and buff deltas.
    pub base: Attributes,
    pub attr: Attributes,
    /// 0 normal, 1 haste, 2 slow
    pub move_speed: u8,
    /// 0 none, 1 brave, 3 elf brave, 4 holy walk
    pub brave_speed: u8,

    pub inventory: Inventory,
    pub equipment: Equipment,
    pub bookmarks: Bookmarks,
    pub known_spells: Vec<i32>,
    pub known: Known,
    pub buffs: BuffList,
    pub skill_cooldowns: HashMap<i32, Instant>,

    pub dead: bool,
    pub paralyzed: bool,
    pub sleeped: bool,
    pub invisible: bool,
    pub poison: Option<Poison>,

    pub trade: TradeState,
    pub pending_yes_no: Option<PendingYesNo>,
    pub char_reset: Option<CharReset>,
    /// Summon ring menu is open.
    pub summon_selection: bool,
    /// Recipe action waiting on the craft amount dialog, with the NPC.
    pub pending_craft: Option<(i32, String)>,
    pub last_move: Option<Instant>,
    /// Destination confirmed by the next C_TELEPORT: (map, x, y, heading).
    pub pending_teleport: Option<(i16, i32, i32, u8)>,

    /// Polymorph gfx overriding `class_id`, 0 = none.
    pub temp_char_gfx: i32,
    /// Weapon visual byte sent in object packs.
    pub current_weapon: u8,
    pub excludes: Vec<String>,
    pub warehouse: Option<WarehouseView>,
    /// 0 = not set
    pub warehouse_password: i32,
    pub hp_regen_ticks: u32,
    pub mp_regen_ticks: u32,
    pub food_ticks: u32,
    pub dirty: bool,
}

impl Player {
    pub fn from_row(row: &CharacterRow, session_id: u64, outbox: Outbox, is_gm: bool) -> Self {
        let base = Attributes {
            str: i32::from(row.str),
            dex: i32::from(row.dex),
            con: i32::from(row.con),
            wis: i32::from(row.wis),
            intel: i32::from(row.intel),
            cha: i32::from(row.cha),
            ac: 10,
            mr: if row.class_type == CLASS_ELF { 25 } else { 0 },
            max_hp: i32::from(row.max_hp).max(1),
            max_mp: i32::from(row.max_mp).max(0),
            ..Default::default()
        };
        Self {
            session_id,
            outbox,
            account: row.account_name.clone(),
            char_id: row.id,
            name: row.name.clone(),
            title: row.title.clone(),
            clan_id: row.clan_id,
            clan_name: row.clan_name.clone(),
            clan_rank: row.clan_rank,
            class_type: row.class_type,
            sex: row.sex,
            class_id: row.class_id,
            access_level: row.access_level,
            is_gm,
            birthday: row.birthday,
            map_id: row.map_id,
            x: row.x,
            y: row.y,
            heading: (row.heading & 7) as u8,
            hp: i32::from(row.hp).clamp(0, base.max_hp),
            mp: i32::from(row.mp).clamp(0, base.max_mp),
            food: i32::from(row.food).clamp(0, MAX_FOOD),
            level: i32::from(row.level).max(1),
            exp: row.exp,
            lawful: row.lawful,
            pk_count: row.pk_count,
            karma: row.karma,
            bonus_stats: i32::from(row.bonus_stats),
            elixir_stats: i32::from(row.elixir_stats),
            base,
            attr: base,
            move_speed: 0,
            brave_speed: 0,
            inventory: Inventory::default(),
            equipment: Equipment::default(),
            bookmarks: Bookmarks::default(),
            known_spells: Vec::new(),
            known: Known::default(),
            buffs: BuffList::default(),
            skill_cooldowns: HashMap::new(),
            dead: row.hp <= 0,
            paralyzed: false,
            sleeped: false,
            invisible: false,
            poison: None,
            trade: TradeState::default(),
            pending_yes_no: None,
            char_reset: None,
            summon_selection: false,
            pending_craft: None,
            last_move: None,
            pending_teleport: None,
            temp_char_gfx: 0,
            current_weapon: 0,
            excludes: Vec::new(),
            warehouse: None,
            warehouse_password: 0,
            hp_regen_ticks: 0,
            mp_regen_ticks: 0,
            food_ticks: 0,
            dirty: false,
        }
    }

    pub fn to_row(&self) -> CharacterRow {
        let c16 = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        CharacterRow {
            id: self.char_id,
            account_name: self.account.clone(),
            name: self.name.clone(),
            class_type: self.class_type,
            sex: self.sex,
            class_id: self.class_id,
            str: c16(self.base.str),
            dex: c16(self.base.dex),
            con: c16(self.base.con),
            wis: c16(self.base.wis),
            cha: c16(self.base.cha),
            intel: c16(self.base.intel),
            level: c16(self.level),
            exp: self.exp,
            hp: c16(self.hp),
            mp: c16(self.mp),
            max_hp: c16(self.base.max_hp),
            max_mp: c16(self.base.max_mp),
            ac: c16(self.attr.ac),
            x: self.x,
            y: self.y,
            map_id: self.map_id,
            heading: i16::from(self.heading),
            lawful: self.lawful,
            title: self.title.clone(),
            clan_id: self.clan_id,
            clan_name: self.clan_name.clone(),
            clan_rank: self.clan_rank,
            pk_count: self.pk_count,
            karma: self.karma,
            bonus_stats: c16(self.bonus_stats),
            elixir_stats: c16(self.elixir_stats),
            food: c16(self.food),
            access_level: self.access_level,
            birthday: self.birthday,
            deleted_at: None,
        }
    }

    /// Appearance gfx: polymorph wins over the class sprite.
    pub fn gfx(&self) -> i32 {
        if self.temp_char_gfx > 0 {
            self.temp_char_gfx
        } else {
            self.class_id
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.dead && self.hp > 0
    }

    /// Blocks movement, attacks and item use.
    pub fn is_frozen(&self) -> bool {
        self.dead || self.paralyzed || self.sleeped
    }

    /// Silence poison blocks spell casting.
    pub fn is_silenced(&self) -> bool {
        matches!(self.poison, Some(Poison::Silence))
    }

    pub fn max_weight(&self) -> i32 {
        max_weight(self.attr.str, self.attr.con)
    }

    pub fn weight242(&self) -> u8 {
        self.inventory.weight242(self.max_weight())
    }

    pub fn clamp_vitals(&mut self) {
        self.hp = self.hp.clamp(0, self.attr.max_hp.max(1));
        self.mp = self.mp.clamp(0, self.attr.max_mp.max(0));
    }

    pub fn knows_spell(&self, skill_id: i32) -> bool {
        self.known_spells.contains(&skill_id)
    }

    pub fn excludes_name(&self, name: &str) -> bool {
        self.excludes.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Minimum time between two accepted steps, with the 50% tolerance.
    pub fn move_tolerance(&self) -> Duration {
        let base = if self.move_speed == 1 { MOVE_INTERVAL_HASTE } else { MOVE_INTERVAL };
        base / 2
    }

    // ─── Buffs ──────────────────────────────────────────────────────────────

    /// Applies `buff`, reverting any displaced entry for the same skill first.
    pub fn add_buff(&mut self, buff: Buff) {
        if let Some(old) = self.buffs.remove(buff.skill_id) {
            self.revert_buff(&old);
        }
        buff.apply(&mut self.attr);
        if let Some(effect) = buff.effect {
            self.apply_effect(effect);
        }
        self.buffs.add(buff);
        self.clamp_vitals();
    }

    pub fn remove_buff(&mut self, skill_id: i32) -> Option<Buff> {
        let buff = self.buffs.remove(skill_id)?;
        self.revert_buff(&buff);
        Some(buff)
    }

    /// Reverts the stat record of a buff already taken out of the list.
    pub fn revert_buff(&mut self, buff: &Buff) {
        buff.revert(&mut self.attr);
        if let Some(effect) = buff.effect {
            self.revert_effect(effect);
        }
        self.clamp_vitals();
    }

    fn apply_effect(&mut self, effect: SideEffect) {
        match effect {
            SideEffect::MoveSpeed(v) => self.move_speed = v,
            SideEffect::BraveSpeed(v) => self.brave_speed = v,
            SideEffect::Invisible => self.invisible = true,
            SideEffect::Poly(gfx) => self.temp_char_gfx = gfx,
        }
    }

    fn revert_effect(&mut self, effect: SideEffect) {
        match effect {
            SideEffect::MoveSpeed(_) => self.move_speed = 0,
            SideEffect::BraveSpeed(_) => self.brave_speed = 0,
            SideEffect::Invisible => self.invisible = false,
            SideEffect::Poly(_) => self.temp_char_gfx = 0,
        }
    }

    // ─── Equipment ──────────────────────────────────────────────────────────

    /// The single recomputation path: swaps the old equipment overlay for the
    /// one matching the current slot table. Returns true when the completed
    /// armor set changed.
    pub fn recalc_equip_stats(&mut self, data: &StaticData) -> bool {
        let (overlay, set_id) = compute_overlay(&self.equipment, &self.inventory, &data.items, &data.armor_sets);
        self.equipment.applied.revert_from(&mut self.attr);
        overlay.apply_to(&mut self.attr);
        self.equipment.applied = overlay;
        let set_changed = self.equipment.active_set_id != set_id;
        self.equipment.active_set_id = set_id;
        self.current_weapon = self
            .equipment
            .weapon()
            .and_then(|id| self.inventory.find(id))
            .and_then(|w| data.items.get(w.item_id))
            .map(|tpl| weapon_visual(&tpl.kind))
            .unwrap_or(0);
        self.clamp_vitals();
        set_changed
    }

    /// Reapplies equip flags from the loaded inventory rows.
    pub fn restore_equipment(&mut self, slots: &[(super::equipment::EquipSlot, i32)], data: &StaticData) {
        for &(slot, obj_id) in slots {
            self.equipment.set(slot, Some(obj_id));
        }
        self.recalc_equip_stats(data);
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}
