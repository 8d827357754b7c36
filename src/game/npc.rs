//! Live NPC instances spawned from templates.

use std::collections::HashMap;

use crate::core::secs_to_ticks;
use crate::database::NpcTemplate;

/// Ticks a corpse stays resolvable before removal (10 s).
pub const CORPSE_TICKS: u32 = 50;
/// Ticks between NPC HP/MP regeneration steps out of combat.
pub const NPC_REGEN_TICKS: u32 = 25;

/// Where an NPC was spawned and how to respawn it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnAnchor {
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    pub random_x: i32,
    pub random_y: i32,
    pub heading: u8,
    /// Seconds; 0 means never respawn (GM spawns, released pets).
    pub respawn_secs: u32,
}

#[derive(Debug, Clone)]
pub struct Npc {
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
    pub mr: i32,
    pub str: i32,
    pub dex: i32,
    pub exp: i32,
    pub lawful: i32,
    pub fire_res: i32,
    pub water_res: i32,
    pub wind_res: i32,
    pub earth_res: i32,
    pub large: bool,
    pub agro: bool,
    pub tameable: bool,
    pub guard: bool,
    pub monster: bool,
    pub ranged: i32,
    pub poison_atk: i32,
    /// Ticks between attacks.
    pub attack_interval: u32,
    /// Ticks between steps.
    pub move_interval: u32,

    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    pub heading: u8,
    pub anchor: SpawnAnchor,

    pub dead: bool,
    /// Ticks until a dead NPC is removed from the world.
    pub delete_ticks: u32,
    /// Character id being chased, 0 = none.
    pub target: i32,
    /// Damage received per character id, for exp splitting.
    pub hate: HashMap<i32, i32>,
    pub sleeped: bool,
    pub paralyzed: bool,
    pub attack_wait: u32,
    pub move_wait: u32,
    pub regen_wait: u32,
    /// Steps left in the current idle stroll.
    pub wander_dist: u32,
    pub wander_dir: u8,
}

fn ms_to_ticks(ms: i32, fallback: u32) -> u32 {
    if ms <= 0 {
        return fallback;
    }
    ((ms as u32) / crate::core::TICK_MS as u32).max(1)
}

impl Npc {
    pub fn from_template(id: i32, tpl: &NpcTemplate, anchor: SpawnAnchor, x: i32, y: i32) -> Self {
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
            mr: tpl.mr,
            str: tpl.str,
            dex: tpl.dex,
            exp: tpl.exp,
            lawful: tpl.lawful,
            fire_res: tpl.fire_res,
            water_res: tpl.water_res,
            wind_res: tpl.wind_res,
            earth_res: tpl.earth_res,
            large: tpl.is_large(),
            agro: tpl.agro,
            tameable: tpl.tameable,
            guard: tpl.is_guard(),
            monster: tpl.is_monster(),
            ranged: tpl.ranged.max(1),
            poison_atk: tpl.poison_atk,
            attack_interval: ms_to_ticks(tpl.atk_speed, 5),
            move_interval: ms_to_ticks(tpl.passive_speed, 3),
            map_id: anchor.map_id,
            x,
            y,
            heading: anchor.heading & 7,
            anchor,
            dead: false,
            delete_ticks: 0,
            target: 0,
            hate: HashMap::new(),
            sleeped: false,
            paralyzed: false,
            attack_wait: 0,
            move_wait: 0,
            regen_wait: NPC_REGEN_TICKS,
            wander_dist: 0,
            wander_dir: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.dead && self.hp > 0
    }

    /// HP as a 0..=100 ratio for the HP meter.
    pub fn hp_percent(&self) -> u16 {
        if self.max_hp <= 0 {
            return 0;
        }
        ((self.hp.max(0) as i64 * 100) / self.max_hp as i64) as u16
    }

    pub fn add_hate(&mut self, char_id: i32, amount: i32) {
        *self.hate.entry(char_id).or_insert(0) += amount.max(1);
    }

    /// Applies damage; returns true when this hit killed it.
    pub fn take_damage(&mut self, attacker: i32, dmg: i32) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.hp -= dmg.max(0);
        self.sleeped = false;
        if attacker != 0 {
            self.add_hate(attacker, dmg);
            if self.target == 0 {
                self.target = attacker;
            }
        }
        self.hp <= 0
    }

    pub fn mark_dead(&mut self) {
        self.dead = true;
        self.hp = 0;
        self.target = 0;
        self.delete_ticks = CORPSE_TICKS;
    }

    pub fn respawn_ticks(&self) -> Option<u32> {
        (self.anchor.respawn_secs > 0).then(|| secs_to_ticks(self.anchor.respawn_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tpl() -> NpcTemplate {
        NpcTemplate { npc_id: 45001, name: "Orc".into(), level: 20, hp: 50, ac: 0, ..Default::default() }
    }

    fn anchor() -> SpawnAnchor {
        SpawnAnchor { map_id: 4, x: 101, y: 100, respawn_secs: 60, ..Default::default() }
    }

    #[test]
    fn test_damage_and_hate() {
        let mut n = Npc::from_template(200_000_000, &tpl(), anchor(), 101, 100);
        assert!(!n.take_damage(7, 20));
        assert_eq!(n.hp, 30);
        assert_eq!(n.hp_percent(), 60);
        assert_eq!(n.target, 7);
        assert!(n.take_damage(8, 35));
        assert_eq!(n.hate.get(&7), Some(&20));
        n.mark_dead();
        assert!(!n.is_alive());
        assert!(!n.take_damage(7, 1));
        assert_eq!(n.delete_ticks, CORPSE_TICKS);
    }

    #[test]
    fn test_respawn_ticks() {
        let n = Npc::from_template(1, &tpl(), anchor(), 101, 100);
        assert_eq!(n.respawn_ticks(), Some(300));
        let once = Npc::from_template(1, &tpl(), SpawnAnchor::default(), 0, 0);
        assert_eq!(once.respawn_ticks(), None);
    }
}
