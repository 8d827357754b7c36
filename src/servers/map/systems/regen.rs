//! Natural HP/MP regeneration, buff expiry and hunger.

use crate::core::TICKS_PER_SEC;
use crate::game::buff::STATUS_BLUE_POTION;
use crate::game::npc::NPC_REGEN_TICKS;
use crate::game::player::{Player, CLASS_KNIGHT};
use crate::game::world::World;

use super::super::handlers::{send_status, skill};
use super::super::{packets, GameServer};

/// Seconds of accumulated rest before an HP tick, by level 1..=10+.
const HP_THRESHOLDS: [u32; 10] = [30, 25, 20, 16, 14, 12, 11, 10, 9, 3];
const KNIGHT_HP_THRESHOLD: u32 = 2;
const KNIGHT_FAST_LEVEL: i32 = 30;

pub const MP_REGEN_TICKS: u32 = 80;
pub const FOOD_DECAY_TICKS: u32 = 120 * TICKS_PER_SEC;

/// Below this food level natural regeneration stops.
const HUNGRY_FOOD: i32 = 3;
const HP_WEIGHT_LIMIT: u8 = 121;
const MP_WEIGHT_LIMIT: u8 = 120;

pub fn run(w: &mut World, srv: &GameServer) {
    let hp_pass = w.tick % u64::from(TICKS_PER_SEC) == 0;
    let sids: Vec<u64> = w.players.keys().copied().collect();
    for sid in sids {
        expire_buffs(w, srv, sid);
        let Some(p) = w.player_mut(sid) else { continue };
        if hp_pass {
            regen_hp(p);
        }
        regen_mp(p);
        hunger(p);
    }
    regen_npcs(w);
}

fn expire_buffs(w: &mut World, srv: &GameServer, sid: u64) {
    let Some(p) = w.player_mut(sid) else { return };
    let expired = p.buffs.tick();
    if expired.is_empty() {
        return;
    }
    let mut stats_changed = false;
    for b in &expired {
        p.revert_buff(b);
        stats_changed |= !b.delta.is_zero();
    }
    p.mark_dirty();
    for b in &expired {
        skill::buff_icon(w, sid, b, 0);
    }
    if let Some(p) = w.player(sid) {
        if stats_changed {
            send_status(p, srv.now_secs());
        }
        tracing::debug!("[regen] [buffs_expired] char={} count={}", p.name, expired.len());
    }
}

fn hp_threshold(p: &Player) -> u32 {
    if p.class_type == CLASS_KNIGHT && p.level >= KNIGHT_FAST_LEVEL {
        return KNIGHT_HP_THRESHOLD;
    }
    let idx = (p.level.clamp(1, 10) - 1) as usize;
    HP_THRESHOLDS[idx]
}

/// Random part of one HP tick before the flat `hpr` bonus.
fn hp_roll(p: &Player) -> i32 {
    let max_bonus = if p.level > 11 && p.attr.con >= 14 { (p.attr.con - 12).min(14) } else { 1 };
    rand::random_range(1..=max_bonus)
}

fn regen_hp(p: &mut Player) {
    if !p.is_alive() || p.hp >= p.attr.max_hp {
        p.hp_regen_ticks = 0;
        return;
    }
    p.hp_regen_ticks += 1;
    if p.hp_regen_ticks < hp_threshold(p) {
        return;
    }
    p.hp_regen_ticks = 0;

    let blocked = p.food < HUNGRY_FOOD || p.weight242() >= HP_WEIGHT_LIMIT;
    let (base, bonus) = if blocked { (0, p.attr.hpr.min(0)) } else { (hp_roll(p), p.attr.hpr) };
    let hp = (p.hp + base + bonus).clamp(1, p.attr.max_hp.max(1));
    if hp != p.hp {
        p.hp = hp;
        p.mark_dirty();
        p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
    }
}

fn mp_base(p: &Player) -> i32 {
    let wis = p.attr.wis;
    let mut base = match wis {
        i32::MIN..=14 => 1,
        15 | 16 => 2,
        _ => 3,
    };
    if p.buffs.has(STATUS_BLUE_POTION) {
        base += wis.max(11) - 10;
    }
    base
}

fn regen_mp(p: &mut Player) {
    p.mp_regen_ticks += 1;
    if p.mp_regen_ticks < MP_REGEN_TICKS {
        return;
    }
    p.mp_regen_ticks = 0;
    if !p.is_alive() || p.mp >= p.attr.max_mp {
        return;
    }
    let blocked = p.food < HUNGRY_FOOD || p.weight242() >= MP_WEIGHT_LIMIT;
    let (base, bonus) = if blocked { (0, p.attr.mpr.min(0)) } else { (mp_base(p), p.attr.mpr) };
    let mp = (p.mp + base + bonus).clamp(0, p.attr.max_mp.max(0));
    if mp != p.mp {
        p.mp = mp;
        p.mark_dirty();
        p.outbox.send(packets::mana_point(p.mp, p.attr.max_mp));
    }
}

fn hunger(p: &mut Player) {
    if !p.is_alive() {
        return;
    }
    p.food_ticks += 1;
    if p.food_ticks < FOOD_DECAY_TICKS {
        return;
    }
    p.food_ticks = 0;
    if p.food > 0 {
        p.food -= 1;
        p.mark_dirty();
        p.outbox.send(packets::event_food(p.food));
    }
}

/// NPCs not chasing anyone heal a twentieth of their pool every
/// [`NPC_REGEN_TICKS`].
fn regen_npcs(w: &mut World) {
    for n in w.npcs.values_mut() {
        if !n.is_alive() || n.target != 0 || (n.hp >= n.max_hp && n.mp >= n.max_mp) {
            continue;
        }
        n.regen_wait = n.regen_wait.saturating_sub(1);
        if n.regen_wait > 0 {
            continue;
        }
        n.regen_wait = NPC_REGEN_TICKS;
        n.hp = (n.hp + (n.max_hp / 20).max(1)).min(n.max_hp);
        if n.max_mp > 0 {
            n.mp = (n.mp + (n.max_mp / 20).max(1)).min(n.max_mp);
        }
    }
}
