//! Spell casting: validation, costs, and the buff / heal / summon branches.
//! Attack spells are only queued here; the combat system resolves them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::secs_to_ticks;
use crate::database::SkillInfo;
use crate::game::aoi::chebyshev;
use crate::game::buff::{Buff, SideEffect, STATUS_BLUE_POTION, STATUS_WISDOM_POTION};
use crate::game::scripting::formulas::SKILL_INVISIBILITY;
use crate::game::world::World;
use crate::game::{AttackKind, AttackRequest};
use crate::network::PacketReader;
use crate::session::Session;

use super::super::systems::combat::MELEE_REACH;
use super::super::systems::poison;
use super::super::{packets, GameServer};
use super::companion::{available_cha, spawn_summons};
use super::{send_msg, send_removal, send_status, MSG_NOT_ENOUGH_HP, MSG_NOT_ENOUGH_MP, MSG_NOTHING_HAPPENS};

pub const SKILL_SUMMON_MONSTER: i32 = 51;
/// Cure Poison and Purify both lift poison.
const CURE_SKILLS: [i32; 2] = [9, 37];
const MSG_CAST_FAILED: u16 = 280;
const MSG_NO_MATERIAL: u16 = 299;
const MSG_SUMMON_LEVEL: u16 = 743;
const MSG_TOO_MANY_PETS: u16 = 319;
const DEFAULT_REUSE: Duration = Duration::from_millis(1000);
const SHIELD_ICON_KIND: u8 = 2;
const STAT_ICON_KIND: u8 = 2;

const SUMMON_RINGS: [i32; 2] = [20284, 120284];
const SUMMON_MIN_LEVEL: i32 = 28;
/// Ringless summons: (highest caster level, npc id), cost 6 each.
const SUMMON_TIERS: [(i32, i32); 7] = [(31, 81210), (35, 81213), (39, 81216), (43, 81219), (47, 81222), (51, 81225), (127, 81228)];
const TIER_COST: i32 = 6;
/// Exclusive summons: at most one, and never beside another companion.
const SPECIAL_SUMMONS: [i32; 3] = [81238, 81239, 81240];

/// Ring selection id -> (npc id, min level, cost).
fn ring_summon(selection: i32) -> Option<(i32, i32, i32)> {
    Some(match selection {
        7 => (81210, 28, 8),
        263 => (81211, 28, 8),
        519 => (81212, 28, 8),
        8 => (81213, 32, 8),
        264 => (81214, 32, 8),
        520 => (81215, 32, 8),
        9 => (81216, 36, 8),
        265 => (81217, 36, 8),
        521 => (81218, 36, 8),
        10 => (81219, 40, 8),
        266 => (81220, 40, 8),
        522 => (81221, 40, 8),
        11 => (81222, 44, 8),
        267 => (81223, 44, 8),
        523 => (81224, 44, 8),
        12 => (81225, 48, 8),
        268 => (81226, 48, 8),
        524 => (81227, 48, 8),
        13 => (81228, 52, 8),
        269 => (81229, 52, 8),
        525 => (81230, 52, 8),
        14 => (81231, 56, 10),
        270 => (81232, 56, 10),
        526 => (81233, 56, 10),
        15 => (81234, 60, 12),
        271 => (81235, 60, 12),
        527 => (81236, 60, 12),
        16 => (81237, 64, 20),
        17 => (81238, 68, 42),
        18 => (81239, 72, 42),
        274 => (81240, 72, 50),
        _ => return None,
    })
}

/// Why a cast was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastError {
    UnknownSkill,
    CannotAct,
    NotLearned,
    Cooldown,
    NotEnoughHp,
    NotEnoughMp,
    NoMaterial,
    BadTarget,
    OutOfRange,
    SummonFailed,
}

impl CastError {
    fn msg_code(self) -> Option<u16> {
        match self {
            CastError::NotLearned | CastError::SummonFailed => Some(MSG_CAST_FAILED),
            CastError::NotEnoughHp => Some(MSG_NOT_ENOUGH_HP),
            CastError::NotEnoughMp => Some(MSG_NOT_ENOUGH_MP),
            CastError::NoMaterial => Some(MSG_NO_MATERIAL),
            CastError::BadTarget | CastError::OutOfRange => Some(MSG_NOTHING_HAPPENS),
            CastError::UnknownSkill | CastError::CannotAct | CastError::Cooldown => None,
        }
    }
}

/// Tiles a targeted skill reaches. Touch and self skills use melee reach.
pub fn reach(skill: &SkillInfo, aoi_radius: i32) -> i32 {
    if skill.ranged > 0 {
        skill.ranged.min(aoi_radius)
    } else {
        MELEE_REACH
    }
}

/// `C_USE_SPELL [C row][C col]([D target])`.
pub async fn use_spell(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let row = r.read_c();
    let col = r.read_c();
    let target = if r.remaining() >= 4 { r.read_d() } else { 0 };

    let mut w = srv.world.lock().await;
    if let Err(e) = cast(&mut w, srv, sess.id, row, col, target, Instant::now()) {
        tracing::debug!("[skill] [refused] session={} row={} col={} reason={:?}", sess.id, row, col, e);
        if let (Some(code), Some(p)) = (e.msg_code(), w.player(sess.id)) {
            send_msg(p, code);
        }
    }
}

/// Validates and casts the spell at spell-book slot `row`/`col`.
pub fn cast(w: &mut World, srv: &GameServer, sid: u64, row: u8, col: u8, target: i32, now: Instant) -> Result<(), CastError> {
    let skill = srv.data.skills.by_slot(row, col).ok_or(CastError::UnknownSkill)?;
    check(w, sid, skill, now)?;

    if skill.skill_id == SKILL_SUMMON_MONSTER {
        return summon_monster(w, srv, sid, skill, target, now);
    }

    let Some(p) = w.player(sid) else { return Err(CastError::CannotAct) };
    let me = p.char_id;
    let target_char = if skill.ranged == 0 || target == 0 { me } else { target };

    if skill.is_attack() {
        if target_char == me {
            return Err(CastError::BadTarget);
        }
        pay(w, sid, skill, now);
        cancel_invisibility(w, sid, skill);
        w.attacks.push_back(AttackRequest { session_id: sid, target, kind: AttackKind::Skill(skill.skill_id) });
        return Ok(());
    }

    let target_sid = resolve_friendly(w, sid, target_char, reach(skill, w.aoi_radius))?;
    pay(w, sid, skill, now);
    cancel_invisibility(w, sid, skill);
    if CURE_SKILLS.contains(&skill.skill_id) {
        poison::cure(w, target_sid);
    } else if skill.is_heal() {
        heal(w, srv, sid, target_sid, skill);
    } else if skill.is_buff() || skill.buff_duration > 0 {
        apply_skill_buff(w, srv, target_sid, skill);
    }
    announce_cast(w, sid, target_sid, skill);
    Ok(())
}

/// Preconditions shared by every spell: alive, learned, off cooldown, affordable.
fn check(w: &World, sid: u64, skill: &SkillInfo, now: Instant) -> Result<(), CastError> {
    let p = w.player(sid).ok_or(CastError::CannotAct)?;
    if !p.is_alive() || p.is_frozen() || p.is_silenced() {
        return Err(CastError::CannotAct);
    }
    if !p.knows_spell(skill.skill_id) {
        return Err(CastError::NotLearned);
    }
    if p.skill_cooldowns.get(&skill.skill_id).is_some_and(|&until| now < until) {
        return Err(CastError::Cooldown);
    }
    if skill.hp_consume > 0 && p.hp <= skill.hp_consume {
        return Err(CastError::NotEnoughHp);
    }
    if p.mp < skill.mp_consume {
        return Err(CastError::NotEnoughMp);
    }
    if skill.item_consume_id > 0 && p.inventory.count_of(skill.item_consume_id) < skill.item_consume_count.max(1) {
        return Err(CastError::NoMaterial);
    }
    Ok(())
}

/// Friendly targets are players within reach on the caster's map.
fn resolve_friendly(w: &World, sid: u64, target_char: i32, reach: i32) -> Result<u64, CastError> {
    let me = w.player(sid).ok_or(CastError::CannotAct)?;
    if target_char == me.char_id {
        return Ok(sid);
    }
    let t = w.player_by_char(target_char).ok_or(CastError::BadTarget)?;
    if !t.is_alive() {
        return Err(CastError::BadTarget);
    }
    if t.map_id != me.map_id || chebyshev(me.x, me.y, t.x, t.y) > reach {
        return Err(CastError::OutOfRange);
    }
    Ok(t.session_id)
}

/// Takes the spell's HP/MP/material cost and starts its cooldown.
fn pay(w: &mut World, sid: u64, skill: &SkillInfo, now: Instant) {
    let Some(p) = w.player_mut(sid) else { return };
    if skill.mp_consume > 0 {
        p.mp -= skill.mp_consume;
        p.outbox.send(packets::mana_point(p.mp, p.attr.max_mp));
    }
    if skill.hp_consume > 0 {
        p.hp -= skill.hp_consume;
        p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
    }
    if skill.item_consume_id > 0 {
        if let Some(r) = p.inventory.consume(skill.item_consume_id, skill.item_consume_count.max(1)) {
            send_removal(p, &r);
        }
    }
    let delay = if skill.reuse_delay > 0 { Duration::from_millis(skill.reuse_delay) } else { DEFAULT_REUSE };
    p.skill_cooldowns.insert(skill.skill_id, now + delay);
    p.mark_dirty();
}

/// Any spell other than invisibility itself breaks invisibility.
fn cancel_invisibility(w: &mut World, sid: u64, skill: &SkillInfo) {
    if skill.skill_id == SKILL_INVISIBILITY {
        return;
    }
    let Some(p) = w.player_mut(sid) else { return };
    if !p.invisible {
        return;
    }
    if let Some(b) = p.remove_buff(SKILL_INVISIBILITY) {
        buff_icon(w, sid, &b, 0);
    }
}

fn announce_cast(w: &World, sid: u64, target_sid: u64, skill: &SkillInfo) {
    let Some(p) = w.player(sid) else { return };
    let (map, x, y, me) = (p.map_id, p.x, p.y, p.char_id);
    if skill.action_id > 0 {
        w.broadcast_nearby(map, x, y, None, &packets::action(me, skill.action_id as u8));
    }
    if skill.cast_gfx > 0 {
        if let Some(t) = w.player(target_sid) {
            w.broadcast_nearby(t.map_id, t.x, t.y, None, &packets::effect(t.char_id, skill.cast_gfx));
        }
    }
}

fn heal(w: &mut World, srv: &GameServer, sid: u64, target_sid: u64, skill: &SkillInfo) {
    let Some(caster) = w.player(sid) else { return };
    let amount = srv.scripting.calc_heal(skill.damage_value, skill.damage_dice, skill.damage_dice_count, caster.attr.intel, caster.attr.sp);
    let Some(t) = w.player_mut(target_sid) else { return };
    t.hp = (t.hp + amount.max(0)).min(t.attr.max_hp);
    t.mark_dirty();
    t.outbox.send(packets::hit_point(t.hp, t.attr.max_hp));
    tracing::debug!("[skill] [heal] target={} amount={} hp={}", t.char_id, amount, t.hp);
}

/// Lands a buff skill on `sid`: exclusions first, then the stat record and icons.
pub(crate) fn apply_skill_buff(w: &mut World, srv: &GameServer, sid: u64, skill: &SkillInfo) {
    let Some(p) = w.player(sid) else { return };
    let effect = srv.scripting.buff_effect(skill.skill_id, p.level).unwrap_or_default();

    for excluded in &effect.exclusions {
        let Some(old) = w.player_mut(sid).and_then(|p| p.remove_buff(*excluded)) else { continue };
        buff_icon(w, sid, &old, 0);
    }

    let ticks = secs_to_ticks(skill.buff_duration.max(1));
    let mut buff = Buff::new(skill.skill_id, ticks).with_delta(effect.delta);
    if let Some(side) = effect.effect {
        buff = buff.with_effect(side);
    }
    let secs = buff.secs_left();
    let Some(p) = w.player_mut(sid) else { return };
    p.add_buff(buff.clone());
    if !effect.delta.is_zero() {
        send_status(p, srv.now_secs());
    }
    buff_icon(w, sid, &buff, secs);
}

/// Client-side indicators for a buff starting (`secs > 0`) or ending (`secs == 0`).
/// Call after the buff is applied or reverted so the player's live state
/// already reflects it.
pub(crate) fn buff_icon(w: &World, sid: u64, buff: &Buff, secs: u16) {
    let Some(p) = w.player(sid) else { return };
    let (map, x, y, me) = (p.map_id, p.x, p.y, p.char_id);
    match buff.effect {
        Some(SideEffect::MoveSpeed(kind)) => {
            let kind = if secs == 0 { 0 } else { kind };
            w.broadcast_nearby(map, x, y, None, &packets::speed(me, kind, secs));
        }
        Some(SideEffect::BraveSpeed(kind)) => {
            let kind = if secs == 0 { 0 } else { kind };
            w.broadcast_nearby(map, x, y, None, &packets::skill_brave(me, kind, secs));
        }
        Some(SideEffect::Poly(_)) => {
            w.broadcast_nearby(map, x, y, None, &packets::poly(me, p.gfx(), p.current_weapon));
        }
        Some(SideEffect::Invisible) => p.outbox.send(packets::invis(me, secs > 0)),
        None => {}
    }
    match buff.skill_id {
        STATUS_BLUE_POTION => p.outbox.send(packets::event_icon(packets::EVENT_BLUE_POTION, secs)),
        STATUS_WISDOM_POTION => p.outbox.send(packets::wisdom_icon(secs)),
        _ => {}
    }
    let d = &buff.delta;
    if d.ac < 0 {
        p.outbox.send(packets::shield_icon(secs, SHIELD_ICON_KIND));
    }
    if d.str > 0 {
        p.outbox.send(packets::str_up(secs, p.attr.str.clamp(0, 255) as u8, STAT_ICON_KIND));
    }
    if d.dex > 0 {
        p.outbox.send(packets::dex_up(secs, p.attr.dex.clamp(0, 255) as u8, STAT_ICON_KIND));
    }
}

// ─── Summon Monster ─────────────────────────────────────────────────────────

/// Summon Monster. Without a summon ring the creature follows the caster's
/// level; with one, `selection == 0` opens the choice dialog and a later
/// cast (or dialog answer) carries the chosen id.
fn summon_monster(w: &mut World, srv: &GameServer, sid: u64, skill: &SkillInfo, selection: i32, now: Instant) -> Result<(), CastError> {
    let Some(p) = w.player(sid) else { return Err(CastError::CannotAct) };
    let (me, level) = (p.char_id, p.level);
    if level < SUMMON_MIN_LEVEL {
        send_msg(p, MSG_SUMMON_LEVEL);
        return Ok(());
    }
    let ring = p.inventory.equipped().any(|it| SUMMON_RINGS.contains(&it.item_id));

    let (npc_id, cost) = if ring && selection == 0 {
        if let Some(p) = w.player_mut(sid) {
            p.summon_selection = true;
            p.outbox.send(packets::hypertext(me, "summonlist"));
        }
        return Ok(());
    } else if ring {
        let (npc_id, min_level, cost) = ring_summon(selection).ok_or(CastError::SummonFailed)?;
        if level < min_level {
            send_msg(p, MSG_SUMMON_LEVEL);
            return Ok(());
        }
        (npc_id, cost)
    } else {
        let npc_id = SUMMON_TIERS.iter().find(|(max, _)| level <= *max).map_or(SUMMON_TIERS[6].1, |t| t.1);
        (npc_id, TIER_COST)
    };

    let special = SPECIAL_SUMMONS.contains(&npc_id);
    let has_special = w.summons_of(me).iter().any(|id| w.summons.get(id).is_some_and(|s| SPECIAL_SUMMONS.contains(&s.body.npc_id)));
    let crowded = !w.summons_of(me).is_empty() || !w.pets_of(me).is_empty();
    let budget = available_cha(w, srv, me);
    if has_special || (special && crowded) || budget < cost {
        if let Some(p) = w.player(sid) {
            send_msg(p, MSG_TOO_MANY_PETS);
        }
        return Ok(());
    }
    let tpl = srv.data.npcs.get(npc_id).ok_or(CastError::SummonFailed)?;
    let count = if special { 1 } else { (budget / cost) as usize };

    pay(w, sid, skill, now);
    if let Some(p) = w.player_mut(sid) {
        p.summon_selection = false;
    }
    let placed = spawn_summons(w, srv, sid, tpl, count, cost);
    tracing::info!("[skill] [summon] char={} npc={} count={} cost={}", me, npc_id, placed.len(), cost);
    Ok(())
}

/// Answer to the `summonlist` dialog.
pub fn summon_selected(w: &mut World, srv: &GameServer, sid: u64, selection: i32) {
    let Some(skill) = srv.data.skills.get(SKILL_SUMMON_MONSTER) else { return };
    let now = Instant::now();
    if let Err(e) = check(w, sid, skill, now).and_then(|_| summon_monster(w, srv, sid, skill, selection, now)) {
        tracing::debug!("[skill] [summon_refused] session={} selection={} reason={:?}", sid, selection, e);
        if let (Some(code), Some(p)) = (e.msg_code(), w.player(sid)) {
            send_msg(p, code);
        }
    }
}
