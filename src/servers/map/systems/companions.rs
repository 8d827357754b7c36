//! Companion behaviour per tick: lifetimes, following the owner, and the
//! fights summons and pets pick on the owner's behalf.

use crate::database::map_db::heading_to;
use crate::game::aoi::chebyshev;
use crate::game::companion::{Body, CompanionStatus};
use crate::game::event::GameEvent;
use crate::game::scripting::CombatContext;
use crate::game::world::World;
use crate::game::{EntityKind, EntityRef};

use super::super::handlers::companion::{dismiss_doll, dismiss_follower, dismiss_summon, stash_pet};
use super::super::handlers::send_status;
use super::super::{packets, view, GameServer};
use super::combat::npc_death;
use super::npc_ai::pick_step;
use super::persistence;

const SOUND_SUMMON_GONE: u16 = 169;
const SOUND_DOLL_GONE: u16 = 5936;

/// An engaged summon or pet further than this from its owner gives up the fight.
const LEASH_RANGE: i32 = 5;
const FOLLOW_RANGE: i32 = 2;
/// Extend keeps at least this much distance from the owner.
const EXTEND_RANGE: i32 = 5;
const SUMMON_SCAN: i32 = 3;
const PET_SCAN: i32 = 8;
/// Targets that get further away than this are dropped.
const CHASE_RANGE: i32 = 10;
const FOLLOWER_RANGE: i32 = 13;

const MOVE_TICKS: u32 = 2;
const EXTEND_MOVE_TICKS: u32 = 3;
const DEFAULT_ATTACK_TICKS: u32 = 10;
const MIN_ATTACK_TICKS: u32 = 3;

pub fn run(w: &mut World, srv: &GameServer) {
    forget_dead_targets(w);
    for id in w.summons.keys().copied().collect::<Vec<_>>() {
        tick_summon(w, srv, id);
    }
    for id in w.pets.keys().copied().collect::<Vec<_>>() {
        tick_pet(w, srv, id);
    }
    for id in w.dolls.keys().copied().collect::<Vec<_>>() {
        tick_doll(w, srv, id);
    }
    for id in w.followers.keys().copied().collect::<Vec<_>>() {
        tick_follower(w, id);
    }
}

/// Kills published this tick end any fight still pointed at the corpse.
fn forget_dead_targets(w: &mut World) {
    let mut victims = Vec::new();
    for ev in w.events.ready() {
        if let GameEvent::EntityKilled { victim, npc_id, killer, map_id, .. } = ev {
            tracing::debug!("[event] [entity_killed] victim={} npc={} killer={} map={}", victim, npc_id, killer, map_id);
            victims.push(*victim);
        }
    }
    if victims.is_empty() {
        return;
    }
    let bodies = w.summons.values_mut().map(|s| &mut s.body).chain(w.pets.values_mut().map(|p| &mut p.body));
    for b in bodies.filter(|b| victims.contains(&b.target)) {
        b.target = 0;
    }
}

fn body(w: &World, r: EntityRef) -> Option<&Body> {
    match r.0 {
        EntityKind::Summon => w.summons.get(&r.1).map(|s| &s.body),
        EntityKind::Pet => w.pets.get(&r.1).map(|p| &p.body),
        _ => None,
    }
}

fn body_mut(w: &mut World, r: EntityRef) -> Option<&mut Body> {
    match r.0 {
        EntityKind::Summon => w.summons.get_mut(&r.1).map(|s| &mut s.body),
        EntityKind::Pet => w.pets.get_mut(&r.1).map(|p| &mut p.body),
        _ => None,
    }
}

fn play_sound(w: &World, r: EntityRef, sound: u16) {
    if let Some((map, x, y)) = w.position_of(r) {
        w.broadcast_nearby(map, x, y, None, &packets::sound(r.1, sound));
    }
}

/// What a summon or pet acts on this tick.
struct Orders {
    owner_sid: u64,
    owner_char: i32,
    /// Owner's map and tile.
    owner_at: (i16, i32, i32),
    status: CompanionStatus,
    home: (i32, i32),
    scan: i32,
    /// Pets jump back to the owner instead of walking.
    teleports: bool,
}

fn orders(w: &World, owner: i32, status: CompanionStatus, home: (i32, i32), scan: i32, teleports: bool) -> Option<Orders> {
    let owner_sid = w.session_of_char(owner)?;
    let p = w.player(owner_sid).filter(|p| p.is_alive())?;
    Some(Orders { owner_sid, owner_char: owner, owner_at: (p.map_id, p.x, p.y), status, home, scan, teleports })
}

// ─── Summons and pets ───────────────────────────────────────────────────────

fn tick_summon(w: &mut World, srv: &GameServer, id: i32) {
    let Some(s) = w.summons.get_mut(&id) else { return };
    s.ticks_left = s.ticks_left.saturating_sub(1);
    let (owner, status, home, dead, expired) = (s.owner, s.status, s.home, s.body.dead, s.ticks_left == 0);
    if expired || w.session_of_char(owner).is_none() {
        play_sound(w, (EntityKind::Summon, id), SOUND_SUMMON_GONE);
        dismiss_summon(w, id);
        tracing::debug!("[companion] [summon_gone] id={} owner={} expired={}", id, owner, expired);
        return;
    }
    if dead {
        return;
    }
    if let Some(o) = orders(w, owner, status, home, SUMMON_SCAN, false) {
        behave(w, srv, (EntityKind::Summon, id), o);
    }
}

fn tick_pet(w: &mut World, srv: &GameServer, id: i32) {
    let Some(pet) = w.pets.get(&id) else { return };
    let (owner, status, home, dead) = (pet.owner, pet.status, pet.home, pet.body.dead);
    if w.session_of_char(owner).is_none() {
        let Some(row) = stash_pet(w, id) else { return };
        tracing::info!("[companion] [pet_orphaned] id={} owner={} collar={}", id, owner, row.item_obj_id);
        let repos = srv.repos.clone();
        tokio::spawn(async move {
            persistence::save_pet(&repos, row).await;
        });
        return;
    }
    if dead {
        return;
    }
    if let Some(o) = orders(w, owner, status, home, PET_SCAN, true) {
        behave(w, srv, (EntityKind::Pet, id), o);
    }
}

fn behave(w: &mut World, srv: &GameServer, r: EntityRef, o: Orders) {
    let Some(b) = body_mut(w, r) else { return };
    b.attack_wait = b.attack_wait.saturating_sub(1);
    b.move_wait = b.move_wait.saturating_sub(1);
    let (map, x, y) = (b.map_id, b.x, b.y);
    let (omap, ox, oy) = o.owner_at;
    if map != omap {
        regroup(w, srv, r, o.owner_at);
        return;
    }
    let dist = chebyshev(x, y, ox, oy);

    match o.status {
        CompanionStatus::Rest | CompanionStatus::Dismiss => drop_target(w, r),
        CompanionStatus::Whistle => {
            drop_target(w, r);
            if dist <= FOLLOW_RANGE {
                if let Some(p) = w.pets.get_mut(&r.1) {
                    p.status = CompanionStatus::Rest;
                }
            } else {
                step(w, srv, r, ox, oy, MOVE_TICKS);
            }
        }
        CompanionStatus::Extend => {
            drop_target(w, r);
            if dist < EXTEND_RANGE {
                step(w, srv, r, 2 * x - ox, 2 * y - oy, EXTEND_MOVE_TICKS);
            }
        }
        CompanionStatus::Aggressive | CompanionStatus::Defensive | CompanionStatus::Alert => {
            if o.status != CompanionStatus::Alert && dist > LEASH_RANGE {
                drop_target(w, r);
                if o.teleports {
                    regroup(w, srv, r, o.owner_at);
                } else {
                    step(w, srv, r, ox, oy, MOVE_TICKS);
                }
                return;
            }
            match current_target(w, r).or_else(|| acquire(w, r, &o)) {
                Some(npc) => engage(w, srv, r, npc, o.owner_sid),
                None if o.status == CompanionStatus::Alert => {
                    if (x, y) != o.home {
                        step(w, srv, r, o.home.0, o.home.1, MOVE_TICKS);
                    }
                }
                None => {
                    if dist > FOLLOW_RANGE {
                        step(w, srv, r, ox, oy, MOVE_TICKS);
                    }
                }
            }
        }
    }
}

fn drop_target(w: &mut World, r: EntityRef) {
    if let Some(b) = body_mut(w, r) {
        b.target = 0;
    }
}

/// Puts the companion back next to its owner, wherever they are.
fn regroup(w: &mut World, srv: &GameServer, r: EntityRef, (map, x, y): (i16, i32, i32)) {
    let Some((nx, ny)) = w.free_tile_near(&srv.data.maps, map, x, y, 2) else { return };
    view::broadcast_remove(w, r);
    w.move_companion(r, map, nx, ny, 0);
    drop_target(w, r);
    view::announce(w, r);
}

fn current_target(w: &mut World, r: EntityRef) -> Option<i32> {
    let b = body(w, r)?;
    let (t, map, x, y) = (b.target, b.map_id, b.x, b.y);
    if t == 0 {
        return None;
    }
    let valid = w.npcs.get(&t).is_some_and(|n| n.is_alive() && n.map_id == map && chebyshev(n.x, n.y, x, y) <= CHASE_RANGE);
    if valid {
        return Some(t);
    }
    drop_target(w, r);
    None
}

/// Defensive companions only answer NPCs fighting their owner. The others
/// prefer the owner's fight and otherwise take the nearest monster; Alert
/// scans around its post.
fn acquire(w: &mut World, r: EntityRef, o: &Orders) -> Option<i32> {
    let b = body(w, r)?;
    let (map, x, y) = (b.map_id, b.x, b.y);
    let (cx, cy) = if o.status == CompanionStatus::Alert { o.home } else { (x, y) };
    let mut best: Option<((u8, i32), i32)> = None;
    for id in w.nearby_npcs(map, cx, cy, o.scan) {
        let Some(n) = w.npcs.get(&id).filter(|n| n.is_alive()) else { continue };
        let threat = n.target == o.owner_char || n.hate.contains_key(&o.owner_char);
        let eligible = match o.status {
            CompanionStatus::Defensive => n.target == o.owner_char,
            _ => threat || n.monster,
        };
        if !eligible {
            continue;
        }
        let rank = (u8::from(!threat), chebyshev(n.x, n.y, x, y));
        if best.is_none_or(|(held, _)| rank < held) {
            best = Some((rank, id));
        }
    }
    let (_, id) = best?;
    body_mut(w, r)?.target = id;
    Some(id)
}

fn engage(w: &mut World, srv: &GameServer, r: EntityRef, npc: i32, owner_sid: u64) {
    let (Some(b), Some(n)) = (body(w, r), w.npcs.get(&npc)) else { return };
    let (tx, ty) = (n.x, n.y);
    if chebyshev(b.x, b.y, tx, ty) <= b.ranged.max(1) {
        if b.attack_wait == 0 {
            strike(w, srv, r, npc, owner_sid);
        }
    } else {
        step(w, srv, r, tx, ty, MOVE_TICKS);
    }
}

fn attack_ticks(srv: &GameServer, npc_id: i32) -> u32 {
    match srv.data.npcs.get(npc_id).map(|t| t.atk_speed) {
        Some(ms) if ms > 0 => ((ms / 200) as u32).max(MIN_ATTACK_TICKS),
        _ => DEFAULT_ATTACK_TICKS,
    }
}

/// One swing at an NPC. Damage and exp go to the owner.
fn strike(w: &mut World, srv: &GameServer, r: EntityRef, npc: i32, owner_sid: u64) {
    let (Some(b), Some(n)) = (body(w, r), w.npcs.get(&npc)) else { return };
    let ctx = CombatContext {
        attacker_level: b.level,
        attacker_str: b.str,
        attacker_dex: b.dex,
        target_ac: n.ac,
        target_level: n.level,
        target_mr: n.mr,
        ..Default::default()
    };
    let outcome = srv.scripting.calc_npc_melee(&ctx);
    let damage = if outcome.is_hit { outcome.damage.max(0) } else { 0 };
    let heading = heading_to(b.x, b.y, n.x, n.y);
    let (map, bx, by, nx, ny) = (b.map_id, b.x, b.y, n.x, n.y);
    let interval = attack_ticks(srv, b.npc_id);
    let pkt = if b.ranged > 1 {
        packets::attack_arrow(r.1, npc, damage, heading, w.next_projectile(), (bx, by), (nx, ny))
    } else {
        packets::attack_melee(r.1, npc, damage, heading)
    };
    if let Some(b) = body_mut(w, r) {
        b.heading = heading;
        b.attack_wait = interval;
    }
    w.broadcast_nearby(map, bx, by, None, &pkt);
    if damage == 0 {
        return;
    }

    let owner_char = w.player(owner_sid).map(|p| p.char_id).unwrap_or(0);
    let Some(n) = w.npcs.get_mut(&npc) else { return };
    let killed = n.take_damage(owner_char, damage);
    let meter = packets::hp_meter(npc, n.hp_percent());
    w.broadcast_nearby(map, nx, ny, None, &meter);
    if killed {
        npc_death(w, srv, npc, owner_sid);
        drop_target(w, r);
    }
}

fn step(w: &mut World, srv: &GameServer, r: EntityRef, tx: i32, ty: i32, interval: u32) {
    let Some(b) = body(w, r) else { return };
    if b.move_wait > 0 {
        return;
    }
    let (map, x, y) = (b.map_id, b.x, b.y);
    let Some((nx, ny, h)) = pick_step(w, srv, map, x, y, tx, ty, r.1) else { return };
    w.move_companion(r, map, nx, ny, h);
    if let Some(b) = body_mut(w, r) {
        b.move_wait = interval;
    }
    w.broadcast_nearby(map, nx, ny, None, &packets::move_object(r.1, x, y, h));
}

// ─── Dolls and followers ────────────────────────────────────────────────────

/// Dolls and followers hold no tile; they slide one step closer.
fn drift(w: &mut World, r: EntityRef, (map, x, y): (i16, i32, i32), tx: i32, ty: i32) {
    let (nx, ny) = (x + (tx - x).signum(), y + (ty - y).signum());
    let h = heading_to(x, y, nx, ny);
    w.move_companion(r, map, nx, ny, h);
    w.broadcast_nearby(map, nx, ny, None, &packets::move_object(r.1, x, y, h));
}

fn relocate(w: &mut World, r: EntityRef, (map, x, y): (i16, i32, i32)) {
    view::broadcast_remove(w, r);
    w.move_companion(r, map, x + 1, y, 0);
    view::announce(w, r);
}

/// Dolls vanish when their owner leaves, dies or turns invisible.
fn tick_doll(w: &mut World, srv: &GameServer, id: i32) {
    let Some(d) = w.dolls.get_mut(&id) else { return };
    d.ticks_left = d.ticks_left.saturating_sub(1);
    let (owner, at, expired) = (d.owner, (d.map_id, d.x, d.y), d.ticks_left == 0);
    let master = w.player_by_char(owner).filter(|p| p.is_alive() && !p.invisible).map(|p| (p.map_id, p.x, p.y));
    let r = (EntityKind::Doll, id);
    let Some(owner_at) = master.filter(|_| !expired) else {
        play_sound(w, r, SOUND_DOLL_GONE);
        dismiss_doll(w, id);
        if let Some(p) = w.player_by_char(owner) {
            send_status(p, srv.now_secs());
        }
        return;
    };
    if owner_at.0 != at.0 {
        relocate(w, r, owner_at);
    } else if w.tick % u64::from(MOVE_TICKS) == 0 && chebyshev(at.1, at.2, owner_at.1, owner_at.2) > FOLLOW_RANGE {
        drift(w, r, at, owner_at.1, owner_at.2);
    }
}

/// Followers go home when the escort ends, the owner dies or they lose
/// each other.
fn tick_follower(w: &mut World, id: i32) {
    let Some(f) = w.followers.get_mut(&id) else { return };
    f.ticks_left = f.ticks_left.saturating_sub(1);
    let (owner, at, expired) = (f.owner, (f.map_id, f.x, f.y), f.ticks_left == 0);
    let master = w.player_by_char(owner).filter(|p| p.is_alive()).map(|p| (p.map_id, p.x, p.y));
    let owner_at = master.filter(|&(m, ox, oy)| !expired && m == at.0 && chebyshev(ox, oy, at.1, at.2) <= FOLLOWER_RANGE);
    let Some((_, ox, oy)) = owner_at else {
        dismiss_follower(w, id);
        return;
    };
    if w.tick % u64::from(MOVE_TICKS) == 0 && chebyshev(at.1, at.2, ox, oy) > FOLLOW_RANGE {
        drift(w, (EntityKind::Follower, id), at, ox, oy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::game::companion::{Doll, Follower, Pet, Summon};
    use crate::game::ids::IdKind;
    use crate::game::npc::SpawnAnchor;
    use crate::game::scripting::{AttackOutcome, ScriptedOutcomes};
    use crate::game::stats::StatDelta;
    use crate::network::opcodes::*;
    use crate::servers::map::handlers::testutil;

    fn make_body(w: &mut World, kind: IdKind, x: i32, y: i32) -> Body {
        Body {
            id: w.ids.next(kind),
            npc_id: 81083,
            name: "wolf".into(),
            level: 10,
            hp: 40,
            max_hp: 40,
            str: 12,
            dex: 12,
            ranged: 1,
            map_id: 4,
            x,
            y,
            ..Default::default()
        }
    }

    fn summon(w: &mut World, owner: i32, x: i32, y: i32, status: CompanionStatus) -> i32 {
        let mut s = Summon::new(make_body(w, IdKind::Summon, x, y), owner, 1000);
        s.status = status;
        let id = s.body.id;
        w.add_summon(s);
        id
    }

    fn pet(w: &mut World, owner: i32, x: i32, y: i32, status: CompanionStatus) -> i32 {
        let mut p = Pet::new(make_body(w, IdKind::Pet, x, y), owner, 500_000_900);
        p.status = status;
        let id = p.body.id;
        w.add_pet(p);
        id
    }

    #[tokio::test]
    async fn test_summon_expires_with_sound() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (_sess, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = summon(&mut w, 1, 33001, 33000, CompanionStatus::Rest);
        view::announce(&mut w, (EntityKind::Summon, id));
        w.summons.get_mut(&id).unwrap().ticks_left = 1;
        rx.drain();

        run(&mut w, &srv);
        assert!(w.summons.is_empty());
        assert_eq!(testutil::ops(&mut rx), vec![S_SOUND_EFFECT, S_REMOVE_OBJECT]);
        assert!(!w.is_occupied(4, 33001, 33000, 0));
    }

    #[tokio::test]
    async fn test_summon_without_owner_is_removed() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        summon(&mut w, 99, 33001, 33000, CompanionStatus::Aggressive);
        run(&mut w, &srv);
        assert!(w.summons.is_empty());
    }

    #[tokio::test]
    async fn test_aggressive_summon_fights_for_owner() {
        let (srv, _store) = testutil::server_with(Arc::new(ScriptedOutcomes::new([AttackOutcome::hit(10)])));
        let mut w = srv.world.lock().await;
        let (_sess, _rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = summon(&mut w, 1, 33001, 33000, CompanionStatus::Aggressive);
        let orc = testutil::orc(&mut w, 33002, 33000);

        run(&mut w, &srv);
        let s = &w.summons[&id];
        assert_eq!(s.body.target, orc);
        assert!(s.body.attack_wait > 0);
        let n = &w.npcs[&orc];
        assert_eq!(n.hp, 40);
        // the owner takes the credit
        assert_eq!(n.hate.get(&1), Some(&10));
    }

    #[tokio::test]
    async fn test_defensive_summon_only_answers_threats() {
        let (srv, _store) = testutil::server_with(Arc::new(ScriptedOutcomes::new([AttackOutcome::hit(10)])));
        let mut w = srv.world.lock().await;
        let (_sess, _rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = summon(&mut w, 1, 33001, 33000, CompanionStatus::Defensive);
        let orc = testutil::orc(&mut w, 33002, 33000);

        run(&mut w, &srv);
        assert_eq!(w.summons[&id].body.target, 0);

        w.npcs.get_mut(&orc).unwrap().target = 1;
        run(&mut w, &srv);
        assert_eq!(w.summons[&id].body.target, orc);
    }

    #[tokio::test]
    async fn test_idle_summon_walks_after_owner() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (_sess, _rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = summon(&mut w, 1, 33004, 33000, CompanionStatus::Aggressive);

        run(&mut w, &srv);
        let b = &w.summons[&id].body;
        assert_eq!((b.x, b.y), (33003, 33000));
        assert_eq!(b.move_wait, MOVE_TICKS);
        assert!(w.is_occupied(4, 33003, 33000, 0));
    }

    #[tokio::test]
    async fn test_pet_beyond_leash_jumps_back() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (_sess, _rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = pet(&mut w, 1, 33010, 33000, CompanionStatus::Aggressive);

        run(&mut w, &srv);
        let b = &w.pets[&id].body;
        assert!(chebyshev(b.x, b.y, 33000, 33000) <= 2);
    }

    #[tokio::test]
    async fn test_whistled_pet_comes_back_then_rests() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (_sess, _rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = pet(&mut w, 1, 33003, 33000, CompanionStatus::Whistle);

        run(&mut w, &srv);
        assert_eq!(w.pets[&id].body.x, 33002);
        assert_eq!(w.pets[&id].status, CompanionStatus::Whistle);
        run(&mut w, &srv);
        assert_eq!(w.pets[&id].status, CompanionStatus::Rest);
    }

    #[tokio::test]
    async fn test_orphaned_pet_is_stashed() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        pet(&mut w, 99, 33000, 33000, CompanionStatus::Rest);
        run(&mut w, &srv);
        assert!(w.pets.is_empty());
        assert!(!w.is_occupied(4, 33000, 33000, 0));
    }

    #[tokio::test]
    async fn test_kill_event_clears_companion_targets() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (_sess, _rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = summon(&mut w, 1, 33001, 33000, CompanionStatus::Rest);
        w.summons.get_mut(&id).unwrap().body.target = 200_000_042;
        w.events.emit(GameEvent::EntityKilled { victim: 200_000_042, npc_id: 45001, killer: 1, map_id: 4, x: 0, y: 0 });
        w.events.swap();

        forget_dead_targets(&mut w);
        assert_eq!(w.summons[&id].body.target, 0);
    }

    #[tokio::test]
    async fn test_doll_leaves_invisible_owner() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let bonus = StatDelta { ac: -2, ..Default::default() };
        let doll = Doll {
            id: w.ids.next(IdKind::Doll),
            owner: 1,
            item_obj_id: 500_000_777,
            item_id: 41248,
            gfx: 2734,
            nameid: "bugbear".into(),
            map_id: 4,
            x: 33001,
            y: 33000,
            heading: 0,
            ticks_left: 1000,
            bonus,
            skill_id: 0,
            skill_chance: 0,
        };
        let ac = w.player(sess.id).unwrap().attr.ac;
        bonus.apply_to(&mut w.player_mut(sess.id).unwrap().attr);
        w.add_doll(doll);
        w.player_mut(sess.id).unwrap().invisible = true;
        rx.drain();

        run(&mut w, &srv);
        assert!(w.dolls.is_empty());
        assert_eq!(w.player(sess.id).unwrap().attr.ac, ac);
        let ops = testutil::ops(&mut rx);
        assert_eq!(ops[0], S_SOUND_EFFECT);
        assert!(ops.contains(&S_STATUS));
    }

    #[tokio::test]
    async fn test_follower_lost_goes_home() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (_sess, _rx) = testutil::join(&mut w, 1, 33000, 33000);
        let anchor = SpawnAnchor { map_id: 4, x: 33100, y: 33100, ..Default::default() };
        let id = w.ids.next(IdKind::Follower);
        w.add_follower(Follower {
            id,
            owner: 1,
            npc_id: 45001,
            gfx: 0,
            nameid: "Orc".into(),
            map_id: 4,
            x: 33020,
            y: 33000,
            heading: 0,
            ticks_left: 1000,
            anchor,
        });

        run(&mut w, &srv);
        assert!(w.followers.is_empty());
        assert_eq!(w.respawns.len(), 1);
        assert_eq!(w.respawns[0].anchor, anchor);
    }
}
