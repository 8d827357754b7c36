//! Monster and guard behaviour: picking targets, chasing, striking,
//! strolling around the spawn point and walking home.
//!
//! NPC targets are character ids. The hate table fills as players deal
//! damage, so a monster that loses its current target falls back to the
//! next most hated player still in reach.

use crate::database::map_db::{heading_to, HEADING_DX, HEADING_DY};
use crate::game::aoi::chebyshev;
use crate::game::poison::Poison;
use crate::game::scripting::CombatContext;
use crate::game::world::World;

use super::super::{packets, GameServer};
use super::combat::kill_player;
use super::poison;

/// Distance at which aggressive monsters notice a player.
pub const AGGRO_RANGE: i32 = 8;
/// A chase is abandoned past this distance.
pub const LEASH_RANGE: i32 = 15;
/// Idle monsters stay within this box around their anchor.
pub const WANDER_RADIUS: i32 = 6;
/// Guards that end up further from their post than this are put back.
const GUARD_RECALL_RANGE: i32 = 30;
/// One in this many idle ticks starts a stroll.
const WANDER_CHANCE: u32 = 20;

pub fn run(w: &mut World, srv: &GameServer) {
    let ids: Vec<i32> = w.npcs.iter().filter(|(_, n)| n.is_alive() && (n.monster || n.guard)).map(|(&id, _)| id).collect();
    for id in ids {
        tick_npc(w, srv, id);
    }
}

fn tick_npc(w: &mut World, srv: &GameServer, id: i32) {
    let Some(n) = w.npcs.get_mut(&id) else { return };
    if !n.is_alive() || n.paralyzed || n.sleeped {
        return;
    }
    n.attack_wait = n.attack_wait.saturating_sub(1);
    n.move_wait = n.move_wait.saturating_sub(1);

    let target = current_target(w, id).or_else(|| acquire_target(w, srv, id));
    match target {
        Some(sid) => engage(w, srv, id, sid),
        None => idle(w, srv, id),
    }
}

/// Session of the NPC's target if it is still worth chasing. Invalid
/// targets are dropped from the hate table and the next most hated player
/// takes over.
fn current_target(w: &mut World, id: i32) -> Option<u64> {
    loop {
        let n = w.npcs.get(&id)?;
        if n.target == 0 {
            return None;
        }
        let (map, x, y, char_id) = (n.map_id, n.x, n.y, n.target);
        let valid = w.session_of_char(char_id).filter(|&sid| {
            w.player(sid)
                .is_some_and(|p| p.is_alive() && p.map_id == map && chebyshev(x, y, p.x, p.y) <= LEASH_RANGE)
        });
        if valid.is_some() {
            return valid;
        }
        let n = w.npcs.get_mut(&id)?;
        n.hate.remove(&char_id);
        n.target = n.hate.iter().max_by_key(|(_, &h)| h).map(|(&c, _)| c).unwrap_or(0);
    }
}

/// Aggressive monsters take the nearest visible player within
/// [`AGGRO_RANGE`] outside safety zones. Guards go after chaotic players.
fn acquire_target(w: &mut World, srv: &GameServer, id: i32) -> Option<u64> {
    let n = w.npcs.get(&id)?;
    if !n.agro && !n.guard {
        return None;
    }
    let (map, x, y, guard) = (n.map_id, n.x, n.y, n.guard);
    let best = w
        .nearby_sessions(map, x, y, None)
        .into_iter()
        .filter_map(|sid| w.player(sid).map(|p| (sid, p)))
        .filter(|(_, p)| p.is_alive() && !p.invisible)
        .filter(|(_, p)| !srv.data.maps.is_safety_zone(p.map_id, p.x, p.y))
        .filter(|(_, p)| !guard || p.lawful < 0)
        .map(|(sid, p)| (chebyshev(x, y, p.x, p.y), sid, p.char_id))
        .filter(|&(d, _, _)| d <= AGGRO_RANGE)
        .min_by_key(|&(d, _, _)| d);
    let (_, sid, char_id) = best?;
    let n = w.npcs.get_mut(&id)?;
    n.target = char_id;
    // react at once instead of finishing a stroll
    n.move_wait = 0;
    n.wander_dist = 0;
    tracing::debug!("[npc] [aggro] npc={} id={} target={}", n.npc_id, id, char_id);
    Some(sid)
}

fn engage(w: &mut World, srv: &GameServer, id: i32, sid: u64) {
    let (Some(n), Some(p)) = (w.npcs.get(&id), w.player(sid)) else { return };
    let dist = chebyshev(n.x, n.y, p.x, p.y);
    let reach = n.ranged.max(1);
    let (tx, ty) = (p.x, p.y);
    if dist <= reach {
        if n.attack_wait == 0 {
            strike(w, srv, id, sid);
        }
    } else if n.move_wait == 0 {
        step_toward(w, srv, id, tx, ty);
    }
}

/// One melee or ranged swing at a player.
fn strike(w: &mut World, srv: &GameServer, id: i32, sid: u64) {
    let (Some(n), Some(p)) = (w.npcs.get(&id), w.player(sid)) else { return };
    let ctx = CombatContext {
        attacker_level: n.level,
        attacker_str: n.str,
        attacker_dex: n.dex,
        target_ac: p.attr.ac,
        target_level: p.level,
        target_mr: p.attr.mr,
        target_class_type: i32::from(p.class_type),
        ..Default::default()
    };
    let outcome = srv.scripting.calc_npc_melee(&ctx);
    let damage = if outcome.is_hit { outcome.damage.max(0) } else { 0 };
    let heading = heading_to(n.x, n.y, p.x, p.y);
    let (map, nx, ny, px, py, victim) = (n.map_id, n.x, n.y, p.x, p.y, p.char_id);
    let pkt = if n.ranged > 1 {
        packets::attack_arrow(id, victim, damage, heading, w.next_projectile(), (nx, ny), (px, py))
    } else {
        packets::attack_melee(id, victim, damage, heading)
    };

    if let Some(n) = w.npcs.get_mut(&id) {
        n.heading = heading;
        n.attack_wait = n.attack_interval;
    }
    w.broadcast_nearby(map, nx, ny, None, &pkt);
    if damage == 0 {
        return;
    }

    let venom = w.npcs.get(&id).map_or(0, |n| n.poison_atk);
    let Some(p) = w.player_mut(sid) else { return };
    if p.sleeped {
        p.sleeped = false;
        p.outbox.send(packets::paralysis(packets::PARALYSIS_SLEEP_OFF));
    }
    p.hp = (p.hp - damage).max(0);
    p.mark_dirty();
    if p.hp > 0 {
        p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
        if p.poison.is_none() && venom != 0 && srv.scripting.poison_infects() {
            if let Some(kind) = Poison::from_attack(venom) {
                poison::infect(w, sid, kind);
            }
        }
        return;
    }
    kill_player(w, srv, sid);
    if let Some(n) = w.npcs.get_mut(&id) {
        n.hate.remove(&victim);
        n.target = 0;
    }
}

/// No target: guards walk back to their post, monsters stroll near their
/// anchor. Nothing moves where nobody can see it.
fn idle(w: &mut World, srv: &GameServer, id: i32) {
    let Some(n) = w.npcs.get(&id) else { return };
    let (map, x, y, guard) = (n.map_id, n.x, n.y, n.guard);
    let (hx, hy) = (n.anchor.x, n.anchor.y);
    let home_dist = chebyshev(x, y, hx, hy);

    if guard && home_dist > GUARD_RECALL_RANGE {
        recall(w, srv, id);
        return;
    }
    if n.move_wait > 0 || w.nearby_sessions(map, x, y, None).is_empty() {
        return;
    }
    if guard {
        if home_dist > 0 {
            step_toward(w, srv, id, hx, hy);
        }
        return;
    }
    if home_dist > WANDER_RADIUS {
        step_toward(w, srv, id, hx, hy);
        return;
    }
    wander(w, srv, id);
}

fn wander(w: &mut World, srv: &GameServer, id: i32) {
    let Some(n) = w.npcs.get_mut(&id) else { return };
    if n.wander_dist == 0 {
        if rand::random_range(0..WANDER_CHANCE) != 0 {
            return;
        }
        n.wander_dir = rand::random_range(0..8u8);
        n.wander_dist = rand::random_range(2..=6);
    }
    n.wander_dist -= 1;
    let (map, x, y, dir, interval) = (n.map_id, n.x, n.y, n.wander_dir, n.move_interval);
    let h = usize::from(dir);
    let (nx, ny) = (x + HEADING_DX[h], y + HEADING_DY[h]);
    let (ax, ay) = (n.anchor.x, n.anchor.y);
    if chebyshev(nx, ny, ax, ay) > WANDER_RADIUS || !w.can_step(&srv.data.maps, map, x, y, dir, id) {
        if let Some(n) = w.npcs.get_mut(&id) {
            n.wander_dist = 0;
        }
        return;
    }
    commit_step(w, id, nx, ny, dir, interval);
}

/// Greedy chase: straight at the goal, else the two neighbouring steps.
/// Stays put when every candidate is blocked.
pub fn step_toward(w: &mut World, srv: &GameServer, id: i32, tx: i32, ty: i32) {
    let Some(n) = w.npcs.get(&id) else { return };
    let (map, x, y, interval) = (n.map_id, n.x, n.y, n.move_interval);
    let Some((nx, ny, h)) = pick_step(w, srv, map, x, y, tx, ty, id) else {
        if let Some(n) = w.npcs.get_mut(&id) {
            n.move_wait = interval;
        }
        return;
    };
    commit_step(w, id, nx, ny, h, interval);
}

/// First free step from (x, y) towards (tx, ty) for `mover`.
pub fn pick_step(w: &World, srv: &GameServer, map: i16, x: i32, y: i32, tx: i32, ty: i32, mover: i32) -> Option<(i32, i32, u8)> {
    let (dx, dy) = ((tx - x).signum(), (ty - y).signum());
    if dx == 0 && dy == 0 {
        return None;
    }
    let mut candidates = vec![(x + dx, y + dy)];
    if dx != 0 && dy != 0 {
        candidates.extend([(x + dx, y), (x, y + dy)]);
    } else if dx != 0 {
        candidates.extend([(x + dx, y + 1), (x + dx, y - 1)]);
    } else {
        candidates.extend([(x + 1, y + dy), (x - 1, y + dy)]);
    }
    candidates.into_iter().find_map(|(cx, cy)| {
        let h = heading_to(x, y, cx, cy);
        w.can_step(&srv.data.maps, map, x, y, h, mover).then_some((cx, cy, h))
    })
}

fn commit_step(w: &mut World, id: i32, nx: i32, ny: i32, heading: u8, interval: u32) {
    let Some(n) = w.npcs.get(&id) else { return };
    let (map, ox, oy) = (n.map_id, n.x, n.y);
    w.move_npc(id, nx, ny, heading);
    if let Some(n) = w.npcs.get_mut(&id) {
        n.move_wait = interval;
    }
    w.broadcast_nearby(map, nx, ny, None, &packets::move_object(id, ox, oy, heading));
}

/// Puts a guard straight back on its post.
fn recall(w: &mut World, srv: &GameServer, id: i32) {
    let Some(n) = w.npcs.get(&id) else { return };
    let (map, hx, hy) = (n.map_id, n.anchor.x, n.anchor.y);
    let Some((x, y)) = w.free_tile_near(&srv.data.maps, map, hx, hy, 3) else { return };
    super::super::view::broadcast_remove(w, (crate::game::EntityKind::Npc, id));
    w.move_npc(id, x, y, 0);
    if let Some(n) = w.npcs.get_mut(&id) {
        n.target = 0;
        n.hate.clear();
    }
    tracing::debug!("[npc] [guard_recalled] id={} x={} y={}", id, x, y);
}
