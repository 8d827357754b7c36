//! Dot-prefixed console commands for GM characters, typed into normal chat.

use std::sync::Arc;

use rayon::prelude::*;

use crate::core::secs_to_ticks;
use crate::game::aoi::chebyshev;
use crate::game::buff::{Buff, SideEffect, HASTE_CONFLICTS, SKILL_SHAPE_CHANGE, STATUS_HASTE};
use crate::game::ids::IdKind;
use crate::game::npc::{Npc, SpawnAnchor};
use crate::game::scripting::formulas::exp_for_level;
use crate::game::world::World;
use crate::game::EntityKind;
use crate::session::Session;

use super::super::systems::{combat, persistence};
use super::super::view::{announce, teleport};
use super::super::{packets, GameServer};
use super::{give_item, send_status, skill};

const MAX_SPAWN: i32 = 50;
const MAX_STRESS: i32 = 2000;
const KILL_RANGE: i32 = 3;
const SPAWN_SEARCH: i32 = 5;
/// Seconds a GM polymorph or haste lasts.
const GM_BUFF_SECS: u32 = 3600;

const HELP: &str = ".level N  .hp N  .mp N  .heal  .spawn npc [n]  .kill  .move x y [map]  .recall name  \
.give item [n] [enchant]  .save  .who  .poly gfx  .unpoly  .speed  .stress npc n";

/// Runs `text` as a GM command. False when it is not one, so the caller
/// treats it as ordinary chat.
pub async fn try_command(srv: &Arc<GameServer>, sess: &Arc<Session>, text: &str) -> bool {
    let Some(line) = text.strip_prefix('.') else { return false };
    let save = {
        let mut w = srv.world.lock().await;
        if !w.player(sess.id).is_some_and(|p| p.is_gm) {
            return false;
        }
        execute(&mut w, srv, sess.id, line)
    };
    if let Some(job) = save {
        let ok = persistence::save(&srv.repos, job).await;
        let w = srv.world.lock().await;
        reply(&w, sess.id, if ok { "saved" } else { "save failed" });
    }
    true
}

fn reply(w: &World, sid: u64, text: &str) {
    if let Some(p) = w.player(sid) {
        p.outbox.send(packets::system_message(text));
    }
}

fn arg<T: std::str::FromStr>(args: &[&str], i: usize) -> Option<T> {
    args.get(i).and_then(|s| s.parse().ok())
}

/// Executes one command line (without the dot). A save request comes back
/// to the caller so the write happens outside the world lock.
pub fn execute(w: &mut World, srv: &GameServer, sid: u64, line: &str) -> Option<persistence::SaveJob> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("").to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();
    let gm = w.player(sid).map(|p| p.name.clone()).unwrap_or_default();
    tracing::info!("[gm] [command] char={} line={}", gm, line);

    match cmd.as_str() {
        "help" => reply(w, sid, HELP),
        "level" => match arg::<i32>(&args, 0) {
            Some(n) if (1..=99).contains(&n) => set_level(w, srv, sid, n),
            _ => reply(w, sid, ".level 1-99"),
        },
        "hp" | "mp" => match arg::<i32>(&args, 0) {
            Some(n) if n >= 0 => set_vital(w, srv, sid, cmd == "hp", n),
            _ => reply(w, sid, "value?"),
        },
        "heal" => {
            let Some(p) = w.player_mut(sid) else { return None };
            p.hp = p.attr.max_hp;
            p.mp = p.attr.max_mp;
            p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
            p.outbox.send(packets::mana_point(p.mp, p.attr.max_mp));
        }
        "spawn" => match arg::<i32>(&args, 0) {
            Some(npc_id) => {
                let count = arg::<i32>(&args, 1).unwrap_or(1).clamp(1, MAX_SPAWN);
                let n = spawn_near(w, srv, sid, npc_id, count);
                reply(w, sid, &format!("spawned {}", n));
            }
            None => reply(w, sid, ".spawn npcId [count]"),
        },
        "kill" => {
            let n = kill_nearby(w, srv, sid);
            reply(w, sid, &format!("killed {}", n));
        }
        "move" => match (arg::<i32>(&args, 0), arg::<i32>(&args, 1)) {
            (Some(x), Some(y)) => {
                let map = arg::<i16>(&args, 2).or_else(|| w.player(sid).map(|p| p.map_id))?;
                if srv.data.maps.has_map(map) && !srv.data.maps.is_in_map(map, x, y) {
                    reply(w, sid, "outside map");
                } else {
                    let heading = w.player(sid).map(|p| p.heading).unwrap_or(0);
                    teleport(w, sid, map, x, y, heading);
                }
            }
            _ => reply(w, sid, ".move x y [map]"),
        },
        "recall" => match args.first() {
            Some(name) => recall(w, srv, sid, name),
            None => reply(w, sid, ".recall name"),
        },
        "give" => match arg::<i32>(&args, 0) {
            Some(item_id) => {
                let count = arg::<i32>(&args, 1).unwrap_or(1).max(1);
                let enchant = arg::<i32>(&args, 2).unwrap_or(0);
                match srv.data.items.get(item_id) {
                    Some(tpl) if give_item(w, sid, tpl, count, enchant).is_some() => {}
                    Some(_) => reply(w, sid, "inventory full"),
                    None => reply(w, sid, "no such item"),
                }
            }
            None => reply(w, sid, ".give itemId [count] [enchant]"),
        },
        "save" => {
            let p = w.player(sid)?;
            let pets = w.pets_of(p.char_id).iter().filter_map(|id| w.pets.get(id)).map(|pet| pet.to_row()).collect();
            return Some(persistence::SaveJob::full(p, pets));
        }
        "who" => {
            let mut names: Vec<String> = w.players.values().map(|p| p.name.clone()).collect();
            names.sort();
            reply(w, sid, &format!("{} online: {}", names.len(), names.join(", ")));
        }
        "poly" => match arg::<i32>(&args, 0) {
            Some(gfx) if gfx > 0 => {
                let buff = Buff::new(SKILL_SHAPE_CHANGE, secs_to_ticks(GM_BUFF_SECS)).with_effect(SideEffect::Poly(gfx));
                apply_gm_buff(w, sid, buff, &[SKILL_SHAPE_CHANGE]);
            }
            _ => reply(w, sid, ".poly gfx"),
        },
        "unpoly" => {
            if let Some(old) = w.player_mut(sid).and_then(|p| p.remove_buff(SKILL_SHAPE_CHANGE)) {
                skill::buff_icon(w, sid, &old, 0);
            }
        }
        "speed" => {
            let buff = Buff::new(STATUS_HASTE, secs_to_ticks(GM_BUFF_SECS)).with_effect(SideEffect::MoveSpeed(1));
            apply_gm_buff(w, sid, buff, &HASTE_CONFLICTS);
        }
        "stress" => match (arg::<i32>(&args, 0), arg::<i32>(&args, 1)) {
            (Some(npc_id), Some(count)) => {
                let n = stress(w, srv, sid, npc_id, count.clamp(1, MAX_STRESS));
                reply(w, sid, &format!("stress spawned {}", n));
            }
            _ => reply(w, sid, ".stress npcId count"),
        },
        _ => reply(w, sid, "unknown command, try .help"),
    }
    None
}

fn set_level(w: &mut World, srv: &GameServer, sid: u64, level: i32) {
    let Some(p) = w.player_mut(sid) else { return };
    let target = exp_for_level(level);
    if level > p.level {
        let gain = target - p.exp;
        combat::add_exp(w, srv, sid, gain);
        return;
    }
    p.level = level;
    p.exp = target;
    p.mark_dirty();
    p.outbox.send(packets::exp(p.level, p.exp));
    send_status(p, srv.now_secs());
}

fn set_vital(w: &mut World, srv: &GameServer, sid: u64, hp: bool, value: i32) {
    let Some(p) = w.player_mut(sid) else { return };
    if hp {
        p.hp = value.clamp(1, p.attr.max_hp);
        p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
    } else {
        p.mp = value.min(p.attr.max_mp);
        p.outbox.send(packets::mana_point(p.mp, p.attr.max_mp));
    }
    p.mark_dirty();
    send_status(p, srv.now_secs());
}

/// Replaces whatever shares the slot, then shows the new state.
fn apply_gm_buff(w: &mut World, sid: u64, buff: Buff, conflicts: &[i32]) {
    for &id in conflicts {
        if let Some(old) = w.player_mut(sid).and_then(|p| p.remove_buff(id)) {
            skill::buff_icon(w, sid, &old, 0);
        }
    }
    let secs = buff.secs_left();
    let Some(p) = w.player_mut(sid) else { return };
    p.add_buff(buff.clone());
    skill::buff_icon(w, sid, &buff, secs);
}

/// GM spawns never respawn.
fn spawn_near(w: &mut World, srv: &GameServer, sid: u64, npc_id: i32, count: i32) -> i32 {
    let Some(tpl) = srv.data.npcs.get(npc_id) else { return 0 };
    let Some(p) = w.player(sid) else { return 0 };
    let (map, x, y, heading) = (p.map_id, p.x, p.y, p.heading);
    let mut spawned = 0;
    for _ in 0..count {
        let Some((nx, ny)) = w.free_tile_near(&srv.data.maps, map, x, y, SPAWN_SEARCH) else { break };
        let anchor = SpawnAnchor { map_id: map, x: nx, y: ny, heading, respawn_secs: 0, ..Default::default() };
        let id = w.ids.next(IdKind::Npc);
        let id = w.add_npc(Npc::from_template(id, tpl, anchor, nx, ny));
        announce(w, (EntityKind::Npc, id));
        spawned += 1;
    }
    spawned
}

/// Mass spawn for load testing. Candidate tiles are filtered against the
/// static map in parallel; occupancy is checked afterwards under the lock.
/// Viewers pick the new NPCs up on the next visibility pass.
fn stress(w: &mut World, srv: &GameServer, sid: u64, npc_id: i32, count: i32) -> i32 {
    let Some(tpl) = srv.data.npcs.get(npc_id) else { return 0 };
    let Some(p) = w.player(sid) else { return 0 };
    let (map, cx, cy) = (p.map_id, p.x, p.y);
    let half = (f64::from(count).sqrt().ceil() as i32).max(1);
    let maps = &srv.data.maps;
    let check_static = maps.has_map(map);

    let mut tiles: Vec<(i32, i32)> = (cx - half..=cx + half)
        .into_par_iter()
        .flat_map_iter(|x| {
            (cy - half..=cy + half)
                .filter(move |&y| !check_static || maps.is_passable_point(map, x, y))
                .map(move |y| (x, y))
        })
        .collect();
    tiles.sort_by_key(|&(x, y)| chebyshev(cx, cy, x, y));

    let mut spawned = 0;
    for (x, y) in tiles {
        if spawned >= count {
            break;
        }
        if w.is_occupied(map, x, y, 0) || w.door_blocks(map, x, y) {
            continue;
        }
        let anchor = SpawnAnchor { map_id: map, x, y, respawn_secs: 0, ..Default::default() };
        let id = w.ids.next(IdKind::Npc);
        w.add_npc(Npc::from_template(id, tpl, anchor, x, y));
        spawned += 1;
    }
    tracing::info!("[gm] [stress] npc={} requested={} spawned={} map={}", npc_id, count, spawned, map);
    spawned
}

/// Kills living NPCs around the GM without rewards.
fn kill_nearby(w: &mut World, srv: &GameServer, sid: u64) -> i32 {
    let Some(p) = w.player(sid) else { return 0 };
    let ids: Vec<i32> = w
        .nearby_npcs(p.map_id, p.x, p.y, KILL_RANGE)
        .into_iter()
        .filter(|id| w.npcs.get(id).is_some_and(|n| n.is_alive()))
        .collect();
    for &id in &ids {
        combat::npc_death(w, srv, id, 0);
    }
    ids.len() as i32
}

fn recall(w: &mut World, srv: &GameServer, sid: u64, name: &str) {
    let Some(target) = w.session_by_name(name) else {
        reply(w, sid, "not online");
        return;
    };
    if target == sid {
        return;
    }
    let Some(p) = w.player(sid) else { return };
    let (map, x, y, heading) = (p.map_id, p.x, p.y, p.heading);
    let (tx, ty) = w.free_tile_near(&srv.data.maps, map, x, y, SPAWN_SEARCH).unwrap_or((x, y));
    teleport(w, target, map, tx, ty, heading);
    reply(w, sid, &format!("recalled {}", name));
}
