//! What a client has on screen: object packs, known-cache upkeep, the
//! rollback sequence and the teleport sequence.

use crate::game::aoi::chebyshev;
use crate::game::world::World;
use crate::game::{EntityKind, EntityRef};

use super::handlers::trade;
use super::packets;

/// Object pack for any entity kind; companions carry their master's name.
pub fn put_packet(w: &World, r: EntityRef) -> Option<Vec<u8>> {
    let master = |owner: i32| w.player_by_char(owner).map(|p| p.name.clone()).unwrap_or_default();
    let (kind, id) = r;
    match kind {
        EntityKind::Player => w.player_by_char(id).map(packets::put_player),
        EntityKind::Npc => w.npcs.get(&id).map(packets::put_npc),
        EntityKind::Summon => w.summons.get(&id).map(|s| packets::put_summon(s, &master(s.owner))),
        EntityKind::Pet => w.pets.get(&id).map(|p| packets::put_pet(p, &master(p.owner))),
        EntityKind::Doll => w.dolls.get(&id).map(|d| packets::put_doll(d, &master(d.owner))),
        EntityKind::Follower => w.followers.get(&id).map(|f| packets::put_follower(f, &master(f.owner))),
        EntityKind::Ground => w.ground.get(&id).map(packets::put_ground),
        EntityKind::Door => w.doors.get(&id).map(packets::put_door),
    }
}

/// Passability overrides for a door's span.
pub fn door_attrs(w: &World, door_id: i32) -> Vec<Vec<u8>> {
    let Some(d) = w.doors.get(&door_id) else { return Vec::new() };
    let blocked = d.blocks();
    d.tiles()
        .into_iter()
        .map(|(x, y)| packets::change_attr(x, y, d.direction.clamp(0, 1) as u8, blocked))
        .collect()
}

/// Sends every entity in the player's AOI and records it as known.
pub fn refresh_view(w: &mut World, sid: u64) {
    let Some(p) = w.player(sid) else { return };
    let (map, x, y, me) = (p.map_id, p.x, p.y, p.char_id);
    let mut out = Vec::new();
    let mut seen = Vec::new();
    for (r, ex, ey) in w.nearby(map, x, y, w.aoi_radius) {
        if r == (EntityKind::Player, me) {
            continue;
        }
        if let Some(pkt) = put_packet(w, r) {
            out.push(pkt);
            seen.push((r, ex, ey));
        }
        if r.0 == EntityKind::Door {
            out.extend(door_attrs(w, r.1));
        }
    }
    let Some(p) = w.player_mut(sid) else { return };
    for pkt in out {
        p.outbox.send(pkt);
    }
    for ((kind, id), ex, ey) in seen {
        p.known.insert(kind, id, ex, ey);
    }
}

/// Shows `r` to every player whose AOI covers it, marking it known.
pub fn announce(w: &mut World, r: EntityRef) {
    let Some((map, x, y)) = w.position_of(r) else { return };
    let Some(pkt) = put_packet(w, r) else { return };
    let skip = if r.0 == EntityKind::Player { Some(r.1) } else { None };
    for sid in w.nearby_sessions(map, x, y, skip) {
        if let Some(p) = w.player_mut(sid) {
            p.outbox.send(pkt.clone());
            p.known.insert(r.0, r.1, x, y);
        }
    }
}

/// Sends a remove-object to everyone holding `r` and forgets it there.
pub fn broadcast_remove(w: &mut World, r: EntityRef) {
    let pkt = packets::remove_object(r.1);
    for p in w.players.values_mut() {
        if p.known.remove(r.0, r.1) {
            p.outbox.send(pkt.clone());
        }
    }
}

/// Rebuilds the client's picture after a rejected move.
pub fn rollback(w: &mut World, sid: u64) {
    let Some(p) = w.player_mut(sid) else { return };
    p.outbox.send(packets::own_char_pack(p));
    p.known.reset();
    refresh_view(w, sid);
    if let Some(p) = w.player(sid) {
        p.outbox.send(packets::change_desc(p.char_id, p.current_weapon));
    }
}

/// The one teleport path. Releases locks, moves the player and their
/// companions, and replays the new surroundings.
pub fn teleport(w: &mut World, sid: u64, map_id: i16, x: i32, y: i32, heading: u8) {
    let Some(p) = w.player_mut(sid) else { return };
    let char_id = p.char_id;
    let from = (p.map_id, p.x, p.y);
    p.last_move = None;
    p.pending_teleport = None;
    p.warehouse = None;
    w.unlock_clan_warehouse(char_id);
    trade::cancel_in_world(w, sid);

    broadcast_remove(w, (EntityKind::Player, char_id));
    w.update_position(sid, map_id, x, y, heading);

    let Some(p) = w.player_mut(sid) else { return };
    p.outbox.send(packets::world_map(map_id));
    p.known.reset();
    announce(w, (EntityKind::Player, char_id));

    if let Some(p) = w.player(sid) {
        p.outbox.send(packets::own_char_pack(p));
    }
    follow_owner(w, char_id, from, (map_id, x, y));
    refresh_view(w, sid);
    if let Some(p) = w.player(sid) {
        p.outbox.send(packets::teleport_unlock());
    }
    tracing::debug!("[world] [teleport] char={} map={} x={} y={}", char_id, map_id, x, y);
}

/// Brings the owner's companions along, dropping them next to the
/// destination. Companions that were out of range stay behind.
fn follow_owner(w: &mut World, owner: i32, from: (i16, i32, i32), to: (i16, i32, i32)) {
    let mut refs: Vec<EntityRef> = Vec::new();
    refs.extend(w.summons_of(owner).into_iter().map(|id| (EntityKind::Summon, id)));
    refs.extend(w.pets_of(owner).into_iter().map(|id| (EntityKind::Pet, id)));
    refs.extend(w.dolls_of(owner).into_iter().map(|id| (EntityKind::Doll, id)));
    refs.extend(w.followers_of(owner).into_iter().map(|id| (EntityKind::Follower, id)));
    for (i, r) in refs.into_iter().enumerate() {
        let Some((m, cx, cy)) = w.position_of(r) else { continue };
        if m != from.0 || chebyshev(cx, cy, from.1, from.2) > w.aoi_radius {
            continue;
        }
        broadcast_remove(w, r);
        let (dx, dy) = SPREAD[i % SPREAD.len()];
        w.move_companion(r, to.0, to.1 + dx, to.2 + dy, 0);
        announce(w, r);
    }
}

const SPREAD: [(i32, i32); 8] = [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, 1), (-1, 1), (1, -1)];
