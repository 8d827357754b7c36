//! Dropping, picking up, and doors.

use std::sync::Arc;

use crate::core::secs_to_ticks;
use crate::game::aoi::chebyshev;
use crate::game::door::DOOR_USE_RANGE;
use crate::game::ground::{GroundItem, PICKUP_RANGE};
use crate::game::ids::IdKind;
use crate::game::inventory::Removal;
use crate::game::world::World;
use crate::game::EntityKind;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::view::{announce, broadcast_remove, door_attrs};
use super::super::{packets, GameServer};
use super::{send_added, send_msg, send_removal, GiveError, MSG_CANNOT_DROP, MSG_INVENTORY_FULL, MSG_OVERWEIGHT};

/// Why a drop or pickup was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundError {
    NoSuchItem,
    Equipped,
    Bound,
    TooFar,
    NotYours,
    Give(GiveError),
}

/// Moves `count` of `obj_id` (everything when `count <= 0`) onto the
/// player's tile. Returns the ground id.
pub fn drop_to_ground(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, count: i32) -> Result<i32, GroundError> {
    let ttl = secs_to_ticks(srv.config.ground_item_ttl_secs);
    let World { ids, players, .. } = &mut *w;
    let p = players.get_mut(&sid).ok_or(GroundError::NoSuchItem)?;
    if !p.is_alive() {
        return Err(GroundError::NoSuchItem);
    }
    let it = p.inventory.find(obj_id).ok_or(GroundError::NoSuchItem)?;
    if it.equipped {
        return Err(GroundError::Equipped);
    }
    if srv.data.items.get(it.item_id).is_some_and(|t| t.untradeable) {
        return Err(GroundError::Bound);
    }
    let count = if count <= 0 || count > it.count { it.count } else { count };
    let mut dropped = it.clone();
    dropped.count = count;

    let removal = p.inventory.remove(obj_id, count).ok_or(GroundError::NoSuchItem)?;
    if matches!(removal, Removal::Reduced { .. }) {
        // the rest of the stack keeps the original object id
        dropped.obj_id = ids.next(IdKind::Item);
    }
    send_removal(p, &removal);
    p.mark_dirty();
    let (map, x, y) = (p.map_id, p.x, p.y);
    let id = ids.next(IdKind::Ground);
    tracing::debug!("[ground] [dropped] char={} item={} count={} ground={}", p.char_id, dropped.item_id, count, id);

    w.add_ground(GroundItem::new(id, dropped, map, x, y, ttl));
    announce(w, (EntityKind::Ground, id));
    Ok(id)
}

/// Takes a ground item into the player's bag.
pub fn pick_up_item(w: &mut World, srv: &GameServer, sid: u64, ground_id: i32) -> Result<(), GroundError> {
    let p = w.player(sid).ok_or(GroundError::NoSuchItem)?;
    if !p.is_alive() {
        return Err(GroundError::NoSuchItem);
    }
    let g = w.ground.get(&ground_id).ok_or(GroundError::NoSuchItem)?;
    if g.map_id != p.map_id || chebyshev(p.x, p.y, g.x, g.y) > PICKUP_RANGE {
        return Err(GroundError::TooFar);
    }
    if !g.may_pick(p.char_id) {
        return Err(GroundError::NotYours);
    }
    if let Some(tpl) = srv.data.items.get(g.item.item_id) {
        super::can_receive(p, tpl, g.item.count).map_err(GroundError::Give)?;
    } else if p.inventory.is_full() {
        return Err(GroundError::Give(GiveError::Full));
    }

    broadcast_remove(w, (EntityKind::Ground, ground_id));
    let Some(g) = w.remove_ground(ground_id) else { return Err(GroundError::NoSuchItem) };
    let Some(p) = w.player_mut(sid) else { return Err(GroundError::NoSuchItem) };
    let (item_id, count) = (g.item.item_id, g.item.count);
    let out = p.inventory.restore(g.item);
    p.mark_dirty();
    send_added(p, out);
    tracing::debug!("[ground] [picked_up] char={} item={} count={}", p.char_id, item_id, count);
    Ok(())
}

/// `C_DROP [D obj][D count]`.
pub async fn drop_item(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let count = r.read_d();

    let mut w = srv.world.lock().await;
    match drop_to_ground(&mut w, srv, sess.id, obj_id, count) {
        Ok(_) => {}
        Err(GroundError::Bound) => {
            if let Some(p) = w.player(sess.id) {
                send_msg(p, MSG_CANNOT_DROP);
            }
        }
        Err(e) => tracing::debug!("[ground] [drop_refused] session={} obj={} reason={:?}", sess.id, obj_id, e),
    }
}

/// `C_GET [H x][H y][D ground id][D count]`. The whole pile is taken.
pub async fn pick_up(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let _x = r.read_h();
    let _y = r.read_h();
    let ground_id = r.read_d();
    let _count = r.read_d();

    let mut w = srv.world.lock().await;
    match pick_up_item(&mut w, srv, sess.id, ground_id) {
        Ok(()) => {}
        Err(GroundError::Give(e)) => {
            if let Some(p) = w.player(sess.id) {
                send_msg(p, if e == GiveError::Full { MSG_INVENTORY_FULL } else { MSG_OVERWEIGHT });
            }
        }
        Err(e) => tracing::debug!("[ground] [pickup_refused] session={} ground={} reason={:?}", sess.id, ground_id, e),
    }
}

/// Opens or closes a door next to the player. False when out of reach or locked.
pub fn toggle_door(w: &mut World, sid: u64, door_id: i32) -> bool {
    let Some(p) = w.player(sid) else { return false };
    let Some(d) = w.doors.get(&door_id) else { return false };
    if !p.is_alive() || !d.usable() || d.map_id != p.map_id || chebyshev(p.x, p.y, d.x, d.y) > DOOR_USE_RANGE {
        return false;
    }
    let Some(d) = w.doors.get_mut(&door_id) else { return false };
    let open = d.toggle();
    let (map, x, y, action) = (d.map_id, d.x, d.y, d.action());
    let pack = packets::put_door(d);
    let attrs = door_attrs(w, door_id);
    for viewer in w.nearby_sessions(map, x, y, None) {
        if let Some(v) = w.player(viewer) {
            v.outbox.send(pack.clone());
            v.outbox.send(packets::action(door_id, action));
            for a in &attrs {
                v.outbox.send(a.clone());
            }
        }
    }
    tracing::debug!("[door] [toggled] door={} open={}", door_id, open);
    true
}

/// `C_OPEN [H x][H y][D door]`.
pub async fn open_door(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let _x = r.read_h();
    let _y = r.read_h();
    let door_id = r.read_d();
    let mut w = srv.world.lock().await;
    toggle_door(&mut w, sess.id, door_id);
}
