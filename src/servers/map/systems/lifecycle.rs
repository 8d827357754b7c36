//! Things that come and go on their own: dropped items expiring, corpses
//! rotting away and NPCs respawning.

use crate::core::TICKS_PER_SEC;
use crate::game::world::{PendingRespawn, World};
use crate::game::EntityKind;

use super::super::{view, GameServer};

/// Retry delay when a spawn box has no free tile.
const RESPAWN_RETRY_TICKS: u32 = 5 * TICKS_PER_SEC;

pub fn run(w: &mut World, srv: &GameServer) {
    expire_ground(w);
    rot_corpses(w);
    respawn(w, srv);
}

fn expire_ground(w: &mut World) {
    let mut expired = Vec::new();
    for (id, g) in w.ground.iter_mut() {
        if g.tick() {
            expired.push(*id);
        }
    }
    for id in expired {
        view::broadcast_remove(w, (EntityKind::Ground, id));
        if let Some(g) = w.remove_ground(id) {
            tracing::debug!("[ground] [expired] id={} item={} map={} x={} y={}", id, g.item.item_id, g.map_id, g.x, g.y);
        }
    }
}

fn rot_corpses(w: &mut World) {
    let mut gone = Vec::new();
    for (id, n) in w.npcs.iter_mut().filter(|(_, n)| n.dead) {
        n.delete_ticks = n.delete_ticks.saturating_sub(1);
        if n.delete_ticks == 0 {
            gone.push(*id);
        }
    }
    for id in gone {
        view::broadcast_remove(w, (EntityKind::Npc, id));
        w.remove_npc(id);
    }
}

fn respawn(w: &mut World, srv: &GameServer) {
    let mut due = Vec::new();
    w.respawns.retain_mut(|r| {
        r.ticks_left = r.ticks_left.saturating_sub(1);
        if r.ticks_left == 0 {
            due.push(*r);
            false
        } else {
            true
        }
    });
    for r in due {
        let Some(tpl) = srv.data.npcs.get(r.npc_id) else {
            tracing::warn!("[npc] [respawn_unknown] npc={}", r.npc_id);
            continue;
        };
        match w.spawn_npc(tpl, r.anchor, &srv.data.maps) {
            Some(id) => {
                view::announce(w, (EntityKind::Npc, id));
                tracing::debug!("[npc] [respawned] npc={} id={} map={}", r.npc_id, id, r.anchor.map_id);
            }
            None => w.respawns.push(PendingRespawn { ticks_left: RESPAWN_RETRY_TICKS, ..r }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ItemTemplate;
    use crate::game::ground::GroundItem;
    use crate::game::inventory::InvItem;
    use crate::game::npc::SpawnAnchor;
    use crate::network::opcodes::*;
    use crate::servers::map::handlers::testutil;

    #[tokio::test]
    async fn test_ground_item_expires_for_viewers() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let tpl = ItemTemplate { item_id: 40308, name: "Adena".into(), stackable: true, ..Default::default() };
        let item = InvItem::from_template(500_000_001, &tpl, 10, 0, 1, true);
        w.add_ground(GroundItem::new(700_000_001, item, 4, 33001, 33000, 2));
        view::refresh_view(&mut w, sess.id);
        rx.drain();

        run(&mut w, &srv);
        assert!(w.ground.contains_key(&700_000_001));
        run(&mut w, &srv);
        assert!(w.ground.is_empty());
        assert_eq!(testutil::ops(&mut rx), vec![S_REMOVE_OBJECT]);
        assert!(!w.player(sess.id).unwrap().known.contains(EntityKind::Ground, 700_000_001));
    }

    #[tokio::test]
    async fn test_corpse_removed_then_respawned() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let id = testutil::orc(&mut w, 33002, 33000);
        view::refresh_view(&mut w, sess.id);
        w.kill_npc(id);
        w.npcs.get_mut(&id).unwrap().delete_ticks = 1;
        w.respawns[0].ticks_left = 2;
        rx.drain();

        run(&mut w, &srv);
        assert!(!w.npcs.contains_key(&id));
        assert_eq!(testutil::ops(&mut rx), vec![S_REMOVE_OBJECT]);

        run(&mut w, &srv);
        assert!(w.respawns.is_empty());
        assert_eq!(w.npcs.len(), 1);
        let n = w.npcs.values().next().unwrap();
        assert_eq!(n.npc_id, 45001);
        assert!(n.is_alive());
        assert_eq!(testutil::ops(&mut rx), vec![S_PUT_OBJECT]);
    }

    #[tokio::test]
    async fn test_blocked_respawn_retries() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        // off the loaded map area the box has no passable tile
        let anchor = SpawnAnchor { map_id: 4, x: 100, y: 100, ..Default::default() };
        w.respawns.push(PendingRespawn { npc_id: 45001, anchor, ticks_left: 1 });
        run(&mut w, &srv);
        assert!(w.npcs.is_empty());
        assert_eq!(w.respawns.len(), 1);
        assert_eq!(w.respawns[0].ticks_left, RESPAWN_RETRY_TICKS);
    }
}
