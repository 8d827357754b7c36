//! Keeps each client's known set in step with its AOI: new arrivals get an
//! object pack, entities that left get a remove.

use std::collections::HashSet;

use crate::core::VISIBILITY_TICKS;
use crate::game::world::World;
use crate::game::{EntityKind, EntityRef};

use super::super::{packets, view};

pub fn run(w: &mut World) {
    if w.tick % VISIBILITY_TICKS != 0 {
        return;
    }
    let sids: Vec<u64> = w.players.keys().copied().collect();
    for sid in sids {
        update(w, sid);
    }
}

/// One player's diff against the current AOI.
pub fn update(w: &mut World, sid: u64) {
    let Some(p) = w.player(sid) else { return };
    let (map, x, y, me) = (p.map_id, p.x, p.y, p.char_id);

    let mut out = Vec::new();
    let mut entered: Vec<(EntityRef, i32, i32)> = Vec::new();
    let mut moved: Vec<(EntityRef, i32, i32)> = Vec::new();
    let mut present: HashSet<EntityRef> = HashSet::new();
    for (r, ex, ey) in w.nearby(map, x, y, w.aoi_radius) {
        if r == (EntityKind::Player, me) {
            continue;
        }
        present.insert(r);
        match p.known.of(r.0).get(&r.1) {
            Some(&pos) if pos != (ex, ey) => moved.push((r, ex, ey)),
            Some(_) => {}
            None => {
                let Some(pkt) = view::put_packet(w, r) else { continue };
                out.push(pkt);
                if r.0 == EntityKind::Door {
                    out.extend(view::door_attrs(w, r.1));
                }
                entered.push((r, ex, ey));
            }
        }
    }
    let departed: Vec<EntityRef> = p.known.entries().into_iter().filter(|r| !present.contains(r)).collect();

    let Some(p) = w.player_mut(sid) else { return };
    for r in &departed {
        p.known.remove(r.0, r.1);
        p.outbox.send(packets::remove_object(r.1));
    }
    for pkt in out {
        p.outbox.send(pkt);
    }
    for ((kind, id), ex, ey) in entered.into_iter().chain(moved) {
        p.known.insert(kind, id, ex, ey);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::opcodes::*;
    use crate::servers::map::handlers::testutil;

    #[tokio::test]
    async fn test_new_entities_are_put_once() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let orc = testutil::orc(&mut w, 33005, 33000);
        rx.drain();

        w.tick = VISIBILITY_TICKS;
        run(&mut w);
        assert_eq!(testutil::ops(&mut rx), vec![S_PUT_OBJECT]);
        assert!(w.player(a.id).unwrap().known.contains(EntityKind::Npc, orc));

        w.tick += VISIBILITY_TICKS;
        run(&mut w);
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_departed_entity_is_removed() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let orc = testutil::orc(&mut w, 33005, 33000);
        w.tick = VISIBILITY_TICKS;
        run(&mut w);
        rx.drain();

        // radius is 15 in the test config
        w.move_npc(orc, 33030, 33000, 2);
        w.tick += VISIBILITY_TICKS;
        run(&mut w);
        let got = rx.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0][0], S_REMOVE_OBJECT);
        assert!(!w.player(a.id).unwrap().known.contains(EntityKind::Npc, orc));
    }

    #[tokio::test]
    async fn test_skips_off_cadence_ticks() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (_a, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        testutil::orc(&mut w, 33005, 33000);
        rx.drain();
        w.tick = VISIBILITY_TICKS + 1;
        run(&mut w);
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_position_updates_without_packets() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let orc = testutil::orc(&mut w, 33005, 33000);
        w.tick = VISIBILITY_TICKS;
        run(&mut w);
        rx.drain();

        w.move_npc(orc, 33006, 33000, 2);
        update(&mut w, a.id);
        assert!(rx.drain().is_empty());
        assert_eq!(w.player(a.id).unwrap().known.of(EntityKind::Npc)[&orc], (33006, 33000));
    }
}
