//! Fixed travel: dungeon portals and the ships between islands.

use std::sync::Arc;

use crate::game::aoi::chebyshev;
use crate::game::ship::{self, game_seconds};
use crate::game::World;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::{view, GameServer};
use super::send_removal;

/// Slack between the reported portal tile and where the player stands.
const PORTAL_REACH: i32 = 3;
const DISEMBARK_HEADING: u8 = 5;

/// Takes the portal at `(x, y)` on the player's map. Dock portals only work
/// while the ship is in and the player holds a ticket.
pub fn enter(w: &mut World, srv: &GameServer, sid: u64, x: i32, y: i32, unix: i64) -> bool {
    let Some(p) = w.player(sid) else { return false };
    if p.dead {
        return false;
    }
    let Some(portal) = srv.data.portals.get(p.map_id, x, y) else {
        tracing::debug!("[travel] [no_portal] map={} x={} y={}", p.map_id, x, y);
        return false;
    };
    if chebyshev(p.x, p.y, x, y) > PORTAL_REACH {
        return false;
    }
    if let Some((route, ticket)) = ship::dock(p.map_id, x, y) {
        if !ship::is_docked(route, game_seconds(unix)) || p.inventory.find_by_item_id(ticket).is_none() {
            tracing::debug!("[travel] [dock_closed] char={} route={:?}", p.char_id, route);
            return false;
        }
    }
    tracing::info!("[travel] [portal] char={} note={} map={} x={} y={}", p.char_id, portal.note, portal.dst_map_id, portal.dst_x, portal.dst_y);
    view::teleport(w, sid, portal.dst_map_id, portal.dst_x, portal.dst_y, portal.dst_heading);
    true
}

/// `C_ENTER_PORTAL [H x][H y]`.
pub async fn enter_portal(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let x = i32::from(r.read_h());
    let y = i32::from(r.read_h());
    let mut w = srv.world.lock().await;
    enter(&mut w, srv, sess.id, x, y, chrono::Utc::now().timestamp());
}

/// Leaves the ship for `(map_id, x, y)`, spending the ticket for the ship
/// the player is on. Without one nothing happens.
pub fn disembark(w: &mut World, sid: u64, map_id: i16, x: i32, y: i32) -> bool {
    let Some(p) = w.player_mut(sid) else { return false };
    if p.dead {
        return false;
    }
    let Some(ticket) = ship::ticket_for_ship(p.map_id) else {
        tracing::warn!("[travel] [not_on_ship] char={} map={}", p.char_id, p.map_id);
        return false;
    };
    let Some(r) = p.inventory.consume(ticket, 1) else { return false };
    send_removal(p, &r);
    p.mark_dirty();
    tracing::info!("[travel] [disembark] char={} map={} x={} y={}", p.char_id, map_id, x, y);
    view::teleport(w, sid, map_id, x, y, DISEMBARK_HEADING);
    true
}

/// `C_SHIP [H map][H x][H y]`.
pub async fn ship(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let map_id = r.read_h() as i16;
    let x = i32::from(r.read_h());
    let y = i32::from(r.read_h());
    let mut w = srv.world.lock().await;
    disembark(&mut w, sess.id, map_id, x, y);
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::database::portal_db::Portal;
    use crate::database::ItemTemplate;
    use crate::game::scripting::StdFormulas;
    use crate::network::opcodes::{C_SHIP, S_WORLD};
    use crate::network::PacketWriter;

    const TICKET: i32 = 40299;
    /// Unix time on a return-route sailing (game midnight).
    const RETURN_SAILING: i64 = 1_057_233_600;

    fn server() -> (Arc<GameServer>, Arc<crate::repo::MemoryStore>) {
        let mut data = data();
        data.maps.insert_uniform(5, 32700, 32700, 200, 200, 0x0f);
        data.maps.insert_uniform(7, 32500, 32800, 200, 200, 0x0f);
        data.items.insert(ItemTemplate { item_id: TICKET, name: "Ship Ticket".into(), stackable: true, ..Default::default() });
        data.items.insert(ItemTemplate { item_id: 40298, name: "Gludin Ticket".into(), stackable: true, ..Default::default() });
        data.portals.insert(Portal { src_x: 32700, src_y: 32800, src_map_id: 4, dst_x: 32600, dst_y: 32900, dst_map_id: 7, dst_heading: 4, note: "cave".into() });
        data.portals.insert(Portal { src_x: 32545, src_y: 32728, src_map_id: 4, dst_x: 32735, dst_y: 32794, dst_map_id: 5, dst_heading: 0, note: "dock".into() });
        server_from(data, Arc::new(StdFormulas))
    }

    #[tokio::test]
    async fn test_portal_moves_player_within_reach() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (far, _rx) = join(&mut w, 2, 32710, 32800);
        assert!(!enter(&mut w, &srv, far.id, 32700, 32800, RETURN_SAILING));
        let (s, mut rx) = join(&mut w, 1, 32702, 32801);
        assert!(enter(&mut w, &srv, s.id, 32700, 32800, RETURN_SAILING));
        let p = w.player(s.id).unwrap();
        assert_eq!((p.map_id, p.x, p.y), (7, 32600, 32900));
        assert!(ops(&mut rx).contains(&S_WORLD));
        assert!(!enter(&mut w, &srv, s.id, 32600, 32900, RETURN_SAILING));
    }

    #[tokio::test]
    async fn test_dock_needs_ticket_and_sailing() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, _rx) = join(&mut w, 1, 32545, 32728);
        assert!(!enter(&mut w, &srv, s.id, 32545, 32728, RETURN_SAILING));
        let ticket = srv.data.items.get(40298).unwrap().clone();
        give(&mut w, s.id, &ticket, 1);
        assert!(!enter(&mut w, &srv, s.id, 32545, 32728, RETURN_SAILING + 600));
        assert!(enter(&mut w, &srv, s.id, 32545, 32728, RETURN_SAILING));
        assert_eq!(w.player(s.id).unwrap().map_id, 5);
        assert_eq!(w.player(s.id).unwrap().inventory.count_of(40298), 1);
    }

    #[tokio::test]
    async fn test_disembark_spends_ticket() {
        let (srv, _store) = server();
        let s = {
            let mut w = srv.world.lock().await;
            let (s, _rx) = join(&mut w, 1, 32500, 32500);
            w.update_position(s.id, 5, 32750, 32750, 0);
            let ticket = srv.data.items.get(TICKET).unwrap().clone();
            give(&mut w, s.id, &ticket, 2);
            s
        };
        let pkt = PacketWriter::new(C_SHIP).h(4).h(32600).h(32600).finish();
        ship(&srv, &s, &mut PacketReader::new(&pkt)).await;
        let mut w = srv.world.lock().await;
        let p = w.player(s.id).unwrap();
        assert_eq!((p.map_id, p.x, p.y, p.heading), (4, 32600, 32600, DISEMBARK_HEADING));
        assert_eq!(p.inventory.count_of(TICKET), 1);
        assert!(!disembark(&mut w, s.id, 5, 32750, 32750));
    }

    #[tokio::test]
    async fn test_disembark_without_ticket_stays_aboard() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, _rx) = join(&mut w, 1, 32500, 32500);
        w.update_position(s.id, 5, 32750, 32750, 0);
        assert!(!disembark(&mut w, s.id, 4, 32600, 32600));
        assert_eq!(w.player(s.id).unwrap().map_id, 5);
    }
}
