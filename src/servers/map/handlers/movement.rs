//! Walking, turning, restart after death and confirmed teleports.

use std::sync::Arc;
use std::time::Instant;

use crate::database::map_db::{HEADING_DX, HEADING_DY};
use crate::game::player::Player;
use crate::game::world::World;
use crate::game::EntityKind;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::{packets, view, GameServer};
use super::{send_status, trade};

/// The move opcode's heading byte arrives XOR-masked with this.
pub const HEADING_MASK: u8 = 0x49;
pub const RESTART_FOOD: i32 = 40;
const FALLBACK_TOWN: (i16, i32, i32) = (4, 33084, 33391);

/// Why a step was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepError {
    BadHeading,
    Frozen,
    /// Arrived inside the cadence window; dropped without a reply.
    TooFast,
    /// Destination held by another entity or a closed door.
    Blocked,
}

/// Validates and applies one step. Client coordinates are ignored; the
/// server's own position is the source.
pub fn try_step(w: &mut World, srv: &GameServer, sid: u64, heading: u8, now: Instant) -> Result<(i32, i32), StepError> {
    if heading > 7 {
        return Err(StepError::BadHeading);
    }
    let Some(p) = w.player(sid) else { return Err(StepError::Frozen) };
    if p.is_frozen() {
        return Err(StepError::Frozen);
    }
    if p.last_move.is_some_and(|t| now.saturating_duration_since(t) < p.move_tolerance()) {
        return Err(StepError::TooFast);
    }
    let (map, sx, sy, me) = (p.map_id, p.x, p.y, p.char_id);
    let h = usize::from(heading);
    let (dx, dy) = (sx + HEADING_DX[h], sy + HEADING_DY[h]);

    if !w.player_can_step(&srv.data.maps, map, dx, dy, me) {
        tracing::debug!("[move] [blocked] char={} x={} y={} heading={}", me, dx, dy, heading);
        return Err(StepError::Blocked);
    }

    w.update_position(sid, map, dx, dy, heading);
    if let Some(p) = w.player_mut(sid) {
        p.last_move = Some(now);
    }
    Ok((sx, sy))
}

/// Move-object carrying the previous tile to everyone already showing us.
fn broadcast_step(w: &mut World, sid: u64, prev: (i32, i32)) {
    let Some(p) = w.player(sid) else { return };
    let (map, x, y, heading, me) = (p.map_id, p.x, p.y, p.heading, p.char_id);
    let pkt = packets::move_object(me, prev.0, prev.1, heading);
    for other in w.nearby_sessions(map, x, y, Some(me)) {
        if let Some(o) = w.player_mut(other) {
            if o.known.contains(EntityKind::Player, me) {
                o.outbox.send(pkt.clone());
                o.known.insert(EntityKind::Player, me, x, y);
            }
        }
    }
}

/// `C_MOVE [H x][H y][C heading ^ 0x49]`.
pub async fn step(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let _client_x = r.read_h();
    let _client_y = r.read_h();
    let heading = r.read_c() ^ HEADING_MASK;

    let mut w = srv.world.lock().await;
    match try_step(&mut w, srv, sess.id, heading, Instant::now()) {
        Ok(prev) => {
            trade::check_distance(&mut w, sess.id);
            broadcast_step(&mut w, sess.id, prev);
        }
        Err(StepError::Blocked) => view::rollback(&mut w, sess.id),
        Err(e) => tracing::debug!("[move] [dropped] session={} reason={:?}", sess.id, e),
    }
}

/// `C_CHANGE_DIRECTION [C heading]`, unmasked.
pub async fn change_direction(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let heading = r.read_c();
    if heading > 7 {
        return;
    }
    let mut w = srv.world.lock().await;
    let Some(p) = w.player_mut(sess.id) else { return };
    p.heading = heading;
    let (map, x, y, me) = (p.map_id, p.x, p.y, p.char_id);
    w.broadcast_nearby(map, x, y, Some(me), &packets::change_heading(me, heading));
}

/// `C_ACTION [C code]`: emote echoed to everyone around, not back to us.
pub async fn emote(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let code = r.read_c();
    let mut w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    if p.dead {
        return;
    }
    let (map, x, y, me) = (p.map_id, p.x, p.y, p.char_id);
    w.broadcast_nearby(map, x, y, Some(me), &packets::action(me, code));
}

/// Brings a dead player back at the town for their map.
pub fn resurrect(w: &mut World, srv: &GameServer, sid: u64) -> bool {
    let Some(p) = w.player_mut(sid) else { return false };
    if !p.dead {
        return false;
    }
    revive_vitals(p);
    let (map, x, y) = srv
        .scripting
        .respawn_location(p.map_id)
        .map(|l| (l.map_id, l.x, l.y))
        .unwrap_or(FALLBACK_TOWN);
    let (x, y) = w.free_tile_near(&srv.data.maps, map, x, y, 5).unwrap_or((x, y));
    view::teleport(w, sid, map, x, y, 0);
    if let Some(p) = w.player(sid) {
        send_status(p, srv.now_secs());
        p.outbox.send(packets::event_food(p.food));
        p.outbox.send(packets::weather(w.weather));
        tracing::info!("[world] [restart] char={} map={} x={} y={}", p.name, map, x, y);
    }
    true
}

fn revive_vitals(p: &mut Player) {
    p.dead = false;
    p.last_move = None;
    p.hp = p.level.clamp(1, p.attr.max_hp.max(1));
    p.mp = (p.level / 2).clamp(0, p.attr.max_mp.max(0));
    p.food = RESTART_FOOD;
    p.mark_dirty();
}

/// `C_RESTART`: only meaningful while dead.
pub async fn restart(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let mut w = srv.world.lock().await;
    resurrect(&mut w, srv, sess.id);
}

/// `C_TELEPORT`: executes a destination stored by an earlier dialog.
pub async fn confirm_teleport(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let mut w = srv.world.lock().await;
    let Some(p) = w.player_mut(sess.id) else { return };
    if p.dead {
        return;
    }
    let Some((map, x, y, heading)) = p.pending_teleport.take() else { return };
    view::teleport(&mut w, sess.id, map, x, y, heading);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::testutil;
    use std::time::Duration;

    fn move_pkt(heading: u8) -> Vec<u8> {
        PacketWriter::new(C_MOVE).h(0).h(0).c(heading ^ HEADING_MASK).finish()
    }

    #[tokio::test]
    async fn test_step_broadcasts_previous_tile() {
        let (srv, _store) = testutil::server();
        let (a, _rx_a, mut rx_b) = {
            let mut w = srv.world.lock().await;
            let (a, rx_a) = testutil::join(&mut w, 1, 32100, 32100);
            let (b, rx_b) = testutil::join(&mut w, 2, 32108, 32100);
            view::refresh_view(&mut w, b.id);
            (a, rx_a, rx_b)
        };
        rx_b.drain();

        for i in 0..4 {
            let raw = move_pkt(2);
            step(&srv, &a, &mut PacketReader::new(&raw)).await;
            let mut w = srv.world.lock().await;
            let p = w.player_mut(a.id).unwrap();
            assert_eq!((p.x, p.y), (32101 + i, 32100));
            p.last_move = None;
            drop(w);
            let pkts = rx_b.drain();
            assert_eq!(pkts.len(), 1);
            assert_eq!(pkts[0][0], S_MOVE_OBJECT);
            // prev x sits after the object id
            assert_eq!(u16::from_le_bytes([pkts[0][5], pkts[0][6]]), (32100 + i) as u16);
        }
    }

    #[tokio::test]
    async fn test_cadence_drops_fast_steps() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let t0 = Instant::now();
        assert!(try_step(&mut w, &srv, a.id, 2, t0).is_ok());
        assert_eq!(try_step(&mut w, &srv, a.id, 2, t0 + Duration::from_millis(50)), Err(StepError::TooFast));
        assert!(try_step(&mut w, &srv, a.id, 2, t0 + Duration::from_millis(100)).is_ok());
        assert_eq!(w.player(a.id).unwrap().x, 32102);
    }

    #[tokio::test]
    async fn test_blocked_step_rolls_back() {
        let (srv, _store) = testutil::server();
        let (a, mut rx) = {
            let mut w = srv.world.lock().await;
            let joined = testutil::join(&mut w, 1, 32100, 32100);
            testutil::orc(&mut w, 32100, 32099);
            joined
        };
        let raw = move_pkt(0);
        step(&srv, &a, &mut PacketReader::new(&raw)).await;
        assert_eq!(testutil::ops(&mut rx), vec![S_PUT_OBJECT, S_PUT_OBJECT, S_CHANGE_DESC]);
        let w = srv.world.lock().await;
        let p = w.player(a.id).unwrap();
        assert_eq!((p.x, p.y), (32100, 32100));
        assert!(w.is_occupied(4, 32100, 32100, 0));
    }

    #[tokio::test]
    async fn test_frozen_and_bad_heading_are_dropped() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        assert_eq!(try_step(&mut w, &srv, a.id, 9, Instant::now()), Err(StepError::BadHeading));
        w.player_mut(a.id).unwrap().paralyzed = true;
        assert_eq!(try_step(&mut w, &srv, a.id, 2, Instant::now()), Err(StepError::Frozen));
    }

    #[tokio::test]
    async fn test_restart_revives_at_town() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        assert!(!resurrect(&mut w, &srv, a.id));
        {
            let p = w.player_mut(a.id).unwrap();
            p.dead = true;
            p.hp = 0;
            p.food = 3;
        }
        w.release(4, 32100, 32100, 1);
        assert!(resurrect(&mut w, &srv, a.id));
        let p = w.player(a.id).unwrap();
        assert!(p.is_alive());
        assert_eq!((p.hp, p.mp, p.food), (30, 15, RESTART_FOOD));
        assert!(w.is_occupied(p.map_id, p.x, p.y, 0));
    }

    #[tokio::test]
    async fn test_confirm_teleport_uses_pending_destination() {
        let (srv, _store) = testutil::server();
        let (a, _rx) = {
            let mut w = srv.world.lock().await;
            let (a, rx) = testutil::join(&mut w, 1, 32100, 32100);
            w.player_mut(a.id).unwrap().pending_teleport = Some((4, 32200, 32200, 4));
            (a, rx)
        };
        confirm_teleport(&srv, &a).await;
        let w = srv.world.lock().await;
        let p = w.player(a.id).unwrap();
        assert_eq!((p.x, p.y, p.heading), (32200, 32200, 4));
        assert!(p.pending_teleport.is_none());
    }

    #[tokio::test]
    async fn test_emote_reaches_others_only() {
        let (srv, _store) = testutil::server();
        let (a, mut rx_a, mut rx_b) = {
            let mut w = srv.world.lock().await;
            let (a, rx_a) = testutil::join(&mut w, 1, 32100, 32100);
            let (_b, rx_b) = testutil::join(&mut w, 2, 32103, 32100);
            (a, rx_a, rx_b)
        };
        rx_a.drain();
        rx_b.drain();

        let raw = PacketWriter::new(C_ACTION).c(66).finish();
        emote(&srv, &a, &mut PacketReader::new(&raw)).await;
        assert!(rx_a.drain().is_empty());
        let got = rx_b.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0][0], S_ACTION);
        assert_eq!(got[0][5], 66);
    }
}
