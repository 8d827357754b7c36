//! Say, shout, global chat, whispers and the per-session exclusion list.

use std::sync::Arc;

use crate::game::world::World;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::{packets, GameServer};
use super::{gm, send_msg, send_status, MSG_NOT_ONLINE};

pub const MAX_EXCLUDES: usize = 16;
/// Food a global message costs, and the minimum needed to send one.
const GLOBAL_FOOD_COST: i32 = 5;
const GLOBAL_MIN_FOOD: i32 = 6;

/// Delivers one chat line. Returns false when nothing was sent.
pub fn speak(w: &mut World, srv: &GameServer, sid: u64, chat_type: u8, text: &str) -> bool {
    let Some(p) = w.player(sid) else { return false };
    let (map, x, y, me, name) = (p.map_id, p.x, p.y, p.char_id, p.name.clone());

    let (pkt, receivers) = match chat_type {
        packets::CHAT_NORMAL => {
            let pkt = packets::say(me, &format!("{}: {}", name, text));
            let mut to = w.nearby_sessions(map, x, y, Some(me));
            to.push(sid);
            (pkt, to)
        }
        packets::CHAT_SHOUT => {
            let pkt = packets::shout(me, &format!("<{}> {}", name, text), x, y);
            let to = w.players.values().filter(|o| o.map_id == map).map(|o| o.session_id).collect();
            (pkt, to)
        }
        packets::CHAT_GLOBAL => {
            let Some(p) = w.player_mut(sid) else { return false };
            if p.food < GLOBAL_MIN_FOOD {
                return false;
            }
            p.food -= GLOBAL_FOOD_COST;
            p.mark_dirty();
            send_status(p, srv.now_secs());
            let pkt = packets::global_chat(&format!("[{}] {}", name, text));
            (pkt, w.sessions())
        }
        other => {
            tracing::debug!("[chat] [unhandled_type] char={} type={}", me, other);
            return false;
        }
    };

    for to in receivers {
        if let Some(o) = w.player(to) {
            if !o.excludes_name(&name) {
                o.outbox.send(pkt.clone());
            }
        }
    }
    tracing::debug!("[chat] [say] char={} type={} len={}", name, chat_type, text.len());
    true
}

/// `C_CHAT [C type][S text]`. GM console lines never reach other players.
pub async fn chat(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let chat_type = r.read_c();
    let text = r.read_s();
    if text.is_empty() {
        return;
    }
    if chat_type == packets::CHAT_NORMAL && gm::try_command(srv, sess, &text).await {
        return;
    }
    let mut w = srv.world.lock().await;
    speak(&mut w, srv, sess.id, chat_type, &text);
}

/// `C_SAY`: same layout as `C_CHAT`.
pub async fn say(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    chat(srv, sess, r).await;
}

/// Sends a whisper; false when the target is not online.
pub fn whisper(w: &World, sid: u64, target: &str, text: &str) -> bool {
    let Some(p) = w.player(sid) else { return false };
    let Some(t) = w.session_by_name(target).and_then(|s| w.player(s)) else {
        send_msg(p, MSG_NOT_ONLINE);
        return false;
    };
    if !t.excludes_name(&p.name) {
        t.outbox.send(packets::tell(&p.name, text));
    }
    p.outbox.send(packets::system_message(&format!("-> ({}) {}", t.name, text)));
    true
}

/// `C_TELL [S target][S text]`.
pub async fn tell(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let target = r.read_s();
    let text = r.read_s();
    if target.is_empty() || text.is_empty() {
        return;
    }
    let w = srv.world.lock().await;
    whisper(&w, sess.id, &target, &text);
}

/// Adds or removes `name` on the exclusion list. Returns the new state, or
/// `None` when the list is full.
pub fn toggle_exclude(w: &mut World, sid: u64, name: &str) -> Option<bool> {
    let p = w.player_mut(sid)?;
    if let Some(idx) = p.excludes.iter().position(|n| n.eq_ignore_ascii_case(name)) {
        let removed = p.excludes.remove(idx);
        p.outbox.send(packets::exclude(false, &removed));
        return Some(false);
    }
    if p.excludes.len() >= MAX_EXCLUDES {
        return None;
    }
    p.excludes.push(name.to_string());
    p.outbox.send(packets::exclude(true, name));
    Some(true)
}

/// `C_EXCLUDE [S name]`.
pub async fn exclude(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let name = r.read_s();
    if name.is_empty() {
        return;
    }
    let mut w = srv.world.lock().await;
    if toggle_exclude(&mut w, sess.id, &name).is_none() {
        tracing::debug!("[chat] [exclude_full] session={}", sess.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::opcodes::*;
    use crate::servers::map::handlers::testutil;

    #[tokio::test]
    async fn test_say_reaches_aoi_only() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, mut rx_a) = testutil::join(&mut w, 1, 32100, 32100);
        let (_b, mut rx_b) = testutil::join(&mut w, 2, 32105, 32100);
        let (_c, mut rx_c) = testutil::join(&mut w, 3, 32500, 32100);

        assert!(speak(&mut w, &srv, a.id, packets::CHAT_NORMAL, "hello"));
        assert_eq!(testutil::ops(&mut rx_a), vec![S_SAY]);
        assert_eq!(testutil::ops(&mut rx_b), vec![S_SAY]);
        assert!(rx_c.drain().is_empty());

        assert!(speak(&mut w, &srv, a.id, packets::CHAT_SHOUT, "hey"));
        assert_eq!(testutil::ops(&mut rx_c), vec![S_SAY]);
    }

    #[tokio::test]
    async fn test_global_costs_food() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, _rx_a) = testutil::join(&mut w, 1, 32100, 32100);
        let (_b, mut rx_b) = testutil::join(&mut w, 2, 33900, 33900);
        assert!(speak(&mut w, &srv, a.id, packets::CHAT_GLOBAL, "wts"));
        assert_eq!(w.player(a.id).unwrap().food, 35);
        assert_eq!(testutil::ops(&mut rx_b), vec![S_MESSAGE]);
        w.player_mut(a.id).unwrap().food = 5;
        assert!(!speak(&mut w, &srv, a.id, packets::CHAT_GLOBAL, "wts"));
    }

    #[tokio::test]
    async fn test_exclusion_silences_sender() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, mut rx_a) = testutil::join(&mut w, 1, 32100, 32100);
        let (b, mut rx_b) = testutil::join(&mut w, 2, 32101, 32100);

        assert_eq!(toggle_exclude(&mut w, b.id, "P1"), Some(true));
        rx_b.drain();
        speak(&mut w, &srv, a.id, packets::CHAT_NORMAL, "hi");
        assert!(whisper(&w, a.id, "p2", "psst"));
        assert!(rx_b.drain().is_empty());
        assert_eq!(testutil::ops(&mut rx_a), vec![S_SAY, S_MESSAGE]);

        assert_eq!(toggle_exclude(&mut w, b.id, "p1"), Some(false));
        assert!(w.player(b.id).unwrap().excludes.is_empty());
    }

    #[tokio::test]
    async fn test_whisper_to_missing_player() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        assert!(!whisper(&w, a.id, "nobody", "hi"));
        assert_eq!(testutil::ops(&mut rx), vec![S_MESSAGE_CODE]);
    }

    #[tokio::test]
    async fn test_exclusion_list_is_capped() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        for i in 0..MAX_EXCLUDES {
            assert_eq!(toggle_exclude(&mut w, a.id, &format!("n{}", i)), Some(true));
        }
        assert_eq!(toggle_exclude(&mut w, a.id, "late"), None);
    }
}
