//! Bulletin boards.

use std::sync::Arc;

use crate::game::inventory::ADENA_ITEM_ID;
use crate::game::world::World;
use crate::network::PacketReader;
use crate::repo::{with_timeout, BoardPost, SHORT_TIMEOUT};
use crate::session::Session;

use super::super::{packets, GameServer};
use super::{give_item, pay_adena, send_msg, send_msg_arg, MSG_NOT_ENOUGH_ADENA};

pub const PAGE_SIZE: u32 = 8;
pub const POST_COST: i32 = 300;
const MAX_TITLE_CHARS: usize = 16;
const MAX_CONTENT_CHARS: usize = 1000;

const MSG_POST_GONE: u16 = 1243;
const MSG_TOO_LONG: u16 = 166;

/// True when `obj_id` is a board NPC in the world.
fn is_board(w: &World, srv: &GameServer, obj_id: i32) -> bool {
    w.npcs
        .get(&obj_id)
        .and_then(|n| srv.data.npcs.get(n.npc_id))
        .is_some_and(|t| t.impl_type == "L1Board")
}

async fn send_page(srv: &GameServer, sess: &Session, board: i32, before_id: i32) {
    let posts = match with_timeout("board_page", SHORT_TIMEOUT, srv.repos.boards.list_page(before_id, PAGE_SIZE)).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("[board] [page_failed] before={} error={}", before_id, e);
            Vec::new()
        }
    };
    let w = srv.world.lock().await;
    if let Some(p) = w.player(sess.id) {
        p.outbox.send(packets::board_list(board, &posts));
    }
}

/// `C_BOARD [D npc]`: first page. Other NPCs that share the opcode are ignored.
pub async fn open_or_allocate(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let board = r.read_d();
    {
        let w = srv.world.lock().await;
        if !is_board(&w, srv, board) {
            return;
        }
    }
    send_page(srv, sess, board, 0).await;
}

/// `C_BOARD_BACK [D npc][D last post id]`: the next page down.
pub async fn page(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let board = r.read_d();
    let last = r.read_d();
    {
        let w = srv.world.lock().await;
        if !is_board(&w, srv, board) {
            return;
        }
    }
    send_page(srv, sess, board, last).await;
}

/// `C_BOARD_READ [D npc][D post id]`.
pub async fn read(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let _board = r.read_d();
    let id = r.read_d();
    let post = match with_timeout("board_read", SHORT_TIMEOUT, srv.repos.boards.get_by_id(id)).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("[board] [read_failed] post={} error={}", id, e);
            return;
        }
    };
    let w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    match post {
        Some(post) => p.outbox.send(packets::board_read(&post)),
        None => send_msg(p, MSG_POST_GONE),
    }
}

/// Validates and pays for a post. Returns the author name.
pub fn charge_for_post(w: &mut World, srv: &GameServer, sid: u64, board: i32, title: &str, content: &str) -> Option<String> {
    if !is_board(w, srv, board) {
        return None;
    }
    let p = w.player_mut(sid)?;
    if !p.is_alive() {
        return None;
    }
    if title.chars().count() > MAX_TITLE_CHARS || content.chars().count() > MAX_CONTENT_CHARS {
        send_msg_arg(p, MSG_TOO_LONG, "text too long");
        return None;
    }
    if !pay_adena(p, POST_COST) {
        send_msg(p, MSG_NOT_ENOUGH_ADENA);
        return None;
    }
    Some(p.name.clone())
}

/// `C_BOARD_WRITE [D npc][S title][S content]`, costs [`POST_COST`] adena.
pub async fn write(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let board = r.read_d();
    let title = r.read_s();
    let content = r.read_s();
    let author = {
        let mut w = srv.world.lock().await;
        charge_for_post(&mut w, srv, sess.id, board, &title, &content)
    };
    let Some(author) = author else { return };

    let post = BoardPost { id: 0, name: author.clone(), date: chrono::Local::now().format("%Y/%m/%d").to_string(), title, content };
    match with_timeout("board_write", SHORT_TIMEOUT, srv.repos.boards.write(post)).await {
        Ok(id) => tracing::debug!("[board] [posted] char={} post={}", author, id),
        Err(e) => {
            tracing::error!("[board] [write_failed] char={} error={}", author, e);
            let mut w = srv.world.lock().await;
            if let Some(adena) = srv.data.items.get(ADENA_ITEM_ID) {
                give_item(&mut w, sess.id, adena, POST_COST, 0);
            }
        }
    }
}

/// `C_BOARD_DELETE [D npc][D post id]`: only the author may delete. A refused
/// delete resends the first page, since the client drops the line eagerly.
pub async fn delete(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let board = r.read_d();
    let id = r.read_d();
    let me = {
        let w = srv.world.lock().await;
        match w.player(sess.id) {
            Some(p) => p.name.clone(),
            None => return,
        }
    };
    let post = match with_timeout("board_read", SHORT_TIMEOUT, srv.repos.boards.get_by_id(id)).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("[board] [read_failed] post={} error={}", id, e);
            return;
        }
    };
    match post {
        None => {
            let w = srv.world.lock().await;
            if let Some(p) = w.player(sess.id) {
                send_msg(p, MSG_POST_GONE);
            }
        }
        Some(post) if post.name != me => {
            tracing::debug!("[board] [delete_refused] char={} post={} author={}", me, id, post.name);
            send_page(srv, sess, board, 0).await;
        }
        Some(_) => {
            if let Err(e) = with_timeout("board_delete", SHORT_TIMEOUT, srv.repos.boards.delete(id)).await {
                tracing::error!("[board] [delete_failed] post={} error={}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::NpcTemplate;
    use crate::game::ids::IdKind;
    use crate::game::npc::{Npc, SpawnAnchor};
    use crate::game::scripting::StdFormulas;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::testutil;

    const BOARD_NPC: i32 = 80006;

    async fn setup() -> (Arc<GameServer>, Arc<Session>, crate::session::OutboxReceiver, i32) {
        let mut data = testutil::data();
        data.npcs.insert(NpcTemplate { npc_id: BOARD_NPC, name: "Board".into(), impl_type: "L1Board".into(), ..Default::default() });
        let (srv, _store) = testutil::server_from(data, Arc::new(StdFormulas));
        let (sess, rx, board) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32100);
            let tpl = srv.data.npcs.get(BOARD_NPC).unwrap().clone();
            let id = w.ids.next(IdKind::Npc);
            let anchor = SpawnAnchor { map_id: 4, x: 32101, y: 32100, ..Default::default() };
            let board = w.add_npc(Npc::from_template(id, &tpl, anchor, 32101, 32100));
            (sess, rx, board)
        };
        (srv, sess, rx, board)
    }

    fn write_packet(board: i32, title: &str, content: &str) -> Vec<u8> {
        PacketWriter::new(C_BOARD_WRITE).d(board).s(title).s(content).finish()
    }

    #[tokio::test]
    async fn test_post_costs_adena_and_lists() {
        let (srv, sess, mut rx, board) = setup().await;
        let raw = write_packet(board, "hello", "first post");
        write(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(testutil::ops(&mut rx), vec![S_MESSAGE_CODE]);
        assert!(srv.repos.boards.list_page(0, PAGE_SIZE).await.unwrap().is_empty());

        {
            let mut w = srv.world.lock().await;
            let adena = srv.data.items.get(ADENA_ITEM_ID).unwrap().clone();
            testutil::give(&mut w, sess.id, &adena, 500);
        }
        write(&srv, &sess, &mut PacketReader::new(&raw)).await;
        let posts = srv.repos.boards.list_page(0, PAGE_SIZE).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].name, "p1");
        {
            let w = srv.world.lock().await;
            assert_eq!(w.player(sess.id).unwrap().inventory.adena(), 200);
        }

        rx.drain();
        let raw = PacketWriter::new(C_BOARD).d(board).finish();
        open_or_allocate(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(testutil::ops(&mut rx), vec![S_BOARD]);
    }

    #[tokio::test]
    async fn test_only_author_deletes() {
        let (srv, sess, mut rx, board) = setup().await;
        let post = BoardPost { name: "someone".into(), title: "t".into(), ..Default::default() };
        let id = srv.repos.boards.write(post).await.unwrap();

        let raw = PacketWriter::new(C_BOARD_DELETE).d(board).d(id).finish();
        delete(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert!(srv.repos.boards.get_by_id(id).await.unwrap().is_some());
        assert_eq!(testutil::ops(&mut rx), vec![S_BOARD]);

        let mine = BoardPost { name: "p1".into(), title: "t".into(), ..Default::default() };
        let id = srv.repos.boards.write(mine).await.unwrap();
        let raw = PacketWriter::new(C_BOARD_DELETE).d(board).d(id).finish();
        delete(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert!(srv.repos.boards.get_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlong_title_is_refused() {
        let (srv, sess, mut rx, board) = setup().await;
        let mut w = srv.world.lock().await;
        let adena = srv.data.items.get(ADENA_ITEM_ID).unwrap().clone();
        testutil::give(&mut w, sess.id, &adena, 500);
        assert!(charge_for_post(&mut w, &srv, sess.id, board, &"x".repeat(17), "body").is_none());
        assert_eq!(testutil::ops(&mut rx), vec![S_MESSAGE_CODE]);
        assert!(charge_for_post(&mut w, &srv, sess.id, 999, "t", "body").is_none());
        assert_eq!(w.player(sess.id).unwrap().inventory.adena(), 500);
    }
}
