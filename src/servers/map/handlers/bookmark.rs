//! Teleport bookmarks. Changes are written through right away so a crash
//! never loses a freshly added mark.

use std::sync::Arc;

use crate::network::PacketReader;
use crate::repo::{with_timeout, BookmarkRow, SHORT_TIMEOUT};
use crate::session::Session;

use super::super::{packets, GameServer};
use super::send_msg;

async fn persist(srv: &GameServer, name: String, rows: Vec<BookmarkRow>) {
    if let Err(e) = with_timeout("save_bookmarks", SHORT_TIMEOUT, srv.repos.characters.save_bookmarks(name.clone(), rows)).await {
        tracing::error!("[bookmark] [save_failed] char={} error={}", name, e);
    }
}

/// `C_BOOKMARK [S name]`: marks the current position.
pub async fn add(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let name = r.read_s();
    let snapshot = {
        let mut w = srv.world.lock().await;
        let Some(p) = w.player_mut(sess.id) else { return };
        let (map_id, x, y) = (p.map_id, p.x, p.y);
        match p.bookmarks.add(&name, map_id, x, y) {
            Ok(row) => {
                p.outbox.send(packets::add_bookmark(row));
                tracing::info!("[bookmark] [added] char={} name={} map={} x={} y={}", p.name, row.name, map_id, x, y);
                Some((p.name.clone(), p.bookmarks.rows()))
            }
            Err(e) => {
                tracing::debug!("[bookmark] [refused] char={} name={} reason={:?}", p.name, name, e);
                send_msg(p, e.msg_code());
                None
            }
        }
    };
    if let Some((char_name, rows)) = snapshot {
        persist(srv, char_name, rows).await;
    }
}

/// `C_DELETE_BOOKMARK [S name]`. Unknown names are ignored.
pub async fn delete(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let name = r.read_s();
    let snapshot = {
        let mut w = srv.world.lock().await;
        let Some(p) = w.player_mut(sess.id) else { return };
        if p.bookmarks.remove_by_name(&name).is_none() {
            return;
        }
        tracing::debug!("[bookmark] [deleted] char={} name={}", p.name, name);
        (p.name.clone(), p.bookmarks.rows())
    };
    persist(srv, snapshot.0, snapshot.1).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bookmark::MAX_BOOKMARKS;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::testutil;

    #[tokio::test]
    async fn test_add_marks_position_and_persists() {
        let (srv, store) = testutil::server();
        let (sess, mut rx) = {
            let mut w = srv.world.lock().await;
            testutil::join(&mut w, 1, 32100, 32200)
        };
        let raw = PacketWriter::new(C_BOOKMARK).s("camp").finish();
        add(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(testutil::ops(&mut rx), vec![S_ADD_BOOKMARK]);

        let saved = store.bookmarks("p1");
        assert_eq!(saved.len(), 1);
        assert_eq!((saved[0].map_id, saved[0].x, saved[0].y), (4, 32100, 32200));

        // same name again is refused with a message
        add(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(testutil::ops(&mut rx), vec![S_MESSAGE_CODE]);

        let raw = PacketWriter::new(C_DELETE_BOOKMARK).s("camp").finish();
        delete(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert!(store.bookmarks("p1").is_empty());
    }

    #[tokio::test]
    async fn test_add_refused_when_full() {
        let (srv, _store) = testutil::server();
        let (sess, mut rx) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32200);
            let p = w.player_mut(sess.id).unwrap();
            for i in 0..MAX_BOOKMARKS {
                p.bookmarks.add(&format!("m{}", i), 4, 0, 0).unwrap();
            }
            (sess, rx)
        };
        let raw = PacketWriter::new(C_BOOKMARK).s("extra").finish();
        add(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(testutil::ops(&mut rx), vec![S_MESSAGE_CODE]);
        let w = srv.world.lock().await;
        assert_eq!(w.player(sess.id).unwrap().bookmarks.len(), MAX_BOOKMARKS);
    }
}
