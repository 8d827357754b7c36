//! In-game mail. One opcode, dispatched on its first byte.
//!
//! Subjects and bodies are kept as the raw UTF-16LE bytes the client sent;
//! the server never decodes them.

use std::sync::Arc;

use crate::game::inventory::ADENA_ITEM_ID;
use crate::network::PacketReader;
use crate::repo::{with_timeout, MailRow, MAIL_TYPE_NORMAL, MAIL_TYPE_STORAGE, SAVE_TIMEOUT, SHORT_TIMEOUT};
use crate::session::Session;

use super::super::{packets, GameServer};
use super::{give_item, pay_adena, send_msg, MSG_NOT_ENOUGH_ADENA};

pub const SEND_COST: i32 = 50;
/// Per mailbox, normal and storage counted separately.
pub const MAX_PER_BOX: i64 = 40;
const MAX_BULK: i32 = 100;
const MSG_NO_SUCH_PERSON: u16 = 109;
const SOUND_NEW_MAIL: u16 = 1091;

/// Splits `subject\0\0content\0\0` on the UTF-16 terminators. Both halves
/// come back without their terminator.
pub fn split_text(raw: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut stops = raw.chunks_exact(2).enumerate().filter(|(_, c)| c == &[0, 0]).map(|(i, _)| i * 2);
    let Some(first) = stops.next() else {
        return (raw.to_vec(), Vec::new());
    };
    let body_end = stops.next().unwrap_or(raw.len());
    (raw[..first].to_vec(), raw[first + 2..body_end].to_vec())
}

/// Snapshot of the caller: (char id, name).
async fn me(srv: &GameServer, sess: &Session) -> Option<(i32, String)> {
    let w = srv.world.lock().await;
    w.player(sess.id).map(|p| (p.char_id, p.name.clone()))
}

async fn reply(srv: &GameServer, sess: &Session, pkt: Vec<u8>) {
    let w = srv.world.lock().await;
    if let Some(p) = w.player(sess.id) {
        p.outbox.send(pkt);
    }
}

/// `C_MAIL [C subtype] ...`.
pub async fn mail(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let subtype = r.read_c();
    let Some((char_id, name)) = me(srv, sess).await else { return };
    match subtype {
        packets::MAIL_OPEN_NORMAL | packets::MAIL_OPEN_STORAGE => open_box(srv, sess, char_id, &name, subtype).await,
        packets::MAIL_OPEN_CLAN => {}
        0x10 | 0x12 => {
            let id = r.read_d();
            read_mail(srv, sess, char_id, id, subtype).await;
        }
        packets::MAIL_SEND_NORMAL => {
            let _world_count = r.read_h();
            let receiver = r.read_s();
            let raw = r.read_bytes(r.remaining());
            send(srv, sess, &name, char_id, &receiver, &raw).await;
        }
        0x30..=0x32 => {
            let id = r.read_d();
            delete_one(srv, sess, char_id, id, subtype).await;
        }
        0x40 | 0x41 => {
            let id = r.read_d();
            to_storage(srv, sess, char_id, id).await;
        }
        0x60..=0x62 => {
            let count = r.read_d();
            if count <= 0 || count > MAX_BULK {
                return;
            }
            let ids: Vec<i32> = (0..count).map(|_| r.read_d()).collect();
            bulk_delete(srv, sess, char_id, ids, subtype - 0x30).await;
        }
        other => tracing::debug!("[mail] [subtype_unknown] session={} subtype={:#04x}", sess.id, other),
    }
}

async fn open_box(srv: &GameServer, sess: &Session, char_id: i32, name: &str, subtype: u8) {
    let mail_type = i16::from(subtype);
    match with_timeout("mail_inbox", SHORT_TIMEOUT, srv.repos.mail.load_inbox(char_id, mail_type)).await {
        Ok(mails) => reply(srv, sess, packets::mail_list(subtype, name, &mails)).await,
        Err(e) => tracing::error!("[mail] [inbox_failed] char={} error={}", char_id, e),
    }
}

/// Loads mail `id` when it sits in `char_id`'s mailbox.
async fn owned(srv: &GameServer, char_id: i32, id: i32) -> Option<MailRow> {
    match with_timeout("mail_get", SHORT_TIMEOUT, srv.repos.mail.get_by_id(id)).await {
        Ok(m) => m.filter(|m| m.inbox_id == char_id),
        Err(e) => {
            tracing::error!("[mail] [get_failed] mail={} error={}", id, e);
            None
        }
    }
}

async fn read_mail(srv: &GameServer, sess: &Session, char_id: i32, id: i32, subtype: u8) {
    let Some(m) = owned(srv, char_id, id).await else { return };
    if m.read_status == 0 {
        if let Err(e) = with_timeout("mail_mark_read", SHORT_TIMEOUT, srv.repos.mail.mark_read(id)).await {
            tracing::error!("[mail] [mark_read_failed] mail={} error={}", id, e);
        }
    }
    reply(srv, sess, packets::mail_read(subtype, &m)).await;
}

/// Sends a letter: one copy in the sender's box, one in the receiver's.
/// The postage is refunded when delivery fails.
async fn send(srv: &GameServer, sess: &Session, sender: &str, sender_id: i32, receiver: &str, raw: &[u8]) {
    let (subject, content) = split_text(raw);
    let online = {
        let mut w = srv.world.lock().await;
        let Some(p) = w.player_mut(sess.id) else { return };
        if !pay_adena(p, SEND_COST) {
            send_msg(p, MSG_NOT_ENOUGH_ADENA);
            return;
        }
        w.session_by_name(receiver).and_then(|s| w.player(s)).map(|t| (t.char_id, t.name.clone()))
    };

    let delivered = deliver(srv, sess, sender, sender_id, receiver, online, subject, content).await;
    if !delivered {
        let mut w = srv.world.lock().await;
        if let Some(adena) = srv.data.items.get(ADENA_ITEM_ID) {
            give_item(&mut w, sess.id, adena, SEND_COST, 0);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn deliver(
    srv: &GameServer,
    sess: &Session,
    sender: &str,
    sender_id: i32,
    receiver: &str,
    online: Option<(i32, String)>,
    subject: Vec<u8>,
    content: Vec<u8>,
) -> bool {
    let fail = packets::mail_result(packets::MAIL_SEND_NORMAL, 0, false);
    let (receiver_id, receiver) = match online {
        Some(t) => t,
        None => match with_timeout("char_by_name", SHORT_TIMEOUT, srv.repos.characters.load_by_name(receiver.to_string())).await {
            Ok(Some(row)) => (row.id, row.name),
            Ok(None) => {
                let w = srv.world.lock().await;
                if let Some(p) = w.player(sess.id) {
                    send_msg(p, MSG_NO_SUCH_PERSON);
                }
                return false;
            }
            Err(e) => {
                tracing::error!("[mail] [receiver_lookup_failed] name={} error={}", receiver, e);
                reply(srv, sess, fail).await;
                return false;
            }
        },
    };

    match with_timeout("mail_count", SHORT_TIMEOUT, srv.repos.mail.count_inbox(receiver_id, MAIL_TYPE_NORMAL)).await {
        Ok(n) if n < MAX_PER_BOX => {}
        Ok(_) => {
            reply(srv, sess, fail).await;
            return false;
        }
        Err(e) => {
            tracing::error!("[mail] [count_failed] char={} error={}", receiver_id, e);
            reply(srv, sess, fail).await;
            return false;
        }
    }

    let now = chrono::Utc::now().timestamp();
    let mut row = MailRow {
        id: 0,
        mail_type: MAIL_TYPE_NORMAL,
        sender: sender.to_string(),
        receiver: receiver.clone(),
        date: now,
        read_status: 0,
        inbox_id: sender_id,
        subject,
        content,
    };
    let own_id = match with_timeout("mail_save", SAVE_TIMEOUT, srv.repos.mail.save(row.clone())).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("[mail] [save_failed] sender={} error={}", sender, e);
            reply(srv, sess, fail).await;
            return false;
        }
    };
    let own_copy = MailRow { id: own_id, ..row.clone() };
    row.inbox_id = receiver_id;
    let their_id = match with_timeout("mail_save", SAVE_TIMEOUT, srv.repos.mail.save(row.clone())).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("[mail] [save_failed] receiver={} error={}", receiver, e);
            reply(srv, sess, fail).await;
            return false;
        }
    };
    row.id = their_id;

    let w = srv.world.lock().await;
    if let Some(p) = w.player(sess.id) {
        p.outbox.send(packets::mail_notify(&own_copy, true));
        p.outbox.send(packets::mail_result(packets::MAIL_SEND_NORMAL, own_id, true));
    }
    if let Some(t) = w.player_by_char(receiver_id) {
        t.outbox.send(packets::mail_notify(&row, false));
        t.outbox.send(packets::sound(t.char_id, SOUND_NEW_MAIL));
    }
    tracing::info!("[mail] [sent] from={} to={} mail={}", sender, receiver, their_id);
    true
}

async fn delete_one(srv: &GameServer, sess: &Session, char_id: i32, id: i32, subtype: u8) {
    if owned(srv, char_id, id).await.is_none() {
        return;
    }
    match with_timeout("mail_delete", SHORT_TIMEOUT, srv.repos.mail.delete(id)).await {
        Ok(()) => reply(srv, sess, packets::mail_result(subtype, id, true)).await,
        Err(e) => tracing::error!("[mail] [delete_failed] mail={} error={}", id, e),
    }
}

async fn to_storage(srv: &GameServer, sess: &Session, char_id: i32, id: i32) {
    if owned(srv, char_id, id).await.is_none() {
        return;
    }
    match with_timeout("mail_count", SHORT_TIMEOUT, srv.repos.mail.count_inbox(char_id, MAIL_TYPE_STORAGE)).await {
        Ok(n) if n < MAX_PER_BOX => {}
        Ok(_) => return,
        Err(e) => {
            tracing::error!("[mail] [count_failed] char={} error={}", char_id, e);
            return;
        }
    }
    match with_timeout("mail_to_storage", SHORT_TIMEOUT, srv.repos.mail.move_to_storage(id)).await {
        Ok(()) => reply(srv, sess, packets::mail_result(packets::MAIL_TO_STORAGE, id, true)).await,
        Err(e) => tracing::error!("[mail] [move_failed] mail={} error={}", id, e),
    }
}

async fn bulk_delete(srv: &GameServer, sess: &Session, char_id: i32, ids: Vec<i32>, ack: u8) {
    let removed = match with_timeout("mail_bulk_delete", SAVE_TIMEOUT, srv.repos.mail.bulk_delete(char_id, ids)).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("[mail] [bulk_delete_failed] char={} error={}", char_id, e);
            return;
        }
    };
    let w = srv.world.lock().await;
    if let Some(p) = w.player(sess.id) {
        for id in removed {
            p.outbox.send(packets::mail_result(ack, id, true));
        }
    }
}
