//! Player-to-player trade.
//!
//! Offered items leave the offering bag at once and sit in the offerer's
//! [`TradeState`] until the trade either commits (they move to the partner)
//! or is cancelled (they go back). Gold is escrowed the same way, as an
//! adena stack.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::database::map_db::{HEADING_DX, HEADING_DY};
use crate::game::aoi::chebyshev;
use crate::game::ids::IdKind;
use crate::game::inventory::{InvItem, Removal, ADENA_ITEM_ID, MAX_INVENTORY_SIZE};
use crate::game::player::{PendingYesNo, Player};
use crate::game::trade::TRADE_MAX_DISTANCE;
use crate::game::World;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::{packets, GameServer};
use super::{clan, party, send_added, send_msg, send_msg_arg, send_removal, stats, MSG_INVENTORY_FULL};

const MSG_TRADE_DECLINED: u16 = 253;
const MSG_NOT_TRADEABLE: u16 = 210;
const MSG_PARTNER_BUSY: u16 = 258;

/// Counter carried by yes/no dialogs.
static YES_NO_SEQ: AtomicI32 = AtomicI32::new(0);

pub(crate) fn yes_no_seq() -> i32 {
    YES_NO_SEQ.fetch_add(1, Ordering::Relaxed) + 1
}

/// The player on the tile in front, facing back.
pub(crate) fn face_to_face(w: &World, p: &Player) -> Option<u64> {
    let h = usize::from(p.heading & 7);
    let (tx, ty) = (p.x + HEADING_DX[h], p.y + HEADING_DY[h]);
    let opposite = (p.heading + 4) & 7;
    w.nearby_sessions(p.map_id, p.x, p.y, Some(p.char_id)).into_iter().find(|sid| {
        w.player(*sid).is_some_and(|o| o.x == tx && o.y == ty && (o.heading & 7) == opposite && o.is_alive())
    })
}

/// `C_ASK_XCHG`: no payload; the partner is whoever stands face to face.
pub async fn ask(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let mut w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    if !p.is_alive() || p.trade.is_active() {
        return;
    }
    let (char_id, name) = (p.char_id, p.name.clone());
    let Some(target_sid) = face_to_face(&w, p) else {
        p.outbox.send(packets::system_message("There is no one to trade with."));
        return;
    };
    let Some(target) = w.player_mut(target_sid) else { return };
    if target.trade.is_active() || target.pending_yes_no.is_some() {
        let busy = target.name.clone();
        if let Some(p) = w.player(sess.id) {
            send_msg_arg(p, MSG_PARTNER_BUSY, &busy);
        }
        return;
    }
    let target_char = target.char_id;
    target.trade.begin(char_id);
    target.pending_yes_no = Some(PendingYesNo::Trade { from: char_id });
    target.outbox.send(packets::yes_no(yes_no_seq(), PendingYesNo::TRADE_MSG, &name));
    if let Some(p) = w.player_mut(sess.id) {
        p.trade.begin(target_char);
    }
    tracing::debug!("[trade] [requested] from={} to={}", char_id, target_char);
}

/// `C_ATTR [H 0][D seq][H msg_type][H answer]`: answer to a yes/no dialog.
/// The same opcode carries bonus stat allocation.
pub async fn yes_no_answer(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    if r.read_h() == stats::ALLOCATE_MODE {
        stats::allocate(srv, sess, r).await;
        return;
    }
    let _seq = r.read_d();
    let msg_type = r.read_h();
    let accepted = r.read_h() == 1;

    let mut w = srv.world.lock().await;
    let Some(p) = w.player_mut(sess.id) else { return };
    let Some(pending) = p.pending_yes_no.take() else { return };
    if pending.msg_code() != msg_type {
        tracing::debug!("[yes_no] [answer_mismatch] session={} expected={} got={}", sess.id, pending.msg_code(), msg_type);
        return;
    }
    match pending {
        PendingYesNo::Trade { from } => trade_answer(&mut w, sess.id, from, accepted),
        PendingYesNo::PartyInvite { from, auto_share } => party::answer_invite(&mut w, sess.id, from, auto_share, accepted),
        PendingYesNo::ClanJoin { applicant } => {
            drop(w);
            clan::answer_join(srv, sess, applicant, accepted).await;
        }
    }
}

fn trade_answer(w: &mut World, sid: u64, from: i32, accepted: bool) {
    let Some(p) = w.player(sid) else { return };
    let (me, my_name) = (p.char_id, p.name.clone());

    let partner_waiting = w.player_by_char(from).is_some_and(|o| o.trade.partner == me);
    if !accepted || !partner_waiting {
        if let Some(p) = w.player_mut(sid) {
            p.trade = Default::default();
        }
        if let Some(o) = w.player_by_char_mut(from).filter(|o| o.trade.partner == me) {
            o.trade = Default::default();
            send_msg_arg(o, MSG_TRADE_DECLINED, &my_name);
        }
        return;
    }

    let partner_name = match w.player_by_char_mut(from) {
        Some(o) => {
            o.trade.window_open = true;
            o.outbox.send(packets::trade_open(&my_name));
            o.name.clone()
        }
        None => return,
    };
    if let Some(p) = w.player_mut(sid) {
        p.trade.window_open = true;
        p.outbox.send(packets::trade_open(&partner_name));
    }
    tracing::debug!("[trade] [opened] a={} b={}", from, me);
}

/// Partner session of an open trade, if the partner is still in world.
fn open_partner(w: &World, sid: u64) -> Option<u64> {
    let p = w.player(sid)?;
    if !p.trade.is_active() || !p.trade.window_open {
        return None;
    }
    w.session_of_char(p.trade.partner)
}

/// `C_ADD_XCHG [D obj][D count]`. Object 0 offers gold.
pub async fn add_item(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let count = r.read_d();
    let mut w = srv.world.lock().await;
    let Some(partner_sid) = open_partner(&w, sess.id) else {
        cancel_in_world(&mut w, sess.id);
        return;
    };
    let sid = sess.id;

    let offered = {
        let World { ids, players, .. } = &mut *w;
        let Some(p) = players.get_mut(&sid) else { return };
        let obj_id = if obj_id == 0 {
            match p.inventory.find_by_item_id(ADENA_ITEM_ID) {
                Some(it) => it.obj_id,
                None => return,
            }
        } else {
            obj_id
        };
        let Some(it) = p.inventory.find(obj_id) else { return };
        if it.equipped || p.trade.offers(obj_id) {
            return;
        }
        let bound = srv.data.items.get(it.item_id).is_some_and(|t| t.untradeable);
        if bound {
            send_msg(p, MSG_NOT_TRADEABLE);
            return;
        }
        let count = if count <= 0 { it.count } else { count.min(it.count) };
        if p.trade.is_full() && !(it.stackable && p.trade.items.iter().any(|t| t.item_id == it.item_id)) {
            return;
        }
        let mut escrow = it.clone();
        escrow.count = count;
        let Some(removal) = p.inventory.remove(obj_id, count) else { return };
        if matches!(removal, Removal::Reduced { .. }) {
            // the stack stays behind under its own id
            escrow.obj_id = ids.next(IdKind::Item);
        }
        send_removal(p, &removal);
        if escrow.item_id == ADENA_ITEM_ID {
            p.trade.gold += count;
        }
        p.trade.ok = false;
        let shown = (escrow.inv_gfx, escrow.view_name(), escrow.bless);
        merge_escrow(&mut p.trade.items, escrow);
        p.outbox.send(packets::trade_add_item(0, shown.0, &shown.1, shown.2));
        p.mark_dirty();
        shown
    };
    if let Some(o) = w.player_mut(partner_sid) {
        o.trade.ok = false;
        o.outbox.send(packets::trade_add_item(1, offered.0, &offered.1, offered.2));
    }
}

/// Stackables offered twice collapse into one escrow entry.
fn merge_escrow(items: &mut Vec<InvItem>, it: InvItem) {
    if it.stackable {
        if let Some(e) = items.iter_mut().find(|e| e.item_id == it.item_id) {
            e.count = e.count.saturating_add(it.count);
            return;
        }
    }
    items.push(it);
}

/// `C_ACCEPT_XCHG`: marks this side ready; both ready commits.
pub async fn accept(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let mut w = srv.world.lock().await;
    let Some(partner_sid) = open_partner(&w, sess.id) else {
        cancel_in_world(&mut w, sess.id);
        return;
    };
    let Some(p) = w.player_mut(sess.id) else { return };
    p.trade.ok = true;
    if w.player(partner_sid).is_some_and(|o| o.trade.ok) {
        commit(&mut w, sess.id, partner_sid);
    }
}

pub async fn cancel(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let mut w = srv.world.lock().await;
    cancel_in_world(&mut w, sess.id);
}

/// Fresh slots and weight units `items` would need in `p`'s bag.
fn room_needed(p: &Player, items: &[InvItem]) -> (usize, i32) {
    let slots = items
        .iter()
        .filter(|it| !(it.stackable && p.inventory.find_by_item_id(it.item_id).is_some()))
        .count();
    (slots, items.iter().map(InvItem::total_weight).sum())
}

fn fits(p: &Player, items: &[InvItem]) -> bool {
    let (slots, weight) = room_needed(p, items);
    p.inventory.len() + slots <= MAX_INVENTORY_SIZE && !p.inventory.would_overweight(weight, p.max_weight())
}

/// Swaps both escrows. A side without room aborts the whole trade.
fn commit(w: &mut World, a: u64, b: u64) {
    let (Some(pa), Some(pb)) = (w.player(a), w.player(b)) else { return };
    let a_fits = fits(pa, &pb.trade.items);
    let b_fits = fits(pb, &pa.trade.items);
    if !a_fits || !b_fits {
        for (sid, ok) in [(a, a_fits), (b, b_fits)] {
            if let (false, Some(p)) = (ok, w.player(sid)) {
                send_msg(p, MSG_INVENTORY_FULL);
            }
        }
        cancel_in_world(w, a);
        return;
    }

    let (from_a, gold_a) = w.player_mut(a).map(|p| p.trade.take()).unwrap_or_default();
    let (from_b, gold_b) = w.player_mut(b).map(|p| p.trade.take()).unwrap_or_default();
    let (name_a, name_b) = (
        w.player(a).map(|p| p.name.clone()).unwrap_or_default(),
        w.player(b).map(|p| p.name.clone()).unwrap_or_default(),
    );
    receive(w, b, from_a);
    receive(w, a, from_b);
    tracing::info!("[trade] [completed] a={} b={} gold_a={} gold_b={}", name_a, name_b, gold_a, gold_b);
}

fn receive(w: &mut World, sid: u64, items: Vec<InvItem>) {
    let Some(p) = w.player_mut(sid) else { return };
    for it in items {
        let out = p.inventory.restore(it);
        send_added(p, out);
    }
    p.mark_dirty();
    p.outbox.send(packets::trade_status(packets::TRADE_DONE));
}

/// Cancels `sid`'s trade, if any, returning both escrows to their owners.
/// Used by the cancel packet, teleports, distance checks and logout.
pub(crate) fn cancel_in_world(w: &mut World, sid: u64) {
    let Some(p) = w.player(sid) else { return };
    if !p.trade.is_active() {
        return;
    }
    let (me, partner) = (p.char_id, p.trade.partner);
    give_back(w, sid);
    if let Some(psid) = w.session_of_char(partner) {
        if w.player(psid).is_some_and(|o| o.trade.partner == me) {
            give_back(w, psid);
        }
    }
    tracing::debug!("[trade] [cancelled] by={} partner={}", me, partner);
}

fn give_back(w: &mut World, sid: u64) {
    let Some(p) = w.player_mut(sid) else { return };
    let was_open = p.trade.window_open;
    if matches!(p.pending_yes_no, Some(PendingYesNo::Trade { .. })) {
        p.pending_yes_no = None;
    }
    let (items, _gold) = p.trade.take();
    let returned = !items.is_empty();
    for it in items {
        let out = p.inventory.restore(it);
        send_added(p, out);
    }
    if returned {
        p.mark_dirty();
    }
    if was_open {
        p.outbox.send(packets::trade_status(packets::TRADE_CANCELLED));
    }
}

/// Drops the trade once the partners drift apart.
pub(crate) fn check_distance(w: &mut World, sid: u64) {
    let Some(p) = w.player(sid) else { return };
    if !p.trade.is_active() {
        return;
    }
    let apart = match w.player_by_char(p.trade.partner) {
        Some(o) => o.map_id != p.map_id || chebyshev(o.x, o.y, p.x, p.y) > TRADE_MAX_DISTANCE,
        None => true,
    };
    if apart {
        cancel_in_world(w, sid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::{give_item, testutil};
    use crate::session::OutboxReceiver;

    struct Pair {
        a: Arc<Session>,
        b: Arc<Session>,
        rx_a: OutboxReceiver,
        rx_b: OutboxReceiver,
    }

    /// Two players face to face, a with a sword and 1000 adena.
    async fn pair(srv: &Arc<GameServer>) -> (Pair, i32) {
        let mut w = srv.world.lock().await;
        let (a, rx_a) = testutil::join(&mut w, 1, 32100, 32100);
        let (b, rx_b) = testutil::join(&mut w, 2, 32101, 32100);
        w.player_mut(a.id).unwrap().heading = 2;
        w.player_mut(b.id).unwrap().heading = 6;
        let sword = srv.data.items.get(1).cloned().unwrap();
        let adena = srv.data.items.get(ADENA_ITEM_ID).cloned().unwrap();
        let obj = give_item(&mut w, a.id, &sword, 1, 0).unwrap().obj_id;
        give_item(&mut w, a.id, &adena, 1000, 0);
        (Pair { a, b, rx_a, rx_b }, obj)
    }

    async fn open(srv: &Arc<GameServer>, t: &mut Pair) {
        ask(srv, &t.a).await;
        let raw = PacketWriter::new(C_ATTR).h(0).d(1).h(PendingYesNo::TRADE_MSG).h(1).finish();
        yes_no_answer(srv, &t.b, &mut PacketReader::new(&raw)).await;
        t.rx_a.drain();
        t.rx_b.drain();
    }

    #[tokio::test]
    async fn test_trade_commit_swaps_items_and_gold() {
        let (srv, _store) = testutil::server();
        let (mut t, sword) = pair(&srv).await;
        open(&srv, &mut t).await;

        let raw = PacketWriter::new(C_ADD_XCHG).d(sword).d(1).finish();
        add_item(&srv, &t.a, &mut PacketReader::new(&raw)).await;
        let raw = PacketWriter::new(C_ADD_XCHG).d(0).d(400).finish();
        add_item(&srv, &t.a, &mut PacketReader::new(&raw)).await;
        assert_eq!(testutil::ops(&mut t.rx_b), vec![S_TRADE_ADD_ITEM, S_TRADE_ADD_ITEM]);
        {
            let w = srv.world.lock().await;
            let p = w.player(t.a.id).unwrap();
            assert!(p.inventory.find(sword).is_none());
            assert_eq!(p.inventory.adena(), 600);
        }

        accept(&srv, &t.a).await;
        accept(&srv, &t.b).await;
        let w = srv.world.lock().await;
        let (a, b) = (w.player(t.a.id).unwrap(), w.player(t.b.id).unwrap());
        assert!(b.inventory.find(sword).is_some());
        assert_eq!(b.inventory.adena(), 400);
        assert_eq!(a.inventory.adena(), 600);
        assert!(!a.trade.is_active() && !b.trade.is_active());
        assert_eq!(t.rx_b.drain().last().unwrap()[0], S_TRADE_STATUS);
    }

    #[tokio::test]
    async fn test_adding_items_resets_ready() {
        let (srv, _store) = testutil::server();
        let (mut t, sword) = pair(&srv).await;
        open(&srv, &mut t).await;
        accept(&srv, &t.b).await;
        let raw = PacketWriter::new(C_ADD_XCHG).d(sword).d(1).finish();
        add_item(&srv, &t.a, &mut PacketReader::new(&raw)).await;
        accept(&srv, &t.a).await;
        let w = srv.world.lock().await;
        assert!(w.player(t.a.id).unwrap().trade.is_active());
        assert!(w.player(t.b.id).unwrap().inventory.find(sword).is_none());
    }

    #[tokio::test]
    async fn test_cancel_and_distance_restore_escrow() {
        let (srv, _store) = testutil::server();
        let (mut t, sword) = pair(&srv).await;
        open(&srv, &mut t).await;
        let raw = PacketWriter::new(C_ADD_XCHG).d(sword).d(1).finish();
        add_item(&srv, &t.a, &mut PacketReader::new(&raw)).await;

        let mut w = srv.world.lock().await;
        w.update_position(t.b.id, 4, 32130, 32100, 0);
        check_distance(&mut w, t.b.id);
        let a = w.player(t.a.id).unwrap();
        assert!(a.inventory.find(sword).is_some());
        assert!(!a.trade.is_active());
        assert!(!w.player(t.b.id).unwrap().trade.is_active());
        assert!(t.rx_a.drain().iter().any(|p| p[0] == S_TRADE_STATUS));
    }

    #[tokio::test]
    async fn test_declined_request_clears_both() {
        let (srv, _store) = testutil::server();
        let (mut t, _) = pair(&srv).await;
        ask(&srv, &t.a).await;
        assert_eq!(testutil::ops(&mut t.rx_b).last(), Some(&S_YES_NO));
        let raw = PacketWriter::new(C_ATTR).h(0).d(1).h(PendingYesNo::TRADE_MSG).h(0).finish();
        yes_no_answer(&srv, &t.b, &mut PacketReader::new(&raw)).await;
        let w = srv.world.lock().await;
        assert!(!w.player(t.a.id).unwrap().trade.is_active());
        assert!(!w.player(t.b.id).unwrap().trade.is_active());
        assert_eq!(testutil::ops(&mut t.rx_a).last(), Some(&S_MESSAGE_CODE));
    }
}
