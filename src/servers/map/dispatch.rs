//! Opcode table and dispatch.
//!
//! Each client opcode lists the session states it is accepted in. A packet
//! arriving in any other state is dropped without a reply and the
//! connection stays up.

use std::sync::Arc;

use crate::network::opcodes::{self, *};
use crate::network::PacketReader;
use crate::session::{Session, SessionState};

use super::handlers::{
    auth, board, bookmark, chat, clan, combat, companion, craft, ground, item, mail, movement, npc, party, skill, spellshop,
    stats, trade, travel, warehouse,
};
use super::{is_live, GameServer};

use SessionState::*;

const PRE_AUTH: &[SessionState] = &[Handshake, VersionOk];
const VERSION_OK: &[SessionState] = &[VersionOk];
const AT_SELECT: &[SessionState] = &[Authenticated, ReturningToSelect];
const IN_WORLD: &[SessionState] = &[InWorld];
const ANY: &[SessionState] = &[Handshake, VersionOk, Authenticated, InWorld, ReturningToSelect];

static ROUTES: &[(u8, &[SessionState])] = &[
    (C_VERSION, PRE_AUTH),
    (C_LOGIN, VERSION_OK),
    (C_CREATE_CHAR, AT_SELECT),
    (C_DELETE_CHAR, AT_SELECT),
    (C_ENTER_WORLD, AT_SELECT),
    (C_KEEPALIVE, ANY),
    (C_QUIT, ANY),
    (C_REQUEST_ROLL, IN_WORLD),
    (C_RESTART, IN_WORLD),
    (C_MOVE, IN_WORLD),
    (C_CHANGE_DIRECTION, IN_WORLD),
    (C_ACTION, IN_WORLD),
    (C_ATTACK, IN_WORLD),
    (C_FAR_ATTACK, IN_WORLD),
    (C_USE_SPELL, IN_WORLD),
    (C_CHAT, IN_WORLD),
    (C_SAY, IN_WORLD),
    (C_TELL, IN_WORLD),
    (C_EXCLUDE, IN_WORLD),
    (C_USE_ITEM, IN_WORLD),
    (C_DESTROY_ITEM, IN_WORLD),
    (C_DROP, IN_WORLD),
    (C_GET, IN_WORLD),
    (C_OPEN, IN_WORLD),
    (C_ASK_XCHG, IN_WORLD),
    (C_ADD_XCHG, IN_WORLD),
    (C_ACCEPT_XCHG, IN_WORLD),
    (C_CANCEL_XCHG, IN_WORLD),
    (C_ATTR, IN_WORLD),
    (C_DIALOG, IN_WORLD),
    (C_NPC_ACTION, IN_WORLD),
    (C_BUY_SELL, IN_WORLD),
    (C_WAREHOUSE_PASSWORD, IN_WORLD),
    (C_BOARD, IN_WORLD),
    (C_BOARD_BACK, IN_WORLD),
    (C_BOARD_READ, IN_WORLD),
    (C_BOARD_WRITE, IN_WORLD),
    (C_BOARD_DELETE, IN_WORLD),
    (C_MAIL, IN_WORLD),
    (C_BOOKMARK, IN_WORLD),
    (C_DELETE_BOOKMARK, IN_WORLD),
    (C_TELEPORT, IN_WORLD),
    (C_CHAR_RESET, IN_WORLD),
    (C_PETMENU, IN_WORLD),
    (C_GIVE, IN_WORLD),
    (C_WHO_PARTY, IN_WORLD),
    (C_INVITE_PARTY_TARGET, IN_WORLD),
    (C_LEAVE_PARTY, IN_WORLD),
    (C_BANISH_PARTY, IN_WORLD),
    (C_CREATE_PLEDGE, IN_WORLD),
    (C_JOIN_PLEDGE, IN_WORLD),
    (C_LEAVE_PLEDGE, IN_WORLD),
    (C_BAN_MEMBER, IN_WORLD),
    (C_HYPERTEXT_INPUT_RESULT, IN_WORLD),
    (C_ENTER_PORTAL, IN_WORLD),
    (C_SHIP, IN_WORLD),
    (C_BUY_SPELL, IN_WORLD),
    (C_BUYABLE_SPELL, IN_WORLD),
];

/// States `op` is accepted in, `None` for opcodes we do not handle.
pub fn allowed_states(op: u8) -> Option<&'static [SessionState]> {
    ROUTES.iter().find(|(o, _)| *o == op).map(|(_, s)| *s)
}

/// Routes one decrypted payload to its handler.
pub async fn dispatch(srv: &Arc<GameServer>, sess: &Arc<Session>, pkt: &[u8]) {
    let mut r = PacketReader::new(pkt);
    let op = r.opcode();
    let state = sess.state();
    if !is_live(state) {
        return;
    }
    let Some(allowed) = allowed_states(op) else {
        tracing::debug!("[game] [packet_unknown] op={} session={} len={}", op, sess.id, pkt.len());
        return;
    };
    if !allowed.contains(&state) {
        tracing::debug!(
            "[game] [wrong_state] op={} session={} state={:?}",
            opcodes::client_name(op),
            sess.id,
            state
        );
        return;
    }

    match op {
        C_VERSION => auth::version(srv, sess).await,
        C_LOGIN => auth::login(srv, sess, &mut r).await,
        C_CREATE_CHAR => auth::create_char(srv, sess, &mut r).await,
        C_DELETE_CHAR => auth::delete_char(srv, sess, &mut r).await,
        C_ENTER_WORLD => auth::enter_world(srv, sess, &mut r).await,
        C_KEEPALIVE => {}
        C_QUIT => auth::quit(srv, sess).await,
        C_REQUEST_ROLL => auth::return_to_select(srv, sess).await,
        C_RESTART => movement::restart(srv, sess).await,
        C_MOVE => movement::step(srv, sess, &mut r).await,
        C_CHANGE_DIRECTION => movement::change_direction(srv, sess, &mut r).await,
        C_ACTION => movement::emote(srv, sess, &mut r).await,
        C_TELEPORT => movement::confirm_teleport(srv, sess).await,
        C_ATTACK => combat::attack(srv, sess, &mut r, false).await,
        C_FAR_ATTACK => combat::attack(srv, sess, &mut r, true).await,
        C_USE_SPELL => skill::use_spell(srv, sess, &mut r).await,
        C_CHAT => chat::chat(srv, sess, &mut r).await,
        C_SAY => chat::say(srv, sess, &mut r).await,
        C_TELL => chat::tell(srv, sess, &mut r).await,
        C_EXCLUDE => chat::exclude(srv, sess, &mut r).await,
        C_USE_ITEM => item::use_item(srv, sess, &mut r).await,
        C_DESTROY_ITEM => item::destroy(srv, sess, &mut r).await,
        C_DROP => ground::drop_item(srv, sess, &mut r).await,
        C_GET => ground::pick_up(srv, sess, &mut r).await,
        C_OPEN => ground::open_door(srv, sess, &mut r).await,
        C_ASK_XCHG => trade::ask(srv, sess).await,
        C_ADD_XCHG => trade::add_item(srv, sess, &mut r).await,
        C_ACCEPT_XCHG => trade::accept(srv, sess).await,
        C_CANCEL_XCHG => trade::cancel(srv, sess).await,
        C_ATTR => trade::yes_no_answer(srv, sess, &mut r).await,
        C_DIALOG => npc::dialog(srv, sess, &mut r).await,
        C_NPC_ACTION => npc::action(srv, sess, &mut r).await,
        C_BUY_SELL => npc::buy_sell(srv, sess, &mut r).await,
        C_WAREHOUSE_PASSWORD => warehouse::password(srv, sess, &mut r).await,
        C_BOARD => board::open_or_allocate(srv, sess, &mut r).await,
        C_BOARD_BACK => board::page(srv, sess, &mut r).await,
        C_BOARD_READ => board::read(srv, sess, &mut r).await,
        C_BOARD_WRITE => board::write(srv, sess, &mut r).await,
        C_BOARD_DELETE => board::delete(srv, sess, &mut r).await,
        C_MAIL => mail::mail(srv, sess, &mut r).await,
        C_BOOKMARK => bookmark::add(srv, sess, &mut r).await,
        C_DELETE_BOOKMARK => bookmark::delete(srv, sess, &mut r).await,
        C_CHAR_RESET => stats::char_reset(srv, sess, &mut r).await,
        C_PETMENU => companion::pet_menu(srv, sess, &mut r).await,
        C_GIVE => companion::give(srv, sess, &mut r).await,
        C_WHO_PARTY => party::invite(srv, sess, &mut r).await,
        C_INVITE_PARTY_TARGET => party::info(srv, sess).await,
        C_LEAVE_PARTY => party::leave(srv, sess).await,
        C_BANISH_PARTY => party::banish(srv, sess, &mut r).await,
        C_CREATE_PLEDGE => clan::create(srv, sess, &mut r).await,
        C_JOIN_PLEDGE => clan::join_request(srv, sess).await,
        C_LEAVE_PLEDGE => clan::leave(srv, sess, &mut r).await,
        C_BAN_MEMBER => clan::banish(srv, sess, &mut r).await,
        C_HYPERTEXT_INPUT_RESULT => craft::amount(srv, sess, &mut r).await,
        C_ENTER_PORTAL => travel::enter_portal(srv, sess, &mut r).await,
        C_SHIP => travel::ship(srv, sess, &mut r).await,
        C_BUY_SPELL => spellshop::browse(srv, sess, &mut r).await,
        C_BUYABLE_SPELL => spellshop::buy(srv, sess, &mut r).await,
        _ => {}
    }

    if r.overrun() {
        tracing::debug!("[game] [packet_truncated] op={} session={}", opcodes::client_name(op), sess.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table_has_no_duplicates() {
        let mut ops: Vec<u8> = ROUTES.iter().map(|(o, _)| *o).collect();
        ops.sort_unstable();
        let before = ops.len();
        ops.dedup();
        assert_eq!(ops.len(), before);
    }

    #[test]
    fn test_state_gating() {
        assert_eq!(allowed_states(C_LOGIN), Some(VERSION_OK));
        assert!(allowed_states(C_MOVE).is_some_and(|s| !s.contains(&Authenticated)));
        assert!(allowed_states(C_KEEPALIVE).is_some_and(|s| s.contains(&InWorld) && s.contains(&Handshake)));
        assert!(allowed_states(0xFE).is_none());
    }
}
