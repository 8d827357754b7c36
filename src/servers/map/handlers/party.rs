//! Hunting parties.
//!
//! Membership lives in the world's [`Parties`](crate::game::party::Parties)
//! registry. These handlers turn client requests into registry changes and
//! keep every member's roster, HP meters and messages in step.

use std::sync::Arc;

use crate::game::aoi::chebyshev;
use crate::game::party::{hp_percent, Departure, HP_METER_CLEAR};
use crate::game::player::{PendingYesNo, Player};
use crate::game::World;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::{packets, GameServer};
use super::trade::yes_no_seq;
use super::{send_msg, send_msg_arg};

const MSG_IN_OTHER_PARTY: u16 = 415;
const MSG_LEADER_ONLY_INVITES: u16 = 416;
const MSG_PARTY_FULL: u16 = 417;
const MSG_PARTY_DISBANDED: u16 = 418;
const MSG_BANISHED: u16 = 419;
const MSG_LEFT_PARTY: u16 = 420;
const MSG_INVITE_DECLINED: u16 = 423;
const MSG_JOINED_PARTY: u16 = 424;
const MSG_NOT_IN_PARTY: u16 = 425;
const MSG_TARGET_NOT_IN_PARTY: u16 = 426;
const MSG_LEADER_ONLY_BANISHES: u16 = 427;
const MSG_TOO_FAR: u16 = 952;
const MSG_TRANSFER_TOO_FAR: u16 = 1695;
const MSG_TRANSFER_NOT_MEMBER: u16 = 1696;
const MSG_TRANSFER_NOT_LEADER: u16 = 1697;

const INVITE_NORMAL: u8 = 0;
const INVITE_AUTO_SHARE: u8 = 1;
const TRANSFER_LEAD: u8 = 3;

/// Invitations and lead transfers reach this far on the same map.
pub const PARTY_RANGE: i32 = 7;

fn in_range(a: &Player, b: &Player) -> bool {
    a.map_id == b.map_id && chebyshev(a.x, a.y, b.x, b.y) <= PARTY_RANGE
}

/// Online members of `char_id`'s party, leader first.
fn online_members(w: &World, char_id: i32) -> Vec<&Player> {
    let Some(party) = w.parties.get(char_id) else { return Vec::new() };
    party.members.iter().filter_map(|m| w.player_by_char(*m)).collect()
}

/// `C_WHO_PARTY [C kind][D target]`: kind 0/1 invites, 3 hands over the lead.
pub async fn invite(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let kind = r.read_c();
    let target_id = r.read_d();
    let mut w = srv.world.lock().await;
    match kind {
        INVITE_NORMAL | INVITE_AUTO_SHARE => send_invite(&mut w, sess.id, target_id, kind == INVITE_AUTO_SHARE),
        TRANSFER_LEAD => transfer_lead(&mut w, sess.id, target_id),
        _ => tracing::debug!("[party] [unknown_kind] session={} kind={}", sess.id, kind),
    }
}

fn send_invite(w: &mut World, sid: u64, target_id: i32, auto_share: bool) {
    let Some(p) = w.player(sid) else { return };
    let Some(target) = w.player_by_char(target_id) else { return };
    if target.char_id == p.char_id {
        return;
    }
    if !in_range(p, target) {
        send_msg(p, MSG_TOO_FAR);
        return;
    }
    if w.parties.in_party(target.char_id) {
        send_msg(p, MSG_IN_OTHER_PARTY);
        return;
    }
    if w.parties.in_party(p.char_id) {
        if !w.parties.is_leader(p.char_id) {
            send_msg(p, MSG_LEADER_ONLY_INVITES);
            return;
        }
        if w.parties.get(p.char_id).is_some_and(|party| party.is_full()) {
            send_msg(p, MSG_PARTY_FULL);
            return;
        }
    }
    let (from, from_name) = (p.char_id, p.name.clone());
    let Some(target) = w.player_by_char_mut(target_id) else { return };
    let pending = PendingYesNo::PartyInvite { from, auto_share };
    target.pending_yes_no = Some(pending);
    target.outbox.send(packets::yes_no(yes_no_seq(), pending.msg_code(), &from_name));
    tracing::debug!("[party] [invited] from={} to={} auto_share={}", from, target_id, auto_share);
}

/// Yes/no answer to a party invitation, called with the world locked.
pub(crate) fn answer_invite(w: &mut World, sid: u64, from: i32, auto_share: bool, accepted: bool) {
    let Some(p) = w.player(sid) else { return };
    let (me, my_name) = (p.char_id, p.name.clone());
    let Some(inviter) = w.player_by_char(from) else { return };
    if !accepted {
        send_msg_arg(inviter, MSG_INVITE_DECLINED, &my_name);
        return;
    }
    if w.parties.get(from).is_some_and(|party| party.is_full()) {
        send_msg(inviter, MSG_PARTY_FULL);
        return;
    }
    if !w.parties.join(from, me, auto_share) {
        return;
    }
    announce_join(w, me);
    if let Some(inviter) = w.player_by_char(from) {
        send_msg_arg(inviter, MSG_JOINED_PARTY, &my_name);
    }
    tracing::info!("[party] [joined] leader={} member={}", from, my_name);
}

/// Roster to the newcomer, a join notice to the rest, then HP meters both ways.
fn announce_join(w: &mut World, joiner: i32) {
    let members = online_members(w, joiner);
    let Some(new) = members.iter().find(|m| m.char_id == joiner) else { return };
    new.outbox.send(packets::party_members(&members));
    let notice = packets::party_new_member(new);
    let positions = packets::party_positions(&members);
    for m in &members {
        if m.char_id != joiner {
            m.outbox.send(notice.clone());
        }
        m.outbox.send(positions.clone());
        for other in &members {
            if other.char_id != m.char_id {
                m.outbox.send(packets::hp_meter(other.char_id, hp_percent(other.hp, other.attr.max_hp)));
            }
        }
    }
    let shown: Vec<(i32, u16)> = members.iter().map(|m| (m.char_id, hp_percent(m.hp, m.attr.max_hp))).collect();
    if let Some(party) = w.parties.get_mut(joiner) {
        party.shown_hp.extend(shown);
    }
}

fn transfer_lead(w: &mut World, sid: u64, target_id: i32) {
    let Some(p) = w.player(sid) else { return };
    if !w.parties.is_leader(p.char_id) {
        send_msg(p, MSG_TRANSFER_NOT_LEADER);
        return;
    }
    let Some(target) = w.player_by_char(target_id) else { return };
    if target.char_id == p.char_id {
        return;
    }
    if !w.parties.get(p.char_id).is_some_and(|party| party.contains(target_id)) {
        send_msg(p, MSG_TRANSFER_NOT_MEMBER);
        return;
    }
    if !in_range(p, target) {
        send_msg(p, MSG_TRANSFER_TOO_FAR);
        return;
    }
    let old = p.char_id;
    if !w.parties.set_leader(old, target_id) {
        return;
    }
    let pkt = packets::party_leader(target_id);
    for m in online_members(w, target_id) {
        m.outbox.send(pkt.clone());
    }
    tracing::info!("[party] [leader_changed] old={} new={}", old, target_id);
}

/// `C_INVITE_PARTY_TARGET`: the party dialog.
pub async fn info(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    let members = online_members(&w, p.char_id);
    let Some(leader) = w.parties.get(p.char_id).and_then(|party| w.player_by_char(party.leader)) else {
        send_msg(p, MSG_NOT_IN_PARTY);
        return;
    };
    let names: String = members.iter().map(|m| format!("{} ", m.name)).collect();
    p.outbox.send(packets::party_html(p.char_id, &leader.name, &names));
}

/// `C_LEAVE_PARTY`.
pub async fn leave(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let mut w = srv.world.lock().await;
    let Some(char_id) = w.player(sess.id).map(|p| p.char_id) else { return };
    leave_in_world(&mut w, char_id, false);
}

/// `C_BANISH_PARTY [S name]`: leader only, names match case-insensitively.
pub async fn banish(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let name = r.read_s();
    let mut w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    if !w.parties.in_party(p.char_id) {
        return;
    }
    if !w.parties.is_leader(p.char_id) {
        send_msg(p, MSG_LEADER_ONLY_BANISHES);
        return;
    }
    let target = online_members(&w, p.char_id)
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(&name) && m.char_id != p.char_id)
        .map(|m| m.char_id);
    let Some(target) = target else {
        send_msg_arg(p, MSG_TARGET_NOT_IN_PARTY, &name);
        return;
    };
    leave_in_world(&mut w, target, true);
}

/// Takes `char_id` out of its party: voluntarily, when banished, or on
/// logout. Disbanding clears every meter; a single departure clears the
/// meters between the leaver and the rest.
pub(crate) fn leave_in_world(w: &mut World, char_id: i32, banished: bool) {
    let Some(departure) = w.parties.leave(char_id) else { return };
    let leaver_name = w.player_by_char(char_id).map(|p| p.name.clone()).unwrap_or_default();
    match departure {
        Departure::Disbanded(members) => {
            let online: Vec<&Player> = members.iter().filter_map(|m| w.player_by_char(*m)).collect();
            for a in &online {
                for b in &online {
                    a.outbox.send(packets::hp_meter(b.char_id, HP_METER_CLEAR));
                }
                send_msg(a, MSG_PARTY_DISBANDED);
            }
            tracing::info!("[party] [disbanded] by={} members={}", leaver_name, members.len());
        }
        Departure::Left(rest) => {
            let leaver = w.player_by_char(char_id);
            for m in rest.iter().filter_map(|m| w.player_by_char(*m)) {
                m.outbox.send(packets::hp_meter(char_id, HP_METER_CLEAR));
                if let Some(l) = leaver {
                    l.outbox.send(packets::hp_meter(m.char_id, HP_METER_CLEAR));
                }
                send_msg_arg(m, MSG_LEFT_PARTY, &leaver_name);
            }
            if let Some(l) = leaver {
                l.outbox.send(packets::hp_meter(char_id, HP_METER_CLEAR));
                if banished {
                    send_msg(l, MSG_BANISHED);
                } else {
                    send_msg_arg(l, MSG_LEFT_PARTY, &leaver_name);
                }
            }
            tracing::info!("[party] [left] member={} banished={} remaining={}", leaver_name, banished, rest.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::network::opcodes::{S_EVENT, S_HP_METER, S_MESSAGE_CODE, S_YES_NO};
    use crate::network::PacketWriter;

    fn invite_pkt(kind: u8, target: i32) -> Vec<u8> {
        PacketWriter::new(crate::network::opcodes::C_WHO_PARTY).c(kind).d(target).finish()
    }

    async fn party_of_two(srv: &Arc<GameServer>) -> (Arc<Session>, crate::session::OutboxReceiver, Arc<Session>, crate::session::OutboxReceiver) {
        let mut w = srv.world.lock().await;
        let (s1, rx1) = join(&mut w, 1, 32500, 32500);
        let (s2, rx2) = join(&mut w, 2, 32502, 32500);
        drop(w);
        (s1, rx1, s2, rx2)
    }

    #[tokio::test]
    async fn test_invite_then_accept_founds_party() {
        let (srv, _store) = server();
        let (s1, mut rx1, s2, mut rx2) = party_of_two(&srv).await;

        let pkt = invite_pkt(INVITE_NORMAL, 2);
        invite(&srv, &s1, &mut PacketReader::new(&pkt)).await;
        assert!(ops(&mut rx2).contains(&S_YES_NO));

        let mut w = srv.world.lock().await;
        let pending = w.player_mut(s2.id).unwrap().pending_yes_no.take();
        assert_eq!(pending, Some(PendingYesNo::PartyInvite { from: 1, auto_share: false }));
        rx1.drain();
        answer_invite(&mut w, s2.id, 1, false, true);
        assert!(w.parties.is_leader(1));
        assert!(w.parties.get(2).unwrap().contains(2));
        let joined = ops(&mut rx2);
        assert!(joined.contains(&S_EVENT) && joined.contains(&S_HP_METER));
        assert!(ops(&mut rx1).contains(&S_MESSAGE_CODE));
    }

    #[tokio::test]
    async fn test_invite_out_of_range_is_refused() {
        let (srv, _store) = server();
        let (s1, mut rx1, _s2, mut rx2) = {
            let mut w = srv.world.lock().await;
            let (s1, rx1) = join(&mut w, 1, 32500, 32500);
            let (s2, rx2) = join(&mut w, 2, 32500 + PARTY_RANGE + 1, 32500);
            (s1, rx1, s2, rx2)
        };
        let pkt = invite_pkt(INVITE_NORMAL, 2);
        invite(&srv, &s1, &mut PacketReader::new(&pkt)).await;
        assert!(rx2.drain().is_empty());
        let sent = rx1.drain();
        assert_eq!(&sent[0][..3], &[S_MESSAGE_CODE, (MSG_TOO_FAR & 0xff) as u8, (MSG_TOO_FAR >> 8) as u8]);
    }

    #[tokio::test]
    async fn test_only_leader_invites() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let _a = join(&mut w, 1, 32500, 32500);
        let (s2, mut rx2) = join(&mut w, 2, 32501, 32500);
        let (_s3, mut rx3) = join(&mut w, 3, 32502, 32500);
        w.parties.join(1, 2, false);
        send_invite(&mut w, s2.id, 3, false);
        assert!(rx3.drain().is_empty());
        assert_eq!(rx2.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_declined_invite_tells_inviter() {
        let (srv, _store) = server();
        let (_s1, mut rx1, s2, _rx2) = party_of_two(&srv).await;
        let mut w = srv.world.lock().await;
        answer_invite(&mut w, s2.id, 1, false, false);
        assert_eq!(ops(&mut rx1), vec![S_MESSAGE_CODE]);
        assert!(!w.parties.in_party(2));
    }

    #[tokio::test]
    async fn test_banish_keeps_larger_party() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s1, _rx1) = join(&mut w, 1, 32500, 32500);
        let _b = join(&mut w, 2, 32501, 32500);
        let (_s3, mut rx3) = join(&mut w, 3, 32502, 32500);
        w.parties.join(1, 2, false);
        w.parties.join(1, 3, false);
        drop(w);

        let pkt = PacketWriter::new(crate::network::opcodes::C_BANISH_PARTY).s("P3").finish();
        banish(&srv, &s1, &mut PacketReader::new(&pkt)).await;
        let w = srv.world.lock().await;
        assert!(!w.parties.in_party(3));
        assert_eq!(w.parties.get(1).unwrap().members, vec![1, 2]);
        let sent = rx3.drain();
        assert!(sent.iter().any(|p| p[0] == S_MESSAGE_CODE && p[1] == (MSG_BANISHED & 0xff) as u8));
    }

    #[tokio::test]
    async fn test_leader_leaving_disbands_and_clears_meters() {
        let (srv, _store) = server();
        let (s1, _rx1, _s2, mut rx2) = party_of_two(&srv).await;
        srv.world.lock().await.parties.join(1, 2, false);
        leave(&srv, &s1).await;
        assert_eq!(srv.world.lock().await.parties.count(), 0);
        let sent = rx2.drain();
        assert!(sent.iter().any(|p| p[0] == S_HP_METER && p[5] == HP_METER_CLEAR as u8));
        assert!(sent.iter().any(|p| p[0] == S_MESSAGE_CODE));
    }

    #[tokio::test]
    async fn test_lead_transfer() {
        let (srv, _store) = server();
        let (s1, _rx1, _s2, mut rx2) = party_of_two(&srv).await;
        srv.world.lock().await.parties.join(1, 2, false);
        let pkt = invite_pkt(TRANSFER_LEAD, 2);
        invite(&srv, &s1, &mut PacketReader::new(&pkt)).await;
        assert!(srv.world.lock().await.parties.is_leader(2));
        assert_eq!(ops(&mut rx2), vec![S_EVENT]);
    }

    #[tokio::test]
    async fn test_logout_breaks_up_pair() {
        let (srv, _store) = server();
        let (_s1, _rx1, s2, _rx2) = party_of_two(&srv).await;
        srv.world.lock().await.parties.join(1, 2, false);
        super::super::auth::leave_world(&srv, &s2).await;
        let w = srv.world.lock().await;
        assert!(!w.parties.in_party(1));
        assert_eq!(w.parties.count(), 0);
    }
}
