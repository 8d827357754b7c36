//! Clans: founding, joining, leaving and banishment.
//!
//! Requests are checked under the world lock, written through the clan
//! repository with the lock dropped, then applied to the world's clan
//! registry and to whichever members are online. Losing membership always
//! releases the clan warehouse if that player held it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::game::aoi::chebyshev;
use crate::game::clan::{Clan, ClanMember, CLAN_CREATE_COST, RANK_PRINCE, RANK_PUBLIC};
use crate::game::inventory::ADENA_ITEM_ID;
use crate::game::player::{PendingYesNo, CLASS_ROYAL};
use crate::game::World;
use crate::network::PacketReader;
use crate::repo::{with_timeout, SHORT_TIMEOUT};
use crate::session::Session;

use super::super::{packets, GameServer};
use super::trade::yes_no_seq;
use super::{give_item, pay_adena, send_msg, send_msg_arg, MSG_NOT_ENOUGH_ADENA};

const MSG_CREATED: u16 = 84;
const MSG_ROYALS_ONLY: u16 = 85;
const MSG_ALREADY_FOUNDED: u16 = 86;
const MSG_ALREADY_IN_CLAN: u16 = 89;
const MSG_NO_RECRUITER: u16 = 90;
const MSG_ACCEPTED_MEMBER: u16 = 94;
const MSG_JOINED_CLAN: u16 = 95;
const MSG_JOIN_REFUSED: u16 = 96;
const MSG_NAME_EXISTS: u16 = 99;
const MSG_NO_SUCH_PERSON: u16 = 109;
const MSG_MEMBER_LEFT: u16 = 178;
const MSG_BANISHED_FROM: u16 = 238;
const MSG_BANISHED_MEMBER: u16 = 240;
const MSG_DISSOLVED: u16 = 269;
const MSG_PRINCE_ONLY: u16 = 518;
const MSG_OWNS_ESTATE: u16 = 665;

/// A recruiter must stand this close to the applicant.
const JOIN_RANGE: i32 = 3;

/// `C_CREATE_PLEDGE [S name]`: royals only, costs [`CLAN_CREATE_COST`].
pub async fn create(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let clan_name = r.read_s();
    if clan_name.is_empty() {
        return;
    }
    let (char_id, name) = {
        let mut w = srv.world.lock().await;
        let taken = w.clans.name_taken(&clan_name);
        let Some(p) = w.player_mut(sess.id) else { return };
        if p.class_type != CLASS_ROYAL {
            send_msg(p, MSG_ROYALS_ONLY);
            return;
        }
        if p.clan_id != 0 {
            send_msg(p, MSG_ALREADY_FOUNDED);
            return;
        }
        if taken {
            send_msg(p, MSG_NAME_EXISTS);
            return;
        }
        if !pay_adena(p, CLAN_CREATE_COST) {
            send_msg(p, MSG_NOT_ENOUGH_ADENA);
            return;
        }
        (p.char_id, p.name.clone())
    };

    let found_date = chrono::Utc::now().timestamp();
    let res = with_timeout(
        "clan_create",
        SHORT_TIMEOUT,
        srv.repos.clans.create(char_id, name.clone(), clan_name.clone(), found_date),
    )
    .await;
    let mut w = srv.world.lock().await;
    let clan_id = match res {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("[clan] [create_failed] player={} clan={} error={}", name, clan_name, e);
            if let Some(adena) = srv.data.items.get(ADENA_ITEM_ID) {
                give_item(&mut w, sess.id, adena, CLAN_CREATE_COST, 0);
            }
            return;
        }
    };

    let mut members = HashMap::new();
    members.insert(char_id, ClanMember { char_id, name: name.clone(), rank: RANK_PRINCE });
    w.clans.insert(Clan {
        clan_id,
        name: clan_name.clone(),
        leader_id: char_id,
        leader_name: name.clone(),
        found_date,
        has_castle: 0,
        has_house: 0,
        members,
    });
    if let Some(p) = w.player_mut(sess.id) {
        p.clan_id = clan_id;
        p.clan_name = clan_name.clone();
        p.clan_rank = RANK_PRINCE;
        p.mark_dirty();
        send_msg_arg(p, MSG_CREATED, &clan_name);
        p.outbox.send(packets::clan_name(char_id, &clan_name, clan_id, true));
        p.outbox.send(packets::clan_attention());
        let (map_id, x, y) = (p.map_id, p.x, p.y);
        w.broadcast_nearby(map_id, x, y, Some(char_id), &packets::clan_name(char_id, &clan_name, clan_id, true));
    }
    tracing::info!("[clan] [created] player={} clan={} id={}", name, clan_name, clan_id);
}

/// `C_JOIN_PLEDGE`: asks the nearest prince or guardian within
/// [`JOIN_RANGE`] to take the sender in.
pub async fn join_request(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let mut w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    if p.clan_id != 0 {
        send_msg(p, MSG_ALREADY_IN_CLAN);
        return;
    }
    let recruiter = w
        .nearby_sessions(p.map_id, p.x, p.y, Some(p.char_id))
        .into_iter()
        .filter_map(|sid| w.player(sid))
        .filter(|o| w.clans.get(o.clan_id).is_some_and(|c| c.can_recruit(o.char_id)))
        .map(|o| (chebyshev(p.x, p.y, o.x, o.y), o.char_id))
        .filter(|(dist, _)| *dist <= JOIN_RANGE)
        .min();
    let Some((_, recruiter)) = recruiter else {
        send_msg(p, MSG_NO_RECRUITER);
        return;
    };
    let (applicant, applicant_name) = (p.char_id, p.name.clone());
    let Some(o) = w.player_by_char_mut(recruiter) else { return };
    let pending = PendingYesNo::ClanJoin { applicant };
    o.pending_yes_no = Some(pending);
    o.outbox.send(packets::yes_no(yes_no_seq(), pending.msg_code(), &applicant_name));
    tracing::debug!("[clan] [join_requested] applicant={} recruiter={}", applicant_name, recruiter);
}

/// The recruiter's answer to a join request.
pub(crate) async fn answer_join(srv: &Arc<GameServer>, sess: &Arc<Session>, applicant: i32, accepted: bool) {
    let (clan_id, clan_name, applicant_name) = {
        let w = srv.world.lock().await;
        let Some(me) = w.player(sess.id) else { return };
        let Some(app) = w.player_by_char(applicant) else { return };
        if !accepted {
            send_msg_arg(app, MSG_JOIN_REFUSED, &me.name);
            return;
        }
        if app.clan_id != 0 {
            send_msg(me, MSG_ALREADY_IN_CLAN);
            return;
        }
        let Some(clan) = w.clans.get(me.clan_id).filter(|c| c.can_recruit(me.char_id)) else { return };
        (clan.clan_id, clan.name.clone(), app.name.clone())
    };

    let fut = srv.repos.clans.add_member(clan_id, clan_name.clone(), applicant, applicant_name.clone(), RANK_PUBLIC);
    if let Err(e) = with_timeout("clan_add_member", SHORT_TIMEOUT, fut).await {
        tracing::error!("[clan] [join_failed] player={} clan={} error={}", applicant_name, clan_name, e);
        return;
    }

    let mut w = srv.world.lock().await;
    w.clans.add_member(clan_id, ClanMember { char_id: applicant, name: applicant_name.clone(), rank: RANK_PUBLIC });
    let member_ids: Vec<i32> = w.clans.get(clan_id).map(|c| c.members.keys().copied().collect()).unwrap_or_default();
    for m in member_ids.iter().filter(|m| **m != applicant).filter_map(|m| w.player_by_char(*m)) {
        send_msg_arg(m, MSG_ACCEPTED_MEMBER, &applicant_name);
    }
    let Some(app) = w.player_by_char_mut(applicant) else { return };
    app.clan_id = clan_id;
    app.clan_name = clan_name.clone();
    app.clan_rank = RANK_PUBLIC;
    app.title.clear();
    app.mark_dirty();
    app.outbox.send(packets::char_title(applicant, ""));
    send_msg_arg(app, MSG_JOINED_CLAN, &clan_name);
    app.outbox.send(packets::clan_name(applicant, &clan_name, clan_id, true));
    app.outbox.send(packets::clan_attention());
    let (map_id, x, y) = (app.map_id, app.x, app.y);
    w.broadcast_nearby(map_id, x, y, Some(applicant), &packets::char_title(applicant, ""));
    w.broadcast_nearby(map_id, x, y, Some(applicant), &packets::clan_name(applicant, &clan_name, clan_id, true));
    tracing::info!("[clan] [joined] player={} clan={}", applicant_name, clan_name);
}

/// Clears an online player's membership and tells them and their
/// neighbours. The player's clan warehouse lock goes with it.
fn strip_membership(w: &mut World, char_id: i32) {
    w.unlock_clan_warehouse(char_id);
    let Some(p) = w.player_by_char_mut(char_id) else { return };
    p.clan_id = 0;
    p.clan_name.clear();
    p.clan_rank = 0;
    p.mark_dirty();
    p.outbox.send(packets::clan_name(char_id, "", 0, false));
    p.outbox.send(packets::clan_attention());
    let (map_id, x, y) = (p.map_id, p.x, p.y);
    w.broadcast_nearby(map_id, x, y, Some(char_id), &packets::clan_name(char_id, "", 0, false));
}

enum Exit {
    Leave,
    Dissolve,
}

/// `C_LEAVE_PLEDGE [S clan name]`: a member leaves; the founding royal
/// dissolves the clan instead.
pub async fn leave(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let _clan_name = r.read_s();
    let (exit, clan_id, char_id, name) = {
        let w = srv.world.lock().await;
        let Some(p) = w.player(sess.id) else { return };
        let Some(clan) = w.clans.get(p.clan_id) else { return };
        let exit = if p.class_type == CLASS_ROYAL && clan.leader_id == p.char_id {
            if clan.has_castle != 0 || clan.has_house != 0 {
                send_msg(p, MSG_OWNS_ESTATE);
                return;
            }
            Exit::Dissolve
        } else {
            Exit::Leave
        };
        (exit, clan.clan_id, p.char_id, p.name.clone())
    };

    let res = match exit {
        Exit::Dissolve => with_timeout("clan_dissolve", SHORT_TIMEOUT, srv.repos.clans.dissolve(clan_id)).await,
        Exit::Leave => with_timeout("clan_remove_member", SHORT_TIMEOUT, srv.repos.clans.remove_member(clan_id, char_id)).await,
    };
    if let Err(e) = res {
        tracing::error!("[clan] [leave_failed] player={} clan={} error={}", name, clan_id, e);
        return;
    }

    let mut w = srv.world.lock().await;
    match exit {
        Exit::Dissolve => dissolve_in_world(&mut w, clan_id, &name),
        Exit::Leave => {
            let clan_name = w.clans.get(clan_id).map(|c| c.name.clone()).unwrap_or_default();
            w.clans.remove_member(clan_id, char_id);
            strip_membership(&mut w, char_id);
            let rest: Vec<i32> = w.clans.get(clan_id).map(|c| c.members.keys().copied().collect()).unwrap_or_default();
            for m in rest.iter().filter_map(|m| w.player_by_char(*m)) {
                m.outbox.send(packets::message_code(MSG_MEMBER_LEFT, &[name.as_str(), clan_name.as_str()]));
            }
            tracing::info!("[clan] [left] player={} clan={}", name, clan_name);
        }
    }
}

fn dissolve_in_world(w: &mut World, clan_id: i32, leader_name: &str) {
    let Some(clan) = w.clans.remove(clan_id) else { return };
    w.drop_clan_warehouse(clan_id);
    for id in clan.members.keys() {
        if let Some(m) = w.player_by_char(*id) {
            send_msg_arg(m, MSG_DISSOLVED, leader_name);
        }
        strip_membership(w, *id);
    }
    tracing::info!("[clan] [dissolved] clan={} leader={}", clan.name, leader_name);
}

/// `C_BAN_MEMBER [S name]`: the founding royal removes a member, online or not.
pub async fn banish(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let target_name = r.read_s();
    if target_name.is_empty() {
        return;
    }
    let (clan_id, clan_name, target) = {
        let w = srv.world.lock().await;
        let Some(p) = w.player(sess.id) else { return };
        let clan = w.clans.get(p.clan_id).filter(|c| c.leader_id == p.char_id);
        let Some(clan) = clan.filter(|_| p.class_type == CLASS_ROYAL) else {
            send_msg(p, MSG_PRINCE_ONLY);
            return;
        };
        if target_name.eq_ignore_ascii_case(&p.name) {
            return;
        }
        let Some(target) = clan.members.values().find(|m| m.name.eq_ignore_ascii_case(&target_name)) else {
            send_msg_arg(p, MSG_NO_SUCH_PERSON, &target_name);
            return;
        };
        (clan.clan_id, clan.name.clone(), target.char_id)
    };

    if let Err(e) = with_timeout("clan_remove_member", SHORT_TIMEOUT, srv.repos.clans.remove_member(clan_id, target)).await {
        tracing::error!("[clan] [banish_failed] target={} clan={} error={}", target_name, clan_name, e);
        return;
    }

    let mut w = srv.world.lock().await;
    w.clans.remove_member(clan_id, target);
    if let Some(t) = w.player_by_char(target) {
        send_msg_arg(t, MSG_BANISHED_FROM, &clan_name);
    }
    strip_membership(&mut w, target);
    if let Some(p) = w.player(sess.id) {
        send_msg_arg(p, MSG_BANISHED_MEMBER, &target_name);
    }
    tracing::info!("[clan] [banished] target={} clan={}", target_name, clan_name);
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::network::opcodes::{C_BAN_MEMBER, C_CREATE_PLEDGE, C_LEAVE_PLEDGE, S_CLANNAME, S_YES_NO};
    use crate::network::PacketWriter;
    use crate::repo::{CharacterRepo, ClanRepo};

    async fn royal_clan(srv: &Arc<GameServer>, sess: &Arc<Session>) -> i32 {
        {
            let mut w = srv.world.lock().await;
            let adena = srv.data.items.get(ADENA_ITEM_ID).unwrap().clone();
            give(&mut w, sess.id, &adena, CLAN_CREATE_COST + 100);
            w.player_mut(sess.id).unwrap().class_type = CLASS_ROYAL;
        }
        let pkt = PacketWriter::new(C_CREATE_PLEDGE).s("Lions").finish();
        create(srv, sess, &mut PacketReader::new(&pkt)).await;
        srv.world.lock().await.player(sess.id).unwrap().clan_id
    }

    #[tokio::test]
    async fn test_royal_founds_clan_and_pays() {
        let (srv, store) = server();
        let (s1, mut rx1) = join(&mut *srv.world.lock().await, 1, 32500, 32500);
        let clan_id = royal_clan(&srv, &s1).await;
        assert!(clan_id > 0);
        let w = srv.world.lock().await;
        let p = w.player(s1.id).unwrap();
        assert_eq!(p.inventory.adena(), 100);
        assert_eq!(p.clan_rank, RANK_PRINCE);
        assert!(w.clans.name_taken("lions"));
        assert_eq!(store.clan_members_of(clan_id).len(), 1);
        assert!(ops(&mut rx1).contains(&S_CLANNAME));
    }

    #[tokio::test]
    async fn test_knight_cannot_found() {
        let (srv, _store) = server();
        let (s1, mut rx1) = join(&mut *srv.world.lock().await, 1, 32500, 32500);
        let pkt = PacketWriter::new(C_CREATE_PLEDGE).s("Lions").finish();
        create(&srv, &s1, &mut PacketReader::new(&pkt)).await;
        let sent = rx1.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][1], MSG_ROYALS_ONLY as u8);
        assert_eq!(srv.world.lock().await.clans.count(), 0);
    }

    #[tokio::test]
    async fn test_join_request_then_accept() {
        let (srv, store) = server();
        let (s1, mut rx1) = join(&mut *srv.world.lock().await, 1, 32500, 32500);
        let (s2, mut rx2) = join(&mut *srv.world.lock().await, 2, 32502, 32500);
        let clan_id = royal_clan(&srv, &s1).await;
        rx1.drain();

        join_request(&srv, &s2).await;
        assert_eq!(ops(&mut rx1), vec![S_YES_NO]);
        let pending = srv.world.lock().await.player_mut(s1.id).unwrap().pending_yes_no.take();
        assert_eq!(pending, Some(PendingYesNo::ClanJoin { applicant: 2 }));

        answer_join(&srv, &s1, 2, true).await;
        let w = srv.world.lock().await;
        assert_eq!(w.player(s2.id).unwrap().clan_id, clan_id);
        assert_eq!(w.clans.clan_of(2).map(|c| c.clan_id), Some(clan_id));
        assert_eq!(store.clan_members_of(clan_id).len(), 2);
        assert!(ops(&mut rx2).contains(&S_CLANNAME));
    }

    #[tokio::test]
    async fn test_join_request_needs_recruiter_in_range() {
        let (srv, _store) = server();
        let (s1, _rx1) = join(&mut *srv.world.lock().await, 1, 32500, 32500);
        let (s2, mut rx2) = join(&mut *srv.world.lock().await, 2, 32500 + JOIN_RANGE + 1, 32500);
        royal_clan(&srv, &s1).await;
        join_request(&srv, &s2).await;
        let sent = rx2.drain();
        assert_eq!(sent[0][1], MSG_NO_RECRUITER as u8);
    }

    #[tokio::test]
    async fn test_leaving_member_releases_clan_warehouse() {
        let (srv, store) = server();
        let (s1, _rx1) = join(&mut *srv.world.lock().await, 1, 32500, 32500);
        let (s2, _rx2) = join(&mut *srv.world.lock().await, 2, 32501, 32500);
        let clan_id = royal_clan(&srv, &s1).await;
        answer_join(&srv, &s1, 2, true).await;
        assert!(srv.world.lock().await.lock_clan_warehouse(clan_id, 2));

        let pkt = PacketWriter::new(C_LEAVE_PLEDGE).s("Lions").finish();
        leave(&srv, &s2, &mut PacketReader::new(&pkt)).await;
        let mut w = srv.world.lock().await;
        assert_eq!(w.player(s2.id).unwrap().clan_id, 0);
        assert!(w.clans.clan_of(2).is_none());
        assert!(w.lock_clan_warehouse(clan_id, 1));
        assert_eq!(store.clan_members_of(clan_id).len(), 1);
    }

    #[tokio::test]
    async fn test_leader_leaving_dissolves() {
        let (srv, store) = server();
        let (s1, _rx1) = join(&mut *srv.world.lock().await, 1, 32500, 32500);
        let (s2, _rx2) = join(&mut *srv.world.lock().await, 2, 32501, 32500);
        let clan_id = royal_clan(&srv, &s1).await;
        answer_join(&srv, &s1, 2, true).await;
        assert!(srv.world.lock().await.lock_clan_warehouse(clan_id, 2));

        let pkt = PacketWriter::new(C_LEAVE_PLEDGE).s("Lions").finish();
        leave(&srv, &s1, &mut PacketReader::new(&pkt)).await;
        let w = srv.world.lock().await;
        assert_eq!(w.clans.count(), 0);
        assert_eq!(w.player(s2.id).unwrap().clan_id, 0);
        assert!(w.clan_wh_locks.is_empty());
        drop(w);
        assert!(store.load_clans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_banish_offline_member() {
        let (srv, store) = server();
        let (s1, mut rx1) = join(&mut *srv.world.lock().await, 1, 32500, 32500);
        let clan_id = royal_clan(&srv, &s1).await;
        let absent = CharacterRepo::create(&*store, crate::repo::CharacterRow { name: "Ghost".into(), ..Default::default() })
            .await
            .unwrap();
        store.add_member(clan_id, "Lions".into(), absent, "Ghost".into(), RANK_PUBLIC).await.unwrap();
        srv.world
            .lock()
            .await
            .clans
            .add_member(clan_id, ClanMember { char_id: absent, name: "Ghost".into(), rank: RANK_PUBLIC });
        rx1.drain();

        let pkt = PacketWriter::new(C_BAN_MEMBER).s("ghost").finish();
        banish(&srv, &s1, &mut PacketReader::new(&pkt)).await;
        assert!(srv.world.lock().await.clans.clan_of(absent).is_none());
        assert_eq!(store.character("Ghost").unwrap().clan_id, 0);
        assert_eq!(rx1.drain()[0][1], MSG_BANISHED_MEMBER as u8);
    }
}
