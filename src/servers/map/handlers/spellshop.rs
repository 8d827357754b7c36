//! Magic shops: the spells a class may still buy, and buying them.

use std::sync::Arc;

use crate::game::scripting::SpellTier;
use crate::game::World;
use crate::network::PacketReader;
use crate::repo::{with_timeout, SHORT_TIMEOUT};
use crate::session::Session;

use super::super::{packets, GameServer};
use super::{pay_adena, send_msg, MSG_NOT_ENOUGH_ADENA};

const LEARN_GFX: i32 = 224;
const MAX_ORDER: u16 = 128;

/// Unknown spells the player's class and level allow, by id.
fn offer(w: &World, srv: &GameServer, sid: u64) -> Vec<i32> {
    let Some(p) = w.player(sid) else { return Vec::new() };
    let tiers = srv.scripting.spell_tiers(p.class_type);
    if tiers.is_empty() {
        return Vec::new();
    }
    srv.data
        .skills
        .all()
        .into_iter()
        .filter(|s| !p.knows_spell(s.skill_id))
        .filter(|s| SpellTier::price(&tiers, s.skill_level, p.level).is_some())
        .map(|s| s.skill_id)
        .collect()
}

/// Shows the shop list; nothing is sent when there is nothing to learn.
pub(crate) fn open(w: &World, srv: &GameServer, sid: u64) {
    let ids = offer(w, srv, sid);
    let Some(p) = w.player(sid).filter(|_| !ids.is_empty()) else { return };
    p.outbox.send(packets::skill_buy(&ids));
}

/// `C_BUY_SPELL [D npc]`.
pub async fn browse(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let _npc = r.read_d();
    let w = srv.world.lock().await;
    open(&w, srv, sess.id);
}

/// Learns what it can of `requested`, paying for all of it at once.
/// Returns the learned ids.
pub(crate) fn learn(w: &mut World, srv: &GameServer, sid: u64, requested: &[i32]) -> Vec<i32> {
    let Some(p) = w.player_mut(sid) else { return Vec::new() };
    let tiers = srv.scripting.spell_tiers(p.class_type);
    let mut chosen = Vec::new();
    let mut total = 0;
    for &id in requested {
        if p.knows_spell(id) || chosen.contains(&id) {
            continue;
        }
        let Some(skill) = srv.data.skills.get(id) else { continue };
        let Some(cost) = SpellTier::price(&tiers, skill.skill_level, p.level) else { continue };
        total += cost;
        chosen.push(id);
    }
    if chosen.is_empty() {
        return chosen;
    }
    if !pay_adena(p, total) {
        send_msg(p, MSG_NOT_ENOUGH_ADENA);
        return Vec::new();
    }

    p.known_spells.extend_from_slice(&chosen);
    p.outbox.send(packets::skill_list(&chosen, |id| {
        srv.data.skills.get(id).map(|s| (s.skill_level - 1, s.id_bitmask))
    }));
    let (char_id, map_id, x, y) = (p.char_id, p.map_id, p.x, p.y);
    tracing::info!("[spellshop] [learned] player={} count={} cost={}", p.name, chosen.len(), total);
    w.broadcast_nearby(map_id, x, y, None, &packets::effect(char_id, LEARN_GFX));
    chosen
}

/// `C_BUYABLE_SPELL [H count][D skill id]...`.
pub async fn buy(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let count = r.read_h();
    if count == 0 || count > MAX_ORDER {
        return;
    }
    let requested: Vec<i32> = (0..count).map(|_| r.read_d()).filter(|id| *id > 0).collect();
    let (name, spells) = {
        let mut w = srv.world.lock().await;
        if learn(&mut w, srv, sess.id, &requested).is_empty() {
            return;
        }
        let Some(p) = w.player(sess.id) else { return };
        (p.name.clone(), p.known_spells.clone())
    };
    let fut = srv.repos.characters.save_known_spells(name.clone(), spells);
    if let Err(e) = with_timeout("save_spells", SHORT_TIMEOUT, fut).await {
        tracing::error!("[spellshop] [save_failed] player={} error={}", name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::database::magic_db::SkillInfo;
    use crate::game::inventory::ADENA_ITEM_ID;
    use crate::game::player::CLASS_MAGE;
    use crate::game::scripting::StdFormulas;
    use crate::network::opcodes::{C_BUYABLE_SPELL, S_EFFECT, S_MESSAGE_CODE, S_SKILL_BUY, S_SKILL_LIST};
    use crate::network::PacketWriter;
    use crate::repo::CharacterRepo;

    fn spell(skill_id: i32, skill_level: i32) -> SkillInfo {
        SkillInfo { skill_id, name: format!("s{}", skill_id), skill_level, id_bitmask: 1, ..Default::default() }
    }

    fn server() -> (Arc<GameServer>, Arc<crate::repo::MemoryStore>) {
        let mut data = data();
        data.skills.insert(spell(1, 1));
        data.skills.insert(spell(9, 2));
        data.skills.insert(spell(80, 10));
        server_from(data, Arc::new(StdFormulas))
    }

    fn mage(w: &mut World, srv: &GameServer, sid: u64, adena: i32) {
        let tpl = srv.data.items.get(ADENA_ITEM_ID).unwrap().clone();
        give(w, sid, &tpl, adena);
        w.player_mut(sid).unwrap().class_type = CLASS_MAGE;
    }

    #[tokio::test]
    async fn test_offer_skips_known_and_out_of_level() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, mut rx) = join(&mut w, 1, 32500, 32500);
        mage(&mut w, &srv, s.id, 0);
        w.player_mut(s.id).unwrap().known_spells.push(1);
        assert_eq!(offer(&w, &srv, s.id), vec![9]);
        open(&w, &srv, s.id);
        let sent = rx.drain();
        assert_eq!(sent[0][0], S_SKILL_BUY);
        assert_eq!(u16::from_le_bytes([sent[0][5], sent[0][6]]), 1);
    }

    #[tokio::test]
    async fn test_knight_too_young_sees_nothing() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, mut rx) = join(&mut w, 1, 32500, 32500);
        open(&w, &srv, s.id);
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_buy_charges_and_persists() {
        let (srv, store) = server();
        let s = {
            let mut w = srv.world.lock().await;
            let (s, _rx) = join(&mut w, 1, 32500, 32500);
            mage(&mut w, &srv, s.id, 1000);
            s
        };
        let (_o, mut orx) = join(&mut *srv.world.lock().await, 2, 32502, 32500);
        let pkt = PacketWriter::new(C_BUYABLE_SPELL).h(3).d(1).d(9).d(80).finish();
        buy(&srv, &s, &mut PacketReader::new(&pkt)).await;

        let w = srv.world.lock().await;
        let p = w.player(s.id).unwrap();
        assert_eq!(p.inventory.adena(), 500);
        assert!(p.knows_spell(1) && p.knows_spell(9) && !p.knows_spell(80));
        assert!(ops(&mut orx).contains(&S_EFFECT));
        drop(w);
        assert_eq!(store.load_known_spells("p1".into()).await.unwrap(), vec![1, 9]);
    }

    #[tokio::test]
    async fn test_short_of_adena_learns_nothing() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, mut rx) = join(&mut w, 1, 32500, 32500);
        mage(&mut w, &srv, s.id, 450);
        rx.drain();
        assert!(learn(&mut w, &srv, s.id, &[1, 9]).is_empty());
        let p = w.player(s.id).unwrap();
        assert_eq!(p.inventory.adena(), 450);
        assert!(p.known_spells.is_empty());
        let sent = ops(&mut rx);
        assert_eq!(sent, vec![S_MESSAGE_CODE]);
        assert!(!sent.contains(&S_SKILL_LIST));
    }
}
