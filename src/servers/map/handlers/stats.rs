//! Bonus stat allocation above level 50 and the respec (character reset)
//! window.

use std::sync::Arc;

use crate::game::char_reset::{CharReset, ResetError, ResetOrigin, SixStats, RESET_CANDLE_ID, RESET_END};
use crate::game::player::Player;
use crate::game::world::World;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::{packets, view, GameServer};
use super::{send_msg, send_removal, send_status};

/// First word of a `C_ATTR` carrying a stat allocation instead of a yes/no
/// answer.
pub const ALLOCATE_MODE: u16 = 479;
pub const MAX_STAT: i32 = 35;
pub const MAX_STAT_TOTAL: i32 = 210;
const BONUS_FROM_LEVEL: i32 = 50;
const TEN_LEVELS: i32 = 10;

const MSG_STAT_CAPPED: u16 = 481;
const MSG_MISSING_ITEM: u16 = 1290;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("no bonus points left")]
    NoPoints,
    #[error("stat total at cap")]
    TotalCapped,
    #[error("stat at cap")]
    StatCapped,
    #[error("unknown stat")]
    UnknownStat,
}

fn stat_code(name: &str) -> Option<u8> {
    match name {
        "str" => Some(1),
        "int" => Some(2),
        "wis" => Some(3),
        "dex" => Some(4),
        "con" => Some(5),
        "cha" => Some(6),
        _ => None,
    }
}

pub fn six_of(p: &Player) -> SixStats {
    SixStats { str: p.base.str, intel: p.base.intel, wis: p.base.wis, dex: p.base.dex, con: p.base.con, cha: p.base.cha }
}

fn adjust(base: &mut i32, attr: &mut i32, v: i32) {
    *attr += v - *base;
    *base = v;
}

/// Overwrites the six base stats; equipment and buff deltas stay on top.
fn set_six(p: &mut Player, s: &SixStats) {
    adjust(&mut p.base.str, &mut p.attr.str, s.str);
    adjust(&mut p.base.intel, &mut p.attr.intel, s.intel);
    adjust(&mut p.base.wis, &mut p.attr.wis, s.wis);
    adjust(&mut p.base.dex, &mut p.attr.dex, s.dex);
    adjust(&mut p.base.con, &mut p.attr.con, s.con);
    adjust(&mut p.base.cha, &mut p.attr.cha, s.cha);
}

/// Sets base max HP/MP and fills both.
fn set_max_vitals(p: &mut Player, max_hp: i32, max_mp: i32) {
    adjust(&mut p.base.max_hp, &mut p.attr.max_hp, max_hp);
    adjust(&mut p.base.max_mp, &mut p.attr.max_mp, max_mp);
    p.hp = p.attr.max_hp;
    p.mp = p.attr.max_mp;
}

pub fn bonus_points(p: &Player) -> i32 {
    (p.level - BONUS_FROM_LEVEL - p.bonus_stats).max(0)
}

/// Spends one bonus point on `stat`. Returns whether another point can
/// still be spent.
pub fn raise_bonus_stat(p: &mut Player, stat: &str) -> Result<bool, AllocError> {
    if bonus_points(p) == 0 {
        return Err(AllocError::NoPoints);
    }
    let mut six = six_of(p);
    if six.total() >= MAX_STAT_TOTAL {
        return Err(AllocError::TotalCapped);
    }
    let code = stat_code(stat).ok_or(AllocError::UnknownStat)?;
    if six.value(code).is_some_and(|v| v >= MAX_STAT) {
        return Err(AllocError::StatCapped);
    }
    six.bump(code);
    set_six(p, &six);
    p.bonus_stats += 1;
    Ok(bonus_points(p) > 0 && six.total() < MAX_STAT_TOTAL)
}

/// `C_ATTR [H 479][C confirm][S stat]`, routed here by the yes/no handler.
pub async fn allocate(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let confirm = r.read_c();
    let stat = r.read_s();
    if confirm != 1 {
        return;
    }
    let mut w = srv.world.lock().await;
    let Some(p) = w.player_mut(sess.id) else { return };
    if !p.is_alive() {
        return;
    }
    match raise_bonus_stat(p, &stat) {
        Ok(more) => {
            p.mark_dirty();
            send_status(p, srv.now_secs());
            if more {
                p.outbox.send(packets::hypertext(p.char_id, packets::HTML_BONUS_STATS));
            }
            tracing::info!("[stats] [allocated] char={} stat={} used={}", p.name, stat, p.bonus_stats);
        }
        Err(AllocError::StatCapped) => send_msg(p, MSG_STAT_CAPPED),
        Err(e) => tracing::debug!("[stats] [allocate_refused] char={} stat={} reason={}", p.name, stat, e),
    }
}

// ─── Respec ─────────────────────────────────────────────────────────────────

/// Opens the respec window: stats drop to the class base at level 1 and the
/// client is frozen until the last stage.
pub fn start_reset(w: &mut World, srv: &GameServer, sid: u64) {
    let Some(p) = w.player_mut(sid) else { return };
    if p.char_reset.is_some() || !p.is_alive() {
        return;
    }
    if p.inventory.find_by_item_id(RESET_CANDLE_ID).is_none() {
        send_msg(p, MSG_MISSING_ITEM);
        return;
    }
    let Some(class) = srv.scripting.char_create_data(p.class_type) else {
        tracing::warn!("[stats] [reset_no_class] char={} class={}", p.name, p.class_type);
        return;
    };

    let current = six_of(p);
    let mut reset = CharReset::start(p.level, p.bonus_stats, p.elixir_stats, current.total(), class.base);
    reset.origin = ResetOrigin { level: p.level, exp: p.exp, stats: current, max_hp: p.base.max_hp, max_mp: p.base.max_mp };

    set_six(p, &class.base);
    let hp = srv.scripting.calc_init_hp(p.class_type, class.base.con);
    let mp = srv.scripting.calc_init_mp(p.class_type, class.base.wis);
    set_max_vitals(p, hp, mp);
    p.level = 1;

    p.outbox.send(packets::reset_freeze(true));
    send_status(p, srv.now_secs());
    p.outbox.send(packets::char_reset_open(hp, mp, reset.max_level));
    tracing::info!("[stats] [reset_started] char={} max_level={} elixir={}", p.name, reset.max_level, reset.elixir);
    p.char_reset = Some(reset);
}

/// Puts back what the character had before an unfinished respec.
pub fn cancel_reset(p: &mut Player) {
    let Some(reset) = p.char_reset.take() else { return };
    let o = reset.origin;
    set_six(p, &o.stats);
    set_max_vitals(p, o.max_hp, o.max_mp);
    p.level = o.level;
    p.exp = o.exp;
    tracing::info!("[stats] [reset_cancelled] char={} level={}", p.name, o.level);
}

fn read_six(r: &mut PacketReader<'_>) -> SixStats {
    SixStats::from_bytes([r.read_c(), r.read_c(), r.read_c(), r.read_c(), r.read_c(), r.read_c()])
}

/// Rolls HP/MP for `levels` level-ups on the respec's current stats.
fn grow(srv: &GameServer, p: &mut Player, reset: &CharReset, levels: i32) {
    let (mut hp, mut mp) = (p.base.max_hp, p.base.max_mp);
    for _ in 0..levels {
        let up = srv.scripting.calc_level_up(p.class_type, reset.stats.con, reset.stats.wis);
        hp += up.hp;
        mp += up.mp;
    }
    set_six(p, &reset.stats);
    set_max_vitals(p, hp, mp);
    p.level = reset.temp_level;
    p.outbox.send(packets::char_reset_level(reset.temp_level, reset.max_level, p.attr.max_hp, p.attr.max_mp, p.attr.ac, &reset.stats));
}

/// Runs one respec packet. `Ok(true)` means the respec is complete.
fn step(srv: &GameServer, p: &mut Player, reset: &mut CharReset, stage: u8, r: &mut PacketReader<'_>) -> Result<bool, ResetError> {
    match stage {
        1 => {
            let stats = read_six(r);
            let Some(class) = srv.scripting.char_create_data(p.class_type) else { return Ok(false) };
            reset.stage1(stats, &class.base, class.bonus)?;
            set_six(p, &stats);
            let hp = srv.scripting.calc_init_hp(p.class_type, stats.con);
            let mp = srv.scripting.calc_init_mp(p.class_type, stats.wis);
            set_max_vitals(p, hp, mp);
            p.level = 1;
            p.outbox.send(packets::char_reset_level(1, reset.max_level, hp, mp, p.attr.ac, &stats));
            Ok(false)
        }
        2 => match r.read_c() {
            sub @ 0..=6 => {
                let mut next = reset.clone();
                next.stats.bump(sub);
                next.level_up(1)?;
                *reset = next;
                grow(srv, p, reset, 1);
                Ok(false)
            }
            7 => {
                reset.level_up(TEN_LEVELS)?;
                grow(srv, p, reset, TEN_LEVELS);
                Ok(false)
            }
            8 => {
                let last = r.read_c();
                let to_elixir = reset.finish_levels(last)?;
                set_six(p, &reset.stats);
                if to_elixir {
                    p.outbox.send(packets::char_reset_elixir(reset.elixir));
                }
                Ok(!to_elixir)
            }
            _ => Ok(false),
        },
        3 => {
            let stats = read_six(r);
            reset.stage3(stats)?;
            set_six(p, &stats);
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn finish_reset(w: &mut World, srv: &GameServer, sid: u64, reset: CharReset) {
    let Some(p) = w.player_mut(sid) else { return };
    p.level = reset.temp_level;
    p.exp = srv.scripting.exp_for_level(p.level);
    p.bonus_stats = reset.bonus_used();
    p.hp = p.attr.max_hp;
    p.mp = p.attr.max_mp;
    if let Some(removal) = p.inventory.consume(RESET_CANDLE_ID, 1) {
        send_removal(p, &removal);
    }
    p.mark_dirty();
    p.outbox.send(packets::reset_freeze(false));
    send_status(p, srv.now_secs());
    p.outbox.send(packets::exp(p.level, p.exp));
    tracing::info!("[stats] [reset_done] char={} level={} stats={}", p.name, p.level, reset.stats.total());
    let heading = p.heading;
    let (map_id, x, y) = RESET_END;
    view::teleport(w, sid, map_id, x, y, heading);
}

/// `C_CHAR_RESET [C stage] ...`. Ignored unless a respec is open.
pub async fn char_reset(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let stage = r.read_c();
    let mut w = srv.world.lock().await;
    let Some(p) = w.player_mut(sess.id) else { return };
    let Some(mut reset) = p.char_reset.take() else { return };
    match step(srv, p, &mut reset, stage, r) {
        Ok(true) => finish_reset(&mut w, srv, sess.id, reset),
        Ok(false) => p.char_reset = Some(reset),
        Err(e) => {
            tracing::debug!("[stats] [reset_refused] char={} stage={} reason={}", p.name, stage, e);
            p.char_reset = Some(reset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ItemTemplate;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::testutil;

    #[tokio::test]
    async fn test_bonus_allocation_caps() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let p = w.player_mut(sess.id).unwrap();
        assert_eq!(raise_bonus_stat(p, "str"), Err(AllocError::NoPoints));

        p.level = 52;
        assert_eq!(raise_bonus_stat(p, "luck"), Err(AllocError::UnknownStat));
        assert_eq!(raise_bonus_stat(p, "str"), Ok(true));
        assert_eq!((p.base.str, p.attr.str, p.bonus_stats), (21, 21, 1));
        assert_eq!(raise_bonus_stat(p, "dex"), Ok(false));
        assert_eq!(raise_bonus_stat(p, "dex"), Err(AllocError::NoPoints));

        p.level = 60;
        p.base.con = MAX_STAT;
        assert_eq!(raise_bonus_stat(p, "con"), Err(AllocError::StatCapped));
    }

    #[tokio::test]
    async fn test_allocate_packet_reopens_dialog() {
        let (srv, _store) = testutil::server();
        let (sess, mut rx) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32100);
            w.player_mut(sess.id).unwrap().level = 53;
            (sess, rx)
        };
        let raw = PacketWriter::new(C_ATTR).c(1).s("wis").finish();
        allocate(&srv, &sess, &mut PacketReader::new(&raw)).await;
        let ops = testutil::ops(&mut rx);
        assert_eq!(ops.last(), Some(&S_HYPERTEXT));
        let w = srv.world.lock().await;
        assert_eq!(w.player(sess.id).unwrap().base.wis, 11);
    }

    async fn with_candle() -> (Arc<GameServer>, Arc<Session>, crate::session::OutboxReceiver) {
        let mut data = testutil::data();
        data.items.insert(ItemTemplate { item_id: RESET_CANDLE_ID, name: "Candle".into(), stackable: true, ..Default::default() });
        let (srv, _store) = testutil::server_from(data, Arc::new(crate::game::scripting::StdFormulas));
        let (sess, rx) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32100);
            let candle = srv.data.items.get(RESET_CANDLE_ID).unwrap().clone();
            testutil::give(&mut w, sess.id, &candle, 1);
            (sess, rx)
        };
        (srv, sess, rx)
    }

    fn packet(stage: u8, body: &[u8]) -> Vec<u8> {
        PacketWriter::new(C_CHAR_RESET).c(stage).bytes(body).finish()
    }

    #[tokio::test]
    async fn test_full_respec_flow() {
        let (srv, sess, mut rx) = with_candle().await;
        {
            let mut w = srv.world.lock().await;
            start_reset(&mut w, &srv, sess.id);
            let p = w.player(sess.id).unwrap();
            assert_eq!(p.level, 1);
            // knight: 84 points at level 30 gives a target of 59
            assert_eq!(p.char_reset.as_ref().unwrap().max_level, 59);
        }
        assert_eq!(testutil::ops(&mut rx).last(), Some(&S_CHAR_RESET));

        // knight base plus 4 bonus points
        char_reset(&srv, &sess, &mut PacketReader::new(&packet(1, &[20, 8, 9, 12, 14, 12]))).await;
        char_reset(&srv, &sess, &mut PacketReader::new(&packet(2, &[1]))).await;
        for _ in 0..6 {
            char_reset(&srv, &sess, &mut PacketReader::new(&packet(2, &[7]))).await;
        }
        {
            let w = srv.world.lock().await;
            let p = w.player(sess.id).unwrap();
            let reset = p.char_reset.as_ref().unwrap();
            // the sixth jump of ten would pass 59
            assert_eq!(reset.temp_level, 52);
            assert_eq!(p.base.str, 21);
        }
        char_reset(&srv, &sess, &mut PacketReader::new(&packet(2, &[8, 4]))).await;

        let w = srv.world.lock().await;
        let p = w.player(sess.id).unwrap();
        assert!(p.char_reset.is_none());
        assert_eq!(p.level, 52);
        assert_eq!(p.bonus_stats, 2);
        assert_eq!(p.base.dex, 13);
        assert_eq!(p.inventory.count_of(RESET_CANDLE_ID), 0);
        assert_eq!((p.map_id, p.x, p.y), RESET_END);
        assert_eq!(p.hp, p.attr.max_hp);
    }

    #[tokio::test]
    async fn test_cancel_restores_character() {
        let (srv, sess, _rx) = with_candle().await;
        let mut w = srv.world.lock().await;
        start_reset(&mut w, &srv, sess.id);
        let p = w.player_mut(sess.id).unwrap();
        assert_eq!(p.base.str, 16);
        cancel_reset(p);
        assert_eq!((p.level, p.base.str, p.base.max_hp), (30, 20, 250));
        assert_eq!(p.inventory.count_of(RESET_CANDLE_ID), 1);
    }

    #[tokio::test]
    async fn test_reset_needs_candle() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        start_reset(&mut w, &srv, sess.id);
        assert!(w.player(sess.id).unwrap().char_reset.is_none());
        assert_eq!(testutil::ops(&mut rx), vec![S_MESSAGE_CODE]);
    }
}
