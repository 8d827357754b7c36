//! Handshake, login, character select and leaving the world.

use std::sync::Arc;

use crate::game::char_reset::SixStats;
use crate::game::equipment::EquipSlot;
use crate::game::ids::IdKind;
use crate::game::inventory::{InvItem, ADENA_ITEM_ID};
use crate::game::player::Player;
use crate::game::bookmark::Bookmarks;
use crate::game::{EntityKind, World};
use crate::network::PacketReader;
use crate::repo::{with_timeout, AccountRow, CharacterRow, ItemRow, SHORT_TIMEOUT, SAVE_TIMEOUT};
use crate::session::{Session, SessionState};

use super::super::systems::persistence::{self, SaveJob};
use super::super::view::{announce, broadcast_remove, refresh_view};
use super::super::{packets, GameServer};
use super::{companion, party, stats, trade};

/// Level from which a delete is a recoverable soft delete.
const SOFT_DELETE_LEVEL: i16 = 30;

/// Gold handed to a character entering with an empty bag for the first time.
const STARTING_ADENA: i32 = 20_000;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 16;

/// bcrypt work factor for auto-created accounts.
const BCRYPT_COST: u32 = 10;

pub async fn version(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let cfg = &srv.config;
    sess.send(packets::version_check(cfg.server_id, srv.start_unix() as i32, srv.uptime_secs(), cfg.client_language));
    sess.set_state(SessionState::VersionOk);
    tracing::debug!("[auth] [version] session={}", sess.id);
}

pub async fn login(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let account = r.read_s().trim().to_lowercase();
    let password = r.read_s();
    if account.is_empty() || password.is_empty() {
        sess.send(packets::login_check(packets::LOGIN_REJECTED));
        return;
    }

    let row = match with_timeout("load_account", SHORT_TIMEOUT, srv.repos.accounts.load(account.clone())).await {
        Ok(row) => row,
        Err(e) => {
            tracing::error!("[auth] [load_failed] account={} error={}", account, e);
            sess.send(packets::login_check(packets::LOGIN_REJECTED));
            return;
        }
    };

    let row = match row {
        Some(row) => row,
        None if srv.config.auto_create_accounts => match create_account(srv, sess, &account, &password).await {
            Some(row) => row,
            None => {
                sess.send(packets::login_check(packets::LOGIN_REJECTED));
                return;
            }
        },
        None => {
            tracing::info!("[auth] [login_rejected] account={} reason=unknown", account);
            sess.send(packets::login_check(packets::LOGIN_REJECTED));
            return;
        }
    };

    if let Err(reason) = check_account(&row) {
        tracing::info!("[auth] [login_rejected] account={} reason={}", account, reason_name(reason));
        sess.send(packets::login_check(reason));
        return;
    }

    if !verify_password(password, row.password_hash.clone()).await {
        tracing::info!("[auth] [login_rejected] account={} reason=password", account);
        sess.send(packets::login_check(packets::LOGIN_REJECTED));
        return;
    }

    if let Err(e) = with_timeout("set_online", SHORT_TIMEOUT, srv.repos.accounts.set_online(account.clone(), true)).await {
        tracing::error!("[auth] [online_failed] account={} error={}", account, e);
        sess.send(packets::login_check(packets::LOGIN_REJECTED));
        return;
    }
    sess.set_account(Some(account.clone()));
    sess.set_state(SessionState::Authenticated);
    sess.send(packets::login_check(packets::LOGIN_OK));
    tracing::info!("[auth] [login] account={} session={}", account, sess.id);
    send_char_list(srv, sess, &account).await;
}

/// Banned and already-online accounts are turned away with their own codes.
fn check_account(row: &AccountRow) -> Result<(), u16> {
    if row.banned {
        return Err(packets::LOGIN_REJECTED);
    }
    if row.online {
        return Err(packets::LOGIN_ALREADY_ONLINE);
    }
    Ok(())
}

fn reason_name(code: u16) -> &'static str {
    match code {
        packets::LOGIN_ALREADY_ONLINE => "online",
        _ => "banned",
    }
}

async fn create_account(srv: &Arc<GameServer>, sess: &Arc<Session>, account: &str, password: &str) -> Option<AccountRow> {
    let pw = password.to_string();
    let hash = match tokio::task::spawn_blocking(move || bcrypt::hash(pw, BCRYPT_COST)).await {
        Ok(Ok(h)) => h,
        Ok(Err(e)) => {
            tracing::error!("[auth] [hash_failed] account={} error={}", account, e);
            return None;
        }
        Err(e) => {
            tracing::error!("[auth] [hash_panicked] account={} error={}", account, e);
            return None;
        }
    };
    let fut = srv.repos.accounts.create(account.to_string(), hash, sess.peer.clone());
    match with_timeout("create_account", SHORT_TIMEOUT, fut).await {
        Ok(row) => {
            tracing::info!("[auth] [account_created] account={} peer={}", account, sess.peer);
            Some(row)
        }
        Err(e) => {
            tracing::error!("[auth] [create_failed] account={} error={}", account, e);
            None
        }
    }
}

/// bcrypt is deliberately slow; keep it off the runtime threads.
async fn verify_password(password: String, hash: String) -> bool {
    if hash.is_empty() {
        return false;
    }
    matches!(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await, Ok(Ok(true)))
}

/// `S_NUM_CHARACTER` followed by one `S_CHARACTER_INFO` per character.
async fn send_char_list(srv: &Arc<GameServer>, sess: &Arc<Session>, account: &str) {
    let chars = match with_timeout("list_chars", SHORT_TIMEOUT, srv.repos.characters.list_by_account(account.to_string())).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("[auth] [list_failed] account={} error={}", account, e);
            Vec::new()
        }
    };
    sess.send(packets::num_character(chars.len().min(255) as u8, srv.config.max_char_slots));
    for c in &chars {
        sess.send(packets::character_info(c));
    }
}

// ─── Character create / delete ──────────────────────────────────────────────

fn valid_name(name: &str) -> bool {
    let n = name.chars().count();
    (NAME_MIN..=NAME_MAX).contains(&n) && name.chars().all(|c| !c.is_whitespace() && !c.is_control())
}

/// Stats arrive in client order: STR DEX CON WIS CHA INT.
fn read_stats(r: &mut PacketReader<'_>) -> SixStats {
    let str = i32::from(r.read_c());
    let dex = i32::from(r.read_c());
    let con = i32::from(r.read_c());
    let wis = i32::from(r.read_c());
    let cha = i32::from(r.read_c());
    let intel = i32::from(r.read_c());
    SixStats { str, intel, wis, dex, con, cha }
}

/// Each stat within base..=base+bonus and the whole bonus spent.
fn valid_allocation(stats: &SixStats, base: &SixStats, bonus: i32) -> bool {
    let pairs = [
        (stats.str, base.str),
        (stats.dex, base.dex),
        (stats.con, base.con),
        (stats.wis, base.wis),
        (stats.cha, base.cha),
        (stats.intel, base.intel),
    ];
    pairs.iter().all(|&(v, b)| v >= b && v <= b + bonus) && stats.total() == base.total() + bonus
}

pub async fn create_char(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let Some(account) = sess.account() else { return };
    let name = r.read_s().trim().to_string();
    let class_type = i16::from(r.read_c());
    let sex = i16::from(r.read_c());
    let stats = read_stats(r);

    if !valid_name(&name) {
        sess.send(packets::create_char_check(packets::CREATE_INVALID_NAME));
        return;
    }
    let data = match (class_type, sex) {
        (0..=6, 0 | 1) => srv.scripting.char_create_data(class_type),
        _ => None,
    };
    let Some(data) = data else {
        sess.send(packets::create_char_check(packets::CREATE_WRONG_AMOUNT));
        return;
    };
    if !valid_allocation(&stats, &data.base, data.bonus) {
        tracing::debug!("[auth] [create_rejected] account={} reason=allocation", account);
        sess.send(packets::create_char_check(packets::CREATE_WRONG_AMOUNT));
        return;
    }

    match with_timeout("name_exists", SHORT_TIMEOUT, srv.repos.characters.name_exists(name.clone())).await {
        Ok(false) => {}
        Ok(true) => {
            sess.send(packets::create_char_check(packets::CREATE_NAME_EXISTS));
            return;
        }
        Err(e) => {
            tracing::error!("[auth] [create_failed] account={} error={}", account, e);
            return;
        }
    }
    match with_timeout("list_chars", SHORT_TIMEOUT, srv.repos.characters.list_by_account(account.clone())).await {
        Ok(chars) if chars.len() < usize::from(srv.config.max_char_slots) => {}
        Ok(_) => {
            sess.send(packets::create_char_check(packets::CREATE_WRONG_AMOUNT));
            return;
        }
        Err(e) => {
            tracing::error!("[auth] [create_failed] account={} error={}", account, e);
            return;
        }
    }

    let hp = srv.scripting.calc_init_hp(class_type, stats.con);
    let mp = srv.scripting.calc_init_mp(class_type, stats.wis);
    let start = srv.config.start_point;
    let birthday = chrono::Local::now().format("%Y%m%d").to_string().parse().unwrap_or(0);
    let c16 = |v: i32| v.clamp(0, i32::from(i16::MAX)) as i16;
    let mut row = CharacterRow {
        account_name: account.clone(),
        name: name.clone(),
        class_type,
        sex,
        class_id: if sex == 0 { data.male_gfx } else { data.female_gfx },
        str: c16(stats.str),
        dex: c16(stats.dex),
        con: c16(stats.con),
        wis: c16(stats.wis),
        cha: c16(stats.cha),
        intel: c16(stats.intel),
        level: 1,
        hp: c16(hp),
        mp: c16(mp),
        max_hp: c16(hp),
        max_mp: c16(mp),
        ac: 10,
        x: start.x,
        y: start.y,
        map_id: start.m,
        food: 40,
        birthday,
        ..Default::default()
    };
    row.id = match with_timeout("create_char", SAVE_TIMEOUT, srv.repos.characters.create(row.clone())).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("[auth] [create_failed] account={} char={} error={}", account, name, e);
            return;
        }
    };
    if !data.initial_spells.is_empty() {
        let fut = srv.repos.characters.save_known_spells(name.clone(), data.initial_spells.clone());
        if let Err(e) = with_timeout("save_spells", SHORT_TIMEOUT, fut).await {
            tracing::error!("[auth] [spells_failed] char={} error={}", name, e);
        }
    }
    tracing::info!("[auth] [char_created] account={} char={} class={}", account, name, class_type);
    sess.send(packets::create_char_check(packets::CREATE_OK));
    sess.send(packets::new_char_info(&row));
}

pub async fn delete_char(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let Some(account) = sess.account() else { return };
    let name = r.read_s();
    let row = match with_timeout("load_char", SHORT_TIMEOUT, srv.repos.characters.load_by_name(name.clone())).await {
        Ok(Some(row)) if row.account_name == account => row,
        Ok(_) => {
            tracing::warn!("[auth] [delete_rejected] account={} char={} reason=not_owner", account, name);
            return;
        }
        Err(e) => {
            tracing::error!("[auth] [delete_failed] char={} error={}", name, e);
            return;
        }
    };
    let (code, res) = if row.level >= SOFT_DELETE_LEVEL {
        (packets::DELETE_SOFT, with_timeout("soft_delete", SHORT_TIMEOUT, srv.repos.characters.soft_delete(row.name.clone())).await)
    } else {
        (packets::DELETE_HARD, with_timeout("hard_delete", SHORT_TIMEOUT, srv.repos.characters.hard_delete(row.name.clone())).await)
    };
    if let Err(e) = res {
        tracing::error!("[auth] [delete_failed] char={} error={}", name, e);
        return;
    }
    tracing::info!("[auth] [char_deleted] account={} char={} soft={}", account, row.name, code == packets::DELETE_SOFT);
    sess.send(packets::delete_char_ok(code));
}

// ─── Enter world ────────────────────────────────────────────────────────────

/// What enter-world loads before touching the world.
struct Loaded {
    row: CharacterRow,
    items: Vec<ItemRow>,
    bookmarks: Vec<crate::repo::BookmarkRow>,
    spells: Vec<i32>,
    account: Option<AccountRow>,
    config: Option<Vec<u8>>,
}

async fn load_character(srv: &Arc<GameServer>, account: &str, name: &str) -> Option<Loaded> {
    let row = match with_timeout("load_char", SHORT_TIMEOUT, srv.repos.characters.load_by_name(name.to_string())).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::warn!("[auth] [enter_rejected] account={} char={} reason=missing", account, name);
            return None;
        }
        Err(e) => {
            tracing::error!("[auth] [enter_failed] char={} error={}", name, e);
            return None;
        }
    };
    if row.account_name != account {
        tracing::warn!("[auth] [enter_rejected] account={} char={} reason=not_owner", account, name);
        return None;
    }
    let repos = &srv.repos;
    let (items, bookmarks, spells, acc, config) = tokio::join!(
        with_timeout("load_items", SHORT_TIMEOUT, repos.items.load_by_char_id(row.id)),
        with_timeout("load_bookmarks", SHORT_TIMEOUT, repos.characters.load_bookmarks(row.name.clone())),
        with_timeout("load_spells", SHORT_TIMEOUT, repos.characters.load_known_spells(row.name.clone())),
        with_timeout("load_account", SHORT_TIMEOUT, repos.accounts.load(account.to_string())),
        with_timeout("load_char_config", SHORT_TIMEOUT, repos.characters.load_char_config(row.id)),
    );
    // a missing inventory would be saved back empty on logout
    let items = match items {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("[auth] [enter_failed] char={} what=inventory error={}", name, e);
            return None;
        }
    };
    Some(Loaded {
        row,
        items,
        bookmarks: bookmarks.unwrap_or_default(),
        spells: spells.unwrap_or_default(),
        account: acc.ok().flatten(),
        config: config.ok().flatten(),
    })
}

/// Rebuilds the bag from saved rows. Equip flags are returned separately so
/// the overlay is computed once after everything is in.
fn restore_inventory(w: &World, srv: &GameServer, p: &mut Player, rows: &[ItemRow]) -> Vec<(EquipSlot, i32)> {
    let mut slots = Vec::new();
    for row in rows {
        let Some(tpl) = srv.data.items.get(row.item_id) else {
            tracing::warn!("[auth] [item_skipped] char={} item_id={} (no template)", p.name, row.item_id);
            continue;
        };
        let obj_id = if row.obj_id > 0 { row.obj_id } else { w.ids.next(IdKind::Item) };
        let mut it = InvItem::from_template(obj_id, tpl, row.count, i32::from(row.enchant_lvl), i32::from(row.bless), row.identified);
        it.durability = i32::from(row.durability);
        if row.equipped {
            if let Some(slot) = EquipSlot::from_index(row.equip_slot) {
                it.equipped = true;
                slots.push((slot, obj_id));
            }
        }
        p.inventory.push_loaded(it);
    }
    if rows.is_empty() && p.level <= 1 && p.exp == 0 {
        if let Some(tpl) = srv.data.items.get(ADENA_ITEM_ID) {
            p.inventory.add(&w.ids, tpl, STARTING_ADENA, 0, 1, true);
        }
    }
    slots
}

pub async fn enter_world(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let Some(account) = sess.account() else { return };
    let name = r.read_s();
    if srv.world.lock().await.session_by_name(&name).is_some() {
        tracing::warn!("[auth] [enter_rejected] account={} char={} reason=in_world", account, name);
        return;
    }
    let Some(loaded) = load_character(srv, &account, &name).await else {
        sess.close();
        return;
    };
    let Loaded { mut row, items, bookmarks, spells, account: acc, config } = loaded;

    let is_gm = srv.config.is_gm(&account) || acc.as_ref().is_some_and(|a| a.access_level > 0);
    if row.map_id == 0 && row.x == 0 && row.y == 0 {
        let start = srv.config.start_point;
        (row.map_id, row.x, row.y) = (start.m, start.x, start.y);
    }
    // a character saved dead comes back at the restart point
    if row.hp <= 0 {
        if let Some(loc) = srv.scripting.respawn_location(row.map_id) {
            (row.map_id, row.x, row.y) = (loc.map_id, loc.x, loc.y);
        }
        row.hp = row.level.max(1);
    }

    let mut w = srv.world.lock().await;
    if w.session_by_name(&row.name).is_some() {
        return;
    }
    let mut p = Player::from_row(&row, sess.id, sess.outbox(), is_gm);
    let slots = restore_inventory(&w, srv, &mut p, &items);
    p.restore_equipment(&slots, &srv.data);
    p.bookmarks = Bookmarks::from_rows(bookmarks);
    p.known_spells = spells;
    p.warehouse_password = acc.map(|a| a.warehouse_password).unwrap_or(0);
    if let Some((x, y)) = w.free_tile_near(&srv.data.maps, p.map_id, p.x, p.y, 5) {
        (p.x, p.y) = (x, y);
    }

    send_enter_sequence(srv, &w, &p, config.as_deref());
    let (char_id, sid) = (p.char_id, p.session_id);
    w.add_player(p);
    sess.set_state(SessionState::InWorld);
    announce(&mut w, (EntityKind::Player, char_id));
    refresh_view(&mut w, sid);
    if let Some(p) = w.player(sid) {
        p.outbox.send(packets::game_time(srv.now_secs()));
    }
    tracing::info!("[auth] [enter_world] account={} char={} gm={} players={}", account, row.name, is_gm, w.player_count());
}

fn send_enter_sequence(srv: &GameServer, w: &World, p: &Player, config: Option<&[u8]>) {
    let out = &p.outbox;
    out.send(packets::enter_world_check((p.clan_id > 0).then_some(p.char_id)));
    out.send(packets::inventory_batch(p.inventory.iter().collect::<Vec<_>>().into_iter()));
    out.send(packets::status(p, srv.now_secs()));
    out.send(packets::world_map(p.map_id));
    out.send(packets::own_char_pack(p));
    out.send(packets::magic_status(p.attr.sp, p.attr.mr));
    out.send(packets::weather(w.weather));
    out.send(packets::ability_scores(p));
    out.send(packets::skill_list(&p.known_spells, |id| {
        srv.data.skills.get(id).map(|s| (s.skill_level - 1, s.id_bitmask))
    }));
    out.send(packets::bookmark_list(p.bookmarks.iter().collect::<Vec<_>>().into_iter()));
    if let Some(blob) = config.filter(|b| !b.is_empty()) {
        out.send(packets::character_config(blob));
    }
    out.send(packets::event_food(p.food));
    out.send(packets::event_weight(p.weight242()));
}

// ─── Leaving ────────────────────────────────────────────────────────────────

/// Detaches the session's player: companions away, locks released, removal
/// broadcast, then everything saved. Safe to call when nothing is in world.
pub async fn leave_world(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let job = {
        let mut w = srv.world.lock().await;
        let Some(char_id) = w.player(sess.id).map(|p| p.char_id) else { return };
        trade::cancel_in_world(&mut w, sess.id);
        w.unlock_clan_warehouse(char_id);
        party::leave_in_world(&mut w, char_id, false);
        let pets = companion::dismiss_all(&mut w, char_id);
        broadcast_remove(&mut w, (EntityKind::Player, char_id));
        let Some(mut p) = w.remove_player(sess.id) else { return };
        stats::cancel_reset(&mut p);
        tracing::info!("[auth] [leave_world] char={} session={} players={}", p.name, sess.id, w.player_count());
        SaveJob::full(&p, pets)
    };
    persistence::save(&srv.repos, job).await;
}

pub async fn quit(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    leave_world(srv, sess).await;
    sess.close();
}

pub async fn return_to_select(srv: &Arc<GameServer>, sess: &Arc<Session>) {
    let Some(account) = sess.account() else { return };
    leave_world(srv, sess).await;
    sess.set_state(SessionState::ReturningToSelect);
    send_char_list(srv, sess, &account).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::testutil;

    fn pkt(w: PacketWriter) -> Vec<u8> {
        w.finish()
    }

    fn ops(rx: &mut crate::session::OutboxReceiver) -> Vec<u8> {
        testutil::ops(rx)
    }

    #[tokio::test]
    async fn test_login_success_sends_char_list() {
        let (srv, store) = testutil::server();
        store.insert_account("Alice", "secret");
        let (sess, mut rx) = Session::new(1, "peer".into(), 64);
        sess.set_state(SessionState::VersionOk);
        let raw = pkt(PacketWriter::new(C_LOGIN).s("Alice").s("secret"));
        login(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(sess.state(), SessionState::Authenticated);
        assert_eq!(sess.account().as_deref(), Some("alice"));
        assert_eq!(ops(&mut rx), vec![S_LOGIN_CHECK, S_NUM_CHARACTER]);
        assert!(store.account("alice").unwrap().online);
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_online() {
        let (srv, store) = testutil::server();
        store.insert_account("bob", "pw");
        let (sess, mut rx) = Session::new(1, "peer".into(), 64);
        sess.set_state(SessionState::VersionOk);
        let raw = pkt(PacketWriter::new(C_LOGIN).s("bob").s("nope"));
        login(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(sess.state(), SessionState::VersionOk);
        let out = rx.drain();
        let mut r = PacketReader::new(&out[0]);
        assert_eq!(r.read_h(), packets::LOGIN_REJECTED);

        srv.repos.accounts.set_online("bob".into(), true).await.unwrap();
        let raw = pkt(PacketWriter::new(C_LOGIN).s("bob").s("pw"));
        login(&srv, &sess, &mut PacketReader::new(&raw)).await;
        let out = rx.drain();
        let mut r = PacketReader::new(&out[0]);
        assert_eq!(r.read_h(), packets::LOGIN_ALREADY_ONLINE);
    }

    #[test]
    fn test_allocation_rules() {
        let base = SixStats { str: 13, intel: 9, wis: 9, dex: 9, con: 12, cha: 8 };
        let ok = SixStats { str: 18, intel: 9, wis: 9, dex: 12, con: 16, cha: 8 };
        assert!(valid_allocation(&ok, &base, 12));
        let short = SixStats { str: 18, ..base };
        assert!(!valid_allocation(&short, &base, 12));
        let below = SixStats { cha: 7, str: 26, ..base };
        assert!(!valid_allocation(&below, &base, 12));
        assert!(valid_name("Ann"));
        assert!(!valid_name("a"));
        assert!(!valid_name("two words"));
        assert!(!valid_name("seventeen_chars_x"));
    }

    #[tokio::test]
    async fn test_create_then_enter_world() {
        let (srv, store) = testutil::server();
        let (sess, mut rx) = Session::new(1, "peer".into(), 256);
        sess.set_account(Some("acc9".into()));
        sess.set_state(SessionState::Authenticated);

        let data = srv.scripting.char_create_data(1).unwrap();
        let mut stats = data.base;
        stats.str += data.bonus;
        let raw = pkt(
            PacketWriter::new(C_CREATE_CHAR)
                .s("Knight")
                .c(1)
                .c(0)
                .c(stats.str as u8)
                .c(stats.dex as u8)
                .c(stats.con as u8)
                .c(stats.wis as u8)
                .c(stats.cha as u8)
                .c(stats.intel as u8),
        );
        create_char(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(ops(&mut rx), vec![S_CREATE_CHAR_CHECK, S_NEW_CHAR_INFO]);
        let row = store.character("Knight").unwrap();
        assert_eq!(row.level, 1);
        assert_eq!(row.map_id, srv.config.start_point.m);

        // same name again
        create_char(&srv, &sess, &mut PacketReader::new(&raw)).await;
        let out = rx.drain();
        assert_eq!(out[0][1], packets::CREATE_NAME_EXISTS);

        let raw = pkt(PacketWriter::new(C_ENTER_WORLD).s("Knight"));
        enter_world(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert_eq!(sess.state(), SessionState::InWorld);
        let seq = ops(&mut rx);
        assert_eq!(&seq[..5], &[S_ENTER_WORLD_CHECK, S_ADD_INVENTORY_BATCH, S_STATUS, S_WORLD, S_PUT_OBJECT]);
        assert_eq!(seq.last(), Some(&S_TIME));
        let w = srv.world.lock().await;
        let p = w.player(1).unwrap();
        assert_eq!(p.inventory.adena(), STARTING_ADENA);
        assert!(w.is_occupied(p.map_id, p.x, p.y, 0));
    }

    #[tokio::test]
    async fn test_enter_world_rejects_foreign_character() {
        let (srv, _store) = testutil::server();
        let mut row = testutil::row(0, 32100, 32100);
        row.name = "Other".into();
        row.account_name = "someone".into();
        srv.repos.characters.create(row).await.unwrap();
        let (sess, _rx) = Session::new(1, "peer".into(), 64);
        sess.set_account(Some("acc1".into()));
        sess.set_state(SessionState::Authenticated);
        let raw = pkt(PacketWriter::new(C_ENTER_WORLD).s("Other"));
        enter_world(&srv, &sess, &mut PacketReader::new(&raw)).await;
        assert!(sess.is_closed());
        assert_eq!(srv.world.lock().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_soft_and_hard() {
        let (srv, store) = testutil::server();
        let mut high = testutil::row(0, 1, 1);
        high.name = "Veteran".into();
        high.account_name = "acc1".into();
        let mut low = high.clone();
        low.name = "Rookie".into();
        low.level = 5;
        srv.repos.characters.create(high).await.unwrap();
        srv.repos.characters.create(low).await.unwrap();
        let (sess, mut rx) = Session::new(1, "peer".into(), 64);
        sess.set_account(Some("acc1".into()));

        let raw = pkt(PacketWriter::new(C_DELETE_CHAR).s("Veteran"));
        delete_char(&srv, &sess, &mut PacketReader::new(&raw)).await;
        let raw = pkt(PacketWriter::new(C_DELETE_CHAR).s("Rookie"));
        delete_char(&srv, &sess, &mut PacketReader::new(&raw)).await;
        let out = rx.drain();
        assert_eq!(out[0][1], packets::DELETE_SOFT);
        assert_eq!(out[1][1], packets::DELETE_HARD);
        assert!(store.character("Veteran").is_none());
        assert!(!srv.repos.characters.name_exists("Rookie".into()).await.unwrap());
    }

    #[tokio::test]
    async fn test_leave_world_saves_and_removes() {
        let (srv, store) = testutil::server();
        let mut row = testutil::row(0, 32100, 32100);
        row.account_name = "acc1".into();
        row.name = "Leaver".into();
        let id = srv.repos.characters.create(row).await.unwrap();
        let (sess, _rx) = Session::new(5, "peer".into(), 256);
        sess.set_account(Some("acc1".into()));
        sess.set_state(SessionState::Authenticated);
        let raw = pkt(PacketWriter::new(C_ENTER_WORLD).s("Leaver"));
        enter_world(&srv, &sess, &mut PacketReader::new(&raw)).await;

        let (_other, mut other_rx) = {
            let mut w = srv.world.lock().await;
            w.player_mut(5).unwrap().level = 31;
            let (s, mut rx) = testutil::join(&mut w, 77, 32101, 32100);
            refresh_view(&mut w, s.id);
            rx.drain();
            (s, rx)
        };
        leave_world(&srv, &sess).await;
        leave_world(&srv, &sess).await;
        assert_eq!(ops(&mut other_rx), vec![S_REMOVE_OBJECT]);
        let w = srv.world.lock().await;
        assert!(w.player(5).is_none());
        assert!(!w.is_occupied(4, 32100, 32100, 0));
        assert_eq!(store.character("Leaver").unwrap().level, 31);
        assert_eq!(store.inventory(id).len(), 0);
    }
}
