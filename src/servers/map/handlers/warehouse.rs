//! Warehouses: the password window, opening a list, deposit and withdraw.
//!
//! The open window is cached on the player as a [`WarehouseView`] whose
//! row ids double as the object ids the client echoes back. Inventory is
//! changed under the world lock before the repository call, and restored
//! when the call fails, so an item is never in both places.

use std::sync::Arc;

use crate::game::clan::{RANK_LEAGUE_PUBLIC, RANK_PUBLIC};
use crate::game::ids::IdKind;
use crate::game::inventory::{InvItem, Removal};
use crate::game::player::{Player, WarehouseView, CLASS_ELF};
use crate::game::world::World;
use crate::network::PacketReader;
use crate::repo::{
    with_timeout, WarehouseItem, SAVE_TIMEOUT, SHORT_TIMEOUT, WH_TYPE_CHARACTER, WH_TYPE_CLAN, WH_TYPE_ELF,
    WH_TYPE_PERSONAL,
};
use crate::session::Session;

use super::super::{packets, GameServer};
use super::{pay_adena, send_added, send_msg, send_removal, GiveError, MSG_NOTHING_HAPPENS, MSG_NOT_ENOUGH_ADENA};

/// Adena charged once per withdrawal batch.
pub const WITHDRAW_FEE: i32 = 30;
/// Mithril charged by the elf warehouse instead.
pub const ELF_FEE: i32 = 2;
pub const MITHRIL: i32 = 40494;
/// The elf warehouse keeper; elves get the elf list from this NPC.
pub const ELF_KEEPER: i32 = 60028;

const MIN_LEVEL: i32 = 5;
const MAX_LINES: usize = 100;
const SEALED_BLESS: i32 = 128;

const MSG_NO_CLAN: u16 = 208;
const MSG_CLAN_WAREHOUSE_BUSY: u16 = 209;
const MSG_CLAN_RANK_TOO_LOW: u16 = 728;
const MSG_WRONG_PASSWORD: u16 = 835;
const MSG_SAME_PASSWORD: u16 = 342;

/// Client encoding of the password digits 0..=9.
const PASSWORD_DIGITS: [i32; 10] =
    [994303243, 994303242, 994303241, 994303240, 994303247, 994303246, 994303245, 994303244, 994303235, 994303234];

/// Reads six encoded digits. `None` when any of them is not in the table;
/// all six are consumed either way.
pub fn read_password(r: &mut PacketReader<'_>) -> Option<i32> {
    let mut value = 0;
    let mut valid = true;
    for _ in 0..6 {
        let raw = r.read_d();
        match PASSWORD_DIGITS.iter().position(|&d| d == raw) {
            Some(digit) => value = value * 10 + digit as i32,
            None => valid = false,
        }
    }
    valid.then_some(value)
}

/// Maps a `C_BUY_SELL` result type to (warehouse type, is deposit).
pub fn result_kind(result_type: u8) -> Option<(i16, bool)> {
    Some(match result_type {
        2 => (WH_TYPE_PERSONAL, true),
        3 => (WH_TYPE_PERSONAL, false),
        4 => (WH_TYPE_CLAN, true),
        5 => (WH_TYPE_CLAN, false),
        8 => (WH_TYPE_ELF, true),
        9 => (WH_TYPE_ELF, false),
        17 => (WH_TYPE_CHARACTER, true),
        18 => (WH_TYPE_CHARACTER, false),
        _ => return None,
    })
}

/// Account, clan or character name the rows are stored under.
fn owner_key(p: &Player, wh_type: i16) -> String {
    match wh_type {
        WH_TYPE_CLAN => p.clan_name.clone(),
        WH_TYPE_CHARACTER => p.name.clone(),
        _ => p.account.clone(),
    }
}

/// Access checks. The clan warehouse is also locked for this character.
fn admit(w: &mut World, sid: u64, wh_type: i16) -> Result<(), Option<u16>> {
    let p = w.player(sid).ok_or(None)?;
    if p.level < MIN_LEVEL || p.is_frozen() {
        return Err(None);
    }
    if wh_type != WH_TYPE_CLAN {
        return Ok(());
    }
    if p.clan_id == 0 {
        return Err(Some(MSG_NO_CLAN));
    }
    if p.clan_rank == RANK_PUBLIC || p.clan_rank == RANK_LEAGUE_PUBLIC {
        return Err(Some(MSG_CLAN_RANK_TOO_LOW));
    }
    let (clan, me) = (p.clan_id, p.char_id);
    if !w.lock_clan_warehouse(clan, me) {
        return Err(Some(MSG_CLAN_WAREHOUSE_BUSY));
    }
    Ok(())
}

async fn load_rows(srv: &GameServer, owner: String, wh_type: i16) -> Option<Vec<WarehouseItem>> {
    let res = if wh_type == WH_TYPE_CHARACTER {
        with_timeout("warehouse_load", SAVE_TIMEOUT, srv.repos.warehouse.load_by_char_name(owner.clone(), wh_type)).await
    } else {
        with_timeout("warehouse_load", SAVE_TIMEOUT, srv.repos.warehouse.load(owner.clone(), wh_type)).await
    };
    match res {
        Ok(rows) => Some(rows),
        Err(e) => {
            tracing::error!("[warehouse] [load_failed] owner={} type={} error={}", owner, wh_type, e);
            None
        }
    }
}

/// Template name, use type and inventory graphic for a list line.
fn describe(srv: &GameServer, item_id: i32) -> (String, u8, i32) {
    srv.data
        .items
        .get(item_id)
        .map(|t| (t.name.clone(), t.use_type_id(), t.inv_gfx))
        .unwrap_or_else(|| (format!("item#{}", item_id), 0, 0))
}

/// Loads a warehouse and sends its list window.
pub async fn open(srv: &Arc<GameServer>, sess: &Arc<Session>, npc_obj: i32, wh_type: i16) {
    let owner = {
        let mut w = srv.world.lock().await;
        if let Err(code) = admit(&mut w, sess.id, wh_type) {
            if let (Some(code), Some(p)) = (code, w.player(sess.id)) {
                send_msg(p, code);
            }
            return;
        }
        match w.player(sess.id) {
            Some(p) => owner_key(p, wh_type),
            None => return,
        }
    };

    let rows = load_rows(srv, owner, wh_type).await;
    let mut w = srv.world.lock().await;
    let Some(rows) = rows else {
        if let Some(me) = w.player(sess.id).map(|p| p.char_id) {
            w.unlock_clan_warehouse(me);
        }
        return;
    };
    let Some(p) = w.player_mut(sess.id) else { return };
    let lines: Vec<(i32, &WarehouseItem)> = rows.iter().map(|it| (it.id, it)).collect();
    p.outbox.send(packets::retrieve_list(npc_obj, wh_type, &lines, |id| describe(srv, id), WITHDRAW_FEE));
    tracing::debug!("[warehouse] [opened] char={} type={} rows={}", p.char_id, wh_type, rows.len());
    p.warehouse = Some(WarehouseView { wh_type, items: rows });
}

/// `C_WAREHOUSE_PASSWORD [C kind][6×D pass]`, then `[6×D new]` for kind 0
/// (set or change) or `[D npc]` for kinds 1, 2 and 4 (open personal, clan,
/// character).
pub async fn password(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let kind = r.read_c();
    let pass = read_password(r);
    if kind == 0 {
        let new_pass = read_password(r);
        let store = {
            let mut w = srv.world.lock().await;
            let Some(p) = w.player_mut(sess.id) else { return };
            match change_password(p, pass, new_pass) {
                Ok(v) => (p.account.clone(), v),
                Err(code) => {
                    send_msg(p, code);
                    return;
                }
            }
        };
        let (account, value) = store;
        if let Err(e) = with_timeout("warehouse_password", SHORT_TIMEOUT, srv.repos.accounts.update_warehouse_password(account.clone(), value)).await {
            tracing::error!("[warehouse] [password_save_failed] account={} error={}", account, e);
        }
        return;
    }

    let npc_obj = r.read_d();
    let wh_type = {
        let w = srv.world.lock().await;
        let Some(p) = w.player(sess.id) else { return };
        if pass != Some(p.warehouse_password) {
            send_msg(p, MSG_WRONG_PASSWORD);
            return;
        }
        match kind {
            1 => {
                let elf_keeper = w.npcs.get(&npc_obj).is_some_and(|n| n.npc_id == ELF_KEEPER);
                if elf_keeper && p.class_type == CLASS_ELF {
                    WH_TYPE_ELF
                } else {
                    WH_TYPE_PERSONAL
                }
            }
            2 => WH_TYPE_CLAN,
            4 => WH_TYPE_CHARACTER,
            other => {
                tracing::debug!("[warehouse] [password_kind_unknown] session={} kind={}", sess.id, other);
                return;
            }
        }
    };
    open(srv, sess, npc_obj, wh_type).await;
}

/// Applies a set/change request. Returns the value to persist.
pub fn change_password(p: &mut Player, old: Option<i32>, new: Option<i32>) -> Result<i32, u16> {
    let Some(new) = new else {
        return Err(MSG_NOTHING_HAPPENS);
    };
    match old {
        None if p.warehouse_password == 0 => {
            p.warehouse_password = new;
            p.outbox.send(packets::system_message("Warehouse password set."));
            Ok(new)
        }
        Some(old) if old > 0 && old == p.warehouse_password => {
            if old == new {
                return Err(MSG_SAME_PASSWORD);
            }
            p.warehouse_password = new;
            Ok(new)
        }
        _ => Err(MSG_WRONG_PASSWORD),
    }
}

/// Continuation of `C_BUY_SELL` for result types 2 and up:
/// `count` × `[D obj][D qty]`. A zero count on the clan warehouse is the
/// client closing the window.
pub async fn result(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>, result_type: u8, count: usize) {
    let Some((wh_type, deposit)) = result_kind(result_type) else {
        tracing::debug!("[warehouse] [result_unknown] session={} type={}", sess.id, result_type);
        return;
    };
    if count == 0 || count > MAX_LINES {
        if wh_type == WH_TYPE_CLAN {
            let mut w = srv.world.lock().await;
            if let Some(me) = w.player(sess.id).map(|p| p.char_id) {
                w.unlock_clan_warehouse(me);
            }
        }
        return;
    }
    let orders: Vec<(i32, i32)> = (0..count).map(|_| (r.read_d(), r.read_d().max(1))).collect();

    // The deposit tab can be used without a list ever being opened.
    let missing = {
        let w = srv.world.lock().await;
        let Some(p) = w.player(sess.id) else { return };
        match &p.warehouse {
            Some(v) if v.wh_type == wh_type => None,
            _ if deposit => Some(owner_key(p, wh_type)),
            _ => return,
        }
    };
    if let Some(owner) = missing {
        let Some(rows) = load_rows(srv, owner, wh_type).await else { return };
        let mut w = srv.world.lock().await;
        let Some(p) = w.player_mut(sess.id) else { return };
        p.warehouse = Some(WarehouseView { wh_type, items: rows });
    }

    if deposit {
        deposit_items(srv, sess, wh_type, &orders).await;
    } else {
        withdraw_items(srv, sess, wh_type, &orders).await;
    }

    if wh_type == WH_TYPE_CLAN {
        let mut w = srv.world.lock().await;
        if let Some(me) = w.player(sess.id).map(|p| p.char_id) {
            w.unlock_clan_warehouse(me);
        }
    }
}

enum DepositPlan {
    Stack { row_id: i32, item: InvItem },
    New { row: WarehouseItem, item: InvItem },
}

impl DepositPlan {
    fn item(&self) -> &InvItem {
        match self {
            DepositPlan::Stack { item, .. } | DepositPlan::New { item, .. } => item,
        }
    }
}

/// Takes the ordered items out of the bag and plans their rows.
fn take_for_deposit(w: &mut World, srv: &GameServer, sid: u64, wh_type: i16, orders: &[(i32, i32)]) -> Vec<DepositPlan> {
    let World { ids, players, .. } = w;
    let Some(p) = players.get_mut(&sid) else { return Vec::new() };
    let owner = owner_key(p, wh_type);
    let mut plans = Vec::new();
    for &(obj_id, qty) in orders {
        let Some(it) = p.inventory.find(obj_id) else { continue };
        if it.equipped || (wh_type == WH_TYPE_CLAN && it.bless >= SEALED_BLESS) {
            continue;
        }
        if wh_type != WH_TYPE_PERSONAL && srv.data.items.get(it.item_id).is_some_and(|t| t.untradeable) {
            continue;
        }
        let qty = qty.min(it.count);
        let mut taken = it.clone();
        taken.count = qty;
        taken.equipped = false;
        let Some(removal) = p.inventory.remove(obj_id, qty) else { continue };
        if matches!(removal, Removal::Reduced { .. }) {
            taken.obj_id = ids.next(IdKind::Item);
        }
        send_removal(p, &removal);
        p.mark_dirty();

        let stack_row = p
            .warehouse
            .as_ref()
            .filter(|_| taken.stackable)
            .and_then(|v| v.items.iter().find(|r| r.item_id == taken.item_id))
            .map(|r| r.id);
        plans.push(match stack_row {
            Some(row_id) => DepositPlan::Stack { row_id, item: taken },
            None => DepositPlan::New {
                row: WarehouseItem {
                    id: 0,
                    account_name: owner.clone(),
                    char_name: p.name.clone(),
                    wh_type,
                    item_id: taken.item_id,
                    count: qty,
                    enchant_lvl: taken.enchant as i16,
                    bless: taken.bless as i16,
                    identified: taken.identified,
                },
                item: taken,
            },
        });
    }
    plans
}

async fn deposit_items(srv: &Arc<GameServer>, sess: &Arc<Session>, wh_type: i16, orders: &[(i32, i32)]) {
    let (plans, clan_id, name) = {
        let mut w = srv.world.lock().await;
        let plans = take_for_deposit(&mut w, srv, sess.id, wh_type, orders);
        let Some(p) = w.player(sess.id) else { return };
        (plans, p.clan_id, p.name.clone())
    };
    if plans.is_empty() {
        return;
    }

    let repo = &srv.repos.warehouse;
    let mut stored = Vec::new();
    let mut failed = Vec::new();
    for plan in plans {
        let res = match &plan {
            DepositPlan::Stack { row_id, item } => {
                with_timeout("warehouse_stack", SAVE_TIMEOUT, repo.add_to_stack(*row_id, item.count)).await.map(|_| *row_id)
            }
            DepositPlan::New { row, .. } => with_timeout("warehouse_deposit", SAVE_TIMEOUT, repo.deposit(row.clone())).await,
        };
        match res {
            Ok(row_id) => stored.push((row_id, plan)),
            Err(e) => {
                tracing::error!("[warehouse] [deposit_failed] char={} item={} error={}", name, plan.item().item_id, e);
                failed.push(plan);
            }
        }
    }

    let mut history = Vec::new();
    {
        let mut w = srv.world.lock().await;
        let Some(p) = w.player_mut(sess.id) else { return };
        for plan in failed {
            let item = match plan {
                DepositPlan::Stack { item, .. } | DepositPlan::New { item, .. } => item,
            };
            let out = p.inventory.restore(item);
            send_added(p, out);
        }
        for (row_id, plan) in stored {
            history.push((plan.item().name.clone(), plan.item().count));
            let Some(view) = p.warehouse.as_mut() else { continue };
            match plan {
                DepositPlan::Stack { item, .. } => {
                    if let Some(r) = view.items.iter_mut().find(|r| r.id == row_id) {
                        r.count += item.count;
                    }
                }
                DepositPlan::New { mut row, .. } => {
                    row.id = row_id;
                    view.items.push(row);
                }
            }
        }
        p.outbox.send(packets::event_weight(p.weight242()));
        tracing::debug!("[warehouse] [deposit] char={} type={} lines={}", p.char_id, wh_type, history.len());
    }
    if wh_type == WH_TYPE_CLAN {
        record_history(srv, clan_id, &name, 0, history).await;
    }
}

/// Whether the player can cover the withdrawal fee for `wh_type`.
fn can_pay_fee(p: &Player, wh_type: i16) -> bool {
    if wh_type == WH_TYPE_ELF {
        p.inventory.count_of(MITHRIL) >= ELF_FEE
    } else {
        p.inventory.adena() >= WITHDRAW_FEE
    }
}

fn charge_fee(p: &mut Player, wh_type: i16) -> bool {
    if wh_type != WH_TYPE_ELF {
        return pay_adena(p, WITHDRAW_FEE);
    }
    match p.inventory.consume(MITHRIL, ELF_FEE) {
        Some(r) => {
            send_removal(p, &r);
            p.mark_dirty();
            true
        }
        None => false,
    }
}

/// Reserves rows from the open view. Stops at the first line the bag cannot
/// take.
fn reserve_for_withdraw(w: &mut World, srv: &GameServer, sid: u64, wh_type: i16, orders: &[(i32, i32)]) -> Vec<(WarehouseItem, i32)> {
    let Some(p) = w.player_mut(sid) else { return Vec::new() };
    if !can_pay_fee(p, wh_type) {
        send_msg(p, MSG_NOT_ENOUGH_ADENA);
        return Vec::new();
    }
    let mut reserved = Vec::new();
    for &(row_id, qty) in orders {
        let Some(row) = p.warehouse.as_ref().and_then(|v| v.items.iter().find(|r| r.id == row_id)).cloned() else {
            continue;
        };
        let qty = qty.min(row.count);
        if let Some(tpl) = srv.data.items.get(row.item_id) {
            if let Err(e) = super::can_receive(p, tpl, qty) {
                send_msg(p, e.msg_code());
                break;
            }
        } else if p.inventory.is_full() {
            send_msg(p, GiveError::Full.msg_code());
            break;
        }
        if let Some(view) = p.warehouse.as_mut() {
            if let Some(idx) = view.items.iter().position(|r| r.id == row_id) {
                view.items[idx].count -= qty;
                if view.items[idx].count <= 0 {
                    view.items.remove(idx);
                }
            }
        }
        reserved.push((row, qty));
    }
    reserved
}

async fn withdraw_items(srv: &Arc<GameServer>, sess: &Arc<Session>, wh_type: i16, orders: &[(i32, i32)]) {
    let (reserved, clan_id, name) = {
        let mut w = srv.world.lock().await;
        let reserved = reserve_for_withdraw(&mut w, srv, sess.id, wh_type, orders);
        let Some(p) = w.player(sess.id) else { return };
        (reserved, p.clan_id, p.name.clone())
    };
    if reserved.is_empty() {
        return;
    }

    let mut taken = Vec::new();
    let mut failed = Vec::new();
    for (row, qty) in reserved {
        match with_timeout("warehouse_withdraw", SAVE_TIMEOUT, srv.repos.warehouse.withdraw(row.id, qty)).await {
            Ok(_) => taken.push((row, qty)),
            Err(e) => {
                tracing::error!("[warehouse] [withdraw_failed] char={} row={} error={}", name, row.id, e);
                failed.push((row, qty));
            }
        }
    }

    let mut history = Vec::new();
    {
        let mut w = srv.world.lock().await;
        let World { ids, players, .. } = &mut *w;
        let Some(p) = players.get_mut(&sess.id) else { return };
        if let Some(view) = p.warehouse.as_mut() {
            for (row, qty) in failed {
                match view.items.iter_mut().find(|r| r.id == row.id) {
                    Some(r) => r.count += qty,
                    None => view.items.push(WarehouseItem { count: qty, ..row }),
                }
            }
        }
        for (row, qty) in &taken {
            let Some(tpl) = srv.data.items.get(row.item_id) else {
                tracing::warn!("[warehouse] [unknown_item] char={} item={}", name, row.item_id);
                continue;
            };
            let out = p.inventory.add(ids, tpl, *qty, i32::from(row.enchant_lvl), i32::from(row.bless), row.identified);
            send_added(p, out);
            history.push((tpl.name.clone(), *qty));
        }
        if !taken.is_empty() && !charge_fee(p, wh_type) {
            tracing::warn!("[warehouse] [fee_unpaid] char={} type={}", name, wh_type);
        }
        p.mark_dirty();
        tracing::debug!("[warehouse] [withdraw] char={} type={} lines={}", p.char_id, wh_type, taken.len());
    }
    if wh_type == WH_TYPE_CLAN {
        record_history(srv, clan_id, &name, 1, history).await;
    }
}

async fn record_history(srv: &GameServer, clan_id: i32, name: &str, kind: i16, lines: Vec<(String, i32)>) {
    for (item_name, count) in lines {
        let fut = srv.repos.warehouse.insert_clan_history(clan_id, name.to_string(), kind, item_name, count);
        if let Err(e) = with_timeout("clan_history", SHORT_TIMEOUT, fut).await {
            tracing::error!("[warehouse] [history_failed] clan={} error={}", clan_id, e);
        }
    }
}
