//! NPC dialogs and actions: merchants, teleporters, warehouse keepers and
//! companion control panels.

use std::sync::Arc;

use crate::core::secs_to_ticks;
use crate::database::ItemTemplate;
use crate::game::aoi::chebyshev;
use crate::game::buff::{Buff, SideEffect, HASTE_CONFLICTS, STATUS_HASTE};
use crate::game::inventory::{is_stackable, ADENA_ITEM_ID, MAX_INVENTORY_SIZE};
use crate::game::npc::Npc;
use crate::game::player::CLASS_ELF;
use crate::game::world::World;
use crate::network::PacketReader;
use crate::repo::{WH_TYPE_CHARACTER, WH_TYPE_CLAN, WH_TYPE_ELF, WH_TYPE_PERSONAL};
use crate::session::Session;

use super::super::{packets, view, GameServer};
use super::{
    companion, craft, give_item, item, pay_adena, send_msg, send_removal, skill, spellshop, stats, warehouse, MSG_INVENTORY_FULL,
    MSG_NOTHING_HAPPENS, MSG_NOT_ENOUGH_ADENA, MSG_OVERWEIGHT,
};

/// How close a player must stand to talk to or trade with an NPC.
pub const TALK_RANGE: i32 = 5;
const MAX_ORDER_LINES: usize = 100;
const CHAOTIC_LAWFUL: i32 = -1000;
const NPC_HASTE_SECS: u32 = 1200;
const SEALED_BLESS: i32 = 128;

const HTML_NO_SELL: &str = "nosell";
const HTML_STORAGE: &str = "storage";
const HTML_ELF_ONLY: &str = "elCE1";

/// The living NPC `obj_id` when the player is close enough to use it.
fn npc_in_reach<'a>(w: &'a World, sid: u64, obj_id: i32) -> Option<&'a Npc> {
    let p = w.player(sid)?;
    let n = w.npcs.get(&obj_id).filter(|n| n.is_alive())?;
    (n.map_id == p.map_id && chebyshev(p.x, p.y, n.x, n.y) <= TALK_RANGE).then_some(n)
}

/// Opens whatever dialog clicking `obj_id` should show. False when the
/// object has none.
pub fn talk(w: &World, srv: &GameServer, sid: u64, obj_id: i32) -> bool {
    let Some(p) = w.player(sid) else { return false };
    if let Some(pkt) = companion::control_panel(w, srv, p.char_id, obj_id) {
        p.outbox.send(pkt);
        return true;
    }
    let Some(n) = npc_in_reach(w, sid, obj_id) else { return false };
    let Some(tpl) = srv.data.npcs.get(n.npc_id) else { return false };

    let html = if tpl.impl_type == "L1Dwarf" {
        if n.npc_id == warehouse::ELF_KEEPER && p.class_type != CLASS_ELF {
            HTML_ELF_ONLY
        } else {
            HTML_STORAGE
        }
    } else if p.lawful < CHAOTIC_LAWFUL && !tpl.chaotic_html.is_empty() {
        tpl.chaotic_html.as_str()
    } else {
        tpl.normal_html.as_str()
    };
    if html.is_empty() {
        tracing::debug!("[npc] [no_dialog] npc={} name={}", n.npc_id, n.name);
        return false;
    }
    p.outbox.send(packets::hypertext(obj_id, html));
    true
}

/// `C_DIALOG [D obj]`.
pub async fn dialog(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let w = srv.world.lock().await;
    talk(&w, srv, sess.id, obj_id);
}

/// Work an action hands off once the world lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
    None,
    Warehouse(i16),
    Companion(String),
}

/// Runs one dialog button press against NPC `obj_id`.
pub fn act(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, action: &str) -> Followup {
    let Some(p) = w.player(sid) else { return Followup::None };
    let me = p.char_id;

    if p.summon_selection {
        if let Ok(selection) = action.parse::<i32>() {
            skill::summon_selected(w, srv, sid, selection);
            return Followup::None;
        }
    }
    if companion::owns(w, me, obj_id) {
        return Followup::Companion(action.to_string());
    }
    let Some(n) = npc_in_reach(w, sid, obj_id) else { return Followup::None };
    let npc_id = n.npc_id;

    match action {
        "" => Followup::None,
        "buy" => {
            show_selling(w, srv, sid, obj_id, npc_id);
            Followup::None
        }
        "sell" => {
            show_buying(w, srv, sid, obj_id, npc_id);
            Followup::None
        }
        "buyskill" => {
            spellshop::open(w, srv, sid);
            Followup::None
        }
        "retrieve" | "deposit" => Followup::Warehouse(WH_TYPE_PERSONAL),
        "retrieve-char" => Followup::Warehouse(WH_TYPE_CHARACTER),
        "retrieve-elven" | "deposit-elven" => Followup::Warehouse(WH_TYPE_ELF),
        "retrieve-pledge" | "deposit-pledge" => Followup::Warehouse(WH_TYPE_CLAN),
        "haste" => {
            let buff = Buff::new(STATUS_HASTE, secs_to_ticks(NPC_HASTE_SECS)).with_effect(SideEffect::MoveSpeed(1));
            item::timed_buff(w, sid, buff, &HASTE_CONFLICTS);
            Followup::None
        }
        "escort" => {
            if !companion::recruit_follower(w, sid, obj_id) {
                if let Some(p) = w.player(sid) {
                    send_msg(p, MSG_NOTHING_HAPPENS);
                }
            }
            Followup::None
        }
        "ent" => {
            stats::start_reset(w, srv, sid);
            Followup::None
        }
        "fullheal" => {
            if let Some(p) = w.player_mut(sid) {
                p.hp = p.attr.max_hp;
                p.mp = p.attr.max_mp;
                p.mark_dirty();
                p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
                p.outbox.send(packets::mana_point(p.mp, p.attr.max_mp));
            }
            Followup::None
        }
        other => {
            if let Some(recipe) = srv.data.crafts.get(other) {
                craft::entry(w, srv, sid, obj_id, npc_id, recipe);
                return Followup::None;
            }
            match srv.data.teleports.get(npc_id, other) {
                Some(dest) => npc_teleport(w, sid, dest.map_id, dest.x, dest.y, dest.heading, dest.price),
                None => tracing::debug!("[npc] [action_unhandled] npc={} action={}", npc_id, other),
            }
            Followup::None
        }
    }
}

fn npc_teleport(w: &mut World, sid: u64, map_id: i16, x: i32, y: i32, heading: u8, price: i32) {
    let Some(p) = w.player_mut(sid) else { return };
    if !pay_adena(p, price) {
        send_msg(p, MSG_NOT_ENOUGH_ADENA);
        return;
    }
    tracing::debug!("[npc] [teleport] char={} map={} x={} y={} price={}", p.char_id, map_id, x, y, price);
    view::teleport(w, sid, map_id, x, y, heading);
}

/// `C_NPC_ACTION [D obj][S action]`.
pub async fn action(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let action = r.read_s();
    let followup = {
        let mut w = srv.world.lock().await;
        let followup = act(&mut w, srv, sess.id, obj_id, &action);
        // a password protected warehouse is only opened through the password window
        if let (Followup::Warehouse(t), Some(p)) = (&followup, w.player(sess.id)) {
            if p.warehouse_password != 0 {
                tracing::debug!("[npc] [warehouse_needs_password] char={} type={}", p.char_id, t);
                return;
            }
        }
        followup
    };
    match followup {
        Followup::None => {}
        Followup::Warehouse(wh_type) => warehouse::open(srv, sess, obj_id, wh_type).await,
        Followup::Companion(cmd) => companion::command(srv, sess, obj_id, &cmd).await,
    }
}

/// Sends the merchant's price list, or the "nothing to sell" page.
fn show_selling(w: &World, srv: &GameServer, sid: u64, obj_id: i32, npc_id: i32) {
    let Some(p) = w.player(sid) else { return };
    let lines: Vec<(i32, String, i32, i32)> = srv
        .data
        .shops
        .get(npc_id)
        .map(|shop| {
            shop.selling()
                .into_iter()
                .filter_map(|si| {
                    let tpl = srv.data.items.get(si.item_id)?;
                    let name = if si.pack() > 1 { format!("{} ({})", tpl.name, si.pack()) } else { tpl.name.clone() };
                    Some((si.item_id, name, tpl.inv_gfx, si.selling_price))
                })
                .collect()
        })
        .unwrap_or_default();
    if lines.is_empty() {
        p.outbox.send(packets::hypertext(obj_id, HTML_NO_SELL));
    } else {
        p.outbox.send(packets::sell_list(obj_id, &lines));
    }
}

/// Offers for the player's items the merchant will buy.
fn show_buying(w: &World, srv: &GameServer, sid: u64, obj_id: i32, npc_id: i32) {
    let Some(p) = w.player(sid) else { return };
    let offers: Vec<(i32, i32)> = srv
        .data
        .shops
        .get(npc_id)
        .map(|shop| {
            p.inventory
                .iter()
                .filter(|it| !it.equipped && it.enchant == 0 && it.bless < SEALED_BLESS)
                .filter_map(|it| shop.buy_price(it.item_id).map(|price| (it.obj_id, price)))
                .collect()
        })
        .unwrap_or_default();
    if offers.is_empty() {
        p.outbox.send(packets::hypertext(obj_id, HTML_NO_SELL));
    } else {
        p.outbox.send(packets::shop_sell_list(obj_id, &offers));
    }
}

/// Why a purchase was refused; each maps to the message the client shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShopError {
    NoShop,
    NotEnoughAdena,
    Full,
    Overweight,
}

impl ShopError {
    fn msg_code(self) -> Option<u16> {
        match self {
            ShopError::NoShop => None,
            ShopError::NotEnoughAdena => Some(MSG_NOT_ENOUGH_ADENA),
            ShopError::Full => Some(MSG_INVENTORY_FULL),
            ShopError::Overweight => Some(MSG_OVERWEIGHT),
        }
    }
}

/// Buys `(line index, packs)` pairs from the merchant `obj_id`. All lines
/// are paid and delivered together or not at all.
pub fn buy(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, orders: &[(i32, i32)]) -> Result<i64, ShopError> {
    let npc_id = npc_in_reach(w, sid, obj_id).ok_or(ShopError::NoShop)?.npc_id;
    let shop = srv.data.shops.get(npc_id).ok_or(ShopError::NoShop)?;
    let selling = shop.selling();

    let mut cost: i64 = 0;
    let mut lines: Vec<(&ItemTemplate, i32)> = Vec::new();
    for &(idx, packs) in orders {
        let Some(si) = usize::try_from(idx).ok().and_then(|i| selling.get(i)) else { continue };
        let Some(tpl) = srv.data.items.get(si.item_id) else { continue };
        let packs = packs.max(1);
        cost += i64::from(si.selling_price) * i64::from(packs);
        lines.push((tpl, packs.saturating_mul(si.pack())));
    }
    if lines.is_empty() {
        return Ok(0);
    }

    let p = w.player(sid).ok_or(ShopError::NoShop)?;
    if i64::from(p.inventory.adena()) < cost {
        return Err(ShopError::NotEnoughAdena);
    }
    let mut slots = 0usize;
    let mut weight = 0i32;
    let mut seen = Vec::new();
    for &(tpl, count) in &lines {
        if is_stackable(tpl) {
            if p.inventory.find_by_item_id(tpl.item_id).is_none() && !seen.contains(&tpl.item_id) {
                slots += 1;
                seen.push(tpl.item_id);
            }
        } else {
            slots += usize::try_from(count).unwrap_or(0);
        }
        weight = weight.saturating_add(count.saturating_mul(tpl.weight) / 1000);
    }
    if p.inventory.len() + slots > MAX_INVENTORY_SIZE {
        return Err(ShopError::Full);
    }
    if p.inventory.would_overweight(weight, p.max_weight()) {
        return Err(ShopError::Overweight);
    }

    let p = w.player_mut(sid).ok_or(ShopError::NoShop)?;
    // cost fits in i32: it is no more than the adena stack
    if !pay_adena(p, cost as i32) {
        return Err(ShopError::NotEnoughAdena);
    }
    for (tpl, count) in lines {
        if is_stackable(tpl) {
            give_item(w, sid, tpl, count, 0);
        } else {
            for _ in 0..count {
                give_item(w, sid, tpl, 1, 0);
            }
        }
    }
    tracing::debug!("[npc] [buy] session={} npc={} cost={}", sid, npc_id, cost);
    Ok(cost)
}

/// Sells `(obj id, count)` pairs to the merchant. Returns the adena earned.
pub fn sell(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, orders: &[(i32, i32)]) -> Result<i64, ShopError> {
    let npc_id = npc_in_reach(w, sid, obj_id).ok_or(ShopError::NoShop)?.npc_id;
    let shop = srv.data.shops.get(npc_id).ok_or(ShopError::NoShop)?;
    let adena = srv.data.items.get(ADENA_ITEM_ID).ok_or(ShopError::NoShop)?;

    let p = w.player_mut(sid).ok_or(ShopError::NoShop)?;
    let mut earned: i64 = 0;
    for &(item_obj, qty) in orders {
        let Some(it) = p.inventory.find(item_obj) else { continue };
        if it.equipped || it.enchant != 0 || it.bless >= SEALED_BLESS {
            continue;
        }
        let Some(price) = shop.buy_price(it.item_id) else { continue };
        let qty = qty.max(1).min(it.count);
        let Some(removal) = p.inventory.remove(item_obj, qty) else { continue };
        send_removal(p, &removal);
        earned += i64::from(price) * i64::from(qty);
    }
    if earned > 0 {
        p.mark_dirty();
        give_item(w, sid, adena, earned.min(i64::from(i32::MAX)) as i32, 0);
    }
    tracing::debug!("[npc] [sell] session={} npc={} earned={}", sid, npc_id, earned);
    Ok(earned)
}

/// `C_BUY_SELL [D npc][C type][H count]` followed by `count` pairs. Type 0
/// buys, 1 sells, 2 and up are warehouse transfers.
pub async fn buy_sell(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let kind = r.read_c();
    let count = usize::from(r.read_h());
    if kind >= 2 {
        warehouse::result(srv, sess, r, kind, count).await;
        return;
    }
    if count == 0 || count > MAX_ORDER_LINES {
        return;
    }
    let orders: Vec<(i32, i32)> = (0..count).map(|_| (r.read_d(), r.read_d())).collect();

    let mut w = srv.world.lock().await;
    let res = if kind == 0 { buy(&mut w, srv, sess.id, obj_id, &orders) } else { sell(&mut w, srv, sess.id, obj_id, &orders) };
    if let Err(e) = res {
        tracing::debug!("[npc] [trade_refused] session={} npc_obj={} reason={:?}", sess.id, obj_id, e);
        if let (Some(code), Some(p)) = (e.msg_code(), w.player(sess.id)) {
            send_msg(p, code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::shop_db::{Shop, ShopItem};
    use crate::database::teleport_db::TeleportDest;
    use crate::database::NpcTemplate;
    use crate::game::ids::IdKind;
    use crate::game::npc::SpawnAnchor;
    use crate::game::scripting::StdFormulas;
    use crate::network::opcodes::*;
    use crate::servers::map::handlers::testutil;

    const MERCHANT: i32 = 70001;

    fn server() -> (Arc<GameServer>, Arc<crate::repo::MemoryStore>) {
        let mut data = testutil::data();
        data.npcs.insert(NpcTemplate {
            npc_id: MERCHANT,
            name: "Merchant".into(),
            impl_type: "L1Merchant".into(),
            normal_html: "merchant1".into(),
            chaotic_html: "merchant2".into(),
            ..Default::default()
        });
        data.shops.insert(Shop {
            npc_id: MERCHANT,
            items: vec![
                ShopItem { item_id: 40010, order: 0, selling_price: 20, pack_count: 0, purchasing_price: 10 },
                ShopItem { item_id: 1, order: 1, selling_price: 500, pack_count: 0, purchasing_price: -1 },
            ],
        });
        data.teleports.insert(TeleportDest { action: "teleport giran".into(), npc_id: MERCHANT, x: 33400, y: 32800, map_id: 4, heading: 5, price: 50 });
        testutil::server_from(data, Arc::new(StdFormulas))
    }

    fn merchant(w: &mut World, srv: &GameServer, x: i32, y: i32) -> i32 {
        let tpl = srv.data.npcs.get(MERCHANT).unwrap().clone();
        let id = w.ids.next(IdKind::Npc);
        let anchor = SpawnAnchor { map_id: 4, x, y, ..Default::default() };
        w.add_npc(Npc::from_template(id, &tpl, anchor, x, y))
    }

    fn adena(w: &mut World, srv: &GameServer, sid: u64, count: i32) {
        let tpl = srv.data.items.get(ADENA_ITEM_ID).unwrap().clone();
        testutil::give(w, sid, &tpl, count);
    }

    #[tokio::test]
    async fn test_dialog_picks_lawful_page() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        let m = merchant(&mut w, &srv, 32102, 32100);
        assert!(talk(&w, &srv, a.id, m));
        assert_eq!(testutil::ops(&mut rx), vec![S_HYPERTEXT]);
        w.player_mut(a.id).unwrap().lawful = -5000;
        assert!(talk(&w, &srv, a.id, m));
        w.player_mut(a.id).unwrap().x = 32200;
        assert!(!talk(&w, &srv, a.id, m));
    }

    #[tokio::test]
    async fn test_buy_checks_adena_and_delivers() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        let m = merchant(&mut w, &srv, 32101, 32100);
        adena(&mut w, &srv, a.id, 100);

        assert_eq!(buy(&mut w, &srv, a.id, m, &[(1, 1)]), Err(ShopError::NotEnoughAdena));
        assert_eq!(buy(&mut w, &srv, a.id, m, &[(0, 3), (7, 1)]), Ok(60));
        let p = w.player(a.id).unwrap();
        assert_eq!(p.inventory.count_of(40010), 3);
        assert_eq!(p.inventory.adena(), 40);
        assert!(testutil::ops(&mut rx).contains(&S_ADD_ITEM));

        act(&mut w, &srv, a.id, m, "buy");
        assert_eq!(testutil::ops(&mut rx), vec![S_SELL_LIST]);
    }

    #[tokio::test]
    async fn test_sell_pays_purchase_price() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        let m = merchant(&mut w, &srv, 32101, 32100);
        let potion = srv.data.items.get(40010).unwrap().clone();
        let sword = srv.data.items.get(1).unwrap().clone();
        let pot = testutil::give(&mut w, a.id, &potion, 5);
        let sw = testutil::give(&mut w, a.id, &sword, 1);

        act(&mut w, &srv, a.id, m, "sell");
        assert_eq!(testutil::ops(&mut rx), vec![S_SHOP_SELL_LIST]);

        assert_eq!(sell(&mut w, &srv, a.id, m, &[(pot, 4), (sw, 1)]), Ok(40));
        let p = w.player(a.id).unwrap();
        assert_eq!(p.inventory.count_of(40010), 1);
        assert_eq!(p.inventory.adena(), 40);
        assert!(p.inventory.find(sw).is_some());
    }

    #[tokio::test]
    async fn test_teleport_action_charges_price() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        let m = merchant(&mut w, &srv, 32101, 32100);

        act(&mut w, &srv, a.id, m, "teleport giran");
        assert_eq!(testutil::ops(&mut rx), vec![S_MESSAGE_CODE]);
        assert_eq!(w.player(a.id).unwrap().x, 32100);

        adena(&mut w, &srv, a.id, 60);
        act(&mut w, &srv, a.id, m, "teleport giran");
        let p = w.player(a.id).unwrap();
        assert_eq!((p.x, p.y), (33400, 32800));
        assert_eq!(p.inventory.adena(), 10);
    }

    #[tokio::test]
    async fn test_warehouse_and_companion_followups() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let m = merchant(&mut w, &srv, 32101, 32100);
        assert_eq!(act(&mut w, &srv, a.id, m, "retrieve"), Followup::Warehouse(WH_TYPE_PERSONAL));
        assert_eq!(act(&mut w, &srv, a.id, m, "retrieve-pledge"), Followup::Warehouse(WH_TYPE_CLAN));
        assert_eq!(act(&mut w, &srv, a.id, m, "fullheal"), Followup::None);
        assert_eq!(w.player(a.id).unwrap().hp, 250);
    }
}
