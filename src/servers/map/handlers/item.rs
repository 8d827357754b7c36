//! `C_USE_ITEM` and `C_DESTROY_ITEM`: equipment, potions, food, scrolls,
//! dolls and collars.

use std::sync::Arc;

use crate::core::secs_to_ticks;
use crate::database::poly_db::CAUSE_MAGIC;
use crate::database::{ItemCategory, ItemTemplate};
use crate::game::buff::{
    Buff, SideEffect, BRAVE_CONFLICTS, HASTE_CONFLICTS, SKILL_SHAPE_CHANGE, STATUS_BLUE_POTION, STATUS_BRAVE,
    STATUS_HASTE, STATUS_WISDOM_POTION,
};
use crate::game::equipment::{check_equip, EquipError, EquipSlot};
use crate::game::player::{Player, MAX_FOOD};
use crate::game::scripting::{EnchantContext, EnchantResult, PotionEffect, PotionKind};
use crate::game::stats::StatDelta;
use crate::game::world::World;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::systems::poison;
use super::super::{packets, GameServer};
use super::{companion, send_msg, send_msg_arg, send_removal, send_status, skill, MSG_NOTHING_HAPPENS};

const MSG_CANNOT_REMOVE_LAYER: u16 = 127;
const MSG_POLY_FAILED: u16 = 181;
const MSG_ENCHANT_OK: u16 = 161;
const MSG_ENCHANT_NOTHING: u16 = 160;
const MSG_ENCHANT_BROKE: u16 = 164;

const GFX_ENCHANT: i32 = 2583;
const GFX_CURE: i32 = 177;

pub const POLY_SCROLL: i32 = 40088;
pub const POLY_SCROLL_IVORY: i32 = 40096;
pub const POLY_POTION: i32 = 49308;
pub const POLY_SCROLL_BLESSED: i32 = 140088;

/// Enchant scrolls whose data row says blessed but which behave as normal.
const PLAIN_ENCHANT_SCROLLS: [i32; 2] = [40074, 40087];
/// Sealed items carry a bless value of 128 and up.
const SEALED_BLESS: i32 = 128;

pub fn is_poly_scroll(item_id: i32) -> bool {
    matches!(item_id, POLY_SCROLL | POLY_SCROLL_IVORY | POLY_POTION | POLY_SCROLL_BLESSED)
}

fn poly_scroll_secs(item_id: i32) -> u32 {
    match item_id {
        POLY_SCROLL_BLESSED => 2100,
        POLY_POTION => rand::random_range(2401..=4800),
        _ => 1800,
    }
}

/// Bless class of an enchant scroll: 0 normal, 1 blessed, 2 cursed.
fn enchant_scroll_bless(item_id: i32, bless: i32) -> i32 {
    if bless == 2 {
        2
    } else if PLAIN_ENCHANT_SCROLLS.contains(&item_id) {
        0
    } else {
        bless.clamp(0, 1)
    }
}

/// Consumes one of `obj_id` and reports it.
fn consume_one(w: &mut World, sid: u64, obj_id: i32) {
    let Some(p) = w.player_mut(sid) else { return };
    if let Some(r) = p.inventory.remove(obj_id, 1) {
        send_removal(p, &r);
        p.mark_dirty();
    }
}

// ─── Equipment ──────────────────────────────────────────────────────────────

/// Equips or removes `obj_id`. Returns the new equipped state.
pub fn toggle_equip(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32) -> Result<bool, EquipError> {
    let p = w.player_mut(sid).ok_or(EquipError::NotEquipment)?;
    let it = p.inventory.find(obj_id).ok_or(EquipError::NotEquipment)?;
    let tpl = srv.data.items.get(it.item_id).ok_or(EquipError::NotEquipment)?;

    if it.equipped {
        if it.bless == 2 {
            return Err(EquipError::Cursed);
        }
        let slot = p.equipment.slot_of(obj_id).ok_or(EquipError::NotEquipment)?;
        let layered = match slot {
            EquipSlot::TShirt => p.equipment.get(EquipSlot::Armor).is_some() || p.equipment.get(EquipSlot::Cloak).is_some(),
            EquipSlot::Armor => p.equipment.get(EquipSlot::Cloak).is_some(),
            _ => false,
        };
        if layered {
            send_msg(p, MSG_CANNOT_REMOVE_LAYER);
            return Ok(true);
        }
        unequip(w, srv, sid, slot);
        return Ok(false);
    }

    let poly = (p.temp_char_gfx != 0).then(|| srv.data.polys.get(p.temp_char_gfx)).flatten();
    let slot = check_equip(tpl, p.class_type, p.level, &p.equipment, &srv.data.items, &p.inventory, poly)?;
    if p.equipment.get(slot).is_some() {
        unequip(w, srv, sid, slot);
    }

    let Some(p) = w.player_mut(sid) else { return Err(EquipError::NotEquipment) };
    p.equipment.set(slot, Some(obj_id));
    if let Some(it) = p.inventory.find_mut(obj_id) {
        it.equipped = true;
    }
    after_equip_change(w, srv, sid, obj_id, slot == EquipSlot::Weapon);
    tracing::debug!("[item] [equipped] session={} obj={} slot={:?}", sid, obj_id, slot);
    Ok(true)
}

/// Empties `slot`, ignoring the curse check.
fn unequip(w: &mut World, srv: &GameServer, sid: u64, slot: EquipSlot) {
    let Some(p) = w.player_mut(sid) else { return };
    let Some(obj_id) = p.equipment.get(slot) else { return };
    p.equipment.set(slot, None);
    if let Some(it) = p.inventory.find_mut(obj_id) {
        it.equipped = false;
    }
    after_equip_change(w, srv, sid, obj_id, slot == EquipSlot::Weapon);
}

/// Recomputes the overlay and tells the client and, for weapons, the viewers.
fn after_equip_change(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, weapon: bool) {
    let Some(p) = w.player_mut(sid) else { return };
    let set_changed = p.recalc_equip_stats(&srv.data);
    p.mark_dirty();
    if let Some(it) = p.inventory.find(obj_id) {
        p.outbox.send(packets::change_item_use(it));
    }
    send_status(p, srv.now_secs());
    if set_changed {
        tracing::debug!("[item] [armor_set] char={} set={}", p.char_id, p.equipment.active_set_id);
    }
    if weapon {
        let (map, x, y, me, visual) = (p.map_id, p.x, p.y, p.char_id, p.current_weapon);
        w.broadcast_nearby(map, x, y, None, &packets::change_desc(me, visual));
    }
}

// ─── Consumables ────────────────────────────────────────────────────────────

pub(crate) fn show_effect(w: &World, sid: u64, gfx: i32) {
    if gfx == 0 {
        return;
    }
    let Some(p) = w.player(sid) else { return };
    w.broadcast_nearby(p.map_id, p.x, p.y, None, &packets::effect(p.char_id, gfx));
}

pub(crate) fn timed_buff(w: &mut World, sid: u64, buff: Buff, conflicts: &[i32]) {
    for &id in conflicts {
        if let Some(old) = w.player_mut(sid).and_then(|p| p.remove_buff(id)) {
            skill::buff_icon(w, sid, &old, 0);
        }
    }
    let secs = buff.secs_left();
    let Some(p) = w.player_mut(sid) else { return };
    p.add_buff(buff.clone());
    skill::buff_icon(w, sid, &buff, secs);
}

/// Drinks a potion. False when it had no effect and should not be used up.
pub fn drink(w: &mut World, srv: &GameServer, sid: u64, pot: &PotionEffect) -> bool {
    let Some(p) = w.player_mut(sid) else { return false };
    if pot.class_only.is_some_and(|c| c != p.class_type) {
        send_msg(p, MSG_NOTHING_HAPPENS);
        return false;
    }
    let roll = if pot.range > 0 { rand::random_range(0..=pot.range) } else { 0 };
    let ticks = secs_to_ticks(pot.duration_secs);
    match pot.kind {
        PotionKind::Heal => {
            if p.hp >= p.attr.max_hp {
                return false;
            }
            p.hp = (p.hp + pot.amount + roll).min(p.attr.max_hp);
            p.mark_dirty();
            p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
        }
        PotionKind::Mana => {
            if p.mp >= p.attr.max_mp {
                return false;
            }
            p.mp = (p.mp + pot.amount + roll).min(p.attr.max_mp);
            p.mark_dirty();
            p.outbox.send(packets::mana_point(p.mp, p.attr.max_mp));
        }
        PotionKind::Haste => {
            timed_buff(w, sid, Buff::new(STATUS_HASTE, ticks).with_effect(SideEffect::MoveSpeed(1)), &HASTE_CONFLICTS);
        }
        PotionKind::Brave => {
            timed_buff(w, sid, Buff::new(STATUS_BRAVE, ticks).with_effect(SideEffect::BraveSpeed(1)), &BRAVE_CONFLICTS);
        }
        PotionKind::Wisdom => {
            let delta = StatDelta { sp: pot.sp.clamp(0, i32::from(i16::MAX)) as i16, ..Default::default() };
            timed_buff(w, sid, Buff::new(STATUS_WISDOM_POTION, ticks).with_delta(delta), &[STATUS_WISDOM_POTION]);
            if let Some(p) = w.player(sid) {
                p.outbox.send(packets::magic_status(p.attr.sp, p.attr.mr));
            }
        }
        PotionKind::BluePotion => {
            timed_buff(w, sid, Buff::new(STATUS_BLUE_POTION, ticks), &[STATUS_BLUE_POTION]);
        }
        PotionKind::CurePoison => {
            poison::cure(w, sid);
            show_effect(w, sid, GFX_CURE);
            return true;
        }
    }
    show_effect(w, sid, pot.gfx);
    true
}

fn eat(p: &mut Player, tpl: &ItemTemplate) {
    let gain = if tpl.food_volume / 10 <= 0 { 5 } else { tpl.food_volume / 10 };
    p.food = (p.food + gain).min(MAX_FOOD);
    p.mark_dirty();
    p.outbox.send(packets::event_food(p.food));
}

// ─── Polymorph ──────────────────────────────────────────────────────────────

/// Takes off whatever the current form cannot wear. Cursed pieces stay.
fn strip_for_form(w: &mut World, srv: &GameServer, sid: u64) {
    let Some(p) = w.player(sid) else { return };
    let Some(form) = srv.data.polys.get(p.temp_char_gfx) else { return };
    let misfits: Vec<EquipSlot> = p
        .equipment
        .occupied()
        .filter(|&(_, obj)| {
            let Some(it) = p.inventory.find(obj) else { return false };
            let Some(tpl) = srv.data.items.get(it.item_id) else { return false };
            let allowed = match tpl.category {
                ItemCategory::Weapon => form.can_wield(&tpl.kind),
                _ => form.can_wear(&tpl.kind),
            };
            !allowed && it.bless != 2
        })
        .map(|(slot, _)| slot)
        .collect();
    for slot in misfits {
        unequip(w, srv, sid, slot);
    }
}

/// Shape change into `poly_id` for `secs`, replacing any earlier form.
pub fn polymorph(w: &mut World, srv: &GameServer, sid: u64, poly_id: i32, secs: u32) {
    let buff = Buff::new(SKILL_SHAPE_CHANGE, secs_to_ticks(secs)).with_effect(SideEffect::Poly(poly_id));
    timed_buff(w, sid, buff, &[SKILL_SHAPE_CHANGE]);
    strip_for_form(w, srv, sid);
    tracing::info!("[item] [polymorph] session={} poly={} secs={}", sid, poly_id, secs);
}

pub fn undo_polymorph(w: &mut World, sid: u64) -> bool {
    let Some(old) = w.player_mut(sid).and_then(|p| p.remove_buff(SKILL_SHAPE_CHANGE)) else { return false };
    skill::buff_icon(w, sid, &old, 0);
    true
}

/// A scroll with a monster name. An empty name cancels the current form.
fn read_poly_scroll(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, item_id: i32, name: &str) {
    let Some(p) = w.player(sid) else { return };
    if name.is_empty() {
        if undo_polymorph(w, sid) {
            consume_one(w, sid, obj_id);
        }
        return;
    }
    let form = srv.data.polys.get_by_name(name);
    let Some(form) = form.filter(|f| (f.min_level <= 0 || p.level >= f.min_level) && f.allows(CAUSE_MAGIC)) else {
        send_msg(p, MSG_POLY_FAILED);
        return;
    };
    polymorph(w, srv, sid, form.poly_id, poly_scroll_secs(item_id));
    consume_one(w, sid, obj_id);
}

// ─── Enchanting ─────────────────────────────────────────────────────────────

/// Reads an enchant scroll onto `target`. The scroll is used up whatever
/// the outcome.
pub fn enchant(w: &mut World, srv: &GameServer, sid: u64, scroll_obj: i32, target: i32) -> Option<EnchantResult> {
    let p = w.player(sid)?;
    let scroll = p.inventory.find(scroll_obj)?;
    let scroll_tpl = srv.data.items.get(scroll.item_id)?;
    let it = p.inventory.find(target)?;
    let tpl = srv.data.items.get(it.item_id)?;
    if it.bless >= SEALED_BLESS {
        send_msg(p, MSG_NOTHING_HAPPENS);
        return None;
    }
    let wanted = if scroll_tpl.use_type == "dai" { ItemCategory::Weapon } else { ItemCategory::Armor };
    if tpl.category != wanted {
        return None;
    }
    let is_weapon = wanted == ItemCategory::Weapon;
    let result = srv.scripting.calc_enchant(&EnchantContext {
        scroll_bless: enchant_scroll_bless(scroll.item_id, scroll.bless),
        enchant_lvl: it.enchant,
        safe_enchant: tpl.safe_enchant,
        is_weapon,
        weapon_chance: srv.config.enchant_chance_weapon,
        armor_chance: srv.config.enchant_chance_armor,
    });
    let log_name = it.view_name();
    let light = if is_weapon { "$245" } else { "$252" };
    let (equipped, enchant_before) = (it.equipped, it.enchant);
    consume_one(w, sid, scroll_obj);

    let p = w.player_mut(sid)?;
    match result {
        EnchantResult::Success(n) | EnchantResult::Minus(n) => {
            let (delta, color) = match result {
                EnchantResult::Success(_) => (n, light),
                _ => (-n, "$246"),
            };
            let it = p.inventory.find_mut(target)?;
            it.enchant += delta;
            let it = p.inventory.find(target)?;
            p.outbox.send(packets::change_item_desc(it));
            p.outbox.send(packets::change_item_use(it));
            let brightness = if n >= 2 { "$248" } else { "$247" };
            p.outbox.send(packets::message_code(MSG_ENCHANT_OK, &[&log_name, color, brightness]));
            p.mark_dirty();
            if delta > 0 {
                p.outbox.send(packets::effect(p.char_id, GFX_ENCHANT));
            }
            if equipped {
                after_equip_change(w, srv, sid, target, false);
            }
        }
        EnchantResult::Fail => {
            p.outbox.send(packets::message_code(MSG_ENCHANT_NOTHING, &[&log_name, light, "$248"]));
        }
        EnchantResult::Break => {
            let color = if enchant_before < 0 { "$246" } else { light };
            p.outbox.send(packets::message_code(MSG_ENCHANT_BROKE, &[&log_name, color]));
            if let Some(slot) = p.equipment.slot_of(target) {
                unequip(w, srv, sid, slot);
            }
            let p = w.player_mut(sid)?;
            if let Some(r) = p.inventory.remove(target, 0) {
                send_removal(p, &r);
            }
            p.mark_dirty();
        }
    }
    tracing::info!("[item] [enchant] session={} target={} result={:?}", sid, log_name, result);
    Some(result)
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// What a use request turned out to be once the lock is gone.
enum Deferred {
    Collar(i32),
}

/// `C_USE_ITEM [D obj]` followed by kind-specific fields.
pub async fn use_item(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let deferred = {
        let mut w = srv.world.lock().await;
        use_in_world(&mut w, srv, sess.id, obj_id, r)
    };
    if let Some(Deferred::Collar(collar)) = deferred {
        companion::toggle_collar(srv, sess, collar).await;
    }
}

fn use_in_world(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, r: &mut PacketReader<'_>) -> Option<Deferred> {
    let p = w.player(sid)?;
    if !p.is_alive() || p.is_frozen() {
        return None;
    }
    let it = p.inventory.find(obj_id)?;
    let item_id = it.item_id;
    let Some(tpl) = srv.data.items.get(item_id) else {
        tracing::debug!("[item] [unknown_template] item={}", item_id);
        return None;
    };

    if tpl.category != ItemCategory::Etc {
        if let Err(e) = toggle_equip(w, srv, sid, obj_id) {
            if let Some(p) = w.player(sid) {
                match e {
                    EquipError::LevelTooLow => send_msg_arg(p, e.msg_code(), &tpl.min_level.to_string()),
                    EquipError::LevelTooHigh => send_msg_arg(p, e.msg_code(), &tpl.max_level.to_string()),
                    _ => send_msg(p, e.msg_code()),
                }
            }
        }
        return None;
    }
    if tpl.min_level > 0 && p.level < tpl.min_level {
        send_msg_arg(p, EquipError::LevelTooLow.msg_code(), &tpl.min_level.to_string());
        return None;
    }

    if is_poly_scroll(item_id) {
        let name = r.read_s();
        read_poly_scroll(w, srv, sid, obj_id, item_id, name.trim());
    } else if tpl.use_type == "dai" || tpl.use_type == "zel" {
        let target = r.read_d();
        enchant(w, srv, sid, obj_id, target);
    } else if tpl.item_type == "magic_doll" {
        companion::toggle_doll(w, srv, sid, obj_id, item_id);
    } else if companion::is_collar(item_id) {
        return Some(Deferred::Collar(obj_id));
    } else if let Some(pot) = srv.scripting.potion_effect(item_id) {
        if drink(w, srv, sid, &pot) {
            consume_one(w, sid, obj_id);
        }
    } else if tpl.food_volume > 0 {
        let p = w.player_mut(sid)?;
        eat(p, tpl);
        consume_one(w, sid, obj_id);
    } else {
        tracing::debug!("[item] [unhandled_use] item={} use_type={}", item_id, tpl.use_type);
    }
    None
}

/// `C_DESTROY_ITEM [D obj][D count]`. Equipped items cannot be destroyed.
pub async fn destroy(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let count = r.read_d();
    let mut w = srv.world.lock().await;
    destroy_in_world(&mut w, sess.id, obj_id, count);
}

pub fn destroy_in_world(w: &mut World, sid: u64, obj_id: i32, count: i32) -> bool {
    let Some(p) = w.player_mut(sid) else { return false };
    let Some(it) = p.inventory.find(obj_id) else { return false };
    if it.equipped {
        return false;
    }
    let item_id = it.item_id;
    let count = if count <= 0 || count > it.count { it.count } else { count };
    let Some(r) = p.inventory.remove(obj_id, count) else { return false };
    send_removal(p, &r);
    p.mark_dirty();
    tracing::debug!("[item] [destroyed] char={} item={} count={}", p.char_id, item_id, count);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::poly_db::PolyForm;
    use crate::database::StaticData;
    use crate::game::scripting::StdFormulas;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::testutil;

    fn data() -> StaticData {
        let mut data = testutil::data();
        data.items.insert(ItemTemplate {
            item_id: 20011,
            name: "Helm".into(),
            kind: "helm".into(),
            ac: 2,
            use_knight: true,
            category: ItemCategory::Armor,
            ..Default::default()
        });
        data.items.insert(ItemTemplate {
            item_id: 40087,
            name: "Scroll of Enchant Weapon".into(),
            use_type: "dai".into(),
            bless: 1,
            stackable: true,
            ..Default::default()
        });
        data.items.insert(ItemTemplate { item_id: POLY_SCROLL, name: "Polymorph Scroll".into(), stackable: true, ..Default::default() });
        data.items.insert(ItemTemplate { item_id: 40013, name: "Haste Potion".into(), stackable: true, ..Default::default() });
        data.items.insert(ItemTemplate { item_id: 40017, name: "Cure Poison Potion".into(), stackable: true, ..Default::default() });
        data.items.insert(ItemTemplate { item_id: 40056, name: "Meat".into(), food_volume: 100, stackable: true, ..Default::default() });
        data.polys.insert(PolyForm {
            poly_id: 29,
            name: "Orc Fighter".into(),
            min_level: 10,
            cause: 7,
            weapons: vec!["axe".into()],
            ..Default::default()
        });
        if let Some(mut sword) = data.items.get(1).cloned() {
            sword.safe_enchant = 6;
            data.items.insert(sword);
        }
        data
    }

    fn tpl(srv: &GameServer, id: i32) -> ItemTemplate {
        srv.data.items.get(id).unwrap().clone()
    }

    #[tokio::test]
    async fn test_equip_toggle_updates_stats() {
        let (srv, _store) = testutil::server_from(data(), Arc::new(StdFormulas));
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        let helm = testutil::give(&mut w, a.id, &tpl(&srv, 20011), 1);
        let ac = w.player(a.id).unwrap().attr.ac;

        assert_eq!(toggle_equip(&mut w, &srv, a.id, helm), Ok(true));
        let p = w.player(a.id).unwrap();
        assert!(p.inventory.find(helm).unwrap().equipped);
        assert_eq!(p.attr.ac, ac - 2);
        assert!(testutil::ops(&mut rx).contains(&S_CHANGE_ITEM_USE));

        w.player_mut(a.id).unwrap().inventory.find_mut(helm).unwrap().bless = 2;
        assert_eq!(toggle_equip(&mut w, &srv, a.id, helm), Err(EquipError::Cursed));
        w.player_mut(a.id).unwrap().inventory.find_mut(helm).unwrap().bless = 1;
        assert_eq!(toggle_equip(&mut w, &srv, a.id, helm), Ok(false));
        assert_eq!(w.player(a.id).unwrap().attr.ac, ac);
    }

    #[tokio::test]
    async fn test_heal_potion_consumed_only_when_hurt() {
        let (srv, _store) = testutil::server_from(data(), Arc::new(StdFormulas));
        let a = {
            let mut w = srv.world.lock().await;
            testutil::join(&mut w, 1, 32100, 32100).0
        };
        let obj = {
            let mut w = srv.world.lock().await;
            let p = w.player_mut(a.id).unwrap();
            p.hp = p.attr.max_hp;
            testutil::give(&mut w, a.id, &tpl(&srv, 40010), 2)
        };
        let raw = PacketWriter::new(C_USE_ITEM).d(obj).finish();
        use_item(&srv, &a, &mut PacketReader::new(&raw)).await;
        assert_eq!(srv.world.lock().await.player(a.id).unwrap().inventory.count_of(40010), 2);

        srv.world.lock().await.player_mut(a.id).unwrap().hp = 10;
        use_item(&srv, &a, &mut PacketReader::new(&raw)).await;
        let w = srv.world.lock().await;
        let p = w.player(a.id).unwrap();
        assert_eq!(p.inventory.count_of(40010), 1);
        assert!((25..=30).contains(&p.hp));
    }

    #[tokio::test]
    async fn test_cure_potion_lifts_poison() {
        let (srv, _store) = testutil::server_from(data(), Arc::new(StdFormulas));
        let (a, obj) = {
            let mut w = srv.world.lock().await;
            let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
            poison::infect(&mut w, a.id, crate::game::poison::Poison::Silence);
            let obj = testutil::give(&mut w, a.id, &tpl(&srv, 40017), 1);
            (a, obj)
        };
        let raw = PacketWriter::new(C_USE_ITEM).d(obj).finish();
        use_item(&srv, &a, &mut PacketReader::new(&raw)).await;
        let w = srv.world.lock().await;
        let p = w.player(a.id).unwrap();
        assert!(!p.is_silenced());
        assert_eq!(p.inventory.count_of(40017), 0);
    }

    #[tokio::test]
    async fn test_haste_potion_and_food() {
        let (srv, _store) = testutil::server_from(data(), Arc::new(StdFormulas));
        let mut w = srv.world.lock().await;
        let (a, mut rx) = testutil::join(&mut w, 1, 32100, 32100);
        let haste = testutil::give(&mut w, a.id, &tpl(&srv, 40013), 1);
        let meat = testutil::give(&mut w, a.id, &tpl(&srv, 40056), 1);
        rx.drain();

        let raw = PacketWriter::new(C_USE_ITEM).finish();
        use_in_world(&mut w, &srv, a.id, haste, &mut PacketReader::new(&raw));
        let p = w.player(a.id).unwrap();
        assert_eq!(p.move_speed, 1);
        assert!(p.inventory.find(haste).is_none());
        assert!(testutil::ops(&mut rx).contains(&S_SPEED));

        use_in_world(&mut w, &srv, a.id, meat, &mut PacketReader::new(&raw));
        assert_eq!(w.player(a.id).unwrap().food, 50);
    }

    #[tokio::test]
    async fn test_poly_scroll_strips_forbidden_weapon() {
        let (srv, _store) = testutil::server_from(data(), Arc::new(StdFormulas));
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let sword = testutil::give(&mut w, a.id, &tpl(&srv, 1), 1);
        let scroll = testutil::give(&mut w, a.id, &tpl(&srv, POLY_SCROLL), 2);
        toggle_equip(&mut w, &srv, a.id, sword).unwrap();

        let raw = PacketWriter::new(C_USE_ITEM).s("orc fighter").finish();
        use_in_world(&mut w, &srv, a.id, scroll, &mut PacketReader::new(&raw));
        let p = w.player(a.id).unwrap();
        assert_eq!(p.gfx(), 29);
        assert!(!p.inventory.find(sword).unwrap().equipped);
        assert_eq!(p.inventory.count_of(POLY_SCROLL), 1);

        // the form forbids swords
        assert_eq!(toggle_equip(&mut w, &srv, a.id, sword), Err(EquipError::PolyForbids));

        let raw = PacketWriter::new(C_USE_ITEM).s("").finish();
        use_in_world(&mut w, &srv, a.id, scroll, &mut PacketReader::new(&raw));
        assert_ne!(w.player(a.id).unwrap().gfx(), 29);
        assert_eq!(w.player(a.id).unwrap().inventory.count_of(POLY_SCROLL), 0);
    }

    #[tokio::test]
    async fn test_safe_enchant_always_succeeds() {
        let (srv, _store) = testutil::server_from(data(), Arc::new(StdFormulas));
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let sword = testutil::give(&mut w, a.id, &tpl(&srv, 1), 1);
        let scroll = testutil::give(&mut w, a.id, &tpl(&srv, 40087), 2);

        assert_eq!(enchant(&mut w, &srv, a.id, scroll, sword), Some(EnchantResult::Success(1)));
        let p = w.player(a.id).unwrap();
        assert_eq!(p.inventory.find(sword).unwrap().enchant, 1);
        assert_eq!(p.inventory.count_of(40087), 1);

        // a scroll cannot target the wrong category
        let potion = testutil::give(&mut w, a.id, &tpl(&srv, 40010), 1);
        assert_eq!(enchant(&mut w, &srv, a.id, scroll, potion), None);
    }

    #[tokio::test]
    async fn test_destroy_skips_equipped() {
        let (srv, _store) = testutil::server_from(data(), Arc::new(StdFormulas));
        let mut w = srv.world.lock().await;
        let (a, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let helm = testutil::give(&mut w, a.id, &tpl(&srv, 20011), 1);
        let potions = testutil::give(&mut w, a.id, &tpl(&srv, 40010), 5);
        toggle_equip(&mut w, &srv, a.id, helm).unwrap();
        assert!(!destroy_in_world(&mut w, a.id, helm, 1));
        assert!(destroy_in_world(&mut w, a.id, potions, 3));
        assert_eq!(w.player(a.id).unwrap().inventory.count_of(40010), 2);
    }
}
