//! Summons, pets, dolls and followers from the owner's side: control
//! panels, commands, collars, taming, evolution and teardown.

use std::sync::Arc;

use crate::core::secs_to_ticks;
use crate::database::{ItemCategory, NpcTemplate};
use crate::game::aoi::chebyshev;
use crate::game::companion::{
    cha_budget, doll_bonus, Body, CompanionStatus, Doll, Follower, Pet, Summon, FOLLOWER_LIFETIME_SECS, PET_COST,
};
use crate::game::ids::IdKind;
use crate::game::inventory::Removal;
use crate::game::npc::{Npc, SpawnAnchor};
use crate::game::stats::StatDelta;
use crate::game::world::PendingRespawn;
use crate::game::{EntityKind, World};
use crate::network::PacketReader;
use crate::repo::{with_timeout, PetRow, SHORT_TIMEOUT};
use crate::session::Session;

use super::super::systems::persistence;
use super::super::view::{announce, broadcast_remove};
use super::super::{packets, GameServer};
use super::{can_receive, give_item, send_msg, send_removal, send_status, MSG_NOTHING_HAPPENS};

pub const PET_COLLAR: i32 = 40314;
pub const PET_COLLAR_HIGHER: i32 = 40316;

const MSG_TAME_FAILED: u16 = 324;
const MSG_TOO_MANY_PETS: u16 = 489;
const MSG_GIVE_EQUIPPED: u16 = 141;
const MSG_TOO_FAR: u16 = 142;
const MSG_DOLL_LIMIT: u16 = 319;

/// Give distance for taming, exclusive.
const TAME_RANGE: i32 = 3;
/// Exp a freshly tamed pet starts with.
const TAME_START_EXP: i64 = 750;

pub fn is_collar(item_id: i32) -> bool {
    item_id == PET_COLLAR || item_id == PET_COLLAR_HIGHER
}

/// CHA left for new summons and pets. Counts base CHA only, so buffs and
/// dolls never widen the budget.
pub fn available_cha(w: &World, srv: &GameServer, char_id: i32) -> i32 {
    let Some(p) = w.player_by_char(char_id) else { return 0 };
    cha_budget(p.base.cha, p.class_type, srv.config.max_companion_cost) - w.companion_cost(char_id)
}

// ─── Teardown ───────────────────────────────────────────────────────────────

/// Removes a doll and takes its bonus back off the owner.
pub fn dismiss_doll(w: &mut World, id: i32) -> Option<Doll> {
    broadcast_remove(w, (EntityKind::Doll, id));
    let d = w.remove_doll(id)?;
    if let Some(p) = w.player_by_char_mut(d.owner) {
        d.bonus.revert_from(&mut p.attr);
        p.clamp_vitals();
    }
    tracing::debug!("[companion] [doll_dismissed] owner={} doll={}", d.owner, d.item_id);
    Some(d)
}

pub fn dismiss_summon(w: &mut World, id: i32) -> Option<Summon> {
    broadcast_remove(w, (EntityKind::Summon, id));
    w.remove_summon(id)
}

/// Ends an escort. The original NPC comes back at its spawn point on the
/// next respawn pass.
pub fn dismiss_follower(w: &mut World, id: i32) {
    broadcast_remove(w, (EntityKind::Follower, id));
    let Some(f) = w.remove_follower(id) else { return };
    w.respawns.push(PendingRespawn { npc_id: f.npc_id, anchor: f.anchor, ticks_left: 1 });
    tracing::debug!("[companion] [follower_released] owner={} npc={}", f.owner, f.npc_id);
}

/// Takes a pet out of the world, returning the row to save.
pub fn stash_pet(w: &mut World, id: i32) -> Option<PetRow> {
    broadcast_remove(w, (EntityKind::Pet, id));
    w.remove_pet(id).map(|p| p.to_row())
}

/// Everything an owner has out. Pets come back as rows for the caller to save.
pub fn dismiss_all(w: &mut World, char_id: i32) -> Vec<PetRow> {
    for id in w.dolls_of(char_id) {
        dismiss_doll(w, id);
    }
    for id in w.summons_of(char_id) {
        dismiss_summon(w, id);
    }
    for id in w.followers_of(char_id) {
        dismiss_follower(w, id);
    }
    w.pets_of(char_id).into_iter().filter_map(|id| stash_pet(w, id)).collect()
}

// ─── Control panel and commands ─────────────────────────────────────────────

fn status_label(s: CompanionStatus) -> &'static str {
    match s {
        CompanionStatus::Aggressive => "$469",
        CompanionStatus::Defensive => "$470",
        CompanionStatus::Alert => "$472",
        _ => "$471",
    }
}

fn pet_exp_percent(srv: &GameServer, pet: &Pet) -> i64 {
    let lo = srv.scripting.exp_for_level(pet.body.level);
    let hi = srv.scripting.exp_for_level(pet.body.level + 1);
    if hi <= lo {
        return 0;
    }
    ((pet.exp - lo).max(0) * 100 / (hi - lo)).min(100)
}

/// Control panel for an owned summon or pet; `None` for anything else.
pub fn control_panel(w: &World, srv: &GameServer, char_id: i32, obj_id: i32) -> Option<Vec<u8>> {
    if let Some(s) = w.summons.get(&obj_id).filter(|s| s.owner == char_id) {
        let b = &s.body;
        let args = [status_label(s.status).to_string(), b.hp.to_string(), b.max_hp.to_string(), b.mp.to_string(), b.max_mp.to_string(), b.level.to_string()];
        return Some(packets::hypertext_args(obj_id, "moncom", &args));
    }
    let pet = w.pets.get(&obj_id).filter(|p| p.owner == char_id)?;
    let b = &pet.body;
    let args = [
        status_label(pet.status).to_string(),
        b.hp.to_string(),
        b.max_hp.to_string(),
        b.mp.to_string(),
        b.max_mp.to_string(),
        b.level.to_string(),
        b.name.clone(),
        "$611".to_string(),
        pet_exp_percent(srv, pet).to_string(),
        pet.lawful.to_string(),
    ];
    Some(packets::hypertext_args(obj_id, "anicom", &args))
}

/// `C_PETMENU [D obj]`: reopens the control panel of an owned companion.
pub async fn pet_menu(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let obj_id = r.read_d();
    let w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    if let Some(pkt) = control_panel(&w, srv, p.char_id, obj_id) {
        p.outbox.send(pkt);
    }
}

/// Whether `obj_id` is one of the player's summons or pets.
pub fn owns(w: &World, char_id: i32, obj_id: i32) -> bool {
    w.summons.get(&obj_id).is_some_and(|s| s.owner == char_id) || w.pets.get(&obj_id).is_some_and(|p| p.owner == char_id)
}

/// Dialog command on an owned companion. Pets refuse orders from a lower
/// level owner. "dismiss" releases a summon, and liberates a pet back into
/// the wild.
pub async fn command(srv: &Arc<GameServer>, sess: &Arc<Session>, obj_id: i32, action: &str) {
    let status = match action {
        "aggressive" => Some(CompanionStatus::Aggressive),
        "defensive" => Some(CompanionStatus::Defensive),
        "stay" => Some(CompanionStatus::Rest),
        "extend" => Some(CompanionStatus::Extend),
        "alert" => Some(CompanionStatus::Alert),
        "dismiss" | "getitem" => None,
        other => {
            tracing::debug!("[companion] [unknown_command] session={} action={}", sess.id, other);
            return;
        }
    };
    let liberated = {
        let mut w = srv.world.lock().await;
        let Some(p) = w.player(sess.id) else { return };
        let (char_id, level) = (p.char_id, p.level);
        if let Some(status) = status {
            set_status(&mut w, char_id, level, obj_id, status);
            if let Some(pkt) = control_panel(&w, srv, char_id, obj_id) {
                w.send_to_char(char_id, pkt);
            }
            return;
        }
        if action == "getitem" {
            return_pet_items(&mut w, sess.id, obj_id);
            return;
        }
        if w.summons.get(&obj_id).is_some_and(|s| s.owner == char_id) {
            dismiss_summon(&mut w, obj_id);
            return;
        }
        match liberate_pet(&mut w, srv, sess.id, obj_id) {
            Some(collar) => collar,
            None => return,
        }
    };
    if let Err(e) = with_timeout("delete_pet", SHORT_TIMEOUT, srv.repos.pets.delete(liberated)).await {
        tracing::error!("[repo] [delete_failed] what=pet collar={} error={}", liberated, e);
    }
}

fn set_status(w: &mut World, char_id: i32, level: i32, obj_id: i32, status: CompanionStatus) {
    if let Some(s) = w.summons.get_mut(&obj_id).filter(|s| s.owner == char_id) {
        s.status = status;
        if status == CompanionStatus::Alert {
            s.home = (s.body.x, s.body.y);
        }
        if status == CompanionStatus::Rest {
            s.body.target = 0;
        }
        return;
    }
    let Some(pet) = w.pets.get_mut(&obj_id).filter(|p| p.owner == char_id) else { return };
    if level < pet.body.level {
        tracing::debug!("[companion] [defied] owner={} pet={}", char_id, obj_id);
        return;
    }
    pet.status = status;
    match status {
        CompanionStatus::Alert => pet.home = (pet.body.x, pet.body.y),
        CompanionStatus::Rest => pet.body.target = 0,
        _ => {}
    }
}

/// Moves the pet's gear back into the owner's bag.
fn return_pet_items(w: &mut World, sid: u64, obj_id: i32) {
    let World { players, pets, .. } = w;
    let Some(p) = players.get_mut(&sid) else { return };
    let Some(pet) = pets.get_mut(&obj_id).filter(|pet| pet.owner == p.char_id) else { return };
    while let Some(mut it) = pet.items.pop() {
        if p.inventory.is_full() {
            pet.items.push(it);
            send_msg(p, super::MSG_INVENTORY_FULL);
            break;
        }
        it.equipped = false;
        p.outbox.send(packets::add_item(&it));
        p.inventory.restore(it);
    }
    pet.weapon = None;
    pet.armor = None;
    pet.bonus = StatDelta::default();
    pet.dirty = true;
    p.outbox.send(packets::event_weight(p.weight242()));
    p.mark_dirty();
}

/// Turns a pet back into a wild NPC and takes the collar. Returns the collar
/// object id so the caller can drop the stored row.
fn liberate_pet(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32) -> Option<i32> {
    let char_id = w.player(sid)?.char_id;
    if !w.pets.get(&obj_id).is_some_and(|p| p.owner == char_id) {
        return None;
    }
    broadcast_remove(w, (EntityKind::Pet, obj_id));
    let pet = w.remove_pet(obj_id)?;
    let b = &pet.body;
    if let Some(tpl) = srv.data.npcs.get(b.npc_id) {
        let id = w.ids.next(IdKind::Npc);
        let anchor = SpawnAnchor { map_id: b.map_id, x: b.x, y: b.y, ..Default::default() };
        let mut npc = Npc::from_template(id, tpl, anchor, b.x, b.y);
        npc.hp = b.hp.clamp(1, npc.max_hp);
        w.add_npc(npc);
        announce(w, (EntityKind::Npc, id));
    }
    if let Some(p) = w.player_mut(sid) {
        if let Some(r) = p.inventory.remove(pet.item_obj_id, 0) {
            send_removal(p, &r);
        }
        p.mark_dirty();
    }
    tracing::info!("[companion] [pet_liberated] owner={} npc={} collar={}", char_id, b.npc_id, pet.item_obj_id);
    Some(pet.item_obj_id)
}

// ─── Collars and dolls ──────────────────────────────────────────────────────

/// Using a collar calls its pet out, or puts it back when already out.
pub async fn toggle_collar(srv: &Arc<GameServer>, sess: &Arc<Session>, collar: i32) {
    {
        let mut w = srv.world.lock().await;
        let Some(p) = w.player(sess.id) else { return };
        let char_id = p.char_id;
        if let Some(id) = w.pets.values().find(|pet| pet.item_obj_id == collar && pet.owner == char_id).map(|pet| pet.body.id) {
            let row = stash_pet(&mut w, id);
            drop(w);
            if let Some(row) = row {
                persistence::save_pet(&srv.repos, row).await;
            }
            return;
        }
        if available_cha(&w, srv, char_id) < PET_COST {
            if let Some(p) = w.player(sess.id) {
                send_msg(p, MSG_TOO_MANY_PETS);
            }
            return;
        }
    }

    let row = match with_timeout("load_pet", SHORT_TIMEOUT, srv.repos.pets.load_by_item_obj_id(collar)).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            if let Some(p) = srv.world.lock().await.player(sess.id) {
                send_msg(p, MSG_NOTHING_HAPPENS);
            }
            return;
        }
        Err(e) => {
            tracing::error!("[companion] [load_failed] collar={} error={}", collar, e);
            return;
        }
    };

    let mut w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    let (char_id, map, x, y) = (p.char_id, p.map_id, p.x, p.y);
    // the collar may have left the bag while the row loaded
    if p.inventory.find(collar).is_none() || w.pets.values().any(|pet| pet.item_obj_id == collar) {
        return;
    }
    let Some(tpl) = srv.data.npcs.get(row.npc_id) else {
        tracing::warn!("[companion] [pet_skipped] collar={} npc={} (no template)", collar, row.npc_id);
        return;
    };
    let (px, py) = w.free_tile_near(&srv.data.maps, map, x + 1, y, 2).unwrap_or((x, y));
    let body = Body::from_template(w.ids.next(IdKind::Pet), tpl, map, px, py);
    let mut pet = Pet::from_row(body, char_id, &row);
    // called-out pets come back at full strength
    pet.body.hp = pet.body.max_hp;
    pet.body.mp = pet.body.max_mp;
    let id = pet.body.id;
    w.add_pet(pet);
    announce(&mut w, (EntityKind::Pet, id));
    if let Some(pkt) = control_panel(&w, srv, char_id, id) {
        w.send_to_char(char_id, pkt);
    }
    tracing::info!("[companion] [pet_summoned] owner={} npc={} collar={}", char_id, row.npc_id, collar);
}

/// Using a doll item summons the doll, or dismisses it when already out.
pub fn toggle_doll(w: &mut World, srv: &GameServer, sid: u64, obj_id: i32, item_id: i32) {
    let Some(p) = w.player(sid) else { return };
    let char_id = p.char_id;
    let mine = w.dolls_of(char_id);
    if let Some(&id) = mine.iter().find(|id| w.dolls.get(id).is_some_and(|d| d.item_obj_id == obj_id)) {
        dismiss_doll(w, id);
        if let Some(p) = w.player(sid) {
            send_status(p, srv.now_secs());
        }
        return;
    }
    let Some(tpl) = srv.data.dolls.get(item_id) else { return };
    let same_kind = mine.iter().any(|id| w.dolls.get(id).is_some_and(|d| d.item_id == item_id));
    if same_kind || mine.len() >= srv.config.max_dolls {
        send_msg(p, MSG_DOLL_LIMIT);
        return;
    }
    let (map, x, y, heading) = (p.map_id, p.x, p.y, p.heading);
    let (bonus, skill_id, skill_chance) = doll_bonus(tpl);
    let doll = Doll {
        id: w.ids.next(IdKind::Doll),
        owner: char_id,
        item_obj_id: obj_id,
        item_id,
        gfx: tpl.gfx_id,
        nameid: if tpl.nameid.is_empty() { tpl.name.clone() } else { tpl.nameid.clone() },
        map_id: map,
        x: x - 1,
        y,
        heading,
        ticks_left: secs_to_ticks(tpl.duration.max(1)),
        bonus,
        skill_id,
        skill_chance,
    };
    let id = doll.id;
    w.add_doll(doll);
    if let Some(p) = w.player_mut(sid) {
        bonus.apply_to(&mut p.attr);
        send_status(p, srv.now_secs());
    }
    announce(w, (EntityKind::Doll, id));
    tracing::debug!("[companion] [doll_summoned] owner={} doll={}", char_id, item_id);
}

/// Conjures `count` summons of `tpl` around the caster, each costing `cost`
/// CHA. Stops early when the budget runs out. Returns the ids placed.
pub fn spawn_summons(w: &mut World, srv: &GameServer, sid: u64, tpl: &NpcTemplate, count: usize, cost: i32) -> Vec<i32> {
    let Some(p) = w.player(sid) else { return Vec::new() };
    let (char_id, map, x, y) = (p.char_id, p.map_id, p.x, p.y);
    let ticks = secs_to_ticks(crate::game::companion::SUMMON_LIFETIME_SECS);
    let mut placed = Vec::new();
    for _ in 0..count {
        if available_cha(w, srv, char_id) < cost {
            break;
        }
        let Some((sx, sy)) = w.free_tile_near(&srv.data.maps, map, x, y, 3) else { break };
        let body = Body::from_template(w.ids.next(IdKind::Summon), tpl, map, sx, sy);
        let mut s = Summon::new(body, char_id, ticks);
        s.cost = cost;
        let id = s.body.id;
        w.add_summon(s);
        announce(w, (EntityKind::Summon, id));
        placed.push(id);
    }
    if placed.is_empty() {
        if let Some(p) = w.player(sid) {
            send_msg(p, MSG_TOO_MANY_PETS);
        }
    }
    placed
}

/// Turns a quest NPC into a follower trailing the player. The NPC leaves
/// the world until the escort ends.
pub fn recruit_follower(w: &mut World, sid: u64, obj_id: i32) -> bool {
    let Some(p) = w.player(sid) else { return false };
    let (char_id, map, x, y) = (p.char_id, p.map_id, p.x, p.y);
    if !w.followers_of(char_id).is_empty() {
        return false;
    }
    let Some(n) = w.npcs.get(&obj_id).filter(|n| n.is_alive()) else { return false };
    let mut anchor = n.anchor;
    anchor.map_id = n.map_id;
    if anchor.respawn_secs == 0 {
        (anchor.x, anchor.y) = (n.x, n.y);
    }
    let follower = Follower {
        id: w.ids.next(IdKind::Follower),
        owner: char_id,
        npc_id: n.npc_id,
        gfx: n.gfx,
        nameid: n.nameid.clone(),
        map_id: map,
        x: n.x,
        y: n.y,
        heading: n.heading,
        ticks_left: secs_to_ticks(FOLLOWER_LIFETIME_SECS),
        anchor,
    };
    broadcast_remove(w, (EntityKind::Npc, obj_id));
    w.remove_npc(obj_id);
    let (id, npc_id) = (follower.id, follower.npc_id);
    w.add_follower(follower);
    announce(w, (EntityKind::Follower, id));
    tracing::info!("[companion] [follower_recruited] owner={} npc={} map={} x={} y={}", char_id, npc_id, map, x, y);
    true
}

// ─── C_GIVE ─────────────────────────────────────────────────────────────────

/// `C_GIVE [D target][H x][H y][D obj][D count]`: hands an item to an owned
/// pet (gear or evolution) or feeds a wild NPC its taming item.
pub async fn give(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let target = r.read_d();
    let _x = r.read_h();
    let _y = r.read_h();
    let obj_id = r.read_d();

    let save = {
        let mut w = srv.world.lock().await;
        let Some(p) = w.player(sess.id) else { return };
        if !p.is_alive() {
            return;
        }
        let Some(it) = p.inventory.find(obj_id) else { return };
        if it.equipped {
            send_msg(p, MSG_GIVE_EQUIPPED);
            return;
        }
        let item_id = it.item_id;
        if w.pets.contains_key(&target) {
            give_to_pet(&mut w, srv, sess.id, target, obj_id, item_id)
        } else if w.npcs.contains_key(&target) {
            tame(&mut w, srv, sess.id, target, obj_id, item_id)
        } else {
            None
        }
    };
    let Some((old, row)) = save else { return };
    if let Some(old) = old {
        if let Err(e) = with_timeout("delete_pet", SHORT_TIMEOUT, srv.repos.pets.delete(old)).await {
            tracing::error!("[repo] [delete_failed] what=pet collar={} error={}", old, e);
        }
    }
    persistence::save_pet(&srv.repos, row).await;
}

/// Pet rows to write after a give: (row to delete, row to save).
type PetWrite = Option<(Option<i32>, PetRow)>;

fn take_one(w: &mut World, sid: u64, obj_id: i32) -> Option<Removal> {
    let p = w.player_mut(sid)?;
    let r = p.inventory.remove(obj_id, 1)?;
    send_removal(p, &r);
    p.mark_dirty();
    Some(r)
}

fn give_to_pet(w: &mut World, srv: &GameServer, sid: u64, pet_id: i32, obj_id: i32, item_id: i32) -> PetWrite {
    let char_id = w.player(sid)?.char_id;
    let pet = w.pets.get(&pet_id).filter(|p| p.owner == char_id)?;
    let pet_type = srv.data.pet_types.get(pet.body.npc_id)?;
    if pet_type.evolv_item_id != 0 && pet_type.evolv_item_id == item_id {
        return evolve(w, srv, sid, pet_id, obj_id);
    }
    let tpl = srv.data.items.get(item_id)?;
    if !pet_type.can_equip || tpl.category == ItemCategory::Etc || pet.items.len() >= 2 {
        return None;
    }
    let is_weapon = tpl.category == ItemCategory::Weapon;
    if (is_weapon && pet.weapon.is_some()) || (!is_weapon && pet.armor.is_some()) {
        return None;
    }
    let gear = StatDelta {
        hit: tpl.hit_mod.clamp(-100, 100) as i16,
        dmg: tpl.dmg_mod.clamp(-100, 100) as i16,
        ac: -(tpl.ac.abs().min(100) as i16),
        ..Default::default()
    };
    let Removal::Gone(mut it) = take_one(w, sid, obj_id)? else {
        // a stack: split one off into a fresh object for the pet
        let mut it = crate::game::inventory::InvItem::from_template(w.ids.next(IdKind::Item), tpl, 1, 0, tpl.bless.max(1), true);
        it.equipped = true;
        return equip_on_pet(w, pet_id, it, is_weapon, gear);
    };
    it.count = 1;
    it.equipped = true;
    equip_on_pet(w, pet_id, it, is_weapon, gear)
}

fn equip_on_pet(w: &mut World, pet_id: i32, it: crate::game::inventory::InvItem, is_weapon: bool, gear: StatDelta) -> PetWrite {
    let pet = w.pets.get_mut(&pet_id)?;
    if is_weapon {
        pet.weapon = Some(it.obj_id);
    } else {
        pet.armor = Some(it.obj_id);
    }
    pet.bonus = pet.bonus + gear;
    pet.items.push(it);
    pet.dirty = true;
    None
}

/// Level 30+ pets fed their evolution item: new template, halved vitals,
/// level 1, new collar. Gear comes off.
fn evolve(w: &mut World, srv: &GameServer, sid: u64, pet_id: i32, obj_id: i32) -> PetWrite {
    let pet = w.pets.get(&pet_id)?;
    if pet.body.level < crate::game::companion::PET_EVOLVE_LEVEL {
        if let Some(p) = w.player(sid) {
            send_msg(p, MSG_NOTHING_HAPPENS);
        }
        return None;
    }
    let pet_type = srv.data.pet_types.get(pet.body.npc_id)?;
    let new_tpl = srv.data.npcs.get(pet_type.evolv_npc_id)?;
    let collar_tpl = srv.data.items.get(PET_COLLAR_HIGHER)?;
    let old_collar = pet.item_obj_id;

    take_one(w, sid, obj_id)?;
    if let Some(p) = w.player_mut(sid) {
        if let Some(r) = p.inventory.remove(old_collar, 0) {
            send_removal(p, &r);
        }
    }
    return_pet_items(w, sid, pet_id);
    let new_collar = give_item(w, sid, collar_tpl, 1, 0)?.obj_id;

    broadcast_remove(w, (EntityKind::Pet, pet_id));
    let pet = w.pets.get_mut(&pet_id)?;
    let b = &mut pet.body;
    b.npc_id = new_tpl.npc_id;
    b.gfx = new_tpl.gfx_id;
    b.nameid = if new_tpl.nameid.is_empty() { new_tpl.name.clone() } else { new_tpl.nameid.clone() };
    b.max_hp = (b.max_hp / 2).max(1);
    b.max_mp /= 2;
    b.hp = b.max_hp;
    b.mp = b.max_mp;
    b.level = 1;
    b.ac = new_tpl.ac;
    b.str = new_tpl.str;
    b.dex = new_tpl.dex;
    b.mr = new_tpl.mr;
    pet.exp = 0;
    pet.item_obj_id = new_collar;
    pet.dirty = false;
    let row = pet.to_row();
    announce(w, (EntityKind::Pet, pet_id));
    tracing::info!("[companion] [pet_evolved] pet={} npc={} collar={}", pet_id, new_tpl.npc_id, new_collar);
    Some((Some(old_collar), row))
}

/// Feeding a wounded wild NPC its taming item turns it into a collar.
/// The item is eaten whether or not the taming takes.
fn tame(w: &mut World, srv: &GameServer, sid: u64, npc_id: i32, obj_id: i32, item_id: i32) -> PetWrite {
    let p = w.player(sid)?;
    let char_id = p.char_id;
    let npc = w.npcs.get(&npc_id).filter(|n| n.is_alive() && n.map_id == p.map_id)?;
    if chebyshev(p.x, p.y, npc.x, npc.y) >= TAME_RANGE {
        send_msg(p, MSG_TOO_FAR);
        return None;
    }
    let pet_type = srv.data.pet_types.get(npc.npc_id).filter(|t| t.can_tame() && t.taming_item_id == item_id)?;
    let pet_name = if pet_type.name.is_empty() { npc.name.clone() } else { pet_type.name.clone() };

    take_one(w, sid, obj_id)?;
    let p = w.player(sid)?;
    let npc = w.npcs.get(&npc_id)?;
    if !npc.tameable || npc.hp > npc.max_hp / 3 {
        send_msg(p, MSG_TAME_FAILED);
        return None;
    }
    if available_cha(w, srv, char_id) < PET_COST {
        send_msg(p, MSG_TOO_MANY_PETS);
        return None;
    }
    let collar_tpl = srv.data.items.get(PET_COLLAR)?;
    if let Err(e) = can_receive(p, collar_tpl, 1) {
        send_msg(p, e.msg_code());
        return None;
    }

    broadcast_remove(w, (EntityKind::Npc, npc_id));
    let npc = w.remove_npc(npc_id)?;
    if let Some(ticks_left) = npc.respawn_ticks() {
        w.respawns.push(PendingRespawn { npc_id: npc.npc_id, anchor: npc.anchor, ticks_left });
    }
    let collar = give_item(w, sid, collar_tpl, 1, 0)?.obj_id;
    let row = PetRow {
        item_obj_id: collar,
        npc_id: npc.npc_id,
        name: pet_name,
        level: npc.level.clamp(1, i32::from(i16::MAX)) as i16,
        hp: npc.max_hp,
        max_hp: npc.max_hp,
        mp: npc.max_mp,
        max_mp: npc.max_mp,
        exp: TAME_START_EXP,
        lawful: 0,
    };
    tracing::info!("[companion] [tamed] owner={} npc={} collar={}", char_id, npc.npc_id, collar);
    Some((None, row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::opcodes::*;
    use crate::network::PacketWriter;
    use crate::servers::map::handlers::testutil::{self, DOG, EVOLVE_FRUIT, HIGH_DOG, TAMING_MEAT};

    fn give_pkt(target: i32, obj: i32) -> Vec<u8> {
        PacketWriter::new(C_GIVE).d(target).h(0).h(0).d(obj).d(1).finish()
    }

    fn hand(w: &mut World, srv: &GameServer, sid: u64, item_id: i32, count: i32) -> i32 {
        let tpl = srv.data.items.get(item_id).cloned().unwrap();
        give_item(w, sid, &tpl, count, 0).unwrap().obj_id
    }

    #[tokio::test]
    async fn test_taming_scenario() {
        let (srv, store) = testutil::server();
        let (sess, mut rx, mut other_rx, dog, meat) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32100);
            let (_, other_rx) = testutil::join(&mut w, 2, 32104, 32100);
            let dog = testutil::dog(&mut w, 32102, 32100);
            w.npcs.get_mut(&dog).unwrap().hp = 30;
            w.player_mut(sess.id).unwrap().base.cha = 14;
            crate::servers::map::view::refresh_view(&mut w, 2 + 1000);
            let meat = hand(&mut w, &srv, sess.id, TAMING_MEAT, 3);
            (sess, rx, other_rx, dog, meat)
        };
        rx.drain();
        other_rx.drain();

        give(&srv, &sess, &mut PacketReader::new(&give_pkt(dog, meat))).await;

        assert_eq!(testutil::ops(&mut other_rx), vec![S_REMOVE_OBJECT]);
        let w = srv.world.lock().await;
        assert!(!w.npcs.contains_key(&dog));
        assert_eq!(w.respawns.len(), 1);
        let p = w.player(sess.id).unwrap();
        assert_eq!(p.inventory.count_of(TAMING_MEAT), 2);
        let collar = p.inventory.find_by_item_id(PET_COLLAR).unwrap().obj_id;
        let row = store.pet(collar).unwrap();
        assert_eq!(row.npc_id, DOG);
        assert_eq!(row.level, 6);
        assert_eq!((row.hp, row.max_hp), (90, 90));
        assert_eq!(row.exp, TAME_START_EXP);
    }

    #[tokio::test]
    async fn test_taming_fails_on_healthy_npc_and_eats_item() {
        let (srv, store) = testutil::server();
        let (sess, mut rx, dog, meat) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32100);
            let dog = testutil::dog(&mut w, 32101, 32100);
            let meat = hand(&mut w, &srv, sess.id, TAMING_MEAT, 1);
            (sess, rx, dog, meat)
        };
        rx.drain();
        give(&srv, &sess, &mut PacketReader::new(&give_pkt(dog, meat))).await;
        let out = rx.drain();
        let last = out.last().unwrap();
        assert_eq!(last[0], S_MESSAGE_CODE);
        assert_eq!(u16::from_le_bytes([last[1], last[2]]), MSG_TAME_FAILED);
        let w = srv.world.lock().await;
        assert!(w.npcs.contains_key(&dog));
        assert_eq!(w.player(sess.id).unwrap().inventory.count_of(TAMING_MEAT), 0);
        assert!(store.pet(1).is_none());
    }

    #[tokio::test]
    async fn test_collar_round_trip_and_evolution() {
        let (srv, store) = testutil::server();
        let (sess, _rx, collar) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32100);
            let collar = hand(&mut w, &srv, sess.id, PET_COLLAR, 1);
            (sess, rx, collar)
        };
        let row = PetRow { item_obj_id: collar, npc_id: DOG, name: "Rex".into(), level: 31, hp: 10, max_hp: 300, mp: 0, max_mp: 40, exp: 0, lawful: 0 };
        srv.repos.pets.save(row).await.unwrap();

        toggle_collar(&srv, &sess, collar).await;
        let (pet_id, fruit) = {
            let mut w = srv.world.lock().await;
            let pet = w.pets.values().next().unwrap();
            assert_eq!(pet.body.hp, 300);
            assert_eq!(pet.owner, 1);
            let id = pet.body.id;
            (id, hand(&mut w, &srv, sess.id, EVOLVE_FRUIT, 1))
        };

        give(&srv, &sess, &mut PacketReader::new(&give_pkt(pet_id, fruit))).await;
        let new_collar = {
            let w = srv.world.lock().await;
            let pet = w.pets.get(&pet_id).unwrap();
            assert_eq!(pet.body.npc_id, HIGH_DOG);
            assert_eq!((pet.body.level, pet.body.max_hp, pet.body.max_mp), (1, 150, 20));
            let p = w.player(sess.id).unwrap();
            assert!(p.inventory.find(collar).is_none());
            p.inventory.find_by_item_id(PET_COLLAR_HIGHER).unwrap().obj_id
        };
        assert!(store.pet(collar).is_none());
        assert_eq!(store.pet(new_collar).unwrap().npc_id, HIGH_DOG);

        // using the collar again puts the pet away and saves it
        toggle_collar(&srv, &sess, new_collar).await;
        assert!(srv.world.lock().await.pets.is_empty());
        assert_eq!(store.pet(new_collar).unwrap().level, 1);
    }

    #[tokio::test]
    async fn test_doll_toggle_applies_and_reverts_bonus() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let obj = hand(&mut w, &srv, sess.id, testutil::DOLL_ITEM, 1);
        let ac = w.player(sess.id).unwrap().attr.ac;
        toggle_doll(&mut w, &srv, sess.id, obj, testutil::DOLL_ITEM);
        assert_eq!(w.dolls.len(), 1);
        assert_eq!(w.player(sess.id).unwrap().attr.ac, ac - 2);
        toggle_doll(&mut w, &srv, sess.id, obj, testutil::DOLL_ITEM);
        assert!(w.dolls.is_empty());
        assert_eq!(w.player(sess.id).unwrap().attr.ac, ac);
    }

    #[tokio::test]
    async fn test_budget_ignores_cha_bonuses() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, _rx) = testutil::join(&mut w, 1, 32100, 32100);
        let base = available_cha(&w, &srv, 1);
        assert_eq!(base, cha_budget(14, crate::game::player::CLASS_KNIGHT, srv.config.max_companion_cost));
        w.player_mut(sess.id).unwrap().attr.cha += 20;
        assert_eq!(available_cha(&w, &srv, 1), base);
    }

    #[tokio::test]
    async fn test_summon_budget_and_commands() {
        let (srv, _store) = testutil::server();
        let orc = srv.data.npcs.get(45001).cloned().unwrap();
        let (sess, _rx, ids) = {
            let mut w = srv.world.lock().await;
            let (sess, rx) = testutil::join(&mut w, 1, 32100, 32100);
            w.player_mut(sess.id).unwrap().base.cha = 14;
            // knight: 14 CHA, two summons at 6 each
            let ids = spawn_summons(&mut w, &srv, sess.id, &orc, 5, 6);
            (sess, rx, ids)
        };
        assert_eq!(ids.len(), 2);
        command(&srv, &sess, ids[0], "aggressive").await;
        command(&srv, &sess, ids[1], "dismiss").await;
        let mut w = srv.world.lock().await;
        assert_eq!(w.summons.get(&ids[0]).unwrap().status, CompanionStatus::Aggressive);
        assert!(!w.summons.contains_key(&ids[1]));
        assert!(dismiss_all(&mut w, 1).is_empty());
        assert!(w.summons.is_empty());
    }
}
