//! Drains the attack queue: hit resolution, damage, deaths and rewards.
//!
//! Handlers only enqueue. Everything that changes HP because a player
//! swung, shot or cast at something happens here, once per tick, in queue
//! order.

use crate::database::map_db::heading_to;
use crate::database::{ItemTemplate, SkillInfo};
use crate::game::aoi::chebyshev;
use crate::game::event::GameEvent;
use crate::game::inventory::ADENA_ITEM_ID;
use crate::game::scripting::{AttackOutcome, CombatContext, DurabilityContext, RangedCombatContext, SkillDamageContext};
use crate::game::world::World;
use crate::game::{AttackKind, AttackRequest};

use super::super::handlers::{can_receive, give_item, send_msg_arg, send_removal, skill, trade};
use super::super::{packets, GameServer};

pub const MELEE_REACH: i32 = 2;
pub const RANGED_REACH: i32 = 10;
/// Fist damage die when nothing is wielded.
const FIST_DAMAGE: i32 = 4;
const MAX_LEVEL: i32 = 99;
const BONUS_STAT_LEVEL: i32 = 51;
const MAX_TOTAL_STATS: i32 = 210;
const LAWFUL_MIN: i32 = -32768;
const LAWFUL_MAX: i32 = 32767;
const PK_LAWFUL_PENALTY: i32 = 1000;
/// "Your $0 has been damaged."
const WEAPON_DAMAGED_MSG: u16 = 268;
/// Skill projectile use-type for the attack packet.
const SKILL_USE_TYPE: u8 = 6;

pub fn run(w: &mut World, srv: &GameServer) {
    while let Some(req) = w.attacks.pop_front() {
        resolve(w, srv, req);
    }
}

fn resolve(w: &mut World, srv: &GameServer, req: AttackRequest) {
    match req.kind {
        AttackKind::Melee => physical(w, srv, req, false),
        AttackKind::Ranged => physical(w, srv, req, true),
        AttackKind::Skill(skill_id) => match srv.data.skills.get(skill_id) {
            Some(skill) => skill_attack(w, srv, req.session_id, req.target, skill),
            None => tracing::debug!("[combat] [unknown_skill] skill={}", skill_id),
        },
    }
}

/// What the combat formulas need from the attacker.
struct Striker {
    char_id: i32,
    map_id: i16,
    x: i32,
    y: i32,
    level: i32,
    str: i32,
    dex: i32,
    intel: i32,
    sp: i32,
    hit: i32,
    dmg: i32,
    bow_hit: i32,
    bow_dmg: i32,
    /// (item id, enchant) of the wielded weapon.
    weapon: Option<(i32, i32)>,
    /// Wear steps on the wielded weapon.
    wear: i32,
}

fn striker(w: &World, sid: u64) -> Option<Striker> {
    let p = w.player(sid)?;
    if !p.is_alive() || p.is_frozen() {
        return None;
    }
    let wielded = p.equipment.weapon().and_then(|obj| p.inventory.find(obj));
    let weapon = wielded.map(|it| (it.item_id, it.enchant));
    let wear = wielded.map_or(0, |it| it.durability);
    Some(Striker {
        char_id: p.char_id,
        map_id: p.map_id,
        x: p.x,
        y: p.y,
        level: p.level,
        str: p.attr.str,
        dex: p.attr.dex,
        intel: p.attr.intel,
        sp: p.attr.sp,
        hit: p.attr.hit,
        dmg: p.attr.dmg,
        bow_hit: p.attr.bow_hit,
        bow_dmg: p.attr.bow_dmg,
        weapon,
        wear,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Npc(i32),
    /// Session id of the victim.
    Player(u64),
}

/// Defensive numbers of whatever is being hit.
struct Defender {
    target: Target,
    id: i32,
    map_id: i16,
    x: i32,
    y: i32,
    ac: i32,
    level: i32,
    mr: i32,
    class_type: i32,
    large: bool,
    /// Merchants and other passive NPCs only play the swing.
    hittable: bool,
    res: [i32; 4],
}

fn defender(w: &World, srv: &GameServer, attacker_char: i32, id: i32) -> Option<Defender> {
    if let Some(n) = w.npcs.get(&id) {
        if !n.is_alive() {
            return None;
        }
        return Some(Defender {
            target: Target::Npc(id),
            id,
            map_id: n.map_id,
            x: n.x,
            y: n.y,
            ac: n.ac,
            level: n.level,
            mr: n.mr,
            class_type: -1,
            large: n.large,
            hittable: n.monster || n.guard,
            res: [n.fire_res, n.water_res, n.wind_res, n.earth_res],
        });
    }
    if id == attacker_char {
        return None;
    }
    let sid = w.session_of_char(id)?;
    let p = w.player(sid)?;
    if !p.is_alive() {
        return None;
    }
    let safe = srv.data.maps.is_safety_zone(p.map_id, p.x, p.y);
    Some(Defender {
        target: Target::Player(sid),
        id,
        map_id: p.map_id,
        x: p.x,
        y: p.y,
        ac: p.attr.ac,
        level: p.level,
        mr: p.attr.mr,
        class_type: i32::from(p.class_type),
        large: false,
        hittable: !safe,
        res: [p.attr.fire_res, p.attr.water_res, p.attr.wind_res, p.attr.earth_res],
    })
}

fn sized_damage(tpl: &ItemTemplate, large: bool) -> i32 {
    if large {
        tpl.dmg_large
    } else {
        tpl.dmg_small
    }
}

fn face(w: &mut World, sid: u64, s: &Striker, d: &Defender) -> u8 {
    let heading = heading_to(s.x, s.y, d.x, d.y);
    if let Some(p) = w.player_mut(sid) {
        p.heading = heading;
    }
    heading
}

/// Removes one arrow from the bag. Returns its template id.
fn take_arrow(w: &mut World, srv: &GameServer, sid: u64) -> Option<i32> {
    let p = w.player_mut(sid)?;
    let item_id = p
        .inventory
        .iter()
        .find(|it| srv.data.items.get(it.item_id).is_some_and(|t| t.is_arrow()))
        .map(|it| it.item_id)?;
    let removal = p.inventory.consume(item_id, 1)?;
    send_removal(p, &removal);
    p.mark_dirty();
    Some(item_id)
}

fn physical(w: &mut World, srv: &GameServer, req: AttackRequest, ranged: bool) {
    let sid = req.session_id;
    let Some(s) = striker(w, sid) else { return };
    let Some(d) = defender(w, srv, s.char_id, req.target) else { return };
    let reach = if ranged { RANGED_REACH } else { MELEE_REACH };
    if d.map_id != s.map_id || chebyshev(s.x, s.y, d.x, d.y) > reach {
        tracing::debug!("[combat] [out_of_reach] char={} target={} ranged={}", s.char_id, d.id, ranged);
        return;
    }
    let heading = face(w, sid, &s, &d);

    let weapon_tpl = s.weapon.and_then(|(item_id, _)| srv.data.items.get(item_id));
    let enchant = s.weapon.map(|(_, e)| e).unwrap_or(0);

    let arrow_dmg = if ranged {
        match take_arrow(w, srv, sid) {
            Some(arrow) => srv.data.items.get(arrow).map(|t| sized_damage(t, d.large)).unwrap_or(0),
            None => {
                if let Some(p) = w.player(sid) {
                    p.outbox.send(packets::system_message("You have no arrows."));
                }
                return;
            }
        }
    } else {
        0
    };

    let outcome = if !d.hittable {
        AttackOutcome::miss()
    } else if ranged {
        srv.scripting.calc_ranged_attack(&RangedCombatContext {
            attacker_level: s.level,
            attacker_str: s.str,
            attacker_dex: s.dex,
            attacker_bow_dmg: weapon_tpl.map(|t| sized_damage(t, d.large)).unwrap_or(1),
            attacker_arrow_dmg: arrow_dmg,
            attacker_bow_hit_mod: s.bow_hit + weapon_tpl.map_or(0, |t| t.bow_hit_mod),
            attacker_bow_dmg_mod: s.bow_dmg + weapon_tpl.map_or(0, |t| t.bow_dmg_mod) + enchant - s.wear,
            target_ac: d.ac,
            target_level: d.level,
            target_mr: d.mr,
            target_class_type: d.class_type,
        })
    } else {
        srv.scripting.calc_melee_attack(&CombatContext {
            attacker_level: s.level,
            attacker_str: s.str,
            attacker_dex: s.dex,
            attacker_weapon: weapon_tpl.map(|t| sized_damage(t, d.large)).filter(|&v| v > 0).unwrap_or(FIST_DAMAGE),
            attacker_hit_mod: s.hit + weapon_tpl.map_or(0, |t| t.hit_mod),
            attacker_dmg_mod: s.dmg + weapon_tpl.map_or(0, |t| t.dmg_mod) + enchant - s.wear,
            target_ac: d.ac,
            target_level: d.level,
            target_mr: d.mr,
            target_class_type: d.class_type,
        })
    };

    let mut damage = if outcome.is_hit { outcome.damage.max(0) } else { 0 };
    if damage > 0 {
        damage += weapon_proc(w, srv, &s, &d);
        wear_weapon(w, srv, sid);
    }

    let pkt = if ranged {
        let seq = w.next_projectile();
        packets::attack_arrow(s.char_id, d.id, damage, heading, seq, (s.x, s.y), (d.x, d.y))
    } else {
        packets::attack_melee(s.char_id, d.id, damage, heading)
    };
    w.broadcast_nearby(s.map_id, s.x, s.y, None, &pkt);

    if damage > 0 {
        apply_damage(w, srv, sid, &s, &d, damage);
    }
}

/// Extra damage from the wielded weapon's on-hit proc, with its effect.
fn weapon_proc(w: &World, srv: &GameServer, s: &Striker, d: &Defender) -> i32 {
    let Some(ws) = s.weapon.and_then(|(item_id, _)| srv.data.weapon_skills.get(item_id)) else { return 0 };
    let Some(extra) = ws.roll() else { return 0 };
    if ws.effect_id != 0 {
        let on = if ws.effect_on_self { s.char_id } else { d.id };
        w.broadcast_nearby(d.map_id, d.x, d.y, None, &packets::effect(on, ws.effect_id));
    }
    tracing::debug!("[combat] [weapon_proc] char={} target={} extra={}", s.char_id, d.id, extra);
    extra
}

/// A landed hit may wear the wielded weapon by one step.
fn wear_weapon(w: &mut World, srv: &GameServer, sid: u64) {
    let Some(p) = w.player_mut(sid) else { return };
    let Some(obj) = p.equipment.weapon() else { return };
    let Some(it) = p.inventory.find_mut(obj) else { return };
    let ctx = DurabilityContext { enchant_lvl: it.enchant, bless: it.bless, current_durability: it.durability };
    let res = srv.scripting.calc_durability_damage(&ctx);
    if !res.should_damage || it.durability >= res.max_durability {
        return;
    }
    it.durability += 1;
    let (name, wear) = (it.view_name(), it.durability);
    let desc = packets::change_item_desc(it);
    p.outbox.send(desc);
    send_msg_arg(p, WEAPON_DAMAGED_MSG, &name);
    p.mark_dirty();
    tracing::debug!("[combat] [weapon_worn] char={} obj={} wear={}", p.char_id, obj, wear);
}

fn apply_damage(w: &mut World, srv: &GameServer, attacker_sid: u64, s: &Striker, d: &Defender, damage: i32) {
    match d.target {
        Target::Npc(id) => {
            let Some(n) = w.npcs.get_mut(&id) else { return };
            let killed = n.take_damage(s.char_id, damage);
            let meter = packets::hp_meter(id, n.hp_percent());
            w.broadcast_nearby(d.map_id, d.x, d.y, None, &meter);
            if killed {
                npc_death(w, srv, id, attacker_sid);
            }
        }
        Target::Player(victim) => {
            let Some(p) = w.player_mut(victim) else { return };
            p.hp = (p.hp - damage).max(0);
            p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
            if p.hp == 0 {
                kill_player(w, srv, victim);
                pk_penalty(w, attacker_sid, victim);
            }
        }
    }
}

fn skill_attack(w: &mut World, srv: &GameServer, sid: u64, target: i32, skill: &SkillInfo) {
    let Some(s) = striker(w, sid) else { return };
    let Some(d) = defender(w, srv, s.char_id, target) else { return };
    let reach = skill::reach(skill, w.aoi_radius);
    if d.map_id != s.map_id || chebyshev(s.x, s.y, d.x, d.y) > reach {
        tracing::debug!("[combat] [out_of_reach] char={} target={} skill={}", s.char_id, d.id, skill.skill_id);
        return;
    }
    let heading = face(w, sid, &s, &d);
    let damage = if d.hittable { skill_damage(srv, &s, &d, skill) } else { 0 };

    let seq = w.next_projectile();
    let pkt = packets::attack_skill(s.char_id, d.id, damage, heading, seq, skill.cast_gfx, SKILL_USE_TYPE, (s.x, s.y), (d.x, d.y));
    w.broadcast_nearby(s.map_id, s.x, s.y, None, &pkt);
    if damage > 0 {
        apply_damage(w, srv, sid, &s, &d, damage);
    }

    if skill.area > 0 {
        let splash: Vec<i32> = w
            .nearby_npcs(d.map_id, d.x, d.y, skill.area)
            .into_iter()
            .filter(|&id| id != d.id && w.npcs.get(&id).is_some_and(|n| n.is_alive() && n.monster))
            .collect();
        for id in splash {
            let Some(other) = defender(w, srv, s.char_id, id) else { continue };
            let dmg = skill_damage(srv, &s, &other, skill);
            if dmg > 0 {
                w.broadcast_nearby(other.map_id, other.x, other.y, None, &packets::action(other.id, packets::ACTION_DAMAGE));
                apply_damage(w, srv, sid, &s, &other, dmg);
            }
        }
    }
}

fn skill_damage(srv: &GameServer, s: &Striker, d: &Defender, skill: &SkillInfo) -> i32 {
    let out = srv.scripting.calc_skill_damage(&SkillDamageContext {
        skill_id: skill.skill_id,
        damage_value: skill.damage_value,
        damage_dice: skill.damage_dice,
        damage_dice_count: skill.damage_dice_count,
        skill_level: skill.skill_level,
        attr: skill.attr,
        attacker_level: s.level,
        attacker_int: s.intel,
        attacker_sp: s.sp,
        target_level: d.level,
        target_mr: d.mr,
        target_fire_res: d.res[0],
        target_water_res: d.res[1],
        target_wind_res: d.res[2],
        target_earth_res: d.res[3],
    });
    out.damage.max(0).saturating_mul(out.hit_count.max(1))
}

/// Death of an NPC at the hands of `killer_sid`: corpse, rewards, event.
pub(crate) fn npc_death(w: &mut World, srv: &GameServer, id: i32, killer_sid: u64) {
    let Some(n) = w.npcs.get(&id) else { return };
    let (npc_id, map_id, x, y, guard) = (n.npc_id, n.map_id, n.x, n.y, n.guard);
    let (base_exp, npc_lawful, name) = (n.exp, n.lawful, n.name.clone());
    let hate: Vec<(i32, i32)> = n.hate.iter().map(|(&c, &h)| (c, h)).collect();

    w.kill_npc(id);
    w.broadcast_nearby(map_id, x, y, None, &packets::action(id, packets::ACTION_DIE));

    let killer_char = w.player(killer_sid).map(|p| p.char_id).unwrap_or(0);
    if !guard && killer_char != 0 {
        let exp = (f64::from(base_exp) * srv.config.exp_rate) as i64;
        share_exp(w, srv, killer_sid, &hate, exp);
        feed_pets(w, srv, killer_char, map_id, base_exp);
        add_npc_lawful(w, srv, killer_sid, npc_lawful);
        give_drops(w, srv, killer_sid, npc_id);
    }
    if let Some(n) = w.npcs.get_mut(&id) {
        n.hate.clear();
    }

    tracing::info!("[combat] [npc_killed] npc={} id={} killer={} exp={}", name, id, killer_char, base_exp);
    w.events.emit(GameEvent::EntityKilled { victim: id, npc_id, killer: killer_char, map_id, x, y });
}

/// Splits by hate share when several players fought; otherwise all to the killer.
fn share_exp(w: &mut World, srv: &GameServer, killer_sid: u64, hate: &[(i32, i32)], exp: i64) {
    if exp <= 0 {
        return;
    }
    let total: i64 = hate.iter().map(|&(_, h)| i64::from(h.max(0))).sum();
    if hate.len() <= 1 || total <= 0 {
        add_exp(w, srv, killer_sid, exp);
        return;
    }
    for &(char_id, h) in hate {
        let Some(sid) = w.session_of_char(char_id) else { continue };
        if !w.player(sid).is_some_and(|p| p.is_alive()) {
            continue;
        }
        let share = exp * i64::from(h.max(0)) / total;
        if share > 0 {
            add_exp(w, srv, sid, share);
        }
    }
}

fn feed_pets(w: &mut World, srv: &GameServer, owner: i32, map_id: i16, base_exp: i32) {
    let exp = (f64::from(base_exp) * srv.config.pet_exp_rate) as i64;
    if exp <= 0 {
        return;
    }
    for id in w.pets_of(owner) {
        let Some(pet) = w.pets.get_mut(&id) else { continue };
        if !pet.body.is_alive() || pet.body.map_id != map_id {
            continue;
        }
        let pet_type = srv.data.pet_types.get(pet.body.npc_id);
        let gained = pet.gain_exp(exp, pet_type, |e| srv.scripting.level_from_exp(e));
        let meter = packets::hp_meter(id, pet.body.hp_percent());
        if gained > 0 {
            tracing::info!("[pet] [level_up] pet={} level={}", pet.body.name, pet.body.level);
        }
        w.send_to_char(owner, meter);
    }
}

fn add_npc_lawful(w: &mut World, srv: &GameServer, sid: u64, npc_lawful: i32) {
    if npc_lawful == 0 {
        return;
    }
    let delta = (f64::from(npc_lawful) * srv.config.lawful_rate * -1.0) as i32;
    if delta == 0 {
        return;
    }
    let Some(p) = w.player_mut(sid) else { return };
    p.lawful = (p.lawful + delta).clamp(LAWFUL_MIN, LAWFUL_MAX);
    p.mark_dirty();
    let (map_id, x, y, me, lawful) = (p.map_id, p.x, p.y, p.char_id, p.lawful);
    w.broadcast_nearby(map_id, x, y, None, &packets::lawful(me, lawful));
}

fn give_drops(w: &mut World, srv: &GameServer, sid: u64, npc_id: i32) {
    let scale = f64::from(crate::database::drop_db::CHANCE_SCALE);
    for drop in srv.data.drops.get(npc_id) {
        let adena = drop.item_id == ADENA_ITEM_ID;
        let rate = if adena { srv.config.adena_rate } else { srv.config.drop_rate };
        let chance = (f64::from(drop.chance) * rate).min(scale);
        if rand::random_range(0.0..scale) >= chance {
            continue;
        }
        let Some(tpl) = srv.data.items.get(drop.item_id) else { continue };
        let mut qty = if drop.max > drop.min { rand::random_range(drop.min..=drop.max) } else { drop.min };
        if adena {
            qty = (f64::from(qty) * srv.config.adena_rate) as i32;
        }
        let qty = qty.max(1);
        let Some(p) = w.player(sid) else { return };
        if let Err(e) = can_receive(p, tpl, qty) {
            tracing::debug!("[combat] [drop_lost] char={} item={} reason={:?}", p.char_id, tpl.item_id, e);
            continue;
        }
        give_item(w, sid, tpl, qty, drop.enchant_level);
    }
}

/// Adds exp and walks the level table; HP/MP max grow per level gained.
pub(crate) fn add_exp(w: &mut World, srv: &GameServer, sid: u64, amount: i64) {
    let now = srv.now_secs();
    let Some(p) = w.player_mut(sid) else { return };
    p.exp = p.exp.saturating_add(amount).max(0);
    let target = srv.scripting.level_from_exp(p.exp).min(MAX_LEVEL);
    let mut leveled = false;
    while p.level < target {
        p.level += 1;
        leveled = true;
        let up = srv.scripting.calc_level_up(p.class_type, p.base.con, p.base.wis);
        p.base.max_hp += up.hp;
        p.base.max_mp += up.mp;
        p.attr.max_hp += up.hp;
        p.attr.max_mp += up.mp;
        p.hp = p.attr.max_hp;
        p.mp = p.attr.max_mp;
    }
    p.mark_dirty();
    p.outbox.send(packets::exp(p.level, p.exp));
    if !leveled {
        return;
    }
    p.outbox.send(packets::status(p, now));
    let b = &p.base;
    let total = b.str + b.dex + b.con + b.wis + b.intel + b.cha;
    if p.level >= BONUS_STAT_LEVEL && p.level - 50 - p.bonus_stats > 0 && total < MAX_TOTAL_STATS {
        p.outbox.send(packets::hypertext(p.char_id, packets::HTML_BONUS_STATS));
    }
    tracing::info!("[combat] [level_up] char={} level={} max_hp={} max_mp={}", p.name, p.level, p.attr.max_hp, p.attr.max_mp);
}

/// Player death: corpse stays until restart. An open trade is cancelled and
/// warehouse windows and locks are let go.
pub(crate) fn kill_player(w: &mut World, srv: &GameServer, sid: u64) {
    if w.player(sid).map_or(true, |p| p.dead) {
        return;
    }
    trade::cancel_in_world(w, sid);
    super::poison::cure(w, sid);
    let Some(p) = w.player_mut(sid) else { return };
    p.dead = true;
    p.hp = 0;
    p.warehouse = None;
    let (map_id, x, y, me) = (p.map_id, p.x, p.y, p.char_id);
    let buffs = p.buffs.drain();
    for b in &buffs {
        p.revert_buff(b);
    }
    w.unlock_clan_warehouse(me);
    w.release(map_id, x, y, me);

    let die = packets::action(me, packets::ACTION_DIE);
    w.broadcast_nearby(map_id, x, y, None, &die);
    for b in &buffs {
        skill::buff_icon(w, sid, b, 0);
    }

    let Some(p) = w.player_mut(sid) else { return };
    p.outbox.send(packets::hit_point(0, p.attr.max_hp));
    let penalty = srv.scripting.calc_death_exp_penalty(p.level, p.exp);
    if penalty > 0 {
        p.exp = (p.exp - penalty).max(0);
    }
    p.outbox.send(packets::exp(p.level, p.exp));
    p.mark_dirty();
    tracing::info!("[combat] [player_died] char={} x={} y={} exp_lost={}", p.name, x, y, penalty);
    w.events.emit(GameEvent::PlayerDied { char_id: me });
}

/// Lawful hit for killing a player in good standing.
fn pk_penalty(w: &mut World, killer_sid: u64, victim_sid: u64) {
    let victim_lawful = w.player(victim_sid).map(|p| p.lawful).unwrap_or(-1);
    if victim_lawful < 0 {
        return;
    }
    let Some(k) = w.player_mut(killer_sid) else { return };
    if k.lawful < 30000 {
        k.pk_count += 1;
    }
    k.lawful = (k.lawful - PK_LAWFUL_PENALTY).clamp(LAWFUL_MIN, LAWFUL_MAX);
    k.mark_dirty();
    let (map_id, x, y, me, lawful, pk) = (k.map_id, k.x, k.y, k.char_id, k.lawful, k.pk_count);
    w.broadcast_nearby(map_id, x, y, None, &packets::lawful(me, lawful));
    tracing::info!("[combat] [pk] killer={} lawful={} pk_count={}", me, lawful, pk);
}
