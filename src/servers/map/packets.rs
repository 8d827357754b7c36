//! Server packet builders.
//!
//! Every function returns a finished, padded payload ready for an outbox.
//! Layouts follow the 3.80C client; field comments use the usual
//! C (u8) / H (u16) / D (i32) / S (string) notation.

use crate::game::char_reset::SixStats;
use crate::game::companion::{Doll, Follower, Pet, Summon};
use crate::game::door::Door;
use crate::game::ground::GroundItem;
use crate::game::inventory::InvItem;
use crate::game::npc::Npc;
use crate::game::player::Player;
use crate::network::opcodes::*;
use crate::network::PacketWriter;
use crate::repo::{BoardPost, BookmarkRow, CharacterRow, MailRow, WarehouseItem};

pub const ACTION_DIE: u8 = 8;
pub const ACTION_ATTACK: u8 = 1;
pub const ACTION_SKILL_ATTACK: u8 = 18;
pub const ACTION_DAMAGE: u8 = 2;

/// S_PARALYSIS sub-code releasing the client after a teleport.
pub const TELEPORT_UNLOCK: u8 = 7;
/// S_PARALYSIS sub-code waking a sleeping player.
pub const PARALYSIS_SLEEP_OFF: u8 = 0x0b;

/// S_MESSAGE type for plain system notices in the chat window.
pub const MSG_SYSTEM: u8 = 9;

// Login result codes.
pub const LOGIN_OK: u16 = 0;
pub const LOGIN_ALREADY_ONLINE: u16 = 7;
pub const LOGIN_REJECTED: u16 = 8;

// Character creation results.
pub const CREATE_OK: u8 = 0x02;
pub const CREATE_NAME_EXISTS: u8 = 0x06;
pub const CREATE_INVALID_NAME: u8 = 0x09;
pub const CREATE_WRONG_AMOUNT: u8 = 0x15;

pub const DELETE_SOFT: u8 = 0x51;
pub const DELETE_HARD: u8 = 0x05;

// ─── Login / character select ───────────────────────────────────────────────

pub fn version_check(server_id: u8, start_time: i32, uptime: i32, lang: u8) -> Vec<u8> {
    PacketWriter::new(S_VERSION_CHECK)
        .c(0)
        .c(server_id)
        .du(0x07cb_f4dd)
        .du(0x07cb_f4dd)
        .du(0x77fc_692d)
        .du(0x07cb_f4d9)
        .d(start_time)
        .c(0)
        .c(0)
        .c(lang)
        .du(0x087f_7dc2)
        .d(uptime)
        .h(1)
        .finish()
}

pub fn login_check(reason: u16) -> Vec<u8> {
    PacketWriter::new(S_LOGIN_CHECK).h(reason).d(0).d(0).d(0).finish()
}

pub fn num_character(count: u8, slots: u8) -> Vec<u8> {
    PacketWriter::new(S_NUM_CHARACTER).c(count).c(slots).finish()
}

fn char_summary(op: u8, c: &CharacterRow) -> Vec<u8> {
    let level = c.level.clamp(0, 255) as u8;
    let stats = [c.str, c.dex, c.con, c.wis, c.cha, c.intel].map(|v| v.clamp(0, 255) as u8);
    let check = stats.iter().fold(level, |acc, v| acc ^ v);
    PacketWriter::new(op)
        .s(&c.name)
        .s(&c.clan_name)
        .c(c.class_type as u8)
        .c(c.sex as u8)
        .h(c.lawful as u16)
        .h(c.max_hp as u16)
        .h(c.max_mp as u16)
        .c(c.ac as u8)
        .c(level)
        .c(stats[0])
        .c(stats[1])
        .c(stats[2])
        .c(stats[3])
        .c(stats[4])
        .c(stats[5])
        .c(0)
        .d(c.birthday)
        .c(check)
        .finish()
}

pub fn character_info(c: &CharacterRow) -> Vec<u8> {
    char_summary(S_CHARACTER_INFO, c)
}

pub fn new_char_info(c: &CharacterRow) -> Vec<u8> {
    char_summary(S_NEW_CHAR_INFO, c)
}

pub fn create_char_check(reason: u8) -> Vec<u8> {
    PacketWriter::new(S_CREATE_CHAR_CHECK).c(reason).d(0).h(0).finish()
}

pub fn delete_char_ok(code: u8) -> Vec<u8> {
    PacketWriter::new(S_DELETE_CHAR_OK).c(code).finish()
}

pub fn enter_world_check(clan_char_id: Option<i32>) -> Vec<u8> {
    let w = PacketWriter::new(S_ENTER_WORLD_CHECK).c(0x03);
    let w = match clan_char_id {
        Some(id) => w.d(id),
        None => w.c(0x53).c(0x01).c(0x00).c(0x8b),
    };
    w.c(0x9c).c(0x1f).finish()
}

// ─── Object packs ───────────────────────────────────────────────────────────

fn brave_flags(p: &Player) -> u8 {
    0x04 | (p.brave_speed << 4)
}

/// S_PUT_OBJECT for another player.
pub fn put_player(p: &Player) -> Vec<u8> {
    PacketWriter::new(S_PUT_OBJECT)
        .h(p.x as u16)
        .h(p.y as u16)
        .d(p.char_id)
        .h(p.gfx() as u16)
        .c(p.current_weapon)
        .c(p.heading)
        .c(0)
        .c(p.move_speed)
        .d(1)
        .h(p.lawful as u16)
        .s(&p.name)
        .s(&p.title)
        .c(brave_flags(p))
        .d(0)
        .s(&p.clan_name)
        .s("")
        .c(0)
        .c(0xff)
        .c(0)
        .c(0)
        .s("")
        .c(0xff)
        .c(0xff)
        .finish()
}

/// The player's own pack; the client resets its local model on receipt.
pub fn own_char_pack(p: &Player) -> Vec<u8> {
    let rank = if p.clan_id != 0 { (p.clan_rank as u8) << 4 } else { 0xb0 };
    PacketWriter::new(S_PUT_OBJECT)
        .h(p.x as u16)
        .h(p.y as u16)
        .d(p.char_id)
        .h(p.gfx() as u16)
        .c(p.current_weapon)
        .c(p.heading)
        .c(0)
        .c(p.move_speed)
        .d(p.exp as i32)
        .h(p.lawful as u16)
        .s(&p.name)
        .s(&p.title)
        .c(brave_flags(p))
        .d(0)
        .s(&p.clan_name)
        .s("")
        .c(rank)
        .c(0xff)
        .c(0)
        .c(0)
        .c(0)
        .c(0xff)
        .c(0xff)
        .s("")
        .c(0)
        .finish()
}

/// Shared tail for every non-player object.
#[allow(clippy::too_many_arguments)]
fn put_thing(x: i32, y: i32, id: i32, gfx: i32, status: u8, heading: u8, exp: i32, lawful: i16, name: &str, master: &str, level: u8) -> Vec<u8> {
    PacketWriter::new(S_PUT_OBJECT)
        .h(x as u16)
        .h(y as u16)
        .d(id)
        .h(gfx as u16)
        .c(status)
        .c(heading)
        .c(0)
        .c(0)
        .d(exp)
        .h(lawful as u16)
        .s(name)
        .s("")
        .c(0)
        .d(0)
        .s("")
        .s(master)
        .c(0)
        .c(0xff)
        .c(0)
        .c(level)
        .c(0xff)
        .c(0xff)
        .c(0)
        .finish()
}

pub fn put_npc(n: &Npc) -> Vec<u8> {
    let status = if n.dead { ACTION_DIE } else { 0 };
    put_thing(n.x, n.y, n.id, n.gfx, status, n.heading, n.exp, n.lawful as i16, &n.nameid, "", n.level.clamp(0, 255) as u8)
}

pub fn put_ground(g: &GroundItem) -> Vec<u8> {
    put_thing(g.x, g.y, g.id, g.item.grd_gfx, 0, 0, g.item.count, 0, &g.display_name(), "", 0)
}

pub fn put_door(d: &Door) -> Vec<u8> {
    put_thing(d.x, d.y, d.id, d.gfx, d.action(), 0, 1, 0, "", "", 0)
}

pub fn put_summon(s: &Summon, master: &str) -> Vec<u8> {
    let b = &s.body;
    let status = if b.dead { ACTION_DIE } else { 0 };
    put_thing(b.x, b.y, b.id, b.gfx, status, b.heading, 0, 0, &b.nameid, master, b.level.clamp(0, 255) as u8)
}

pub fn put_pet(p: &Pet, master: &str) -> Vec<u8> {
    let b = &p.body;
    let status = if b.dead { ACTION_DIE } else { 0 };
    put_thing(b.x, b.y, b.id, b.gfx, status, b.heading, p.exp as i32, p.lawful as i16, &b.name, master, b.level.clamp(0, 255) as u8)
}

pub fn put_doll(d: &Doll, master: &str) -> Vec<u8> {
    put_thing(d.x, d.y, d.id, d.gfx, 0, d.heading, 0, 0, &d.nameid, master, 0)
}

pub fn put_follower(f: &Follower, master: &str) -> Vec<u8> {
    put_thing(f.x, f.y, f.id, f.gfx, 0, f.heading, 0, 0, &f.nameid, master, 0)
}

pub fn remove_object(id: i32) -> Vec<u8> {
    PacketWriter::new(S_REMOVE_OBJECT).d(id).finish()
}

/// Carries the position before the step; the client derives the target.
pub fn move_object(id: i32, prev_x: i32, prev_y: i32, heading: u8) -> Vec<u8> {
    PacketWriter::new(S_MOVE_OBJECT).d(id).h(prev_x as u16).h(prev_y as u16).c(heading).h(0).finish()
}

pub fn change_heading(id: i32, heading: u8) -> Vec<u8> {
    PacketWriter::new(S_CHANGE_HEADING).d(id).c(heading).finish()
}

/// `ratio` is 0..=100, or 0xFF to clear the bar.
pub fn hp_meter(id: i32, ratio: u16) -> Vec<u8> {
    PacketWriter::new(S_HP_METER).d(id).h(ratio).finish()
}

pub fn action(id: i32, action: u8) -> Vec<u8> {
    PacketWriter::new(S_ACTION).d(id).c(action).finish()
}

pub fn effect(id: i32, gfx: i32) -> Vec<u8> {
    PacketWriter::new(S_EFFECT).d(id).h(gfx as u16).finish()
}

pub fn invis(id: i32, on: bool) -> Vec<u8> {
    PacketWriter::new(S_INVIS).d(id).c(u8::from(on)).finish()
}

/// Weapon / polymorph visual refresh.
pub fn change_desc(id: i32, weapon: u8) -> Vec<u8> {
    PacketWriter::new(S_CHANGE_DESC).d(id).c(weapon).c(0xff).c(0xff).finish()
}

pub fn poly(id: i32, gfx: i32, weapon: u8) -> Vec<u8> {
    PacketWriter::new(S_POLY).d(id).h(gfx as u16).c(weapon).c(0xff).c(0xff).finish()
}

// ─── Combat ─────────────────────────────────────────────────────────────────

pub fn attack_melee(attacker: i32, target: i32, damage: i32, heading: u8) -> Vec<u8> {
    PacketWriter::new(S_ATTACK)
        .c(ACTION_ATTACK)
        .d(attacker)
        .d(target)
        .h(damage.max(0) as u16)
        .c(heading)
        .d(0)
        .c(0)
        .finish()
}

/// Gfx of a plain arrow projectile.
pub const ARROW_GFX: u16 = 66;

#[allow(clippy::too_many_arguments)]
pub fn attack_arrow(attacker: i32, target: i32, damage: i32, heading: u8, seq: i32, from: (i32, i32), to: (i32, i32)) -> Vec<u8> {
    PacketWriter::new(S_ATTACK)
        .c(ACTION_ATTACK)
        .d(attacker)
        .d(target)
        .h(damage.max(0) as u16)
        .c(heading)
        .d(seq)
        .h(ARROW_GFX)
        .c(0)
        .h(from.0 as u16)
        .h(from.1 as u16)
        .h(to.0 as u16)
        .h(to.1 as u16)
        .c(0)
        .c(0)
        .c(0)
        .finish()
}

#[allow(clippy::too_many_arguments)]
pub fn attack_skill(attacker: i32, target: i32, damage: i32, heading: u8, seq: i32, gfx: i32, use_type: u8, from: (i32, i32), to: (i32, i32)) -> Vec<u8> {
    PacketWriter::new(S_ATTACK)
        .c(ACTION_SKILL_ATTACK)
        .d(attacker)
        .d(target)
        .h(damage.max(0) as u16)
        .c(heading)
        .d(seq)
        .h(gfx as u16)
        .c(use_type)
        .h(from.0 as u16)
        .h(from.1 as u16)
        .h(to.0 as u16)
        .h(to.1 as u16)
        .c(0)
        .c(0)
        .c(0)
        .finish()
}

// ─── Player status ──────────────────────────────────────────────────────────

pub fn status(p: &Player, now_secs: i32) -> Vec<u8> {
    let a = &p.attr;
    let b = |v: i32| v.clamp(0, 255) as u8;
    PacketWriter::new(S_STATUS)
        .d(p.char_id)
        .c(b(p.level))
        .d(p.exp as i32)
        .c(b(a.str))
        .c(b(a.intel))
        .c(b(a.wis))
        .c(b(a.dex))
        .c(b(a.con))
        .c(b(a.cha))
        .h(p.hp as u16)
        .h(a.max_hp as u16)
        .h(p.mp as u16)
        .h(a.max_mp as u16)
        .c(a.ac as i8 as u8)
        .d(now_secs - now_secs % 300)
        .c(b(p.food))
        .c(p.weight242())
        .h(p.lawful as u16)
        .h(a.fire_res as u16)
        .h(a.water_res as u16)
        .h(a.wind_res as u16)
        .h(a.earth_res as u16)
        .d(0)
        .finish()
}

pub fn exp(level: i32, exp: i64) -> Vec<u8> {
    PacketWriter::new(S_EXP).c(level.clamp(0, 255) as u8).d(exp as i32).finish()
}

pub fn hit_point(hp: i32, max: i32) -> Vec<u8> {
    PacketWriter::new(S_HIT_POINT).h(hp.max(0) as u16).h(max.max(0) as u16).finish()
}

pub fn mana_point(mp: i32, max: i32) -> Vec<u8> {
    PacketWriter::new(S_MANA_POINT).h(mp.max(0) as u16).h(max.max(0) as u16).finish()
}

pub fn ability_scores(p: &Player) -> Vec<u8> {
    let a = &p.attr;
    PacketWriter::new(S_ABILITY_SCORES)
        .c(a.ac as i8 as u8)
        .h(a.fire_res as u16)
        .h(a.water_res as u16)
        .h(a.wind_res as u16)
        .h(a.earth_res as u16)
        .finish()
}

pub fn magic_status(sp: i32, mr: i32) -> Vec<u8> {
    PacketWriter::new(S_MAGIC_STATUS).c(sp.clamp(0, 255) as u8).h(mr.max(0) as u16).finish()
}

pub fn lawful(id: i32, lawful: i32) -> Vec<u8> {
    PacketWriter::new(S_LAWFUL).d(id).h(lawful as u16).d(0).finish()
}

/// Speed icon: kind 0 normal, 1 haste, 2 slow. Duration 0 cancels.
pub fn speed(id: i32, kind: u8, secs: u16) -> Vec<u8> {
    PacketWriter::new(S_SPEED).d(id).c(kind).h(secs).finish()
}

/// Brave icon: kind 0 off, 1 brave, 3 elf brave, 4 holy walk.
pub fn skill_brave(id: i32, kind: u8, secs: u16) -> Vec<u8> {
    PacketWriter::new(S_SKILL_BRAVE).d(id).c(kind).h(secs).finish()
}

pub fn shield_icon(secs: u16, kind: u8) -> Vec<u8> {
    PacketWriter::new(S_SKILL_ICON_SHIELD).h(secs).c(kind).finish()
}

pub const EVENT_WEIGHT: u8 = 10;
pub const EVENT_FOOD: u8 = 11;
pub const EVENT_BLUE_POTION: u8 = 34;

pub fn event_weight(w242: u8) -> Vec<u8> {
    PacketWriter::new(S_EVENT).c(EVENT_WEIGHT).c(w242).finish()
}

pub fn event_food(food: i32) -> Vec<u8> {
    PacketWriter::new(S_EVENT).c(EVENT_FOOD).c(food.clamp(0, 255) as u8).finish()
}

const EVENT_ADD_EXCLUDE: u8 = 18;
const EVENT_REMOVE_EXCLUDE: u8 = 19;

/// Exclusion list change shown in the client's block window.
pub fn exclude(added: bool, name: &str) -> Vec<u8> {
    let sub = if added { EVENT_ADD_EXCLUDE } else { EVENT_REMOVE_EXCLUDE };
    PacketWriter::new(S_EVENT).c(sub).s(name).finish()
}

pub fn event_icon(icon: u8, secs: u16) -> Vec<u8> {
    PacketWriter::new(S_EVENT).c(icon).h(secs).finish()
}

pub fn wisdom_icon(secs: u16) -> Vec<u8> {
    PacketWriter::new(S_EVENT).c(0x39).c(0x2c).h(secs).finish()
}

pub fn paralysis(sub: u8) -> Vec<u8> {
    PacketWriter::new(S_PARALYSIS).c(sub).finish()
}

/// Locks or releases the client for the respec window.
pub fn reset_freeze(on: bool) -> Vec<u8> {
    PacketWriter::new(S_PARALYSIS).c(4).c(u8::from(on)).finish()
}

pub fn teleport_unlock() -> Vec<u8> {
    paralysis(TELEPORT_UNLOCK)
}

/// S_PARALYSIS sub-codes for paralysis poison.
pub const PARALYSIS_POISON_ON: u8 = 0x04;
pub const PARALYSIS_POISON_OFF: u8 = 0x05;

/// Tints a character: 0 clears, 1 green (poisoned), 2 grey (frozen).
pub fn poison(obj_id: i32, tint: u8) -> Vec<u8> {
    let (green, grey) = match tint {
        1 => (1, 0),
        2 => (0, 1),
        _ => (0, 0),
    };
    PacketWriter::new(S_POISON).d(obj_id).c(green).c(grey).finish()
}

pub fn skill_list(spells: &[i32], bitmask_of: impl Fn(i32) -> Option<(i32, i32)>) -> Vec<u8> {
    // 28 rows of bitmasks, one bit per column.
    let mut rows = [0u8; 28];
    for &id in spells {
        if let Some((row, bit)) = bitmask_of(id) {
            if let Some(slot) = rows.get_mut(row as usize) {
                *slot |= bit as u8;
            }
        }
    }
    PacketWriter::new(S_SKILL_LIST).c(rows.len() as u8).bytes(&rows).c(0).finish()
}

/// Magic-shop offer: `[D 100][H count][D skill id]...`.
pub fn skill_buy(skill_ids: &[i32]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_SKILL_BUY).d(100).h(skill_ids.len() as u16);
    for id in skill_ids {
        w = w.d(*id);
    }
    w.finish()
}

pub fn str_up(secs: u16, value: u8, kind: u8) -> Vec<u8> {
    PacketWriter::new(S_STR_UP).h(secs).c(value).c(kind).finish()
}

pub fn dex_up(secs: u16, value: u8, kind: u8) -> Vec<u8> {
    PacketWriter::new(S_DEX_UP).h(secs).c(value).c(kind).finish()
}

// ─── World / environment ────────────────────────────────────────────────────

pub fn world_map(map_id: i16) -> Vec<u8> {
    PacketWriter::new(S_WORLD).h(map_id as u16).c(0).d(0).d(0).d(0).finish()
}

pub fn weather(w: u8) -> Vec<u8> {
    PacketWriter::new(S_WEATHER).c(w).finish()
}

pub fn game_time(secs: i32) -> Vec<u8> {
    PacketWriter::new(S_TIME).d(secs).finish()
}

/// Client-side settings blob saved by the client itself: `[C 41][D len][bytes]`.
pub fn character_config(blob: &[u8]) -> Vec<u8> {
    PacketWriter::new(S_EVENT).c(41).d(blob.len() as i32).bytes(blob).finish()
}

/// Tile passability override; doors send these for every tile they span.
pub fn change_attr(x: i32, y: i32, dir: u8, blocked: bool) -> Vec<u8> {
    PacketWriter::new(S_CHANGE_ATTR).h(x as u16).h(y as u16).c(dir).c(if blocked { 0x41 } else { 0x00 }).finish()
}

pub fn sound(obj_id: i32, id: u16) -> Vec<u8> {
    PacketWriter::new(S_SOUND_EFFECT).d(obj_id).h(id).finish()
}

// ─── Chat / messages ────────────────────────────────────────────────────────

pub const CHAT_NORMAL: u8 = 0;
pub const CHAT_SHOUT: u8 = 2;
pub const CHAT_GLOBAL: u8 = 3;

pub fn message_code(msg: u16, args: &[&str]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_MESSAGE_CODE).h(msg).c(args.len() as u8);
    for a in args {
        w = w.s(a);
    }
    w.finish()
}

pub fn say(id: i32, text: &str) -> Vec<u8> {
    PacketWriter::new(S_SAY).c(CHAT_NORMAL).d(id).s(text).finish()
}

pub fn shout(id: i32, text: &str, x: i32, y: i32) -> Vec<u8> {
    PacketWriter::new(S_SAY).c(CHAT_SHOUT).d(id).s(text).h(x as u16).h(y as u16).finish()
}

pub fn global_chat(text: &str) -> Vec<u8> {
    PacketWriter::new(S_MESSAGE).c(CHAT_GLOBAL).s(text).finish()
}

pub fn system_message(text: &str) -> Vec<u8> {
    PacketWriter::new(S_MESSAGE).c(MSG_SYSTEM).s(text).finish()
}

pub fn tell(sender: &str, text: &str) -> Vec<u8> {
    PacketWriter::new(S_TELL).s(sender).s(text).finish()
}

pub fn yes_no(counter: i32, msg_type: u16, arg: &str) -> Vec<u8> {
    PacketWriter::new(S_YES_NO).h(0).d(counter).h(msg_type).s(arg).finish()
}

pub fn hypertext(obj_id: i32, html_id: &str) -> Vec<u8> {
    PacketWriter::new(S_HYPERTEXT).d(obj_id).s(html_id).finish()
}

/// Dialog with substitution strings, e.g. the companion control panels.
pub fn hypertext_args(obj_id: i32, html_id: &str, args: &[String]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_HYPERTEXT).d(obj_id).s(html_id).c(0).h(args.len() as u16);
    for a in args {
        w = w.s(a);
    }
    w.finish()
}

/// Amount dialog for crafting several sets at once.
pub fn input_amount(npc_obj: i32, max: i32, action: &str) -> Vec<u8> {
    let suffix = action.strip_prefix("request ").unwrap_or(action);
    PacketWriter::new(S_INPUT_AMOUNT)
        .d(npc_obj)
        .d(0)
        .d(0)
        .d(0)
        .d(max)
        .h(0)
        .s("request")
        .s(suffix)
        .finish()
}

// ─── Party ──────────────────────────────────────────────────────────────────

const EVENT_PARTY_LIST: u8 = 0x68;
const EVENT_PARTY_NEW_MEMBER: u8 = 0x69;
const EVENT_PARTY_LEADER: u8 = 0x6a;
const EVENT_PARTY_POSITIONS: u8 = 0x6e;

/// Member roster for someone who just joined, leader first.
pub fn party_members(members: &[&Player]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_EVENT).c(EVENT_PARTY_LIST).c(members.len().saturating_sub(1) as u8);
    for m in members {
        w = w
            .d(m.char_id)
            .s(&m.name)
            .c(crate::game::party::hp_percent(m.hp, m.attr.max_hp) as u8)
            .d(i32::from(m.map_id))
            .h(m.x as u16)
            .h(m.y as u16);
    }
    w.c(0).finish()
}

pub fn party_new_member(m: &Player) -> Vec<u8> {
    PacketWriter::new(S_EVENT)
        .c(EVENT_PARTY_NEW_MEMBER)
        .d(m.char_id)
        .s(&m.name)
        .d(i32::from(m.map_id))
        .h(m.x as u16)
        .h(m.y as u16)
        .finish()
}

pub fn party_leader(leader_id: i32) -> Vec<u8> {
    PacketWriter::new(S_EVENT).c(EVENT_PARTY_LEADER).d(leader_id).h(0).finish()
}

/// Minimap positions of every member.
pub fn party_positions(members: &[&Player]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_EVENT).c(EVENT_PARTY_POSITIONS).c(members.len() as u8);
    for m in members {
        w = w.d(m.char_id).d(i32::from(m.map_id)).h(m.x as u16).h(m.y as u16);
    }
    w.c(0xff).c(0xff).finish()
}

/// The `party` dialog: leader name and a space separated roster.
pub fn party_html(obj_id: i32, leader: &str, names: &str) -> Vec<u8> {
    PacketWriter::new(S_HYPERTEXT).d(obj_id).s("party").h(1).h(2).s(leader).s(names).finish()
}

// ─── Clan ───────────────────────────────────────────────────────────────────

const CLAN_JOINED: u8 = 0x0a;
const CLAN_LEFT: u8 = 0x0b;

/// Updates the clan name shown over a character.
pub fn clan_name(obj_id: i32, name: &str, clan_id: i32, joined: bool) -> Vec<u8> {
    let (flag, id) = if joined { (CLAN_JOINED, clan_id) } else { (CLAN_LEFT, 0) };
    PacketWriter::new(S_CLANNAME).d(obj_id).s(name).d(0).c(0).c(0).c(flag).d(id).finish()
}

pub fn char_title(obj_id: i32, title: &str) -> Vec<u8> {
    PacketWriter::new(S_CHAR_TITLE).d(obj_id).s(title).finish()
}

/// Makes the client refresh its clan emblem state.
pub fn clan_attention() -> Vec<u8> {
    PacketWriter::new(S_CLAN_ATTENTION).d(2).finish()
}

// ─── Inventory ──────────────────────────────────────────────────────────────

fn item_body(w: PacketWriter, it: &InvItem) -> PacketWriter {
    let bless = if it.identified { it.bless.clamp(0, 255) as u8 } else { 3 };
    w.d(it.obj_id)
        .h(0)
        .c(it.use_type)
        .c(0)
        .h(it.inv_gfx as u16)
        .c(bless)
        .d(it.count)
        .c(u8::from(it.identified))
        .s(&it.view_name())
        .c(0)
        .c(0x17)
        .c(0)
        .h(0)
        .h(0)
        .c(it.enchant as i8 as u8)
        .d(it.obj_id)
        .d(0)
        .d(0)
        .d(7)
        .c(0)
}

pub fn add_item(it: &InvItem) -> Vec<u8> {
    item_body(PacketWriter::new(S_ADD_ITEM), it).finish()
}

pub fn inventory_batch<'a>(items: impl ExactSizeIterator<Item = &'a InvItem>) -> Vec<u8> {
    let mut w = PacketWriter::new(S_ADD_INVENTORY_BATCH).c(items.len().min(255) as u8);
    for it in items.take(255) {
        w = item_body(w, it);
    }
    w.finish()
}

pub fn remove_inventory(obj_id: i32) -> Vec<u8> {
    PacketWriter::new(S_REMOVE_INVENTORY).d(obj_id).finish()
}

/// Count or equip-state change of an item already in the client's bag.
pub fn change_item_use(it: &InvItem) -> Vec<u8> {
    PacketWriter::new(S_CHANGE_ITEM_USE).d(it.obj_id).s(&it.view_name()).d(it.count).c(0).finish()
}

pub fn change_item_desc(it: &InvItem) -> Vec<u8> {
    PacketWriter::new(S_CHANGE_ITEM_DESC).d(it.obj_id).s(&it.view_name()).finish()
}

// ─── Trade ──────────────────────────────────────────────────────────────────

pub fn trade_open(partner: &str) -> Vec<u8> {
    PacketWriter::new(S_TRADE).d(0).s(partner).finish()
}

/// `panel` 0 = own side, 1 = partner side.
pub fn trade_add_item(panel: u8, gfx: i32, view_name: &str, bless: i32) -> Vec<u8> {
    PacketWriter::new(S_TRADE_ADD_ITEM).c(panel).h(gfx as u16).s(view_name).c(bless.clamp(0, 255) as u8).c(0).h(0).finish()
}

pub const TRADE_DONE: u8 = 0;
pub const TRADE_CANCELLED: u8 = 1;

pub fn trade_status(code: u8) -> Vec<u8> {
    PacketWriter::new(S_TRADE_STATUS).c(code).finish()
}

// ─── Warehouse ──────────────────────────────────────────────────────────────

/// Client window type byte for a warehouse kind.
pub fn retrieve_list_type(wh_type: i16) -> u8 {
    match wh_type {
        crate::repo::WH_TYPE_ELF => 9,
        crate::repo::WH_TYPE_CHARACTER => 18,
        other => other as u8,
    }
}

/// `names` supplies the template name and use type for each row.
pub fn retrieve_list(npc_id: i32, wh_type: i16, items: &[(i32, &WarehouseItem)], names: impl Fn(i32) -> (String, u8, i32), fee: i32) -> Vec<u8> {
    let mut w = PacketWriter::new(S_RETRIEVE_LIST).d(npc_id).h(items.len() as u16).c(retrieve_list_type(wh_type));
    for &(temp_id, it) in items {
        let (name, use_type, gfx) = names(it.item_id);
        let view = match it.enchant_lvl {
            0 => name,
            e if e > 0 => format!("+{} {}", e, name),
            e => format!("{} {}", e, name),
        };
        let use_type = if wh_type == crate::repo::WH_TYPE_ELF { 0 } else { use_type };
        w = w
            .d(temp_id)
            .c(use_type)
            .h(gfx as u16)
            .c(it.bless.clamp(0, 255) as u8)
            .d(it.count)
            .c(u8::from(it.identified))
            .s(&view);
    }
    if wh_type != crate::repo::WH_TYPE_ELF {
        w = w.d(fee);
    }
    w.finish()
}

// ─── Bookmarks ──────────────────────────────────────────────────────────────

pub fn add_bookmark(b: &BookmarkRow) -> Vec<u8> {
    PacketWriter::new(S_ADD_BOOKMARK).s(&b.name).h(b.map_id as u16).d(b.id).h(b.x as u16).h(b.y as u16).finish()
}

/// Bulk bookmark list sent on enter-world.
pub fn bookmark_list<'a>(marks: impl ExactSizeIterator<Item = &'a BookmarkRow>) -> Vec<u8> {
    let marks: Vec<&BookmarkRow> = marks.collect();
    let mut slots = [0u8; 127];
    for (i, slot) in slots.iter_mut().enumerate().take(marks.len()) {
        *slot = i as u8;
    }
    let mut w = PacketWriter::new(S_CHAR_RESET)
        .c(0x2a)
        .c(0x80)
        .c(0x00)
        .c(0x02)
        .bytes(&slots)
        .c(0x3c)
        .c(0)
        .c(marks.len() as u8)
        .c(0);
    for b in marks {
        w = w.h(b.x as u16).h(b.y as u16).s(&b.name).h(b.map_id as u16).d(b.id);
    }
    w.finish()
}

// ─── Character reset / stat allocation ──────────────────────────────────────

/// Opens the respec window with the class's starting HP/MP.
pub fn char_reset_open(init_hp: i32, init_mp: i32, max_level: i32) -> Vec<u8> {
    PacketWriter::new(S_CHAR_RESET).c(1).h(init_hp as u16).h(init_mp as u16).c(10).c(max_level.clamp(0, 255) as u8).finish()
}

/// Stage 2 level step acknowledgement with the running totals.
pub fn char_reset_level(level: i32, max_level: i32, hp: i32, mp: i32, ac: i32, stats: &SixStats) -> Vec<u8> {
    let mut w = PacketWriter::new(S_CHAR_RESET)
        .c(2)
        .c(level.clamp(0, 255) as u8)
        .c(max_level.clamp(0, 255) as u8)
        .h(hp as u16)
        .h(mp as u16)
        .h(ac as i16 as u16);
    for v in [stats.str, stats.intel, stats.wis, stats.dex, stats.con, stats.cha] {
        w = w.c(v.clamp(0, 255) as u8);
    }
    w.finish()
}

/// Elixir stage request.
pub fn char_reset_elixir(points: i32) -> Vec<u8> {
    PacketWriter::new(S_CHAR_RESET).c(3).c(points.clamp(0, 255) as u8).finish()
}

/// Stat allocation dialog id; reopened while bonus points remain.
pub const HTML_BONUS_STATS: &str = "RaiseAttr";

// ─── Board / mail ───────────────────────────────────────────────────────────

pub fn board_list(board_id: i32, posts: &[BoardPost]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_BOARD).c(0).d(board_id).c(posts.len() as u8);
    for p in posts {
        w = w.d(p.id).s(&p.name).s(&p.date).s(&p.title);
    }
    w.finish()
}

pub fn board_read(p: &BoardPost) -> Vec<u8> {
    PacketWriter::new(S_BOARD_READ).d(p.id).s(&p.name).s(&p.title).s(&p.date).s(&p.content).finish()
}

pub const MAIL_OPEN_NORMAL: u8 = 0;
pub const MAIL_OPEN_CLAN: u8 = 1;
pub const MAIL_OPEN_STORAGE: u8 = 2;
pub const MAIL_READ_NORMAL: u8 = 16;
pub const MAIL_SEND_NORMAL: u8 = 32;
pub const MAIL_DELETE: u8 = 48;
pub const MAIL_DELETE_BULK: u8 = 96;
pub const MAIL_TO_STORAGE: u8 = 64;
pub const MAIL_NOTIFY: u8 = 80;

/// Mailbox listing. Copies `me` sent show the receiver instead of the sender.
pub fn mail_list(kind: u8, me: &str, mails: &[MailRow]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_MAIL).c(kind).h(mails.len() as u16);
    for m in mails {
        w = w.d(m.id).c(u8::from(m.read_status != 0)).d(m.date as i32);
        w = if m.sender == me { w.c(1).s(&m.receiver) } else { w.c(0).s(&m.sender) };
        w = w.bytes(&m.subject).c(0).c(0);
    }
    w.finish()
}

pub fn mail_read(kind: u8, m: &MailRow) -> Vec<u8> {
    PacketWriter::new(S_MAIL).c(kind).d(m.id).bytes(&m.content).c(0).c(0).finish()
}

/// Result of send / delete / move: `[C kind][D id][C ok]`.
pub fn mail_result(kind: u8, id: i32, ok: bool) -> Vec<u8> {
    PacketWriter::new(S_MAIL).c(kind).d(id).c(u8::from(ok)).finish()
}

/// New-mail notice. `own_copy` marks the sender's stored copy.
pub fn mail_notify(m: &MailRow, own_copy: bool) -> Vec<u8> {
    PacketWriter::new(S_MAIL).c(MAIL_NOTIFY).d(m.id).c(u8::from(own_copy)).s(&m.sender).bytes(&m.subject).c(0).c(0).finish()
}

// ─── Shop ───────────────────────────────────────────────────────────────────

pub fn sell_list(npc_id: i32, items: &[(i32, String, i32, i32)]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_SELL_LIST).d(npc_id).h(items.len() as u16);
    for (i, (_item_id, name, gfx, price)) in items.iter().enumerate() {
        w = w.d(i as i32).h(*gfx as u16).d(*price).s(name).c(0);
    }
    w.finish()
}

pub fn shop_sell_list(npc_id: i32, offers: &[(i32, i32)]) -> Vec<u8> {
    let mut w = PacketWriter::new(S_SHOP_SELL_LIST).d(npc_id).h(offers.len() as u16);
    for &(obj_id, price) in offers {
        w = w.d(obj_id).d(price);
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PacketReader;

    #[test]
    fn test_move_object_layout() {
        let pkt = move_object(200_000_001, 100, 101, 2);
        assert_eq!(pkt[0], S_MOVE_OBJECT);
        assert_eq!(pkt.len() % 4, 0);
        let mut r = PacketReader::new(&pkt);
        assert_eq!(r.read_d(), 200_000_001);
        assert_eq!(r.read_h(), 100);
        assert_eq!(r.read_h(), 101);
        assert_eq!(r.read_c(), 2);
    }

    #[test]
    fn test_enter_world_check_without_clan() {
        let pkt = enter_world_check(None);
        assert_eq!(&pkt[..8], &[S_ENTER_WORLD_CHECK, 0x03, 0x53, 0x01, 0x00, 0x8b, 0x9c, 0x1f]);
    }

    #[test]
    fn test_message_code_args() {
        let pkt = message_code(82, &["a"]);
        let mut r = PacketReader::new(&pkt);
        assert_eq!(r.read_h(), 82);
        assert_eq!(r.read_c(), 1);
        assert_eq!(r.read_s(), "a");
    }

    #[test]
    fn test_bookmark_list_slot_array() {
        let rows = vec![
            BookmarkRow { id: 1, name: "home".into(), x: 10, y: 20, map_id: 4 },
            BookmarkRow { id: 2, name: "pit".into(), x: 11, y: 21, map_id: 4 },
        ];
        let pkt = bookmark_list(rows.iter());
        let mut r = PacketReader::new(&pkt);
        assert_eq!(r.read_c(), 0x2a);
        r.read_bytes(3);
        let slots = r.read_bytes(127);
        assert_eq!(&slots[..3], &[0, 1, 0]);
        assert_eq!(r.read_c(), 0x3c);
        r.read_c();
        assert_eq!(r.read_c(), 2);
    }

    #[test]
    fn test_character_info_checksum() {
        let row = CharacterRow { name: "Ann".into(), level: 5, str: 1, dex: 2, con: 4, wis: 8, cha: 16, intel: 32, ..Default::default() };
        let pkt = character_info(&row);
        assert_eq!(pkt[0], S_CHARACTER_INFO);
        let mut r = PacketReader::new(&pkt);
        r.read_s();
        r.read_s();
        r.read_bytes(2);
        r.read_bytes(6);
        r.read_c();
        r.read_bytes(7);
        r.read_c();
        r.read_d();
        assert_eq!(r.read_c(), 5 ^ 1 ^ 2 ^ 4 ^ 8 ^ 16 ^ 32);
    }

    #[test]
    fn test_poison_tint_bytes() {
        assert_eq!(&poison(7, 1)[..7], &[S_POISON, 7, 0, 0, 0, 1, 0]);
        assert_eq!(&poison(7, 2)[5..7], &[0, 1]);
        assert_eq!(&poison(7, 0)[5..7], &[0, 0]);
    }

    #[test]
    fn test_input_amount_strips_request_prefix() {
        let pkt = input_amount(9, 12, "request oak wand");
        let mut r = PacketReader::new(&pkt);
        assert_eq!(r.read_d(), 9);
        r.read_bytes(12);
        assert_eq!(r.read_d(), 12);
        assert_eq!(r.read_h(), 0);
        assert_eq!(r.read_s(), "request");
        assert_eq!(r.read_s(), "oak wand");
    }
}
