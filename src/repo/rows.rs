//! Plain row structs exchanged with the repositories.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct AccountRow {
    pub name: String,
    pub password_hash: String,
    pub access_level: i16,
    pub ip: String,
    pub banned: bool,
    pub online: bool,
    /// 0 = no password set
    pub warehouse_password: i32,
    /// unix seconds
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterRow {
    pub id: i32,
    pub account_name: String,
    pub name: String,
    pub class_type: i16,
    pub sex: i16,
    pub class_id: i32,
    pub str: i16,
    pub dex: i16,
    pub con: i16,
    pub wis: i16,
    pub cha: i16,
    pub intel: i16,
    pub level: i16,
    pub exp: i64,
    pub hp: i16,
    pub mp: i16,
    pub max_hp: i16,
    pub max_mp: i16,
    pub ac: i16,
    pub x: i32,
    pub y: i32,
    pub map_id: i16,
    pub heading: i16,
    pub lawful: i32,
    pub title: String,
    pub clan_id: i32,
    pub clan_name: String,
    pub clan_rank: i16,
    pub pk_count: i32,
    pub karma: i32,
    pub bonus_stats: i16,
    pub elixir_stats: i16,
    pub food: i16,
    pub access_level: i16,
    /// yyyymmdd
    pub birthday: i32,
    /// unix seconds; set by soft delete
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRow {
    pub id: i32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub map_id: i16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemRow {
    pub char_id: i32,
    pub item_id: i32,
    pub count: i32,
    pub enchant_lvl: i16,
    pub bless: i16,
    pub equipped: bool,
    pub identified: bool,
    pub equip_slot: i16,
    /// Persisted object id so client shortcut bars survive relogs.
    pub obj_id: i32,
    pub durability: i16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PetRow {
    pub item_obj_id: i32,
    pub npc_id: i32,
    pub name: String,
    pub level: i16,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub exp: i64,
    pub lawful: i32,
}

#[derive(Debug, Clone, Default)]
pub struct BoardPost {
    pub id: i32,
    pub name: String,
    /// yyyy/mm/dd
    pub date: String,
    pub title: String,
    pub content: String,
}

pub const MAIL_TYPE_NORMAL: i16 = 0;
pub const MAIL_TYPE_CLAN: i16 = 1;
pub const MAIL_TYPE_STORAGE: i16 = 2;

#[derive(Debug, Clone, Default)]
pub struct MailRow {
    pub id: i32,
    pub mail_type: i16,
    pub sender: String,
    pub receiver: String,
    /// unix seconds
    pub date: i64,
    pub read_status: i16,
    /// Character whose mailbox holds this copy.
    pub inbox_id: i32,
    /// Raw client bytes (UTF-16LE), without the two-byte terminator.
    pub subject: Vec<u8>,
    pub content: Vec<u8>,
}

pub const WH_TYPE_PERSONAL: i16 = 3;
pub const WH_TYPE_ELF: i16 = 4;
pub const WH_TYPE_CLAN: i16 = 5;
pub const WH_TYPE_CHARACTER: i16 = 6;

#[derive(Debug, Clone, Default)]
pub struct WarehouseItem {
    pub id: i32,
    /// Account name, or clan name for the clan warehouse.
    pub account_name: String,
    pub char_name: String,
    pub wh_type: i16,
    pub item_id: i32,
    pub count: i32,
    pub enchant_lvl: i16,
    pub bless: i16,
    pub identified: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClanWarehouseHistory {
    pub char_name: String,
    /// 0 = deposit, 1 = withdraw
    pub kind: i16,
    pub item_name: String,
    pub item_count: i32,
    pub minutes_ago: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ClanRow {
    pub clan_id: i32,
    pub clan_name: String,
    pub leader_id: i32,
    pub leader_name: String,
    pub found_date: i64,
    pub has_castle: i32,
    pub has_house: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ClanMemberRow {
    pub clan_id: i32,
    pub char_id: i32,
    pub char_name: String,
    pub rank: i16,
}
