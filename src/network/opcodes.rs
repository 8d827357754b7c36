//! 3.80C Taiwan opcode table.

// ============================================
// Client -> server
// ============================================
pub const C_ASK_XCHG: u8 = 2;
pub const C_DELETE_BOOKMARK: u8 = 3;
pub const C_USE_SPELL: u8 = 6;
pub const C_REQUEST_ROLL: u8 = 7;
pub const C_BOARD: u8 = 10;
pub const C_HYPERTEXT_INPUT_RESULT: u8 = 11;
pub const C_WAREHOUSE_PASSWORD: u8 = 13;
pub const C_VERSION: u8 = 14;
pub const C_COMMON_CLICK: u8 = 16;
pub const C_BOARD_BACK: u8 = 23;
pub const C_DROP: u8 = 25;
pub const C_MOVE: u8 = 29;
pub const C_LEAVE_PARTY: u8 = 33;
pub const C_DIALOG: u8 = 34;
pub const C_ADD_XCHG: u8 = 37;
pub const C_BUY_SPELL: u8 = 39;
pub const C_CHAT: u8 = 40;
pub const C_OPEN: u8 = 41;
pub const C_INVITE_PARTY_TARGET: u8 = 43;
pub const C_GIVE: u8 = 45;
pub const C_TELEPORT: u8 = 52;
pub const C_LEAVE_PLEDGE: u8 = 61;
pub const C_BAN_MEMBER: u8 = 69;
pub const C_ACCEPT_XCHG: u8 = 71;
pub const C_CREATE_CHAR: u8 = 84;
pub const C_CANCEL_XCHG: u8 = 86;
pub const C_MAIL: u8 = 87;
pub const C_KEEPALIVE: u8 = 95;
pub const C_CHAR_RESET: u8 = 98;
pub const C_EXCLUDE: u8 = 101;
pub const C_PETMENU: u8 = 103;
pub const C_GET: u8 = 112;
pub const C_BOARD_READ: u8 = 114;
pub const C_LOGIN: u8 = 119;
pub const C_ACTION: u8 = 120;
pub const C_ATTR: u8 = 121;
pub const C_QUIT: u8 = 122;
pub const C_FAR_ATTACK: u8 = 123;
pub const C_NPC_ACTION: u8 = 125;
pub const C_SAY: u8 = 136;
pub const C_ENTER_WORLD: u8 = 137;
pub const C_DESTROY_ITEM: u8 = 138;
pub const C_BOARD_WRITE: u8 = 141;
pub const C_BUYABLE_SPELL: u8 = 145;
pub const C_BOARD_DELETE: u8 = 153;
pub const C_BUY_SELL: u8 = 161;
pub const C_DELETE_CHAR: u8 = 162;
pub const C_USE_ITEM: u8 = 164;
pub const C_BOOKMARK: u8 = 165;
pub const C_RESTART: u8 = 177;
pub const C_TELL: u8 = 184;
pub const C_JOIN_PLEDGE: u8 = 194;
pub const C_ENTER_PORTAL: u8 = 219;
pub const C_CREATE_PLEDGE: u8 = 222;
pub const C_CHANGE_DIRECTION: u8 = 225;
pub const C_ATTACK: u8 = 229;
pub const C_WHO_PARTY: u8 = 230;
pub const C_SHIP: u8 = 231;
pub const C_BANISH_PARTY: u8 = 255;

// ============================================
// Server -> client
// ============================================
pub const S_ADD_INVENTORY_BATCH: u8 = 5;
pub const S_DELETE_CHAR_OK: u8 = 6;
pub const S_STATUS: u8 = 8;
pub const S_MOVE_OBJECT: u8 = 10;
pub const S_ADD_ITEM: u8 = 15;
pub const S_SOUND_EFFECT: u8 = 22;
pub const S_SKILL_BUY: u8 = 23;
pub const S_CHANGE_ITEM_USE: u8 = 24;
pub const S_ATTACK: u8 = 30;
pub const S_LAWFUL: u8 = 34;
pub const S_TRADE_ADD_ITEM: u8 = 35;
pub const S_MAGIC_STATUS: u8 = 37;
pub const S_HYPERTEXT: u8 = 39;
pub const S_HIT_POINT: u8 = 42;
pub const S_LOGIN_CHECK: u8 = 51;
pub const S_TRADE: u8 = 52;
pub const S_EFFECT: u8 = 55;
pub const S_REMOVE_INVENTORY: u8 = 57;
pub const S_CHAR_RESET: u8 = 64;
pub const S_SHOP_SELL_LIST: u8 = 65;
pub const S_SKILL_BRAVE: u8 = 67;
pub const S_BOARD: u8 = 68;
pub const S_SELL_LIST: u8 = 70;
pub const S_MESSAGE_CODE: u8 = 71;
pub const S_CLANNAME: u8 = 72;
pub const S_MANA_POINT: u8 = 73;
pub const S_POLY: u8 = 76;
pub const S_SAY: u8 = 81;
pub const S_PUT_OBJECT: u8 = 87;
pub const S_TELL: u8 = 91;
pub const S_ADD_BOOKMARK: u8 = 92;
pub const S_CHARACTER_INFO: u8 = 93;
pub const S_CHANGE_ITEM_DESC: u8 = 100;
pub const S_CREATE_CHAR_CHECK: u8 = 106;
pub const S_TRADE_STATUS: u8 = 112;
pub const S_EXP: u8 = 113;
pub const S_WEATHER: u8 = 115;
pub const S_CHANGE_DESC: u8 = 119;
pub const S_REMOVE_OBJECT: u8 = 120;
pub const S_CHANGE_HEADING: u8 = 122;
pub const S_TIME: u8 = 123;
pub const S_NEW_CHAR_INFO: u8 = 127;
pub const S_INPUT_AMOUNT: u8 = 136;
pub const S_VERSION_CHECK: u8 = 139;
pub const S_BOARD_READ: u8 = 148;
pub const S_ACTION: u8 = 158;
pub const S_SKILL_LIST: u8 = 164;
pub const S_POISON: u8 = 165;
pub const S_STR_UP: u8 = 166;
pub const S_INVIS: u8 = 171;
pub const S_ABILITY_SCORES: u8 = 174;
pub const S_RETRIEVE_LIST: u8 = 176;
pub const S_NUM_CHARACTER: u8 = 178;
pub const S_CHAR_TITLE: u8 = 183;
pub const S_MAIL: u8 = 186;
pub const S_DEX_UP: u8 = 188;
pub const S_CLAN_ATTENTION: u8 = 200;
pub const S_PARALYSIS: u8 = 202;
pub const S_WORLD: u8 = 206;
pub const S_CHANGE_ATTR: u8 = 209;
pub const S_SKILL_ICON_SHIELD: u8 = 216;
pub const S_YES_NO: u8 = 219;
pub const S_ENTER_WORLD_CHECK: u8 = 223;
pub const S_HP_METER: u8 = 237;
pub const S_MESSAGE: u8 = 243;
pub const S_EVENT: u8 = 250;
pub const S_SPEED: u8 = 255;

/// Human-readable name for logging; unknown values render as their number.
pub fn client_name(op: u8) -> &'static str {
    match op {
        C_VERSION => "C_VERSION",
        C_LOGIN => "C_LOGIN",
        C_ENTER_WORLD => "C_ENTER_WORLD",
        C_MOVE => "C_MOVE",
        C_ATTACK => "C_ATTACK",
        C_FAR_ATTACK => "C_FAR_ATTACK",
        C_CHAT => "C_CHAT",
        C_USE_ITEM => "C_USE_ITEM",
        C_USE_SPELL => "C_USE_SPELL",
        C_QUIT => "C_QUIT",
        C_KEEPALIVE => "C_KEEPALIVE",
        C_CREATE_CHAR => "C_CREATE_CHAR",
        C_DELETE_CHAR => "C_DELETE_CHAR",
        C_RESTART => "C_RESTART",
        C_TELEPORT => "C_TELEPORT",
        C_BUY_SELL => "C_BUY_SELL",
        C_NPC_ACTION => "C_NPC_ACTION",
        C_DIALOG => "C_DIALOG",
        C_WHO_PARTY => "C_WHO_PARTY",
        C_CREATE_PLEDGE => "C_CREATE_PLEDGE",
        C_JOIN_PLEDGE => "C_JOIN_PLEDGE",
        C_ENTER_PORTAL => "C_ENTER_PORTAL",
        C_SHIP => "C_SHIP",
        C_BUY_SPELL => "C_BUY_SPELL",
        C_BUYABLE_SPELL => "C_BUYABLE_SPELL",
        _ => "C_OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_sensitive_opcodes_distinct() {
        assert_ne!(C_MOVE, C_CHANGE_DIRECTION);
        assert_ne!(C_ATTACK, C_FAR_ATTACK);
        assert_eq!(client_name(C_MOVE), "C_MOVE");
        assert_eq!(client_name(200), "C_OTHER");
        assert_ne!(S_TELL, S_SKILL_BRAVE);
    }
}
