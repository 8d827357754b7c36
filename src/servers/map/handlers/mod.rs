//! Client packet handlers, one module per feature area.
//!
//! Handlers parse, validate against the world, mutate under the world lock
//! and reply through the player's outbox. Repository work happens after the
//! lock is dropped. Nothing here returns an error to the dispatcher: a bad
//! request is a log line plus, where the client expects one, a message code.

pub mod auth;
pub mod board;
pub mod bookmark;
pub mod chat;
pub mod clan;
pub mod combat;
pub mod companion;
pub mod craft;
pub mod gm;
pub mod ground;
pub mod item;
pub mod mail;
pub mod movement;
pub mod npc;
pub mod party;
pub mod skill;
pub mod spellshop;
pub mod stats;
pub mod trade;
pub mod travel;
pub mod warehouse;

use crate::database::ItemTemplate;
use crate::game::inventory::{AddOutcome, Removal};
use crate::game::player::Player;
use crate::game::world::World;

use super::packets;

// Message codes shared by several handlers.
pub const MSG_NOT_ENOUGH_ADENA: u16 = 189;
pub const MSG_INVENTORY_FULL: u16 = 263;
pub const MSG_OVERWEIGHT: u16 = 82;
pub const MSG_NOTHING_HAPPENS: u16 = 79;
pub const MSG_NOT_ENOUGH_MP: u16 = 278;
pub const MSG_NOT_ENOUGH_HP: u16 = 279;
pub const MSG_NOT_ONLINE: u16 = 73;
pub const MSG_CANNOT_DROP: u16 = 210;

pub(crate) fn send_msg(p: &Player, code: u16) {
    p.outbox.send(packets::message_code(code, &[]));
}

pub(crate) fn send_msg_arg(p: &Player, code: u16, arg: &str) {
    p.outbox.send(packets::message_code(code, &[arg]));
}

/// Tells the client about a removal and the new weight.
pub(crate) fn send_removal(p: &Player, r: &Removal) {
    match r {
        Removal::Gone(it) => p.outbox.send(packets::remove_inventory(it.obj_id)),
        Removal::Reduced { obj_id, .. } => {
            if let Some(it) = p.inventory.find(*obj_id) {
                p.outbox.send(packets::change_item_use(it));
            }
        }
    }
    p.outbox.send(packets::event_weight(p.weight242()));
}

/// Tells the client about an addition and the new weight.
pub(crate) fn send_added(p: &Player, out: AddOutcome) {
    if let Some(it) = p.inventory.find(out.obj_id) {
        if out.stacked {
            p.outbox.send(packets::change_item_use(it));
        } else {
            p.outbox.send(packets::add_item(it));
        }
    }
    p.outbox.send(packets::event_weight(p.weight242()));
}

/// Why an item cannot be handed to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveError {
    Full,
    Overweight,
}

impl GiveError {
    pub fn msg_code(self) -> u16 {
        match self {
            GiveError::Full => MSG_INVENTORY_FULL,
            GiveError::Overweight => MSG_OVERWEIGHT,
        }
    }
}

/// Slot and weight checks for adding `count` of `tpl`.
pub(crate) fn can_receive(p: &Player, tpl: &ItemTemplate, count: i32) -> Result<(), GiveError> {
    if p.inventory.needs_slot(tpl) {
        return Err(GiveError::Full);
    }
    let weight = if tpl.weight == 0 { 0 } else { (count.saturating_mul(tpl.weight) / 1000).max(1) };
    if p.inventory.would_overweight(weight, p.max_weight()) {
        return Err(GiveError::Overweight);
    }
    Ok(())
}

/// Adds a fresh item to a player's bag and notifies the client.
pub(crate) fn give_item(w: &mut World, sid: u64, tpl: &ItemTemplate, count: i32, enchant: i32) -> Option<AddOutcome> {
    let World { ids, players, .. } = w;
    let p = players.get_mut(&sid)?;
    let out = p.inventory.add(ids, tpl, count, enchant, tpl.bless.max(1), true);
    p.mark_dirty();
    send_added(p, out);
    Some(out)
}

/// Takes `amount` adena. False (and nothing taken) when short.
pub(crate) fn pay_adena(p: &mut Player, amount: i32) -> bool {
    if amount <= 0 {
        return true;
    }
    if p.inventory.adena() < amount {
        return false;
    }
    match p.inventory.consume(crate::game::inventory::ADENA_ITEM_ID, amount) {
        Some(r) => {
            send_removal(p, &r);
            p.mark_dirty();
            true
        }
        None => false,
    }
}

/// Full status refresh after a stat change.
pub(crate) fn send_status(p: &Player, now_secs: i32) {
    p.outbox.send(packets::status(p, now_secs));
    p.outbox.send(packets::ability_scores(p));
    p.outbox.send(packets::magic_status(p.attr.sp, p.attr.mr));
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for handler and system tests.

    use std::sync::Arc;

    use crate::config::ServerConfig;
    use crate::database::doll_db::DollPower;
    use crate::database::{DollTemplate, ItemCategory, ItemTemplate, NpcTemplate, PetType, StaticData};
    use crate::game::npc::{Npc, SpawnAnchor};
    use crate::game::player::Player;
    use crate::game::scripting::{Scripting, StdFormulas};
    use crate::game::ids::IdKind;
    use crate::game::World;
    use crate::repo::{CharacterRow, MemoryStore, Repos};
    use crate::servers::map::GameServer;
    use crate::session::{Outbox, OutboxReceiver, Session, SessionState};

    use super::companion;

    pub const TEST_CONF: &str = "sql_ip: 127.0.0.1\nsql_id: aden\nsql_pw: aden\nsql_db: aden\ngame_ip: 127.0.0.1\ngame_port: 0\naoi_radius: 15\ngm_accounts: [acc1]\n";

    pub fn data() -> StaticData {
        let mut data = StaticData::default();
        data.maps.insert_uniform(4, 32000, 32000, 2000, 2000, 0x0f);
        data.items.insert(ItemTemplate {
            item_id: crate::game::inventory::ADENA_ITEM_ID,
            name: "Adena".into(),
            stackable: true,
            ..Default::default()
        });
        data.items.insert(ItemTemplate {
            item_id: 40010,
            name: "Healing Potion".into(),
            stackable: true,
            weight: 10,
            ..Default::default()
        });
        data.items.insert(ItemTemplate {
            item_id: 1,
            name: "Sword".into(),
            kind: "sword".into(),
            dmg_small: 10,
            dmg_large: 12,
            weight: 1000,
            use_knight: true,
            use_royal: true,
            category: ItemCategory::Weapon,
            ..Default::default()
        });
        data.npcs.insert(NpcTemplate {
            npc_id: 45001,
            name: "Orc".into(),
            nameid: "Orc".into(),
            impl_type: "L1Monster".into(),
            hp: 50,
            level: 20,
            exp: 100,
            ..Default::default()
        });
        for (item_id, name) in [(companion::PET_COLLAR, "Pet Amulet"), (companion::PET_COLLAR_HIGHER, "High Pet Amulet"), (TAMING_MEAT, "Meat"), (EVOLVE_FRUIT, "Fruit")] {
            data.items.insert(ItemTemplate { item_id, name: name.into(), stackable: item_id == TAMING_MEAT, ..Default::default() });
        }
        data.items.insert(ItemTemplate {
            item_id: DOLL_ITEM,
            name: "Magic Doll".into(),
            item_type: "magic_doll".into(),
            ..Default::default()
        });
        data.dolls.insert(DollTemplate {
            item_id: DOLL_ITEM,
            name: "Bugbear Doll".into(),
            gfx_id: 3800,
            duration: 60,
            powers: vec![DollPower { kind: "ac".into(), value: 2, chance: 0 }],
            ..Default::default()
        });
        data.npcs.insert(NpcTemplate { npc_id: DOG, name: "Doberman".into(), hp: 90, level: 6, tameable: true, ..Default::default() });
        data.npcs.insert(NpcTemplate { npc_id: HIGH_DOG, name: "High Doberman".into(), hp: 200, level: 1, ac: -5, ..Default::default() });
        data.pet_types.insert(PetType {
            npc_id: DOG,
            name: "Doberman".into(),
            taming_item_id: TAMING_MEAT,
            evolv_item_id: EVOLVE_FRUIT,
            evolv_npc_id: HIGH_DOG,
            hp_up_min: 2,
            hp_up_max: 2,
            can_equip: true,
            ..Default::default()
        });
        data
    }

    pub const TAMING_MEAT: i32 = 40057;
    pub const EVOLVE_FRUIT: i32 = 40070;
    pub const DOLL_ITEM: i32 = 41248;
    pub const DOG: i32 = 45034;
    pub const HIGH_DOG: i32 = 45686;

    /// A tameable dog at full health.
    pub fn dog(w: &mut World, x: i32, y: i32) -> i32 {
        let tpl = NpcTemplate { npc_id: DOG, name: "Doberman".into(), hp: 90, level: 6, tameable: true, ..Default::default() };
        let id = w.ids.next(IdKind::Npc);
        let anchor = SpawnAnchor { map_id: 4, x, y, respawn_secs: 30, ..Default::default() };
        w.add_npc(Npc::from_template(id, &tpl, anchor, x, y))
    }

    pub fn server_from(data: StaticData, scripting: Arc<dyn Scripting>) -> (Arc<GameServer>, Arc<MemoryStore>) {
        let (repos, store): (Repos, Arc<MemoryStore>) = Repos::memory();
        let config = ServerConfig::from_str(TEST_CONF).expect("test config");
        (GameServer::new(config, Arc::new(data), repos, scripting), store)
    }

    pub fn server_with(scripting: Arc<dyn Scripting>) -> (Arc<GameServer>, Arc<MemoryStore>) {
        server_from(data(), scripting)
    }

    pub fn server() -> (Arc<GameServer>, Arc<MemoryStore>) {
        server_with(Arc::new(StdFormulas))
    }

    pub fn row(char_id: i32, x: i32, y: i32) -> CharacterRow {
        CharacterRow {
            id: char_id,
            account_name: format!("acc{}", char_id),
            name: format!("p{}", char_id),
            class_type: crate::game::player::CLASS_KNIGHT,
            class_id: 61,
            str: 20,
            dex: 14,
            con: 16,
            wis: 10,
            cha: 14,
            intel: 10,
            level: 30,
            hp: 200,
            mp: 30,
            max_hp: 250,
            max_mp: 40,
            x,
            y,
            map_id: 4,
            food: 40,
            ..Default::default()
        }
    }

    /// An in-world session plus its player, with the player placed in `w`.
    pub fn join(w: &mut World, char_id: i32, x: i32, y: i32) -> (Arc<Session>, OutboxReceiver) {
        let (sess, rx) = Session::new(char_id as u64 + 1000, "test".into(), 1024);
        sess.set_state(SessionState::InWorld);
        sess.set_account(Some(format!("acc{}", char_id)));
        w.add_player(Player::from_row(&row(char_id, x, y), sess.id, sess.outbox(), false));
        (sess, rx)
    }

    /// A player without a session, for world-only tests.
    pub fn detached(w: &mut World, sid: u64, char_id: i32, x: i32, y: i32) -> OutboxReceiver {
        let (outbox, rx) = Outbox::detached(sid);
        w.add_player(Player::from_row(&row(char_id, x, y), sid, outbox, false));
        rx
    }

    pub fn orc(w: &mut World, x: i32, y: i32) -> i32 {
        let tpl = NpcTemplate {
            npc_id: 45001,
            name: "Orc".into(),
            nameid: "Orc".into(),
            impl_type: "L1Monster".into(),
            hp: 50,
            level: 20,
            exp: 100,
            ..Default::default()
        };
        let id = w.ids.next(IdKind::Npc);
        let anchor = SpawnAnchor { map_id: 4, x, y, respawn_secs: 30, ..Default::default() };
        w.add_npc(Npc::from_template(id, &tpl, anchor, x, y))
    }

    /// Puts `count` of `tpl` straight into the bag, without packets.
    pub fn give(w: &mut World, sid: u64, tpl: &ItemTemplate, count: i32) -> i32 {
        let World { ids, players, .. } = w;
        players.get_mut(&sid).expect("player").inventory.add(ids, tpl, count, 0, 1, true).obj_id
    }

    pub fn ops(rx: &mut OutboxReceiver) -> Vec<u8> {
        rx.drain().iter().map(|p| p[0]).collect()
    }
}
