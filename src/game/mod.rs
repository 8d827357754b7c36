//! Authoritative world state and the rules that mutate it.
//!
//! Nothing here touches a socket. Handlers and tick systems in
//! `servers::map` drive these types while holding the world lock.

pub mod aoi;
pub mod bookmark;
pub mod buff;
pub mod char_reset;
pub mod clan;
pub mod companion;
pub mod door;
pub mod equipment;
pub mod event;
pub mod ground;
pub mod ids;
pub mod inventory;
pub mod known;
pub mod npc;
pub mod occupancy;
pub mod party;
pub mod player;
pub mod poison;
pub mod scripting;
pub mod ship;
pub mod stats;
pub mod trade;
pub mod world;

pub use player::Player;
pub use scripting::{Scripting, StdFormulas};
pub use world::{AttackKind, AttackRequest, EntityRef, World};

/// Every kind of entity a client can have on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Npc,
    Summon,
    Pet,
    Doll,
    Follower,
    Ground,
    Door,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Player,
        EntityKind::Npc,
        EntityKind::Summon,
        EntityKind::Pet,
        EntityKind::Doll,
        EntityKind::Follower,
        EntityKind::Ground,
        EntityKind::Door,
    ];
}
