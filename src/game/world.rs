//! Authoritative world state.
//!
//! One `World` lives behind the map server's mutex. Handlers and systems
//! take the lock, mutate, and release it before any repository I/O. Entity
//! maps are public for split borrows; additions, removals and position
//! changes go through the methods here so the spatial index and the tile
//! occupancy overlay stay in step with the entity structs.

use std::collections::{HashMap, VecDeque};

use crate::database::{MapTable, NpcTemplate, StaticData};

use super::aoi::{chebyshev, AoiGrid};
use super::clan::Clans;
use super::companion::{Doll, Follower, Pet, Summon};
use super::door::Door;
use super::event::EventBus;
use super::ground::GroundItem;
use super::ids::{IdAllocator, IdKind};
use super::npc::{Npc, SpawnAnchor};
use super::occupancy::EntityGrid;
use super::party::Parties;
use super::player::Player;
use super::EntityKind;

pub type EntityRef = (EntityKind, i32);

/// Tries per NPC when looking for a free spawn tile.
const SPAWN_TRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    Melee,
    Ranged,
    /// Attack skill by id.
    Skill(i32),
}

/// Queued by handlers, drained by the combat system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackRequest {
    pub session_id: u64,
    pub target: i32,
    pub kind: AttackKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRespawn {
    pub npc_id: i32,
    pub anchor: SpawnAnchor,
    pub ticks_left: u32,
}

#[derive(Debug)]
pub struct World {
    pub ids: IdAllocator,
    pub aoi_radius: i32,
    /// Scheduler ticks since start.
    pub tick: u64,
    /// 0 clear, 1..=3 snow, 17..=19 rain
    pub weather: u8,

    pub players: HashMap<u64, Player>,
    char_index: HashMap<i32, u64>,
    name_index: HashMap<String, u64>,

    pub npcs: HashMap<i32, Npc>,
    pub summons: HashMap<i32, Summon>,
    pub pets: HashMap<i32, Pet>,
    pub dolls: HashMap<i32, Doll>,
    pub followers: HashMap<i32, Follower>,
    pub ground: HashMap<i32, GroundItem>,
    pub doors: HashMap<i32, Door>,
    door_tiles: HashMap<(i16, i32, i32), i32>,

    aoi: AoiGrid<EntityRef>,
    occupancy: EntityGrid,

    pub attacks: VecDeque<AttackRequest>,
    pub events: EventBus,
    pub respawns: Vec<PendingRespawn>,
    /// Clan id → character id holding the clan warehouse.
    pub clan_wh_locks: HashMap<i32, i32>,
    pub parties: Parties,
    pub clans: Clans,
}

impl World {
    pub fn new(aoi_radius: i32) -> Self {
        Self {
            ids: IdAllocator::new(),
            aoi_radius,
            tick: 0,
            weather: 0,
            players: HashMap::new(),
            char_index: HashMap::new(),
            name_index: HashMap::new(),
            npcs: HashMap::new(),
            summons: HashMap::new(),
            pets: HashMap::new(),
            dolls: HashMap::new(),
            followers: HashMap::new(),
            ground: HashMap::new(),
            doors: HashMap::new(),
            door_tiles: HashMap::new(),
            aoi: AoiGrid::new(),
            occupancy: EntityGrid::new(),
            attacks: VecDeque::new(),
            events: EventBus::default(),
            respawns: Vec::new(),
            clan_wh_locks: HashMap::new(),
            parties: Parties::default(),
            clans: Clans::default(),
        }
    }

    // ─── Players ────────────────────────────────────────────────────────────

    /// Places a player: indexes, AOI link and tile (when alive).
    pub fn add_player(&mut self, p: Player) {
        let sid = p.session_id;
        self.char_index.insert(p.char_id, sid);
        self.name_index.insert(p.name.to_lowercase(), sid);
        self.aoi.upsert((EntityKind::Player, p.char_id), p.map_id, p.x, p.y);
        if p.is_alive() {
            self.occupancy.occupy(p.map_id, p.x, p.y, p.char_id);
        }
        self.players.insert(sid, p);
    }

    pub fn remove_player(&mut self, session_id: u64) -> Option<Player> {
        let p = self.players.remove(&session_id)?;
        self.char_index.remove(&p.char_id);
        self.name_index.remove(&p.name.to_lowercase());
        self.aoi.remove((EntityKind::Player, p.char_id));
        self.occupancy.release(p.map_id, p.x, p.y, p.char_id);
        self.clan_wh_locks.retain(|_, holder| *holder != p.char_id);
        Some(p)
    }

    pub fn player(&self, session_id: u64) -> Option<&Player> {
        self.players.get(&session_id)
    }

    pub fn player_mut(&mut self, session_id: u64) -> Option<&mut Player> {
        self.players.get_mut(&session_id)
    }

    pub fn session_of_char(&self, char_id: i32) -> Option<u64> {
        self.char_index.get(&char_id).copied()
    }

    pub fn player_by_char(&self, char_id: i32) -> Option<&Player> {
        self.players.get(self.char_index.get(&char_id)?)
    }

    pub fn player_by_char_mut(&mut self, char_id: i32) -> Option<&mut Player> {
        let sid = *self.char_index.get(&char_id)?;
        self.players.get_mut(&sid)
    }

    pub fn session_by_name(&self, name: &str) -> Option<u64> {
        self.name_index.get(&name.to_lowercase()).copied()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn sessions(&self) -> Vec<u64> {
        self.players.keys().copied().collect()
    }

    /// Moves a player, relinking the AOI cell and swapping tile occupancy.
    pub fn update_position(&mut self, session_id: u64, map_id: i16, x: i32, y: i32, heading: u8) {
        let Some(p) = self.players.get_mut(&session_id) else { return };
        self.occupancy.release(p.map_id, p.x, p.y, p.char_id);
        p.map_id = map_id;
        p.x = x;
        p.y = y;
        p.heading = heading & 7;
        if p.is_alive() {
            self.occupancy.occupy(map_id, x, y, p.char_id);
        }
        self.aoi.upsert((EntityKind::Player, p.char_id), map_id, x, y);
    }

    // ─── Occupancy ──────────────────────────────────────────────────────────

    pub fn is_occupied(&self, map_id: i16, x: i32, y: i32, exclude: i32) -> bool {
        self.occupancy.is_occupied(map_id, x, y, exclude)
    }

    pub fn occupant(&self, map_id: i16, x: i32, y: i32) -> Option<i32> {
        self.occupancy.occupant(map_id, x, y)
    }

    pub fn occupy(&mut self, map_id: i16, x: i32, y: i32, id: i32) {
        self.occupancy.occupy(map_id, x, y, id);
    }

    pub fn release(&mut self, map_id: i16, x: i32, y: i32, id: i32) {
        self.occupancy.release(map_id, x, y, id);
    }

    /// A closed door stands on the tile.
    pub fn door_blocks(&self, map_id: i16, x: i32, y: i32) -> bool {
        self.door_tiles
            .get(&(map_id, x, y))
            .and_then(|id| self.doors.get(id))
            .is_some_and(Door::blocks)
    }

    /// Whether a non-player entity may step from (x, y) towards `heading`.
    pub fn can_step(&self, maps: &MapTable, map_id: i16, x: i32, y: i32, heading: u8, mover: i32) -> bool {
        let h = usize::from(heading & 7);
        let nx = x + crate::database::map_db::HEADING_DX[h];
        let ny = y + crate::database::map_db::HEADING_DY[h];
        maps.is_passable(map_id, x, y, heading & 7)
            && !self.is_occupied(map_id, nx, ny, mover)
            && !self.door_blocks(map_id, nx, ny)
    }

    /// Whether a player may step onto (x, y). Unlike [`World::can_step`]
    /// the static tile flags are not consulted: the client's terrain is
    /// trusted, only entities and closed doors block.
    pub fn player_can_step(&self, maps: &MapTable, map_id: i16, x: i32, y: i32, mover: i32) -> bool {
        maps.is_in_map(map_id, x, y) && !self.is_occupied(map_id, x, y, mover) && !self.door_blocks(map_id, x, y)
    }

    // ─── Spatial queries ────────────────────────────────────────────────────

    pub fn position_of(&self, r: EntityRef) -> Option<(i16, i32, i32)> {
        self.aoi.position(r)
    }

    /// Everything within `radius`, with current coordinates.
    pub fn nearby(&self, map_id: i16, x: i32, y: i32, radius: i32) -> Vec<(EntityRef, i32, i32)> {
        let mut out = Vec::new();
        self.aoi.for_each_near(map_id, x, y, radius, |r, ex, ey| out.push((r, ex, ey)));
        out
    }

    /// Sessions of players within the AOI radius of (x, y).
    pub fn nearby_sessions(&self, map_id: i16, x: i32, y: i32, exclude_char: Option<i32>) -> Vec<u64> {
        let mut out = Vec::new();
        self.aoi.for_each_near(map_id, x, y, self.aoi_radius, |(kind, id), _, _| {
            if kind == EntityKind::Player && Some(id) != exclude_char {
                if let Some(&sid) = self.char_index.get(&id) {
                    out.push(sid);
                }
            }
        });
        out
    }

    pub fn nearby_npcs(&self, map_id: i16, x: i32, y: i32, radius: i32) -> Vec<i32> {
        let mut out = Vec::new();
        self.aoi.for_each_near(map_id, x, y, radius, |(kind, id), _, _| {
            if kind == EntityKind::Npc {
                out.push(id);
            }
        });
        out
    }

    /// Sends `pkt` to every player in AOI of (x, y) except `exclude_char`.
    pub fn broadcast_nearby(&self, map_id: i16, x: i32, y: i32, exclude_char: Option<i32>, pkt: &[u8]) {
        self.aoi.for_each_near(map_id, x, y, self.aoi_radius, |(kind, id), _, _| {
            if kind != EntityKind::Player || Some(id) == exclude_char {
                return;
            }
            if let Some(p) = self.char_index.get(&id).and_then(|sid| self.players.get(sid)) {
                p.outbox.send(pkt.to_vec());
            }
        });
    }

    pub fn broadcast_map(&self, map_id: i16, pkt: &[u8]) {
        for p in self.players.values().filter(|p| p.map_id == map_id) {
            p.outbox.send(pkt.to_vec());
        }
    }

    pub fn broadcast_all(&self, pkt: &[u8]) {
        for p in self.players.values() {
            p.outbox.send(pkt.to_vec());
        }
    }

    pub fn send_to_char(&self, char_id: i32, pkt: Vec<u8>) {
        if let Some(p) = self.player_by_char(char_id) {
            p.outbox.send(pkt);
        }
    }

    // ─── NPCs ───────────────────────────────────────────────────────────────

    pub fn add_npc(&mut self, npc: Npc) -> i32 {
        let id = npc.id;
        self.aoi.upsert((EntityKind::Npc, id), npc.map_id, npc.x, npc.y);
        if npc.is_alive() {
            self.occupancy.occupy(npc.map_id, npc.x, npc.y, id);
        }
        self.npcs.insert(id, npc);
        id
    }

    pub fn remove_npc(&mut self, id: i32) -> Option<Npc> {
        let npc = self.npcs.remove(&id)?;
        self.aoi.remove((EntityKind::Npc, id));
        self.occupancy.release(npc.map_id, npc.x, npc.y, id);
        Some(npc)
    }

    pub fn move_npc(&mut self, id: i32, x: i32, y: i32, heading: u8) {
        let Some(npc) = self.npcs.get_mut(&id) else { return };
        self.occupancy.release(npc.map_id, npc.x, npc.y, id);
        npc.x = x;
        npc.y = y;
        npc.heading = heading & 7;
        self.occupancy.occupy(npc.map_id, x, y, id);
        self.aoi.upsert((EntityKind::Npc, id), npc.map_id, x, y);
    }

    /// Marks the NPC dead and frees its tile. It stays resolvable until the
    /// corpse window runs out.
    pub fn kill_npc(&mut self, id: i32) {
        let Some(npc) = self.npcs.get_mut(&id) else { return };
        npc.mark_dead();
        self.occupancy.release(npc.map_id, npc.x, npc.y, id);
        if let Some(ticks) = npc.respawn_ticks() {
            self.respawns.push(PendingRespawn { npc_id: npc.npc_id, anchor: npc.anchor, ticks_left: ticks });
        }
    }

    /// Finds a free tile inside the anchor box and spawns there.
    pub fn spawn_npc(&mut self, tpl: &NpcTemplate, anchor: SpawnAnchor, maps: &MapTable) -> Option<i32> {
        let (x, y) = self.find_spawn_tile(&anchor, maps)?;
        let id = self.ids.next(IdKind::Npc);
        let npc = Npc::from_template(id, tpl, anchor, x, y);
        Some(self.add_npc(npc))
    }

    fn find_spawn_tile(&self, a: &SpawnAnchor, maps: &MapTable) -> Option<(i32, i32)> {
        let free = |x: i32, y: i32| {
            !self.is_occupied(a.map_id, x, y, 0)
                && !self.door_blocks(a.map_id, x, y)
                && (!maps.has_map(a.map_id) || maps.is_passable_point(a.map_id, x, y))
        };
        if a.random_x > 0 || a.random_y > 0 {
            for _ in 0..SPAWN_TRIES {
                let x = a.x + rand::random_range(-a.random_x..=a.random_x);
                let y = a.y + rand::random_range(-a.random_y..=a.random_y);
                if free(x, y) {
                    return Some((x, y));
                }
            }
        }
        self.free_tile_near(maps, a.map_id, a.x, a.y, 3)
    }

    /// (x, y) itself when free, else the nearest free tile within `radius`
    /// rings: unoccupied, not under a closed door and statically walkable.
    pub fn free_tile_near(&self, maps: &MapTable, map_id: i16, x: i32, y: i32, radius: i32) -> Option<(i32, i32)> {
        let free = |x: i32, y: i32| {
            !self.is_occupied(map_id, x, y, 0)
                && !self.door_blocks(map_id, x, y)
                && (!maps.has_map(map_id) || maps.is_passable_point(map_id, x, y))
        };
        if free(x, y) {
            return Some((x, y));
        }
        for r in 1..=radius {
            for dx in -r..=r {
                for dy in -r..=r {
                    if chebyshev(0, 0, dx, dy) == r && free(x + dx, y + dy) {
                        return Some((x + dx, y + dy));
                    }
                }
            }
        }
        None
    }

    /// Populates the world from the spawn list and door table.
    pub fn populate(&mut self, data: &StaticData) {
        let mut spawned = 0usize;
        for s in &data.spawns {
            let Some(tpl) = data.npcs.get(s.npc_id) else {
                tracing::warn!("[world] [spawn_skipped] npc_id={} (no template)", s.npc_id);
                continue;
            };
            let anchor = SpawnAnchor {
                map_id: s.map_id,
                x: s.x,
                y: s.y,
                random_x: s.randomx,
                random_y: s.randomy,
                heading: s.heading,
                respawn_secs: s.respawn_delay.max(1),
            };
            for _ in 0..s.count.max(1) {
                if self.spawn_npc(tpl, anchor, &data.maps).is_some() {
                    spawned += 1;
                }
            }
        }
        for entry in data.doors.all() {
            let door = Door::from_entry(self.ids.next(IdKind::Door), entry);
            self.add_door(door);
        }
        tracing::info!("[world] [populated] npcs={} doors={}", spawned, self.doors.len());
    }

    // ─── Companions ─────────────────────────────────────────────────────────

    pub fn add_summon(&mut self, s: Summon) {
        let b = &s.body;
        self.aoi.upsert((EntityKind::Summon, b.id), b.map_id, b.x, b.y);
        self.occupancy.occupy(b.map_id, b.x, b.y, b.id);
        self.summons.insert(b.id, s);
    }

    pub fn remove_summon(&mut self, id: i32) -> Option<Summon> {
        let s = self.summons.remove(&id)?;
        self.aoi.remove((EntityKind::Summon, id));
        self.occupancy.release(s.body.map_id, s.body.x, s.body.y, id);
        Some(s)
    }

    pub fn add_pet(&mut self, p: Pet) {
        let b = &p.body;
        self.aoi.upsert((EntityKind::Pet, b.id), b.map_id, b.x, b.y);
        if b.is_alive() {
            self.occupancy.occupy(b.map_id, b.x, b.y, b.id);
        }
        self.pets.insert(b.id, p);
    }

    pub fn remove_pet(&mut self, id: i32) -> Option<Pet> {
        let p = self.pets.remove(&id)?;
        self.aoi.remove((EntityKind::Pet, id));
        self.occupancy.release(p.body.map_id, p.body.x, p.body.y, id);
        Some(p)
    }

    pub fn add_doll(&mut self, d: Doll) {
        self.aoi.upsert((EntityKind::Doll, d.id), d.map_id, d.x, d.y);
        self.dolls.insert(d.id, d);
    }

    pub fn remove_doll(&mut self, id: i32) -> Option<Doll> {
        let d = self.dolls.remove(&id)?;
        self.aoi.remove((EntityKind::Doll, id));
        Some(d)
    }

    pub fn add_follower(&mut self, f: Follower) {
        self.aoi.upsert((EntityKind::Follower, f.id), f.map_id, f.x, f.y);
        self.followers.insert(f.id, f);
    }

    pub fn remove_follower(&mut self, id: i32) -> Option<Follower> {
        let f = self.followers.remove(&id)?;
        self.aoi.remove((EntityKind::Follower, id));
        Some(f)
    }

    /// Moves a summon or pet body, keeping occupancy and AOI in step.
    /// Dolls and followers do not hold tiles.
    pub fn move_companion(&mut self, r: EntityRef, map_id: i16, x: i32, y: i32, heading: u8) {
        let (id, heading) = (r.1, heading & 7);
        let body = match r.0 {
            EntityKind::Summon => self.summons.get_mut(&id).map(|s| &mut s.body),
            EntityKind::Pet => self.pets.get_mut(&id).map(|p| &mut p.body),
            EntityKind::Doll => {
                if let Some(d) = self.dolls.get_mut(&id) {
                    (d.map_id, d.x, d.y, d.heading) = (map_id, x, y, heading);
                    self.aoi.upsert(r, map_id, x, y);
                }
                return;
            }
            EntityKind::Follower => {
                if let Some(f) = self.followers.get_mut(&id) {
                    (f.map_id, f.x, f.y, f.heading) = (map_id, x, y, heading);
                    self.aoi.upsert(r, map_id, x, y);
                }
                return;
            }
            _ => None,
        };
        let Some(b) = body else { return };
        self.occupancy.release(b.map_id, b.x, b.y, id);
        (b.map_id, b.x, b.y, b.heading) = (map_id, x, y, heading);
        if b.is_alive() {
            self.occupancy.occupy(map_id, x, y, id);
        }
        self.aoi.upsert(r, map_id, x, y);
    }

    /// Releases a dead companion's tile; the body stays for the owner.
    pub fn companion_died(&mut self, r: EntityRef) {
        let body = match r.0 {
            EntityKind::Summon => self.summons.get_mut(&r.1).map(|s| &mut s.body),
            EntityKind::Pet => self.pets.get_mut(&r.1).map(|p| &mut p.body),
            _ => None,
        };
        if let Some(b) = body {
            b.dead = true;
            b.hp = 0;
            b.target = 0;
            self.occupancy.release(b.map_id, b.x, b.y, r.1);
        }
    }

    /// CHA spent on summons and pets owned by `char_id`.
    pub fn companion_cost(&self, char_id: i32) -> i32 {
        let summons: i32 = self.summons.values().filter(|s| s.owner == char_id).map(|s| s.cost).sum();
        let pets = self.pets.values().filter(|p| p.owner == char_id).count() as i32 * super::companion::PET_COST;
        summons + pets
    }

    pub fn summons_of(&self, char_id: i32) -> Vec<i32> {
        self.summons.values().filter(|s| s.owner == char_id).map(|s| s.body.id).collect()
    }

    pub fn pets_of(&self, char_id: i32) -> Vec<i32> {
        self.pets.values().filter(|p| p.owner == char_id).map(|p| p.body.id).collect()
    }

    pub fn dolls_of(&self, char_id: i32) -> Vec<i32> {
        self.dolls.values().filter(|d| d.owner == char_id).map(|d| d.id).collect()
    }

    pub fn followers_of(&self, char_id: i32) -> Vec<i32> {
        self.followers.values().filter(|f| f.owner == char_id).map(|f| f.id).collect()
    }

    // ─── Ground items and doors ─────────────────────────────────────────────

    pub fn add_ground(&mut self, g: GroundItem) {
        self.aoi.upsert((EntityKind::Ground, g.id), g.map_id, g.x, g.y);
        self.ground.insert(g.id, g);
    }

    pub fn remove_ground(&mut self, id: i32) -> Option<GroundItem> {
        let g = self.ground.remove(&id)?;
        self.aoi.remove((EntityKind::Ground, id));
        Some(g)
    }

    pub fn add_door(&mut self, d: Door) {
        for (x, y) in d.tiles() {
            self.door_tiles.insert((d.map_id, x, y), d.id);
        }
        self.aoi.upsert((EntityKind::Door, d.id), d.map_id, d.x, d.y);
        self.doors.insert(d.id, d);
    }

    pub fn remove_door(&mut self, id: i32) -> Option<Door> {
        let d = self.doors.remove(&id)?;
        for (x, y) in d.tiles() {
            self.door_tiles.remove(&(d.map_id, x, y));
        }
        self.aoi.remove((EntityKind::Door, id));
        Some(d)
    }

    /// Next sequential projectile number for ranged animations.
    pub fn next_projectile(&self) -> i32 {
        self.ids.next(IdKind::Projectile)
    }

    // ─── Locks ──────────────────────────────────────────────────────────────

    /// Takes the clan warehouse for `char_id`. False when someone else holds it.
    pub fn lock_clan_warehouse(&mut self, clan_id: i32, char_id: i32) -> bool {
        match self.clan_wh_locks.get(&clan_id) {
            Some(&holder) if holder != char_id => false,
            _ => {
                self.clan_wh_locks.insert(clan_id, char_id);
                true
            }
        }
    }

    pub fn unlock_clan_warehouse(&mut self, char_id: i32) {
        self.clan_wh_locks.retain(|_, holder| *holder != char_id);
    }

    /// Frees a dissolved clan's warehouse whoever holds it.
    pub fn drop_clan_warehouse(&mut self, clan_id: i32) {
        self.clan_wh_locks.remove(&clan_id);
    }
}
