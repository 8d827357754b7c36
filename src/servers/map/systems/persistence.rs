//! Character persistence: snapshots taken under the world lock, written
//! after it is released.

use std::sync::Arc;

use crate::core::secs_to_ticks;
use crate::game::player::Player;
use crate::game::World;
use crate::repo::{with_timeout, BookmarkRow, CharacterRow, ItemRow, PetRow, Repos, SAVE_TIMEOUT, SHORT_TIMEOUT};

use super::super::GameServer;

/// Everything written for one character.
#[derive(Debug, Clone)]
pub struct SaveJob {
    pub row: CharacterRow,
    pub items: Vec<ItemRow>,
    /// `None` on periodic saves; bookmarks and spells are written on change
    /// and on logout.
    pub bookmarks: Option<Vec<BookmarkRow>>,
    pub spells: Option<Vec<i32>>,
    pub pets: Vec<PetRow>,
}

impl SaveJob {
    /// Character row and inventory only.
    pub fn periodic(p: &Player) -> Self {
        Self { row: p.to_row(), items: inventory_rows(p), bookmarks: None, spells: None, pets: Vec::new() }
    }

    /// Logout save: everything the character owns.
    pub fn full(p: &Player, pets: Vec<PetRow>) -> Self {
        Self {
            row: p.to_row(),
            items: inventory_rows(p),
            bookmarks: Some(p.bookmarks.rows()),
            spells: Some(p.known_spells.clone()),
            pets,
        }
    }
}

/// Inventory rows with the equip slot index, -1 when not worn.
pub fn inventory_rows(p: &Player) -> Vec<ItemRow> {
    p.inventory
        .iter()
        .map(|it| {
            let slot = p.equipment.slot_of(it.obj_id).map(|s| s.index() as i16).unwrap_or(-1);
            it.to_row(p.char_id, slot)
        })
        .collect()
}

/// Writes a job. Returns false if any part failed; failures are logged and
/// the rest still runs.
pub async fn save(repos: &Repos, job: SaveJob) -> bool {
    let SaveJob { row, items, bookmarks, spells, pets } = job;
    let (name, char_id) = (row.name.clone(), row.id);
    let mut ok = true;

    if let Err(e) = with_timeout("save_character", SAVE_TIMEOUT, repos.characters.save_character(row)).await {
        tracing::error!("[repo] [save_failed] what=character char={} error={}", name, e);
        ok = false;
    }
    if let Err(e) = with_timeout("save_inventory", SAVE_TIMEOUT, repos.items.save_inventory(char_id, items)).await {
        tracing::error!("[repo] [save_failed] what=inventory char={} error={}", name, e);
        ok = false;
    }
    if let Some(marks) = bookmarks {
        if let Err(e) = with_timeout("save_bookmarks", SHORT_TIMEOUT, repos.characters.save_bookmarks(name.clone(), marks)).await {
            tracing::error!("[repo] [save_failed] what=bookmarks char={} error={}", name, e);
            ok = false;
        }
    }
    if let Some(spells) = spells {
        if let Err(e) = with_timeout("save_spells", SHORT_TIMEOUT, repos.characters.save_known_spells(name.clone(), spells)).await {
            tracing::error!("[repo] [save_failed] what=spells char={} error={}", name, e);
            ok = false;
        }
    }
    for pet in pets {
        save_pet(repos, pet).await;
    }
    ok
}

pub async fn save_pet(repos: &Repos, pet: PetRow) -> bool {
    let key = pet.item_obj_id;
    match with_timeout("save_pet", SHORT_TIMEOUT, repos.pets.save(pet)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("[repo] [save_failed] what=pet collar={} error={}", key, e);
            false
        }
    }
}

/// Collects dirty players and pets, clearing their flags. Returns the jobs
/// for the caller to run once the lock is gone; [`write_back`] restores the
/// flag on failure.
pub fn collect_dirty(w: &mut World) -> (Vec<SaveJob>, Vec<PetRow>) {
    let mut jobs = Vec::new();
    // a character mid-respec is saved once the respec ends
    for p in w.players.values_mut().filter(|p| p.dirty && p.char_reset.is_none()) {
        p.dirty = false;
        jobs.push(SaveJob::periodic(p));
    }
    let mut pets = Vec::new();
    for pet in w.pets.values_mut().filter(|p| p.dirty) {
        pet.dirty = false;
        pets.push(pet.to_row());
    }
    (jobs, pets)
}

/// Tick hook: every `save_interval_secs`, snapshot dirty state and write it
/// from a spawned task so the tick never waits on the database.
pub fn run(srv: &Arc<GameServer>, w: &mut World) {
    let interval = u64::from(secs_to_ticks(srv.config.save_interval_secs.max(1)));
    if w.tick == 0 || w.tick % interval != 0 {
        return;
    }
    let (jobs, pets) = collect_dirty(w);
    if jobs.is_empty() && pets.is_empty() {
        return;
    }
    tracing::debug!("[world] [autosave] players={} pets={}", jobs.len(), pets.len());
    tokio::spawn(write_back(Arc::clone(srv), jobs, pets));
}

/// Writes collected jobs, then puts the dirty flag back on anything whose
/// save failed so the next pass retries it.
pub async fn write_back(srv: Arc<GameServer>, jobs: Vec<SaveJob>, pets: Vec<PetRow>) {
    let mut failed_chars = Vec::new();
    for job in jobs {
        let char_id = job.row.id;
        if !save(&srv.repos, job).await {
            failed_chars.push(char_id);
        }
    }
    let mut failed_pets = Vec::new();
    for pet in pets {
        let key = pet.item_obj_id;
        if !save_pet(&srv.repos, pet).await {
            failed_pets.push(key);
        }
    }
    if failed_chars.is_empty() && failed_pets.is_empty() {
        return;
    }
    let mut w = srv.world.lock().await;
    for char_id in &failed_chars {
        if let Some(p) = w.player_by_char_mut(*char_id) {
            p.mark_dirty();
        }
    }
    for pet in w.pets.values_mut().filter(|p| failed_pets.contains(&p.item_obj_id)) {
        pet.dirty = true;
    }
    tracing::warn!("[world] [autosave_retry] players={} pets={}", failed_chars.len(), failed_pets.len());
}
