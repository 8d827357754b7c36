//! Persistence boundary.
//!
//! Every repository is an object-safe trait returning boxed futures so the
//! MySQL implementation and the in-memory one plug into the same [`Repos`]
//! bundle. Arguments are owned: callers snapshot what they need from the
//! world, drop the world lock, then await the call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub mod mysql;
pub mod rows;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;
pub use rows::*;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type RepoResult<T> = Result<T, RepoError>;

/// Deadline for single-row reads and writes.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(3);
/// Deadline for inventory, warehouse and character saves.
pub const SAVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("encode error: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// Runs a repository future under a deadline, logging on expiry.
pub async fn with_timeout<T, F>(op: &'static str, limit: Duration, fut: F) -> RepoResult<T>
where
    F: Future<Output = RepoResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => {
            tracing::error!("[repo] [timeout] op={} limit_ms={}", op, limit.as_millis());
            Err(RepoError::Timeout(op))
        }
    }
}

pub trait AccountRepo: Send + Sync {
    fn load(&self, name: String) -> BoxFuture<'_, RepoResult<Option<AccountRow>>>;
    fn create(&self, name: String, password_hash: String, ip: String) -> BoxFuture<'_, RepoResult<AccountRow>>;
    fn set_online(&self, name: String, online: bool) -> BoxFuture<'_, RepoResult<()>>;
    fn update_warehouse_password(&self, name: String, password: i32) -> BoxFuture<'_, RepoResult<()>>;
}

pub trait CharacterRepo: Send + Sync {
    fn list_by_account(&self, account: String) -> BoxFuture<'_, RepoResult<Vec<CharacterRow>>>;
    fn load_by_name(&self, name: String) -> BoxFuture<'_, RepoResult<Option<CharacterRow>>>;
    fn name_exists(&self, name: String) -> BoxFuture<'_, RepoResult<bool>>;
    /// Inserts and returns the new character id.
    fn create(&self, row: CharacterRow) -> BoxFuture<'_, RepoResult<i32>>;
    fn save_character(&self, row: CharacterRow) -> BoxFuture<'_, RepoResult<()>>;
    fn soft_delete(&self, name: String) -> BoxFuture<'_, RepoResult<()>>;
    fn hard_delete(&self, name: String) -> BoxFuture<'_, RepoResult<()>>;
    fn load_bookmarks(&self, name: String) -> BoxFuture<'_, RepoResult<Vec<BookmarkRow>>>;
    fn save_bookmarks(&self, name: String, bookmarks: Vec<BookmarkRow>) -> BoxFuture<'_, RepoResult<()>>;
    fn load_known_spells(&self, name: String) -> BoxFuture<'_, RepoResult<Vec<i32>>>;
    fn save_known_spells(&self, name: String, spells: Vec<i32>) -> BoxFuture<'_, RepoResult<()>>;
    /// Opaque client config blob (hotkeys, window positions).
    fn load_char_config(&self, char_id: i32) -> BoxFuture<'_, RepoResult<Option<Vec<u8>>>>;
}

pub trait ItemRepo: Send + Sync {
    fn load_by_char_id(&self, char_id: i32) -> BoxFuture<'_, RepoResult<Vec<ItemRow>>>;
    /// Replaces the character's whole inventory.
    fn save_inventory(&self, char_id: i32, items: Vec<ItemRow>) -> BoxFuture<'_, RepoResult<()>>;
    fn max_obj_id(&self) -> BoxFuture<'_, RepoResult<i32>>;
}

pub trait PetRepo: Send + Sync {
    fn load_by_item_obj_id(&self, item_obj_id: i32) -> BoxFuture<'_, RepoResult<Option<PetRow>>>;
    /// Upsert keyed by the collar's object id.
    fn save(&self, row: PetRow) -> BoxFuture<'_, RepoResult<()>>;
    fn delete(&self, item_obj_id: i32) -> BoxFuture<'_, RepoResult<()>>;
}

pub trait BoardRepo: Send + Sync {
    /// Posts older than `before_id` (0 = newest page), newest first.
    fn list_page(&self, before_id: i32, limit: u32) -> BoxFuture<'_, RepoResult<Vec<BoardPost>>>;
    fn get_by_id(&self, id: i32) -> BoxFuture<'_, RepoResult<Option<BoardPost>>>;
    fn write(&self, post: BoardPost) -> BoxFuture<'_, RepoResult<i32>>;
    fn delete(&self, id: i32) -> BoxFuture<'_, RepoResult<()>>;
}

pub trait MailRepo: Send + Sync {
    fn load_inbox(&self, char_id: i32, mail_type: i16) -> BoxFuture<'_, RepoResult<Vec<MailRow>>>;
    fn count_inbox(&self, char_id: i32, mail_type: i16) -> BoxFuture<'_, RepoResult<i64>>;
    fn get_by_id(&self, id: i32) -> BoxFuture<'_, RepoResult<Option<MailRow>>>;
    fn save(&self, row: MailRow) -> BoxFuture<'_, RepoResult<i32>>;
    fn mark_read(&self, id: i32) -> BoxFuture<'_, RepoResult<()>>;
    fn delete(&self, id: i32) -> BoxFuture<'_, RepoResult<()>>;
    fn move_to_storage(&self, id: i32) -> BoxFuture<'_, RepoResult<()>>;
    /// Deletes the ids owned by `char_id`; returns the ids actually removed.
    fn bulk_delete(&self, char_id: i32, ids: Vec<i32>) -> BoxFuture<'_, RepoResult<Vec<i32>>>;
}

pub trait WarehouseRepo: Send + Sync {
    fn load(&self, owner: String, wh_type: i16) -> BoxFuture<'_, RepoResult<Vec<WarehouseItem>>>;
    fn load_by_char_name(&self, char_name: String, wh_type: i16) -> BoxFuture<'_, RepoResult<Vec<WarehouseItem>>>;
    /// Returns the new row id.
    fn deposit(&self, item: WarehouseItem) -> BoxFuture<'_, RepoResult<i32>>;
    fn add_to_stack(&self, id: i32, count: i32) -> BoxFuture<'_, RepoResult<()>>;
    /// Returns true when the row was emptied and removed.
    fn withdraw(&self, id: i32, count: i32) -> BoxFuture<'_, RepoResult<bool>>;
    fn insert_clan_history(
        &self,
        clan_id: i32,
        char_name: String,
        kind: i16,
        item_name: String,
        count: i32,
    ) -> BoxFuture<'_, RepoResult<()>>;
    fn load_clan_history(&self, clan_id: i32) -> BoxFuture<'_, RepoResult<Vec<ClanWarehouseHistory>>>;
}

/// Clan rows plus the matching `clan_*` columns on `characters`.
pub trait ClanRepo: Send + Sync {
    fn load_clans(&self) -> BoxFuture<'_, RepoResult<Vec<ClanRow>>>;
    fn load_members(&self) -> BoxFuture<'_, RepoResult<Vec<ClanMemberRow>>>;
    /// Founds a clan led by `leader_id`; returns the new clan id.
    fn create(&self, leader_id: i32, leader_name: String, clan_name: String, found_date: i64) -> BoxFuture<'_, RepoResult<i32>>;
    fn add_member(&self, clan_id: i32, clan_name: String, char_id: i32, char_name: String, rank: i16) -> BoxFuture<'_, RepoResult<()>>;
    fn remove_member(&self, clan_id: i32, char_id: i32) -> BoxFuture<'_, RepoResult<()>>;
    /// Drops the clan and frees every member.
    fn dissolve(&self, clan_id: i32) -> BoxFuture<'_, RepoResult<()>>;
}

/// The repository bundle handed to handlers and systems.
#[derive(Clone)]
pub struct Repos {
    pub accounts: Arc<dyn AccountRepo>,
    pub characters: Arc<dyn CharacterRepo>,
    pub items: Arc<dyn ItemRepo>,
    pub pets: Arc<dyn PetRepo>,
    pub boards: Arc<dyn BoardRepo>,
    pub mail: Arc<dyn MailRepo>,
    pub warehouse: Arc<dyn WarehouseRepo>,
    pub clans: Arc<dyn ClanRepo>,
}

impl Repos {
    /// Every repository backed by one shared store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: AccountRepo + CharacterRepo + ItemRepo + PetRepo + BoardRepo + MailRepo + WarehouseRepo + ClanRepo + 'static,
    {
        Self {
            accounts: store.clone(),
            characters: store.clone(),
            items: store.clone(),
            pets: store.clone(),
            boards: store.clone(),
            mail: store.clone(),
            warehouse: store.clone(),
            clans: store,
        }
    }

    pub fn memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (Self::from_store(Arc::clone(&store)), store)
    }
}
