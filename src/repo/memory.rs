//! In-memory repositories for tests and `--memory` development runs.
//! Nothing survives a restart.

use std::collections::HashMap;
use std::sync::Mutex;

use super::*;
use crate::game::clan::RANK_PRINCE;

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, AccountRow>,
    characters: Vec<CharacterRow>,
    bookmarks: HashMap<String, Vec<BookmarkRow>>,
    spells: HashMap<String, Vec<i32>>,
    configs: HashMap<i32, Vec<u8>>,
    items: HashMap<i32, Vec<ItemRow>>,
    pets: HashMap<i32, PetRow>,
    posts: Vec<BoardPost>,
    mails: Vec<MailRow>,
    warehouse: Vec<WarehouseItem>,
    clan_history: Vec<(i32, ClanWarehouseHistory, i64)>,
    clans: Vec<ClanRow>,
    clan_members: Vec<ClanMemberRow>,
    next_char_id: i32,
    next_clan_id: i32,
    next_row_id: i32,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn ready<'a, T: Send + 'a>(v: T) -> BoxFuture<'a, RepoResult<T>> {
        Box::pin(async move { Ok(v) })
    }

    /// Seeds an account with a bcrypt hash of `password`. Test helper.
    pub fn insert_account(&self, name: &str, password: &str) {
        let hash = bcrypt::hash(password, 4).unwrap_or_default();
        self.with(|s| {
            s.accounts.insert(
                name.to_lowercase(),
                AccountRow { name: name.to_lowercase(), password_hash: hash, ..Default::default() },
            )
        });
    }

    pub fn account(&self, name: &str) -> Option<AccountRow> {
        self.with(|s| s.accounts.get(&name.to_lowercase()).cloned())
    }

    pub fn pet(&self, item_obj_id: i32) -> Option<PetRow> {
        self.with(|s| s.pets.get(&item_obj_id).cloned())
    }

    pub fn character(&self, name: &str) -> Option<CharacterRow> {
        self.with(|s| {
            s.characters
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name) && c.deleted_at.is_none())
                .cloned()
        })
    }

    pub fn inventory(&self, char_id: i32) -> Vec<ItemRow> {
        self.with(|s| s.items.get(&char_id).cloned().unwrap_or_default())
    }

    pub fn bookmarks(&self, name: &str) -> Vec<BookmarkRow> {
        self.with(|s| s.bookmarks.get(&name.to_lowercase()).cloned().unwrap_or_default())
    }

    pub fn clan_members_of(&self, clan_id: i32) -> Vec<ClanMemberRow> {
        self.with(|s| s.clan_members.iter().filter(|m| m.clan_id == clan_id).cloned().collect())
    }
}

impl Inner {
    fn set_char_clan(&mut self, char_id: i32, clan_id: i32, clan_name: &str, rank: i16) {
        if let Some(c) = self.characters.iter_mut().find(|c| c.id == char_id) {
            c.clan_id = clan_id;
            c.clan_name = clan_name.to_string();
            c.clan_rank = rank;
        }
    }
}

impl AccountRepo for MemoryStore {
    fn load(&self, name: String) -> BoxFuture<'_, RepoResult<Option<AccountRow>>> {
        Self::ready(self.with(|s| s.accounts.get(&name).cloned()))
    }

    fn create(&self, name: String, password_hash: String, ip: String) -> BoxFuture<'_, RepoResult<AccountRow>> {
        let row = AccountRow { name: name.clone(), password_hash, ip, created_at: now_secs(), ..Default::default() };
        self.with(|s| s.accounts.insert(name, row.clone()));
        Self::ready(row)
    }

    fn set_online(&self, name: String, online: bool) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            if let Some(a) = s.accounts.get_mut(&name) {
                a.online = online;
            }
        });
        Self::ready(())
    }

    fn update_warehouse_password(&self, name: String, password: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            if let Some(a) = s.accounts.get_mut(&name) {
                a.warehouse_password = password;
            }
        });
        Self::ready(())
    }
}

impl CharacterRepo for MemoryStore {
    fn list_by_account(&self, account: String) -> BoxFuture<'_, RepoResult<Vec<CharacterRow>>> {
        Self::ready(self.with(|s| {
            s.characters
                .iter()
                .filter(|c| c.account_name == account && c.deleted_at.is_none())
                .cloned()
                .collect()
        }))
    }

    fn load_by_name(&self, name: String) -> BoxFuture<'_, RepoResult<Option<CharacterRow>>> {
        Self::ready(self.character(&name))
    }

    fn name_exists(&self, name: String) -> BoxFuture<'_, RepoResult<bool>> {
        Self::ready(self.with(|s| s.characters.iter().any(|c| c.name.eq_ignore_ascii_case(&name))))
    }

    fn create(&self, mut row: CharacterRow) -> BoxFuture<'_, RepoResult<i32>> {
        let id = self.with(|s| {
            s.next_char_id += 1;
            row.id = s.next_char_id;
            s.characters.push(row);
            s.next_char_id
        });
        Self::ready(id)
    }

    fn save_character(&self, row: CharacterRow) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            if let Some(c) = s.characters.iter_mut().find(|c| c.id == row.id) {
                *c = row;
            }
        });
        Self::ready(())
    }

    fn soft_delete(&self, name: String) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            if let Some(c) = s.characters.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&name)) {
                c.deleted_at = Some(now_secs());
            }
        });
        Self::ready(())
    }

    fn hard_delete(&self, name: String) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.characters.retain(|c| !c.name.eq_ignore_ascii_case(&name)));
        Self::ready(())
    }

    fn load_bookmarks(&self, name: String) -> BoxFuture<'_, RepoResult<Vec<BookmarkRow>>> {
        Self::ready(self.with(|s| s.bookmarks.get(&name.to_lowercase()).cloned().unwrap_or_default()))
    }

    fn save_bookmarks(&self, name: String, bookmarks: Vec<BookmarkRow>) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.bookmarks.insert(name.to_lowercase(), bookmarks));
        Self::ready(())
    }

    fn load_known_spells(&self, name: String) -> BoxFuture<'_, RepoResult<Vec<i32>>> {
        Self::ready(self.with(|s| s.spells.get(&name.to_lowercase()).cloned().unwrap_or_default()))
    }

    fn save_known_spells(&self, name: String, spells: Vec<i32>) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.spells.insert(name.to_lowercase(), spells));
        Self::ready(())
    }

    fn load_char_config(&self, char_id: i32) -> BoxFuture<'_, RepoResult<Option<Vec<u8>>>> {
        Self::ready(self.with(|s| s.configs.get(&char_id).cloned()))
    }
}

impl ItemRepo for MemoryStore {
    fn load_by_char_id(&self, char_id: i32) -> BoxFuture<'_, RepoResult<Vec<ItemRow>>> {
        Self::ready(self.inventory(char_id))
    }

    fn save_inventory(&self, char_id: i32, items: Vec<ItemRow>) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.items.insert(char_id, items));
        Self::ready(())
    }

    fn max_obj_id(&self) -> BoxFuture<'_, RepoResult<i32>> {
        Self::ready(self.with(|s| s.items.values().flatten().map(|i| i.obj_id).max().unwrap_or(0)))
    }
}

impl PetRepo for MemoryStore {
    fn load_by_item_obj_id(&self, item_obj_id: i32) -> BoxFuture<'_, RepoResult<Option<PetRow>>> {
        Self::ready(self.pet(item_obj_id))
    }

    fn save(&self, row: PetRow) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.pets.insert(row.item_obj_id, row));
        Self::ready(())
    }

    fn delete(&self, item_obj_id: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.pets.remove(&item_obj_id));
        Self::ready(())
    }
}

impl BoardRepo for MemoryStore {
    fn list_page(&self, before_id: i32, limit: u32) -> BoxFuture<'_, RepoResult<Vec<BoardPost>>> {
        Self::ready(self.with(|s| {
            let mut posts: Vec<BoardPost> = s
                .posts
                .iter()
                .filter(|p| before_id == 0 || p.id < before_id)
                .cloned()
                .collect();
            posts.sort_by(|a, b| b.id.cmp(&a.id));
            posts.truncate(limit as usize);
            posts
        }))
    }

    fn get_by_id(&self, id: i32) -> BoxFuture<'_, RepoResult<Option<BoardPost>>> {
        Self::ready(self.with(|s| s.posts.iter().find(|p| p.id == id).cloned()))
    }

    fn write(&self, mut post: BoardPost) -> BoxFuture<'_, RepoResult<i32>> {
        let id = self.with(|s| {
            s.next_row_id += 1;
            post.id = s.next_row_id;
            s.posts.push(post);
            s.next_row_id
        });
        Self::ready(id)
    }

    fn delete(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.posts.retain(|p| p.id != id));
        Self::ready(())
    }
}

impl MailRepo for MemoryStore {
    fn load_inbox(&self, char_id: i32, mail_type: i16) -> BoxFuture<'_, RepoResult<Vec<MailRow>>> {
        Self::ready(self.with(|s| {
            s.mails
                .iter()
                .filter(|m| m.inbox_id == char_id && m.mail_type == mail_type)
                .cloned()
                .collect()
        }))
    }

    fn count_inbox(&self, char_id: i32, mail_type: i16) -> BoxFuture<'_, RepoResult<i64>> {
        Self::ready(self.with(|s| {
            s.mails.iter().filter(|m| m.inbox_id == char_id && m.mail_type == mail_type).count() as i64
        }))
    }

    fn get_by_id(&self, id: i32) -> BoxFuture<'_, RepoResult<Option<MailRow>>> {
        Self::ready(self.with(|s| s.mails.iter().find(|m| m.id == id).cloned()))
    }

    fn save(&self, mut row: MailRow) -> BoxFuture<'_, RepoResult<i32>> {
        let id = self.with(|s| {
            s.next_row_id += 1;
            row.id = s.next_row_id;
            s.mails.push(row);
            s.next_row_id
        });
        Self::ready(id)
    }

    fn mark_read(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            if let Some(m) = s.mails.iter_mut().find(|m| m.id == id) {
                m.read_status = 1;
            }
        });
        Self::ready(())
    }

    fn delete(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| s.mails.retain(|m| m.id != id));
        Self::ready(())
    }

    fn move_to_storage(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            if let Some(m) = s.mails.iter_mut().find(|m| m.id == id) {
                m.mail_type = MAIL_TYPE_STORAGE;
            }
        });
        Self::ready(())
    }

    fn bulk_delete(&self, char_id: i32, ids: Vec<i32>) -> BoxFuture<'_, RepoResult<Vec<i32>>> {
        Self::ready(self.with(|s| {
            let removed: Vec<i32> = s
                .mails
                .iter()
                .filter(|m| m.inbox_id == char_id && ids.contains(&m.id))
                .map(|m| m.id)
                .collect();
            s.mails.retain(|m| !removed.contains(&m.id));
            removed
        }))
    }
}

impl WarehouseRepo for MemoryStore {
    fn load(&self, owner: String, wh_type: i16) -> BoxFuture<'_, RepoResult<Vec<WarehouseItem>>> {
        Self::ready(self.with(|s| {
            s.warehouse
                .iter()
                .filter(|w| w.account_name == owner && w.wh_type == wh_type)
                .cloned()
                .collect()
        }))
    }

    fn load_by_char_name(&self, char_name: String, wh_type: i16) -> BoxFuture<'_, RepoResult<Vec<WarehouseItem>>> {
        Self::ready(self.with(|s| {
            s.warehouse
                .iter()
                .filter(|w| w.char_name == char_name && w.wh_type == wh_type)
                .cloned()
                .collect()
        }))
    }

    fn deposit(&self, mut item: WarehouseItem) -> BoxFuture<'_, RepoResult<i32>> {
        let id = self.with(|s| {
            s.next_row_id += 1;
            item.id = s.next_row_id;
            s.warehouse.push(item);
            s.next_row_id
        });
        Self::ready(id)
    }

    fn add_to_stack(&self, id: i32, count: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            if let Some(w) = s.warehouse.iter_mut().find(|w| w.id == id) {
                w.count += count;
            }
        });
        Self::ready(())
    }

    fn withdraw(&self, id: i32, count: i32) -> BoxFuture<'_, RepoResult<bool>> {
        let res = self.with(|s| {
            let Some(idx) = s.warehouse.iter().position(|w| w.id == id) else {
                return Err(RepoError::NotFound(format!("warehouse item {}", id)));
            };
            s.warehouse[idx].count -= count;
            if s.warehouse[idx].count <= 0 {
                s.warehouse.remove(idx);
                Ok(true)
            } else {
                Ok(false)
            }
        });
        Box::pin(async move { res })
    }

    fn insert_clan_history(
        &self,
        clan_id: i32,
        char_name: String,
        kind: i16,
        item_name: String,
        count: i32,
    ) -> BoxFuture<'_, RepoResult<()>> {
        let entry = ClanWarehouseHistory { char_name, kind, item_name, item_count: count, minutes_ago: 0 };
        self.with(|s| s.clan_history.push((clan_id, entry, now_secs())));
        Self::ready(())
    }

    fn load_clan_history(&self, clan_id: i32) -> BoxFuture<'_, RepoResult<Vec<ClanWarehouseHistory>>> {
        let now = now_secs();
        Self::ready(self.with(|s| {
            s.clan_history
                .iter()
                .rev()
                .filter(|(c, _, _)| *c == clan_id)
                .map(|(_, h, at)| ClanWarehouseHistory { minutes_ago: ((now - at) / 60) as i32, ..h.clone() })
                .collect()
        }))
    }
}

impl ClanRepo for MemoryStore {
    fn load_clans(&self) -> BoxFuture<'_, RepoResult<Vec<ClanRow>>> {
        Self::ready(self.with(|s| s.clans.clone()))
    }

    fn load_members(&self) -> BoxFuture<'_, RepoResult<Vec<ClanMemberRow>>> {
        Self::ready(self.with(|s| s.clan_members.clone()))
    }

    fn create(&self, leader_id: i32, leader_name: String, clan_name: String, found_date: i64) -> BoxFuture<'_, RepoResult<i32>> {
        let res = self.with(|s| {
            if s.clans.iter().any(|c| c.clan_name.eq_ignore_ascii_case(&clan_name)) {
                return Err(RepoError::Conflict(format!("clan {}", clan_name)));
            }
            s.next_clan_id += 1;
            let clan_id = s.next_clan_id;
            s.clan_members.push(ClanMemberRow { clan_id, char_id: leader_id, char_name: leader_name.clone(), rank: RANK_PRINCE });
            s.set_char_clan(leader_id, clan_id, &clan_name, RANK_PRINCE);
            s.clans.push(ClanRow { clan_id, clan_name, leader_id, leader_name, found_date, ..Default::default() });
            Ok(clan_id)
        });
        Box::pin(async move { res })
    }

    fn add_member(&self, clan_id: i32, clan_name: String, char_id: i32, char_name: String, rank: i16) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            s.clan_members.retain(|m| m.char_id != char_id);
            s.clan_members.push(ClanMemberRow { clan_id, char_id, char_name, rank });
            s.set_char_clan(char_id, clan_id, &clan_name, rank);
        });
        Self::ready(())
    }

    fn remove_member(&self, clan_id: i32, char_id: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            s.clan_members.retain(|m| !(m.clan_id == clan_id && m.char_id == char_id));
            s.set_char_clan(char_id, 0, "", 0);
        });
        Self::ready(())
    }

    fn dissolve(&self, clan_id: i32) -> BoxFuture<'_, RepoResult<()>> {
        self.with(|s| {
            let freed: Vec<i32> = s.clan_members.iter().filter(|m| m.clan_id == clan_id).map(|m| m.char_id).collect();
            for id in freed {
                s.set_char_clan(id, 0, "", 0);
            }
            s.clan_members.retain(|m| m.clan_id != clan_id);
            s.clans.retain(|c| c.clan_id != clan_id);
        });
        Self::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_character_lifecycle() {
        let store = MemoryStore::default();
        let id = CharacterRepo::create(
            &store,
            CharacterRow { account_name: "acc".into(), name: "Hero".into(), level: 1, ..Default::default() },
        )
        .await
        .unwrap();
        assert!(id > 0);
        assert!(store.name_exists("hero".into()).await.unwrap());
        assert_eq!(store.list_by_account("acc".into()).await.unwrap().len(), 1);

        store.soft_delete("Hero".into()).await.unwrap();
        assert!(store.list_by_account("acc".into()).await.unwrap().is_empty());
        // soft-deleted names stay reserved
        assert!(store.name_exists("Hero".into()).await.unwrap());
    }

    #[tokio::test]
    async fn test_warehouse_withdraw_removes_empty_rows() {
        let store = MemoryStore::default();
        let id = store
            .deposit(WarehouseItem { account_name: "a".into(), wh_type: WH_TYPE_PERSONAL, item_id: 40308, count: 100, ..Default::default() })
            .await
            .unwrap();
        store.add_to_stack(id, 50).await.unwrap();
        assert!(!store.withdraw(id, 30).await.unwrap());
        assert_eq!(WarehouseRepo::load(&store, "a".into(), WH_TYPE_PERSONAL).await.unwrap()[0].count, 120);
        assert!(store.withdraw(id, 120).await.unwrap());
        assert!(store.withdraw(id, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_clan_rows_follow_membership() {
        let store = MemoryStore::default();
        let leader = CharacterRepo::create(&store, CharacterRow { name: "King".into(), ..Default::default() }).await.unwrap();
        let knight = CharacterRepo::create(&store, CharacterRow { name: "Sir".into(), ..Default::default() }).await.unwrap();
        let clan = ClanRepo::create(&store, leader, "King".into(), "Lions".into(), 0).await.unwrap();
        assert!(ClanRepo::create(&store, knight, "Sir".into(), "LIONS".into(), 0).await.is_err());

        store.add_member(clan, "Lions".into(), knight, "Sir".into(), 7).await.unwrap();
        assert_eq!(store.character("Sir").unwrap().clan_name, "Lions");
        assert_eq!(store.clan_members_of(clan).len(), 2);

        store.remove_member(clan, knight).await.unwrap();
        assert_eq!(store.character("Sir").unwrap().clan_id, 0);

        store.dissolve(clan).await.unwrap();
        assert!(store.load_clans().await.unwrap().is_empty());
        assert_eq!(store.character("King").unwrap().clan_rank, 0);
    }

    #[tokio::test]
    async fn test_mail_bulk_delete_checks_owner() {
        let store = MemoryStore::default();
        let mine = MailRepo::save(&store, MailRow { inbox_id: 1, ..Default::default() }).await.unwrap();
        let theirs = MailRepo::save(&store, MailRow { inbox_id: 2, ..Default::default() }).await.unwrap();
        let removed = store.bulk_delete(1, vec![mine, theirs]).await.unwrap();
        assert_eq!(removed, vec![mine]);
        assert!(MailRepo::get_by_id(&store, theirs).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_board_pages_newest_first() {
        let store = MemoryStore::default();
        for i in 0..5 {
            BoardRepo::write(&store, BoardPost { title: format!("t{}", i), ..Default::default() }).await.unwrap();
        }
        let first = store.list_page(0, 2).await.unwrap();
        assert_eq!(first.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(), vec!["t4", "t3"]);
        let next = store.list_page(first[1].id, 2).await.unwrap();
        assert_eq!(next[0].title, "t2");
    }
}
