//! MySQL repositories over a shared `sqlx` pool. Schema: `migrations/`.

use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use super::*;
use crate::game::clan::RANK_PRINCE;

#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

const CHARACTER_COLUMNS: &str = "`id`, `account_name`, `name`, `class_type`, `sex`, `class_id`, \
     `str`, `dex`, `con`, `wis`, `cha`, `intel`, \
     `level`, `exp`, `hp`, `mp`, `max_hp`, `max_mp`, `ac`, \
     `x`, `y`, `map_id`, `heading`, \
     `lawful`, `title`, `clan_id`, `clan_name`, `clan_rank`, \
     `pk_count`, `karma`, `bonus_stats`, `elixir_stats`, \
     `food`, `access_level`, `birthday`, `deleted_at`";

// More than 16 columns, so rows are read by name instead of tuple FromRow.
fn character_from_row(row: &MySqlRow) -> Result<CharacterRow, sqlx::Error> {
    Ok(CharacterRow {
        id: row.try_get("id")?,
        account_name: row.try_get("account_name")?,
        name: row.try_get("name")?,
        class_type: row.try_get("class_type")?,
        sex: row.try_get("sex")?,
        class_id: row.try_get("class_id")?,
        str: row.try_get("str")?,
        dex: row.try_get("dex")?,
        con: row.try_get("con")?,
        wis: row.try_get("wis")?,
        cha: row.try_get("cha")?,
        intel: row.try_get("intel")?,
        level: row.try_get("level")?,
        exp: row.try_get("exp")?,
        hp: row.try_get("hp")?,
        mp: row.try_get("mp")?,
        max_hp: row.try_get("max_hp")?,
        max_mp: row.try_get("max_mp")?,
        ac: row.try_get("ac")?,
        x: row.try_get("x")?,
        y: row.try_get("y")?,
        map_id: row.try_get("map_id")?,
        heading: row.try_get("heading")?,
        lawful: row.try_get("lawful")?,
        title: row.try_get("title")?,
        clan_id: row.try_get("clan_id")?,
        clan_name: row.try_get("clan_name")?,
        clan_rank: row.try_get("clan_rank")?,
        pk_count: row.try_get("pk_count")?,
        karma: row.try_get("karma")?,
        bonus_stats: row.try_get("bonus_stats")?,
        elixir_stats: row.try_get("elixir_stats")?,
        food: row.try_get("food")?,
        access_level: row.try_get("access_level")?,
        birthday: row.try_get("birthday")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

// ─── Accounts ───────────────────────────────────────────────────────────────

impl AccountRepo for MySqlStore {
    fn load(&self, name: String) -> BoxFuture<'_, RepoResult<Option<AccountRow>>> {
        Box::pin(async move {
            let row: Option<(String, String, i16, String, bool, bool, i32, i64)> = sqlx::query_as(
                "SELECT `name`, `password_hash`, `access_level`, `ip`, `banned`, `online`, \
                 `warehouse_password`, `created_at` FROM `accounts` WHERE `name` = ?",
            )
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(name, password_hash, access_level, ip, banned, online, warehouse_password, created_at)| {
                AccountRow { name, password_hash, access_level, ip, banned, online, warehouse_password, created_at }
            }))
        })
    }

    fn create(&self, name: String, password_hash: String, ip: String) -> BoxFuture<'_, RepoResult<AccountRow>> {
        Box::pin(async move {
            let created_at = now_secs();
            sqlx::query(
                "INSERT INTO `accounts` (`name`, `password_hash`, `ip`, `created_at`) VALUES (?, ?, ?, ?)",
            )
            .bind(&name)
            .bind(&password_hash)
            .bind(&ip)
            .bind(created_at)
            .execute(&self.pool)
            .await?;
            Ok(AccountRow { name, password_hash, ip, created_at, ..Default::default() })
        })
    }

    fn set_online(&self, name: String, online: bool) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE `accounts` SET `online` = ?, `last_active` = ? WHERE `name` = ?")
                .bind(online)
                .bind(now_secs())
                .bind(&name)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn update_warehouse_password(&self, name: String, password: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE `accounts` SET `warehouse_password` = ? WHERE `name` = ?")
                .bind(password)
                .bind(&name)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }
}

// ─── Characters ─────────────────────────────────────────────────────────────

impl CharacterRepo for MySqlStore {
    fn list_by_account(&self, account: String) -> BoxFuture<'_, RepoResult<Vec<CharacterRow>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM `characters` WHERE `account_name` = ? AND `deleted_at` IS NULL ORDER BY `id`",
                CHARACTER_COLUMNS
            );
            let rows = sqlx::query(&sql).bind(&account).fetch_all(&self.pool).await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(character_from_row(row)?);
            }
            Ok(out)
        })
    }

    fn load_by_name(&self, name: String) -> BoxFuture<'_, RepoResult<Option<CharacterRow>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM `characters` WHERE `name` = ? AND `deleted_at` IS NULL LIMIT 1",
                CHARACTER_COLUMNS
            );
            let row = sqlx::query(&sql).bind(&name).fetch_optional(&self.pool).await?;
            match row {
                Some(r) => Ok(Some(character_from_row(&r)?)),
                None => Ok(None),
            }
        })
    }

    fn name_exists(&self, name: String) -> BoxFuture<'_, RepoResult<bool>> {
        Box::pin(async move {
            let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM `characters` WHERE `name` = ?")
                .bind(&name)
                .fetch_one(&self.pool)
                .await?;
            Ok(row.0 > 0)
        })
    }

    fn create(&self, c: CharacterRow) -> BoxFuture<'_, RepoResult<i32>> {
        Box::pin(async move {
            let res = sqlx::query(
                "INSERT INTO `characters` (`account_name`, `name`, `class_type`, `sex`, `class_id`, \
                 `str`, `dex`, `con`, `wis`, `cha`, `intel`, `level`, `exp`, `hp`, `mp`, `max_hp`, `max_mp`, \
                 `ac`, `x`, `y`, `map_id`, `heading`, `lawful`, `food`, `birthday`) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&c.account_name).bind(&c.name).bind(c.class_type).bind(c.sex).bind(c.class_id)
            .bind(c.str).bind(c.dex).bind(c.con).bind(c.wis).bind(c.cha).bind(c.intel)
            .bind(c.level).bind(c.exp).bind(c.hp).bind(c.mp).bind(c.max_hp).bind(c.max_mp)
            .bind(c.ac).bind(c.x).bind(c.y).bind(c.map_id).bind(c.heading).bind(c.lawful)
            .bind(c.food).bind(c.birthday)
            .execute(&self.pool)
            .await?;
            Ok(res.last_insert_id() as i32)
        })
    }

    fn save_character(&self, c: CharacterRow) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE `characters` SET `class_id`=?, `str`=?, `dex`=?, `con`=?, `wis`=?, `cha`=?, `intel`=?, \
                 `level`=?, `exp`=?, `hp`=?, `mp`=?, `max_hp`=?, `max_mp`=?, `ac`=?, \
                 `x`=?, `y`=?, `map_id`=?, `heading`=?, `lawful`=?, `title`=?, \
                 `pk_count`=?, `karma`=?, `bonus_stats`=?, `elixir_stats`=?, `food`=? \
                 WHERE `id`=?",
            )
            .bind(c.class_id).bind(c.str).bind(c.dex).bind(c.con).bind(c.wis).bind(c.cha).bind(c.intel)
            .bind(c.level).bind(c.exp).bind(c.hp).bind(c.mp).bind(c.max_hp).bind(c.max_mp).bind(c.ac)
            .bind(c.x).bind(c.y).bind(c.map_id).bind(c.heading).bind(c.lawful).bind(&c.title)
            .bind(c.pk_count).bind(c.karma).bind(c.bonus_stats).bind(c.elixir_stats).bind(c.food)
            .bind(c.id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn soft_delete(&self, name: String) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE `characters` SET `deleted_at` = ? WHERE `name` = ?")
                .bind(now_secs())
                .bind(&name)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn hard_delete(&self, name: String) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "DELETE `character_items` FROM `character_items` \
                 JOIN `characters` ON `characters`.`id` = `character_items`.`char_id` \
                 WHERE `characters`.`name` = ?",
            )
            .bind(&name)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM `characters` WHERE `name` = ?")
                .bind(&name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn load_bookmarks(&self, name: String) -> BoxFuture<'_, RepoResult<Vec<BookmarkRow>>> {
        Box::pin(async move {
            let row: Option<(Option<String>,)> = sqlx::query_as(
                "SELECT `bookmarks` FROM `characters` WHERE `name` = ? AND `deleted_at` IS NULL",
            )
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
            match row.and_then(|(raw,)| raw) {
                Some(raw) if !raw.trim().is_empty() => Ok(serde_yaml::from_str(&raw)?),
                _ => Ok(Vec::new()),
            }
        })
    }

    fn save_bookmarks(&self, name: String, bookmarks: Vec<BookmarkRow>) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            let raw = serde_yaml::to_string(&bookmarks)?;
            sqlx::query("UPDATE `characters` SET `bookmarks` = ? WHERE `name` = ?")
                .bind(&raw)
                .bind(&name)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn load_known_spells(&self, name: String) -> BoxFuture<'_, RepoResult<Vec<i32>>> {
        Box::pin(async move {
            let row: Option<(Option<String>,)> = sqlx::query_as(
                "SELECT `known_spells` FROM `characters` WHERE `name` = ? AND `deleted_at` IS NULL",
            )
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
            match row.and_then(|(raw,)| raw) {
                Some(raw) if !raw.trim().is_empty() => Ok(serde_yaml::from_str(&raw)?),
                _ => Ok(Vec::new()),
            }
        })
    }

    fn save_known_spells(&self, name: String, spells: Vec<i32>) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            let raw = serde_yaml::to_string(&spells)?;
            sqlx::query("UPDATE `characters` SET `known_spells` = ? WHERE `name` = ?")
                .bind(&raw)
                .bind(&name)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn load_char_config(&self, char_id: i32) -> BoxFuture<'_, RepoResult<Option<Vec<u8>>>> {
        Box::pin(async move {
            let row: Option<(Option<Vec<u8>>,)> = sqlx::query_as(
                "SELECT `char_config` FROM `characters` WHERE `id` = ? AND `deleted_at` IS NULL",
            )
            .bind(char_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.and_then(|(blob,)| blob))
        })
    }
}

// ─── Items ──────────────────────────────────────────────────────────────────

impl ItemRepo for MySqlStore {
    fn load_by_char_id(&self, char_id: i32) -> BoxFuture<'_, RepoResult<Vec<ItemRow>>> {
        Box::pin(async move {
            let rows: Vec<(i32, i32, i16, i16, bool, bool, i16, i32, i16)> = sqlx::query_as(
                "SELECT `item_id`, `count`, `enchant_lvl`, `bless`, `equipped`, `identified`, \
                 `equip_slot`, `obj_id`, `durability` FROM `character_items` WHERE `char_id` = ? ORDER BY `id`",
            )
            .bind(char_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(item_id, count, enchant_lvl, bless, equipped, identified, equip_slot, obj_id, durability)| ItemRow {
                    char_id,
                    item_id,
                    count,
                    enchant_lvl,
                    bless,
                    equipped,
                    identified,
                    equip_slot,
                    obj_id,
                    durability,
                })
                .collect())
        })
    }

    fn save_inventory(&self, char_id: i32, items: Vec<ItemRow>) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM `character_items` WHERE `char_id` = ?")
                .bind(char_id)
                .execute(&mut *tx)
                .await?;
            for it in &items {
                sqlx::query(
                    "INSERT INTO `character_items` (`char_id`, `item_id`, `count`, `enchant_lvl`, `bless`, \
                     `equipped`, `identified`, `equip_slot`, `obj_id`, `durability`) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(char_id).bind(it.item_id).bind(it.count).bind(it.enchant_lvl).bind(it.bless)
                .bind(it.equipped).bind(it.identified).bind(it.equip_slot).bind(it.obj_id).bind(it.durability)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn max_obj_id(&self) -> BoxFuture<'_, RepoResult<i32>> {
        Box::pin(async move {
            let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(`obj_id`) FROM `character_items`")
                .fetch_one(&self.pool)
                .await?;
            Ok(row.0.unwrap_or(0))
        })
    }
}

// ─── Pets ───────────────────────────────────────────────────────────────────

impl PetRepo for MySqlStore {
    fn load_by_item_obj_id(&self, item_obj_id: i32) -> BoxFuture<'_, RepoResult<Option<PetRow>>> {
        Box::pin(async move {
            let row: Option<(i32, String, i16, i32, i32, i32, i32, i64, i32)> = sqlx::query_as(
                "SELECT `npc_id`, `name`, `level`, `hp`, `max_hp`, `mp`, `max_mp`, `exp`, `lawful` \
                 FROM `pets` WHERE `item_obj_id` = ?",
            )
            .bind(item_obj_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(npc_id, name, level, hp, max_hp, mp, max_mp, exp, lawful)| PetRow {
                item_obj_id,
                npc_id,
                name,
                level,
                hp,
                max_hp,
                mp,
                max_mp,
                exp,
                lawful,
            }))
        })
    }

    fn save(&self, p: PetRow) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO `pets` (`item_obj_id`, `npc_id`, `name`, `level`, `hp`, `max_hp`, `mp`, `max_mp`, \
                 `exp`, `lawful`) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON DUPLICATE KEY UPDATE `npc_id`=VALUES(`npc_id`), `name`=VALUES(`name`), \
                 `level`=VALUES(`level`), `hp`=VALUES(`hp`), `max_hp`=VALUES(`max_hp`), `mp`=VALUES(`mp`), \
                 `max_mp`=VALUES(`max_mp`), `exp`=VALUES(`exp`), `lawful`=VALUES(`lawful`)",
            )
            .bind(p.item_obj_id).bind(p.npc_id).bind(&p.name).bind(p.level).bind(p.hp).bind(p.max_hp)
            .bind(p.mp).bind(p.max_mp).bind(p.exp).bind(p.lawful)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn delete(&self, item_obj_id: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM `pets` WHERE `item_obj_id` = ?")
                .bind(item_obj_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }
}

// ─── Board ──────────────────────────────────────────────────────────────────

impl BoardRepo for MySqlStore {
    fn list_page(&self, before_id: i32, limit: u32) -> BoxFuture<'_, RepoResult<Vec<BoardPost>>> {
        Box::pin(async move {
            let rows: Vec<(i32, String, String, String)> = if before_id > 0 {
                sqlx::query_as(
                    "SELECT `id`, `name`, `date`, `title` FROM `board_posts` WHERE `id` < ? \
                     ORDER BY `id` DESC LIMIT ?",
                )
                .bind(before_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            } else {
                sqlx::query_as("SELECT `id`, `name`, `date`, `title` FROM `board_posts` ORDER BY `id` DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            };
            Ok(rows
                .into_iter()
                .map(|(id, name, date, title)| BoardPost { id, name, date, title, content: String::new() })
                .collect())
        })
    }

    fn get_by_id(&self, id: i32) -> BoxFuture<'_, RepoResult<Option<BoardPost>>> {
        Box::pin(async move {
            let row: Option<(String, String, String, String)> = sqlx::query_as(
                "SELECT `name`, `date`, `title`, `content` FROM `board_posts` WHERE `id` = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(name, date, title, content)| BoardPost { id, name, date, title, content }))
        })
    }

    fn write(&self, post: BoardPost) -> BoxFuture<'_, RepoResult<i32>> {
        Box::pin(async move {
            let res = sqlx::query("INSERT INTO `board_posts` (`name`, `date`, `title`, `content`) VALUES (?, ?, ?, ?)")
                .bind(&post.name)
                .bind(&post.date)
                .bind(&post.title)
                .bind(&post.content)
                .execute(&self.pool)
                .await?;
            Ok(res.last_insert_id() as i32)
        })
    }

    fn delete(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM `board_posts` WHERE `id` = ?").bind(id).execute(&self.pool).await?;
            Ok(())
        })
    }
}

// ─── Mail ───────────────────────────────────────────────────────────────────

type MailTuple = (i32, i16, String, String, i64, i16, i32, Vec<u8>, Vec<u8>);

fn mail_from_tuple(t: MailTuple) -> MailRow {
    let (id, mail_type, sender, receiver, date, read_status, inbox_id, subject, content) = t;
    MailRow { id, mail_type, sender, receiver, date, read_status, inbox_id, subject, content }
}

impl MailRepo for MySqlStore {
    fn load_inbox(&self, char_id: i32, mail_type: i16) -> BoxFuture<'_, RepoResult<Vec<MailRow>>> {
        Box::pin(async move {
            let rows: Vec<MailTuple> = sqlx::query_as(
                "SELECT `id`, `type`, `sender`, `receiver`, `date`, `read_status`, `inbox_id`, `subject`, `content` \
                 FROM `mails` WHERE `inbox_id` = ? AND `type` = ? ORDER BY `id`",
            )
            .bind(char_id)
            .bind(mail_type)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(mail_from_tuple).collect())
        })
    }

    fn count_inbox(&self, char_id: i32, mail_type: i16) -> BoxFuture<'_, RepoResult<i64>> {
        Box::pin(async move {
            let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM `mails` WHERE `inbox_id` = ? AND `type` = ?")
                .bind(char_id)
                .bind(mail_type)
                .fetch_one(&self.pool)
                .await?;
            Ok(row.0)
        })
    }

    fn get_by_id(&self, id: i32) -> BoxFuture<'_, RepoResult<Option<MailRow>>> {
        Box::pin(async move {
            let row: Option<MailTuple> = sqlx::query_as(
                "SELECT `id`, `type`, `sender`, `receiver`, `date`, `read_status`, `inbox_id`, `subject`, `content` \
                 FROM `mails` WHERE `id` = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(mail_from_tuple))
        })
    }

    fn save(&self, m: MailRow) -> BoxFuture<'_, RepoResult<i32>> {
        Box::pin(async move {
            let res = sqlx::query(
                "INSERT INTO `mails` (`type`, `sender`, `receiver`, `date`, `read_status`, `inbox_id`, `subject`, `content`) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(m.mail_type).bind(&m.sender).bind(&m.receiver).bind(m.date)
            .bind(m.read_status).bind(m.inbox_id).bind(&m.subject).bind(&m.content)
            .execute(&self.pool)
            .await?;
            Ok(res.last_insert_id() as i32)
        })
    }

    fn mark_read(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE `mails` SET `read_status` = 1 WHERE `id` = ?").bind(id).execute(&self.pool).await?;
            Ok(())
        })
    }

    fn delete(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM `mails` WHERE `id` = ?").bind(id).execute(&self.pool).await?;
            Ok(())
        })
    }

    fn move_to_storage(&self, id: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE `mails` SET `type` = ? WHERE `id` = ?")
                .bind(MAIL_TYPE_STORAGE)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn bulk_delete(&self, char_id: i32, ids: Vec<i32>) -> BoxFuture<'_, RepoResult<Vec<i32>>> {
        Box::pin(async move {
            let mut removed = Vec::with_capacity(ids.len());
            let mut tx = self.pool.begin().await?;
            for id in ids {
                let res = sqlx::query("DELETE FROM `mails` WHERE `id` = ? AND `inbox_id` = ?")
                    .bind(id)
                    .bind(char_id)
                    .execute(&mut *tx)
                    .await?;
                if res.rows_affected() > 0 {
                    removed.push(id);
                }
            }
            tx.commit().await?;
            Ok(removed)
        })
    }
}

// ─── Warehouse ──────────────────────────────────────────────────────────────

type WarehouseTuple = (i32, String, String, i16, i32, i32, i16, i16, bool);

fn warehouse_from_tuple(t: WarehouseTuple) -> WarehouseItem {
    let (id, account_name, char_name, wh_type, item_id, count, enchant_lvl, bless, identified) = t;
    WarehouseItem { id, account_name, char_name, wh_type, item_id, count, enchant_lvl, bless, identified }
}

impl WarehouseRepo for MySqlStore {
    fn load(&self, owner: String, wh_type: i16) -> BoxFuture<'_, RepoResult<Vec<WarehouseItem>>> {
        Box::pin(async move {
            let rows: Vec<WarehouseTuple> = sqlx::query_as(
                "SELECT `id`, `account_name`, `char_name`, `wh_type`, `item_id`, `count`, `enchant_lvl`, `bless`, \
                 `identified` FROM `warehouse_items` WHERE `account_name` = ? AND `wh_type` = ? ORDER BY `id`",
            )
            .bind(&owner)
            .bind(wh_type)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(warehouse_from_tuple).collect())
        })
    }

    fn load_by_char_name(&self, char_name: String, wh_type: i16) -> BoxFuture<'_, RepoResult<Vec<WarehouseItem>>> {
        Box::pin(async move {
            let rows: Vec<WarehouseTuple> = sqlx::query_as(
                "SELECT `id`, `account_name`, `char_name`, `wh_type`, `item_id`, `count`, `enchant_lvl`, `bless`, \
                 `identified` FROM `warehouse_items` WHERE `char_name` = ? AND `wh_type` = ? ORDER BY `id`",
            )
            .bind(&char_name)
            .bind(wh_type)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(warehouse_from_tuple).collect())
        })
    }

    fn deposit(&self, w: WarehouseItem) -> BoxFuture<'_, RepoResult<i32>> {
        Box::pin(async move {
            let res = sqlx::query(
                "INSERT INTO `warehouse_items` (`account_name`, `char_name`, `wh_type`, `item_id`, `count`, \
                 `enchant_lvl`, `bless`, `identified`) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&w.account_name).bind(&w.char_name).bind(w.wh_type).bind(w.item_id)
            .bind(w.count).bind(w.enchant_lvl).bind(w.bless).bind(w.identified)
            .execute(&self.pool)
            .await?;
            Ok(res.last_insert_id() as i32)
        })
    }

    fn add_to_stack(&self, id: i32, count: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE `warehouse_items` SET `count` = `count` + ? WHERE `id` = ?")
                .bind(count)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn withdraw(&self, id: i32, count: i32) -> BoxFuture<'_, RepoResult<bool>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let res = sqlx::query("UPDATE `warehouse_items` SET `count` = `count` - ? WHERE `id` = ?")
                .bind(count)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound(format!("warehouse item {}", id)));
            }
            let (remaining,): (i32,) = sqlx::query_as("SELECT `count` FROM `warehouse_items` WHERE `id` = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            let emptied = remaining <= 0;
            if emptied {
                sqlx::query("DELETE FROM `warehouse_items` WHERE `id` = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(emptied)
        })
    }

    fn insert_clan_history(
        &self,
        clan_id: i32,
        char_name: String,
        kind: i16,
        item_name: String,
        count: i32,
    ) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO `clan_warehouse_history` (`clan_id`, `char_name`, `type`, `item_name`, `item_count`, \
                 `created_at`) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(clan_id).bind(&char_name).bind(kind).bind(&item_name).bind(count).bind(now_secs())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn load_clan_history(&self, clan_id: i32) -> BoxFuture<'_, RepoResult<Vec<ClanWarehouseHistory>>> {
        Box::pin(async move {
            let rows: Vec<(String, i16, String, i32, i64)> = sqlx::query_as(
                "SELECT `char_name`, `type`, `item_name`, `item_count`, `created_at` \
                 FROM `clan_warehouse_history` WHERE `clan_id` = ? ORDER BY `id` DESC LIMIT 200",
            )
            .bind(clan_id)
            .fetch_all(&self.pool)
            .await?;
            let now = now_secs();
            Ok(rows
                .into_iter()
                .map(|(char_name, kind, item_name, item_count, created_at)| ClanWarehouseHistory {
                    char_name,
                    kind,
                    item_name,
                    item_count,
                    minutes_ago: ((now - created_at) / 60) as i32,
                })
                .collect())
        })
    }
}

// ─── Clans ──────────────────────────────────────────────────────────────────

impl ClanRepo for MySqlStore {
    fn load_clans(&self) -> BoxFuture<'_, RepoResult<Vec<ClanRow>>> {
        Box::pin(async move {
            let rows: Vec<(i32, String, i32, String, i64, i32, i32)> = sqlx::query_as(
                "SELECT `clan_id`, `clan_name`, `leader_id`, `leader_name`, `found_date`, `has_castle`, `has_house` \
                 FROM `clans` ORDER BY `clan_id`",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(clan_id, clan_name, leader_id, leader_name, found_date, has_castle, has_house)| ClanRow {
                    clan_id,
                    clan_name,
                    leader_id,
                    leader_name,
                    found_date,
                    has_castle,
                    has_house,
                })
                .collect())
        })
    }

    fn load_members(&self) -> BoxFuture<'_, RepoResult<Vec<ClanMemberRow>>> {
        Box::pin(async move {
            let rows: Vec<(i32, i32, String, i16)> =
                sqlx::query_as("SELECT `clan_id`, `char_id`, `char_name`, `rank` FROM `clan_members`")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows
                .into_iter()
                .map(|(clan_id, char_id, char_name, rank)| ClanMemberRow { clan_id, char_id, char_name, rank })
                .collect())
        })
    }

    fn create(&self, leader_id: i32, leader_name: String, clan_name: String, found_date: i64) -> BoxFuture<'_, RepoResult<i32>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let res = sqlx::query(
                "INSERT INTO `clans` (`clan_name`, `leader_id`, `leader_name`, `found_date`) VALUES (?, ?, ?, ?)",
            )
            .bind(&clan_name)
            .bind(leader_id)
            .bind(&leader_name)
            .bind(found_date)
            .execute(&mut *tx)
            .await?;
            let clan_id = res.last_insert_id() as i32;
            sqlx::query("REPLACE INTO `clan_members` (`clan_id`, `char_id`, `char_name`, `rank`) VALUES (?, ?, ?, ?)")
                .bind(clan_id)
                .bind(leader_id)
                .bind(&leader_name)
                .bind(RANK_PRINCE)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE `characters` SET `clan_id` = ?, `clan_name` = ?, `clan_rank` = ? WHERE `id` = ?")
                .bind(clan_id)
                .bind(&clan_name)
                .bind(RANK_PRINCE)
                .bind(leader_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(clan_id)
        })
    }

    fn add_member(&self, clan_id: i32, clan_name: String, char_id: i32, char_name: String, rank: i16) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("REPLACE INTO `clan_members` (`clan_id`, `char_id`, `char_name`, `rank`) VALUES (?, ?, ?, ?)")
                .bind(clan_id)
                .bind(char_id)
                .bind(&char_name)
                .bind(rank)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE `characters` SET `clan_id` = ?, `clan_name` = ?, `clan_rank` = ?, `title` = '' WHERE `id` = ?")
                .bind(clan_id)
                .bind(&clan_name)
                .bind(rank)
                .bind(char_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn remove_member(&self, clan_id: i32, char_id: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM `clan_members` WHERE `clan_id` = ? AND `char_id` = ?")
                .bind(clan_id)
                .bind(char_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE `characters` SET `clan_id` = 0, `clan_name` = '', `clan_rank` = 0 WHERE `id` = ?")
                .bind(char_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn dissolve(&self, clan_id: i32) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("UPDATE `characters` SET `clan_id` = 0, `clan_name` = '', `clan_rank` = 0 WHERE `clan_id` = ?")
                .bind(clan_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM `clan_members` WHERE `clan_id` = ?")
                .bind(clan_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM `clans` WHERE `clan_id` = ?")
                .bind(clan_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }
}
