//! Static world data.
//!
//! Every table is loaded once at startup from YAML files under `data_dir`
//! (tile maps come from `maps_dir`) and is read-only afterwards. A missing
//! optional file yields an empty table with a warning so a partial data set
//! still boots.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

pub mod armor_set_db;
pub mod craft_db;
pub mod doll_db;
pub mod door_db;
pub mod drop_db;
pub mod item_db;
pub mod magic_db;
pub mod map_db;
pub mod npc_db;
pub mod pet_db;
pub mod poly_db;
pub mod portal_db;
pub mod shop_db;
pub mod teleport_db;
pub mod weapon_skill_db;

pub use armor_set_db::{ArmorSet, ArmorSetTable};
pub use craft_db::{CraftPart, CraftRecipe, CraftTable};
pub use doll_db::{DollTable, DollTemplate};
pub use door_db::{DoorEntry, DoorTable};
pub use drop_db::{DropItem, DropTable};
pub use item_db::{ItemCategory, ItemTable, ItemTemplate};
pub use magic_db::{SkillInfo, SkillTable};
pub use map_db::{MapInfo, MapTable};
pub use npc_db::{NpcTable, NpcTemplate, SpawnEntry};
pub use pet_db::{PetType, PetTypeTable};
pub use poly_db::{PolyForm, PolyTable};
pub use portal_db::{Portal, PortalTable};
pub use shop_db::{Shop, ShopItem, ShopTable};
pub use teleport_db::{TeleportDest, TeleportTable};
pub use weapon_skill_db::{WeaponSkill, WeaponSkillTable};

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid data in {file}: {reason}")]
    Invalid { file: &'static str, reason: String },
}

/// Reads and parses one YAML file.
pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    let raw = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| DataError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`read_yaml`] but a missing file is an empty table.
pub(crate) fn read_yaml_optional<T: DeserializeOwned + Default>(path: &Path) -> Result<T, DataError> {
    if !path.exists() {
        tracing::warn!("[data] [missing] file={} (using empty table)", path.display());
        return Ok(T::default());
    }
    read_yaml(path)
}

/// All static tables, shared read-only by handlers and systems.
#[derive(Debug, Default)]
pub struct StaticData {
    pub items: ItemTable,
    pub npcs: NpcTable,
    pub spawns: Vec<SpawnEntry>,
    pub skills: SkillTable,
    pub drops: DropTable,
    pub maps: MapTable,
    pub polys: PolyTable,
    pub armor_sets: ArmorSetTable,
    pub pet_types: PetTypeTable,
    pub dolls: DollTable,
    pub teleports: TeleportTable,
    pub doors: DoorTable,
    pub shops: ShopTable,
    pub weapon_skills: WeaponSkillTable,
    pub portals: PortalTable,
    pub crafts: CraftTable,
}

impl StaticData {
    pub fn load(data_dir: &str, maps_dir: &str) -> Result<Self, DataError> {
        let dir = Path::new(data_dir);
        let data = Self {
            items: ItemTable::load(dir)?,
            npcs: NpcTable::load(&dir.join("npcs.yaml"))?,
            spawns: npc_db::load_spawns(&dir.join("spawns.yaml"))?,
            skills: SkillTable::load(&dir.join("skills.yaml"))?,
            drops: DropTable::load(&dir.join("drops.yaml"))?,
            maps: MapTable::load(&dir.join("map_list.yaml"), Path::new(maps_dir))?,
            polys: PolyTable::load(&dir.join("polymorphs.yaml"))?,
            armor_sets: ArmorSetTable::load(&dir.join("armor_sets.yaml"))?,
            pet_types: PetTypeTable::load(&dir.join("pet_types.yaml"))?,
            dolls: DollTable::load(&dir.join("dolls.yaml"))?,
            teleports: TeleportTable::load(&dir.join("teleports.yaml"))?,
            doors: DoorTable::load(&dir.join("doors.yaml"))?,
            shops: ShopTable::load(&dir.join("shops.yaml"))?,
            weapon_skills: WeaponSkillTable::load(&dir.join("weapon_skills.yaml"))?,
            portals: PortalTable::load(&dir.join("portals.yaml"))?,
            crafts: CraftTable::load(&dir.join("crafts.yaml"))?,
        };

        tracing::info!(
            "[data] [loaded] items={} npcs={} spawns={} skills={} maps={} doors={} portals={} recipes={}",
            data.items.count(),
            data.npcs.count(),
            data.spawns.len(),
            data.skills.count(),
            data.maps.count(),
            data.doors.count(),
            data.portals.count(),
            data.crafts.count()
        );
        Ok(data)
    }
}
