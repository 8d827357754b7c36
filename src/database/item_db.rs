//! Item templates merged from `weapons.yaml`, `armors.yaml` and `etcitems.yaml`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemCategory {
    #[default]
    Etc,
    Weapon,
    Armor,
}

/// Flat template. Fields that do not apply to a category stay zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemTemplate {
    pub item_id: i32,
    pub name: String,
    /// weapon: sword/dagger/bow/...; armor: helm/armor/shield/...; etc: arrow/potion/...
    #[serde(rename = "type")]
    pub kind: String,
    pub material: String,
    pub weight: i32,
    pub inv_gfx: i32,
    pub grd_gfx: i32,

    pub dmg_small: i32,
    pub dmg_large: i32,
    pub range: i32,
    #[serde(alias = "hit_modifier")]
    pub hit_mod: i32,
    #[serde(alias = "dmg_modifier")]
    pub dmg_mod: i32,

    pub ac: i32,
    #[serde(alias = "bow_hit_modifier")]
    pub bow_hit_mod: i32,
    #[serde(alias = "bow_dmg_modifier")]
    pub bow_dmg_mod: i32,

    pub add_str: i32,
    pub add_con: i32,
    pub add_dex: i32,
    pub add_int: i32,
    pub add_wis: i32,
    pub add_cha: i32,
    pub add_hp: i32,
    pub add_mp: i32,
    pub add_hpr: i32,
    pub add_mpr: i32,
    pub add_sp: i32,
    #[serde(alias = "m_def")]
    pub mdef: i32,

    pub safe_enchant: i32,
    pub bless: i32,
    /// Bound items cannot be traded or dropped.
    #[serde(alias = "no_trade")]
    pub untradeable: bool,
    pub min_level: i32,
    pub max_level: i32,

    pub use_royal: bool,
    pub use_knight: bool,
    pub use_mage: bool,
    pub use_elf: bool,
    pub use_darkelf: bool,
    pub use_dragonknight: bool,
    pub use_illusionist: bool,

    pub stackable: bool,
    pub use_type: String,
    pub item_type: String,
    pub food_volume: i32,
    pub delay_time: i32,

    #[serde(skip)]
    pub category: ItemCategory,
}

impl ItemTemplate {
    /// Client use-type byte sent in inventory packets.
    pub fn use_type_id(&self) -> u8 {
        match self.category {
            ItemCategory::Weapon => 1,
            ItemCategory::Armor => armor_use_type(&self.kind),
            ItemCategory::Etc => use_type_to_id(&self.use_type),
        }
    }

    /// Whether a character of `class_type` (0..=6) may equip this item.
    pub fn usable_by(&self, class_type: i32) -> bool {
        match class_type {
            0 => self.use_royal,
            1 => self.use_knight,
            2 => self.use_elf,
            3 => self.use_mage,
            4 => self.use_darkelf,
            5 => self.use_dragonknight,
            6 => self.use_illusionist,
            _ => false,
        }
    }

    pub fn is_two_handed(&self) -> bool {
        matches!(self.kind.as_str(), "tohandsword" | "tohandblunt" | "bow" | "claw" | "edoryu")
    }

    pub fn is_bow(&self) -> bool {
        self.category == ItemCategory::Weapon && matches!(self.kind.as_str(), "bow" | "gauntlet")
    }

    pub fn is_arrow(&self) -> bool {
        self.category == ItemCategory::Etc && self.kind == "arrow"
    }

    /// Material byte shown in the item detail panel.
    pub fn material_id(&self) -> u8 {
        material_to_id(&self.material)
    }

    /// Class bits shown in the item detail panel.
    pub fn class_bitmask(&self) -> u8 {
        let flags = [
            self.use_royal,
            self.use_knight,
            self.use_elf,
            self.use_mage,
            self.use_darkelf,
            self.use_dragonknight,
            self.use_illusionist,
        ];
        flags.iter().enumerate().filter(|(_, on)| **on).fold(0u8, |acc, (i, _)| acc | (1 << i))
    }
}

fn material_to_id(s: &str) -> u8 {
    match s {
        "liquid" => 1,
        "web" => 2,
        "vegetation" => 3,
        "animite" => 4,
        "paper" => 5,
        "cloth" => 6,
        "leather" => 7,
        "wood" => 8,
        "bone" => 9,
        "dragonscale" => 10,
        "iron" => 11,
        "steel" => 12,
        "copper" => 13,
        "silver" => 14,
        "gold" => 15,
        "platinum" => 16,
        "mithril" => 17,
        "blackmithril" => 18,
        "glass" => 19,
        "gemstone" => 20,
        "mineral" => 21,
        "oriharukon" => 22,
        _ => 0,
    }
}

fn armor_use_type(kind: &str) -> u8 {
    match kind {
        "helm" => 22,
        "T" | "tshirt" => 18,
        "cloak" => 19,
        "glove" => 20,
        "boots" => 21,
        "amulet" => 24,
        "shield" | "guarder" => 25,
        "belt" => 37,
        "earring" => 40,
        "ring" => 57,
        _ => 2,
    }
}

/// Maps a YAML `use_type` string to the byte the 3.80C client expects.
pub fn use_type_to_id(s: &str) -> u8 {
    match s {
        "weapon" => 1,
        "armor" => 2,
        "spell_long" => 5,
        "ntele" => 6,
        "identify" => 7,
        "res" => 8,
        "letter" => 12,
        "letter_w" => 13,
        "choice" => 14,
        "instrument" => 15,
        "sosc" => 16,
        "spell_short" => 17,
        "T" => 18,
        "cloak" => 19,
        "glove" => 20,
        "boots" => 21,
        "helm" => 22,
        "amulet" => 24,
        "shield" | "guarder" => 25,
        "dai" => 26,
        "zel" => 27,
        "blank" => 28,
        "btele" => 29,
        "spell_buff" => 30,
        "belt" => 37,
        "earring" => 40,
        "normal" => 51,
        "ring" => 57,
        _ => 0,
    }
}

#[derive(Debug, Default, Deserialize)]
struct WeaponFile {
    #[serde(default)]
    weapons: Vec<ItemTemplate>,
}

#[derive(Debug, Default, Deserialize)]
struct ArmorFile {
    #[serde(default)]
    armors: Vec<ItemTemplate>,
}

#[derive(Debug, Default, Deserialize)]
struct EtcFile {
    #[serde(default)]
    etcitems: Vec<ItemTemplate>,
}

#[derive(Debug, Default)]
pub struct ItemTable {
    items: HashMap<i32, ItemTemplate>,
}

impl ItemTable {
    pub fn load(dir: &Path) -> Result<Self, DataError> {
        let mut table = Self::default();

        let weapons: WeaponFile = read_yaml_optional(&dir.join("weapons.yaml"))?;
        for mut w in weapons.weapons {
            w.category = ItemCategory::Weapon;
            table.insert(w);
        }
        let armors: ArmorFile = read_yaml_optional(&dir.join("armors.yaml"))?;
        for mut a in armors.armors {
            a.category = ItemCategory::Armor;
            table.insert(a);
        }
        let etc: EtcFile = read_yaml_optional(&dir.join("etcitems.yaml"))?;
        for mut e in etc.etcitems {
            e.category = ItemCategory::Etc;
            table.insert(e);
        }

        if let Some(bad) = table.items.values().find(|t| t.item_id <= 0) {
            return Err(DataError::Invalid {
                file: "items",
                reason: format!("item {:?} has non-positive id {}", bad.name, bad.item_id),
            });
        }
        Ok(table)
    }

    pub fn insert(&mut self, item: ItemTemplate) {
        self.items.insert(item.item_id, item);
    }

    pub fn get(&self, item_id: i32) -> Option<&ItemTemplate> {
        self.items.get(&item_id)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weapon_entry() {
        let yaml = r#"
weapons:
  - item_id: 1
    name: Dagger
    type: dagger
    dmg_small: 4
    dmg_large: 3
    hit_modifier: 1
    use_knight: true
"#;
        let file: WeaponFile = serde_yaml::from_str(yaml).unwrap();
        let w = &file.weapons[0];
        assert_eq!(w.kind, "dagger");
        assert_eq!(w.hit_mod, 1);
        assert!(w.usable_by(1));
        assert!(!w.usable_by(3));
    }

    #[test]
    fn test_use_type_ids() {
        let mut helm = ItemTemplate { kind: "helm".into(), ..Default::default() };
        helm.category = ItemCategory::Armor;
        assert_eq!(helm.use_type_id(), 22);

        let potion = ItemTemplate { use_type: "normal".into(), ..Default::default() };
        assert_eq!(potion.use_type_id(), 51);
        assert_eq!(use_type_to_id("nonsense"), 0);
    }

    #[test]
    fn test_material_and_class_bits() {
        let t = ItemTemplate { material: "mithril".into(), use_royal: true, use_elf: true, ..Default::default() };
        assert_eq!(t.material_id(), 17);
        assert_eq!(t.class_bitmask(), 0b101);
    }

    #[test]
    fn test_two_handed() {
        let bow = ItemTemplate { kind: "bow".into(), ..Default::default() };
        let sword = ItemTemplate { kind: "sword".into(), ..Default::default() };
        assert!(bow.is_two_handed());
        assert!(!sword.is_two_handed());
    }
}
