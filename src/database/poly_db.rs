//! Polymorph forms (`polymorphs.yaml`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

/// Polymorph cause bits.
pub const CAUSE_MAGIC: i32 = 1;
pub const CAUSE_GM: i32 = 2;
pub const CAUSE_NPC: i32 = 4;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolyForm {
    pub poly_id: i32,
    pub name: String,
    pub min_level: i32,
    /// seconds, 0 = use the caster's default
    pub duration: u32,
    pub cause: i32,
    pub can_use_skill: bool,
    /// Weapon kinds this form can wield ("sword", "bow", ...). Empty = any.
    pub weapons: Vec<String>,
    /// Armor kinds this form can wear ("helm", "armor", ...). Empty = any.
    pub armors: Vec<String>,
}

impl PolyForm {
    pub fn allows(&self, cause: i32) -> bool {
        self.cause & cause != 0
    }

    pub fn can_wield(&self, weapon_kind: &str) -> bool {
        self.weapons.is_empty() || self.weapons.iter().any(|w| w == weapon_kind)
    }

    pub fn can_wear(&self, armor_kind: &str) -> bool {
        self.armors.is_empty() || self.armors.iter().any(|a| a == armor_kind)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PolyFile {
    #[serde(default)]
    polymorphs: Vec<PolyForm>,
}

#[derive(Debug, Default)]
pub struct PolyTable {
    forms: HashMap<i32, PolyForm>,
    by_name: HashMap<String, i32>,
}

impl PolyTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: PolyFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for f in file.polymorphs {
            table.insert(f);
        }
        Ok(table)
    }

    pub fn insert(&mut self, form: PolyForm) {
        self.by_name.insert(form.name.to_lowercase(), form.poly_id);
        self.forms.insert(form.poly_id, form);
    }

    pub fn get(&self, poly_id: i32) -> Option<&PolyForm> {
        self.forms.get(&poly_id)
    }

    /// Case-insensitive lookup by the name players type into the scroll dialog.
    pub fn get_by_name(&self, name: &str) -> Option<&PolyForm> {
        let id = self.by_name.get(&name.to_lowercase())?;
        self.forms.get(id)
    }

    pub fn count(&self) -> usize {
        self.forms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_rules() {
        let file: PolyFile = serde_yaml::from_str(
            r#"
polymorphs:
  - poly_id: 29
    name: Orc Fighter
    min_level: 10
    duration: 1800
    cause: 7
    weapons: [sword, axe]
    armors: [helm]
"#,
        )
        .unwrap();
        let mut t = PolyTable::default();
        for f in file.polymorphs {
            t.insert(f);
        }
        let f = t.get_by_name("orc fighter").unwrap();
        assert_eq!(f.poly_id, 29);
        assert!(f.allows(CAUSE_MAGIC));
        assert!(f.can_wield("axe"));
        assert!(!f.can_wield("bow"));
        assert!(!f.can_wear("cloak"));
        assert!(t.get(30).is_none());
    }
}
