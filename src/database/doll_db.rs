//! Magic doll definitions (`dolls.yaml`), keyed by the summoning item id.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

/// One stat the doll lends its master, e.g. `{type: ac, value: -2}`.
/// A `skill` power carries the skill id in `value` and a per-tick `chance`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DollPower {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: i32,
    pub chance: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DollTemplate {
    pub item_id: i32,
    pub name: String,
    pub nameid: String,
    pub gfx_id: i32,
    /// seconds
    pub duration: u32,
    pub powers: Vec<DollPower>,
}

#[derive(Debug, Default, Deserialize)]
struct DollFile {
    #[serde(default)]
    dolls: Vec<DollTemplate>,
}

#[derive(Debug, Default)]
pub struct DollTable {
    dolls: HashMap<i32, DollTemplate>,
}

impl DollTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: DollFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for d in file.dolls {
            table.insert(d);
        }
        Ok(table)
    }

    pub fn insert(&mut self, doll: DollTemplate) {
        self.dolls.insert(doll.item_id, doll);
    }

    pub fn get(&self, item_id: i32) -> Option<&DollTemplate> {
        self.dolls.get(&item_id)
    }

    pub fn is_doll_item(&self, item_id: i32) -> bool {
        self.dolls.contains_key(&item_id)
    }

    pub fn count(&self) -> usize {
        self.dolls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_powers() {
        let file: DollFile = serde_yaml::from_str(
            r#"
dolls:
  - item_id: 41248
    name: Bugbear Doll
    gfx_id: 2376
    duration: 1800
    powers:
      - {type: ac, value: -2}
      - {type: skill, value: 4, chance: 10}
"#,
        )
        .unwrap();
        let d = &file.dolls[0];
        assert_eq!(d.powers.len(), 2);
        assert_eq!(d.powers[0].kind, "ac");
        assert_eq!(d.powers[1].chance, 10);
    }
}
