//! NPC crafting recipes (`crafts.yaml`), keyed by the dialog action string.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct CraftPart {
    pub item_id: i32,
    pub amount: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CraftRecipe {
    pub action: String,
    /// 0 = any NPC may offer it
    pub npc_id: i32,
    /// Several sets may be made at once through the amount dialog.
    pub amount_inputable: bool,
    pub materials: Vec<CraftPart>,
    pub items: Vec<CraftPart>,
}

#[derive(Debug, Default, Deserialize)]
struct CraftFile {
    #[serde(default)]
    recipes: Vec<CraftRecipe>,
}

#[derive(Debug, Default)]
pub struct CraftTable {
    recipes: HashMap<String, CraftRecipe>,
}

impl CraftTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: CraftFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for r in file.recipes {
            if r.materials.iter().chain(&r.items).any(|p| p.amount <= 0) {
                return Err(DataError::Invalid { file: "crafts.yaml", reason: format!("non-positive amount in {}", r.action) });
            }
            table.insert(r);
        }
        Ok(table)
    }

    pub fn insert(&mut self, recipe: CraftRecipe) {
        self.recipes.insert(recipe.action.clone(), recipe);
    }

    pub fn get(&self, action: &str) -> Option<&CraftRecipe> {
        self.recipes.get(action)
    }

    pub fn count(&self) -> usize {
        self.recipes.len()
    }
}
