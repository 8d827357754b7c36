//! Lua-tuned formulas. Globals that are missing or raise fall back to the
//! built-in formulas.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use mlua::{FromLuaMulti, Function, Lua, Table};

use super::{
    formulas, AttackOutcome, CombatContext, DurabilityContext, DurabilityResult, EnchantContext, EnchantResult, LevelUp,
    RangedCombatContext, RespawnLocation, Scripting, SkillDamage, SkillDamageContext, SpellTier,
};

/// Script folders, loaded in this order.
const SCRIPT_DIRS: [&str; 6] = ["core", "combat", "item", "character", "skill", "world"];

pub struct LuaScripting {
    lua: Mutex<Lua>,
}

impl LuaScripting {
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let lua = Lua::new();
        let dir = dir.as_ref();
        let mut loaded = 0usize;
        for sub in SCRIPT_DIRS {
            let path = dir.join(sub);
            let Ok(rd) = std::fs::read_dir(&path) else { continue };
            let mut files: Vec<_> = rd
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("lua"))
                .collect();
            files.sort();
            for file in files {
                let src = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
                let name = file.to_string_lossy().into_owned();
                if let Err(e) = lua.load(src.as_slice()).set_name(name).exec() {
                    tracing::warn!("[scripting] error loading {}: {}", file.display(), e);
                    continue;
                }
                loaded += 1;
            }
        }
        tracing::info!("[scripting] [loaded] dir={} files={}", dir.display(), loaded);
        Ok(Self { lua: Mutex::new(lua) })
    }

    /// Runs `f` against the global `name`; `None` when it is absent or fails.
    fn with_fn<R>(&self, name: &str, f: impl FnOnce(&Lua, Function) -> mlua::Result<R>) -> Option<R> {
        let lua = self.lua.lock().ok()?;
        let func: Function = lua.globals().get(name).ok()?;
        match f(&lua, func) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!("[scripting] [call_failed] fn={} err={}", name, e);
                None
            }
        }
    }

    fn call<R: FromLuaMulti>(&self, name: &str, args: impl mlua::IntoLuaMulti) -> Option<R> {
        self.with_fn(name, |_, f| f.call::<R>(args))
    }

    fn call_table(&self, name: &str, fill: impl FnOnce(&Table) -> mlua::Result<()>) -> Option<Table> {
        self.with_fn(name, |lua, f| {
            let t = lua.create_table()?;
            fill(&t)?;
            f.call::<Table>(t)
        })
    }
}

fn outcome(t: Table) -> AttackOutcome {
    AttackOutcome {
        is_hit: t.get::<bool>("is_hit").unwrap_or(false),
        damage: t.get::<i32>("damage").unwrap_or(0),
    }
}

fn fill_combat(t: &Table, ctx: &CombatContext) -> mlua::Result<()> {
    t.set("attacker_level", ctx.attacker_level)?;
    t.set("attacker_str", ctx.attacker_str)?;
    t.set("attacker_dex", ctx.attacker_dex)?;
    t.set("attacker_weapon", ctx.attacker_weapon)?;
    t.set("attacker_hit_mod", ctx.attacker_hit_mod)?;
    t.set("attacker_dmg_mod", ctx.attacker_dmg_mod)?;
    t.set("target_ac", ctx.target_ac)?;
    t.set("target_level", ctx.target_level)?;
    t.set("target_mr", ctx.target_mr)?;
    t.set("target_class_type", ctx.target_class_type)
}

impl Scripting for LuaScripting {
    fn exp_for_level(&self, level: i32) -> i64 {
        self.call("exp_for_level", level).unwrap_or_else(|| formulas::exp_for_level(level))
    }

    fn level_from_exp(&self, exp: i64) -> i32 {
        self.call("level_from_exp", exp).unwrap_or_else(|| formulas::level_from_exp(exp))
    }

    fn calc_init_hp(&self, class_type: i16, con: i32) -> i32 {
        self.call("calc_init_hp", (class_type, con)).unwrap_or_else(|| formulas::init_hp(class_type, con))
    }

    fn calc_init_mp(&self, class_type: i16, wis: i32) -> i32 {
        self.call("calc_init_mp", (class_type, wis)).unwrap_or_else(|| formulas::init_mp(class_type, wis))
    }

    fn calc_level_up(&self, class_type: i16, con: i32, wis: i32) -> LevelUp {
        let hp: Option<i32> = self.call("calc_level_up_hp", (class_type, con));
        let mp: Option<i32> = self.call("calc_level_up_mp", (class_type, wis));
        match (hp, mp) {
            (Some(hp), Some(mp)) => LevelUp { hp, mp },
            _ => formulas::level_up(class_type, con, wis),
        }
    }

    fn calc_death_exp_penalty(&self, level: i32, exp: i64) -> i64 {
        self.call("calc_death_exp_penalty", (level, exp))
            .unwrap_or_else(|| formulas::death_exp_penalty(level, exp))
    }

    fn calc_melee_attack(&self, ctx: &CombatContext) -> AttackOutcome {
        self.call_table("calc_melee_attack", |t| fill_combat(t, ctx))
            .map(outcome)
            .unwrap_or_else(|| formulas::melee_attack(ctx))
    }

    fn calc_npc_melee(&self, ctx: &CombatContext) -> AttackOutcome {
        self.call_table("calc_npc_melee", |t| fill_combat(t, ctx))
            .map(outcome)
            .unwrap_or_else(|| formulas::npc_melee(ctx))
    }

    fn calc_ranged_attack(&self, ctx: &RangedCombatContext) -> AttackOutcome {
        self.call_table("calc_ranged_attack", |t| {
            t.set("attacker_level", ctx.attacker_level)?;
            t.set("attacker_str", ctx.attacker_str)?;
            t.set("attacker_dex", ctx.attacker_dex)?;
            t.set("attacker_bow_dmg", ctx.attacker_bow_dmg)?;
            t.set("attacker_arrow_dmg", ctx.attacker_arrow_dmg)?;
            t.set("attacker_bow_hit_mod", ctx.attacker_bow_hit_mod)?;
            t.set("attacker_bow_dmg_mod", ctx.attacker_bow_dmg_mod)?;
            t.set("target_ac", ctx.target_ac)?;
            t.set("target_level", ctx.target_level)?;
            t.set("target_mr", ctx.target_mr)?;
            t.set("target_class_type", ctx.target_class_type)
        })
        .map(outcome)
        .unwrap_or_else(|| formulas::ranged_attack(ctx))
    }

    fn calc_skill_damage(&self, ctx: &SkillDamageContext) -> SkillDamage {
        self.call_table("calc_skill_damage", |t| {
            t.set("skill_id", ctx.skill_id)?;
            t.set("damage_value", ctx.damage_value)?;
            t.set("damage_dice", ctx.damage_dice)?;
            t.set("damage_dice_count", ctx.damage_dice_count)?;
            t.set("skill_level", ctx.skill_level)?;
            t.set("attr", ctx.attr)?;
            t.set("attacker_level", ctx.attacker_level)?;
            t.set("attacker_int", ctx.attacker_int)?;
            t.set("attacker_sp", ctx.attacker_sp)?;
            t.set("target_level", ctx.target_level)?;
            t.set("target_mr", ctx.target_mr)
        })
        .map(|t| SkillDamage {
            damage: t.get::<i32>("damage").unwrap_or(0),
            hit_count: t.get::<i32>("hit_count").unwrap_or(1).max(1),
        })
        .unwrap_or_else(|| formulas::skill_damage(ctx))
    }

    fn calc_enchant(&self, ctx: &EnchantContext) -> EnchantResult {
        let result = self.call_table("calc_enchant", |t| {
            t.set("scroll_bless", ctx.scroll_bless)?;
            t.set("enchant_lvl", ctx.enchant_lvl)?;
            t.set("safe_enchant", ctx.safe_enchant)?;
            t.set("category", if ctx.is_weapon { 1 } else { 2 })?;
            t.set("weapon_chance", ctx.weapon_chance)?;
            t.set("armor_chance", ctx.armor_chance)
        });
        let Some(t) = result else { return formulas::enchant(ctx) };
        let amount = t.get::<i32>("amount").unwrap_or(1);
        match t.get::<String>("result").unwrap_or_default().as_str() {
            "success" => EnchantResult::Success(amount),
            "minus" => EnchantResult::Minus(amount),
            "break" => EnchantResult::Break,
            _ => EnchantResult::Fail,
        }
    }

    fn calc_durability_damage(&self, ctx: &DurabilityContext) -> DurabilityResult {
        let result = self.call_table("calc_durability_damage", |t| {
            t.set("enchant_lvl", ctx.enchant_lvl)?;
            t.set("bless", ctx.bless)?;
            t.set("current_durability", ctx.current_durability)
        });
        let Some(t) = result else { return formulas::durability_damage(ctx) };
        DurabilityResult {
            should_damage: t.get::<bool>("should_damage").unwrap_or(false),
            max_durability: t.get::<i32>("max_durability").unwrap_or(ctx.enchant_lvl + 5),
        }
    }

    fn respawn_location(&self, map_id: i16) -> Option<RespawnLocation> {
        let t: Option<Table> = self.call("get_respawn_location", map_id);
        let loc = t.and_then(|t| {
            Some(RespawnLocation { map_id: t.get("map").ok()?, x: t.get("x").ok()?, y: t.get("y").ok()? })
        });
        Some(loc.unwrap_or_else(|| formulas::respawn_location(map_id)))
    }

    fn spell_tiers(&self, class_type: i16) -> Vec<SpellTier> {
        let Some(t) = self.call::<Table>("get_spell_tiers", class_type) else {
            return formulas::spell_tiers(class_type);
        };
        t.sequence_values::<Table>()
            .flatten()
            .filter_map(|row| {
                Some(SpellTier {
                    min_skill_level: row.get("min_skill_level").ok()?,
                    max_skill_level: row.get("max_skill_level").ok()?,
                    min_char_level: row.get("min_char_level").ok()?,
                    cost: row.get("cost").ok()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lua_overrides_and_fallback() {
        let dir = std::env::temp_dir().join(format!("aden_lua_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("core")).unwrap();
        std::fs::write(dir.join("core/exp.lua"), "function exp_for_level(l) return l * 10 end").unwrap();

        let s = LuaScripting::load(&dir).unwrap();
        assert_eq!(s.exp_for_level(7), 70);
        assert_eq!(s.level_from_exp(750), 5);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_lua_spell_tiers() {
        let dir = std::env::temp_dir().join(format!("aden_lua_tiers_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("skill")).unwrap();
        let src = "function get_spell_tiers(c) if c ~= 3 then return {} end \
            return {{min_skill_level = 1, max_skill_level = 3, min_char_level = 1, cost = 50}} end";
        std::fs::write(dir.join("skill/spellshop.lua"), src).unwrap();

        let s = LuaScripting::load(&dir).unwrap();
        let tiers = s.spell_tiers(3);
        assert_eq!(tiers, vec![SpellTier { min_skill_level: 1, max_skill_level: 3, min_char_level: 1, cost: 50 }]);
        assert!(s.spell_tiers(1).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
