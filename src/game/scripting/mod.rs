//! Formula facade: experience curve, combat rolls, potions, enchanting,
//! respawn points and character creation data.
//!
//! Every method is a pure function of its arguments plus randomness. The
//! trait's default bodies are the built-in formulas, so an implementation
//! only overrides what it wants to tune.

pub mod formulas;
#[cfg(feature = "lua")]
pub mod lua;

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::game::buff::SideEffect;
use crate::game::char_reset::SixStats;
use crate::game::stats::StatDelta;

#[cfg(feature = "lua")]
pub use lua::LuaScripting;

/// Class type of an NPC target in combat contexts.
pub const TARGET_NPC: i32 = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombatContext {
    pub attacker_level: i32,
    pub attacker_str: i32,
    pub attacker_dex: i32,
    /// Weapon damage die for the target's size; 0 = fist.
    pub attacker_weapon: i32,
    pub attacker_hit_mod: i32,
    pub attacker_dmg_mod: i32,
    pub target_ac: i32,
    pub target_level: i32,
    pub target_mr: i32,
    pub target_class_type: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangedCombatContext {
    pub attacker_level: i32,
    pub attacker_str: i32,
    pub attacker_dex: i32,
    pub attacker_bow_dmg: i32,
    pub attacker_arrow_dmg: i32,
    pub attacker_bow_hit_mod: i32,
    pub attacker_bow_dmg_mod: i32,
    pub target_ac: i32,
    pub target_level: i32,
    pub target_mr: i32,
    pub target_class_type: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttackOutcome {
    pub is_hit: bool,
    pub damage: i32,
}

impl AttackOutcome {
    pub fn hit(damage: i32) -> Self {
        Self { is_hit: true, damage }
    }

    pub fn miss() -> Self {
        Self { is_hit: false, damage: 0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkillDamageContext {
    pub skill_id: i32,
    pub damage_value: i32,
    pub damage_dice: i32,
    pub damage_dice_count: i32,
    pub skill_level: i32,
    /// 0 none, 1 earth, 2 fire, 4 water, 8 wind
    pub attr: i32,
    pub attacker_level: i32,
    pub attacker_int: i32,
    pub attacker_sp: i32,
    pub target_level: i32,
    pub target_mr: i32,
    pub target_fire_res: i32,
    pub target_water_res: i32,
    pub target_wind_res: i32,
    pub target_earth_res: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkillDamage {
    pub damage: i32,
    pub hit_count: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelUp {
    pub hp: i32,
    pub mp: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PotionKind {
    Heal,
    Mana,
    Haste,
    Brave,
    Wisdom,
    BluePotion,
    CurePoison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PotionEffect {
    pub kind: PotionKind,
    pub amount: i32,
    /// Extra random amount on top of `amount`.
    pub range: i32,
    pub duration_secs: u32,
    pub gfx: i32,
    /// Wisdom potion SP bonus.
    pub sp: i32,
    /// Class allowed to drink, `None` = everyone.
    pub class_only: Option<i16>,
}

/// What a buff skill does to its target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuffEffect {
    pub delta: StatDelta,
    pub effect: Option<SideEffect>,
    /// Buffs removed before this one lands.
    pub exclusions: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnchantContext {
    /// 0 normal, 1 blessed, 2 cursed
    pub scroll_bless: i32,
    pub enchant_lvl: i32,
    pub safe_enchant: i32,
    pub is_weapon: bool,
    pub weapon_chance: f64,
    pub armor_chance: f64,
}

/// Wielded weapon at the moment it lands a hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurabilityContext {
    pub enchant_lvl: i32,
    /// 0 blessed, 1 normal, 2 cursed
    pub bless: i32,
    pub current_durability: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurabilityResult {
    pub should_damage: bool,
    /// Wear stops growing once it reaches this.
    pub max_durability: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnchantResult {
    Success(i32),
    Minus(i32),
    Fail,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnLocation {
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharCreateData {
    pub base: SixStats,
    pub bonus: i32,
    pub base_hp: i32,
    pub base_mp: i32,
    pub male_gfx: i32,
    pub female_gfx: i32,
    pub initial_spells: Vec<i32>,
}

/// A band of spell levels a class may buy from a magic shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellTier {
    pub min_skill_level: i32,
    pub max_skill_level: i32,
    pub min_char_level: i32,
    pub cost: i32,
}

impl SpellTier {
    /// Price of `skill_level` for a character at `char_level`. `None` when
    /// the band does not cover the level or the character is too young.
    pub fn price(tiers: &[SpellTier], skill_level: i32, char_level: i32) -> Option<i32> {
        let tier = tiers.iter().find(|t| (t.min_skill_level..=t.max_skill_level).contains(&skill_level))?;
        (char_level >= tier.min_char_level).then_some(tier.cost)
    }
}

pub trait Scripting: Send + Sync {
    /// Total exp needed to reach `level`.
    fn exp_for_level(&self, level: i32) -> i64 {
        formulas::exp_for_level(level)
    }

    fn level_from_exp(&self, exp: i64) -> i32 {
        formulas::level_from_exp(exp)
    }

    fn calc_init_hp(&self, class_type: i16, con: i32) -> i32 {
        formulas::init_hp(class_type, con)
    }

    fn calc_init_mp(&self, class_type: i16, wis: i32) -> i32 {
        formulas::init_mp(class_type, wis)
    }

    fn calc_level_up(&self, class_type: i16, con: i32, wis: i32) -> LevelUp {
        formulas::level_up(class_type, con, wis)
    }

    fn calc_death_exp_penalty(&self, level: i32, exp: i64) -> i64 {
        formulas::death_exp_penalty(level, exp)
    }

    fn calc_melee_attack(&self, ctx: &CombatContext) -> AttackOutcome {
        formulas::melee_attack(ctx)
    }

    fn calc_ranged_attack(&self, ctx: &RangedCombatContext) -> AttackOutcome {
        formulas::ranged_attack(ctx)
    }

    fn calc_npc_melee(&self, ctx: &CombatContext) -> AttackOutcome {
        formulas::npc_melee(ctx)
    }

    fn calc_skill_damage(&self, ctx: &SkillDamageContext) -> SkillDamage {
        formulas::skill_damage(ctx)
    }

    fn calc_heal(&self, value: i32, dice: i32, dice_count: i32, intel: i32, sp: i32) -> i32 {
        formulas::heal_amount(value, dice, dice_count, intel, sp)
    }

    fn calc_enchant(&self, ctx: &EnchantContext) -> EnchantResult {
        formulas::enchant(ctx)
    }

    fn calc_durability_damage(&self, ctx: &DurabilityContext) -> DurabilityResult {
        formulas::durability_damage(ctx)
    }

    /// Whether a poisonous monster's landed hit infects.
    fn poison_infects(&self) -> bool {
        formulas::poison_infects()
    }

    fn potion_effect(&self, item_id: i32) -> Option<PotionEffect> {
        formulas::potion_effect(item_id)
    }

    /// `None` for a plain timer buff without stat changes.
    fn buff_effect(&self, skill_id: i32, target_level: i32) -> Option<BuffEffect> {
        formulas::buff_effect(skill_id, target_level)
    }

    fn respawn_location(&self, map_id: i16) -> Option<RespawnLocation> {
        Some(formulas::respawn_location(map_id))
    }

    fn char_create_data(&self, class_type: i16) -> Option<CharCreateData> {
        formulas::char_create_data(class_type)
    }

    /// Spell levels `class_type` can buy, empty when it buys none.
    fn spell_tiers(&self, class_type: i16) -> Vec<SpellTier> {
        formulas::spell_tiers(class_type)
    }
}

/// The built-in formulas.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFormulas;

impl Scripting for StdFormulas {}

/// Built-in formulas with queued combat results, for deterministic
/// combat in tests and replays. Falls back to the real rolls once the
/// queue runs dry. Weapons never wear unless [`ScriptedOutcomes::wearing`]
/// is set.
#[derive(Debug, Default)]
pub struct ScriptedOutcomes {
    outcomes: Mutex<VecDeque<AttackOutcome>>,
    wear: bool,
    poison: bool,
}

impl ScriptedOutcomes {
    pub fn new(outcomes: impl IntoIterator<Item = AttackOutcome>) -> Self {
        Self { outcomes: Mutex::new(outcomes.into_iter().collect()), wear: false, poison: false }
    }

    /// Every hit wears the weapon until it reaches its limit.
    pub fn wearing(mut self) -> Self {
        self.wear = true;
        self
    }

    /// Every landed monster hit infects.
    pub fn poisoning(mut self) -> Self {
        self.poison = true;
        self
    }

    pub fn push(&self, outcome: AttackOutcome) {
        if let Ok(mut q) = self.outcomes.lock() {
            q.push_back(outcome);
        }
    }

    fn next(&self) -> Option<AttackOutcome> {
        self.outcomes.lock().ok().and_then(|mut q| q.pop_front())
    }
}

impl Scripting for ScriptedOutcomes {
    fn calc_melee_attack(&self, ctx: &CombatContext) -> AttackOutcome {
        self.next().unwrap_or_else(|| formulas::melee_attack(ctx))
    }

    fn calc_ranged_attack(&self, ctx: &RangedCombatContext) -> AttackOutcome {
        self.next().unwrap_or_else(|| formulas::ranged_attack(ctx))
    }

    fn calc_npc_melee(&self, ctx: &CombatContext) -> AttackOutcome {
        self.next().unwrap_or_else(|| formulas::npc_melee(ctx))
    }

    fn calc_durability_damage(&self, ctx: &DurabilityContext) -> DurabilityResult {
        let max_durability = (ctx.enchant_lvl + 5).max(0);
        DurabilityResult { should_damage: self.wear && ctx.current_durability < max_durability, max_durability }
    }

    fn poison_infects(&self) -> bool {
        self.poison
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_outcomes_drain_in_order() {
        let s = ScriptedOutcomes::new([AttackOutcome::hit(20), AttackOutcome::miss()]);
        let ctx = CombatContext::default();
        assert_eq!(s.calc_melee_attack(&ctx), AttackOutcome::hit(20));
        assert_eq!(s.calc_melee_attack(&ctx), AttackOutcome::miss());
        s.push(AttackOutcome::hit(35));
        assert_eq!(s.calc_melee_attack(&ctx).damage, 35);
    }

    #[test]
    fn test_std_formulas_use_defaults() {
        let s = StdFormulas;
        assert_eq!(s.exp_for_level(2), 125);
        assert_eq!(s.level_from_exp(0), 1);
        assert!(s.potion_effect(40010).is_some());
        assert!(s.char_create_data(9).is_none());
    }
}
