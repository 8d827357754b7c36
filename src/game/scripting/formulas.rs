//! Built-in balance formulas.

use crate::game::buff::{SideEffect, BRAVE_CONFLICTS, HASTE_CONFLICTS, SKILL_GREATER_HASTE, SKILL_HASTE, SKILL_HOLY_WALK};
use crate::game::char_reset::SixStats;
use crate::game::stats::StatDelta;
use crate::game::player::{
    CLASS_DARKELF, CLASS_DRAGONKNIGHT, CLASS_ELF, CLASS_ILLUSIONIST, CLASS_KNIGHT, CLASS_MAGE, CLASS_ROYAL,
};

use super::{
    AttackOutcome, BuffEffect, CharCreateData, CombatContext, DurabilityContext, DurabilityResult, EnchantContext,
    EnchantResult, LevelUp, PotionEffect, PotionKind, RangedCombatContext, RespawnLocation, SkillDamage, SkillDamageContext,
    SpellTier,
};

pub const MAX_LEVEL: i32 = 99;
/// Bare-handed damage die.
pub const FIST_DAMAGE: i32 = 4;

/// Exp needed for levels 2..=5; from 6 on the curve is polynomial.
const LOW_LEVEL_EXP: [i64; 4] = [125, 300, 500, 750];

fn roll(max: i32) -> i32 {
    if max <= 1 {
        return max.max(0);
    }
    rand::random_range(1..=max)
}

fn chance(percent: i32) -> bool {
    rand::random_range(0..100) < percent
}

// ─── Experience ─────────────────────────────────────────────────────────────

pub fn exp_for_level(level: i32) -> i64 {
    let level = level.clamp(1, MAX_LEVEL);
    match level {
        1 => 0,
        2..=5 => LOW_LEVEL_EXP[(level - 2) as usize],
        6..=50 => i64::from(level).pow(4),
        _ => i64::from(level).pow(4) * i64::from(level - 49),
    }
}

pub fn level_from_exp(exp: i64) -> i32 {
    let mut level = 1;
    while level < MAX_LEVEL && exp_for_level(level + 1) <= exp {
        level += 1;
    }
    level
}

/// Nothing below level 10; 5% of the current level's span otherwise.
pub fn death_exp_penalty(level: i32, exp: i64) -> i64 {
    if level < 10 {
        return 0;
    }
    let span = exp_for_level(level + 1) - exp_for_level(level);
    (span / 20).min(exp).max(0)
}

// ─── Character creation and growth ──────────────────────────────────────────

pub fn char_create_data(class_type: i16) -> Option<CharCreateData> {
    let (base, bonus, hp, mp, male, female, spells) = match class_type {
        CLASS_ROYAL => (SixStats { str: 13, dex: 10, con: 10, wis: 11, cha: 13, intel: 10 }, 8, 14, 2, 0, 1, vec![]),
        CLASS_KNIGHT => (SixStats { str: 16, dex: 12, con: 14, wis: 9, cha: 12, intel: 8 }, 4, 16, 1, 61, 48, vec![]),
        CLASS_ELF => (SixStats { str: 11, dex: 12, con: 12, wis: 12, cha: 9, intel: 12 }, 7, 15, 4, 138, 37, vec![]),
        CLASS_MAGE => (SixStats { str: 8, dex: 7, con: 12, wis: 12, cha: 8, intel: 12 }, 16, 12, 6, 734, 1186, vec![1]),
        CLASS_DARKELF => (SixStats { str: 12, dex: 15, con: 8, wis: 10, cha: 9, intel: 11 }, 10, 12, 3, 2786, 2796, vec![]),
        CLASS_DRAGONKNIGHT => {
            (SixStats { str: 13, dex: 11, con: 14, wis: 12, cha: 8, intel: 11 }, 6, 16, 2, 6658, 6661, vec![])
        }
        CLASS_ILLUSIONIST => {
            (SixStats { str: 11, dex: 10, con: 12, wis: 12, cha: 8, intel: 12 }, 10, 14, 5, 6671, 6650, vec![])
        }
        _ => return None,
    };
    Some(CharCreateData { base, bonus, base_hp: hp, base_mp: mp, male_gfx: male, female_gfx: female, initial_spells: spells })
}

pub fn init_hp(class_type: i16, con: i32) -> i32 {
    let base = char_create_data(class_type).map_or(14, |d| d.base_hp);
    base + (con - 12).max(0) / 2
}

pub fn init_mp(class_type: i16, wis: i32) -> i32 {
    let base = char_create_data(class_type).map_or(1, |d| d.base_mp);
    base + (wis - 12).max(0) / 3
}

/// HP and MP gained on one level.
pub fn level_up(class_type: i16, con: i32, wis: i32) -> LevelUp {
    let (hp_die, mp_die) = match class_type {
        CLASS_KNIGHT => (16, 1),
        CLASS_DRAGONKNIGHT => (14, 2),
        CLASS_ROYAL => (11, 3),
        CLASS_ELF => (10, 4),
        CLASS_DARKELF => (10, 3),
        CLASS_ILLUSIONIST => (9, 5),
        CLASS_MAGE => (8, 6),
        _ => (8, 2),
    };
    let con_bonus = (con - 14).clamp(0, 10);
    let wis_bonus = (wis - 12).clamp(0, 8) / 2;
    LevelUp { hp: roll(hp_die) + con_bonus, mp: roll(mp_die) + wis_bonus }
}

// ─── Combat ─────────────────────────────────────────────────────────────────

/// 55 + 2·Δlevel + 3·hit + DEX over 12 + target AC, clamped to 5..=95.
pub fn hit_chance(attacker_level: i32, target_level: i32, hit_mod: i32, dex: i32, target_ac: i32) -> i32 {
    (55 + 2 * (attacker_level - target_level) + 3 * hit_mod + (dex - 12).max(0) + target_ac).clamp(5, 95)
}

/// Negative AC soaks up to |AC|/2 per hit.
fn ac_reduction(target_ac: i32) -> i32 {
    if target_ac >= 0 {
        return 0;
    }
    rand::random_range(0..=target_ac.abs() / 2)
}

pub fn melee_attack(ctx: &CombatContext) -> AttackOutcome {
    let p = hit_chance(ctx.attacker_level, ctx.target_level, ctx.attacker_hit_mod, ctx.attacker_dex, ctx.target_ac);
    if !chance(p) {
        return AttackOutcome::miss();
    }
    let die = if ctx.attacker_weapon > 0 { ctx.attacker_weapon } else { FIST_DAMAGE };
    let str_bonus = (ctx.attacker_str - 12).max(0) / 2;
    let dmg = roll(die) + ctx.attacker_dmg_mod + str_bonus + ctx.attacker_level / 10 - ac_reduction(ctx.target_ac);
    AttackOutcome::hit(dmg.max(1))
}

pub fn ranged_attack(ctx: &RangedCombatContext) -> AttackOutcome {
    let p = hit_chance(ctx.attacker_level, ctx.target_level, ctx.attacker_bow_hit_mod, ctx.attacker_dex, ctx.target_ac);
    if !chance(p) {
        return AttackOutcome::miss();
    }
    let dex_bonus = (ctx.attacker_dex - 12).max(0) / 2;
    let dmg = roll(ctx.attacker_bow_dmg.max(1)) + roll(ctx.attacker_arrow_dmg) + ctx.attacker_bow_dmg_mod + dex_bonus
        - ac_reduction(ctx.target_ac);
    AttackOutcome::hit(dmg.max(1))
}

pub fn npc_melee(ctx: &CombatContext) -> AttackOutcome {
    let p = (50 + 2 * (ctx.attacker_level - ctx.target_level) + ctx.target_ac).clamp(5, 95);
    if !chance(p) {
        return AttackOutcome::miss();
    }
    let die = (ctx.attacker_level / 2 + ctx.attacker_str / 3).max(1);
    AttackOutcome::hit((roll(die) - ac_reduction(ctx.target_ac)).max(1))
}

pub fn skill_damage(ctx: &SkillDamageContext) -> SkillDamage {
    let mut dmg = ctx.damage_value;
    for _ in 0..ctx.damage_dice_count.max(0) {
        dmg += roll(ctx.damage_dice);
    }
    dmg += ctx.attacker_sp + (ctx.attacker_int - 12).max(0) / 2;

    let resist = match ctx.attr {
        1 => ctx.target_earth_res,
        2 => ctx.target_fire_res,
        4 => ctx.target_water_res,
        8 => ctx.target_wind_res,
        _ => 0,
    };
    let mr = ctx.target_mr.clamp(0, 90);
    dmg = dmg * (100 - mr) / 100;
    dmg = dmg * (100 - resist.clamp(0, 100)) / 100;
    SkillDamage { damage: dmg.max(1), hit_count: 1 }
}

pub fn heal_amount(value: i32, dice: i32, dice_count: i32, intel: i32, sp: i32) -> i32 {
    let mut heal = value;
    for _ in 0..dice_count.max(0) {
        heal += roll(dice);
    }
    (heal + sp + (intel - 12).max(0) / 2).max(1)
}

// ─── Items ──────────────────────────────────────────────────────────────────

pub fn enchant(ctx: &EnchantContext) -> EnchantResult {
    if ctx.scroll_bless == 2 {
        return EnchantResult::Minus(1);
    }
    if ctx.safe_enchant < 0 {
        return EnchantResult::Fail;
    }
    if ctx.enchant_lvl < ctx.safe_enchant {
        let amount = if ctx.scroll_bless == 1 { rand::random_range(1..=3) } else { 1 };
        return EnchantResult::Success(amount.min(ctx.safe_enchant - ctx.enchant_lvl).max(1));
    }
    let base = if ctx.is_weapon { ctx.weapon_chance } else { ctx.armor_chance };
    let over = f64::from(ctx.enchant_lvl - ctx.safe_enchant + 1);
    if rand::random::<f64>() < base / over {
        EnchantResult::Success(1)
    } else {
        EnchantResult::Break
    }
}

/// Weapons wear up to `enchant + 5` steps. Blessed steel wears slowest,
/// cursed fastest.
pub fn durability_damage(ctx: &DurabilityContext) -> DurabilityResult {
    let max_durability = (ctx.enchant_lvl + 5).max(0);
    if ctx.current_durability >= max_durability {
        return DurabilityResult { should_damage: false, max_durability };
    }
    let odds = match ctx.bless {
        0 => 1,
        2 => 6,
        _ => 3,
    };
    DurabilityResult { should_damage: chance(odds), max_durability }
}

/// Percent chance a poisonous monster's hit infects.
pub const POISON_INFECT_PERCENT: i32 = 15;

pub fn poison_infects() -> bool {
    chance(POISON_INFECT_PERCENT)
}

pub fn potion_effect(item_id: i32) -> Option<PotionEffect> {
    let p = |kind, amount, range, duration_secs, gfx| PotionEffect {
        kind,
        amount,
        range,
        duration_secs,
        gfx,
        sp: 0,
        class_only: None,
    };
    Some(match item_id {
        40010 => p(PotionKind::Heal, 15, 5, 0, 189),
        40011 => p(PotionKind::Heal, 45, 10, 0, 194),
        40012 => p(PotionKind::Heal, 75, 15, 0, 197),
        40013 => p(PotionKind::Haste, 0, 0, 300, 191),
        40018 => p(PotionKind::Haste, 0, 0, 1800, 191),
        40014 => PotionEffect { class_only: Some(CLASS_KNIGHT), ..p(PotionKind::Brave, 0, 0, 1800, 751) },
        40015 => p(PotionKind::BluePotion, 0, 0, 600, 190),
        40016 => PotionEffect { sp: 2, class_only: Some(CLASS_MAGE), ..p(PotionKind::Wisdom, 0, 0, 300, 750) },
        40017 => p(PotionKind::CurePoison, 0, 0, 0, 192),
        40021 => p(PotionKind::Mana, 10, 5, 0, 190),
        _ => return None,
    })
}

pub const SKILL_SHIELD: i32 = 3;
pub const SKILL_PHYSICAL_ENCHANT_DEX: i32 = 26;
pub const SKILL_PHYSICAL_ENCHANT_STR: i32 = 42;
pub const SKILL_BLESS_WEAPON: i32 = 48;
pub const SKILL_INVISIBILITY: i32 = 60;

pub fn buff_effect(skill_id: i32, _target_level: i32) -> Option<BuffEffect> {
    let stat = |delta: StatDelta| BuffEffect { delta, ..Default::default() };
    let speed = |effect: SideEffect, exclusions: &[i32]| BuffEffect {
        effect: Some(effect),
        exclusions: exclusions.iter().copied().filter(|&id| id != skill_id).collect(),
        ..Default::default()
    };
    Some(match skill_id {
        SKILL_SHIELD => stat(StatDelta { ac: -2, ..Default::default() }),
        SKILL_PHYSICAL_ENCHANT_DEX => stat(StatDelta { dex: 5, ..Default::default() }),
        SKILL_PHYSICAL_ENCHANT_STR => stat(StatDelta { str: 5, ..Default::default() }),
        SKILL_BLESS_WEAPON => stat(StatDelta { hit: 2, dmg: 2, ..Default::default() }),
        SKILL_HASTE | SKILL_GREATER_HASTE => speed(SideEffect::MoveSpeed(1), &HASTE_CONFLICTS),
        SKILL_HOLY_WALK => speed(SideEffect::BraveSpeed(4), &BRAVE_CONFLICTS),
        SKILL_INVISIBILITY => BuffEffect { effect: Some(SideEffect::Invisible), ..Default::default() },
        _ => return None,
    })
}

/// Town a dead character returns to.
pub fn respawn_location(map_id: i16) -> RespawnLocation {
    match map_id {
        0 => RespawnLocation { map_id: 0, x: 32583, y: 32929 },
        _ => RespawnLocation { map_id: 4, x: 33089, y: 33397 },
    }
}

/// Magic-shop bands, one spell level per band. A level costs
/// `100 * level^2` adena; the character level needed grows per class.
pub fn spell_tiers(class_type: i16) -> Vec<SpellTier> {
    // (highest level, character levels per spell level, floor)
    let (max_skill_level, per_level, floor) = match class_type {
        CLASS_MAGE => (10, 4, 0),
        CLASS_ELF => (6, 8, 0),
        CLASS_ROYAL => (2, 10, 0),
        CLASS_DARKELF => (2, 12, 0),
        CLASS_KNIGHT => (1, 0, 50),
        _ => return Vec::new(),
    };
    (1..=max_skill_level)
        .map(|l| SpellTier {
            min_skill_level: l,
            max_skill_level: l,
            min_char_level: (l * per_level).max(floor),
            cost: 100 * l * l,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp_curve() {
        assert_eq!(exp_for_level(1), 0);
        assert_eq!(exp_for_level(5), 750);
        assert_eq!(exp_for_level(6), 1296);
        assert_eq!(exp_for_level(51), 51i64.pow(4) * 2);
        assert_eq!(level_from_exp(749), 4);
        assert_eq!(level_from_exp(750), 5);
        assert_eq!(level_from_exp(i64::MAX), MAX_LEVEL);
    }

    #[test]
    fn test_haste_excludes_other_haste_sources() {
        let e = buff_effect(SKILL_HASTE, 30).unwrap();
        assert_eq!(e.effect, Some(SideEffect::MoveSpeed(1)));
        assert!(!e.exclusions.contains(&SKILL_HASTE));
        assert!(e.exclusions.contains(&SKILL_GREATER_HASTE));
        assert_eq!(buff_effect(SKILL_SHIELD, 1).unwrap().delta.ac, -2);
        assert!(buff_effect(9999, 1).is_none());
    }

    #[test]
    fn test_worn_out_weapon_stops_wearing() {
        let ctx = DurabilityContext { enchant_lvl: 2, bless: 2, current_durability: 7 };
        let r = durability_damage(&ctx);
        assert!(!r.should_damage);
        assert_eq!(r.max_durability, 7);
        assert_eq!(durability_damage(&DurabilityContext { enchant_lvl: -9, ..ctx }).max_durability, 0);
    }

    #[test]
    fn test_death_penalty() {
        assert_eq!(death_exp_penalty(9, 5000), 0);
        let span = exp_for_level(31) - exp_for_level(30);
        assert_eq!(death_exp_penalty(30, exp_for_level(30)), span / 20);
        assert_eq!(death_exp_penalty(30, 3), 3);
    }

    #[test]
    fn test_hit_chance_clamps() {
        assert_eq!(hit_chance(1, 99, 0, 8, -50), 5);
        assert_eq!(hit_chance(99, 1, 10, 30, 10), 95);
        assert_eq!(hit_chance(30, 20, 0, 12, 0), 75);
    }

    #[test]
    fn test_create_data_totals() {
        for class in 0..=6 {
            let d = char_create_data(class).unwrap();
            assert_eq!(d.base.total() + d.bonus, 75, "class {}", class);
        }
    }

    #[test]
    fn test_spell_tiers_per_class() {
        let mage = spell_tiers(CLASS_MAGE);
        assert_eq!(mage.len(), 10);
        assert_eq!(SpellTier::price(&mage, 3, 12), Some(900));
        assert_eq!(SpellTier::price(&mage, 3, 11), None);
        assert_eq!(SpellTier::price(&spell_tiers(CLASS_KNIGHT), 1, 50), Some(100));
        assert_eq!(SpellTier::price(&spell_tiers(CLASS_KNIGHT), 2, 99), None);
        assert!(spell_tiers(CLASS_ILLUSIONIST).is_empty());
    }

    #[test]
    fn test_enchant_rules() {
        let ctx = EnchantContext {
            scroll_bless: 0,
            enchant_lvl: 0,
            safe_enchant: 6,
            is_weapon: true,
            weapon_chance: 0.68,
            armor_chance: 0.33,
        };
        assert_eq!(enchant(&ctx), EnchantResult::Success(1));
        assert_eq!(enchant(&EnchantContext { scroll_bless: 2, ..ctx }), EnchantResult::Minus(1));
        assert_eq!(enchant(&EnchantContext { safe_enchant: -1, ..ctx }), EnchantResult::Fail);
        assert_eq!(enchant(&EnchantContext { weapon_chance: 0.0, enchant_lvl: 6, ..ctx }), EnchantResult::Break);
    }

    #[test]
    fn test_skill_damage_respects_mr() {
        let ctx = SkillDamageContext { damage_value: 100, target_mr: 50, ..Default::default() };
        assert_eq!(skill_damage(&ctx).damage, 50);
        let ctx = SkillDamageContext { damage_value: 100, target_mr: 200, ..Default::default() };
        assert_eq!(skill_damage(&ctx).damage, 10);
    }
}
