//! Character attributes and the signed deltas that buffs and equipment apply.

use std::ops::{Add, Neg, Sub};

/// Live numeric attributes. `Player::base` holds the unmodified values;
/// `Player::attr` is base plus every applied delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes {
    pub str: i32,
    pub dex: i32,
    pub con: i32,
    pub wis: i32,
    pub intel: i32,
    pub cha: i32,
    pub ac: i32,
    pub hit: i32,
    pub dmg: i32,
    pub bow_hit: i32,
    pub bow_dmg: i32,
    pub sp: i32,
    pub mr: i32,
    pub hpr: i32,
    pub mpr: i32,
    pub max_hp: i32,
    pub max_mp: i32,
    pub fire_res: i32,
    pub water_res: i32,
    pub wind_res: i32,
    pub earth_res: i32,
}

macro_rules! stat_fields {
    ($mac:ident) => {
        $mac!(str, dex, con, wis, intel, cha, ac, hit, dmg, bow_hit, bow_dmg, sp, mr, hpr, mpr, max_hp, max_mp,
              fire_res, water_res, wind_res, earth_res)
    };
}

/// Per-stat signed change recorded on a buff or the equipment overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatDelta {
    pub str: i16,
    pub dex: i16,
    pub con: i16,
    pub wis: i16,
    pub intel: i16,
    pub cha: i16,
    pub ac: i16,
    pub hit: i16,
    pub dmg: i16,
    pub bow_hit: i16,
    pub bow_dmg: i16,
    pub sp: i16,
    pub mr: i16,
    pub hpr: i16,
    pub mpr: i16,
    pub max_hp: i16,
    pub max_mp: i16,
    pub fire_res: i16,
    pub water_res: i16,
    pub wind_res: i16,
    pub earth_res: i16,
}

impl StatDelta {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, a: &mut Attributes) {
        macro_rules! apply {
            ($($f:ident),*) => { $( a.$f += i32::from(self.$f); )* };
        }
        stat_fields!(apply);
    }

    /// Exact inverse of [`StatDelta::apply_to`].
    pub fn revert_from(&self, a: &mut Attributes) {
        macro_rules! revert {
            ($($f:ident),*) => { $( a.$f -= i32::from(self.$f); )* };
        }
        stat_fields!(revert);
    }
}

impl Add for StatDelta {
    type Output = StatDelta;

    fn add(self, rhs: StatDelta) -> StatDelta {
        let mut out = self;
        macro_rules! add {
            ($($f:ident),*) => { $( out.$f = out.$f.saturating_add(rhs.$f); )* };
        }
        stat_fields!(add);
        out
    }
}

impl Neg for StatDelta {
    type Output = StatDelta;

    fn neg(self) -> StatDelta {
        let mut out = self;
        macro_rules! neg {
            ($($f:ident),*) => { $( out.$f = out.$f.saturating_neg(); )* };
        }
        stat_fields!(neg);
        out
    }
}

impl Sub for StatDelta {
    type Output = StatDelta;

    fn sub(self, rhs: StatDelta) -> StatDelta {
        self + (-rhs)
    }
}
