//! Respec state machine: `Init → Stage1 → Stage2 → Stage3 → Done`.
//!
//! Only the bookkeeping lives here. HP/MP rolls, packets and the final
//! teleport are driven by the handler.

/// Candle of memories, consumed on completion.
pub const RESET_CANDLE_ID: i32 = 49142;
/// Where a finished respec lands.
pub const RESET_END: (i16, i32, i32) = (4, 32628, 32772);
/// Stat total of a fresh character.
const INIT_STAT_TOTAL: i32 = 75;

/// Stat order used by the reset packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SixStats {
    pub str: i32,
    pub intel: i32,
    pub wis: i32,
    pub dex: i32,
    pub con: i32,
    pub cha: i32,
}

impl SixStats {
    pub fn from_bytes(b: [u8; 6]) -> Self {
        Self {
            str: i32::from(b[0]),
            intel: i32::from(b[1]),
            wis: i32::from(b[2]),
            dex: i32::from(b[3]),
            con: i32::from(b[4]),
            cha: i32::from(b[5]),
        }
    }

    pub fn total(&self) -> i32 {
        self.str + self.intel + self.wis + self.dex + self.con + self.cha
    }

    pub fn all_at_least(&self, min: &SixStats) -> bool {
        self.str >= min.str
            && self.intel >= min.intel
            && self.wis >= min.wis
            && self.dex >= min.dex
            && self.con >= min.con
            && self.cha >= min.cha
    }

    /// Value of the stat with code 1..=6.
    pub fn value(&self, code: u8) -> Option<i32> {
        match code {
            1 => Some(self.str),
            2 => Some(self.intel),
            3 => Some(self.wis),
            4 => Some(self.dex),
            5 => Some(self.con),
            6 => Some(self.cha),
            _ => None,
        }
    }

    /// Raises one stat by code 1..=6 (STR, INT, WIS, DEX, CON, CHA).
    pub fn bump(&mut self, code: u8) -> bool {
        let slot = match code {
            1 => &mut self.str,
            2 => &mut self.intel,
            3 => &mut self.wis,
            4 => &mut self.dex,
            5 => &mut self.con,
            6 => &mut self.cha,
            _ => return false,
        };
        *slot += 1;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStage {
    Init,
    Stage1,
    Stage2,
    Stage3,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResetError {
    #[error("packet not valid in stage {0:?}")]
    WrongStage(ResetStage),
    #[error("stat below class minimum")]
    BelowMinimum,
    #[error("stat total {got} != {want}")]
    BadTotal { got: i32, want: i32 },
    #[error("level cap reached")]
    LevelCap,
}

/// What the character looked like before the respec, put back if the
/// player leaves halfway.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResetOrigin {
    pub level: i32,
    pub exp: i64,
    pub stats: SixStats,
    pub max_hp: i32,
    pub max_mp: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharReset {
    pub stage: ResetStage,
    pub max_level: i32,
    pub temp_level: i32,
    pub elixir: i32,
    pub stats: SixStats,
    pub origin: ResetOrigin,
}

impl CharReset {
    /// Opens a respec. `current_total` is the character's raw stat sum;
    /// points spent above level 50 count towards the target level.
    pub fn start(level: i32, bonus_used: i32, elixir: i32, current_total: i32, class_base: SixStats) -> Self {
        let mut total = current_total;
        if level > 50 {
            total += level - 50 - bonus_used;
        }
        let diff = total - (INIT_STAT_TOTAL + elixir);
        let max_level = if diff > 0 { (50 + diff).min(99) } else { level };
        Self { stage: ResetStage::Stage1, max_level, temp_level: 1, elixir, stats: class_base, origin: ResetOrigin::default() }
    }

    /// Initial allocation. Every stat must meet the class base and the total
    /// must equal the class base total plus the creation bonus.
    pub fn stage1(&mut self, stats: SixStats, class_base: &SixStats, bonus: i32) -> Result<(), ResetError> {
        if self.stage != ResetStage::Stage1 {
            return Err(ResetError::WrongStage(self.stage));
        }
        if !stats.all_at_least(class_base) {
            return Err(ResetError::BelowMinimum);
        }
        let want = class_base.total() + bonus;
        if stats.total() != want {
            return Err(ResetError::BadTotal { got: stats.total(), want });
        }
        self.stats = stats;
        self.temp_level = 1;
        self.stage = ResetStage::Stage2;
        Ok(())
    }

    /// Advances `levels` levels. Fails without changing anything when that
    /// would pass the cap.
    pub fn level_up(&mut self, levels: i32) -> Result<(), ResetError> {
        if self.stage != ResetStage::Stage2 {
            return Err(ResetError::WrongStage(self.stage));
        }
        if self.temp_level + levels > self.max_level {
            return Err(ResetError::LevelCap);
        }
        self.temp_level += levels;
        Ok(())
    }

    /// Closes stage 2. Returns true when elixir points send the client to
    /// stage 3; otherwise the reset is done.
    pub fn finish_levels(&mut self, last_stat: u8) -> Result<bool, ResetError> {
        if self.stage != ResetStage::Stage2 {
            return Err(ResetError::WrongStage(self.stage));
        }
        self.stats.bump(last_stat);
        if self.elixir > 0 {
            self.stage = ResetStage::Stage3;
            Ok(true)
        } else {
            self.stage = ResetStage::Done;
            Ok(false)
        }
    }

    /// Elixir overwrite.
    pub fn stage3(&mut self, stats: SixStats) -> Result<(), ResetError> {
        if self.stage != ResetStage::Stage3 {
            return Err(ResetError::WrongStage(self.stage));
        }
        self.stats = stats;
        self.stage = ResetStage::Done;
        Ok(())
    }

    /// Bonus points already consumed by the final level.
    pub fn bonus_used(&self) -> i32 {
        (self.temp_level - 50).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knight_base() -> SixStats {
        SixStats { str: 16, intel: 8, wis: 9, dex: 12, con: 14, cha: 12 }
    }

    #[test]
    fn test_stage1_validation() {
        let mut r = CharReset::start(45, 0, 0, 85, knight_base());
        assert_eq!(r.max_level, 60);
        let low = SixStats { str: 10, ..knight_base() };
        assert_eq!(r.stage1(low, &knight_base(), 4), Err(ResetError::BelowMinimum));
        let bad = SixStats { str: 17, ..knight_base() };
        assert!(matches!(r.stage1(bad, &knight_base(), 4), Err(ResetError::BadTotal { .. })));
        let ok = SixStats { str: 20, ..knight_base() };
        assert!(r.stage1(ok, &knight_base(), 4).is_ok());
        assert_eq!(r.stage, ResetStage::Stage2);
    }

    #[test]
    fn test_level_cap_and_finish() {
        let mut r = CharReset::start(12, 0, 2, 70, knight_base());
        assert_eq!(r.max_level, 12);
        r.stage = ResetStage::Stage2;
        r.level_up(10).unwrap();
        assert_eq!(r.level_up(10), Err(ResetError::LevelCap));
        r.level_up(1).unwrap();
        assert_eq!(r.temp_level, 12);
        assert_eq!(r.finish_levels(1), Ok(true));
        assert_eq!(r.stats.str, 17);
        r.stage3(knight_base()).unwrap();
        assert_eq!(r.stage, ResetStage::Done);
    }
}
