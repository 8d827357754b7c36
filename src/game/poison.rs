//! Poison carried by a player.
//!
//! Damage poison bleeds HP on an interval until it runs out. Silence lasts
//! until cured. Paralysis poison numbs first (the victim can still walk) and
//! then freezes for a while before wearing off.

/// Ticks between two damage poison hits.
pub const DAMAGE_INTERVAL: u32 = 15;
/// Lifetime of a monster's damage poison.
pub const DAMAGE_TICKS: u32 = 150;
/// HP taken per hit by a monster's damage poison.
pub const MONSTER_POISON_DAMAGE: i32 = 20;
/// Numb phase before a paralysis poison freezes.
pub const NUMB_TICKS: u32 = 100;
/// How long the frozen phase lasts.
pub const FROZEN_TICKS: u32 = 80;

/// Client tint for a poisoned character.
pub const TINT_NONE: u8 = 0;
pub const TINT_GREEN: u8 = 1;
pub const TINT_GREY: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poison {
    Damage { ticks_left: u32, timer: u32, amount: i32 },
    Silence,
    Numbing { ticks_left: u32 },
    Frozen { ticks_left: u32 },
}

impl Poison {
    /// Poison for a monster's `poison_atk` code.
    pub fn from_attack(kind: i32) -> Option<Self> {
        match kind {
            1 => Some(Poison::Damage { ticks_left: DAMAGE_TICKS, timer: 0, amount: MONSTER_POISON_DAMAGE }),
            2 => Some(Poison::Silence),
            4 => Some(Poison::Numbing { ticks_left: NUMB_TICKS }),
            _ => None,
        }
    }

    pub fn tint(self) -> u8 {
        match self {
            Poison::Frozen { .. } => TINT_GREY,
            _ => TINT_GREEN,
        }
    }
}

/// What one tick of poison did to its carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoisonStep {
    Nothing,
    Damage(i32),
    /// Numbing turned into paralysis.
    Froze,
    /// The poison ran out; the carrier should be cured.
    WoreOff,
}

/// Advances the poison by one tick.
pub fn step(poison: &mut Poison) -> PoisonStep {
    match poison {
        Poison::Silence => PoisonStep::Nothing,
        Poison::Damage { ticks_left, timer, amount } => {
            *ticks_left = ticks_left.saturating_sub(1);
            if *ticks_left == 0 {
                return PoisonStep::WoreOff;
            }
            *timer += 1;
            if *timer < DAMAGE_INTERVAL {
                return PoisonStep::Nothing;
            }
            *timer = 0;
            PoisonStep::Damage(*amount)
        }
        Poison::Numbing { ticks_left } => {
            *ticks_left = ticks_left.saturating_sub(1);
            if *ticks_left > 0 {
                return PoisonStep::Nothing;
            }
            *poison = Poison::Frozen { ticks_left: FROZEN_TICKS };
            PoisonStep::Froze
        }
        Poison::Frozen { ticks_left } => {
            *ticks_left = ticks_left.saturating_sub(1);
            if *ticks_left > 0 {
                PoisonStep::Nothing
            } else {
                PoisonStep::WoreOff
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_poison_bites_on_interval_then_wears_off() {
        let mut p = Poison::from_attack(1).unwrap();
        let steps: Vec<PoisonStep> = (0..DAMAGE_TICKS).map(|_| step(&mut p)).collect();
        let bites = steps.iter().filter(|s| **s == PoisonStep::Damage(MONSTER_POISON_DAMAGE)).count();
        assert_eq!(steps[DAMAGE_INTERVAL as usize - 1], PoisonStep::Damage(MONSTER_POISON_DAMAGE));
        assert_eq!(bites as u32, (DAMAGE_TICKS - 1) / DAMAGE_INTERVAL);
        assert_eq!(steps.last(), Some(&PoisonStep::WoreOff));
    }

    #[test]
    fn test_paralysis_poison_numbs_then_freezes() {
        let mut p = Poison::from_attack(4).unwrap();
        for _ in 1..NUMB_TICKS {
            assert_eq!(step(&mut p), PoisonStep::Nothing);
        }
        assert_eq!(step(&mut p), PoisonStep::Froze);
        assert_eq!(p.tint(), TINT_GREY);
        for _ in 1..FROZEN_TICKS {
            step(&mut p);
        }
        assert_eq!(step(&mut p), PoisonStep::WoreOff);
    }

    #[test]
    fn test_silence_never_expires() {
        let mut p = Poison::from_attack(2).unwrap();
        for _ in 0..1000 {
            assert_eq!(step(&mut p), PoisonStep::Nothing);
        }
        assert!(Poison::from_attack(3).is_none());
    }
}
