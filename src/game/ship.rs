//! Ship routes: sailing windows on the game clock, dock tiles and tickets.

/// Unix time at which the game clock read 0:00.
const GAME_EPOCH: i64 = 1_057_233_600;
/// The game clock runs six times faster than the wall clock.
const GAME_SPEED: i64 = 6;
const GAME_DAY: i64 = 86_400;
/// A tenth of a game hour, in game seconds.
const TENTH_HOUR: i64 = 360;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Outbound sailings, half past every third hour.
    Outbound,
    /// Return sailings, on every third hour.
    Return,
}

/// Seconds since game midnight for a wall clock `unix` time.
pub fn game_seconds(unix: i64) -> i64 {
    ((unix - GAME_EPOCH) * GAME_SPEED).rem_euclid(GAME_DAY)
}

fn windows(route: Route) -> [(i64, i64); 8] {
    let mut out = [(0, 0); 8];
    for (i, w) in out.iter_mut().enumerate() {
        let base = 30 * i as i64;
        *w = match route {
            Route::Outbound => ((base + 15) * TENTH_HOUR, (base + 25) * TENTH_HOUR),
            Route::Return if i == 0 => (0, TENTH_HOUR),
            Route::Return => (base * TENTH_HOUR, (base + 10) * TENTH_HOUR),
        };
    }
    out
}

/// Whether a ship on `route` is at the dock at game time `secs`.
pub fn is_docked(route: Route, secs: i64) -> bool {
    windows(route).iter().any(|&(from, to)| secs >= from && secs < to)
}

/// Route and ticket item for a boarding tile.
pub fn dock(map_id: i16, x: i32, y: i32) -> Option<(Route, i32)> {
    use Route::*;
    let hit = |m: i16, row_y: i32, xs: std::ops::RangeInclusive<i32>| map_id == m && y == row_y && xs.contains(&x);
    if hit(0, 32983, 32630..=32632) || hit(5, 32796, 32733..=32735) {
        Some((Outbound, 40299))
    } else if (hit(4, 32728, 32540..=32545) && x != 32541) || hit(6, 32794, 32734..=32737) {
        Some((Return, 40298))
    } else if hit(4, 33502, 33423..=33426) || hit(83, 32794, 32733..=32736) {
        Some((Return, 40300))
    } else if hit(70, 33058, 32935..=32937) || hit(84, 32796, 32732..=32735) {
        Some((Outbound, 40301))
    } else if hit(445, 32874, 32750..=32752) || hit(447, 32796, 32731..=32733) {
        Some((Outbound, 40302))
    } else if hit(440, 33087, 32296..=32298) || hit(446, 32794, 32735..=32737) {
        Some((Return, 40303))
    } else {
        None
    }
}

/// Ticket taken when leaving the ship on map `map_id`.
pub fn ticket_for_ship(map_id: i16) -> Option<i32> {
    match map_id {
        5 => Some(40299),
        6 => Some(40298),
        83 => Some(40300),
        84 => Some(40301),
        446 => Some(40303),
        447 => Some(40302),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_clock_runs_six_times_faster() {
        assert_eq!(game_seconds(GAME_EPOCH), 0);
        assert_eq!(game_seconds(GAME_EPOCH + 600), 3600);
        assert_eq!(game_seconds(GAME_EPOCH + 14_400), 0);
    }

    #[test]
    fn test_sailing_windows() {
        assert!(is_docked(Route::Return, 0));
        assert!(!is_docked(Route::Return, 360));
        assert!(is_docked(Route::Return, 30 * 360));
        assert!(is_docked(Route::Outbound, 15 * 360));
        assert!(!is_docked(Route::Outbound, 25 * 360));
        assert!(is_docked(Route::Outbound, 235 * 360 - 1));
    }

    #[test]
    fn test_dock_tiles_and_tickets() {
        assert_eq!(dock(0, 32631, 32983), Some((Route::Outbound, 40299)));
        assert_eq!(dock(4, 32541, 32728), None);
        assert_eq!(dock(4, 32545, 32728), Some((Route::Return, 40298)));
        assert_eq!(ticket_for_ship(83), Some(40300));
        assert_eq!(ticket_for_ship(4), None);
    }
}
