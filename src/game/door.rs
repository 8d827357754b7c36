//! Doors placed from static data.

use crate::database::DoorEntry;

pub const ACTION_OPEN: u8 = 28;
pub const ACTION_CLOSE: u8 = 29;
/// Players further than this cannot toggle a door.
pub const DOOR_USE_RANGE: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Door {
    pub id: i32,
    pub door_id: i32,
    pub gfx: i32,
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    /// 0 = "/" (span runs along x), 1 = "\" (span runs along y)
    pub direction: i32,
    pub left: i32,
    pub right: i32,
    pub open: bool,
    /// Non-zero doors belong to a house keeper and ignore players.
    pub keeper: i32,
    pub dead: bool,
}

impl Door {
    pub fn from_entry(id: i32, e: &DoorEntry) -> Self {
        Self {
            id,
            door_id: e.id,
            gfx: e.gfx_id,
            map_id: e.map_id,
            x: e.x,
            y: e.y,
            direction: e.direction,
            left: e.left_edge,
            right: e.right_edge,
            open: e.open,
            keeper: e.keeper_id,
            dead: false,
        }
    }

    /// Tiles blocked while closed.
    pub fn tiles(&self) -> Vec<(i32, i32)> {
        if self.left == self.right || self.left > self.right {
            return vec![(self.x, self.y)];
        }
        if self.direction == 0 {
            (self.left..=self.right).map(|x| (x, self.y)).collect()
        } else {
            (self.left..=self.right).map(|y| (self.x, y)).collect()
        }
    }

    /// Status byte for the door pack and S_ACTION.
    pub fn action(&self) -> u8 {
        if self.open {
            ACTION_OPEN
        } else {
            ACTION_CLOSE
        }
    }

    pub fn blocks(&self) -> bool {
        !self.open && !self.dead
    }

    /// Whether a player click may toggle it.
    pub fn usable(&self) -> bool {
        !self.dead && self.keeper == 0
    }

    /// Flips the state; returns the new open flag.
    pub fn toggle(&mut self) -> bool {
        self.open = !self.open;
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn door(direction: i32, left: i32, right: i32) -> Door {
        Door::from_entry(
            150_000_001,
            &DoorEntry { id: 1, gfx_id: 92, x: 10, y: 20, map_id: 4, direction, left_edge: left, right_edge: right, keeper_id: 0, open: false },
        )
    }

    #[test]
    fn test_tiles_by_direction() {
        assert_eq!(door(0, 10, 10).tiles(), vec![(10, 20)]);
        assert_eq!(door(0, 9, 11).tiles(), vec![(9, 20), (10, 20), (11, 20)]);
        assert_eq!(door(1, 19, 20).tiles(), vec![(10, 19), (10, 20)]);
    }

    #[test]
    fn test_toggle_and_action() {
        let mut d = door(0, 10, 10);
        assert!(d.blocks());
        assert_eq!(d.action(), ACTION_CLOSE);
        assert!(d.toggle());
        assert_eq!(d.action(), ACTION_OPEN);
        assert!(!d.blocks());
        d.keeper = 5;
        assert!(!d.usable());
    }
}
