//! Items lying on the ground.

use super::inventory::InvItem;

/// Distance at which a player can pick an item up.
pub const PICKUP_RANGE: i32 = 3;
/// How long the dropper's killer keeps first-pickup priority (60 s).
pub const OWNER_PRIORITY_TICKS: u32 = 300;

#[derive(Debug, Clone)]
pub struct GroundItem {
    /// Ground object id; distinct from the item's own inventory object id.
    pub id: i32,
    pub item: InvItem,
    pub map_id: i16,
    pub x: i32,
    pub y: i32,
    /// Character id with pickup priority, 0 = anyone.
    pub owner: i32,
    pub owner_ticks: u32,
    pub ttl_ticks: u32,
}

impl GroundItem {
    pub fn new(id: i32, item: InvItem, map_id: i16, x: i32, y: i32, ttl_ticks: u32) -> Self {
        Self { id, item, map_id, x, y, owner: 0, owner_ticks: 0, ttl_ticks }
    }

    pub fn with_owner(mut self, owner: i32) -> Self {
        self.owner = owner;
        self.owner_ticks = OWNER_PRIORITY_TICKS;
        self
    }

    pub fn may_pick(&self, char_id: i32) -> bool {
        self.owner == 0 || self.owner_ticks == 0 || self.owner == char_id
    }

    /// Ground display name ("Adena (500)", "+3 Sword").
    pub fn display_name(&self) -> String {
        let mut probe = self.item.clone();
        probe.equipped = false;
        probe.view_name()
    }

    /// Advances one tick; true once the item has expired.
    pub fn tick(&mut self) -> bool {
        self.owner_ticks = self.owner_ticks.saturating_sub(1);
        self.ttl_ticks = self.ttl_ticks.saturating_sub(1);
        self.ttl_ticks == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ItemTemplate;

    fn adena(count: i32) -> InvItem {
        let tpl = ItemTemplate { item_id: 40308, name: "Adena".into(), stackable: true, ..Default::default() };
        InvItem::from_template(500_000_001, &tpl, count, 0, 1, true)
    }

    #[test]
    fn test_owner_priority_expires() {
        let mut g = GroundItem::new(700_000_001, adena(10), 4, 1, 1, 5).with_owner(7);
        assert!(!g.may_pick(8));
        assert!(g.may_pick(7));
        g.owner_ticks = 1;
        assert!(!g.tick());
        assert!(g.may_pick(8));
    }

    #[test]
    fn test_ttl_and_name() {
        let mut g = GroundItem::new(1, adena(500), 4, 1, 1, 2);
        assert_eq!(g.display_name(), "Adena (500)");
        assert!(!g.tick());
        assert!(g.tick());
    }
}
