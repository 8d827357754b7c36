//! Player-owned item storage: stacking, weight and slot limits.

use crate::database::{ItemCategory, ItemTemplate};
use crate::repo::ItemRow;

use super::ids::{IdAllocator, IdKind};

pub const MAX_INVENTORY_SIZE: usize = 180;
pub const ADENA_ITEM_ID: i32 = 40308;

/// One stack or one piece of equipment.
#[derive(Debug, Clone, PartialEq)]
pub struct InvItem {
    pub obj_id: i32,
    pub item_id: i32,
    pub name: String,
    pub count: i32,
    pub enchant: i32,
    /// 0 blessed, 1 normal, 2 cursed; 128+ sealed
    pub bless: i32,
    pub identified: bool,
    pub equipped: bool,
    /// Per-unit weight in thousandths.
    pub weight: i32,
    pub inv_gfx: i32,
    pub grd_gfx: i32,
    pub stackable: bool,
    pub use_type: u8,
    pub category: ItemCategory,
    /// Wear steps on a weapon; each one costs a point of damage.
    pub durability: i32,
}

impl InvItem {
    pub fn from_template(obj_id: i32, tpl: &ItemTemplate, count: i32, enchant: i32, bless: i32, identified: bool) -> Self {
        Self {
            obj_id,
            item_id: tpl.item_id,
            name: tpl.name.clone(),
            count,
            enchant,
            bless,
            identified,
            equipped: false,
            weight: tpl.weight,
            inv_gfx: tpl.inv_gfx,
            grd_gfx: tpl.grd_gfx,
            stackable: is_stackable(tpl),
            use_type: tpl.use_type_id(),
            category: tpl.category,
            durability: 0,
        }
    }

    /// Weight units this stack contributes; every weighted stack counts for at least 1.
    pub fn total_weight(&self) -> i32 {
        if self.weight == 0 {
            return 0;
        }
        (self.count.saturating_mul(self.weight) / 1000).max(1)
    }

    /// Name as the client shows it: enchant prefix, count and equip suffix.
    pub fn view_name(&self) -> String {
        let mut name = match self.enchant {
            0 => self.name.clone(),
            e if e > 0 => format!("+{} {}", e, self.name),
            e => format!("{} {}", e, self.name),
        };
        if self.count > 1 {
            name.push_str(&format!(" ({})", self.count));
        }
        if self.equipped {
            match self.category {
                ItemCategory::Weapon => name.push_str(" ($9)"),
                ItemCategory::Armor => name.push_str(" ($117)"),
                ItemCategory::Etc => {}
            }
        }
        name
    }

    pub fn to_row(&self, char_id: i32, equip_slot: i16) -> ItemRow {
        ItemRow {
            char_id,
            item_id: self.item_id,
            count: self.count,
            enchant_lvl: self.enchant as i16,
            bless: self.bless as i16,
            equipped: self.equipped,
            identified: self.identified,
            equip_slot,
            obj_id: self.obj_id,
            durability: self.durability as i16,
        }
    }
}

pub fn is_stackable(tpl: &ItemTemplate) -> bool {
    tpl.stackable || tpl.item_id == ADENA_ITEM_ID
}

/// `150 * floor(0.6*STR + 0.4*CON + 1)`.
pub fn max_weight(str: i32, con: i32) -> i32 {
    let base = (0.6 * f64::from(str) + 0.4 * f64::from(con) + 1.0).floor() as i32;
    150 * base.max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub obj_id: i32,
    /// Merged into an existing stack (client needs a count update, not an add).
    pub stacked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// The whole stack left the inventory.
    Gone(InvItem),
    Reduced { obj_id: i32, remaining: i32 },
}

#[derive(Debug, Default, Clone)]
pub struct Inventory {
    items: Vec<InvItem>,
}

impl Inventory {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_INVENTORY_SIZE
    }

    pub fn iter(&self) -> impl Iterator<Item = &InvItem> {
        self.items.iter()
    }

    pub fn find(&self, obj_id: i32) -> Option<&InvItem> {
        self.items.iter().find(|i| i.obj_id == obj_id)
    }

    pub fn find_mut(&mut self, obj_id: i32) -> Option<&mut InvItem> {
        self.items.iter_mut().find(|i| i.obj_id == obj_id)
    }

    pub fn find_by_item_id(&self, item_id: i32) -> Option<&InvItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn count_of(&self, item_id: i32) -> i32 {
        self.items.iter().filter(|i| i.item_id == item_id).map(|i| i.count).sum()
    }

    pub fn adena(&self) -> i32 {
        self.count_of(ADENA_ITEM_ID)
    }

    /// True when adding `tpl` would need a fresh slot and none is left.
    pub fn needs_slot(&self, tpl: &ItemTemplate) -> bool {
        !(is_stackable(tpl) && self.find_by_item_id(tpl.item_id).is_some()) && self.is_full()
    }

    /// Adds `count` of `tpl`, merging into an existing stack when stackable.
    pub fn add(&mut self, ids: &IdAllocator, tpl: &ItemTemplate, count: i32, enchant: i32, bless: i32, identified: bool) -> AddOutcome {
        if is_stackable(tpl) {
            if let Some(existing) = self.items.iter_mut().find(|i| i.item_id == tpl.item_id) {
                existing.count = existing.count.saturating_add(count);
                return AddOutcome { obj_id: existing.obj_id, stacked: true };
            }
        }
        let obj_id = ids.next(IdKind::Item);
        self.items.push(InvItem::from_template(obj_id, tpl, count, enchant, bless, identified));
        AddOutcome { obj_id, stacked: false }
    }

    /// Re-inserts a detached item (trade restore, warehouse withdraw). Stacks
    /// merge; everything else keeps its object id.
    pub fn restore(&mut self, item: InvItem) -> AddOutcome {
        if item.stackable {
            if let Some(existing) = self.items.iter_mut().find(|i| i.item_id == item.item_id) {
                existing.count = existing.count.saturating_add(item.count);
                return AddOutcome { obj_id: existing.obj_id, stacked: true };
            }
        }
        let obj_id = item.obj_id;
        self.items.push(item);
        AddOutcome { obj_id, stacked: false }
    }

    /// Removes up to `count` from the stack. `count <= 0` removes everything.
    pub fn remove(&mut self, obj_id: i32, count: i32) -> Option<Removal> {
        let idx = self.items.iter().position(|i| i.obj_id == obj_id)?;
        let item = &mut self.items[idx];
        if count <= 0 || count >= item.count {
            return Some(Removal::Gone(self.items.remove(idx)));
        }
        item.count -= count;
        Some(Removal::Reduced { obj_id, remaining: item.count })
    }

    /// Consumes `count` units of `item_id` from the first matching stack.
    pub fn consume(&mut self, item_id: i32, count: i32) -> Option<Removal> {
        let obj_id = self.items.iter().find(|i| i.item_id == item_id && i.count >= count)?.obj_id;
        self.remove(obj_id, count)
    }

    pub fn total_weight(&self) -> i32 {
        self.items.iter().map(InvItem::total_weight).sum()
    }

    /// Weight as the 0..=242 gauge the status packet carries.
    pub fn weight242(&self, max_weight: i32) -> u8 {
        if max_weight <= 0 {
            return 0;
        }
        let total = self.total_weight();
        if total <= 0 {
            return 0;
        }
        if total >= max_weight {
            return 242;
        }
        (f64::from(total) * 242.0 / f64::from(max_weight)).round().clamp(0.0, 242.0) as u8
    }

    pub fn would_overweight(&self, add_weight: i32, max_weight: i32) -> bool {
        self.total_weight() + add_weight > max_weight
    }

    pub fn equipped(&self) -> impl Iterator<Item = &InvItem> {
        self.items.iter().filter(|i| i.equipped)
    }

    pub fn push_loaded(&mut self, item: InvItem) {
        self.items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn potion() -> ItemTemplate {
        ItemTemplate { item_id: 40010, name: "Healing Potion".into(), weight: 200, stackable: true, ..Default::default() }
    }

    fn sword() -> ItemTemplate {
        ItemTemplate {
            item_id: 1,
            name: "Sword".into(),
            weight: 50_000,
            category: ItemCategory::Weapon,
            ..Default::default()
        }
    }

    #[test]
    fn test_stacking_and_round_trip() {
        let ids = IdAllocator::new();
        let mut inv = Inventory::default();
        let first = inv.add(&ids, &potion(), 3, 0, 1, true);
        assert!(!first.stacked);
        let weight_before = inv.total_weight();
        let len_before = inv.len();

        let again = inv.add(&ids, &potion(), 5, 0, 1, true);
        assert!(again.stacked);
        assert_eq!(again.obj_id, first.obj_id);
        assert_eq!(inv.count_of(40010), 8);

        assert_eq!(inv.remove(first.obj_id, 5), Some(Removal::Reduced { obj_id: first.obj_id, remaining: 3 }));
        assert_eq!(inv.total_weight(), weight_before);
        assert_eq!(inv.len(), len_before);
    }

    #[test]
    fn test_non_stackable_gets_new_ids() {
        let ids = IdAllocator::new();
        let mut inv = Inventory::default();
        let a = inv.add(&ids, &sword(), 1, 0, 1, true);
        let b = inv.add(&ids, &sword(), 1, 0, 1, true);
        assert_ne!(a.obj_id, b.obj_id);
        assert!(matches!(inv.remove(a.obj_id, 1), Some(Removal::Gone(_))));
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn test_weight_rounding() {
        let ids = IdAllocator::new();
        let mut inv = Inventory::default();
        inv.add(&ids, &potion(), 1, 0, 1, true);
        // 200/1000 rounds down to 0 but weighted stacks count as 1
        assert_eq!(inv.total_weight(), 1);
        inv.add(&ids, &sword(), 1, 0, 1, true);
        assert_eq!(inv.total_weight(), 51);
        assert_eq!(inv.weight242(1000), 12);
        assert_eq!(inv.weight242(10), 242);
    }

    #[test]
    fn test_max_weight_formula() {
        // floor(0.6*18 + 0.4*16 + 1) = floor(18.2) = 18
        assert_eq!(max_weight(18, 16), 2700);
    }

    #[test]
    fn test_view_name() {
        let ids = IdAllocator::new();
        let mut item = InvItem::from_template(ids.next(IdKind::Item), &sword(), 1, 3, 1, true);
        assert_eq!(item.view_name(), "+3 Sword");
        item.equipped = true;
        assert_eq!(item.view_name(), "+3 Sword ($9)");
        item.enchant = -1;
        item.equipped = false;
        assert_eq!(item.view_name(), "-1 Sword");
        let mut arrows = InvItem::from_template(1, &potion(), 20, 0, 1, true);
        arrows.name = "Arrow".into();
        assert_eq!(arrows.view_name(), "Arrow (20)");
    }

    #[test]
    fn test_adena_always_stacks() {
        let ids = IdAllocator::new();
        let mut inv = Inventory::default();
        let adena = ItemTemplate { item_id: ADENA_ITEM_ID, name: "Adena".into(), ..Default::default() };
        inv.add(&ids, &adena, 100, 0, 1, true);
        inv.add(&ids, &adena, 50, 0, 1, true);
        assert_eq!(inv.adena(), 150);
        assert_eq!(inv.len(), 1);
        assert!(inv.consume(ADENA_ITEM_ID, 200).is_none());
        assert!(matches!(inv.consume(ADENA_ITEM_ID, 30), Some(Removal::Reduced { remaining: 120, .. })));
    }
}
