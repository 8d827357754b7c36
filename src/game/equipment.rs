//! Equip slot table and the equipment stat overlay.

use crate::database::{ArmorSetTable, ItemCategory, ItemTable, ItemTemplate, PolyForm};

use super::inventory::{InvItem, Inventory};
use super::stats::StatDelta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquipSlot {
    Weapon,
    Shield,
    Guarder,
    Helmet,
    Armor,
    TShirt,
    Cloak,
    Gloves,
    Boots,
    Ring1,
    Ring2,
    Amulet,
    Belt,
    Earring,
}

impl EquipSlot {
    pub const COUNT: usize = 14;

    pub const ALL: [EquipSlot; Self::COUNT] = [
        EquipSlot::Weapon,
        EquipSlot::Shield,
        EquipSlot::Guarder,
        EquipSlot::Helmet,
        EquipSlot::Armor,
        EquipSlot::TShirt,
        EquipSlot::Cloak,
        EquipSlot::Gloves,
        EquipSlot::Boots,
        EquipSlot::Ring1,
        EquipSlot::Ring2,
        EquipSlot::Amulet,
        EquipSlot::Belt,
        EquipSlot::Earring,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: i16) -> Option<Self> {
        usize::try_from(i).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Accessories do not gain AC from enchantment.
    pub fn is_accessory(self) -> bool {
        matches!(self, Self::Amulet | Self::Ring1 | Self::Ring2 | Self::Guarder | Self::Earring)
    }

    /// Slot for an armor `type` string.
    pub fn for_armor(kind: &str) -> Option<Self> {
        Some(match kind {
            "helm" => Self::Helmet,
            "armor" => Self::Armor,
            "T" | "tshirt" | "t_shirts" => Self::TShirt,
            "cloak" => Self::Cloak,
            "glove" => Self::Gloves,
            "boots" => Self::Boots,
            "shield" => Self::Shield,
            "guarder" => Self::Guarder,
            "ring" => Self::Ring1,
            "amulet" | "necklace" => Self::Amulet,
            "earring" => Self::Earring,
            "belt" => Self::Belt,
            _ => return None,
        })
    }
}

/// Visual byte for the held weapon, sent in put-object and visual updates.
pub fn weapon_visual(kind: &str) -> u8 {
    match kind {
        "sword" => 4,
        "dagger" => 46,
        "tohandsword" => 50,
        "bow" => 20,
        "spear" | "singlespear" | "blunt" | "tohandblunt" => 24,
        "staff" => 40,
        "claw" => 58,
        "edoryu" => 54,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipError {
    WrongClass,
    LevelTooLow,
    LevelTooHigh,
    ShieldWithTwoHanded,
    Cursed,
    PolyForbids,
    NotEquipment,
}

impl EquipError {
    /// Client message id shown for the failure.
    pub fn msg_code(self) -> u16 {
        match self {
            EquipError::WrongClass => 264,
            EquipError::LevelTooLow => 318,
            EquipError::LevelTooHigh => 673,
            EquipError::ShieldWithTwoHanded => 128,
            EquipError::Cursed => 150,
            EquipError::PolyForbids => 285,
            EquipError::NotEquipment => 74,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Equipment {
    slots: [Option<i32>; EquipSlot::COUNT],
    /// Overlay currently folded into the player's live attributes.
    pub applied: StatDelta,
    pub active_set_id: i32,
}

impl Equipment {
    pub fn get(&self, slot: EquipSlot) -> Option<i32> {
        self.slots[slot.index()]
    }

    pub fn set(&mut self, slot: EquipSlot, obj_id: Option<i32>) {
        self.slots[slot.index()] = obj_id;
    }

    pub fn weapon(&self) -> Option<i32> {
        self.get(EquipSlot::Weapon)
    }

    pub fn slot_of(&self, obj_id: i32) -> Option<EquipSlot> {
        EquipSlot::ALL.iter().copied().find(|s| self.get(*s) == Some(obj_id))
    }

    /// Clears whichever slot holds `obj_id`.
    pub fn clear(&mut self, obj_id: i32) -> Option<EquipSlot> {
        let slot = self.slot_of(obj_id)?;
        self.set(slot, None);
        Some(slot)
    }

    pub fn occupied(&self) -> impl Iterator<Item = (EquipSlot, i32)> + '_ {
        EquipSlot::ALL.iter().filter_map(move |s| self.get(*s).map(|id| (*s, id)))
    }

    /// Target slot for `tpl`; rings fill Ring1 then Ring2.
    pub fn slot_for(&self, tpl: &ItemTemplate) -> Option<EquipSlot> {
        match tpl.category {
            ItemCategory::Weapon => Some(EquipSlot::Weapon),
            ItemCategory::Armor => {
                let slot = EquipSlot::for_armor(&tpl.kind)?;
                if slot == EquipSlot::Ring1 && self.get(EquipSlot::Ring1).is_some() {
                    return Some(EquipSlot::Ring2);
                }
                Some(slot)
            }
            ItemCategory::Etc => None,
        }
    }
}

/// Validates an equip request before any state changes.
pub fn check_equip(
    tpl: &ItemTemplate,
    class_type: i16,
    level: i32,
    equipment: &Equipment,
    items: &ItemTable,
    inv: &Inventory,
    poly: Option<&PolyForm>,
) -> Result<EquipSlot, EquipError> {
    let slot = equipment.slot_for(tpl).ok_or(EquipError::NotEquipment)?;
    if !tpl.usable_by(i32::from(class_type)) {
        return Err(EquipError::WrongClass);
    }
    if tpl.min_level > 0 && level < tpl.min_level {
        return Err(EquipError::LevelTooLow);
    }
    if tpl.max_level > 0 && level > tpl.max_level {
        return Err(EquipError::LevelTooHigh);
    }
    if let Some(form) = poly {
        let allowed = match tpl.category {
            ItemCategory::Weapon => form.can_wield(&tpl.kind),
            _ => form.can_wear(&tpl.kind),
        };
        if !allowed {
            return Err(EquipError::PolyForbids);
        }
    }
    if slot == EquipSlot::Shield {
        let two_handed = equipment
            .weapon()
            .and_then(|id| inv.find(id))
            .and_then(|w| items.get(w.item_id))
            .is_some_and(|w| w.is_two_handed());
        if two_handed {
            return Err(EquipError::ShieldWithTwoHanded);
        }
    }
    if slot == EquipSlot::Weapon && tpl.is_two_handed() && equipment.get(EquipSlot::Shield).is_some() {
        return Err(EquipError::ShieldWithTwoHanded);
    }
    // a cursed item already in the slot cannot be swapped out
    if let Some(current) = equipment.get(slot).and_then(|id| inv.find(id)) {
        if current.bless == 2 {
            return Err(EquipError::Cursed);
        }
    }
    Ok(slot)
}

fn clamp16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Contribution of one equipped piece.
pub fn item_delta(item: &InvItem, tpl: &ItemTemplate, slot: EquipSlot) -> StatDelta {
    let mut d = StatDelta {
        str: clamp16(tpl.add_str),
        dex: clamp16(tpl.add_dex),
        con: clamp16(tpl.add_con),
        wis: clamp16(tpl.add_wis),
        intel: clamp16(tpl.add_int),
        cha: clamp16(tpl.add_cha),
        max_hp: clamp16(tpl.add_hp),
        max_mp: clamp16(tpl.add_mp),
        hpr: clamp16(tpl.add_hpr),
        mpr: clamp16(tpl.add_mpr),
        sp: clamp16(tpl.add_sp),
        mr: clamp16(tpl.mdef),
        ..Default::default()
    };
    match tpl.category {
        ItemCategory::Weapon => {
            d.hit = clamp16(tpl.hit_mod);
            d.dmg = clamp16(tpl.dmg_mod);
        }
        ItemCategory::Armor => {
            let mut ac = tpl.ac.abs();
            if !slot.is_accessory() {
                ac += item.enchant.max(0);
            }
            d.ac = clamp16(-ac);
            d.bow_hit = clamp16(tpl.bow_hit_mod);
            d.bow_dmg = clamp16(tpl.bow_dmg_mod);
        }
        ItemCategory::Etc => {}
    }
    d
}

/// Full overlay for the current slot table, plus the completed armor set id.
pub fn compute_overlay(equipment: &Equipment, inv: &Inventory, items: &ItemTable, sets: &ArmorSetTable) -> (StatDelta, i32) {
    let mut total = StatDelta::default();
    let mut worn = Vec::new();
    for (slot, obj_id) in equipment.occupied() {
        let Some(item) = inv.find(obj_id) else { continue };
        let Some(tpl) = items.get(item.item_id) else { continue };
        total = total + item_delta(item, tpl, slot);
        worn.push(item.item_id);
    }
    let mut set_id = 0;
    if let Some(set) = sets.find_complete(&worn) {
        set_id = set.id;
        total = total
            + StatDelta {
                ac: clamp16(-set.ac.abs()),
                max_hp: clamp16(set.hp),
                max_mp: clamp16(set.mp),
                hpr: clamp16(set.hpr),
                mpr: clamp16(set.mpr),
                mr: clamp16(set.mr),
                str: clamp16(set.str),
                dex: clamp16(set.dex),
                con: clamp16(set.con),
                wis: clamp16(set.wis),
                cha: clamp16(set.cha),
                intel: clamp16(set.intl),
                hit: clamp16(set.hit),
                dmg: clamp16(set.dmg),
                bow_hit: clamp16(set.bow_hit),
                bow_dmg: clamp16(set.bow_dmg),
                sp: clamp16(set.sp),
                fire_res: clamp16(set.def_fire),
                water_res: clamp16(set.def_water),
                wind_res: clamp16(set.def_wind),
                earth_res: clamp16(set.def_earth),
            };
    }
    (total, set_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ids::IdAllocator;

    fn helm() -> ItemTemplate {
        ItemTemplate {
            item_id: 20001,
            name: "Helm".into(),
            kind: "helm".into(),
            ac: 2,
            use_knight: true,
            category: ItemCategory::Armor,
            ..Default::default()
        }
    }

    fn ring() -> ItemTemplate {
        ItemTemplate {
            item_id: 20280,
            name: "Ring".into(),
            kind: "ring".into(),
            ac: 1,
            use_knight: true,
            category: ItemCategory::Armor,
            ..Default::default()
        }
    }

    #[test]
    fn test_rings_fill_both_slots() {
        let mut eq = Equipment::default();
        assert_eq!(eq.slot_for(&ring()), Some(EquipSlot::Ring1));
        eq.set(EquipSlot::Ring1, Some(1));
        assert_eq!(eq.slot_for(&ring()), Some(EquipSlot::Ring2));
        assert_eq!(eq.clear(1), Some(EquipSlot::Ring1));
        assert_eq!(eq.slot_for(&ring()), Some(EquipSlot::Ring1));
    }

    #[test]
    fn test_enchant_adds_ac_except_accessories() {
        let ids = IdAllocator::new();
        let mut h = InvItem::from_template(ids.next(crate::game::ids::IdKind::Item), &helm(), 1, 2, 1, true);
        assert_eq!(item_delta(&h, &helm(), EquipSlot::Helmet).ac, -4);
        h.item_id = 20280;
        assert_eq!(item_delta(&h, &ring(), EquipSlot::Ring1).ac, -1);
    }

    #[test]
    fn test_check_equip_class_and_curse() {
        let mut items = ItemTable::default();
        items.insert(helm());
        let ids = IdAllocator::new();
        let mut inv = Inventory::default();
        let out = inv.add(&ids, &helm(), 1, 0, 2, true);
        let mut eq = Equipment::default();

        assert_eq!(check_equip(&helm(), 3, 10, &eq, &items, &inv, None), Err(EquipError::WrongClass));
        assert_eq!(check_equip(&helm(), 1, 10, &eq, &items, &inv, None), Ok(EquipSlot::Helmet));

        eq.set(EquipSlot::Helmet, Some(out.obj_id));
        assert_eq!(check_equip(&helm(), 1, 10, &eq, &items, &inv, None), Err(EquipError::Cursed));
    }

    #[test]
    fn test_overlay_sums_pieces() {
        let mut items = ItemTable::default();
        items.insert(helm());
        items.insert(ring());
        let ids = IdAllocator::new();
        let mut inv = Inventory::default();
        let h = inv.add(&ids, &helm(), 1, 1, 1, true);
        let r = inv.add(&ids, &ring(), 1, 5, 1, true);
        let mut eq = Equipment::default();
        eq.set(EquipSlot::Helmet, Some(h.obj_id));
        eq.set(EquipSlot::Ring1, Some(r.obj_id));
        let (delta, set_id) = compute_overlay(&eq, &inv, &items, &ArmorSetTable::default());
        assert_eq!(delta.ac, -4);
        assert_eq!(set_id, 0);
    }
}
