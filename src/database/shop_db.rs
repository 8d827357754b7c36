//! Merchant inventories (`shops.yaml`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{read_yaml_optional, DataError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShopItem {
    pub item_id: i32,
    pub order: i32,
    /// Price the merchant sells at; negative = not sold.
    pub selling_price: i32,
    pub pack_count: i32,
    /// Price the merchant buys at; negative = not bought.
    pub purchasing_price: i32,
}

impl ShopItem {
    pub fn pack(&self) -> i32 {
        self.pack_count.max(1)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Shop {
    pub npc_id: i32,
    pub items: Vec<ShopItem>,
}

impl Shop {
    /// Items the player can buy, in display order.
    pub fn selling(&self) -> Vec<&ShopItem> {
        let mut v: Vec<&ShopItem> = self.items.iter().filter(|i| i.selling_price >= 0).collect();
        v.sort_by_key(|i| i.order);
        v
    }

    pub fn purchasing(&self) -> impl Iterator<Item = &ShopItem> {
        self.items.iter().filter(|i| i.purchasing_price >= 0)
    }

    pub fn buy_price(&self, item_id: i32) -> Option<i32> {
        self.purchasing().find(|i| i.item_id == item_id).map(|i| i.purchasing_price)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ShopFile {
    #[serde(default)]
    shops: Vec<Shop>,
}

#[derive(Debug, Default)]
pub struct ShopTable {
    shops: HashMap<i32, Shop>,
}

impl ShopTable {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: ShopFile = read_yaml_optional(path)?;
        let mut table = Self::default();
        for s in file.shops {
            table.insert(s);
        }
        Ok(table)
    }

    pub fn insert(&mut self, shop: Shop) {
        self.shops.insert(shop.npc_id, shop);
    }

    pub fn get(&self, npc_id: i32) -> Option<&Shop> {
        self.shops.get(&npc_id)
    }

    pub fn count(&self) -> usize {
        self.shops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_lists_filter_negative() {
        let shop = Shop {
            npc_id: 70001,
            items: vec![
                ShopItem { item_id: 40010, order: 2, selling_price: 30, pack_count: 0, purchasing_price: -1 },
                ShopItem { item_id: 40308, order: 1, selling_price: -1, pack_count: 0, purchasing_price: 1 },
                ShopItem { item_id: 40014, order: 0, selling_price: 50, pack_count: 10, purchasing_price: 20 },
            ],
        };
        let sell: Vec<i32> = shop.selling().iter().map(|i| i.item_id).collect();
        assert_eq!(sell, vec![40014, 40010]);
        assert_eq!(shop.buy_price(40010), None);
        assert_eq!(shop.buy_price(40014), Some(20));
        assert_eq!(shop.items[0].pack(), 1);
    }
}
