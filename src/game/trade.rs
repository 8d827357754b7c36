//! Per-player side of a two-party trade.
//!
//! Offered items leave the inventory as soon as they are added to the
//! window and live here until the trade commits or is cancelled.

use super::inventory::InvItem;

pub const MAX_TRADE_ITEMS: usize = 16;
/// Partners further apart than this cancel the trade.
pub const TRADE_MAX_DISTANCE: i32 = 15;

#[derive(Debug, Default, Clone)]
pub struct TradeState {
    /// Character id of the partner; 0 when not trading.
    pub partner: i32,
    pub window_open: bool,
    pub ok: bool,
    pub items: Vec<InvItem>,
    pub gold: i32,
}

impl TradeState {
    pub fn is_active(&self) -> bool {
        self.partner != 0
    }

    pub fn begin(&mut self, partner: i32) {
        *self = Self { partner, ..Self::default() };
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_TRADE_ITEMS
    }

    pub fn offers(&self, obj_id: i32) -> bool {
        self.items.iter().any(|i| i.obj_id == obj_id)
    }

    /// Clears everything, handing back what was offered so the caller can
    /// return it to the owner's inventory.
    pub fn take(&mut self) -> (Vec<InvItem>, i32) {
        let st = std::mem::take(self);
        (st.items, st.gold)
    }
}
