//! Double-buffered event bus. Events emitted during tick `t` become visible
//! to subscribers on tick `t + 1`.

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    EntityKilled {
        /// Object id of the dead NPC.
        victim: i32,
        npc_id: i32,
        /// Character id of the killer, 0 if none.
        killer: i32,
        map_id: i16,
        x: i32,
        y: i32,
    },
    PlayerDied {
        char_id: i32,
    },
}

#[derive(Debug, Default)]
pub struct EventBus {
    pending: Vec<GameEvent>,
    ready: Vec<GameEvent>,
}

impl EventBus {
    pub fn emit(&mut self, ev: GameEvent) {
        self.pending.push(ev);
    }

    /// Called once at the start of a tick: publishes what was emitted last
    /// tick and discards what was published before.
    pub fn swap(&mut self) {
        self.ready.clear();
        std::mem::swap(&mut self.ready, &mut self.pending);
    }

    /// Events readable this tick.
    pub fn ready(&self) -> &[GameEvent] {
        &self.ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_visible_next_tick_only() {
        let mut bus = EventBus::default();
        bus.emit(GameEvent::PlayerDied { char_id: 1 });
        assert!(bus.ready().is_empty());
        bus.swap();
        assert_eq!(bus.ready(), &[GameEvent::PlayerDied { char_id: 1 }]);
        bus.swap();
        assert!(bus.ready().is_empty());
    }
}
