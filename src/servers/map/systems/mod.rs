//! Tick systems. Every tick runs them in a fixed order under one world
//! lock, so a handler never observes a half-advanced tick.

pub mod combat;
pub mod companions;
pub mod lifecycle;
pub mod npc_ai;
pub mod party;
pub mod persistence;
pub mod poison;
pub mod regen;
pub mod visibility;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::core::{SHUTDOWN_DRAIN, TICK};
use crate::game::World;

use super::GameServer;

/// Advances the world by one tick.
pub fn tick(srv: &Arc<GameServer>, w: &mut World) {
    w.events.swap();
    w.tick += 1;
    combat::run(w, srv);
    npc_ai::run(w, srv);
    regen::run(w, srv);
    poison::run(w, srv);
    companions::run(w, srv);
    lifecycle::run(w, srv);
    visibility::run(w);
    party::run(w);
    persistence::run(srv, w);
}

/// One tick with panics contained, so a broken system costs a tick and not
/// the scheduler.
fn guarded_tick(srv: &Arc<GameServer>, w: &mut World) {
    let n = w.tick;
    if catch_unwind(AssertUnwindSafe(|| tick(srv, w))).is_err() {
        tracing::error!("[tick] [panicked] tick={}", n + 1);
    }
}

impl GameServer {
    /// Fixed cadence scheduler. Runs until shutdown, then gets one last
    /// tick in if the world lock frees up within the drain window.
    pub async fn run_ticks(self: Arc<Self>) {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.state.subscribe();
        tracing::info!("[tick] [started] interval_ms={}", TICK.as_millis());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut w = self.world.lock().await;
                    guarded_tick(&self, &mut w);
                }
                _ = shutdown.changed() => break,
            }
        }
        match timeout(SHUTDOWN_DRAIN, self.world.lock()).await {
            Ok(mut w) => {
                guarded_tick(&self, &mut w);
                tracing::info!("[tick] [stopped] tick={}", w.tick);
            }
            Err(_) => tracing::warn!("[tick] [drain_timeout] waited_ms={}", SHUTDOWN_DRAIN.as_millis()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::event::GameEvent;
    use crate::servers::map::handlers::testutil;

    #[tokio::test]
    async fn test_tick_advances_and_publishes_events() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let start = w.tick;
        w.events.emit(GameEvent::PlayerDied { char_id: 3 });
        tick(&srv, &mut w);
        assert_eq!(w.tick, start + 1);
        assert_eq!(w.events.ready(), &[GameEvent::PlayerDied { char_id: 3 }]);
        tick(&srv, &mut w);
        assert!(w.events.ready().is_empty());
    }

    #[tokio::test]
    async fn test_monster_chase_reaches_client_through_tick() {
        let (srv, _store) = testutil::server();
        let mut w = srv.world.lock().await;
        let (sess, mut rx) = testutil::join(&mut w, 1, 33000, 33000);
        let orc = testutil::orc(&mut w, 33006, 33000);
        w.npcs.get_mut(&orc).unwrap().agro = true;
        rx.drain();

        for _ in 0..4 {
            tick(&srv, &mut w);
        }
        let n = &w.npcs[&orc];
        assert_eq!(n.target, 1);
        assert!(n.x < 33006);
        assert!(w.player(sess.id).unwrap().known.contains(crate::game::EntityKind::Npc, orc));
        assert!(!rx.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_shutdown() {
        let (srv, _store) = testutil::server();
        let handle = tokio::spawn(Arc::clone(&srv).run_ticks());
        tokio::time::sleep(TICK * 5).await;
        srv.state.request_shutdown();
        handle.await.unwrap();
        assert!(srv.world.lock().await.tick >= 5);
    }
}
