//! Poison on players: infection, the per-tick course and cures.

use crate::game::poison::{step, Poison, PoisonStep, TINT_NONE};
use crate::game::world::World;

use super::super::handlers::{send_msg, send_msg_arg};
use super::super::{packets, GameServer};
use super::combat::kill_player;

const MSG_POISONED: u16 = 310;
const MSG_POISON_TOOK: u16 = 212;
const MSG_SILENCE_LIFTED: u16 = 311;

fn broadcast_tint(w: &World, sid: u64, tint: u8) {
    let Some(p) = w.player(sid) else { return };
    w.broadcast_nearby(p.map_id, p.x, p.y, None, &packets::poison(p.char_id, tint));
}

/// Poisons the player unless it already carries a poison.
pub(crate) fn infect(w: &mut World, sid: u64, poison: Poison) -> bool {
    let Some(p) = w.player_mut(sid) else { return false };
    if p.dead || p.poison.is_some() {
        return false;
    }
    p.poison = Some(poison);
    send_msg(p, MSG_POISONED);
    send_msg_arg(p, MSG_POISON_TOOK, &p.name);
    tracing::debug!("[poison] [infected] char={} kind={:?}", p.char_id, poison);
    broadcast_tint(w, sid, poison.tint());
    true
}

/// Clears any poison and lifts what it was doing.
pub(crate) fn cure(w: &mut World, sid: u64) -> bool {
    let Some(p) = w.player_mut(sid) else { return false };
    let Some(poison) = p.poison.take() else { return false };
    match poison {
        Poison::Frozen { .. } => {
            p.paralyzed = false;
            p.outbox.send(packets::paralysis(packets::PARALYSIS_POISON_OFF));
        }
        Poison::Silence => send_msg(p, MSG_SILENCE_LIFTED),
        _ => {}
    }
    tracing::debug!("[poison] [cured] char={}", p.char_id);
    broadcast_tint(w, sid, TINT_NONE);
    true
}

pub fn run(w: &mut World, srv: &GameServer) {
    let sids: Vec<u64> = w.players.iter().filter(|(_, p)| p.poison.is_some()).map(|(sid, _)| *sid).collect();
    for sid in sids {
        let Some(p) = w.player_mut(sid) else { continue };
        if p.dead {
            continue;
        }
        let Some(poison) = p.poison.as_mut() else { continue };
        match step(poison) {
            PoisonStep::Nothing => {}
            PoisonStep::Damage(amount) => {
                p.hp -= amount;
                p.mark_dirty();
                if p.hp <= 0 {
                    kill_player(w, srv, sid);
                } else {
                    p.outbox.send(packets::hit_point(p.hp, p.attr.max_hp));
                }
            }
            PoisonStep::Froze => {
                let tint = poison.tint();
                p.paralyzed = true;
                p.outbox.send(packets::paralysis(packets::PARALYSIS_POISON_ON));
                broadcast_tint(w, sid, tint);
            }
            PoisonStep::WoreOff => {
                cure(w, sid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::poison::{DAMAGE_INTERVAL, MONSTER_POISON_DAMAGE, NUMB_TICKS, TINT_GREY};
    use crate::network::opcodes::{S_PARALYSIS, S_POISON};
    use crate::servers::map::handlers::testutil::*;

    #[tokio::test]
    async fn test_infect_tints_for_onlookers_once() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, mut rx) = join(&mut w, 1, 32500, 32500);
        let (_o, mut orx) = join(&mut w, 2, 32503, 32500);
        assert!(infect(&mut w, s.id, Poison::Silence));
        assert!(!infect(&mut w, s.id, Poison::from_attack(1).unwrap()));
        assert!(w.player(s.id).unwrap().is_silenced());
        assert!(ops(&mut rx).contains(&S_POISON));
        let seen = orx.drain();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][5], 1);
    }

    #[tokio::test]
    async fn test_damage_poison_hurts_on_interval() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, _rx) = join(&mut w, 1, 32500, 32500);
        infect(&mut w, s.id, Poison::from_attack(1).unwrap());
        for _ in 0..DAMAGE_INTERVAL {
            run(&mut w, &srv);
        }
        assert_eq!(w.player(s.id).unwrap().hp, 200 - MONSTER_POISON_DAMAGE);
    }

    #[tokio::test]
    async fn test_lethal_poison_kills() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, _rx) = join(&mut w, 1, 32500, 32500);
        w.player_mut(s.id).unwrap().hp = 5;
        infect(&mut w, s.id, Poison::from_attack(1).unwrap());
        for _ in 0..DAMAGE_INTERVAL {
            run(&mut w, &srv);
        }
        assert!(w.player(s.id).unwrap().dead);
    }

    #[tokio::test]
    async fn test_paralysis_freezes_then_cure_releases() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, mut rx) = join(&mut w, 1, 32500, 32500);
        infect(&mut w, s.id, Poison::from_attack(4).unwrap());
        for _ in 0..NUMB_TICKS {
            run(&mut w, &srv);
        }
        let p = w.player(s.id).unwrap();
        assert!(p.paralyzed);
        assert_eq!(p.poison.map(Poison::tint), Some(TINT_GREY));
        rx.drain();

        assert!(cure(&mut w, s.id));
        let p = w.player(s.id).unwrap();
        assert!(!p.paralyzed && p.poison.is_none());
        let sent = ops(&mut rx);
        assert!(sent.contains(&S_PARALYSIS) && sent.contains(&S_POISON));
        assert!(!cure(&mut w, s.id));
    }
}
