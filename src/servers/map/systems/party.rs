//! Keeps party members' HP meters and minimap markers current.

use std::collections::HashMap;

use crate::game::party::hp_percent;
use crate::game::world::World;

use super::super::packets;

/// Ticks between two position refreshes.
pub const POSITION_TICKS: u64 = 10;

pub fn run(w: &mut World) {
    if w.parties.count() == 0 {
        return;
    }
    let positions_due = w.tick % POSITION_TICKS == 0;
    let mut shown: Vec<(i32, HashMap<i32, u16>)> = Vec::new();

    for party in w.parties.iter() {
        let members: Vec<_> = party.members.iter().filter_map(|m| w.player_by_char(*m)).collect();
        let mut changed = HashMap::new();
        for m in &members {
            let now = hp_percent(m.hp, m.attr.max_hp);
            if party.shown_hp.get(&m.char_id) == Some(&now) {
                continue;
            }
            changed.insert(m.char_id, now);
            let meter = packets::hp_meter(m.char_id, now);
            for other in members.iter().filter(|o| o.char_id != m.char_id) {
                other.outbox.send(meter.clone());
            }
        }
        if positions_due {
            let pkt = packets::party_positions(&members);
            for m in &members {
                m.outbox.send(pkt.clone());
            }
        }
        if !changed.is_empty() {
            shown.push((party.leader, changed));
        }
    }

    for (leader, changed) in shown {
        if let Some(party) = w.parties.get_mut(leader) {
            party.shown_hp.extend(changed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::opcodes::S_HP_METER;
    use crate::servers::map::handlers::testutil::*;

    #[tokio::test]
    async fn test_hp_change_reaches_other_members_once() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s1, mut rx1) = join(&mut w, 1, 32500, 32500);
        let (_s2, mut rx2) = join(&mut w, 2, 32502, 32500);
        w.parties.join(1, 2, false);
        w.tick = 1;
        run(&mut w);
        rx1.drain();
        rx2.drain();

        w.player_mut(s1.id).unwrap().hp = 125;
        w.tick = 2;
        run(&mut w);
        let got = rx2.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0][0], S_HP_METER);
        assert_eq!(got[0][5], 50);
        assert!(rx1.drain().is_empty());

        w.tick = 3;
        run(&mut w);
        assert!(rx2.drain().is_empty());
    }

    #[tokio::test]
    async fn test_positions_on_cadence() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (_s1, mut rx1) = join(&mut w, 1, 32500, 32500);
        join(&mut w, 2, 32502, 32500);
        w.parties.join(1, 2, false);
        w.tick = 1;
        run(&mut w);
        rx1.drain();
        w.tick = POSITION_TICKS;
        run(&mut w);
        assert_eq!(ops(&mut rx1), vec![crate::network::opcodes::S_EVENT]);
    }
}
