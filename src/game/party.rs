//! Hunting parties. A party is keyed by its leader's character id; every
//! member, the leader included, maps back to that key.

use std::collections::HashMap;

pub const MAX_PARTY_SIZE: usize = 8;
/// HP meter value that hides a member's bar.
pub const HP_METER_CLEAR: u16 = 0xff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub leader: i32,
    /// Leader first, then members in join order.
    pub members: Vec<i32>,
    /// Invited through the auto-share dialog.
    pub auto_share: bool,
    /// Last HP percentage shown to the others, per member.
    pub shown_hp: HashMap<i32, u16>,
}

impl Party {
    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_PARTY_SIZE
    }

    pub fn contains(&self, char_id: i32) -> bool {
        self.members.contains(&char_id)
    }
}

/// What removing a member left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The leader left or only one member remained: everyone is out.
    Disbanded(Vec<i32>),
    /// The party carries on with these members.
    Left(Vec<i32>),
}

#[derive(Debug, Default)]
pub struct Parties {
    parties: HashMap<i32, Party>,
    member_of: HashMap<i32, i32>,
}

impl Parties {
    pub fn get(&self, char_id: i32) -> Option<&Party> {
        self.parties.get(self.member_of.get(&char_id)?)
    }

    pub fn get_mut(&mut self, char_id: i32) -> Option<&mut Party> {
        let leader = *self.member_of.get(&char_id)?;
        self.parties.get_mut(&leader)
    }

    pub fn in_party(&self, char_id: i32) -> bool {
        self.member_of.contains_key(&char_id)
    }

    pub fn is_leader(&self, char_id: i32) -> bool {
        self.member_of.get(&char_id) == Some(&char_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Party> {
        self.parties.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Party> {
        self.parties.values_mut()
    }

    pub fn count(&self) -> usize {
        self.parties.len()
    }

    /// Adds `member` to `leader`'s party, founding it if needed. False when
    /// the party is full or `member` already belongs to one.
    pub fn join(&mut self, leader: i32, member: i32, auto_share: bool) -> bool {
        if self.in_party(member) || leader == member {
            return false;
        }
        if let Some(&key) = self.member_of.get(&leader) {
            if key != leader {
                return false;
            }
            let Some(party) = self.parties.get_mut(&key) else { return false };
            if party.is_full() {
                return false;
            }
            party.members.push(member);
        } else {
            self.parties.insert(
                leader,
                Party { leader, members: vec![leader, member], auto_share, shown_hp: HashMap::new() },
            );
            self.member_of.insert(leader, leader);
        }
        self.member_of.insert(member, leader);
        true
    }

    /// Takes `char_id` out. A leaving leader or a party shrinking to one
    /// member disbands it.
    pub fn leave(&mut self, char_id: i32) -> Option<Departure> {
        let key = *self.member_of.get(&char_id)?;
        let party = self.parties.get_mut(&key)?;
        if key == char_id || party.members.len() <= 2 {
            return Some(Departure::Disbanded(self.disband(key)));
        }
        party.members.retain(|&m| m != char_id);
        party.shown_hp.remove(&char_id);
        let rest = party.members.clone();
        self.member_of.remove(&char_id);
        Some(Departure::Left(rest))
    }

    /// Removes the party led by `leader` and returns its former members.
    pub fn disband(&mut self, leader: i32) -> Vec<i32> {
        let Some(party) = self.parties.remove(&leader) else { return Vec::new() };
        for m in &party.members {
            self.member_of.remove(m);
        }
        party.members
    }

    /// Hands the lead to another member. The party is re-keyed.
    pub fn set_leader(&mut self, old: i32, new: i32) -> bool {
        if !self.is_leader(old) || self.member_of.get(&new) != Some(&old) {
            return false;
        }
        let Some(mut party) = self.parties.remove(&old) else { return false };
        party.leader = new;
        party.members.retain(|&m| m != new);
        party.members.insert(0, new);
        for m in &party.members {
            self.member_of.insert(*m, new);
        }
        self.parties.insert(new, party);
        true
    }
}

/// HP as 0..=100 for party meters.
pub fn hp_percent(hp: i32, max_hp: i32) -> u16 {
    if max_hp <= 0 {
        return 0;
    }
    (i64::from(hp.max(0)) * 100 / i64::from(max_hp)).clamp(0, 100) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_founds_and_caps_party() {
        let mut ps = Parties::default();
        assert!(ps.join(1, 2, false));
        assert!(ps.is_leader(1));
        assert!(!ps.is_leader(2));
        for m in 3..=8 {
            assert!(ps.join(1, m, false));
        }
        assert!(!ps.join(1, 9, false));
        assert!(!ps.join(2, 9, false));
        assert_eq!(ps.get(5).unwrap().members.len(), MAX_PARTY_SIZE);
    }

    #[test]
    fn test_member_leaving_keeps_party() {
        let mut ps = Parties::default();
        ps.join(1, 2, false);
        ps.join(1, 3, false);
        assert_eq!(ps.leave(3), Some(Departure::Left(vec![1, 2])));
        assert!(!ps.in_party(3));
        assert!(ps.in_party(2));
    }

    #[test]
    fn test_leader_or_pair_leaving_disbands() {
        let mut ps = Parties::default();
        ps.join(1, 2, false);
        ps.join(1, 3, false);
        assert_eq!(ps.leave(1), Some(Departure::Disbanded(vec![1, 2, 3])));
        assert_eq!(ps.count(), 0);

        ps.join(4, 5, true);
        assert_eq!(ps.leave(5), Some(Departure::Disbanded(vec![4, 5])));
        assert!(!ps.in_party(4));
        assert_eq!(ps.leave(4), None);
    }

    #[test]
    fn test_lead_transfer_rekeys() {
        let mut ps = Parties::default();
        ps.join(1, 2, false);
        ps.join(1, 3, false);
        assert!(ps.set_leader(1, 3));
        assert!(ps.is_leader(3));
        assert_eq!(ps.get(1).unwrap().members, vec![3, 1, 2]);
        assert!(!ps.set_leader(1, 2));
    }

    #[test]
    fn test_hp_percent_bounds() {
        assert_eq!(hp_percent(50, 200), 25);
        assert_eq!(hp_percent(-3, 200), 0);
        assert_eq!(hp_percent(300, 200), 100);
        assert_eq!(hp_percent(1, 0), 0);
    }
}
