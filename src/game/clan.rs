//! Clans (pledges) loaded at startup and kept in step with the clan tables.

use std::collections::HashMap;

pub const RANK_LEAGUE_PUBLIC: i16 = 2;
pub const RANK_PUBLIC: i16 = 7;
pub const RANK_PROBATION: i16 = 8;
pub const RANK_GUARDIAN: i16 = 9;
pub const RANK_PRINCE: i16 = 10;

/// Adena a royal pays to found a clan.
pub const CLAN_CREATE_COST: i32 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClanMember {
    pub char_id: i32,
    pub name: String,
    pub rank: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clan {
    pub clan_id: i32,
    pub name: String,
    pub leader_id: i32,
    pub leader_name: String,
    pub found_date: i64,
    pub has_castle: i32,
    pub has_house: i32,
    pub members: HashMap<i32, ClanMember>,
}

impl Clan {
    /// Members allowed to accept applicants.
    pub fn can_recruit(&self, char_id: i32) -> bool {
        self.members.get(&char_id).is_some_and(|m| m.rank == RANK_PRINCE || m.rank == RANK_GUARDIAN)
    }
}

#[derive(Debug, Default)]
pub struct Clans {
    clans: HashMap<i32, Clan>,
    by_name: HashMap<String, i32>,
    member_of: HashMap<i32, i32>,
}

impl Clans {
    pub fn insert(&mut self, clan: Clan) {
        self.by_name.insert(clan.name.to_lowercase(), clan.clan_id);
        for id in clan.members.keys() {
            self.member_of.insert(*id, clan.clan_id);
        }
        self.clans.insert(clan.clan_id, clan);
    }

    pub fn get(&self, clan_id: i32) -> Option<&Clan> {
        self.clans.get(&clan_id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Clan> {
        self.clans.get(self.by_name.get(&name.to_lowercase())?)
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_lowercase())
    }

    pub fn clan_of(&self, char_id: i32) -> Option<&Clan> {
        self.clans.get(self.member_of.get(&char_id)?)
    }

    pub fn count(&self) -> usize {
        self.clans.len()
    }

    pub fn add_member(&mut self, clan_id: i32, member: ClanMember) {
        let Some(clan) = self.clans.get_mut(&clan_id) else { return };
        self.member_of.insert(member.char_id, clan_id);
        clan.members.insert(member.char_id, member);
    }

    pub fn remove_member(&mut self, clan_id: i32, char_id: i32) {
        let Some(clan) = self.clans.get_mut(&clan_id) else { return };
        clan.members.remove(&char_id);
        self.member_of.remove(&char_id);
    }

    /// Drops the clan and returns it for notification.
    pub fn remove(&mut self, clan_id: i32) -> Option<Clan> {
        let clan = self.clans.remove(&clan_id)?;
        self.by_name.remove(&clan.name.to_lowercase());
        for id in clan.members.keys() {
            self.member_of.remove(id);
        }
        Some(clan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clan(id: i32, name: &str, leader: i32) -> Clan {
        let mut members = HashMap::new();
        members.insert(leader, ClanMember { char_id: leader, name: format!("p{}", leader), rank: RANK_PRINCE });
        Clan {
            clan_id: id,
            name: name.into(),
            leader_id: leader,
            leader_name: format!("p{}", leader),
            found_date: 0,
            has_castle: 0,
            has_house: 0,
            members,
        }
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut cs = Clans::default();
        cs.insert(clan(1, "Knights", 10));
        assert!(cs.name_taken("KNIGHTS"));
        assert_eq!(cs.by_name("knights").map(|c| c.clan_id), Some(1));
        assert_eq!(cs.clan_of(10).map(|c| c.clan_id), Some(1));
    }

    #[test]
    fn test_membership_follows_adds_and_removals() {
        let mut cs = Clans::default();
        cs.insert(clan(1, "Knights", 10));
        cs.add_member(1, ClanMember { char_id: 11, name: "p11".into(), rank: RANK_PUBLIC });
        assert!(!cs.get(1).unwrap().can_recruit(11));
        assert!(cs.get(1).unwrap().can_recruit(10));
        cs.remove_member(1, 11);
        assert!(cs.clan_of(11).is_none());
        let gone = cs.remove(1).unwrap();
        assert_eq!(gone.members.len(), 1);
        assert!(!cs.name_taken("knights"));
        assert!(cs.clan_of(10).is_none());
    }
}
