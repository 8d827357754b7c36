//! Teleport bookmarks.

use crate::repo::BookmarkRow;

pub const MAX_BOOKMARKS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkError {
    Full,
    DuplicateName,
    EmptyName,
}

impl BookmarkError {
    pub fn msg_code(self) -> u16 {
        match self {
            BookmarkError::Full => 676,
            BookmarkError::DuplicateName => 327,
            BookmarkError::EmptyName => 327,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Bookmarks {
    entries: Vec<BookmarkRow>,
}

impl Bookmarks {
    pub fn from_rows(rows: Vec<BookmarkRow>) -> Self {
        let mut entries = rows;
        entries.truncate(MAX_BOOKMARKS);
        Self { entries }
    }

    pub fn rows(&self) -> Vec<BookmarkRow> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookmarkRow> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: i32) -> Option<&BookmarkRow> {
        self.entries.iter().find(|b| b.id == id)
    }

    /// Adds a bookmark named `name`; the new id is one past the current max.
    pub fn add(&mut self, name: &str, map_id: i16, x: i32, y: i32) -> Result<&BookmarkRow, BookmarkError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BookmarkError::EmptyName);
        }
        if self.entries.len() >= MAX_BOOKMARKS {
            return Err(BookmarkError::Full);
        }
        if self.entries.iter().any(|b| b.name == name) {
            return Err(BookmarkError::DuplicateName);
        }
        let id = self.entries.iter().map(|b| b.id).max().unwrap_or(0) + 1;
        self.entries.push(BookmarkRow { id, name: name.to_string(), x, y, map_id });
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn remove_by_name(&mut self, name: &str) -> Option<BookmarkRow> {
        let idx = self.entries.iter().position(|b| b.name == name)?;
        Some(self.entries.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_max_plus_one() {
        let mut b = Bookmarks::from_rows(vec![BookmarkRow { id: 7, name: "town".into(), x: 1, y: 1, map_id: 4 }]);
        let added = b.add("dungeon", 4, 2, 2).unwrap();
        assert_eq!(added.id, 8);
        assert_eq!(b.add("town", 4, 3, 3).unwrap_err(), BookmarkError::DuplicateName);
        assert_eq!(b.add("  ", 4, 3, 3).unwrap_err(), BookmarkError::EmptyName);
        assert!(b.remove_by_name("town").is_some());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_cap() {
        let mut b = Bookmarks::default();
        for i in 0..MAX_BOOKMARKS {
            b.add(&format!("bm{}", i), 4, 0, 0).unwrap();
        }
        assert_eq!(b.add("one more", 4, 0, 0).unwrap_err(), BookmarkError::Full);
    }
}
