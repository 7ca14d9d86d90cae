//! Ephemeral per-user selections
//!
//! Cursors have no history to replay: a consumer behind the current version
//! receives the whole current set. Removals do not bump the version; absence
//! is conveyed by omission in the next snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mapping::{Assoc, Mapping};

/// A selection range; a caret has `anchor == head`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn caret(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }
}

/// Full cursor state at a version, handed to consumers that are behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub version: u64,
    pub cursors: HashMap<String, Selection>,
}

/// Cursor state of one instance, keyed by user display name.
#[derive(Debug, Default)]
pub struct Cursors {
    cursors: HashMap<String, Selection>,
    version: u64,
}

impl Cursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn update(&mut self, user: impl Into<String>, selection: Selection) {
        self.cursors.insert(user.into(), selection);
        self.version += 1;
    }

    pub fn remove(&mut self, user: &str) {
        self.cursors.remove(user);
    }

    /// Re-anchor every selection. Sticking to the right of insertions means
    /// typing at your own caret pushes it forward.
    pub fn map_through(&mut self, mapping: &Mapping) {
        for selection in self.cursors.values_mut() {
            selection.anchor = mapping.map(selection.anchor, Assoc::After);
            selection.head = mapping.map(selection.head, Assoc::After);
        }
    }

    /// Snapshot semantics: `None` when the caller is current, otherwise the
    /// entire current set.
    pub fn list_since(&self, version: u64) -> Option<CursorSnapshot> {
        if version >= self.version {
            return None;
        }
        Some(CursorSnapshot {
            version: self.version,
            cursors: self.cursors.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::StepMap;

    #[test]
    fn test_update_bumps_version() {
        let mut cursors = Cursors::new();
        cursors.update("ada", Selection::caret(3));
        cursors.update("bob", Selection { anchor: 1, head: 5 });
        assert_eq!(cursors.version(), 2);
    }

    #[test]
    fn test_remove_does_not_bump_version() {
        let mut cursors = Cursors::new();
        cursors.update("ada", Selection::caret(3));
        cursors.remove("ada");
        assert_eq!(cursors.version(), 1);
        // absence shows up in the next snapshot
        let snapshot = cursors.list_since(0).unwrap();
        assert!(snapshot.cursors.is_empty());
    }

    #[test]
    fn test_list_since_snapshot_semantics() {
        let mut cursors = Cursors::new();
        cursors.update("ada", Selection::caret(3));
        cursors.update("ada", Selection::caret(4));

        assert!(cursors.list_since(2).is_none());
        assert!(cursors.list_since(5).is_none());

        let snapshot = cursors.list_since(0).unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.cursors["ada"], Selection::caret(4));
    }

    #[test]
    fn test_map_through_moves_selections() {
        let mut cursors = Cursors::new();
        cursors.update("ada", Selection { anchor: 4, head: 8 });
        let mapping = Mapping::from_maps(vec![StepMap::new(vec![(2, 0, 3)])]);
        cursors.map_through(&mapping);
        let snapshot = cursors.list_since(0).unwrap();
        assert_eq!(snapshot.cursors["ada"], Selection { anchor: 7, head: 11 });
        // mapping does not bump the cursor version
        assert_eq!(cursors.version(), 1);
    }
}
