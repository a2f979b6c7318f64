//! Per-neighbor load accounting
//!
//! The [`LoadTable`] holds one counter per configured neighbor, in configured
//! order. A counter moves only one way: up by exactly one for every
//! *successful* forward to that neighbor. It is cumulative, not an
//! instantaneous queue depth.
//!
//! Readers never see the table itself; they get a [`LoadSnapshot`], an
//! owned copy taken under the shared-state lock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use relaymesh_core::NodeName;

/// One neighbor's counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadEntry {
    /// The neighbor
    pub neighbor: NodeName,
    /// Successful forwards to this neighbor
    pub load: u64,
}

/// Mutable load table, one entry per configured neighbor
#[derive(Debug, Clone, Default)]
pub struct LoadTable {
    entries: Vec<LoadEntry>,
    index: HashMap<NodeName, usize>,
}

impl LoadTable {
    /// Create a table with a zeroed entry per neighbor
    ///
    /// Repeated names collapse to the first occurrence.
    pub fn for_neighbors(neighbors: &[NodeName]) -> Self {
        let mut table = Self::default();
        for neighbor in neighbors {
            if table.index.contains_key(neighbor) {
                continue;
            }
            table.index.insert(neighbor.clone(), table.entries.len());
            table.entries.push(LoadEntry {
                neighbor: neighbor.clone(),
                load: 0,
            });
        }
        table
    }

    /// Increment a neighbor's counter, returning the new value
    ///
    /// Returns `None` if `neighbor` is not in the table.
    pub fn increment(&mut self, neighbor: &NodeName) -> Option<u64> {
        let slot = *self.index.get(neighbor)?;
        let entry = &mut self.entries[slot];
        entry.load += 1;
        Some(entry.load)
    }

    /// Current counter for a neighbor
    pub fn get(&self, neighbor: &NodeName) -> Option<u64> {
        self.index.get(neighbor).map(|&slot| self.entries[slot].load)
    }

    /// Owned copy of every entry, in configured order
    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            entries: self.entries.clone(),
        }
    }

    /// Number of neighbors tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no neighbors are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Point-in-time copy of a [`LoadTable`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    entries: Vec<LoadEntry>,
}

impl LoadSnapshot {
    /// An empty snapshot (every neighbor reads as zero)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from explicit entries
    pub fn from_entries(entries: Vec<LoadEntry>) -> Self {
        Self { entries }
    }

    /// Counter for a neighbor, if present
    pub fn get(&self, neighbor: &NodeName) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| &entry.neighbor == neighbor)
            .map(|entry| entry.load)
    }

    /// Entries in configured order
    pub fn entries(&self) -> &[LoadEntry] {
        &self.entries
    }

    /// Iterate over `(neighbor, load)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, u64)> {
        self.entries.iter().map(|entry| (&entry.neighbor, entry.load))
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|entry| entry.load).sum()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<NodeName> {
        list.iter().map(|s| NodeName::new(*s).unwrap()).collect()
    }

    #[test]
    fn test_initialized_to_zero_in_order() {
        let table = LoadTable::for_neighbors(&names(&["C", "D", "E"]));
        let snapshot = table.snapshot();

        let order: Vec<_> = snapshot.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, vec!["C", "D", "E"]);
        assert_eq!(snapshot.total(), 0);
    }

    #[test]
    fn test_increment_by_one() {
        let neighbors = names(&["C", "D"]);
        let mut table = LoadTable::for_neighbors(&neighbors);

        assert_eq!(table.increment(&neighbors[0]), Some(1));
        assert_eq!(table.increment(&neighbors[0]), Some(2));
        assert_eq!(table.increment(&neighbors[1]), Some(1));

        assert_eq!(table.get(&neighbors[0]), Some(2));
        assert_eq!(table.snapshot().total(), 3);
    }

    #[test]
    fn test_unknown_neighbor_not_added() {
        let mut table = LoadTable::for_neighbors(&names(&["C"]));
        let stranger = NodeName::new("Z").unwrap();

        assert_eq!(table.increment(&stranger), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&stranger), None);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let neighbors = names(&["C"]);
        let mut table = LoadTable::for_neighbors(&neighbors);
        let before = table.snapshot();

        table.increment(&neighbors[0]);

        assert_eq!(before.get(&neighbors[0]), Some(0));
        assert_eq!(table.snapshot().get(&neighbors[0]), Some(1));
    }

    #[test]
    fn test_repeated_neighbor_collapses() {
        let table = LoadTable::for_neighbors(&names(&["C", "C", "D"]));
        assert_eq!(table.len(), 2);
    }
}
