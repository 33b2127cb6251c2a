//! This node's slice of the cluster topology

use broadcast_core::{NodeId, Topology};
use parking_lot::RwLock;
use std::collections::HashSet;

/// The local node's neighbor list.
///
/// Empty until a topology is installed. Each install replaces the list
/// wholesale; readers see either the old or the new list, never a mix.
pub struct TopologyTable {
    local_id: NodeId,
    neighbors: RwLock<Vec<NodeId>>,
}

impl TopologyTable {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            neighbors: RwLock::new(Vec::new()),
        }
    }

    /// Keep only this node's entry of `topology`. A topology that does not
    /// mention this node installs an empty list. Returns the neighbor count.
    pub fn install(&self, topology: &Topology) -> usize {
        let neighbors = topology.get(&self.local_id).map(Vec::as_slice).unwrap_or_default();
        self.replace(neighbors)
    }

    /// Replace the neighbor list directly, dropping duplicates
    pub fn replace(&self, neighbors: &[NodeId]) -> usize {
        let mut seen = HashSet::new();
        let neighbors: Vec<NodeId> = neighbors
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();

        let count = neighbors.len();
        *self.neighbors.write() = neighbors;
        count
    }

    /// Current neighbor list; empty means gossip to nobody yet
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.neighbors.read().clone()
    }

    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    fn topology(entries: &[(&str, &[&str])]) -> Topology {
        entries
            .iter()
            .map(|(node, neighbors)| (NodeId::from(*node), ids(neighbors)))
            .collect()
    }

    #[test]
    fn test_empty_before_install() {
        let table = TopologyTable::new("n1".into());
        assert!(table.neighbors().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_install_keeps_only_local_entry() {
        let table = TopologyTable::new("n1".into());
        let count = table.install(&topology(&[("n1", &["n2", "n3"]), ("n2", &["n1"])]));

        assert_eq!(count, 2);
        assert_eq!(table.neighbors(), ids(&["n2", "n3"]));
    }

    #[test]
    fn test_install_replaces_not_merges() {
        let table = TopologyTable::new("A".into());
        table.install(&topology(&[("A", &["B"])]));
        table.install(&topology(&[("A", &["C"])]));

        assert_eq!(table.neighbors(), ids(&["C"]));
    }

    #[test]
    fn test_absent_local_node_installs_empty() {
        let table = TopologyTable::new("n1".into());
        table.install(&topology(&[("n1", &["n2"])]));
        table.install(&topology(&[("n2", &["n3"])]));

        assert!(table.neighbors().is_empty());
    }

    #[test]
    fn test_duplicates_dropped_in_order() {
        let table = TopologyTable::new("n1".into());
        table.install(&topology(&[("n1", &["n3", "n2", "n3", "n1"])]));

        assert_eq!(table.neighbors(), ids(&["n3", "n2", "n1"]));
        assert_eq!(table.len(), 3);
    }
}
