use crate::{Cost, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: NodeId,
    pub cost: Cost,
    /// When the last advertisement from this neighbor was accepted.
    pub last_heard: Option<DateTime<Utc>>,
}

impl Neighbor {
    pub fn new(id: NodeId, cost: Cost) -> Self {
        Self {
            id,
            cost,
            last_heard: None,
        }
    }

    pub fn time_since_last_heard(&self) -> Option<chrono::Duration> {
        self.last_heard
            .map(|heard| Utc::now().signed_duration_since(heard))
    }
}

/// Direct links of one node. The neighbor set is fixed once the network is
/// built; only costs and timestamps change afterwards.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    neighbors: BTreeMap<NodeId, Neighbor>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self {
            neighbors: BTreeMap::new(),
        }
    }

    pub fn add_neighbor(&mut self, id: NodeId, cost: Cost) {
        self.neighbors.insert(id.clone(), Neighbor::new(id, cost));
    }

    pub fn cost(&self, id: &NodeId) -> Option<Cost> {
        self.neighbors.get(id).map(|n| n.cost)
    }

    /// Replaces the cost of an existing link, returning the previous cost.
    pub fn set_cost(&mut self, id: &NodeId, cost: Cost) -> Option<Cost> {
        self.neighbors
            .get_mut(id)
            .map(|neighbor| std::mem::replace(&mut neighbor.cost, cost))
    }

    pub fn mark_heard(&mut self, id: &NodeId) {
        if let Some(neighbor) = self.neighbors.get_mut(id) {
            neighbor.last_heard = Some(Utc::now());
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.neighbors.contains_key(id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.neighbors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }
}
