use crate::{Cost, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub next_hop: NodeId,
    pub cost: Cost,
}

/// Destination-indexed route table of a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    entries: BTreeMap<NodeId, RouteInfo>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Installs or replaces the route to `destination`, returning the previous one.
    pub fn set_route(&mut self, destination: NodeId, next_hop: NodeId, cost: Cost) -> Option<RouteInfo> {
        self.entries.insert(destination, RouteInfo { next_hop, cost })
    }

    pub fn get(&self, destination: &NodeId) -> Option<&RouteInfo> {
        self.entries.get(destination)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &RouteInfo)> {
        self.entries.iter()
    }

    /// Routes whose first hop is `next_hop`.
    pub fn iter_via_mut<'a>(
        &'a mut self,
        next_hop: &'a NodeId,
    ) -> impl Iterator<Item = (&'a NodeId, &'a mut RouteInfo)> + 'a {
        self.entries
            .iter_mut()
            .filter(move |(_, route)| route.next_hop == *next_hop)
    }

    /// Destination to cost view; next hops are never advertised.
    pub fn costs(&self) -> BTreeMap<NodeId, Cost> {
        self.entries
            .iter()
            .map(|(destination, route)| (destination.clone(), route.cost))
            .collect()
    }
}
