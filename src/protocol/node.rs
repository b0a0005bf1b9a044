//! Per-router state and the distance-vector relaxation rule.
//!
//! A [`Node`] is a plain synchronous state machine. It is wrapped in a lock by
//! [`NodeHandle`](super::NodeHandle) and driven by a worker task; nothing in
//! here knows about mailboxes or other nodes' state.

use super::messages::Advertisement;
use super::neighbor::NeighborTable;
use super::routing_table::RoutingTable;
use crate::error::RoutingError;
use crate::{Cost, NodeId};
use log::{debug, info};

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    neighbors: NeighborTable,
    routes: RoutingTable,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        let mut routes = RoutingTable::new();
        routes.set_route(id.clone(), id.clone(), 0);

        Self {
            id,
            neighbors: NeighborTable::new(),
            routes,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn link_cost(&self, neighbor: &NodeId) -> Option<Cost> {
        self.neighbors.cost(neighbor)
    }

    /// Registers one side of a link and installs the one-hop route over it.
    pub fn add_neighbor(&mut self, neighbor: NodeId, cost: Cost) {
        self.neighbors.add_neighbor(neighbor.clone(), cost);
        self.routes.set_route(neighbor.clone(), neighbor, cost);
    }

    /// Changes the cost of the link to `neighbor` and shifts every route that
    /// currently leaves through it by the cost delta.
    ///
    /// Returns the previous link cost, or `None` if `neighbor` is not linked.
    pub fn set_link_cost(&mut self, neighbor: &NodeId, cost: Cost) -> Option<Cost> {
        let previous = self.neighbors.set_cost(neighbor, cost)?;

        for (destination, route) in self.routes.iter_via_mut(neighbor) {
            let shifted = route.cost.saturating_sub(previous).saturating_add(cost);
            debug!(
                "[Node {}] Route to {} via {} shifted from {} to {}",
                self.id, destination, neighbor, route.cost, shifted
            );
            route.cost = shifted;
        }

        info!(
            "[Node {}] Link cost to {} changed from {} to {}",
            self.id, neighbor, previous, cost
        );
        Some(previous)
    }

    /// Applies a neighbor's advertisement. Returns whether any route changed.
    pub fn receive_advertisement(&mut self, adv: &Advertisement) -> Result<bool, RoutingError> {
        let link_cost = self
            .neighbors
            .cost(&adv.from)
            .ok_or_else(|| RoutingError::UnknownNeighbor {
                node: self.id.clone(),
                from: adv.from.clone(),
            })?;
        self.neighbors.mark_heard(&adv.from);

        let mut changed = false;
        for (destination, advertised) in adv.table.iter() {
            if *destination == self.id {
                continue;
            }

            let total = link_cost.saturating_add(*advertised);
            let current = self.routes.get(destination).cloned();

            match current {
                None => {
                    self.routes.set_route(destination.clone(), adv.from.clone(), total);
                    debug!(
                        "[Node {}] New route to {} via {} cost {}",
                        self.id, destination, adv.from, total
                    );
                    changed = true;
                }
                Some(route) if total < route.cost => {
                    self.routes.set_route(destination.clone(), adv.from.clone(), total);
                    debug!(
                        "[Node {}] Cheaper route to {} via {} (was {}, now {})",
                        self.id, destination, adv.from, route.cost, total
                    );
                    changed = true;
                }
                Some(route) if route.next_hop == adv.from && route.cost != total => {
                    // The path through this neighbor got worse.
                    match self.neighbors.cost(destination) {
                        Some(direct) if direct < total => {
                            self.routes.set_route(destination.clone(), destination.clone(), direct);
                        }
                        _ => {
                            self.routes.set_route(destination.clone(), adv.from.clone(), total);
                        }
                    }
                    debug!(
                        "[Node {}] Route to {} via {} degraded from {} to {}",
                        self.id, destination, adv.from, route.cost, total
                    );
                    changed = true;
                }
                Some(_) => {}
            }
        }

        Ok(changed)
    }

    /// Snapshot of the current table for fan-out to the neighbors.
    pub fn advertisement(&self) -> Advertisement {
        Advertisement::new(self.id.clone(), self.routes.costs())
    }
}
