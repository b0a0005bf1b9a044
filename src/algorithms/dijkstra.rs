use crate::{Cost, NodeId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestPath {
    pub cost: Cost,
    /// First hop from the source; `None` for the source itself.
    pub next_hop: Option<NodeId>,
    pub path: Vec<NodeId>,
}

#[derive(Debug)]
struct State {
    cost: Cost,
    node: NodeId,
}

impl Eq for State {}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.node == other.node
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub type Adjacency = BTreeMap<NodeId, BTreeMap<NodeId, Cost>>;

/// Single-source shortest paths. Unreachable nodes are absent from the result.
pub fn shortest_paths(graph: &Adjacency, source: &NodeId) -> BTreeMap<NodeId, ShortestPath> {
    let mut distances: BTreeMap<NodeId, Cost> = BTreeMap::new();
    let mut previous: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut heap = BinaryHeap::new();

    if !graph.contains_key(source) {
        return BTreeMap::new();
    }

    distances.insert(source.clone(), 0);
    heap.push(State {
        cost: 0,
        node: source.clone(),
    });

    while let Some(State { cost, node }) = heap.pop() {
        // Skip if we've already found a better path
        if cost > distances.get(&node).copied().unwrap_or(Cost::MAX) {
            continue;
        }

        let Some(neighbors) = graph.get(&node) else {
            continue;
        };
        for (neighbor, link_cost) in neighbors {
            let new_cost = cost.saturating_add(*link_cost);
            if new_cost < distances.get(neighbor).copied().unwrap_or(Cost::MAX) {
                distances.insert(neighbor.clone(), new_cost);
                previous.insert(neighbor.clone(), node.clone());
                heap.push(State {
                    cost: new_cost,
                    node: neighbor.clone(),
                });
            }
        }
    }

    distances
        .into_iter()
        .map(|(destination, cost)| {
            let path = reconstruct_path(&previous, &destination);
            let next_hop = path.get(1).cloned();
            (destination, ShortestPath { cost, next_hop, path })
        })
        .collect()
}

/// Distances between every pair of connected nodes.
pub fn all_pairs(graph: &Adjacency) -> BTreeMap<NodeId, BTreeMap<NodeId, ShortestPath>> {
    graph
        .keys()
        .map(|source| (source.clone(), shortest_paths(graph, source)))
        .collect()
}

fn reconstruct_path(previous: &BTreeMap<NodeId, NodeId>, destination: &NodeId) -> Vec<NodeId> {
    let mut path = vec![destination.clone()];
    let mut current = destination;

    while let Some(prev) = previous.get(current) {
        path.push(prev.clone());
        current = prev;
    }

    path.reverse();
    path
}
