//! Simulation controller: owns the id-indexed node registry, starts and stops
//! the node workers and applies administrative link-cost changes.

use crate::algorithms::dijkstra::{self, Adjacency};
use crate::config::{Discipline, SimulationConfig};
use crate::error::{ControllerError, Error};
use crate::network::{Topology, TopologyDescription};
use crate::protocol::mailbox::inbox;
use crate::protocol::task_manager::spawn_worker;
use crate::protocol::{
    Advertisement, Command, Inbox, MailboxRegistry, Neighbor, Node, NodeHandle, PendingTracker, RouteInfo,
};
use crate::{Cost, NodeId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One line of the final route tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRow {
    pub node: NodeId,
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub cost: Cost,
}

/// Route tables of every node, ordered by node then destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteDump {
    pub rows: Vec<RouteRow>,
}

impl RouteDump {
    pub fn route(&self, node: &NodeId, destination: &NodeId) -> Option<&RouteRow> {
        self.rows
            .iter()
            .find(|row| &row.node == node && &row.destination == destination)
    }
}

/// A route that disagrees with the offline shortest-path reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMismatch {
    pub node: NodeId,
    pub destination: NodeId,
    pub expected_cost: Option<Cost>,
    pub actual: Option<RouteInfo>,
}

/// A link as seen from both of its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub a: NodeId,
    pub b: NodeId,
    pub cost_ab: Option<Cost>,
    pub cost_ba: Option<Cost>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatus {
    pub run_id: Uuid,
    pub discipline: Discipline,
    pub phase: &'static str,
    pub nodes: usize,
    pub links: usize,
    pub pending: usize,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Running(Vec<(NodeId, JoinHandle<Inbox>)>),
    /// Quiescent round finished; every worker exited and returned its inbox.
    Settled,
    Stopped,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running(_) => "running",
            Phase::Settled => "settled",
            Phase::Stopped => "stopped",
        }
    }
}

pub struct Simulation {
    run_id: Uuid,
    config: SimulationConfig,
    topology: Topology,
    nodes: BTreeMap<NodeId, NodeHandle>,
    tracker: Arc<PendingTracker>,
    shutdown_tx: broadcast::Sender<()>,
    idle_inboxes: BTreeMap<NodeId, Inbox>,
    phase: Phase,
}

impl Simulation {
    /// Validates the description and wires one node per participant.
    /// Nothing is spawned until [`Simulation::start`].
    pub fn build(description: &TopologyDescription, config: SimulationConfig) -> Result<Self, Error> {
        let topology = Topology::build(description)?;
        let run_id = Uuid::new_v4();

        let mut mailboxes = Vec::with_capacity(topology.nodes().len());
        let mut command_senders = BTreeMap::new();
        let mut idle_inboxes = BTreeMap::new();
        for id in topology.nodes() {
            let (mailbox, commands, rx) = inbox(id.clone(), config.mailbox_capacity, config.overflow);
            mailboxes.push(mailbox);
            command_senders.insert(id.clone(), commands);
            idle_inboxes.insert(id.clone(), rx);
        }

        let registry = Arc::new(MailboxRegistry::new(mailboxes));
        let tracker = Arc::new(PendingTracker::new());
        let nodes = topology
            .build_nodes()
            .into_iter()
            .filter_map(|node| {
                let commands = command_senders.remove(node.id())?;
                let handle = NodeHandle::new(node, registry.clone(), tracker.clone(), commands);
                Some((handle.id().clone(), handle))
            })
            .collect();

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            "Built simulation {} with {} nodes and {} links ({:?} discipline)",
            run_id,
            topology.nodes().len(),
            topology.links().len(),
            config.discipline
        );

        Ok(Self {
            run_id,
            config,
            topology,
            nodes,
            tracker,
            shutdown_tx,
            idle_inboxes,
            phase: Phase::Idle,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn tracker(&self) -> &Arc<PendingTracker> {
        &self.tracker
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running(_))
    }

    /// Looks a node up by its printed form, e.g. `"2"` or `"10.0.0.1"`.
    pub fn resolve(&self, raw: &str) -> Result<NodeId, ControllerError> {
        let raw = raw.trim();
        self.nodes
            .keys()
            .find(|id| id.to_string() == raw)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownNode(raw.to_string()))
    }

    fn handle(&self, id: &NodeId) -> Result<&NodeHandle, ControllerError> {
        self.nodes
            .get(id)
            .ok_or_else(|| ControllerError::UnknownNode(id.to_string()))
    }

    /// Spawns one worker per node.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(ControllerError::DoubleStart);
        }

        if self.config.discipline == Discipline::Quiescent {
            // one startup token per worker, released after its first advertisement
            self.tracker.add(self.nodes.len());
        }

        self.spawn_round(true);
        info!("Simulation {} started {} workers", self.run_id, self.nodes.len());
        Ok(())
    }

    fn spawn_round(&mut self, initial_advertisement: bool) {
        let mut workers = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Running(workers) => workers,
            _ => Vec::new(),
        };

        for (id, rx) in std::mem::take(&mut self.idle_inboxes) {
            let Some(handle) = self.nodes.get(&id) else { continue };
            let worker = spawn_worker(
                handle.clone(),
                rx,
                self.config.discipline,
                self.config.update_interval(),
                self.shutdown_tx.subscribe(),
                initial_advertisement,
            );
            workers.push((id, worker));
        }

        debug!("Simulation {} running {} workers", self.run_id, workers.len());
        self.phase = Phase::Running(workers);
    }

    /// Joins every worker of the current round and keeps their inboxes.
    async fn collect_round(&mut self) {
        let workers = match std::mem::replace(&mut self.phase, Phase::Settled) {
            Phase::Running(workers) => workers,
            other => {
                self.phase = other;
                return;
            }
        };

        let (ids, handles): (Vec<_>, Vec<_>) = workers.into_iter().unzip();
        for (id, result) in ids.into_iter().zip(futures::future::join_all(handles).await) {
            match result {
                Ok(rx) => {
                    self.idle_inboxes.insert(id, rx);
                }
                Err(e) => error!("Worker for node {} failed: {}", id, e),
            }
        }
    }

    /// Restarts quiescent workers that exited while advertisements were
    /// still pending for them.
    async fn revive_finished(&mut self) {
        let Phase::Running(workers) = &mut self.phase else { return };

        let mut finished = Vec::new();
        let mut index = 0;
        while index < workers.len() {
            if workers[index].1.is_finished() {
                finished.push(workers.swap_remove(index));
            } else {
                index += 1;
            }
        }

        for (id, worker) in finished {
            match worker.await {
                Ok(rx) => {
                    self.idle_inboxes.insert(id, rx);
                }
                Err(e) => error!("Worker for node {} failed: {}", id, e),
            }
        }

        if !self.idle_inboxes.is_empty() {
            debug!("Reviving {} workers with pending work", self.idle_inboxes.len());
            self.spawn_round(false);
        }
    }

    /// Gives queued controller work a worker to run it: a settled network
    /// starts a new round, exited quiescent workers are revived. Before
    /// `start` the work waits in the inboxes.
    async fn wake(&mut self) {
        match self.phase {
            Phase::Settled => self.spawn_round(false),
            Phase::Running(_) if self.config.discipline == Discipline::Quiescent => {
                self.revive_finished().await
            }
            _ => {}
        }
    }

    /// Waits until the network has stabilized, or `limit` elapses.
    ///
    /// Quiescent: the pending count drains and every worker exits. Periodic:
    /// the tables match the reference shortest paths.
    pub async fn settle(&mut self, limit: Duration) -> bool {
        if self.config.discipline == Discipline::Periodic {
            return self.wait_until_converged(limit).await;
        }

        let deadline = Instant::now() + limit;
        loop {
            match &self.phase {
                Phase::Running(_) => {}
                Phase::Settled if self.tracker.is_empty() => return true,
                Phase::Settled => self.spawn_round(false),
                Phase::Idle | Phase::Stopped => {
                    warn!("Cannot settle simulation {} in phase {}", self.run_id, self.phase.name());
                    return false;
                }
            }

            if timeout_at(deadline, self.wait_empty_or_poll()).await.is_err() {
                warn!(
                    "Simulation {} did not settle, {} advertisements pending",
                    self.run_id,
                    self.tracker.len()
                );
                return false;
            }

            if self.tracker.is_empty() {
                self.collect_round().await;
                if self.tracker.is_empty() {
                    info!("Simulation {} settled", self.run_id);
                    return true;
                }
                self.spawn_round(false);
            } else {
                self.revive_finished().await;
            }
        }
    }

    async fn wait_empty_or_poll(&self) {
        tokio::select! {
            _ = self.tracker.wait_empty() => {}
            _ = sleep(POLL_INTERVAL * 5) => {}
        }
    }

    /// Polls the tables until they match the reference or `limit` elapses.
    pub async fn wait_until_converged(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.verify().await.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Changes the cost of link `a`-`b` on both endpoints, one lock at a time.
    ///
    /// Both tables are updated before this returns; the re-advertisements
    /// are queued on the endpoints' command channels, so the controller
    /// never waits on a full mailbox.
    pub async fn inject_link_cost_change(&mut self, a: &NodeId, b: &NodeId, cost: Cost) -> Result<(), Error> {
        if cost == 0 {
            return Err(ControllerError::InvalidCost(cost).into());
        }

        let first = self.handle(a)?.clone();
        let second = self.handle(b)?.clone();
        if first.link_cost(b).await.is_none() || second.link_cost(a).await.is_none() {
            return Err(ControllerError::NoSuchLink(a.clone(), b.clone()).into());
        }

        let previous = if matches!(self.phase, Phase::Stopped) {
            warn!("Simulation {} is stopped, the change will not propagate", self.run_id);
            let previous = first.set_link_cost(b, cost).await?;
            second.set_link_cost(a, cost).await?;
            previous
        } else {
            let previous = first.update_link_cost(b, cost).await?;
            second.update_link_cost(a, cost).await?;
            previous
        };
        info!("Link {} - {} cost changed from {} to {}", a, b, previous, cost);

        self.wake().await;
        Ok(())
    }

    /// Decodes a wire-format advertisement and queues it at node `to`.
    pub async fn deliver_raw(&mut self, to: &NodeId, line: &str) -> Result<(), Error> {
        let adv = match Advertisement::decode(line) {
            Ok(adv) => adv,
            Err(e) => {
                warn!("Discarding payload for node {}: {}", to, e);
                return Err(e.into());
            }
        };

        let handle = self.handle(to)?.clone();
        if matches!(self.phase, Phase::Stopped) {
            warn!("Simulation {} is stopped, dropping advertisement for node {}", self.run_id, to);
            return Ok(());
        }

        handle.enqueue(Command::Deliver(adv));
        self.wake().await;
        Ok(())
    }

    /// Broadcasts the shutdown signal and waits for every worker to exit.
    pub async fn stop(&mut self) -> Result<(), ControllerError> {
        match self.phase {
            Phase::Idle => return Err(ControllerError::StopBeforeStart),
            Phase::Stopped => return Ok(()),
            _ => {}
        }

        // no receivers left is fine: every worker already exited
        let _ = self.shutdown_tx.send(());
        self.collect_round().await;
        self.phase = Phase::Stopped;
        info!("Simulation {} stopped", self.run_id);
        Ok(())
    }

    async fn snapshots(&self) -> Vec<Node> {
        let mut snapshots = Vec::with_capacity(self.nodes.len());
        for handle in self.nodes.values() {
            snapshots.push(handle.snapshot().await);
        }
        snapshots
    }

    pub async fn dump_route_tables(&self) -> RouteDump {
        let mut rows = Vec::new();
        for node in self.snapshots().await {
            for (destination, route) in node.routes().iter() {
                rows.push(RouteRow {
                    node: node.id().clone(),
                    destination: destination.clone(),
                    next_hop: route.next_hop.clone(),
                    cost: route.cost,
                });
            }
        }
        RouteDump { rows }
    }

    /// Cost of link `a`-`b` as recorded by endpoint `a`.
    pub async fn link_cost(&self, a: &NodeId, b: &NodeId) -> Option<Cost> {
        self.nodes.get(a)?.link_cost(b).await
    }

    pub async fn links(&self) -> Vec<LinkView> {
        let mut views = Vec::with_capacity(self.topology.links().len());
        for link in self.topology.links() {
            views.push(LinkView {
                a: link.a.clone(),
                b: link.b.clone(),
                cost_ab: self.link_cost(&link.a, &link.b).await,
                cost_ba: self.link_cost(&link.b, &link.a).await,
            });
        }
        views
    }

    pub async fn neighbors(&self, id: &NodeId) -> Result<Vec<Neighbor>, ControllerError> {
        let node = self.handle(id)?.snapshot().await;
        Ok(node.neighbors().iter().cloned().collect())
    }

    pub fn status(&self) -> SimulationStatus {
        SimulationStatus {
            run_id: self.run_id,
            discipline: self.config.discipline,
            phase: self.phase.name(),
            nodes: self.nodes.len(),
            links: self.topology.links().len(),
            pending: self.tracker.len(),
        }
    }

    /// Compares every route table against shortest paths computed offline
    /// over the current link costs. An empty result means converged.
    pub async fn verify(&self) -> Vec<RouteMismatch> {
        let snapshots = self.snapshots().await;

        let graph: Adjacency = snapshots
            .iter()
            .map(|node| {
                let links = node.neighbors().iter().map(|n| (n.id.clone(), n.cost)).collect();
                (node.id().clone(), links)
            })
            .collect();
        let reference = dijkstra::all_pairs(&graph);

        let mut mismatches = Vec::new();
        for node in &snapshots {
            let Some(expected) = reference.get(node.id()) else { continue };

            for (destination, path) in expected {
                let actual = node.routes().get(destination);
                let ok = match actual {
                    Some(route) if route.cost == path.cost => {
                        next_hop_is_optimal(&graph, &reference, node.id(), destination, route, path.cost)
                    }
                    _ => false,
                };
                if !ok {
                    mismatches.push(RouteMismatch {
                        node: node.id().clone(),
                        destination: destination.clone(),
                        expected_cost: Some(path.cost),
                        actual: actual.cloned(),
                    });
                }
            }

            for (destination, route) in node.routes().iter() {
                if !expected.contains_key(destination) {
                    mismatches.push(RouteMismatch {
                        node: node.id().clone(),
                        destination: destination.clone(),
                        expected_cost: None,
                        actual: Some(route.clone()),
                    });
                }
            }
        }

        mismatches
    }
}

/// Ties are fine: the next hop only has to start *some* optimal path.
fn next_hop_is_optimal(
    graph: &Adjacency,
    reference: &BTreeMap<NodeId, BTreeMap<NodeId, dijkstra::ShortestPath>>,
    node: &NodeId,
    destination: &NodeId,
    route: &RouteInfo,
    cost: Cost,
) -> bool {
    if node == destination {
        return route.next_hop == *node;
    }

    let Some(link) = graph.get(node).and_then(|links| links.get(&route.next_hop)) else {
        return false;
    };
    reference
        .get(&route.next_hop)
        .and_then(|paths| paths.get(destination))
        .map(|rest| link.saturating_add(rest.cost) == cost)
        .unwrap_or(false)
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.shutdown_tx.send(());
        }
    }
}
