pub mod mailbox;
pub mod messages;
pub mod neighbor;
pub mod node;
pub mod pending;
pub mod routing_table;
pub mod task_manager;

pub use mailbox::{Command, CommandSender, Inbox, Mailbox, MailboxReceiver, MailboxRegistry};
pub use messages::Advertisement;
pub use neighbor::{Neighbor, NeighborTable};
pub use node::Node;
pub use pending::PendingTracker;
pub use routing_table::{RouteInfo, RoutingTable};

use crate::error::ControllerError;
use crate::{Cost, NodeId};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to one routing actor.
///
/// The node's tables sit behind their own lock. Other nodes never take that
/// lock; they reach this node only through its mailbox in the registry.
/// The controller reaches it through its command channel.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    node: Arc<Mutex<Node>>,
    registry: Arc<MailboxRegistry>,
    tracker: Arc<PendingTracker>,
    commands: CommandSender,
}

impl NodeHandle {
    pub fn new(
        node: Node,
        registry: Arc<MailboxRegistry>,
        tracker: Arc<PendingTracker>,
        commands: CommandSender,
    ) -> Self {
        Self {
            id: node.id().clone(),
            node: Arc::new(Mutex::new(node)),
            registry,
            tracker,
            commands,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn tracker(&self) -> &Arc<PendingTracker> {
        &self.tracker
    }

    /// Consistent copy of the node's tables, taken under its lock.
    pub async fn snapshot(&self) -> Node {
        self.node.lock().await.clone()
    }

    pub async fn link_cost(&self, neighbor: &NodeId) -> Option<Cost> {
        self.node.lock().await.link_cost(neighbor)
    }

    /// Runs the relaxation step. Rejected advertisements are logged and
    /// count as "no change".
    pub async fn receive_advertisement(&self, adv: &Advertisement) -> bool {
        let mut node = self.node.lock().await;
        let result = node.receive_advertisement(adv);
        drop(node);

        match result {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Discarding advertisement: {}", e);
                false
            }
        }
    }

    /// Snapshots the route table and posts it to every neighbor.
    pub async fn send_advertisement(&self) {
        let node = self.node.lock().await;
        let adv = node.advertisement();
        let neighbors = node.neighbors().ids();
        drop(node);

        if neighbors.is_empty() {
            return;
        }

        self.tracker.add(neighbors.len());
        for neighbor in &neighbors {
            match self.registry.get(neighbor) {
                Some(mailbox) => {
                    mailbox.post(adv.clone(), &self.tracker).await;
                }
                None => {
                    warn!("Node {} has no mailbox for neighbor {}", self.id, neighbor);
                    self.tracker.subtract(1);
                }
            }
        }

        debug!(
            "Node {} advertised {} routes to {} neighbors",
            self.id,
            adv.table.len(),
            neighbors.len()
        );
    }

    /// Queues work for this node's worker and counts it as pending.
    /// Never waits; returns false only if the inbox is gone.
    pub fn enqueue(&self, command: Command) -> bool {
        self.tracker.add(1);
        if self.commands.send(command).is_err() {
            warn!("Node {} has no inbox, dropping command", self.id);
            self.tracker.subtract(1);
            return false;
        }
        true
    }

    /// Sets this endpoint's cost for the link to `neighbor` and shifts the
    /// routes through it, without advertising. Returns the previous cost.
    pub async fn set_link_cost(&self, neighbor: &NodeId, cost: Cost) -> Result<Cost, ControllerError> {
        let mut node = self.node.lock().await;
        let previous = node.set_link_cost(neighbor, cost);
        drop(node);

        previous.ok_or_else(|| ControllerError::NoSuchLink(self.id.clone(), neighbor.clone()))
    }

    /// Like [`NodeHandle::set_link_cost`], then always has the worker
    /// re-advertise. Returns the previous cost.
    pub async fn update_link_cost(&self, neighbor: &NodeId, cost: Cost) -> Result<Cost, ControllerError> {
        let previous = self.set_link_cost(neighbor, cost).await?;
        self.enqueue(Command::Readvertise);
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::network::{Topology, TopologyDescription};

    fn pair() -> (NodeHandle, NodeHandle, Vec<Inbox>, Arc<PendingTracker>) {
        let topology = Topology::build(&TopologyDescription::Matrix(vec![vec![0, 2], vec![2, 0]])).unwrap();
        let tracker = Arc::new(PendingTracker::new());
        let mut mailboxes = Vec::new();
        let mut senders = Vec::new();
        let mut inboxes = Vec::new();
        for id in topology.nodes() {
            let (mailbox, commands, inbox) = mailbox::inbox(id.clone(), 4, OverflowPolicy::Block);
            mailboxes.push(mailbox);
            senders.push(commands);
            inboxes.push(inbox);
        }
        let registry = Arc::new(MailboxRegistry::new(mailboxes));
        let mut handles = topology
            .build_nodes()
            .into_iter()
            .zip(senders)
            .map(|(node, commands)| NodeHandle::new(node, registry.clone(), tracker.clone(), commands));
        let first = handles.next().unwrap();
        let second = handles.next().unwrap();
        (first, second, inboxes, tracker)
    }

    #[tokio::test]
    async fn redundant_advertisement_reports_no_change() {
        let (first, second, _inboxes, tracker) = pair();
        let adv = second.snapshot().await.advertisement();

        assert!(!first.receive_advertisement(&adv).await);
        assert!(!first.receive_advertisement(&adv).await);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn fan_out_is_counted_per_neighbor() {
        let (first, _second, mut inboxes, tracker) = pair();

        first.send_advertisement().await;
        assert_eq!(tracker.len(), 1);
        let adv = inboxes[1].mailbox.recv().await.unwrap();
        assert_eq!(adv.from, NodeId::Index(0));
    }

    #[tokio::test]
    async fn link_update_queues_a_readvertise() {
        let (first, _second, mut inboxes, tracker) = pair();

        assert_eq!(first.update_link_cost(&NodeId::Index(1), 5).await, Ok(2));
        assert_eq!(first.link_cost(&NodeId::Index(1)).await, Some(5));
        assert_eq!(tracker.len(), 1);
        assert!(matches!(inboxes[0].commands.recv().await, Some(Command::Readvertise)));

        assert_eq!(
            first.set_link_cost(&NodeId::Index(7), 1).await,
            Err(ControllerError::NoSuchLink(NodeId::Index(0), NodeId::Index(7)))
        );
    }
}
