use super::messages::Advertisement;
use super::pending::PendingTracker;
use crate::NodeId;
use crate::config::OverflowPolicy;
use log::debug;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

pub type MailboxReceiver = mpsc::Receiver<Advertisement>;
pub type CommandSender = mpsc::UnboundedSender<Command>;

/// Work the controller hands to a node. Commands travel on an unbounded
/// side channel so the controller never waits on a full mailbox.
#[derive(Debug, Clone)]
pub enum Command {
    /// Fan the current table out again, e.g. after a link cost change.
    Readvertise,
    /// Process an advertisement injected from outside the network.
    Deliver(Advertisement),
}

/// Receiving side of everything addressed to one node. A worker owns it
/// while it runs and returns it when it exits.
#[derive(Debug)]
pub struct Inbox {
    pub mailbox: MailboxReceiver,
    pub commands: mpsc::UnboundedReceiver<Command>,
}

/// Sending side of a node's inbound queue.
#[derive(Debug, Clone)]
pub struct Mailbox {
    owner: NodeId,
    tx: mpsc::Sender<Advertisement>,
    policy: OverflowPolicy,
}

pub fn mailbox(owner: NodeId, capacity: usize, policy: OverflowPolicy) -> (Mailbox, MailboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Mailbox { owner, tx, policy }, rx)
}

/// Creates a node's mailbox, its command channel and the matching inbox.
pub fn inbox(owner: NodeId, capacity: usize, policy: OverflowPolicy) -> (Mailbox, CommandSender, Inbox) {
    let (mailbox, rx) = mailbox(owner, capacity, policy);
    let (commands_tx, commands) = mpsc::unbounded_channel();
    (mailbox, commands_tx, Inbox { mailbox: rx, commands })
}

impl Mailbox {
    pub fn owner(&self) -> &NodeId {
        &self.owner
    }

    /// Enqueues an advertisement that the caller already counted as pending.
    ///
    /// A message that never reaches the queue is uncounted again here.
    /// Returns whether it was enqueued.
    pub async fn post(&self, adv: Advertisement, tracker: &PendingTracker) -> bool {
        let delivered = match self.policy {
            OverflowPolicy::Block => self.tx.send(adv).await.is_ok(),
            OverflowPolicy::DropNewest => match self.tx.try_send(adv) {
                Ok(()) => true,
                Err(TrySendError::Full(adv)) => {
                    debug!(
                        "Mailbox of {} is full, dropping advertisement from {}",
                        self.owner, adv.from
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
        };

        if !delivered {
            tracker.subtract(1);
        }
        delivered
    }
}

/// Id-addressed mailbox handles, built once before any worker starts.
#[derive(Debug, Default)]
pub struct MailboxRegistry {
    boxes: HashMap<NodeId, Mailbox>,
}

impl MailboxRegistry {
    pub fn new(boxes: impl IntoIterator<Item = Mailbox>) -> Self {
        Self {
            boxes: boxes
                .into_iter()
                .map(|mailbox| (mailbox.owner.clone(), mailbox))
                .collect(),
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&Mailbox> {
        self.boxes.get(id)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn adv(from: usize) -> Advertisement {
        Advertisement::new(NodeId::Index(from), BTreeMap::new())
    }

    #[tokio::test]
    async fn drop_newest_uncounts_overflow() {
        let tracker = PendingTracker::new();
        let (mailbox, mut rx) = mailbox(NodeId::Index(0), 1, OverflowPolicy::DropNewest);

        tracker.add(2);
        assert!(mailbox.post(adv(1), &tracker).await);
        assert!(!mailbox.post(adv(2), &tracker).await);
        assert_eq!(tracker.len(), 1);

        assert_eq!(rx.recv().await.unwrap().from, NodeId::Index(1));
    }

    #[tokio::test]
    async fn closed_mailbox_uncounts_message() {
        let tracker = PendingTracker::new();
        let (mailbox, rx) = mailbox(NodeId::Index(0), 4, OverflowPolicy::Block);
        drop(rx);

        tracker.add(1);
        assert!(!mailbox.post(adv(1), &tracker).await);
        assert!(tracker.is_empty());
    }

    #[test]
    fn registry_indexes_by_owner() {
        let (a, _ra) = mailbox(NodeId::from("a"), 1, OverflowPolicy::Block);
        let (b, _rb) = mailbox(NodeId::from("b"), 1, OverflowPolicy::Block);
        let registry = MailboxRegistry::new([a, b]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&NodeId::from("b")).unwrap().owner(), &NodeId::from("b"));
        assert!(registry.get(&NodeId::from("c")).is_none());
    }
}
