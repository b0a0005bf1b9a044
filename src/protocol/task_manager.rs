//! Node worker control loops.
//!
//! Every worker owns its inbox while it runs and hands it back when it
//! exits, so a settled quiescent network can be woken again later.
//!
//! A worker keeps reading its own mailbox while one of its posts waits for
//! room in a full neighbor mailbox. Whatever arrives meanwhile goes to a
//! local backlog, processed in arrival order before the mailbox is read
//! again. Two neighbors blocked on each other's full mailboxes therefore
//! still make progress under `OverflowPolicy::Block`.

use super::messages::Advertisement;
use super::{Command, Inbox, NodeHandle};
use crate::config::Discipline;
use log::{debug, info};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;

pub fn spawn_worker(
    handle: NodeHandle,
    inbox: Inbox,
    discipline: Discipline,
    period: Duration,
    shutdown_rx: broadcast::Receiver<()>,
    initial_advertisement: bool,
) -> JoinHandle<Inbox> {
    tokio::spawn(async move {
        match discipline {
            Discipline::Periodic => periodic_task(handle, inbox, period, shutdown_rx).await,
            Discipline::Quiescent => quiescent_task(handle, inbox, shutdown_rx, initial_advertisement).await,
        }
    })
}

enum Event {
    Advertisement(Advertisement),
    Command(Command),
}

struct Worker {
    handle: NodeHandle,
    inbox: Inbox,
    backlog: VecDeque<Advertisement>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Worker {
    fn new(handle: NodeHandle, inbox: Inbox, shutdown_rx: broadcast::Receiver<()>) -> Self {
        Self {
            handle,
            inbox,
            backlog: VecDeque::new(),
            shutdown_rx,
        }
    }

    /// Fans out the node's table unless shutdown wins the race.
    async fn advertise(&mut self) -> bool {
        let fan_out = self.handle.send_advertisement();
        tokio::pin!(fan_out);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return false,
                _ = &mut fan_out => return true,
                Some(adv) = self.inbox.mailbox.recv() => self.backlog.push_back(adv),
            }
        }
    }

    /// Processes one event, fans out if the table changed, then releases
    /// the event's pending token. Returns false if shutdown cut it short.
    async fn handle_event(&mut self, event: Event) -> bool {
        let changed = match event {
            Event::Advertisement(adv) | Event::Command(Command::Deliver(adv)) => {
                self.handle.receive_advertisement(&adv).await
            }
            Event::Command(Command::Readvertise) => true,
        };

        if changed && !self.advertise().await {
            return false;
        }
        self.handle.tracker().subtract(1);
        true
    }
}

/// Timer-driven gossip: advertise on every tick and after every change,
/// until the shutdown signal arrives.
pub async fn periodic_task(
    handle: NodeHandle,
    inbox: Inbox,
    period: Duration,
    shutdown_rx: broadcast::Receiver<()>,
) -> Inbox {
    let mut worker = Worker::new(handle, inbox, shutdown_rx);
    let mut ticker = interval(period);

    loop {
        let event = match worker.backlog.pop_front() {
            Some(adv) => Some(Event::Advertisement(adv)),
            None => tokio::select! {
                _ = worker.shutdown_rx.recv() => {
                    debug!("Node {} periodic worker shutting down", worker.handle.id());
                    break;
                }
                _ = ticker.tick() => None,
                command = worker.inbox.commands.recv() => {
                    let Some(command) = command else { break };
                    Some(Event::Command(command))
                }
                message = worker.inbox.mailbox.recv() => {
                    let Some(adv) = message else { break };
                    Some(Event::Advertisement(adv))
                }
            },
        };

        let running = match event {
            Some(event) => worker.handle_event(event).await,
            None => worker.advertise().await,
        };
        if !running {
            break;
        }
    }

    worker.inbox
}

/// Change-driven propagation: advertise only when the table changed, and
/// exit once no advertisement is pending anywhere in the network.
///
/// With `initial_advertisement` the worker first sends its table and then
/// releases the startup token the controller took for it.
pub async fn quiescent_task(
    handle: NodeHandle,
    inbox: Inbox,
    shutdown_rx: broadcast::Receiver<()>,
    initial_advertisement: bool,
) -> Inbox {
    let tracker = handle.tracker().clone();
    let mut empty_rx = tracker.subscribe();
    let mut worker = Worker::new(handle, inbox, shutdown_rx);

    if initial_advertisement {
        if !worker.advertise().await {
            return worker.inbox;
        }
        tracker.subtract(1);
    }

    let mut processed = 0usize;
    loop {
        let event = match worker.backlog.pop_front() {
            Some(adv) => Event::Advertisement(adv),
            None => tokio::select! {
                biased;
                _ = worker.shutdown_rx.recv() => {
                    debug!("Node {} quiescent worker shutting down", worker.handle.id());
                    break;
                }
                command = worker.inbox.commands.recv() => {
                    let Some(command) = command else { break };
                    Event::Command(command)
                }
                message = worker.inbox.mailbox.recv() => {
                    let Some(adv) = message else { break };
                    Event::Advertisement(adv)
                }
                _ = async { empty_rx.wait_for(|empty| *empty).await.is_ok() } => {
                    info!("Node {} settled after {} events", worker.handle.id(), processed);
                    break;
                }
            },
        };

        if !worker.handle_event(event).await {
            break;
        }
        processed += 1;
    }

    worker.inbox
}
