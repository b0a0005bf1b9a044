pub mod topology_config;

pub use topology_config::TopologyConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// How node workers decide when to advertise and when to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// Re-advertise on every timer tick as well as on change; run until stopped.
    Periodic,
    /// Advertise only on change; exit once the pending count drains.
    Quiescent,
}

/// What a sender does when a neighbor's mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for room.
    Block,
    /// Drop the new advertisement; a later snapshot supersedes it anyway.
    DropNewest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub discipline: Discipline,
    pub update_interval_ms: u64,
    pub mailbox_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            discipline: Discipline::Quiescent,
            update_interval_ms: 1000,
            mailbox_capacity: 1024,
            overflow: OverflowPolicy::Block,
        }
    }
}

impl SimulationConfig {
    pub fn periodic(update_interval: Duration) -> Self {
        Self {
            discipline: Discipline::Periodic,
            update_interval_ms: u64::try_from(update_interval.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
