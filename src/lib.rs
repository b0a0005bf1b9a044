pub mod algorithms;
pub mod config;
pub mod control_server;
pub mod error;
pub mod network;
pub mod printer;
pub mod protocol;
pub mod simulation;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use error::{ControllerError, Error, RoutingError, TopologyError};
pub use network::{Topology, TopologyDescription};
pub use simulation::{RouteDump, RouteRow, Simulation};

/// Link and route cost.
pub type Cost = u64;

/// Identity of a router in the simulated network.
///
/// Matrix topologies number their nodes `0..N-1`; explicit topologies use
/// arbitrary names (typically IP addresses). Indices sort before names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Index(usize),
    Name(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Index(i) => write!(f, "{}", i),
            NodeId::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId::Index(index)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        NodeId::Name(name.to_string())
    }
}

impl From<String> for NodeId {
    fn from(name: String) -> Self {
        NodeId::Name(name)
    }
}
