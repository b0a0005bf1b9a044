//! Error types for topology building, advertisement handling and the
//! simulation controller.

use crate::{Cost, NodeId};
use thiserror::Error;

/// Reasons a topology description is rejected before any node is built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("row {row} has {len} entries, expected {expected}")]
    RowLength { row: usize, len: usize, expected: usize },
    #[error("table[{i}][{j}] = {forward} but table[{j}][{i}] = {backward}")]
    Asymmetric {
        i: usize,
        j: usize,
        forward: Cost,
        backward: Cost,
    },
    #[error("node {0} is declared twice")]
    DuplicateNode(String),
    #[error("edge {a} - {b} references unknown node {unknown}")]
    UnknownNode { a: String, b: String, unknown: String },
    #[error("edge {0} - {1} is declared twice")]
    DuplicateEdge(String, String),
    #[error("edge {0} - {0} links a node to itself")]
    SelfLoop(String),
    #[error("edge {0} - {1} has zero cost")]
    ZeroCost(String, String),
}

/// Per-advertisement failures. Always handled locally by the receiving node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("node {node} got an advertisement from non-neighbor {from}")]
    UnknownNeighbor { node: NodeId, from: NodeId },
    #[error("malformed advertisement: {0}")]
    MalformedAdvertisement(String),
}

/// Precondition violations on the simulation controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("simulation was already started")]
    DoubleStart,
    #[error("simulation was stopped before it was started")]
    StopBeforeStart,
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("no link between {0} and {1}")]
    NoSuchLink(NodeId, NodeId),
    #[error("invalid link cost {0}, costs must be positive")]
    InvalidCost(Cost),
}

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed topology: {0}")]
    MalformedTopology(#[from] TopologyError),
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
