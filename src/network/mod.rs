pub mod topology;

pub use topology::{EdgeSpec, Link, Topology, TopologyDescription};
