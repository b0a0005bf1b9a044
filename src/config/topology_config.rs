use crate::Cost;
use crate::network::{EdgeSpec, TopologyDescription};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Topology file contents: either a cost matrix or named routers plus edges.
///
/// ```json
/// {"ips": ["10.0.0.1", "10.0.0.2"], "routes": [["10.0.0.1", "10.0.0.2"]]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopologyConfig {
    Matrix {
        matrix: Vec<Vec<Cost>>,
    },
    Explicit {
        ips: Vec<String>,
        routes: Vec<RouteConfig>,
    },
}

/// One undirected edge; the cost defaults to a single hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteConfig {
    Pair(String, String),
    Weighted(String, String, Cost),
}

impl TopologyConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TopologyConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_description(&self) -> TopologyDescription {
        match self {
            TopologyConfig::Matrix { matrix } => TopologyDescription::Matrix(matrix.clone()),
            TopologyConfig::Explicit { ips, routes } => TopologyDescription::Explicit {
                nodes: ips.clone(),
                edges: routes
                    .iter()
                    .map(|route| match route {
                        RouteConfig::Pair(a, b) => EdgeSpec::new(a.as_str(), b.as_str(), 1),
                        RouteConfig::Weighted(a, b, cost) => EdgeSpec::new(a.as_str(), b.as_str(), *cost),
                    })
                    .collect(),
            },
        }
    }
}
