use crate::algorithms::dijkstra::Adjacency;
use crate::error::TopologyError;
use crate::protocol::Node;
use crate::{Cost, NodeId};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Input description of a network, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyDescription {
    /// Square symmetric cost matrix; zero means "no link", the diagonal is ignored.
    Matrix(Vec<Vec<Cost>>),
    /// Named nodes plus undirected edges.
    Explicit {
        nodes: Vec<String>,
        edges: Vec<EdgeSpec>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSpec {
    pub a: String,
    pub b: String,
    pub cost: Cost,
}

impl EdgeSpec {
    pub fn new(a: impl Into<String>, b: impl Into<String>, cost: Cost) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            cost,
        }
    }
}

/// Undirected link. `a` is always the smaller endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub a: NodeId,
    pub b: NodeId,
    pub cost: Cost,
}

impl Link {
    fn new(x: NodeId, y: NodeId, cost: Cost) -> Self {
        if x <= y {
            Self { a: x, b: y, cost }
        } else {
            Self { a: y, b: x, cost }
        }
    }
}

/// A validated topology. Construction never yields a partially valid network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<NodeId>,
    links: Vec<Link>,
}

impl Topology {
    pub fn build(description: &TopologyDescription) -> Result<Self, TopologyError> {
        match description {
            TopologyDescription::Matrix(table) => Self::from_matrix(table),
            TopologyDescription::Explicit { nodes, edges } => Self::from_edges(nodes, edges),
        }
    }

    fn from_matrix(table: &[Vec<Cost>]) -> Result<Self, TopologyError> {
        let rows = table.len();

        for (row, entries) in table.iter().enumerate() {
            if entries.len() != rows {
                return Err(TopologyError::RowLength {
                    row,
                    len: entries.len(),
                    expected: rows,
                });
            }
        }

        let mut links = Vec::new();
        for i in 0..rows {
            if table[i][i] != 0 {
                warn!("Ignoring self-link cost {} on node {}", table[i][i], i);
            }
            for j in (i + 1)..rows {
                if table[i][j] != table[j][i] {
                    return Err(TopologyError::Asymmetric {
                        i,
                        j,
                        forward: table[i][j],
                        backward: table[j][i],
                    });
                }
                if table[i][j] != 0 {
                    links.push(Link::new(NodeId::Index(i), NodeId::Index(j), table[i][j]));
                }
            }
        }

        debug!("Built matrix topology: {} nodes, {} links", rows, links.len());
        Ok(Self {
            nodes: (0..rows).map(NodeId::Index).collect(),
            links,
        })
    }

    fn from_edges(nodes: &[String], edges: &[EdgeSpec]) -> Result<Self, TopologyError> {
        let mut known = BTreeSet::new();
        for name in nodes {
            if !known.insert(name.as_str()) {
                return Err(TopologyError::DuplicateNode(name.clone()));
            }
        }

        let mut seen = BTreeSet::new();
        let mut links = Vec::with_capacity(edges.len());
        for edge in edges {
            for endpoint in [&edge.a, &edge.b] {
                if !known.contains(endpoint.as_str()) {
                    return Err(TopologyError::UnknownNode {
                        a: edge.a.clone(),
                        b: edge.b.clone(),
                        unknown: endpoint.clone(),
                    });
                }
            }
            if edge.a == edge.b {
                return Err(TopologyError::SelfLoop(edge.a.clone()));
            }
            if edge.cost == 0 {
                return Err(TopologyError::ZeroCost(edge.a.clone(), edge.b.clone()));
            }

            let link = Link::new(NodeId::from(edge.a.as_str()), NodeId::from(edge.b.as_str()), edge.cost);
            if !seen.insert((link.a.clone(), link.b.clone())) {
                return Err(TopologyError::DuplicateEdge(edge.a.clone(), edge.b.clone()));
            }
            links.push(link);
        }

        debug!("Built explicit topology: {} nodes, {} links", nodes.len(), links.len());
        Ok(Self {
            nodes: nodes.iter().map(|name| NodeId::from(name.as_str())).collect(),
            links,
        })
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Neighbor-cost table of every node, symmetric by construction.
    pub fn adjacency(&self) -> Adjacency {
        let mut adjacency: Adjacency = self
            .nodes
            .iter()
            .map(|id| (id.clone(), BTreeMap::new()))
            .collect();

        for link in &self.links {
            if let Some(neighbors) = adjacency.get_mut(&link.a) {
                neighbors.insert(link.b.clone(), link.cost);
            }
            if let Some(neighbors) = adjacency.get_mut(&link.b) {
                neighbors.insert(link.a.clone(), link.cost);
            }
        }

        adjacency
    }

    /// Creates one routing node per topology node with its links registered.
    pub fn build_nodes(&self) -> Vec<Node> {
        self.adjacency()
            .into_iter()
            .map(|(id, neighbors)| {
                let mut node = Node::new(id);
                for (neighbor, cost) in neighbors {
                    node.add_neighbor(neighbor, cost);
                }
                node
            })
            .collect()
    }
}
