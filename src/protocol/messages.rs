use crate::error::RoutingError;
use crate::{Cost, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const UPDATE_PREFIX: &str = "UPDATE:";

/// Snapshot of a sender's route table: destination to cost only.
///
/// The table is shared between every copy fanned out to the neighbors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub from: NodeId,
    pub table: Arc<BTreeMap<NodeId, Cost>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireAdvertisement {
    sender: NodeId,
    routes: Vec<(NodeId, Cost)>,
}

impl Advertisement {
    pub fn new(from: NodeId, table: BTreeMap<NodeId, Cost>) -> Self {
        Self {
            from,
            table: Arc::new(table),
        }
    }

    /// Text line form: `UPDATE:{"sender":..,"routes":[[dst,cost],..]}` plus newline.
    pub fn encode(&self) -> Result<String, RoutingError> {
        let wire = WireAdvertisement {
            sender: self.from.clone(),
            routes: self
                .table
                .iter()
                .map(|(destination, cost)| (destination.clone(), *cost))
                .collect(),
        };
        let body = serde_json::to_string(&wire)
            .map_err(|e| RoutingError::MalformedAdvertisement(e.to_string()))?;
        Ok(format!("{}{}\n", UPDATE_PREFIX, body))
    }

    pub fn decode(line: &str) -> Result<Self, RoutingError> {
        let body = line
            .trim_end_matches(['\r', '\n'])
            .strip_prefix(UPDATE_PREFIX)
            .ok_or_else(|| RoutingError::MalformedAdvertisement("missing UPDATE: prefix".to_string()))?;

        let wire: WireAdvertisement = serde_json::from_str(body)
            .map_err(|e| RoutingError::MalformedAdvertisement(e.to_string()))?;

        let mut table = BTreeMap::new();
        for (destination, cost) in wire.routes {
            if table.insert(destination.clone(), cost).is_some() {
                return Err(RoutingError::MalformedAdvertisement(format!(
                    "destination {} listed twice",
                    destination
                )));
            }
        }

        Ok(Self::new(wire.sender, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_line_is_self_delimited() {
        let mut table = BTreeMap::new();
        table.insert(NodeId::Index(0), 0);
        table.insert(NodeId::Index(2), 3);
        let line = Advertisement::new(NodeId::Index(0), table).encode().unwrap();

        assert!(line.starts_with("UPDATE:"));
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(line, "UPDATE:{\"sender\":0,\"routes\":[[0,0],[2,3]]}\n");
    }

    #[test]
    fn decode_accepts_named_nodes() {
        let adv = Advertisement::decode(
            "UPDATE:{\"sender\":\"10.0.0.1\",\"routes\":[[\"10.0.0.1\",0],[\"10.0.0.3\",2]]}",
        )
        .unwrap();

        assert_eq!(adv.from, NodeId::from("10.0.0.1"));
        assert_eq!(adv.table.get(&NodeId::from("10.0.0.3")), Some(&2));
    }

    #[test]
    fn decode_rejects_garbage() {
        for line in [
            "",
            "HELLO:{}",
            "UPDATE:not json",
            "UPDATE:{\"sender\":1}",
            "UPDATE:{\"sender\":1,\"routes\":[[2,-1]]}",
            "UPDATE:{\"sender\":1,\"routes\":[[2,1],[2,4]]}",
        ] {
            assert!(
                matches!(Advertisement::decode(line), Err(RoutingError::MalformedAdvertisement(_))),
                "accepted {:?}",
                line
            );
        }
    }
}
