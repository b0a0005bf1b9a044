//! Line-oriented JSON control interface for a running simulation.
//!
//! Each request is one JSON object per line, `{"command": "...", "args": ...}`,
//! answered by one [`ControlResponse`] line.

use crate::simulation::Simulation;
use crate::{Cost, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const DEFAULT_SETTLE_MS: u64 = 5000;

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl ControlResponse {
    fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    fn with_data<T: Serialize>(message: impl Into<String>, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::ok(message, Some(value)),
            Err(e) => Self::failure(format!("Failed to serialize response: {}", e)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: String,
    pub args: Option<Value>,
}

pub type SharedSimulation = Arc<Mutex<Simulation>>;

pub struct ControlServer {
    listener: TcpListener,
    simulation: SharedSimulation,
}

impl ControlServer {
    /// Binds the listener; port 0 picks a free port, see [`ControlServer::local_addr`].
    pub async fn bind(addr: &str, simulation: SharedSimulation) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, simulation })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts clients until the task is dropped.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Control server listening on {}", addr),
            Err(e) => warn!("Control server listening on unknown address: {}", e),
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Control connection from {}", addr);
                    let simulation = self.simulation.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, simulation).await {
                            error!("Error handling control client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(mut stream: TcpStream, simulation: SharedSimulation) -> anyhow::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            if buf_reader.read_line(&mut line).await? == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ControlCommand>(trimmed) {
                Ok(command) => Self::process_command(command, &simulation).await,
                Err(e) => ControlResponse::failure(format!("Invalid JSON command: {}", e)),
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(format!("{}\n", response_json).as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    pub async fn process_command(command: ControlCommand, simulation: &SharedSimulation) -> ControlResponse {
        let args = command.args.unwrap_or(Value::Null);
        match command.command.as_str() {
            "status" => Self::get_status(simulation).await,
            "routes" => Self::get_routes(simulation).await,
            "links" => Self::get_links(simulation).await,
            "neighbors" => Self::get_neighbors(&args, simulation).await,
            "update_cost" => Self::update_cost(&args, simulation).await,
            "advertise" => Self::advertise(&args, simulation).await,
            "settle" => Self::settle(&args, simulation).await,
            "verify" => Self::verify(simulation).await,
            "stop" => Self::stop(simulation).await,
            "help" => Self::get_help(),
            _ => ControlResponse::failure(format!("Unknown command: {}", command.command)),
        }
    }

    async fn get_status(simulation: &SharedSimulation) -> ControlResponse {
        let status = simulation.lock().await.status();
        ControlResponse::with_data("Status retrieved", &status)
    }

    async fn get_routes(simulation: &SharedSimulation) -> ControlResponse {
        let dump = simulation.lock().await.dump_route_tables().await;
        ControlResponse::with_data(format!("Retrieved {} routes", dump.rows.len()), &dump.rows)
    }

    async fn get_links(simulation: &SharedSimulation) -> ControlResponse {
        let links = simulation.lock().await.links().await;
        ControlResponse::with_data(format!("Retrieved {} links", links.len()), &links)
    }

    async fn get_neighbors(args: &Value, simulation: &SharedSimulation) -> ControlResponse {
        let sim = simulation.lock().await;
        let node = match node_arg(&sim, args, "node") {
            Ok(node) => node,
            Err(response) => return response,
        };

        match sim.neighbors(&node).await {
            Ok(neighbors) => {
                ControlResponse::with_data(format!("Found {} neighbors for node {}", neighbors.len(), node), &neighbors)
            }
            Err(e) => ControlResponse::failure(e.to_string()),
        }
    }

    async fn update_cost(args: &Value, simulation: &SharedSimulation) -> ControlResponse {
        let mut sim = simulation.lock().await;
        let (a, b) = match (node_arg(&sim, args, "a"), node_arg(&sim, args, "b")) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(response), _) | (_, Err(response)) => return response,
        };
        let Some(cost) = args.get("cost").and_then(Value::as_u64) else {
            return ControlResponse::failure("cost parameter required");
        };

        match sim.inject_link_cost_change(&a, &b, cost as Cost).await {
            Ok(()) => ControlResponse::ok(format!("Link {} - {} now costs {}", a, b, cost), None),
            Err(e) => ControlResponse::failure(format!("Failed to update link cost: {}", e)),
        }
    }

    async fn advertise(args: &Value, simulation: &SharedSimulation) -> ControlResponse {
        let mut sim = simulation.lock().await;
        let to = match node_arg(&sim, args, "to") {
            Ok(to) => to,
            Err(response) => return response,
        };
        let Some(payload) = args.get("payload").and_then(Value::as_str) else {
            return ControlResponse::failure("payload parameter required");
        };

        match sim.deliver_raw(&to, payload).await {
            Ok(()) => ControlResponse::ok(format!("Advertisement queued for node {}", to), None),
            Err(e) => ControlResponse::failure(format!("Advertisement rejected: {}", e)),
        }
    }

    async fn settle(args: &Value, simulation: &SharedSimulation) -> ControlResponse {
        let limit = args
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_SETTLE_MS);

        let settled = simulation.lock().await.settle(Duration::from_millis(limit)).await;
        if settled {
            ControlResponse::ok("Simulation settled", None)
        } else {
            ControlResponse::failure(format!("Simulation did not settle within {} ms", limit))
        }
    }

    async fn verify(simulation: &SharedSimulation) -> ControlResponse {
        let mismatches = simulation.lock().await.verify().await;
        if mismatches.is_empty() {
            ControlResponse::ok("All routes match shortest paths", None)
        } else {
            let mut response = ControlResponse::with_data(format!("{} routes differ", mismatches.len()), &mismatches);
            response.success = false;
            response
        }
    }

    async fn stop(simulation: &SharedSimulation) -> ControlResponse {
        match simulation.lock().await.stop().await {
            Ok(()) => ControlResponse::ok("Simulation stopped", None),
            Err(e) => ControlResponse::failure(format!("Failed to stop simulation: {}", e)),
        }
    }

    fn get_help() -> ControlResponse {
        let commands = vec![
            ("status", "Get simulation status"),
            ("routes", "Get every node's route table"),
            ("links", "Get link costs as seen from both endpoints"),
            ("neighbors", "Get neighbors of a node (requires node)"),
            ("update_cost", "Change a link cost (requires a, b, cost)"),
            ("advertise", "Deliver a raw UPDATE line to a node (requires to, payload)"),
            ("settle", "Wait for the network to stabilize (optional timeout_ms)"),
            ("verify", "Compare route tables against shortest paths"),
            ("stop", "Stop every node worker"),
            ("help", "Show this help message"),
        ];
        ControlResponse::with_data("Available commands", &commands)
    }
}

/// Reads a node argument given either as a JSON number or string. A bare
/// value is accepted when the command takes a single node.
fn node_arg(sim: &Simulation, args: &Value, key: &str) -> Result<NodeId, ControlResponse> {
    let raw = match args.get(key).unwrap_or(args) {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(ControlResponse::failure(format!("{} parameter required", key))),
    };
    sim.resolve(&raw).map_err(|e| ControlResponse::failure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::network::TopologyDescription;
    use serde_json::json;

    fn shared() -> SharedSimulation {
        let description = TopologyDescription::Matrix(vec![vec![0, 1, 0], vec![1, 0, 2], vec![0, 2, 0]]);
        let simulation = Simulation::build(&description, SimulationConfig::default()).unwrap();
        Arc::new(Mutex::new(simulation))
    }

    async fn run(simulation: &SharedSimulation, command: &str, args: Option<Value>) -> ControlResponse {
        let command = ControlCommand {
            command: command.to_string(),
            args,
        };
        ControlServer::process_command(command, simulation).await
    }

    #[tokio::test]
    async fn unknown_command_fails() {
        let response = run(&shared(), "reboot", None).await;
        assert!(!response.success);
        assert!(response.message.contains("reboot"));
    }

    #[tokio::test]
    async fn neighbors_accepts_bare_and_keyed_node() {
        let simulation = shared();

        let bare = run(&simulation, "neighbors", Some(json!(1))).await;
        assert!(bare.success);
        assert_eq!(bare.data.unwrap().as_array().unwrap().len(), 2);

        let keyed = run(&simulation, "neighbors", Some(json!({"node": "0"}))).await;
        assert!(keyed.success);
        assert_eq!(keyed.data.unwrap().as_array().unwrap().len(), 1);

        let missing = run(&simulation, "neighbors", Some(json!({"node": 9}))).await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn update_cost_rejects_missing_link() {
        let simulation = shared();
        let response = run(&simulation, "update_cost", Some(json!({"a": 0, "b": 2, "cost": 3}))).await;
        assert!(!response.success);

        let response = run(&simulation, "update_cost", Some(json!({"a": 0, "b": 1}))).await;
        assert!(!response.success);
        assert!(response.message.contains("cost"));
    }

    #[tokio::test]
    async fn stop_before_start_is_reported() {
        let response = run(&shared(), "stop", None).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let response = run(&shared(), "help", None).await;
        assert!(response.success);
        assert_eq!(response.data.unwrap().as_array().unwrap().len(), 10);
    }
}
