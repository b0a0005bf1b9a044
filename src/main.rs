use anyhow::{Context, Result};
use clap::Parser;
use dv_sim::config::{Discipline, SimulationConfig, TopologyConfig};
use dv_sim::control_server::ControlServer;
use dv_sim::printer::format_links;
use dv_sim::{Cost, Simulation, TopologyDescription};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dv-sim", about = "Distance-vector routing simulation")]
struct Cli {
    /// Topology file: {"matrix": [[...]]} or {"ips": [...], "routes": [...]}
    #[arg(long)]
    topology: Option<String>,

    /// Simulation config file (JSON)
    #[arg(long)]
    config: Option<String>,

    #[arg(long, value_enum)]
    discipline: Option<Discipline>,

    /// Periodic update interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Link cost change to apply after convergence, as a,b,cost
    #[arg(long = "change", value_parser = parse_change)]
    changes: Vec<(String, String, Cost)>,

    #[arg(long, default_value_t = 0)]
    change_after_ms: u64,

    /// How long to wait for the network to settle
    #[arg(long, default_value_t = 5000)]
    settle_ms: u64,

    /// Serve the JSON control interface on this port until Ctrl+C
    #[arg(long)]
    control_port: Option<u16>,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_change(raw: &str) -> Result<(String, String, Cost), String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [a, b, cost] = parts.as_slice() else {
        return Err(format!("expected a,b,cost but got '{}'", raw));
    };
    let cost = cost
        .parse::<Cost>()
        .map_err(|e| format!("invalid cost '{}': {}", cost, e))?;
    Ok((a.to_string(), b.to_string(), cost))
}

fn demo_topology() -> TopologyDescription {
    TopologyDescription::Matrix(vec![
        vec![0, 1, 3, 7],
        vec![1, 0, 1, 0],
        vec![3, 1, 0, 2],
        vec![7, 0, 2, 1],
    ])
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let max_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::fmt().with_max_level(max_level).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path).with_context(|| format!("loading config {}", path))?,
        None => SimulationConfig::default(),
    };
    if let Some(discipline) = cli.discipline {
        config.discipline = discipline;
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.update_interval_ms = interval_ms;
    }

    let description = match &cli.topology {
        Some(path) => TopologyConfig::load(path)
            .with_context(|| format!("loading topology {}", path))?
            .to_description(),
        None => demo_topology(),
    };

    let rt = Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(cli, config, description))
}

async fn run(cli: Cli, config: SimulationConfig, description: TopologyDescription) -> Result<()> {
    let settle_limit = Duration::from_millis(cli.settle_ms);
    let mut simulation = Simulation::build(&description, config)?;

    println!("=== Links ===");
    print!("{}", format_links(&simulation.links().await));
    println!("\n=== Initial routing tables ===");
    print!("{}", simulation.dump_route_tables().await);

    simulation.start()?;
    if !simulation.settle(settle_limit).await {
        warn!("Network did not settle within {:?}", settle_limit);
    }
    println!("\n=== Converged routing tables ===");
    print!("{}", simulation.dump_route_tables().await);

    if !cli.changes.is_empty() {
        tokio::time::sleep(Duration::from_millis(cli.change_after_ms)).await;
        for (a, b, cost) in &cli.changes {
            let a = simulation.resolve(a)?;
            let b = simulation.resolve(b)?;
            simulation.inject_link_cost_change(&a, &b, *cost).await?;
        }
        if !simulation.settle(settle_limit).await {
            warn!("Network did not settle after link changes within {:?}", settle_limit);
        }
        println!("\n=== Routing tables after link changes ===");
        print!("{}", simulation.dump_route_tables().await);
    }

    let mismatches = simulation.verify().await;
    if mismatches.is_empty() {
        info!("All routes match shortest paths");
    } else {
        for mismatch in &mismatches {
            warn!(
                "Node {} -> {}: expected {:?}, have {:?}",
                mismatch.node, mismatch.destination, mismatch.expected_cost, mismatch.actual
            );
        }
    }

    match cli.control_port {
        Some(port) => serve(simulation, port).await,
        None => {
            simulation.stop().await?;
            Ok(())
        }
    }
}

async fn serve(simulation: Simulation, port: u16) -> Result<()> {
    let simulation = Arc::new(Mutex::new(simulation));
    let server = ControlServer::bind(&format!("127.0.0.1:{}", port), simulation.clone()).await?;
    let server_task = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down control server");
    server_task.abort();

    simulation.lock().await.stop().await?;
    Ok(())
}
