use dv_sim::config::{Discipline, SimulationConfig};
use dv_sim::network::EdgeSpec;
use dv_sim::{NodeId, Simulation, TopologyDescription};
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(10);

fn demo() -> TopologyDescription {
    TopologyDescription::Matrix(vec![
        vec![0, 1, 3, 7],
        vec![1, 0, 1, 0],
        vec![3, 1, 0, 2],
        vec![7, 0, 2, 1],
    ])
}

fn ring(n: usize) -> TopologyDescription {
    let mut matrix = vec![vec![0; n]; n];
    for i in 0..n {
        let j = (i + 1) % n;
        let cost = (i % 3 + 1) as u64;
        matrix[i][j] = cost;
        matrix[j][i] = cost;
    }
    TopologyDescription::Matrix(matrix)
}

fn grid(side: usize) -> TopologyDescription {
    let n = side * side;
    let mut matrix = vec![vec![0; n]; n];
    for row in 0..side {
        for col in 0..side {
            let i = row * side + col;
            if col + 1 < side {
                let cost = ((i * 7) % 5 + 1) as u64;
                matrix[i][i + 1] = cost;
                matrix[i + 1][i] = cost;
            }
            if row + 1 < side {
                let cost = ((i * 3) % 4 + 1) as u64;
                matrix[i][i + side] = cost;
                matrix[i + side][i] = cost;
            }
        }
    }
    TopologyDescription::Matrix(matrix)
}

fn named() -> TopologyDescription {
    TopologyDescription::Explicit {
        nodes: vec![
            "10.0.0.1".to_string(),
            "10.0.0.2".to_string(),
            "10.0.0.3".to_string(),
            "10.0.0.4".to_string(),
            "10.0.0.5".to_string(),
        ],
        edges: vec![
            EdgeSpec::new("10.0.0.1", "10.0.0.2", 1),
            EdgeSpec::new("10.0.0.2", "10.0.0.3", 1),
            EdgeSpec::new("10.0.0.3", "10.0.0.4", 1),
            EdgeSpec::new("10.0.0.4", "10.0.0.5", 1),
            EdgeSpec::new("10.0.0.1", "10.0.0.5", 10),
        ],
    }
}

fn periodic() -> SimulationConfig {
    SimulationConfig::periodic(Duration::from_millis(20))
}

async fn converge(description: TopologyDescription, config: SimulationConfig) -> Simulation {
    let mut simulation = Simulation::build(&description, config).unwrap();
    simulation.start().unwrap();
    assert!(simulation.settle(SETTLE).await, "network did not settle");
    simulation
}

#[tokio::test]
async fn quiescent_matches_reference_on_demo() {
    let mut simulation = converge(demo(), SimulationConfig::default()).await;

    assert!(simulation.verify().await.is_empty());
    assert!(simulation.tracker().is_empty());

    let dump = simulation.dump_route_tables().await;
    let route = dump.route(&NodeId::Index(0), &NodeId::Index(3)).unwrap();
    assert_eq!(route.cost, 4);
    assert_eq!(route.next_hop, NodeId::Index(1));
    assert_eq!(dump.rows.len(), 16);

    simulation.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quiescent_matches_reference_on_larger_graphs() {
    for description in [ring(9), grid(4), named()] {
        let mut simulation = converge(description, SimulationConfig::default()).await;
        let mismatches = simulation.verify().await;
        assert!(mismatches.is_empty(), "mismatches: {:?}", mismatches);
        simulation.stop().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn periodic_matches_reference() {
    for description in [demo(), ring(7), grid(3), named()] {
        let mut simulation = converge(description, periodic()).await;
        assert!(simulation.verify().await.is_empty());
        simulation.stop().await.unwrap();
    }
}

#[tokio::test]
async fn named_topology_routes_around_expensive_link() {
    let mut simulation = converge(named(), SimulationConfig::default()).await;

    let dump = simulation.dump_route_tables().await;
    let route = dump.route(&NodeId::from("10.0.0.1"), &NodeId::from("10.0.0.5")).unwrap();
    assert_eq!(route.cost, 4);
    assert_eq!(route.next_hop, NodeId::from("10.0.0.2"));

    simulation.stop().await.unwrap();
}

#[tokio::test]
async fn raising_a_cost_reroutes_through_cheaper_path() {
    for config in [SimulationConfig::default(), periodic()] {
        let mut simulation = converge(demo(), config).await;

        simulation
            .inject_link_cost_change(&NodeId::Index(0), &NodeId::Index(1), 6)
            .await
            .unwrap();
        assert!(simulation.settle(SETTLE).await);

        let dump = simulation.dump_route_tables().await;
        let route = dump.route(&NodeId::Index(0), &NodeId::Index(1)).unwrap();
        assert_eq!(route.cost, 4);
        assert_eq!(route.next_hop, NodeId::Index(2));
        assert!(simulation.verify().await.is_empty());

        simulation.stop().await.unwrap();
    }
}

#[tokio::test]
async fn lowering_a_cost_shortens_routes() {
    let mut simulation = converge(demo(), periodic()).await;

    simulation
        .inject_link_cost_change(&NodeId::Index(0), &NodeId::Index(3), 1)
        .await
        .unwrap();
    assert!(simulation.settle(SETTLE).await);

    let dump = simulation.dump_route_tables().await;
    let route = dump.route(&NodeId::Index(1), &NodeId::Index(3)).unwrap();
    assert_eq!(route.cost, 2);
    assert_eq!(route.next_hop, NodeId::Index(0));

    simulation.stop().await.unwrap();
}

#[tokio::test]
async fn link_costs_stay_symmetric_after_change() {
    let mut simulation = converge(demo(), SimulationConfig::default()).await;

    simulation
        .inject_link_cost_change(&NodeId::Index(2), &NodeId::Index(3), 9)
        .await
        .unwrap();

    for link in simulation.links().await {
        assert_eq!(link.cost_ab, link.cost_ba, "link {} - {}", link.a, link.b);
    }
    assert_eq!(simulation.link_cost(&NodeId::Index(3), &NodeId::Index(2)).await, Some(9));

    assert!(simulation.settle(SETTLE).await);
    simulation.stop().await.unwrap();
}

#[tokio::test]
async fn status_reports_phase_and_pending() {
    let mut simulation = Simulation::build(&demo(), SimulationConfig::default()).unwrap();
    assert_eq!(simulation.status().phase, "idle");
    assert_eq!(simulation.status().discipline, Discipline::Quiescent);

    simulation.start().unwrap();
    assert!(simulation.settle(SETTLE).await);
    let status = simulation.status();
    assert_eq!(status.phase, "settled");
    assert_eq!(status.nodes, 4);
    assert_eq!(status.links, 5);
    assert_eq!(status.pending, 0);

    simulation.stop().await.unwrap();
    assert_eq!(simulation.status().phase, "stopped");
}
