use dv_sim::config::{Discipline, OverflowPolicy, SimulationConfig};
use dv_sim::{NodeId, Simulation, TopologyDescription};
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(20);

fn demo() -> TopologyDescription {
    TopologyDescription::Matrix(vec![
        vec![0, 1, 3, 7],
        vec![1, 0, 1, 0],
        vec![3, 1, 0, 2],
        vec![7, 0, 2, 1],
    ])
}

fn triangle() -> TopologyDescription {
    TopologyDescription::Matrix(vec![vec![0, 1, 4], vec![1, 0, 1], vec![4, 1, 0]])
}

fn unit_grid(side: usize) -> TopologyDescription {
    let n = side * side;
    let mut matrix = vec![vec![0; n]; n];
    for row in 0..side {
        for col in 0..side {
            let i = row * side + col;
            if col + 1 < side {
                matrix[i][i + 1] = 1;
                matrix[i + 1][i] = 1;
            }
            if row + 1 < side {
                matrix[i][i + side] = 1;
                matrix[i + side][i] = 1;
            }
        }
    }
    TopologyDescription::Matrix(matrix)
}

fn config(discipline: Discipline, capacity: usize, overflow: OverflowPolicy) -> SimulationConfig {
    SimulationConfig {
        discipline,
        update_interval_ms: 20,
        mailbox_capacity: capacity,
        overflow,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_mailboxes_of_one_or_two_slots_still_converge() {
    for capacity in [1, 2] {
        for description in [triangle(), demo(), unit_grid(6)] {
            let mut simulation =
                Simulation::build(&description, config(Discipline::Quiescent, capacity, OverflowPolicy::Block))
                    .unwrap();
            simulation.start().unwrap();

            assert!(
                simulation.settle(SETTLE).await,
                "capacity {} left {} advertisements pending",
                capacity,
                simulation.tracker().len()
            );
            let mismatches = simulation.verify().await;
            assert!(mismatches.is_empty(), "capacity {}: {:?}", capacity, mismatches);
            simulation.stop().await.unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn periodic_workers_with_tiny_mailboxes_converge_under_both_policies() {
    for overflow in [OverflowPolicy::Block, OverflowPolicy::DropNewest] {
        for description in [demo(), unit_grid(4)] {
            let mut simulation =
                Simulation::build(&description, config(Discipline::Periodic, 1, overflow)).unwrap();
            simulation.start().unwrap();

            assert!(simulation.settle(SETTLE).await, "{:?} did not converge", overflow);
            simulation.stop().await.unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropped_advertisements_are_uncounted() {
    for description in [demo(), unit_grid(6)] {
        let mut simulation =
            Simulation::build(&description, config(Discipline::Quiescent, 1, OverflowPolicy::DropNewest)).unwrap();
        simulation.start().unwrap();

        // drops may leave routes stale, but the pending count must still drain
        assert!(simulation.settle(SETTLE).await);
        assert!(simulation.tracker().is_empty());
        assert_eq!(simulation.status().phase, "settled");
        simulation.stop().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cost_change_on_settled_single_slot_network() {
    let mut simulation =
        Simulation::build(&demo(), config(Discipline::Quiescent, 1, OverflowPolicy::Block)).unwrap();
    simulation.start().unwrap();
    assert!(simulation.settle(SETTLE).await);

    // nodes 0 and 1 share neighbor 2, whose single slot both fan-outs target
    tokio::time::timeout(
        Duration::from_secs(5),
        simulation.inject_link_cost_change(&NodeId::Index(0), &NodeId::Index(1), 6),
    )
    .await
    .expect("cost change blocked the controller")
    .unwrap();
    assert!(simulation.settle(SETTLE).await);

    let dump = simulation.dump_route_tables().await;
    let route = dump.route(&NodeId::Index(0), &NodeId::Index(1)).unwrap();
    assert_eq!(route.cost, 4);
    assert_eq!(route.next_hop, NodeId::Index(2));
    assert!(simulation.verify().await.is_empty());

    simulation.stop().await.unwrap();
}

#[tokio::test]
async fn raw_delivery_on_settled_single_slot_network() {
    let mut simulation =
        Simulation::build(&triangle(), config(Discipline::Quiescent, 1, OverflowPolicy::Block)).unwrap();
    simulation.start().unwrap();
    assert!(simulation.settle(SETTLE).await);
    let before = simulation.dump_route_tables().await;

    let line = "UPDATE:{\"sender\":1,\"routes\":[[0,1],[1,0],[2,1]]}\n";
    for _ in 0..4 {
        tokio::time::timeout(Duration::from_secs(5), simulation.deliver_raw(&NodeId::Index(0), line))
            .await
            .expect("delivery blocked the controller")
            .unwrap();
    }
    assert!(simulation.settle(SETTLE).await);

    assert_eq!(simulation.dump_route_tables().await, before);
    simulation.stop().await.unwrap();
}
