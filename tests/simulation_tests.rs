use rand::SeedableRng;
use rand::rngs::StdRng;

use lora_mesh_simulator::common::config::SimulationConfig;
use lora_mesh_simulator::simulation::driver::{RunOutcome, run_until_terminal};
use lora_mesh_simulator::simulation::phy::time_on_air;
use lora_mesh_simulator::simulation::signal_calculations::received_power;
use lora_mesh_simulator::simulation::topology::uplink_neighbor;
use lora_mesh_simulator::simulation::types::RadioEndpoint;
use lora_mesh_simulator::simulation::{EndpointId, JoinState, NetworkState, Point, build_network};

fn p(x: f64, y: f64) -> Point {
    Point { x, y }
}

fn random_network(seed: u64, node_count: usize) -> NetworkState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = build_network(node_count, 14, 868.0, SimulationConfig::default(), &mut rng).unwrap();
    state.form_mesh().unwrap();
    state
}

#[test]
fn line_of_nodes_forms_a_chain() {
    let positions = (1..=6).map(|i| p(8000.0 * i as f64, 0.0)).collect();
    let mut state = NetworkState::from_parts(SimulationConfig::default(), p(0.0, 0.0), positions).unwrap();
    let result = state.form_mesh().unwrap();

    assert_eq!(result.joined, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(result.depth, 6);
    let hops: Vec<u32> = state.nodes.iter().map(|n| n.hop_count).collect();
    assert_eq!(hops, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(state.compute_traffic(0).unwrap(), 5);
    assert_eq!(state.compute_traffic(5).unwrap(), 0);

    let lines = state.connection_lines();
    assert_eq!(lines.len(), 6);
    let last = lines.iter().find(|l| l.joins(EndpointId::Node(4), EndpointId::Node(5))).unwrap();
    let far_end = if last.a == EndpointId::Node(5) { last.from } else { last.to };
    assert_eq!(far_end, state.node_position(5).unwrap());
}

#[test]
fn sensitivity_threshold_decides_membership() {
    let config = SimulationConfig::default();
    let params = config.radio.path_loss_parameters();
    let reference = NetworkState::from_parts(config.clone(), p(0.0, 0.0), vec![p(1.0, 0.0)]).unwrap();
    let sensitivity = reference.gateway.beacon().unwrap().sensitivity_dbm;
    let target = sensitivity - 0.01;

    // Received power falls with distance; bisect for the target level.
    let (mut near, mut far) = (1.0, 50_000.0);
    for _ in 0..200 {
        let mid = (near + far) / 2.0;
        if received_power(14.0, mid, 868.0, &params).unwrap() > target {
            near = mid;
        } else {
            far = mid;
        }
    }
    let power = received_power(14.0, far, 868.0, &params).unwrap();
    assert!(power <= target && power > target - 1e-6);

    let mut state = NetworkState::from_parts(config.clone(), p(0.0, 0.0), vec![p(far, 0.0)]).unwrap();
    let result = state.form_mesh().unwrap();
    assert_eq!(result.out_of_range, vec![0]);
    assert_eq!(state.nodes[0].join_state, JoinState::OutOfRange);

    let mut louder = config;
    louder.radio.gateway_tx_power_dbm += 5;
    let mut state = NetworkState::from_parts(louder, p(0.0, 0.0), vec![p(far, 0.0)]).unwrap();
    let result = state.form_mesh().unwrap();
    assert_eq!(result.joined, vec![0]);
    assert_eq!(state.nodes[0].join_state, JoinState::Joined);
    assert_eq!(state.nodes[0].hop_count, 1);
}

#[test]
fn joined_nodes_form_a_tree_rooted_at_gateway() {
    for seed in [1, 7, 42] {
        let mut state = random_network(seed, 80);
        state.apply_rerouting(3).unwrap();

        let joined = state.routable_nodes();
        // A tree over joined nodes plus the gateway has exactly one edge per node.
        assert_eq!(state.render_lines.len(), joined.len());

        for node in state.nodes.iter().filter(|n| n.is_joined()) {
            let uplinks: Vec<EndpointId> = node
                .connections
                .iter()
                .map(|c| c.peer)
                .filter(|peer| state.endpoint(*peer).unwrap().hop_count() < node.hop_count)
                .collect();
            assert_eq!(uplinks.len(), 1, "node {} has {} uplinks", node.node_id, uplinks.len());
            let parent_hop = state.endpoint(uplinks[0]).unwrap().hop_count();
            assert_eq!(node.hop_count, parent_hop + 1);
            assert!(node.beacon.is_some());
        }

        for node in state.nodes.iter().filter(|n| !n.is_joined()) {
            assert_eq!(node.join_state, JoinState::OutOfRange);
            assert!(node.connections.is_empty());
            assert_eq!(node.hop_count, 0);
        }
    }
}

#[test]
fn traffic_is_stable_between_calls() {
    let state = random_network(3, 60);
    for node_id in state.routable_nodes() {
        let first = state.compute_traffic(node_id).unwrap();
        assert_eq!(state.compute_traffic(node_id).unwrap(), first);
    }
}

#[test]
fn rerouting_leaves_only_unresolvable_overflow() {
    let mut state = random_network(5, 120);
    let report = state.apply_rerouting(3).unwrap();
    let max_traffic = state.config.traffic.max_traffic;
    for node in &state.nodes {
        let traffic = state.compute_traffic(node.node_id).unwrap();
        if node.is_joined() && traffic > max_traffic {
            assert!(node.overflow);
            assert!(report.residual_overflow.contains(&node.node_id));
        } else {
            assert!(!node.overflow);
        }
    }
}

#[test]
fn uplink_descends_one_hop_at_a_time() {
    let mut state = random_network(9, 60);
    let max_hops = state.max_hop_count();
    for origin in state.routable_nodes() {
        let packet = state.new_packet(origin).unwrap();
        let report = state.send_packet(origin, packet).unwrap();
        assert!(report.hops <= max_hops);
        assert_eq!(report.hops, state.nodes[origin as usize].hop_count);
        assert_eq!(report.path.last(), Some(&EndpointId::Gateway));
        let hops: Vec<u32> = report.path.iter().map(|id| state.endpoint(*id).unwrap().hop_count()).collect();
        assert!(hops.windows(2).all(|w| w[1] < w[0]), "path {:?}", report.path);
    }
    assert_eq!(state.gateway.packets_received, state.routable_nodes().len() as u64);
}

#[test]
fn uplink_neighbor_is_the_parent() {
    let positions = vec![p(4000.0, 0.0), p(11000.0, 0.0)];
    let mut state = NetworkState::from_parts(SimulationConfig::default(), p(0.0, 0.0), positions).unwrap();
    state.form_mesh().unwrap();
    assert_eq!(uplink_neighbor(&state, 1).unwrap(), Some(EndpointId::Node(0)));
    assert_eq!(uplink_neighbor(&state, 0).unwrap(), Some(EndpointId::Gateway));
}

#[test]
fn time_on_air_grows_with_payload() {
    let mut radio = SimulationConfig::default().radio;
    for sf in 7..=12 {
        radio.spreading_factor = sf;
        let lora = radio.lora_parameters();
        assert!(time_on_air(&lora, 50) > time_on_air(&lora, 10), "SF{}", sf);
    }
}

#[test]
fn low_battery_stops_the_run() {
    let mut config = SimulationConfig::default();
    config.energy.battery_capacity = 1e-5;
    config.area.gateway_position = Some(p(10000.0, 10000.0));
    let mut rng = StdRng::seed_from_u64(21);
    let mut state = build_network(20, 14, 868.0, config, &mut rng).unwrap();
    state.form_mesh().unwrap();
    assert!(!state.routable_nodes().is_empty());

    let summary = run_until_terminal(&mut state, &mut rng, 10_000).unwrap();
    let RunOutcome::BatteryDepleted { node_id } = summary.outcome else {
        panic!("unexpected outcome {:?}", summary.outcome);
    };
    let node = state.node(node_id).unwrap();
    assert!(node.battery <= 0.0);
    // Overshoot stays within a single packet's cost.
    assert!(node.battery > -1e-5);
    assert!(summary.iterations < 10_000);
}

#[test]
fn reset_allows_reforming_from_scratch() {
    let mut state = random_network(11, 40);
    let first = state.form_mesh().unwrap();
    let packet_origin = state.routable_nodes()[0];
    let packet = state.new_packet(packet_origin).unwrap();
    state.send_packet(packet_origin, packet).unwrap();

    state.reset_formation(true);
    assert!(state.render_lines.is_empty());
    assert_eq!(state.gateway.packets_received, 0);
    assert!(state.nodes.iter().all(|n| n.battery == state.config.energy.battery_capacity));

    let second = state.form_mesh().unwrap();
    assert_eq!(first, second);
}
