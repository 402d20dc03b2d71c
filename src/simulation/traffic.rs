//! Subtree traffic, overflow marking and greedy rerouting.
//!
//! `traffic(node)` counts the nodes that route through `node`: every linked
//! node strictly farther from the gateway counts once, plus its own traffic
//! when it has further links. Recursion only descends to strictly higher hop
//! counts and carries a visited set, so it terminates on any graph.
//!
//! Rerouting is a local single-pass heuristic. For every node whose parent is
//! overflowed it looks for another parent closer to the gateway whose traffic
//! does not exceed the node's own (`<=`, equal traffic qualifies) and takes
//! the strongest such candidate. Running several passes lets relief propagate
//! up the tree. Overflow that no candidate can absorb is reported as residual.

use serde::Serialize;
use std::collections::HashSet;

use super::error::SimulationError;
use super::network::NetworkState;
use super::topology::{children, link, unlink, uplink_neighbor};
use super::types::{EndpointId, RadioEndpoint};

/// One re-parenting performed by the rerouting heuristic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerouteMove {
    pub node_id: u32,
    pub from: EndpointId,
    pub to: u32,
    pub rssi: f64,
    pub pass: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RerouteReport {
    pub moves: Vec<RerouteMove>,
    /// Nodes still above `max_traffic` after the last pass.
    pub residual_overflow: Vec<u32>,
}

/// Number of nodes routing through `node_id`.
pub fn traffic(state: &NetworkState, node_id: u32) -> Result<u32, SimulationError> {
    let mut visited = HashSet::new();
    visited.insert(node_id);
    traffic_inner(state, node_id, &mut visited)
}

fn traffic_inner(state: &NetworkState, node_id: u32, visited: &mut HashSet<u32>) -> Result<u32, SimulationError> {
    let mut total = 0;
    for child in children(state, node_id)? {
        if !visited.insert(child) {
            continue;
        }
        total += if state.node(child)?.connections.len() > 1 {
            1 + traffic_inner(state, child, visited)?
        } else {
            1
        };
    }
    Ok(total)
}

/// Recompute every node's overflow flag. Returns the overflowed node ids.
pub fn refresh_overflow(state: &mut NetworkState) -> Result<Vec<u32>, SimulationError> {
    let max_traffic = state.config.traffic.max_traffic;
    let mut flags = Vec::with_capacity(state.nodes.len());
    for node in &state.nodes {
        let overflow = node.is_joined() && traffic(state, node.node_id)? > max_traffic;
        flags.push(overflow);
    }

    let mut overflowed = Vec::new();
    for (node, overflow) in state.nodes.iter_mut().zip(flags) {
        node.overflow = overflow;
        if overflow {
            overflowed.push(node.node_id);
        }
    }
    Ok(overflowed)
}

/// Run `passes` rounds of the greedy rerouting heuristic.
pub fn apply_rerouting(state: &mut NetworkState, passes: u32) -> Result<RerouteReport, SimulationError> {
    let mut report = RerouteReport::default();
    refresh_overflow(state)?;

    for pass in 1..=passes {
        let mut moved_in_pass = 0;
        for node_id in 0..state.nodes.len() as u32 {
            if !state.node(node_id)?.is_joined() {
                continue;
            }
            let Some(EndpointId::Node(parent)) = uplink_neighbor(state, node_id)? else {
                continue;
            };
            if !state.node(parent)?.overflow {
                continue;
            }
            let Some((candidate, rssi)) = find_reroute_candidate(state, node_id, parent)? else {
                log::debug!("Node {} has no alternative to overflowed parent {}", node_id, parent);
                continue;
            };

            reparent(state, node_id, EndpointId::Node(parent), candidate)?;
            log::info!(
                "Pass {}: node {} moved from {} to #{} ({:.2} dBm)",
                pass,
                node_id,
                EndpointId::Node(parent),
                candidate,
                rssi
            );
            report.moves.push(RerouteMove {
                node_id,
                from: EndpointId::Node(parent),
                to: candidate,
                rssi,
                pass,
            });
            moved_in_pass += 1;
            refresh_overflow(state)?;
        }
        if moved_in_pass == 0 {
            break;
        }
    }

    report.residual_overflow = refresh_overflow(state)?;
    if !report.residual_overflow.is_empty() {
        log::warn!("Residual overflow after rerouting: {:?}", report.residual_overflow);
    }
    Ok(report)
}

/// Strongest node heard by `node_id` above its beacon sensitivity that is
/// closer to the gateway, is not `current_parent`, and carries no more
/// traffic than `node_id`. The first candidate wins ties.
fn find_reroute_candidate(state: &NetworkState, node_id: u32, current_parent: u32) -> Result<Option<(u32, f64)>, SimulationError> {
    let node = state.node(node_id)?;
    let own_traffic = traffic(state, node_id)?;
    let mut best: Option<(u32, f64)> = None;

    for candidate in state.nodes.iter() {
        if candidate.node_id == node_id || candidate.node_id == current_parent || !candidate.is_joined() {
            continue;
        }
        if candidate.hop_count >= node.hop_count {
            continue;
        }
        let Some(sensitivity) = candidate.beacon().map(|b| b.sensitivity_dbm) else {
            continue;
        };
        let (signal, _) = state.link_rssi(EndpointId::Node(node_id), EndpointId::Node(candidate.node_id))?;
        if signal <= sensitivity {
            continue;
        }
        if traffic(state, candidate.node_id)? > own_traffic {
            continue;
        }
        if best.map_or(true, |(_, s)| signal > s) {
            best = Some((candidate.node_id, signal));
        }
    }
    Ok(best)
}

/// Swap the uplink of `node_id` from `old_parent` to `new_parent` and shift the
/// hop counts of the moved subtree.
fn reparent(state: &mut NetworkState, node_id: u32, old_parent: EndpointId, new_parent: u32) -> Result<(), SimulationError> {
    // Children must be collected before hop counts change.
    let subtree_root_children = children(state, node_id)?;
    unlink(state, EndpointId::Node(node_id), old_parent)?;
    link(state, EndpointId::Node(node_id), EndpointId::Node(new_parent))?;

    let new_hop = state.node(new_parent)?.hop_count + 1;
    let mut stack: Vec<(u32, u32, Vec<u32>)> = vec![(node_id, new_hop, subtree_root_children)];
    let mut visited = HashSet::new();
    while let Some((current, hop, kids)) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        for &kid in &kids {
            let grandchildren = children(state, kid)?;
            stack.push((kid, hop + 1, grandchildren));
        }
        state.node_mut(current)?.hop_count = hop;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::SimulationConfig;
    use crate::simulation::types::Point;

    fn p(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    fn line_network() -> NetworkState {
        let positions = (1..=6).map(|i| p(8000.0 * i as f64, 0.0)).collect();
        let mut config = SimulationConfig::default();
        config.area.width_m = 50000.0;
        let mut state = NetworkState::from_parts(config, p(0.0, 0.0), positions).unwrap();
        state.form_mesh().unwrap();
        state
    }

    #[test]
    fn traffic_counts_the_whole_chain() {
        let state = line_network();
        let expected = [5, 4, 3, 2, 1, 0];
        for (node_id, want) in expected.iter().enumerate() {
            assert_eq!(traffic(&state, node_id as u32).unwrap(), *want);
        }
    }

    #[test]
    fn traffic_is_idempotent() {
        let state = line_network();
        let first: Vec<u32> = (0..6).map(|id| traffic(&state, id).unwrap()).collect();
        let second: Vec<u32> = (0..6).map(|id| traffic(&state, id).unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn overflow_flags_follow_threshold() {
        let mut state = line_network();
        state.config.traffic.max_traffic = 3;
        let overflowed = refresh_overflow(&mut state).unwrap();
        assert_eq!(overflowed, vec![0, 1]);
        assert!(state.node(0).unwrap().overflow);
        assert!(!state.node(2).unwrap().overflow);
    }

    /// Node 0 is an overloaded hop-1 parent of nodes 2, 3 and 4. Node 1 is an
    /// idle hop-1 node that node 2 also hears.
    fn star_network(extra: Option<Point>) -> NetworkState {
        let mut positions = vec![p(20000.0, 24000.0), p(24000.0, 20000.0), p(27000.0, 27500.0), p(20000.0, 32000.0), p(12500.0, 27000.0)];
        positions.extend(extra);
        let mut config = SimulationConfig::default();
        config.area.width_m = 40000.0;
        config.area.height_m = 40000.0;
        config.traffic.max_traffic = 2;
        let mut state = NetworkState::from_parts(config, p(20000.0, 20000.0), positions).unwrap();
        state.form_mesh().unwrap();
        state
    }

    #[test]
    fn rerouting_relieves_overflowed_parent() {
        let mut state = star_network(None);
        assert_eq!(traffic(&state, 0).unwrap(), 3);

        let report = apply_rerouting(&mut state, 3).unwrap();
        assert_eq!(report.moves.len(), 1);
        let moved = &report.moves[0];
        assert_eq!((moved.node_id, moved.from, moved.to, moved.pass), (2, EndpointId::Node(0), 1, 1));
        assert!(report.residual_overflow.is_empty());

        assert_eq!(uplink_neighbor(&state, 2).unwrap(), Some(EndpointId::Node(1)));
        assert_eq!(state.node(2).unwrap().hop_count, 2);
        assert_eq!(traffic(&state, 0).unwrap(), 2);
        assert_eq!(traffic(&state, 1).unwrap(), 1);
        assert!(!state.node(0).unwrap().overflow);
        assert_eq!(state.render_lines.len(), 5);
    }

    #[test]
    fn busier_candidate_is_not_used() {
        // Node 5 hangs off node 1, so node 1 carries more than node 2.
        let mut state = star_network(Some(p(32000.0, 18000.0)));
        assert_eq!(traffic(&state, 1).unwrap(), 1);

        let report = apply_rerouting(&mut state, 3).unwrap();
        assert!(report.moves.is_empty());
        assert_eq!(report.residual_overflow, vec![0]);
        assert!(state.node(0).unwrap().overflow);
    }

    #[test]
    fn equal_signal_candidates_keep_the_lower_id() {
        // Nodes 1 and 2 mirror each other around the line through node 3 and its parent 0.
        let positions = vec![p(20000.0, 24000.0), p(14000.0, 26000.0), p(26000.0, 26000.0), p(20000.0, 32000.0)];
        let mut config = SimulationConfig::default();
        config.area.width_m = 40000.0;
        config.area.height_m = 40000.0;
        config.traffic.max_traffic = 0;
        let mut state = NetworkState::from_parts(config, p(20000.0, 20000.0), positions).unwrap();
        state.form_mesh().unwrap();
        assert_eq!(uplink_neighbor(&state, 3).unwrap(), Some(EndpointId::Node(0)));
        let (left, _) = state.link_rssi(EndpointId::Node(3), EndpointId::Node(1)).unwrap();
        let (right, _) = state.link_rssi(EndpointId::Node(3), EndpointId::Node(2)).unwrap();
        assert_eq!(left, right);

        let report = apply_rerouting(&mut state, 1).unwrap();
        assert_eq!(report.moves.len(), 1);
        let moved = &report.moves[0];
        assert_eq!((moved.node_id, moved.from, moved.to), (3, EndpointId::Node(0), 1));
        assert_eq!(uplink_neighbor(&state, 3).unwrap(), Some(EndpointId::Node(1)));
        assert_eq!(traffic(&state, 2).unwrap(), 0);
    }

    #[test]
    fn zero_passes_only_refresh_flags() {
        let mut state = star_network(None);
        let report = apply_rerouting(&mut state, 0).unwrap();
        assert!(report.moves.is_empty());
        assert_eq!(report.residual_overflow, vec![0]);
    }

    #[test]
    fn reparent_shifts_subtree_hops() {
        let mut state = line_network();
        // Pretend node 3 (hop 4) can hang off node 0 (hop 1).
        reparent(&mut state, 3, EndpointId::Node(2), 0).unwrap();
        assert_eq!(state.node(3).unwrap().hop_count, 2);
        assert_eq!(state.node(4).unwrap().hop_count, 3);
        assert_eq!(state.node(5).unwrap().hop_count, 4);
        assert_eq!(uplink_neighbor(&state, 3).unwrap(), Some(EndpointId::Node(0)));
        assert_eq!(traffic(&state, 0).unwrap(), 5);
        assert_eq!(traffic(&state, 1).unwrap(), 1);
    }
}
