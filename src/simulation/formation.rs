//! Mesh formation: beacon flood from the gateway outwards.
//!
//! Each node moves `Unjoined -> Joined(hop = k)` or `Unjoined -> OutOfRange`.
//!
//! 1) The gateway broadcasts its beacon; every node hearing it above the
//!    beacon sensitivity joins at hop 1.
//! 2) For `h = 1, 2, ...` every node at hop `h` rebroadcasts the same beacon.
//!    A receiver joins the sender only if the sender is heard above
//!    sensitivity and no joined endpoint is heard stronger. Equal signals go to
//!    whichever sender broadcasts first, so each node gets exactly one parent.
//! 3) When a level produces no new hop, the flood can no longer advance and
//!    every remaining node is marked out of range.

use serde::Serialize;

use super::error::SimulationError;
use super::network::NetworkState;
use super::topology::link;
use super::types::{Beacon, EndpointId, JoinState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormationResult {
    /// Joined node ids in join order.
    pub joined: Vec<u32>,
    pub out_of_range: Vec<u32>,
    /// Deepest hop count reached.
    pub depth: u32,
}

/// Strongest joined endpoint heard above its beacon sensitivity, per node.
type BestSignal = Option<(EndpointId, f64)>;

/// Run the beacon flood on a freshly reset topology.
///
/// # Errors
///
/// `MissingBeacon` when the gateway has no beacon (fatal configuration error).
/// Topology errors from the RSSI model are propagated unchanged.
pub fn form_mesh(state: &mut NetworkState) -> Result<FormationResult, SimulationError> {
    let beacon = state.gateway.beacon.ok_or(SimulationError::MissingBeacon)?;
    state.reset_formation(false);

    let node_count = state.nodes.len();
    let mut joined = Vec::new();

    // Gateway broadcast
    for node_id in 0..node_count as u32 {
        let (signal, _) = state.link_rssi(EndpointId::Gateway, EndpointId::Node(node_id))?;
        if signal > beacon.sensitivity_dbm {
            join(state, EndpointId::Gateway, node_id, beacon)?;
            joined.push(node_id);
        }
    }
    log::debug!("Gateway beacon reached {} nodes", joined.len());

    let mut best: Vec<BestSignal> = vec![None; node_count];
    for node_id in 0..node_count as u32 {
        if state.nodes[node_id as usize].join_state == JoinState::Unjoined {
            best[node_id as usize] = best_joined_signal(state, node_id)?;
        }
    }

    let mut level = 1;
    loop {
        let senders: Vec<u32> = state.nodes.iter().filter(|n| n.is_joined() && n.hop_count == level).map(|n| n.node_id).collect();
        if senders.is_empty() {
            break;
        }

        let mut joined_at_level = 0;
        for sender in senders {
            let Some(sender_beacon) = state.nodes[sender as usize].beacon else {
                continue;
            };
            for receiver in 0..node_count as u32 {
                if state.nodes[receiver as usize].join_state != JoinState::Unjoined {
                    continue;
                }
                let (signal, _) = state.link_rssi(EndpointId::Node(sender), EndpointId::Node(receiver))?;
                if signal <= sender_beacon.sensitivity_dbm {
                    continue;
                }
                let accepted = match best[receiver as usize] {
                    Some((_, best_signal)) => signal >= best_signal,
                    None => true,
                };
                if !accepted {
                    continue;
                }

                join(state, EndpointId::Node(sender), receiver, sender_beacon)?;
                joined.push(receiver);
                joined_at_level += 1;
                update_best_signals(state, receiver, &mut best)?;
            }
        }
        log::debug!("Hop level {}: {} nodes joined", level, joined_at_level);
        level += 1;
    }

    let out_of_range = mark_out_of_range(state, &best);
    let depth = state.max_hop_count();

    log::info!(
        "Mesh formed: {} joined, {} out of range, depth {}",
        joined.len(),
        out_of_range.len(),
        depth
    );

    Ok(FormationResult { joined, out_of_range, depth })
}

fn join(state: &mut NetworkState, parent: EndpointId, node_id: u32, beacon: Beacon) -> Result<(), SimulationError> {
    let hop = state.endpoint(parent)?.hop_count() + 1;
    {
        let node = state.node_mut(node_id)?;
        node.hop_count = hop;
        node.beacon = Some(beacon);
        node.join_state = JoinState::Joined;
    }
    let edge = link(state, parent, EndpointId::Node(node_id))?;
    log::debug!("Node {} joined {} at hop {} ({:.2} dBm, {:.0} m)", node_id, parent, hop, edge.rssi, edge.distance);
    Ok(())
}

/// Strongest signal at `node_id` from any joined endpoint that clears that
/// endpoint's beacon sensitivity.
fn best_joined_signal(state: &NetworkState, node_id: u32) -> Result<BestSignal, SimulationError> {
    let mut best: BestSignal = None;
    let receiver = EndpointId::Node(node_id);

    let joined_senders = std::iter::once(EndpointId::Gateway).chain(state.nodes.iter().filter(|n| n.is_joined()).map(|n| EndpointId::Node(n.node_id)));
    for sender in joined_senders {
        if sender == receiver {
            continue;
        }
        let Some(sensitivity) = state.endpoint(sender)?.beacon().map(|b| b.sensitivity_dbm) else {
            continue;
        };
        let (signal, _) = state.link_rssi(sender, receiver)?;
        if signal > sensitivity && best.map_or(true, |(_, s)| signal > s) {
            best = Some((sender, signal));
        }
    }
    Ok(best)
}

/// A node just joined: it becomes a candidate parent for everyone still waiting.
fn update_best_signals(state: &NetworkState, new_member: u32, best: &mut [BestSignal]) -> Result<(), SimulationError> {
    let Some(sensitivity) = state.node(new_member)?.beacon.map(|b| b.sensitivity_dbm) else {
        return Ok(());
    };
    for node in state.nodes.iter().filter(|n| n.join_state == JoinState::Unjoined) {
        let (signal, _) = state.link_rssi(EndpointId::Node(new_member), EndpointId::Node(node.node_id))?;
        let slot = &mut best[node.node_id as usize];
        if signal > sensitivity && slot.map_or(true, |(_, s)| signal > s) {
            *slot = Some((EndpointId::Node(new_member), signal));
        }
    }
    Ok(())
}

fn mark_out_of_range(state: &mut NetworkState, best: &[BestSignal]) -> Vec<u32> {
    let mut out_of_range = Vec::new();
    for node in state.nodes.iter_mut().filter(|n| n.join_state == JoinState::Unjoined) {
        if let Some((candidate, signal)) = best[node.node_id as usize] {
            log::error!(
                "Node {} still hears {} at {:.2} dBm after the flood stopped",
                node.node_id,
                candidate,
                signal
            );
        }
        node.join_state = JoinState::OutOfRange;
        out_of_range.push(node.node_id);
        log::warn!("Node {} is out of range", node.node_id);
    }
    out_of_range
}
