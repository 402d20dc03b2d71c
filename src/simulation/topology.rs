//! Topology store: per-endpoint connection lists and symmetric link helpers.
//!
//! Connection lists are kept sorted by descending RSSI; the sort is stable so
//! equal signals stay in insertion order. The list operations only touch the
//! owning endpoint; `link` and `unlink` maintain the mirrored edge and the
//! render line together so no half-connected state is ever observable.

use super::error::SimulationError;
use super::network::NetworkState;
use super::types::{Connection, EndpointId, RadioEndpoint, RenderLine};

/// Append a connection to `owner` and re-sort by descending RSSI.
pub fn add_connection<E: RadioEndpoint + ?Sized>(owner: &mut E, peer: EndpointId, rssi: f64, distance: f64) {
    let connections = owner.connections_mut();
    connections.push(Connection { peer, rssi, distance });
    connections.sort_by(|a, b| b.rssi.total_cmp(&a.rssi));
}

/// Remove the entry for `peer`. Returns whether one was present.
pub fn remove_connection<E: RadioEndpoint + ?Sized>(owner: &mut E, peer: EndpointId) -> bool {
    let connections = owner.connections_mut();
    let before = connections.len();
    connections.retain(|c| c.peer != peer);
    connections.len() != before
}

/// Whether `owner` keeps a connection entry for `peer`.
pub fn is_connected_to<E: RadioEndpoint + ?Sized>(owner: &E, peer: EndpointId) -> bool {
    owner.connections().iter().any(|c| c.peer == peer)
}

/// Create the edge `a <-> b` on both sides plus its render line.
///
/// The RSSI recorded on both sides is the one of `a` heard at `b`.
pub fn link(state: &mut NetworkState, a: EndpointId, b: EndpointId) -> Result<Connection, SimulationError> {
    let (rssi, distance) = state.link_rssi(a, b)?;
    let from = *state.endpoint(a)?.position();
    let to = *state.endpoint(b)?.position();

    add_connection(state.endpoint_mut(a)?, b, rssi, distance);
    add_connection(state.endpoint_mut(b)?, a, rssi, distance);
    state.render_lines.push(RenderLine { a, b, from, to });

    Ok(Connection { peer: b, rssi, distance })
}

/// Remove the edge `a <-> b` from both sides and drop its render line.
pub fn unlink(state: &mut NetworkState, a: EndpointId, b: EndpointId) -> Result<(), SimulationError> {
    let removed_a = remove_connection(state.endpoint_mut(a)?, b);
    let removed_b = remove_connection(state.endpoint_mut(b)?, a);
    if removed_a != removed_b {
        log::warn!("Edge {} <-> {} was only recorded on one side", a, b);
    }
    state.render_lines.retain(|line| !line.joins(a, b));
    Ok(())
}

/// The neighbour with the lowest hop count strictly below the node's own.
///
/// On a consistent tree this is the node's parent. Equal hop counts resolve to
/// the stronger connection (list order).
pub fn uplink_neighbor(state: &NetworkState, node_id: u32) -> Result<Option<EndpointId>, SimulationError> {
    let node = state.node(node_id)?;
    let mut best: Option<(EndpointId, u32)> = None;
    for connection in &node.connections {
        let hop = state.endpoint(connection.peer)?.hop_count();
        if hop >= node.hop_count {
            continue;
        }
        if best.map_or(true, |(_, best_hop)| hop < best_hop) {
            best = Some((connection.peer, hop));
        }
    }
    Ok(best.map(|(peer, _)| peer))
}

/// Node ids of the children of `node_id`: linked nodes with a higher hop count.
pub fn children(state: &NetworkState, node_id: u32) -> Result<Vec<u32>, SimulationError> {
    let node = state.node(node_id)?;
    let mut result = Vec::new();
    for connection in &node.connections {
        let Some(peer) = connection.peer.node_id() else {
            continue;
        };
        if state.node(peer)?.hop_count > node.hop_count {
            result.push(peer);
        }
    }
    Ok(result)
}
