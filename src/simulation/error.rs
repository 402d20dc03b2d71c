//! Error taxonomy for the simulation core.
//!
//! Configuration errors abort a run. Topology errors abort the current
//! operation (formation, reroute or a single uplink) and are surfaced to the
//! caller. A node that never reaches the sensitivity threshold is not an
//! error at all: it ends in `JoinState::OutOfRange`.

use thiserror::Error;

use super::types::EndpointId;

/// Errors raised by the simulation engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    /// The gateway has no beacon descriptor, so the flood cannot start.
    #[error("gateway has no beacon assigned")]
    MissingBeacon,

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transmit power outside the TX current table.
    #[error("tx power {tx_power_dbm} dBm has no entry in the TX current table")]
    InvalidTxPower { tx_power_dbm: i32 },

    /// A link from an entity to itself was requested.
    #[error("cannot compute a link from {0:?} to itself")]
    SelfLink(EndpointId),

    /// Path loss evaluated at a non-positive distance.
    #[error("path loss is undefined at distance {distance} m")]
    NonPositiveDistance { distance: f64 },

    /// Node has no neighbour strictly closer to the gateway.
    #[error("node {node_id} has no eligible next hop towards the gateway")]
    NoNextHop { node_id: u32 },

    /// Uplink requested from a node that is not part of the tree.
    #[error("node {node_id} has not joined the mesh")]
    NotJoined { node_id: u32 },

    #[error("unknown node {node_id}")]
    UnknownNode { node_id: u32 },

    /// Uplink walked more hops than the tree is deep.
    #[error("route from node {node_id} exceeded {max_hops} hops")]
    RouteTooLong { node_id: u32, max_hops: u32 },

    /// The packet being forwarded is no longer queued at its current holder.
    #[error("packet {packet_id} is missing from the queue of node {node_id}")]
    PacketLost { node_id: u32, packet_id: u64 },
}

impl SimulationError {
    /// Whether the error is a fatal configuration problem rather than a
    /// topology failure of a single operation.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SimulationError::MissingBeacon | SimulationError::InvalidConfig(_) | SimulationError::InvalidTxPower { .. }
        )
    }
}
