//! Uplink forwarding: one packet travels hop by hop from its origin to the
//! gateway.
//!
//! At every hop the current holder hands the packet to the linked endpoint
//! with the lowest hop count below its own. The sender pays transmission and
//! the following sleep window; a node receiver pays reception and the CAD
//! window that detected the packet. The gateway is mains powered and only
//! counts deliveries.

use serde::Serialize;

use super::error::SimulationError;
use super::network::NetworkState;
use super::phy::{energy_cost_cad, energy_cost_rx, energy_cost_sleep, energy_cost_tx, sleep_duration};
use super::topology::uplink_neighbor;
use super::types::{EndpointId, Packet, PacketEvent, PacketEventKind, RadioEndpoint};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UplinkReport {
    pub packet_id: u64,
    pub origin: u32,
    /// Every endpoint the packet visited, origin first, gateway last.
    pub path: Vec<EndpointId>,
    pub hops: u32,
    pub total_time_on_air_s: f64,
    /// Battery drawn from all nodes on the path.
    pub energy_spent: f64,
}

/// Forward `packet` from `origin` to the gateway.
///
/// # Errors
///
/// * `NotJoined` when `origin` is not part of the tree.
/// * `NoNextHop` when some node on the way has no strictly closer neighbour.
///   The packet stays queued at that node.
/// * `RouteTooLong` when the walk exceeds the deepest hop count of the tree.
/// * `PacketLost` when the packet is no longer queued at the node about to send it.
pub fn send_to_gateway(state: &mut NetworkState, origin: u32, packet: Packet) -> Result<UplinkReport, SimulationError> {
    if !state.node(origin)?.is_joined() {
        return Err(SimulationError::NotJoined { node_id: origin });
    }

    let max_hops = state.max_hop_count();
    let packet_id = packet.packet_id;
    let time_on_air_s = packet.time_on_air_s;
    let cad = packet.cad_duration();
    let energy = state.config.energy.clone();

    state.node_mut(origin)?.receive(packet);

    let mut report = UplinkReport {
        packet_id,
        origin,
        path: vec![EndpointId::Node(origin)],
        hops: 0,
        total_time_on_air_s: 0.0,
        energy_spent: 0.0,
    };
    let mut current = origin;

    loop {
        if report.hops >= max_hops {
            log::error!("Packet {} from node {} exceeded {} hops", packet_id, origin, max_hops);
            return Err(SimulationError::RouteTooLong { node_id: origin, max_hops });
        }
        let Some(next) = uplink_neighbor(state, current)? else {
            log::error!("Node {} has no uplink for packet {}", current, packet_id);
            return Err(SimulationError::NoNextHop { node_id: current });
        };

        let sleep_s = sleep_duration(energy.period_s, time_on_air_s);
        let tx_cost = energy_cost_tx(&energy, state.node(current)?.tx_power_dbm, time_on_air_s)?;
        let sleep_cost = energy_cost_sleep(&energy, sleep_s);

        let sender = state.node_mut(current)?;
        let Some(packet) = sender.take_packet(packet_id) else {
            log::error!("Packet {} vanished from the queue of node {}", packet_id, current);
            return Err(SimulationError::PacketLost { node_id: current, packet_id });
        };
        sender.stats.time_on_air_s += time_on_air_s;
        sender.stats.energy_tx += tx_cost;
        sender.stats.sleep_time_s += sleep_s;
        sender.stats.energy_sleep += sleep_cost;
        sender.battery -= tx_cost + sleep_cost;
        let kind = if current == origin {
            sender.stats.packets_sent += 1;
            PacketEventKind::Sent
        } else {
            sender.stats.packets_forwarded += 1;
            PacketEventKind::Forwarded
        };
        sender.push_event(PacketEvent {
            packet_id,
            origin,
            from: EndpointId::Node(current),
            to: next,
            kind,
        });
        report.energy_spent += tx_cost + sleep_cost;
        report.total_time_on_air_s += time_on_air_s;
        report.hops += 1;
        report.path.push(next);

        let event = PacketEvent {
            packet_id,
            origin,
            from: EndpointId::Node(current),
            to: next,
            kind: PacketEventKind::Received,
        };
        match next {
            EndpointId::Gateway => {
                state.gateway.receive(packet);
                state.gateway.push_event(PacketEvent {
                    kind: PacketEventKind::Delivered,
                    ..event
                });
                log::debug!(
                    "Packet {} delivered from node {} in {} hops ({:.4} s on air)",
                    packet_id,
                    origin,
                    report.hops,
                    report.total_time_on_air_s
                );
                return Ok(report);
            }
            EndpointId::Node(next_id) => {
                let rx_cost = energy_cost_rx(&energy, time_on_air_s);
                let cad_cost = energy_cost_cad(&energy, &cad);
                let receiver = state.node_mut(next_id)?;
                receiver.stats.receive_time_s += time_on_air_s;
                receiver.stats.energy_rx += rx_cost;
                receiver.stats.cad_time_s += cad.total();
                receiver.stats.energy_cad += cad_cost;
                receiver.stats.packets_received += 1;
                receiver.battery -= rx_cost + cad_cost;
                receiver.push_event(event);
                receiver.receive(packet);
                report.energy_spent += rx_cost + cad_cost;
                log::debug!("Packet {}: node {} -> node {}", packet_id, current, next_id);
                current = next_id;
            }
        }
    }
}
