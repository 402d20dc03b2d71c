//! Network state owned by one simulation instance.
//!
//! `NetworkState` holds the configuration, the gateway, every node and the
//! render lines of the current tree. All engines (formation, rerouting,
//! uplink) operate on it through `&mut self`; nothing is shared between
//! instances, so independent networks can run on separate threads.
//!
//! High-level flow of a run:
//! 1) `build` scatters nodes and the gateway over the configured area.
//! 2) `form_mesh` floods the gateway beacon outwards, hop by hop.
//! 3) `apply_rerouting` moves subtrees away from overflowed parents.
//! 4) `send_packet` / `send_random_packet` move data towards the gateway,
//!    draining batteries along the way.

use rand::Rng;
use rand::seq::SliceRandom;

use super::error::SimulationError;
use super::formation::{self, FormationResult};
use super::geometry::random_point;
use super::signal_calculations::{PathLossParameters, rssi};
use super::traffic::{self, RerouteReport};
use super::types::{Beacon, EndpointId, Gateway, JoinState, Node, Packet, Point, RadioEndpoint, RadioStats, RenderLine};
use super::uplink::{self, UplinkReport};
use crate::common::config::{SimulationConfig, validate_config};

pub struct NetworkState {
    pub config: SimulationConfig,
    pub gateway: Gateway,
    /// Indexed by node id.
    pub nodes: Vec<Node>,
    pub render_lines: Vec<RenderLine>,
    next_packet_id: u64,
}

/// Build a network of `node_count` nodes with the given transmit power and
/// carrier frequency; every other setting comes from `config`.
pub fn build_network<R: Rng + ?Sized>(
    node_count: usize,
    tx_power_dbm: i32,
    carrier_frequency_mhz: f64,
    mut config: SimulationConfig,
    rng: &mut R,
) -> Result<NetworkState, SimulationError> {
    config.run.node_count = node_count;
    config.radio.node_tx_power_dbm = tx_power_dbm;
    config.radio.carrier_frequency_mhz = carrier_frequency_mhz;
    NetworkState::build(config, rng)
}

impl NetworkState {
    /// Scatter `config.run.node_count` nodes uniformly over the area. The
    /// gateway uses its configured position or a random one.
    pub fn build<R: Rng + ?Sized>(config: SimulationConfig, rng: &mut R) -> Result<Self, SimulationError> {
        validate_config(&config).map_err(SimulationError::InvalidConfig)?;

        let (width, height) = (config.area.width_m, config.area.height_m);
        let gateway_position = match config.area.gateway_position {
            Some(position) => position,
            None => random_point(rng, width, height),
        };
        let node_positions = (0..config.run.node_count).map(|_| random_point(rng, width, height)).collect();

        Self::from_parts(config, gateway_position, node_positions)
    }

    /// Build a network with fixed positions. Node ids follow the order of
    /// `node_positions`.
    pub fn from_parts(mut config: SimulationConfig, gateway_position: Point, node_positions: Vec<Point>) -> Result<Self, SimulationError> {
        config.run.node_count = node_positions.len();
        validate_config(&config).map_err(SimulationError::InvalidConfig)?;

        let radio = &config.radio;
        let lora = radio.lora_parameters();
        let beacon = Beacon::new(&lora, config.traffic.beacon_payload_bytes, radio.noise_figure_db);
        let gateway = Gateway::new(gateway_position, radio.gateway_tx_power_dbm, radio.carrier_frequency_mhz, Some(beacon));

        let nodes: Vec<Node> = node_positions
            .into_iter()
            .enumerate()
            .map(|(index, position)| {
                Node::new(
                    index as u32,
                    position,
                    radio.node_tx_power_dbm,
                    radio.carrier_frequency_mhz,
                    config.energy.battery_capacity,
                )
            })
            .collect();

        log::info!(
            "Built network: {} nodes, gateway at ({:.1}, {:.1}), beacon sensitivity {:.2} dBm",
            nodes.len(),
            gateway_position.x,
            gateway_position.y,
            beacon.sensitivity_dbm
        );

        Ok(Self {
            config,
            gateway,
            nodes,
            render_lines: Vec::new(),
            next_packet_id: 0,
        })
    }

    pub fn path_loss_parameters(&self) -> PathLossParameters {
        self.config.radio.path_loss_parameters()
    }

    /// Node by id.
    ///
    /// # Returns
    ///
    /// `UnknownNode` when `node_id` is not below the node count.
    pub fn node(&self, node_id: u32) -> Result<&Node, SimulationError> {
        self.nodes.get(node_id as usize).ok_or(SimulationError::UnknownNode { node_id })
    }

    pub fn node_mut(&mut self, node_id: u32) -> Result<&mut Node, SimulationError> {
        self.nodes.get_mut(node_id as usize).ok_or(SimulationError::UnknownNode { node_id })
    }

    /// Node or gateway behind an endpoint id.
    pub fn endpoint(&self, id: EndpointId) -> Result<&dyn RadioEndpoint, SimulationError> {
        match id {
            EndpointId::Gateway => Ok(&self.gateway),
            EndpointId::Node(node_id) => Ok(self.node(node_id)?),
        }
    }

    pub fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut dyn RadioEndpoint, SimulationError> {
        match id {
            EndpointId::Gateway => Ok(&mut self.gateway),
            EndpointId::Node(node_id) => Ok(self.node_mut(node_id)?),
        }
    }

    /// RSSI of `sender` at `receiver` and their distance.
    pub fn link_rssi(&self, sender: EndpointId, receiver: EndpointId) -> Result<(f64, f64), SimulationError> {
        if sender == receiver {
            return Err(SimulationError::SelfLink(sender));
        }
        rssi(self.endpoint(sender)?, self.endpoint(receiver)?, &self.path_loss_parameters())
    }

    /// Clear every trace of the previous tree. With `reset_energy` batteries,
    /// counters and queues are restored as well.
    pub fn reset_formation(&mut self, reset_energy: bool) {
        self.gateway.connections.clear();
        self.render_lines.clear();
        let capacity = self.config.energy.battery_capacity;
        for node in &mut self.nodes {
            node.connections.clear();
            node.beacon = None;
            node.hop_count = 0;
            node.join_state = JoinState::Unjoined;
            node.overflow = false;
            if reset_energy {
                node.battery = capacity;
                node.stats = RadioStats::default();
                node.queue.clear();
                node.history.clear();
            }
        }
        if reset_energy {
            self.gateway.packets_received = 0;
            self.gateway.delivered.clear();
            self.gateway.history.clear();
            self.next_packet_id = 0;
        }
    }

    pub fn form_mesh(&mut self) -> Result<FormationResult, SimulationError> {
        formation::form_mesh(self)
    }

    pub fn compute_traffic(&self, node_id: u32) -> Result<u32, SimulationError> {
        traffic::traffic(self, node_id)
    }

    pub fn apply_rerouting(&mut self, passes: u32) -> Result<RerouteReport, SimulationError> {
        traffic::apply_rerouting(self, passes)
    }

    /// A fresh data packet originating at `origin`, using the configured
    /// modulation and payload size.
    pub fn new_packet(&mut self, origin: u32) -> Result<Packet, SimulationError> {
        let tx_power = self.node(origin)?.tx_power_dbm;
        let radio = &self.config.radio;
        let packet = Packet::new(
            self.next_packet_id,
            origin,
            &radio.lora_parameters(),
            self.config.traffic.packet_payload_bytes,
            tx_power,
            radio.noise_figure_db,
        );
        self.next_packet_id += 1;
        Ok(packet)
    }

    pub fn send_packet(&mut self, node_id: u32, packet: Packet) -> Result<UplinkReport, SimulationError> {
        uplink::send_to_gateway(self, node_id, packet)
    }

    /// Send a new packet from a uniformly chosen joined node.
    ///
    /// Returns `Ok(None)` when no node is part of the tree.
    pub fn send_random_packet<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<UplinkReport>, SimulationError> {
        let candidates = self.routable_nodes();
        let Some(&origin) = candidates.choose(rng) else {
            return Ok(None);
        };
        let packet = self.new_packet(origin)?;
        self.send_packet(origin, packet).map(Some)
    }

    /// Ids of nodes that joined the tree.
    pub fn routable_nodes(&self) -> Vec<u32> {
        self.nodes.iter().filter(|n| n.is_joined()).map(|n| n.node_id).collect()
    }

    /// Deepest hop count of the tree, 0 when nothing joined.
    pub fn max_hop_count(&self) -> u32 {
        self.nodes.iter().filter(|n| n.is_joined()).map(|n| n.hop_count).max().unwrap_or(0)
    }

    pub fn node_position(&self, node_id: u32) -> Result<Point, SimulationError> {
        Ok(self.node(node_id)?.position)
    }

    /// Segments to draw for the current tree.
    pub fn connection_lines(&self) -> &[RenderLine] {
        &self.render_lines
    }
}
