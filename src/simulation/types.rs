//! Type definitions for the simulation.
//!
//! Contains all data structures used across the simulation including:
//! - Positions and endpoint identifiers
//! - Beacon and packet descriptors
//! - Node and gateway state (topology, energy counters, queues)
//! - The `RadioEndpoint` capability shared by nodes and the gateway

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum traffic history per endpoint (ring buffer).
pub const NODE_MESSAGES_CAPACITY: usize = 1000;

/// Maximum number of delivered packets the gateway retains.
pub const GATEWAY_DELIVERED_CAPACITY: usize = 1000;

/// Simple 2D point, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Identifies either side of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EndpointId {
    Gateway,
    Node(u32),
}

impl EndpointId {
    pub fn node_id(&self) -> Option<u32> {
        match self {
            EndpointId::Gateway => None,
            EndpointId::Node(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointId::Gateway => write!(f, "GW"),
            EndpointId::Node(id) => write!(f, "#{}", id),
        }
    }
}

/// One side of a symmetric link. Each endpoint stores its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Connection {
    pub peer: EndpointId,
    /// Received signal strength recorded when the link was established (dBm).
    pub rssi: f64,
    /// Distance between the endpoints (m).
    pub distance: f64,
}

/// Immutable beacon descriptor created by the gateway and shared by every
/// node that joins the tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Beacon {
    pub payload_len: usize,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub bandwidth_hz: u32,
    /// Minimum RSSI a receiver needs to hear this beacon (dBm).
    pub sensitivity_dbm: f64,
    pub time_on_air_s: f64,
}

/// A data packet in flight. Derived figures are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet {
    pub packet_id: u64,
    /// Node that created the packet.
    pub origin: u32,
    pub payload_len: usize,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub bandwidth_hz: u32,
    pub implicit_header: bool,
    pub low_data_rate_optimization: bool,
    /// Bits per second.
    pub bit_rate: f64,
    pub payload_symbols: f64,
    pub time_on_air_s: f64,
    pub sensitivity_dbm: f64,
    /// Transmit power of the origin minus receiver sensitivity (dB).
    pub link_budget_db: f64,
}

/// Membership of a node in the spanning tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinState {
    Unjoined,
    Joined,
    /// Terminal: no joined neighbour is heard above sensitivity.
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketEventKind {
    Sent,
    Forwarded,
    Received,
    Delivered,
}

/// Entry of an endpoint's traffic history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketEvent {
    pub packet_id: u64,
    pub origin: u32,
    pub from: EndpointId,
    pub to: EndpointId,
    pub kind: PacketEventKind,
}

/// Cumulative radio activity of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RadioStats {
    pub time_on_air_s: f64,
    pub receive_time_s: f64,
    pub sleep_time_s: f64,
    pub cad_time_s: f64,
    pub packets_sent: u64,
    pub packets_forwarded: u64,
    pub packets_received: u64,
    pub energy_tx: f64,
    pub energy_rx: f64,
    pub energy_sleep: f64,
    pub energy_cad: f64,
}

/// Straight segment between two linked endpoints, for the drawing layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderLine {
    pub a: EndpointId,
    pub b: EndpointId,
    pub from: Point,
    pub to: Point,
}

impl RenderLine {
    pub fn joins(&self, a: EndpointId, b: EndpointId) -> bool {
        (self.a == a && self.b == b) || (self.a == b && self.b == a)
    }
}

/// Battery-powered mesh node.
///
/// Topology fields (`hop_count`, `beacon`, `join_state`, `connections`,
/// `overflow`) are rebuilt by every formation pass. Energy fields only
/// decrease (battery) or increase (counters) during a run.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: u32,
    pub position: Point,
    pub tx_power_dbm: i32,
    pub frequency_mhz: f64,
    pub hop_count: u32,
    pub beacon: Option<Beacon>,
    pub join_state: JoinState,
    /// Sorted by descending RSSI, ties in insertion order.
    pub connections: Vec<Connection>,
    pub overflow: bool,
    /// May go negative by at most one packet's cost before a driver stops.
    pub battery: f64,
    pub stats: RadioStats,
    pub queue: VecDeque<Packet>,
    pub history: VecDeque<PacketEvent>,
}

impl Node {
    pub fn new(node_id: u32, position: Point, tx_power_dbm: i32, frequency_mhz: f64, battery: f64) -> Self {
        Self {
            node_id,
            position,
            tx_power_dbm,
            frequency_mhz,
            hop_count: 0,
            beacon: None,
            join_state: JoinState::Unjoined,
            connections: Vec::new(),
            overflow: false,
            battery,
            stats: RadioStats::default(),
            queue: VecDeque::new(),
            history: VecDeque::with_capacity(64),
        }
    }

    pub fn is_joined(&self) -> bool {
        self.join_state == JoinState::Joined
    }

    pub fn is_out_of_range(&self) -> bool {
        self.join_state == JoinState::OutOfRange
    }

    pub fn is_depleted(&self) -> bool {
        self.battery <= 0.0
    }

    /// Push an event into this node's bounded history, popping the oldest if
    /// at capacity.
    pub fn push_event(&mut self, event: PacketEvent) {
        push_bounded(&mut self.history, event, NODE_MESSAGES_CAPACITY);
    }

    /// Remove a packet from the queue, handing ownership to the caller.
    pub fn take_packet(&mut self, packet_id: u64) -> Option<Packet> {
        let index = self.queue.iter().position(|p| p.packet_id == packet_id)?;
        self.queue.remove(index)
    }
}

/// The single sink of the mesh. Hop count is always 0.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub position: Point,
    pub tx_power_dbm: i32,
    pub frequency_mhz: f64,
    pub beacon: Option<Beacon>,
    pub connections: Vec<Connection>,
    pub packets_received: u64,
    /// Most recent delivered packets.
    pub delivered: VecDeque<Packet>,
    pub history: VecDeque<PacketEvent>,
}

impl Gateway {
    pub fn new(position: Point, tx_power_dbm: i32, frequency_mhz: f64, beacon: Option<Beacon>) -> Self {
        Self {
            position,
            tx_power_dbm,
            frequency_mhz,
            beacon,
            connections: Vec::new(),
            packets_received: 0,
            delivered: VecDeque::new(),
            history: VecDeque::with_capacity(64),
        }
    }

    pub fn push_event(&mut self, event: PacketEvent) {
        push_bounded(&mut self.history, event, NODE_MESSAGES_CAPACITY);
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    if buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

/// Capabilities common to nodes and the gateway.
pub trait RadioEndpoint {
    fn endpoint_id(&self) -> EndpointId;
    fn position(&self) -> &Point;
    fn tx_power_dbm(&self) -> i32;
    fn frequency_mhz(&self) -> f64;
    fn hop_count(&self) -> u32;
    fn beacon(&self) -> Option<&Beacon>;
    fn connections(&self) -> &[Connection];
    fn connections_mut(&mut self) -> &mut Vec<Connection>;
    /// Take ownership of a packet that arrived over the air.
    fn receive(&mut self, packet: Packet);
}

impl RadioEndpoint for Node {
    fn endpoint_id(&self) -> EndpointId {
        EndpointId::Node(self.node_id)
    }

    fn position(&self) -> &Point {
        &self.position
    }

    fn tx_power_dbm(&self) -> i32 {
        self.tx_power_dbm
    }

    fn frequency_mhz(&self) -> f64 {
        self.frequency_mhz
    }

    fn hop_count(&self) -> u32 {
        self.hop_count
    }

    fn beacon(&self) -> Option<&Beacon> {
        self.beacon.as_ref()
    }

    fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Vec<Connection> {
        &mut self.connections
    }

    fn receive(&mut self, packet: Packet) {
        self.queue.push_back(packet);
    }
}

impl RadioEndpoint for Gateway {
    fn endpoint_id(&self) -> EndpointId {
        EndpointId::Gateway
    }

    fn position(&self) -> &Point {
        &self.position
    }

    fn tx_power_dbm(&self) -> i32 {
        self.tx_power_dbm
    }

    fn frequency_mhz(&self) -> f64 {
        self.frequency_mhz
    }

    fn hop_count(&self) -> u32 {
        0
    }

    fn beacon(&self) -> Option<&Beacon> {
        self.beacon.as_ref()
    }

    fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Vec<Connection> {
        &mut self.connections
    }

    fn receive(&mut self, packet: Packet) {
        self.packets_received += 1;
        push_bounded(&mut self.delivered, packet, GATEWAY_DELIVERED_CAPACITY);
    }
}
