//! Read-only views of the network for printing and plotting.

use serde::Serialize;
use std::fmt;

use super::error::SimulationError;
use super::network::NetworkState;
use super::traffic::traffic;
use super::types::{JoinState, Point, RadioStats, RenderLine};

/// Colour class of an endpoint on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeColor {
    Gateway,
    Joined,
    Overflow,
    OutOfRange,
    Unjoined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub node_id: u32,
    pub position: Point,
    pub hop_count: u32,
    pub join_state: JoinState,
    pub color: NodeColor,
    pub overflow: bool,
    pub battery: f64,
    pub traffic: u32,
    pub stats: RadioStats,
}

impl fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.join_state {
            JoinState::Joined if self.overflow => "overflow",
            JoinState::Joined => "joined",
            JoinState::OutOfRange => "out of range",
            JoinState::Unjoined => "unjoined",
        };
        write!(
            f,
            "Node {:>4} hops={:<2} state={:<12} battery={:.6} traffic={:<3} sent={} fwd={} recv={} toa={:.3}s rx={:.3}s sleep={:.1}s cad={:.4}s",
            self.node_id,
            self.hop_count,
            state,
            self.battery,
            self.traffic,
            self.stats.packets_sent,
            self.stats.packets_forwarded,
            self.stats.packets_received,
            self.stats.time_on_air_s,
            self.stats.receive_time_s,
            self.stats.sleep_time_s,
            self.stats.cad_time_s
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewaySummary {
    pub position: Point,
    pub tx_power_dbm: i32,
    pub connections: usize,
    pub packets_received: u64,
}

impl fmt::Display for GatewaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gateway at ({:.1}, {:.1}) tx={} dBm links={} received={}",
            self.position.x, self.position.y, self.tx_power_dbm, self.connections, self.packets_received
        )
    }
}

/// Everything the plotting layer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub gateway: GatewaySummary,
    pub nodes: Vec<NodeSummary>,
    pub lines: Vec<RenderLine>,
}

impl NetworkSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl NetworkState {
    pub fn node_color(&self, node_id: u32) -> Result<NodeColor, SimulationError> {
        let node = self.node(node_id)?;
        Ok(match node.join_state {
            JoinState::Joined if node.overflow => NodeColor::Overflow,
            JoinState::Joined => NodeColor::Joined,
            JoinState::OutOfRange => NodeColor::OutOfRange,
            JoinState::Unjoined => NodeColor::Unjoined,
        })
    }

    pub fn node_summary(&self, node_id: u32) -> Result<NodeSummary, SimulationError> {
        let node = self.node(node_id)?;
        Ok(NodeSummary {
            node_id,
            position: node.position,
            hop_count: node.hop_count,
            join_state: node.join_state,
            color: self.node_color(node_id)?,
            overflow: node.overflow,
            battery: node.battery,
            traffic: traffic(self, node_id)?,
            stats: node.stats.clone(),
        })
    }

    pub fn summaries(&self) -> Result<Vec<NodeSummary>, SimulationError> {
        (0..self.nodes.len() as u32).map(|id| self.node_summary(id)).collect()
    }

    pub fn gateway_summary(&self) -> GatewaySummary {
        GatewaySummary {
            position: self.gateway.position,
            tx_power_dbm: self.gateway.tx_power_dbm,
            connections: self.gateway.connections.len(),
            packets_received: self.gateway.packets_received,
        }
    }

    pub fn snapshot(&self) -> Result<NetworkSnapshot, SimulationError> {
        Ok(NetworkSnapshot {
            gateway: self.gateway_summary(),
            nodes: self.summaries()?,
            lines: self.render_lines.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::SimulationConfig;

    fn p(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    fn formed() -> NetworkState {
        let positions = vec![p(3000.0, 0.0), p(10000.0, 0.0), p(19000.0, 19000.0)];
        let mut state = NetworkState::from_parts(SimulationConfig::default(), p(0.0, 0.0), positions).unwrap();
        state.form_mesh().unwrap();
        state
    }

    #[test]
    fn colors_follow_node_state() {
        let mut state = formed();
        assert_eq!(state.node_color(0).unwrap(), NodeColor::Joined);
        assert_eq!(state.node_color(2).unwrap(), NodeColor::OutOfRange);
        state.nodes[0].overflow = true;
        assert_eq!(state.node_color(0).unwrap(), NodeColor::Overflow);
        state.reset_formation(false);
        assert_eq!(state.node_color(0).unwrap(), NodeColor::Unjoined);
    }

    #[test]
    fn summary_line_mentions_hops_and_traffic() {
        let state = formed();
        let summary = state.node_summary(0).unwrap();
        assert_eq!(summary.traffic, 1);
        let line = summary.to_string();
        assert!(line.starts_with("Node    0 hops=1"));
        assert!(line.contains("traffic=1"));
        assert!(state.node_summary(2).unwrap().to_string().contains("out of range"));
    }

    #[test]
    fn snapshot_serialises_to_json() {
        let state = formed();
        let snapshot = state.snapshot().unwrap();
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.lines.len(), 2);
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["gateway"]["connections"], 1);
        assert_eq!(json["nodes"][1]["hop_count"], 2);
        assert_eq!(json["nodes"][2]["color"], "OutOfRange");
    }
}
