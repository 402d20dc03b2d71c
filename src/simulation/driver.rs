//! Run driver: keeps sending random packets until a terminal condition.
//!
//! Every iteration advances a simulated clock by an exponentially distributed
//! gap (mean `traffic.avg_send_interval_s`), then sends one packet from a
//! random joined node. The run ends at the first of:
//! - a node battery at or below zero,
//! - the gateway reaching `run.stop_at_traffic` received packets,
//! - no node left to route from,
//! - `max_iterations` sends.
//!
//! Batteries are not clamped: the depleted node may end up to one packet's
//! cost below zero.

use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::Serialize;

use super::error::SimulationError;
use super::network::NetworkState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RunOutcome {
    BatteryDepleted { node_id: u32 },
    TrafficTarget,
    NoRoutableNodes,
    IterationLimit,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::BatteryDepleted { node_id } => write!(f, "battery of node {} depleted", node_id),
            RunOutcome::TrafficTarget => write!(f, "gateway traffic target reached"),
            RunOutcome::NoRoutableNodes => write!(f, "no routable nodes"),
            RunOutcome::IterationLimit => write!(f, "iteration limit reached"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Packets sent during this run.
    pub iterations: u64,
    /// Total packets received by the gateway.
    pub packets_delivered: u64,
    pub simulated_time_s: f64,
    pub outcome: RunOutcome,
}

/// Send random packets until a terminal condition is hit.
///
/// # Errors
///
/// An uplink failure aborts the run and is returned unchanged.
/// `InvalidConfig` when the send interval cannot parameterise the schedule.
pub fn run_until_terminal<R: Rng + ?Sized>(state: &mut NetworkState, rng: &mut R, max_iterations: u64) -> Result<RunSummary, SimulationError> {
    let mean = state.config.traffic.avg_send_interval_s;
    let schedule = Exp::new(1.0 / mean).map_err(|e| SimulationError::InvalidConfig(format!("avg_send_interval_s {}: {}", mean, e)))?;
    let stop_at_traffic = state.config.run.stop_at_traffic;

    let mut iterations = 0;
    let mut simulated_time_s = 0.0;

    let outcome = loop {
        if let Some(node) = state.nodes.iter().find(|n| n.is_joined() && n.is_depleted()) {
            break RunOutcome::BatteryDepleted { node_id: node.node_id };
        }
        if stop_at_traffic.is_some_and(|target| state.gateway.packets_received >= target) {
            break RunOutcome::TrafficTarget;
        }
        if iterations >= max_iterations {
            break RunOutcome::IterationLimit;
        }

        let gap: f64 = schedule.sample(rng);
        if state.send_random_packet(rng)?.is_none() {
            break RunOutcome::NoRoutableNodes;
        }
        simulated_time_s += gap;
        iterations += 1;

        if iterations % 1000 == 0 {
            log::debug!("{} packets sent, {:.0} s simulated", iterations, simulated_time_s);
        }
    };

    let summary = RunSummary {
        iterations,
        packets_delivered: state.gateway.packets_received,
        simulated_time_s,
        outcome,
    };
    log::info!(
        "Run stopped after {} packets ({:.0} s simulated): {}",
        summary.iterations,
        summary.simulated_time_s,
        summary.outcome
    );
    Ok(summary)
}
