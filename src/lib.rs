//! Multi-hop LoRa mesh formation, traffic and energy simulator.
//!
//! A gateway and a set of battery powered nodes are scattered over a plane.
//! The gateway beacon is flooded outwards to build a hop-count tree, loaded
//! subtrees are rebalanced, and packets are then forwarded to the gateway
//! until a battery runs out.

pub mod common;
pub mod simulation;

pub use common::config::SimulationConfig;
pub use simulation::{NetworkState, SimulationError};
