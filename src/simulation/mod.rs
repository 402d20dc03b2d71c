//! LoRa mesh simulation core.
//!
//! The modules build on each other from the radio model upwards:
//! - `signal_calculations`: path loss, RSSI and receiver sensitivity
//! - `phy`: time on air, CAD windows and energy costs
//! - `topology`: connection lists and symmetric link helpers
//! - `formation`: beacon flood that builds the hop-count tree
//! - `traffic`: subtree traffic, overflow flags and rerouting
//! - `uplink`: hop-by-hop packet forwarding to the gateway
//! - `driver`: send loop until a terminal condition
//! - `report`: summaries and JSON snapshots
//!
//! `NetworkState` in `network` owns all mutable state of one run and exposes
//! the operations above as methods.

pub mod driver;
pub mod error;
pub mod formation;
pub mod geometry;
pub mod network;
pub mod phy;
pub mod report;
pub mod signal_calculations;
pub mod topology;
pub mod traffic;
pub mod types;
pub mod uplink;

pub use driver::{RunOutcome, RunSummary, run_until_terminal};
pub use error::SimulationError;
pub use formation::FormationResult;
pub use network::{NetworkState, build_network};
pub use report::{NetworkSnapshot, NodeColor, NodeSummary};
pub use traffic::{RerouteMove, RerouteReport};
pub use types::{EndpointId, JoinState, Node, Packet, Point};
pub use uplink::UplinkReport;
