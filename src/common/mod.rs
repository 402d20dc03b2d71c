//! Settings shared by the library and the command line front end.

pub mod config;

pub use config::{ConfigLoadError, SimulationConfig, load_config, validate_config};
