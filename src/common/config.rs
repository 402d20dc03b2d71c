//! Simulation configuration loading, parsing, and validation.
//!
//! The configuration replaces every physical constant and tunable of the
//! simulation. It can be read from TOML or JSON (picked by file extension);
//! every field has a default so partial files are accepted.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::simulation::phy::LoraParameters;
use crate::simulation::signal_calculations::PathLossParameters;
use crate::simulation::types::Point;

/// TX supply current (mA) for transmit powers -2..=20 dBm, indexed by `tx_power + 2`.
pub const DEFAULT_TX_CURRENT_MA: [f64; 23] = [
    22.0, 22.0, 22.0, 23.0, 24.0, 24.0, 24.0, 25.0, 25.0, 25.0, 25.0, 26.0, 31.0, 32.0, 34.0, 35.0, 44.0, 82.0, 85.0, 90.0, 105.0, 115.0, 125.0,
];

/// Lowest transmit power covered by the TX current table.
pub const MIN_TX_POWER_DBM: i32 = -2;

/// Error type for configuration loading failures.
#[derive(Debug)]
pub enum ConfigLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            ConfigLoadError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

/// Bounding box the nodes are scattered over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    /// Width of the area in meters.
    pub width_m: f64,
    /// Height of the area in meters.
    pub height_m: f64,
    /// Fixed gateway position. Placed uniformly at random when absent.
    pub gateway_position: Option<Point>,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            width_m: 20_000.0,
            height_m: 20_000.0,
            gateway_position: None,
        }
    }
}

/// Radio and modulation settings shared by the gateway and every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub carrier_frequency_mhz: f64,
    /// Linear atmospheric attenuation in dB per meter.
    pub air_attenuation_db_per_m: f64,
    /// Receiver noise figure (dB) used in the sensitivity formula.
    pub noise_figure_db: f64,
    pub gateway_tx_power_dbm: i32,
    pub node_tx_power_dbm: i32,
    pub spreading_factor: u8,
    /// 1..=4, representing 4/5..4/8.
    pub coding_rate: u8,
    pub bandwidth_hz: u32,
    pub preamble_symbols: u32,
    /// Implicit header mode (the `H` term of the airtime formula).
    pub implicit_header: bool,
    /// Low data rate optimization. Derived from SF/BW when absent.
    pub low_data_rate_optimization: Option<bool>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            carrier_frequency_mhz: 868.0,
            air_attenuation_db_per_m: 0.003,
            noise_figure_db: 7.0,
            gateway_tx_power_dbm: 14,
            node_tx_power_dbm: 14,
            spreading_factor: 7,
            coding_rate: 1,
            bandwidth_hz: 125_000,
            preamble_symbols: 8,
            implicit_header: false,
            low_data_rate_optimization: None,
        }
    }
}

impl RadioConfig {
    /// Modulation parameters for packets and beacons. Low data rate
    /// optimization defaults to on for SF11/SF12 at 125 kHz.
    pub fn lora_parameters(&self) -> LoraParameters {
        let auto_ldro = self.bandwidth_hz == 125_000 && self.spreading_factor >= 11;
        LoraParameters {
            bandwidth_hz: self.bandwidth_hz,
            spreading_factor: self.spreading_factor,
            coding_rate: self.coding_rate,
            preamble_symbols: self.preamble_symbols,
            implicit_header: self.implicit_header,
            low_data_rate_optimization: self.low_data_rate_optimization.unwrap_or(auto_ldro),
        }
    }

    pub fn path_loss_parameters(&self) -> PathLossParameters {
        PathLossParameters {
            air_attenuation_db_per_m: self.air_attenuation_db_per_m,
        }
    }
}

/// Electrical model of the radio module and the battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub voltage_v: f64,
    /// TX current in mA for -2..=20 dBm.
    pub tx_current_ma_table: Vec<f64>,
    pub rx_current_a: f64,
    pub sleep_current_a: f64,
    pub cad_current_a: f64,
    /// Initial battery level of every node (mAh-equivalent units).
    pub battery_capacity: f64,
    /// Fixed sleep period after each transmission. When absent the 1% duty
    /// cycle rule decides the sleep time.
    pub period_s: Option<f64>,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            voltage_v: 3.3,
            tx_current_ma_table: DEFAULT_TX_CURRENT_MA.to_vec(),
            rx_current_a: 0.0112,
            sleep_current_a: 0.000_000_2,
            cad_current_a: 0.0112,
            battery_capacity: 2400.0,
            period_s: None,
        }
    }
}

/// Tree balancing and packet sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// A node overflows when its subtree traffic is above this value.
    pub max_traffic: u32,
    /// Number of greedy rerouting passes run after formation.
    pub reroute_passes: u32,
    pub beacon_payload_bytes: usize,
    pub packet_payload_bytes: usize,
    /// Mean of the exponential inter-arrival time between random sends.
    pub avg_send_interval_s: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            max_traffic: 4,
            reroute_passes: 3,
            beacon_payload_bytes: 10,
            packet_payload_bytes: 20,
            avg_send_interval_s: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub node_count: usize,
    /// Seed for node placement and packet origin selection.
    pub seed: Option<u64>,
    pub max_iterations: u64,
    /// Stop once the gateway has received this many packets.
    pub stop_at_traffic: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            node_count: 10,
            seed: None,
            max_iterations: 100_000,
            stop_at_traffic: None,
        }
    }
}

/// Root structure holding every tunable of a simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub area: AreaConfig,
    pub radio: RadioConfig,
    pub energy: EnergyConfig,
    pub traffic: TrafficConfig,
    pub run: RunConfig,
}

/// Load, parse and validate a configuration file.
///
/// Files ending in `.json` are parsed with `serde_json`, everything else as TOML.
pub fn load_config(path: &Path) -> Result<SimulationConfig, ConfigLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| ConfigLoadError::FileReadError(e.to_string()))?;

    let is_json = path.extension().map(|ext| ext.eq_ignore_ascii_case("json")).unwrap_or(false);
    let config = parse_config(&data, is_json)?;

    validate_config(&config).map_err(ConfigLoadError::ValidationError)?;
    log::info!("Loaded configuration from {}", path.display());

    Ok(config)
}

fn parse_config(data: &str, is_json: bool) -> Result<SimulationConfig, ConfigLoadError> {
    if is_json {
        serde_json::from_str(data)
            .context("Invalid JSON format")
            .map_err(|e| ConfigLoadError::ParseError(format!("{:#}", e)))
    } else {
        toml::from_str(data)
            .context("Invalid TOML format")
            .map_err(|e| ConfigLoadError::ParseError(format!("{:#}", e)))
    }
}

/// Validate a configuration, rejecting values the physical model cannot use.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with the first problem found otherwise.
pub fn validate_config(config: &SimulationConfig) -> Result<(), String> {
    const MAX_NODES: usize = 10000;

    let run = &config.run;
    if run.node_count == 0 {
        return Err("Simulation must contain at least one node".to_string());
    }
    if run.node_count > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", run.node_count, MAX_NODES));
    }

    let area = &config.area;
    if !(area.width_m > 0.0 && area.height_m > 0.0) {
        return Err(format!("Area {} x {} m must be positive in both dimensions", area.width_m, area.height_m));
    }
    if let Some(gw) = &area.gateway_position {
        if gw.x < 0.0 || gw.y < 0.0 || gw.x > area.width_m || gw.y > area.height_m {
            return Err(format!("Gateway position ({}, {}) lies outside the area", gw.x, gw.y));
        }
    }

    let radio = &config.radio;
    if !(7..=12).contains(&radio.spreading_factor) {
        return Err(format!("Invalid spreading_factor {}, must be 7-12", radio.spreading_factor));
    }
    if !(1..=4).contains(&radio.coding_rate) {
        return Err(format!("Invalid coding_rate {}, must be 1-4 (representing 4/5 to 4/8)", radio.coding_rate));
    }
    if radio.bandwidth_hz == 0 {
        return Err("Invalid bandwidth, must be positive".to_string());
    }
    if radio.carrier_frequency_mhz <= 0.0 {
        return Err("Invalid carrier_frequency_mhz, must be positive".to_string());
    }
    if radio.air_attenuation_db_per_m < 0.0 {
        return Err("Invalid air_attenuation_db_per_m, must be non-negative".to_string());
    }

    let energy = &config.energy;
    let max_tx_power = MIN_TX_POWER_DBM + energy.tx_current_ma_table.len() as i32 - 1;
    for (name, power) in [("gateway_tx_power_dbm", radio.gateway_tx_power_dbm), ("node_tx_power_dbm", radio.node_tx_power_dbm)] {
        if power < MIN_TX_POWER_DBM || power > max_tx_power {
            return Err(format!(
                "Invalid {} {} dBm, must be within the TX current table ({} to {} dBm)",
                name, power, MIN_TX_POWER_DBM, max_tx_power
            ));
        }
    }
    if energy.voltage_v <= 0.0 {
        return Err("Invalid voltage_v, must be positive".to_string());
    }
    if energy.rx_current_a < 0.0 || energy.sleep_current_a < 0.0 || energy.cad_current_a < 0.0 {
        return Err("Supply currents must be non-negative".to_string());
    }
    if energy.tx_current_ma_table.iter().any(|c| *c < 0.0) {
        return Err("TX current table entries must be non-negative".to_string());
    }
    if energy.battery_capacity <= 0.0 {
        return Err("Invalid battery_capacity, must be positive".to_string());
    }
    if let Some(period) = energy.period_s {
        if period <= 0.0 {
            return Err(format!("Invalid period_s {}, must be positive (omit it for the duty-cycle rule)", period));
        }
    }

    let traffic = &config.traffic;
    if traffic.beacon_payload_bytes == 0 || traffic.packet_payload_bytes == 0 {
        return Err("Beacon and packet payload sizes must be positive".to_string());
    }
    if traffic.avg_send_interval_s <= 0.0 {
        return Err("Invalid avg_send_interval_s, must be positive".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&SimulationConfig::default()).is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml = r#"
            [radio]
            spreading_factor = 9

            [run]
            node_count = 25
            seed = 7
        "#;
        let config = parse_config(toml, false).unwrap();
        assert_eq!(config.radio.spreading_factor, 9);
        assert_eq!(config.run.node_count, 25);
        assert_eq!(config.run.seed, Some(7));
        assert_eq!(config.traffic.max_traffic, 4);
        assert_eq!(config.energy.tx_current_ma_table.len(), 23);
    }

    #[test]
    fn path_loss_parameters_carry_attenuation() {
        let mut config = SimulationConfig::default();
        config.radio.air_attenuation_db_per_m = 0.005;
        let params = config.radio.path_loss_parameters();
        assert_eq!(params.air_attenuation_db_per_m, 0.005);
    }

    #[test]
    fn json_config_parses() {
        let json = r#"{ "traffic": { "max_traffic": 2 }, "area": { "gateway_position": { "x": 10.0, "y": 20.0 } } }"#;
        let config = parse_config(json, true).unwrap();
        assert_eq!(config.traffic.max_traffic, 2);
        let gw = config.area.gateway_position.unwrap();
        assert_eq!((gw.x, gw.y), (10.0, 20.0));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = SimulationConfig::default();
        config.radio.spreading_factor = 6;
        assert!(validate_config(&config).unwrap_err().contains("spreading_factor"));

        let mut config = SimulationConfig::default();
        config.radio.node_tx_power_dbm = 21;
        assert!(validate_config(&config).unwrap_err().contains("node_tx_power_dbm"));

        let mut config = SimulationConfig::default();
        config.run.node_count = 0;
        assert!(validate_config(&config).is_err());

        let mut config = SimulationConfig::default();
        config.energy.period_s = Some(0.0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn low_data_rate_optimization_follows_spreading_factor() {
        let mut radio = RadioConfig::default();
        assert!(!radio.lora_parameters().low_data_rate_optimization);
        radio.spreading_factor = 12;
        assert!(radio.lora_parameters().low_data_rate_optimization);
        radio.low_data_rate_optimization = Some(false);
        assert!(!radio.lora_parameters().low_data_rate_optimization);
    }
}
