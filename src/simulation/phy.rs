//! LoRa PHY timing and energy model.
//!
//! Timing follows the SX127x datasheet derivation (symbol time, preamble,
//! payload symbol count). Energy is expressed in mAh-equivalent units:
//! `current(A) × voltage(V) × duration(s) × 0.000278`.

use super::error::SimulationError;
use super::signal_calculations::receiver_sensitivity;
use super::types::{Beacon, Packet};
use crate::common::config::{EnergyConfig, MIN_TX_POWER_DBM};

/// A·V·s to mAh-equivalent conversion factor.
pub const ENERGY_CONVERSION_FACTOR: f64 = 0.000278;

/// LoRa duty cycle limit applied when no fixed period is configured.
pub const DUTY_CYCLE: f64 = 0.01;

/// CAD processing clock (Hz) of the SX127x.
const CAD_PROCESSING_CLOCK_HZ: f64 = 1.75e6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoraParameters {
    pub bandwidth_hz: u32,
    pub spreading_factor: u8,
    /// 1..=4 representing 4/5..4/8.
    pub coding_rate: u8,
    // Number of programmed preamble symbols (typically 8)
    pub preamble_symbols: u32,
    // Implicit header mode; the `H` term below
    pub implicit_header: bool,
    // Low Data Rate Optimization (DE flag)
    pub low_data_rate_optimization: bool,
}

/// Symbol duration in seconds: `2^SF / BW`.
pub fn symbol_time(spreading_factor: u8, bandwidth_hz: u32) -> f64 {
    2.0_f64.powi(spreading_factor as i32) / bandwidth_hz as f64
}

/// Preamble duration: `(4.25 + N_preamble) × T_sym`.
pub fn preamble_time(lora: &LoraParameters) -> f64 {
    (4.25 + lora.preamble_symbols as f64) * symbol_time(lora.spreading_factor, lora.bandwidth_hz)
}

/// Number of payload symbols.
///
/// ```text
/// θ = 8·PL − 4·SF + 44 − 20·H
/// γ = 4·(SF − 2·DE)
/// N_payload = 8 + max(ceil(θ / γ) · (4/(4+CR) + 4), 0)
/// ```
pub fn payload_symbols(lora: &LoraParameters, payload_len: usize) -> f64 {
    let sf = lora.spreading_factor as f64;
    let pl = payload_len as f64;
    let h = if lora.implicit_header { 1.0 } else { 0.0 };
    let de = if lora.low_data_rate_optimization { 1.0 } else { 0.0 };

    let theta = 8.0 * pl - 4.0 * sf + 44.0 - 20.0 * h;
    let gamma = 4.0 * (sf - 2.0 * de);
    let coding_factor = coding_rate_fraction(lora.coding_rate) + 4.0;

    8.0 + ((theta / gamma).ceil() * coding_factor).max(0.0)
}

/// Time on air of a frame with `payload_len` bytes, in seconds.
pub fn time_on_air(lora: &LoraParameters, payload_len: usize) -> f64 {
    let t_sym = symbol_time(lora.spreading_factor, lora.bandwidth_hz);
    preamble_time(lora) + payload_symbols(lora, payload_len) * t_sym
}

/// Coding rate as the fraction of useful bits, `4/(4+CR)`.
pub fn coding_rate_fraction(coding_rate: u8) -> f64 {
    4.0 / (4.0 + coding_rate as f64)
}

/// Raw bit rate in bits per second: `SF · 4/(4+CR) · BW / 2^SF`.
pub fn bit_rate(lora: &LoraParameters) -> f64 {
    lora.spreading_factor as f64 * coding_rate_fraction(lora.coding_rate) * lora.bandwidth_hz as f64
        / 2.0_f64.powi(lora.spreading_factor as i32)
}

/// Duration of one channel activity detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CadDuration {
    /// Receiver-on part: `32/BW + T_sym`.
    pub rx_mode_s: f64,
    /// Correlation part: `SF · 2^SF / 1.75e6`.
    pub processing_s: f64,
}

impl CadDuration {
    /// Whole detection window in seconds.
    pub fn total(&self) -> f64 {
        self.rx_mode_s + self.processing_s
    }
}

/// CAD window for a modulation.
///
/// # Parameters
///
/// * `spreading_factor` - SF 7..=12
/// * `bandwidth_hz` - Channel bandwidth in Hz
///
/// # Returns
///
/// The receiver-on and processing parts, in seconds.
pub fn cad_duration(spreading_factor: u8, bandwidth_hz: u32) -> CadDuration {
    CadDuration {
        rx_mode_s: 32.0 / bandwidth_hz as f64 + symbol_time(spreading_factor, bandwidth_hz),
        processing_s: spreading_factor as f64 * 2.0_f64.powi(spreading_factor as i32) / CAD_PROCESSING_CLOCK_HZ,
    }
}

/// Sleep time after a transmission: the fixed period when configured,
/// otherwise the remainder of the 1% duty cycle window (`TOA/0.01 − TOA`).
pub fn sleep_duration(period_s: Option<f64>, time_on_air_s: f64) -> f64 {
    match period_s {
        Some(period) => period,
        None => time_on_air_s / DUTY_CYCLE - time_on_air_s,
    }
}

fn energy(current_a: f64, voltage_v: f64, duration_s: f64) -> f64 {
    current_a * voltage_v * duration_s * ENERGY_CONVERSION_FACTOR
}

/// TX supply current in amperes for a transmit power.
pub fn tx_current_a(energy_config: &EnergyConfig, tx_power_dbm: i32) -> Result<f64, SimulationError> {
    let index = tx_power_dbm - MIN_TX_POWER_DBM;
    if index < 0 {
        return Err(SimulationError::InvalidTxPower { tx_power_dbm });
    }
    energy_config
        .tx_current_ma_table
        .get(index as usize)
        .map(|ma| ma / 1000.0)
        .ok_or(SimulationError::InvalidTxPower { tx_power_dbm })
}

/// Battery drawn by one transmission.
///
/// # Parameters
///
/// * `energy_config` - Supply voltage and the TX current table
/// * `tx_power_dbm` - Transmit power, used to look up the TX current
/// * `time_on_air_s` - Airtime of the packet in seconds
///
/// # Returns
///
/// The cost in battery units (`I·V·s·0.000278`), or `InvalidTxPower` when the
/// power has no entry in the table.
pub fn energy_cost_tx(energy_config: &EnergyConfig, tx_power_dbm: i32, time_on_air_s: f64) -> Result<f64, SimulationError> {
    let current = tx_current_a(energy_config, tx_power_dbm)?;
    Ok(energy(current, energy_config.voltage_v, time_on_air_s))
}

/// Battery drawn while receiving a packet of the given airtime.
pub fn energy_cost_rx(energy_config: &EnergyConfig, time_on_air_s: f64) -> f64 {
    energy(energy_config.rx_current_a, energy_config.voltage_v, time_on_air_s)
}

/// Battery drawn while sleeping for `sleep_s` seconds.
pub fn energy_cost_sleep(energy_config: &EnergyConfig, sleep_s: f64) -> f64 {
    energy(energy_config.sleep_current_a, energy_config.voltage_v, sleep_s)
}

/// CAD cost: receiver part at the full CAD current, processing part at half of it.
pub fn energy_cost_cad(energy_config: &EnergyConfig, cad: &CadDuration) -> f64 {
    energy(energy_config.cad_current_a, energy_config.voltage_v, cad.rx_mode_s)
        + energy(energy_config.cad_current_a / 2.0, energy_config.voltage_v, cad.processing_s)
}

impl Beacon {
    /// Beacon descriptor for the given modulation. Sensitivity and airtime are
    /// derived once and never change afterwards.
    pub fn new(lora: &LoraParameters, payload_len: usize, noise_figure_db: f64) -> Self {
        Self {
            payload_len,
            spreading_factor: lora.spreading_factor,
            coding_rate: lora.coding_rate,
            bandwidth_hz: lora.bandwidth_hz,
            sensitivity_dbm: receiver_sensitivity(lora.bandwidth_hz, lora.spreading_factor, noise_figure_db),
            time_on_air_s: time_on_air(lora, payload_len),
        }
    }
}

impl Packet {
    pub fn new(packet_id: u64, origin: u32, lora: &LoraParameters, payload_len: usize, tx_power_dbm: i32, noise_figure_db: f64) -> Self {
        let sensitivity_dbm = receiver_sensitivity(lora.bandwidth_hz, lora.spreading_factor, noise_figure_db);
        Self {
            packet_id,
            origin,
            payload_len,
            spreading_factor: lora.spreading_factor,
            coding_rate: lora.coding_rate,
            bandwidth_hz: lora.bandwidth_hz,
            implicit_header: lora.implicit_header,
            low_data_rate_optimization: lora.low_data_rate_optimization,
            bit_rate: bit_rate(lora),
            payload_symbols: payload_symbols(lora, payload_len),
            time_on_air_s: time_on_air(lora, payload_len),
            sensitivity_dbm,
            link_budget_db: tx_power_dbm as f64 - sensitivity_dbm,
        }
    }

    /// CAD window a receiver spends detecting this packet.
    pub fn cad_duration(&self) -> CadDuration {
        cad_duration(self.spreading_factor, self.bandwidth_hz)
    }
}
