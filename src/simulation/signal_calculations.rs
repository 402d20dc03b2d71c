//! Radio propagation calculations.
//!
//! Contains helpers for:
//! - Free-space path loss and linear atmospheric attenuation
//! - RSSI between two positioned endpoints
//! - SNR thresholds and receiver sensitivity
//!
//! Units:
//! - Power: dBm
//! - Distance: meters (the path loss formula works in kilometers internally)
//! - Frequency: MHz

use super::error::SimulationError;
use super::geometry::distance;
use super::types::RadioEndpoint;

/// Thermal noise density at room temperature (dBm/Hz).
pub const THERMAL_NOISE_DBM_PER_HZ: f64 = -174.0;

/// Constant term of the free-space path loss formula with d in km and f in MHz.
const FSPL_CONSTANT_DB: f64 = 32.45;

/// SNR demodulation floor for SF7..=SF12, indexed by `sf - 7`.
pub const SNR_LIMITS_DB: [f64; 6] = [-7.5, -10.0, -12.5, -15.0, -17.5, -20.0];

/// Parameters defining the radio channel propagation model.
#[derive(Debug, Clone, Copy)]
pub struct PathLossParameters {
    /// Additional loss per meter of air (dB/m), applied linearly.
    pub air_attenuation_db_per_m: f64,
}

/// Free-space path loss in dB.
///
/// # Formula
///
/// ```text
/// FSPL = 20 × log₁₀(d / 1000) + 20 × log₁₀(f) + 32.45
/// ```
///
/// with `d` in meters and `f` in MHz.
///
/// # Errors
///
/// `NonPositiveDistance` when `distance_m <= 0`, where the logarithm is undefined.
/// Callers must never evaluate the loss from an endpoint to itself.
pub fn free_space_loss(distance_m: f64, frequency_mhz: f64) -> Result<f64, SimulationError> {
    if !(distance_m > 0.0) {
        return Err(SimulationError::NonPositiveDistance { distance: distance_m });
    }
    Ok(20.0 * (distance_m / 1000.0).log10() + 20.0 * frequency_mhz.log10() + FSPL_CONSTANT_DB)
}

/// Atmospheric attenuation, linear in distance.
pub fn atmospheric_attenuation(distance_m: f64, attenuation_db_per_m: f64) -> f64 {
    distance_m * attenuation_db_per_m
}

/// Received power at `distance_m` from a transmitter of `tx_power_dbm`.
///
/// Formula: RSSI(dBm) = P_tx(dBm) - FSPL(dB) - attenuation(dB)
pub fn received_power(tx_power_dbm: f64, distance_m: f64, frequency_mhz: f64, params: &PathLossParameters) -> Result<f64, SimulationError> {
    let path_loss = free_space_loss(distance_m, frequency_mhz)?;
    Ok(tx_power_dbm - path_loss - atmospheric_attenuation(distance_m, params.air_attenuation_db_per_m))
}

/// RSSI of `sender` as heard by `receiver`, together with their distance.
///
/// Side-effect free. The carrier frequency of the sender is used.
pub fn rssi(sender: &dyn RadioEndpoint, receiver: &dyn RadioEndpoint, params: &PathLossParameters) -> Result<(f64, f64), SimulationError> {
    if sender.endpoint_id() == receiver.endpoint_id() {
        return Err(SimulationError::SelfLink(sender.endpoint_id()));
    }
    let d = distance(sender.position(), receiver.position());
    let power = received_power(sender.tx_power_dbm() as f64, d, sender.frequency_mhz(), params)?;
    Ok((power, d))
}

/// Minimum SNR (dB) the demodulator needs at a spreading factor.
pub fn snr_limit(spreading_factor: u8) -> f64 {
    match spreading_factor {
        7..=12 => SNR_LIMITS_DB[(spreading_factor - 7) as usize],
        _ => -20.0, // Default to the worst case if SF is out of range
    }
}

/// Receiver sensitivity in dBm.
///
/// ```text
/// S = -174 + 10 × log₁₀(BW) + SNR(SF) + NF
/// ```
pub fn receiver_sensitivity(bandwidth_hz: u32, spreading_factor: u8, noise_figure_db: f64) -> f64 {
    THERMAL_NOISE_DBM_PER_HZ + 10.0 * (bandwidth_hz as f64).log10() + snr_limit(spreading_factor) + noise_figure_db
}
