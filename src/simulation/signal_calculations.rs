//! Radio signal calculations.
//!
//! Contains helpers for:
//! - Free-space path loss and received power
//! - The connectivity verdict (sensitivity floor plus the hard range cap)
//! - The physical range implied by the link budget
//! - A normalised link quality for snapshots
//!
//! Units:
//! - Power: dBm
//! - Distance: meters in the physical model; world units are converted by the
//!   caller using `meters_per_unit`
//! - Frequency: MHz

use super::types::RadioParameters;

/// Hard link range cap in meters. Evaluated independently of the sensitivity
/// check and, with the default radio parameters, the one that bounds the mesh.
pub const MAX_LINK_DISTANCE_M: f64 = 1000.0;

/// FSPL constant for distance in km and frequency in MHz.
const FSPL_CONSTANT_DB: f64 = 32.44;

/// Distances are clamped to this floor (in km) before taking the logarithm.
const MIN_DISTANCE_KM: f64 = 1e-6;

/// Result of evaluating one link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkBudget {
    pub path_loss_db: f64,
    pub received_power_dbm: f64,
    pub connected: bool,
}

/// Free-space path loss (in dB) at `distance_m` meters.
///
/// # Formula
///
/// ```text
/// FSPL(dB) = 20 × log₁₀(d_km) + 20 × log₁₀(f_MHz) + 32.44
/// ```
///
/// Zero and sub-millimeter distances are clamped to `MIN_DISTANCE_KM` so the
/// result stays finite; such links are always well within range.
pub fn calculate_free_space_path_loss(distance_m: f64, frequency_mhz: f64) -> f64 {
    let distance_km = (distance_m / 1000.0).max(MIN_DISTANCE_KM);
    20.0 * distance_km.log10() + 20.0 * frequency_mhz.log10() + FSPL_CONSTANT_DB
}

/// Received power in dBm: `P_tx - FSPL(d)`.
pub fn calculate_received_power(distance_m: f64, tx_power_dbm: f64, frequency_mhz: f64) -> f64 {
    tx_power_dbm - calculate_free_space_path_loss(distance_m, frequency_mhz)
}

/// Evaluate a link: received power and the connectivity verdict.
///
/// A link exists when the distance is within `MAX_LINK_DISTANCE_M` AND the
/// received power reaches the receiver sensitivity. Both checks are needed:
/// the cap governs with the default parameters, the sensitivity floor governs
/// for weak transmitters.
pub fn connectivity(distance_m: f64, tx_power_dbm: f64, sensitivity_dbm: f64, frequency_mhz: f64) -> LinkBudget {
    let path_loss_db = calculate_free_space_path_loss(distance_m, frequency_mhz);
    let received_power_dbm = tx_power_dbm - path_loss_db;
    let connected = distance_m <= MAX_LINK_DISTANCE_M && received_power_dbm >= sensitivity_dbm;
    LinkBudget {
        path_loss_db,
        received_power_dbm,
        connected,
    }
}

/// Same as [`connectivity`] with the parameters taken from `radio`.
pub fn evaluate_link(distance_m: f64, radio: &RadioParameters) -> LinkBudget {
    connectivity(distance_m, radio.transmit_power_dbm, radio.sensitivity_dbm, radio.frequency_mhz)
}

// Solve FSPL for the distance where the received power equals the sensitivity:
//   P_tx - (20 log10 d_km + 20 log10 f + 32.44) = S
//   d_km = 10^((P_tx - S - 20 log10 f - 32.44) / 20)
/// Physical range in meters permitted by the link budget alone, ignoring the
/// hard cap. With 14 dBm, -110 dBm and 868.7 MHz this is roughly 43.6 km.
pub fn calculate_max_sensitivity_range(radio: &RadioParameters) -> f64 {
    let exponent = (radio.transmit_power_dbm - radio.sensitivity_dbm - 20.0 * radio.frequency_mhz.log10() - FSPL_CONSTANT_DB) / 20.0;
    10.0_f64.powf(exponent) * 1000.0
}

/// Link strength normalised to `0.0..=1.0` between the receiver sensitivity
/// and the transmit power, as reported per link in snapshots.
pub fn link_quality(received_power_dbm: f64, radio: &RadioParameters) -> f64 {
    let span = radio.transmit_power_dbm - radio.sensitivity_dbm;
    if span <= 0.0 {
        return 0.0;
    }
    ((received_power_dbm - radio.sensitivity_dbm) / span).clamp(0.0, 1.0)
}
