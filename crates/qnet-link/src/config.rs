//! Link hardware parameters

use serde::{Deserialize, Serialize};

use qnet_core::SimTime;

/// Hardware parameters of a node's entanglement generation equipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Maximum attempts per second (recorded, not enforced)
    pub attempt_rate: f64,
    /// Fiber attenuation in dB/km
    pub alpha_db_per_km: f64,
    /// Source efficiency
    pub eta_s: f64,
    /// Detector efficiency
    pub eta_d: f64,
    /// Source repetition frequency in Hz
    pub frequency: f64,
    /// Local photon emission/absorption delay in seconds
    pub tau_0: f64,
    /// Fidelity of freshly generated pairs
    pub init_fidelity: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            attempt_rate: 1e6,
            alpha_db_per_km: 0.2,
            eta_s: 1.0,
            eta_d: 1.0,
            frequency: 80e6,
            tau_0: 0.0,
            init_fidelity: 0.99,
        }
    }
}

impl LinkConfig {
    /// Lossless fiber and perfect pairs
    ///
    /// Every attempt succeeds, which makes generation timing deterministic.
    pub fn ideal() -> Self {
        Self { alpha_db_per_km: 0.0, init_fidelity: 1.0, ..Self::default() }
    }

    /// Lossier hardware: half-efficient source and detectors
    pub fn lossy() -> Self {
        Self { eta_s: 0.5, eta_d: 0.5, init_fidelity: 0.95, ..Self::default() }
    }

    pub fn with_init_fidelity(mut self, fidelity: f64) -> Self {
        self.init_fidelity = fidelity;
        self
    }

    /// Minimum time between two photon emissions
    pub fn reset_time(&self) -> SimTime {
        SimTime::from_secs_f64(1.0 / self.frequency)
    }

    pub fn tau_0_time(&self) -> SimTime {
        SimTime::from_secs_f64(self.tau_0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reset_time() {
        let config = LinkConfig::default();
        assert_eq!(config.reset_time(), SimTime::from_ps(12_500));
        assert_eq!(config.tau_0_time(), SimTime::ZERO);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LinkConfig = serde_json::from_str(r#"{"init_fidelity": 0.9}"#).unwrap();
        assert_eq!(config.init_fidelity, 0.9);
        assert_eq!(config.frequency, 80e6);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LinkConfig::ideal().alpha_db_per_km, 0.0);
        assert!(LinkConfig::lossy().eta_s < LinkConfig::default().eta_s);
    }
}
