//! Tuning policy configuration.
//!
//! Every empirically-derived threshold, tolerance, and timeout the engine
//! uses lives here, named and overridable. Defaults reflect a domestic
//! heater-driven chamber with a roughly one-second sample cadence.

use serde::{Deserialize, Serialize};

/// Core tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    // --- Sample buffer ---
    /// Maximum samples retained per session (oldest evicted first).
    pub max_samples: usize,

    // --- Comfort band (skip stabilization at start) ---
    /// Lowest current temperature eligible for skipping stabilization (C).
    pub comfort_min_c: f32,
    /// Highest current temperature eligible for skipping stabilization (C).
    pub comfort_max_c: f32,
    /// Skip when within this distance of the requested base (C).
    pub comfort_close_band_c: f32,
    /// Skip when above base by no more than this (C).
    pub comfort_above_band_c: f32,
    /// Skip when within this general distance of base (C).
    pub comfort_general_band_c: f32,

    // --- Stabilization (tolerances relax as the wait drags on) ---
    /// Error tolerance for the first two minutes (C).
    pub stabilize_tolerance_c: f32,
    /// Tolerance after two minutes (C).
    pub stabilize_tolerance_2min_c: f32,
    /// Tolerance after four minutes (C).
    pub stabilize_tolerance_4min_c: f32,
    /// Minimum wait before declaring stable, first two minutes (s).
    pub stabilize_min_secs: f32,
    /// Minimum wait after two minutes (s).
    pub stabilize_min_2min_secs: f32,
    /// Minimum wait after four minutes (s).
    pub stabilize_min_4min_secs: f32,
    /// Emit a slow-stabilization warning after this long (s).
    pub stabilize_warn_secs: f32,
    /// Abort with a stabilization timeout after this long (s).
    pub stabilize_timeout_secs: f32,

    // --- Step-response strategy ---
    /// Default setpoint step when the caller does not supply one (C).
    pub default_step_size_c: f32,
    /// Observation window after the step (s).
    pub step_window_secs: f32,
    /// Minimum samples inside the window for a valid analysis.
    pub min_step_samples: usize,

    // --- Ultimate-gain: characterization ---
    /// Proportional-only probe gain during characterization.
    pub characterization_kp: f32,
    /// Setpoint step above base during characterization (C).
    pub characterization_step_c: f32,
    /// Rise fraction of expected that ends characterization early.
    pub characterization_rise_ratio: f32,
    /// Minimum characterization duration before the time-based exit (s).
    pub characterization_min_secs: f32,
    /// Hard characterization timeout (s).
    pub characterization_timeout_secs: f32,
    /// Minimum samples required to characterize.
    pub min_characterization_samples: usize,
    /// Settle pause between characterization and the first burst (s).
    pub post_characterization_settle_secs: f32,

    // --- Ultimate-gain: burst cycles ---
    /// Setpoint step above base for each heating burst (C).
    pub burst_step_c: f32,
    /// Fraction of the burst rise treated as "target reached".
    pub target_rise_ratio: f32,
    /// Fraction of the burst rise treated as overshoot.
    pub overshoot_rise_ratio: f32,
    /// Mean recent output below this means the plant is coasting.
    pub low_output_threshold: f32,
    /// Heating burst hard timeout (s).
    pub heating_timeout_secs: f32,
    /// Fraction of the peak rise that must decay before the next burst.
    pub cooling_drop_ratio: f32,
    /// Cap on the adaptive cooling timeout (s).
    pub cooling_timeout_cap_secs: f32,
    /// Probe gain ceiling; reaching it ends the search unsuccessfully.
    pub max_kp: f32,
    /// Completed-cycle ceiling; reaching it ends the search unsuccessfully.
    pub max_test_cycles: u32,
    /// Whole-search hard timeout (s).
    pub search_timeout_secs: f32,

    // --- Thermal inertia detection ---
    /// Instantaneous output below this counts as "heater stopped".
    pub inertia_low_output: f32,
    /// Mean recent output below this counts as "heater stopped".
    pub inertia_avg_low_output: f32,
    /// Consecutive low-output samples required to begin monitoring.
    pub inertia_consecutive_samples: u32,
    /// Post-stop monitoring hard timeout (s).
    pub inertia_monitor_timeout_secs: f32,
    /// Post-stop rise confirming significant inertia (C).
    pub inertia_confirm_rise_c: f32,

    // --- Plant parameter writes ---
    /// Controller sample period used for every tuning-time write (ms).
    pub pid_sample_time_ms: u32,
    /// Time-proportioning window used for every tuning-time write (ms).
    pub pid_window_ms: u32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            // Sample buffer
            max_samples: 4096,

            // Comfort band
            comfort_min_c: 25.0,
            comfort_max_c: 80.0,
            comfort_close_band_c: 2.0,
            comfort_above_band_c: 15.0,
            comfort_general_band_c: 10.0,

            // Stabilization
            stabilize_tolerance_c: 0.5,
            stabilize_tolerance_2min_c: 1.0,
            stabilize_tolerance_4min_c: 1.5,
            stabilize_min_secs: 30.0,
            stabilize_min_2min_secs: 20.0,
            stabilize_min_4min_secs: 15.0,
            stabilize_warn_secs: 300.0,
            stabilize_timeout_secs: 600.0,

            // Step response
            default_step_size_c: 5.0,
            step_window_secs: 120.0,
            min_step_samples: 20,

            // Characterization
            characterization_kp: 2.0,
            characterization_step_c: 5.0,
            characterization_rise_ratio: 0.8,
            characterization_min_secs: 60.0,
            characterization_timeout_secs: 180.0,
            min_characterization_samples: 10,
            post_characterization_settle_secs: 5.0,

            // Burst cycles
            burst_step_c: 3.0,
            target_rise_ratio: 0.95,
            overshoot_rise_ratio: 1.15,
            low_output_threshold: 0.3,
            heating_timeout_secs: 120.0,
            cooling_drop_ratio: 0.75,
            cooling_timeout_cap_secs: 240.0,
            max_kp: 20.0,
            max_test_cycles: 15,
            search_timeout_secs: 1800.0,

            // Inertia detection
            inertia_low_output: 0.25,
            inertia_avg_low_output: 0.2,
            inertia_consecutive_samples: 3,
            inertia_monitor_timeout_secs: 180.0,
            inertia_confirm_rise_c: 0.8,

            // Plant parameter writes
            pid_sample_time_ms: 1000,
            pid_window_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = TunerConfig::default();
        assert!(c.max_samples > 0);
        assert!(c.comfort_min_c < c.comfort_max_c);
        assert!(c.stabilize_warn_secs < c.stabilize_timeout_secs);
        assert!(c.step_window_secs > 0.0);
        assert!(c.min_step_samples > 0);
        assert!(c.characterization_min_secs < c.characterization_timeout_secs);
        assert!(c.max_kp > c.characterization_kp);
        assert!(c.max_test_cycles > 0);
        assert!(c.pid_sample_time_ms > 0);
        assert!(c.pid_window_ms > c.pid_sample_time_ms);
    }

    #[test]
    fn stabilization_tolerances_relax_over_time() {
        let c = TunerConfig::default();
        assert!(c.stabilize_tolerance_c < c.stabilize_tolerance_2min_c);
        assert!(c.stabilize_tolerance_2min_c < c.stabilize_tolerance_4min_c);
        assert!(c.stabilize_min_secs > c.stabilize_min_2min_secs);
        assert!(c.stabilize_min_2min_secs > c.stabilize_min_4min_secs);
    }

    #[test]
    fn rise_ratios_bracket_the_target() {
        let c = TunerConfig::default();
        assert!(c.target_rise_ratio < 1.0);
        assert!(c.overshoot_rise_ratio > 1.0);
        assert!(c.characterization_rise_ratio > 0.0 && c.characterization_rise_ratio < 1.0);
        assert!(c.cooling_drop_ratio > 0.0 && c.cooling_drop_ratio < 1.0);
    }

    #[test]
    fn serde_roundtrip() {
        let c = TunerConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: TunerConfig = serde_json::from_str(&json).unwrap();
        assert!((c.stabilize_tolerance_c - c2.stabilize_tolerance_c).abs() < 0.001);
        assert_eq!(c.max_test_cycles, c2.max_test_cycles);
        assert_eq!(c.pid_window_ms, c2.pid_window_ms);
    }
}
