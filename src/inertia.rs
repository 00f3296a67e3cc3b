//! Thermal inertia detection and compensation.
//!
//! Chambers with heavy thermal mass keep rising after the heater stops.
//! During a heating burst the detector waits for the heater to coast,
//! then measures how far the temperature drifts on its own. A confirmed
//! drift yields an [`InertiaProfile`] that shifts burst thresholds earlier
//! and softens the synthesized gains.

use crate::config::TunerConfig;

// Post-stop drift above this is "still rising".
const STILL_RISING_C: f32 = 0.3;
// Drift below this after the stall window means the peak has passed.
const STALL_RISE_C: f32 = 0.2;
const STALL_AFTER_SECS: f32 = 30.0;
// The peak is taken as found after this long regardless of drift.
const PEAK_WINDOW_SECS: f32 = 90.0;
// Setpoint pull-down commanded when monitoring begins (C).
const MONITOR_PULLDOWN_C: f32 = 2.0;

/// Severity buckets over the post-stop rise. Total and non-overlapping:
/// every finite non-negative rise maps to exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InertiaSeverity {
    Minimal,
    Low,
    Medium,
    High,
}

impl InertiaSeverity {
    /// Classify a post-stop temperature rise (degrees C).
    pub fn for_rise(rise_c: f32) -> Self {
        if rise_c > 2.1 {
            Self::High
        } else if rise_c > 0.9 {
            Self::Medium
        } else if rise_c > 0.8 {
            Self::Low
        } else {
            Self::Minimal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Fraction knocked off the critical gain during synthesis.
    pub fn kp_reduction(self) -> f32 {
        match self {
            Self::High => 0.4,
            Self::Medium => 0.25,
            Self::Low => 0.15,
            Self::Minimal => 0.05,
        }
    }

    /// Integral-gain scale applied after the formula stage.
    pub fn ki_scale(self) -> f32 {
        match self {
            Self::High => 0.4,
            Self::Medium => 0.7,
            Self::Low => 0.85,
            Self::Minimal => 0.8,
        }
    }

    /// Derivative-gain scale applied after the formula stage.
    pub fn kd_scale(self) -> f32 {
        match self {
            Self::High => 1.3,
            Self::Medium => 1.15,
            Self::Low => 1.05,
            Self::Minimal => 1.1,
        }
    }

    /// Ceiling on how much earlier burst thresholds may trip.
    pub fn anticipation_cap(self) -> f32 {
        match self {
            Self::High => 0.30,
            Self::Medium => 0.20,
            Self::Low => 0.10,
            Self::Minimal => 0.0,
        }
    }

    /// Scale on the measured-rise anticipation term.
    pub fn anticipation_multiplier(self) -> f32 {
        match self {
            Self::High => 1.5,
            Self::Medium => 1.2,
            Self::Low => 1.0,
            Self::Minimal => 0.8,
        }
    }
}

/// Measured inertia for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertiaProfile {
    /// Seconds from heater stop to the drift peak.
    pub lag_time_secs: f32,
    /// Total drift above the stop temperature (C).
    pub rise_after_stop_c: f32,
    pub severity: InertiaSeverity,
    /// Compensation strength, 0.0 ..= 0.9.
    pub compensation_factor: f32,
}

impl InertiaProfile {
    pub fn from_measurement(rise_c: f32, lag_secs: f32) -> Self {
        let normalized = (rise_c / 3.0).min(1.0);
        Self {
            lag_time_secs: lag_secs,
            rise_after_stop_c: rise_c,
            severity: InertiaSeverity::for_rise(rise_c),
            compensation_factor: (0.6 * normalized).min(0.9),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum DetectState {
    /// Waiting for the heater to coast during a heating burst.
    Watching { consecutive_low: u32 },
    /// Heater stopped; measuring the drift.
    MonitoringRise {
        stop_time: f32,
        stop_temp: f32,
        peak_temp: f32,
        peak_time: f32,
    },
    /// Measurement taken (or dismissed); never re-arms this session.
    Done,
}

/// What the strategy should do after feeding the detector a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorAction {
    /// Not monitoring; run the burst logic as usual.
    Inactive,
    /// Monitoring just began; command the given setpoint and hold.
    BeginMonitoring { setpoint: f32 },
    /// Mid-measurement; hold off on burst transitions.
    Monitoring { rise_c: f32 },
    /// Measurement finished. `None` means no significant inertia.
    Concluded(Option<InertiaProfile>),
}

/// Single-shot drift detector. Runs at most one measurement per session.
#[derive(Debug, Clone)]
pub struct InertiaDetector {
    state: DetectState,
}

impl InertiaDetector {
    pub fn new() -> Self {
        Self {
            state: DetectState::Watching { consecutive_low: 0 },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, DetectState::Done)
    }

    /// Advance the detector with the current sample.
    ///
    /// `recent_avg_output` is the mean output over the last few samples;
    /// `burst_start_temp` floors the monitoring setpoint pull-down.
    pub fn update(
        &mut self,
        cfg: &TunerConfig,
        elapsed: f32,
        temperature: f32,
        output: f32,
        recent_avg_output: f32,
        burst_start_temp: f32,
    ) -> DetectorAction {
        match self.state {
            DetectState::Done => DetectorAction::Inactive,

            DetectState::Watching { consecutive_low } => {
                let coasting =
                    output < cfg.inertia_low_output && recent_avg_output < cfg.inertia_avg_low_output;
                let consecutive_low = if coasting { consecutive_low + 1 } else { 0 };

                if coasting && consecutive_low >= cfg.inertia_consecutive_samples {
                    self.state = DetectState::MonitoringRise {
                        stop_time: elapsed,
                        stop_temp: temperature,
                        peak_temp: temperature,
                        peak_time: elapsed,
                    };
                    // Pull the setpoint down so the plant cannot mask the
                    // drift by re-heating.
                    let setpoint = (temperature - MONITOR_PULLDOWN_C).max(burst_start_temp);
                    DetectorAction::BeginMonitoring { setpoint }
                } else {
                    self.state = DetectState::Watching { consecutive_low };
                    DetectorAction::Inactive
                }
            }

            DetectState::MonitoringRise {
                stop_time,
                stop_temp,
                mut peak_temp,
                mut peak_time,
            } => {
                if temperature > peak_temp {
                    peak_temp = temperature;
                    peak_time = elapsed;
                }
                let rise = temperature - stop_temp;
                let since_stop = elapsed - stop_time;

                if rise > STILL_RISING_C && since_stop < cfg.inertia_monitor_timeout_secs {
                    self.state = DetectState::MonitoringRise {
                        stop_time,
                        stop_temp,
                        peak_temp,
                        peak_time,
                    };
                    DetectorAction::Monitoring { rise_c: rise }
                } else if since_stop > PEAK_WINDOW_SECS
                    || (rise < STALL_RISE_C && since_stop > STALL_AFTER_SECS)
                {
                    self.state = DetectState::Done;
                    let total_rise = peak_temp - stop_temp;
                    let profile = if total_rise > cfg.inertia_confirm_rise_c {
                        Some(InertiaProfile::from_measurement(
                            total_rise,
                            peak_time - stop_time,
                        ))
                    } else {
                        None
                    };
                    DetectorAction::Concluded(profile)
                } else {
                    self.state = DetectState::MonitoringRise {
                        stop_time,
                        stop_temp,
                        peak_temp,
                        peak_time,
                    };
                    DetectorAction::Monitoring { rise_c: rise }
                }
            }
        }
    }
}

impl Default for InertiaDetector {
    fn default() -> Self {
        Self::new()
    }
}
