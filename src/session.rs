//! Session state: phases, status, results, and the blackboard the
//! orchestrator and strategies share.

use crate::config::TunerConfig;
use crate::ports::RawPidParams;
use crate::sample::SampleBuffer;
use crate::strategy::StrategyState;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Stabilizing,
    Active,
    Analysis,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Stabilizing => "stabilizing",
            Self::Active => "active",
            Self::Analysis => "analysis",
        }
    }
}

/// Which experiment the session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuneMethod {
    StepResponse,
    UltimateGain,
}

impl TuneMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepResponse => "step-response",
            Self::UltimateGain => "ultimate-gain",
        }
    }
}

// ---------------------------------------------------------------------------
// Status and results
// ---------------------------------------------------------------------------

/// Point-in-time progress snapshot for UIs.
#[derive(Debug, Clone, PartialEq)]
pub struct TuneStatus {
    pub phase: Phase,
    pub method: Option<TuneMethod>,
    /// Coarse progress, 0..=100.
    pub progress_percent: u8,
    /// Human-readable description of what the engine is doing.
    pub message: String,
    /// Finer-grained detail (cycle number, burst phase, probe gain).
    pub stage_detail: String,
}

impl Default for TuneStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            method: None,
            progress_percent: 0,
            message: String::new(),
            stage_detail: String::new(),
        }
    }
}

/// Mutable status line strategies write into each tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StatusLine {
    pub progress: u8,
    pub message: String,
    pub detail: String,
}

/// Per-method measurement summary attached to a result. Fields not
/// produced by the method that ran stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuneCharacteristics {
    pub rise_time_secs: Option<f32>,
    pub overshoot_percent: Option<f32>,
    pub settling_time_secs: Option<f32>,
    pub actual_step_c: Option<f32>,
    pub expected_step_c: Option<f32>,
    pub critical_gain: Option<f32>,
    pub compensated_gain: Option<f32>,
    pub system_kind: Option<String>,
    pub responsiveness: Option<String>,
    pub inertia_severity: Option<String>,
    pub inertia_rise_c: Option<f32>,
    pub inertia_lag_secs: Option<f32>,
}

/// Final output of a successful session. The gains have already been
/// applied to the plant when this is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningResult {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Human-readable name of the synthesis path taken.
    pub method: String,
    pub characteristics: TuneCharacteristics,
}

// ---------------------------------------------------------------------------
// Plant command batch
// ---------------------------------------------------------------------------

/// A deferred plant command. Strategies queue these; the orchestrator
/// applies them and owns the retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PlantCommand {
    Setpoint(f32),
    ManualMode(bool),
    RawParams(RawPidParams),
}

impl PlantCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Setpoint(_) => "set_setpoint",
            Self::ManualMode(_) => "set_manual_mode",
            Self::RawParams(_) => "set_raw_pid_params",
        }
    }
}

// ---------------------------------------------------------------------------
// The session itself
// ---------------------------------------------------------------------------

/// All state owned by one tuning run. Dropped wholesale on stop, so no
/// stale state can leak between sessions.
#[derive(Debug)]
pub(crate) struct TuningSession {
    pub method: TuneMethod,
    /// Base temperature the experiment regulates around (C). May differ
    /// from the requested base when the comfort band adopted the current
    /// temperature.
    pub base_temperature: f32,
    pub skipped_stabilization: bool,
    pub phase: Phase,
    /// Wall-clock seconds of the first sample; all sample times are
    /// relative to this.
    pub start_time: Option<f32>,
    pub samples: SampleBuffer,
    /// Commands strategies queued this tick.
    pub commands: heapless::Vec<PlantCommand, 4>,
    /// Commands that failed and should be re-issued next tick. Sized for
    /// a full tick's batch on top of carried retries.
    pub pending_retry: heapless::Vec<PlantCommand, 8>,
    pub status: StatusLine,
    pub strategy: StrategyState,
    /// Strategy begin() has run (issued its first commands).
    pub strategy_begun: bool,
    /// Slow-stabilization warning already emitted.
    pub warned_slow_stabilization: bool,
}

impl TuningSession {
    pub fn new(
        cfg: &TunerConfig,
        method: TuneMethod,
        base_temperature: f32,
        skipped_stabilization: bool,
        strategy: StrategyState,
    ) -> Self {
        Self {
            method,
            base_temperature,
            skipped_stabilization,
            phase: if skipped_stabilization {
                Phase::Active
            } else {
                Phase::Stabilizing
            },
            start_time: None,
            samples: SampleBuffer::new(cfg.max_samples),
            commands: heapless::Vec::new(),
            pending_retry: heapless::Vec::new(),
            status: StatusLine::default(),
            strategy,
            strategy_begun: false,
            warned_slow_stabilization: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serde_roundtrip() {
        let r = TuningResult {
            kp: 1.5,
            ki: 0.2,
            kd: 0.05,
            method: "ultimate-gain".into(),
            characteristics: TuneCharacteristics {
                critical_gain: Some(3.0),
                compensated_gain: Some(2.4),
                overshoot_percent: Some(9.5),
                inertia_severity: Some("medium".into()),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&r).unwrap();
        let r2: TuningResult = serde_json::from_str(&json).unwrap();
        assert_eq!(r, r2);
    }

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(Phase::Idle.as_str(), "idle");
        assert_eq!(Phase::Stabilizing.as_str(), "stabilizing");
        assert_eq!(Phase::Active.as_str(), "active");
        assert_eq!(Phase::Analysis.as_str(), "analysis");
    }
}
