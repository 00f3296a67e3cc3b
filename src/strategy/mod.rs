//! Tuning strategies and the machinery they share.
//!
//! Strategies never touch the plant directly: each tick they read the
//! sample history and write desired commands into a batch the orchestrator
//! applies afterwards. That keeps every strategy a pure state machine the
//! tests can drive sample by sample.

pub mod step;
pub mod ultimate;

use crate::config::TunerConfig;
use crate::error::TuneError;
use crate::inertia::InertiaProfile;
use crate::sample::{Sample, SampleBuffer};
use crate::session::{PlantCommand, StatusLine};
use crate::synth::StepAnalysis;

// ---------------------------------------------------------------------------
// Per-tick context handed to a strategy
// ---------------------------------------------------------------------------

/// Everything a strategy may read or write during one sample tick.
pub struct StrategyCtx<'a> {
    pub cfg: &'a TunerConfig,
    /// Effective base temperature of the session (C).
    pub base: f32,
    /// Seconds since the session's first sample.
    pub elapsed: f32,
    /// The sample that triggered this tick (already in `samples`).
    pub sample: Sample,
    pub samples: &'a SampleBuffer,
    /// Plant commands to apply after the tick.
    pub commands: &'a mut heapless::Vec<PlantCommand, 4>,
    pub status: &'a mut StatusLine,
}

impl StrategyCtx<'_> {
    /// Queue a plant command for the orchestrator to apply.
    pub fn command(&mut self, cmd: PlantCommand) {
        if self.commands.push(cmd).is_err() {
            log::warn!("command batch full, dropping command");
        }
    }

    pub fn progress(&mut self, percent: u8, message: String) {
        self.status.progress = percent;
        self.status.message = message;
    }
}

// ---------------------------------------------------------------------------
// Strategy results
// ---------------------------------------------------------------------------

/// Measurements handed to the gain synthesizer when a strategy finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutput {
    Step(StepAnalysis),
    Ultimate {
        critical_kp: f32,
        final_metrics: ultimate::ResponseMetrics,
        inertia: Option<InertiaProfile>,
        system_kind: Option<crate::characterize::SystemKind>,
        responsiveness: Option<crate::characterize::Responsiveness>,
    },
}

/// What a strategy tick decided.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// Keep feeding samples.
    Continue,
    /// Experiment complete; synthesize gains from this.
    Finished(AnalysisOutput),
    /// Experiment failed; tear the session down.
    Failed(TuneError),
}

/// Which strategy a session is running.
#[derive(Debug)]
pub enum StrategyState {
    Step(step::StepState),
    Ultimate(Box<ultimate::UltimateState>),
}

// ---------------------------------------------------------------------------
// Shared stabilization policy
// ---------------------------------------------------------------------------

/// Verdict of one stabilization-phase tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StabilizationCheck {
    /// Error inside tolerance for long enough; the experiment may begin.
    Stable,
    /// Keep waiting. Carries the tolerance currently in force, for status.
    Waiting { tolerance: f32 },
    /// The plant never settled.
    TimedOut,
}

/// Escalating stabilization check: the tolerance widens and the minimum
/// wait shrinks as the wait drags on, trading precision for liveness.
pub fn check_stabilization(cfg: &TunerConfig, elapsed: f32, error_c: f32) -> StabilizationCheck {
    if elapsed > cfg.stabilize_timeout_secs {
        return StabilizationCheck::TimedOut;
    }
    let (tolerance, min_wait) = if elapsed > 240.0 {
        (cfg.stabilize_tolerance_4min_c, cfg.stabilize_min_4min_secs)
    } else if elapsed > 120.0 {
        (cfg.stabilize_tolerance_2min_c, cfg.stabilize_min_2min_secs)
    } else {
        (cfg.stabilize_tolerance_c, cfg.stabilize_min_secs)
    };
    if error_c.abs() < tolerance && elapsed > min_wait {
        StabilizationCheck::Stable
    } else {
        StabilizationCheck::Waiting { tolerance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TunerConfig {
        TunerConfig::default()
    }

    #[test]
    fn tight_band_applies_early() {
        // In band but before the minimum wait: not stable yet.
        assert!(matches!(
            check_stabilization(&cfg(), 10.0, 0.2),
            StabilizationCheck::Waiting { tolerance } if (tolerance - 0.5).abs() < 1e-6
        ));
        // Past the minimum wait and inside 0.5 C: stable.
        assert_eq!(
            check_stabilization(&cfg(), 40.0, 0.4),
            StabilizationCheck::Stable
        );
        // 0.8 C error is outside the early band.
        assert!(matches!(
            check_stabilization(&cfg(), 40.0, 0.8),
            StabilizationCheck::Waiting { .. }
        ));
    }

    #[test]
    fn tolerance_relaxes_after_two_and_four_minutes() {
        // 0.8 C passes once the two-minute band (1.0 C) is in force.
        assert_eq!(
            check_stabilization(&cfg(), 130.0, 0.8),
            StabilizationCheck::Stable
        );
        // 1.2 C needs the four-minute band (1.5 C).
        assert!(matches!(
            check_stabilization(&cfg(), 130.0, 1.2),
            StabilizationCheck::Waiting { .. }
        ));
        assert_eq!(
            check_stabilization(&cfg(), 250.0, 1.2),
            StabilizationCheck::Stable
        );
    }

    #[test]
    fn negative_error_is_symmetric() {
        assert_eq!(
            check_stabilization(&cfg(), 40.0, -0.4),
            StabilizationCheck::Stable
        );
    }

    #[test]
    fn times_out_after_the_deadline() {
        assert_eq!(
            check_stabilization(&cfg(), 601.0, 0.1),
            StabilizationCheck::TimedOut
        );
    }
}
