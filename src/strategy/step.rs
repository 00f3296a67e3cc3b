//! Step-response strategy: one setpoint step, a fixed observation
//! window, then classical first-order analysis.

use super::{AnalysisOutput, StrategyCtx, StrategyOutcome};
use crate::analysis;
use crate::error::TuneError;
use crate::session::PlantCommand;
use crate::synth::StepAnalysis;

#[derive(Debug, Clone, Copy)]
pub struct StepState {
    /// Setpoint step above base (C).
    pub step_size: f32,
    /// Elapsed time when the step was commanded.
    step_start: f32,
    /// Stepped setpoint (base + step_size).
    target: f32,
}

impl StepState {
    pub fn new(step_size: f32) -> Self {
        Self {
            step_size,
            step_start: 0.0,
            target: 0.0,
        }
    }
}

/// Command the setpoint step. Runs once, when the plant is stable at base.
pub fn begin(st: &mut StepState, ctx: &mut StrategyCtx) {
    st.step_start = ctx.elapsed;
    st.target = ctx.base + st.step_size;
    ctx.command(PlantCommand::Setpoint(st.target));
    ctx.progress(
        30,
        format!(
            "step applied: {:.1} C -> {:.1} C, observing response",
            ctx.base, st.target
        ),
    );
    log::info!(
        "step-response: stepping setpoint to {:.1} C for {:.0} s",
        st.target,
        ctx.cfg.step_window_secs
    );
}

pub fn update(st: &mut StepState, ctx: &mut StrategyCtx) -> StrategyOutcome {
    let window = ctx.cfg.step_window_secs;
    let since_step = ctx.elapsed - st.step_start;

    if since_step <= window {
        let frac = (since_step / window).clamp(0.0, 1.0);
        ctx.progress(
            30 + (frac * 60.0) as u8,
            format!("observing step response, {:.0} s remaining", window - since_step),
        );
        return StrategyOutcome::Continue;
    }

    let data = ctx.samples.collect_since(st.step_start);
    if data.len() < ctx.cfg.min_step_samples {
        log::warn!(
            "step-response: only {} samples in the window, need {}",
            data.len(),
            ctx.cfg.min_step_samples
        );
        return StrategyOutcome::Failed(TuneError::InsufficientData);
    }

    // First and last are safe: the window held at least min_step_samples.
    let initial = data[0].temperature;
    let final_temp = data[data.len() - 1].temperature;

    StrategyOutcome::Finished(AnalysisOutput::Step(StepAnalysis {
        rise_time: analysis::rise_time_10_90(&data, initial, final_temp),
        overshoot_percent: analysis::overshoot_percent(&data, st.target),
        settling_time: analysis::settling_time(&data, final_temp),
        actual_step: final_temp - initial,
        expected_step: st.step_size,
    }))
}
