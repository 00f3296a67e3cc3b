//! Ultimate-gain strategy: find the proportional gain at which the plant
//! turns over-responsive, via repeated heating/cooling burst cycles under
//! proportional-only control.
//!
//! The search runs in three sub-phases:
//! 1. Characterization: one exploratory heating test sizes the starting
//!    gain and the gain increment.
//! 2. Heating bursts: drive toward base + burst step at the current probe
//!    gain, watching for the response to outrun the heater. A thermal
//!    inertia measurement may interpose once per session.
//! 3. Cooling: wait out the thermal mass (adaptively, using the measured
//!    cooling time constant) before judging the cycle and raising the gain.

use super::{AnalysisOutput, StrategyCtx, StrategyOutcome};
use crate::analysis;
use crate::characterize::{self, StartingParams};
use crate::error::TuneError;
use crate::inertia::{DetectorAction, InertiaDetector, InertiaProfile};
use crate::ports::RawPidParams;
use crate::sample::Sample;
use crate::session::PlantCommand;

// Cooling-phase shape constants.
const TIME_CONSTANT_DROP: f32 = 0.63;
const TIME_CONSTANT_MULTIPLIER: f32 = 3.0;
const FALLBACK_COOLING_BASE_SECS: f32 = 180.0;
const FALLBACK_COOLING_PER_CYCLE_SECS: f32 = 20.0;
const LATE_CYCLE_TIMEOUT_SCALE: f32 = 0.8;
const RECENT_OVERSHOOT_TIMEOUT_SCALE: f32 = 1.5;
const ALT_COMPLETE_DROP_RATIO: f32 = 0.6;

// Cycle-judgment window and floor.
const ANALYSIS_WINDOW_SAMPLES: usize = 60;
const MIN_ANALYSIS_SAMPLES: usize = 10;

// Conservative gain-increase strategy.
const CONSERVATIVE_STEP_SCALE: f32 = 0.5;
const MIN_GAIN_STEP: f32 = 0.005;
const CONSERVATIVE_TRIGGER_ERROR_C: f32 = 3.0;
const CONSERVATIVE_TRIGGER_CYCLES: u32 = 2;

// Residual heat carried between cycles.
const RESIDUAL_PEAK_MARGIN_C: f32 = 0.5;

/// How the probe gain grows between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainStrategy {
    Normal,
    Conservative,
}

/// Burst sub-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstPhase {
    Characterization,
    Heating,
    Cooling,
}

impl BurstPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Characterization => "characterization",
            Self::Heating => "heating",
            Self::Cooling => "cooling",
        }
    }
}

/// Judgment of one completed burst cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseMetrics {
    pub overshoot_percent: f32,
    pub peak_temperature: f32,
    /// Peak excursion above the cycle's burst target (C). Positive means
    /// heat carried past the target.
    pub peak_above_target_c: f32,
    pub settling_time: f32,
    /// Probe gain the cycle ran at.
    pub probe_kp: f32,
    pub over_responsive: bool,
}

/// Full state of the ultimate-gain search.
#[derive(Debug)]
pub struct UltimateState {
    burst: BurstPhase,
    /// Probe gain currently applied to the plant.
    current_kp: f32,
    /// Gain increment between cycles.
    step_size: f32,
    /// Floor the increment can shrink to under the conservative strategy.
    base_step_size: f32,
    gain_strategy: GainStrategy,
    /// Elapsed time when the search began.
    search_start: f32,
    burst_start_time: f32,
    burst_start_temp: f32,
    /// Heating commands for the current cycle have been issued.
    burst_armed: bool,
    /// Inter-cycle (or post-characterization) hold deadline.
    hold_until: Option<f32>,
    cooling_start_time: f32,
    peak_temp: f32,
    peak_time: f32,
    /// Completed cycles.
    test_cycles: u32,
    history: heapless::Vec<ResponseMetrics, 16>,
    /// Plant cooling time constant, measured once on the first usable
    /// cooling curve.
    cooling_time_constant: Option<f32>,
    /// Cycle number of the most recent >5% overshoot.
    last_overshoot_cycle: Option<u32>,
    detector: InertiaDetector,
    inertia: Option<InertiaProfile>,
    starting: Option<StartingParams>,
}

impl UltimateState {
    pub fn new() -> Self {
        Self {
            burst: BurstPhase::Characterization,
            current_kp: 0.0,
            step_size: 0.0,
            base_step_size: MIN_GAIN_STEP,
            gain_strategy: GainStrategy::Normal,
            search_start: 0.0,
            burst_start_time: 0.0,
            burst_start_temp: 0.0,
            burst_armed: false,
            hold_until: None,
            cooling_start_time: 0.0,
            peak_temp: 0.0,
            peak_time: 0.0,
            test_cycles: 0,
            history: heapless::Vec::new(),
            cooling_time_constant: None,
            last_overshoot_cycle: None,
            detector: InertiaDetector::new(),
            inertia: None,
            starting: None,
        }
    }

    pub fn current_kp(&self) -> f32 {
        self.current_kp
    }

    pub fn test_cycles(&self) -> u32 {
        self.test_cycles
    }
}

impl Default for UltimateState {
    fn default() -> Self {
        Self::new()
    }
}

/// Kick off characterization. Runs once, when the plant is stable at base.
pub fn begin(st: &mut UltimateState, ctx: &mut StrategyCtx) {
    st.search_start = ctx.elapsed;
    st.burst_start_time = ctx.elapsed;
    st.burst_start_temp = ctx.sample.temperature;
    ctx.command(PlantCommand::RawParams(RawPidParams::probe(
        ctx.cfg.characterization_kp,
        ctx.cfg.pid_sample_time_ms,
        ctx.cfg.pid_window_ms,
    )));
    ctx.command(PlantCommand::Setpoint(
        ctx.base + ctx.cfg.characterization_step_c,
    ));
    ctx.progress(25, "characterizing system response".into());
    log::info!(
        "ultimate-gain: characterization heating test toward {:.1} C",
        ctx.base + ctx.cfg.characterization_step_c
    );
}

pub fn update(st: &mut UltimateState, ctx: &mut StrategyCtx) -> StrategyOutcome {
    if ctx.elapsed - st.search_start > ctx.cfg.search_timeout_secs {
        log::warn!("ultimate-gain: search timed out without finding the critical gain");
        return StrategyOutcome::Failed(TuneError::UltimateGainNotFound);
    }

    ctx.status.detail = format!(
        "cycle {} | {} | Kp {:.3}",
        st.test_cycles + 1,
        st.burst.as_str(),
        st.current_kp
    );

    match st.burst {
        BurstPhase::Characterization => update_characterization(st, ctx),
        BurstPhase::Heating => update_heating(st, ctx),
        BurstPhase::Cooling => update_cooling(st, ctx),
    }
}

// ---------------------------------------------------------------------------
// Characterization
// ---------------------------------------------------------------------------

fn update_characterization(st: &mut UltimateState, ctx: &mut StrategyCtx) -> StrategyOutcome {
    let cfg = ctx.cfg;
    let test_elapsed = ctx.elapsed - st.burst_start_time;
    let target = ctx.base + cfg.characterization_step_c;
    let rise = ctx.sample.temperature - st.burst_start_temp;
    let expected = target - st.burst_start_temp;

    let good_rise = expected > 0.0 && rise >= expected * cfg.characterization_rise_ratio;
    let enough_time = test_elapsed >= cfg.characterization_min_secs;
    let timed_out = test_elapsed >= cfg.characterization_timeout_secs;

    if !(good_rise || enough_time || timed_out) {
        let frac = (test_elapsed / cfg.characterization_min_secs).clamp(0.0, 1.0);
        ctx.progress(
            25 + (frac * 15.0) as u8,
            format!("characterizing: rise {rise:.2} C of {expected:.2} C expected"),
        );
        return StrategyOutcome::Continue;
    }

    let data = ctx.samples.collect_since(st.burst_start_time);
    if data.len() < cfg.min_characterization_samples {
        if timed_out {
            log::warn!(
                "ultimate-gain: characterization timed out with only {} samples",
                data.len()
            );
            return StrategyOutcome::Failed(TuneError::InsufficientData);
        }
        return StrategyOutcome::Continue;
    }

    let ch = characterize::analyze(&data, target);
    let params = characterize::classify(&ch);
    log::info!(
        "ultimate-gain: system is {} / {} (rise {:.0} s, rate {:.3} C/s); starting Kp {:.3}, step {:.3}",
        params.responsiveness.as_str(),
        params.kind.as_str(),
        ch.rise_time,
        ch.avg_response_rate,
        params.starting_kp,
        params.step_size
    );

    st.current_kp = params.starting_kp;
    st.step_size = params.step_size;
    st.base_step_size = params.base_step_size;
    st.starting = Some(params);
    st.burst = BurstPhase::Heating;
    st.burst_armed = false;
    st.hold_until = Some(ctx.elapsed + cfg.post_characterization_settle_secs);

    ctx.command(PlantCommand::RawParams(RawPidParams::probe(
        st.current_kp,
        cfg.pid_sample_time_ms,
        cfg.pid_window_ms,
    )));
    ctx.command(PlantCommand::Setpoint(ctx.base));
    ctx.progress(
        40,
        format!(
            "system characterized as {}; beginning gain search at Kp {:.3}",
            params.kind.as_str(),
            params.starting_kp
        ),
    );
    StrategyOutcome::Continue
}

// ---------------------------------------------------------------------------
// Heating bursts
// ---------------------------------------------------------------------------

fn update_heating(st: &mut UltimateState, ctx: &mut StrategyCtx) -> StrategyOutcome {
    let cfg = ctx.cfg;
    let temp = ctx.sample.temperature;

    // Inter-cycle hold: let residual heat dissipate before the next burst.
    if let Some(deadline) = st.hold_until {
        if ctx.elapsed < deadline {
            ctx.progress(
                search_progress(st, ctx),
                format!(
                    "settling {:.0} s before cycle {}",
                    deadline - ctx.elapsed,
                    st.test_cycles + 1
                ),
            );
            return StrategyOutcome::Continue;
        }
        st.hold_until = None;

        // Post-wait stability check: if the plant still sits far from
        // base after several cycles, grow the gain more cautiously.
        let residual_error = (temp - ctx.base).abs();
        if residual_error > CONSERVATIVE_TRIGGER_ERROR_C
            && st.test_cycles > CONSERVATIVE_TRIGGER_CYCLES
            && st.gain_strategy == GainStrategy::Normal
        {
            st.gain_strategy = GainStrategy::Conservative;
            log::warn!(
                "ultimate-gain: {residual_error:.1} C residual error after settling; \
                 switching to conservative gain increases"
            );
        }
    }

    if !st.burst_armed {
        st.burst_armed = true;
        st.burst_start_time = ctx.elapsed;
        st.burst_start_temp = temp;
        st.peak_temp = temp;
        st.peak_time = ctx.elapsed;
        ctx.command(PlantCommand::Setpoint(ctx.base + cfg.burst_step_c));
        ctx.progress(
            search_progress(st, ctx),
            format!(
                "cycle {}: heating burst at Kp {:.3}",
                st.test_cycles + 1,
                st.current_kp
            ),
        );
        return StrategyOutcome::Continue;
    }

    if temp > st.peak_temp {
        st.peak_temp = temp;
        st.peak_time = ctx.elapsed;
    }

    // Thermal inertia measurement, at most once per session.
    if !st.detector.is_done() {
        let recent_avg_output = ctx.samples.mean_output_tail(8);
        match st.detector.update(
            cfg,
            ctx.elapsed,
            temp,
            ctx.sample.output,
            recent_avg_output,
            st.burst_start_temp,
        ) {
            DetectorAction::BeginMonitoring { setpoint } => {
                ctx.command(PlantCommand::Setpoint(setpoint));
                ctx.progress(
                    search_progress(st, ctx),
                    "heater coasting; measuring thermal inertia".into(),
                );
                return StrategyOutcome::Continue;
            }
            DetectorAction::Monitoring { rise_c } => {
                ctx.progress(
                    search_progress(st, ctx),
                    format!("measuring thermal inertia: +{rise_c:.2} C since heater stop"),
                );
                return StrategyOutcome::Continue;
            }
            DetectorAction::Concluded(profile) => {
                match &profile {
                    Some(p) => log::info!(
                        "thermal inertia confirmed: +{:.2} C over {:.0} s ({} severity)",
                        p.rise_after_stop_c,
                        p.lag_time_secs,
                        p.severity.as_str()
                    ),
                    None => log::info!("thermal inertia negligible"),
                }
                st.inertia = profile;
                // Restore the burst target the monitor pulled down.
                ctx.command(PlantCommand::Setpoint(ctx.base + cfg.burst_step_c));
            }
            DetectorAction::Inactive => {}
        }
    }

    // Burst thresholds, pulled earlier in proportion to measured inertia.
    let anticipation = st.inertia.map_or(0.0, |p| {
        (p.rise_after_stop_c / 8.0 * p.severity.anticipation_multiplier())
            .min(p.severity.anticipation_cap())
    });
    let target_rise = (ctx.base + cfg.burst_step_c) - st.burst_start_temp;
    let rise = temp - st.burst_start_temp;
    let reached =
        target_rise > 0.0 && rise >= target_rise * (cfg.target_rise_ratio - anticipation);
    let overshooting =
        target_rise > 0.0 && rise >= target_rise * (cfg.overshoot_rise_ratio - anticipation * 0.6);
    let coasting = ctx.samples.mean_output_tail(10) < cfg.low_output_threshold;
    let burst_elapsed = ctx.elapsed - st.burst_start_time;

    if (reached && coasting) || overshooting || burst_elapsed > cfg.heating_timeout_secs {
        st.burst = BurstPhase::Cooling;
        st.cooling_start_time = ctx.elapsed;

        // With confirmed inertia, undershoot the cooling setpoint so the
        // drift lands on base instead of above it.
        let cooling_setpoint = match st.inertia {
            Some(p) => {
                let undershoot = (p.rise_after_stop_c * 0.5).min(5.0);
                (ctx.base - undershoot).max(ctx.base - 2.0)
            }
            None => ctx.base,
        };
        ctx.command(PlantCommand::Setpoint(cooling_setpoint));
        ctx.progress(
            search_progress(st, ctx),
            format!(
                "cycle {}: peak {:.2} C, cooling toward {:.1} C",
                st.test_cycles + 1,
                st.peak_temp,
                cooling_setpoint
            ),
        );
    }
    StrategyOutcome::Continue
}

// ---------------------------------------------------------------------------
// Cooling and cycle judgment
// ---------------------------------------------------------------------------

fn update_cooling(st: &mut UltimateState, ctx: &mut StrategyCtx) -> StrategyOutcome {
    let cfg = ctx.cfg;
    let temp = ctx.sample.temperature;

    if temp > st.peak_temp {
        st.peak_temp = temp;
        st.peak_time = ctx.elapsed;
    }

    let cooling_elapsed = ctx.elapsed - st.cooling_start_time;
    let peak_rise = st.peak_temp - ctx.base;
    let drop = st.peak_temp - temp;

    // Measure the cooling time constant once, on the first clean curve.
    if st.cooling_time_constant.is_none()
        && peak_rise > 0.5
        && drop >= peak_rise * TIME_CONSTANT_DROP
    {
        st.cooling_time_constant = Some(cooling_elapsed);
        log::info!("ultimate-gain: cooling time constant {cooling_elapsed:.0} s");
    }

    // The cap binds the raw time-constant estimate only; the situational
    // scalings below may stretch past it.
    let mut timeout = match st.cooling_time_constant {
        Some(tc) => (tc * TIME_CONSTANT_MULTIPLIER).min(cfg.cooling_timeout_cap_secs),
        None => FALLBACK_COOLING_BASE_SECS + st.test_cycles as f32 * FALLBACK_COOLING_PER_CYCLE_SECS,
    };
    if st.test_cycles > 5 {
        timeout *= LATE_CYCLE_TIMEOUT_SCALE;
    }
    if let (Some(last), cycles) = (st.last_overshoot_cycle, st.test_cycles) {
        if cycles.saturating_sub(last) <= 2 {
            timeout *= RECENT_OVERSHOOT_TIMEOUT_SCALE;
        }
    }

    let cooled = peak_rise <= 0.0 || drop >= peak_rise * cfg.cooling_drop_ratio;
    let alt_cooled = st
        .cooling_time_constant
        .is_some_and(|tc| cooling_elapsed > 2.0 * tc && drop >= peak_rise * ALT_COMPLETE_DROP_RATIO);

    if !(cooled || alt_cooled || cooling_elapsed > timeout) {
        ctx.progress(
            search_progress(st, ctx),
            format!(
                "cycle {}: cooling, {:.2} C above base",
                st.test_cycles + 1,
                temp - ctx.base
            ),
        );
        return StrategyOutcome::Continue;
    }

    // Judge the completed cycle.
    let recent = ctx.samples.collect_tail(ANALYSIS_WINDOW_SAMPLES);
    let burst_target = st.burst_start_temp + cfg.burst_step_c;
    let metrics =
        analyze_thermal_response(&recent, burst_target, st.current_kp, st.inertia.as_ref());
    st.test_cycles += 1;
    if metrics.overshoot_percent > 5.0 {
        st.last_overshoot_cycle = Some(st.test_cycles);
    }
    if st.history.push(metrics).is_err() {
        log::warn!("response history full, dropping oldest judgment");
    }
    log::info!(
        "ultimate-gain: cycle {} at Kp {:.3}: overshoot {:.1}%, peak {:.2} C{}",
        st.test_cycles,
        st.current_kp,
        metrics.overshoot_percent,
        metrics.peak_temperature,
        if metrics.over_responsive {
            " (over-responsive)"
        } else {
            ""
        }
    );

    if metrics.over_responsive {
        return StrategyOutcome::Finished(AnalysisOutput::Ultimate {
            critical_kp: st.current_kp,
            final_metrics: metrics,
            inertia: st.inertia,
            system_kind: st.starting.map(|p| p.kind),
            responsiveness: st.starting.map(|p| p.responsiveness),
        });
    }

    if st.test_cycles >= cfg.max_test_cycles {
        log::warn!(
            "ultimate-gain: {} cycles completed without instability",
            st.test_cycles
        );
        return StrategyOutcome::Failed(TuneError::UltimateGainNotFound);
    }

    let increment = match st.gain_strategy {
        GainStrategy::Normal => st.step_size,
        GainStrategy::Conservative => {
            (st.step_size * CONSERVATIVE_STEP_SCALE).max(st.base_step_size.min(MIN_GAIN_STEP))
        }
    };
    st.current_kp += increment;
    if st.current_kp >= cfg.max_kp {
        log::warn!(
            "ultimate-gain: probe gain reached the {:.1} ceiling without instability",
            cfg.max_kp
        );
        return StrategyOutcome::Failed(TuneError::UltimateGainNotFound);
    }

    let wait = inter_cycle_wait(st, temp, ctx.base, cfg.burst_step_c);
    st.hold_until = Some(ctx.elapsed + wait);
    st.burst = BurstPhase::Heating;
    st.burst_armed = false;

    // Idle the plant at the next probe gain through the wait.
    ctx.command(PlantCommand::RawParams(RawPidParams::probe(
        st.current_kp,
        cfg.pid_sample_time_ms,
        cfg.pid_window_ms,
    )));
    ctx.progress(
        search_progress(st, ctx),
        format!(
            "cycle {} done: overshoot {:.1}%; next Kp {:.3} after {:.0} s",
            st.test_cycles, metrics.overshoot_percent, st.current_kp, wait
        ),
    );
    StrategyOutcome::Continue
}

/// Judge one cycle from its recent samples. Slices shorter than the
/// analysis floor yield a neutral judgment.
fn analyze_thermal_response(
    samples: &[Sample],
    burst_target: f32,
    probe_kp: f32,
    inertia: Option<&InertiaProfile>,
) -> ResponseMetrics {
    if samples.len() < MIN_ANALYSIS_SAMPLES {
        return ResponseMetrics {
            overshoot_percent: 0.0,
            peak_temperature: samples.last().map_or(0.0, |s| s.temperature),
            peak_above_target_c: 0.0,
            settling_time: 0.0,
            probe_kp,
            over_responsive: false,
        };
    }

    let overshoot = analysis::overshoot_percent(samples, burst_target);
    let peak = analysis::peak_temperature(samples);
    let settling = analysis::settling_time(samples, burst_target);

    // Inertia raises the bar: drift-driven overshoot is not instability.
    let f = inertia.map_or(0.0, |p| p.compensation_factor);
    let over_responsive = overshoot > 15.0 + f * 10.0
        || (overshoot > 8.0 + f * 5.0 && probe_kp > 3.0 + f * 2.0);

    ResponseMetrics {
        overshoot_percent: overshoot,
        peak_temperature: peak,
        peak_above_target_c: peak - burst_target,
        settling_time: settling,
        probe_kp,
        over_responsive,
    }
}

/// How long to idle before the next burst. Every applicable heuristic
/// proposes a wait; the longest wins.
fn inter_cycle_wait(st: &UltimateState, current_temp: f32, base: f32, burst_step_c: f32) -> f32 {
    let mut wait: f32 = 15.0;

    let temp_error = (current_temp - base).abs();
    if temp_error > 1.5 {
        wait = wait.max((20.0 + temp_error * 3.0).min(60.0));
    }

    if let Some(last) = st.history.last() {
        if last.overshoot_percent > 15.0 {
            wait = wait.max(25.0 + (last.overshoot_percent * 0.8).min(20.0));
        }
        if last.peak_temperature > base + burst_step_c {
            wait = wait.max(((last.peak_temperature - base) * 2.5).min(30.0));
        }
    }

    // Two cycles in a row carrying heat past their target: force a long
    // cooldown to break the pattern.
    let n = st.history.len();
    if n >= 2
        && st.history[n - 1].peak_above_target_c > RESIDUAL_PEAK_MARGIN_C
        && st.history[n - 2].peak_above_target_c > RESIDUAL_PEAK_MARGIN_C
    {
        wait = wait.max(35.0);
    }

    if st.test_cycles > 3 {
        wait = wait.max(25.0 + (st.test_cycles as f32 * 2.0).min(15.0));
    }

    if current_temp > base + 4.0 {
        wait = wait.max(40.0 + (current_temp - base - 4.0) * 3.0);
    }

    // Higher probe gains make the plant livelier; give it longer.
    wait.max(20.0 + (st.current_kp / 5.0 * 8.0).min(10.0))
}

fn search_progress(st: &UltimateState, ctx: &StrategyCtx) -> u8 {
    if st.starting.is_none() {
        return 25;
    }
    let frac = (st.current_kp / ctx.cfg.max_kp).clamp(0.0, 1.0);
    (45.0 + frac * 45.0).min(90.0) as u8
}
