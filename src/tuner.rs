//! The auto-tuning orchestrator.
//!
//! [`AutoTuner`] owns the session lifecycle: it validates start requests,
//! runs the stabilization phase, dispatches samples to the active
//! strategy, applies the commands the strategy queued, and converts the
//! strategy's verdict into an applied result or a failure.
//!
//! The engine is tick-driven and single-threaded: it advances only inside
//! `on_sample`, and a re-entrant call is dropped with a warning rather
//! than interleaved.

use crate::config::TunerConfig;
use crate::error::{StartError, TuneError};
use crate::ports::{PlantPort, PlantReading, RawPidParams, StatusSink, TuneEvent};
use crate::sample::Sample;
use crate::session::{
    Phase, PlantCommand, TuneCharacteristics, TuneMethod, TuneStatus, TuningResult, TuningSession,
};
use crate::strategy::{
    self, AnalysisOutput, StabilizationCheck, StrategyCtx, StrategyOutcome, StrategyState, step,
    ultimate,
};
use crate::synth;

/// A start request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartParams {
    /// Temperature to tune around (C).
    pub base_temperature_c: f32,
    pub method: TuneMethod,
    /// Step size for the step-response method; `None` takes the
    /// configured default. Ignored by the ultimate-gain method.
    pub step_size_c: Option<f32>,
}

enum TickAction {
    None,
    Fail(TuneError),
    Finish(AnalysisOutput),
}

/// Closed-loop PID auto-tuner.
pub struct AutoTuner {
    config: TunerConfig,
    session: Option<TuningSession>,
    result: Option<TuningResult>,
    last_status: TuneStatus,
    in_flight: bool,
    samples_processed: u64,
}

impl AutoTuner {
    pub fn new(config: TunerConfig) -> Self {
        Self {
            config,
            session: None,
            result: None,
            last_status: TuneStatus::default(),
            in_flight: false,
            samples_processed: 0,
        }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.session.as_ref().map_or(Phase::Idle, |s| s.phase)
    }

    /// Result of the most recent successful session, if any.
    pub fn result(&self) -> Option<&TuningResult> {
        self.result.as_ref()
    }

    /// Samples accepted and processed since construction. Re-entrant or
    /// idle-state samples do not count.
    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    /// Current progress snapshot.
    pub fn status(&self) -> TuneStatus {
        match &self.session {
            Some(s) => TuneStatus {
                phase: s.phase,
                method: Some(s.method),
                progress_percent: s.status.progress,
                message: s.status.message.clone(),
                stage_detail: s.status.detail.clone(),
            },
            None => self.last_status.clone(),
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Validate a request, put the plant under tuning control, and create
    /// the session.
    ///
    /// When the plant already sits in a workable band around the requested
    /// base, the current temperature is adopted as the effective base and
    /// the stabilization phase is skipped entirely.
    pub fn start(
        &mut self,
        params: &StartParams,
        current: Option<&PlantReading>,
        plant: &mut impl PlantPort,
        sink: &mut impl StatusSink,
    ) -> Result<(), StartError> {
        if self.session.is_some() {
            return Err(StartError::AlreadyRunning);
        }
        if !params.base_temperature_c.is_finite() || params.base_temperature_c <= 0.0 {
            return Err(StartError::InvalidParameter("base_temperature"));
        }
        let step_size = params.step_size_c.unwrap_or(self.config.default_step_size_c);
        if params.method == TuneMethod::StepResponse && (!step_size.is_finite() || step_size <= 0.0)
        {
            return Err(StartError::InvalidParameter("step_size"));
        }

        let mut base = params.base_temperature_c;
        let mut skip = false;
        if let Some(reading) = current {
            let temp = reading.temperature_c;
            let diff = (temp - base).abs();
            let workable = temp >= self.config.comfort_min_c && temp <= self.config.comfort_max_c;
            let near_base = diff <= self.config.comfort_close_band_c
                || (temp > base && temp - base <= self.config.comfort_above_band_c)
                || diff <= self.config.comfort_general_band_c;
            if workable && near_base {
                log::info!(
                    "adopting current {:.1} C as base (requested {:.1} C), skipping stabilization",
                    temp,
                    base
                );
                base = temp;
                skip = true;
            }
        }

        let strategy = match params.method {
            TuneMethod::StepResponse => StrategyState::Step(step::StepState::new(step_size)),
            TuneMethod::UltimateGain => {
                StrategyState::Ultimate(Box::new(ultimate::UltimateState::new()))
            }
        };
        let mut session = TuningSession::new(&self.config, params.method, base, skip, strategy);
        session.status.progress = 5;
        session.status.message = if skip {
            "starting at current temperature".into()
        } else {
            format!("stabilizing at {base:.1} C")
        };

        // Take control of the plant. Failures are queued for retry; the
        // session starts regardless.
        for cmd in [PlantCommand::ManualMode(true), PlantCommand::Setpoint(base)] {
            if !apply_command(plant, sink, &cmd) && session.pending_retry.push(cmd).is_err() {
                log::warn!("retry queue full, dropping {}", cmd.name());
            }
        }

        log::info!(
            "tuning started: {} around {:.1} C{}",
            params.method.as_str(),
            base,
            if skip { " (stabilization skipped)" } else { "" }
        );
        sink.emit(&TuneEvent::Started {
            method: params.method,
            base_temperature_c: base,
            skipped_stabilization: skip,
        });
        sink.emit(&TuneEvent::PhaseChanged {
            from: Phase::Idle,
            to: session.phase,
        });

        self.result = None;
        self.session = Some(session);
        Ok(())
    }

    /// Feed one plant sample. `now_secs` is any monotonic clock in
    /// seconds; the first sample anchors the session timeline.
    pub fn on_sample(
        &mut self,
        now_secs: f32,
        reading: &PlantReading,
        plant: &mut impl PlantPort,
        sink: &mut impl StatusSink,
    ) {
        if self.in_flight {
            log::warn!("on_sample re-entered; dropping sample");
            return;
        }
        self.in_flight = true;
        let action = self.advance(now_secs, reading, plant, sink);
        match action {
            TickAction::None => {}
            TickAction::Fail(err) => self.fail(err, plant, sink),
            TickAction::Finish(output) => self.finish(&output, plant, sink),
        }
        self.in_flight = false;
    }

    /// Cancel the session and release the plant. Idempotent.
    pub fn stop(&mut self, plant: &mut impl PlantPort, sink: &mut impl StatusSink) {
        let Some(session) = self.session.take() else {
            return;
        };
        log::info!("tuning stopped by caller during {}", session.phase.as_str());
        self.shutdown_plant(plant, sink);
        sink.emit(&TuneEvent::Stopped);
        self.last_status = TuneStatus {
            phase: Phase::Idle,
            method: Some(session.method),
            progress_percent: 0,
            message: "tuning stopped".into(),
            stage_detail: String::new(),
        };
    }

    // -----------------------------------------------------------------
    // Tick internals
    // -----------------------------------------------------------------

    fn advance(
        &mut self,
        now_secs: f32,
        reading: &PlantReading,
        plant: &mut impl PlantPort,
        sink: &mut impl StatusSink,
    ) -> TickAction {
        let cfg = &self.config;
        let Some(session) = self.session.as_mut() else {
            log::debug!("sample ignored: no session");
            return TickAction::None;
        };
        self.samples_processed += 1;

        let t0 = *session.start_time.get_or_insert(now_secs);
        let elapsed = (now_secs - t0).max(0.0);
        let sample = Sample {
            time: elapsed,
            temperature: reading.temperature_c,
            setpoint: reading.setpoint_c,
            output: reading.output,
        };
        session.samples.push(sample);

        // Re-issue commands that failed on a previous tick; ones that
        // fail again go back on the queue.
        let retries = core::mem::take(&mut session.pending_retry);
        for cmd in &retries {
            if !apply_command(plant, sink, cmd) && session.pending_retry.push(*cmd).is_err() {
                log::warn!("retry queue full, dropping {}", cmd.name());
            }
        }

        if session.phase == Phase::Stabilizing {
            let error = sample.temperature - session.base_temperature;
            match strategy::check_stabilization(cfg, elapsed, error) {
                StabilizationCheck::Stable => {
                    log::info!(
                        "stabilized at {:.2} C after {:.0} s",
                        sample.temperature,
                        elapsed
                    );
                    session.phase = Phase::Active;
                    sink.emit(&TuneEvent::PhaseChanged {
                        from: Phase::Stabilizing,
                        to: Phase::Active,
                    });
                }
                StabilizationCheck::Waiting { tolerance } => {
                    if elapsed > cfg.stabilize_warn_secs && !session.warned_slow_stabilization {
                        session.warned_slow_stabilization = true;
                        log::warn!("stabilization slow: {elapsed:.0} s and counting");
                        sink.emit(&TuneEvent::Warning(format!(
                            "stabilization is taking unusually long ({elapsed:.0} s)"
                        )));
                    }
                    let frac = (elapsed / cfg.stabilize_timeout_secs).clamp(0.0, 1.0);
                    session.status.progress = (5.0 + frac * 20.0) as u8;
                    session.status.message = format!(
                        "stabilizing: {:.2} C from base (band +/-{tolerance:.1} C)",
                        error.abs()
                    );
                    return TickAction::None;
                }
                StabilizationCheck::TimedOut => {
                    return TickAction::Fail(TuneError::StabilizationTimeout);
                }
            }
        }

        if session.phase != Phase::Active {
            return TickAction::None;
        }

        // Run the strategy over split borrows of the session blackboard.
        let TuningSession {
            base_temperature,
            samples,
            commands,
            pending_retry,
            status,
            strategy,
            strategy_begun,
            ..
        } = session;
        let mut ctx = StrategyCtx {
            cfg,
            base: *base_temperature,
            elapsed,
            sample,
            samples,
            commands,
            status,
        };
        let outcome = if *strategy_begun {
            match strategy {
                StrategyState::Step(st) => step::update(st, &mut ctx),
                StrategyState::Ultimate(st) => ultimate::update(st, &mut ctx),
            }
        } else {
            *strategy_begun = true;
            match strategy {
                StrategyState::Step(st) => step::begin(st, &mut ctx),
                StrategyState::Ultimate(st) => ultimate::begin(st, &mut ctx),
            }
            StrategyOutcome::Continue
        };

        // Apply whatever the strategy queued; failures are parked for
        // retry on the next tick.
        let queued = core::mem::take(commands);
        for cmd in &queued {
            if !apply_command(plant, sink, cmd) && pending_retry.push(*cmd).is_err() {
                log::warn!("retry queue full, dropping {}", cmd.name());
            }
        }

        match outcome {
            StrategyOutcome::Continue => TickAction::None,
            StrategyOutcome::Finished(output) => TickAction::Finish(output),
            StrategyOutcome::Failed(err) => TickAction::Fail(err),
        }
    }

    fn finish(
        &mut self,
        output: &AnalysisOutput,
        plant: &mut impl PlantPort,
        sink: &mut impl StatusSink,
    ) {
        let Some(session) = self.session.take() else {
            return;
        };
        sink.emit(&TuneEvent::PhaseChanged {
            from: session.phase,
            to: Phase::Analysis,
        });

        let (gains, method_name, characteristics) = match output {
            AnalysisOutput::Step(a) => {
                let (gains, fallback) = synth::step_response_gains(a);
                let name = if fallback {
                    "Step Response (Fallback)"
                } else {
                    "Step Response (Ziegler-Nichols)"
                };
                let ch = TuneCharacteristics {
                    rise_time_secs: Some(a.rise_time),
                    overshoot_percent: Some(a.overshoot_percent),
                    settling_time_secs: Some(a.settling_time),
                    actual_step_c: Some(a.actual_step),
                    expected_step_c: Some(a.expected_step),
                    ..Default::default()
                };
                (gains, name, ch)
            }
            AnalysisOutput::Ultimate {
                critical_kp,
                final_metrics,
                inertia,
                system_kind,
                responsiveness,
            } => {
                let s = synth::ultimate_gains(
                    *critical_kp,
                    final_metrics.overshoot_percent,
                    inertia.as_ref(),
                );
                let ch = TuneCharacteristics {
                    overshoot_percent: Some(final_metrics.overshoot_percent),
                    settling_time_secs: Some(final_metrics.settling_time),
                    critical_gain: Some(*critical_kp),
                    compensated_gain: Some(s.compensated_gain),
                    system_kind: system_kind.map(|k| k.as_str().to_string()),
                    responsiveness: responsiveness.map(|r| r.as_str().to_string()),
                    inertia_severity: inertia.map(|p| p.severity.as_str().to_string()),
                    inertia_rise_c: inertia.map(|p| p.rise_after_stop_c),
                    inertia_lag_secs: inertia.map(|p| p.lag_time_secs),
                    ..Default::default()
                };
                (s.gains, "Ultimate Gain (Thermal-Optimized)", ch)
            }
        };

        // Apply the tuned gains before releasing the plant. A write
        // failure is logged and reported but the result still stands:
        // the caller holds the gains.
        apply_command(
            plant,
            sink,
            &PlantCommand::RawParams(RawPidParams {
                kp: gains.kp,
                ki: gains.ki,
                kd: gains.kd,
                sample_time_ms: self.config.pid_sample_time_ms,
                window_ms: self.config.pid_window_ms,
            }),
        );
        self.shutdown_plant(plant, sink);

        log::info!(
            "tuning complete via {method_name}: kp={:.4} ki={:.4} kd={:.4}",
            gains.kp,
            gains.ki,
            gains.kd
        );
        let result = TuningResult {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            method: method_name.to_string(),
            characteristics,
        };
        sink.emit(&TuneEvent::Completed(result.clone()));
        self.result = Some(result);
        self.last_status = TuneStatus {
            phase: Phase::Idle,
            method: Some(session.method),
            progress_percent: 100,
            message: "tuning complete".into(),
            stage_detail: String::new(),
        };
    }

    fn fail(&mut self, err: TuneError, plant: &mut impl PlantPort, sink: &mut impl StatusSink) {
        let method = self.session.take().map(|s| s.method);
        log::warn!("tuning failed: {err}");
        self.shutdown_plant(plant, sink);
        sink.emit(&TuneEvent::Failed(err));
        self.last_status = TuneStatus {
            phase: Phase::Idle,
            method,
            progress_percent: 0,
            message: format!("tuning failed: {err}"),
            stage_detail: String::new(),
        };
    }

    /// Best-effort plant release: idle setpoint, plant's own control.
    fn shutdown_plant(&mut self, plant: &mut impl PlantPort, sink: &mut impl StatusSink) {
        apply_command(plant, sink, &PlantCommand::Setpoint(0.0));
        apply_command(plant, sink, &PlantCommand::ManualMode(false));
    }
}

impl Default for AutoTuner {
    fn default() -> Self {
        Self::new(TunerConfig::default())
    }
}

/// Issue one command to the plant. Failures are logged and reported, never
/// fatal; returns whether the command took effect.
fn apply_command(
    plant: &mut impl PlantPort,
    sink: &mut impl StatusSink,
    cmd: &PlantCommand,
) -> bool {
    let result = match cmd {
        PlantCommand::Setpoint(c) => plant.set_setpoint(*c),
        PlantCommand::ManualMode(m) => plant.set_manual_mode(*m),
        PlantCommand::RawParams(p) => plant.set_raw_pid_params(p),
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            log::warn!("plant command {} failed: {err}", cmd.name());
            sink.emit(&TuneEvent::CommandFailed {
                what: cmd.name(),
                error: err,
            });
            false
        }
    }
}
