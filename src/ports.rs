//! Port traits: the hardware-facing boundary of the tuning engine.
//!
//! The engine never touches a heater, a relay, or a serial link. Everything
//! it needs from the outside world crosses two traits:
//!
//! - [`PlantPort`]: commands *to* the plant (setpoint, mode, raw PID gains).
//! - [`StatusSink`]: progress and terminal events *from* the engine.
//!
//! Production embeds these over whatever transport the plant speaks; tests
//! implement them with in-memory mocks.

use crate::error::TuneError;
use crate::session::{Phase, TuneMethod, TuningResult};
use core::fmt;

// ---------------------------------------------------------------------------
// Data crossing the boundary
// ---------------------------------------------------------------------------

/// One snapshot of the plant, as polled by the embedding loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlantReading {
    /// Filtered process temperature, degrees C.
    pub temperature_c: f32,
    /// Unfiltered sensor temperature, degrees C.
    pub raw_temperature_c: f32,
    /// Heater drive as a fraction of full power, 0.0 ..= 1.0.
    pub output: f32,
    /// Setpoint the plant is currently regulating to, degrees C.
    pub setpoint_c: f32,
}

/// Raw controller parameters pushed to the plant during tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPidParams {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Controller sample period, milliseconds.
    pub sample_time_ms: u32,
    /// Time-proportioning output window, milliseconds.
    pub window_ms: u32,
}

impl RawPidParams {
    /// Proportional-only probe parameters, as used while hunting for the
    /// critical gain.
    pub fn probe(kp: f32, sample_time_ms: u32, window_ms: u32) -> Self {
        Self {
            kp,
            ki: 0.0,
            kd: 0.0,
            sample_time_ms,
            window_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// A plant command did not take effect.
///
/// These are transient by contract: the orchestrator logs the failure and
/// retries on the next sample rather than aborting the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantError {
    /// The transport did not answer in time.
    Timeout,
    /// The plant refused the command.
    Rejected,
    /// The link to the plant is down.
    Disconnected,
}

impl fmt::Display for PlantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "plant command timed out"),
            Self::Rejected => write!(f, "plant rejected command"),
            Self::Disconnected => write!(f, "plant link disconnected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Commands the engine issues to the plant.
pub trait PlantPort {
    /// Change the regulation setpoint.
    fn set_setpoint(&mut self, celsius: f32) -> Result<(), PlantError>;

    /// Switch the plant between its own control profile (`false`) and
    /// direct raw-parameter control for tuning (`true`).
    fn set_manual_mode(&mut self, manual: bool) -> Result<(), PlantError>;

    /// Push raw PID parameters for the plant to run immediately.
    fn set_raw_pid_params(&mut self, params: &RawPidParams) -> Result<(), PlantError>;
}

/// Engine-emitted lifecycle and progress events.
#[derive(Debug, Clone, PartialEq)]
pub enum TuneEvent {
    /// A session was created and the plant put under tuning control.
    Started {
        method: TuneMethod,
        base_temperature_c: f32,
        skipped_stabilization: bool,
    },
    /// The session moved between phases.
    PhaseChanged { from: Phase, to: Phase },
    /// Something noteworthy but non-fatal (slow stabilization, odd plant
    /// behavior).
    Warning(String),
    /// A plant command failed; it will be retried.
    CommandFailed {
        what: &'static str,
        error: PlantError,
    },
    /// The session finished with synthesized gains, already applied.
    Completed(TuningResult),
    /// The session failed; the plant has been shut down.
    Failed(TuneError),
    /// The session was cancelled by the caller.
    Stopped,
}

/// Consumer of [`TuneEvent`]s: UI bridge, log relay, test recorder.
pub trait StatusSink {
    fn emit(&mut self, event: &TuneEvent);
}
