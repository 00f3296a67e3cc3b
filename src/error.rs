//! Unified error types for the tuning engine.
//!
//! A small, fully-typed taxonomy: start-time rejections are separated from
//! in-flight session failures so callers can distinguish "bad request" from
//! "experiment failed". All variants are `Copy` so they can be cheaply
//! passed through the orchestrator and status channel without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Start-time rejections (synchronous, no session created)
// ---------------------------------------------------------------------------

/// Reasons `start` can refuse to create a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    /// A start parameter failed validation. The string names the
    /// offending parameter.
    InvalidParameter(&'static str),
    /// A session is already active; it must be stopped first.
    AlreadyRunning,
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(what) => write!(f, "invalid parameter: {what}"),
            Self::AlreadyRunning => write!(f, "a tuning session is already running"),
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight session failures (fatal, session stops and plant is shut down)
// ---------------------------------------------------------------------------

/// Fatal faults that terminate a running session.
///
/// Transient conditions (a missed plant command, a noisy sample) are *not*
/// represented here. They are logged and absorbed; the session continues
/// until a phase-level timeout converts persistence into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneError {
    /// The plant never settled into the base-temperature band.
    StabilizationTimeout,
    /// Too few samples were recorded to analyze the response.
    InsufficientData,
    /// The gain search exhausted its budget without finding instability.
    UltimateGainNotFound,
}

impl fmt::Display for TuneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StabilizationTimeout => {
                write!(f, "timeout waiting for temperature stabilization")
            }
            Self::InsufficientData => write!(f, "insufficient data for analysis"),
            Self::UltimateGainNotFound => {
                write!(f, "gain search exhausted without reaching instability")
            }
        }
    }
}
