//! Closed-loop PID auto-tuning engine for heater-driven thermal chambers.
//!
//! The engine is hardware-agnostic and tick-driven: the embedding loop
//! polls the plant, feeds each `(time, reading)` pair to
//! [`tuner::AutoTuner::on_sample`], and the engine drives the experiment
//! through the [`ports::PlantPort`] it is handed. Progress and terminal
//! events flow out through [`ports::StatusSink`].

#![deny(unused_must_use)]

pub mod analysis;
pub mod characterize;
pub mod config;
pub mod error;
pub mod inertia;
pub mod ports;
pub mod sample;
pub mod session;
pub mod synth;
pub mod tuner;

mod strategy;

pub use config::TunerConfig;
pub use error::{StartError, TuneError};
pub use ports::{PlantError, PlantPort, PlantReading, RawPidParams, StatusSink, TuneEvent};
pub use session::{Phase, TuneMethod, TuneStatus, TuningResult};
pub use tuner::{AutoTuner, StartParams};
