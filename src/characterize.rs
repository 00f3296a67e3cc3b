//! System characterization: turn the exploratory heating test into a
//! coarse picture of the plant, then pick safe starting gains for the
//! critical-gain search.

use crate::analysis;
use crate::sample::Sample;

/// Metrics extracted from the characterization heating test.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemCharacteristics {
    /// Time to reach 63% of the expected rise (s).
    pub rise_time: f32,
    /// Mean heating rate over the whole test (C/s).
    pub avg_response_rate: f32,
    /// Temperature rise per unit of mean output; 0.0 when the heater
    /// barely ran.
    pub system_gain: f32,
    /// Total rise achieved (C).
    pub temp_rise: f32,
    /// Rise the setpoint step asked for (C).
    pub expected_rise: f32,
    /// Achieved rise as a fraction of expected.
    pub response_ratio: f32,
    /// Variance of the heater output over the test.
    pub output_variance: f32,
    /// Fraction of samples with the heater near full power.
    pub output_saturation: f32,
    /// Variance of consecutive temperature slopes; a noise indicator.
    pub slope_variance: f32,
    /// Lag before the temperature first moved (s).
    pub dead_time: f32,
    /// Test duration (s).
    pub test_duration: f32,
    /// Mean heater output over the test.
    pub avg_output: f32,
}

/// How quickly the plant reacts to heat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Responsiveness {
    Fast,
    Medium,
    Slow,
}

impl Responsiveness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
        }
    }
}

/// Qualitative plant category, used to shade the search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    Responsive,
    Normal,
    Sluggish,
    PowerLimited,
    Noisy,
}

impl SystemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Responsive => "responsive",
            Self::Normal => "normal",
            Self::Sluggish => "sluggish",
            Self::PowerLimited => "power-limited",
            Self::Noisy => "noisy",
        }
    }
}

/// Search entry point derived from characterization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartingParams {
    pub responsiveness: Responsiveness,
    pub kind: SystemKind,
    /// Probe gain the search begins at.
    pub starting_kp: f32,
    /// Gain increment between cycles.
    pub step_size: f32,
    /// Floor the increment can shrink back to under the conservative
    /// strategy.
    pub base_step_size: f32,
}

// Saturation counting threshold: output this close to full power counts
// as saturated.
const SATURATED_OUTPUT: f32 = 0.95;
// Temperature movement that ends the dead-time measurement.
const DEAD_TIME_RISE_C: f32 = 0.1;

/// Extract characterization metrics from the test data.
///
/// `target_temp` is the setpoint the test was driving toward. Callers
/// guarantee at least a handful of samples; short slices degrade to
/// neutral metrics rather than panicking.
pub fn analyze(data: &[Sample], target_temp: f32) -> SystemCharacteristics {
    let (Some(first), Some(last)) = (data.first(), data.last()) else {
        return SystemCharacteristics::default();
    };

    let start_temp = first.temperature;
    let temp_rise = last.temperature - start_temp;
    let expected_rise = target_temp - start_temp;
    let test_duration = last.time - first.time;
    let avg_output = analysis::average_output(data);

    // Time to 63% of the expected rise; the full duration if never reached.
    let rise_target = start_temp + expected_rise * 0.63;
    let rise_time = data
        .iter()
        .find(|s| s.temperature >= rise_target)
        .map_or(test_duration, |s| s.time - first.time);

    let avg_response_rate = if test_duration > 0.0 {
        temp_rise / test_duration
    } else {
        0.0
    };
    let system_gain = if avg_output > 0.1 {
        temp_rise / avg_output
    } else {
        0.0
    };
    let response_ratio = if expected_rise > 0.0 {
        temp_rise / expected_rise
    } else {
        0.0
    };

    let outputs: Vec<f32> = data.iter().map(|s| s.output).collect();
    let saturated = data.iter().filter(|s| s.output > SATURATED_OUTPUT).count();

    SystemCharacteristics {
        rise_time,
        avg_response_rate,
        system_gain,
        temp_rise,
        expected_rise,
        response_ratio,
        output_variance: analysis::variance(&outputs),
        output_saturation: saturated as f32 / data.len() as f32,
        slope_variance: analysis::slope_variance(data),
        dead_time: analysis::dead_time(data, DEAD_TIME_RISE_C),
        test_duration,
        avg_output,
    }
}

/// Map characteristics to a responsiveness class, a system kind, and
/// starting search parameters. Pure and deterministic.
pub fn classify(ch: &SystemCharacteristics) -> StartingParams {
    let (responsiveness, mut kind, mut kp, mut step) =
        if ch.rise_time < 30.0 && ch.avg_response_rate > 0.15 {
            (Responsiveness::Fast, SystemKind::Responsive, 0.02, 0.01)
        } else if ch.rise_time < 90.0 && ch.avg_response_rate > 0.05 {
            (Responsiveness::Medium, SystemKind::Normal, 0.05, 0.025)
        } else {
            (Responsiveness::Slow, SystemKind::Sluggish, 0.1, 0.05)
        };

    // Kind overrides, most specific last.
    if ch.dead_time > 15.0 {
        kind = SystemKind::Sluggish;
    }
    if ch.output_saturation > 0.8 {
        kind = SystemKind::PowerLimited;
    }
    if ch.slope_variance > 0.01 {
        kind = SystemKind::Noisy;
    }

    // High-gain plants need smaller probes, and vice versa.
    if ch.system_gain > 0.0 {
        let factor = (1.0 / ch.system_gain).clamp(0.5, 2.0);
        kp *= factor;
        step *= factor;
    }
    // Long dead time: slow everything down.
    if ch.dead_time > 10.0 {
        let factor = (1.0 - ch.dead_time / 60.0).max(0.3);
        kp *= factor;
        step *= factor;
    }
    // Power-limited plants tolerate (and need) more gain.
    if ch.output_saturation > 0.7 {
        kp *= 1.5;
        step *= 1.2;
    }
    // Noisy plants get a haircut.
    if ch.slope_variance > 0.01 {
        kp *= 0.8;
        step *= 0.8;
    }

    StartingParams {
        responsiveness,
        kind,
        starting_kp: kp.clamp(0.005, 0.5),
        step_size: step.clamp(0.005, 0.2),
        base_step_size: step.clamp(0.005, 0.1),
    }
}
