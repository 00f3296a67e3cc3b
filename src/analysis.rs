//! Response analysis: pure metric functions over recorded sample slices.
//!
//! Every function here is total over arbitrary input. Slices that are too
//! short to measure return a neutral value (0.0) rather than erroring;
//! callers that need a minimum sample count enforce it before analyzing.

use crate::sample::Sample;

/// Population variance. Fewer than two values yields 0.0.
pub fn variance(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n
}

/// 10%-to-90% rise time between `initial` and `final_value`.
///
/// Finds the first sample at or above each threshold and returns the time
/// between them. Returns 0.0 when either threshold is never crossed.
pub fn rise_time_10_90(samples: &[Sample], initial: f32, final_value: f32) -> f32 {
    let span = final_value - initial;
    let temp10 = initial + span * 0.1;
    let temp90 = initial + span * 0.9;

    let mut t10 = None;
    let mut t90 = None;
    for s in samples {
        if t10.is_none() && s.temperature >= temp10 {
            t10 = Some(s.time);
        }
        if t90.is_none() && s.temperature >= temp90 {
            t90 = Some(s.time);
        }
        if t90.is_some() {
            break;
        }
    }
    match (t10, t90) {
        (Some(a), Some(b)) if b >= a => b - a,
        _ => 0.0,
    }
}

/// Peak excursion above `target`, as a percentage of `target`.
/// Never negative; non-positive targets and empty slices yield 0.0.
pub fn overshoot_percent(samples: &[Sample], target: f32) -> f32 {
    if target <= 0.0 {
        return 0.0;
    }
    let peak = peak_temperature(samples);
    ((peak - target) / target * 100.0).max(0.0)
}

/// Length of the trailing interval the response spent inside the +/-2%
/// band around `final_value` (s): time from the last band exit to the end
/// of the slice. 0.0 when the final sample is still out of band; the whole
/// slice duration when the band was never left.
pub fn settling_time(samples: &[Sample], final_value: f32) -> f32 {
    let tolerance = (final_value * 0.02).abs();
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return 0.0;
    };
    for s in samples.iter().rev() {
        if (s.temperature - final_value).abs() > tolerance {
            return last.time - s.time;
        }
    }
    last.time - first.time
}

/// Time from the start of the slice until the temperature first rises
/// `threshold_c` above its starting value. 0.0 when it never does.
pub fn dead_time(samples: &[Sample], threshold_c: f32) -> f32 {
    let Some(first) = samples.first() else {
        return 0.0;
    };
    for s in &samples[1..] {
        if s.temperature >= first.temperature + threshold_c {
            return s.time - first.time;
        }
    }
    0.0
}

/// Highest temperature in the slice. Empty slices yield 0.0.
pub fn peak_temperature(samples: &[Sample]) -> f32 {
    samples
        .iter()
        .map(|s| s.temperature)
        .fold(0.0f32, f32::max)
}

/// Mean heater output over the slice. Empty slices yield 0.0.
pub fn average_output(samples: &[Sample]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.output).sum::<f32>() / samples.len() as f32
}

/// Temperature slopes between consecutive samples (degrees C per second).
/// Pairs with a non-positive time delta are skipped.
pub fn slopes(samples: &[Sample]) -> Vec<f32> {
    samples
        .windows(2)
        .filter(|w| w[1].time > w[0].time)
        .map(|w| (w[1].temperature - w[0].temperature) / (w[1].time - w[0].time))
        .collect()
}

/// Variance of the consecutive-sample slopes; a noise indicator.
pub fn slope_variance(samples: &[Sample]) -> f32 {
    variance(&slopes(samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(t0: f32, t1: f32, temp0: f32, temp1: f32, step: f32) -> Vec<Sample> {
        let mut out = Vec::new();
        let mut t = t0;
        while t <= t1 + 1e-3 {
            let frac = (t - t0) / (t1 - t0);
            out.push(Sample {
                time: t,
                temperature: temp0 + (temp1 - temp0) * frac,
                setpoint: temp1,
                output: 1.0,
            });
            t += step;
        }
        out
    }

    #[test]
    fn rise_time_on_linear_ramp() {
        // 20 -> 40 over 0..100 s: 10% (22 C) at t=10, 90% (38 C) at t=90.
        let data = ramp(0.0, 100.0, 20.0, 40.0, 1.0);
        let rise = rise_time_10_90(&data, 20.0, 40.0);
        assert!((rise - 80.0).abs() < 1.5, "rise was {rise}");
    }

    #[test]
    fn rise_time_zero_when_thresholds_never_crossed() {
        let data = ramp(0.0, 50.0, 20.0, 21.0, 1.0);
        assert_eq!(rise_time_10_90(&data, 20.0, 40.0), 0.0);
        assert_eq!(rise_time_10_90(&[], 20.0, 40.0), 0.0);
    }

    #[test]
    fn overshoot_is_never_negative() {
        let under = ramp(0.0, 30.0, 20.0, 35.0, 1.0);
        assert_eq!(overshoot_percent(&under, 40.0), 0.0);

        let mut over = ramp(0.0, 30.0, 20.0, 44.0, 1.0);
        let ov = overshoot_percent(&over, 40.0);
        assert!((ov - 10.0).abs() < 0.1, "overshoot was {ov}");
        over.clear();
        assert_eq!(overshoot_percent(&over, 40.0), 0.0);
    }

    #[test]
    fn settling_time_is_the_trailing_in_band_interval() {
        // Out of band through t=40, then settled at 40 C from t=41..100:
        // the response has been settled for 60 s.
        let mut data: Vec<Sample> = (0..=100)
            .map(|t| Sample {
                time: t as f32,
                temperature: if t <= 40 { 30.0 } else { 40.0 },
                setpoint: 40.0,
                output: 0.3,
            })
            .collect();
        assert_eq!(settling_time(&data, 40.0), 60.0);

        // Still out of band at the end: not settled at all.
        data.push(Sample {
            time: 101.0,
            temperature: 30.0,
            setpoint: 40.0,
            output: 0.3,
        });
        assert_eq!(settling_time(&data, 40.0), 0.0);

        // Never leaving the band counts the whole window as settled.
        let flat = ramp(0.0, 20.0, 40.0, 40.0, 1.0);
        assert_eq!(settling_time(&flat, 40.0), 20.0);
    }

    #[test]
    fn dead_time_measures_initial_lag() {
        let mut data = vec![
            Sample {
                time: 0.0,
                temperature: 20.0,
                setpoint: 25.0,
                output: 1.0,
            };
            6
        ];
        for (i, s) in data.iter_mut().enumerate() {
            s.time = i as f32 * 2.0;
        }
        data.push(Sample {
            time: 12.0,
            temperature: 20.2,
            setpoint: 25.0,
            output: 1.0,
        });
        assert!((dead_time(&data, 0.1) - 12.0).abs() < 1e-3);
        assert_eq!(dead_time(&data[..2], 0.1), 0.0);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(&[3.0, 3.0, 3.0]), 0.0);
        assert_eq!(variance(&[3.0]), 0.0);
        assert!(variance(&[1.0, 3.0]) > 0.0);
    }

    #[test]
    fn slope_variance_flags_noise() {
        let clean = ramp(0.0, 30.0, 20.0, 30.0, 1.0);
        let mut noisy = clean.clone();
        for (i, s) in noisy.iter_mut().enumerate() {
            s.temperature += if i % 2 == 0 { 0.5 } else { -0.5 };
        }
        assert!(slope_variance(&noisy) > slope_variance(&clean));
    }
}
