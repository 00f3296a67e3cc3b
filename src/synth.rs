//! Gain synthesis: turn measured responses into PID gains.
//!
//! Two entry points, one per strategy. Both clamp their output into hard
//! bounds so a pathological measurement can never push absurd gains at
//! the plant.

use crate::inertia::InertiaProfile;

/// Synthesized PID gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

// Hard output bounds, step-response method.
pub const STEP_KP_BOUNDS: (f32, f32) = (0.01, 10.0);
pub const STEP_KI_BOUNDS: (f32, f32) = (0.001, 5.0);
pub const STEP_KD_BOUNDS: (f32, f32) = (0.0, 2.0);

// Hard output bounds, ultimate-gain method.
pub const ULT_KP_BOUNDS: (f32, f32) = (0.001, 20.0);
pub const ULT_KI_BOUNDS: (f32, f32) = (0.0001, 10.0);
pub const ULT_KD_BOUNDS: (f32, f32) = (0.0, 5.0);

/// Conservative gains used when the step response cannot be modeled.
pub const STEP_FALLBACK_GAINS: PidGains = PidGains {
    kp: 1.0,
    ki: 0.1,
    kd: 0.01,
};

// ---------------------------------------------------------------------------
// Step-response method
// ---------------------------------------------------------------------------

/// Measurements from a completed step-response window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepAnalysis {
    /// 10%-90% rise time (s); 0.0 when the thresholds were not crossed.
    pub rise_time: f32,
    /// Peak excursion above the stepped setpoint, percent.
    pub overshoot_percent: f32,
    /// Time to settle into the 2% band (s).
    pub settling_time: f32,
    /// Rise actually achieved (C).
    pub actual_step: f32,
    /// Rise the setpoint step asked for (C).
    pub expected_step: f32,
}

/// Ziegler-Nichols step-response synthesis.
///
/// Returns the gains and whether the fallback path was taken (no usable
/// rise was observed).
pub fn step_response_gains(a: &StepAnalysis) -> (PidGains, bool) {
    if a.rise_time <= 0.0 || a.expected_step <= 0.0 || a.actual_step <= 0.0 {
        return (STEP_FALLBACK_GAINS, true);
    }

    // First-order-plus-dead-time approximation from the rise time alone.
    let tau = a.rise_time / 2.8;
    let dead = a.rise_time * 0.1;
    let gain_ratio = a.actual_step / a.expected_step;

    let mut kp = 1.2 / gain_ratio * (tau / dead);
    let mut ki = kp / (2.0 * dead);
    let mut kd = kp * dead * 0.5;

    if !kp.is_finite() || !ki.is_finite() || !kd.is_finite() {
        return (STEP_FALLBACK_GAINS, true);
    }

    // Shade toward stability or agility based on the observed overshoot.
    if a.overshoot_percent > 10.0 {
        kp *= 0.7;
        ki *= 0.8;
        kd *= 1.2;
    } else if a.overshoot_percent < 2.0 {
        kp *= 1.1;
        ki *= 1.2;
        kd *= 0.9;
    }

    (
        PidGains {
            kp: kp.clamp(STEP_KP_BOUNDS.0, STEP_KP_BOUNDS.1),
            ki: ki.clamp(STEP_KI_BOUNDS.0, STEP_KI_BOUNDS.1),
            kd: kd.clamp(STEP_KD_BOUNDS.0, STEP_KD_BOUNDS.1),
        },
        false,
    )
}

// ---------------------------------------------------------------------------
// Ultimate-gain method
// ---------------------------------------------------------------------------

/// Result of ultimate-gain synthesis: the gains plus the inertia-adjusted
/// critical gain they were derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UltimateSynthesis {
    pub gains: PidGains,
    pub compensated_gain: f32,
}

/// Synthesize gains from the critical proportional gain found by the
/// burst-cycle search.
///
/// `overshoot_percent` is the final cycle's overshoot; it selects the
/// formula bucket and sharpens the inertia reduction. Total over any
/// non-negative finite inputs; outputs always land inside the declared
/// bounds.
pub fn ultimate_gains(
    critical_kp: f32,
    overshoot_percent: f32,
    inertia: Option<&InertiaProfile>,
) -> UltimateSynthesis {
    let kc = if critical_kp.is_finite() && critical_kp > 0.0 {
        critical_kp
    } else {
        0.0
    };

    // Knock the critical gain down in proportion to measured inertia;
    // harder when the final cycle also overshot.
    let kc = match inertia {
        Some(profile) => {
            let mut reduction = profile.severity.kp_reduction();
            if overshoot_percent > 10.0 {
                reduction *= 1.2;
            }
            kc * (1.0 - profile.compensation_factor * reduction)
        }
        None => kc,
    };

    // Overshoot-bucketed derivation. More overshoot means the plant is
    // already lively at this gain, so back further away from it.
    let (kp_coeff, ki_div_coeff, kd_coeff) = if overshoot_percent > 10.0 {
        (0.4, 0.8, 0.1)
    } else if overshoot_percent > 5.0 {
        (0.5, 0.6, 0.12)
    } else {
        (0.6, 0.5, 0.125)
    };

    let kp = kp_coeff * kc;
    let ki_denominator = ki_div_coeff * kc;
    let mut ki = if ki_denominator > f32::EPSILON {
        kp / ki_denominator
    } else {
        ULT_KI_BOUNDS.0
    };
    let mut kd = kd_coeff * kp * kc;

    if let Some(profile) = inertia {
        ki *= profile.severity.ki_scale();
        kd *= profile.severity.kd_scale();
    }

    UltimateSynthesis {
        gains: PidGains {
            kp: kp.clamp(ULT_KP_BOUNDS.0, ULT_KP_BOUNDS.1),
            ki: ki.clamp(ULT_KI_BOUNDS.0, ULT_KI_BOUNDS.1),
            kd: kd.clamp(ULT_KD_BOUNDS.0, ULT_KD_BOUNDS.1),
        },
        compensated_gain: kc,
    }
}
