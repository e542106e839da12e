//! Screening evaluation
//!
//! A device passes screening when the largest current seen during the
//! bias ramp reaches [`SCREENING_PASS_CURRENT_A`]. Open or broken devices
//! stay in the noise floor and fail.

/// Minimum peak current for a device to pass screening (amps)
pub const SCREENING_PASS_CURRENT_A: f64 = 10e-9;

/// Outcome of one measured point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepOutcome {
    /// Keep sweeping
    Continue,
    /// Current exceeded the limit, stop sweeping
    OverLimit,
}

/// Screening verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

/// Convert a current limit in microamps to amps
pub fn limit_amps(limit_ua: f64) -> f64 {
    limit_ua * 1e-6
}

/// Running evaluation of a sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreeningTracker {
    limit_a: f64,
    max_current_a: f64,
    samples: u32,
}

impl ScreeningTracker {
    /// Track a sweep with the given current limit in microamps
    pub fn new(limit_ua: f64) -> Self {
        Self {
            limit_a: limit_amps(limit_ua),
            max_current_a: 0.0,
            samples: 0,
        }
    }

    /// Record one current reading
    pub fn record(&mut self, current_a: f64) -> StepOutcome {
        self.samples += 1;
        if current_a > self.max_current_a {
            self.max_current_a = current_a;
        }

        if current_a > self.limit_a {
            StepOutcome::OverLimit
        } else {
            StepOutcome::Continue
        }
    }

    /// Largest current seen so far
    pub fn max_current(&self) -> f64 {
        self.max_current_a
    }

    /// Number of readings recorded
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Verdict from the readings so far
    pub fn verdict(&self) -> Verdict {
        if self.max_current_a >= SCREENING_PASS_CURRENT_A {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}
