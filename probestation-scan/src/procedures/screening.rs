//! Screening (IV pretest)
//!
//! Ramps the bias from zero to its maximum and records the current at
//! every step. The pass/fail decision is written to the shared
//! `deviceScreeningPassed` flag; a passing device keeps its bias output on
//! for the full test, a failing one is ramped down and switched off. A
//! screening whose measurement was abandoned (timed out or aborted) writes
//! nothing and always switches its bias off.

use std::sync::Arc;

use log::{debug, info, warn};

use probestation_core::config::SweepParameters;
use probestation_core::measurement::{
    bias_points, limit_amps, source_range_for, ScreeningTracker, StepOutcome, Verdict,
};
use probestation_core::traits::{Instrument, InstrumentError};

use super::{point_delay, CancelToken, Procedure, SweepStop};
use crate::rack::SharedInstrument;
use crate::shared::SharedScanState;

/// Result of one screening run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreeningOutcome {
    pub verdict: Verdict,
    pub max_current_a: f64,
    pub samples: u32,
    pub stop: SweepStop,
}

/// Screening procedure for one device
pub struct Screening {
    bias: SharedInstrument,
    sweep: SweepParameters,
    shared: Arc<SharedScanState>,
    generation: u64,
}

impl Screening {
    /// `generation` is the measurement ticket the verdict belongs to
    pub fn new(
        bias: SharedInstrument,
        sweep: SweepParameters,
        shared: Arc<SharedScanState>,
        generation: u64,
    ) -> Self {
        Self {
            bias,
            sweep,
            shared,
            generation,
        }
    }

    fn ramp(
        &self,
        bias: &mut dyn Instrument,
        tracker: &mut ScreeningTracker,
        cancel: &CancelToken,
    ) -> Result<SweepStop, InstrumentError> {
        let range = source_range_for(self.sweep.bias_max_v());
        let limit = limit_amps(self.sweep.bias_current_limit_ua);
        bias.configure(range, limit, self.sweep.nplc_screening)?;
        bias.enable_output()?;

        for volts in bias_points(self.sweep.bias_max_mv, self.sweep.bias_step_mv) {
            if cancel.is_cancelled() {
                warn!("Screening cancelled");
                return Ok(SweepStop::Cancelled);
            }

            bias.ramp_to(volts)?;
            point_delay(self.sweep.delay_ms, cancel);
            let current = bias.current_reading()?;
            debug!("Screening {:.4} V: {:e} A", volts, current);

            if tracker.record(current) == StepOutcome::OverLimit {
                info!("Screening stopped, current too high ({:e} A)", current);
                return Ok(SweepStop::OverLimit);
            }
        }
        Ok(SweepStop::Completed)
    }
}

impl Procedure for Screening {
    type Output = ScreeningOutcome;

    fn name(&self) -> &'static str {
        "screening"
    }

    fn run(self, cancel: &CancelToken) -> ScreeningOutcome {
        let mut tracker = ScreeningTracker::new(self.sweep.bias_current_limit_ua);
        let mut bias = self.bias.lock();

        let stop = match self.ramp(&mut *bias, &mut tracker, cancel) {
            Ok(stop) => stop,
            Err(e) => {
                warn!("Screening instrument error: {:?}", e);
                SweepStop::InstrumentFault
            }
        };

        let verdict = match stop {
            SweepStop::Completed | SweepStop::OverLimit => tracker.verdict(),
            SweepStop::Cancelled | SweepStop::InstrumentFault => Verdict::Failed,
        };

        let current = self.shared.record_screening(self.generation, verdict.passed());
        if !current {
            warn!("Screening result discarded, measurement abandoned");
        } else if verdict.passed() {
            info!("Screening passed (max {:e} A)", tracker.max_current());
        } else {
            info!("Screening failed (max {:e} A), ramping bias down", tracker.max_current());
        }

        if !current || !verdict.passed() {
            if let Err(e) = bias.safe_shutdown() {
                warn!("Bias shutdown failed: {:?}", e);
            }
        }

        ScreeningOutcome {
            verdict,
            max_current_a: tracker.max_current(),
            samples: tracker.samples(),
            stop,
        }
    }
}
