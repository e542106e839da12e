//! Abort handling
//!
//! `abort_all` stops the stage, empties the queue and cancels the running
//! measurement. It is idempotent: calling it again while the abort is in
//! progress only re-confirms the emergency stop.

use std::sync::Arc;

use embassy_time::{with_timeout, Duration};
use log::{info, warn};

use crate::shared::{Flag, SharedScanState};
use crate::stage::MotionEngine;

/// How long an abort waits for the producer to notice it
const PRODUCER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Stops a running scan; cheap to clone into UI or signal handlers
#[derive(Clone)]
pub struct AbortCoordinator {
    shared: Arc<SharedScanState>,
    engine: Arc<MotionEngine>,
}

impl AbortCoordinator {
    pub fn new(shared: Arc<SharedScanState>, engine: Arc<MotionEngine>) -> Self {
        Self { shared, engine }
    }

    pub fn is_aborting(&self) -> bool {
        self.shared.abort_requested()
    }

    /// Abort the whole scan
    pub async fn abort_all(&self) {
        if self.shared.swap(Flag::AbortRequested, true) {
            info!("Abort already requested, confirming stop");
            self.engine.emergency_stop().await;
            return;
        }

        warn!("Aborting scan");
        self.engine.emergency_stop().await;

        let mut drained = self.shared.drain_queue();
        if with_timeout(
            PRODUCER_STOP_TIMEOUT,
            self.shared.wait_until(Flag::ProducerDone, true),
        )
        .await
        .is_err()
        {
            warn!("Producer did not stop in time");
        }
        drained += self.shared.drain_queue();
        if drained > 0 {
            info!("Dropped {} queued devices", drained);
        }

        if self.shared.cancel_active_measurement() {
            info!("Cancelled running measurement");
        }
        self.shared.set(Flag::DeviceScreeningPassed, false);
        self.shared.abandon_measurement();
    }

    /// Cancel the running measurement only; the scan moves on
    ///
    /// Returns whether a measurement was running.
    pub fn abort_current(&self) -> bool {
        let cancelled = self.shared.cancel_active_measurement();
        if cancelled {
            info!("Cancelling current measurement");
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::descriptor::DeviceTaskDescriptor;
    use crate::procedures::CancelToken;
    use futures::executor::block_on;
    use probestation_core::config::{MotionTiming, SweepParameters};
    use probestation_core::scheduler::{DeviceIndex, GridDims};
    use std::path::Path;

    fn setup() -> (AbortCoordinator, Arc<SharedScanState>, Arc<MotionEngine>) {
        let shared = Arc::new(SharedScanState::new(1));
        shared.reset();
        let timing = MotionTiming {
            poll_interval_ms: 1,
            settle_ms: 0,
            stop_timeout_ms: 100,
        };
        let engine = Arc::new(MotionEngine::simulated(&StageConfig::default(), timing));
        let abort = AbortCoordinator::new(Arc::clone(&shared), Arc::clone(&engine));
        (abort, shared, engine)
    }

    fn queue_device(shared: &SharedScanState, dev_row: u16) {
        let descriptor = DeviceTaskDescriptor::new(
            "W",
            Path::new("/tmp"),
            Path::new("/tmp/scan"),
            DeviceIndex::new(0, 0, 0, dev_row),
            GridDims::new(1, 1, 1, 4),
            SweepParameters::default(),
        );
        shared.queue().try_send(descriptor).unwrap();
    }

    #[test]
    fn test_abort_all_protocol() {
        let (abort, shared, engine) = setup();
        queue_device(&shared, 0);
        queue_device(&shared, 1);
        shared.set(Flag::ProducerDone, true);
        shared.set(Flag::DeviceScreeningPassed, true);

        let ticket = shared.begin_measurement().unwrap();
        let token = CancelToken::new();
        ticket.register_cancel(token.clone());

        block_on(abort.abort_all());

        assert!(abort.is_aborting());
        assert_eq!(engine.emergency_stop_count(), 1);
        assert!(shared.queue().is_empty());
        assert!(token.is_cancelled());
        assert!(!shared.get(Flag::DeviceScreeningPassed));
        assert!(!shared.get(Flag::MeasurementInFlight));

        // Late completion of the cancelled measurement changes nothing
        ticket.finish();
        assert!(!shared.get(Flag::MeasurementInFlight));
    }

    #[test]
    fn test_abort_all_idempotent() {
        let (abort, shared, engine) = setup();
        shared.set(Flag::ProducerDone, true);

        block_on(abort.abort_all());
        block_on(abort.abort_all());
        assert_eq!(engine.emergency_stop_count(), 1);
        assert!(engine.is_halted());
    }

    #[test]
    fn test_abort_current_leaves_scan_running() {
        let (abort, shared, engine) = setup();
        assert!(!abort.abort_current());

        let ticket = shared.begin_measurement().unwrap();
        let token = CancelToken::new();
        ticket.register_cancel(token.clone());

        assert!(abort.abort_current());
        assert!(token.is_cancelled());
        assert!(!abort.is_aborting());
        assert_eq!(engine.emergency_stop_count(), 0);
        assert!(shared.get(Flag::MeasurementInFlight));
    }
}
