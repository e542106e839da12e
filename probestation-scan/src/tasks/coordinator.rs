//! Scan coordinator
//!
//! Consumes descriptors until the producer is done and the queue is empty.
//! Each device is moved under the probes, screened, and handed to the task
//! sink for a full test when screening passed. At most one measurement is
//! in flight at any time. When the queue is exhausted the stage returns to
//! the center point, unless the scan was aborted.

use std::fs;
use std::sync::Arc;

use embassy_futures::select::{select, Either};
use embassy_time::{with_timeout, Duration};
use log::{debug, error, info, trace, warn};

use probestation_core::config::ScanTiming;
use probestation_core::motion::ReferencePoint;
use probestation_core::scheduler::Progress;
use probestation_core::state::{DeviceEvent, DevicePhase};

use crate::descriptor::DeviceTaskDescriptor;
use crate::error::{MoveError, ScanError};
use crate::observer::{ScanEvent, ScanObserver};
use crate::procedures::{self, Screening, ScreeningOutcome, SweepStop, CANCEL_GRACE};
use crate::rack::{InstrumentRack, Instruments};
use crate::report::{DeviceOutcome, DeviceRecord, ScanReport};
use crate::shared::{Flag, MeasurementTicket, SharedScanState};
use crate::sink::{FullTestJob, TaskSink};
use crate::stage::MotionEngine;

/// Phase of the device being processed
struct DeviceRun {
    name: String,
    phase: DevicePhase,
}

impl DeviceRun {
    fn advance(&mut self, event: DeviceEvent) {
        let next = self.phase.transition(event);
        trace!("{}: {:?} --{:?}--> {:?}", self.name, self.phase, event, next);
        self.phase = next;
    }
}

/// Consumer side of a scan
pub struct ScanCoordinator {
    shared: Arc<SharedScanState>,
    engine: Arc<MotionEngine>,
    rack: Box<dyn InstrumentRack>,
    sink: Box<dyn TaskSink>,
    observer: Arc<dyn ScanObserver>,
    timing: ScanTiming,
}

impl ScanCoordinator {
    pub fn new(
        shared: Arc<SharedScanState>,
        engine: Arc<MotionEngine>,
        rack: Box<dyn InstrumentRack>,
        sink: Box<dyn TaskSink>,
        observer: Arc<dyn ScanObserver>,
        timing: ScanTiming,
    ) -> Self {
        Self {
            shared,
            engine,
            rack,
            sink,
            observer,
            timing,
        }
    }

    /// Coordinator worker body
    ///
    /// `consumerDone` is set on every exit path, including errors.
    pub async fn run(mut self) -> Result<ScanReport, ScanError> {
        let _done = self.shared.done_on_drop(Flag::ConsumerDone);
        let mut report = ScanReport::default();

        while let Some(descriptor) = self.next_descriptor().await {
            let record = self.process(descriptor).await?;
            self.observer.on_event(&ScanEvent::DeviceFinished(record.clone()));
            self.observer.on_event(&ScanEvent::Progress(record.progress));
            report.devices.push(record);

            if self.shared.abort_requested() {
                break;
            }
        }

        report.aborted = self.shared.abort_requested();
        if report.aborted {
            warn!("Scan aborted, stage left in place");
        } else {
            info!("Queue exhausted, returning to center");
            match self
                .engine
                .goto_point(ReferencePoint::Center, self.shared.flag(Flag::AbortRequested))
                .await
            {
                Ok(()) => report.returned_to_center = true,
                Err(e) => warn!("Return to center failed: {}", e),
            }
        }

        self.observer.on_event(&ScanEvent::ScanFinished {
            aborted: report.aborted,
            devices: report.devices.len(),
        });
        Ok(report)
    }

    /// Next descriptor, or `None` once the producer is done and the queue empty
    async fn next_descriptor(&self) -> Option<DeviceTaskDescriptor> {
        let queue = self.shared.queue();
        loop {
            if let Ok(descriptor) = queue.try_receive() {
                return Some(descriptor);
            }
            if self.shared.get(Flag::ProducerDone) {
                // The last send may land just before the flag is set
                return queue.try_receive().ok();
            }
            match select(queue.receive(), self.shared.wait_until(Flag::ProducerDone, true)).await {
                Either::First(descriptor) => return Some(descriptor),
                Either::Second(()) => continue,
            }
        }
    }

    async fn process(&mut self, descriptor: DeviceTaskDescriptor) -> Result<DeviceRecord, ScanError> {
        let index = descriptor.index();
        self.observer.on_event(&ScanEvent::DeviceStarted {
            index,
            name: descriptor.name().to_string(),
        });

        let mut run = DeviceRun {
            name: descriptor.name().to_string(),
            phase: DevicePhase::PendingMove,
        };
        let outcome = self.measure(&descriptor, &mut run).await?;

        if outcome == DeviceOutcome::Aborted {
            run.advance(DeviceEvent::Abort);
        } else if self.shared.get(Flag::ProducerDone) && self.shared.queue().is_empty() {
            run.advance(DeviceEvent::QueueExhausted);
        } else {
            run.advance(DeviceEvent::NextQueued);
        }
        debug!("{} finished in {:?}", run.name, run.phase);

        Ok(DeviceRecord {
            index,
            name: run.name,
            seed: descriptor.seed(),
            outcome,
            progress: Progress::after(&index, &descriptor.dims()),
        })
    }

    fn aborted(&self) -> bool {
        self.shared.abort_requested()
    }

    /// Move, screen and full test one device
    async fn measure(
        &mut self,
        descriptor: &DeviceTaskDescriptor,
        run: &mut DeviceRun,
    ) -> Result<DeviceOutcome, ScanError> {
        if self.aborted() {
            return Ok(DeviceOutcome::Aborted);
        }

        if let Err(e) = fs::create_dir_all(descriptor.output_dir()) {
            warn!("Cannot create {}: {}", descriptor.output_dir().display(), e);
            run.advance(DeviceEvent::MoveRejected);
            return Ok(DeviceOutcome::OutputUnavailable);
        }

        if let Some(outcome) = self.move_to_device(descriptor, run).await {
            return Ok(outcome);
        }
        if self.aborted() {
            return Ok(DeviceOutcome::Aborted);
        }

        let instruments = self.rack.prepare(descriptor);
        let screening = match self.screen(descriptor, &instruments).await? {
            Ok(screening) => screening,
            Err(outcome) => return Ok(outcome),
        };

        if !self.shared.get(Flag::DeviceScreeningPassed) {
            run.advance(DeviceEvent::ScreeningFailed);
            run.advance(DeviceEvent::FullTestSkipped);
            run.advance(DeviceEvent::Recorded);
            return Ok(DeviceOutcome::ScreeningFailed(screening));
        }
        run.advance(DeviceEvent::ScreeningPassed);

        if !run.phase.full_test_allowed() {
            return Ok(DeviceOutcome::Aborted);
        }
        let outcome = self.full_test(descriptor, instruments, screening).await?;
        run.advance(DeviceEvent::FullTestSubmitted);
        run.advance(DeviceEvent::Recorded);
        Ok(outcome)
    }

    /// Returns the outcome when the device is to be skipped
    async fn move_to_device(
        &self,
        descriptor: &DeviceTaskDescriptor,
        run: &mut DeviceRun,
    ) -> Option<DeviceOutcome> {
        let target = match self.engine.compute_target_coordinates(descriptor.index()).await {
            Ok(target) => target,
            Err(e) => {
                warn!("{}: {}", descriptor.name(), e);
                run.advance(DeviceEvent::MoveRejected);
                return Some(match e {
                    MoveError::OutOfRange { .. } => DeviceOutcome::OutOfRange,
                    _ => DeviceOutcome::MoveFailed,
                });
            }
        };

        run.advance(DeviceEvent::MoveIssued);
        match self
            .engine
            .move_to(target, self.shared.flag(Flag::AbortRequested))
            .await
        {
            Ok(()) => {
                run.advance(DeviceEvent::MoveCompleted);
                None
            }
            Err(MoveError::EmergencyStop) => Some(DeviceOutcome::Aborted),
            Err(e) => {
                warn!("{}: move failed: {}", descriptor.name(), e);
                run.advance(DeviceEvent::MoveRejected);
                Some(match e {
                    MoveError::OutOfRange { .. } => DeviceOutcome::OutOfRange,
                    _ => DeviceOutcome::MoveFailed,
                })
            }
        }
    }

    /// Claim the single measurement slot, waiting for a previous one
    ///
    /// Returns `None` when the scan is aborted while waiting.
    async fn acquire_ticket(&self) -> Option<MeasurementTicket> {
        loop {
            if self.aborted() {
                return None;
            }
            if let Some(ticket) = self.shared.begin_measurement() {
                return Some(ticket);
            }
            debug!("Waiting for previous measurement to finish");
            let _ = with_timeout(
                self.shared.poll_interval(),
                self.shared.wait_until(Flag::MeasurementInFlight, false),
            )
            .await;
        }
    }

    /// Run screening; the inner `Err` is the outcome of a device that
    /// ends here without a verdict
    async fn screen(
        &self,
        descriptor: &DeviceTaskDescriptor,
        instruments: &Instruments,
    ) -> Result<Result<ScreeningOutcome, DeviceOutcome>, ScanError> {
        let Some(ticket) = self.acquire_ticket().await else {
            return Ok(Err(DeviceOutcome::Aborted));
        };

        self.shared.set(Flag::DeviceScreeningPassed, false);
        let procedure = Screening::new(
            instruments.bias.clone(),
            *descriptor.sweep(),
            Arc::clone(&self.shared),
            ticket.generation(),
        );
        let handle = procedures::spawn(procedure)?;
        ticket.register_cancel(handle.cancel_token());

        let timeout = Duration::from_millis(self.timing.screening_timeout_ms as u64);
        let outcome = match handle.join(timeout).await {
            Ok(outcome) => {
                ticket.finish();
                outcome
            }
            Err(e) => {
                warn!("{}: {}", descriptor.name(), e);
                if !e.stopped {
                    error!("{}: screening ignored its cancel, releasing anyway", descriptor.name());
                }
                self.shared.abandon_measurement();
                // A cancel racing the last point can leave a passing bias on
                match instruments.bias.try_lock() {
                    Some(mut bias) => {
                        if let Err(e) = bias.safe_shutdown() {
                            warn!("{}: bias shutdown failed: {:?}", descriptor.name(), e);
                        }
                    }
                    None => error!("{}: bias still held by screening", descriptor.name()),
                }
                drop(ticket);
                self.shared.set(Flag::DeviceScreeningPassed, false);
                return Ok(Err(DeviceOutcome::TimedOut));
            }
        };

        if self.aborted() {
            return Ok(Err(DeviceOutcome::Aborted));
        }
        if outcome.stop == SweepStop::Cancelled {
            info!("{}: screening cancelled", descriptor.name());
            return Ok(Err(DeviceOutcome::Cancelled));
        }
        Ok(Ok(outcome))
    }

    /// Submit the full test and wait for its completion signal
    async fn full_test(
        &mut self,
        descriptor: &DeviceTaskDescriptor,
        instruments: Instruments,
        screening: ScreeningOutcome,
    ) -> Result<DeviceOutcome, ScanError> {
        let Some(ticket) = self.acquire_ticket().await else {
            return Ok(DeviceOutcome::Aborted);
        };
        let generation = ticket.generation();

        self.sink.submit(FullTestJob {
            descriptor: descriptor.clone(),
            instruments,
            ticket,
        })?;

        let timeout = Duration::from_millis(self.timing.full_test_timeout_ms as u64);
        if with_timeout(timeout, self.shared.wait_until(Flag::MeasurementInFlight, false))
            .await
            .is_err()
        {
            warn!("{}: full test timed out, cancelling", descriptor.name());
            self.shared.cancel_active_measurement();
            if with_timeout(CANCEL_GRACE, self.shared.wait_until(Flag::MeasurementInFlight, false))
                .await
                .is_err()
            {
                error!("{}: full test ignored its cancel, releasing anyway", descriptor.name());
            }
            self.shared.abandon_measurement();
            return Ok(DeviceOutcome::TimedOut);
        }

        let Some(full_test) = self.shared.take_full_test(generation) else {
            // Abandoned by an abort
            return Ok(if self.aborted() {
                DeviceOutcome::Aborted
            } else {
                DeviceOutcome::Cancelled
            });
        };

        Ok(match full_test.stop {
            SweepStop::Completed => DeviceOutcome::Passed {
                screening,
                full_test,
            },
            SweepStop::Cancelled if self.aborted() => DeviceOutcome::Aborted,
            SweepStop::Cancelled => DeviceOutcome::Cancelled,
            SweepStop::OverLimit | SweepStop::InstrumentFault => DeviceOutcome::FullTestStopped {
                screening,
                full_test,
            },
        })
    }
}
