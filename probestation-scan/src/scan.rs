//! Scanner
//!
//! Owns the shared scan state and the motion engine, and starts scans. A
//! scan runs on two worker threads (producer and coordinator), each driving
//! its async body with `block_on`. Only one scan runs at a time.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use futures::executor::block_on;
use log::{error, info};
use parking_lot::Mutex;

use crate::abort::AbortCoordinator;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::observer::{LogObserver, ScanObserver};
use crate::rack::{InstrumentRack, SimulatedRack};
use crate::report::ScanReport;
use crate::shared::{Flag, SharedScanState};
use crate::sink::{TaskSink, ThreadedSink};
use crate::stage::MotionEngine;
use crate::tasks::{ProducerOutcome, ScanCoordinator, TaskProducer};

/// Scan entry point
pub struct Scanner {
    config: ScanConfig,
    shared: Arc<SharedScanState>,
    engine: Arc<MotionEngine>,
    observer: Arc<dyn ScanObserver>,
    start_lock: Mutex<()>,
}

impl Scanner {
    pub fn new(config: ScanConfig, engine: MotionEngine) -> Self {
        let shared = Arc::new(SharedScanState::new(config.timing.queue_poll_ms));
        Self {
            config,
            shared,
            engine: Arc::new(engine),
            observer: Arc::new(LogObserver),
            start_lock: Mutex::new(()),
        }
    }

    /// Scanner on a simulated stage
    pub fn simulated(config: ScanConfig) -> Self {
        let engine = MotionEngine::simulated(&config.stage, config.timing.motion());
        Self::new(config, engine)
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<MotionEngine> {
        &self.engine
    }

    pub fn shared(&self) -> &Arc<SharedScanState> {
        &self.shared
    }

    pub fn abort_coordinator(&self) -> AbortCoordinator {
        AbortCoordinator::new(Arc::clone(&self.shared), Arc::clone(&self.engine))
    }

    /// Start a scan
    ///
    /// Configuration is validated before anything else happens; a bad
    /// configuration or a scan already running leaves all state untouched.
    pub fn start(
        &self,
        rack: Box<dyn InstrumentRack>,
        sink: Box<dyn TaskSink>,
    ) -> Result<ScanHandle, ScanError> {
        self.config.validate()?;

        let _starting = self.start_lock.lock();
        if !self.shared.is_idle() {
            return Err(ScanError::AlreadyRunning);
        }

        self.shared.reset();
        self.engine.rearm();
        let dims = self.config.wafer.dims();
        block_on(self.engine.compute_axis_delta(&dims));
        info!(
            "Starting scan of {} ({} devices)",
            self.config.wafer.name,
            dims.device_count()
        );

        let producer = TaskProducer::new(
            Arc::clone(&self.shared),
            self.config.wafer.clone(),
            self.config.sweep,
        );
        let coordinator = ScanCoordinator::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.engine),
            rack,
            sink,
            Arc::clone(&self.observer),
            self.config.timing.scan(),
        );

        let producer = thread::Builder::new()
            .name("producer".to_string())
            .spawn(move || block_on(producer.run()))
            .map_err(|source| {
                self.shared.set(Flag::ProducerDone, true);
                self.shared.set(Flag::ConsumerDone, true);
                ScanError::Spawn {
                    name: "producer",
                    source,
                }
            })?;

        let coordinator = match thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || block_on(coordinator.run()))
        {
            Ok(handle) => handle,
            Err(source) => {
                error!("Coordinator failed to start, stopping producer");
                self.shared.set(Flag::AbortRequested, true);
                self.shared.set(Flag::ConsumerDone, true);
                let _ = producer.join();
                return Err(ScanError::Spawn {
                    name: "coordinator",
                    source,
                });
            }
        };

        Ok(ScanHandle {
            producer,
            coordinator,
            abort: self.abort_coordinator(),
        })
    }

    /// Start a scan with simulated source meters and threaded full tests
    pub fn start_simulated(&self) -> Result<ScanHandle, ScanError> {
        self.start(Box::new(SimulatedRack::default()), Box::new(ThreadedSink::new()))
    }
}

/// Results of a finished scan
#[derive(Debug)]
pub struct ScanSummary {
    pub producer: ProducerOutcome,
    pub report: ScanReport,
}

/// Handle to a running scan
pub struct ScanHandle {
    producer: JoinHandle<Result<ProducerOutcome, ScanError>>,
    coordinator: JoinHandle<Result<ScanReport, ScanError>>,
    abort: AbortCoordinator,
}

impl ScanHandle {
    /// Abort the scan (idempotent)
    pub fn abort(&self) {
        block_on(self.abort.abort_all());
    }

    /// Cancel the running measurement, keep scanning
    pub fn abort_current(&self) -> bool {
        self.abort.abort_current()
    }

    pub fn abort_coordinator(&self) -> AbortCoordinator {
        self.abort.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.producer.is_finished() && self.coordinator.is_finished()
    }

    /// Wait for both workers
    ///
    /// A producer failure (such as an unusable output root) is reported
    /// after the coordinator has finished too.
    pub fn join(self) -> Result<ScanSummary, ScanError> {
        let producer = self
            .producer
            .join()
            .map_err(|_| ScanError::WorkerPanicked("producer"))?;
        let report = self
            .coordinator
            .join()
            .map_err(|_| ScanError::WorkerPanicked("coordinator"))??;

        Ok(ScanSummary {
            producer: producer?,
            report,
        })
    }
}
