//! Task producer
//!
//! Creates the scan output root, then enumerates the wafer grid and pushes
//! one descriptor per device onto the bounded queue, waiting while the
//! queue is full. Stops early when an abort is requested. `producerDone`
//! is set on every exit path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use embassy_futures::select::{select, Either};
use log::{debug, info, warn};

use probestation_core::config::SweepParameters;

use crate::config::{ConfigError, WaferConfig};
use crate::descriptor::DeviceTaskDescriptor;
use crate::error::ScanError;
use crate::shared::{Flag, SharedScanState};

/// Whether every device was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStatus {
    Complete,
    /// Stopped by an abort
    Incomplete,
}

/// Result of one producer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerOutcome {
    pub status: ProducerStatus,
    pub scan_root: PathBuf,
    pub emitted: u64,
}

/// Scan directory name: `<YYYY-MM-DD__HH-MM-SS>__<wafer>`
pub fn scan_root_name(wafer_name: &str, started: DateTime<Local>) -> String {
    format!("{}__{}", started.format("%Y-%m-%d__%H-%M-%S"), wafer_name)
}

/// Grid enumerator feeding the coordinator
pub struct TaskProducer {
    shared: Arc<SharedScanState>,
    wafer: WaferConfig,
    sweep: SweepParameters,
}

impl TaskProducer {
    pub fn new(shared: Arc<SharedScanState>, wafer: WaferConfig, sweep: SweepParameters) -> Self {
        Self { shared, wafer, sweep }
    }

    /// Create the scan output root for a scan started at `started`
    ///
    /// Missing parents are created; the scan directory itself must not
    /// exist yet.
    pub fn create_scan_root(&self, started: DateTime<Local>) -> Result<PathBuf, ScanError> {
        let save_root = &self.wafer.save_root;
        let scan_root = save_root.join(scan_root_name(&self.wafer.name, started));

        fs::create_dir_all(save_root)
            .and_then(|()| fs::create_dir(&scan_root))
            .map_err(|source| ScanError::OutputRoot {
                path: scan_root.clone(),
                source,
            })?;

        info!("Scan output in {}", scan_root.display());
        Ok(scan_root)
    }

    /// Producer worker body
    pub async fn run(self) -> Result<ProducerOutcome, ScanError> {
        let _done = self.shared.done_on_drop(Flag::ProducerDone);

        self.wafer.dims().validate().map_err(ConfigError::from)?;
        let scan_root = self.create_scan_root(Local::now())?;
        Ok(self.generate(&scan_root).await)
    }

    /// Emit descriptors for every device in grid order
    pub async fn generate(&self, scan_root: &Path) -> ProducerOutcome {
        let dims = self.wafer.dims();
        let queue = self.shared.queue();
        let mut emitted = 0;

        info!("Enumerating {} devices", dims.device_count());
        for index in dims.iter() {
            if self.shared.abort_requested() {
                return self.stopped(scan_root, emitted);
            }

            let descriptor = DeviceTaskDescriptor::new(
                &self.wafer.name,
                &self.wafer.save_root,
                scan_root,
                index,
                dims,
                self.sweep,
            );
            debug!("Queueing {} (seed {})", descriptor.name(), descriptor.seed());

            match select(
                queue.send(descriptor),
                self.shared.wait_until(Flag::AbortRequested, true),
            )
            .await
            {
                Either::First(()) => emitted += 1,
                Either::Second(()) => return self.stopped(scan_root, emitted),
            }
        }

        info!("All {} descriptors queued", emitted);
        ProducerOutcome {
            status: ProducerStatus::Complete,
            scan_root: scan_root.to_path_buf(),
            emitted,
        }
    }

    fn stopped(&self, scan_root: &Path, emitted: u64) -> ProducerOutcome {
        warn!("Abort requested, producer stopping after {} descriptors", emitted);
        ProducerOutcome {
            status: ProducerStatus::Incomplete,
            scan_root: scan_root.to_path_buf(),
            emitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::executor::block_on;
    use std::thread;
    use std::time::Duration;

    fn wafer(root: &Path, dims: [u16; 4]) -> WaferConfig {
        WaferConfig {
            name: "W1".to_string(),
            save_root: root.join("data"),
            chip_cols: dims[0],
            chip_rows: dims[1],
            dev_cols: dims[2],
            dev_rows: dims[3],
        }
    }

    fn producer(root: &Path, dims: [u16; 4]) -> (TaskProducer, Arc<SharedScanState>) {
        let shared = Arc::new(SharedScanState::new(1));
        shared.reset();
        let producer = TaskProducer::new(Arc::clone(&shared), wafer(root, dims), SweepParameters::default());
        (producer, shared)
    }

    #[test]
    fn test_scan_root_name() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(scan_root_name("Testchip", started), "2024-03-07__09-05-01__Testchip");
    }

    #[test]
    fn test_emits_in_grid_order() {
        let dir = tempfile::tempdir().unwrap();
        let (producer, shared) = producer(dir.path(), [2, 1, 2, 1]);

        let outcome = block_on(producer.run()).unwrap();
        assert_eq!(outcome.status, ProducerStatus::Complete);
        assert_eq!(outcome.emitted, 4);
        assert!(outcome.scan_root.is_dir());
        assert!(shared.get(Flag::ProducerDone));

        let mut seeds = Vec::new();
        while let Ok(descriptor) = shared.queue().try_receive() {
            assert!(descriptor.output_dir().starts_with(&outcome.scan_root));
            seeds.push(descriptor.seed());
        }
        assert_eq!(seeds, vec![0, 10, 1000, 1010]);
    }

    #[test]
    fn test_existing_scan_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (producer, shared) = producer(dir.path(), [1, 1, 1, 1]);
        let started = Local::now();

        producer.create_scan_root(started).unwrap();
        let err = producer.create_scan_root(started).unwrap_err();
        assert!(matches!(err, ScanError::OutputRoot { .. }));
        assert!(shared.queue().is_empty());
    }

    #[test]
    fn test_invalid_grid_sets_done() {
        let dir = tempfile::tempdir().unwrap();
        let (producer, shared) = producer(dir.path(), [1, 0, 1, 1]);

        let err = block_on(producer.run()).unwrap_err();
        assert!(err.is_configuration());
        assert!(shared.get(Flag::ProducerDone));
    }

    #[test]
    fn test_abort_while_queue_full() {
        let dir = tempfile::tempdir().unwrap();
        let (producer, shared) = producer(dir.path(), [2, 2, 4, 4]);

        let worker = thread::spawn(move || block_on(producer.run()));
        while !shared.queue().is_full() {
            thread::sleep(Duration::from_millis(1));
        }
        shared.set(Flag::AbortRequested, true);

        let outcome = worker.join().unwrap().unwrap();
        assert_eq!(outcome.status, ProducerStatus::Incomplete);
        assert_eq!(outcome.emitted, crate::shared::QUEUE_CAPACITY as u64);
        assert!(shared.get(Flag::ProducerDone));
    }
}
