//! End-to-end scans against the simulated stage and source meters

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use probestation_core::motion::ReferencePoint;
use probestation_core::traits::{Instrument, InstrumentError};
use probestation_drivers::instrument::{DeviceModel, SimulatedSourceMeter};
use probestation_drivers::stage::SimulatedStage;
use probestation_scan::config::{ConfigPoint, WaferConfig};
use probestation_scan::observer::RecordingObserver;
use probestation_scan::procedures::{CancelToken, FullTest, Procedure};
use probestation_scan::rack::{InstrumentRack, Instruments, ModelPolicy, SimulatedRack};
use probestation_scan::sink::{FullTestJob, TaskSink, ThreadedSink};
use probestation_scan::tasks::ProducerStatus;
use probestation_scan::{DeviceOutcome, DeviceTaskDescriptor, Flag, MotionEngine, ScanConfig, ScanError, Scanner};

fn fast_config(root: &Path, dims: [u16; 4]) -> ScanConfig {
    let mut config = ScanConfig::default();
    config.wafer = WaferConfig {
        name: "IT".to_string(),
        save_root: root.join("data"),
        chip_cols: dims[0],
        chip_rows: dims[1],
        dev_cols: dims[2],
        dev_rows: dims[3],
    };
    config.sweep.delay_ms = 0;
    config.sweep.bias_step_mv = 20.0;
    config.sweep.gate_step_mv = 500.0;
    config.timing.poll_interval_ms = 1;
    config.timing.settle_ms = 0;
    config.timing.stop_timeout_ms = 200;
    config.timing.queue_poll_ms = 1;
    config
}

/// Scanner whose stage crawls one step per poll
fn slow_scanner(config: ScanConfig) -> Scanner {
    let stage = SimulatedStage::new(config.stage.serials).with_travel_per_tick(256);
    let engine = MotionEngine::connect(Box::new(stage), &config.stage, config.timing.motion());
    Scanner::new(config, engine)
}

fn good_rack() -> Box<SimulatedRack> {
    Box::new(SimulatedRack::new(ModelPolicy::Uniform(DeviceModel::Good)))
}

#[test]
fn test_sample_config_matches_defaults() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("probestation.toml");
    let config = ScanConfig::load(&path).unwrap();
    assert_eq!(config, ScanConfig::default());
}

#[test]
fn test_full_scan_visits_grid_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let observer = Arc::new(RecordingObserver::new());
    let scanner = Scanner::simulated(fast_config(dir.path(), [2, 1, 2, 1])).with_observer(observer.clone());

    let summary = scanner
        .start(good_rack(), Box::new(ThreadedSink::new()))
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(summary.producer.status, ProducerStatus::Complete);
    assert_eq!(summary.producer.emitted, 4);

    let report = &summary.report;
    let seeds: Vec<u32> = report.devices.iter().map(|d| d.seed).collect();
    assert_eq!(seeds, vec![0, 10, 1000, 1010]);
    assert_eq!(report.passed(), 4);
    assert!(report.returned_to_center);
    assert!(!report.aborted);

    for record in &report.devices {
        let dir = summary.producer.scan_root.join(format!("dev_{}", record.name));
        assert!(dir.is_dir(), "{} missing", dir.display());
    }
    assert_eq!(observer.progress().last().unwrap().wafer_pct, 100);

    let center = futures::executor::block_on(scanner.engine().calibration()).get(ReferencePoint::Center);
    assert_eq!(futures::executor::block_on(scanner.engine().position()).unwrap(), center);
    assert!(scanner.shared().is_idle());
}

#[test]
fn test_scan_root_name_contains_wafer() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = Scanner::simulated(fast_config(dir.path(), [1, 1, 1, 1]));
    let summary = scanner.start_simulated().unwrap().join().unwrap();

    let name = summary.producer.scan_root.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.ends_with("__IT"), "{name}");
    assert_eq!(summary.producer.scan_root.parent().unwrap(), dir.path().join("data"));
}

#[test]
fn test_abort_mid_move() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = slow_scanner(fast_config(dir.path(), [2, 2, 4, 4]));

    let handle = scanner.start(good_rack(), Box::new(ThreadedSink::new())).unwrap();
    thread::sleep(Duration::from_millis(100));
    handle.abort();
    // Second request only re-confirms the stop
    handle.abort();

    let summary = handle.join().unwrap();
    let report = &summary.report;

    assert!(report.aborted);
    assert!(!report.returned_to_center);
    assert!(report.devices.len() <= 1);
    for record in &report.devices {
        assert_eq!(record.outcome, DeviceOutcome::Aborted);
    }
    assert_eq!(summary.producer.status, ProducerStatus::Incomplete);
    assert_eq!(scanner.engine().emergency_stop_count(), 1);

    let shared = scanner.shared();
    assert!(shared.queue().is_empty());
    assert!(shared.get(Flag::ProducerDone));
    assert!(shared.get(Flag::ConsumerDone));
    assert!(!shared.get(Flag::MeasurementInFlight));
}

#[test]
fn test_abort_from_handler_thread() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = slow_scanner(fast_config(dir.path(), [2, 2, 4, 4]));
    let handle = scanner.start(good_rack(), Box::new(ThreadedSink::new())).unwrap();

    // What the Ctrl-C handler does: abort through a clone on its own thread
    let abort = handle.abort_coordinator();
    let interrupt = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        futures::executor::block_on(abort.abort_all());
    });

    let summary = handle.join().unwrap();
    interrupt.join().unwrap();

    assert!(summary.report.aborted);
    assert!(!summary.report.returned_to_center);
    assert_eq!(summary.producer.status, ProducerStatus::Incomplete);
    assert_eq!(scanner.engine().emergency_stop_count(), 1);
    assert!(scanner.shared().is_idle());
}

#[test]
fn test_rejects_second_scan_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = slow_scanner(fast_config(dir.path(), [1, 1, 1, 2]));

    let handle = scanner.start_simulated().unwrap();
    let err = scanner.start_simulated().err().unwrap();
    assert!(matches!(err, ScanError::AlreadyRunning));

    handle.abort();
    handle.join().unwrap();

    // Idle again: a new scan may start and re-arms the stage. It may share
    // the first scan's timestamp, so only the restart itself is checked.
    let handle = scanner.start_simulated().unwrap();
    assert!(!scanner.engine().is_halted());
    handle.abort();
    let _ = handle.join();
}

#[test]
fn test_out_of_range_device_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path(), [1, 1, 1, 2]);
    config.stage.calibration.dev_0j = ConfigPoint::Steps([-8000, 20_000, 5000]);
    let scanner = Scanner::simulated(config);

    let report = scanner
        .start(good_rack(), Box::new(ThreadedSink::new()))
        .unwrap()
        .join()
        .unwrap()
        .report;

    assert_eq!(report.devices.len(), 2);
    assert!(report.devices[0].outcome.is_pass());
    assert_eq!(report.devices[1].outcome, DeviceOutcome::OutOfRange);
    assert!(report.returned_to_center);
}

#[test]
fn test_configuration_error_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path(), [1, 1, 1, 1]);
    config.wafer.dev_cols = 0;
    let scanner = Scanner::simulated(config);

    let err = scanner.start_simulated().err().unwrap();
    assert!(err.is_configuration());
    assert!(!dir.path().join("data").exists());
}

#[test]
fn test_existing_output_root_fails_scan() {
    let dir = tempfile::tempdir().unwrap();
    // A file where the save root directory should be
    std::fs::write(dir.path().join("data"), b"").unwrap();
    let scanner = Scanner::simulated(fast_config(dir.path(), [1, 1, 1, 1]));

    let err = scanner.start_simulated().unwrap().join().unwrap_err();
    assert!(matches!(err, ScanError::OutputRoot { .. }));
    assert!(scanner.shared().is_idle());
}

/// Sink tracking how many full tests run at once
struct CountingSink {
    active: Arc<AtomicU32>,
    peak: Arc<AtomicU32>,
}

impl TaskSink for CountingSink {
    fn submit(&mut self, job: FullTestJob) -> Result<(), ScanError> {
        let FullTestJob {
            descriptor,
            instruments,
            ticket,
        } = job;
        let active = Arc::clone(&self.active);
        let peak = Arc::clone(&self.peak);

        thread::spawn(move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            let outcome = FullTest::new(instruments, *descriptor.sweep()).run(&CancelToken::new());
            active.fetch_sub(1, Ordering::SeqCst);
            ticket.complete_full_test(outcome);
        });
        Ok(())
    }
}

/// Source meter counting how many bias outputs are on at once
struct Tracked {
    meter: SimulatedSourceMeter,
    ramp_delay: Duration,
    on: Arc<AtomicU32>,
    peak: Arc<AtomicU32>,
}

impl Instrument for Tracked {
    fn configure(&mut self, range_v: f64, compliance_a: f64, nplc: u8) -> Result<(), InstrumentError> {
        self.meter.configure(range_v, compliance_a, nplc)
    }
    fn ramp_to(&mut self, volts: f64) -> Result<(), InstrumentError> {
        thread::sleep(self.ramp_delay);
        self.meter.ramp_to(volts)
    }
    fn current_reading(&mut self) -> Result<f64, InstrumentError> {
        self.meter.current_reading()
    }
    fn enable_output(&mut self) -> Result<(), InstrumentError> {
        if !self.meter.output_enabled() {
            let now = self.on.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }
        self.meter.enable_output()
    }
    fn disable_output(&mut self) -> Result<(), InstrumentError> {
        if self.meter.output_enabled() {
            self.on.fetch_sub(1, Ordering::SeqCst);
        }
        self.meter.disable_output()
    }
    fn output_enabled(&self) -> bool {
        self.meter.output_enabled()
    }
}

/// Rack whose bias meters report into shared counters; the first device
/// (seed 0) ramps slowly
#[derive(Default)]
struct TrackedRack {
    first_ramp_delay: Duration,
    others: Option<DeviceModel>,
    on: Arc<AtomicU32>,
    peak: Arc<AtomicU32>,
}

impl InstrumentRack for TrackedRack {
    fn prepare(&mut self, descriptor: &DeviceTaskDescriptor) -> Instruments {
        let first = descriptor.seed() == 0;
        let model = match self.others {
            Some(model) if !first => model,
            _ => DeviceModel::Good,
        };
        let bias = Arc::new(parking_lot::Mutex::new(Tracked {
            meter: SimulatedSourceMeter::new(model),
            ramp_delay: if first { self.first_ramp_delay } else { Duration::ZERO },
            on: Arc::clone(&self.on),
            peak: Arc::clone(&self.peak),
        }));
        let gate = Arc::new(parking_lot::Mutex::new(SimulatedSourceMeter::new(DeviceModel::Open)));
        Instruments { bias, gate }
    }
}

#[test]
fn test_one_measurement_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = Scanner::simulated(fast_config(dir.path(), [1, 2, 2, 2]));
    let peak = Arc::new(AtomicU32::new(0));
    let sink = CountingSink {
        active: Arc::new(AtomicU32::new(0)),
        peak: Arc::clone(&peak),
    };
    let rack = TrackedRack::default();
    let bias_peak = Arc::clone(&rack.peak);

    let report = scanner.start(Box::new(rack), Box::new(sink)).unwrap().join().unwrap().report;

    assert_eq!(report.passed(), 8);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    // Screening and full test never overlap across devices either
    assert_eq!(bias_peak.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timed_out_screening_releases_bias() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path(), [1, 1, 1, 3]);
    config.timing.screening_timeout_ms = 60;
    let scanner = Scanner::simulated(config);
    let rack = TrackedRack {
        first_ramp_delay: Duration::from_millis(30),
        others: Some(DeviceModel::Open),
        ..TrackedRack::default()
    };
    let on = Arc::clone(&rack.on);
    let bias_peak = Arc::clone(&rack.peak);

    let report = scanner
        .start(Box::new(rack), Box::new(ThreadedSink::new()))
        .unwrap()
        .join()
        .unwrap()
        .report;

    assert_eq!(report.devices[0].outcome, DeviceOutcome::TimedOut);
    for record in &report.devices[1..] {
        assert!(matches!(record.outcome, DeviceOutcome::ScreeningFailed(_)), "{}", record.name);
    }
    assert_eq!(bias_peak.load(Ordering::SeqCst), 1);
    assert_eq!(on.load(Ordering::SeqCst), 0);
    assert!(!scanner.shared().get(Flag::DeviceScreeningPassed));
}
