//! Scan event observers

use log::info;
use parking_lot::Mutex;

use probestation_core::scheduler::{DeviceIndex, Progress};

use crate::report::DeviceRecord;

/// Events published by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A descriptor was taken from the queue
    DeviceStarted { index: DeviceIndex, name: String },
    /// A device reached its final outcome
    DeviceFinished(DeviceRecord),
    /// Progress after a device
    Progress(Progress),
    /// Coordinator finished
    ScanFinished { aborted: bool, devices: usize },
}

/// Receives scan events, from the coordinator thread
pub trait ScanObserver: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

/// Logs every event
#[derive(Debug, Default)]
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::DeviceStarted { name, .. } => info!("Device {}", name),
            ScanEvent::DeviceFinished(record) => {
                info!("Device {}: {}", record.name, record.outcome.label())
            }
            ScanEvent::Progress(p) => info!("Progress: wafer {}%, chip {}%", p.wafer_pct, p.chip_pct),
            ScanEvent::ScanFinished { aborted: true, devices } => {
                info!("Scan aborted after {} devices", devices)
            }
            ScanEvent::ScanFinished { devices, .. } => info!("Scan finished, {} devices", devices),
        }
    }
}

/// Keeps every event, for tests and post-scan inspection
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().clone()
    }

    /// Progress events in order
    pub fn progress(&self) -> Vec<Progress> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }
}

impl ScanObserver for RecordingObserver {
    fn on_event(&self, event: &ScanEvent) {
        self.events.lock().push(event.clone());
    }
}
