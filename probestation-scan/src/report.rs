//! Scan results

use probestation_core::scheduler::{DeviceIndex, Progress};

use crate::procedures::{FullTestOutcome, ScreeningOutcome};

/// What happened to one device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceOutcome {
    /// Screening passed and the full test ran to the end
    Passed {
        screening: ScreeningOutcome,
        full_test: FullTestOutcome,
    },
    /// Screening failed; no full test
    ScreeningFailed(ScreeningOutcome),
    /// Full test ended before its last point
    FullTestStopped {
        screening: ScreeningOutcome,
        full_test: FullTestOutcome,
    },
    /// Target outside the stage envelope, device skipped
    OutOfRange,
    /// Stage move failed, device skipped
    MoveFailed,
    /// Screening or full test exceeded its timeout
    TimedOut,
    /// Measurement cancelled on request, scan continued
    Cancelled,
    /// Scan abort reached this device
    Aborted,
    /// Device output directory could not be created
    OutputUnavailable,
}

impl DeviceOutcome {
    /// Check if the device was fully measured and passed
    pub fn is_pass(&self) -> bool {
        matches!(self, DeviceOutcome::Passed { .. })
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            DeviceOutcome::Passed { .. } => "passed",
            DeviceOutcome::ScreeningFailed(_) => "screening failed",
            DeviceOutcome::FullTestStopped { .. } => "full test stopped",
            DeviceOutcome::OutOfRange => "out of range",
            DeviceOutcome::MoveFailed => "move failed",
            DeviceOutcome::TimedOut => "timed out",
            DeviceOutcome::Cancelled => "cancelled",
            DeviceOutcome::Aborted => "aborted",
            DeviceOutcome::OutputUnavailable => "output unavailable",
        }
    }
}

/// One line of the scan report
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub index: DeviceIndex,
    pub name: String,
    pub seed: u32,
    pub outcome: DeviceOutcome,
    pub progress: Progress,
}

/// Everything the coordinator processed in one scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub devices: Vec<DeviceRecord>,
    pub aborted: bool,
    pub returned_to_center: bool,
}

impl ScanReport {
    pub fn count(&self, predicate: impl Fn(&DeviceOutcome) -> bool) -> usize {
        self.devices.iter().filter(|d| predicate(&d.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(DeviceOutcome::is_pass)
    }

    /// Devices that were neither passed nor aborted
    pub fn failed(&self) -> usize {
        self.count(|o| !o.is_pass() && *o != DeviceOutcome::Aborted)
    }

    pub fn get(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, outcome: DeviceOutcome) -> DeviceRecord {
        DeviceRecord {
            index: DeviceIndex::new(0, 0, 0, 0),
            name: name.to_string(),
            seed: 0,
            outcome,
            progress: Progress::default(),
        }
    }

    #[test]
    fn test_counts() {
        let report = ScanReport {
            devices: vec![
                record("a", DeviceOutcome::OutOfRange),
                record("b", DeviceOutcome::Aborted),
                record("c", DeviceOutcome::TimedOut),
            ],
            ..ScanReport::default()
        };

        assert_eq!(report.passed(), 0);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.get("c").unwrap().outcome.label(), "timed out");
        assert!(report.get("d").is_none());
    }
}
