//! Scan configuration
//!
//! Loaded from a TOML file (`probestation.toml`). Every section and field
//! has a default, so an empty file yields a usable simulated setup.

pub mod loader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use probestation_core::config::{MotionTiming, ScanTiming, SpeedTable, StageSerials, SweepParameters};
use probestation_core::motion::{AxisPosition, Calibration, ReferencePoint, StagePosition};
use probestation_core::scheduler::GridDims;

pub use loader::ConfigError;

/// Complete scan configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub wafer: WaferConfig,
    pub sweep: SweepParameters,
    pub timing: TimingConfig,
    pub stage: StageConfig,
}

/// Wafer identity and grid layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaferConfig {
    /// Wafer name, part of the scan directory name
    pub name: String,
    /// Directory receiving scan directories
    pub save_root: PathBuf,
    pub chip_cols: u16,
    pub chip_rows: u16,
    pub dev_cols: u16,
    pub dev_rows: u16,
}

impl Default for WaferConfig {
    fn default() -> Self {
        Self {
            name: "Testchip".to_string(),
            save_root: PathBuf::from("data"),
            chip_cols: 2,
            chip_rows: 4,
            dev_cols: 8,
            dev_rows: 8,
        }
    }
}

impl WaferConfig {
    /// Grid dimensions
    pub fn dims(&self) -> GridDims {
        GridDims::new(self.chip_cols, self.chip_rows, self.dev_cols, self.dev_rows)
    }
}

/// Polling intervals and timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u32,
    pub settle_ms: u32,
    pub stop_timeout_ms: u32,
    pub screening_timeout_ms: u32,
    pub full_test_timeout_ms: u32,
    pub queue_poll_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let motion = MotionTiming::default();
        let scan = ScanTiming::default();
        Self {
            poll_interval_ms: motion.poll_interval_ms,
            settle_ms: motion.settle_ms,
            stop_timeout_ms: motion.stop_timeout_ms,
            screening_timeout_ms: scan.screening_timeout_ms,
            full_test_timeout_ms: scan.full_test_timeout_ms,
            queue_poll_ms: scan.queue_poll_ms,
        }
    }
}

impl TimingConfig {
    pub fn motion(&self) -> MotionTiming {
        MotionTiming {
            poll_interval_ms: self.poll_interval_ms,
            settle_ms: self.settle_ms,
            stop_timeout_ms: self.stop_timeout_ms,
        }
    }

    pub fn scan(&self) -> ScanTiming {
        ScanTiming {
            screening_timeout_ms: self.screening_timeout_ms,
            full_test_timeout_ms: self.full_test_timeout_ms,
            queue_poll_ms: self.queue_poll_ms,
        }
    }
}

/// Stage hardware and initial calibration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub serials: StageSerials,
    pub speeds: SpeedTable,
    pub calibration: CalibrationConfig,
}

/// Calibration point as written in the config file
///
/// Either `[x, y, z]` in whole steps, or `[[x, xf], [y, yf], [z, zf]]`
/// with the 1/256 microstep remainder of each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigPoint {
    Steps([i32; 3]),
    Microsteps([[i32; 2]; 3]),
}

impl ConfigPoint {
    pub fn position(&self) -> StagePosition {
        match *self {
            ConfigPoint::Steps([x, y, z]) => StagePosition::from_steps(x, y, z),
            ConfigPoint::Microsteps([x, y, z]) => StagePosition::new(
                AxisPosition::new(x[0], x[1]),
                AxisPosition::new(y[0], y[1]),
                AxisPosition::new(z[0], z[1]),
            )
            .normalize(),
        }
    }
}

impl From<StagePosition> for ConfigPoint {
    fn from(position: StagePosition) -> Self {
        let p = position.normalize();
        if p.x.fine == 0 && p.y.fine == 0 && p.z.fine == 0 {
            ConfigPoint::Steps([p.x.coarse, p.y.coarse, p.z.coarse])
        } else {
            ConfigPoint::Microsteps([
                [p.x.coarse, p.x.fine],
                [p.y.coarse, p.y.fine],
                [p.z.coarse, p.z.fine],
            ])
        }
    }
}

/// Initial calibration points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub center: ConfigPoint,
    pub load: ConfigPoint,
    pub dev00: ConfigPoint,
    #[serde(rename = "devI0")]
    pub dev_i0: ConfigPoint,
    #[serde(rename = "dev0J")]
    pub dev_0j: ConfigPoint,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::from_calibration(&Calibration::default())
    }
}

impl CalibrationConfig {
    /// Config entries for a calibration set, keeping microstep remainders
    pub fn from_calibration(cal: &Calibration) -> Self {
        Self {
            center: cal.get(ReferencePoint::Center).into(),
            load: cal.get(ReferencePoint::Load).into(),
            dev00: cal.get(ReferencePoint::Dev00).into(),
            dev_i0: cal.get(ReferencePoint::DevI0).into(),
            dev_0j: cal.get(ReferencePoint::Dev0J).into(),
        }
    }

    /// Build the calibration set
    pub fn to_calibration(&self) -> Calibration {
        Calibration::default()
            .with(ReferencePoint::Center, self.center.position())
            .with(ReferencePoint::Load, self.load.position())
            .with(ReferencePoint::Dev00, self.dev00.position())
            .with(ReferencePoint::DevI0, self.dev_i0.position())
            .with(ReferencePoint::Dev0J, self.dev_0j.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_round_trip() {
        let config = CalibrationConfig::default();
        assert_eq!(config.to_calibration(), Calibration::default());
        assert_eq!(config.load, ConfigPoint::Steps([0, -14_500, 500]));
    }

    #[test]
    fn test_captured_microsteps_kept() {
        let captured = StagePosition::new(
            AxisPosition::new(-8_000, 17),
            AxisPosition::steps(-10_000),
            AxisPosition::new(5_000, 255),
        );
        let cal = Calibration::default().with(ReferencePoint::Dev00, captured);
        let config = CalibrationConfig::from_calibration(&cal);

        assert_eq!(
            config.dev00,
            ConfigPoint::Microsteps([[-8_000, 17], [-10_000, 0], [5_000, 255]])
        );
        assert_eq!(config.to_calibration().get(ReferencePoint::Dev00), captured);
    }

    #[test]
    fn test_timing_split() {
        let timing = TimingConfig::default();
        assert_eq!(timing.motion(), MotionTiming::default());
        assert_eq!(timing.scan(), ScanTiming::default());
    }

    #[test]
    fn test_wafer_defaults() {
        let wafer = WaferConfig::default();
        assert_eq!(wafer.dims(), GridDims::new(2, 4, 8, 8));
        assert_eq!(wafer.name, "Testchip");
    }
}
