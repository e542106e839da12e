//! Probestation wafer scanner
//!
//! Host side of the probestation: a producer enumerates the wafer grid into
//! a bounded queue, a coordinator moves the stage to each device and runs
//! the screening and full test procedures, and an abort coordinator can stop
//! everything at any point. Stage and source meters are reached through the
//! `MotionBackend` and `Instrument` traits of `probestation-core`; simulated
//! implementations come from `probestation-drivers`.

pub mod abort;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod observer;
pub mod procedures;
pub mod rack;
pub mod report;
pub mod scan;
pub mod shared;
pub mod sink;
pub mod stage;
pub mod tasks;

pub use abort::AbortCoordinator;
pub use config::{ConfigError, ScanConfig};
pub use descriptor::DeviceTaskDescriptor;
pub use error::{MoveError, ScanError};
pub use report::{DeviceOutcome, DeviceRecord, ScanReport};
pub use scan::{ScanHandle, ScanSummary, Scanner};
pub use shared::{Flag, SharedScanState};
pub use stage::MotionEngine;
