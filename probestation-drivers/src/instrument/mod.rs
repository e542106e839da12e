//! Source meter implementations

pub mod simulated;

pub use simulated::{DeviceModel, SimulatedSourceMeter};
