//! Scan scheduling
//!
//! Grid enumeration, per-device seeds and names, and progress math.

pub mod grid;
pub mod progress;

pub use grid::{DeviceIndex, DeviceName, GridDims, GridError, GridIter};
pub use progress::Progress;
