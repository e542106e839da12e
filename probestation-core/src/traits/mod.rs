//! Hardware abstraction traits
//!
//! These traits define the interface between the scan logic and the stage
//! controller and source meter implementations.

pub mod instrument;
pub mod motion;

pub use instrument::{Instrument, InstrumentError};
pub use motion::{BackendError, MotionBackend};
