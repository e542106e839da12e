//! Stage motion
//!
//! Coordinate representation, travel envelope, calibration, the device
//! grid transform and manual movement intent.

pub mod calibration;
pub mod envelope;
pub mod intent;
pub mod position;
pub mod transform;

pub use calibration::{Calibration, ReferencePoint};
pub use envelope::{bounds_check, OutOfRange};
pub use intent::{Direction, IntentError, MovementIntent, SpeedPreset};
pub use position::{Axis, AxisPosition, StagePosition, MICROSTEPS_PER_STEP};
pub use transform::{compute_axis_delta, GridTransform};
