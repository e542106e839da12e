//! Motion backend trait
//!
//! Abstracts the stage controller library. One backend owns all three axis
//! controllers; the motion engine is its only user.

use crate::motion::Axis;

/// Errors reported by a motion backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendError {
    /// Controller for this axis is not connected
    NotConnected(Axis),
    /// Communication with the controller failed
    CommunicationError(Axis),
    /// Controller rejected the command
    CommandRejected(Axis),
}

impl BackendError {
    /// Axis the error refers to
    pub fn axis(&self) -> Axis {
        match *self {
            BackendError::NotConnected(axis)
            | BackendError::CommunicationError(axis)
            | BackendError::CommandRejected(axis) => axis,
        }
    }
}

/// Trait for stage motion controllers
///
/// Positions are in whole steps plus 1/256 microsteps. All calls return
/// promptly; moves run in the controller and are observed by polling
/// [`MotionBackend::axis_velocity`].
pub trait MotionBackend {
    /// Start an absolute move of one axis
    fn move_axis(&mut self, axis: Axis, coarse: i32, fine: i32) -> Result<(), BackendError>;

    /// Current velocity of one axis; zero once the axis is stationary
    fn axis_velocity(&mut self, axis: Axis) -> Result<i32, BackendError>;

    /// Command a stop (soft stop, decelerates)
    fn stop_axis(&mut self, axis: Axis) -> Result<(), BackendError>;

    /// Current position as (coarse, fine)
    fn axis_position(&mut self, axis: Axis) -> Result<(i32, i32), BackendError>;

    /// Start continuous motion; `sign` is +1 or -1
    fn jog_axis(&mut self, axis: Axis, sign: i8) -> Result<(), BackendError>;

    /// Set travel speed for subsequent moves and jogs
    fn set_axis_speed(&mut self, axis: Axis, speed: u32) -> Result<(), BackendError>;

    /// Serial number of the controller driving this axis
    fn axis_serial(&mut self, axis: Axis) -> Result<u32, BackendError>;

    /// Check if one axis is stationary
    fn is_stopped(&mut self, axis: Axis) -> Result<bool, BackendError> {
        self.axis_velocity(axis).map(|v| v == 0)
    }
}
