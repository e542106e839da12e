//! Stage safety envelope
//!
//! Fixed travel limits of the probe stage. Every automated target is checked
//! against these before any motion is issued.

use super::position::{Axis, AxisPosition, StagePosition};

/// Maximum absolute X/Y travel in steps
pub const XY_LIMIT_STEPS: i32 = 14_600;

/// Lowest allowed Z position in steps
pub const Z_MIN_STEPS: i32 = 0;

/// Highest allowed Z position in steps
pub const Z_MAX_STEPS: i32 = 156_000;

/// A target outside the stage travel envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRange {
    /// First offending axis (checked X, Y, Z)
    pub axis: Axis,
    /// Offending coarse position
    pub steps: i32,
}

/// Check a single axis against its travel limits
pub fn check_axis(axis: Axis, position: AxisPosition) -> Result<(), OutOfRange> {
    let steps = position.coarse;
    let inside = match axis {
        Axis::X | Axis::Y => (-XY_LIMIT_STEPS..=XY_LIMIT_STEPS).contains(&steps),
        Axis::Z => (Z_MIN_STEPS..=Z_MAX_STEPS).contains(&steps),
    };

    if inside {
        Ok(())
    } else {
        Err(OutOfRange { axis, steps })
    }
}

/// Check a full stage position against the envelope
pub fn bounds_check(position: &StagePosition) -> Result<(), OutOfRange> {
    for axis in Axis::ALL {
        check_axis(axis, position.axis(axis))?;
    }
    Ok(())
}
