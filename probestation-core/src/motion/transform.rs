//! Wafer grid to stage coordinate transform
//!
//! Devices are laid out on a regular lattice. Chip pitch is ten device
//! pitches, so the lattice index along one direction is
//! `10 * chip + device`. The per-index step (delta) is derived from the
//! spread between the calibration corners.

use super::calibration::{Calibration, ReferencePoint};
use super::envelope::{bounds_check, OutOfRange};
use super::position::StagePosition;
use crate::scheduler::{DeviceIndex, GridDims};

/// Devices per chip pitch along one direction
pub const DEVICES_PER_CHIP_PITCH: i64 = 10;

/// Lattice steps spanned between two corners along one direction
fn lattice_span(chips: u16, devices: u16) -> i64 {
    DEVICES_PER_CHIP_PITCH * (chips as i64 - 1) + (devices as i64 - 1)
}

/// Per-lattice-step delta between two calibration corners
///
/// Computed on microstep totals per axis and truncated toward zero. A
/// non-positive span (a single device in that direction) yields zero.
pub fn compute_axis_delta(
    from: StagePosition,
    to: StagePosition,
    chips: u16,
    devices: u16,
) -> StagePosition {
    let span = lattice_span(chips, devices);
    if span <= 0 {
        return StagePosition::ZERO;
    }

    from.map_microsteps(|axis, start| (to.axis(axis).to_microsteps() - start) / span)
}

/// Lattice transform from device indices to stage coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GridTransform {
    /// Position of device (0, 0, 0, 0)
    pub origin: StagePosition,
    /// Step per device column
    pub horizontal: StagePosition,
    /// Step per device row
    pub vertical: StagePosition,
}

impl GridTransform {
    /// Derive the transform from the device corners
    pub fn new(calibration: &Calibration, dims: &GridDims) -> Self {
        let origin = calibration.get(ReferencePoint::Dev00);
        Self {
            origin,
            horizontal: compute_axis_delta(
                origin,
                calibration.get(ReferencePoint::DevI0),
                dims.chip_cols,
                dims.dev_cols,
            ),
            vertical: compute_axis_delta(
                origin,
                calibration.get(ReferencePoint::Dev0J),
                dims.chip_rows,
                dims.dev_rows,
            ),
        }
    }

    /// Stage coordinates of one device, normalized and bounds-checked
    pub fn target(&self, index: DeviceIndex) -> Result<StagePosition, OutOfRange> {
        let col = DEVICES_PER_CHIP_PITCH * index.chip_col as i64 + index.dev_col as i64;
        let row = DEVICES_PER_CHIP_PITCH * index.chip_row as i64 + index.dev_row as i64;

        let target = self.origin.map_microsteps(|axis, start| {
            start
                + col * self.horizontal.axis(axis).to_microsteps()
                + row * self.vertical.axis(axis).to_microsteps()
        });

        bounds_check(&target)?;
        Ok(target)
    }
}
