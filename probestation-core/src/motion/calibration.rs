//! Calibration reference points
//!
//! The operator captures three device corners on the wafer (dev00, devI0,
//! dev0J). Together with the fixed center and load positions they define
//! where every device sits in stage coordinates.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::position::{AxisPosition, StagePosition};

/// Clearance above the lowest calibration point for horizontal travel
pub const SAFE_HEIGHT_CLEARANCE_STEPS: i32 = 20_000;

/// Minimum travel height in steps
pub const SAFE_HEIGHT_FLOOR_STEPS: i32 = 500;

/// Named calibration point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReferencePoint {
    /// Stage center, parking position after a scan
    Center,
    /// Wafer load position
    Load,
    /// First device of the first chip
    Dev00,
    /// First device row, last chip column
    DevI0,
    /// First device column, last chip row
    Dev0J,
}

impl ReferencePoint {
    /// All reference points
    pub const ALL: [ReferencePoint; 5] = [
        ReferencePoint::Center,
        ReferencePoint::Load,
        ReferencePoint::Dev00,
        ReferencePoint::DevI0,
        ReferencePoint::Dev0J,
    ];

    /// Get display name
    pub const fn name(self) -> &'static str {
        match self {
            ReferencePoint::Center => "center",
            ReferencePoint::Load => "load",
            ReferencePoint::Dev00 => "dev00",
            ReferencePoint::DevI0 => "devI0",
            ReferencePoint::Dev0J => "dev0J",
        }
    }

    /// Parse a point name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|point| point.name().eq_ignore_ascii_case(name))
    }
}

/// Set of calibration points for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    points: [StagePosition; 5],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            points: [
                StagePosition::from_steps(0, 0, 500),
                StagePosition::from_steps(0, -14_500, 500),
                StagePosition::from_steps(-8_000, -10_000, 5_000),
                StagePosition::from_steps(8_000, -11_000, 4_500),
                StagePosition::from_steps(-7_500, 10_000, 5_500),
            ],
        }
    }
}

impl Calibration {
    fn slot(point: ReferencePoint) -> usize {
        match point {
            ReferencePoint::Center => 0,
            ReferencePoint::Load => 1,
            ReferencePoint::Dev00 => 2,
            ReferencePoint::DevI0 => 3,
            ReferencePoint::Dev0J => 4,
        }
    }

    /// Get a stored point
    pub fn get(&self, point: ReferencePoint) -> StagePosition {
        self.points[Self::slot(point)]
    }

    /// Store a point (normalized)
    pub fn set(&mut self, point: ReferencePoint, position: StagePosition) {
        self.points[Self::slot(point)] = position.normalize();
    }

    /// Builder form of [`Calibration::set`]
    pub fn with(mut self, point: ReferencePoint, position: StagePosition) -> Self {
        self.set(point, position);
        self
    }

    /// Height used for horizontal travel between devices
    ///
    /// The lowest of the three device corners minus the clearance, never
    /// below the floor.
    pub fn safe_height(&self) -> AxisPosition {
        let lowest = [ReferencePoint::Dev00, ReferencePoint::DevI0, ReferencePoint::Dev0J]
            .into_iter()
            .map(|point| self.get(point).z.coarse)
            .min()
            .unwrap_or(SAFE_HEIGHT_FLOOR_STEPS);

        AxisPosition::steps(
            lowest
                .saturating_sub(SAFE_HEIGHT_CLEARANCE_STEPS)
                .max(SAFE_HEIGHT_FLOOR_STEPS),
        )
    }
}
