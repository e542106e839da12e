//! Stage position encoding
//!
//! The stage controllers report every axis as a whole step count plus a
//! microstep remainder (1/256 microstep mode). All coordinate arithmetic
//! works on that pair, carried through a single microstep total to avoid
//! losing sub-step fractions.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Microsteps per full step (controller runs in 1/256 mode)
pub const MICROSTEPS_PER_STEP: i32 = 256;

/// Stage axis identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// Horizontal, east/west
    X,
    /// Horizontal, north/south
    Y,
    /// Vertical, up/down
    Z,
}

impl Axis {
    /// All axes in controller order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index into per-axis arrays
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Lowercase axis name
    pub const fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Position of one axis: whole steps plus microstep remainder
///
/// A normalized position keeps `fine` in `[0, 256)` and carries the sign
/// entirely in `coarse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisPosition {
    /// Whole steps
    pub coarse: i32,
    /// Microstep remainder
    pub fine: i32,
}

impl AxisPosition {
    /// The origin
    pub const ZERO: AxisPosition = AxisPosition { coarse: 0, fine: 0 };

    /// Create a position from raw controller values (not normalized)
    pub const fn new(coarse: i32, fine: i32) -> Self {
        Self { coarse, fine }
    }

    /// Create a position at a whole step
    pub const fn steps(coarse: i32) -> Self {
        Self { coarse, fine: 0 }
    }

    /// Create a normalized position from a microstep total
    pub fn from_microsteps(total: i64) -> Self {
        let step = MICROSTEPS_PER_STEP as i64;
        Self {
            coarse: clamp_i32(total.div_euclid(step)),
            fine: total.rem_euclid(step) as i32,
        }
    }

    /// Total microsteps represented by this position
    pub fn to_microsteps(self) -> i64 {
        self.coarse as i64 * MICROSTEPS_PER_STEP as i64 + self.fine as i64
    }

    /// Carry whole steps out of the microstep remainder
    ///
    /// Whole steps are moved from `fine` into `coarse` while `|fine| >= 256`.
    /// A remaining negative `fine` disagrees in sign with the carried value,
    /// so one corrective step is borrowed from `coarse`. The result always
    /// has `fine` in `[0, 256)` and represents the same microstep total.
    pub fn normalize(self) -> Self {
        let carry = self.fine.div_euclid(MICROSTEPS_PER_STEP);
        Self {
            coarse: self.coarse.saturating_add(carry),
            fine: self.fine.rem_euclid(MICROSTEPS_PER_STEP),
        }
    }

    /// Check the normalization invariant
    pub fn is_normalized(&self) -> bool {
        (0..MICROSTEPS_PER_STEP).contains(&self.fine)
    }
}

/// Saturating conversion for microstep totals that leave the i32 step range
fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Position of all three stage axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StagePosition {
    pub x: AxisPosition,
    pub y: AxisPosition,
    pub z: AxisPosition,
}

impl StagePosition {
    /// The origin on all axes
    pub const ZERO: StagePosition = StagePosition {
        x: AxisPosition::ZERO,
        y: AxisPosition::ZERO,
        z: AxisPosition::ZERO,
    };

    /// Create a stage position from per-axis positions
    pub const fn new(x: AxisPosition, y: AxisPosition, z: AxisPosition) -> Self {
        Self { x, y, z }
    }

    /// Create a stage position at whole steps on every axis
    pub const fn from_steps(x: i32, y: i32, z: i32) -> Self {
        Self {
            x: AxisPosition::steps(x),
            y: AxisPosition::steps(y),
            z: AxisPosition::steps(z),
        }
    }

    /// Get the position of one axis
    pub fn axis(&self, axis: Axis) -> AxisPosition {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Replace the position of one axis
    pub fn set_axis(&mut self, axis: Axis, position: AxisPosition) {
        match axis {
            Axis::X => self.x = position,
            Axis::Y => self.y = position,
            Axis::Z => self.z = position,
        }
    }

    /// Normalize every axis
    pub fn normalize(self) -> Self {
        Self {
            x: self.x.normalize(),
            y: self.y.normalize(),
            z: self.z.normalize(),
        }
    }

    /// Check the normalization invariant on every axis
    pub fn is_normalized(&self) -> bool {
        self.x.is_normalized() && self.y.is_normalized() && self.z.is_normalized()
    }

    /// Apply `f` to the microstep total of every axis
    pub fn map_microsteps(self, mut f: impl FnMut(Axis, i64) -> i64) -> Self {
        let mut out = StagePosition::ZERO;
        for axis in Axis::ALL {
            let total = f(axis, self.axis(axis).to_microsteps());
            out.set_axis(axis, AxisPosition::from_microsteps(total));
        }
        out
    }
}
