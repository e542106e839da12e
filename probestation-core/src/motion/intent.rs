//! Movement intent
//!
//! Tracks which direction each axis is actively travelling in and which
//! speed preset is selected. Manual jog input is gated through it: an axis
//! that already has an active direction refuses a second one until it is
//! released.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::position::Axis;

/// Travel direction of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// +Y
    North,
    /// +X
    East,
    /// -Y
    South,
    /// -X
    West,
    /// +Z
    Up,
    /// -Z
    Down,
}

impl Direction {
    /// Axis this direction moves
    pub const fn axis(self) -> Axis {
        match self {
            Direction::North | Direction::South => Axis::Y,
            Direction::East | Direction::West => Axis::X,
            Direction::Up | Direction::Down => Axis::Z,
        }
    }

    /// Whether this direction increases the axis position
    pub const fn positive(self) -> bool {
        matches!(self, Direction::North | Direction::East | Direction::Up)
    }

    /// Direction on the same axis pointing the other way
    pub const fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Jog sign for the backend
    pub const fn sign(self) -> i8 {
        if self.positive() {
            1
        } else {
            -1
        }
    }
}

/// Speed preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SpeedPreset {
    /// Manual alignment speed
    #[default]
    Normal,
    /// Automated travel between devices
    Fast,
}

/// Intent rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntentError {
    /// The axis already travels in `active`
    AxisBusy { axis: Axis, active: Direction },
}

/// Active directions plus selected speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MovementIntent {
    active: [Option<Direction>; 3],
    speed: SpeedPreset,
}

impl MovementIntent {
    /// Create an idle intent at normal speed
    pub const fn new() -> Self {
        Self {
            active: [None; 3],
            speed: SpeedPreset::Normal,
        }
    }

    /// Request travel in a direction
    ///
    /// Re-requesting the active direction is accepted. Any other direction
    /// on a busy axis, including the opposite one, is refused.
    pub fn begin(&mut self, direction: Direction) -> Result<(), IntentError> {
        let axis = direction.axis();
        match self.active[axis.index()] {
            Some(active) if active != direction => Err(IntentError::AxisBusy { axis, active }),
            _ => {
                self.active[axis.index()] = Some(direction);
                Ok(())
            }
        }
    }

    /// Release a direction
    ///
    /// Returns true if it was the active direction of its axis.
    pub fn end(&mut self, direction: Direction) -> bool {
        let slot = &mut self.active[direction.axis().index()];
        if *slot == Some(direction) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Active direction of an axis
    pub fn active(&self, axis: Axis) -> Option<Direction> {
        self.active[axis.index()]
    }

    /// No axis has an active direction
    pub fn is_idle(&self) -> bool {
        self.active.iter().all(Option::is_none)
    }

    /// Drop every active direction (speed preset is kept)
    pub fn clear(&mut self) {
        self.active = [None; 3];
    }

    /// Currently selected speed
    pub fn speed(&self) -> SpeedPreset {
        self.speed
    }

    /// Select a speed preset
    ///
    /// Returns true if the preset changed.
    pub fn set_speed(&mut self, speed: SpeedPreset) -> bool {
        let changed = self.speed != speed;
        self.speed = speed;
        changed
    }
}
