//! Stage hardware configuration
//!
//! Maps controller serial numbers to stage axes.

use crate::motion::Axis;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A configured axis controller was not found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareUnavailable {
    /// First axis without a matching controller
    pub missing: Axis,
}

/// Controller serial numbers per axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StageSerials {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Default for StageSerials {
    fn default() -> Self {
        Self {
            x: 18_162,
            y: 18_212,
            z: 18_232,
        }
    }
}

impl StageSerials {
    /// Configured serial of one axis
    pub fn serial(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Check the serials reported per axis against the configuration
    ///
    /// `None` means the axis did not answer.
    pub fn identify(&self, reported: [Option<u32>; 3]) -> Result<(), HardwareUnavailable> {
        for axis in Axis::ALL {
            if reported[axis.index()] != Some(self.serial(axis)) {
                return Err(HardwareUnavailable { missing: axis });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_all_present() {
        let serials = StageSerials::default();
        assert!(serials
            .identify([Some(18_162), Some(18_212), Some(18_232)])
            .is_ok());
    }

    #[test]
    fn test_identify_missing_axis() {
        let serials = StageSerials::default();
        assert_eq!(
            serials.identify([Some(18_162), None, Some(18_232)]),
            Err(HardwareUnavailable { missing: Axis::Y })
        );
    }

    #[test]
    fn test_identify_swapped_controllers() {
        let serials = StageSerials::default();
        assert_eq!(
            serials.identify([Some(18_212), Some(18_162), Some(18_232)]),
            Err(HardwareUnavailable { missing: Axis::X })
        );
    }
}
