//! Wafer grid enumeration
//!
//! A wafer holds `chip_cols x chip_rows` chips, each with
//! `dev_cols x dev_rows` devices. Devices are visited chip column first,
//! then chip row, device column and device row (innermost).

use core::fmt::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Capacity of a formatted device name
pub const DEVICE_NAME_LEN: usize = 32;

/// Formatted device name, `"{chip_col}_{chip_row}_{dev_col}_{dev_row}"`
pub type DeviceName = heapless::String<DEVICE_NAME_LEN>;

/// Grid dimension that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GridError {
    /// Chip columns must be positive
    ZeroChipColumns,
    /// Chip rows must be positive
    ZeroChipRows,
    /// Device columns must be positive
    ZeroDeviceColumns,
    /// Device rows must be positive
    ZeroDeviceRows,
}

impl GridError {
    /// Human readable description
    pub const fn as_str(self) -> &'static str {
        match self {
            GridError::ZeroChipColumns => "chip columns must be positive",
            GridError::ZeroChipRows => "chip rows must be positive",
            GridError::ZeroDeviceColumns => "device columns must be positive",
            GridError::ZeroDeviceRows => "device rows must be positive",
        }
    }
}

/// Grid dimensions of one wafer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridDims {
    pub chip_cols: u16,
    pub chip_rows: u16,
    pub dev_cols: u16,
    pub dev_rows: u16,
}

impl Default for GridDims {
    fn default() -> Self {
        Self::new(3, 3, 2, 2)
    }
}

impl GridDims {
    pub const fn new(chip_cols: u16, chip_rows: u16, dev_cols: u16, dev_rows: u16) -> Self {
        Self {
            chip_cols,
            chip_rows,
            dev_cols,
            dev_rows,
        }
    }

    /// Reject grids with a zero dimension
    pub fn validate(&self) -> Result<(), GridError> {
        if self.chip_cols == 0 {
            return Err(GridError::ZeroChipColumns);
        }
        if self.chip_rows == 0 {
            return Err(GridError::ZeroChipRows);
        }
        if self.dev_cols == 0 {
            return Err(GridError::ZeroDeviceColumns);
        }
        if self.dev_rows == 0 {
            return Err(GridError::ZeroDeviceRows);
        }
        Ok(())
    }

    /// Number of chips on the wafer
    pub fn chip_count(&self) -> u64 {
        self.chip_cols as u64 * self.chip_rows as u64
    }

    /// Number of devices on one chip
    pub fn devices_per_chip(&self) -> u64 {
        self.dev_cols as u64 * self.dev_rows as u64
    }

    /// Number of devices on the wafer
    pub fn device_count(&self) -> u64 {
        self.chip_count() * self.devices_per_chip()
    }

    /// Check that an index lies inside the grid
    pub fn contains(&self, index: &DeviceIndex) -> bool {
        index.chip_col < self.chip_cols
            && index.chip_row < self.chip_rows
            && index.dev_col < self.dev_cols
            && index.dev_row < self.dev_rows
    }

    /// Iterate all devices in scan order
    pub fn iter(&self) -> GridIter {
        GridIter {
            dims: *self,
            next: 0,
            total: self.device_count(),
        }
    }
}

/// Position of one device in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIndex {
    pub chip_col: u16,
    pub chip_row: u16,
    pub dev_col: u16,
    pub dev_row: u16,
}

impl DeviceIndex {
    pub const fn new(chip_col: u16, chip_row: u16, dev_col: u16, dev_row: u16) -> Self {
        Self {
            chip_col,
            chip_row,
            dev_col,
            dev_row,
        }
    }

    /// Deterministic per-device seed
    ///
    /// Unique for grids with fewer than ten chips per direction and ten
    /// devices per chip direction.
    pub fn seed(&self) -> u32 {
        1000 * self.chip_col as u32
            + 100 * self.chip_row as u32
            + 10 * self.dev_col as u32
            + self.dev_row as u32
    }

    /// Device name used for output directories
    pub fn name(&self) -> DeviceName {
        let mut name = DeviceName::new();
        // Four u16 values and three separators always fit
        let _ = write!(
            name,
            "{}_{}_{}_{}",
            self.chip_col, self.chip_row, self.dev_col, self.dev_row
        );
        name
    }
}

/// Iterator over a grid in scan order
#[derive(Debug, Clone)]
pub struct GridIter {
    dims: GridDims,
    next: u64,
    total: u64,
}

impl Iterator for GridIter {
    type Item = DeviceIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }

        let i = self.next;
        self.next += 1;

        let dev_rows = self.dims.dev_rows as u64;
        let dev_cols = self.dims.dev_cols as u64;
        let chip_rows = self.dims.chip_rows as u64;

        Some(DeviceIndex {
            dev_row: (i % dev_rows) as u16,
            dev_col: ((i / dev_rows) % dev_cols) as u16,
            chip_row: ((i / (dev_rows * dev_cols)) % chip_rows) as u16,
            chip_col: (i / (dev_rows * dev_cols * chip_rows)) as u16,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seeds_in_order() {
        let dims = GridDims::new(2, 1, 2, 1);
        let mut seeds = [0u32; 4];
        for (slot, index) in seeds.iter_mut().zip(dims.iter()) {
            *slot = index.seed();
        }
        assert_eq!(seeds, [0, 10, 1000, 1010]);
    }

    #[test]
    fn test_nesting_order() {
        let dims = GridDims::new(2, 2, 2, 2);
        let mut iter = dims.iter();
        assert_eq!(iter.next(), Some(DeviceIndex::new(0, 0, 0, 0)));
        assert_eq!(iter.next(), Some(DeviceIndex::new(0, 0, 0, 1)));
        assert_eq!(iter.next(), Some(DeviceIndex::new(0, 0, 1, 0)));
        assert_eq!(iter.next(), Some(DeviceIndex::new(0, 0, 1, 1)));
        assert_eq!(iter.next(), Some(DeviceIndex::new(0, 1, 0, 0)));
        assert_eq!(iter.len(), 11);
        assert_eq!(iter.last(), Some(DeviceIndex::new(1, 1, 1, 1)));
    }

    #[test]
    fn test_validate() {
        assert!(GridDims::new(1, 1, 1, 1).validate().is_ok());
        assert_eq!(GridDims::new(0, 1, 1, 1).validate(), Err(GridError::ZeroChipColumns));
        assert_eq!(GridDims::new(1, 0, 1, 1).validate(), Err(GridError::ZeroChipRows));
        assert_eq!(GridDims::new(1, 1, 0, 1).validate(), Err(GridError::ZeroDeviceColumns));
        assert_eq!(GridDims::new(1, 1, 1, 0).validate(), Err(GridError::ZeroDeviceRows));
    }

    #[test]
    fn test_zero_dimension_is_empty() {
        assert_eq!(GridDims::new(3, 0, 2, 2).iter().count(), 0);
    }

    #[test]
    fn test_device_name() {
        assert_eq!(DeviceIndex::new(1, 2, 0, 3).name().as_str(), "1_2_0_3");
        assert_eq!(
            DeviceIndex::new(65535, 65535, 65535, 65535).name().as_str(),
            "65535_65535_65535_65535"
        );
    }

    proptest! {
        #[test]
        fn prop_count_and_bounds(cc in 1u16..6, cr in 1u16..6, dc in 1u16..6, dr in 1u16..6) {
            let dims = GridDims::new(cc, cr, dc, dr);
            let mut count = 0u64;
            let mut prev: Option<DeviceIndex> = None;
            for index in dims.iter() {
                prop_assert!(dims.contains(&index));
                if let Some(p) = prev {
                    let key = |i: DeviceIndex| (i.chip_col, i.chip_row, i.dev_col, i.dev_row);
                    // Strictly increasing in nesting order implies uniqueness
                    prop_assert!(key(p) < key(index));
                }
                prev = Some(index);
                count += 1;
            }
            prop_assert_eq!(count, dims.device_count());
        }
    }
}
