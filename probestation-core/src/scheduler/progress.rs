//! Scan progress fractions

use super::grid::{DeviceIndex, GridDims};

/// Progress after finishing one device, as whole percentages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Progress {
    /// Share of the wafer done (0-100)
    pub wafer_pct: u8,
    /// Share of the current chip done (0-100)
    pub chip_pct: u8,
}

impl Progress {
    /// Progress after `index` completes
    ///
    /// `within_chip = (dev_col * dev_rows + dev_row + 1) / devices_per_chip`
    /// and `wafer = (chip_col * chip_rows + chip_row + within_chip) / chips`,
    /// both floored to whole percentages.
    pub fn after(index: &DeviceIndex, dims: &GridDims) -> Self {
        let per_chip = dims.devices_per_chip();
        let chips = dims.chip_count();
        if per_chip == 0 || chips == 0 {
            return Self::default();
        }

        let done_in_chip = index.dev_col as u64 * dims.dev_rows as u64 + index.dev_row as u64 + 1;
        let chips_done = index.chip_col as u64 * dims.chip_rows as u64 + index.chip_row as u64;

        let chip_pct = 100 * done_in_chip / per_chip;
        let wafer_pct = 100 * (chips_done * per_chip + done_in_chip) / (chips * per_chip);

        Self {
            wafer_pct: wafer_pct.min(100) as u8,
            chip_pct: chip_pct.min(100) as u8,
        }
    }
}
