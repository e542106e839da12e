//! Device task descriptors

use std::path::{Path, PathBuf};

use probestation_core::config::SweepParameters;
use probestation_core::scheduler::{DeviceIndex, GridDims};

/// Everything the coordinator needs to process one device
///
/// Created once by the producer and consumed once by the coordinator.
/// Fields are private so a descriptor never changes after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTaskDescriptor {
    wafer_name: String,
    save_root: PathBuf,
    index: DeviceIndex,
    name: String,
    output_dir: PathBuf,
    sweep: SweepParameters,
    seed: u32,
    dims: GridDims,
}

impl DeviceTaskDescriptor {
    /// Describe the device at `index` inside `scan_root`
    pub fn new(
        wafer_name: &str,
        save_root: &Path,
        scan_root: &Path,
        index: DeviceIndex,
        dims: GridDims,
        sweep: SweepParameters,
    ) -> Self {
        let name = index.name().as_str().to_string();
        let output_dir = scan_root.join(format!("dev_{name}"));
        Self {
            wafer_name: wafer_name.to_string(),
            save_root: save_root.to_path_buf(),
            index,
            name,
            output_dir,
            sweep,
            seed: index.seed(),
            dims,
        }
    }

    pub fn wafer_name(&self) -> &str {
        &self.wafer_name
    }

    pub fn save_root(&self) -> &Path {
        &self.save_root
    }

    pub fn index(&self) -> DeviceIndex {
        self.index
    }

    /// Device name, `"{chip_col}_{chip_row}_{dev_col}_{dev_row}"`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory receiving this device's results
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn sweep(&self) -> &SweepParameters {
        &self.sweep
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Grid totals used for progress fractions
    pub fn dims(&self) -> GridDims {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_fields() {
        let desc = DeviceTaskDescriptor::new(
            "W1",
            Path::new("/data"),
            Path::new("/data/scan"),
            DeviceIndex::new(1, 0, 2, 3),
            GridDims::new(2, 1, 4, 4),
            SweepParameters::default(),
        );

        assert_eq!(desc.name(), "1_0_2_3");
        assert_eq!(desc.output_dir(), Path::new("/data/scan/dev_1_0_2_3"));
        assert_eq!(desc.seed(), 1023);
        assert_eq!(desc.wafer_name(), "W1");
        assert_eq!(desc.dims().device_count(), 32);
    }
}
