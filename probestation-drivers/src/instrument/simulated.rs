//! Simulated source meter
//!
//! Models the device under the probes as a plain resistor. The device
//! behavior is picked deterministically from the device seed so a scan over
//! a simulated wafer shows a repeatable mix of good, open and shorted
//! devices.

use probestation_core::traits::{Instrument, InstrumentError};

/// Resistance of a working device (ohms)
pub const GOOD_DEVICE_OHMS: f64 = 1.0e6;

/// Resistance of an open device (ohms)
pub const OPEN_DEVICE_OHMS: f64 = 1.0e12;

/// Resistance of a shorted device (ohms)
pub const SHORTED_DEVICE_OHMS: f64 = 10.0;

/// Measurement range as a multiple of the compliance current
const MEASURE_RANGE_FACTOR: f64 = 1.05;

/// Simulated device behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceModel {
    /// Conducts, passes screening
    Good,
    /// No contact or broken channel
    Open,
    /// Conducts far above the current limit
    Shorted,
}

impl DeviceModel {
    /// Pick a model from a device seed
    ///
    /// Roughly seven in ten devices are good, two open, one shorted.
    pub fn for_seed(seed: u32) -> Self {
        // Knuth multiplicative hash spreads neighbouring seeds
        let bucket = (seed.wrapping_mul(2_654_435_761) >> 16) % 10;
        match bucket {
            0..=6 => DeviceModel::Good,
            7..=8 => DeviceModel::Open,
            _ => DeviceModel::Shorted,
        }
    }

    /// Resistance of the modelled device
    pub fn resistance(&self) -> f64 {
        match self {
            DeviceModel::Good => GOOD_DEVICE_OHMS,
            DeviceModel::Open => OPEN_DEVICE_OHMS,
            DeviceModel::Shorted => SHORTED_DEVICE_OHMS,
        }
    }
}

/// Source meter simulator implementing [`Instrument`]
#[derive(Debug, Clone)]
pub struct SimulatedSourceMeter {
    model: DeviceModel,
    voltage: f64,
    range_v: f64,
    compliance_a: f64,
    enabled: bool,
    ramps: u32,
}

impl Default for SimulatedSourceMeter {
    fn default() -> Self {
        Self::new(DeviceModel::Good)
    }
}

impl SimulatedSourceMeter {
    /// Create a source meter connected to a device of the given model
    pub fn new(model: DeviceModel) -> Self {
        Self {
            model,
            voltage: 0.0,
            range_v: 20.0,
            compliance_a: 0.1,
            enabled: false,
            ramps: 0,
        }
    }

    /// Create a source meter for the device with this seed
    pub fn for_device(seed: u32) -> Self {
        Self::new(DeviceModel::for_seed(seed))
    }

    /// Modelled device
    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// Present source level (volts)
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Number of ramp commands received
    pub fn ramp_count(&self) -> u32 {
        self.ramps
    }
}

impl Instrument for SimulatedSourceMeter {
    fn configure(&mut self, range_v: f64, compliance_a: f64, _nplc: u8) -> Result<(), InstrumentError> {
        if range_v <= 0.0 || compliance_a <= 0.0 {
            return Err(InstrumentError::OutOfRange);
        }
        self.range_v = range_v;
        self.compliance_a = compliance_a;
        Ok(())
    }

    fn ramp_to(&mut self, volts: f64) -> Result<(), InstrumentError> {
        if volts > self.range_v || volts < -self.range_v {
            return Err(InstrumentError::OutOfRange);
        }
        self.voltage = volts;
        self.ramps += 1;
        Ok(())
    }

    fn current_reading(&mut self) -> Result<f64, InstrumentError> {
        if !self.enabled {
            return Err(InstrumentError::OutputDisabled);
        }
        let current = self.voltage / self.model.resistance();
        let range = self.compliance_a * MEASURE_RANGE_FACTOR;
        Ok(current.clamp(-range, range))
    }

    fn enable_output(&mut self) -> Result<(), InstrumentError> {
        self.enabled = true;
        Ok(())
    }

    fn disable_output(&mut self) -> Result<(), InstrumentError> {
        self.enabled = false;
        Ok(())
    }

    fn output_enabled(&self) -> bool {
        self.enabled
    }
}
