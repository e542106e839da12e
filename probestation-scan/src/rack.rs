//! Instrument rack
//!
//! Supplies the bias and gate source meters for each device. Procedures
//! run on their own threads, so instruments are shared behind a mutex.

use std::sync::Arc;

use parking_lot::Mutex;

use probestation_core::traits::Instrument;
use probestation_drivers::instrument::{DeviceModel, SimulatedSourceMeter};

use crate::descriptor::DeviceTaskDescriptor;

/// Instrument shared between the coordinator and a procedure thread
pub type SharedInstrument = Arc<Mutex<dyn Instrument + Send>>;

/// Source meters wired to the probes
#[derive(Clone)]
pub struct Instruments {
    /// Drain-source bias
    pub bias: SharedInstrument,
    /// Back gate
    pub gate: SharedInstrument,
}

/// Provides the instruments for the device under the probes
pub trait InstrumentRack: Send {
    fn prepare(&mut self, descriptor: &DeviceTaskDescriptor) -> Instruments;
}

/// How the simulated rack picks device behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelPolicy {
    /// Derived from the device seed
    #[default]
    BySeed,
    /// Same model for every device
    Uniform(DeviceModel),
}

/// Rack of simulated source meters
#[derive(Default)]
pub struct SimulatedRack {
    policy: ModelPolicy,
    gate: Option<Arc<Mutex<SimulatedSourceMeter>>>,
}

impl SimulatedRack {
    pub fn new(policy: ModelPolicy) -> Self {
        Self { policy, gate: None }
    }
}

impl InstrumentRack for SimulatedRack {
    fn prepare(&mut self, descriptor: &DeviceTaskDescriptor) -> Instruments {
        let meter = match self.policy {
            ModelPolicy::BySeed => SimulatedSourceMeter::for_device(descriptor.seed()),
            ModelPolicy::Uniform(model) => SimulatedSourceMeter::new(model),
        };
        let bias: SharedInstrument = Arc::new(Mutex::new(meter));

        // The gate leaks next to nothing whatever the device does
        let gate = self
            .gate
            .get_or_insert_with(|| {
                Arc::new(Mutex::new(SimulatedSourceMeter::new(DeviceModel::Open)))
            })
            .clone();

        Instruments { bias, gate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probestation_core::config::SweepParameters;
    use probestation_core::scheduler::{DeviceIndex, GridDims};
    use std::path::Path;

    fn descriptor(index: DeviceIndex) -> DeviceTaskDescriptor {
        DeviceTaskDescriptor::new(
            "W",
            Path::new("/tmp"),
            Path::new("/tmp/scan"),
            index,
            GridDims::new(2, 2, 2, 2),
            SweepParameters::default(),
        )
    }

    #[test]
    fn test_gate_shared_between_devices() {
        let mut rack = SimulatedRack::default();
        let first = rack.prepare(&descriptor(DeviceIndex::new(0, 0, 0, 0)));
        let second = rack.prepare(&descriptor(DeviceIndex::new(0, 0, 0, 1)));

        first.gate.lock().enable_output().unwrap();
        assert!(second.gate.lock().output_enabled());
        assert!(!Arc::ptr_eq(&first.bias, &second.bias));
    }

    #[test]
    fn test_uniform_policy() {
        let mut rack = SimulatedRack::new(ModelPolicy::Uniform(DeviceModel::Shorted));
        let instruments = rack.prepare(&descriptor(DeviceIndex::new(1, 1, 1, 1)));

        let mut bias = instruments.bias.lock();
        bias.configure(0.2, 1e-6, 1).unwrap();
        bias.enable_output().unwrap();
        bias.ramp_to(0.1).unwrap();
        assert!(bias.current_reading().unwrap() > 1e-6);
    }
}
