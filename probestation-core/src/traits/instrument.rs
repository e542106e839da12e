//! Source meter trait

/// Errors that can occur with instrument operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InstrumentError {
    /// Instrument did not answer
    NotResponding,
    /// Requested value outside the configured range
    OutOfRange,
    /// Output must be enabled for this operation
    OutputDisabled,
}

/// Trait for a voltage source with current readback
///
/// Implementations wrap a source measure unit channel. The scan drives one
/// instance for the bias and one for the gate.
pub trait Instrument {
    /// Configure voltage sourcing
    ///
    /// `range_v` is the source range, `compliance_a` the current compliance
    /// and `nplc` the integration time in power line cycles.
    fn configure(&mut self, range_v: f64, compliance_a: f64, nplc: u8) -> Result<(), InstrumentError>;

    /// Ramp the output to a voltage
    fn ramp_to(&mut self, volts: f64) -> Result<(), InstrumentError>;

    /// Measure the current through the output in amps
    fn current_reading(&mut self) -> Result<f64, InstrumentError>;

    /// Turn the output on
    fn enable_output(&mut self) -> Result<(), InstrumentError>;

    /// Turn the output off
    fn disable_output(&mut self) -> Result<(), InstrumentError>;

    /// Check if the output is on
    fn output_enabled(&self) -> bool;

    /// Ramp to zero and turn the output off
    fn safe_shutdown(&mut self) -> Result<(), InstrumentError> {
        self.ramp_to(0.0)?;
        self.disable_output()
    }
}
