//! Measurement math
//!
//! Sweep point generation and screening evaluation shared by the
//! measurement procedures.

pub mod screening;
pub mod sweep;

pub use screening::{limit_amps, ScreeningTracker, StepOutcome, Verdict, SCREENING_PASS_CURRENT_A};
pub use sweep::{bias_points, gate_points, source_range_for, GateSweep, Linspace};
