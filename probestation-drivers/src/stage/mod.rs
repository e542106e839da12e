//! Stage implementations

pub mod simulated;

pub use simulated::{SimulatedStage, DEFAULT_TRAVEL_PER_TICK};
