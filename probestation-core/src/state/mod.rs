//! State machines
//!
//! Axis motion state and per-device scan phases. Both are explicit,
//! finite and deterministic: the next state is a function of the current
//! state and an event.

pub mod axis;
pub mod device;
pub mod events;

pub use axis::{AxisEvent, AxisState};
pub use device::DevicePhase;
pub use events::DeviceEvent;
