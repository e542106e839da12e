//! Driver implementations
//!
//! This crate provides implementations of the traits defined in
//! probestation-core that run without lab hardware:
//!
//! - Simulated three-axis stage (a `MotionBackend`)
//! - Simulated source meter (an `Instrument`) with per-device behavior

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod instrument;
pub mod stage;
