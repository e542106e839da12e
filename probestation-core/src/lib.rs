//! Stage-agnostic core logic for the probestation wafer scanner
//!
//! This crate contains all logic that does not depend on a particular
//! motion controller or source meter:
//!
//! - Axis position encoding (steps + 1/256 microsteps) and normalization
//! - Safety envelope for stage travel
//! - Calibration points and the wafer grid coordinate transform
//! - Movement intent tracking for manual jogging
//! - Axis and per-device state machines
//! - Grid enumeration, device seeds and progress math
//! - Measurement sweep generation and screening evaluation
//! - Capability traits for the motion backend and instruments
//! - Configuration type definitions

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod measurement;
pub mod motion;
pub mod scheduler;
pub mod state;
pub mod traits;
