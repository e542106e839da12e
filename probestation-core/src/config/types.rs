//! Configuration type definitions
//!
//! These types represent the scan configuration. The host loads them from
//! a TOML file; every field has a default.

use crate::motion::{Axis, SpeedPreset};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sweep parameter rejected by validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SweepError {
    /// Bias maximum must not be negative
    NegativeBias,
    /// Bias step must be positive
    BiasStep,
    /// Current limit must be positive
    CurrentLimit,
    /// Gate minimum must be below gate maximum
    GateRange,
    /// Gate step must be positive
    GateStep,
}

impl SweepError {
    /// Human readable description
    pub const fn as_str(self) -> &'static str {
        match self {
            SweepError::NegativeBias => "bias maximum must not be negative",
            SweepError::BiasStep => "bias step must be positive",
            SweepError::CurrentLimit => "bias current limit must be positive",
            SweepError::GateRange => "gate minimum must be below gate maximum",
            SweepError::GateStep => "gate step must be positive",
        }
    }
}

/// Measurement sweep parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SweepParameters {
    /// Bias voltage maximum (mV)
    pub bias_max_mv: f64,
    /// Bias ramp increment (mV)
    pub bias_step_mv: f64,
    /// Bias current limit (uA)
    pub bias_current_limit_ua: f64,
    /// Gate sweep minimum (V)
    pub gate_min_v: f64,
    /// Gate sweep maximum (V)
    pub gate_max_v: f64,
    /// Gate sweep increment (mV)
    pub gate_step_mv: f64,
    /// Delay between setting a point and reading current (ms)
    pub delay_ms: u32,
    /// Integration time for screening (power line cycles)
    pub nplc_screening: u8,
    /// Integration time for the full test (power line cycles)
    pub nplc_full_test: u8,
}

impl Default for SweepParameters {
    fn default() -> Self {
        Self {
            bias_max_mv: 100.0,
            bias_step_mv: 1.0,
            bias_current_limit_ua: 1.0,
            gate_min_v: -5.0,
            gate_max_v: 5.0,
            gate_step_mv: 10.0,
            delay_ms: 200,
            nplc_screening: 1,
            nplc_full_test: 1,
        }
    }
}

impl SweepParameters {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.bias_max_mv < 0.0 {
            return Err(SweepError::NegativeBias);
        }
        if self.bias_step_mv <= 0.0 {
            return Err(SweepError::BiasStep);
        }
        if self.bias_current_limit_ua <= 0.0 {
            return Err(SweepError::CurrentLimit);
        }
        if self.gate_min_v >= self.gate_max_v {
            return Err(SweepError::GateRange);
        }
        if self.gate_step_mv <= 0.0 {
            return Err(SweepError::GateStep);
        }
        Ok(())
    }

    /// Bias maximum in volts
    pub fn bias_max_v(&self) -> f64 {
        self.bias_max_mv * 1e-3
    }
}

/// Stage speeds per preset (controller speed units)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SpeedTable {
    pub normal_xy: u32,
    pub normal_z: u32,
    pub fast_xy: u32,
    pub fast_z: u32,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            normal_xy: 500,
            normal_z: 2000,
            fast_xy: 2000,
            fast_z: 4500,
        }
    }
}

impl SpeedTable {
    /// Speed of one axis under a preset
    pub fn speed(&self, preset: SpeedPreset, axis: Axis) -> u32 {
        match (preset, axis) {
            (SpeedPreset::Normal, Axis::X | Axis::Y) => self.normal_xy,
            (SpeedPreset::Normal, Axis::Z) => self.normal_z,
            (SpeedPreset::Fast, Axis::X | Axis::Y) => self.fast_xy,
            (SpeedPreset::Fast, Axis::Z) => self.fast_z,
        }
    }
}

/// Motion polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotionTiming {
    /// Interval between velocity polls (ms)
    pub poll_interval_ms: u32,
    /// Delay after issuing a move before the first poll (ms)
    pub settle_ms: u32,
    /// Upper bound on waiting for axes to confirm a stop (ms)
    pub stop_timeout_ms: u32,
}

impl Default for MotionTiming {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            settle_ms: 300,
            stop_timeout_ms: 5_000,
        }
    }
}

/// Scan orchestration timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScanTiming {
    /// Ceiling for one screening run (ms)
    pub screening_timeout_ms: u32,
    /// Ceiling for one full test (ms)
    pub full_test_timeout_ms: u32,
    /// Sleep while the queue is momentarily empty (ms)
    pub queue_poll_ms: u32,
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self {
            screening_timeout_ms: 3_600_000,
            full_test_timeout_ms: 3_600_000,
            queue_poll_ms: 100,
        }
    }
}
