//! Error types for scan orchestration

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use probestation_core::motion::{Axis, IntentError, OutOfRange};
use probestation_core::traits::BackendError;

use crate::config::ConfigError;

/// Errors from a stage move or manual stage operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("target out of range on {} axis ({steps} steps)", .axis.name())]
    OutOfRange { axis: Axis, steps: i32 },

    #[error("emergency stop")]
    EmergencyStop,

    #[error("{} axis already moving {active:?}", .axis.name())]
    AxisBusy {
        axis: Axis,
        active: probestation_core::motion::Direction,
    },

    #[error("motion backend error on {} axis: {:?}", .0.axis().name(), .0)]
    Backend(BackendError),

    #[error("grid transform not computed")]
    NoGridTransform,
}

impl From<OutOfRange> for MoveError {
    fn from(e: OutOfRange) -> Self {
        MoveError::OutOfRange {
            axis: e.axis,
            steps: e.steps,
        }
    }
}

impl From<BackendError> for MoveError {
    fn from(e: BackendError) -> Self {
        MoveError::Backend(e)
    }
}

impl From<IntentError> for MoveError {
    fn from(e: IntentError) -> Self {
        match e {
            IntentError::AxisBusy { axis, active } => MoveError::AxisBusy { axis, active },
        }
    }
}

/// Errors that end a scan attempt
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("scan output root {path:?} could not be created: {source}")]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("a scan is already running")]
    AlreadyRunning,

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),

    #[error("stage error: {0}")]
    Move(#[from] MoveError),
}

impl ScanError {
    /// Check if this error was raised before any worker started
    pub fn is_configuration(&self) -> bool {
        matches!(self, ScanError::Configuration(_) | ScanError::AlreadyRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probestation_core::motion::Direction;

    #[test]
    fn test_out_of_range_message() {
        let err = MoveError::from(OutOfRange {
            axis: Axis::X,
            steps: 14_601,
        });
        assert_eq!(err.to_string(), "target out of range on x axis (14601 steps)");
    }

    #[test]
    fn test_intent_conversion() {
        let err = MoveError::from(IntentError::AxisBusy {
            axis: Axis::Y,
            active: Direction::North,
        });
        assert_eq!(err.to_string(), "y axis already moving North");
    }

    #[test]
    fn test_backend_message() {
        let err = MoveError::from(BackendError::NotConnected(Axis::Z));
        assert_eq!(err.to_string(), "motion backend error on z axis: NotConnected(Z)");
    }
}
