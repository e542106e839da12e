//! Events that advance a device through its scan phases

/// Events that can trigger device phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceEvent {
    // Motion events
    /// Three-phase move started
    MoveIssued,
    /// Stage arrived at the device
    MoveCompleted,
    /// Target out of range or move failed
    MoveRejected,

    // Measurement events
    /// Screening decided the device is worth a full test
    ScreeningPassed,
    /// Screening failed, timed out or was cancelled
    ScreeningFailed,
    /// Full test handed to the sink
    FullTestSubmitted,
    /// Full test not run
    FullTestSkipped,
    /// Device outcome and progress recorded
    Recorded,

    // Queue events
    /// Another descriptor is available
    NextQueued,
    /// Producer finished and queue drained
    QueueExhausted,

    /// Scan abort observed
    Abort,
}

impl DeviceEvent {
    /// Check if this event comes from the motion engine
    pub fn is_motion_event(&self) -> bool {
        matches!(
            self,
            DeviceEvent::MoveIssued | DeviceEvent::MoveCompleted | DeviceEvent::MoveRejected
        )
    }

    /// Check if this event comes from a measurement
    pub fn is_measurement_event(&self) -> bool {
        matches!(
            self,
            DeviceEvent::ScreeningPassed
                | DeviceEvent::ScreeningFailed
                | DeviceEvent::FullTestSubmitted
                | DeviceEvent::FullTestSkipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_groups() {
        assert!(DeviceEvent::MoveCompleted.is_motion_event());
        assert!(!DeviceEvent::MoveCompleted.is_measurement_event());
        assert!(DeviceEvent::ScreeningPassed.is_measurement_event());
        assert!(!DeviceEvent::Abort.is_motion_event());
        assert!(!DeviceEvent::Abort.is_measurement_event());
    }
}
