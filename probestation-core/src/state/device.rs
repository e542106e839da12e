//! Per-device scan phase machine
//!
//! Every device walks
//! `PendingMove -> Moving -> Screening -> {Passed -> FullTest | Failed -> SkipFullTest}
//! -> ProgressUpdate -> {NextDevice | ScanComplete | Aborted}`.
//! A rejected move skips measurement and goes straight to progress.

use super::events::DeviceEvent;

/// Device phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DevicePhase {
    /// Descriptor taken from the queue, move not yet issued
    #[default]
    PendingMove,
    /// Stage travelling to the device
    Moving,
    /// Screening procedure running
    Screening,
    /// Screening passed
    Passed,
    /// Screening failed
    Failed,
    /// Full test running
    FullTest,
    /// Full test not run
    SkipFullTest,
    /// Recording outcome and progress
    ProgressUpdate,
    /// Done, another device follows
    NextDevice,
    /// Done, last device of the scan
    ScanComplete,
    /// Scan aborted while on this device
    Aborted,
}

impl DevicePhase {
    /// Check if a full test may be submitted in this phase
    pub fn full_test_allowed(&self) -> bool {
        matches!(self, DevicePhase::Passed)
    }

    /// Check if the stage may be moving in this phase
    pub fn motion_allowed(&self) -> bool {
        matches!(self, DevicePhase::PendingMove | DevicePhase::Moving)
    }

    /// Check if this device is finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DevicePhase::NextDevice | DevicePhase::ScanComplete | DevicePhase::Aborted
        )
    }

    /// Process an event and return the next phase
    pub fn transition(self, event: DeviceEvent) -> Self {
        use DeviceEvent::*;
        use DevicePhase::*;

        if event == Abort && !self.is_terminal() {
            return Aborted;
        }

        match (self, event) {
            (PendingMove, MoveIssued) => Moving,
            (PendingMove, MoveRejected) => ProgressUpdate,

            (Moving, MoveCompleted) => Screening,
            (Moving, MoveRejected) => ProgressUpdate,

            (Screening, ScreeningPassed) => Passed,
            (Screening, ScreeningFailed) => Failed,

            (Passed, FullTestSubmitted) => FullTest,
            (Passed, FullTestSkipped) => SkipFullTest,
            (Failed, FullTestSkipped) => SkipFullTest,

            (FullTest, Recorded) => ProgressUpdate,
            (SkipFullTest, Recorded) => ProgressUpdate,

            (ProgressUpdate, NextQueued) => NextDevice,
            (ProgressUpdate, QueueExhausted) => ScanComplete,

            // Default: stay in current phase
            _ => self,
        }
    }
}
