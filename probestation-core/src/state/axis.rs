//! Per-axis motion state

/// Axis states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisState {
    /// Stationary, ready for a command
    #[default]
    Idle,
    /// Executing a move or jog
    Moving,
    /// Stop issued, waiting for zero velocity
    Stopping,
}

/// Events driving an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisEvent {
    /// Move or jog issued to the backend
    Commanded,
    /// Stop issued to the backend
    StopRequested,
    /// Backend reports zero velocity
    Settled,
}

impl AxisState {
    /// Whether the axis may be given a new command
    pub fn accepts_command(&self) -> bool {
        matches!(self, AxisState::Idle)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: AxisEvent) -> Self {
        use AxisEvent::*;
        use AxisState::*;

        match (self, event) {
            (Idle, Commanded) => Moving,
            (Moving, StopRequested) => Stopping,
            (Moving, Settled) => Idle,
            (Stopping, Settled) => Idle,
            // A stop on an idle axis is confirmed immediately
            (Idle, StopRequested) => Idle,

            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_cycle() {
        let state = AxisState::Idle.transition(AxisEvent::Commanded);
        assert_eq!(state, AxisState::Moving);
        assert_eq!(state.transition(AxisEvent::Settled), AxisState::Idle);
    }

    #[test]
    fn test_stop_cycle() {
        let stopping = AxisState::Moving.transition(AxisEvent::StopRequested);
        assert_eq!(stopping, AxisState::Stopping);

        // Commands are ignored until settled
        assert_eq!(stopping.transition(AxisEvent::Commanded), AxisState::Stopping);
        assert!(!stopping.accepts_command());

        assert_eq!(stopping.transition(AxisEvent::Settled), AxisState::Idle);
    }

    #[test]
    fn test_idle_stop_is_noop() {
        assert_eq!(AxisState::Idle.transition(AxisEvent::StopRequested), AxisState::Idle);
        assert!(AxisState::Idle.accepts_command());
    }
}
