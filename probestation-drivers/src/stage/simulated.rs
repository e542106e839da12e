//! Simulated three-axis stage
//!
//! Motion advances only when the axis velocity is polled: every
//! `axis_velocity` call moves the axis one tick toward its target (or one
//! tick along a jog). This keeps tests deterministic and lets them control
//! how many polls a move takes.

use probestation_core::config::StageSerials;
use probestation_core::motion::{Axis, AxisPosition, MICROSTEPS_PER_STEP};
use probestation_core::traits::{BackendError, MotionBackend};

/// Default travel per velocity poll: 2000 full steps
pub const DEFAULT_TRAVEL_PER_TICK: i64 = 2_000 * MICROSTEPS_PER_STEP as i64;

#[derive(Debug, Clone, Copy)]
struct SimAxis {
    position: i64,
    target: Option<i64>,
    jog: Option<i8>,
    speed: u32,
    serial: u32,
    connected: bool,
    stops: u32,
    moves: u32,
}

impl SimAxis {
    fn new(serial: u32) -> Self {
        Self {
            position: 0,
            target: None,
            jog: None,
            speed: 0,
            serial,
            connected: true,
            stops: 0,
            moves: 0,
        }
    }

    fn is_moving(&self) -> bool {
        self.target.is_some() || self.jog.is_some()
    }

    /// Advance one tick, returning the velocity before the tick
    fn tick(&mut self, travel: i64) -> i32 {
        if let Some(sign) = self.jog {
            self.position += travel * sign as i64;
            return self.speed.max(1) as i32 * sign as i32;
        }

        match self.target {
            Some(target) => {
                let remaining = target - self.position;
                let step = remaining.clamp(-travel, travel);
                self.position += step;
                if self.position == target {
                    self.target = None;
                }
                if step == 0 {
                    0
                } else {
                    self.speed.max(1) as i32 * step.signum() as i32
                }
            }
            None => 0,
        }
    }
}

/// Stage simulator implementing [`MotionBackend`]
#[derive(Debug, Clone)]
pub struct SimulatedStage {
    axes: [SimAxis; 3],
    travel_per_tick: i64,
}

impl Default for SimulatedStage {
    fn default() -> Self {
        Self::new(StageSerials::default())
    }
}

impl SimulatedStage {
    /// Create a stage whose controllers report the given serials
    pub fn new(serials: StageSerials) -> Self {
        Self {
            axes: Axis::ALL.map(|axis| SimAxis::new(serials.serial(axis))),
            travel_per_tick: DEFAULT_TRAVEL_PER_TICK,
        }
    }

    /// Set how far an axis travels per velocity poll (microsteps)
    pub fn with_travel_per_tick(mut self, microsteps: i64) -> Self {
        self.travel_per_tick = microsteps.max(1);
        self
    }

    /// Place the stage at a position without moving
    pub fn with_position(mut self, axis: Axis, position: AxisPosition) -> Self {
        self.axes[axis.index()].position = position.to_microsteps();
        self
    }

    /// Disconnect one axis controller
    pub fn disconnect(&mut self, axis: Axis) {
        self.axes[axis.index()].connected = false;
    }

    /// Stop commands received by one axis
    pub fn stop_count(&self, axis: Axis) -> u32 {
        self.axes[axis.index()].stops
    }

    /// Move commands received by one axis
    pub fn move_count(&self, axis: Axis) -> u32 {
        self.axes[axis.index()].moves
    }

    /// Speed last set on one axis
    pub fn speed(&self, axis: Axis) -> u32 {
        self.axes[axis.index()].speed
    }

    /// Check if any axis is moving
    pub fn any_moving(&self) -> bool {
        self.axes.iter().any(SimAxis::is_moving)
    }

    fn axis_mut(&mut self, axis: Axis) -> Result<&mut SimAxis, BackendError> {
        let sim = &mut self.axes[axis.index()];
        if sim.connected {
            Ok(sim)
        } else {
            Err(BackendError::NotConnected(axis))
        }
    }
}

impl MotionBackend for SimulatedStage {
    fn move_axis(&mut self, axis: Axis, coarse: i32, fine: i32) -> Result<(), BackendError> {
        let sim = self.axis_mut(axis)?;
        sim.jog = None;
        sim.target = Some(AxisPosition::new(coarse, fine).to_microsteps());
        sim.moves += 1;
        Ok(())
    }

    fn axis_velocity(&mut self, axis: Axis) -> Result<i32, BackendError> {
        let travel = self.travel_per_tick;
        Ok(self.axis_mut(axis)?.tick(travel))
    }

    fn stop_axis(&mut self, axis: Axis) -> Result<(), BackendError> {
        let sim = self.axis_mut(axis)?;
        sim.target = None;
        sim.jog = None;
        sim.stops += 1;
        Ok(())
    }

    fn axis_position(&mut self, axis: Axis) -> Result<(i32, i32), BackendError> {
        let pos = AxisPosition::from_microsteps(self.axis_mut(axis)?.position);
        Ok((pos.coarse, pos.fine))
    }

    fn jog_axis(&mut self, axis: Axis, sign: i8) -> Result<(), BackendError> {
        if sign == 0 {
            return Err(BackendError::CommandRejected(axis));
        }
        let sim = self.axis_mut(axis)?;
        sim.target = None;
        sim.jog = Some(sign.signum());
        Ok(())
    }

    fn set_axis_speed(&mut self, axis: Axis, speed: u32) -> Result<(), BackendError> {
        self.axis_mut(axis)?.speed = speed;
        Ok(())
    }

    fn axis_serial(&mut self, axis: Axis) -> Result<u32, BackendError> {
        Ok(self.axis_mut(axis)?.serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(stage: &mut SimulatedStage, axis: Axis) -> u32 {
        let mut polls = 0;
        while stage.axis_velocity(axis).unwrap() != 0 {
            polls += 1;
            assert!(polls < 1_000, "axis never settled");
        }
        polls
    }

    #[test]
    fn test_move_reaches_target() {
        let mut stage = SimulatedStage::default();
        stage.move_axis(Axis::X, 5_000, 12).unwrap();
        let polls = settle(&mut stage, Axis::X);

        assert_eq!(polls, 3);
        assert_eq!(stage.axis_position(Axis::X).unwrap(), (5_000, 12));
    }

    #[test]
    fn test_travel_per_tick() {
        let mut stage = SimulatedStage::default().with_travel_per_tick(256);
        stage.move_axis(Axis::Z, 4, 0).unwrap();
        assert_eq!(settle(&mut stage, Axis::Z), 4);
    }

    #[test]
    fn test_negative_target() {
        let mut stage = SimulatedStage::default();
        stage.move_axis(Axis::Y, -1, 255).unwrap();
        settle(&mut stage, Axis::Y);
        assert_eq!(stage.axis_position(Axis::Y).unwrap(), (-1, 255));
    }

    #[test]
    fn test_stop_halts_motion() {
        let mut stage = SimulatedStage::default().with_travel_per_tick(256);
        stage.move_axis(Axis::X, 100, 0).unwrap();
        assert_ne!(stage.axis_velocity(Axis::X).unwrap(), 0);

        stage.stop_axis(Axis::X).unwrap();
        assert_eq!(stage.axis_velocity(Axis::X).unwrap(), 0);
        assert_eq!(stage.axis_position(Axis::X).unwrap(), (1, 0));
        assert_eq!(stage.stop_count(Axis::X), 1);
    }

    #[test]
    fn test_jog_until_stopped() {
        let mut stage = SimulatedStage::default().with_travel_per_tick(256);
        stage.set_axis_speed(Axis::Z, 2000).unwrap();
        stage.jog_axis(Axis::Z, -1).unwrap();

        assert_eq!(stage.axis_velocity(Axis::Z).unwrap(), -2000);
        assert_eq!(stage.axis_velocity(Axis::Z).unwrap(), -2000);
        assert!(stage.any_moving());

        stage.stop_axis(Axis::Z).unwrap();
        assert_eq!(stage.axis_position(Axis::Z).unwrap(), (-2, 0));
        assert!(!stage.any_moving());
    }

    #[test]
    fn test_disconnected_axis() {
        let mut stage = SimulatedStage::default();
        stage.disconnect(Axis::Y);
        assert_eq!(stage.axis_serial(Axis::Y), Err(BackendError::NotConnected(Axis::Y)));
        assert_eq!(stage.axis_serial(Axis::X), Ok(18_162));
    }

    #[test]
    fn test_zero_jog_rejected() {
        let mut stage = SimulatedStage::default();
        assert_eq!(stage.jog_axis(Axis::X, 0), Err(BackendError::CommandRejected(Axis::X)));
    }
}
