//! Motion engine
//!
//! Owns the motion backend and serializes every stage request through an
//! async mutex. Automated moves run in three phases (Z up to the safe
//! height, X and Y together, Z down to the target) and poll axis velocity
//! until each phase settles. The mutex is held for single backend calls
//! only, so an emergency stop from another thread gets in between polls.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use log::{debug, error, info, trace, warn};

use probestation_core::config::{MotionTiming, SpeedTable, StageSerials};
use probestation_core::motion::{
    bounds_check, Axis, AxisPosition, Calibration, Direction, GridTransform, MovementIntent,
    ReferencePoint, SpeedPreset, StagePosition,
};
use probestation_core::scheduler::{DeviceIndex, GridDims};
use probestation_core::state::{AxisEvent, AxisState};
use probestation_core::traits::{BackendError, MotionBackend};
use probestation_drivers::stage::SimulatedStage;

use crate::config::StageConfig;
use crate::error::MoveError;

/// Backend, calibration and per-axis state, guarded by the engine mutex
struct StageInner {
    backend: Box<dyn MotionBackend + Send>,
    calibration: Calibration,
    intent: MovementIntent,
    axes: [AxisState; 3],
    speeds: SpeedTable,
    transform: Option<GridTransform>,
}

impl StageInner {
    fn axis_event(&mut self, axis: Axis, event: AxisEvent) {
        let slot = &mut self.axes[axis.index()];
        let next = slot.transition(event);
        if next != *slot {
            trace!("{} axis {:?} -> {:?}", axis.name(), *slot, next);
        }
        *slot = next;
    }

    fn apply_speed(&mut self, preset: SpeedPreset) -> Result<(), BackendError> {
        for axis in Axis::ALL {
            let speed = self.speeds.speed(preset, axis);
            self.backend.set_axis_speed(axis, speed)?;
        }
        Ok(())
    }

    fn read_position(&mut self) -> Result<StagePosition, BackendError> {
        let mut position = StagePosition::ZERO;
        for axis in Axis::ALL {
            let (coarse, fine) = self.backend.axis_position(axis)?;
            position.set_axis(axis, AxisPosition::new(coarse, fine));
        }
        Ok(position.normalize())
    }
}

/// Stage motion engine
pub struct MotionEngine {
    inner: Mutex<CriticalSectionRawMutex, StageInner>,
    halted: AtomicBool,
    emergency_stops: AtomicU32,
    timing: MotionTiming,
    simulated: bool,
}

impl MotionEngine {
    /// Take over a backend
    ///
    /// The backend must report the configured serial for every axis;
    /// otherwise the engine falls back to a simulated stage.
    pub fn connect(
        mut backend: Box<dyn MotionBackend + Send>,
        stage: &StageConfig,
        timing: MotionTiming,
    ) -> Self {
        let reported = Axis::ALL.map(|axis| backend.axis_serial(axis).ok());
        match stage.serials.identify(reported) {
            Ok(()) => {
                info!(
                    "Stage connected (x {}, y {}, z {})",
                    stage.serials.x, stage.serials.y, stage.serials.z
                );
                Self::build(backend, stage, timing, false)
            }
            Err(e) => {
                warn!(
                    "No controller for {} axis (serial {}), running simulated",
                    e.missing.name(),
                    stage.serials.serial(e.missing)
                );
                Self::simulated(stage, timing)
            }
        }
    }

    /// Engine driving a simulated stage
    pub fn simulated(stage: &StageConfig, timing: MotionTiming) -> Self {
        Self::build(
            Box::new(SimulatedStage::new(stage.serials)),
            stage,
            timing,
            true,
        )
    }

    fn build(
        backend: Box<dyn MotionBackend + Send>,
        stage: &StageConfig,
        timing: MotionTiming,
        simulated: bool,
    ) -> Self {
        let mut inner = StageInner {
            backend,
            calibration: stage.calibration.to_calibration(),
            intent: MovementIntent::new(),
            axes: [AxisState::Idle; 3],
            speeds: stage.speeds,
            transform: None,
        };
        if let Err(e) = inner.apply_speed(SpeedPreset::Normal) {
            warn!("Failed to set initial speed: {:?}", e);
        }

        Self {
            inner: Mutex::new(inner),
            halted: AtomicBool::new(false),
            emergency_stops: AtomicU32::new(0),
            timing,
            simulated,
        }
    }

    /// Check if the engine drives a simulated stage
    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// Emergency stops issued since the engine was created
    pub fn emergency_stop_count(&self) -> u32 {
        self.emergency_stops.load(Ordering::SeqCst)
    }

    /// Check if motion is blocked by an emergency stop
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Allow motion again after an emergency stop
    pub fn rearm(&self) {
        if self.halted.swap(false, Ordering::SeqCst) {
            info!("Motion re-armed");
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timing.poll_interval_ms.max(1) as u64)
    }

    /// Stop all axes and wait until they confirm
    ///
    /// The first call halts the engine; further calls while halted only
    /// wait for the stop to be confirmed. Always completes: axes that do
    /// not confirm within the stop timeout are logged and marked idle.
    pub async fn emergency_stop(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            let count = self.emergency_stops.fetch_add(1, Ordering::SeqCst) + 1;
            warn!("Emergency stop ({} this session)", count);

            let mut inner = self.inner.lock().await;
            for axis in Axis::ALL {
                if let Err(e) = inner.backend.stop_axis(axis) {
                    error!("Stop failed on {} axis: {:?}", axis.name(), e);
                }
                inner.axis_event(axis, AxisEvent::StopRequested);
            }
            inner.intent.clear();
        }

        self.confirm_stopped(&Axis::ALL).await;
    }

    /// Poll until `axes` report zero velocity or the stop timeout expires
    async fn confirm_stopped(&self, axes: &[Axis]) {
        let deadline =
            Instant::now() + Duration::from_millis(self.timing.stop_timeout_ms as u64);
        loop {
            let pending = {
                let mut inner = self.inner.lock().await;
                let mut pending = 0;
                for &axis in axes {
                    match inner.backend.axis_velocity(axis) {
                        Ok(0) => inner.axis_event(axis, AxisEvent::Settled),
                        Ok(_) => pending += 1,
                        Err(e) => {
                            // Unreachable axis cannot confirm; treat it as stopped
                            warn!("Cannot confirm stop on {} axis: {:?}", axis.name(), e);
                            inner.axis_event(axis, AxisEvent::Settled);
                        }
                    }
                }
                pending
            };

            if pending == 0 {
                return;
            }
            if Instant::now() >= deadline {
                error!("{} axes still moving after stop timeout", pending);
                let mut inner = self.inner.lock().await;
                for &axis in axes {
                    inner.axes[axis.index()] = AxisState::Idle;
                }
                return;
            }
            Timer::after(self.poll_interval()).await;
        }
    }

    /// Fail if an abort is pending, issuing the emergency stop for it
    async fn check_abort(&self, abort: &AtomicBool) -> Result<(), MoveError> {
        if abort.load(Ordering::SeqCst) {
            self.emergency_stop().await;
            return Err(MoveError::EmergencyStop);
        }
        if self.is_halted() {
            return Err(MoveError::EmergencyStop);
        }
        Ok(())
    }

    /// Move to `target` in three phases
    ///
    /// Runs at fast speed and restores normal speed afterwards. `abort` is
    /// checked at every poll; when it is set the stage is emergency
    /// stopped and the remaining phases are skipped.
    pub async fn move_to(&self, target: StagePosition, abort: &AtomicBool) -> Result<(), MoveError> {
        let target = target.normalize();
        bounds_check(&target)?;
        self.check_abort(abort).await?;

        let safe_height = {
            let mut inner = self.inner.lock().await;
            inner.intent.set_speed(SpeedPreset::Fast);
            if let Err(e) = inner.apply_speed(SpeedPreset::Fast) {
                inner.intent.set_speed(SpeedPreset::Normal);
                if let Err(restore) = inner.apply_speed(SpeedPreset::Normal) {
                    warn!("Failed to restore normal speed: {:?}", restore);
                }
                return Err(e.into());
            }
            inner.calibration.safe_height()
        };

        if self.simulated {
            info!(
                "Simulated move to x {}/{} y {}/{} z {}/{}",
                target.x.coarse, target.x.fine, target.y.coarse, target.y.fine, target.z.coarse,
                target.z.fine
            );
        }

        let result = self.run_phases(target, safe_height, abort).await;

        {
            let mut inner = self.inner.lock().await;
            inner.intent.set_speed(SpeedPreset::Normal);
            if let Err(e) = inner.apply_speed(SpeedPreset::Normal) {
                warn!("Failed to restore normal speed: {:?}", e);
            }
        }
        result
    }

    async fn run_phases(
        &self,
        target: StagePosition,
        safe_height: AxisPosition,
        abort: &AtomicBool,
    ) -> Result<(), MoveError> {
        self.run_phase(&[(Axis::Z, safe_height)], abort).await?;
        self.run_phase(&[(Axis::X, target.x), (Axis::Y, target.y)], abort).await?;
        self.run_phase(&[(Axis::Z, target.z)], abort).await
    }

    /// Issue the moves of one phase and wait for them to settle
    async fn run_phase(&self, moves: &[(Axis, AxisPosition)], abort: &AtomicBool) -> Result<(), MoveError> {
        self.check_abort(abort).await?;
        let mut commanded = Vec::with_capacity(moves.len());
        let issued = {
            let mut inner = self.inner.lock().await;
            let mut issued = Ok(());
            for &(axis, position) in moves {
                debug!("{} axis to {}/{}", axis.name(), position.coarse, position.fine);
                if let Err(e) = inner.backend.move_axis(axis, position.coarse, position.fine) {
                    error!("Move command failed on {} axis: {:?}", axis.name(), e);
                    issued = Err(MoveError::from(e));
                    break;
                }
                inner.axis_event(axis, AxisEvent::Commanded);
                commanded.push(axis);
            }
            issued
        };

        let result = match issued {
            Ok(()) => self.wait_settled(moves, abort).await,
            Err(e) => Err(e),
        };
        if result.is_err() && !self.is_halted() {
            // Backend failure mid-phase: leave no axis running
            self.stop_axes(&commanded).await;
        }
        result
    }

    /// Stop `axes` and wait for them to confirm
    async fn stop_axes(&self, axes: &[Axis]) {
        if axes.is_empty() {
            return;
        }
        {
            let mut inner = self.inner.lock().await;
            for &axis in axes {
                if let Err(e) = inner.backend.stop_axis(axis) {
                    error!("Stop failed on {} axis: {:?}", axis.name(), e);
                }
                inner.axis_event(axis, AxisEvent::StopRequested);
            }
        }
        self.confirm_stopped(axes).await;
    }

    async fn wait_settled(&self, moves: &[(Axis, AxisPosition)], abort: &AtomicBool) -> Result<(), MoveError> {
        let poll = self.poll_interval();

        // Settle delay, sliced so an abort is seen within one poll
        let mut remaining = Duration::from_millis(self.timing.settle_ms as u64);
        while remaining > Duration::from_ticks(0) {
            self.check_abort(abort).await?;
            let slice = if remaining < poll { remaining } else { poll };
            Timer::after(slice).await;
            remaining -= slice;
        }

        loop {
            self.check_abort(abort).await?;
            let moving = {
                let mut inner = self.inner.lock().await;
                let mut moving = false;
                for &(axis, _) in moves {
                    if inner.backend.axis_velocity(axis)? != 0 {
                        moving = true;
                    } else {
                        inner.axis_event(axis, AxisEvent::Settled);
                    }
                }
                moving
            };
            if !moving {
                return Ok(());
            }
            Timer::after(poll).await;
        }
    }

    /// Move to a stored calibration point
    pub async fn goto_point(&self, point: ReferencePoint, abort: &AtomicBool) -> Result<(), MoveError> {
        let target = self.inner.lock().await.calibration.get(point);
        info!("Going to {}", point.name());
        self.move_to(target, abort).await
    }

    /// Store the current stage position as a calibration point
    pub async fn capture_reference(&self, point: ReferencePoint) -> Result<StagePosition, MoveError> {
        let mut inner = self.inner.lock().await;
        let position = inner.read_position()?;
        inner.calibration.set(point, position);
        if !matches!(point, ReferencePoint::Center | ReferencePoint::Load) {
            // Grid corners moved; the deltas must be recomputed
            inner.transform = None;
        }
        info!(
            "Captured {} at {}/{} {}/{} {}/{}",
            point.name(),
            position.x.coarse,
            position.x.fine,
            position.y.coarse,
            position.y.fine,
            position.z.coarse,
            position.z.fine
        );
        Ok(position)
    }

    /// Derive per-device deltas from the calibration corners
    pub async fn compute_axis_delta(&self, dims: &GridDims) -> GridTransform {
        let mut inner = self.inner.lock().await;
        let transform = GridTransform::new(&inner.calibration, dims);
        debug!("Grid transform {:?}", transform);
        inner.transform = Some(transform);
        transform
    }

    /// Stage coordinates of a device
    pub async fn compute_target_coordinates(&self, index: DeviceIndex) -> Result<StagePosition, MoveError> {
        let inner = self.inner.lock().await;
        let transform = inner.transform.ok_or(MoveError::NoGridTransform)?;
        Ok(transform.target(index)?)
    }

    /// Select a speed preset; returns whether it changed
    pub async fn set_speed(&self, preset: SpeedPreset) -> Result<bool, MoveError> {
        let mut inner = self.inner.lock().await;
        if !inner.intent.set_speed(preset) {
            return Ok(false);
        }
        inner.apply_speed(preset)?;
        info!("Speed set to {:?}", preset);
        Ok(true)
    }

    /// Start continuous motion in `direction`
    pub async fn begin_jog(&self, direction: Direction) -> Result<(), MoveError> {
        if self.is_halted() {
            return Err(MoveError::EmergencyStop);
        }
        let axis = direction.axis();
        let mut inner = self.inner.lock().await;
        if inner.intent.active(axis) == Some(direction) {
            return Ok(());
        }
        inner.intent.begin(direction)?;
        if let Err(e) = inner.backend.jog_axis(axis, direction.sign()) {
            inner.intent.end(direction);
            return Err(e.into());
        }
        inner.axis_event(axis, AxisEvent::Commanded);
        debug!("Jog {:?}", direction);
        Ok(())
    }

    /// Stop a jog started with [`MotionEngine::begin_jog`]
    pub async fn end_jog(&self, direction: Direction) -> Result<(), MoveError> {
        let axis = direction.axis();
        {
            let mut inner = self.inner.lock().await;
            if !inner.intent.end(direction) {
                return Ok(());
            }
            inner.backend.stop_axis(axis)?;
            inner.axis_event(axis, AxisEvent::StopRequested);
        }
        self.confirm_stopped(&[axis]).await;
        Ok(())
    }

    /// Current stage position
    pub async fn position(&self) -> Result<StagePosition, MoveError> {
        Ok(self.inner.lock().await.read_position()?)
    }

    pub async fn calibration(&self) -> Calibration {
        self.inner.lock().await.calibration
    }

    pub async fn axis_state(&self, axis: Axis) -> AxisState {
        self.inner.lock().await.axes[axis.index()]
    }

    pub async fn speed(&self) -> SpeedPreset {
        self.inner.lock().await.intent.speed()
    }
}
