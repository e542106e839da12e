//! Shared scan state
//!
//! One `SharedScanState` is owned by the scanner and shared (via `Arc`)
//! with the producer, the coordinator, the abort coordinator and the
//! measurement threads. It holds the bounded descriptor queue and the
//! scan flags. Flags are one-way within a scan and reset at the next scan
//! start.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use log::{debug, trace};
use parking_lot::Mutex;

use crate::descriptor::DeviceTaskDescriptor;
use crate::procedures::{CancelToken, FullTestOutcome};

/// Capacity of the descriptor queue
pub const QUEUE_CAPACITY: usize = 10;

/// Bounded descriptor queue between producer and coordinator
pub type TaskQueue = Channel<CriticalSectionRawMutex, DeviceTaskDescriptor, QUEUE_CAPACITY>;

const FLAG_COUNT: usize = 5;

/// Scan flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Abort requested; set once, never cleared within a scan
    AbortRequested,
    /// Producer finished (complete, incomplete or failed)
    ProducerDone,
    /// Coordinator finished
    ConsumerDone,
    /// Screening of the current device passed
    DeviceScreeningPassed,
    /// A screening or full test is running
    MeasurementInFlight,
}

impl Flag {
    pub const ALL: [Flag; FLAG_COUNT] = [
        Flag::AbortRequested,
        Flag::ProducerDone,
        Flag::ConsumerDone,
        Flag::DeviceScreeningPassed,
        Flag::MeasurementInFlight,
    ];

    const fn index(self) -> usize {
        match self {
            Flag::AbortRequested => 0,
            Flag::ProducerDone => 1,
            Flag::ConsumerDone => 2,
            Flag::DeviceScreeningPassed => 3,
            Flag::MeasurementInFlight => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Flag::AbortRequested => "abortRequested",
            Flag::ProducerDone => "producerDone",
            Flag::ConsumerDone => "consumerDone",
            Flag::DeviceScreeningPassed => "deviceScreeningPassed",
            Flag::MeasurementInFlight => "measurementInFlight",
        }
    }
}

/// Queue, flags and measurement bookkeeping of one scan
pub struct SharedScanState {
    queue: TaskQueue,
    flags: [AtomicBool; FLAG_COUNT],
    changed: [Signal<CriticalSectionRawMutex, ()>; FLAG_COUNT],
    generation: AtomicU64,
    active_cancel: Mutex<Option<CancelToken>>,
    full_test_result: Signal<CriticalSectionRawMutex, (u64, FullTestOutcome)>,
    poll: Duration,
}

impl SharedScanState {
    /// Create idle state (no scan running)
    ///
    /// `poll_ms` bounds how long a flag waiter sleeps before re-checking.
    pub fn new(poll_ms: u32) -> Self {
        let state = Self {
            queue: Channel::new(),
            flags: core::array::from_fn(|_| AtomicBool::new(false)),
            changed: core::array::from_fn(|_| Signal::new()),
            generation: AtomicU64::new(0),
            active_cancel: Mutex::new(None),
            full_test_result: Signal::new(),
            poll: Duration::from_millis(poll_ms.max(1) as u64),
        };
        state.set(Flag::ProducerDone, true);
        state.set(Flag::ConsumerDone, true);
        state
    }

    /// Descriptor queue
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Flag wait poll interval
    pub fn poll_interval(&self) -> Duration {
        self.poll
    }

    pub fn get(&self, flag: Flag) -> bool {
        self.flags[flag.index()].load(Ordering::SeqCst)
    }

    pub fn set(&self, flag: Flag, value: bool) {
        self.flags[flag.index()].store(value, Ordering::SeqCst);
        self.changed[flag.index()].signal(());
    }

    /// Set a flag and return its previous value
    pub fn swap(&self, flag: Flag, value: bool) -> bool {
        let previous = self.flags[flag.index()].swap(value, Ordering::SeqCst);
        self.changed[flag.index()].signal(());
        previous
    }

    /// Raw flag, for loops that poll it directly
    pub fn flag(&self, flag: Flag) -> &AtomicBool {
        &self.flags[flag.index()]
    }

    pub fn abort_requested(&self) -> bool {
        self.get(Flag::AbortRequested)
    }

    /// Neither producer nor coordinator is running
    pub fn is_idle(&self) -> bool {
        self.get(Flag::ProducerDone) && self.get(Flag::ConsumerDone)
    }

    /// Wait until a flag holds `value`
    ///
    /// Re-checks at least every poll interval, so any number of waiters
    /// may wait on the same flag.
    pub async fn wait_until(&self, flag: Flag, value: bool) {
        loop {
            if self.get(flag) == value {
                return;
            }
            let _ = with_timeout(self.poll, self.changed[flag.index()].wait()).await;
        }
    }

    /// Set `flag` when the returned guard drops
    pub fn done_on_drop(self: &Arc<Self>, flag: Flag) -> FlagGuard {
        FlagGuard {
            shared: Arc::clone(self),
            flag,
        }
    }

    /// Clear every flag and pending descriptor for a new scan
    pub fn reset(&self) {
        let drained = self.drain_queue();
        if drained > 0 {
            debug!("Discarded {} stale descriptors", drained);
        }
        for flag in Flag::ALL {
            self.flags[flag.index()].store(false, Ordering::SeqCst);
            self.changed[flag.index()].reset();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.active_cancel.lock() = None;
        self.full_test_result.reset();
    }

    /// Remove all queued descriptors, returning how many were dropped
    pub fn drain_queue(&self) -> usize {
        let mut drained = 0;
        while self.queue.try_receive().is_ok() {
            drained += 1;
        }
        drained
    }

    /// Mark a measurement as in flight
    ///
    /// Returns `None` while another measurement is still in flight.
    pub fn begin_measurement(self: &Arc<Self>) -> Option<MeasurementTicket> {
        let flag = &self.flags[Flag::MeasurementInFlight.index()];
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        self.changed[Flag::MeasurementInFlight.index()].signal(());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Measurement {} in flight", generation);
        Some(MeasurementTicket {
            shared: Arc::clone(self),
            generation,
            finished: false,
        })
    }

    // Generation checks and bumps happen under the `active_cancel` lock, so a
    // measurement cannot be abandoned between its check and its write.

    fn finish_measurement(&self, generation: u64) {
        {
            let mut active = self.active_cancel.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                trace!("Ignoring stale completion of measurement {}", generation);
                return;
            }
            *active = None;
        }
        self.set(Flag::MeasurementInFlight, false);
    }

    /// Forget the in-flight measurement and unblock its waiters
    ///
    /// A late completion of the abandoned measurement is ignored.
    pub fn abandon_measurement(&self) {
        {
            let mut active = self.active_cancel.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *active = None;
        }
        self.set(Flag::MeasurementInFlight, false);
    }

    /// Publish the screening verdict of measurement `generation`
    ///
    /// Returns `false`, leaving `deviceScreeningPassed` alone, when that
    /// measurement has been abandoned.
    pub fn record_screening(&self, generation: u64, passed: bool) -> bool {
        let _active = self.active_cancel.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!("Ignoring stale screening verdict of measurement {}", generation);
            return false;
        }
        self.set(Flag::DeviceScreeningPassed, passed);
        true
    }

    /// Cancel the in-flight measurement, if it registered a token
    pub fn cancel_active_measurement(&self) -> bool {
        match self.active_cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Take the full test result of measurement `generation`
    pub fn take_full_test(&self, generation: u64) -> Option<FullTestOutcome> {
        match self.full_test_result.try_take() {
            Some((g, outcome)) if g == generation => Some(outcome),
            Some((g, _)) => {
                trace!("Dropping stale full test result {}", g);
                None
            }
            None => None,
        }
    }
}

/// Sets a flag when dropped, on every exit path of a worker
pub struct FlagGuard {
    shared: Arc<SharedScanState>,
    flag: Flag,
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        debug!("Setting {}", self.flag.name());
        self.shared.set(self.flag, true);
    }
}

/// Proof that a measurement is in flight
///
/// Finishing (or dropping) the ticket clears `measurementInFlight` unless
/// the measurement was abandoned in the meantime.
pub struct MeasurementTicket {
    shared: Arc<SharedScanState>,
    generation: u64,
    finished: bool,
}

impl MeasurementTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Make the measurement cancellable by abort
    pub fn register_cancel(&self, token: CancelToken) {
        if self.shared.generation.load(Ordering::SeqCst) == self.generation {
            *self.shared.active_cancel.lock() = Some(token);
        }
    }

    /// Publish a full test result, then finish
    pub fn complete_full_test(self, outcome: FullTestOutcome) {
        self.shared.full_test_result.signal((self.generation, outcome));
        self.finish();
    }

    /// Mark the measurement finished
    pub fn finish(mut self) {
        self.finished = true;
        self.shared.finish_measurement(self.generation);
    }
}

impl Drop for MeasurementTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.finish_measurement(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_starts_idle() {
        let shared = SharedScanState::new(10);
        assert!(shared.is_idle());
        assert!(!shared.abort_requested());
    }

    #[test]
    fn test_reset_clears_flags() {
        let shared = SharedScanState::new(10);
        shared.set(Flag::AbortRequested, true);
        shared.reset();
        for flag in Flag::ALL {
            assert!(!shared.get(flag), "{} still set", flag.name());
        }
    }

    #[test]
    fn test_flag_guard_sets_on_drop() {
        let shared = Arc::new(SharedScanState::new(10));
        shared.reset();
        {
            let _guard = shared.done_on_drop(Flag::ProducerDone);
            assert!(!shared.get(Flag::ProducerDone));
        }
        assert!(shared.get(Flag::ProducerDone));
    }

    #[test]
    fn test_single_measurement_in_flight() {
        let shared = Arc::new(SharedScanState::new(10));
        let ticket = shared.begin_measurement().unwrap();
        assert!(shared.get(Flag::MeasurementInFlight));
        assert!(shared.begin_measurement().is_none());

        ticket.finish();
        assert!(!shared.get(Flag::MeasurementInFlight));
        assert!(shared.begin_measurement().is_some());
    }

    #[test]
    fn test_dropped_ticket_finishes() {
        let shared = Arc::new(SharedScanState::new(10));
        drop(shared.begin_measurement().unwrap());
        assert!(!shared.get(Flag::MeasurementInFlight));
    }

    #[test]
    fn test_stale_completion_ignored() {
        let shared = Arc::new(SharedScanState::new(10));
        let stale = shared.begin_measurement().unwrap();
        shared.abandon_measurement();

        let current = shared.begin_measurement().unwrap();
        stale.finish();
        // The abandoned ticket must not clear the new measurement
        assert!(shared.get(Flag::MeasurementInFlight));
        current.finish();
        assert!(!shared.get(Flag::MeasurementInFlight));
    }

    #[test]
    fn test_stale_screening_verdict_ignored() {
        let shared = Arc::new(SharedScanState::new(10));
        let stale = shared.begin_measurement().unwrap();
        let stale_generation = stale.generation();
        shared.abandon_measurement();
        drop(stale);

        let current = shared.begin_measurement().unwrap();
        assert!(!shared.record_screening(stale_generation, true));
        assert!(!shared.get(Flag::DeviceScreeningPassed));

        assert!(shared.record_screening(current.generation(), true));
        assert!(shared.get(Flag::DeviceScreeningPassed));
    }

    #[test]
    fn test_cancel_registered_token() {
        let shared = Arc::new(SharedScanState::new(10));
        assert!(!shared.cancel_active_measurement());

        let ticket = shared.begin_measurement().unwrap();
        let token = CancelToken::new();
        ticket.register_cancel(token.clone());
        assert!(shared.cancel_active_measurement());
        assert!(token.is_cancelled());

        ticket.finish();
        assert!(!shared.cancel_active_measurement());
    }

    #[test]
    fn test_full_test_result_generation() {
        let shared = Arc::new(SharedScanState::new(10));
        let ticket = shared.begin_measurement().unwrap();
        let generation = ticket.generation();
        ticket.complete_full_test(FullTestOutcome::default());

        assert!(shared.take_full_test(generation + 1).is_none());

        let ticket = shared.begin_measurement().unwrap();
        let generation = ticket.generation();
        ticket.complete_full_test(FullTestOutcome::default());
        assert!(shared.take_full_test(generation).is_some());
    }

    #[test]
    fn test_wait_until_observes_other_thread() {
        let shared = Arc::new(SharedScanState::new(5));
        shared.reset();

        let setter = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            setter.set(Flag::ProducerDone, true);
        });

        block_on(shared.wait_until(Flag::ProducerDone, true));
        assert!(shared.get(Flag::ProducerDone));
        handle.join().unwrap();
    }

    #[test]
    fn test_drain_queue() {
        let shared = SharedScanState::new(10);
        assert_eq!(shared.drain_queue(), 0);
        assert!(shared.queue().is_empty());
    }
}
