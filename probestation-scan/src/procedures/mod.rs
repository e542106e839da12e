//! Measurement procedures
//!
//! A procedure runs on its own short-lived thread and reports its result
//! through a `Signal`. The coordinator joins it with a timeout; on timeout
//! the procedure is cancelled and given a grace period to wind down.

pub mod screening;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use log::{debug, warn};
use thiserror::Error;

use crate::error::ScanError;

pub use full_test::{FullTest, FullTestOutcome};
pub use screening::{Screening, ScreeningOutcome};

/// How long a timed-out procedure gets to honor its cancellation
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Longest uninterrupted sleep between measurement points
const DELAY_SLICE: std::time::Duration = std::time::Duration::from_millis(10);

/// Cooperative cancellation flag shared with a procedure
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a sweep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepStop {
    /// All points measured
    #[default]
    Completed,
    /// Current exceeded the bias current limit
    OverLimit,
    /// Cancel token fired
    Cancelled,
    /// An instrument call failed
    InstrumentFault,
}

/// A procedure joined past its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{name} did not finish within {timeout_ms} ms")]
pub struct ProcedureTimeout {
    pub name: &'static str,
    pub timeout_ms: u64,
    /// The procedure stopped within the cancel grace period
    pub stopped: bool,
}

/// A measurement that runs to completion on its own thread
pub trait Procedure: Send + 'static {
    type Output: Send + 'static;

    /// Thread and log name
    fn name(&self) -> &'static str;

    /// Run the measurement, checking `cancel` between points
    fn run(self, cancel: &CancelToken) -> Self::Output;
}

/// Handle to a running procedure
pub struct ProcedureHandle<T> {
    name: &'static str,
    done: Arc<Signal<CriticalSectionRawMutex, T>>,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

/// Start a procedure on a new thread
pub fn spawn<P: Procedure>(procedure: P) -> Result<ProcedureHandle<P::Output>, ScanError> {
    let name = procedure.name();
    let done = Arc::new(Signal::new());
    let cancel = CancelToken::new();

    let thread = {
        let done = Arc::clone(&done);
        let cancel = cancel.clone();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!("{} started", name);
                let output = procedure.run(&cancel);
                done.signal(output);
            })
            .map_err(|source| ScanError::Spawn { name, source })?
    };

    Ok(ProcedureHandle {
        name,
        done,
        cancel,
        thread: Some(thread),
    })
}

impl<T: Send> ProcedureHandle<T> {
    /// Token that cancels this procedure
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the result, cancelling the procedure on timeout
    pub async fn join(mut self, timeout: Duration) -> Result<T, ProcedureTimeout> {
        match with_timeout(timeout, self.done.wait()).await {
            Ok(output) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!("{} thread panicked after reporting", self.name);
                    }
                }
                Ok(output)
            }
            Err(_) => {
                warn!("{} timed out, cancelling", self.name);
                self.cancel.cancel();
                let stopped = with_timeout(CANCEL_GRACE, self.done.wait()).await.is_ok();
                if stopped {
                    if let Some(thread) = self.thread.take() {
                        let _ = thread.join();
                    }
                } else {
                    warn!("{} still running after cancel", self.name);
                }
                Err(ProcedureTimeout {
                    name: self.name,
                    timeout_ms: timeout.as_millis(),
                    stopped,
                })
            }
        }
    }
}

/// Sleep between measurement points, waking early on cancel
pub(crate) fn point_delay(delay_ms: u32, cancel: &CancelToken) {
    let mut remaining = std::time::Duration::from_millis(delay_ms as u64);
    while !remaining.is_zero() && !cancel.is_cancelled() {
        let slice = remaining.min(DELAY_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}
