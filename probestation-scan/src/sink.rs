//! Full test submission
//!
//! The coordinator hands a device that passed screening to a `TaskSink`
//! together with its measurement ticket. The sink owns the ticket from
//! then on and must finish it (by completing or dropping it) when the
//! full test ends.

use std::thread;

use log::debug;

use crate::descriptor::DeviceTaskDescriptor;
use crate::error::ScanError;
use crate::procedures::{CancelToken, FullTest, Procedure};
use crate::rack::Instruments;
use crate::shared::MeasurementTicket;

/// One full test to run
pub struct FullTestJob {
    pub descriptor: DeviceTaskDescriptor,
    pub instruments: Instruments,
    pub ticket: MeasurementTicket,
}

/// Accepts full test jobs
pub trait TaskSink: Send {
    /// Start the job; returns once it has been accepted, not once it is done
    fn submit(&mut self, job: FullTestJob) -> Result<(), ScanError>;
}

/// Runs every full test on a fresh thread
#[derive(Debug, Default)]
pub struct ThreadedSink {
    submitted: u32,
}

impl ThreadedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs accepted so far
    pub fn submitted(&self) -> u32 {
        self.submitted
    }
}

impl TaskSink for ThreadedSink {
    fn submit(&mut self, job: FullTestJob) -> Result<(), ScanError> {
        let FullTestJob {
            descriptor,
            instruments,
            ticket,
        } = job;

        let cancel = CancelToken::new();
        ticket.register_cancel(cancel.clone());
        let procedure = FullTest::new(instruments, *descriptor.sweep());
        let name = procedure.name();

        thread::Builder::new()
            .name(format!("{}-{}", name, descriptor.name()))
            .spawn(move || {
                debug!("Full test of {} started", descriptor.name());
                let outcome = procedure.run(&cancel);
                ticket.complete_full_test(outcome);
            })
            .map_err(|source| ScanError::Spawn { name, source })?;

        self.submitted += 1;
        Ok(())
    }
}
