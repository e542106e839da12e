//! Scan worker tasks
//!
//! Each worker is an `async fn` driven on its own thread by the scanner.

pub mod coordinator;
pub mod producer;

pub use coordinator::ScanCoordinator;
pub use producer::{scan_root_name, ProducerOutcome, ProducerStatus, TaskProducer};
