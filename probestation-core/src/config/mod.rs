//! Configuration types
//!
//! Stage-agnostic configuration structures, deserialized by the host when
//! the `serde` feature is enabled.

pub mod hardware;
pub mod types;

pub use hardware::*;
pub use types::*;
