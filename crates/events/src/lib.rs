//! In-process lifecycle events for workflows and queue jobs.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
