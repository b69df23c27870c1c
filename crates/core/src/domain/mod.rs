mod job;
mod plan;
mod task;
mod workflow;

pub use job::*;
pub use plan::*;
pub use task::*;
pub use workflow::*;
