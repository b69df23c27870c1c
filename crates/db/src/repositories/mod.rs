mod job_repository;
mod task_repository;
mod workflow_repository;

pub use job_repository::*;
pub use task_repository::*;
pub use workflow_repository::*;
