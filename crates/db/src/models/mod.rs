mod job;
mod task;
mod workflow;

pub(crate) use job::JOB_COLUMNS;
pub use job::JobRow;
pub use task::TaskRow;
pub use workflow::WorkflowRow;

use chrono::{DateTime, TimeZone, Utc};

pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

pub(crate) fn datetime_to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
