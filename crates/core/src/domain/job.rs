use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::workflow::WorkflowId;

pub const PROCESS_WORKFLOW_JOB: &str = "process-workflow";
pub const DEFAULT_JOB_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_DELAY_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Exponential,
    Fixed,
}

impl BackoffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exponential => "exponential",
            Self::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exponential" => Some(Self::Exponential),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// Delay policy applied between failed attempts of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backoff {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    #[serde(rename = "delay")]
    pub delay_ms: u64,
}

impl Backoff {
    pub fn exponential(delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay_ms,
        }
    }

    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            delay_ms,
        }
    }

    /// Delay before the next attempt, given how many attempts have already run.
    ///
    /// Exponential backoff waits `delay * 2^(attempts_made - 1)`.
    pub fn delay_after(&self, attempts_made: u32) -> Duration {
        let ms = match self.kind {
            BackoffKind::Fixed => self.delay_ms,
            BackoffKind::Exponential => {
                let exponent = attempts_made.saturating_sub(1).min(32);
                self.delay_ms.saturating_mul(1u64 << exponent)
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_BACKOFF_DELAY_MS)
    }
}

/// Options persisted with every job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: Backoff,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_JOB_ATTEMPTS,
            backoff: Backoff::default(),
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }
}

impl JobOptions {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowJobData {
    pub workflow_id: WorkflowId,
}

/// A durable queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub options: JobOptions,
    pub attempts_made: u32,
    pub progress: u8,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn attempts_remaining(&self) -> u32 {
        self.options.attempts.saturating_sub(self.attempts_made)
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub options: JobOptions,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Result of one stall sweep over active jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalledJobs {
    /// Returned to `waiting` for another attempt.
    pub requeued: Vec<String>,
    /// Out of attempts, moved to `failed` (or removed with `remove_on_fail`).
    pub failed: Vec<ExhaustedJob>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustedJob {
    pub id: String,
    pub attempts_made: u32,
}

impl StalledJobs {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}
