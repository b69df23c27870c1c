use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Database(#[from] db::DbError),

    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(db::DbError::from(err))
    }
}

impl QueueError {
    /// The attempt was reclaimed or settled elsewhere while it ran.
    pub fn is_claim_lost(&self) -> bool {
        matches!(self, Self::Database(db::DbError::ClaimLost { .. }))
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
