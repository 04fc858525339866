use std::fmt;

/// Errors surfaced by the pool API and by task handles.
#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub enum PoolError {
    /// Submission attempted after shutdown has begun.
    Closed,
    /// Submission named a worker-id that is not currently live.
    InvalidAffinity,
    /// `allocate_affinity` found no free worker-id and was not allowed to spawn one.
    AffinitiesExhausted,
    /// The task panicked; the payload message is preserved.
    Panicked(String),
    /// The task was discarded before running (broken promise, e.g. after `abort`).
    Lost,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Closed => write!(f, "task submitted to an already closed pool"),
            PoolError::InvalidAffinity => write!(f, "invalid affinity passed to submit_to"),
            PoolError::AffinitiesExhausted => write!(f, "free affinities in the pool exhausted"),
            PoolError::Panicked(msg) => write!(f, "task panicked: {}", msg),
            PoolError::Lost => write!(f, "task discarded before it could run"),
        }
    }
}

impl std::error::Error for PoolError {}
