use std::fmt;

/// Opaque handle for one worker, issued by the pool at spawn time and stable
/// until that worker retires. Deliberately not an OS thread id: routing is
/// keyed on pool-issued handles so the design is independent of the
/// underlying thread runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub(crate) u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Point-in-time snapshot of pool state, taken under the pool lock.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub workers: usize,
    pub queued_global: usize,
    pub queued_private: usize,
    pub free_affinities: usize,
    pub pending_retirements: usize,
}

impl PoolStatus {
    pub fn queued(&self) -> usize {
        self.queued_global + self.queued_private
    }

    pub fn is_drained(&self) -> bool {
        self.queued() == 0
    }
}
