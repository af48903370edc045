//! Shared spin/yield policy for every suspension point in this crate: the
//! `allocating` CAS, the coordination-file lock word, and waiting for
//! `is_pending() == false` in the close-file subroutine.

/// How a thread should behave while waiting out contention. Every
/// suspension point in this crate is bounded by contention, not I/O, so
/// there is never a timeout or cancellation — only the choice between
/// spinning tightly or yielding the scheduler slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldPolicy {
    /// Busy-spin using a CPU pause hint. Lowest latency under light
    /// contention, wasteful under heavy contention.
    #[default]
    Spin,
    /// Yield the OS thread's remaining timeslice between attempts.
    Yield,
}

impl YieldPolicy {
    /// Back off once according to this policy.
    pub fn relax(self) {
        match self {
            YieldPolicy::Spin => std::hint::spin_loop(),
            YieldPolicy::Yield => std::thread::yield_now(),
        }
    }
}
