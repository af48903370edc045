//! Shared helpers used by both rolling coordinators.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with the path of a file that has just been closed and
/// fully settled (component E/G "file-complete callback").
pub type FileCompleteCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Process-wide monotonic counter used to name preallocator tasks in
/// tracing spans, in place of the teacher's thread-naming counter.
static PREALLOCATOR_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate the next preallocator task id.
pub fn next_preallocator_id() -> u64 {
    PREALLOCATOR_ID.fetch_add(1, Ordering::Relaxed)
}
