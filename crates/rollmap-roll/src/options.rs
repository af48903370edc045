//! Configuration shared by the single-process and multi-process rolling
//! coordinators: capacity, zero-fill, framing, yield policy, async close,
//! and preallocation. Generalizes the teacher's `ComediStreamWriterBuilder`
//! fluent-builder idiom (`daq-storage/src/comedi_writer.rs`) in place of a
//! config-file loader — there is no long-lived process here to read one.

use std::time::Duration;

use crate::policy::YieldPolicy;

/// Plain-data configuration for a rolling coordinator. Construct via
/// [`RollingFileOptionsBuilder`].
#[derive(Debug, Clone)]
pub struct RollingFileOptions {
    pub(crate) capacity: u64,
    pub(crate) fill_zero: bool,
    pub(crate) framed: bool,
    pub(crate) yield_policy: YieldPolicy,
    pub(crate) async_close: bool,
    pub(crate) preallocate: bool,
    pub(crate) preallocate_check_interval: Duration,
}

impl RollingFileOptions {
    /// Start building options with sensible defaults (no framing, spin
    /// yield policy, synchronous close, no preallocation).
    pub fn builder(capacity: u64) -> RollingFileOptionsBuilder {
        RollingFileOptionsBuilder::new(capacity)
    }

    /// Usable capacity of each rolled file.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Whether writes are length-prefixed (component H).
    pub fn framed(&self) -> bool {
        self.framed
    }
}

/// Fluent builder for [`RollingFileOptions`].
pub struct RollingFileOptionsBuilder {
    capacity: u64,
    fill_zero: bool,
    framed: bool,
    yield_policy: YieldPolicy,
    async_close: bool,
    preallocate: bool,
    preallocate_check_interval: Duration,
}

impl RollingFileOptionsBuilder {
    fn new(capacity: u64) -> Self {
        Self {
            capacity,
            fill_zero: false,
            framed: false,
            yield_policy: YieldPolicy::Spin,
            async_close: false,
            preallocate: false,
            preallocate_check_interval: Duration::from_millis(50),
        }
    }

    /// Zero-fill newly created files (only meaningful for the
    /// single-process variant; the multi-process header init always
    /// zero-initializes its own 32 bytes via CAS).
    pub fn fill_zero(mut self, fill_zero: bool) -> Self {
        self.fill_zero = fill_zero;
        self
    }

    /// Enable the length-prefix framing wrapper.
    pub fn framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    /// How threads back off under contention.
    pub fn yield_policy(mut self, policy: YieldPolicy) -> Self {
        self.yield_policy = policy;
        self
    }

    /// Close a retired file on a background task instead of inline.
    pub fn async_close(mut self, async_close: bool) -> Self {
        self.async_close = async_close;
        self
    }

    /// Keep a hot-swappable successor file mapped ahead of time.
    pub fn preallocate(mut self, preallocate: bool) -> Self {
        self.preallocate = preallocate;
        self
    }

    /// How often the preallocator checks whether it needs to map a new
    /// successor (only polled while no successor is currently held).
    pub fn preallocate_check_interval(mut self, interval: Duration) -> Self {
        self.preallocate_check_interval = interval;
        self
    }

    /// Finalize the options.
    pub fn build(self) -> RollingFileOptions {
        RollingFileOptions {
            capacity: self.capacity,
            fill_zero: self.fill_zero,
            framed: self.framed,
            yield_policy: self.yield_policy,
            async_close: self.async_close,
            preallocate: self.preallocate,
            preallocate_check_interval: self.preallocate_check_interval,
        }
    }
}
