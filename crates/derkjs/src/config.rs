//! Resource and semantics configuration for one run.

/// Bounds and switches for a VM instance.
///
/// Builder-style setters compose:
///
/// ```
/// use derkjs::RunConfig;
///
/// let config = RunConfig::new().gc_threshold(64).call_depth_limit(512);
/// assert_ne!(config, RunConfig::default());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Live-object count that arms a collection before the next allocation.
    pub(crate) gc_threshold: usize,
    /// Hard cap on live objects; allocation past it is `bad_heap_alloc`.
    pub(crate) max_heap_objects: usize,
    /// Operand-stack slots; overflow is fatal.
    pub(crate) stack_size: usize,
    /// Maximum frame depth; tail calls do not consume it.
    pub(crate) call_depth_limit: usize,
    /// When set, writes rejected by a non-writable property throw a
    /// `TypeError` value instead of failing silently.
    pub(crate) strict_frozen_writes: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            gc_threshold: 1024,
            max_heap_objects: 65_536,
            stack_size: 4096,
            call_depth_limit: 256,
            strict_frozen_writes: false,
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn gc_threshold(mut self, objects: usize) -> Self {
        self.gc_threshold = objects;
        self
    }

    #[must_use]
    pub fn max_heap_objects(mut self, objects: usize) -> Self {
        self.max_heap_objects = objects;
        self
    }

    #[must_use]
    pub fn stack_size(mut self, slots: usize) -> Self {
        self.stack_size = slots;
        self
    }

    #[must_use]
    pub fn call_depth_limit(mut self, frames: usize) -> Self {
        self.call_depth_limit = frames;
        self
    }

    #[must_use]
    pub fn strict_frozen_writes(mut self, strict: bool) -> Self {
        self.strict_frozen_writes = strict;
        self
    }
}
