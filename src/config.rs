use core::num::NonZeroUsize;

/// Configuration entry-point for instantiating an [`Engine`](crate::engine::Engine).
///
/// Describes the dedicated worker pool that becomes the engine's default
/// executor. Unset fields fall back to rayon's own defaults.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of worker threads. Defaults to the number of logical CPUs.
    pub worker_threads: Option<NonZeroUsize>,
    /// Prefix of worker thread names; the worker index is appended.
    pub thread_name_prefix: String,
    /// Stack size of each worker thread, in bytes.
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name_prefix: "ccf-worker-".to_owned(),
            stack_size: None,
        }
    }
}

impl Config {
    /// Sets the number of worker threads.
    pub fn with_worker_threads(mut self, worker_threads: NonZeroUsize) -> Self {
        self.worker_threads = Some(worker_threads);
        self
    }

    /// Sets the worker thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the worker thread stack size.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }
}
