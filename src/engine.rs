use crate::{
    config::Config,
    error::{EngineSetupError, Failure},
    executor::ExecutorHandle,
    future::CompletableFuture,
};
use derive_more::Debug;
use std::sync::Arc;
use tracing::debug;

/// Entry point holding the default executor.
///
/// Every future created through an engine inherits its executor as the
/// default for `*_async` combinators, so calling a default-executor method is
/// the same as calling its `*_async_on` counterpart with
/// [`executor`](Self::executor).
#[must_use]
#[derive(Debug, Clone)]
pub struct Engine {
    #[debug(skip)]
    executor: ExecutorHandle,
}

impl Engine {
    /// Builds an engine backed by a dedicated rayon pool described by
    /// `config`.
    ///
    /// # Errors
    /// If the pool cannot be built (e.g. a worker thread fails to spawn).
    pub fn setup(config: &Config) -> Result<Self, EngineSetupError> {
        let prefix = config.thread_name_prefix.clone();
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(move |index| format!("{prefix}{index}"));
        if let Some(worker_threads) = config.worker_threads {
            builder = builder.num_threads(worker_threads.get());
        }
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let pool = builder.build()?;
        debug!(
            worker_threads = pool.current_num_threads(),
            prefix = %config.thread_name_prefix,
            "engine worker pool started"
        );
        Ok(Self::with_executor(Arc::new(pool)))
    }

    /// Builds an engine around an existing executor.
    pub fn with_executor(executor: ExecutorHandle) -> Self {
        Self { executor }
    }

    /// The default executor.
    #[must_use]
    pub fn executor(&self) -> &ExecutorHandle {
        &self.executor
    }

    /// A pending future, to be completed manually.
    pub fn incomplete<T: Clone + Send + 'static>(&self) -> CompletableFuture<T> {
        CompletableFuture::new(Arc::clone(&self.executor))
    }

    /// A future that has already succeeded with `value`.
    pub fn resolved<T: Clone + Send + 'static>(&self, value: T) -> CompletableFuture<T> {
        CompletableFuture::completed(value, Arc::clone(&self.executor))
    }

    /// A future that has already failed with `cause`.
    pub fn failed<T: Clone + Send + 'static>(&self, cause: Failure) -> CompletableFuture<T> {
        CompletableFuture::failed(cause, Arc::clone(&self.executor))
    }

    /// Runs `work` on the default executor.
    pub fn supply_async<T, F>(&self, work: F) -> CompletableFuture<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        CompletableFuture::supply_async_on(work, &self.executor)
    }

    /// Runs fallible `work` on the default executor.
    pub fn try_supply_async<T, E, F>(&self, work: F) -> CompletableFuture<T>
    where
        T: Clone + Send + 'static,
        E: Into<Failure>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        CompletableFuture::try_supply_async_on(work, &self.executor)
    }

    /// Runs `work` on the default executor, succeeding with `()`.
    pub fn run_async<F>(&self, work: F) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        CompletableFuture::run_async_on(work, &self.executor)
    }

    /// See [`CompletableFuture::all_of`].
    pub fn all_of<'a, T, I>(&self, futures: I) -> CompletableFuture<()>
    where
        T: Clone + Send + 'static,
        I: IntoIterator<Item = &'a CompletableFuture<T>>,
    {
        CompletableFuture::all_of(futures, &self.executor)
    }

    /// See [`CompletableFuture::any_of`].
    pub fn any_of<'a, T, I>(&self, futures: I) -> CompletableFuture<T>
    where
        T: Clone + Send + 'static,
        I: IntoIterator<Item = &'a CompletableFuture<T>>,
    {
        CompletableFuture::any_of(futures, &self.executor)
    }
}
