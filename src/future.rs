mod aggregate;
mod combine;

use crate::{
    cell::TaskCell,
    error::{CompletionError, ExecutionError, Failure},
    executor::ExecutorHandle,
    node::guard,
    types::{CANCELLED, FAILED, Outcome, PENDING},
};
use core::time::Duration;
use derive_more::Debug;
use std::{sync::Arc, time::Instant};
use tracing::{trace, warn};

/// Handle to a one-shot, shareable completion cell.
///
/// Cloning the handle does not clone the computation: every clone observes
/// and may complete the same cell. The handle also carries the default
/// executor that `*_async` combinators without an explicit executor use; it is
/// inherited by every future derived from this one.
#[must_use]
#[derive(Debug)]
pub struct CompletableFuture<T> {
    cell: Arc<TaskCell<T>>,
    #[debug(skip)]
    executor: ExecutorHandle,
}

impl<T> Clone for CompletableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<T: Clone + Send + 'static> CompletableFuture<T> {
    /// A pending future, to be completed manually.
    pub fn new(executor: ExecutorHandle) -> Self {
        Self {
            cell: Arc::new(TaskCell::pending()),
            executor,
        }
    }

    /// A future that has already succeeded with `value`.
    pub fn completed(value: T, executor: ExecutorHandle) -> Self {
        Self::from_outcome(Outcome::Succeeded(value), executor)
    }

    /// A future that has already failed with `cause`.
    pub fn failed(cause: Failure, executor: ExecutorHandle) -> Self {
        Self::from_outcome(Outcome::Failed(cause), executor)
    }

    fn from_outcome(outcome: Outcome<T>, executor: ExecutorHandle) -> Self {
        Self {
            cell: Arc::new(TaskCell::resolved(outcome)),
            executor,
        }
    }

    /// Runs `work` on `executor` and resolves the returned future with its
    /// result. A panic inside `work` fails the future with
    /// [`Failure::Panicked`].
    pub fn supply_async_on<F>(work: F, executor: &ExecutorHandle) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::try_supply_async_on(move || Ok::<_, Failure>(work()), executor)
    }

    /// Like [`supply_async_on`](Self::supply_async_on) for fallible work: an
    /// `Err` fails the future with that error as the cause.
    pub fn try_supply_async_on<F, E>(work: F, executor: &ExecutorHandle) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<Failure>,
    {
        let future = Self::new(Arc::clone(executor));
        let target = future.clone();
        executor.execute(Box::new(move || {
            let result = guard(work).and_then(|result| result.map_err(Into::into));
            target.settle(result);
        }));
        future
    }

    /// Completes with `value` unless already resolved.
    ///
    /// Returns whether this call performed the transition.
    pub fn complete(&self, value: T) -> bool {
        self.cell.try_resolve(Outcome::Succeeded(value))
    }

    /// Fails with `cause` unless already resolved.
    ///
    /// Returns whether this call performed the transition.
    pub fn complete_exceptionally(&self, cause: Failure) -> bool {
        self.cell.try_resolve(Outcome::Failed(cause))
    }

    /// Marks a pending future as cancelled. Work already running is not
    /// interrupted; dependents fail with [`Failure::Cancelled`].
    ///
    /// Returns `true` if the future is cancelled after this call, and `false`
    /// if it had already resolved some other way.
    pub fn cancel(&self) -> bool {
        let cancelled = self.cell.try_resolve(Outcome::Cancelled);
        if cancelled {
            trace!("future cancelled");
        }
        cancelled || self.is_cancelled()
    }

    /// Forces the observed value to `value`, even if the future has already
    /// resolved. Continuations that already fired are not fired again.
    ///
    /// This is an escape hatch for error recovery, not part of normal
    /// completion.
    pub fn obtrude_value(&self, value: T) {
        warn!("obtruding future value");
        self.cell.force(Outcome::Succeeded(value));
    }

    /// Forces the observed outcome to a failure with `cause`, even if the
    /// future has already resolved.
    pub fn obtrude_exception(&self, cause: Failure) {
        warn!(%cause, "obtruding future failure");
        self.cell.force(Outcome::Failed(cause));
    }

    /// Whether the future has resolved in any way.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cell.state() != PENDING
    }

    /// Whether the future was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cell.state() == CANCELLED
    }

    /// Whether the future failed or was cancelled.
    #[must_use]
    pub fn is_completed_exceptionally(&self) -> bool {
        matches!(self.cell.state(), FAILED | CANCELLED)
    }

    /// Number of continuations still waiting for this future.
    #[must_use]
    pub fn number_of_dependents(&self) -> usize {
        self.cell.dependents()
    }

    /// Outcome, if resolved, without blocking.
    #[must_use]
    pub fn outcome_now(&self) -> Option<Outcome<T>> {
        self.cell.peek()
    }

    /// The value if resolved, `default` if still pending. Never blocks.
    ///
    /// # Errors
    /// If the future failed or was cancelled.
    pub fn get_now(&self, default: T) -> Result<T, CompletionError> {
        self.cell.peek().map_or(Ok(default), Outcome::into_read)
    }

    /// Blocks until the future resolves.
    ///
    /// # Errors
    /// If the future failed or was cancelled.
    pub fn join(&self) -> Result<T, CompletionError> {
        self.cell
            .wait(None)
            .expect("CompletableFuture::join: [1]")
            .into_read()
    }

    /// Blocks until the future resolves. Same as [`join`](Self::join) with
    /// the error reported as an [`ExecutionError`].
    ///
    /// # Errors
    /// If the future failed or was cancelled.
    pub fn get(&self) -> Result<T, ExecutionError> {
        Ok(self.join()?)
    }

    /// Blocks until the future resolves or `timeout` elapses. A timeout
    /// leaves the future untouched. A timeout too large to express as a
    /// deadline waits without one.
    ///
    /// # Errors
    /// If the future failed, was cancelled, or did not resolve in time.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, ExecutionError> {
        let deadline = Instant::now().checked_add(timeout);
        match self.cell.wait(deadline) {
            Some(outcome) => Ok(outcome.into_read()?),
            None => Err(ExecutionError::Timeout(timeout)),
        }
    }

    /// Executor used by `*_async` combinators called without one.
    #[must_use]
    pub fn default_executor(&self) -> &ExecutorHandle {
        &self.executor
    }

    /// A pending future sharing this future's default executor.
    pub(crate) fn dependent<R: Clone + Send + 'static>(&self) -> CompletableFuture<R> {
        CompletableFuture::new(Arc::clone(&self.executor))
    }

    pub(crate) fn on_outcome(&self, continuation: impl FnOnce(Outcome<T>) + Send + 'static) {
        self.cell.register(Box::new(continuation));
    }

    /// Resolution from inside a continuation; see
    /// [`TaskCell::try_resolve_nested`].
    pub(crate) fn settle(&self, result: Result<T, Failure>) -> bool {
        self.cell.try_resolve_nested(result.into())
    }

    pub(crate) fn relay(&self, outcome: Outcome<T>) -> bool {
        self.cell.try_resolve_nested(outcome.relay())
    }
}

impl CompletableFuture<()> {
    /// Runs `work` on `executor`, succeeding with `()`.
    pub fn run_async_on<F>(work: F, executor: &ExecutorHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::supply_async_on(work, executor)
    }
}
