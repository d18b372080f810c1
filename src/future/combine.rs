use crate::{
    error::Failure,
    executor::{Dispatch, ExecutorHandle},
    future::CompletableFuture,
    node::{BothNode, RaceNode, guard},
};
use std::sync::Arc;

/// Sequencing, pairwise joins and races.
///
/// Every combinator registers a continuation on its upstream future(s) and
/// returns a new pending future; none of them touches the upstream state.
/// The plain form runs the user function on the thread that resolves the
/// upstream, or inline on the calling thread if the upstream has already
/// resolved. Every combinator also has an `*_async` form that submits it to
/// the default executor and an `*_async_on` form that submits it to the given
/// one. Failures short-circuit without dispatching.
impl<T: Clone + Send + 'static> CompletableFuture<T> {
    fn async_dispatch(&self) -> Dispatch {
        Dispatch::Async(Arc::clone(&self.executor))
    }

    fn uni_apply<R, F>(&self, dispatch: Dispatch, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let target = self.dependent();
        let out = target.clone();
        self.on_outcome(move |outcome| match outcome.into_result() {
            Ok(value) => dispatch.run(move || {
                out.settle(guard(|| f(value)));
            }),
            Err(cause) => {
                out.settle(Err(cause));
            }
        });
        target
    }

    /// Future of `f(value)` once this future succeeds.
    pub fn then_apply<R, F>(&self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.uni_apply(Dispatch::Inline, f)
    }

    /// [`then_apply`](Self::then_apply) with `f` run on the default executor.
    pub fn then_apply_async<R, F>(&self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.uni_apply(self.async_dispatch(), f)
    }

    /// [`then_apply`](Self::then_apply) with `f` run on `executor`.
    pub fn then_apply_async_on<R, F>(&self, f: F, executor: &ExecutorHandle) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.uni_apply(Dispatch::Async(Arc::clone(executor)), f)
    }

    /// Consumes the value once this future succeeds.
    pub fn then_accept<F>(&self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.uni_apply(Dispatch::Inline, f)
    }

    /// [`then_accept`](Self::then_accept) on the default executor.
    pub fn then_accept_async<F>(&self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.uni_apply(self.async_dispatch(), f)
    }

    /// [`then_accept`](Self::then_accept) on `executor`.
    pub fn then_accept_async_on<F>(&self, f: F, executor: &ExecutorHandle) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.uni_apply(Dispatch::Async(Arc::clone(executor)), f)
    }

    /// Runs `f` once this future succeeds, ignoring the value.
    pub fn then_run<F>(&self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.uni_apply(Dispatch::Inline, move |_| f())
    }

    /// [`then_run`](Self::then_run) on the default executor.
    pub fn then_run_async<F>(&self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.uni_apply(self.async_dispatch(), move |_| f())
    }

    /// [`then_run`](Self::then_run) on `executor`.
    pub fn then_run_async_on<F>(&self, f: F, executor: &ExecutorHandle) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.uni_apply(Dispatch::Async(Arc::clone(executor)), move |_| f())
    }

    fn uni_compose<R, F>(&self, dispatch: Dispatch, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> CompletableFuture<R> + Send + 'static,
    {
        let target = self.dependent();
        let out = target.clone();
        self.on_outcome(move |outcome| match outcome.into_result() {
            Ok(value) => dispatch.run(move || match guard(|| f(value)) {
                Ok(inner) => inner.on_outcome(move |outcome| {
                    out.relay(outcome);
                }),
                Err(cause) => {
                    out.settle(Err(cause));
                }
            }),
            Err(cause) => {
                out.settle(Err(cause));
            }
        });
        target
    }

    /// Future mirroring the future returned by `f(value)`.
    pub fn then_compose<R, F>(&self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> CompletableFuture<R> + Send + 'static,
    {
        self.uni_compose(Dispatch::Inline, f)
    }

    /// [`then_compose`](Self::then_compose) with `f` run on the default
    /// executor.
    pub fn then_compose_async<R, F>(&self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> CompletableFuture<R> + Send + 'static,
    {
        self.uni_compose(self.async_dispatch(), f)
    }

    /// [`then_compose`](Self::then_compose) with `f` run on `executor`.
    pub fn then_compose_async_on<R, F>(
        &self,
        f: F,
        executor: &ExecutorHandle,
    ) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> CompletableFuture<R> + Send + 'static,
    {
        self.uni_compose(Dispatch::Async(Arc::clone(executor)), f)
    }

    fn uni_when_complete<F>(&self, dispatch: Dispatch, action: F) -> Self
    where
        F: FnOnce(Result<&T, &Failure>) + Send + 'static,
    {
        let target = self.dependent();
        let out = target.clone();
        self.on_outcome(move |outcome| {
            dispatch.run(move || {
                let result = outcome.into_result();
                let observed = guard(|| action(result.as_ref()));
                // The action's own panic only replaces a success.
                out.settle(match (result, observed) {
                    (Ok(_), Err(panic)) => Err(panic),
                    (result, _) => result,
                });
            });
        });
        target
    }

    /// Runs `action` with the outcome and returns a future with the same
    /// outcome. If `action` panics while this future succeeded, the returned
    /// future fails with that panic instead.
    pub fn when_complete<F>(&self, action: F) -> Self
    where
        F: FnOnce(Result<&T, &Failure>) + Send + 'static,
    {
        self.uni_when_complete(Dispatch::Inline, action)
    }

    /// [`when_complete`](Self::when_complete) on the default executor.
    pub fn when_complete_async<F>(&self, action: F) -> Self
    where
        F: FnOnce(Result<&T, &Failure>) + Send + 'static,
    {
        self.uni_when_complete(self.async_dispatch(), action)
    }

    /// [`when_complete`](Self::when_complete) on `executor`.
    pub fn when_complete_async_on<F>(&self, action: F, executor: &ExecutorHandle) -> Self
    where
        F: FnOnce(Result<&T, &Failure>) + Send + 'static,
    {
        self.uni_when_complete(Dispatch::Async(Arc::clone(executor)), action)
    }

    fn uni_handle<R, F>(&self, dispatch: Dispatch, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(Result<T, Failure>) -> R + Send + 'static,
    {
        let target = self.dependent();
        let out = target.clone();
        self.on_outcome(move |outcome| {
            dispatch.run(move || {
                out.settle(guard(|| f(outcome.into_result())));
            });
        });
        target
    }

    /// Future of `f(outcome)`, run whether this future succeeded or failed.
    pub fn handle<R, F>(&self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(Result<T, Failure>) -> R + Send + 'static,
    {
        self.uni_handle(Dispatch::Inline, f)
    }

    /// [`handle`](Self::handle) on the default executor.
    pub fn handle_async<R, F>(&self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(Result<T, Failure>) -> R + Send + 'static,
    {
        self.uni_handle(self.async_dispatch(), f)
    }

    /// [`handle`](Self::handle) on `executor`.
    pub fn handle_async_on<R, F>(&self, f: F, executor: &ExecutorHandle) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(Result<T, Failure>) -> R + Send + 'static,
    {
        self.uni_handle(Dispatch::Async(Arc::clone(executor)), f)
    }

    fn uni_exceptionally<F>(&self, dispatch: Dispatch, f: F) -> Self
    where
        F: FnOnce(Failure) -> T + Send + 'static,
    {
        let target = self.dependent();
        let out = target.clone();
        self.on_outcome(move |outcome| match outcome.into_result() {
            Ok(value) => {
                out.settle(Ok(value));
            }
            Err(cause) => dispatch.run(move || {
                out.settle(guard(|| f(cause)));
            }),
        });
        target
    }

    /// Future that replaces a failure with `f(cause)` and passes a value
    /// through unchanged.
    pub fn exceptionally<F>(&self, f: F) -> Self
    where
        F: FnOnce(Failure) -> T + Send + 'static,
    {
        self.uni_exceptionally(Dispatch::Inline, f)
    }

    /// [`exceptionally`](Self::exceptionally) with `f` run on the default
    /// executor.
    pub fn exceptionally_async<F>(&self, f: F) -> Self
    where
        F: FnOnce(Failure) -> T + Send + 'static,
    {
        self.uni_exceptionally(self.async_dispatch(), f)
    }

    /// [`exceptionally`](Self::exceptionally) with `f` run on `executor`.
    pub fn exceptionally_async_on<F>(&self, f: F, executor: &ExecutorHandle) -> Self
    where
        F: FnOnce(Failure) -> T + Send + 'static,
    {
        self.uni_exceptionally(Dispatch::Async(Arc::clone(executor)), f)
    }

    fn bi_apply<U, R, F>(
        &self,
        other: &CompletableFuture<U>,
        dispatch: Dispatch,
        f: F,
    ) -> CompletableFuture<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        let target = self.dependent();
        let node = Arc::new(BothNode::new(f));
        {
            let node = Arc::clone(&node);
            let out = target.clone();
            let dispatch = dispatch.clone();
            self.on_outcome(move |outcome| match outcome.into_result() {
                Ok(value) => {
                    // SAFETY: A continuation fires exactly once, and this is the
                    // only continuation publishing to the left slot.
                    if let Some((a, b, f)) = unsafe { node.publish_left(value) } {
                        fire_both(dispatch, out, a, b, f);
                    }
                }
                Err(cause) => {
                    out.settle(Err(cause));
                }
            });
        }
        let out = target.clone();
        other.on_outcome(move |outcome| match outcome.into_result() {
            Ok(value) => {
                // SAFETY: A continuation fires exactly once, and this is the only
                // continuation publishing to the right slot.
                if let Some((a, b, f)) = unsafe { node.publish_right(value) } {
                    fire_both(dispatch, out, a, b, f);
                }
            }
            Err(cause) => {
                out.settle(Err(cause));
            }
        });
        target
    }

    /// Future of `f(a, b)` once both this future and `other` succeed. Fails
    /// as soon as either side fails.
    pub fn then_combine<U, R, F>(&self, other: &CompletableFuture<U>, f: F) -> CompletableFuture<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        self.bi_apply(other, Dispatch::Inline, f)
    }

    /// [`then_combine`](Self::then_combine) with `f` run on the default
    /// executor.
    pub fn then_combine_async<U, R, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
    ) -> CompletableFuture<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        self.bi_apply(other, self.async_dispatch(), f)
    }

    /// [`then_combine`](Self::then_combine) with `f` run on `executor`.
    pub fn then_combine_async_on<U, R, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
        executor: &ExecutorHandle,
    ) -> CompletableFuture<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        self.bi_apply(other, Dispatch::Async(Arc::clone(executor)), f)
    }

    /// Consumes both values once both futures succeed.
    pub fn then_accept_both<U, F>(&self, other: &CompletableFuture<U>, f: F) -> CompletableFuture<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        self.bi_apply(other, Dispatch::Inline, f)
    }

    /// [`then_accept_both`](Self::then_accept_both) on the default executor.
    pub fn then_accept_both_async<U, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
    ) -> CompletableFuture<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        self.bi_apply(other, self.async_dispatch(), f)
    }

    /// [`then_accept_both`](Self::then_accept_both) on `executor`.
    pub fn then_accept_both_async_on<U, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
        executor: &ExecutorHandle,
    ) -> CompletableFuture<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        self.bi_apply(other, Dispatch::Async(Arc::clone(executor)), f)
    }

    /// Runs `f` once both futures succeed.
    pub fn run_after_both<U, F>(&self, other: &CompletableFuture<U>, f: F) -> CompletableFuture<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.bi_apply(other, Dispatch::Inline, move |_, _| f())
    }

    /// [`run_after_both`](Self::run_after_both) on the default executor.
    pub fn run_after_both_async<U, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
    ) -> CompletableFuture<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.bi_apply(other, self.async_dispatch(), move |_, _| f())
    }

    /// [`run_after_both`](Self::run_after_both) on `executor`.
    pub fn run_after_both_async_on<U, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
        executor: &ExecutorHandle,
    ) -> CompletableFuture<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.bi_apply(other, Dispatch::Async(Arc::clone(executor)), move |_, _| f())
    }

    fn or_apply<R, F>(&self, other: &Self, dispatch: Dispatch, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let target = self.dependent();
        let node = Arc::new(RaceNode::new(f));
        // `self` registers first, so it wins when both have already resolved.
        for side in [self, other] {
            let node = Arc::clone(&node);
            let out = target.clone();
            let dispatch = dispatch.clone();
            side.on_outcome(move |outcome| {
                let Some(f) = node.claim() else {
                    return;
                };
                match outcome.into_result() {
                    Ok(value) => dispatch.run(move || {
                        out.settle(guard(|| f(value)));
                    }),
                    Err(cause) => {
                        out.settle(Err(cause));
                    }
                }
            });
        }
        target
    }

    /// Future of `f(value)` applied to whichever of this future and `other`
    /// resolves first. If the first one fails, so does the result.
    pub fn apply_to_either<R, F>(&self, other: &Self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.or_apply(other, Dispatch::Inline, f)
    }

    /// [`apply_to_either`](Self::apply_to_either) with `f` run on the default
    /// executor.
    pub fn apply_to_either_async<R, F>(&self, other: &Self, f: F) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.or_apply(other, self.async_dispatch(), f)
    }

    /// [`apply_to_either`](Self::apply_to_either) with `f` run on `executor`.
    pub fn apply_to_either_async_on<R, F>(
        &self,
        other: &Self,
        f: F,
        executor: &ExecutorHandle,
    ) -> CompletableFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.or_apply(other, Dispatch::Async(Arc::clone(executor)), f)
    }

    /// Consumes the value of whichever future resolves first.
    pub fn accept_either<F>(&self, other: &Self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.or_apply(other, Dispatch::Inline, f)
    }

    /// [`accept_either`](Self::accept_either) on the default executor.
    pub fn accept_either_async<F>(&self, other: &Self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.or_apply(other, self.async_dispatch(), f)
    }

    /// [`accept_either`](Self::accept_either) on `executor`.
    pub fn accept_either_async_on<F>(
        &self,
        other: &Self,
        f: F,
        executor: &ExecutorHandle,
    ) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.or_apply(other, Dispatch::Async(Arc::clone(executor)), f)
    }

    /// Runs `f` once either future resolves.
    pub fn run_after_either<F>(&self, other: &Self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.or_apply(other, Dispatch::Inline, move |_| f())
    }

    /// [`run_after_either`](Self::run_after_either) on the default executor.
    pub fn run_after_either_async<F>(&self, other: &Self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.or_apply(other, self.async_dispatch(), move |_| f())
    }

    /// [`run_after_either`](Self::run_after_either) on `executor`.
    pub fn run_after_either_async_on<F>(
        &self,
        other: &Self,
        f: F,
        executor: &ExecutorHandle,
    ) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.or_apply(other, Dispatch::Async(Arc::clone(executor)), move |_| f())
    }
}

fn fire_both<A, B, R, F>(dispatch: Dispatch, out: CompletableFuture<R>, a: A, b: B, f: F)
where
    A: Send + 'static,
    B: Send + 'static,
    R: Clone + Send + 'static,
    F: FnOnce(A, B) -> R + Send + 'static,
{
    dispatch.run(move || {
        out.settle(guard(|| f(a, b)));
    });
}
