use crate::{executor::ExecutorHandle, future::CompletableFuture, node::CountdownNode};
use std::sync::Arc;

impl<T: Clone + Send + 'static> CompletableFuture<T> {
    /// Future that succeeds once every input succeeds, and fails with the
    /// first failure observed among them.
    ///
    /// Inputs still pending when another one fails keep running. An empty
    /// input yields an already succeeded future.
    pub fn all_of<'a, I>(futures: I, executor: &ExecutorHandle) -> CompletableFuture<()>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let futures: Vec<_> = futures.into_iter().collect();
        if futures.is_empty() {
            return CompletableFuture::completed((), Arc::clone(executor));
        }
        let target = CompletableFuture::new(Arc::clone(executor));
        let node = Arc::new(CountdownNode::new(futures.len()));
        for future in futures {
            let node = Arc::clone(&node);
            let out = target.clone();
            future.on_outcome(move |outcome| match outcome.into_result() {
                Ok(_) => {
                    if node.arrive() {
                        out.settle(Ok(()));
                    }
                }
                Err(cause) => {
                    out.settle(Err(cause));
                }
            });
        }
        target
    }

    /// Future resolving like whichever input resolves first, success or
    /// failure. Later outcomes are discarded.
    ///
    /// An empty input yields a future that never resolves on its own.
    pub fn any_of<'a, I>(futures: I, executor: &ExecutorHandle) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let target = Self::new(Arc::clone(executor));
        for future in futures {
            let out = target.clone();
            future.on_outcome(move |outcome| {
                out.relay(outcome);
            });
        }
        target
    }
}
