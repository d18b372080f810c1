use derive_more::Debug;
use std::{sync::Arc, thread};

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to an executor, as stored by every future.
pub type ExecutorHandle = Arc<dyn Executor>;

/// The scheduling boundary consumed by the engine.
///
/// The only contract is that `execute` eventually runs `job` to completion
/// exactly once, on some thread. No ordering, priority or cancellation of
/// submitted jobs is assumed.
pub trait Executor: Send + Sync + 'static {
    /// Schedule `job` for execution.
    fn execute(&self, job: Job);
}

impl Executor for rayon::ThreadPool {
    fn execute(&self, job: Job) {
        self.spawn(job);
    }
}

/// Runs jobs on rayon's global pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalPool;

impl Executor for GlobalPool {
    fn execute(&self, job: Job) {
        rayon::spawn(job);
    }
}

/// Runs jobs synchronously on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Spawns a fresh detached OS thread per job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPerTask;

impl Executor for ThreadPerTask {
    fn execute(&self, job: Job) {
        drop(thread::spawn(job));
    }
}

/// Where a continuation's user function runs.
#[derive(Debug, Clone)]
pub(crate) enum Dispatch {
    /// On whichever thread fires the continuation.
    Inline,
    /// Submitted to an executor.
    Async(#[debug(skip)] ExecutorHandle),
}

impl Dispatch {
    pub(crate) fn run(self, job: impl FnOnce() + Send + 'static) {
        match self {
            Self::Inline => job(),
            Self::Async(executor) => executor.execute(Box::new(job)),
        }
    }
}
