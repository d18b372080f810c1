use core::{any::Any, time::Duration};
use std::{error::Error, sync::Arc};
use thiserror::Error;

/// Cause stored in a failed task cell.
///
/// Cheap to clone: every dependent of a failed cell receives the same cause,
/// so clones share the underlying error.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Failure {
    /// The work unit (or a continuation) returned an error.
    #[error("computation failed: {0}")]
    Computation(Arc<dyn Error + Send + Sync + 'static>),
    /// The work unit (or a continuation) panicked.
    #[error("computation panicked: {0}")]
    Panicked(Arc<str>),
    /// An upstream cell was cancelled.
    #[error("computation was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl Failure {
    /// Wraps an arbitrary error as a computation failure.
    pub fn new(error: impl Error + Send + Sync + 'static) -> Self {
        Self::Computation(Arc::new(error))
    }

    /// Builds a computation failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Whether this failure stems from a cancelled cell.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message: Arc<str> = if let Some(message) = payload.downcast_ref::<&str>() {
            Arc::from(*message)
        } else if let Some(message) = payload.downcast_ref::<String>() {
            Arc::from(message.as_str())
        } else {
            Arc::from("Box<dyn Any>")
        };
        Self::Panicked(message)
    }
}

/// Error surfaced by [`join`](crate::future::CompletableFuture::join) and
/// [`get_now`](crate::future::CompletableFuture::get_now).
///
/// Distinguishes "this read failed because the cell failed" from the cell's
/// cause itself, which is kept as the source.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CompletionError {
    /// The cell resolved to a failure.
    #[error("future completed exceptionally")]
    Failed(#[source] Failure),
    /// The cell itself was cancelled.
    #[error("future was cancelled")]
    Cancelled,
}

impl CompletionError {
    /// Underlying cause, with a cancelled cell reported as
    /// [`Failure::Cancelled`].
    #[must_use]
    pub fn cause(&self) -> Failure {
        match self {
            Self::Failed(cause) => cause.clone(),
            Self::Cancelled => Failure::Cancelled,
        }
    }
}

/// Error surfaced by [`get`](crate::future::CompletableFuture::get) and
/// [`get_timeout`](crate::future::CompletableFuture::get_timeout).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The cell resolved to a failure.
    #[error("execution failed")]
    Execution(#[source] Failure),
    /// The cell itself was cancelled.
    #[error("future was cancelled")]
    Cancelled,
    /// The wait deadline passed before the cell resolved. The cell is left
    /// untouched.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<CompletionError> for ExecutionError {
    fn from(error: CompletionError) -> Self {
        match error {
            CompletionError::Failed(cause) => Self::Execution(cause),
            CompletionError::Cancelled => Self::Cancelled,
        }
    }
}

/// Error returned by [`Engine::setup`](crate::engine::Engine::setup).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineSetupError {
    /// The dedicated worker pool could not be built.
    #[error("failed to build the worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
