use crate::error::{CompletionError, Failure};

/// Terminal outcome of a task cell.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The computation produced a value.
    Succeeded(T),
    /// The computation, or one of its upstream cells, failed.
    Failed(Failure),
    /// The cell was cancelled before it resolved.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Folds the outcome into a `Result`, reporting cancellation as
    /// [`Failure::Cancelled`].
    ///
    /// # Errors
    /// If the outcome is not [`Outcome::Succeeded`].
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Failed(cause) => Err(cause),
            Self::Cancelled => Err(Failure::Cancelled),
        }
    }

    /// Whether the outcome is a failure or a cancellation.
    #[must_use]
    pub fn is_exceptional(&self) -> bool {
        !matches!(self, Self::Succeeded(_))
    }

    /// Outcome a dependent cell observes: a cancelled upstream turns into a
    /// [`Failure::Cancelled`] failure downstream.
    pub(crate) fn relay(self) -> Self {
        match self {
            Self::Cancelled => Self::Failed(Failure::Cancelled),
            other => other,
        }
    }

    pub(crate) fn into_read(self) -> Result<T, CompletionError> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Failed(cause) => Err(CompletionError::Failed(cause)),
            Self::Cancelled => Err(CompletionError::Cancelled),
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            Self::Succeeded(_) => SUCCEEDED,
            Self::Failed(_) => FAILED,
            Self::Cancelled => CANCELLED,
        }
    }
}

impl<T> From<Result<T, Failure>> for Outcome<T> {
    fn from(result: Result<T, Failure>) -> Self {
        match result {
            Ok(value) => Self::Succeeded(value),
            Err(cause) => Self::Failed(cause),
        }
    }
}

pub(crate) const PENDING: u8 = 0;
pub(crate) const SUCCEEDED: u8 = 1;
pub(crate) const FAILED: u8 = 2;
pub(crate) const CANCELLED: u8 = 3;

/// Continuation fired exactly once with the outcome of the cell it is
/// registered on.
pub(crate) type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send>;
