use crate::{
    error::Failure,
    sync::*,
};
use derive_more::Debug;
use std::panic::{self, AssertUnwindSafe};

/// Runs a user function, turning a panic into a [`Failure::Panicked`].
pub(crate) fn guard<R>(f: impl FnOnce() -> R) -> Result<R, Failure> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Failure::from_panic)
}

/// Join point of two upstream cells feeding one bi-combine function.
///
/// Each side publishes its value into its own slot and then decrements
/// `remaining`. The side that observes the counter reach zero takes both
/// values and the function. A failing side never publishes, so the counter
/// never reaches zero and the function never runs.
#[must_use]
#[derive(Debug)]
pub(crate) struct BothNode<A, B, F> {
    remaining: AtomicU8,
    #[debug(skip)]
    left: SyncUnsafeCell<Option<A>>,
    #[debug(skip)]
    right: SyncUnsafeCell<Option<B>>,
    #[debug(skip)]
    action: SyncUnsafeCell<Option<F>>,
}

impl<A, B, F> BothNode<A, B, F> {
    pub(crate) fn new(action: F) -> Self {
        Self {
            remaining: AtomicU8::new(2),
            left: SyncUnsafeCell::new(None),
            right: SyncUnsafeCell::new(None),
            action: SyncUnsafeCell::new(Some(action)),
        }
    }

    /// # Safety
    ///
    /// Must be called at most once per node, which holds when it is only
    /// called from a continuation registered once on the left cell.
    pub(crate) unsafe fn publish_left(&self, value: A) -> Option<(A, B, F)> {
        // SAFETY: This is the only writer of `left`, and nobody reads it before
        // the countdown below reaches zero.
        unsafe {
            self.left.get_mut().with(|ptr| *ptr = Some(value));
        }
        // SAFETY: Forwarded from the caller.
        unsafe { self.arrive() }
    }

    /// # Safety
    ///
    /// Must be called at most once per node, which holds when it is only
    /// called from a continuation registered once on the right cell.
    pub(crate) unsafe fn publish_right(&self, value: B) -> Option<(A, B, F)> {
        // SAFETY: This is the only writer of `right`, and nobody reads it
        // before the countdown below reaches zero.
        unsafe {
            self.right.get_mut().with(|ptr| *ptr = Some(value));
        }
        // SAFETY: Forwarded from the caller.
        unsafe { self.arrive() }
    }

    /// # Safety
    ///
    /// Each side arrives at most once.
    unsafe fn arrive(&self) -> Option<(A, B, F)> {
        fence(Ordering::Release);
        if self.remaining.fetch_sub(1, Ordering::Relaxed) != 1 {
            return None;
        }
        fence(Ordering::Acquire);
        // SAFETY: Both sides have published, and the Release/Acquire fence pair
        // around the countdown makes their writes visible here. No other thread
        // touches the slots after its own arrival.
        unsafe {
            let left = self.left.get_mut().with(|ptr| (*ptr).take());
            let right = self.right.get_mut().with(|ptr| (*ptr).take());
            let action = self.action.get_mut().with(|ptr| (*ptr).take());
            Some((
                left.expect("BothNode::arrive: [1]"),
                right.expect("BothNode::arrive: [2]"),
                action.expect("BothNode::arrive: [3]"),
            ))
        }
    }
}

/// Race between two upstream cells: the first side to claim the node gets the
/// function, every later claim gets `None`.
#[must_use]
#[derive(Debug)]
pub(crate) struct RaceNode<F> {
    claimed: AtomicBool,
    #[debug(skip)]
    action: SyncUnsafeCell<Option<F>>,
}

impl<F> RaceNode<F> {
    pub(crate) fn new(action: F) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            action: SyncUnsafeCell::new(Some(action)),
        }
    }

    pub(crate) fn claim(&self) -> Option<F> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        // SAFETY: Exactly one caller observes `false` above, so the slot has a
        // single reader and no writer after construction.
        unsafe { self.action.get_mut().with(|ptr| (*ptr).take()) }
    }
}

/// Countdown over many upstream cells that only need to signal success.
#[must_use]
#[derive(Debug)]
pub(crate) struct CountdownNode {
    remaining: AtomicUsize,
}

impl CountdownNode {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(total),
        }
    }

    /// Returns `true` for the last arrival.
    pub(crate) fn arrive(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }
}
