use crate::{
    sync::{AtomicU8, Condvar, Mutex, Ordering, lock, wait, wait_timeout},
    types::{CANCELLED, Continuation, FAILED, Outcome, PENDING, SUCCEEDED},
};
use core::{cell::RefCell, fmt, mem};
use std::time::Instant;
use tracing::trace;

/// One waiter bound to the outcome it fires with.
type Fire = Box<dyn FnOnce()>;

// Waiters of resolutions nested inside a drain on this thread, in reverse
// firing order. `None` while the thread is not draining.
#[cfg(not(feature = "loom"))]
std::thread_local! {
    static DRAIN: RefCell<Option<Vec<Fire>>> = const { RefCell::new(None) };
}

#[cfg(feature = "loom")]
loom::thread_local! {
    static DRAIN: RefCell<Option<Vec<Fire>>> = RefCell::new(None);
}

/// Shared completion slot of one future.
///
/// The `slot` mutex is the single commit point for the `Pending -> terminal`
/// transition: the thread that installs the outcome also takes the waiter list
/// in the same critical section and becomes responsible for firing it.
/// `state` mirrors the outcome kind so that status queries don't need the
/// lock.
pub(crate) struct TaskCell<T> {
    state: AtomicU8,
    slot: Mutex<Slot<T>>,
    resolved: Condvar,
}

struct Slot<T> {
    outcome: Option<Outcome<T>>,
    waiters: Vec<Continuation<T>>,
}

impl<T> fmt::Debug for TaskCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            PENDING => "Pending",
            SUCCEEDED => "Succeeded",
            FAILED => "Failed",
            CANCELLED => "Cancelled",
            _ => unreachable!("TaskCell::fmt"),
        };
        f.debug_struct("TaskCell").field("state", &state).finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> TaskCell<T> {
    pub(crate) fn pending() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            slot: Mutex::new(Slot {
                outcome: None,
                waiters: Vec::new(),
            }),
            resolved: Condvar::new(),
        }
    }

    pub(crate) fn resolved(outcome: Outcome<T>) -> Self {
        Self {
            state: AtomicU8::new(outcome.tag()),
            slot: Mutex::new(Slot {
                outcome: Some(outcome),
                waiters: Vec::new(),
            }),
            resolved: Condvar::new(),
        }
    }

    /// Moves a pending cell to `outcome` and fires every registered waiter
    /// before returning, together with everything those waiters resolve in
    /// turn.
    ///
    /// Returns `false` without touching anything if the cell has already
    /// resolved.
    pub(crate) fn try_resolve(&self, outcome: Outcome<T>) -> bool {
        self.resolve_with(outcome, drain)
    }

    /// Like [`try_resolve`](Self::try_resolve), for resolutions made from
    /// inside a continuation. If this thread is already draining, the waiters
    /// are queued on that drain instead of fired on the current stack, so a
    /// synchronous chain of any length fires in constant stack depth.
    pub(crate) fn try_resolve_nested(&self, outcome: Outcome<T>) -> bool {
        self.resolve_with(outcome, schedule)
    }

    fn resolve_with(&self, outcome: Outcome<T>, run: fn(Vec<Fire>)) -> bool {
        let mut slot = lock(&self.slot);
        if slot.outcome.is_some() {
            return false;
        }
        let tag = outcome.tag();
        let waiters = mem::take(&mut slot.waiters);
        let fired = (!waiters.is_empty()).then(|| outcome.clone());
        slot.outcome = Some(outcome);
        self.state.store(tag, Ordering::Release);
        drop(slot);
        trace!(state = tag, waiters = waiters.len(), "task cell resolved");
        self.resolved.notify_all();
        if let Some(outcome) = fired {
            run(bind(waiters, &outcome));
        }
        true
    }

    /// Overwrites the outcome unconditionally.
    ///
    /// Waiters fire only if this is the cell's first resolution; a cell that
    /// already resolved has no waiters left to fire.
    pub(crate) fn force(&self, outcome: Outcome<T>) {
        let mut slot = lock(&self.slot);
        let tag = outcome.tag();
        let waiters = mem::take(&mut slot.waiters);
        let fired = (!waiters.is_empty()).then(|| outcome.clone());
        slot.outcome = Some(outcome);
        self.state.store(tag, Ordering::Release);
        drop(slot);
        self.resolved.notify_all();
        if let Some(outcome) = fired {
            drain(bind(waiters, &outcome));
        }
    }

    /// Registers `continuation`, or runs it right away on the calling thread
    /// if the cell has already resolved.
    pub(crate) fn register(&self, continuation: Continuation<T>) {
        let mut slot = lock(&self.slot);
        if let Some(outcome) = slot.outcome.clone() {
            drop(slot);
            continuation(outcome);
        } else {
            slot.waiters.push(continuation);
        }
    }

    pub(crate) fn peek(&self) -> Option<Outcome<T>> {
        if self.state.load(Ordering::Acquire) == PENDING {
            return None;
        }
        lock(&self.slot).outcome.clone()
    }

    /// Parks the calling thread until the cell resolves or `deadline` passes.
    ///
    /// Returns `None` only on timeout.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> Option<Outcome<T>> {
        let mut slot = lock(&self.slot);
        loop {
            if let Some(outcome) = &slot.outcome {
                return Some(outcome.clone());
            }
            slot = match deadline {
                None => wait(&self.resolved, slot),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    wait_timeout(&self.resolved, slot, deadline - now)
                }
            };
        }
    }

    pub(crate) fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn dependents(&self) -> usize {
        lock(&self.slot).waiters.len()
    }
}

/// Binds each waiter to its own copy of `outcome`, last waiter first.
fn bind<T: Clone + 'static>(waiters: Vec<Continuation<T>>, outcome: &Outcome<T>) -> Vec<Fire> {
    waiters
        .into_iter()
        .rev()
        .map(|continuation| {
            let outcome = outcome.clone();
            Box::new(move || continuation(outcome)) as Fire
        })
        .collect()
}

/// Fires `fires` and every waiter they schedule, depth first, in the order a
/// recursive walk would use. Any drain already running on this thread is set
/// aside until this one is empty.
fn drain(fires: Vec<Fire>) {
    let _outer = Resume(DRAIN.with(|queue| queue.replace(Some(fires))));
    while let Some(fire) = DRAIN.with(|queue| queue.borrow_mut().as_mut().and_then(Vec::pop)) {
        fire();
    }
}

/// Queues `fires` on the drain running on this thread, or starts one.
fn schedule(fires: Vec<Fire>) {
    let unqueued = DRAIN.with(|queue| match queue.borrow_mut().as_mut() {
        Some(pending) => {
            pending.extend(fires);
            None
        }
        None => Some(fires),
    });
    if let Some(fires) = unqueued {
        drain(fires);
    }
}

/// Reinstates the drain that was running before a nested [`drain`], even if
/// a waiter unwinds.
struct Resume(Option<Vec<Fire>>);

impl Drop for Resume {
    fn drop(&mut self) {
        let outer = self.0.take();
        DRAIN.with(|queue| *queue.borrow_mut() = outer);
    }
}
