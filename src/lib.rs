//! Composable completion futures for thread-based parallelism.
//!
//! This crate provides a one-shot, shareable future ([`CompletableFuture`])
//! that can be completed by a background computation or manually, and
//! composed into dependency graphs. It:
//! - Stores each future's outcome in a task cell whose `Pending -> terminal`
//!   transition is committed exactly once, under one lock, together with
//!   draining the continuations waiting on it.
//! - Fires every continuation exactly once, either on the thread that resolves
//!   the cell or inline on the registering thread if the cell has already
//!   resolved. Synchronous chains fire iteratively, so their length is not
//!   bounded by the thread's stack.
//! - Joins independent computations with a lock-free publish/countdown
//!   protocol using Release/Relaxed/Acquire fences, so the last arriving side
//!   observes every published input.
//! - Dispatches `*_async` continuations through an [`Executor`] boundary.
//!   [`Engine::setup`] builds a rayon pool for it; [`Engine::with_executor`]
//!   accepts any other implementation.
//!
//! Key modules:
//! - `config`: describes the worker pool of the default executor.
//! - `engine`: the entry point holding the default executor. There is no
//!   implicit global engine.
//! - `executor`: the scheduling boundary and its stock implementations.
//! - `future`: the future handle, its completion and read operations, and all
//!   combinators.
//! - `error`: failure causes and read errors.
//! - `types`: the terminal [`Outcome`] of a cell.
//!
//! Quick start:
//! 1. Build an [`Engine`] with [`Engine::setup`] (or wrap an executor with
//!    [`Engine::with_executor`]).
//! 2. Start computations with [`Engine::supply_async`], or create a pending
//!    future with [`Engine::incomplete`] and complete it yourself.
//! 3. Chain with `then_apply`, `then_compose`, `then_combine`,
//!    `apply_to_either`, `all_of`, `any_of`, ..., and read the result with
//!    `join`, `get`, `get_timeout` or `get_now`.
//!
//! ```
//! use ccf::{config::Config, engine::Engine};
//!
//! let engine = Engine::setup(&Config::default()).unwrap();
//! let price = engine.supply_async(|| 100);
//! let rate = engine.supply_async(|| 3);
//! let total = price
//!     .then_combine(&rate, |price, rate| price * rate)
//!     .then_apply(|total| total.to_string());
//! assert_eq!(total.join().unwrap(), "300");
//! ```

mod cell;
/// Configuration of the default executor.
///
/// Exposes the `Config` struct used by `Engine::setup` to build a dedicated
/// worker pool.
pub mod config;
/// Entry point holding the default executor.
///
/// The `Engine` holds the default executor and offers the factory
/// operations (`resolved`, `supply_async`, `run_async`, `all_of`, ...) that
/// wire it into every future they create.
pub mod engine;
/// Failure causes stored in cells and errors returned by reads.
pub mod error;
/// The executor boundary.
///
/// Defines the `Executor` trait the engine submits work to, and adapters for
/// rayon pools, the calling thread and thread-per-task execution.
pub mod executor;
/// The future handle and its combinators.
pub mod future;
mod node;
mod sync;
/// Core types shared across the crate.
pub mod types;

pub use crate::{
    engine::Engine,
    error::{CompletionError, ExecutionError, Failure},
    executor::{Executor, ExecutorHandle},
    future::CompletableFuture,
    types::Outcome,
};
