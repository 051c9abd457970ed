//! Promise resolution and microtask dispatch for `ecma-rs`.
//!
//! This crate implements the promise layer of an ECMAScript engine against an embedding-provided
//! object model. It provides:
//! - The promise state machine and the promise resolution procedure ([`Engine::resolve_promise`])
//! - Reaction registration and triggering ([`Engine::perform_promise_then`], [`Engine::then`])
//! - A FIFO microtask queue with HTML-style checkpoints ([`Engine::perform_microtask_checkpoint`])
//! - Unhandled rejection bookkeeping ([`PromiseRejectionTracker`])
//! - Cooperative interruption ([`InterruptHandle`], fuel budgets via [`EngineOptions`])
//!
//! # Ownership
//!
//! The [`Engine`] owns promises, the built-in functions it hands to user code (resolving
//! functions, capability executors, the promise intrinsics) and the microtask queue. Everything
//! else is owned by the embedding and reached through [`HostHooks`]: calling user functions,
//! property lookups, type-error allocation, rejection tracking and the fast-path guards.
//!
//! # Handle validity
//!
//! Promises and built-in functions are referenced using stable handles. A handle contains
//! `{ index, generation }`; the generation is incremented every time the slot is freed by
//! [`Engine::collect_garbage`]. Public APIs that dereference handles validate them and return
//! [`VmError::InvalidHandle`] for stale handles.
//!
//! # Errors
//!
//! Every operation that may run user code returns `Result<_, VmError>`. Catchable errors are
//! converted into rejections at job boundaries; [`VmError::Termination`] is never caught.

mod budget;
mod engine;
mod error;
mod function;
mod gc;
mod handle;
mod heap;
mod host;
mod microtask;
mod microtask_queue;
mod promise;
mod promise_rejection_tracker;
mod reaction;
mod value;

pub use crate::budget::InterruptHandle;
pub use crate::engine::Engine;
pub use crate::engine::EngineOptions;
pub use crate::engine::Intrinsics;
pub use crate::error::Termination;
pub use crate::error::TerminationReason;
pub use crate::error::VmError;
pub use crate::gc::Tracer;
pub use crate::handle::FunctionHandle;
pub use crate::handle::ObjectHandle;
pub use crate::handle::PromiseHandle;
pub use crate::handle::SlotId;
pub use crate::host::HostHooks;
pub use crate::host::PromiseRejectionOperation;
pub use crate::host::PropertyKey;
pub use crate::microtask::Microtask;
pub use crate::microtask::MicrotaskKind;
pub use crate::microtask::MAX_MICROTASK_ARGUMENTS;
pub use crate::microtask_queue::MicrotaskQueue;
pub use crate::promise::PromiseFlavor;
pub use crate::promise::PromiseStatus;
pub use crate::promise_rejection_tracker::PromiseRejectionHandleAction;
pub use crate::promise_rejection_tracker::PromiseRejectionTracker;
pub use crate::reaction::PromiseCapability;
pub use crate::reaction::PromiseReaction;
pub use crate::reaction::ReactionList;
pub use crate::reaction::ReactionTarget;
pub use crate::value::Value;
