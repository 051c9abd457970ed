//! Host integration hooks.
//!
//! The promise engine owns promise state, its built-in functions and the microtask queue.
//! Everything else (ordinary objects, property storage, user functions, error objects) belongs to
//! the embedding, which exposes it through [`HostHooks`].
//!
//! ## Reentrancy
//!
//! [`HostHooks::call`], [`HostHooks::construct`] and [`HostHooks::get`] receive the [`Engine`]
//! mutably so user code running inside them can create, resolve or reject promises and enqueue
//! further microtasks. The engine never holds a borrow of its own state across these calls.

use crate::gc::Tracer;
use crate::{Engine, ObjectHandle, PromiseHandle, Value, VmError};

/// The property names the engine reads from objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
  /// `"then"`.
  Then,
  /// `"constructor"`.
  Constructor,
  /// `Symbol.species`.
  Species,
}

/// The `operation` argument of `HostPromiseRejectionTracker`.
///
/// Spec reference: <https://tc39.es/ecma262/#sec-host-promise-rejection-tracker>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseRejectionOperation {
  /// A promise was rejected while it had no handler.
  Reject,
  /// A handler was attached to a promise that was previously reported as unhandled.
  Handle,
}

/// Host hooks consumed by the promise engine.
///
/// ## Fast-path guards
///
/// [`HostHooks::promise_then_watchpoint_is_valid`] and
/// [`HostHooks::promise_species_watchpoint_is_valid`] are pure optimization hints. The engine
/// produces identical observable results whether they always return `false` (the default) or
/// `true` whenever the default promise machinery is untouched.
pub trait HostHooks {
  /// Calls a host object with `this` and `arguments`.
  ///
  /// Only invoked for objects for which [`HostHooks::is_callable`] returned `true`.
  fn call(
    &mut self,
    engine: &mut Engine,
    callee: ObjectHandle,
    this: Value,
    arguments: &[Value],
  ) -> Result<Value, VmError>;

  /// Constructs a host object with `arguments`.
  ///
  /// The default implementation treats every host object as a non-constructor.
  fn construct(
    &mut self,
    _engine: &mut Engine,
    _constructor: ObjectHandle,
    _arguments: &[Value],
  ) -> Result<Value, VmError> {
    Err(VmError::NotConstructable)
  }

  fn is_callable(&self, object: ObjectHandle) -> bool;

  fn is_constructor(&self, _object: ObjectHandle) -> bool {
    false
  }

  /// `Get(target, key)` for any object value, including engine promises and functions.
  ///
  /// May run user code (getters) and may fail with any [`VmError`].
  fn get(&mut self, engine: &mut Engine, target: Value, key: PropertyKey) -> Result<Value, VmError>;

  /// Allocates a `TypeError` instance carrying `message`.
  fn create_type_error(&mut self, message: &'static str) -> Value;

  /// Whether `promise`'s `then` lookup is known to resolve to the unmodified
  /// `%Promise.prototype.then%`, with no observable side effects.
  fn promise_then_watchpoint_is_valid(&self, _promise: PromiseHandle) -> bool {
    false
  }

  /// Whether `promise`'s species constructor is known to be the unmodified `%Promise%`.
  fn promise_species_watchpoint_is_valid(&self, _promise: PromiseHandle) -> bool {
    false
  }

  /// Promise rejection tracker hook (unhandled rejection reporting).
  ///
  /// This default implementation does nothing.
  fn promise_rejection_tracker(
    &mut self,
    _promise: PromiseHandle,
    _operation: PromiseRejectionOperation,
  ) -> Result<(), VmError> {
    Ok(())
  }

  /// Reports every value reachable from a host object that the engine may need to keep alive.
  ///
  /// Called by [`Engine::collect_garbage`]; the default implementation reports nothing.
  fn trace_object(&self, _object: ObjectHandle, _tracer: &mut Tracer) {}
}
