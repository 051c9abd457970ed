//! Promise objects and the promise abstract operations.
//!
//! This module implements the promise state machine, the promise resolution procedure and the
//! `then` family:
//! - [`Engine::resolve`] / [`Engine::reject`] / [`Engine::fulfill`]: one-shot public entry points,
//! - [`Engine::resolve_promise`] / [`Engine::fulfill_promise`] / [`Engine::reject_promise`]: the
//!   internal settlement primitives, which require a pending promise,
//! - [`Engine::perform_promise_then`] and [`Engine::then`],
//! - species constructor lookup and `NewPromiseCapability`,
//! - the "without promise" variants used by `await`, which settle a bare handler pair instead of a
//!   derived promise.
//!
//! Spec reference: <https://tc39.es/ecma262/#sec-promise-objects>

use crate::function::BuiltinFunction;
use crate::gc::{Trace, Tracer};
use crate::microtask::Microtask;
use crate::reaction::{PromiseCapability, PromiseReaction, ReactionList, ReactionTarget};
use crate::{
  Engine, HostHooks, PromiseHandle, PromiseRejectionOperation, PropertyKey, Value, VmError,
};

/// The observable status of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseStatus {
  Pending,
  Fulfilled,
  Rejected,
}

/// Distinguishes user-visible promises from engine-internal ones.
///
/// Internal promises are never exposed to user code, so their `then` and species lookups are
/// always treated as unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseFlavor {
  Public,
  Internal,
}

/// Reactions while pending, the settlement value afterwards.
#[derive(Debug, Clone)]
pub(crate) enum PromiseState {
  Pending(ReactionList),
  Fulfilled(Value),
  Rejected(Value),
}

#[derive(Debug, Clone)]
pub(crate) struct JsPromise {
  pub(crate) flavor: PromiseFlavor,
  pub(crate) state: PromiseState,
  pub(crate) is_first_resolving_function_called: bool,
  pub(crate) is_handled: bool,
}

impl JsPromise {
  fn new(flavor: PromiseFlavor) -> Self {
    Self {
      flavor,
      state: PromiseState::Pending(ReactionList::new()),
      is_first_resolving_function_called: false,
      is_handled: false,
    }
  }

  pub(crate) fn status(&self) -> PromiseStatus {
    match self.state {
      PromiseState::Pending(_) => PromiseStatus::Pending,
      PromiseState::Fulfilled(_) => PromiseStatus::Fulfilled,
      PromiseState::Rejected(_) => PromiseStatus::Rejected,
    }
  }
}

impl Trace for JsPromise {
  fn trace(&self, tracer: &mut Tracer) {
    match &self.state {
      PromiseState::Pending(reactions) => reactions.trace(tracer),
      PromiseState::Fulfilled(value) | PromiseState::Rejected(value) => tracer.trace_value(*value),
    }
  }
}

impl Engine {
  /// Allocates a new pending promise.
  pub fn new_promise(&mut self, flavor: PromiseFlavor) -> PromiseHandle {
    PromiseHandle(self.promises.alloc(JsPromise::new(flavor)))
  }

  pub fn promise_status(&self, promise: PromiseHandle) -> Result<PromiseStatus, VmError> {
    Ok(self.promise_record(promise)?.status())
  }

  /// The settlement value, or `None` while pending.
  pub fn promise_result(&self, promise: PromiseHandle) -> Result<Option<Value>, VmError> {
    Ok(match self.promise_record(promise)?.state {
      PromiseState::Pending(_) => None,
      PromiseState::Fulfilled(value) | PromiseState::Rejected(value) => Some(value),
    })
  }

  pub fn promise_flavor(&self, promise: PromiseHandle) -> Result<PromiseFlavor, VmError> {
    Ok(self.promise_record(promise)?.flavor)
  }

  pub fn promise_is_handled(&self, promise: PromiseHandle) -> Result<bool, VmError> {
    Ok(self.promise_record(promise)?.is_handled)
  }

  pub fn is_first_resolving_function_called(
    &self,
    promise: PromiseHandle,
  ) -> Result<bool, VmError> {
    Ok(self.promise_record(promise)?.is_first_resolving_function_called)
  }

  /// Sets `[[PromiseIsHandled]]`. Idempotent.
  pub fn mark_as_handled(&mut self, promise: PromiseHandle) -> Result<(), VmError> {
    self.promise_record_mut(promise)?.is_handled = true;
    Ok(())
  }

  /// Number of reactions registered on a pending promise (always 0 once settled).
  pub fn pending_reaction_count(&self, promise: PromiseHandle) -> Result<usize, VmError> {
    Ok(match &self.promise_record(promise)?.state {
      PromiseState::Pending(reactions) => reactions.len(),
      PromiseState::Fulfilled(_) | PromiseState::Rejected(_) => 0,
    })
  }

  /// Sets the first-resolving-function latch. Returns `false` if it was already set.
  fn latch_first_resolving_function(&mut self, promise: PromiseHandle) -> Result<bool, VmError> {
    let record = self.promise_record_mut(promise)?;
    if record.is_first_resolving_function_called {
      return Ok(false);
    }
    record.is_first_resolving_function_called = true;
    Ok(true)
  }

  /// Public one-shot resolve. Has no effect once any public resolve/reject/fulfill was called.
  pub fn resolve(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    value: Value,
  ) -> Result<(), VmError> {
    if self.latch_first_resolving_function(promise)? {
      self.resolve_promise(host, promise, value)?;
    }
    Ok(())
  }

  /// Public one-shot reject.
  pub fn reject(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    value: Value,
  ) -> Result<(), VmError> {
    if self.latch_first_resolving_function(promise)? {
      self.reject_promise(host, promise, value)?;
    }
    Ok(())
  }

  /// Public one-shot fulfill: settles with `value` as-is, without thenable detection.
  pub fn fulfill(&mut self, promise: PromiseHandle, value: Value) -> Result<(), VmError> {
    if self.latch_first_resolving_function(promise)? {
      self.fulfill_promise(promise, value)?;
    }
    Ok(())
  }

  /// Rejects without ever notifying the rejection tracker: the promise is marked handled first.
  pub fn reject_as_handled(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    value: Value,
  ) -> Result<(), VmError> {
    if self.is_first_resolving_function_called(promise)? {
      return Ok(());
    }
    self.mark_as_handled(promise)?;
    self.reject(host, promise, value)
  }

  /// Rejects `promise` with the value carried by a caught `error`.
  ///
  /// Uncatchable errors are returned unchanged and leave `promise` untouched.
  pub fn reject_with_caught_exception(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    error: VmError,
  ) -> Result<PromiseHandle, VmError> {
    let value = error.into_thrown_value(host)?;
    self.reject(host, promise, value)?;
    Ok(promise)
  }

  /// Moves a pending promise to `state`, returning its reactions.
  ///
  /// # Panics
  ///
  /// Panics if the promise is already settled.
  fn settle(&mut self, promise: PromiseHandle, state: PromiseState) -> Result<ReactionList, VmError> {
    let record = self.promise_record_mut(promise)?;
    match std::mem::replace(&mut record.state, state) {
      PromiseState::Pending(reactions) => Ok(reactions),
      PromiseState::Fulfilled(_) | PromiseState::Rejected(_) => {
        panic!("settlement primitive called on an already settled promise")
      }
    }
  }

  /// `FulfillPromise(promise, value)`.
  ///
  /// # Panics
  ///
  /// Panics if `promise` is not pending.
  pub fn fulfill_promise(&mut self, promise: PromiseHandle, value: Value) -> Result<(), VmError> {
    let reactions = self.settle(promise, PromiseState::Fulfilled(value))?;
    self.trigger_promise_reactions(PromiseStatus::Fulfilled, reactions, value)
  }

  /// `RejectPromise(promise, reason)`. Notifies the rejection tracker if no handler is attached.
  ///
  /// # Panics
  ///
  /// Panics if `promise` is not pending.
  pub fn reject_promise(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    reason: Value,
  ) -> Result<(), VmError> {
    let reactions = self.settle(promise, PromiseState::Rejected(reason))?;
    if !self.promise_record(promise)?.is_handled {
      self.notify_rejection_tracker(host, promise, PromiseRejectionOperation::Reject)?;
    }
    self.trigger_promise_reactions(PromiseStatus::Rejected, reactions, reason)
  }

  /// The promise resolution procedure.
  ///
  /// Spec reference: <https://tc39.es/ecma262/#sec-promise-resolve-functions>
  ///
  /// # Panics
  ///
  /// Panics if `promise` is not pending when it is settled synchronously.
  pub fn resolve_promise(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    resolution: Value,
  ) -> Result<(), VmError> {
    if resolution == Value::Promise(promise) {
      let error = host.create_type_error("Cannot resolve a promise with itself");
      return self.reject_promise(host, promise, error);
    }

    if !resolution.is_object() {
      return self.fulfill_promise(promise, resolution);
    }

    if let Value::Promise(inner) = resolution {
      if self.is_then_fast_and_non_observable(host, inner)? {
        return self.queue_microtask(Microtask::PromiseResolveThenableJobFast {
          promise: inner,
          promise_to_resolve: promise,
        });
      }
    }

    let then = match host.get(self, resolution, PropertyKey::Then) {
      Ok(then) => then,
      Err(err) => {
        let error = err.into_thrown_value(host)?;
        return self.reject_promise(host, promise, error);
      }
    };

    if !self.is_callable(host, then) {
      return self.fulfill_promise(promise, resolution);
    }

    let (resolve, reject) = self.create_resolving_functions(promise);
    self.queue_microtask(Microtask::PromiseResolveThenableJob {
      thenable: resolution,
      then,
      resolve,
      reject,
    })
  }

  /// `TriggerPromiseReactions`: enqueues one job per reaction in registration order.
  ///
  /// An enqueue failure stops the walk; jobs already enqueued stay queued.
  pub(crate) fn trigger_promise_reactions(
    &mut self,
    status: PromiseStatus,
    reactions: ReactionList,
    argument: Value,
  ) -> Result<(), VmError> {
    for reaction in reactions.into_registration_order() {
      let handler = match status {
        PromiseStatus::Fulfilled => reaction.on_fulfilled,
        PromiseStatus::Rejected => reaction.on_rejected,
        PromiseStatus::Pending => unreachable!("reactions triggered for a pending promise"),
      };
      self.enqueue_reaction_job(status, reaction.target, handler, argument, reaction.context)?;
    }
    Ok(())
  }

  fn enqueue_reaction_job(
    &mut self,
    status: PromiseStatus,
    target: ReactionTarget,
    handler: Option<Value>,
    argument: Value,
    context: Value,
  ) -> Result<(), VmError> {
    let task = match handler {
      None => Microtask::PromiseResolveWithoutHandlerJob {
        target,
        resolution: argument,
        status,
      },
      Some(handler) if target.is_none() => Microtask::PromiseReactionJobWithoutPromise {
        handler,
        argument,
        context,
      },
      Some(handler) => Microtask::PromiseReactionJob {
        target,
        handler,
        argument,
        context,
      },
    };
    self.queue_microtask(task)
  }

  /// Registers `reaction` on `promise`, or schedules it right away if `promise` is settled.
  /// Always marks `promise` as handled.
  pub(crate) fn add_reaction(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    reaction: PromiseReaction,
  ) -> Result<(), VmError> {
    let record = self.promise_record_mut(promise)?;
    let is_handled = record.is_handled;
    let settled = match &mut record.state {
      PromiseState::Pending(reactions) => {
        reactions.push(reaction);
        None
      }
      PromiseState::Fulfilled(value) => Some((PromiseStatus::Fulfilled, *value)),
      PromiseState::Rejected(reason) => Some((PromiseStatus::Rejected, *reason)),
    };

    if let Some((status, argument)) = settled {
      let handler = match status {
        PromiseStatus::Rejected => {
          if !is_handled {
            self.notify_rejection_tracker(host, promise, PromiseRejectionOperation::Handle)?;
          }
          reaction.on_rejected
        }
        _ => reaction.on_fulfilled,
      };
      self.enqueue_reaction_job(status, reaction.target, handler, argument, reaction.context)?;
    }
    self.mark_as_handled(promise)
  }

  /// `PerformPromiseThen(promise, onFulfilled, onRejected, resultCapability)`.
  ///
  /// Non-callable handlers pass the settlement through to `target` unchanged.
  pub fn perform_promise_then(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    on_fulfilled: Value,
    on_rejected: Value,
    target: ReactionTarget,
    context: Value,
  ) -> Result<(), VmError> {
    let on_fulfilled = self.is_callable(host, on_fulfilled).then_some(on_fulfilled);
    let on_rejected = self.is_callable(host, on_rejected).then_some(on_rejected);
    self.add_reaction(
      host,
      promise,
      PromiseReaction {
        target,
        on_fulfilled,
        on_rejected,
        context,
      },
    )
  }

  /// `Promise.prototype.then`.
  ///
  /// Returns the derived promise (or the foreign object produced by the species constructor).
  pub fn then(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    on_fulfilled: Value,
    on_rejected: Value,
  ) -> Result<Value, VmError> {
    let (result, target) = if self.promise_species_watchpoint_is_valid(host, promise)? {
      let flavor = self.promise_flavor(promise)?;
      let derived = self.new_promise(flavor);
      (Value::Promise(derived), ReactionTarget::Promise(derived))
    } else {
      let constructor = self.promise_species_constructor(host, Value::Promise(promise))?;
      let capability = self.new_promise_capability(host, constructor)?;
      (capability.promise, ReactionTarget::Capability(capability))
    };

    self.perform_promise_then(
      host,
      promise,
      on_fulfilled,
      on_rejected,
      target,
      Value::Undefined,
    )?;
    Ok(result)
  }

  /// Whether a `then` lookup on `promise` is known to yield the unmodified intrinsic `then`.
  pub fn is_then_fast_and_non_observable(
    &self,
    host: &dyn HostHooks,
    promise: PromiseHandle,
  ) -> Result<bool, VmError> {
    Ok(match self.promise_flavor(promise)? {
      PromiseFlavor::Internal => true,
      PromiseFlavor::Public => host.promise_then_watchpoint_is_valid(promise),
    })
  }

  /// Whether `promise`'s species constructor is known to be the intrinsic one.
  pub fn promise_species_watchpoint_is_valid(
    &self,
    host: &dyn HostHooks,
    promise: PromiseHandle,
  ) -> Result<bool, VmError> {
    Ok(match self.promise_flavor(promise)? {
      PromiseFlavor::Internal => true,
      PromiseFlavor::Public => host.promise_species_watchpoint_is_valid(promise),
    })
  }

  /// `SpeciesConstructor(this, %Promise%)`.
  pub fn promise_species_constructor(
    &mut self,
    host: &mut dyn HostHooks,
    this: Value,
  ) -> Result<Value, VmError> {
    if let Value::Promise(promise) = this {
      if self.promise_species_watchpoint_is_valid(host, promise)? {
        return Ok(self.intrinsics.promise());
      }
    }

    let constructor = host.get(self, this, PropertyKey::Constructor)?;
    if constructor == Value::Undefined {
      return Ok(self.intrinsics.promise());
    }
    if !constructor.is_object() {
      return Err(VmError::TypeError(
        "|this|.constructor is not an Object or undefined",
      ));
    }

    let species = host.get(self, constructor, PropertyKey::Species)?;
    if species.is_undefined_or_null() {
      return Ok(self.intrinsics.promise());
    }
    if self.is_constructor(host, species) {
      return Ok(species);
    }
    Err(VmError::TypeError(
      "|this|.constructor[Symbol.species] is not a constructor",
    ))
  }

  /// `NewPromiseCapability(constructor)`.
  ///
  /// Spec reference: <https://tc39.es/ecma262/#sec-newpromisecapability>
  pub fn new_promise_capability(
    &mut self,
    host: &mut dyn HostHooks,
    constructor: Value,
  ) -> Result<PromiseCapability, VmError> {
    if self.intrinsics.is_promise_constructor(constructor) {
      let flavor = if constructor == self.intrinsics.promise() {
        PromiseFlavor::Public
      } else {
        PromiseFlavor::Internal
      };
      let promise = self.new_promise(flavor);
      let (resolve, reject) = self.create_first_resolving_functions(promise);
      return Ok(PromiseCapability {
        promise: Value::Promise(promise),
        resolve,
        reject,
      });
    }

    let executor = self.alloc_function(BuiltinFunction::CapabilityExecutor {
      resolve: Value::Undefined,
      reject: Value::Undefined,
    });
    let promise = self.construct(host, constructor, &[Value::Function(executor)])?;

    let (resolve, reject) = self.capability_executor_slots(executor)?;
    if !self.is_callable(host, resolve) {
      return Err(VmError::TypeError("executor did not take a resolve function"));
    }
    if !self.is_callable(host, reject) {
      return Err(VmError::TypeError("executor did not take a reject function"));
    }

    Ok(PromiseCapability {
      promise,
      resolve,
      reject,
    })
  }

  /// `new Promise(executor)` for the intrinsic constructors.
  ///
  /// The executor runs synchronously with first-resolving functions; a catchable error thrown
  /// by it rejects the new promise.
  pub fn new_promise_with_executor(
    &mut self,
    host: &mut dyn HostHooks,
    flavor: PromiseFlavor,
    executor: Value,
  ) -> Result<PromiseHandle, VmError> {
    if !self.is_callable(host, executor) {
      return Err(VmError::TypeError("Promise executor is not a function"));
    }

    let promise = self.new_promise(flavor);
    let (resolve, reject) = self.create_first_resolving_functions(promise);
    if let Err(err) = self.call(host, executor, Value::Undefined, &[resolve, reject]) {
      self.reject_with_caught_exception(host, promise, err)?;
    }
    Ok(promise)
  }

  /// `PromiseResolve(%Promise%, value)`.
  pub fn resolved_promise(
    &mut self,
    host: &mut dyn HostHooks,
    value: Value,
  ) -> Result<PromiseHandle, VmError> {
    if let Value::Promise(promise) = value {
      if self.promise_flavor(promise)? == PromiseFlavor::Public {
        let constructor = host.get(self, value, PropertyKey::Constructor)?;
        if constructor == self.intrinsics.promise() {
          return Ok(promise);
        }
      }
    }

    let promise = self.new_promise(PromiseFlavor::Public);
    self.resolve(host, promise, value)?;
    Ok(promise)
  }

  /// A new public promise already rejected with `reason`.
  pub fn rejected_promise(
    &mut self,
    host: &mut dyn HostHooks,
    reason: Value,
  ) -> Result<PromiseHandle, VmError> {
    let promise = self.new_promise(PromiseFlavor::Public);
    self.reject(host, promise, reason)?;
    Ok(promise)
  }

  /// The resolution procedure for a bare handler pair: the outcome is delivered by calling
  /// `on_fulfilled(value, context)` or `on_rejected(reason, context)` from a microtask.
  pub fn resolve_without_promise(
    &mut self,
    host: &mut dyn HostHooks,
    resolution: Value,
    on_fulfilled: Value,
    on_rejected: Value,
    context: Value,
  ) -> Result<(), VmError> {
    if !resolution.is_object() {
      return self.fulfill_without_promise(resolution, on_fulfilled, context);
    }

    if let Value::Promise(promise) = resolution {
      if self.is_then_fast_and_non_observable(host, promise)? {
        return self.queue_microtask(Microtask::PromiseResolveThenableJobWithoutPromiseFast {
          promise,
          on_fulfilled,
          on_rejected,
          context,
        });
      }
    }

    let then = match host.get(self, resolution, PropertyKey::Then) {
      Ok(then) => then,
      Err(err) => {
        let error = err.into_thrown_value(host)?;
        return self.reject_without_promise(error, on_rejected, context);
      }
    };

    if !self.is_callable(host, then) {
      return self.fulfill_without_promise(resolution, on_fulfilled, context);
    }

    let (resolve, reject) =
      self.create_resolving_functions_without_promise(on_fulfilled, on_rejected, context);
    self.queue_microtask(Microtask::PromiseResolveThenableJob {
      thenable: resolution,
      then,
      resolve,
      reject,
    })
  }

  pub fn fulfill_without_promise(
    &mut self,
    value: Value,
    on_fulfilled: Value,
    context: Value,
  ) -> Result<(), VmError> {
    self.queue_microtask(Microtask::PromiseReactionJobWithoutPromise {
      handler: on_fulfilled,
      argument: value,
      context,
    })
  }

  pub fn reject_without_promise(
    &mut self,
    reason: Value,
    on_rejected: Value,
    context: Value,
  ) -> Result<(), VmError> {
    self.queue_microtask(Microtask::PromiseReactionJobWithoutPromise {
      handler: on_rejected,
      argument: reason,
      context,
    })
  }

  /// Schedules an `await` continuation on `value`.
  ///
  /// Each handler is called at most once. A promise whose constructor is intrinsic gets the
  /// handlers attached directly, skipping its `then` lookup.
  pub fn await_value(
    &mut self,
    host: &mut dyn HostHooks,
    value: Value,
    on_fulfilled: Value,
    on_rejected: Value,
    context: Value,
  ) -> Result<(), VmError> {
    if let Value::Promise(promise) = value {
      if self.promise_species_watchpoint_is_valid(host, promise)? {
        return self.perform_promise_then(
          host,
          promise,
          on_fulfilled,
          on_rejected,
          ReactionTarget::None,
          context,
        );
      }

      let constructor = match host.get(self, value, PropertyKey::Constructor) {
        Ok(constructor) => constructor,
        Err(err) => {
          let error = err.into_thrown_value(host)?;
          self.call(host, on_rejected, Value::Undefined, &[error, context])?;
          return Ok(());
        }
      };

      if self.intrinsics.is_promise_constructor(constructor) {
        return self.perform_promise_then(
          host,
          promise,
          on_fulfilled,
          on_rejected,
          ReactionTarget::None,
          context,
        );
      }
    }

    self.resolve_without_promise(host, value, on_fulfilled, on_rejected, context)
  }

  fn notify_rejection_tracker(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    operation: PromiseRejectionOperation,
  ) -> Result<(), VmError> {
    tracing::debug!(?promise, ?operation, "promise rejection tracker");
    host.promise_rejection_tracker(promise, operation)
  }
}
