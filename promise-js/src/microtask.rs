//! Promise jobs and their dispatcher.
//!
//! Every job the engine schedules is a [`Microtask`]: a closed set of kinds, each carrying at most
//! [`MAX_MICROTASK_ARGUMENTS`] values. [`Engine::run_microtask`] executes one job to completion.
//!
//! Catchable errors thrown by user callables inside a job are converted into a rejection of the
//! job's own target. Uncatchable errors ([`VmError::Termination`], [`VmError::OutOfMemory`],
//! [`VmError::InvalidHandle`]) abort the job and are returned to the caller.

use crate::gc::{Trace, Tracer};
use crate::microtask_queue::RunningMicrotask;
use crate::promise::PromiseStatus;
use crate::reaction::{PromiseReaction, ReactionTarget};
use crate::{Engine, HostHooks, PromiseHandle, Value, VmError};

/// Upper bound on the number of values a job carries.
pub const MAX_MICROTASK_ARGUMENTS: usize = 4;

/// The kind tag of a [`Microtask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicrotaskKind {
  PromiseResolveThenableJobFast,
  PromiseResolveThenableJobWithoutPromiseFast,
  PromiseResolveThenableJob,
  PromiseResolveWithoutHandlerJob,
  PromiseReactionJob,
  PromiseReactionJobWithoutPromise,
  InvokeFunctionJob,
  Opaque,
}

/// A queued unit of work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Microtask {
  /// Adopts the state of an unmodified engine promise without calling its `then`.
  PromiseResolveThenableJobFast {
    promise: PromiseHandle,
    promise_to_resolve: PromiseHandle,
  },
  /// Like [`Microtask::PromiseResolveThenableJobFast`], delivering to a bare handler pair.
  PromiseResolveThenableJobWithoutPromiseFast {
    promise: PromiseHandle,
    on_fulfilled: Value,
    on_rejected: Value,
    context: Value,
  },
  /// `NewPromiseResolveThenableJob`: calls `then.call(thenable, resolve, reject)`.
  PromiseResolveThenableJob {
    thenable: Value,
    then: Value,
    resolve: Value,
    reject: Value,
  },
  /// Settles `target` with `resolution` according to `status`. Scheduled for pass-through
  /// reactions.
  PromiseResolveWithoutHandlerJob {
    target: ReactionTarget,
    resolution: Value,
    status: PromiseStatus,
  },
  /// `NewPromiseReactionJob`.
  PromiseReactionJob {
    target: ReactionTarget,
    handler: Value,
    argument: Value,
    context: Value,
  },
  /// Calls `handler` with no derived promise to settle.
  PromiseReactionJobWithoutPromise {
    handler: Value,
    argument: Value,
    context: Value,
  },
  /// Calls `function` with no arguments.
  InvokeFunctionJob { function: Value },
  /// Reserved. Never scheduled.
  Opaque,
}

impl Microtask {
  pub fn kind(&self) -> MicrotaskKind {
    match self {
      Microtask::PromiseResolveThenableJobFast { .. } => MicrotaskKind::PromiseResolveThenableJobFast,
      Microtask::PromiseResolveThenableJobWithoutPromiseFast { .. } => {
        MicrotaskKind::PromiseResolveThenableJobWithoutPromiseFast
      }
      Microtask::PromiseResolveThenableJob { .. } => MicrotaskKind::PromiseResolveThenableJob,
      Microtask::PromiseResolveWithoutHandlerJob { .. } => {
        MicrotaskKind::PromiseResolveWithoutHandlerJob
      }
      Microtask::PromiseReactionJob { .. } => MicrotaskKind::PromiseReactionJob,
      Microtask::PromiseReactionJobWithoutPromise { .. } => {
        MicrotaskKind::PromiseReactionJobWithoutPromise
      }
      Microtask::InvokeFunctionJob { .. } => MicrotaskKind::InvokeFunctionJob,
      Microtask::Opaque => MicrotaskKind::Opaque,
    }
  }
}

impl Trace for Microtask {
  fn trace(&self, tracer: &mut Tracer) {
    match self {
      Microtask::PromiseResolveThenableJobFast {
        promise,
        promise_to_resolve,
      } => {
        tracer.trace_value(Value::Promise(*promise));
        tracer.trace_value(Value::Promise(*promise_to_resolve));
      }
      Microtask::PromiseResolveThenableJobWithoutPromiseFast {
        promise,
        on_fulfilled,
        on_rejected,
        context,
      } => {
        tracer.trace_value(Value::Promise(*promise));
        tracer.trace_value(*on_fulfilled);
        tracer.trace_value(*on_rejected);
        tracer.trace_value(*context);
      }
      Microtask::PromiseResolveThenableJob {
        thenable,
        then,
        resolve,
        reject,
      } => {
        tracer.trace_value(*thenable);
        tracer.trace_value(*then);
        tracer.trace_value(*resolve);
        tracer.trace_value(*reject);
      }
      Microtask::PromiseResolveWithoutHandlerJob {
        target, resolution, ..
      } => {
        target.trace(tracer);
        tracer.trace_value(*resolution);
      }
      Microtask::PromiseReactionJob {
        target,
        handler,
        argument,
        context,
      } => {
        target.trace(tracer);
        tracer.trace_value(*handler);
        tracer.trace_value(*argument);
        tracer.trace_value(*context);
      }
      Microtask::PromiseReactionJobWithoutPromise {
        handler,
        argument,
        context,
      } => {
        tracer.trace_value(*handler);
        tracer.trace_value(*argument);
        tracer.trace_value(*context);
      }
      Microtask::InvokeFunctionJob { function } => tracer.trace_value(*function),
      Microtask::Opaque => {}
    }
  }
}

impl Engine {
  /// Runs one job to completion.
  ///
  /// # Panics
  ///
  /// Panics on [`Microtask::Opaque`], on a [`Microtask::PromiseResolveWithoutHandlerJob`] carrying
  /// [`PromiseStatus::Pending`], and on a [`Microtask::PromiseReactionJob`] without a target.
  pub fn run_microtask(
    &mut self,
    host: &mut dyn HostHooks,
    task: Microtask,
  ) -> Result<(), VmError> {
    tracing::trace!(kind = ?task.kind(), "run microtask");
    // Keeps the job's values reachable while it runs.
    let mut running = RunningMicrotask::enter(self, task);
    running.execute_microtask(host, task)
  }

  fn execute_microtask(&mut self, host: &mut dyn HostHooks, task: Microtask) -> Result<(), VmError> {
    match task {
      Microtask::PromiseResolveThenableJobFast {
        promise,
        promise_to_resolve,
      } => {
        if !self.promise_species_watchpoint_is_valid(host, promise)? {
          return self.promise_resolve_thenable_job_fast_slow(
            host,
            promise,
            SlowTarget::Promise(promise_to_resolve),
          );
        }
        self.add_reaction(
          host,
          promise,
          PromiseReaction {
            target: ReactionTarget::Promise(promise_to_resolve),
            on_fulfilled: None,
            on_rejected: None,
            context: Value::Undefined,
          },
        )
      }

      Microtask::PromiseResolveThenableJobWithoutPromiseFast {
        promise,
        on_fulfilled,
        on_rejected,
        context,
      } => {
        if !self.promise_species_watchpoint_is_valid(host, promise)? {
          return self.promise_resolve_thenable_job_fast_slow(
            host,
            promise,
            SlowTarget::Handlers {
              on_fulfilled,
              on_rejected,
              context,
            },
          );
        }
        self.add_reaction(
          host,
          promise,
          PromiseReaction {
            target: ReactionTarget::None,
            on_fulfilled: Some(on_fulfilled),
            on_rejected: Some(on_rejected),
            context,
          },
        )
      }

      Microtask::PromiseResolveThenableJob {
        thenable,
        then,
        resolve,
        reject,
      } => {
        let Err(err) = self.call(host, then, thenable, &[resolve, reject]) else {
          return Ok(());
        };
        let error = err.into_thrown_value(host)?;
        self.call(host, reject, Value::Undefined, &[error])?;
        Ok(())
      }

      Microtask::PromiseResolveWithoutHandlerJob {
        target,
        resolution,
        status,
      } => match status {
        PromiseStatus::Pending => {
          panic!("PromiseResolveWithoutHandlerJob dispatched with a pending status")
        }
        PromiseStatus::Fulfilled => self.resolve_target(host, target, resolution),
        PromiseStatus::Rejected => match target {
          // No handler and nothing to settle: the rejection escapes the job.
          ReactionTarget::None => Err(VmError::Throw(resolution)),
          target => self.reject_target(host, target, resolution),
        },
      },

      Microtask::PromiseReactionJob {
        target,
        handler,
        argument,
        context,
      } => {
        assert!(!target.is_none(), "PromiseReactionJob dispatched without a target");
        match self.call_handler(host, handler, argument, context) {
          Ok(result) => self.resolve_target(host, target, result),
          Err(err) => {
            let error = err.into_thrown_value(host)?;
            self.reject_target(host, target, error)
          }
        }
      }

      Microtask::PromiseReactionJobWithoutPromise {
        handler,
        argument,
        context,
      } => {
        self.call_handler(host, handler, argument, context)?;
        Ok(())
      }

      Microtask::InvokeFunctionJob { function } => {
        self.call(host, function, Value::Undefined, &[])?;
        Ok(())
      }

      Microtask::Opaque => unreachable!("the opaque microtask kind is never dispatched"),
    }
  }

  /// Calls a reaction handler with `(argument)` or `(argument, context)`.
  fn call_handler(
    &mut self,
    host: &mut dyn HostHooks,
    handler: Value,
    argument: Value,
    context: Value,
  ) -> Result<Value, VmError> {
    if context.is_undefined_or_null() {
      self.call(host, handler, Value::Undefined, &[argument])
    } else {
      self.call(host, handler, Value::Undefined, &[argument, context])
    }
  }

  fn resolve_target(
    &mut self,
    host: &mut dyn HostHooks,
    target: ReactionTarget,
    value: Value,
  ) -> Result<(), VmError> {
    match target {
      ReactionTarget::None => Ok(()),
      ReactionTarget::Promise(promise) => self.resolve_promise(host, promise, value),
      ReactionTarget::Capability(capability) => {
        self.call(host, capability.resolve, Value::Undefined, &[value])?;
        Ok(())
      }
    }
  }

  fn reject_target(
    &mut self,
    host: &mut dyn HostHooks,
    target: ReactionTarget,
    reason: Value,
  ) -> Result<(), VmError> {
    match target {
      ReactionTarget::None => Ok(()),
      ReactionTarget::Promise(promise) => self.reject_promise(host, promise, reason),
      ReactionTarget::Capability(capability) => {
        self.call(host, capability.reject, Value::Undefined, &[reason])?;
        Ok(())
      }
    }
  }

  /// Fast thenable job after the species guard was invalidated: honors the species constructor
  /// of `promise` and attaches resolving functions through a plain `PerformPromiseThen`.
  fn promise_resolve_thenable_job_fast_slow(
    &mut self,
    host: &mut dyn HostHooks,
    promise: PromiseHandle,
    target: SlowTarget,
  ) -> Result<(), VmError> {
    let constructor = self.promise_species_constructor(host, Value::Promise(promise))?;

    let (resolve, reject) = match target {
      SlowTarget::Promise(promise_to_resolve) => self.create_resolving_functions(promise_to_resolve),
      SlowTarget::Handlers {
        on_fulfilled,
        on_rejected,
        context,
      } => self.create_resolving_functions_without_promise(on_fulfilled, on_rejected, context),
    };

    match self.new_promise_capability(host, constructor) {
      Ok(capability) => self.perform_promise_then(
        host,
        promise,
        resolve,
        reject,
        ReactionTarget::Capability(capability),
        Value::Undefined,
      ),
      Err(err) => {
        let error = err.into_thrown_value(host)?;
        self.call(host, reject, Value::Undefined, &[error])?;
        Ok(())
      }
    }
  }
}

/// Where the slow path of a fast thenable job delivers the outcome.
#[derive(Debug, Clone, Copy)]
enum SlowTarget {
  Promise(PromiseHandle),
  Handlers {
    on_fulfilled: Value,
    on_rejected: Value,
    context: Value,
  },
}
