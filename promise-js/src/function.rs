//! Engine-owned built-in functions.
//!
//! These are the callables the promise algorithms hand to user code (resolving functions,
//! capability executors) plus the intrinsics a host exposes through property lookups. They are
//! stored in the engine's function arena and referenced from [`Value::Function`].

use crate::gc::{Trace, Tracer};
use crate::promise::PromiseFlavor;
use crate::{Engine, FunctionHandle, HostHooks, PromiseHandle, Value, VmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolvingKind {
  Resolve,
  Reject,
}

#[derive(Debug, Clone)]
pub(crate) enum BuiltinFunction {
  /// `%Promise%` or the internal promise constructor.
  PromiseConstructor { flavor: PromiseFlavor },
  /// `%Promise.prototype.then%`.
  PromiseThen,
  /// One half of a one-shot pair created by `CreateResolvingFunctions`. `other` is cleared on
  /// both halves by the first call.
  Resolving {
    kind: ResolvingKind,
    promise: PromiseHandle,
    other: Option<FunctionHandle>,
  },
  /// Forwards to the promise's public, latched resolve/reject.
  FirstResolving {
    kind: ResolvingKind,
    promise: PromiseHandle,
  },
  /// One half of a one-shot pair that settles a bare handler pair instead of a promise.
  ResolvingWithoutPromise {
    kind: ResolvingKind,
    other: Option<FunctionHandle>,
    on_fulfilled: Value,
    on_rejected: Value,
    context: Value,
  },
  /// `GetCapabilitiesExecutor` closure: records the resolve/reject it is called with.
  CapabilityExecutor { resolve: Value, reject: Value },
}

impl Trace for BuiltinFunction {
  fn trace(&self, tracer: &mut Tracer) {
    match self {
      BuiltinFunction::PromiseConstructor { .. } | BuiltinFunction::PromiseThen => {}
      BuiltinFunction::Resolving { promise, other, .. } => {
        tracer.trace_value(Value::Promise(*promise));
        if let Some(other) = other {
          tracer.trace_value(Value::Function(*other));
        }
      }
      BuiltinFunction::FirstResolving { promise, .. } => {
        tracer.trace_value(Value::Promise(*promise));
      }
      BuiltinFunction::ResolvingWithoutPromise {
        other,
        on_fulfilled,
        on_rejected,
        context,
        ..
      } => {
        if let Some(other) = other {
          tracer.trace_value(Value::Function(*other));
        }
        tracer.trace_value(*on_fulfilled);
        tracer.trace_value(*on_rejected);
        tracer.trace_value(*context);
      }
      BuiltinFunction::CapabilityExecutor { resolve, reject } => {
        tracer.trace_value(*resolve);
        tracer.trace_value(*reject);
      }
    }
  }
}

impl Engine {
  /// `CreateResolvingFunctions(promise)`: a one-shot resolve/reject pair bound to `promise`.
  ///
  /// The first call to either function disarms both; the call settles `promise` through the
  /// internal (non-latched) settlement primitives.
  pub fn create_resolving_functions(&mut self, promise: PromiseHandle) -> (Value, Value) {
    let resolve = self.alloc_function(BuiltinFunction::Resolving {
      kind: ResolvingKind::Resolve,
      promise,
      other: None,
    });
    let reject = self.alloc_function(BuiltinFunction::Resolving {
      kind: ResolvingKind::Reject,
      promise,
      other: Some(resolve),
    });
    if let Some(BuiltinFunction::Resolving { other, .. }) = self.functions.get_mut(resolve.0) {
      *other = Some(reject);
    }
    (Value::Function(resolve), Value::Function(reject))
  }

  /// A resolve/reject pair forwarding to `promise`'s public [`Engine::resolve`] /
  /// [`Engine::reject`].
  pub fn create_first_resolving_functions(&mut self, promise: PromiseHandle) -> (Value, Value) {
    let resolve = self.alloc_function(BuiltinFunction::FirstResolving {
      kind: ResolvingKind::Resolve,
      promise,
    });
    let reject = self.alloc_function(BuiltinFunction::FirstResolving {
      kind: ResolvingKind::Reject,
      promise,
    });
    (Value::Function(resolve), Value::Function(reject))
  }

  /// A one-shot pair that feeds [`Engine::resolve_without_promise`] /
  /// [`Engine::reject_without_promise`] with the captured handlers.
  pub fn create_resolving_functions_without_promise(
    &mut self,
    on_fulfilled: Value,
    on_rejected: Value,
    context: Value,
  ) -> (Value, Value) {
    let resolve = self.alloc_function(BuiltinFunction::ResolvingWithoutPromise {
      kind: ResolvingKind::Resolve,
      other: None,
      on_fulfilled,
      on_rejected,
      context,
    });
    let reject = self.alloc_function(BuiltinFunction::ResolvingWithoutPromise {
      kind: ResolvingKind::Reject,
      other: Some(resolve),
      on_fulfilled,
      on_rejected,
      context,
    });
    if let Some(BuiltinFunction::ResolvingWithoutPromise { other, .. }) =
      self.functions.get_mut(resolve.0)
    {
      *other = Some(reject);
    }
    (Value::Function(resolve), Value::Function(reject))
  }

  /// Disarms a one-shot resolving pair. Returns `false` if the pair was already used.
  fn disarm_resolving_pair(&mut self, function: FunctionHandle) -> Result<bool, VmError> {
    let other = match self.function_record_mut(function)? {
      BuiltinFunction::Resolving { other, .. }
      | BuiltinFunction::ResolvingWithoutPromise { other, .. } => other.take(),
      _ => return Ok(true),
    };
    let Some(other) = other else {
      return Ok(false);
    };
    if let Some(
      BuiltinFunction::Resolving { other, .. } | BuiltinFunction::ResolvingWithoutPromise { other, .. },
    ) = self.functions.get_mut(other.0)
    {
      *other = None;
    }
    Ok(true)
  }

  pub(crate) fn call_builtin(
    &mut self,
    host: &mut dyn HostHooks,
    function: FunctionHandle,
    this: Value,
    arguments: &[Value],
  ) -> Result<Value, VmError> {
    let argument = |idx: usize| arguments.get(idx).copied().unwrap_or(Value::Undefined);

    match self.function_record(function)?.clone() {
      BuiltinFunction::PromiseConstructor { .. } => Err(VmError::TypeError(
        "Promise constructor cannot be invoked without 'new'",
      )),
      BuiltinFunction::PromiseThen => {
        let Value::Promise(promise) = this else {
          return Err(VmError::TypeError("|this| is not a Promise"));
        };
        self.then(host, promise, argument(0), argument(1))
      }
      BuiltinFunction::Resolving { kind, promise, .. } => {
        if !self.disarm_resolving_pair(function)? {
          return Ok(Value::Undefined);
        }
        match kind {
          ResolvingKind::Resolve => self.resolve_promise(host, promise, argument(0))?,
          ResolvingKind::Reject => self.reject_promise(host, promise, argument(0))?,
        }
        Ok(Value::Undefined)
      }
      BuiltinFunction::FirstResolving { kind, promise } => {
        match kind {
          ResolvingKind::Resolve => self.resolve(host, promise, argument(0))?,
          ResolvingKind::Reject => self.reject(host, promise, argument(0))?,
        }
        Ok(Value::Undefined)
      }
      BuiltinFunction::ResolvingWithoutPromise {
        kind,
        on_fulfilled,
        on_rejected,
        context,
        ..
      } => {
        if !self.disarm_resolving_pair(function)? {
          return Ok(Value::Undefined);
        }
        match kind {
          ResolvingKind::Resolve => {
            self.resolve_without_promise(host, argument(0), on_fulfilled, on_rejected, context)?
          }
          ResolvingKind::Reject => self.reject_without_promise(argument(0), on_rejected, context)?,
        }
        Ok(Value::Undefined)
      }
      BuiltinFunction::CapabilityExecutor { resolve, reject } => {
        if resolve != Value::Undefined {
          return Err(VmError::TypeError("resolve function is already set"));
        }
        if reject != Value::Undefined {
          return Err(VmError::TypeError("reject function is already set"));
        }
        if let BuiltinFunction::CapabilityExecutor { resolve, reject } =
          self.function_record_mut(function)?
        {
          *resolve = argument(0);
          *reject = argument(1);
        }
        Ok(Value::Undefined)
      }
    }
  }

  pub(crate) fn construct_builtin(
    &mut self,
    host: &mut dyn HostHooks,
    function: FunctionHandle,
    arguments: &[Value],
  ) -> Result<Value, VmError> {
    match self.function_record(function)? {
      BuiltinFunction::PromiseConstructor { flavor } => {
        let flavor = *flavor;
        let executor = arguments.first().copied().unwrap_or(Value::Undefined);
        let promise = self.new_promise_with_executor(host, flavor, executor)?;
        Ok(Value::Promise(promise))
      }
      _ => Err(VmError::NotConstructable),
    }
  }

  /// Reads back the resolve/reject captured by a capability executor.
  pub(crate) fn capability_executor_slots(
    &self,
    executor: FunctionHandle,
  ) -> Result<(Value, Value), VmError> {
    match self.function_record(executor)? {
      BuiltinFunction::CapabilityExecutor { resolve, reject } => Ok((*resolve, *reject)),
      _ => Err(VmError::InvalidHandle),
    }
  }
}
