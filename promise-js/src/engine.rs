use crate::budget::Budget;
use crate::budget::InterruptHandle;
use crate::function::BuiltinFunction;
use crate::gc::{Trace, Tracer};
use crate::heap::SlotArena;
use crate::microtask::Microtask;
use crate::microtask::MicrotaskKind;
use crate::microtask_queue::MicrotaskQueue;
use crate::promise::JsPromise;
use crate::promise::PromiseFlavor;
use crate::{FunctionHandle, HostHooks, PromiseHandle, Value, VmError};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Construction-time engine options.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
  /// Upper bound on the number of queued microtasks. Enqueueing beyond it fails with
  /// [`VmError::OutOfMemory`].
  pub max_queued_microtasks: Option<usize>,
  /// Number of microtasks that may be dispatched before dispatch terminates with
  /// [`TerminationReason::OutOfFuel`](crate::TerminationReason::OutOfFuel). `None` means unlimited.
  pub default_fuel: Option<u64>,
  /// Optional shared interrupt flag to observe for cooperative cancellation.
  ///
  /// If provided, the engine observes this flag instead of a private one so hosts can stop
  /// microtask dispatch by setting the flag to `true`.
  pub interrupt_flag: Option<Arc<AtomicBool>>,
}

/// Engine-owned built-in functions that hosts need to hand back to the engine, e.g. as the
/// result of a `then` or `constructor` lookup on a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intrinsics {
  promise: FunctionHandle,
  internal_promise: FunctionHandle,
  promise_prototype_then: FunctionHandle,
}

impl Intrinsics {
  /// `%Promise%`.
  pub fn promise(&self) -> Value {
    Value::Function(self.promise)
  }

  /// The constructor of [`PromiseFlavor::Internal`] promises.
  pub fn internal_promise(&self) -> Value {
    Value::Function(self.internal_promise)
  }

  /// `%Promise.prototype.then%`.
  pub fn promise_prototype_then(&self) -> Value {
    Value::Function(self.promise_prototype_then)
  }

  /// The intrinsic constructor for promises of `flavor`.
  pub fn promise_constructor(&self, flavor: PromiseFlavor) -> Value {
    match flavor {
      PromiseFlavor::Public => self.promise(),
      PromiseFlavor::Internal => self.internal_promise(),
    }
  }

  pub(crate) fn is_promise_constructor(&self, value: Value) -> bool {
    value == self.promise() || value == self.internal_promise()
  }
}

impl Trace for Intrinsics {
  fn trace(&self, tracer: &mut Tracer) {
    tracer.trace_value(self.promise());
    tracer.trace_value(self.internal_promise());
    tracer.trace_value(self.promise_prototype_then());
  }
}

/// The promise engine: promise records, built-in functions and the microtask queue of one agent.
#[derive(Debug)]
pub struct Engine {
  options: EngineOptions,
  pub(crate) promises: SlotArena<JsPromise>,
  pub(crate) functions: SlotArena<BuiltinFunction>,
  pub(crate) intrinsics: Intrinsics,
  pub(crate) microtasks: MicrotaskQueue,
  budget: Budget,
}

impl Engine {
  pub fn new(options: EngineOptions) -> Self {
    let budget = Budget::new(options.default_fuel, options.interrupt_flag.clone());
    let mut functions = SlotArena::default();
    let intrinsics = Intrinsics {
      promise: FunctionHandle(functions.alloc(BuiltinFunction::PromiseConstructor {
        flavor: PromiseFlavor::Public,
      })),
      internal_promise: FunctionHandle(functions.alloc(BuiltinFunction::PromiseConstructor {
        flavor: PromiseFlavor::Internal,
      })),
      promise_prototype_then: FunctionHandle(functions.alloc(BuiltinFunction::PromiseThen)),
    };

    Self {
      options,
      promises: SlotArena::default(),
      functions,
      intrinsics,
      microtasks: MicrotaskQueue::new(),
      budget,
    }
  }

  pub fn options(&self) -> &EngineOptions {
    &self.options
  }

  pub fn intrinsics(&self) -> Intrinsics {
    self.intrinsics
  }

  pub fn interrupt_handle(&self) -> InterruptHandle {
    self.budget.interrupt_handle()
  }

  /// Replaces the remaining microtask budget.
  pub fn set_fuel(&mut self, fuel: Option<u64>) {
    self.budget.set_fuel(fuel);
  }

  pub fn remaining_fuel(&self) -> Option<u64> {
    self.budget.fuel()
  }

  /// Charges one dispatch against the fuel counter and the interrupt flag.
  pub(crate) fn tick(&mut self) -> Result<(), VmError> {
    self.budget.tick()
  }

  /// Number of live (not yet collected) promises.
  pub fn live_promise_count(&self) -> usize {
    self.promises.len()
  }

  pub fn is_valid_promise(&self, promise: PromiseHandle) -> bool {
    self.promises.contains(promise.0)
  }

  pub(crate) fn promise_record(&self, promise: PromiseHandle) -> Result<&JsPromise, VmError> {
    self.promises.get(promise.0).ok_or(VmError::InvalidHandle)
  }

  pub(crate) fn promise_record_mut(
    &mut self,
    promise: PromiseHandle,
  ) -> Result<&mut JsPromise, VmError> {
    self.promises.get_mut(promise.0).ok_or(VmError::InvalidHandle)
  }

  pub(crate) fn alloc_function(&mut self, function: BuiltinFunction) -> FunctionHandle {
    FunctionHandle(self.functions.alloc(function))
  }

  pub(crate) fn function_record(
    &self,
    function: FunctionHandle,
  ) -> Result<&BuiltinFunction, VmError> {
    self.functions.get(function.0).ok_or(VmError::InvalidHandle)
  }

  pub(crate) fn function_record_mut(
    &mut self,
    function: FunctionHandle,
  ) -> Result<&mut BuiltinFunction, VmError> {
    self.functions.get_mut(function.0).ok_or(VmError::InvalidHandle)
  }

  /// `IsCallable(value)`.
  pub fn is_callable(&self, host: &dyn HostHooks, value: Value) -> bool {
    match value {
      Value::Function(function) => self.functions.contains(function.0),
      Value::Object(object) => host.is_callable(object),
      _ => false,
    }
  }

  /// `IsConstructor(value)`.
  pub fn is_constructor(&self, host: &dyn HostHooks, value: Value) -> bool {
    match value {
      Value::Function(function) => matches!(
        self.functions.get(function.0),
        Some(BuiltinFunction::PromiseConstructor { .. })
      ),
      Value::Object(object) => host.is_constructor(object),
      _ => false,
    }
  }

  /// `Call(callee, this, arguments)`.
  pub fn call(
    &mut self,
    host: &mut dyn HostHooks,
    callee: Value,
    this: Value,
    arguments: &[Value],
  ) -> Result<Value, VmError> {
    match callee {
      Value::Function(function) => self.call_builtin(host, function, this, arguments),
      Value::Object(object) if host.is_callable(object) => host.call(self, object, this, arguments),
      _ => Err(VmError::NotCallable),
    }
  }

  /// `Construct(constructor, arguments)`.
  pub fn construct(
    &mut self,
    host: &mut dyn HostHooks,
    constructor: Value,
    arguments: &[Value],
  ) -> Result<Value, VmError> {
    match constructor {
      Value::Function(function) => self.construct_builtin(host, function, arguments),
      Value::Object(object) if host.is_constructor(object) => {
        host.construct(self, object, arguments)
      }
      _ => Err(VmError::NotConstructable),
    }
  }

  /// Appends `task` to the tail of the microtask queue.
  ///
  /// # Panics
  ///
  /// Panics if `task` is [`Microtask::Opaque`]; that kind is reserved and never scheduled.
  pub fn queue_microtask(&mut self, task: Microtask) -> Result<(), VmError> {
    assert!(
      task.kind() != MicrotaskKind::Opaque,
      "the opaque microtask kind cannot be scheduled"
    );
    if let Some(limit) = self.options.max_queued_microtasks {
      if self.microtasks.len() >= limit {
        return Err(VmError::OutOfMemory);
      }
    }
    tracing::trace!(kind = ?task.kind(), "enqueue microtask");
    self.microtasks.enqueue(task);
    Ok(())
  }

  /// Schedules a call of `function` with no arguments (`queueMicrotask`).
  pub fn enqueue_function_job(&mut self, function: Value) -> Result<(), VmError> {
    self.queue_microtask(Microtask::InvokeFunctionJob { function })
  }
}
