//! Lifetime visitation for engine-owned records.
//!
//! The engine does not own a general-purpose heap; it only owns promises and built-in functions.
//! [`Engine::collect_garbage`] marks everything reachable from host-provided roots, the
//! intrinsics, and the queued and running microtasks. It asks the host to trace through its own
//! objects and frees the rest.

use crate::{Engine, FunctionHandle, HostHooks, ObjectHandle, PromiseHandle, Value};
use ahash::AHashSet;

pub(crate) trait Trace {
  fn trace(&self, tracer: &mut Tracer);
}

/// Mark state for one collection.
///
/// Hosts receive a `Tracer` in [`HostHooks::trace_object`] and report the values their objects
/// hold with [`Tracer::trace_value`].
#[derive(Debug, Default)]
pub struct Tracer {
  promises: AHashSet<PromiseHandle>,
  functions: AHashSet<FunctionHandle>,
  objects: AHashSet<ObjectHandle>,
  worklist: Vec<Value>,
}

impl Tracer {
  fn new() -> Self {
    Self::default()
  }

  /// Marks `value` as reachable.
  pub fn trace_value(&mut self, value: Value) {
    let newly_marked = match value {
      Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) => false,
      Value::Promise(promise) => self.promises.insert(promise),
      Value::Function(function) => self.functions.insert(function),
      Value::Object(object) => self.objects.insert(object),
    };
    if newly_marked {
      self.worklist.push(value);
    }
  }

  fn pop_work(&mut self) -> Option<Value> {
    self.worklist.pop()
  }
}

impl Engine {
  /// Frees every promise and built-in function not reachable from `roots`, the intrinsics or a
  /// queued microtask. Returns the number of freed records.
  ///
  /// Handles to freed records become stale: later use fails with
  /// [`VmError::InvalidHandle`](crate::VmError::InvalidHandle).
  pub fn collect_garbage(&mut self, host: &dyn HostHooks, roots: &[Value]) -> usize {
    let mut tracer = Tracer::new();
    self.intrinsics.trace(&mut tracer);
    for root in roots {
      tracer.trace_value(*root);
    }
    self.microtasks.trace(&mut tracer);

    while let Some(value) = tracer.pop_work() {
      match value {
        Value::Promise(promise) => {
          if let Some(record) = self.promises.get(promise.0) {
            record.trace(&mut tracer);
          }
        }
        Value::Function(function) => {
          if let Some(record) = self.functions.get(function.0) {
            record.trace(&mut tracer);
          }
        }
        Value::Object(object) => host.trace_object(object, &mut tracer),
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) => {}
      }
    }

    let freed_promises = self
      .promises
      .retain(|id| tracer.promises.contains(&PromiseHandle(id)));
    let freed_functions = self
      .functions
      .retain(|id| tracer.functions.contains(&FunctionHandle(id)));
    tracing::debug!(freed_promises, freed_functions, "collected garbage");
    freed_promises + freed_functions
  }
}
