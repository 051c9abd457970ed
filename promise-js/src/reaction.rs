//! Promise reaction records.
//!
//! A reaction is created for every `then`-style registration on a pending promise. Registrations
//! are kept in a [`ReactionList`] owned by the promise until it settles, at which point the list
//! is moved out of the promise and converted into microtasks.

use crate::gc::{Trace, Tracer};
use crate::{PromiseHandle, Value};

/// An ECMAScript PromiseCapability Record.
///
/// Spec reference: <https://tc39.es/ecma262/#sec-promisecapability-records>
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromiseCapability {
  pub promise: Value,
  pub resolve: Value,
  pub reject: Value,
}

impl Trace for PromiseCapability {
  fn trace(&self, tracer: &mut Tracer) {
    tracer.trace_value(self.promise);
    tracer.trace_value(self.resolve);
    tracer.trace_value(self.reject);
  }
}

/// What a reaction settles once its handler has run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReactionTarget {
  /// Nothing: the handler is the continuation (e.g. `await`).
  None,
  /// An engine promise, settled through the internal settlement primitives.
  Promise(PromiseHandle),
  /// A promise created by a foreign constructor, settled through its resolve/reject callables.
  Capability(PromiseCapability),
}

impl ReactionTarget {
  #[inline]
  pub fn is_none(&self) -> bool {
    matches!(self, ReactionTarget::None)
  }
}

impl Trace for ReactionTarget {
  fn trace(&self, tracer: &mut Tracer) {
    match self {
      ReactionTarget::None => {}
      ReactionTarget::Promise(promise) => tracer.trace_value(Value::Promise(*promise)),
      ReactionTarget::Capability(capability) => capability.trace(tracer),
    }
  }
}

/// A single `then`-style registration.
///
/// An empty handler means "pass through": the target settles with the same status and value as
/// the source promise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromiseReaction {
  pub target: ReactionTarget,
  pub on_fulfilled: Option<Value>,
  pub on_rejected: Option<Value>,
  /// Threaded to the handler as its second argument unless `undefined`/`null`.
  pub context: Value,
}

impl Trace for PromiseReaction {
  fn trace(&self, tracer: &mut Tracer) {
    self.target.trace(tracer);
    if let Some(handler) = self.on_fulfilled {
      tracer.trace_value(handler);
    }
    if let Some(handler) = self.on_rejected {
      tracer.trace_value(handler);
    }
    tracer.trace_value(self.context);
  }
}

/// The reactions registered on a pending promise.
///
/// Records are appended and kept in registration order, so draining the list needs no reversal
/// for reactions to run first-registered-first-invoked.
#[derive(Debug, Default, Clone)]
pub struct ReactionList {
  records: Vec<PromiseReaction>,
}

impl ReactionList {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, reaction: PromiseReaction) {
    self.records.push(reaction);
  }

  /// The most recently registered reaction.
  pub fn latest(&self) -> Option<&PromiseReaction> {
    self.records.last()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Consumes the list, yielding reactions in registration order.
  pub fn into_registration_order(self) -> impl Iterator<Item = PromiseReaction> {
    self.records.into_iter()
  }
}

impl Trace for ReactionList {
  fn trace(&self, tracer: &mut Tracer) {
    for reaction in &self.records {
      reaction.trace(tracer);
    }
  }
}
