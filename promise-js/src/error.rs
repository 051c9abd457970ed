use crate::value::Value;
use crate::HostHooks;
use std::fmt::Display;

/// Errors produced by the promise engine and by host callbacks.
///
/// `Throw`, `TypeError`, `NotCallable` and `NotConstructable` are catchable: promise jobs convert
/// them into rejections via [`VmError::into_thrown_value`]. Every other variant is uncatchable and
/// propagates through every catch point in the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
  /// A handle was used after the underlying allocation was freed (or the handle is otherwise
  /// malformed).
  #[error("invalid handle")]
  InvalidHandle,

  /// The host could not accept more work (e.g. the microtask queue limit was reached).
  #[error("out of memory")]
  OutOfMemory,

  #[error("type error: {0}")]
  TypeError(&'static str),

  /// Attempted to call a non-callable value.
  #[error("value is not callable")]
  NotCallable,

  /// Attempted to construct a non-constructable value.
  #[error("value is not a constructor")]
  NotConstructable,

  /// A JavaScript `throw` value. This is catchable from JS.
  #[error("uncaught exception")]
  Throw(Value),

  /// A non-catchable termination condition (fuel exhausted, host interrupt, etc).
  #[error("{0}")]
  Termination(Termination),
}

impl VmError {
  /// Whether this error may be caught and turned into a rejection.
  pub fn is_catchable(&self) -> bool {
    matches!(
      self,
      VmError::Throw(_) | VmError::TypeError(_) | VmError::NotCallable | VmError::NotConstructable
    )
  }

  pub fn is_termination(&self) -> bool {
    matches!(self, VmError::Termination(_))
  }

  /// Converts a catchable error into the JavaScript value it carries.
  ///
  /// Engine-originated type errors are materialized through
  /// [`HostHooks::create_type_error`]. Uncatchable errors are handed back unchanged in `Err` so
  /// callers can keep propagating them with `?`.
  pub fn into_thrown_value(self, host: &mut dyn HostHooks) -> Result<Value, VmError> {
    match self {
      VmError::Throw(value) => Ok(value),
      VmError::TypeError(message) => Ok(host.create_type_error(message)),
      VmError::NotCallable => Ok(host.create_type_error("value is not a function")),
      VmError::NotConstructable => Ok(host.create_type_error("argument is not a constructor")),
      err => Err(err),
    }
  }
}

/// A non-catchable error that terminates execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
  pub reason: TerminationReason,
}

impl Termination {
  pub fn new(reason: TerminationReason) -> Self {
    Self { reason }
  }
}

impl Display for Termination {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{reason}", reason = self.reason)
  }
}

/// The reason execution terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
  /// The microtask budget was exhausted.
  OutOfFuel,
  /// The host set the interrupt flag.
  Interrupted,
  /// The host forced termination from inside a callback.
  Host,
}

impl Display for TerminationReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TerminationReason::OutOfFuel => f.write_str("execution terminated: out of fuel"),
      TerminationReason::Interrupted => f.write_str("execution terminated: interrupted"),
      TerminationReason::Host => f.write_str("execution terminated: by host"),
    }
  }
}
