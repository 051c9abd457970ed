use crate::{FunctionHandle, ObjectHandle, PromiseHandle};

/// A JavaScript value as seen by the promise engine.
///
/// Primitives are carried inline. Promises and built-in functions are engine-owned and referenced
/// by generation-checked handles; every other object lives in the host and is referenced by an
/// opaque [`ObjectHandle`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
  /// The JavaScript `undefined` value.
  Undefined,
  /// The JavaScript `null` value.
  Null,
  /// A JavaScript boolean.
  Bool(bool),
  /// A JavaScript number (IEEE-754 double).
  Number(f64),
  /// A host-owned object.
  Object(ObjectHandle),
  /// An engine-owned promise object.
  Promise(PromiseHandle),
  /// An engine-owned built-in function object.
  Function(FunctionHandle),
}

impl Value {
  /// Whether this value is an object (as opposed to a primitive).
  #[inline]
  pub fn is_object(self) -> bool {
    matches!(
      self,
      Value::Object(_) | Value::Promise(_) | Value::Function(_)
    )
  }

  #[inline]
  pub fn is_undefined_or_null(self) -> bool {
    matches!(self, Value::Undefined | Value::Null)
  }

  #[inline]
  pub fn as_promise(self) -> Option<PromiseHandle> {
    match self {
      Value::Promise(promise) => Some(promise),
      _ => None,
    }
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Self::Bool(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Self::Number(value)
  }
}

impl From<ObjectHandle> for Value {
  fn from(value: ObjectHandle) -> Self {
    Self::Object(value)
  }
}

impl From<PromiseHandle> for Value {
  fn from(value: PromiseHandle) -> Self {
    Self::Promise(value)
  }
}

impl From<FunctionHandle> for Value {
  fn from(value: FunctionHandle) -> Self {
    Self::Function(value)
  }
}
