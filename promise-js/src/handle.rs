use core::fmt;

/// A stable identifier for an allocation in one of the engine's slot arenas.
///
/// This is a packed `{ index: u32, generation: u32 }`.
/// - `index` selects a slot in the arena's slot vector.
/// - `generation` is incremented each time that slot is freed.
///
/// A `SlotId` is **only valid** if:
/// - `index` is in-bounds for the arena,
/// - the slot at `index` is occupied, and
/// - the slot's generation matches this handle's generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SlotId(pub(crate) u64);

impl SlotId {
  pub(crate) fn from_parts(index: u32, generation: u32) -> Self {
    Self((index as u64) | ((generation as u64) << 32))
  }

  /// The slot index within the arena.
  #[inline]
  pub fn index(self) -> u32 {
    self.0 as u32
  }

  /// The generation of the slot when this handle was created.
  #[inline]
  pub fn generation(self) -> u32 {
    (self.0 >> 32) as u32
  }
}

impl fmt::Debug for SlotId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SlotId")
      .field("index", &self.index())
      .field("generation", &self.generation())
      .finish()
  }
}

/// An engine-owned promise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct PromiseHandle(pub(crate) SlotId);

impl PromiseHandle {
  /// The underlying [`SlotId`].
  #[inline]
  pub fn id(self) -> SlotId {
    self.0
  }
}

/// An engine-owned built-in function (resolving functions, executors, intrinsics).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct FunctionHandle(pub(crate) SlotId);

impl FunctionHandle {
  /// The underlying [`SlotId`].
  #[inline]
  pub fn id(self) -> SlotId {
    self.0
  }
}

/// Opaque identifier for a host-owned object.
///
/// The engine never interprets this value: property access, calls and classification of host
/// objects are routed back to the embedding through [`HostHooks`](crate::HostHooks).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
  /// Create a new `ObjectHandle` from an opaque numeric value.
  #[inline]
  pub const fn from_raw(raw: u64) -> Self {
    Self(raw)
  }

  /// Returns the underlying opaque numeric representation.
  #[inline]
  pub const fn to_raw(self) -> u64 {
    self.0
  }
}

impl fmt::Debug for ObjectHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("ObjectHandle").field(&self.0).finish()
  }
}
