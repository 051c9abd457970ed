//! Index-addressed slot storage for engine-owned records.
//!
//! Records never move to a different index once allocated, so [`SlotId`] handles stay stable
//! across `Vec` reallocations. Freeing a slot bumps its generation, which turns every outstanding
//! handle to it into a stale handle that lookups reject.

use crate::handle::SlotId;

#[derive(Debug)]
struct Slot<T> {
  generation: u32,
  value: Option<T>,
}

impl<T> Slot<T> {
  fn new() -> Self {
    Self {
      generation: 0,
      value: None,
    }
  }
}

#[derive(Debug)]
pub(crate) struct SlotArena<T> {
  slots: Vec<Slot<T>>,
  free_list: Vec<u32>,
  live: usize,
}

impl<T> Default for SlotArena<T> {
  fn default() -> Self {
    Self {
      slots: Vec::new(),
      free_list: Vec::new(),
      live: 0,
    }
  }
}

impl<T> SlotArena<T> {
  pub(crate) fn alloc(&mut self, value: T) -> SlotId {
    let idx = match self.free_list.pop() {
      Some(idx) => idx as usize,
      None => {
        let idx = self.slots.len();
        self.slots.push(Slot::new());
        idx
      }
    };

    let slot = &mut self.slots[idx];
    debug_assert!(slot.value.is_none(), "free list returned an occupied slot");
    slot.value = Some(value);
    self.live += 1;

    SlotId::from_parts(idx as u32, slot.generation)
  }

  fn validate(&self, id: SlotId) -> Option<usize> {
    let idx = id.index() as usize;
    let slot = self.slots.get(idx)?;
    if slot.generation != id.generation() {
      return None;
    }
    if slot.value.is_none() {
      return None;
    }
    Some(idx)
  }

  pub(crate) fn get(&self, id: SlotId) -> Option<&T> {
    let idx = self.validate(id)?;
    self.slots[idx].value.as_ref()
  }

  pub(crate) fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
    let idx = self.validate(id)?;
    self.slots[idx].value.as_mut()
  }

  pub(crate) fn contains(&self, id: SlotId) -> bool {
    self.validate(id).is_some()
  }

  pub(crate) fn len(&self) -> usize {
    self.live
  }

  /// Frees every occupied slot for which `keep` returns `false`. Returns the number of freed
  /// slots.
  pub(crate) fn retain(&mut self, mut keep: impl FnMut(SlotId) -> bool) -> usize {
    let mut freed = 0;
    for (idx, slot) in self.slots.iter_mut().enumerate() {
      if slot.value.is_none() {
        continue;
      }
      if keep(SlotId::from_parts(idx as u32, slot.generation)) {
        continue;
      }

      slot.value = None;
      slot.generation = slot.generation.wrapping_add(1);
      self.free_list.push(idx as u32);
      freed += 1;
    }
    self.live -= freed;
    freed
  }
}

#[cfg(test)]
mod tests {
  use super::SlotArena;

  #[test]
  fn freed_slots_are_reused_with_a_new_generation() {
    let mut arena = SlotArena::default();
    let a = arena.alloc("a");
    let b = arena.alloc("b");
    assert_eq!(arena.len(), 2);

    let freed = arena.retain(|id| id == b);
    assert_eq!(freed, 1);
    assert!(arena.get(a).is_none());
    assert_eq!(arena.get(b), Some(&"b"));

    let c = arena.alloc("c");
    assert_eq!(c.index(), a.index());
    assert_ne!(c.generation(), a.generation());
    assert!(!arena.contains(a));
    assert_eq!(arena.get(c), Some(&"c"));
    assert_eq!(arena.len(), 2);
  }
}
