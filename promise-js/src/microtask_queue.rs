//! The engine's microtask queue and the checkpoint runner.
//!
//! - FIFO job ordering
//! - "perform a microtask checkpoint" semantics (drain until empty, including jobs enqueued while
//!   running)
//! - a nested checkpoint request while one is running is a no-op, as in HTML
//! - a job stays traced while it runs, after it has left the queue

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use crate::gc::{Trace, Tracer};
use crate::microtask::{Microtask, MicrotaskKind};
use crate::{Engine, HostHooks, VmError};

/// A FIFO microtask queue.
///
/// Jobs are appended by the engine through [`Engine::queue_microtask`] and consumed exactly once by
/// [`Engine::run_next_microtask`] or [`Engine::perform_microtask_checkpoint`].
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
  queue: VecDeque<Microtask>,
  /// Jobs that have been dequeued and not yet finished, innermost last.
  running: Vec<Microtask>,
  performing_microtask_checkpoint: bool,
}

impl MicrotaskQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn enqueue(&mut self, job: Microtask) {
    self.queue.push_back(job);
  }

  fn pop_front(&mut self) -> Option<Microtask> {
    self.queue.pop_front()
  }

  /// Returns whether the queue is empty.
  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }

  /// Returns the number of queued microtasks.
  pub fn len(&self) -> usize {
    self.queue.len()
  }

  /// Kinds of the queued jobs, head first.
  pub fn kinds(&self) -> impl Iterator<Item = MicrotaskKind> + '_ {
    self.queue.iter().map(Microtask::kind)
  }

  pub fn is_performing_microtask_checkpoint(&self) -> bool {
    self.performing_microtask_checkpoint
  }

  /// Whether a job is currently being dispatched.
  pub fn is_running_microtask(&self) -> bool {
    !self.running.is_empty()
  }

  /// Marks the start of a checkpoint. Returns `false` if one is already running.
  fn begin_checkpoint(&mut self) -> bool {
    if self.performing_microtask_checkpoint {
      return false;
    }
    self.performing_microtask_checkpoint = true;
    true
  }

  fn end_checkpoint(&mut self) {
    self.performing_microtask_checkpoint = false;
  }
}

impl Trace for MicrotaskQueue {
  fn trace(&self, tracer: &mut Tracer) {
    for job in self.queue.iter().chain(&self.running) {
      job.trace(tracer);
    }
  }
}

/// Keeps a dispatched job on the running stack until it returns or unwinds.
pub(crate) struct RunningMicrotask<'a> {
  engine: &'a mut Engine,
  running_len_at_entry: usize,
}

impl<'a> RunningMicrotask<'a> {
  pub(crate) fn enter(engine: &'a mut Engine, job: Microtask) -> Self {
    let running_len_at_entry = engine.microtasks.running.len();
    engine.microtasks.running.push(job);
    Self {
      engine,
      running_len_at_entry,
    }
  }
}

impl Drop for RunningMicrotask<'_> {
  fn drop(&mut self) {
    self
      .engine
      .microtasks
      .running
      .truncate(self.running_len_at_entry);
  }
}

impl Deref for RunningMicrotask<'_> {
  type Target = Engine;

  fn deref(&self) -> &Engine {
    self.engine
  }
}

impl DerefMut for RunningMicrotask<'_> {
  fn deref_mut(&mut self) -> &mut Engine {
    self.engine
  }
}

/// Clears the checkpoint flag when the checkpoint returns or unwinds.
struct CheckpointScope<'a> {
  engine: &'a mut Engine,
}

impl Drop for CheckpointScope<'_> {
  fn drop(&mut self) {
    self.engine.microtasks.end_checkpoint();
  }
}

impl Engine {
  pub fn microtask_queue(&self) -> &MicrotaskQueue {
    &self.microtasks
  }

  /// Kinds of the queued jobs, head first.
  pub fn pending_microtask_kinds(&self) -> Vec<MicrotaskKind> {
    self.microtasks.kinds().collect()
  }

  /// Dispatches the job at the head of the queue.
  ///
  /// Returns `None` if the queue is empty or a job is already running (jobs never interleave).
  /// The interrupt flag and fuel budget are checked first; if either stops dispatch the job stays
  /// queued and the termination is returned.
  pub fn run_next_microtask(&mut self, host: &mut dyn HostHooks) -> Option<Result<(), VmError>> {
    if self.microtasks.is_empty() || self.microtasks.is_running_microtask() {
      return None;
    }
    if let Err(err) = self.tick() {
      return Some(Err(err));
    }
    let job = self.microtasks.pop_front()?;
    Some(self.run_microtask(host, job))
  }

  /// Runs all queued microtasks (and any microtasks enqueued while running) until the queue is
  /// empty.
  ///
  /// If a job returns `Err`, this method **continues draining** the queue (HTML reports the
  /// exception and continues). Errors are returned to the caller for reporting. A termination
  /// raised by the fuel budget or the interrupt flag stops the checkpoint; the remaining jobs stay
  /// queued and the termination is the last returned error.
  ///
  /// Calling this while a checkpoint is already running does nothing.
  pub fn perform_microtask_checkpoint(&mut self, host: &mut dyn HostHooks) -> Vec<VmError> {
    let mut errors = Vec::new();
    if !self.microtasks.begin_checkpoint() {
      return errors;
    }
    let scope = CheckpointScope { engine: self };
    let engine = &mut *scope.engine;

    let span = tracing::debug_span!(
      "microtask_checkpoint",
      jobs = tracing::field::Empty,
      errors = tracing::field::Empty
    );
    let _entered = span.enter();

    let mut jobs = 0usize;
    while !engine.microtasks.is_empty() {
      if let Err(err) = engine.tick() {
        tracing::debug!(error = %err, remaining = engine.microtasks.len(), "microtask checkpoint stopped");
        errors.push(err);
        break;
      }
      let Some(job) = engine.microtasks.pop_front() else {
        break;
      };
      jobs += 1;
      if let Err(err) = engine.run_microtask(host, job) {
        errors.push(err);
      }
    }

    drop(scope);
    span.record("jobs", jobs);
    span.record("errors", errors.len());
    errors
  }
}
