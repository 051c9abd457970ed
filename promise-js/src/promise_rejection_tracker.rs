//! HTML-shaped bookkeeping for unhandled promise rejections.
//!
//! The engine reports `HostPromiseRejectionTracker(promise, operation)` through
//! [`HostHooks::promise_rejection_tracker`](crate::HostHooks::promise_rejection_tracker). HTML
//! implements that hook with two per-global data structures:
//! - the **about-to-be-notified rejected promises list** (strongly referenced), and
//! - the **outstanding rejected promises weak set** (weakly referenced).
//!
//! See: <https://html.spec.whatwg.org/multipage/webappapis.html#the-hostpromiserejectiontracker-implementation>
//!
//! [`PromiseRejectionTracker`] is that state machine over engine promise handles. Promises on the
//! about-to-be-notified list must be kept alive by the embedding: pass
//! [`PromiseRejectionTracker::roots`] to [`Engine::collect_garbage`]. The outstanding set holds
//! no strong references; [`PromiseRejectionTracker::retain_live`] forgets collected promises.

use crate::{Engine, PromiseHandle, PromiseRejectionOperation, Value};
use ahash::AHashSet;
use std::mem;

/// The action requested when a previously-unhandled rejected promise becomes handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseRejectionHandleAction {
  /// No further action is required.
  None,
  /// Queue a `rejectionhandled` notification for `promise`.
  QueueRejectionHandled { promise: PromiseHandle },
}

/// A reusable implementation of HTML's promise rejection tracking state.
#[derive(Debug, Default)]
pub struct PromiseRejectionTracker {
  about_to_be_notified: Vec<PromiseHandle>,
  /// Promises reported as unhandled that have not yet had `rejectionhandled` dispatched.
  outstanding_rejected: AHashSet<PromiseHandle>,
}

impl PromiseRejectionTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Dispatches one tracker notification.
  pub fn track(
    &mut self,
    promise: PromiseHandle,
    operation: PromiseRejectionOperation,
  ) -> PromiseRejectionHandleAction {
    match operation {
      PromiseRejectionOperation::Reject => {
        self.on_reject(promise);
        PromiseRejectionHandleAction::None
      }
      PromiseRejectionOperation::Handle => self.on_handle(promise),
    }
  }

  /// Called for `HostPromiseRejectionTracker(promise, "reject")`.
  pub fn on_reject(&mut self, promise: PromiseHandle) {
    self.about_to_be_notified.push(promise);
  }

  /// Called for `HostPromiseRejectionTracker(promise, "handle")`.
  pub fn on_handle(&mut self, promise: PromiseHandle) -> PromiseRejectionHandleAction {
    if let Some(idx) = self
      .about_to_be_notified
      .iter()
      .position(|pending| *pending == promise)
    {
      self.about_to_be_notified.remove(idx);
      return PromiseRejectionHandleAction::None;
    }

    if self.outstanding_rejected.remove(&promise) {
      return PromiseRejectionHandleAction::QueueRejectionHandled { promise };
    }

    PromiseRejectionHandleAction::None
  }

  /// Takes the promises that should now receive an `unhandledrejection` notification.
  pub fn drain_about_to_be_notified(&mut self) -> Vec<PromiseHandle> {
    mem::take(&mut self.about_to_be_notified)
  }

  /// Called after the host fires `unhandledrejection` for `promise`.
  ///
  /// If the rejection remains unhandled, the promise joins the outstanding set so a later handler
  /// produces [`PromiseRejectionHandleAction::QueueRejectionHandled`].
  pub fn after_unhandledrejection_dispatch(
    &mut self,
    promise: PromiseHandle,
    is_handled_after_event: bool,
  ) {
    if is_handled_after_event {
      return;
    }
    self.outstanding_rejected.insert(promise);
  }

  /// Values the embedding must keep alive across a collection.
  pub fn roots(&self) -> Vec<Value> {
    self
      .about_to_be_notified
      .iter()
      .map(|promise| Value::Promise(*promise))
      .collect()
  }

  /// Forgets outstanding promises that have been collected.
  pub fn retain_live(&mut self, engine: &Engine) {
    self
      .outstanding_rejected
      .retain(|promise| engine.is_valid_promise(*promise));
  }

  pub fn outstanding_len(&self) -> usize {
    self.outstanding_rejected.len()
  }
}
