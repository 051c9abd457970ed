//! Dispatch budget: a fuel counter and a host interrupt flag, both checked before each microtask.

use crate::error::Termination;
use crate::error::TerminationReason;
use crate::VmError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Lets the host stop microtask dispatch from anywhere, including other threads.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
  flag: Arc<AtomicBool>,
}

impl InterruptHandle {
  /// Stops dispatch at the next microtask boundary.
  pub fn interrupt(&self) {
    self.flag.store(true, Ordering::Relaxed);
  }

  pub fn reset(&self) {
    self.flag.store(false, Ordering::Relaxed);
  }

  pub fn is_interrupted(&self) -> bool {
    self.flag.load(Ordering::Relaxed)
  }
}

#[derive(Debug)]
pub(crate) struct Budget {
  fuel: Option<u64>,
  interrupt: InterruptHandle,
}

impl Budget {
  pub(crate) fn new(fuel: Option<u64>, flag: Option<Arc<AtomicBool>>) -> Self {
    Self {
      fuel,
      interrupt: InterruptHandle {
        flag: flag.unwrap_or_default(),
      },
    }
  }

  pub(crate) fn fuel(&self) -> Option<u64> {
    self.fuel
  }

  pub(crate) fn set_fuel(&mut self, fuel: Option<u64>) {
    self.fuel = fuel;
  }

  pub(crate) fn interrupt_handle(&self) -> InterruptHandle {
    self.interrupt.clone()
  }

  /// Charges one dispatch. The interrupt flag wins over an exhausted fuel counter.
  pub(crate) fn tick(&mut self) -> Result<(), VmError> {
    let reason = if self.interrupt.is_interrupted() {
      TerminationReason::Interrupted
    } else {
      match &mut self.fuel {
        Some(0) => TerminationReason::OutOfFuel,
        Some(fuel) => {
          *fuel -= 1;
          return Ok(());
        }
        None => return Ok(()),
      }
    };
    Err(VmError::Termination(Termination::new(reason)))
  }
}
