//! Interrupt flag for blocking waits.
//!
//! A raised [`Interrupt`] behaves like a thread's interrupt status: it stays set
//! until a blocking wait observes it, and that wait consumes it and reports
//! [`WaitInterrupted`].

use core::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

use crate::error::WaitInterrupted;

/// Interrupt status shared by the waits of one cell.
#[derive(Debug, Default)]
pub struct Interrupt(AtomicBool);

impl Interrupt {
   /// Creates a lowered flag.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self(AtomicBool::new(false))
   }

   #[inline]
   fn key(&self) -> usize {
      self.0.as_ptr() as usize
   }

   /// Raises the flag and wakes threads sleeping in [`sleep`](Self::sleep).
   ///
   /// Threads parked elsewhere (such as on a cell's init lock) must be woken
   /// by the owner of that lock.
   pub fn raise(&self) {
      self.0.store(true, Ordering::Release);
      // SAFETY: The key is the address of the flag, the same one used by `sleep`.
      unsafe {
         parking_lot_core::unpark_all(self.key(), DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Returns `true` if the flag is raised and not yet consumed.
   #[inline]
   pub fn is_raised(&self) -> bool {
      self.0.load(Ordering::Acquire)
   }

   /// Lowers the flag, returning whether it was raised.
   #[inline]
   pub(crate) fn consume(&self) -> bool {
      self.0.swap(false, Ordering::AcqRel)
   }

   /// Blocks the current thread for `duration` unless interrupted.
   ///
   /// A flag that was already raised aborts the sleep immediately. A duration
   /// too large to represent sleeps until interrupted.
   pub fn sleep(&self, duration: Duration) -> Result<(), WaitInterrupted> {
      let deadline = Instant::now().checked_add(duration);
      loop {
         if self.consume() {
            return Err(WaitInterrupted);
         }
         if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(());
         }
         // SAFETY: See `raise`.
         unsafe {
            let _ = parking_lot_core::park(
               self.key(),
               || !self.is_raised(),
               || {},
               |_, _| {},
               DEFAULT_PARK_TOKEN,
               deadline,
            );
         }
      }
   }
}
