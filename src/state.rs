//! Initialization state machine shared by the single-slot cells.
//!
//! The state is packed into a single `AtomicU8`:
//! - Bit 0: DONE - A value has been committed
//! - Bit 1: LOCKED - Some thread is running the initializer
//! - Bit 2: WAITING - At least one thread is parked on this state
//! - Bits 3-7: EPOCH - Generation counter, bumped on every commit or reset
//!
//! Readers only ever need an `Acquire` load of the DONE bit. Threads that find
//! the state LOCKED park on the state's address through `parking_lot_core` and
//! are woken when the holder commits or gives up. Async waiters sleep on a
//! `tokio::sync::Notify` that is signalled at the same points, so they never
//! block a runtime thread, however long the holder keeps the lock. A holder gives up by dropping
//! its [`InitGuard`], which is also what happens on an initializer error or panic,
//! so a failed attempt always leaves the slot uninitialized.

use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
#[cfg(feature = "async-tokio")]
use tokio::sync::Notify;

use crate::error::WaitInterrupted;
use crate::interrupt::Interrupt;

/// Atomic initialization state.
pub(crate) struct InitState {
   bits: AtomicU8,
   #[cfg(feature = "async-tokio")]
   notify: Notify,
}

impl InitState {
   const DONE: u8 = 1;
   const LOCKED: u8 = 2;
   const WAITING: u8 = 4;
   const EPOCH_1: u8 = 8;
   const EPOCH_MASK: u8 = !(Self::DONE | Self::LOCKED | Self::WAITING);

   #[inline(always)]
   const fn next_epoch(current: u8) -> u8 {
      (current & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   #[inline]
   pub(crate) fn new() -> Self {
      Self {
         bits: AtomicU8::new(0),
         #[cfg(feature = "async-tokio")]
         notify: Notify::new(),
      }
   }

   #[inline]
   fn key(&self) -> usize {
      self.bits.as_ptr() as usize
   }

   /// Wakes every thread parked on this state, and every async waiter.
   #[inline]
   pub(crate) fn wake_all(&self) {
      // SAFETY: The key is the address of the state, the same one used by `wait`.
      unsafe {
         parking_lot_core::unpark_all(self.key(), DEFAULT_UNPARK_TOKEN);
      }
      #[cfg(feature = "async-tokio")]
      self.notify.notify_waiters();
   }

   /// Parks until the state moves away from `expected` or `keep_waiting` turns false.
   ///
   /// Both conditions are validated under the parking bucket lock, so a wake-up
   /// issued after either changes cannot be missed.
   #[inline]
   fn wait(&self, expected: u8, keep_waiting: impl FnOnce() -> bool) {
      // SAFETY: See `wake_all`.
      unsafe {
         let _ = parking_lot_core::park(
            self.key(),
            || self.bits.load(Ordering::Acquire) == expected && keep_waiting(),
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Sets DONE, bumps the epoch and wakes waiters. Returns `true` if the state
   /// was not DONE before.
   #[inline]
   pub(crate) fn set_done(&self) -> bool {
      let current = self.bits.load(Ordering::Relaxed);
      let next = Self::DONE | Self::next_epoch(current);
      // Release: the value write must be visible before DONE is.
      let prev = self.bits.swap(next, Ordering::Release);
      if prev & Self::WAITING != 0 {
         self.wake_all();
      }
      prev & Self::DONE == 0
   }

   /// Clears DONE and LOCKED, bumps the epoch and wakes waiters. Returns `true`
   /// if the state was DONE before.
   #[inline]
   pub(crate) fn set_uninit(&self) -> bool {
      let current = self.bits.load(Ordering::Relaxed);
      let prev = self.bits.swap(Self::next_epoch(current), Ordering::Release);
      if prev & Self::WAITING != 0 {
         self.wake_all();
      }
      prev & Self::DONE != 0
   }

   #[inline]
   pub(crate) fn is_done(&self) -> bool {
      self.bits.load(Ordering::Acquire) & Self::DONE != 0
   }

   /// One attempt at taking the lock.
   ///
   /// - `Ok(None)`: already DONE.
   /// - `Ok(Some(guard))`: lock acquired.
   /// - `Err(state)`: held by another thread; `state` has WAITING set.
   #[inline]
   fn lock_step(&self) -> Result<Option<InitGuard<'_>>, u8> {
      loop {
         let current = self.bits.load(Ordering::Acquire);
         if current & Self::DONE != 0 {
            return Ok(None);
         }

         if current & Self::LOCKED == 0 {
            match self.bits.compare_exchange_weak(
               current,
               current | Self::LOCKED,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Some(InitGuard::new(self))),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }

         if current & Self::WAITING == 0 {
            let flagged = current | Self::WAITING;
            match self.bits.compare_exchange_weak(
               current,
               flagged,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(flagged),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(current);
      }
   }

   /// Takes the lock, parking while another thread holds it.
   ///
   /// Returns `None` once the state is DONE.
   #[inline]
   pub(crate) fn lock(&self) -> Option<InitGuard<'_>> {
      let mut observed = match self.lock_step() {
         Ok(guard) => return guard,
         Err(state) => state,
      };
      loop {
         self.wait(observed, || true);
         match self.lock_step() {
            Ok(guard) => return guard,
            Err(state) => observed = state,
         }
      }
   }

   /// Like [`lock`](Self::lock), but a raised `interrupt` aborts the wait.
   ///
   /// The interrupt is only consumed when this call actually had to wait, and
   /// only if the state is not DONE by the time the wait ends.
   pub(crate) fn lock_interruptible(
      &self,
      interrupt: &Interrupt,
   ) -> Result<Option<InitGuard<'_>>, WaitInterrupted> {
      let mut observed = match self.lock_step() {
         Ok(guard) => return Ok(guard),
         Err(state) => state,
      };
      loop {
         self.wait(observed, || !interrupt.is_raised());
         if self.is_done() {
            return Ok(None);
         }
         if interrupt.consume() {
            return Err(WaitInterrupted);
         }
         match self.lock_step() {
            Ok(guard) => return Ok(guard),
            Err(state) => observed = state,
         }
      }
   }

   /// Takes the lock from async code.
   ///
   /// While another holder runs, the task sleeps on the state's `Notify`. The
   /// notification is armed before the state is checked, so a wake-up issued
   /// in between is not lost.
   #[cfg(feature = "async-tokio")]
   pub(crate) async fn lock_async(&self) -> Option<InitGuard<'_>> {
      loop {
         let notified = self.notify.notified();
         tokio::pin!(notified);
         notified.as_mut().enable();
         match self.lock_step() {
            Ok(guard) => return guard,
            // `lock_step` left WAITING set, so the holder will notify.
            Err(_) => notified.await,
         }
      }
   }
}

/// Proof of holding the initialization lock.
///
/// Dropping it without [`commit`](Self::commit) resets the state to
/// uninitialized and wakes waiters.
pub(crate) struct InitGuard<'a> {
   state: &'a InitState,
}

impl<'a> InitGuard<'a> {
   #[inline(always)]
   const fn new(state: &'a InitState) -> Self {
      Self { state }
   }

   /// Marks the state DONE and wakes waiters.
   #[inline(always)]
   pub(crate) fn commit(self) -> bool {
      let first = self.state.set_done();
      mem::forget(self);
      first
   }
}

impl Drop for InitGuard<'_> {
   #[inline(always)]
   fn drop(&mut self) {
      self.state.set_uninit();
   }
}

#[cfg(test)]
mod tests {
   use std::sync::Arc;
   use std::thread;
   use std::time::Duration;

   use super::*;

   #[test]
   fn commit_wins_over_pending_interrupt() {
      let state = Arc::new(InitState::new());
      let interrupt = Arc::new(Interrupt::new());
      let Some(guard) = state.lock() else {
         panic!("fresh state must be lockable");
      };

      let waiter = {
         let state = Arc::clone(&state);
         let interrupt = Arc::clone(&interrupt);
         thread::spawn(move || state.lock_interruptible(&interrupt).map(|guard| guard.is_none()))
      };
      thread::sleep(Duration::from_millis(100));

      // `raise` only wakes sleepers on the flag itself, so the waiter stays
      // parked until the commit below wakes it.
      interrupt.raise();
      guard.commit();

      assert_eq!(waiter.join().unwrap(), Ok(true));
      assert!(interrupt.is_raised());
   }

   #[test]
   fn interrupt_aborts_wait_while_locked() {
      let state = Arc::new(InitState::new());
      let interrupt = Arc::new(Interrupt::new());
      let Some(guard) = state.lock() else {
         panic!("fresh state must be lockable");
      };

      let waiter = {
         let state = Arc::clone(&state);
         let interrupt = Arc::clone(&interrupt);
         thread::spawn(move || state.lock_interruptible(&interrupt).is_err())
      };
      thread::sleep(Duration::from_millis(50));
      interrupt.raise();
      state.wake_all();

      assert!(waiter.join().unwrap());
      assert!(!interrupt.is_raised());
      drop(guard);
      assert!(!state.is_done());
   }
}
