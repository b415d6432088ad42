//! Write-once value storage behind an [`InitState`].
//!
//! [`OnceSlot<T>`] is the storage half of [`InitCell`](crate::InitCell) and
//! [`RetryingCell`](crate::RetryingCell): it knows how to hand out the value
//! once it is committed, and how to let exactly one thread write it. Deciding
//! *what* to write (single call, retry loop, ...) is up to the owning cell.

use core::cell::UnsafeCell;
use core::mem;

use crate::error::WaitInterrupted;
use crate::interrupt::Interrupt;
use crate::state::{InitGuard, InitState};

pub(crate) struct OnceSlot<T> {
   value: UnsafeCell<mem::MaybeUninit<T>>,
   state: InitState,
}

impl<T> OnceSlot<T> {
   #[inline]
   pub(crate) fn new() -> Self {
      Self {
         value: UnsafeCell::new(mem::MaybeUninit::uninit()),
         state: InitState::new(),
      }
   }

   #[inline]
   pub(crate) fn is_done(&self) -> bool {
      self.state.is_done()
   }

   /// Returns the committed value, never blocking.
   #[inline]
   pub(crate) fn get(&self) -> Option<&T> {
      if self.is_done() {
         // SAFETY: DONE is only set after the value is written.
         Some(unsafe { self.get_unchecked() })
      } else {
         None
      }
   }

   /// # Safety
   ///
   /// The slot must be done.
   #[inline]
   pub(crate) unsafe fn get_unchecked(&self) -> &T {
      debug_assert!(self.is_done(), "get_unchecked on an empty slot");
      (*self.value.get()).assume_init_ref()
   }

   /// Takes the value out, leaving the slot empty. Exclusive access means no
   /// reader can hold a reference into the slot.
   #[inline]
   pub(crate) fn take(&mut self) -> Option<T> {
      if self.state.set_uninit() {
         // SAFETY: The slot was done, and the state no longer says so.
         Some(unsafe { self.value.get_mut().assume_init_read() })
      } else {
         None
      }
   }

   /// Acquires the right to write, parking while another thread writes.
   ///
   /// `None` means the slot was committed meanwhile.
   #[inline]
   pub(crate) fn writer(&self) -> Option<SlotWriter<'_, T>> {
      self.state.lock().map(|guard| SlotWriter { slot: self, guard })
   }

   /// Like [`writer`](Self::writer), but the wait can be interrupted.
   #[inline]
   pub(crate) fn writer_interruptible(
      &self,
      interrupt: &Interrupt,
   ) -> Result<Option<SlotWriter<'_, T>>, WaitInterrupted> {
      Ok(self
         .state
         .lock_interruptible(interrupt)?
         .map(|guard| SlotWriter { slot: self, guard }))
   }

   #[cfg(feature = "async-tokio")]
   #[inline]
   pub(crate) async fn writer_async(&self) -> Option<SlotWriter<'_, T>> {
      self
         .state
         .lock_async()
         .await
         .map(|guard| SlotWriter { slot: self, guard })
   }

   /// Wakes threads parked on the slot's state so they re-check their wait condition.
   #[inline]
   pub(crate) fn wake_waiters(&self) {
      self.state.wake_all();
   }
}

// SAFETY: Shared access only reads the value after DONE is observed with
// Acquire, and writes happen under the exclusive init lock. `T: Send` because
// the value may be written on one thread and dropped on another.
unsafe impl<T: Send + Sync> Sync for OnceSlot<T> {}

impl<T> Drop for OnceSlot<T> {
   #[inline]
   fn drop(&mut self) {
      if self.is_done() {
         // SAFETY: The slot is done and we are its last user.
         unsafe { self.value.get_mut().assume_init_drop() };
      }
   }
}

/// Exclusive write access to an empty [`OnceSlot`].
///
/// Dropping it uncommitted leaves the slot empty and wakes waiters, so any
/// early return (error, interruption, panic) releases the slot for a retry.
pub(crate) struct SlotWriter<'a, T> {
   slot: &'a OnceSlot<T>,
   guard: InitGuard<'a>,
}

impl<'a, T> SlotWriter<'a, T> {
   /// Stores `value`, marks the slot done and returns a reference to it.
   #[inline]
   pub(crate) fn commit(self, value: T) -> &'a T {
      let Self { slot, guard } = self;
      // SAFETY: Holding the init lock gives us exclusive access to the storage.
      let stored = unsafe { (*slot.value.get()).write(value) };
      guard.commit();
      stored
   }
}
