//! Lazy cell that retries a failing initializer.
//!
//! A [`RetryingCell`] gives its initializer up to `max_attempts` tries per
//! `force`, sleeping `retry_delay` between them. The first success is kept
//! forever; after that, `force` never calls the initializer again. When every
//! attempt fails, the last error is returned unchanged and the cell stays
//! empty, so the next `force` gets a fresh budget.
//!
//! Only one thread runs the retry loop at a time; others park until it
//! commits or gives up. Both the delay and that park can be cut short with
//! [`RetryingCell::interrupt`].

use core::fmt;
use core::num::NonZeroU32;
use std::time::Duration;

use tracing::debug;

use crate::cell::Initializer;
use crate::deferred::DeferredValue;
use crate::error::{ForceError, PolicyError};
use crate::interrupt::Interrupt;
use crate::once::OnceSlot;

/// How often and how patiently a [`RetryingCell`] retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
   max_attempts: NonZeroU32,
   retry_delay: Duration,
}

impl RetryPolicy {
   const DEFAULT_ATTEMPTS: NonZeroU32 = match NonZeroU32::new(3) {
      Some(n) => n,
      None => panic!("default attempt count must be non-zero"),
   };
   const DEFAULT_DELAY: Duration = Duration::from_millis(100);

   /// Creates a policy allowing `max_attempts` tries in total, `retry_delay` apart.
   pub fn new(max_attempts: u32, retry_delay: Duration) -> Result<Self, PolicyError> {
      let max_attempts = NonZeroU32::new(max_attempts).ok_or(PolicyError::ZeroAttempts)?;
      Ok(Self {
         max_attempts,
         retry_delay,
      })
   }

   /// Total number of initializer calls per `force`, first one included.
   #[inline]
   pub fn max_attempts(&self) -> u32 {
      self.max_attempts.get()
   }

   /// Pause between a failed attempt and the next one.
   #[inline]
   pub fn retry_delay(&self) -> Duration {
      self.retry_delay
   }
}

impl Default for RetryPolicy {
   /// Three attempts, 100 ms apart.
   fn default() -> Self {
      Self {
         max_attempts: Self::DEFAULT_ATTEMPTS,
         retry_delay: Self::DEFAULT_DELAY,
      }
   }
}

/// What one failed attempt means for the loop.
enum Attempt<E> {
   Retry,
   GiveUp(E),
}

/// A lazy cell that retries its initializer with a delay before giving up.
pub struct RetryingCell<T, E> {
   slot: OnceSlot<T>,
   init: Initializer<T, E>,
   policy: RetryPolicy,
   interrupt: Interrupt,
}

impl<T, E> RetryingCell<T, E> {
   /// Creates an empty cell.
   #[must_use]
   pub fn new<F>(init: F, policy: RetryPolicy) -> Self
   where
      F: Fn() -> Result<T, E> + Send + Sync + 'static,
   {
      Self {
         slot: OnceSlot::new(),
         init: Box::new(init),
         policy,
         interrupt: Interrupt::new(),
      }
   }

   /// The retry policy this cell was created with.
   #[inline]
   pub fn policy(&self) -> RetryPolicy {
      self.policy
   }

   /// Returns `true` once some attempt has succeeded.
   #[inline]
   pub fn is_ready(&self) -> bool {
      self.slot.is_done()
   }

   /// Returns a reference to the value if the cell is ready. Never blocks.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      self.slot.get()
   }

   /// Returns a clone of the value if some attempt has succeeded, without
   /// running the initializer.
   #[inline]
   pub fn peek(&self) -> Option<T>
   where
      T: Clone,
   {
      self.get().cloned()
   }

   /// Returns the value, running the retry loop if the cell is not ready yet.
   ///
   /// # Errors
   ///
   /// - [`ForceError::Failed`] with the last attempt's error once the budget is spent.
   /// - [`ForceError::Interrupted`] if [`interrupt`](Self::interrupt) cut a
   ///   retry delay or the wait for another thread's retry loop short.
   pub fn force(&self) -> Result<T, ForceError<E>>
   where
      T: Clone,
   {
      if let Some(value) = self.get() {
         return Ok(value.clone());
      }
      self.initialize().cloned()
   }

   /// Interrupts the current blocking wait on this cell, or the next one if
   /// nobody is waiting.
   ///
   /// The interrupted `force` returns [`ForceError::Interrupted`] and leaves
   /// the cell empty.
   pub fn interrupt(&self) {
      self.interrupt.raise();
      self.slot.wake_waiters();
   }

   /// Async flavor of [`force`](Self::force), sleeping on the tokio timer
   /// between attempts.
   ///
   /// Callers that find another retry loop running, sync or async, wait for it
   /// on the runtime without blocking a thread.
   ///
   /// Dropping the returned future cancels the loop at its next await point
   /// and leaves the cell empty. A pending [`interrupt`](Self::interrupt) is
   /// honoured before each delay.
   #[cfg(feature = "async-tokio")]
   pub async fn force_async(&self) -> Result<T, ForceError<E>>
   where
      T: Clone,
   {
      if let Some(value) = self.get() {
         return Ok(value.clone());
      }
      let Some(writer) = self.slot.writer_async().await else {
         // SAFETY: `writer_async` only returns `None` once the slot is done.
         return Ok(unsafe { self.slot.get_unchecked() }.clone());
      };

      let mut attempt = 1;
      let value = loop {
         match self.attempt(attempt) {
            Ok(value) => break value,
            Err(Attempt::GiveUp(err)) => return Err(ForceError::Failed(err)),
            Err(Attempt::Retry) => {
               if self.interrupt.consume() {
                  return Err(crate::error::WaitInterrupted.into());
               }
               tokio::time::sleep(self.policy.retry_delay).await;
               attempt += 1;
            }
         }
      };
      Ok(writer.commit(value).clone())
   }

   #[cold]
   fn initialize(&self) -> Result<&T, ForceError<E>> {
      let Some(writer) = self.slot.writer_interruptible(&self.interrupt)? else {
         // SAFETY: `writer_interruptible` only returns `Ok(None)` once the slot is done.
         return Ok(unsafe { self.slot.get_unchecked() });
      };

      // Any early return drops `writer`, leaving the slot empty.
      let mut attempt = 1;
      let value = loop {
         match self.attempt(attempt) {
            Ok(value) => break value,
            Err(Attempt::GiveUp(err)) => return Err(ForceError::Failed(err)),
            Err(Attempt::Retry) => {
               self.interrupt.sleep(self.policy.retry_delay)?;
               attempt += 1;
            }
         }
      };
      Ok(writer.commit(value))
   }

   /// Runs attempt number `attempt` (1-based) and classifies a failure.
   fn attempt(&self, attempt: u32) -> Result<T, Attempt<E>> {
      let max_attempts = self.policy.max_attempts();
      match (self.init)() {
         Ok(value) => {
            debug!(attempt, max_attempts, "deferred value initialized");
            Ok(value)
         }
         Err(err) if attempt >= max_attempts => {
            debug!(max_attempts, "initializer failed on every attempt");
            Err(Attempt::GiveUp(err))
         }
         Err(_) => {
            debug!(
               attempt,
               max_attempts,
               delay_ms = self.policy.retry_delay.as_millis() as u64,
               "initializer failed, retrying"
            );
            Err(Attempt::Retry)
         }
      }
   }
}

impl<T: Clone, E> DeferredValue<T> for RetryingCell<T, E> {
   type Error = ForceError<E>;

   #[inline]
   fn peek(&self) -> Option<T> {
      RetryingCell::peek(self)
   }

   #[inline]
   fn force(&self) -> Result<T, ForceError<E>> {
      RetryingCell::force(self)
   }

   #[inline]
   fn is_ready(&self) -> bool {
      RetryingCell::is_ready(self)
   }
}

impl<T: fmt::Debug, E> fmt::Debug for RetryingCell<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_struct("RetryingCell");
      match self.get() {
         Some(v) => d.field("value", v),
         None => d.field("value", &format_args!("<uninit>")),
      };
      d.field("policy", &self.policy).finish()
   }
}
