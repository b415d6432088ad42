//! Lazy cell whose value goes stale.
//!
//! An [`ExpiringCell`] treats its value as absent once more than `ttl` has
//! elapsed since the last access. Every access that finds the value fresh
//! (`peek`, `force`) restarts that clock, so a value in steady use never
//! expires. Staleness is discovered lazily: the first observation past the
//! deadline drops the value on the spot.
//!
//! The slot is guarded by a mutex that is held across the initializer, which
//! gives exactly one initializer run per freshness period even under
//! concurrent access. The initializer must not touch its own cell.

use core::convert::Infallible;
use core::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::cell::Initializer;
use crate::deferred::DeferredValue;

struct Slot<T> {
   value: Option<T>,
   last_access: Instant,
}

impl<T> Slot<T> {
   /// Drops the value if it outlived `ttl`. Returns `true` if a fresh value remains.
   fn expire(&mut self, ttl: Duration, now: Instant) -> bool {
      if self.value.is_none() {
         return false;
      }
      let idle = now.saturating_duration_since(self.last_access);
      if idle > ttl {
         debug!(
            idle_ms = idle.as_millis() as u64,
            ttl_ms = ttl.as_millis() as u64,
            "deferred value expired"
         );
         self.value = None;
         return false;
      }
      true
   }

   /// Like `expire`, but a fresh value also restarts the clock.
   #[inline]
   fn refresh(&mut self, ttl: Duration, now: Instant) -> bool {
      let fresh = self.expire(ttl, now);
      if fresh {
         self.last_access = now;
      }
      fresh
   }
}

/// A lazy cell whose value expires after a period without access.
pub struct ExpiringCell<T, E = Infallible> {
   init: Initializer<T, E>,
   ttl: Duration,
   slot: Mutex<Slot<T>>,
}

impl<T> ExpiringCell<T> {
   /// Creates an empty cell around an infallible initializer.
   #[inline]
   #[must_use]
   pub fn new<F>(init: F, ttl: Duration) -> Self
   where
      F: Fn() -> T + Send + Sync + 'static,
   {
      Self::fallible(move || Ok(init()), ttl)
   }

   /// Forces the cell. An infallible initializer cannot fail, so neither can this.
   #[inline]
   pub fn value(&self) -> T
   where
      T: Clone,
   {
      match self.force() {
         Ok(value) => value,
         Err(never) => match never {},
      }
   }
}

impl<T, E> ExpiringCell<T, E> {
   /// Creates an empty cell around an initializer that may fail.
   #[must_use]
   pub fn fallible<F>(init: F, ttl: Duration) -> Self
   where
      F: Fn() -> Result<T, E> + Send + Sync + 'static,
   {
      Self {
         init: Box::new(init),
         ttl,
         slot: Mutex::new(Slot {
            value: None,
            last_access: Instant::now(),
         }),
      }
   }

   /// The configured time-to-live.
   #[inline]
   pub fn ttl(&self) -> Duration {
      self.ttl
   }

   /// Time since the value was last produced or observed fresh.
   ///
   /// Before the first initialization this counts from construction.
   pub fn elapsed_since_access(&self) -> Duration {
      self.slot.lock().last_access.elapsed()
   }

   /// Returns `true` if the cell holds a fresh value.
   ///
   /// A stale value is dropped as a side effect. Unlike `peek`, a fresh
   /// answer does not restart the clock.
   pub fn is_ready(&self) -> bool {
      self.slot.lock().expire(self.ttl, Instant::now())
   }

   /// Returns the value if fresh, restarting the clock. A stale value is
   /// dropped and `None` returned. Never runs the initializer.
   pub fn peek(&self) -> Option<T>
   where
      T: Clone,
   {
      let mut slot = self.slot.lock();
      if slot.refresh(self.ttl, Instant::now()) {
         slot.value.clone()
      } else {
         None
      }
   }

   /// Returns the value if fresh, otherwise runs the initializer and stores
   /// its result with a new clock.
   ///
   /// An initializer error is returned as is and leaves the cell empty.
   pub fn force(&self) -> Result<T, E>
   where
      T: Clone,
   {
      let mut slot = self.slot.lock();
      if slot.refresh(self.ttl, Instant::now()) {
         if let Some(value) = &slot.value {
            return Ok(value.clone());
         }
      }

      let value = (self.init)()?;
      debug!(ttl_ms = self.ttl.as_millis() as u64, "deferred value initialized");
      slot.value = Some(value.clone());
      slot.last_access = Instant::now();
      Ok(value)
   }

   /// Drops the value now, regardless of its age.
   pub fn invalidate(&self) -> Option<T> {
      self.slot.lock().value.take()
   }
}

impl<T: Clone, E> DeferredValue<T> for ExpiringCell<T, E> {
   type Error = E;

   #[inline]
   fn peek(&self) -> Option<T> {
      ExpiringCell::peek(self)
   }

   #[inline]
   fn force(&self) -> Result<T, E> {
      ExpiringCell::force(self)
   }

   #[inline]
   fn is_ready(&self) -> bool {
      ExpiringCell::is_ready(self)
   }
}

impl<T: fmt::Debug, E> fmt::Debug for ExpiringCell<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let slot = self.slot.lock();
      let mut d = f.debug_struct("ExpiringCell");
      match &slot.value {
         Some(v) => d.field("value", v),
         None => d.field("value", &format_args!("<uninit>")),
      };
      d.field("ttl", &self.ttl)
         .field("idle", &slot.last_access.elapsed())
         .finish()
   }
}
