//! Basic lazy cell.
//!
//! [`InitCell<T, E>`] owns its initializer and runs it on the first
//! [`force`](InitCell::force). It never expires: once ready, it stays ready
//! until dropped (or explicitly emptied with [`take`](InitCell::take)).
//!
//! Concurrent first-forcers are serialized on an atomic state word. One of
//! them runs the initializer while the rest park, so the initializer runs
//! exactly once per successful initialization. If it fails, the cell stays
//! empty and a parked thread gets its own turn.

use core::convert::Infallible;
use core::fmt;

use tracing::debug;

use crate::deferred::DeferredValue;
use crate::once::OnceSlot;

/// Boxed initializer owned by a cell.
pub(crate) type Initializer<T, E> = Box<dyn Fn() -> Result<T, E> + Send + Sync>;

/// A thread-safe cell that computes its value on first demand.
pub struct InitCell<T, E = Infallible> {
   slot: OnceSlot<T>,
   init: Initializer<T, E>,
}

impl<T> InitCell<T> {
   /// Creates an empty cell around an infallible initializer.
   #[inline]
   #[must_use]
   pub fn new<F>(init: F) -> Self
   where
      F: Fn() -> T + Send + Sync + 'static,
   {
      Self::fallible(move || Ok(init()))
   }

   /// Forces the cell. An infallible initializer cannot fail, so neither can this.
   #[inline]
   pub fn value(&self) -> T
   where
      T: Clone,
   {
      match self.ensure() {
         Ok(value) => value.clone(),
         Err(never) => match never {},
      }
   }
}

impl<T, E> InitCell<T, E> {
   /// Creates an empty cell around an initializer that may fail.
   #[inline]
   #[must_use]
   pub fn fallible<F>(init: F) -> Self
   where
      F: Fn() -> Result<T, E> + Send + Sync + 'static,
   {
      Self {
         slot: OnceSlot::new(),
         init: Box::new(init),
      }
   }

   /// Returns `true` once the initializer has succeeded.
   ///
   /// This method never blocks.
   #[inline]
   pub fn is_ready(&self) -> bool {
      self.slot.is_done()
   }

   /// Returns a reference to the value if the cell is ready.
   ///
   /// Returns `None` while the cell is empty or being initialized.
   /// This method never blocks.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      self.slot.get()
   }

   /// Returns a clone of the value if the cell is ready, without initializing.
   #[inline]
   pub fn peek(&self) -> Option<T>
   where
      T: Clone,
   {
      self.get().cloned()
   }

   /// Returns the value, running the initializer if the cell is not ready yet.
   ///
   /// Blocks while another thread is running the initializer. An initializer
   /// error is returned as is and leaves the cell empty.
   #[inline]
   pub fn force(&self) -> Result<T, E>
   where
      T: Clone,
   {
      self.ensure().cloned()
   }

   /// Like [`force`](Self::force), but waits for a concurrent initializer
   /// without blocking the async runtime.
   #[cfg(feature = "async-tokio")]
   pub async fn force_async(&self) -> Result<T, E>
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
      let value = (self.init)()?;
      debug!("deferred value initialized");
      Ok(writer.commit(value).clone())
   }

   /// Empties the cell and returns its value, if any. The next `force` runs
   /// the initializer again.
   #[inline]
   pub fn take(&mut self) -> Option<T> {
      self.slot.take()
   }

   /// Makes sure the cell is ready and borrows the value.
   pub(crate) fn ensure(&self) -> Result<&T, E> {
      if let Some(value) = self.get() {
         return Ok(value);
      }
      self.initialize()
   }

   #[cold]
   fn initialize(&self) -> Result<&T, E> {
      let Some(writer) = self.slot.writer() else {
         // SAFETY: `writer` only returns `None` once the slot is done.
         return Ok(unsafe { self.slot.get_unchecked() });
      };
      // An error drops `writer`, which empties the slot and wakes waiters.
      let value = (self.init)()?;
      debug!("deferred value initialized");
      Ok(writer.commit(value))
   }
}

impl<T: Clone, E> DeferredValue<T> for InitCell<T, E> {
   type Error = E;

   #[inline]
   fn peek(&self) -> Option<T> {
      InitCell::peek(self)
   }

   #[inline]
   fn force(&self) -> Result<T, E> {
      InitCell::force(self)
   }

   #[inline]
   fn is_ready(&self) -> bool {
      InitCell::is_ready(self)
   }
}

impl<T: fmt::Debug, E> fmt::Debug for InitCell<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("InitCell");
      match self.get() {
         Some(v) => d.field(v),
         None => d.field(&format_args!("<uninit>")),
      };
      d.finish()
   }
}
