//! Per-thread lazy cell.
//!
//! An [`AffinityCell`] keeps one independent value per calling thread. Each
//! thread's slot is created on that thread's first successful `force` and
//! follows the basic cell rules on its own: it is ready once its initializer
//! run succeeded, and only that thread ever sees it. `remove` drops the
//! calling thread's slot and nobody else's.
//!
//! Slots are keyed by [`ThreadId`] in a map owned by the cell. The first time
//! a thread fills a slot, it registers an exit hook in its own thread-local
//! storage; when the thread exits, the hook removes that thread's slot, so the
//! value is dropped with its thread rather than with the cell. Hooks only hold
//! a weak reference to the map, so a cell dropped first is simply skipped.

use core::convert::Infallible;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::cell::Initializer;
use crate::deferred::DeferredValue;

type Slots<T> = DashMap<ThreadId, T>;

/// Source of cell identities for the exit hook registry.
static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(0);

/// Per-thread cleanups, keyed by cell id, run when the thread exits.
#[derive(Default)]
struct ExitHooks(RefCell<HashMap<u64, Box<dyn FnOnce()>>>);

impl Drop for ExitHooks {
   fn drop(&mut self) {
      for (_, hook) in self.0.get_mut().drain() {
         hook();
      }
   }
}

thread_local! {
   static EXIT_HOOKS: ExitHooks = ExitHooks::default();
}

/// Arranges for `context`'s slot to be removed from `slots` when the current
/// thread exits. Registering the same cell twice is a no-op.
fn remove_on_exit<T: Send + 'static>(id: u64, context: ThreadId, slots: Weak<Slots<T>>) {
   // Fails only while this thread's locals are being torn down; the slot then
   // lives until the cell is dropped.
   let _ = EXIT_HOOKS.try_with(|hooks| {
      hooks.0.borrow_mut().entry(id).or_insert_with(|| {
         Box::new(move || {
            if let Some(slots) = slots.upgrade() {
               slots.remove(&context);
            }
         })
      });
   });
}

/// A lazy cell holding a separate value for every thread that forces it.
pub struct AffinityCell<T, E = Infallible> {
   id: u64,
   init: Initializer<T, E>,
   slots: Arc<Slots<T>>,
   init_lock: Mutex<()>,
}

impl<T: Send + 'static> AffinityCell<T> {
   /// Creates a cell around an infallible initializer.
   #[inline]
   #[must_use]
   pub fn new<F>(init: F) -> Self
   where
      F: Fn() -> T + Send + Sync + 'static,
   {
      Self::fallible(move || Ok(init()))
   }

   /// Forces the calling thread's slot. An infallible initializer cannot fail,
   /// so neither can this.
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

impl<T, E> AffinityCell<T, E> {
   /// Creates a cell around an initializer that may fail.
   #[must_use]
   pub fn fallible<F>(init: F) -> Self
   where
      F: Fn() -> Result<T, E> + Send + Sync + 'static,
   {
      Self {
         id: NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed),
         init: Box::new(init),
         slots: Arc::new(DashMap::new()),
         init_lock: Mutex::new(()),
      }
   }

   #[inline]
   fn context() -> ThreadId {
      thread::current().id()
   }

   /// Returns `true` if the calling thread's slot holds a value.
   #[inline]
   pub fn is_ready(&self) -> bool {
      self.slots.contains_key(&Self::context())
   }

   #[inline]
   fn slot(&self, context: ThreadId) -> Option<T>
   where
      T: Clone,
   {
      self.slots.get(&context).map(|slot| slot.value().clone())
   }

   /// Returns the calling thread's value without initializing.
   #[inline]
   pub fn peek(&self) -> Option<T>
   where
      T: Clone,
   {
      self.slot(Self::context())
   }

   /// Returns the calling thread's value, running the initializer for this
   /// thread if its slot is empty.
   ///
   /// A ready slot is read without taking the cell lock. Filling an empty slot
   /// happens under the lock with a second readiness check, so a slot is never
   /// initialized twice. The initializer must not touch its own cell.
   pub fn force(&self) -> Result<T, E>
   where
      T: Clone + Send + 'static,
   {
      let context = Self::context();
      if let Some(value) = self.slot(context) {
         return Ok(value);
      }

      let _guard = self.init_lock.lock();
      if let Some(value) = self.slot(context) {
         return Ok(value);
      }
      let value = (self.init)()?;
      self.slots.insert(context, value.clone());
      remove_on_exit(self.id, context, Arc::downgrade(&self.slots));
      debug!(?context, "thread-affine value initialized");
      Ok(value)
   }

   /// Clears the calling thread's slot and returns its value.
   ///
   /// Other threads' slots are untouched.
   pub fn remove(&self) -> Option<T> {
      self.slots.remove(&Self::context()).map(|(_, value)| value)
   }

   /// Number of threads currently holding a value. Threads that exited are
   /// not counted.
   #[inline]
   pub fn context_count(&self) -> usize {
      self.slots.len()
   }
}

impl<T: Clone + Send + 'static, E> DeferredValue<T> for AffinityCell<T, E> {
   type Error = E;

   #[inline]
   fn peek(&self) -> Option<T> {
      AffinityCell::peek(self)
   }

   #[inline]
   fn force(&self) -> Result<T, E> {
      AffinityCell::force(self)
   }

   #[inline]
   fn is_ready(&self) -> bool {
      AffinityCell::is_ready(self)
   }
}

impl<T: fmt::Debug, E> fmt::Debug for AffinityCell<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      // `len` read-locks every shard, so it must not overlap the `get` below.
      let contexts = self.slots.len();
      let mut d = f.debug_struct("AffinityCell");
      match self.slots.get(&Self::context()) {
         Some(slot) => d.field("value", slot.value()),
         None => d.field("value", &format_args!("<uninit>")),
      };
      d.field("contexts", &contexts).finish()
   }
}
