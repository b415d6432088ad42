//! Keyed collection of lazy cells.
//!
//! [`KeyedCache<K, V, E>`] maps each key to one shared [`InitCell`]. The first
//! `get_or_create` for a key creates the cell with the initializer it was
//! given; every later call for that key gets the same cell and its
//! initializer argument is ignored. The cell is forced before it is returned.
//!
//! Creation is atomic per key: concurrent callers racing on an absent key all
//! end up with the same cell, and since [`InitCell`] runs its initializer once,
//! the value is computed once. Removing a key forgets its cell; the next
//! `get_or_create` starts from a new, empty one. Handles that callers still hold
//! keep working on the old cell.

use core::borrow::Borrow;
use core::convert::Infallible;
use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::cell::InitCell;

/// A map from keys to lazily initialized, shared cells.
pub struct KeyedCache<K, V, E = Infallible>
where
   K: Eq + Hash,
{
   cells: DashMap<K, Arc<InitCell<V, E>>>,
}

impl<K, V> KeyedCache<K, V>
where
   K: Eq + Hash,
{
   /// Returns the cell for `key`, creating it around `init` if absent, and
   /// makes sure it is initialized.
   pub fn get_or_create<F>(&self, key: K, init: F) -> Arc<InitCell<V>>
   where
      F: Fn() -> V + Send + Sync + 'static,
   {
      match self.get_or_create_fallible(key, move || Ok(init())) {
         Ok(cell) => cell,
         Err(never) => match never {},
      }
   }
}

impl<K, V, E> KeyedCache<K, V, E>
where
   K: Eq + Hash,
{
   /// Creates an empty cache.
   #[must_use]
   pub fn new() -> Self {
      Self {
         cells: DashMap::new(),
      }
   }

   /// Returns the cell for `key`, creating it around `init` if absent, and
   /// makes sure it is initialized.
   ///
   /// If the cell's initializer fails, the error is returned and the empty
   /// cell stays in the cache, so the next call for the key tries again with
   /// the same initializer.
   pub fn get_or_create_fallible<F>(&self, key: K, init: F) -> Result<Arc<InitCell<V, E>>, E>
   where
      F: Fn() -> Result<V, E> + Send + Sync + 'static,
   {
      let mut created = false;
      let cell = {
         let entry = self.cells.entry(key).or_insert_with(|| {
            created = true;
            Arc::new(InitCell::fallible(init))
         });
         Arc::clone(entry.value())
      };
      trace!(created, "keyed cache lookup");

      // The shard lock is released by now, so initializers may use the cache.
      cell.ensure()?;
      Ok(cell)
   }

   /// Returns the cell for `key` without creating or forcing anything.
   pub fn get<Q>(&self, key: &Q) -> Option<Arc<InitCell<V, E>>>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.cells.get(key).map(|entry| Arc::clone(entry.value()))
   }

   /// Forgets the cell for `key`. Returns `true` if there was one.
   pub fn remove<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.cells.remove(key).is_some()
   }

   /// Forgets every cell.
   pub fn clear(&self) {
      self.cells.clear();
   }

   /// Returns `true` if `key` has a cell, ready or not. Never creates one.
   #[inline]
   pub fn contains_key<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.cells.contains_key(key)
   }

   /// Number of keys with a live cell.
   #[inline]
   pub fn len(&self) -> usize {
      self.cells.len()
   }

   /// Returns `true` if no key has a cell.
   #[inline]
   pub fn is_empty(&self) -> bool {
      self.cells.is_empty()
   }
}

impl<K, V, E> Default for KeyedCache<K, V, E>
where
   K: Eq + Hash,
{
   fn default() -> Self {
      Self::new()
   }
}

impl<K, V, E> fmt::Debug for KeyedCache<K, V, E>
where
   K: Eq + Hash,
{
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("KeyedCache")
         .field("len", &self.cells.len())
         .finish()
   }
}
