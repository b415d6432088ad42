//! The contract shared by every cell.

use std::sync::Arc;

/// A value that is produced on demand by a cell-owned initializer.
///
/// Every cell in this crate implements `DeferredValue`. The shared rules:
///
/// - Before the first successful [`force`](Self::force), `peek` returns `None`
///   and `is_ready` returns `false`.
/// - A cell becomes ready only after its initializer succeeded; a failed
///   attempt leaves it not ready, so the next `force` starts over.
/// - `peek` and `is_ready` never run the initializer. Cells with a notion of
///   staleness may update their own bookkeeping while answering them.
/// - Values are handed out as clones. Use `Arc<_>` for values that are
///   expensive to clone.
pub trait DeferredValue<T> {
   /// What `force` reports on failure.
   type Error;

   /// Returns the current value without initializing.
   fn peek(&self) -> Option<T>;

   /// Returns the value, running the initializer first if the cell is not ready.
   fn force(&self) -> Result<T, Self::Error>;

   /// Returns `true` if the cell currently holds a usable value.
   fn is_ready(&self) -> bool;
}

impl<T, D> DeferredValue<T> for Arc<D>
where
   D: DeferredValue<T> + ?Sized,
{
   type Error = D::Error;

   #[inline]
   fn peek(&self) -> Option<T> {
      (**self).peek()
   }

   #[inline]
   fn force(&self) -> Result<T, Self::Error> {
      (**self).force()
   }

   #[inline]
   fn is_ready(&self) -> bool {
      (**self).is_ready()
   }
}

impl<T, D> DeferredValue<T> for &D
where
   D: DeferredValue<T> + ?Sized,
{
   type Error = D::Error;

   #[inline]
   fn peek(&self) -> Option<T> {
      (**self).peek()
   }

   #[inline]
   fn force(&self) -> Result<T, Self::Error> {
      (**self).force()
   }

   #[inline]
   fn is_ready(&self) -> bool {
      (**self).is_ready()
   }
}
