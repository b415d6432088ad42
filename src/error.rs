//! Error types surfaced by `force`.

use thiserror::Error;

/// A blocking wait (retry delay or init-lock wait) was interrupted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("blocking wait was interrupted")]
pub struct WaitInterrupted;

/// Failure of a `force` that may also block on interruptible waits.
///
/// `Failed` carries the initializer's own error unchanged; for a retrying cell
/// that is the error of the last attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForceError<E> {
   #[error("initializer failed: {0}")]
   Failed(E),

   #[error(transparent)]
   Interrupted(#[from] WaitInterrupted),
}

impl<E> ForceError<E> {
   /// Returns `true` if a wait was interrupted rather than the initializer failing.
   #[inline]
   pub fn is_interrupted(&self) -> bool {
      matches!(self, Self::Interrupted(_))
   }

   /// Returns the initializer's error, if that is what this is.
   #[inline]
   pub fn into_failure(self) -> Option<E> {
      match self {
         Self::Failed(err) => Some(err),
         Self::Interrupted(_) => None,
      }
   }
}

/// Invalid retry configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
   #[error("retry policy needs at least one attempt")]
   ZeroAttempts,
}
