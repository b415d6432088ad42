//! Deferred-initialization cells.
//!
//! Every cell here wraps a zero-argument initializer and runs it at most once
//! per period in which the cell holds a value. The variants differ in what ends
//! that period and in how failures are handled:
//!
//! - [`InitCell<T, E>`]: computes its value on first demand and keeps it.
//! - [`ExpiringCell<T, E>`]: drops its value after a time-to-live without access.
//! - [`RetryingCell<T, E>`]: retries a failing initializer with a delay.
//! - [`AffinityCell<T, E>`]: keeps one independent value per thread.
//! - [`KeyedCache<K, V, E>`]: hands out one shared [`InitCell`] per key.
//!
//! All of them implement [`DeferredValue`]: `peek` reads without initializing,
//! `force` initializes if needed, `is_ready` reports whether a usable value is
//! held. A cell only becomes ready after its initializer succeeded; a failure
//! is returned to the caller and leaves the cell empty for the next attempt.
//!
//! All cells are `Sync`. Concurrent first-forcers never run the initializer
//! more than once per period. Single-slot cells serialize on an atomic state
//! word with futex-based parking (lock-free once ready) and wake async waiters
//! through a tokio `Notify`. The expiring cell and the per-thread cell
//! serialize initialization on a mutex.
//!
//! # Examples
//!
//! ## Basic cell
//!
//! ```rust
//! use poly_lazy::InitCell;
//!
//! let config = InitCell::new(|| "production".to_string());
//! assert_eq!(config.peek(), None);
//! assert_eq!(config.value(), "production");
//! assert!(config.is_ready());
//! ```
//!
//! ## Retrying cell
//!
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! use poly_lazy::{RetryPolicy, RetryingCell};
//!
//! let calls = AtomicU32::new(0);
//! let policy = RetryPolicy::new(3, Duration::from_millis(1)).unwrap();
//! let cell = RetryingCell::new(
//!    move || match calls.fetch_add(1, Ordering::SeqCst) {
//!       0 => Err("warming up"),
//!       _ => Ok(42),
//!    },
//!    policy,
//! );
//! assert_eq!(cell.force(), Ok(42));
//! ```
//!
//! ## Keyed cache
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use poly_lazy::KeyedCache;
//!
//! let cache: KeyedCache<&str, usize> = KeyedCache::new();
//! let first = cache.get_or_create("answer", || 42);
//! let again = cache.get_or_create("answer", || 0);
//! assert!(Arc::ptr_eq(&first, &again));
//! assert_eq!(again.peek(), Some(42));
//! ```

/// Per-thread lazy cell.
mod affinity;

/// Basic lazy cell.
mod cell;

/// Shared cell contract.
mod deferred;

/// Error types.
mod error;

/// Lazy cell with a time-to-live.
mod expiring;

/// Interruptible blocking waits.
mod interrupt;

/// Keyed collection of lazy cells.
mod keyed;

/// Write-once value storage.
mod once;

/// Lazy cell with retries.
mod retrying;

/// Internal synchronization state management.
mod state;

pub use affinity::AffinityCell;
pub use cell::InitCell;
pub use deferred::DeferredValue;
pub use error::{ForceError, PolicyError, WaitInterrupted};
pub use expiring::ExpiringCell;
pub use interrupt::Interrupt;
pub use keyed::KeyedCache;
pub use retrying::{RetryPolicy, RetryingCell};
