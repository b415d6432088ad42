use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use poly_lazy::{DeferredValue, ExpiringCell};

fn counting_cell(counter: &Arc<AtomicUsize>, ttl: Duration) -> ExpiringCell<usize> {
   let counter = Arc::clone(counter);
   ExpiringCell::new(move || counter.fetch_add(1, Ordering::SeqCst) + 1, ttl)
}

#[test]
fn test_new_is_not_ready() {
   let cell = ExpiringCell::new(|| "Expiring Value", Duration::from_secs(1));
   assert_eq!(cell.peek(), None);
   assert!(!cell.is_ready());
}

#[test]
fn test_value_expires() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter, Duration::from_millis(200));

   assert_eq!(cell.value(), 1);
   assert!(cell.is_ready());

   thread::sleep(Duration::from_millis(50));
   assert_eq!(cell.peek(), Some(1));

   thread::sleep(Duration::from_millis(400));
   assert_eq!(cell.peek(), None);
   assert!(!cell.is_ready());

   // A stale cell re-runs its initializer.
   assert_eq!(cell.value(), 2);
   assert!(cell.is_ready());
   assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_fresh_access_restarts_clock() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter, Duration::from_millis(150));
   cell.value();

   // Far longer than the TTL in total, but never idle for that long.
   for _ in 0..8 {
      thread::sleep(Duration::from_millis(50));
      assert_eq!(cell.peek(), Some(1));
   }
   for _ in 0..4 {
      thread::sleep(Duration::from_millis(50));
      assert_eq!(cell.value(), 1);
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_is_ready_does_not_restart_clock() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter, Duration::from_millis(200));
   cell.value();

   thread::sleep(Duration::from_millis(120));
   assert!(cell.is_ready());
   thread::sleep(Duration::from_millis(120));
   assert!(!cell.is_ready());
   assert_eq!(cell.peek(), None);
}

#[test]
fn test_stale_force_reinitializes() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter, Duration::from_millis(50));
   assert_eq!(cell.value(), 1);
   thread::sleep(Duration::from_millis(150));
   // No peek in between: force itself notices the staleness.
   assert_eq!(cell.value(), 2);
   assert_eq!(cell.peek(), Some(2));
}

#[test]
fn test_accessors() {
   let ttl = Duration::from_secs(5);
   let cell = ExpiringCell::new(|| "Test Value", ttl);
   assert_eq!(cell.ttl(), ttl);

   cell.value();
   assert!(cell.elapsed_since_access() < Duration::from_secs(1));
}

#[test]
fn test_invalidate() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter, Duration::from_secs(60));
   assert_eq!(cell.invalidate(), None);

   cell.value();
   assert_eq!(cell.invalidate(), Some(1));
   assert!(!cell.is_ready());
   assert_eq!(cell.value(), 2);
}

#[test]
fn test_failure_leaves_cell_empty() {
   let calls = Arc::new(AtomicUsize::new(0));
   let cell = {
      let calls = Arc::clone(&calls);
      ExpiringCell::fallible(
         move || match calls.fetch_add(1, Ordering::SeqCst) {
            0 => Err("backend down"),
            _ => Ok("fresh"),
         },
         Duration::from_secs(60),
      )
   };

   assert_eq!(cell.force(), Err("backend down"));
   assert!(!cell.is_ready());
   assert_eq!(cell.peek(), None);
   assert_eq!(cell.force(), Ok("fresh"));
   assert!(cell.is_ready());
}

#[test]
fn test_multi_thread_force_runs_once_per_period() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = {
      let counter = Arc::clone(&counter);
      Arc::new(ExpiringCell::new(
         move || {
            thread::sleep(Duration::from_millis(20));
            counter.fetch_add(1, Ordering::SeqCst) + 1
         },
         Duration::from_secs(60),
      ))
   };

   let threads: Vec<_> = (0..8)
      .map(|_| {
         let cell = Arc::clone(&cell);
         thread::spawn(move || cell.value())
      })
      .collect();
   for handle in threads {
      assert_eq!(handle.join().unwrap(), 1);
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_through_trait() {
   let cell: Box<dyn DeferredValue<u8, Error = std::convert::Infallible>> =
      Box::new(ExpiringCell::new(|| 9u8, Duration::from_secs(60)));
   assert_eq!(cell.peek(), None);
   assert_eq!(cell.force(), Ok(9));
   assert!(cell.is_ready());
}
