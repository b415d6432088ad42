use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use poly_lazy::{DeferredValue, InitCell};

fn counting_cell(counter: &Arc<AtomicUsize>) -> InitCell<String> {
   let counter = Arc::clone(counter);
   InitCell::new(move || {
      let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
      format!("Initialized {n} time(s)")
   })
}

#[test]
fn test_new_is_not_ready() {
   let cell = InitCell::new(|| 42);
   assert!(!cell.is_ready());
   assert_eq!(cell.peek(), None);
   assert_eq!(cell.get(), None);
}

#[test]
fn test_force_initializes() {
   let cell = InitCell::new(|| "Hello, Lazy!".to_string());
   assert_eq!(cell.value(), "Hello, Lazy!");
   assert!(cell.is_ready());
   assert_eq!(cell.peek().as_deref(), Some("Hello, Lazy!"));
   assert_eq!(cell.get().map(String::as_str), Some("Hello, Lazy!"));
}

#[test]
fn test_initializer_runs_once() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter);

   let values: Vec<_> = (0..5).map(|_| cell.value()).collect();
   assert!(values.iter().all(|v| v == "Initialized 1 time(s)"));
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_peek_does_not_initialize() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter);
   for _ in 0..3 {
      assert_eq!(cell.peek(), None);
   }
   assert_eq!(counter.load(Ordering::SeqCst), 0);
   assert!(!cell.is_ready());
}

#[test]
fn test_failed_force_leaves_cell_empty() {
   let calls = Arc::new(AtomicUsize::new(0));
   let cell = {
      let calls = Arc::clone(&calls);
      InitCell::fallible(move || match calls.fetch_add(1, Ordering::SeqCst) {
         0 => Err("init error"),
         n => Ok(n * 10),
      })
   };

   assert_eq!(cell.force(), Err("init error"));
   assert!(!cell.is_ready());
   assert_eq!(cell.peek(), None);

   // The next force starts over instead of reporting a phantom value.
   assert_eq!(cell.force(), Ok(10));
   assert!(cell.is_ready());
   assert_eq!(cell.force(), Ok(10));
   assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_panicking_initializer_releases_cell() {
   let calls = Arc::new(AtomicUsize::new(0));
   let cell = {
      let calls = Arc::clone(&calls);
      Arc::new(InitCell::new(move || {
         if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first attempt blows up");
         }
         7
      }))
   };

   let panicked = {
      let cell = Arc::clone(&cell);
      thread::spawn(move || cell.value()).join()
   };
   assert!(panicked.is_err());
   assert!(!cell.is_ready());
   assert_eq!(cell.value(), 7);
}

#[test]
fn test_take_resets() {
   let counter = Arc::new(AtomicUsize::new(0));
   let mut cell = counting_cell(&counter);
   assert_eq!(cell.take(), None);

   cell.value();
   assert_eq!(cell.take().as_deref(), Some("Initialized 1 time(s)"));
   assert!(!cell.is_ready());
   assert_eq!(cell.peek(), None);

   assert_eq!(cell.value(), "Initialized 2 time(s)");
}

#[test]
fn test_multi_thread_force() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = {
      let counter = Arc::clone(&counter);
      Arc::new(InitCell::new(move || {
         counter.fetch_add(1, Ordering::SeqCst);
         // Keep the other threads parked for a while.
         thread::sleep(Duration::from_millis(20));
         42
      }))
   };

   let threads: Vec<_> = (0..10)
      .map(|_| {
         let cell = Arc::clone(&cell);
         thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            cell.value()
         })
      })
      .collect();

   for handle in threads {
      assert_eq!(handle.join().unwrap(), 42);
   }
   assert_eq!(cell.get(), Some(&42));
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_multi_thread_failure_hands_over() {
   // The first runner fails; a parked thread must take over and succeed.
   let calls = Arc::new(AtomicUsize::new(0));
   let cell = {
      let calls = Arc::clone(&calls);
      Arc::new(InitCell::fallible(move || {
         let n = calls.fetch_add(1, Ordering::SeqCst);
         thread::sleep(Duration::from_millis(20));
         if n == 0 {
            Err("flaky")
         } else {
            Ok(n)
         }
      }))
   };

   let threads: Vec<_> = (0..4)
      .map(|_| {
         let cell = Arc::clone(&cell);
         thread::spawn(move || cell.force())
      })
      .collect();
   let results: Vec<_> = threads.into_iter().map(|h| h.join().unwrap()).collect();

   assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
   assert!(results.iter().filter_map(|r| r.ok()).all(|v| v == 1));
   assert_eq!(calls.load(Ordering::SeqCst), 2);
   assert_eq!(cell.peek(), Some(1));
}

#[test]
fn test_through_trait_object() {
   fn read_twice<D: DeferredValue<u32>>(cell: &D) -> (Option<u32>, Option<u32>) {
      let before = cell.peek();
      let _ = cell.force();
      (before, cell.peek())
   }

   let cell = Arc::new(InitCell::new(|| 5u32));
   assert_eq!(read_twice(&cell), (None, Some(5)));
   assert!(DeferredValue::<u32>::is_ready(&cell));
}

#[test]
fn test_debug() {
   let cell = InitCell::new(|| 3);
   assert_eq!(format!("{cell:?}"), "InitCell(<uninit>)");
   cell.value();
   assert_eq!(format!("{cell:?}"), "InitCell(3)");
}

#[tokio::test]
async fn test_force_async() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = counting_cell(&counter);
   assert_eq!(cell.force_async().await.as_deref(), Ok("Initialized 1 time(s)"));
   assert_eq!(cell.force_async().await.as_deref(), Ok("Initialized 1 time(s)"));
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_force_async_concurrent() {
   let counter = Arc::new(AtomicUsize::new(0));
   let cell = {
      let counter = Arc::clone(&counter);
      Arc::new(InitCell::new(move || {
         counter.fetch_add(1, Ordering::SeqCst);
         thread::sleep(Duration::from_millis(20));
         99
      }))
   };

   let tasks: Vec<_> = (0..8)
      .map(|_| {
         let cell = Arc::clone(&cell);
         tokio::spawn(async move { cell.force_async().await })
      })
      .collect();
   for task in tasks {
      assert_eq!(task.await.unwrap(), Ok(99));
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}
