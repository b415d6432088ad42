use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use poly_lazy::InitCell;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() {
   let data = Arc::new(InitCell::new(|| {
      // This closure runs only once
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Initializing data...");
      // Simulate work
      thread::sleep(Duration::from_millis(50));
      "Expensive data".to_string()
   }));

   let threads: Vec<_> = (0..5)
      .map(|_| {
         let data = Arc::clone(&data);
         thread::spawn(move || {
            println!("Thread access: {}", data.value());
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert_eq!(data.peek(), Some("Expensive data".to_string()));
   assert_eq!(COUNTER.load(Ordering::Relaxed), 1); // Initializer ran only once
   println!("Final data: {}", data.value());
}
