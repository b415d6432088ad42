use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use poly_lazy::{RetryPolicy, RetryingCell};

static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

#[tokio::main]
async fn main() {
   let policy = RetryPolicy::new(4, Duration::from_millis(20)).unwrap();
   let endpoint = Arc::new(RetryingCell::new(
      || {
         let attempt = ATTEMPTS.fetch_add(1, Ordering::Relaxed) + 1;
         println!("Resolving endpoint (attempt {attempt})...");
         if attempt < 3 {
            Err(format!("lookup failed on attempt {attempt}"))
         } else {
            Ok("10.0.0.7:443".to_string())
         }
      },
      policy,
   ));

   let tasks: Vec<_> = (0..5)
      .map(|_| {
         let endpoint = Arc::clone(&endpoint);
         tokio::spawn(async move {
            println!("Task access: {:?}", endpoint.force_async().await);
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert_eq!(endpoint.peek(), Some("10.0.0.7:443".to_string()));
   assert_eq!(ATTEMPTS.load(Ordering::Relaxed), 3); // One retry loop for all tasks
}
