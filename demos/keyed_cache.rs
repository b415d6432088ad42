use std::sync::Arc;
use std::thread;
use std::time::Duration;

use poly_lazy::{ExpiringCell, KeyedCache};

fn main() {
   let templates: Arc<KeyedCache<String, String>> = Arc::new(KeyedCache::new());

   let threads: Vec<_> = ["index", "about", "index", "index"]
      .into_iter()
      .map(|name| {
         let templates = Arc::clone(&templates);
         thread::spawn(move || {
            let cell = templates.get_or_create(name.to_string(), move || {
               println!("Compiling template {name}...");
               thread::sleep(Duration::from_millis(20));
               format!("<compiled {name}>")
            });
            println!("{name} -> {}", cell.value());
         })
      })
      .collect();
   for t in threads {
      t.join().unwrap();
   }
   println!("{} templates cached", templates.len());

   // Expiry is a per-cell policy; it is not layered onto the cache.
   let session = ExpiringCell::new(|| "session-token".to_string(), Duration::from_millis(30));
   println!("session: {}", session.value());
   thread::sleep(Duration::from_millis(60));
   println!("session after idle: {:?}", session.peek());
}
