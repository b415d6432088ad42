use std::sync::atomic::{AtomicBool, Ordering};

use poly_lazy::InitCell;

static FAIL: AtomicBool = AtomicBool::new(true);

fn main() {
   let maybe_data = InitCell::fallible(|| {
      let fail = FAIL.load(Ordering::Relaxed);
      println!("Attempting initialization (fail={fail})...");
      if fail {
         Err("Initialization failed!")
      } else {
         Ok("Successfully initialized".to_string())
      }
   });

   // First attempt fails
   match maybe_data.force() {
      Ok(_) => panic!("Should have failed"),
      Err(e) => println!("Caught error: {e}"),
   }
   assert!(!maybe_data.is_ready()); // Still uninitialized

   // Second attempt succeeds
   FAIL.store(false, Ordering::Relaxed);
   match maybe_data.force() {
      Ok(data) => println!("Got data: {data}"),
      Err(_) => panic!("Should have succeeded"),
   }
   assert!(maybe_data.is_ready());

   // The initializer is not consulted again, even if it would fail now
   FAIL.store(true, Ordering::Relaxed);
   match maybe_data.force() {
      Ok(data) => println!("Got data again: {data}"),
      Err(_) => panic!("Should have returned existing data"),
   }
}
