use std::io::Read;

use elheap::{Heap, HeapConfig, HeapError};

/// Waits until the user presses ENTER, so the heap can be looked at with
/// `pmap` or `gdb` between steps. Skipped when `ELHEAP_DEMO_NONSTOP` is set.
fn block_until_enter_pressed() {
  if std::env::var_os("ELHEAP_DEMO_NONSTOP").is_some() {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_stats(
  label: &str,
  heap: &Heap,
) {
  println!("\n[{label}] PID = {}", std::process::id());
  print!("{}", heap.inspect());
}

fn main() -> Result<(), HeapError> {
  simple_logger::SimpleLogger::new()
    .with_level(log::LevelFilter::Trace)
    .init()
    .ok();

  let mut heap = Heap::new(HeapConfig::pages(1))?;
  print_stats("start", &heap);
  block_until_enter_pressed();

  // 1) Two small allocations carve the single free block from the bottom up.
  let first = heap.allocate(128)?;
  let second = heap.allocate(48)?;
  heap.payload_mut(&first).fill(0xAB);
  heap.payload_mut(&second).copy_from_slice(b"explicit lists keep free and used blocks apart!!");
  print_stats("allocate 128, 48", &heap);
  block_until_enter_pressed();

  // 2) Freeing the first leaves a hole that the next small request reuses.
  let hole = first.as_ptr();
  heap.release(first);
  let third = heap.allocate(64)?;
  println!(
    "\n[reuse] third == old first? {}",
    if third.as_ptr() == hole { "Yes, first fit took the hole" } else { "No" }
  );
  print_stats("release 128, allocate 64", &heap);
  block_until_enter_pressed();

  // 3) A request larger than anything free fails until the heap grows.
  let big = 3 * heap.page_size();
  match heap.allocate(big) {
    Err(HeapError::OutOfMemory { requested }) => println!("\n[grow] {requested} bytes do not fit yet"),
    other => println!("\n[grow] unexpected: {other:?}"),
  }

  let pages = heap.pages_needed(big).unwrap_or(usize::MAX);
  match heap.grow(pages) {
    Ok(()) => {
      let large = heap.allocate(big)?;
      print_stats("grow and allocate large", &heap);
      heap.release(large);
    }
    Err(e) => println!("[grow] {e}"),
  }
  block_until_enter_pressed();

  // 4) Releasing everything collapses the heap back into one free block.
  heap.release(second);
  heap.release(third);
  print_stats("all released", &heap);

  if let Err(violation) = heap.inspect().verify() {
    println!("heap is inconsistent: {violation}");
  }

  heap.teardown();
  println!("\n[end] heap torn down");
  Ok(())
}
