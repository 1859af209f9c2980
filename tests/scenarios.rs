use elheap::{
  Allocation, BlockState, BufferSource, Heap, HeapConfig, HeapError, OVERHEAD, SourceError,
};

const PAGE: usize = 4096;

fn heap_with_payload(
  payload: usize,
  capacity: usize,
) -> Heap<BufferSource> {
  let config = HeapConfig::default()
    .with_initial_bytes(payload + OVERHEAD)
    .with_page_size(PAGE);

  Heap::with_source(BufferSource::with_page_size(capacity, PAGE), config).unwrap()
}

#[test]
fn test_single_block_then_exhaustion() {
  let mut heap = heap_with_payload(128, 128 + OVERHEAD);

  let block = heap.allocate(128).unwrap();
  heap.payload_mut(&block).fill(0x5A);
  assert!(heap.payload(&block).iter().all(|&b| b == 0x5A));

  assert!(matches!(
    heap.allocate(128),
    Err(HeapError::OutOfMemory { requested: 128 })
  ));
  heap.inspect().verify().unwrap();
}

#[test]
fn test_two_allocations_split_one_block() {
  let mut heap = heap_with_payload(256, 256 + OVERHEAD);

  let a = heap.allocate(64).unwrap();
  let b = heap.allocate(64).unwrap();

  let snapshot = heap.inspect();
  assert_eq!(snapshot.used.length, 2);
  for &offset in &snapshot.used.blocks {
    assert_eq!(snapshot.block(offset).unwrap().size, 64);
  }

  // Both handed-out blocks paid for their own header and footer.
  assert_eq!(snapshot.free.length, 1);
  let rest = snapshot.block(snapshot.free.blocks[0]).unwrap();
  assert_eq!(rest.size, 256 - 128 - 2 * OVERHEAD);
  snapshot.verify().unwrap();

  heap.release(a);
  heap.release(b);
}

fn release_both(first_released_is_first_allocated: bool) {
  let mut heap = heap_with_payload(1024, 1024 + OVERHEAD);
  let original = heap.inspect();

  let first = heap.allocate(100).unwrap();
  let second = heap.allocate(50).unwrap();

  if first_released_is_first_allocated {
    heap.release(first);
    heap.release(second);
  } else {
    heap.release(second);
    heap.release(first);
  }

  let snapshot = heap.inspect();
  assert_eq!(snapshot.free.length, 1);
  assert_eq!(snapshot.blocks.len(), 1);
  assert_eq!(snapshot.blocks[0].size, 1024);
  assert_eq!(snapshot, original);
  snapshot.verify().unwrap();
}

#[test]
fn test_release_in_allocation_order_coalesces() {
  release_both(true);
}

#[test]
fn test_release_in_reverse_order_coalesces() {
  release_both(false);
}

#[test]
fn test_grow_merges_with_free_top_block() {
  let mut heap = heap_with_payload(PAGE - OVERHEAD, 4 * PAGE);
  let _low = heap.allocate(100).unwrap();

  let before = heap.inspect();
  let top = before.blocks.last().unwrap().clone();
  assert_eq!(top.state, BlockState::Free);

  heap.grow(1).unwrap();

  let after = heap.inspect();
  assert_eq!(after.total_bytes, 2 * PAGE);
  assert_eq!(after.blocks.len(), before.blocks.len());
  let merged = after.blocks.last().unwrap();
  assert_eq!(merged.offset, top.offset);
  assert_eq!(merged.size, top.size + PAGE);
  assert_eq!(after.free.length, 1);
  after.verify().unwrap();
}

#[test]
fn test_grow_then_retry_after_exhaustion() {
  let mut heap = heap_with_payload(PAGE - OVERHEAD, 4 * PAGE);

  let big = 2 * PAGE;
  assert!(matches!(heap.allocate(big), Err(HeapError::OutOfMemory { .. })));

  let pages = heap.pages_needed(big).unwrap();
  heap.grow(pages).unwrap();

  let block = heap.allocate(big).unwrap();
  assert_eq!(block.size(), big);
  heap.inspect().verify().unwrap();
}

#[test]
fn test_grow_failure_is_reported() {
  let mut heap = heap_with_payload(PAGE - OVERHEAD, PAGE);
  let before = heap.inspect();

  let err = heap.grow(3).unwrap_err();
  assert!(matches!(
    err,
    HeapError::Growth {
      pages: 3,
      source: SourceError::Exhausted { .. }
    }
  ));
  assert_eq!(err.to_string(), "unable to map additional 3 pages");
  assert_eq!(heap.inspect(), before);
}

#[test]
fn test_round_trip_restores_free_list() {
  let mut heap = heap_with_payload(2048, 2048 + OVERHEAD);
  let _keep = heap.allocate(300).unwrap();
  let free_before = heap.free_bytes();

  for size in [1, 7, 64, 500, 1700 - 2 * OVERHEAD] {
    let block = heap.allocate(size).unwrap();
    heap.release(block);

    assert_eq!(heap.free_bytes(), free_before);
    heap.inspect().verify().unwrap();
  }
}

#[test]
fn test_invariants_hold_through_mixed_workload() {
  let mut heap = heap_with_payload(PAGE - OVERHEAD, 16 * PAGE);
  let mut live: Vec<Allocation> = Vec::new();
  let mut seed: u64 = 0x2545_F491_4F6C_DD1D;

  let mut next = move || {
    seed ^= seed << 13;
    seed ^= seed >> 7;
    seed ^= seed << 17;
    seed
  };

  for _ in 0..2000 {
    let roll = next();
    match roll % 8 {
      0..=3 => {
        let size = (next() % 400 + 1) as usize;
        match heap.allocate(size) {
          Ok(block) => live.push(block),
          Err(HeapError::OutOfMemory { .. }) => {
            let _ = heap.grow(1);
          }
          Err(other) => panic!("unexpected error: {other}"),
        }
      }
      4..=6 if !live.is_empty() => {
        let idx = (next() as usize) % live.len();
        heap.release(live.swap_remove(idx));
      }
      _ => {}
    }

    let snapshot = heap.inspect();
    snapshot.verify().unwrap();
    assert_eq!(heap.used_bytes() + heap.free_bytes(), heap.total_bytes());
    assert_eq!(snapshot.used.length, live.len());
  }

  for block in live.drain(..) {
    heap.release(block);
  }

  let snapshot = heap.inspect();
  assert_eq!(snapshot.blocks.len(), 1);
  assert_eq!(snapshot.blocks[0].size, heap.total_bytes() - OVERHEAD);
}

#[test]
fn test_mmap_heap() {
  let mut heap = Heap::new(HeapConfig::pages(1)).unwrap();

  let a = heap.allocate(200).unwrap();
  let b = heap.allocate(300).unwrap();
  heap.payload_mut(&a).fill(1);
  heap.payload_mut(&b).fill(2);
  heap.release(a);

  let before = heap.inspect();
  match heap.grow(1) {
    Ok(()) => assert_eq!(heap.total_bytes(), before.total_bytes + heap.page_size()),
    Err(HeapError::Growth { .. }) => assert_eq!(heap.inspect(), before),
    Err(other) => panic!("unexpected error: {other}"),
  }

  heap.inspect().verify().unwrap();
  heap.release(b);
  heap.teardown();
}

#[test]
#[should_panic(expected = "does not belong to this heap")]
fn test_handles_do_not_cross_heaps() {
  let mut a = heap_with_payload(1024, 1024 + OVERHEAD);
  let mut b = heap_with_payload(1024, 1024 + OVERHEAD);

  // Same offsets in both heaps, so only the owner check can tell them apart.
  let _b_block = b.allocate(100).unwrap();
  let a_block = a.allocate(100).unwrap();

  b.release(a_block);
}
