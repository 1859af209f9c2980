use std::{
  fmt,
  ptr::NonNull,
  slice,
  sync::atomic::{AtomicUsize, Ordering},
};

use log::{debug, trace, warn};

use crate::{
  arena::Arena,
  block::{BlockState, Header, OVERHEAD},
  config::HeapConfig,
  error::{HeapError, Result},
  inspect::{BlockSnapshot, HeapSnapshot, ListSnapshot},
  list::BlockList,
  source::{Mmap, RegionSource},
};

static NEXT_HEAP_ID: AtomicUsize = AtomicUsize::new(1);

/// Proof of a live allocation, handed out by [`Heap::allocate`] and consumed
/// by [`Heap::release`]. It cannot be copied, so a block cannot be released
/// twice through safe code. Handing it to any heap other than the one that
/// made it panics.
#[must_use = "dropping an Allocation leaks its block until the heap is torn down"]
pub struct Allocation {
  heap: usize,
  block: usize,
  ptr: NonNull<u8>,
  size: usize,
}

impl Allocation {
  /// Start of the payload, just past the block header.
  pub fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }

  /// Payload bytes that were asked for.
  pub fn size(&self) -> usize {
    self.size
  }
}

impl fmt::Debug for Allocation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Allocation")
      .field("heap", &self.heap)
      .field("ptr", &self.ptr)
      .field("size", &self.size)
      .finish()
  }
}

/// An explicit-list heap: one arena split into blocks, each block on exactly
/// one of the free and used lists.
///
/// Not thread safe; wrap the whole heap in a lock to share it.
pub struct Heap<S: RegionSource = Mmap> {
  id: usize,
  source: S,
  arena: Arena,
  free: BlockList,
  used: BlockList,
  page_size: usize,
}

impl Heap<Mmap> {
  /// A heap whose arena is mapped straight from the kernel.
  pub fn new(config: HeapConfig) -> Result<Self> {
    Self::with_source(Mmap::new(), config)
  }
}

impl<S: RegionSource> Heap<S> {
  /// Acquires the initial arena from `source` and formats it as one free block.
  pub fn with_source(
    mut source: S,
    config: HeapConfig,
  ) -> Result<Self> {
    let page_size = config.page_size.unwrap_or_else(|| source.page_size());
    if page_size == 0 {
      return Err(HeapError::ZeroPageSize);
    }

    let bytes = config.initial.bytes(page_size)?;
    if bytes < OVERHEAD {
      warn!("heap size {bytes} too small for a block overhead {OVERHEAD}");
      return Err(HeapError::ArenaTooSmall {
        bytes,
        overhead: OVERHEAD,
      });
    }

    let at = config
      .start_address
      .map(|addr| NonNull::new(addr as *mut u8).ok_or(HeapError::NullStartAddress))
      .transpose()?;
    let start = source.acquire(at, bytes)?;

    let mut heap = Self {
      id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
      source,
      arena: Arena::new(start, bytes),
      free: BlockList::new(),
      used: BlockList::new(),
      page_size,
    };

    heap.arena.format(0, Header::new(bytes - OVERHEAD, BlockState::Free));
    heap.free.add_front(&mut heap.arena, 0);

    debug!(
      "heap initialized at {:?}, {bytes} bytes, page size {page_size}",
      heap.arena.start()
    );

    Ok(heap)
  }

  /// Hands out a block with room for `size` payload bytes, or
  /// [`HeapError::OutOfMemory`] when no free block is big enough. The heap is
  /// never grown behind the caller's back.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Allocation> {
    if size == 0 {
      return Err(HeapError::ZeroSize);
    }

    let Some(block) = self.find_first_fit(size) else {
      warn!("no free block for {size} bytes ({} free)", self.free.bytes());
      return Err(HeapError::OutOfMemory { requested: size });
    };

    self.free.remove(&mut self.arena, block);

    if let Some(rest) = self.split(block, size) {
      self.free.add_front(&mut self.arena, rest);
    }

    self.arena.update_header(block, |h| h.state = BlockState::Used);
    self.used.add_front(&mut self.arena, block);

    let ptr = self.arena.payload(block);
    trace!("allocate({size}) -> block {block} at {ptr:?}");

    Ok(Allocation {
      heap: self.id,
      block,
      ptr,
      size,
    })
  }

  /// Gives a block back and merges it with any free neighbours.
  pub fn release(
    &mut self,
    allocation: Allocation,
  ) {
    self.check_owner(&allocation);
    let block = allocation.block;

    debug_assert_eq!(self.arena.header(block).state, BlockState::Used);

    self.used.remove(&mut self.arena, block);
    self.arena.update_header(block, |h| h.state = BlockState::Free);
    self.free.add_front(&mut self.arena, block);

    trace!("release(block {block}, {} bytes)", allocation.size);

    self.merge_with_above(Some(block));
  }

  /// Appends `pages` pages at the top of the arena as one free block, merging
  /// it into the old topmost block when that one is free.
  pub fn grow(
    &mut self,
    pages: usize,
  ) -> Result<()> {
    if pages == 0 {
      return Ok(());
    }

    let bytes = match pages.checked_mul(self.page_size) {
      Some(bytes) if bytes >= OVERHEAD => bytes,
      _ => {
        return Err(HeapError::BadGrowth {
          pages,
          page_size: self.page_size,
        });
      }
    };

    // A successful acquire with an address always starts exactly there.
    if let Err(source) = self.source.acquire(Some(self.arena.end()), bytes) {
      warn!("unable to map additional {pages} pages: {source}");
      return Err(HeapError::Growth { pages, source });
    }

    let block = self.arena.len();
    self.arena.extend(bytes);
    self.arena.format(block, Header::new(bytes - OVERHEAD, BlockState::Free));
    self.free.add_front(&mut self.arena, block);

    debug!(
      "grew heap by {pages} pages to {} bytes",
      self.arena.len()
    );

    // Nothing can be above the new block, so only the old top needs a look.
    let below = self.arena.block_below(block);
    if below.is_some_and(|b| self.is_free(b)) {
      self.merge_with_above(below);
    }

    Ok(())
  }

  /// Pages `grow` needs so that a request for `size` bytes fits in a block of
  /// its own, or `None` if that many bytes cannot be counted.
  pub fn pages_needed(
    &self,
    size: usize,
  ) -> Option<usize> {
    Some(size.checked_add(OVERHEAD)?.div_ceil(self.page_size))
  }

  /// Hands the arena back to the region source.
  pub fn teardown(self) {
    drop(self);
  }

  pub fn payload(
    &self,
    allocation: &Allocation,
  ) -> &[u8] {
    self.check_owner(allocation);
    unsafe { slice::from_raw_parts(allocation.ptr.as_ptr(), allocation.size) }
  }

  pub fn payload_mut(
    &mut self,
    allocation: &Allocation,
  ) -> &mut [u8] {
    self.check_owner(allocation);
    unsafe { slice::from_raw_parts_mut(allocation.ptr.as_ptr(), allocation.size) }
  }

  pub fn start(&self) -> NonNull<u8> {
    self.arena.start()
  }

  pub fn end(&self) -> NonNull<u8> {
    self.arena.end()
  }

  pub fn total_bytes(&self) -> usize {
    self.arena.len()
  }

  /// Bytes on the free list, overhead included.
  pub fn free_bytes(&self) -> usize {
    self.free.bytes()
  }

  /// Bytes on the used list, overhead included.
  pub fn used_bytes(&self) -> usize {
    self.used.bytes()
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  /// Structural copy of both lists and of every block in address order.
  pub fn inspect(&self) -> HeapSnapshot {
    let list = |list: &BlockList| ListSnapshot {
      length: list.len(),
      bytes: list.bytes(),
      blocks: list.iter(&self.arena).collect(),
    };

    let blocks = self
      .arena
      .walk()
      .map(|at| {
        let header = self.arena.header(at);
        BlockSnapshot {
          offset: at,
          state: header.state,
          size: header.size,
          prev: header.prev,
          next: header.next,
          footer_size: self.arena.footer(self.arena.footer_of(at)).size,
        }
      })
      .collect();

    HeapSnapshot {
      start: self.arena.start().as_ptr() as usize,
      end: self.arena.end().as_ptr() as usize,
      total_bytes: self.arena.len(),
      free: list(&self.free),
      used: list(&self.used),
      blocks,
    }
  }

  /// First free block with at least `size` payload bytes, in list order.
  fn find_first_fit(
    &self,
    size: usize,
  ) -> Option<usize> {
    self.free.iter(&self.arena).find(|&block| {
      let header = self.arena.header(block);
      header.state == BlockState::Free && header.size >= size
    })
  }

  /// Shrinks `block` to `size` and turns the rest into a new free block right
  /// above it, returned unlinked. Leaves `block` alone and returns `None` when
  /// the rest could not hold a header and footer.
  fn split(
    &mut self,
    block: usize,
    size: usize,
  ) -> Option<usize> {
    let old_size = self.arena.header(block).size;
    if old_size < size + OVERHEAD {
      return None;
    }

    self.arena.resize(block, size);

    let rest = self.arena.block_above(block)?;
    self.arena.format(rest, Header::new(old_size - size - OVERHEAD, BlockState::Free));

    trace!("split block {block}: {size} + {}", old_size - size - OVERHEAD);

    Some(rest)
  }

  /// Merges `lower` with every free block above it, then keeps walking down
  /// while the block below is free, so the whole run of free blocks around
  /// `lower` ends up as one.
  fn merge_with_above(
    &mut self,
    lower: Option<usize>,
  ) {
    let Some(mut lower) = lower else {
      return;
    };

    if !self.is_free(lower) {
      return;
    }

    loop {
      while self.absorb_above(lower) {}

      match self.arena.block_below(lower) {
        Some(below) if self.is_free(below) => lower = below,
        _ => break,
      }
    }
  }

  /// Folds the free block directly above `lower` into it. Returns whether
  /// anything was merged.
  fn absorb_above(
    &mut self,
    lower: usize,
  ) -> bool {
    let Some(higher) = self.arena.block_above(lower) else {
      return false;
    };

    if !self.is_free(higher) {
      return false;
    }

    self.free.remove(&mut self.arena, higher);
    self.free.remove(&mut self.arena, lower);

    let size = self.arena.header(lower).size + self.arena.header(higher).size + OVERHEAD;
    self.arena.resize(lower, size);

    self.free.add_front(&mut self.arena, lower);

    trace!("merged block {higher} into block {lower}, now {size} bytes");

    true
  }

  fn is_free(
    &self,
    block: usize,
  ) -> bool {
    self.arena.header(block).state == BlockState::Free
  }

  /// Handles are only minted by `allocate` and consumed by `release`, so a
  /// matching id means the block is live in this heap.
  fn check_owner(
    &self,
    allocation: &Allocation,
  ) {
    assert_eq!(
      allocation.heap, self.id,
      "{allocation:?} does not belong to this heap"
    );
  }
}

impl<S: RegionSource> Drop for Heap<S> {
  fn drop(&mut self) {
    debug!(
      "tearing down heap at {:?}, {} bytes",
      self.arena.start(),
      self.arena.len()
    );
    unsafe { self.source.release(self.arena.start(), self.arena.len()) };
  }
}

impl<S: RegionSource> fmt::Debug for Heap<S> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Heap")
      .field("id", &self.id)
      .field("start", &self.arena.start())
      .field("total_bytes", &self.arena.len())
      .field("free", &self.free)
      .field("used", &self.used)
      .finish()
  }
}
