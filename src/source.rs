//! Where the arena's bytes come from.

use std::{alloc, io, ptr::NonNull};

use thiserror::Error;

use crate::config::DEFAULT_PAGE_BYTES;

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("requested {requested} bytes but only {available} remain")]
  Exhausted { requested: usize, available: usize },

  #[error("region wanted at {requested:#x} but landed at {actual:#x}")]
  Misplaced { requested: usize, actual: usize },

  #[error("operating system refused the mapping: {0}")]
  Os(#[from] io::Error),
}

/// Hands out read/write byte ranges for a heap to live in.
///
/// # Safety
///
/// A successful `acquire` must return `len` initialized (typically zeroed)
/// bytes that are readable, writable and untouched by anyone else until they
/// are given back with `release`.
/// When an address is requested the region must start exactly there.
pub unsafe trait RegionSource {
  fn acquire(
    &mut self,
    at: Option<NonNull<u8>>,
    len: usize,
  ) -> Result<NonNull<u8>, SourceError>;

  /// # Safety
  ///
  /// `at..at + len` must have come from `acquire` on this source and must
  /// not be used again afterwards.
  unsafe fn release(
    &mut self,
    at: NonNull<u8>,
    len: usize,
  );

  fn page_size(&self) -> usize;
}

/// Anonymous private mappings straight from the kernel.
#[derive(Debug, Default)]
pub struct Mmap;

impl Mmap {
  pub fn new() -> Self {
    Self
  }
}

unsafe impl RegionSource for Mmap {
  fn acquire(
    &mut self,
    at: Option<NonNull<u8>>,
    len: usize,
  ) -> Result<NonNull<u8>, SourceError> {
    let hint = at.map_or(std::ptr::null_mut(), |p| p.as_ptr().cast());

    let addr = unsafe {
      libc::mmap(
        hint,
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(io::Error::last_os_error().into());
    }

    // The address is only a hint to the kernel, so check that it was honoured.
    if let Some(want) = at {
      if addr as usize != want.as_ptr() as usize {
        unsafe { libc::munmap(addr, len) };
        return Err(SourceError::Misplaced {
          requested: want.as_ptr() as usize,
          actual: addr as usize,
        });
      }
    }

    NonNull::new(addr.cast()).ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable).into())
  }

  unsafe fn release(
    &mut self,
    at: NonNull<u8>,
    len: usize,
  ) {
    unsafe { libc::munmap(at.as_ptr().cast(), len) };
  }

  fn page_size(&self) -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
      n if n > 0 => n as usize,
      _ => DEFAULT_PAGE_BYTES,
    }
  }
}

/// A single reservation made up front and handed out in contiguous prefixes.
///
/// The first `acquire` returns the start of the buffer; every later one must
/// ask for the address right after what has been handed out so far. Asking
/// for more than the remaining capacity fails, which makes growth failure
/// reproducible.
#[derive(Debug)]
pub struct BufferSource {
  base: NonNull<u8>,
  capacity: usize,
  committed: usize,
  page_size: usize,
}

const BUFFER_ALIGN: usize = 16;

impl BufferSource {
  pub fn new(capacity: usize) -> Self {
    Self::with_page_size(capacity, DEFAULT_PAGE_BYTES)
  }

  pub fn with_page_size(
    capacity: usize,
    page_size: usize,
  ) -> Self {
    let layout = Self::layout(capacity);
    let base = unsafe { alloc::alloc_zeroed(layout) };
    let base = match NonNull::new(base) {
      Some(base) => base,
      None => alloc::handle_alloc_error(layout),
    };

    Self {
      base,
      capacity,
      committed: 0,
      page_size,
    }
  }

  /// Where the first `acquire` will start.
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes currently handed out.
  pub fn committed(&self) -> usize {
    self.committed
  }

  fn layout(capacity: usize) -> alloc::Layout {
    // A zero-sized layout cannot be allocated, so reserve at least one byte.
    match alloc::Layout::from_size_align(capacity.max(1), BUFFER_ALIGN) {
      Ok(layout) => layout,
      Err(_) => panic!("buffer capacity {capacity} is too large"),
    }
  }

  fn next_address(&self) -> usize {
    self.base.as_ptr() as usize + self.committed
  }
}

unsafe impl RegionSource for BufferSource {
  fn acquire(
    &mut self,
    at: Option<NonNull<u8>>,
    len: usize,
  ) -> Result<NonNull<u8>, SourceError> {
    let next = self.next_address();

    if let Some(want) = at {
      if want.as_ptr() as usize != next {
        return Err(SourceError::Misplaced {
          requested: want.as_ptr() as usize,
          actual: next,
        });
      }
    }

    let available = self.capacity - self.committed;
    if len > available {
      return Err(SourceError::Exhausted {
        requested: len,
        available,
      });
    }

    let region = unsafe { self.base.add(self.committed) };
    self.committed += len;
    Ok(region)
  }

  unsafe fn release(
    &mut self,
    at: NonNull<u8>,
    len: usize,
  ) {
    // Only the topmost region can be returned; anything else stays committed
    // until the buffer itself is dropped.
    if at.as_ptr() as usize + len == self.next_address() {
      self.committed -= len;
    }
  }

  fn page_size(&self) -> usize {
    self.page_size
  }
}

impl Drop for BufferSource {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), Self::layout(self.capacity)) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_buffer_hands_out_contiguous_prefixes() {
    let mut source = BufferSource::new(1024);

    let first = source.acquire(None, 256).unwrap();
    let second = source.acquire(Some(unsafe { first.add(256) }), 512).unwrap();

    assert_eq!(unsafe { first.add(256) }, second);
    assert_eq!(source.committed(), 768);
  }

  #[test]
  fn test_buffer_refuses_wrong_address() {
    let mut source = BufferSource::new(1024);

    let first = source.acquire(None, 256).unwrap();
    let result = source.acquire(Some(unsafe { first.add(8) }), 64);

    assert!(matches!(result, Err(SourceError::Misplaced { .. })));
    assert_eq!(source.committed(), 256);
  }

  #[test]
  fn test_buffer_exhaustion() {
    let mut source = BufferSource::new(300);

    let first = source.acquire(None, 256).unwrap();
    let result = source.acquire(Some(unsafe { first.add(256) }), 64);

    assert!(matches!(
      result,
      Err(SourceError::Exhausted {
        requested: 64,
        available: 44
      })
    ));
  }

  #[test]
  fn test_buffer_release_top() {
    let mut source = BufferSource::new(1024);

    let first = source.acquire(None, 256).unwrap();
    let second = source.acquire(Some(unsafe { first.add(256) }), 256).unwrap();

    unsafe { source.release(second, 256) };
    assert_eq!(source.committed(), 256);

    unsafe { source.release(first, 256) };
    assert_eq!(source.committed(), 0);
  }

  #[test]
  fn test_mmap_round_trip() {
    let mut source = Mmap::new();
    let page = source.page_size();

    let region = source.acquire(None, page).unwrap();

    unsafe {
      region.as_ptr().write(0xAB);
      region.as_ptr().add(page - 1).write(0xCD);

      assert_eq!(region.as_ptr().read(), 0xAB);
      assert_eq!(region.as_ptr().add(page - 1).read(), 0xCD);

      source.release(region, page);
    }
  }
}
