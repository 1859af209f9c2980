use crate::error::{HeapError, Result};

/// Page size assumed when the operating system does not report one.
pub const DEFAULT_PAGE_BYTES: usize = 4096;

/// How big the arena is at start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaSize {
  /// Exactly this many bytes, overhead included.
  Bytes(usize),
  /// This many pages of the heap's page size, the same unit `grow` uses.
  Pages(usize),
}

/// How a heap is laid out when it is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  pub initial: ArenaSize,
  /// Growth unit; `None` uses the region source's page size. Must not be zero.
  pub page_size: Option<usize>,
  /// When set, the arena must start exactly at this address. Zero is rejected.
  pub start_address: Option<usize>,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::pages(1)
  }
}

impl HeapConfig {
  /// An arena of `pages` pages, counted in the heap's page size.
  pub fn pages(pages: usize) -> Self {
    Self {
      initial: ArenaSize::Pages(pages),
      page_size: None,
      start_address: None,
    }
  }

  pub fn with_initial_bytes(
    mut self,
    bytes: usize,
  ) -> Self {
    self.initial = ArenaSize::Bytes(bytes);
    self
  }

  pub fn with_page_size(
    mut self,
    page_size: usize,
  ) -> Self {
    self.page_size = Some(page_size);
    self
  }

  pub fn with_start_address(
    mut self,
    address: usize,
  ) -> Self {
    self.start_address = Some(address);
    self
  }
}

impl ArenaSize {
  /// Byte count once the page size is known.
  pub fn bytes(
    self,
    page_size: usize,
  ) -> Result<usize> {
    match self {
      ArenaSize::Bytes(bytes) => Ok(bytes),
      ArenaSize::Pages(pages) => pages
        .checked_mul(page_size)
        .ok_or(HeapError::ArenaOverflow { pages, page_size }),
    }
  }
}
