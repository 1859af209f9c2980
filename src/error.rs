use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum HeapError {
  /// The initial arena cannot hold even one header and footer.
  #[error("heap size {bytes} too small for a block overhead {overhead}")]
  ArenaTooSmall { bytes: usize, overhead: usize },

  #[error("page size must not be zero")]
  ZeroPageSize,

  #[error("{pages} pages of {page_size} bytes overflow the address space")]
  ArenaOverflow { pages: usize, page_size: usize },

  #[error("a fixed start address must not be null")]
  NullStartAddress,

  #[error("zero-byte allocations are not supported")]
  ZeroSize,

  /// No free block is large enough. Nothing changed; growing the heap and
  /// retrying may succeed.
  #[error("no free block can hold {requested} bytes")]
  OutOfMemory { requested: usize },

  /// The heap could not be extended contiguously. Nothing changed.
  #[error("unable to map additional {pages} pages")]
  Growth {
    pages: usize,
    #[source]
    source: SourceError,
  },

  #[error("{pages} pages of {page_size} bytes cannot form a block")]
  BadGrowth { pages: usize, page_size: usize },

  #[error("failed to acquire the initial arena: {0}")]
  Source(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, HeapError>;
