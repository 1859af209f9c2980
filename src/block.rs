use std::{fmt, mem};

/// Marker stored in the `size` of list sentinels, which never describe real bytes.
pub const UNINITIALIZED: usize = usize::MAX;

/// Link value naming the begin sentinel of a block list.
pub(crate) const LIST_BEGIN: usize = usize::MAX;
/// Link value naming the end sentinel of a block list.
pub(crate) const LIST_END: usize = usize::MAX - 1;
/// Link value of a node with nothing on that side.
pub(crate) const NO_LINK: usize = usize::MAX - 2;

pub const HEADER_SIZE: usize = mem::size_of::<Header>();
pub const FOOTER_SIZE: usize = mem::size_of::<Footer>();

/// Bytes every block spends on bookkeeping: one header plus one footer.
pub const OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;

/// Word-sized so that a `Header` has no padding: stale headers end up inside
/// payloads after a merge, and every byte there must be initialized.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
  Free = b'a' as usize,
  Used = b'u' as usize,
  ListBegin = b'B' as usize,
  ListEnd = b'E' as usize,
}

impl fmt::Display for BlockState {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{}", *self as u8 as char)
  }
}

/// Sits at the low end of every block. `prev` and `next` are arena offsets
/// (or one of the sentinel link values) and only mean something while the
/// block is linked into a list.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Header {
  pub size: usize,
  pub state: BlockState,
  pub prev: usize,
  pub next: usize,
}

impl Header {
  pub fn new(
    size: usize,
    state: BlockState,
  ) -> Self {
    Self {
      size,
      state,
      prev: NO_LINK,
      next: NO_LINK,
    }
  }

  pub(crate) fn sentinel(state: BlockState) -> Self {
    Self::new(UNINITIALIZED, state)
  }
}

/// Sits at the high end of every block and mirrors the header's size.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Footer {
  pub size: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_overhead_matches_layout() {
    assert_eq!(HEADER_SIZE, 4 * mem::size_of::<usize>());
    assert_eq!(FOOTER_SIZE, mem::size_of::<usize>());
    assert_eq!(OVERHEAD, 5 * mem::size_of::<usize>());
  }

  #[test]
  fn test_header_has_no_padding() {
    let fields = mem::size_of::<usize>()
      + mem::size_of::<BlockState>()
      + mem::size_of::<usize>()
      + mem::size_of::<usize>();

    assert_eq!(HEADER_SIZE, fields);
  }

  #[test]
  fn test_state_chars() {
    assert_eq!(BlockState::Free.to_string(), "a");
    assert_eq!(BlockState::Used.to_string(), "u");
    assert_eq!(BlockState::ListBegin.to_string(), "B");
    assert_eq!(BlockState::ListEnd.to_string(), "E");
  }

  #[test]
  fn test_sentinel_has_no_size() {
    let begin = Header::sentinel(BlockState::ListBegin);

    assert_eq!(begin.size, UNINITIALIZED);
    assert_eq!(begin.prev, NO_LINK);
    assert_eq!(begin.next, NO_LINK);
  }
}
