use std::ptr::NonNull;

use crate::block::{FOOTER_SIZE, Footer, HEADER_SIZE, Header, OVERHEAD};

/// The contiguous byte range every block lives in. Blocks are named by their
/// byte offset from `start`; nothing here knows about lists.
#[derive(Debug)]
pub(crate) struct Arena {
  start: NonNull<u8>,
  len: usize,
}

impl Arena {
  pub fn new(
    start: NonNull<u8>,
    len: usize,
  ) -> Self {
    Self { start, len }
  }

  pub fn start(&self) -> NonNull<u8> {
    self.start
  }

  /// One past the last byte of the arena.
  pub fn end(&self) -> NonNull<u8> {
    unsafe { self.start.add(self.len) }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Takes in `bytes` more, which the caller has already placed at `end()`.
  pub fn extend(
    &mut self,
    bytes: usize,
  ) {
    self.len += bytes;
  }

  pub fn payload(
    &self,
    block: usize,
  ) -> NonNull<u8> {
    unsafe { self.start.add(block + HEADER_SIZE) }
  }

  pub fn header(
    &self,
    block: usize,
  ) -> Header {
    self.check(block, HEADER_SIZE);
    unsafe { self.start.as_ptr().add(block).cast::<Header>().read_unaligned() }
  }

  pub fn set_header(
    &mut self,
    block: usize,
    header: Header,
  ) {
    self.check(block, HEADER_SIZE);
    unsafe { self.start.as_ptr().add(block).cast::<Header>().write_unaligned(header) }
  }

  pub fn update_header(
    &mut self,
    block: usize,
    f: impl FnOnce(&mut Header),
  ) {
    let mut header = self.header(block);
    f(&mut header);
    self.set_header(block, header);
  }

  pub fn footer(
    &self,
    at: usize,
  ) -> Footer {
    self.check(at, FOOTER_SIZE);
    unsafe { self.start.as_ptr().add(at).cast::<Footer>().read_unaligned() }
  }

  pub fn set_footer(
    &mut self,
    at: usize,
    footer: Footer,
  ) {
    self.check(at, FOOTER_SIZE);
    unsafe { self.start.as_ptr().add(at).cast::<Footer>().write_unaligned(footer) }
  }

  /// Where the footer of `block` sits, going by the header's size.
  pub fn footer_of(
    &self,
    block: usize,
  ) -> usize {
    block + HEADER_SIZE + self.header(block).size
  }

  /// Where the header belonging to the footer at `at` sits, going by the footer's size.
  pub fn header_of(
    &self,
    at: usize,
  ) -> usize {
    at - self.footer(at).size - HEADER_SIZE
  }

  /// Writes `header` at `block` and a footer mirroring its size.
  pub fn format(
    &mut self,
    block: usize,
    header: Header,
  ) {
    self.set_header(block, header);
    let foot = self.footer_of(block);
    self.set_footer(foot, Footer { size: header.size });
  }

  /// Rewrites the size in both the header and the footer of `block`.
  pub fn resize(
    &mut self,
    block: usize,
    size: usize,
  ) {
    self.update_header(block, |h| h.size = size);
    let foot = self.footer_of(block);
    self.set_footer(foot, Footer { size });
  }

  /// The block directly above `block` in memory, if it is still inside the arena.
  pub fn block_above(
    &self,
    block: usize,
  ) -> Option<usize> {
    let higher = block + self.header(block).size + OVERHEAD;
    (higher < self.len).then_some(higher)
  }

  /// The block directly below `block` in memory. Unlike `block_above` this has
  /// to read the footer of the lower block, since its size is not known here.
  pub fn block_below(
    &self,
    block: usize,
  ) -> Option<usize> {
    if block <= FOOTER_SIZE {
      return None;
    }

    Some(self.header_of(block - FOOTER_SIZE))
  }

  /// Offsets of every block from the start of the arena upward.
  pub fn walk(&self) -> Walk<'_> {
    Walk {
      arena: self,
      next: (self.len >= OVERHEAD).then_some(0),
    }
  }

  #[inline]
  fn check(
    &self,
    at: usize,
    width: usize,
  ) {
    debug_assert!(
      at.checked_add(width).is_some_and(|end| end <= self.len),
      "access of {width} bytes at offset {at} leaves an arena of {} bytes",
      self.len
    );
  }
}

pub(crate) struct Walk<'a> {
  arena: &'a Arena,
  next: Option<usize>,
}

impl Iterator for Walk<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    let current = self.next?;
    self.next = self.arena.block_above(current);
    Some(current)
  }
}
