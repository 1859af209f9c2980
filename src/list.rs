use crate::{
  arena::Arena,
  block::{BlockState, Header, LIST_BEGIN, LIST_END, NO_LINK, OVERHEAD},
};

/// Intrusive doubly-linked list threaded through the headers of arena blocks.
///
/// ```text
///   begin ⇄ [block] ⇄ [block] ⇄ ... ⇄ end
/// ```
///
/// The two sentinels live in the list itself rather than in the arena, and
/// block headers point at them through the `LIST_BEGIN`/`LIST_END` link values.
/// The list never owns the bytes of its members; it only knows their offsets.
#[derive(Debug)]
pub(crate) struct BlockList {
  begin: Header,
  end: Header,
  length: usize,
  bytes: usize,
}

impl BlockList {
  pub fn new() -> Self {
    let mut list = Self {
      begin: Header::sentinel(BlockState::ListBegin),
      end: Header::sentinel(BlockState::ListEnd),
      length: 0,
      bytes: 0,
    };
    list.init_empty();
    list
  }

  /// Rewires the sentinels into an empty ring and zeroes the totals.
  pub fn init_empty(&mut self) {
    self.begin.next = LIST_END;
    self.begin.prev = NO_LINK;
    self.end.prev = LIST_BEGIN;
    self.end.next = NO_LINK;
    self.length = 0;
    self.bytes = 0;
  }

  pub fn len(&self) -> usize {
    self.length
  }

  /// Sum of `size + OVERHEAD` over every member.
  pub fn bytes(&self) -> usize {
    self.bytes
  }

  pub fn add_front(
    &mut self,
    arena: &mut Arena,
    block: usize,
  ) {
    let first = self.begin.next;

    arena.update_header(block, |h| {
      h.prev = LIST_BEGIN;
      h.next = first;
    });
    self.set_prev(arena, first, block);
    self.begin.next = block;

    self.length += 1;
    self.bytes += arena.header(block).size + OVERHEAD;
  }

  pub fn remove(
    &mut self,
    arena: &mut Arena,
    block: usize,
  ) {
    let header = arena.header(block);

    self.set_prev(arena, header.next, header.prev);
    self.set_next(arena, header.prev, header.next);

    self.length -= 1;
    self.bytes -= header.size + OVERHEAD;
  }

  /// Member offsets from front to back.
  pub fn iter<'a>(
    &self,
    arena: &'a Arena,
  ) -> Iter<'a> {
    Iter {
      arena,
      next: self.begin.next,
    }
  }

  fn set_prev(
    &mut self,
    arena: &mut Arena,
    node: usize,
    prev: usize,
  ) {
    match node {
      LIST_BEGIN => self.begin.prev = prev,
      LIST_END => self.end.prev = prev,
      _ => arena.update_header(node, |h| h.prev = prev),
    }
  }

  fn set_next(
    &mut self,
    arena: &mut Arena,
    node: usize,
    next: usize,
  ) {
    match node {
      LIST_BEGIN => self.begin.next = next,
      LIST_END => self.end.next = next,
      _ => arena.update_header(node, |h| h.next = next),
    }
  }
}

pub(crate) struct Iter<'a> {
  arena: &'a Arena,
  next: usize,
}

impl Iterator for Iter<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    if self.next == LIST_END {
      return None;
    }

    let current = self.next;
    self.next = self.arena.header(current).next;
    Some(current)
  }
}
