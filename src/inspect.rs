//! Read-only views of a heap for tests and debugging.

use std::{collections::HashSet, fmt};

use thiserror::Error;

use crate::block::{BlockState, HEADER_SIZE, LIST_BEGIN, LIST_END, OVERHEAD};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSnapshot {
  /// Offset of the header from the start of the arena.
  pub offset: usize,
  pub state: BlockState,
  pub size: usize,
  pub prev: usize,
  pub next: usize,
  pub footer_size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListSnapshot {
  pub length: usize,
  pub bytes: usize,
  /// Member offsets, front to back.
  pub blocks: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapSnapshot {
  pub start: usize,
  pub end: usize,
  pub total_bytes: usize,
  pub free: ListSnapshot,
  pub used: ListSnapshot,
  /// Every block in address order.
  pub blocks: Vec<BlockSnapshot>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
  #[error("block at {offset}: header size {header} but footer size {footer}")]
  FooterMismatch {
    offset: usize,
    header: usize,
    footer: usize,
  },

  #[error("blocks cover {covered} bytes of a {total_bytes} byte arena")]
  Coverage { covered: usize, total_bytes: usize },

  #[error("adjacent blocks at {lower} and {upper} are both free")]
  AdjacentFree { lower: usize, upper: usize },

  #[error("{list} list claims {claimed} but holds {actual}")]
  ListAggregate {
    list: &'static str,
    claimed: String,
    actual: String,
  },

  #[error("block at {offset} is {state} but sits on the {list} list")]
  WrongList {
    offset: usize,
    state: BlockState,
    list: &'static str,
  },

  #[error("block at {offset} is on {count} lists")]
  Membership { offset: usize, count: usize },

  #[error("{list} list names offset {offset}, which is not a block")]
  Stranger { list: &'static str, offset: usize },
}

impl HeapSnapshot {
  pub fn block(
    &self,
    offset: usize,
  ) -> Option<&BlockSnapshot> {
    self.blocks.iter().find(|b| b.offset == offset)
  }

  /// Checks every structural property a heap must hold between operations.
  pub fn verify(&self) -> Result<(), InvariantViolation> {
    let mut covered = 0;
    for block in &self.blocks {
      if block.size != block.footer_size {
        return Err(InvariantViolation::FooterMismatch {
          offset: block.offset,
          header: block.size,
          footer: block.footer_size,
        });
      }
      if block.offset != covered {
        break;
      }
      covered += block.size + OVERHEAD;
    }

    if covered != self.total_bytes || self.end - self.start != self.total_bytes {
      return Err(InvariantViolation::Coverage {
        covered,
        total_bytes: self.total_bytes,
      });
    }

    for pair in self.blocks.windows(2) {
      if pair[0].state == BlockState::Free && pair[1].state == BlockState::Free {
        return Err(InvariantViolation::AdjacentFree {
          lower: pair[0].offset,
          upper: pair[1].offset,
        });
      }
    }

    self.verify_list("free", &self.free, BlockState::Free)?;
    self.verify_list("used", &self.used, BlockState::Used)?;

    let mut seen = HashSet::new();
    for &offset in self.free.blocks.iter().chain(&self.used.blocks) {
      if !seen.insert(offset) {
        return Err(InvariantViolation::Membership { offset, count: 2 });
      }
    }
    if let Some(lost) = self.blocks.iter().find(|b| !seen.contains(&b.offset)) {
      return Err(InvariantViolation::Membership {
        offset: lost.offset,
        count: 0,
      });
    }

    Ok(())
  }

  fn verify_list(
    &self,
    name: &'static str,
    list: &ListSnapshot,
    state: BlockState,
  ) -> Result<(), InvariantViolation> {
    let mut bytes = 0;
    let mut prev = LIST_BEGIN;

    for (i, &offset) in list.blocks.iter().enumerate() {
      let Some(block) = self.block(offset) else {
        return Err(InvariantViolation::Stranger { list: name, offset });
      };
      if block.state != state {
        return Err(InvariantViolation::WrongList {
          offset,
          state: block.state,
          list: name,
        });
      }

      let next = list.blocks.get(i + 1).copied().unwrap_or(LIST_END);
      if block.prev != prev || block.next != next {
        return Err(InvariantViolation::ListAggregate {
          list: name,
          claimed: format!("links {}/{} at {offset}", block.prev, block.next),
          actual: format!("links {prev}/{next}"),
        });
      }

      prev = offset;
      bytes += block.size + OVERHEAD;
    }

    if list.length != list.blocks.len() || list.bytes != bytes {
      return Err(InvariantViolation::ListAggregate {
        list: name,
        claimed: format!("length {} bytes {}", list.length, list.bytes),
        actual: format!("length {} bytes {bytes}", list.blocks.len()),
      });
    }

    Ok(())
  }

  fn fmt_list(
    &self,
    f: &mut fmt::Formatter<'_>,
    list: &ListSnapshot,
  ) -> fmt::Result {
    writeln!(f, "{{length: {:3}  bytes: {:5}}}", list.length, list.bytes)?;
    for (i, &offset) in list.blocks.iter().enumerate() {
      let (state, size) = self
        .block(offset)
        .map_or(('?', 0), |b| (b.state as u8 as char, b.size));
      writeln!(
        f,
        "  [{i:3}] head @ {:#x} {{state: {state}  size: {size:5}}}",
        self.start + offset
      )?;
    }
    Ok(())
  }
}

impl fmt::Display for HeapSnapshot {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "HEAP STATS (overhead per node: {OVERHEAD})")?;
    writeln!(f, "heap_start:  {:#x}", self.start)?;
    writeln!(f, "heap_end:    {:#x}", self.end)?;
    writeln!(f, "total_bytes: {}", self.total_bytes)?;
    write!(f, "AVAILABLE LIST: ")?;
    self.fmt_list(f, &self.free)?;
    write!(f, "USED LIST: ")?;
    self.fmt_list(f, &self.used)?;
    writeln!(f, "HEAP BLOCKS:")?;

    for (i, block) in self.blocks.iter().enumerate() {
      let head = self.start + block.offset;
      writeln!(f, "[{i:3}] @ {head:#x}")?;
      writeln!(f, "  state:      {}", block.state)?;
      writeln!(
        f,
        "  size:       {} (total: {:#x})",
        block.size,
        block.size + OVERHEAD
      )?;
      writeln!(f, "  user:       {:#x}", head + HEADER_SIZE)?;
      writeln!(f, "  foot:       {:#x}", head + HEADER_SIZE + block.size)?;
      writeln!(f, "  foot->size: {}", block.footer_size)?;
    }

    Ok(())
  }
}
