//! # elheap - An Explicit-List Heap Allocator
//!
//! This crate provides a `malloc`/`free` style allocator that manages one
//! contiguous **arena** of memory, splitting it into blocks and keeping every
//! block on one of two intrusive lists: the free list and the used list.
//!
//! ## Overview
//!
//! Every block carries its size twice, once in a header at its low end and
//! once in a footer at its high end:
//!
//! ```text
//!   One Block:
//!
//!   ┌──────────────────────┬──────────────────────────┬──────────┐
//!   │       Header         │         Payload          │  Footer  │
//!   │  ┌────────────────┐  │                          │ ┌──────┐ │
//!   │  │ size:  N       │  │                          │ │ N    │ │
//!   │  │ state: a / u   │  │     N bytes usable       │ └──────┘ │
//!   │  │ prev / next    │  │                          │          │
//!   │  └────────────────┘  │                          │          │
//!   │      32 bytes        │                          │ 8 bytes  │
//!   └──────────────────────┴──────────────────────────┴──────────┘
//!                          ▲
//!                          └── Pointer returned to user
//! ```
//!
//! The header lets us step to the block **above**, the footer of the
//! preceding block lets us step to the block **below**. The list links are
//! independent of that ordering:
//!
//! ```text
//!   Arena (address order):
//!
//!   start                                                         end
//!   ┌─────────┬─────────┬───────────────┬─────────┬───────────────┐
//!   │ used A  │ free B  │    used C     │ used D  │    free E     │
//!   └─────────┴─────────┴───────────────┴─────────┴───────────────┘
//!
//!   free list: begin ⇄ E ⇄ B ⇄ end
//!   used list: begin ⇄ D ⇄ C ⇄ A ⇄ end
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   elheap
//!   ├── arena      - Offset arithmetic over the arena bytes (internal)
//!   ├── block      - Header/footer layout and block states
//!   ├── config     - HeapConfig
//!   ├── error      - HeapError
//!   ├── heap       - Heap: allocate, release, grow
//!   ├── inspect    - Snapshots and invariant checks
//!   ├── list       - Intrusive block lists (internal)
//!   └── source     - Where arena memory comes from (mmap, fixed buffer)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use elheap::{Heap, HeapConfig};
//!
//! fn main() -> Result<(), elheap::HeapError> {
//!     let mut heap = Heap::new(HeapConfig::pages(1))?;
//!
//!     let block = heap.allocate(64)?;
//!     heap.payload_mut(&block).fill(42);
//!     heap.release(block);
//!
//!     println!("{}", heap.inspect());
//!     Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! - **allocate** walks the free list front to back and takes the first
//!   block big enough (first fit). Whatever is left over becomes a new free
//!   block at the front of the free list, as long as it can hold its own
//!   header and footer.
//! - **release** moves the block back to the free list and merges it with
//!   every free block touching it, so two free blocks are never adjacent.
//! - **grow** maps more pages right at the end of the arena and turns them
//!   into a free block, merging it into the old top block if that was free.
//!   Running out of memory never grows the heap on its own.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **No realloc**: Blocks never change size while in use
//! - **No alignment beyond the header**: Payloads sit right after a header
//! - **Unix-only** for the default `Mmap` source

mod arena;
pub mod block;
pub mod config;
pub mod error;
mod heap;
pub mod inspect;
mod list;
pub mod source;

pub use block::{BlockState, OVERHEAD};
pub use config::{ArenaSize, HeapConfig};
pub use error::HeapError;
pub use heap::{Allocation, Heap};
pub use inspect::{BlockSnapshot, HeapSnapshot, InvariantViolation, ListSnapshot};
pub use source::{BufferSource, Mmap, RegionSource, SourceError};
