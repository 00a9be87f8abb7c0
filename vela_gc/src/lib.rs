//! # Vela GC
//!
//! The Vela VM's memory manager: a stop-the-world mark-and-sweep collector
//! over a size-class pool allocator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  MemoryManager                                                      │
//! │                                                                     │
//! │  ┌───────────────┐   ┌──────────────────┐   ┌──────────────────┐  │
//! │  │ PoolAllocator │   │ Allocation       │   │ RootRegistry      │  │
//! │  │ size-class    │◀──│ registry +       │   │ PDA frame slots   │  │
//! │  │ free stacks   │   │ used-byte count  │   │ frame monitors    │  │
//! │  └───────────────┘   └──────────────────┘   │ deferred JIT list │  │
//! │          ▲                    ▲             └──────────────────┘  │
//! │          │ sweep              │ mark                 │ roots       │
//! │  ┌───────┴────────────────────┴─────────────────────┴──────────┐  │
//! │  │ Collector: parallel mark (static / stack / PDA / JIT),      │  │
//! │  │ serial sweep, adaptive soft cap                             │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every allocation is a payload pointer with three metadata words at
//! negative offsets (mark flag, type tag, size-or-class word) plus the
//! allocator's chunk-size word below those. Mutators allocate through
//! [`MemoryManager::allocate_object`] / [`MemoryManager::allocate_array`];
//! when the soft cap would be exceeded the triggering allocation runs a
//! full collection first.
//!
//! # Concurrency
//!
//! Collection is guarded by a single sweep lock acquired with `try_lock`:
//! a mutator that triggers collection while another cycle is running
//! returns immediately and retries at its next allocation. The mark phase
//! forks one worker per root source (static class memory, operand stack,
//! PDA frames) plus a JIT worker launched once the PDA walk has partitioned
//! the frame list. Mark bits are set with atomic swaps on the header word,
//! so workers never contend on a lock for marking.

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cast;
pub mod collector;
pub mod dispatch;
pub mod heap;
pub mod pool;
pub mod roots;

#[cfg(test)]
mod collector_tests;
#[cfg(test)]
mod pool_tests;

pub use cast::valid_object_cast;
pub use collector::CollectionResult;
pub use heap::MemoryManager;
pub use pool::{alloc_size, PoolAllocator};

/// Initial soft cap on live heap bytes before a collection is triggered.
pub const MEM_MAX: usize = 1024 * 1024;

/// Consecutive fruitless collections tolerated before the soft cap grows.
pub const UNCOLLECTED_COUNT: usize = 16;

/// Consecutive productive collections on a grown heap before the soft cap
/// shrinks back down.
pub const COLLECTED_COUNT: usize = 16;

/// Chunks carved from each size-class pool when it is first materialized.
pub const MEM_POOL_LIST_MAX: usize = 32;

/// Metadata words between the allocator chunk and the payload:
/// mark flag, type tag, size-or-class.
pub const EXTRA_BUF_SIZE: usize = 3;
