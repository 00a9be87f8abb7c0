//! Size-class pool allocator.
//!
//! All object and array allocations are served from per-size free stacks
//! backed by fixed pools. A request is rounded up to the smallest supported
//! chunk class (powers of two from 8 bytes through 4 MiB, then a single
//! 16 MiB bucket); the first request in a class materializes one zeroed
//! pool of [`MEM_POOL_LIST_MAX`] chunks and pushes every slot onto the
//! class's stack. Steady-state allocation and free are O(1) stack
//! operations; the underlying allocator is only touched when a class runs
//! dry.
//!
//! Each chunk stores its own class size in its first word; the pointer
//! handed to callers is one word past it. Frees trust that stored header,
//! never a caller-provided size.

use crate::MEM_POOL_LIST_MAX;
use rustc_hash::FxHashMap;
use std::alloc::{alloc_zeroed, dealloc, Layout};

const WORD: usize = std::mem::size_of::<usize>();

/// Round a byte request up to its size class.
///
/// The class set is `{8, 16, 32, …, 4 MiB}` with every request above 4 MiB
/// served from a single 16 MiB bucket. The result is always ≥ `size` and
/// monotonic in `size`.
#[inline]
pub fn alloc_size(size: usize) -> usize {
    const MAX_POW2: usize = 4 * 1024 * 1024;
    const OVERSIZE: usize = 16 * 1024 * 1024;

    if size <= 8 {
        8
    } else if size <= MAX_POW2 {
        size.next_power_of_two()
    } else {
        OVERSIZE
    }
}

/// One pool's backing memory, retained until the allocator is cleared.
struct PoolBlock {
    base: *mut u8,
    layout: Layout,
}

/// The size-class allocator.
///
/// Not internally synchronized; the memory manager serializes access with
/// its free-cache lock.
pub struct PoolAllocator {
    /// Free chunk stacks keyed by chunk class.
    free_lists: FxHashMap<usize, Vec<*mut usize>>,
    /// Backing pools keyed by chunk class.
    pools: FxHashMap<usize, Vec<PoolBlock>>,
    /// Bytes currently sitting in free stacks.
    cached_bytes: usize,
}

impl PoolAllocator {
    /// Create an empty allocator; pools materialize lazily.
    pub fn new() -> Self {
        Self {
            free_lists: FxHashMap::default(),
            pools: FxHashMap::default(),
            cached_bytes: 0,
        }
    }

    /// Bytes currently cached in free stacks.
    #[inline]
    pub fn cached_bytes(&self) -> usize {
        self.cached_bytes
    }

    /// Number of materialized pools across all classes.
    pub fn pool_count(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    /// Serve `ask` bytes plus the chunk header word.
    ///
    /// Returns a zeroed region of at least `ask` bytes; the chunk class is
    /// recorded in the word immediately below the returned pointer.
    pub fn get_memory(&mut self, ask: usize) -> *mut usize {
        let chunk_size = alloc_size(ask + WORD);

        let stack = self.free_lists.entry(chunk_size).or_default();
        if stack.is_empty() {
            let pools = self.pools.entry(chunk_size).or_default();
            let block = Self::materialize(chunk_size);
            for i in 0..MEM_POOL_LIST_MAX {
                // Safety: slot i lies within the pool's allocation.
                stack.push(unsafe { block.base.add(i * chunk_size) } as *mut usize);
            }
            pools.push(block);
            self.cached_bytes += chunk_size * MEM_POOL_LIST_MAX;
        }

        let raw = stack.pop().expect("freshly filled size-class stack");
        self.cached_bytes -= chunk_size;

        // Safety: raw points at a chunk of chunk_size bytes; the header
        // word and the payload both lie within it.
        unsafe {
            raw.write(chunk_size);
            let payload = raw.add(1);
            std::ptr::write_bytes(payload as *mut u8, 0, chunk_size - WORD);
            payload
        }
    }

    /// Return a chunk to its free stack.
    ///
    /// `raw` must be a pointer previously produced by [`Self::get_memory`],
    /// rewound past the header word. If the cached inventory exceeds
    /// `soft_cap` the stacks are drained first (pools are kept).
    ///
    /// # Safety
    ///
    /// `raw` must point at the chunk header word of a chunk obtained from
    /// this allocator, and the chunk must not be in use.
    pub unsafe fn add_free(&mut self, raw: *mut usize, soft_cap: usize) {
        if self.cached_bytes > soft_cap {
            self.clear_free(false);
        }

        // Safety: caller contract; the header holds the chunk class.
        let chunk_size = unsafe { raw.read() };
        self.free_lists.entry(chunk_size).or_default().push(raw);
        self.cached_bytes += chunk_size;
    }

    /// Drain every free stack; with `all` also release the backing pools.
    ///
    /// Chunks drained without `all` stay resident in their pools until a
    /// full clear.
    pub fn clear_free(&mut self, all: bool) {
        for stack in self.free_lists.values_mut() {
            stack.clear();
        }
        self.cached_bytes = 0;

        if all {
            self.free_lists.clear();
            for (_, blocks) in self.pools.drain() {
                for block in blocks {
                    // Safety: base/layout pair came from alloc_zeroed.
                    unsafe { dealloc(block.base, block.layout) };
                }
            }
        }
    }

    fn materialize(chunk_size: usize) -> PoolBlock {
        let layout = Layout::from_size_align(chunk_size * MEM_POOL_LIST_MAX, WORD)
            .expect("valid pool layout");
        // Safety: layout is non-zero sized.
        let base = unsafe { alloc_zeroed(layout) };
        if base.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        PoolBlock { base, layout }
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        self.clear_free(true);
    }
}

// Safety: the allocator's raw pointers all target memory it owns; access
// is serialized by the memory manager's free-cache lock.
unsafe impl Send for PoolAllocator {}
