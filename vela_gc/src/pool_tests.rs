//! Tests for the size-class pool allocator.

use crate::pool::{alloc_size, PoolAllocator};
use crate::MEM_POOL_LIST_MAX;

// =============================================================================
// Size classes
// =============================================================================

#[test]
fn test_alloc_size_published_classes() {
    let expected = [
        8usize,
        16,
        32,
        64,
        128,
        256,
        512,
        1024,
        2048,
        4096,
        8192,
        16384,
        32768,
        65536,
        131072,
        262144,
        524288,
        1048576,
        2097152,
        4194304,
    ];
    for class in expected {
        assert_eq!(alloc_size(class), class);
        assert_eq!(alloc_size(class - 1), class);
    }
    // everything above 4 MiB lands in the oversize bucket
    assert_eq!(alloc_size(4 * 1024 * 1024 + 1), 16 * 1024 * 1024);
    assert_eq!(alloc_size(10 * 1024 * 1024), 16 * 1024 * 1024);
}

#[test]
fn test_alloc_size_covers_request() {
    for n in 1..5000 {
        let class = alloc_size(n);
        assert!(class >= n, "alloc_size({n}) = {class}");
    }
}

#[test]
fn test_alloc_size_monotonic() {
    let mut prev = 0;
    for n in 1..5000 {
        let class = alloc_size(n);
        assert!(class >= prev, "alloc_size not monotonic at {n}");
        prev = class;
    }
}

// =============================================================================
// Pool behavior
// =============================================================================

#[test]
fn test_get_memory_stamps_header() {
    let mut pool = PoolAllocator::new();
    let mem = pool.get_memory(24);
    // the chunk class sits one word below the returned pointer
    let chunk = unsafe { mem.sub(1).read() };
    assert_eq!(chunk, alloc_size(24 + std::mem::size_of::<usize>()));
}

#[test]
fn test_get_memory_zeroed() {
    let mut pool = PoolAllocator::new();
    let mem = pool.get_memory(64);
    for i in 0..(64 / std::mem::size_of::<usize>()) {
        assert_eq!(unsafe { mem.add(i).read() }, 0, "word {i} not zeroed");
    }
}

#[test]
fn test_free_then_reuse_same_class() {
    let mut pool = PoolAllocator::new();
    let mem = pool.get_memory(24);
    let raw = unsafe { mem.sub(1) };

    let pools_before = pool.pool_count();
    unsafe { pool.add_free(raw, usize::MAX) };
    let reused = pool.get_memory(24);

    assert_eq!(reused, mem, "freed chunk should be served next");
    assert_eq!(pool.pool_count(), pools_before, "no new pool expected");
}

#[test]
fn test_pool_materialized_per_class() {
    let mut pool = PoolAllocator::new();
    let _ = pool.get_memory(24);
    assert_eq!(pool.pool_count(), 1);

    // same class: no new pool until the first runs dry
    for _ in 0..MEM_POOL_LIST_MAX - 1 {
        let _ = pool.get_memory(24);
    }
    assert_eq!(pool.pool_count(), 1);

    let _ = pool.get_memory(24);
    assert_eq!(pool.pool_count(), 2);

    // a different class gets its own pool
    let _ = pool.get_memory(300);
    assert_eq!(pool.pool_count(), 3);
}

#[test]
fn test_cached_bytes_tracks_stacks() {
    let mut pool = PoolAllocator::new();
    let chunk = alloc_size(24 + std::mem::size_of::<usize>());

    let mem = pool.get_memory(24);
    assert_eq!(pool.cached_bytes(), chunk * (MEM_POOL_LIST_MAX - 1));

    unsafe { pool.add_free(mem.sub(1), usize::MAX) };
    assert_eq!(pool.cached_bytes(), chunk * MEM_POOL_LIST_MAX);
}

#[test]
fn test_add_free_past_cap_drains() {
    let mut pool = PoolAllocator::new();
    let mem = pool.get_memory(24);
    let other = pool.get_memory(24);

    unsafe { pool.add_free(mem.sub(1), usize::MAX) };
    // cap of zero forces a drain before this chunk is cached
    unsafe { pool.add_free(other.sub(1), 0) };

    let chunk = alloc_size(24 + std::mem::size_of::<usize>());
    assert_eq!(pool.cached_bytes(), chunk);
}

#[test]
fn test_clear_free_all_releases_pools() {
    let mut pool = PoolAllocator::new();
    let _ = pool.get_memory(24);
    let _ = pool.get_memory(5000);
    assert_eq!(pool.pool_count(), 2);

    pool.clear_free(true);
    assert_eq!(pool.pool_count(), 0);
    assert_eq!(pool.cached_bytes(), 0);
}
