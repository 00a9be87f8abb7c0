//! Allocator microbenchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vela_gc::{alloc_size, PoolAllocator};

fn bench_alloc_size(c: &mut Criterion) {
    c.bench_function("alloc_size_ladder", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for n in [7, 24, 100, 1 << 12, 1 << 18, 5 << 20] {
                total = total.wrapping_add(alloc_size(black_box(n)));
            }
            total
        })
    });
}

fn bench_pool_churn(c: &mut Criterion) {
    c.bench_function("pool_get_free_churn", |b| {
        let mut pool = PoolAllocator::new();
        b.iter(|| {
            let mem = pool.get_memory(black_box(56));
            unsafe { pool.add_free(mem.sub(1), usize::MAX) };
        })
    });
}

criterion_group!(benches, bench_alloc_size, bench_pool_churn);
criterion_main!(benches);
