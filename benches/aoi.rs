use std::hint::black_box;

use aden::game::aoi::AoiGrid;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

/// `n` entities spread over a 400x400 patch of one map.
fn populated(n: i32) -> AoiGrid<i32> {
    let mut grid = AoiGrid::new();
    for i in 0..n {
        let x = 32000 + (i * 7919) % 400;
        let y = 32000 + (i * 104_729) % 400;
        grid.upsert(i, 4, x, y);
    }
    grid
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("aoi_query");
    for n in [1_000, 10_000, 50_000] {
        let grid = populated(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &grid, |b, grid| {
            b.iter(|| {
                let mut seen = 0usize;
                grid.for_each_near(4, black_box(32200), black_box(32200), 20, |_, _, _| seen += 1);
                seen
            })
        });
    }
    group.finish();
}

fn bench_move(c: &mut Criterion) {
    let mut grid = populated(10_000);
    let mut step = 0;
    c.bench_function("aoi_upsert_walk", |b| {
        b.iter(|| {
            step = (step + 1) % 400;
            grid.upsert(black_box(42), 4, 32000 + step, 32200);
        })
    });
}

criterion_group!(benches, bench_query, bench_move);
criterion_main!(benches);
