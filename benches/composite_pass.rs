//! Composite pass benchmarks: classification + flicker + bucketed raster.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glyphcast::alphabet::GlyphAlphabet;
use glyphcast::compositor::BucketedCompositor;
use glyphcast::driver::composite_pass;
use glyphcast::flicker::FlickerPolicy;
use glyphcast::grid::GlyphGrid;
use rand::rngs::SmallRng;
use rand::SeedableRng;

const COLS: u32 = 192;
const ROWS: u32 = 108;
const CELL: u32 = 10;
const BUCKETS: usize = 12;

fn synthetic_samples() -> Vec<u8> {
    let mut samples = vec![0u8; (COLS * ROWS * 4) as usize];
    for row in 0..ROWS {
        for col in 0..COLS {
            let index = ((row * COLS + col) * 4) as usize;
            let value = ((col + row) * 255 / (COLS + ROWS - 2)) as u8;
            samples[index] = value;
            samples[index + 1] = value;
            samples[index + 2] = value;
            samples[index + 3] = 255;
        }
    }
    samples
}

fn bench_composite_pass(c: &mut Criterion) {
    let samples = synthetic_samples();
    let alphabet = GlyphAlphabet::new();
    let policy = FlickerPolicy::new(alphabet);

    let mut group = c.benchmark_group("composite_pass");
    group.sample_size(50);

    group.bench_function("classify_flicker_bucket_1080p_grid", |b| {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut grid = GlyphGrid::new(COLS, ROWS, alphabet, &mut rng);
        let mut compositor = BucketedCompositor::new(BUCKETS, 0.0, CELL);
        b.iter(|| {
            composite_pass(
                black_box(&samples),
                &mut grid,
                &policy,
                0.1,
                &mut compositor,
                BUCKETS,
                &mut rng,
            );
        });
    });

    group.bench_function("full_raster_1080p_grid", |b| {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut grid = GlyphGrid::new(COLS, ROWS, alphabet, &mut rng);
        let mut compositor = BucketedCompositor::new(BUCKETS, 0.0, CELL);
        let mut raster = vec![0u8; (COLS * CELL * ROWS * CELL * 4) as usize];
        b.iter(|| {
            composite_pass(
                black_box(&samples),
                &mut grid,
                &policy,
                0.1,
                &mut compositor,
                BUCKETS,
                &mut rng,
            );
            compositor.composite(&mut raster, COLS * CELL, ROWS * CELL);
            black_box(&raster);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_composite_pass);
criterion_main!(benches);
