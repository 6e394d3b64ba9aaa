//! The CPU half of the pipeline must be fully deterministic given a seed
//! and a sample buffer: same inputs, bit-identical rasters.

use glyphcast::alphabet::GlyphAlphabet;
use glyphcast::compositor::BucketedCompositor;
use glyphcast::driver::composite_pass;
use glyphcast::flicker::FlickerPolicy;
use glyphcast::grid::GlyphGrid;
use rand::rngs::SmallRng;
use rand::SeedableRng;

const COLS: u32 = 48;
const ROWS: u32 = 27;
const CELL: u32 = 10;
const BUCKETS: usize = 12;

/// Horizontal brightness gradient with an opaque alpha channel.
fn gradient_samples() -> Vec<u8> {
    let mut samples = vec![0u8; (COLS * ROWS * 4) as usize];
    for row in 0..ROWS {
        for col in 0..COLS {
            let index = ((row * COLS + col) * 4) as usize;
            let value = (col * 255 / (COLS - 1)) as u8;
            samples[index] = value;
            samples[index + 1] = value;
            samples[index + 2] = value;
            samples[index + 3] = 255;
        }
    }
    samples
}

fn render_frames(seed: u64, passes: usize, speed: f32) -> Vec<u8> {
    let samples = gradient_samples();
    let alphabet = GlyphAlphabet::new();
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut grid = GlyphGrid::new(COLS, ROWS, alphabet, &mut rng);
    let mut compositor = BucketedCompositor::new(BUCKETS, 0.0, CELL);
    let policy = FlickerPolicy::new(alphabet);

    let mut raster = vec![0u8; (COLS * CELL * ROWS * CELL * 4) as usize];
    for _ in 0..passes {
        composite_pass(
            &samples,
            &mut grid,
            &policy,
            FlickerPolicy::head_rate(speed),
            &mut compositor,
            BUCKETS,
            &mut rng,
        );
        compositor.composite(&mut raster, COLS * CELL, ROWS * CELL);
    }
    raster
}

#[test]
fn same_seed_renders_identical_rasters() {
    let first = render_frames(0xC0FFEE, 8, 0.2);
    let second = render_frames(0xC0FFEE, 8, 0.2);
    assert_eq!(first, second, "seeded pipeline should be reproducible");
}

#[test]
fn different_seeds_diverge() {
    let first = render_frames(1, 8, 0.2);
    let second = render_frames(2, 8, 0.2);
    assert_ne!(
        first, second,
        "different seeds should flicker differently on a lit buffer"
    );
}

#[test]
fn black_input_is_static_across_passes() {
    let samples = vec![0u8; (COLS * ROWS * 4) as usize];
    let alphabet = GlyphAlphabet::new();
    let mut rng = SmallRng::seed_from_u64(7);
    let mut grid = GlyphGrid::new(COLS, ROWS, alphabet, &mut rng);
    let baseline = grid.clone();
    let mut compositor = BucketedCompositor::new(BUCKETS, 0.0, CELL);
    let policy = FlickerPolicy::new(alphabet);

    for _ in 0..20 {
        composite_pass(
            &samples,
            &mut grid,
            &policy,
            FlickerPolicy::head_rate(1.0),
            &mut compositor,
            BUCKETS,
            &mut rng,
        );
    }

    // Nothing is touched on a black buffer, so the grid never changes.
    assert_eq!(grid, baseline);
}
