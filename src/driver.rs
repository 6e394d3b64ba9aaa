//! Per-frame orchestration.
//!
//! The driver owns every piece of mutable frame state by name: pointer
//! tracker, glyph grid, sample buffer, raster, frame counter, RNG. One
//! `tick` per display frame; the glyph composite runs on every second tick
//! while the 3D pass runs on all of them so subject motion stays smooth.

use anyhow::Result;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::alphabet::GlyphAlphabet;
use crate::classify::{classify, sample_index};
use crate::compositor::BucketedCompositor;
use crate::config::Profile;
use crate::flicker::FlickerPolicy;
use crate::grid::GlyphGrid;
use crate::pointer::PointerTracker;
use crate::renderer::{GpuContext, OffscreenRenderer};
use crate::scene::SubjectScene;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Idle,
    Running,
    Disposed,
}

/// What one tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing ran (disposed driver or unmounted surface).
    Skipped,
    /// The 3D pass ran; the glyph composite was throttled away.
    Rendered,
    /// The 3D pass ran and the raster holds a fresh glyph frame.
    Composited,
}

pub struct FrameDriver {
    profile: Profile,
    phase: DriverPhase,
    tracker: PointerTracker,
    policy: FlickerPolicy,
    alphabet: GlyphAlphabet,
    compositor: BucketedCompositor,
    grid: Option<GlyphGrid>,
    samples: Vec<u8>,
    raster: Vec<u8>,
    cols: u32,
    rows: u32,
    frame_counter: u64,
    backdrop_time: f32,
    rng: SmallRng,
}

impl FrameDriver {
    pub fn new(profile: Profile, seed: u64) -> Self {
        let alphabet = GlyphAlphabet::new();
        let compositor =
            BucketedCompositor::new(profile.num_buckets, profile.min_alpha, profile.cell_size);
        Self {
            profile,
            phase: DriverPhase::Idle,
            tracker: PointerTracker::new(),
            policy: FlickerPolicy::new(alphabet),
            alphabet,
            compositor,
            grid: None,
            samples: Vec::new(),
            raster: Vec::new(),
            cols: 0,
            rows: 0,
            frame_counter: 0,
            backdrop_time: 0.0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Last-write-wins pointer event, applied outside the tick.
    pub fn pointer_moved(&mut self, x: f32, y: f32, viewport_width: f32, viewport_height: f32) {
        self.tracker
            .pointer_moved(x, y, viewport_width, viewport_height);
    }

    /// Pixel dimensions of the composited raster.
    pub fn raster_dims(&self) -> (u32, u32) {
        (
            self.cols * self.profile.cell_size,
            self.rows * self.profile.cell_size,
        )
    }

    /// Contents of the last composited raster; valid after a tick returned
    /// `Composited`.
    pub fn raster(&self) -> &[u8] {
        &self.raster
    }

    /// One display frame. `Composited` means the raster holds a fresh glyph
    /// frame; render-only (throttled) and skipped ticks leave it untouched.
    pub fn tick(
        &mut self,
        ctx: &GpuContext,
        renderer: &mut OffscreenRenderer,
        scene: &mut SubjectScene,
        surface_width: u32,
        surface_height: u32,
        delta: f32,
    ) -> Result<TickOutcome> {
        match self.phase {
            DriverPhase::Disposed => return Ok(TickOutcome::Skipped),
            DriverPhase::Idle => self.phase = DriverPhase::Running,
            DriverPhase::Running => {}
        }
        if surface_width == 0 || surface_height == 0 {
            return Ok(TickOutcome::Skipped);
        }

        self.tracker.advance();
        scene.orient_toward(self.tracker.smoothed());
        self.backdrop_time += delta.max(0.0);

        let aspect = surface_width as f32 / surface_height as f32;
        renderer.render(ctx, scene, aspect, self.backdrop_time);

        self.frame_counter += 1;
        if self.frame_counter % 2 != 0 {
            return Ok(TickOutcome::Rendered);
        }

        let (cols, rows) = self.profile.grid_dims(surface_width, surface_height);
        if cols != self.cols || rows != self.rows {
            // Dimension change: replace everything wholesale and let the
            // next tick composite from a target rendered at the new size.
            renderer.resize(ctx, cols, rows)?;
            self.grid = Some(GlyphGrid::new(cols, rows, self.alphabet, &mut self.rng));
            self.cols = cols;
            self.rows = rows;
            let (raster_w, raster_h) = self.raster_dims();
            self.raster.clear();
            self.raster.resize((raster_w * raster_h * 4) as usize, 0);
            return Ok(TickOutcome::Rendered);
        }

        renderer.read_buffer(ctx, &mut self.samples)?;

        let Some(grid) = self.grid.as_mut() else {
            return Ok(TickOutcome::Rendered);
        };
        let head_rate = FlickerPolicy::head_rate(self.tracker.speed_estimate());
        composite_pass(
            &self.samples,
            grid,
            &self.policy,
            head_rate,
            &mut self.compositor,
            self.profile.num_buckets,
            &mut self.rng,
        );

        let (raster_w, raster_h) = (
            self.cols * self.profile.cell_size,
            self.rows * self.profile.cell_size,
        );
        self.compositor.composite(&mut self.raster, raster_w, raster_h);
        Ok(TickOutcome::Composited)
    }

    /// Release frame state. The caller drops the renderer and detaches
    /// input listeners; further ticks are no-ops.
    pub fn dispose(&mut self) {
        if self.phase == DriverPhase::Disposed {
            return;
        }
        self.phase = DriverPhase::Disposed;
        self.grid = None;
        self.samples = Vec::new();
        self.raster = Vec::new();
    }
}

/// The throttled CPU stage: classify every cell, let the flicker policy
/// mutate the grid in place, and queue one draw record per cell into its
/// density bucket. Pure with respect to the GPU; tests drive it with
/// synthetic sample buffers.
pub fn composite_pass<R: Rng + ?Sized>(
    samples: &[u8],
    grid: &mut GlyphGrid,
    policy: &FlickerPolicy,
    head_rate: f32,
    compositor: &mut BucketedCompositor,
    num_buckets: usize,
    rng: &mut R,
) {
    let cols = grid.cols();
    let rows = grid.rows();
    let cell_size = compositor.cell_size();
    debug_assert!(samples.len() >= (cols * rows * 4) as usize);

    compositor.begin_pass();

    for row in 0..rows {
        for col in 0..cols {
            let index = sample_index(col, row, cols, rows);
            let class = classify(
                samples[index],
                samples[index + 1],
                samples[index + 2],
                num_buckets,
            );

            if let Some(replacement) = policy.mutate(&class, head_rate, rng) {
                grid.set(col, row, replacement);
            }

            compositor.push(
                class.bucket,
                grid.get(col, row),
                col * cell_size,
                row * cell_size,
            );
        }
    }
}
