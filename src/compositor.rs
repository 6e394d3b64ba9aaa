//! Brightness-bucketed batch rasterization.
//!
//! Cells are grouped by quantized density so the raster pass performs one
//! style change per bucket and one glyph draw per cell, amortizing style
//! switches across a potentially very large cell count.

use crate::glyph_atlas::{GlyphAtlas, GLYPH_HEIGHT, GLYPH_WIDTH};

/// One pending glyph draw: character plus its pixel-space anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub character: u8,
    pub x: u32,
    pub y: u32,
}

/// Fixed set of density buckets, least dense first. Bucket record lists are
/// transient: cleared (length only, capacity kept) at the start of every
/// composite pass.
pub struct BucketedCompositor {
    cell_size: u32,
    styles: Vec<f32>,
    buckets: Vec<Vec<DrawRecord>>,
    atlas: GlyphAtlas,
}

impl BucketedCompositor {
    pub fn new(num_buckets: usize, min_alpha: f32, cell_size: u32) -> Self {
        let styles = (0..num_buckets)
            .map(|bucket| bucket_alpha(bucket, num_buckets, min_alpha))
            .collect();
        Self {
            cell_size,
            styles,
            buckets: vec![Vec::new(); num_buckets],
            atlas: GlyphAtlas::new(),
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn style(&self, bucket: usize) -> f32 {
        self.styles[bucket]
    }

    pub fn records(&self, bucket: usize) -> &[DrawRecord] {
        &self.buckets[bucket]
    }

    /// Reset all bucket lists for a new pass.
    pub fn begin_pass(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    pub fn push(&mut self, bucket: usize, character: u8, x: u32, y: u32) {
        self.buckets[bucket].push(DrawRecord { character, x, y });
    }

    /// Rasterize all queued records into an RGBA frame of
    /// `width x height` pixels: clear to opaque black, then walk buckets in
    /// index order applying one fill style per non-empty bucket.
    pub fn composite(&self, frame: &mut [u8], width: u32, height: u32) {
        debug_assert_eq!(frame.len(), (width * height * 4) as usize);

        for pixel in frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&[0, 0, 0, 255]);
        }

        for (bucket, records) in self.buckets.iter().enumerate() {
            if records.is_empty() {
                continue;
            }
            let alpha = (self.styles[bucket] * 255.0).round() as u8;
            if alpha == 0 {
                continue;
            }
            for record in records {
                self.draw_glyph(frame, width, height, record, alpha);
            }
        }
    }

    /// Nearest-sample the 8x8 glyph bitmap across the cell, blending white
    /// at the bucket alpha. Anchors are top-aligned.
    fn draw_glyph(
        &self,
        frame: &mut [u8],
        width: u32,
        height: u32,
        record: &DrawRecord,
        alpha: u8,
    ) {
        for dy in 0..self.cell_size {
            let py = record.y + dy;
            if py >= height {
                break;
            }
            let glyph_y = ((dy * GLYPH_HEIGHT) / self.cell_size).min(GLYPH_HEIGHT - 1);

            for dx in 0..self.cell_size {
                let px = record.x + dx;
                if px >= width {
                    break;
                }
                let glyph_x = ((dx * GLYPH_WIDTH) / self.cell_size).min(GLYPH_WIDTH - 1);

                if self.atlas.sample(record.character, glyph_x, glyph_y) {
                    let index = ((py * width + px) * 4) as usize;
                    blend_pixel(frame, index, [255, 255, 255, alpha]);
                }
            }
        }
    }
}

/// Linear bucket-index-to-alpha ramp, rounded to two decimals so style
/// values stay stable across platforms.
pub fn bucket_alpha(bucket: usize, num_buckets: usize, min_alpha: f32) -> f32 {
    let t = if num_buckets > 1 {
        bucket as f32 / (num_buckets - 1) as f32
    } else {
        1.0
    };
    let alpha = min_alpha + t * (1.0 - min_alpha);
    (alpha * 100.0).round() / 100.0
}

fn blend_pixel(frame: &mut [u8], index: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }

    let inv_alpha = 255_u16.saturating_sub(alpha);
    for channel in 0..3 {
        let dst = u16::from(frame[index + channel]);
        let src_c = u16::from(src[channel]);
        frame[index + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[index + 3] = 255;
}
