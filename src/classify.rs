//! Per-texel luminance classification.
//!
//! Each RGBA sample becomes a perceptual brightness, a two-layer fog term
//! (aura + core) and a nonlinear display density. The density drives both
//! bucket assignment and, indirectly, flicker likelihood.

/// Constant alpha floor under the additive fog layers.
pub const BASE_ALPHA: f32 = 0.05;
/// Brightness above which the sharp subject curve replaces the fog model.
pub const SUBJECT_THRESHOLD: f32 = 0.25;

/// Classification output for one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellClass {
    pub brightness: f32,
    pub aura: f32,
    pub core: f32,
    pub density: f32,
    pub bucket: usize,
}

/// Perceptual brightness of an 8-bit RGB sample, normalized to `[0, 1]`.
pub fn brightness(r: u8, g: u8, b: u8) -> f32 {
    (r as f32 * 0.299 + g as f32 * 0.587 + b as f32 * 0.114) / 255.0
}

/// Classify one sample. `num_buckets` must be non-zero.
pub fn classify(r: u8, g: u8, b: u8, num_buckets: usize) -> CellClass {
    let brightness = brightness(r, g, b);

    // Aura dominates near black, core near white.
    let aura = brightness.powf(0.35) * 0.2;
    let core = brightness.powf(1.5) * 0.5;

    // The subject gets a sharper contrast curve than the fog backdrop.
    let density = if brightness > SUBJECT_THRESHOLD {
        brightness.powf(1.8)
    } else {
        BASE_ALPHA + aura + core
    };

    CellClass {
        brightness,
        aura,
        core,
        density,
        bucket: bucket_index(density, num_buckets),
    }
}

/// Quantize a density value into `[0, num_buckets - 1]`.
pub fn bucket_index(density: f32, num_buckets: usize) -> usize {
    let raw = (density * num_buckets as f32).floor() as isize;
    raw.clamp(0, num_buckets as isize - 1) as usize
}

/// Byte offset of the sample feeding grid cell `(col, row)`.
///
/// Row 0 of the grid reads the last row of the buffer: the render target is
/// read back bottom-row-first while the output raster is top-left origin.
pub fn sample_index(col: u32, row: u32, cols: u32, rows: u32) -> usize {
    (((rows - 1 - row) * cols + col) * 4) as usize
}

#[cfg(test)]
mod tests {
    use super::{brightness, bucket_index, classify, sample_index};

    #[test]
    fn brightness_uses_perceptual_weights() {
        assert_eq!(brightness(0, 0, 0), 0.0);
        assert!((brightness(255, 255, 255) - 1.0).abs() < 1e-6);
        // Green dominates the weighting.
        assert!(brightness(0, 255, 0) > brightness(255, 0, 0));
        assert!(brightness(255, 0, 0) > brightness(0, 0, 255));
    }

    #[test]
    fn bucket_boundaries_are_clamped() {
        assert_eq!(bucket_index(0.0, 12), 0);
        assert_eq!(bucket_index(1.0, 12), 11);
        assert_eq!(bucket_index(1.5, 12), 11);
        for step in 0..=100 {
            let density = step as f32 / 100.0;
            let bucket = bucket_index(density, 12);
            assert!(bucket < 12);
        }
    }

    #[test]
    fn bright_subject_sample_lands_in_bucket_nine() {
        // brightness 0.9 -> density 0.9^1.8 ~ 0.827 -> floor(.. * 12) = 9
        let sample = (0.9f32 * 255.0).round() as u8;
        let class = classify(sample, sample, sample, 12);
        assert!(class.brightness > 0.25);
        assert_eq!(class.bucket, 9);
    }

    #[test]
    fn dark_samples_use_the_fog_model() {
        let class = classify(20, 20, 20, 12);
        assert!(class.brightness <= 0.25);
        let expected = 0.05 + class.aura + class.core;
        assert!((class.density - expected).abs() < 1e-6);
    }

    #[test]
    fn black_still_carries_the_alpha_floor() {
        let class = classify(0, 0, 0, 12);
        assert_eq!(class.aura, 0.0);
        assert_eq!(class.core, 0.0);
        assert!((class.density - 0.05).abs() < 1e-6);
        assert_eq!(class.bucket, 0);
    }

    #[test]
    fn sample_indexing_flips_rows() {
        // 3 cols x 2 rows: grid row 0 reads buffer row 1.
        assert_eq!(sample_index(0, 0, 3, 2), 12);
        assert_eq!(sample_index(2, 0, 3, 2), 20);
        assert_eq!(sample_index(0, 1, 3, 2), 0);
        let max = sample_index(2, 0, 3, 2);
        assert!(max + 3 < 3 * 2 * 4);
    }
}
