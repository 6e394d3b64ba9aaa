use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Tuning profile for the glyph pipeline. Every field has a default, so an
/// empty file (or no file at all) yields the stock look.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    /// Pixel pitch of one glyph cell.
    pub cell_size: u32,
    /// Number of density buckets for batched drawing.
    pub num_buckets: usize,
    /// Display alpha of the least dense bucket.
    pub min_alpha: f32,
    /// Effective width above which glyph density is scaled down.
    pub wide_width_threshold: u32,
    /// Scale factor applied past the threshold.
    pub wide_scale: f32,
    /// Subject model asset (glTF). Missing file degrades to an empty scene.
    pub model_path: PathBuf,
    /// Seed for the flicker generator; omit for a per-run random seed.
    pub seed: Option<u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            cell_size: 10,
            num_buckets: 12,
            min_alpha: 0.0,
            wide_width_threshold: 2000,
            wide_scale: 0.75,
            model_path: PathBuf::from("assets/head.glb"),
            seed: None,
        }
    }
}

impl Profile {
    pub fn validate(&self) -> Result<()> {
        if self.cell_size == 0 {
            bail!("cell_size must be at least 1");
        }
        if self.num_buckets == 0 {
            bail!("num_buckets must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.min_alpha) {
            bail!("min_alpha must be within [0, 1], got {}", self.min_alpha);
        }
        if self.wide_scale <= 0.0 || self.wide_scale > 1.0 {
            bail!("wide_scale must be within (0, 1], got {}", self.wide_scale);
        }
        Ok(())
    }

    /// Glyph density scale for a given effective surface width.
    pub fn scale_factor(&self, width: u32) -> f32 {
        if width > self.wide_width_threshold {
            self.wide_scale
        } else {
            1.0
        }
    }

    /// Grid dimensions for a surface of `width x height` device pixels.
    pub fn grid_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = self.scale_factor(width);
        let cols = (width as f32 * scale / self.cell_size as f32).floor() as u32;
        let rows = (height as f32 * scale / self.cell_size as f32).floor() as u32;
        (cols.max(1), rows.max(1))
    }
}

/// Load a profile, or the defaults when no path is given.
pub fn load_profile(path: Option<&Path>) -> Result<Profile> {
    let profile = match path {
        None => Profile::default(),
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read profile {}", path.display()))?;
            serde_yaml::from_str(&contents).map_err(|error| {
                let location = error
                    .location()
                    .map(|location| {
                        format!("line {}, column {}", location.line(), location.column())
                    })
                    .unwrap_or_else(|| "unknown location".to_owned());
                anyhow!(
                    "failed to parse yaml in {} at {}: {}",
                    path.display(),
                    location,
                    error
                )
            })?
        }
    };

    profile.validate()?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::{load_profile, Profile};
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let profile = Profile::default();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.cell_size, 10);
        assert_eq!(profile.num_buckets, 12);
    }

    #[test]
    fn wide_surfaces_scale_down() {
        let profile = Profile::default();
        assert_eq!(profile.scale_factor(1920), 1.0);
        assert_eq!(profile.scale_factor(2000), 1.0);
        assert_eq!(profile.scale_factor(2001), 0.75);

        let (cols, rows) = profile.grid_dims(1000, 600);
        assert_eq!((cols, rows), (100, 60));
        let (wide_cols, _) = profile.grid_dims(2400, 600);
        assert_eq!(wide_cols, 180);
    }

    #[test]
    fn grid_dims_never_collapse_to_zero() {
        let profile = Profile::default();
        assert_eq!(profile.grid_dims(3, 3), (1, 1));
    }

    #[test]
    fn profile_file_overrides_and_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "cell_size: 8\nseed: 99").expect("write profile");
        let profile = load_profile(Some(file.path())).expect("profile should load");
        assert_eq!(profile.cell_size, 8);
        assert_eq!(profile.seed, Some(99));
        assert_eq!(profile.num_buckets, 12);

        let mut bad = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(bad, "min_alpha: 1.5").expect("write profile");
        assert!(load_profile(Some(bad.path())).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "cel_size: 8").expect("write profile");
        assert!(load_profile(Some(file.path())).is_err());
    }
}
