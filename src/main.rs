use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use glyphcast::config::{load_profile, Profile};
use glyphcast::scene::SubjectScene;

#[derive(Debug, Parser)]
#[command(name = "glyphcast")]
#[command(about = "Live 3D-to-glyph renderer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open the interactive window.
    Run {
        /// Tuning profile (YAML); defaults are compiled in.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the subject model path from the profile.
        #[arg(long)]
        model: Option<PathBuf>,
        /// Override the flicker seed from the profile.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a profile and probe its model asset.
    Check {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            model,
            seed,
        } => run_window(config.as_deref(), model, seed),
        Commands::Check { config } => run_check(config.as_deref()),
    }
}

fn run_window(
    config: Option<&Path>,
    model: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<()> {
    let mut profile = load_profile(config)?;
    if let Some(model) = model {
        profile.model_path = model;
    }
    if let Some(seed) = seed {
        profile.seed = Some(seed);
    }
    glyphcast::app::run(profile)
}

fn run_check(config: Option<&Path>) -> Result<()> {
    let profile = load_profile(config)?;
    print_profile_summary(&profile, config);

    let scene = SubjectScene::load(&profile.model_path);
    if scene.is_empty() {
        println!(
            "Subject: {} not loadable, would run backdrop-only",
            profile.model_path.display()
        );
    } else {
        println!(
            "Subject: {} ({} vertices, {} triangles)",
            profile.model_path.display(),
            scene.vertices().len(),
            scene.indices().len() / 3
        );
    }
    Ok(())
}

fn print_profile_summary(profile: &Profile, source: Option<&Path>) {
    match source {
        Some(path) => println!("OK: {}", path.display()),
        None => println!("OK: built-in defaults"),
    }
    println!(
        "Grid: {}px cells, {} buckets, min alpha {}",
        profile.cell_size, profile.num_buckets, profile.min_alpha
    );
    println!(
        "Wide displays: scale {} above {}px",
        profile.wide_scale, profile.wide_width_threshold
    );
    match profile.seed {
        Some(seed) => println!("Seed: {seed}"),
        None => println!("Seed: per-run entropy"),
    }
}
