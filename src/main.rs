use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slideshow_compositor::{
    composition::{default_output_path, load_sources_from_dir, RenderOutcome, SlideshowEngine},
    config::Config,
    video::MergeOutcome,
};

#[derive(Parser)]
#[command(
    name = "slideshow-compositor",
    version,
    about = "Turn a folder of images into a vertical pan-and-crossfade slideshow",
    long_about = "Slideshow-Compositor fits every image onto a blurred 9:16 canvas, pans over it with a random zoom, and joins the resulting clips with short crossfades."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render a slideshow from a directory of JPEG/PNG images
    Render {
        /// Directory containing the source images
        #[arg(short, long)]
        images: PathBuf,

        /// Output video file path (default: <images>_Final/concatenated_video.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration file (optional)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for the per-image zoom, for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Crossfade duration in seconds (0 for hard cuts)
        #[arg(short, long)]
        transition: Option<f64>,

        /// Worker threads for compositing and clip encoding
        #[arg(long)]
        threads: Option<usize>,

        /// Keep composited images and per-image clips next to the output
        #[arg(long)]
        keep_intermediates: bool,
    },

    /// Crossfade every .mp4 in a directory into one video
    Merge {
        /// Directory containing the clips, merged in file-name order
        #[arg(long)]
        clips: PathBuf,

        /// Output video file path
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file (optional)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Crossfade duration in seconds (0 for hard cuts)
        #[arg(short, long)]
        transition: Option<f64>,
    },

    /// Write the default configuration as TOML
    Config {
        /// Destination file
        #[arg(short, long, default_value = "slideshow.toml")]
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Ok(Config::from_file(config_path)?)
        }
        None => {
            info!("Using default configuration");
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Slideshow-Compositor v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Render {
            images,
            output,
            config,
            seed,
            fps,
            transition,
            threads,
            keep_intermediates,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(seed) = seed {
                config.pipeline.seed = Some(seed);
            }
            if let Some(fps) = fps {
                config.video.params.fps = fps;
            }
            if let Some(transition) = transition {
                config.transition.duration = transition;
            }
            if let Some(threads) = threads {
                config.video.processing_threads = threads;
            }
            config.pipeline.keep_intermediates |= keep_intermediates;
            config.validate()?;

            let output = output.unwrap_or_else(|| default_output_path(&images));
            info!("Images: {:?}", images);
            info!("Output: {:?}", output);

            let sources = load_sources_from_dir(&images)?;
            let engine = SlideshowEngine::new(config);

            match engine.compose(sources, &output).await? {
                RenderOutcome::Rendered { video, .. } => {
                    info!("Slideshow saved to: {:?} ({} bytes)", video.path, video.file_size);
                }
                RenderOutcome::NothingToRender => {
                    warn!("No usable images in {:?}; no video was written", images);
                }
            }
        }

        Command::Merge {
            clips,
            output,
            config,
            transition,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(transition) = transition {
                config.transition.duration = transition;
            }
            config.validate()?;

            let engine = SlideshowEngine::new(config);
            match engine.merge_dir(&clips, &output).await? {
                MergeOutcome::Merged(video) => {
                    info!(
                        "Merged video saved to: {:?} ({} frames, {:.2}s)",
                        video.path, video.frame_count, video.duration
                    );
                }
                MergeOutcome::NoClips => {
                    warn!("No .mp4 clips in {:?}; no video was written", clips);
                }
            }
        }

        Command::Config { output } => {
            Config::default().save_to_file(&output)?;
            info!("Default configuration written to {:?}", output);
        }
    }

    Ok(())
}
