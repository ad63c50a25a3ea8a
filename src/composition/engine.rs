use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tokio::task;
use tracing::{debug, info, warn};

use crate::{
    config::{Config, DecodeErrorPolicy},
    error::{Result, SlideshowError, VideoError},
    imaging::{BackgroundCompositor, CompositedImage, PanDirection, PanFrameGenerator, SourceImage},
    video::{check_ffmpeg_available, probe_clip, Clip, ClipEncoder, EncodedVideo, MergeOutcome, Timeline, TransitionMerger},
};

/// What a render produced
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// The slideshow was written
    Rendered {
        video: EncodedVideo,
        timeline: Timeline,
    },
    /// No usable source images; no file was written
    NothingToRender,
}

/// Main engine that turns still images into one slideshow video
///
/// The engine follows a clear pipeline:
/// 1. Compositing - Fit every image onto a blurred 9:16 canvas (parallel)
/// 2. Clip Rendering - Pan over each canvas and encode one clip per image (parallel)
/// 3. Merging - Concatenate the clips with crossfades (sequential)
#[derive(Debug, Clone)]
pub struct SlideshowEngine {
    config: Config,
}

/// A source image that survived decoding, with its canvas
struct Staged<'a> {
    source: &'a SourceImage,
    image: CompositedImage,
}

impl SlideshowEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Render `sources`, in the given order, into a slideshow at `output_path`
    pub async fn compose<P: AsRef<Path>>(
        &self,
        sources: Vec<SourceImage>,
        output_path: P,
    ) -> Result<RenderOutcome> {
        let engine = self.clone();
        let output_path = output_path.as_ref().to_path_buf();

        task::spawn_blocking(move || engine.render(&sources, &output_path))
            .await
            .map_err(|e| SlideshowError::generic(format!("Render task failed: {}", e)))?
    }

    /// Render every JPEG/PNG in `image_dir`, ordered by file name
    pub async fn compose_dir<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        image_dir: P,
        output_path: Q,
    ) -> Result<RenderOutcome> {
        let sources = load_sources_from_dir(image_dir)?;
        self.compose(sources, output_path).await
    }

    /// Crossfade every `*.mp4` in `clip_dir`, ordered by file name
    pub async fn merge_dir<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        clip_dir: P,
        output_path: Q,
    ) -> Result<MergeOutcome> {
        let clip_dir = clip_dir.as_ref().to_path_buf();
        let output_path = output_path.as_ref().to_path_buf();
        let merger = TransitionMerger::new(
            self.config.video.params.clone(),
            self.config.transition.duration,
        );

        task::spawn_blocking(move || {
            let clips = load_clips_from_dir(&clip_dir)?;
            merger.merge(&clips, &output_path)
        })
        .await
        .map_err(|e| SlideshowError::generic(format!("Merge task failed: {}", e)))?
    }

    /// Blocking version of [`compose`](Self::compose)
    pub fn render(&self, sources: &[SourceImage], output_path: &Path) -> Result<RenderOutcome> {
        self.config.validate()?;

        info!("🎬 Starting slideshow render");
        info!("   Images: {}", sources.len());
        info!("   Output: {:?}", output_path);

        if sources.is_empty() {
            warn!("No source images supplied; nothing to render");
            return Ok(RenderOutcome::NothingToRender);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.video.processing_threads)
            .build()
            .map_err(|e| SlideshowError::generic(format!("Failed to build worker pool: {}", e)))?;

        // Pipeline Step 1: Compositing
        let staged = pool.install(|| self.composite_all(sources))?;
        if staged.is_empty() {
            warn!("None of the {} source images could be decoded; nothing to render", sources.len());
            return Ok(RenderOutcome::NothingToRender);
        }

        if !check_ffmpeg_available() {
            return Err(VideoError::FfmpegNotFound.into());
        }

        let work = WorkDir::create(output_path, self.config.pipeline.keep_intermediates)?;
        if work.keep {
            for (index, item) in staged.iter().enumerate() {
                item.image.save_png(work.composited_path(index, &item.source.stem()))?;
            }
        }

        // Pipeline Step 2: Pan + encode
        let timeline = pool.install(|| self.render_clips(&staged, &work))?;
        drop(staged);

        // Pipeline Step 3: Merge
        let merger = TransitionMerger::new(
            self.config.video.params.clone(),
            self.config.transition.duration,
        );
        info!("🎞️  Step 3: Merging {} clips...", timeline.len());
        debug!(
            "Expecting {} output frames ({} clip frames, {} frame windows)",
            timeline.merged_frame_count(merger.window_frames()),
            timeline.total_frames(),
            merger.window_frames()
        );

        match merger.merge(timeline.clips(), output_path)? {
            MergeOutcome::Merged(video) => {
                info!("🎉 Slideshow complete! Output saved to: {:?}", video.path);
                info!("      Duration: {:.2}s", video.duration);
                info!("      Frame count: {}", video.frame_count);
                Ok(RenderOutcome::Rendered { video, timeline })
            }
            MergeOutcome::NoClips => Ok(RenderOutcome::NothingToRender),
        }
    }

    fn composite_all<'a>(&self, sources: &'a [SourceImage]) -> Result<Vec<Staged<'a>>> {
        info!("🖼️  Step 1: Compositing {} images...", sources.len());
        let compositor = BackgroundCompositor::new(&self.config.canvas);

        let results: Vec<Result<CompositedImage>> = sources
            .par_iter()
            .map(|source| compositor.composite_source(source))
            .collect();

        let mut staged = Vec::with_capacity(sources.len());
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(image) => staged.push(Staged { source, image }),
                Err(e) if e.is_recoverable() && self.config.pipeline.on_decode_error == DecodeErrorPolicy::Skip => {
                    warn!("Skipping '{}': {}", source.name, e);
                }
                Err(e) => return Err(e),
            }
        }

        info!("   ✅ {} of {} images composited", staged.len(), sources.len());
        Ok(staged)
    }

    fn render_clips(&self, staged: &[Staged<'_>], work: &WorkDir) -> Result<Timeline> {
        info!("📹 Step 2: Rendering {} pan clips...", staged.len());
        let generator = PanFrameGenerator::new(&self.config.pan);
        let encoder = ClipEncoder::new(self.config.video.params.clone());

        let clips: Vec<Clip> = staged
            .par_iter()
            .enumerate()
            .map(|(index, item)| {
                let direction = PanDirection::for_index(index);
                let mut rng = self.rng_for(index);
                let frames = generator.generate(&item.image, &mut rng)?;

                debug!(
                    "{:02} - {} zoom {:.3}, {} frames, {}",
                    index, item.source.name, frames.zoom(), frames.len(), direction
                );

                encoder.encode(&frames, direction, work.clip_path(index, &item.source.stem()))
            })
            .collect::<Result<Vec<Clip>>>()?;

        Ok(clips.into_iter().collect())
    }

    /// Per-image random source; seeded runs are reproducible regardless of
    /// which worker picks up which image.
    fn rng_for(&self, index: usize) -> SmallRng {
        match self.config.pipeline.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => SmallRng::from_entropy(),
        }
    }
}

/// Where a render of `image_dir` lands unless told otherwise
pub fn default_output_path<P: AsRef<Path>>(image_dir: P) -> PathBuf {
    let image_dir = image_dir.as_ref();
    let name = image_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slideshow".to_string());
    image_dir
        .with_file_name(format!("{}_Final", name))
        .join("concatenated_video.mp4")
}

fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

fn list_files(dir: &Path, allowed: &[&str]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && !is_hidden_file(&path) && has_extension(&path, allowed) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Read every JPEG/PNG in `dir`, sorted by file name
pub fn load_sources_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<SourceImage>> {
    let dir = dir.as_ref();
    let sources = list_files(dir, &["jpg", "jpeg", "png"])?
        .into_iter()
        .map(SourceImage::from_path)
        .collect::<Result<Vec<_>>>()?;

    info!("Loaded {} source images from {:?}", sources.len(), dir);
    Ok(sources)
}

/// Probe every `*.mp4` in `dir`, sorted by file name
pub fn load_clips_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Clip>> {
    let dir = dir.as_ref();
    let clips = list_files(dir, &["mp4"])?
        .into_iter()
        .map(probe_clip)
        .collect::<Result<Vec<_>>>()?;

    info!("Found {} clips in {:?}", clips.len(), dir);
    Ok(clips)
}

static RUN_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Per-run scratch directory next to the output file
struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    fn create(output_path: &Path, keep: bool) -> Result<Self> {
        let parent = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let run = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = parent.join(format!(
            ".slideshow-work-{}-{}-{}",
            Local::now().format("%Y%m%d-%H%M%S"),
            std::process::id(),
            run
        ));

        std::fs::create_dir_all(path.join("clips"))?;
        if keep {
            std::fs::create_dir_all(path.join("composited"))?;
        }
        debug!("Working directory: {:?}", path);

        Ok(Self { path, keep })
    }

    fn clip_path(&self, index: usize, stem: &str) -> PathBuf {
        self.path.join("clips").join(format!("{:03}_{}.mp4", index, stem))
    }

    fn composited_path(&self, index: usize, stem: &str) -> PathBuf {
        self.path.join("composited").join(format!("{:03}_{}.png", index, stem))
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            info!("Intermediate files kept in {:?}", self.path);
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Failed to remove working directory {:?}: {}", self.path, e);
        }
    }
}
