use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::VideoParams,
};

/// Main configuration for the slideshow compositor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Blurred-background canvas settings
    pub canvas: CanvasConfig,

    /// Pan (Ken Burns) frame generation settings
    pub pan: PanConfig,

    /// Clip encoding settings
    pub video: VideoConfig,

    /// Crossfade settings used when merging clips
    pub transition: TransitionConfig,

    /// Run-level orchestration settings
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            pan: PanConfig::default(),
            video: VideoConfig::default(),
            transition: TransitionConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.canvas.validate()?;
        self.pan.validate()?;
        self.video.validate()?;
        self.transition.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Blurred-background canvas configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Output canvas height in pixels
    pub height: u32,

    /// Horizontal term of the canvas aspect ratio
    pub aspect_width: u32,

    /// Vertical term of the canvas aspect ratio
    pub aspect_height: u32,

    /// Gaussian blur sigma applied to the backdrop
    pub blur_sigma: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            height: 2000,
            aspect_width: 9,
            aspect_height: 16,
            blur_sigma: 20.0,
        }
    }
}

impl CanvasConfig {
    /// Canvas width for the configured height, rounded to the nearest pixel
    pub fn width(&self) -> u32 {
        let width = (self.height as f64 * self.aspect_width as f64 / self.aspect_height as f64).round();
        (width as u32).max(1)
    }

    fn validate(&self) -> Result<()> {
        if self.height == 0 {
            return Err(invalid("canvas.height", self.height).into());
        }

        if self.aspect_width == 0 || self.aspect_height == 0 {
            return Err(invalid(
                "canvas.aspect",
                format!("{}:{}", self.aspect_width, self.aspect_height),
            ).into());
        }

        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(invalid("canvas.blur_sigma", self.blur_sigma).into());
        }

        Ok(())
    }
}

/// Pan frame generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanConfig {
    /// Width of every generated frame
    pub crop_width: u32,

    /// Height of every generated frame
    pub crop_height: u32,

    /// Number of pan steps per image
    pub min_frames: u32,

    /// Lower bound of the random zoom factor
    pub zoom_min: f64,

    /// Upper bound of the random zoom factor
    pub zoom_max: f64,
}

impl Default for PanConfig {
    fn default() -> Self {
        Self {
            crop_width: 1620,
            crop_height: 2880,
            min_frames: 120,
            zoom_min: 1.2,
            zoom_max: 1.5,
        }
    }
}

impl PanConfig {
    fn validate(&self) -> Result<()> {
        if self.crop_width == 0 || self.crop_height == 0 {
            return Err(invalid(
                "pan.crop_size",
                format!("{}x{}", self.crop_width, self.crop_height),
            ).into());
        }

        // yuv420p needs even dimensions
        if self.crop_width % 2 != 0 || self.crop_height % 2 != 0 {
            return Err(invalid(
                "pan.crop_size",
                format!("{}x{} (must be even)", self.crop_width, self.crop_height),
            ).into());
        }

        if self.min_frames == 0 {
            return Err(invalid("pan.min_frames", self.min_frames).into());
        }

        if !self.zoom_min.is_finite() || !self.zoom_max.is_finite()
            || self.zoom_min < 1.0 || self.zoom_min > self.zoom_max
        {
            return Err(invalid(
                "pan.zoom_range",
                format!("{}-{}", self.zoom_min, self.zoom_max),
            ).into());
        }

        Ok(())
    }
}

/// Clip encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Encoder parameters shared by per-image clips and the merged output
    pub params: VideoParams,

    /// Number of images processed in parallel
    pub processing_threads: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            params: VideoParams::default(),
            processing_threads: num_cpus::get(),
        }
    }
}

impl VideoConfig {
    fn validate(&self) -> Result<()> {
        if self.params.fps == 0 {
            return Err(invalid("video.params.fps", self.params.fps).into());
        }

        if !(1..=31).contains(&self.params.quality) {
            return Err(invalid("video.params.quality", self.params.quality).into());
        }

        if self.params.codec.is_empty() {
            return Err(invalid("video.params.codec", "<empty>").into());
        }

        if self.processing_threads == 0 {
            return Err(invalid("video.processing_threads", self.processing_threads).into());
        }

        Ok(())
    }
}

/// Crossfade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Crossfade duration between clips (seconds); zero means hard cuts
    pub duration: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self { duration: 0.5 }
    }
}

impl TransitionConfig {
    fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(invalid("transition.duration", self.duration).into());
        }
        Ok(())
    }
}

/// What to do when one source image cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorPolicy {
    /// Log the failure and continue with the remaining images
    Skip,
    /// Fail the whole run
    Abort,
}

/// Run-level orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed for the zoom factor draw; unset means a fresh seed per run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Keep composited canvases and per-image clips after the run
    pub keep_intermediates: bool,

    /// Behaviour when a source image fails to decode
    pub on_decode_error: DecodeErrorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            keep_intermediates: false,
            on_decode_error: DecodeErrorPolicy::Skip,
        }
    }
}
