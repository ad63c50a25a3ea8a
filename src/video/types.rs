use image::{ImageBuffer, Rgb, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VideoError};
use crate::imaging::PanDirection;

/// Represents a single video frame
///
/// A thin wrapper around an RGB image buffer. Frames are what the encoder
/// writes and what the clip reader hands back to the merger.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Packed rgb24 bytes, row-major, as ffmpeg expects on a rawvideo pipe
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data)
            .map(|buffer| Self { buffer })
    }

    /// Linear crossfade: `(1 - alpha) * self + alpha * other`, per channel.
    ///
    /// `alpha` is clamped to `[0, 1]`. Both frames must have the same size.
    pub fn blend(&self, other: &Frame, alpha: f32) -> Result<Frame> {
        if self.dimensions() != other.dimensions() {
            return Err(VideoError::InvalidFrame {
                reason: format!(
                    "cannot blend {}x{} with {}x{}",
                    self.width(), self.height(), other.width(), other.height()
                ),
            }.into());
        }

        let alpha = alpha.clamp(0.0, 1.0);
        let keep = 1.0 - alpha;

        let data: Vec<u8> = self.buffer.as_raw()
            .par_iter()
            .zip(other.buffer.as_raw().par_iter())
            .map(|(&a, &b)| (a as f32 * keep + b as f32 * alpha).round().clamp(0.0, 255.0) as u8)
            .collect();

        Frame::from_rgb_bytes(self.width(), self.height(), data)
            .ok_or_else(|| VideoError::InvalidFrame {
                reason: "blend produced a buffer of the wrong size".to_string(),
            }.into())
    }
}

/// Video encoding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoParams {
    /// Output frame rate
    pub fps: u32,

    /// ffmpeg encoder name
    pub codec: String,

    /// Codec tag written into the MP4 container
    pub fourcc: String,

    /// ffmpeg `-q:v` quantizer (1 is best, 31 is worst)
    pub quality: u8,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            fps: 30,
            codec: "mpeg4".to_string(),
            fourcc: "mp4v".to_string(),
            quality: 5,
        }
    }
}

/// One encoded per-image video clip on disk
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: usize,

    /// Pan direction the clip was encoded with, when it is known
    pub direction: Option<PanDirection>,
}

impl Clip {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }

    /// File name used in log lines and error messages
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Ordered list of clips to merge; insertion order is playback order
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    clips: Vec<Clip>,
}

impl Timeline {
    pub fn new() -> Self {
        Self { clips: Vec::new() }
    }

    /// Append a clip at the end of the timeline
    pub fn push(&mut self, clip: Clip) {
        self.clips.push(clip);
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter()
    }

    /// Sum of the frame counts of every clip
    pub fn total_frames(&self) -> usize {
        self.clips.iter().map(|clip| clip.frame_count).sum()
    }

    /// Number of frames the crossfade merge emits for this timeline.
    ///
    /// Each boundary blends `min(window, frames left in the outgoing clip)`
    /// frames, and the incoming clip frames used by a blend are not emitted a
    /// second time.
    pub fn merged_frame_count(&self, window: usize) -> usize {
        let counts: Vec<usize> = self.clips.iter().map(|clip| clip.frame_count).collect();
        merged_frame_count(&counts, window)
    }
}

pub(crate) fn merged_frame_count(counts: &[usize], window: usize) -> usize {
    let mut consumed_head = 0usize;
    let mut total = 0usize;

    for (i, &count) in counts.iter().enumerate() {
        let remaining = count.saturating_sub(consumed_head);
        total += remaining;

        consumed_head = match counts.get(i + 1) {
            Some(&next) => window.min(remaining).min(next),
            None => 0,
        };
    }

    total
}

impl FromIterator<Clip> for Timeline {
    fn from_iter<I: IntoIterator<Item = Clip>>(iter: I) -> Self {
        Self { clips: iter.into_iter().collect() }
    }
}

/// Represents a finished video file
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub duration: f64,
    pub file_size: u64,
}

impl EncodedVideo {
    pub(crate) fn from_output(
        path: &Path,
        (width, height): (u32, u32),
        frame_count: usize,
        fps: u32,
    ) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            frame_count,
            duration: frame_count as f64 / fps.max(1) as f64,
            file_size: metadata.len(),
        })
    }

    /// Read the whole encoded file into memory
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}
