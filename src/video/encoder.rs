use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::imaging::{FrameSequence, PanDirection};
use crate::video::ffmpeg::FfmpegWriter;
use crate::video::frame_io::FrameSink;
use crate::video::types::{Clip, VideoParams};

/// Encodes one pan sequence into one self-contained MP4 clip
#[derive(Debug, Clone)]
pub struct ClipEncoder {
    params: VideoParams,
}

impl ClipEncoder {
    pub fn new(params: VideoParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &VideoParams {
        &self.params
    }

    /// Encode `frames` to `output_path`, playing them in `direction`.
    ///
    /// An empty sequence is a wiring bug upstream and is rejected before any
    /// file is created.
    pub fn encode<P: AsRef<Path>>(
        &self,
        frames: &FrameSequence,
        direction: PanDirection,
        output_path: P,
    ) -> Result<Clip> {
        let output_path = output_path.as_ref();

        if frames.is_empty() {
            return Err(ConfigError::EmptyFrameSequence {
                path: output_path.display().to_string(),
            }.into());
        }

        let (width, height) = frames.frame_size();
        let mut writer = FfmpegWriter::spawn(output_path, (width, height), &self.params)?;
        let written = self.write_sequence(frames, direction, &mut writer)?;
        writer.finish()?;

        info!(
            "Encoded {:?}: {} frames, {}x{}, {}",
            output_path.file_name().unwrap_or_default(), written, width, height, direction
        );

        Ok(Clip {
            path: output_path.to_path_buf(),
            width,
            height,
            fps: self.params.fps as f64,
            frame_count: written,
            direction: Some(direction),
        })
    }

    /// Push every frame of `frames` into `sink` in playback order
    pub fn write_sequence<K: FrameSink>(
        &self,
        frames: &FrameSequence,
        direction: PanDirection,
        sink: &mut K,
    ) -> Result<usize> {
        debug!("Writing {} frames {}", frames.len(), direction);

        let mut written = 0;
        match direction {
            PanDirection::TopToBottom => {
                for frame in frames.frames() {
                    sink.write_frame(&frame)?;
                    written += 1;
                }
            }
            PanDirection::BottomToTop => {
                for frame in frames.frames().rev() {
                    sink.write_frame(&frame)?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}
