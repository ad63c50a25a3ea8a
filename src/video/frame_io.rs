use std::collections::VecDeque;

use crate::error::{Result, VideoError};
use crate::video::types::Frame;

/// Anything that yields the frames of one clip in playback order
pub trait FrameSource {
    /// Size `(width, height)` of every frame this source yields
    fn dimensions(&self) -> (u32, u32);

    /// Next frame, or `None` once the clip is exhausted
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Label used in log lines and error messages
    fn name(&self) -> String {
        "clip".to_string()
    }
}

/// Anything that accepts frames in output order
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}

/// Collects frames in memory
impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}

/// A clip held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryClip {
    name: String,
    size: (u32, u32),
    frames: VecDeque<Frame>,
}

impl MemoryClip {
    pub fn new<S: Into<String>>(name: S, frames: Vec<Frame>) -> Result<Self> {
        let name = name.into();
        let size = frames.first().map(Frame::dimensions).unwrap_or((0, 0));

        if let Some(odd) = frames.iter().find(|frame| frame.dimensions() != size) {
            return Err(VideoError::InvalidFrame {
                reason: format!(
                    "{}: frame is {}x{}, expected {}x{}",
                    name, odd.width(), odd.height(), size.0, size.1
                ),
            }.into());
        }

        Ok(Self { name, size, frames: frames.into() })
    }

    /// `count` frames of one solid color
    pub fn solid<S: Into<String>>(name: S, (width, height): (u32, u32), color: [u8; 3], count: usize) -> Self {
        Self {
            name: name.into(),
            size: (width, height),
            frames: (0..count).map(|_| Frame::new_filled(width, height, color)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for MemoryClip {
    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_clip_drains_in_order() {
        let frames = vec![
            Frame::new_filled(2, 2, [1, 1, 1]),
            Frame::new_filled(2, 2, [2, 2, 2]),
        ];
        let mut clip = MemoryClip::new("a", frames).unwrap();

        assert_eq!(clip.dimensions(), (2, 2));
        assert_eq!(clip.next_frame().unwrap().unwrap().get_pixel(0, 0), [1, 1, 1]);
        assert_eq!(clip.next_frame().unwrap().unwrap().get_pixel(0, 0), [2, 2, 2]);
        assert!(clip.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_memory_clip_rejects_mixed_sizes() {
        let frames = vec![
            Frame::new_filled(2, 2, [0, 0, 0]),
            Frame::new_filled(4, 2, [0, 0, 0]),
        ];
        assert!(MemoryClip::new("mixed", frames).is_err());
    }
}
