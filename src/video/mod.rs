//! # Video Module
//!
//! Clip encoding, clip decoding and the crossfade merge. Video I/O goes
//! through the system `ffmpeg`; everything above it works on [`Frame`]s via
//! the [`FrameSource`] / [`FrameSink`] traits.

pub mod encoder;
pub mod ffmpeg;
pub mod frame_io;
pub mod merger;
pub mod types;

pub use encoder::ClipEncoder;
pub use ffmpeg::{check_ffmpeg_available, check_ffprobe_available, probe_clip, FfmpegReader, FfmpegWriter};
pub use frame_io::{FrameSink, FrameSource, MemoryClip};
pub use merger::{crossfade, CrossfadeCursor, MergeOutcome, MergeState, TransitionMerger};
pub use types::{Clip, EncodedVideo, Frame, Timeline, VideoParams};
