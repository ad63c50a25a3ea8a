//! # Slideshow-Compositor
//!
//! Turn a folder of still images into one vertical slideshow video.
//!
//! Every image is fitted onto a blurred copy of itself at 9:16, panned over
//! with a random zoom (alternating direction from image to image), encoded
//! as its own clip, and the clips are joined with short crossfades.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slideshow_compositor::{
//!     composition::{load_sources_from_dir, SlideshowEngine},
//!     config::Config,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = SlideshowEngine::new(Config::default());
//! let sources = load_sources_from_dir("images/")?;
//!
//! engine.compose(sources, "output/slideshow.mp4").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`imaging`] - Canvas compositing and pan frame generation
//! - [`video`] - Clip encoding, decoding and crossfade merging
//! - [`composition`] - Main rendering engine
//! - [`config`] - Configuration management
//!
//! ## Custom frame sources
//!
//! The crossfade merger works on anything implementing
//! [`FrameSource`](video::FrameSource), so clips don't have to come from disk:
//!
//! ```rust
//! use slideshow_compositor::video::{crossfade, Frame, MemoryClip};
//!
//! # fn main() -> slideshow_compositor::Result<()> {
//! let clips = vec![
//!     MemoryClip::solid("a", (4, 4), [255, 0, 0], 10),
//!     MemoryClip::solid("b", (4, 4), [0, 0, 255], 10),
//! ];
//! let mut out: Vec<Frame> = Vec::new();
//! let written = crossfade(clips.into_iter().map(Ok), 3, &mut out)?;
//! assert_eq!(written, 17);
//! # Ok(())
//! # }
//! ```

pub mod composition;
pub mod config;
pub mod error;
pub mod imaging;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{RenderOutcome, SlideshowEngine},
    config::Config,
    error::{Result, SlideshowError},
};
