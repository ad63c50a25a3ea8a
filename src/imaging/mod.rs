//! # Still Image Module
//!
//! Turns source stills into pan sequences: the blurred-background
//! compositor fits each image into the output aspect ratio, and the pan
//! generator crops a moving window out of the result.

pub mod background;
pub mod pan;

pub use background::{BackgroundCompositor, CompositedImage, SourceImage};
pub use pan::{pan_offsets, FrameSequence, PanDirection, PanFrameGenerator};
