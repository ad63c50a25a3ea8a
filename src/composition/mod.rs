//! Slideshow rendering pipeline

pub mod engine;

pub use engine::{
    default_output_path, load_clips_from_dir, load_sources_from_dir, RenderOutcome,
    SlideshowEngine,
};
