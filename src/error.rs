use thiserror::Error;

/// Main error type for the slideshow compositor library
#[derive(Error, Debug)]
pub enum SlideshowError {
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Still-image errors
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode image '{name}': {reason}")]
    DecodeFailed { name: String, reason: String },

    #[error("Failed to save image '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Invalid image dimensions for '{name}': {width}x{height}")]
    InvalidDimensions { name: String, width: u32, height: u32 },
}

/// Video-specific errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("FFmpeg not found on PATH. Please install FFmpeg.")]
    FfmpegNotFound,

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Failed to probe video file {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },
}

/// Configuration-specific errors
///
/// Besides malformed config files this also covers contract violations in how
/// the stages are wired together, which are fatal to the run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Clip '{clip}' is {found_width}x{found_height}, expected {expected_width}x{expected_height}")]
    ResolutionMismatch {
        clip: String,
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("Refusing to encode an empty frame sequence into {path}")]
    EmptyFrameSequence { path: String },
}

/// Convenience type alias for Results using SlideshowError
pub type Result<T> = std::result::Result<T, SlideshowError>;

impl SlideshowError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if this error only affects the image that raised it, so the
    /// orchestrator may skip that image and keep going with its siblings.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Image(ImageError::DecodeFailed { .. })
                | Self::Image(ImageError::InvalidDimensions { .. })
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Image(ImageError::DecodeFailed { name, .. }) => {
                format!("Could not read image '{}'. Only JPEG and PNG files are supported.", name)
            }
            Self::Video(VideoError::FfmpegNotFound) => {
                "FFmpeg is required to encode and read clips. Install it and make sure `ffmpeg` and `ffprobe` are on PATH.".to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Config(ConfigError::ResolutionMismatch { clip, .. }) => {
                format!("Clip '{}' does not match the resolution of the other clips; all clips must be encoded at the same size.", clip)
            }
            _ => self.to_string(),
        }
    }
}
