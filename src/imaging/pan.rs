use std::fmt;

use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PanConfig;
use crate::error::{ImageError, Result};
use crate::imaging::CompositedImage;
use crate::video::Frame;

/// Which way the virtual camera travels over the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanDirection {
    TopToBottom,
    BottomToTop,
}

impl PanDirection {
    /// Direction for the clip at `index` in the timeline.
    ///
    /// Even positions pan downwards and odd positions pan upwards, so
    /// neighbouring clips always move in opposite directions no matter which
    /// worker renders them first.
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            Self::TopToBottom
        } else {
            Self::BottomToTop
        }
    }
}

impl fmt::Display for PanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopToBottom => write!(f, "top-to-bottom"),
            Self::BottomToTop => write!(f, "bottom-to-top"),
        }
    }
}

/// Crop offsets for a pan over `max_y_offset` pixels in `min_frames` steps.
///
/// The step is `max_y_offset / min_frames` rounded down and the final frame
/// sits exactly on `max_y_offset`, so the last step absorbs the remainder and
/// the sequence holds `min_frames + 1` offsets. No pan room yields `[0]`.
pub fn pan_offsets(max_y_offset: u32, min_frames: u32) -> Vec<u32> {
    if max_y_offset == 0 || min_frames == 0 {
        return vec![0];
    }

    let step = (max_y_offset / min_frames).max(1);
    let mut offsets: Vec<u32> = (0..min_frames)
        .map(|i| i.saturating_mul(step).min(max_y_offset))
        .collect();
    offsets.push(max_y_offset);
    offsets
}

/// A pan over one zoomed canvas, as a list of crop windows.
///
/// Frames are cropped on demand so a sequence of a few hundred full-size
/// frames never sits in memory at once. Iteration order is always top to
/// bottom; the encoder reverses it for [`PanDirection::BottomToTop`].
#[derive(Debug, Clone)]
pub struct FrameSequence {
    canvas: RgbImage,
    frame_width: u32,
    frame_height: u32,
    x_offset: i64,
    y_offsets: Vec<u32>,
    zoom: f64,
}

impl FrameSequence {
    /// Build a sequence from a working canvas and explicit crop offsets
    pub fn from_offsets(
        canvas: RgbImage,
        (frame_width, frame_height): (u32, u32),
        x_offset: i64,
        y_offsets: Vec<u32>,
    ) -> Self {
        Self {
            canvas,
            frame_width,
            frame_height,
            x_offset,
            y_offsets,
            zoom: 1.0,
        }
    }

    pub fn len(&self) -> usize {
        self.y_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_offsets.is_empty()
    }

    /// Size `(width, height)` shared by every frame
    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn y_offsets(&self) -> &[u32] {
        &self.y_offsets
    }

    pub fn x_offset(&self) -> i64 {
        self.x_offset
    }

    /// Zoom factor the working canvas was scaled by
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Size of the zoomed canvas the frames are cropped from
    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Crop the frame at `index`
    pub fn frame(&self, index: usize) -> Option<Frame> {
        self.y_offsets.get(index).map(|&y| self.crop(y))
    }

    /// Frames in top-to-bottom order
    pub fn frames(&self) -> impl DoubleEndedIterator<Item = Frame> + ExactSizeIterator + '_ {
        self.y_offsets.iter().map(move |&y| self.crop(y))
    }

    fn crop(&self, y: u32) -> Frame {
        let (canvas_width, canvas_height) = self.canvas.dimensions();
        let fits = self.x_offset >= 0
            && self.x_offset + self.frame_width as i64 <= canvas_width as i64
            && y as u64 + self.frame_height as u64 <= canvas_height as u64;

        if fits {
            let view = imageops::crop_imm(
                &self.canvas,
                self.x_offset as u32,
                y,
                self.frame_width,
                self.frame_height,
            );
            return Frame::new(view.to_image());
        }

        // window reaches past the canvas: pad with black
        let mut frame = RgbImage::new(self.frame_width, self.frame_height);
        imageops::replace(&mut frame, &self.canvas, -self.x_offset, -(y as i64));
        Frame::new(frame)
    }
}

/// Generates the Ken Burns pan for one composited image
#[derive(Debug, Clone)]
pub struct PanFrameGenerator {
    crop_width: u32,
    crop_height: u32,
    min_frames: u32,
    zoom_min: f64,
    zoom_max: f64,
}

impl PanFrameGenerator {
    pub fn new(config: &PanConfig) -> Self {
        Self {
            crop_width: config.crop_width,
            crop_height: config.crop_height,
            min_frames: config.min_frames,
            zoom_min: config.zoom_min,
            zoom_max: config.zoom_max,
        }
    }

    /// Draw a zoom factor from `rng` and generate the pan
    pub fn generate<R: Rng + ?Sized>(&self, image: &CompositedImage, rng: &mut R) -> Result<FrameSequence> {
        let zoom = if self.zoom_max > self.zoom_min {
            rng.gen_range(self.zoom_min..=self.zoom_max)
        } else {
            self.zoom_min
        };
        self.generate_with_zoom(image, zoom)
    }

    /// Generate the pan for a known zoom factor
    pub fn generate_with_zoom(&self, image: &CompositedImage, zoom: f64) -> Result<FrameSequence> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 || self.crop_width == 0 || self.crop_height == 0 {
            return Err(ImageError::InvalidDimensions {
                name: "composited canvas".to_string(),
                width,
                height,
            }
            .into());
        }

        // normalize to the crop width first, then zoom in
        let base_height = ((self.crop_width as u64 * height as u64) / width as u64).max(1) as u32;
        let base = imageops::resize(image.as_image(), self.crop_width, base_height, FilterType::Lanczos3);

        let working_width = ((self.crop_width as f64 * zoom).floor() as u32).max(1);
        let working_height = ((base_height as f64 * zoom).floor() as u32).max(1);
        let working = if (working_width, working_height) == (self.crop_width, base_height) {
            base
        } else {
            imageops::resize(&base, working_width, working_height, FilterType::Lanczos3)
        };

        let max_y_offset = working_height.saturating_sub(self.crop_height);
        let x_offset = (working_width as i64 - self.crop_width as i64).div_euclid(2);
        let y_offsets = pan_offsets(max_y_offset, self.min_frames);

        debug!(
            "Pan over {}x{} (zoom {:.3}): x={}, max_y={}, {} frames",
            working_width, working_height, zoom, x_offset, max_y_offset, y_offsets.len()
        );

        let mut sequence = FrameSequence::from_offsets(
            working,
            (self.crop_width, self.crop_height),
            x_offset,
            y_offsets,
        );
        sequence.zoom = zoom;
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;
    use crate::imaging::BackgroundCompositor;
    use image::{DynamicImage, Rgb};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn generator(min_frames: u32) -> PanFrameGenerator {
        PanFrameGenerator::new(&PanConfig {
            crop_width: 36,
            crop_height: 64,
            min_frames,
            zoom_min: 1.2,
            zoom_max: 1.5,
        })
    }

    /// 90x160 canvas with a vertical gradient so crops at different heights differ
    fn canvas() -> CompositedImage {
        let gradient = RgbImage::from_fn(90, 160, |_, y| Rgb([(y * 255 / 159) as u8, 64, 128]));
        BackgroundCompositor::new(&CanvasConfig {
            height: 160,
            blur_sigma: 0.0,
            ..CanvasConfig::default()
        })
        .composite("gradient", &DynamicImage::ImageRgb8(gradient))
        .unwrap()
    }

    #[test]
    fn test_direction_alternates_by_index() {
        let directions: Vec<PanDirection> = (0..6).map(PanDirection::for_index).collect();
        for pair in directions.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(directions[0], PanDirection::TopToBottom);
        assert_eq!(directions[1], PanDirection::BottomToTop);
    }

    #[test]
    fn test_offsets_land_on_max() {
        let offsets = pan_offsets(1000, 120);
        assert_eq!(offsets.len(), 121);
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], 8);
        assert_eq!(offsets[119], 119 * 8);
        assert_eq!(*offsets.last().unwrap(), 1000);
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_offsets_exact_division() {
        let offsets = pan_offsets(240, 120);
        assert_eq!(offsets.len(), 121);
        assert!(offsets.windows(2).all(|w| w[1] - w[0] == 2));
    }

    #[test]
    fn test_offsets_degenerate() {
        assert_eq!(pan_offsets(0, 120), vec![0]);

        // less room than steps: one pixel per frame, then hold
        let offsets = pan_offsets(5, 8);
        assert_eq!(offsets, vec![0, 1, 2, 3, 4, 5, 5, 5, 5]);
    }

    #[test]
    fn test_generate_frame_count_and_bounds() {
        let sequence = generator(8).generate_with_zoom(&canvas(), 1.5).unwrap();

        // 36x64 base, zoomed to 54x96, so the pan covers 32 rows
        assert_eq!(sequence.canvas_size(), (54, 96));
        assert_eq!(sequence.x_offset(), 9);
        assert!(sequence.len() >= 8 && sequence.len() <= 9);
        assert_eq!(sequence.y_offsets()[0], 0);
        assert_eq!(*sequence.y_offsets().last().unwrap(), 32);

        for frame in sequence.frames() {
            assert_eq!(frame.dimensions(), (36, 64));
        }
    }

    #[test]
    fn test_generate_pans_downwards() {
        let sequence = generator(8).generate_with_zoom(&canvas(), 1.5).unwrap();
        let first = sequence.frame(0).unwrap();
        let last = sequence.frame(sequence.len() - 1).unwrap();

        // gradient brightens towards the bottom
        assert!(last.get_pixel(18, 0)[0] > first.get_pixel(18, 0)[0]);
    }

    #[test]
    fn test_no_pan_room_yields_single_frame() {
        let sequence = generator(120).generate_with_zoom(&canvas(), 1.0).unwrap();
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence.y_offsets(), &[0]);
        assert_eq!(sequence.frame(0).unwrap().dimensions(), (36, 64));
    }

    #[test]
    fn test_seeded_zoom_is_reproducible() {
        let generator = generator(8);
        let image = canvas();

        let a = generator.generate(&image, &mut SmallRng::seed_from_u64(7)).unwrap();
        let b = generator.generate(&image, &mut SmallRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.zoom(), b.zoom());
        assert_eq!(a.y_offsets(), b.y_offsets());
        assert!((1.2..=1.5).contains(&a.zoom()));
    }

    #[test]
    fn test_crop_past_canvas_is_padded() {
        let canvas = RgbImage::from_pixel(10, 10, Rgb([200, 0, 0]));
        let sequence = FrameSequence::from_offsets(canvas, (12, 12), -1, vec![0]);

        let frame = sequence.frame(0).unwrap();
        assert_eq!(frame.dimensions(), (12, 12));
        assert_eq!(frame.get_pixel(0, 0), [0, 0, 0]);
        assert_eq!(frame.get_pixel(5, 5), [200, 0, 0]);
        assert_eq!(frame.get_pixel(11, 11), [0, 0, 0]);
    }
}
