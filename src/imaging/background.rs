use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage, RgbImage};
use tracing::debug;

use crate::config::CanvasConfig;
use crate::error::{ImageError, Result};

/// Raw bytes of one source image plus the name it arrived under
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new<S: Into<String>>(name: S, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }

    /// Read a source image from disk, naming it after the file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    /// File stem used to name the intermediates derived from this image
    pub fn stem(&self) -> String {
        PathBuf::from(&self.name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Decode the bytes (JPEG or PNG)
    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.bytes).map_err(|e| {
            ImageError::DecodeFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// An opaque canvas at the configured aspect ratio and height
#[derive(Debug, Clone)]
pub struct CompositedImage {
    canvas: RgbImage,
}

impl CompositedImage {
    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.canvas
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.canvas.save(path).map_err(|e| {
            ImageError::SaveFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Fits an image of any aspect ratio onto a blurred copy of itself
///
/// The blurred copy is stretched to fill the whole canvas, the sharp original
/// is scaled to the canvas height and centered on top, so there are never
/// letterbox bars.
#[derive(Debug, Clone)]
pub struct BackgroundCompositor {
    target_height: u32,
    target_width: u32,
    blur_sigma: f32,
}

impl BackgroundCompositor {
    pub fn new(config: &CanvasConfig) -> Self {
        Self {
            target_height: config.height,
            target_width: config.width(),
            blur_sigma: config.blur_sigma,
        }
    }

    /// Canvas size `(width, height)` every composite is produced at
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Decode `source` and composite it
    pub fn composite_source(&self, source: &SourceImage) -> Result<CompositedImage> {
        let image = source.decode()?;
        self.composite(&source.name, &image)
    }

    pub fn composite(&self, name: &str, image: &DynamicImage) -> Result<CompositedImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidDimensions {
                name: name.to_string(),
                width,
                height,
            }
            .into());
        }

        let (target_width, target_height) = self.target_size();
        let source = image.to_rgba8();

        let mut canvas = flatten_onto_black(self.backdrop(&source));

        let foreground_width = ((width as u64 * target_height as u64) / height as u64).max(1) as u32;
        let foreground = imageops::resize(&source, foreground_width, target_height, FilterType::Lanczos3);

        // floor division: a foreground wider than the canvas overhangs both sides equally
        let x_offset = (target_width as i64 - foreground_width as i64).div_euclid(2);
        let y_offset = (target_height as i64 - foreground.height() as i64).div_euclid(2);

        debug!(
            "Compositing '{}' ({}x{}) as {}x{} at ({}, {}) on {}x{}",
            name, width, height, foreground_width, target_height,
            x_offset, y_offset, target_width, target_height
        );

        if image.color().has_alpha() {
            imageops::overlay(&mut canvas, &foreground, x_offset, y_offset);
        } else {
            imageops::replace(&mut canvas, &foreground, x_offset, y_offset);
        }

        Ok(CompositedImage {
            canvas: DynamicImage::ImageRgba8(canvas).to_rgb8(),
        })
    }

    /// Blurred copy of `source` stretched to the canvas size.
    ///
    /// Sources larger than the canvas are shrunk first (never below the
    /// canvas in either axis) and blurred with the sigma scaled to match.
    fn backdrop(&self, source: &RgbaImage) -> RgbaImage {
        let (target_width, target_height) = self.target_size();
        if self.blur_sigma <= 0.0 {
            return imageops::resize(source, target_width, target_height, FilterType::Triangle);
        }

        let (width, height) = source.dimensions();
        let scale = (target_width as f64 / width as f64)
            .max(target_height as f64 / height as f64)
            .min(1.0);

        let blurred = if scale < 1.0 {
            let reduced_width = ((width as f64 * scale).round() as u32).max(1);
            let reduced_height = ((height as f64 * scale).round() as u32).max(1);
            let reduced = imageops::resize(source, reduced_width, reduced_height, FilterType::Triangle);
            imageops::blur(&reduced, (self.blur_sigma as f64 * scale) as f32)
        } else {
            imageops::blur(source, self.blur_sigma)
        };

        imageops::resize(&blurred, target_width, target_height, FilterType::Triangle)
    }
}

/// Composite every pixel over opaque black so the backdrop has no holes
fn flatten_onto_black(mut image: RgbaImage) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        let scale = |channel: u8| ((channel as u16 * a as u16 + 127) / 255) as u8;
        *pixel = Rgba([scale(r), scale(g), scale(b), 255]);
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb};
    use std::io::Cursor;

    fn compositor(height: u32) -> BackgroundCompositor {
        BackgroundCompositor::new(&CanvasConfig {
            height,
            blur_sigma: 2.0,
            ..CanvasConfig::default()
        })
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_output_size_for_mixed_aspects() {
        let compositor = compositor(160);
        for (w, h) in [(400, 300), (90, 160), (50, 400), (1, 1), (333, 77)] {
            let out = compositor.composite("img", &solid(w, h, [10, 20, 30])).unwrap();
            assert_eq!((out.width(), out.height()), (90, 160), "source {}x{}", w, h);
        }
    }

    #[test]
    fn test_default_canvas_is_1125_by_2000() {
        let compositor = BackgroundCompositor::new(&CanvasConfig::default());
        assert_eq!(compositor.target_size(), (1125, 2000));
    }

    #[test]
    fn test_narrow_source_is_centered_over_backdrop() {
        let compositor = BackgroundCompositor::new(&CanvasConfig {
            height: 160,
            blur_sigma: 0.0,
            ..CanvasConfig::default()
        });
        // 1:4 source scales to 40x160, leaving 25px of backdrop on each side.
        // Its green left edge lands at x=25..28 on the canvas, while the
        // stretched backdrop only shows green at x=0..8.
        let mut tall = RgbImage::from_pixel(10, 40, Rgb([255, 0, 0]));
        for y in 0..40 {
            tall.put_pixel(0, y, Rgb([0, 255, 0]));
        }
        let out = compositor.composite("tall", &DynamicImage::ImageRgb8(tall)).unwrap();

        let edge = out.as_image().get_pixel(26, 80).0;
        assert!(edge[1] > edge[0], "foreground edge should be green: {:?}", edge);

        let backdrop = out.as_image().get_pixel(15, 80).0;
        assert!(backdrop[0] > backdrop[1], "backdrop should be red here: {:?}", backdrop);

        let inner = out.as_image().get_pixel(45, 80).0;
        assert!(inner[0] > 200 && inner[1] < 50, "foreground body should be red: {:?}", inner);
    }

    #[test]
    fn test_wide_source_overhangs_symmetrically() {
        let compositor = BackgroundCompositor::new(&CanvasConfig {
            height: 160,
            blur_sigma: 0.0,
            ..CanvasConfig::default()
        });
        let mut wide = RgbImage::from_pixel(400, 100, Rgb([0, 0, 255]));
        // mark the horizontal center column
        for y in 0..100 {
            wide.put_pixel(199, y, Rgb([0, 255, 0]));
            wide.put_pixel(200, y, Rgb([0, 255, 0]));
        }
        let out = compositor.composite("wide", &DynamicImage::ImageRgb8(wide)).unwrap();

        assert_eq!((out.width(), out.height()), (90, 160));
        let center = out.as_image().get_pixel(44, 80).0;
        assert!(center[1] > center[2], "center column should stay in the middle: {:?}", center);
    }

    #[test]
    fn test_transparent_source_shows_backdrop() {
        let compositor = BackgroundCompositor::new(&CanvasConfig {
            height: 160,
            blur_sigma: 0.0,
            ..CanvasConfig::default()
        });
        let faded = DynamicImage::ImageRgba8(RgbaImage::from_pixel(90, 160, Rgba([200, 200, 200, 128])));
        let out = compositor.composite("faded", &faded).unwrap();

        // backdrop flattens to ~100; the half-transparent foreground lands halfway to 200
        let [r, g, b] = out.as_image().get_pixel(45, 80).0;
        assert!((148..=152).contains(&r), "expected ~150, got {}", r);
        assert_eq!((r, g), (g, b));

        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(90, 160, Rgba([200, 200, 200, 0])));
        let out = compositor.composite("clear", &clear).unwrap();
        assert_eq!(out.as_image().get_pixel(45, 80).0, [0, 0, 0]);
    }

    #[test]
    fn test_large_source_backdrop_matches_full_resolution_blur() {
        let compositor = BackgroundCompositor::new(&CanvasConfig {
            height: 160,
            blur_sigma: 10.0,
            ..CanvasConfig::default()
        });
        // 450x800 is five times the canvas; left half black, right half white
        let source = RgbaImage::from_fn(450, 800, |x, _| {
            if x < 225 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
        });

        let reduced = compositor.backdrop(&source);
        let reference = imageops::resize(&imageops::blur(&source, 10.0), 90, 160, FilterType::Triangle);

        assert_eq!(reduced.dimensions(), (90, 160));
        for x in 0..90 {
            let a = reduced.get_pixel(x, 80).0[0] as i32;
            let b = reference.get_pixel(x, 80).0[0] as i32;
            assert!((a - b).abs() <= 16, "column {}: {} vs {}", x, a, b);
        }
    }

    #[test]
    fn test_decode_failure_names_the_image() {
        let compositor = compositor(160);
        let source = SourceImage::new("corrupt.png", vec![0x89, b'P', b'N', b'G', 0, 1, 2]);

        let err = compositor.composite_source(&source).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("corrupt.png"));
    }

    #[test]
    fn test_composite_from_encoded_png() {
        let mut bytes = Vec::new();
        solid(300, 200, [90, 90, 90])
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        let source = SourceImage::new("photos/landscape.png", bytes);
        assert_eq!(source.stem(), "landscape");

        let out = compositor(160).composite_source(&source).unwrap();
        assert_eq!((out.width(), out.height()), (90, 160));
    }
}
