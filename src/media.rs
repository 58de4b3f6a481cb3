//! Image decoding, metadata extraction and box annotation.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::detect::{Detection, PpeClass};
use crate::round2;

const OUTLINE_PX: u32 = 2;
const BAND_PX: u32 = 12;
const JPEG_QUALITY: u8 = 95;

/// Metadata reported alongside every processed image.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub size_kb: f64,
    pub format: String,
}

/// A decoded upload, held as RGB8 for the detector backends.
pub struct LoadedImage {
    rgb: RgbImage,
    format: &'static str,
    byte_len: usize,
}

impl LoadedImage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let format = match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => "JPEG",
            Ok(ImageFormat::Png) => "PNG",
            _ => "Unknown",
        };
        let decoded = image::load_from_memory(bytes).context("decode image")?;
        Ok(Self {
            rgb: decoded.into_rgb8(),
            format,
            byte_len: bytes.len(),
        })
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Raw RGB8 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.rgb.as_raw()
    }

    pub fn metadata(&self, filename: &str) -> ImageMetadata {
        ImageMetadata {
            filename: filename.to_string(),
            width: self.width(),
            height: self.height(),
            size_kb: round2(self.byte_len as f64 / 1024.0),
            format: self.format.to_string(),
        }
    }
}

/// Box colour per class: person green, helmet blue, vest orange.
pub fn class_color(class: PpeClass) -> [u8; 3] {
    match class {
        PpeClass::Person => [0, 255, 0],
        PpeClass::Helmet => [0, 0, 255],
        PpeClass::SafetyVest => [255, 165, 0],
    }
}

fn fill_rect(canvas: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32, color: [u8; 3]) {
    let x2 = x2.min(canvas.width());
    let y2 = y2.min(canvas.height());
    for y in y1..y2 {
        for x in x1..x2 {
            canvas.put_pixel(x, y, image::Rgb(color));
        }
    }
}

fn draw_outline(canvas: &mut RgbImage, detection: &Detection, color: [u8; 3]) {
    let b = &detection.bounding_box;
    let x1 = b.x1.max(0.0) as u32;
    let y1 = b.y1.max(0.0) as u32;
    let x2 = (b.x2.max(0.0) as u32).min(canvas.width());
    let y2 = (b.y2.max(0.0) as u32).min(canvas.height());
    if x1 >= x2 || y1 >= y2 {
        return;
    }

    let t = OUTLINE_PX;
    fill_rect(canvas, x1, y1, x2, (y1 + t).min(y2), color);
    fill_rect(canvas, x1, y2.saturating_sub(t).max(y1), x2, y2, color);
    fill_rect(canvas, x1, y1, (x1 + t).min(x2), y2, color);
    fill_rect(canvas, x2.saturating_sub(t).max(x1), y1, x2, y2, color);

    // Confidence band above the box, width proportional to confidence.
    let band_w = ((x2 - x1) as f32 * detection.confidence) as u32;
    if band_w > 0 && y1 > 0 {
        let band_top = y1.saturating_sub(BAND_PX);
        fill_rect(canvas, x1, band_top, (x1 + band_w).min(x2), y1, color);
    }
}

/// Draw detection boxes onto a copy of the image and encode it as JPEG.
pub fn annotate(image: &LoadedImage, detections: &[Detection]) -> Result<Vec<u8>> {
    let mut canvas = image.rgb.clone();
    for detection in detections {
        draw_outline(&mut canvas, detection, class_color(detection.class()));
    }

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&canvas)
        .context("encode annotated jpeg")?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([40, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_and_reports_metadata() {
        let bytes = png_bytes(64, 48);
        let image = LoadedImage::from_bytes(&bytes).unwrap();
        let meta = image.metadata("site.png");

        assert_eq!(meta.filename, "site.png");
        assert_eq!(meta.width, 64);
        assert_eq!(meta.height, 48);
        assert_eq!(meta.format, "PNG");
        assert_eq!(meta.size_kb, round2(bytes.len() as f64 / 1024.0));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(LoadedImage::from_bytes(b"not an image").is_err());
    }

    #[test]
    fn annotate_paints_the_box_edge() {
        let bytes = png_bytes(64, 64);
        let image = LoadedImage::from_bytes(&bytes).unwrap();
        let detection = Detection::new(
            PpeClass::Person,
            0.9,
            BoundingBox::new(10.0, 10.0, 50.0, 50.0),
        );

        let jpeg = annotate(&image, &[detection]).unwrap();
        let reloaded = image::load_from_memory(&jpeg).unwrap().into_rgb8();
        // Top edge of the box should be green, not background grey.
        let px = reloaded.get_pixel(20, 10);
        assert!(px[1] > 150, "expected green edge, got {:?}", px);
        assert!(px[0] < 120 && px[2] < 120);
    }

    #[test]
    fn annotate_handles_box_outside_frame() {
        let bytes = png_bytes(32, 32);
        let image = LoadedImage::from_bytes(&bytes).unwrap();
        let detection = Detection::new(
            PpeClass::Helmet,
            0.5,
            BoundingBox::new(-10.0, -10.0, 100.0, 100.0),
        );
        assert!(annotate(&image, &[detection]).is_ok());
    }
}
