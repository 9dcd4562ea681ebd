//! # Image Preparation Module
//!
//! This module bounds the size of captured photos before they are sent to a
//! vision model. Wide images are scaled down proportionally, transparency is
//! flattened onto an opaque white background, and the result is re-encoded as
//! JPEG at the configured quality.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::{debug, info};

use crate::extraction::ExtractionRequest;
use crate::scan_config::ImagePrepConfig;
use crate::scan_errors::ScanError;

/// Media type of every prepared image
pub const PREPARED_MIME_TYPE: &str = "image/jpeg";

/// A re-encoded image ready for transmission
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn into_request(self) -> ExtractionRequest {
        ExtractionRequest::new(self.bytes, self.mime_type)
    }
}

/// Output dimensions for an image under a maximum width.
///
/// Never upscales; height follows the aspect ratio, rounded, at least 1.
///
/// # Examples
///
/// ```
/// use repair_scan::image_prep::target_dimensions;
///
/// assert_eq!(target_dimensions(2000, 1500, 1000), (1000, 750));
/// assert_eq!(target_dimensions(800, 600, 1000), (800, 600));
/// ```
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (f64::from(height) * f64::from(max_width) / f64::from(width)).round() as u32;
    (max_width, scaled.max(1))
}

/// Map a quality fraction to the JPEG encoder's 1..=100 scale
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Decode, downscale, flatten and re-encode a captured photo.
///
/// # Errors
///
/// Returns [`ScanError::ImageDecode`] when the payload is empty, above the
/// configured input ceiling, or not a decodable raster image. Trying another
/// provider cannot fix any of these.
pub fn prepare_image(raw: &[u8], config: &ImagePrepConfig) -> Result<PreparedImage, ScanError> {
    if raw.is_empty() {
        return Err(ScanError::ImageDecode("image payload is empty".to_string()));
    }
    if raw.len() > config.max_input_bytes {
        return Err(ScanError::ImageDecode(format!(
            "image payload too large: {} bytes (maximum allowed: {} bytes)",
            raw.len(),
            config.max_input_bytes
        )));
    }

    match image::guess_format(raw) {
        Ok(format) => debug!("Detected {format:?} source image ({} bytes)", raw.len()),
        Err(_) => debug!("Could not guess source image format, attempting decode anyway"),
    }

    let decoded = image::load_from_memory(raw)
        .map_err(|e| ScanError::ImageDecode(format!("cannot decode image: {}", e)))?;

    let (width, height) = decoded.dimensions();
    let (new_width, new_height) = target_dimensions(width, height, config.max_width);

    let resized = if (new_width, new_height) != (width, height) {
        decoded.resize_exact(
            new_width,
            new_height,
            image::imageops::FilterType::CatmullRom,
        )
    } else {
        decoded
    };

    let flattened = flatten_on_white(&resized);

    let mut bytes = Vec::new();
    {
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut bytes,
            jpeg_quality(config.quality),
        );
        encoder
            .encode_image(&flattened)
            .map_err(|e| ScanError::ImageDecode(format!("cannot re-encode image: {}", e)))?;
    }

    info!(
        source_width = width,
        source_height = height,
        width = new_width,
        height = new_height,
        source_bytes = raw.len(),
        encoded_bytes = bytes.len(),
        "Prepared image for extraction"
    );

    Ok(PreparedImage {
        bytes,
        mime_type: PREPARED_MIME_TYPE.to_string(),
        width: new_width,
        height: new_height,
    })
}

/// Composite every pixel over opaque white
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u16::from(a);
        let blend = |c: u8| -> u8 {
            ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode_png(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_target_dimensions_preserves_aspect() {
        assert_eq!(target_dimensions(3000, 2000, 1200), (1200, 800));
        assert_eq!(target_dimensions(1001, 3, 1000), (1000, 3));
        assert_eq!(target_dimensions(5000, 1, 1000), (1000, 1));
        assert_eq!(target_dimensions(1000, 700, 1000), (1000, 700));
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.7), 70);
        assert_eq!(jpeg_quality(0.85), 85);
        assert_eq!(jpeg_quality(0.001), 1);
        assert_eq!(jpeg_quality(1.0), 100);
    }

    #[test]
    fn test_prepare_downscales_wide_image() {
        let raw = encode_png(DynamicImage::ImageRgb8(RgbImage::new(1600, 900)));
        let prepared = prepare_image(&raw, &ImagePrepConfig::photo()).unwrap();

        assert_eq!((prepared.width, prepared.height), (1000, 563));
        assert_eq!(prepared.mime_type, "image/jpeg");
        assert_eq!(
            image::guess_format(&prepared.bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_prepare_keeps_small_image_size() {
        let raw = encode_png(DynamicImage::ImageRgb8(RgbImage::new(320, 240)));
        let prepared = prepare_image(&raw, &ImagePrepConfig::document()).unwrap();
        assert_eq!((prepared.width, prepared.height), (320, 240));
    }

    #[test]
    fn test_transparent_pixels_become_white() {
        let transparent = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let flattened = flatten_on_white(&DynamicImage::ImageRgba8(transparent));
        assert_eq!(flattened.get_pixel(0, 0), &Rgb([255, 255, 255]));

        let opaque = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let flattened = flatten_on_white(&DynamicImage::ImageRgba8(opaque));
        assert_eq!(flattened.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_undecodable_input() {
        let result = prepare_image(b"definitely not an image", &ImagePrepConfig::photo());
        assert!(matches!(result, Err(ScanError::ImageDecode(_))));

        let result = prepare_image(&[], &ImagePrepConfig::photo());
        assert!(matches!(result, Err(ScanError::ImageDecode(_))));
    }

    #[test]
    fn test_input_ceiling() {
        let raw = encode_png(DynamicImage::ImageRgb8(RgbImage::new(64, 64)));
        let config = ImagePrepConfig {
            max_input_bytes: 10,
            ..ImagePrepConfig::photo()
        };
        let result = prepare_image(&raw, &config);
        assert!(matches!(result, Err(ScanError::ImageDecode(msg)) if msg.contains("too large")));
    }
}
