use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use tracing::debug;

use crate::error::EncodeError;
use super::{ImageFormat, Percentage};

const JPEG_MAX_QUALITY: f64 = 95.0;
const JPEG_MIN_QUALITY: i64 = 5;

/// JPEG quality for a target size percentage, 5 to 95
pub fn jpeg_quality(percentage: Percentage) -> u8 {
    let scaled = (JPEG_MAX_QUALITY * percentage.value() as f64 / 100.0).round() as i64;
    scaled.clamp(JPEG_MIN_QUALITY, JPEG_MAX_QUALITY as i64) as u8
}

/// WebP quality is the percentage itself
pub fn webp_quality(percentage: Percentage) -> u8 {
    (100.0 * percentage.value() as f64 / 100.0).round().clamp(0.0, 100.0) as u8
}

/// Convert pixel data to something the target format can store
pub fn normalize_color(image: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        // no alpha in JPEG
        ImageFormat::Jpeg => match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        ImageFormat::Png | ImageFormat::WebP => {
            if image.color().has_alpha() {
                DynamicImage::ImageRgba8(image.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            }
        }
    }
}

/// Re-encode `source` into `destination`. Blocking; the output only appears
/// once it is completely written.
pub fn encode_image(
    source: &Path,
    destination: &Path,
    format: ImageFormat,
    percentage: Percentage,
) -> Result<(), EncodeError> {
    let decoded = image::open(source)?;
    debug!("Decoded {} as {:?}", source.display(), decoded.color());
    let normalized = normalize_color(decoded, format);

    let dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix(".mediapress-")
        .suffix(".part")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        match format {
            ImageFormat::Jpeg => {
                let quality = jpeg_quality(percentage);
                debug!("Encoding JPEG at quality {}", quality);
                normalized.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?;
            }
            ImageFormat::Png => {
                normalized.write_with_encoder(PngEncoder::new_with_quality(
                    &mut writer,
                    CompressionType::Best,
                    FilterType::Adaptive,
                ))?;
            }
            ImageFormat::WebP => {
                // image only writes lossless WebP
                let quality = webp_quality(percentage);
                debug!("Encoding WebP at quality {}", quality);
                let encoder = webp::Encoder::from_image(&normalized)
                    .map_err(|e| EncodeError::WebP(e.to_string()))?;
                writer.write_all(&encoder.encode(quality as f32))?;
            }
        }
        writer.flush()?;
    }

    staged
        .persist(destination)
        .map_err(|e| EncodeError::Io(e.error))?;
    Ok(())
}
