//! Overlaying the mask on the base raster and encoding the result.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use crate::model::{BaseRaster, Mask};
use crate::ports::PortError;

/// Colour of the overlay drawn outside the boundary.
const OVERLAY_VALUE: u16 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Encoding of the composite image.
pub enum OutputFormat {
    /// Lossy JPEG with the given quality (1-100).
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
    /// Lossless PNG.
    Png,
    /// Lossless TIFF.
    Tiff,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 90 }
    }
}

impl OutputFormat {
    /// File extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// MIME type used when uploading the image.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Tiff => "image/tiff",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg { quality } => write!(formatter, "jpeg (quality {quality})"),
            OutputFormat::Png => write!(formatter, "png"),
            OutputFormat::Tiff => write!(formatter, "tiff"),
        }
    }
}

#[derive(Debug, Clone)]
/// Final encoded image, ready to be saved or published.
pub struct EncodedImage {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Format the bytes are encoded in.
    pub format: OutputFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl EncodedImage {
    /// Write the encoded bytes to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Io`] when the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), PortError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Overlay alpha for an opacity percentage, clamped to 0-100.
#[must_use]
pub fn overlay_alpha(opacity_percent: u8) -> u8 {
    (f64::from(opacity_percent.min(100)) * 255.0 / 100.0).round() as u8
}

/// Dim the pixels of `raster` that `mask` marks as outside.
///
/// Outside pixels are blended with a white overlay of `opacity_percent`; inside
/// pixels are copied unchanged.
///
/// # Errors
///
/// Returns [`PortError::Internal`] when the mask and the raster differ in size.
pub fn blend(
    raster: &BaseRaster,
    mask: &Mask,
    opacity_percent: u8,
) -> Result<RgbImage, PortError> {
    if (mask.width(), mask.height()) != (raster.width(), raster.height()) {
        return Err(PortError::Internal(format!(
            "mask is {}x{} but the raster is {}x{}",
            mask.width(),
            mask.height(),
            raster.width(),
            raster.height()
        )));
    }

    let alpha = u16::from(overlay_alpha(opacity_percent));
    let blended_values: Vec<u8> = (0..=u16::from(u8::MAX))
        .map(|value| ((value * (255 - alpha) + OVERLAY_VALUE * alpha + 127) / 255) as u8)
        .collect();

    let mut output = raster.image.clone();
    for (pixel, &cell) in output.chunks_exact_mut(3).zip(mask.as_raw()) {
        if cell == Mask::OUTSIDE {
            for band in pixel {
                *band = blended_values
                    .get(usize::from(*band))
                    .copied()
                    .unwrap_or(*band);
            }
        }
    }

    Ok(output)
}

/// Blend the mask over the raster and encode the result.
///
/// # Errors
///
/// Returns [`PortError::Encoding`] when the encoder fails and
/// [`PortError::Internal`] when the mask and the raster differ in size.
pub fn composite(
    raster: &BaseRaster,
    mask: &Mask,
    opacity_percent: u8,
    format: OutputFormat,
) -> Result<EncodedImage, PortError> {
    let image = blend(raster, mask, opacity_percent)?;
    let bytes = encode(&image, format)?;

    Ok(EncodedImage {
        bytes,
        format,
        width: image.width(),
        height: image.height(),
    })
}

fn encode(image: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, PortError> {
    let mut cursor = Cursor::new(Vec::new());
    let result = match format {
        OutputFormat::Jpeg { quality } => {
            let encoder = JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100));
            image.write_with_encoder(encoder)
        }
        OutputFormat::Png => image.write_to(&mut cursor, ImageFormat::Png),
        OutputFormat::Tiff => image.write_to(&mut cursor, ImageFormat::Tiff),
    };
    result.map_err(|err| PortError::Encoding(format!("{format}: {err}")))?;
    Ok(cursor.into_inner())
}
