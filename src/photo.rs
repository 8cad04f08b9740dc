//! Uploaded headshot handling.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose;
use image::{ImageFormat, ImageReader};
use tracing::debug;

use crate::constants::MAX_PHOTO_EDGE;

/// Why an upload couldn't be used.
#[derive(Debug)]
pub enum PhotoError {
    /// Too few bytes to be an image.
    TooShort,
    /// Not a format we accept.
    UnsupportedFormat,
    /// The bytes didn't decode.
    Decode(String),
    /// Re-encoding to JPEG failed.
    Encode(String),
}

impl std::fmt::Display for PhotoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(f, "Photo is empty or truncated"),
            Self::UnsupportedFormat => write!(f, "Photo must be a JPEG or PNG"),
            Self::Decode(err) => write!(f, "Photo could not be decoded: {err}"),
            Self::Encode(err) => write!(f, "Photo could not be re-encoded: {err}"),
        }
    }
}

impl std::error::Error for PhotoError {}

/// Returns JPEG bytes no larger than [`MAX_PHOTO_EDGE`] on either side.
///
/// Small JPEGs pass through untouched; PNGs and oversized images are decoded,
/// shrunk and re-encoded.
pub fn normalize_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, PhotoError> {
    if bytes.len() < 4 {
        return Err(PhotoError::TooShort);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| PhotoError::Decode(err.to_string()))?;
    let format = reader.format();
    if !matches!(format, Some(ImageFormat::Jpeg | ImageFormat::Png)) {
        debug!("Rejected photo format {:?}", format);
        return Err(PhotoError::UnsupportedFormat);
    }
    let image = reader
        .decode()
        .map_err(|err| PhotoError::Decode(err.to_string()))?;

    let oversized = image.width() > MAX_PHOTO_EDGE || image.height() > MAX_PHOTO_EDGE;
    if format == Some(ImageFormat::Jpeg) && !oversized {
        return Ok(bytes.to_vec());
    }

    let image = if oversized {
        image.thumbnail(MAX_PHOTO_EDGE, MAX_PHOTO_EDGE)
    } else {
        image
    };
    // JPEG has no alpha channel.
    let rgb = image.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, 90);
    encoder
        .encode_image(&rgb)
        .map_err(|err| PhotoError::Encode(err.to_string()))?;
    Ok(output)
}

/// Wraps JPEG bytes in a `data:` URI.
pub fn jpeg_data_uri(jpeg: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(jpeg)
    )
}

/// A headshot that has already been through [`normalize_to_jpeg`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JpegPhoto(Vec<u8>);

impl JpegPhoto {
    /// Validates and normalizes an upload.
    pub fn from_upload(bytes: &[u8]) -> Result<Self, PhotoError> {
        normalize_to_jpeg(bytes).map(Self)
    }

    /// The JPEG bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// The photo as a `data:` URI.
    pub fn data_uri(&self) -> String {
        jpeg_data_uri(&self.0)
    }
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 120, 40, 128]));
    let mut bytes = Vec::new();
    #[allow(clippy::unwrap_used)]
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
