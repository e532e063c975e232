//! Captured frames.
//!
//! A `Frame` is an ephemeral RGB snapshot of the live stream at capture size.
//! It is produced fresh for every cycle and dropped once the cycle renders.
//! For transport it is encoded as a JPEG data URL.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, RgbImage};
use std::time::Instant;

/// Prefix of every encoded frame.
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Default JPEG quality used when encoding frames for analysis.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// One captured visual snapshot.
///
/// Not `Clone`: a frame is consumed by a single cycle.
pub struct Frame {
    image: RgbImage,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    /// Build a frame from packed RGB bytes.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!(
                "pixel buffer does not match {}x{} rgb dimensions",
                width,
                height
            )
        })?;
        Ok(Self::new(image))
    }

    /// Decode a JPEG (or any format the image crate was built with).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).context("decode frame")?;
        let (width, height) = decoded.dimensions();
        log::trace!("decoded {}x{} frame ({} bytes)", width, height, bytes.len());
        Ok(Self::new(decoded.into_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Age of the snapshot.
    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }

    /// Scale the frame to the given size. No-op when the size already matches.
    pub fn fit_to(self, width: u32, height: u32) -> Self {
        if self.image.width() == width && self.image.height() == height {
            return self;
        }
        let image = image::imageops::resize(&self.image, width, height, FilterType::Triangle);
        Self {
            image,
            captured_at: self.captured_at,
        }
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&self.image)
            .context("jpeg encode frame")?;
        Ok(buffer)
    }

    /// Encode as `data:image/jpeg;base64,...`.
    pub fn to_data_url(&self, quality: u8) -> Result<String> {
        let jpeg = self.encode_jpeg(quality)?;
        Ok(format!("{}{}", JPEG_DATA_URL_PREFIX, STANDARD.encode(jpeg)))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content stays out of logs.
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Decode the payload of a base64 data URL. Anything before the first comma is
/// treated as the media-type header and ignored.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let (_, payload) = data_url
        .split_once(',')
        .ok_or_else(|| anyhow!("data url missing ',' separator"))?;
    STANDARD
        .decode(payload.trim())
        .context("decode base64 data url payload")
}
