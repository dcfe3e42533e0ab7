//! Uploaded image payloads.
//!
//! An [`ImageInput`] is the raw bytes of an uploaded photo plus its declared
//! media type. It travels through the pipeline as a base64 data URI
//! (`data:<mime>;base64,<data>`), which is also what the HTTP API accepts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    media_type: String,
    data: Vec<u8>,
}

impl ImageInput {
    /// Wrap raw bytes. The media type must be an `image/*` type.
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Result<Self, AnalysisError> {
        let media_type = media_type.into().trim().to_ascii_lowercase();
        if !media_type.starts_with("image/") {
            return Err(AnalysisError::InvalidImage(format!(
                "unsupported media type '{}'",
                media_type
            )));
        }
        if data.is_empty() {
            return Err(AnalysisError::InvalidImage("image is empty".to_string()));
        }
        Ok(Self { media_type, data })
    }

    /// Read an image file, detecting its media type from content and,
    /// failing that, from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let data = std::fs::read(path).map_err(|e| {
            AnalysisError::InvalidImage(format!("cannot read {}: {}", path.display(), e))
        })?;

        let media_type = sniff_media_type(&data)
            .or_else(|| media_type_from_extension(path))
            .ok_or_else(|| {
                AnalysisError::InvalidImage(format!("{} is not an image file", path.display()))
            })?;

        Self::new(media_type, data)
    }

    /// Parse a `data:image/...;base64,...` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self, AnalysisError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| AnalysisError::InvalidImage("expected a data URI".to_string()))?;

        let (header, encoded) = rest
            .split_once(',')
            .ok_or_else(|| AnalysisError::InvalidImage("data URI has no payload".to_string()))?;

        let media_type = header.strip_suffix(";base64").ok_or_else(|| {
            AnalysisError::InvalidImage("data URI must be base64 encoded".to_string())
        })?;

        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AnalysisError::InvalidImage(format!("invalid base64 payload: {}", e)))?;

        Self::new(media_type, data)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }
}

/// Detect common image formats from their magic bytes.
fn sniff_media_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

fn media_type_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "avif" => Some("image/avif"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}
