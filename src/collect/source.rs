//! Image elements, their resolved sources and content type mapping

use crate::error::{DatasetError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// One result image as found on a results page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageElement {
    pub src: Option<String>,
    pub data_src: Option<String>,
}

impl ImageElement {
    pub fn new(src: Option<String>, data_src: Option<String>) -> Self {
        Self { src, data_src }
    }

    /// Element with only a `src` attribute
    pub fn with_src<S: Into<String>>(src: S) -> Self {
        Self::new(Some(src.into()), None)
    }

    /// The `src` value, or `data-src` when `src` is missing or empty
    #[must_use]
    pub fn source_attribute(&self) -> Option<&str> {
        [self.src.as_deref(), self.data_src.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    /// Resolve the element into an inline payload or a remote URL
    ///
    /// # Errors
    /// - Neither `src` nor `data-src` is set
    /// - A `data:` URI is malformed, not base64, or fails to decode
    pub fn resolve(&self) -> Result<ImageSource> {
        let value = self
            .source_attribute()
            .ok_or_else(|| DatasetError::processing("image element has no src or data-src"))?;
        ImageSource::parse(value)
    }
}

/// Where an element's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Payload embedded in a `data:` URI
    Inline { mime: String, data: Vec<u8> },
    /// URL to fetch
    Remote(String),
}

impl ImageSource {
    /// Parse an attribute value; `data:` URIs are decoded eagerly
    ///
    /// # Errors
    /// - A `data:` URI without a `,` separator, without `;base64`, or with invalid base64
    pub fn parse(value: &str) -> Result<Self> {
        let Some(rest) = value.strip_prefix("data:") else {
            return Ok(Self::Remote(value.to_string()));
        };

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| DatasetError::processing("data URI has no payload separator"))?;

        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(DatasetError::processing(format!(
                "data URI for '{}' is not base64 encoded",
                mime
            )));
        }

        let data = STANDARD
            .decode(payload.trim())
            .map_err(|e| DatasetError::processing(format!("invalid base64 payload: {}", e)))?;

        Ok(Self::Inline { mime, data })
    }
}

/// A downloaded image ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Map an image MIME type to a file extension
///
/// Parameters after `;` are ignored and matching is case-insensitive.
/// Returns `None` for anything that is not a known image type.
#[must_use]
pub fn mime_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let extension = match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" | "image/x-png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => return None,
    };
    Some(extension)
}
