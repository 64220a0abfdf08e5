//! `data:` URL parsing and encoding.
//!
//! Only the base64 form is produced by surface captures and consumed by
//! the cropper, so that is the only form accepted here.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// MIME type of every crop produced by the screenshot pipeline.
pub const PNG_MIME: &str = "image/png";

// ============================================================================
// DataUrl
// ============================================================================

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Media type, e.g. `image/png`.
    pub mime: String,
    /// Decoded payload.
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Parses a base64 data URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataUrl`] if the scheme, base64 marker or payload
    /// is invalid.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::data_url("missing data: scheme"))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::data_url("missing ',' separator"))?;

        let mime = header
            .strip_suffix(BASE64_MARKER)
            .ok_or_else(|| Error::data_url("only base64 data URLs are supported"))?;

        let bytes = Base64Standard
            .decode(payload.trim())
            .map_err(|e| Error::data_url(format!("Failed to decode base64: {e}")))?;

        Ok(Self {
            mime: if mime.is_empty() {
                "text/plain".to_string()
            } else {
                mime.to_string()
            },
            bytes,
        })
    }

    /// Encodes bytes as a base64 data URL.
    #[must_use]
    pub fn encode(mime: &str, bytes: &[u8]) -> String {
        format!("{SCHEME}{mime}{BASE64_MARKER},{}", Base64Standard.encode(bytes))
    }

    /// Encodes PNG bytes as a data URL.
    #[inline]
    #[must_use]
    pub fn png(bytes: &[u8]) -> String {
        Self::encode(PNG_MIME, bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
