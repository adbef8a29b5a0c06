//! Validation of external inputs before they reach the recognition pipeline
//!
//! Uploads are checked for size and a recognizable image signature so that
//! decoding is only attempted on plausible payloads, and free-text parse
//! requests are bounded in length.

use anyhow::{anyhow, Result};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Default maximum upload size (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Maximum length of a plate string accepted by the parse endpoint
pub const MAX_PLATE_TEXT_LENGTH: usize = 64;

// ============================================================================
// Image uploads
// ============================================================================

/// Image container recognized from the leading bytes of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSignature {
    Jpeg,
    Png,
    Bmp,
    Gif,
    Webp,
    Tiff,
}

impl ImageSignature {
    /// Sniff the container format from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', ..] => Some(Self::Png),
            [b'B', b'M', ..] => Some(Self::Bmp),
            [b'G', b'I', b'F', b'8', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
        }
    }
}

/// Validate an uploaded image payload and return its detected signature
pub fn validate_upload(bytes: &[u8], max_bytes: usize) -> Result<ImageSignature> {
    if bytes.is_empty() {
        return Err(anyhow!("uploaded file is empty"));
    }

    if bytes.len() > max_bytes {
        return Err(anyhow!(
            "uploaded file exceeds maximum size of {} bytes (got {})",
            max_bytes,
            bytes.len()
        ));
    }

    ImageSignature::sniff(bytes).ok_or_else(|| {
        tracing::debug!(len = bytes.len(), "rejected upload with unknown signature");
        anyhow!("uploaded file is not a supported image format")
    })
}

// ============================================================================
// Plate text
// ============================================================================

/// Validate a plate string submitted for parsing
pub fn validate_plate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(anyhow!("text cannot be empty"));
    }

    if text.chars().count() > MAX_PLATE_TEXT_LENGTH {
        return Err(anyhow!(
            "text exceeds maximum length of {} characters",
            MAX_PLATE_TEXT_LENGTH
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(
            ImageSignature::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageSignature::Jpeg)
        );
        assert_eq!(
            ImageSignature::sniff(b"\x89PNG\r\n\x1a\n"),
            Some(ImageSignature::Png)
        );
        assert_eq!(
            ImageSignature::sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(ImageSignature::Webp)
        );
        assert_eq!(ImageSignature::sniff(b"hello"), None);
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload(&[], 100).is_err());
        assert!(validate_upload(b"not an image", 100).is_err());
        assert!(validate_upload(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0], 4).is_err());
        assert_eq!(
            validate_upload(&[0xFF, 0xD8, 0xFF, 0xE0], 100).unwrap(),
            ImageSignature::Jpeg
        );
    }

    #[test]
    fn test_validate_plate_text() {
        assert!(validate_plate_text("51A12345").is_ok());
        assert!(validate_plate_text("   ").is_err());
        assert!(validate_plate_text(&"9".repeat(MAX_PLATE_TEXT_LENGTH + 1)).is_err());
    }
}
