//! Image media-type sniffing and `data:` URI helpers.
//!
//! Inline images are shipped to the provider as base64 `data:` URIs.
//! The declared media type is taken from the image's magic bytes, never
//! from a file extension, so mislabelled uploads still go out correctly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Media type constants
// ---------------------------------------------------------------------------

/// PNG image.
pub const MEDIA_PNG: &str = "image/png";
/// JPEG image.
pub const MEDIA_JPEG: &str = "image/jpeg";
/// GIF image.
pub const MEDIA_GIF: &str = "image/gif";
/// WEBP image.
pub const MEDIA_WEBP: &str = "image/webp";

/// Media type assumed when the header bytes match nothing we know.
pub const DEFAULT_MEDIA_TYPE: &str = MEDIA_PNG;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF_MAGIC: &[u8] = b"GIF";
const RIFF_MAGIC: &[u8] = b"RIFF";
const WEBP_MAGIC: &[u8] = b"WEBP";

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Detect the media type of an image from its leading bytes.
///
/// Recognizes PNG, JPEG, GIF and WEBP. Anything else (including an
/// empty slice) falls back to [`DEFAULT_MEDIA_TYPE`].
pub fn detect_media_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(PNG_MAGIC) {
        MEDIA_PNG
    } else if bytes.starts_with(JPEG_MAGIC) {
        MEDIA_JPEG
    } else if bytes.starts_with(GIF_MAGIC) {
        MEDIA_GIF
    } else if bytes.starts_with(RIFF_MAGIC) && bytes.get(8..12) == Some(WEBP_MAGIC) {
        MEDIA_WEBP
    } else {
        DEFAULT_MEDIA_TYPE
    }
}

// ---------------------------------------------------------------------------
// Data URIs
// ---------------------------------------------------------------------------

/// Encode raw image bytes as `data:<media_type>;base64,<payload>`.
pub fn encode_data_uri(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{media_type};base64,{}", STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URI into its raw bytes.
///
/// Only the payload after the first comma is used; the declared media
/// type is ignored because callers re-sniff the decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, CoreError> {
    let rest = uri.strip_prefix("data:").ok_or_else(|| CoreError::Malformed {
        what: "data URI",
        reason: "missing 'data:' scheme".to_string(),
    })?;

    let (header, payload) = rest.split_once(',').ok_or_else(|| CoreError::Malformed {
        what: "data URI",
        reason: "missing ',' separator".to_string(),
    })?;

    if !header.ends_with(";base64") {
        return Err(CoreError::Malformed {
            what: "data URI",
            reason: format!("unsupported encoding in header '{header}'"),
        });
    }

    STANDARD
        .decode(payload.trim())
        .map_err(|e| CoreError::Malformed {
            what: "data URI",
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_header_detected() {
        let bytes = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_media_type(&bytes), MEDIA_PNG);
    }

    #[test]
    fn jpeg_header_detected() {
        assert_eq!(detect_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), MEDIA_JPEG);
    }

    #[test]
    fn gif_header_detected() {
        assert_eq!(detect_media_type(b"GIF89a\x01\x00"), MEDIA_GIF);
    }

    #[test]
    fn webp_header_detected() {
        assert_eq!(detect_media_type(b"RIFF\x24\x00\x00\x00WEBPVP8 "), MEDIA_WEBP);
    }

    #[test]
    fn riff_without_webp_tag_falls_back() {
        assert_eq!(detect_media_type(b"RIFF\x24\x00\x00\x00WAVEfmt "), DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn unknown_and_empty_headers_default_to_png() {
        assert_eq!(detect_media_type(b"BM\x00\x00"), MEDIA_PNG);
        assert_eq!(detect_media_type(&[]), MEDIA_PNG);
    }

    #[test]
    fn data_uri_encodes_media_type_and_payload() {
        let uri = encode_data_uri(MEDIA_JPEG, &[0xFF, 0xD8, 0xFF]);
        assert_eq!(uri, "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn data_uri_decodes_payload() {
        let bytes = decode_data_uri("data:image/png;base64,iVBORw==").unwrap();
        assert_eq!(bytes, vec![0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn data_uri_without_base64_marker_is_rejected() {
        let err = decode_data_uri("data:text/plain,hello").unwrap_err();
        assert!(err.to_string().contains("unsupported encoding"));
    }

    #[test]
    fn non_data_uri_is_rejected() {
        assert!(decode_data_uri("https://example.com/a.png").is_err());
    }
}
