//! Base64 decoding of inline audio payloads

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::Result;

/// Decode a base64 audio payload into raw bytes
///
/// Surrounding whitespace is ignored; anything else outside the standard
/// alphabet is rejected.
///
/// # Errors
///
/// Returns [`crate::Error::Decode`] if the input is not valid base64
pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let bytes = STANDARD.decode(payload.trim())?;
    tracing::trace!(bytes = bytes.len(), "decoded audio payload");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_decode_exact_bytes() {
        let bytes = decode_base64("AAH/fw==").unwrap();
        assert_eq!(bytes, vec![0x00, 0x01, 0xff, 0x7f]);
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_base64("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_trims_whitespace() {
        let bytes = decode_base64("  AAE=\n").unwrap();
        assert_eq!(bytes, vec![0x00, 0x01]);
    }

    #[test]
    fn test_decode_rejects_invalid() {
        let err = decode_base64("not base64!").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
