//! base64url encoding helpers (unpadded, per WebAuthn's use of
//! `base64url` throughout client data and challenge encoding).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::error::{Result, WebauthnError};

pub fn encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn decode(data: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| WebauthnError::parse_error(format!("invalid base64url: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let raw = b"hello world\x00\x01\xff";
        let encoded = encode(raw);
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
        assert_eq!(decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(decode("not valid base64url!!").is_err());
    }
}
