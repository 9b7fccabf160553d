//! Compact JWS splitting, shared by the `android-safetynet` attestation
//! format and MDS table-of-contents verification — both consume a
//! `header.payload.signature` JWT/JWS and need the exact signed substring
//! plus base64url-decoded header/payload.

use crate::error::{Result, WebauthnError};

/// The three segments of a compact JWS, plus the exact ASCII substring
/// that was signed (`header.payload`, before decoding either part).
#[derive(Debug, Clone)]
pub struct CompactJws {
    pub header_b64: String,
    pub payload_b64: String,
    pub signature_b64: String,
    pub signed_input: String,
}

/// Splits a compact JWS (`aaa.bbb.ccc`) into its segments. Rejects any
/// input that is not exactly three dot-separated segments.
pub fn split(jws: &str) -> Result<CompactJws> {
    let parts: Vec<&str> = jws.split('.').collect();
    let [header, payload, signature] = parts[..] else {
        return Err(WebauthnError::parse_error(format!(
            "JWS must have exactly three dot-separated segments, got {}",
            parts.len()
        )));
    };

    let signed_input = format!("{header}.{payload}");
    Ok(CompactJws {
        header_b64: header.to_string(),
        payload_b64: payload.to_string(),
        signature_b64: signature.to_string(),
        signed_input,
    })
}

impl CompactJws {
    pub fn header_bytes(&self) -> Result<Vec<u8>> {
        crate::b64::decode(&self.header_b64)
    }

    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        crate::b64::decode(&self.payload_b64)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        crate::b64::decode(&self.signature_b64)
    }
}
