//! `clientDataJSON` parsing.
//!
//! WebAuthn hands back the exact UTF-8 bytes of a JSON document alongside
//! its parsed form, because the audit engine must SHA-256 the raw bytes
//! while also reading individual fields out of them. This mirrors the
//! teacher's `decode_attestation_object` in `services/attestation.rs`,
//! which keeps both the decoded structure and the original bytes around
//! for hashing, generalized to `clientDataJSON` instead of the attestation
//! object.

use serde::Deserialize;

use crate::error::{Result, WebauthnError};

#[derive(Debug, Clone, Deserialize)]
struct RawTokenBinding {
    status: String,
    id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawClientData {
    #[serde(rename = "type")]
    ty: Option<String>,
    challenge: Option<String>,
    origin: Option<String>,
    #[serde(rename = "tokenBinding")]
    token_binding: Option<RawTokenBinding>,
    #[serde(rename = "crossOrigin")]
    cross_origin: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenBindingStatus {
    Present,
    Supported,
    NotSupported,
}

#[derive(Debug, Clone)]
pub struct TokenBinding {
    pub status: TokenBindingStatus,
    pub id: Option<String>,
}

/// The decoded `clientDataJSON`, plus the raw bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct ClientData {
    pub raw: Vec<u8>,
    pub ty: String,
    pub challenge: String,
    pub origin: String,
    pub token_binding: Option<TokenBinding>,
    pub cross_origin: Option<bool>,
}

impl ClientData {
    /// Parses `clientDataJSON` bytes. Fails with `ParseError` on invalid
    /// UTF-8/JSON, `ArgMissing` if `type`/`challenge`/`origin` are absent.
    pub fn parse(raw: impl Into<Vec<u8>>) -> Result<Self> {
        let raw = raw.into();

        let text = std::str::from_utf8(&raw)
            .map_err(|e| WebauthnError::parse_error(format!("clientDataJSON is not UTF-8: {e}")))?;

        let parsed: RawClientData = serde_json::from_str(text)
            .map_err(|e| WebauthnError::parse_error(format!("invalid clientDataJSON: {e}")))?;

        let ty = parsed
            .ty
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WebauthnError::arg_missing("clientData.type"))?;
        let challenge = parsed
            .challenge
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WebauthnError::arg_missing("clientData.challenge"))?;
        let origin = parsed
            .origin
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WebauthnError::arg_missing("clientData.origin"))?;

        let token_binding = parsed
            .token_binding
            .map(|tb| -> Result<TokenBinding> {
                let status = match tb.status.as_str() {
                    "present" => TokenBindingStatus::Present,
                    "supported" => TokenBindingStatus::Supported,
                    "not-supported" => TokenBindingStatus::NotSupported,
                    other => {
                        return Err(WebauthnError::arg_type(
                            "tokenBinding.status to be one of 'present', 'supported', 'not-supported'",
                            other,
                        ))
                    }
                };
                Ok(TokenBinding { status, id: tb.id })
            })
            .transpose()?;

        Ok(ClientData {
            raw,
            ty,
            challenge,
            origin,
            token_binding,
            cross_origin: parsed.cross_origin,
        })
    }

    /// Decodes `challenge` from base64url back into raw bytes, as required
    /// to compare it against the expectation's original challenge.
    pub fn decoded_challenge(&self) -> Result<Vec<u8>> {
        crate::b64::decode(&self.challenge)
    }

    /// SHA-256 over the exact raw bytes, used in signed-data construction
    /// for every attestation/assertion format.
    pub fn hash(&self) -> [u8; 32] {
        crate::crypto::sha256(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(ty: &str) -> Vec<u8> {
        format!(
            r#"{{"type":"{ty}","challenge":"AAAA","origin":"https://example.com","crossOrigin":false}}"#
        )
        .into_bytes()
    }

    #[test]
    fn parses_minimal_client_data() {
        let cd = ClientData::parse(sample_json("webauthn.create")).unwrap();
        assert_eq!(cd.ty, "webauthn.create");
        assert_eq!(cd.origin, "https://example.com");
        assert_eq!(cd.cross_origin, Some(false));
        assert!(cd.token_binding.is_none());
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = ClientData::parse(vec![0xff, 0xfe, 0xfd]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ParseError);
    }

    #[test]
    fn rejects_invalid_json() {
        let err = ClientData::parse(b"not json".to_vec()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ParseError);
    }

    #[test]
    fn rejects_missing_required_field() {
        let bytes = br#"{"type":"webauthn.create","origin":"https://example.com"}"#.to_vec();
        let err = ClientData::parse(bytes).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ArgMissing);
    }

    #[test]
    fn parses_token_binding() {
        let bytes = br#"{"type":"webauthn.get","challenge":"AAAA","origin":"https://example.com","tokenBinding":{"status":"present","id":"abc"}}"#.to_vec();
        let cd = ClientData::parse(bytes).unwrap();
        let tb = cd.token_binding.unwrap();
        assert_eq!(tb.status, TokenBindingStatus::Present);
        assert_eq!(tb.id.as_deref(), Some("abc"));
    }

    #[test]
    fn decodes_challenge() {
        let raw = b"hello";
        let encoded = crate::b64::encode(raw);
        let json = format!(
            r#"{{"type":"webauthn.create","challenge":"{encoded}","origin":"https://example.com"}}"#
        );
        let cd = ClientData::parse(json.into_bytes()).unwrap();
        assert_eq!(cd.decoded_challenge().unwrap(), raw);
    }
}
