//! The `android-safetynet` attestation format.
//!
//! The statement is a JWS compact serialization (`header.payload.signature`,
//! each base64url) rather than raw CBOR fields, so parsing here splits on
//! `.` and base64url-decodes each part before checking the
//! nonce/ctsProfileMatch/basicIntegrity/timestamp fields in the payload.

use std::time::{SystemTime, UNIX_EPOCH};

use ciborium::Value;
use serde::Deserialize;

use super::{ParseFn, ValidateFn};
use crate::cbor;
use crate::crypto;
use crate::error::{Result, WebauthnError};

/// Acceptable drift between the SafetyNet response's `timestampMs` and wall
/// clock time, defaulting to ±1 minute.
pub const DEFAULT_TIMESTAMP_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    x5c: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SafetyNetPayload {
    nonce: String,
    #[serde(rename = "ctsProfileMatch")]
    cts_profile_match: bool,
    #[serde(rename = "basicIntegrity")]
    basic_integrity: bool,
    #[serde(rename = "timestampMs")]
    timestamp_ms: i64,
}

pub fn parse_fn() -> ParseFn {
    Box::new(|att_stmt| {
        let ver = cbor::require_text(att_stmt, "ver")?.to_string();
        let response = cbor::require_bytes(att_stmt, "response")?.to_vec();

        Ok(Value::Map(vec![
            (Value::Text("ver".into()), Value::Text(ver)),
            (Value::Text("response".into()), Value::Bytes(response)),
        ]))
    })
}

pub fn validate_fn() -> ValidateFn {
    Box::new(|ctx, parsed| {
        let map = parsed
            .as_map()
            .ok_or_else(|| WebauthnError::parse_error("android-safetynet parsed attStmt is not a Map"))?;
        let response = cbor::require_bytes(map, "response")?;
        let jws_text = std::str::from_utf8(response)
            .map_err(|e| WebauthnError::parse_error(format!("safetynet response is not UTF-8: {e}")))?;

        let jws = crate::jws::split(jws_text)?;

        let header_bytes = jws.header_bytes()?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| WebauthnError::parse_error(format!("invalid safetynet JWS header: {e}")))?;
        if header.alg != "RS256" {
            return Err(WebauthnError::AlgMismatch(format!(
                "android-safetynet JWS alg must be RS256, got: {}",
                header.alg
            )));
        }
        let leaf_der = header
            .x5c
            .first()
            .ok_or_else(|| WebauthnError::arg_missing("safetynet JWS header.x5c"))
            .and_then(|b64| {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                STANDARD
                    .decode(b64)
                    .map_err(|e| WebauthnError::parse_error(format!("invalid x5c entry: {e}")))
            })?;

        let (_, cert) = x509_parser::parse_x509_certificate(&leaf_der)
            .map_err(|e| WebauthnError::TrustPath(format!("invalid safetynet leaf cert: {e}")))?;

        let cn_matches = cert
            .subject()
            .iter_common_name()
            .any(|cn| cn.as_str().map(|s| s == "attest.android.com").unwrap_or(false));
        if !cn_matches {
            return Err(WebauthnError::TrustPath(
                "android-safetynet leaf cert CN must be 'attest.android.com'".into(),
            ));
        }

        let sig = jws.signature_bytes()?;
        crypto::verify_with_x509_public_key(&cert, jws.signed_input.as_bytes(), &sig)?;

        let payload_bytes = jws.payload_bytes()?;
        let payload: SafetyNetPayload = serde_json::from_slice(&payload_bytes)
            .map_err(|e| WebauthnError::parse_error(format!("invalid safetynet payload: {e}")))?;

        let mut expected_nonce_input = Vec::with_capacity(ctx.authnr_data.raw.len() + 32);
        expected_nonce_input.extend_from_slice(&ctx.authnr_data.raw);
        expected_nonce_input.extend_from_slice(&ctx.client_data_hash);
        let expected_nonce = {
            use base64::{engine::general_purpose::STANDARD, Engine as _};
            STANDARD.encode(crypto::sha256(&expected_nonce_input))
        };
        if payload.nonce != expected_nonce {
            return Err(WebauthnError::protocol_error(
                "android-safetynet nonce does not match hash(authData || clientDataHash)",
            ));
        }

        if !payload.cts_profile_match {
            return Err(WebauthnError::protocol_error(
                "android-safetynet ctsProfileMatch is false",
            ));
        }
        if !payload.basic_integrity {
            return Err(WebauthnError::protocol_error(
                "android-safetynet basicIntegrity is false",
            ));
        }

        let now_ms = now_millis();
        let drift = (now_ms - payload.timestamp_ms).abs();
        if drift > DEFAULT_TIMESTAMP_WINDOW_MS {
            return Err(WebauthnError::protocol_error(format!(
                "android-safetynet timestampMs outside acceptance window: drift={drift}ms"
            )));
        }

        Ok(true)
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
