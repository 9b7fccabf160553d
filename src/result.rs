//! Result objects: `AttestationResult` and `AssertionResult`.
//!
//! Construction runs the full verify pipeline to completion — parse,
//! decode, audit — as a single function that parses and checks in one pass
//! rather than returning a half-built value for the caller to finish. A
//! `Result` here is single-use: it is built once, by `verify`, and either
//! returned successfully or its failure surfaces the first failing
//! predicate.

use crate::attestation;
use crate::audit::{self, Ceremony, Expectations};
use crate::authenticator_data::AuthenticatorData;
use crate::cbor;
use crate::client_data::ClientData;
use crate::error::Result;

/// Raw input to [`AttestationResult::verify`]: the bytes a browser's
/// `navigator.credentials.create()` call hands back.
#[derive(Debug, Clone)]
pub struct AttestationResponse {
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
}

/// Raw input to [`AssertionResult::verify`]: the bytes a browser's
/// `navigator.credentials.get()` call hands back.
#[derive(Debug, Clone)]
pub struct AssertionResponse {
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

/// A validated registration (attestation) response.
#[derive(Debug)]
pub struct AttestationResult {
    pub raw_id: Vec<u8>,
    pub fmt: String,
    pub client_data: ClientData,
    pub authnr_data: AuthenticatorData,
}

impl AttestationResult {
    /// Runs the full attestation verification pipeline in a fixed order:
    /// client-data parse, attestation-object decode, authenticator-data
    /// parse, common expectation checks (1-7), format-specific signature
    /// verification (check 9), audit completeness.
    pub fn verify(response: AttestationResponse, expectations: &serde_json::Value) -> Result<Self> {
        let expectations = Expectations::from_value(expectations)?;

        let client_data = ClientData::parse(response.client_data_json)?;

        let att_obj = cbor::decode(&response.attestation_object)?;
        let att_obj_map = cbor::as_map(&att_obj)?;
        let fmt = cbor::require_text(att_obj_map, "fmt")?.to_string();
        let auth_data_bytes = cbor::require_bytes(att_obj_map, "authData")?.to_vec();
        let att_stmt = cbor::require_map(att_obj_map, "attStmt")?.clone();

        let authnr_data = AuthenticatorData::parse(auth_data_bytes)?;

        let ctx = audit::run_common_checks(
            Ceremony::Attestation,
            &authnr_data,
            &client_data,
            &expectations,
        )?;

        let parsed_stmt = attestation::parse(&fmt, &att_stmt)?;
        attestation::validate(&fmt, &ctx, &parsed_stmt)?;

        audit::finish(&ctx)?;

        Ok(AttestationResult {
            raw_id: response.raw_id,
            fmt,
            client_data,
            authnr_data,
        })
    }
}

/// A validated authentication (assertion) response.
#[derive(Debug)]
pub struct AssertionResult {
    pub raw_id: Vec<u8>,
    pub client_data: ClientData,
    pub authnr_data: AuthenticatorData,
    pub user_handle: Option<Vec<u8>>,
}

impl AssertionResult {
    /// Runs the full assertion verification pipeline: client-data parse,
    /// authenticator-data parse, common expectation checks (1-7),
    /// assertion-signature verification (check 8), audit completeness.
    pub fn verify(response: AssertionResponse, expectations: &serde_json::Value) -> Result<Self> {
        let expectations = Expectations::from_value(expectations)?;

        let client_data = ClientData::parse(response.client_data_json)?;
        let authnr_data = AuthenticatorData::parse(response.authenticator_data)?;

        let ctx = audit::run_common_checks(
            Ceremony::Assertion,
            &authnr_data,
            &client_data,
            &expectations,
        )?;

        audit::check_user_handle(&expectations, response.user_handle.as_deref())?;

        audit::check_assertion_signature(
            &expectations,
            &authnr_data.raw,
            ctx.client_data_hash,
            &response.signature,
        )?;

        audit::finish(&ctx)?;

        Ok(AssertionResult {
            raw_id: response.raw_id,
            client_data,
            authnr_data,
            user_handle: response.user_handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none_attestation_object(auth_data: &[u8]) -> Vec<u8> {
        let value = ciborium::Value::Map(vec![
            (
                ciborium::Value::Text("fmt".into()),
                ciborium::Value::Text("none".into()),
            ),
            (
                ciborium::Value::Text("authData".into()),
                ciborium::Value::Bytes(auth_data.to_vec()),
            ),
            (
                ciborium::Value::Text("attStmt".into()),
                ciborium::Value::Map(vec![]),
            ),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&value, &mut buf).unwrap();
        buf
    }

    fn minimal_auth_data(rp_id_hash: [u8; 32]) -> Vec<u8> {
        let mut v = rp_id_hash.to_vec();
        v.push(0b0000_0101); // UP | UV
        v.extend_from_slice(&1u32.to_be_bytes());
        v
    }

    #[test]
    fn none_attestation_happy_path() {
        attestation::register_builtins();

        let origin = "https://example.com";
        let rp_id_hash = crate::crypto::sha256(b"example.com");
        let client_data_json = serde_json::json!({
            "type": "webauthn.create",
            "challenge": crate::b64::encode(b"a-real-challenge-value-padded-to-32-bytes!!"),
            "origin": origin,
        })
        .to_string()
        .into_bytes();

        let response = AttestationResponse {
            raw_id: vec![1, 2, 3],
            client_data_json: client_data_json.clone(),
            attestation_object: none_attestation_object(&minimal_auth_data(rp_id_hash)),
        };

        let client_data = ClientData::parse(client_data_json).unwrap();
        let expectations = serde_json::json!({
            "origin": origin,
            "challenge": client_data.challenge,
            "factor": "either",
        });

        let result = AttestationResult::verify(response, &expectations).unwrap();
        assert_eq!(result.fmt, "none");
        assert!(result.authnr_data.user_verified());
    }

    #[test]
    fn rejects_challenge_mismatch() {
        attestation::register_builtins();

        let origin = "https://example.com";
        let rp_id_hash = crate::crypto::sha256(b"example.com");
        let client_data_json = serde_json::json!({
            "type": "webauthn.create",
            "challenge": crate::b64::encode(b"the-actual-challenge-bytes-here"),
            "origin": origin,
        })
        .to_string()
        .into_bytes();

        let response = AttestationResponse {
            raw_id: vec![],
            client_data_json,
            attestation_object: none_attestation_object(&minimal_auth_data(rp_id_hash)),
        };

        let expectations = serde_json::json!({
            "origin": origin,
            "challenge": crate::b64::encode(b"a-different-challenge-value!!!!"),
            "factor": "either",
        });

        let err = AttestationResult::verify(response, &expectations).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ProtocolError);
    }
}
