//! The `fido-u2f` attestation format (CTAP1/U2F-compatible authenticators).
//!
//! The signed-data construction here — `0x00 || rpIdHash || clientDataHash
//! || credentialId || publicKey_U2F` — concatenates the fixed fields and
//! verifies over the result, following the U2F raw-signature wire format
//! documented in `other_examples/.../webauthn-response-attestation-fidou2f.rs`.

use ciborium::Value;

use super::{ParseFn, ValidateFn};
use crate::cbor;
use crate::crypto;
use crate::error::{Result, WebauthnError};

const EXPECTED_ALG: i64 = -7; // ES256

pub fn parse_fn() -> ParseFn {
    Box::new(|att_stmt| {
        let x5c = cbor::find_array(att_stmt, "x5c")
            .ok_or_else(|| WebauthnError::arg_missing("attStmt.x5c"))?;
        if x5c.len() != 1 {
            return Err(WebauthnError::arg_invalid(
                "fido-u2f attStmt.x5c must contain exactly one certificate",
            ));
        }
        let cert = x5c[0]
            .as_bytes()
            .ok_or_else(|| WebauthnError::parse_error("fido-u2f attStmt.x5c[0] is not a byte string"))?
            .clone();
        let sig = cbor::require_bytes(att_stmt, "sig")?.to_vec();

        Ok(Value::Map(vec![
            (Value::Text("cert".into()), Value::Bytes(cert)),
            (Value::Text("sig".into()), Value::Bytes(sig)),
        ]))
    })
}

pub fn validate_fn() -> ValidateFn {
    Box::new(|ctx, parsed| {
        let map = parsed
            .as_map()
            .ok_or_else(|| WebauthnError::parse_error("fido-u2f parsed attStmt is not a Map"))?;
        let cert_der = cbor::require_bytes(map, "cert")?;
        let sig = cbor::require_bytes(map, "sig")?;

        let cred = ctx.authnr_data.attested_credential_data.as_ref().ok_or_else(|| {
            WebauthnError::protocol_error("fido-u2f requires attested credential data")
        })?;

        if cred.credential_public_key.alg != Some(EXPECTED_ALG) {
            return Err(WebauthnError::AlgMismatch(format!(
                "fido-u2f requires alg -7 (ES256), got: {:?}",
                cred.credential_public_key.alg
            )));
        }

        let public_key_u2f = cred.credential_public_key.to_uncompressed_point()?;

        let mut message = Vec::with_capacity(1 + 32 + 32 + cred.credential_id.len() + public_key_u2f.len());
        message.push(0x00);
        message.extend_from_slice(&ctx.authnr_data.rp_id_hash);
        message.extend_from_slice(&ctx.client_data_hash);
        message.extend_from_slice(&cred.credential_id);
        message.extend_from_slice(&public_key_u2f);

        let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
            .map_err(|e| WebauthnError::TrustPath(format!("invalid fido-u2f attestation cert: {e}")))?;

        crypto::verify_with_x509_public_key(&cert, &message, sig)?;

        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation;

    #[test]
    fn rejects_missing_x5c() {
        attestation::delete_all();
        attestation::add("fido-u2f", parse_fn(), validate_fn()).unwrap();
        let err = attestation::parse("fido-u2f", &[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ArgMissing);
    }

    #[test]
    fn rejects_multiple_certs_in_x5c() {
        attestation::delete_all();
        attestation::add("fido-u2f", parse_fn(), validate_fn()).unwrap();
        let att_stmt = vec![(
            Value::Text("x5c".into()),
            Value::Array(vec![Value::Bytes(vec![1]), Value::Bytes(vec![2])]),
        )];
        let err = attestation::parse("fido-u2f", &att_stmt).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ArgInvalid);
    }
}
