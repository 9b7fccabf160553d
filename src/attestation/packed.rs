//! The `packed` attestation format.
//!
//! Two attestation types share this format tag: Basic/AttCA attestation
//! (leaf certificate present, `x5c`) and Self attestation (the credential
//! signs for itself). Certificate-extension inspection follows the
//! teacher's `verify_certificate_chain`/custom-OID walk in
//! `services/attestation.rs`, generalized to the `id-fido-gen-ce-aaguid`
//! OID this format requires.

use std::str::FromStr;

use ciborium::Value;
use x509_parser::oid_registry::Oid;
use x509_parser::prelude::*;

use super::{ParseFn, ValidateFn};
use crate::cbor;
use crate::crypto;
use crate::error::{Result, WebauthnError};

pub(crate) const AAGUID_EXTENSION_OID: &str = "1.3.6.1.4.1.45724.1.1.4";

pub fn parse_fn() -> ParseFn {
    Box::new(|att_stmt| {
        let alg = cbor::find_int(att_stmt, "alg")
            .ok_or_else(|| WebauthnError::arg_missing("attStmt.alg"))?;
        let alg: i64 = alg
            .try_into()
            .map_err(|_| WebauthnError::parse_error("alg out of range"))?;
        let sig = cbor::require_bytes(att_stmt, "sig")?.to_vec();

        if cbor::find(att_stmt, "ecdaaKeyId").is_some() {
            return Err(WebauthnError::Unsupported(
                "packed attestation with ecdaaKeyId (ECDAA) is not supported".into(),
            ));
        }

        let x5c = cbor::find_array(att_stmt, "x5c").map(|certs| {
            certs
                .iter()
                .filter_map(|v| v.as_bytes().cloned())
                .collect::<Vec<_>>()
        });

        let mut fields = vec![
            (Value::Text("alg".into()), Value::Integer(alg.into())),
            (Value::Text("sig".into()), Value::Bytes(sig)),
        ];
        if let Some(x5c) = x5c {
            fields.push((
                Value::Text("x5c".into()),
                Value::Array(x5c.into_iter().map(Value::Bytes).collect()),
            ));
        }
        Ok(Value::Map(fields))
    })
}

pub fn validate_fn() -> ValidateFn {
    Box::new(|ctx, parsed| {
        let map = parsed
            .as_map()
            .ok_or_else(|| WebauthnError::parse_error("packed parsed attStmt is not a Map"))?;
        let alg: i64 = cbor::find_int(map, "alg")
            .ok_or_else(|| WebauthnError::arg_missing("alg"))?
            .try_into()
            .map_err(|_| WebauthnError::parse_error("alg out of range"))?;
        let sig = cbor::require_bytes(map, "sig")?;

        let mut message = Vec::with_capacity(ctx.authnr_data.raw.len() + 32);
        message.extend_from_slice(&ctx.authnr_data.raw);
        message.extend_from_slice(&ctx.client_data_hash);

        let cred = ctx.authnr_data.attested_credential_data.as_ref().ok_or_else(|| {
            WebauthnError::protocol_error("packed requires attested credential data")
        })?;

        match cbor::find_array(map, "x5c") {
            Some(x5c) => {
                let leaf_der = x5c
                    .first()
                    .and_then(Value::as_bytes)
                    .ok_or_else(|| WebauthnError::arg_missing("x5c[0]"))?;
                let (_, cert) = x509_parser::parse_x509_certificate(leaf_der)
                    .map_err(|e| WebauthnError::TrustPath(format!("invalid packed attestation cert: {e}")))?;

                validate_basic_or_attca_cert(&cert, &cred.aaguid)?;
                crypto::verify_with_x509_public_key(&cert, &message, sig)?;
            }
            None => {
                if Some(alg) != cred.credential_public_key.alg {
                    return Err(WebauthnError::AlgMismatch(format!(
                        "packed self-attestation alg ({alg}) must match credential alg ({:?})",
                        cred.credential_public_key.alg
                    )));
                }
                crypto::verify(&cred.credential_public_key, &message, sig)?;
            }
        }

        Ok(true)
    })
}

fn validate_basic_or_attca_cert(cert: &X509Certificate, aaguid: &[u8; 16]) -> Result<()> {
    if cert.version() != X509Version::V3 {
        return Err(WebauthnError::TrustPath(
            "packed attestation cert must be X.509 v3".into(),
        ));
    }

    let ou_matches = cert
        .subject()
        .iter_organizational_unit()
        .any(|ou| ou.as_str().map(|s| s == "Authenticator Attestation").unwrap_or(false));
    if !ou_matches {
        return Err(WebauthnError::TrustPath(
            "packed attestation cert subject OU must be 'Authenticator Attestation'".into(),
        ));
    }

    let aaguid_oid = Oid::from_str(AAGUID_EXTENSION_OID)
        .map_err(|_| WebauthnError::parse_error("invalid AAGUID extension OID"))?;
    let aaguid_ext = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid == aaguid_oid)
        .ok_or_else(|| WebauthnError::TrustPath("packed attestation cert missing AAGUID extension".into()))?;

    if !aaguid_ext.value.ends_with(aaguid) {
        return Err(WebauthnError::TrustPath(
            "packed attestation cert AAGUID extension does not match authData AAGUID".into(),
        ));
    }

    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|bc| bc.value.ca)
        .unwrap_or(false);
    if is_ca {
        return Err(WebauthnError::TrustPath(
            "packed attestation cert must have basicConstraints CA=false".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation;

    #[test]
    fn rejects_ecdaa_key_id() {
        attestation::delete_all();
        attestation::add("packed", parse_fn(), validate_fn()).unwrap();
        let att_stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![1, 2, 3])),
            (Value::Text("ecdaaKeyId".into()), Value::Bytes(vec![9])),
        ];
        let err = attestation::parse("packed", &att_stmt).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);
    }

    #[test]
    fn parses_self_attestation_without_x5c() {
        attestation::delete_all();
        attestation::add("packed", parse_fn(), validate_fn()).unwrap();
        let att_stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![1, 2, 3])),
        ];
        let parsed = attestation::parse("packed", &att_stmt).unwrap();
        let map = parsed.as_map().unwrap();
        assert!(cbor::find(map, "x5c").is_none());
    }
}
