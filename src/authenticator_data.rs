//! Binary `authenticatorData` parsing.
//!
//! A fixed-header-then-variable-tail layout: 32-byte rpIdHash, 1-byte
//! flags, 4-byte BE counter, followed by the attested-credential-data and
//! extensions regions when present, using [`crate::cbor::decode_prefix`]
//! to find where the embedded COSE key ends without a declared length.

use crate::cbor;
use crate::cose::CoseKey;
use crate::error::{Result, WebauthnError};

const RP_ID_HASH_LEN: usize = 32;
const FLAGS_LEN: usize = 1;
const COUNTER_LEN: usize = 4;
const AAGUID_LEN: usize = 16;
const CRED_ID_LEN_LEN: usize = 2;
const FIXED_HEADER_LEN: usize = RP_ID_HASH_LEN + FLAGS_LEN + COUNTER_LEN;

const FLAG_UP: u8 = 0b0000_0001;
const FLAG_UV: u8 = 0b0000_0100;
const FLAG_AT: u8 = 0b0100_0000;
const FLAG_ED: u8 = 0b1000_0000;

#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub credential_public_key: CoseKey,
}

/// A parsed `authenticatorData` structure.
#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub raw: Vec<u8>,
    pub rp_id_hash: [u8; 32],
    flags: u8,
    pub counter: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    pub extensions: Option<serde_json::Value>,
}

impl AuthenticatorData {
    /// Parses a raw `authenticatorData` byte string.
    pub fn parse(raw: impl Into<Vec<u8>>) -> Result<Self> {
        let raw = raw.into();

        if raw.len() < FIXED_HEADER_LEN {
            return Err(WebauthnError::parse_error(format!(
                "authenticatorData too short: {} bytes, need at least {FIXED_HEADER_LEN}",
                raw.len()
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&raw[0..RP_ID_HASH_LEN]);

        let flags = raw[RP_ID_HASH_LEN];

        let counter_bytes = &raw[RP_ID_HASH_LEN + FLAGS_LEN..FIXED_HEADER_LEN];
        let counter = u32::from_be_bytes(counter_bytes.try_into().unwrap());

        let mut rest = &raw[FIXED_HEADER_LEN..];

        let attested_credential_data = if flags & FLAG_AT != 0 {
            if rest.len() < AAGUID_LEN + CRED_ID_LEN_LEN {
                return Err(WebauthnError::parse_error(
                    "authenticatorData AT flag set but too short for AAGUID + credIdLen",
                ));
            }
            let mut aaguid = [0u8; 16];
            aaguid.copy_from_slice(&rest[0..AAGUID_LEN]);
            let cred_id_len =
                u16::from_be_bytes(rest[AAGUID_LEN..AAGUID_LEN + CRED_ID_LEN_LEN].try_into().unwrap())
                    as usize;
            rest = &rest[AAGUID_LEN + CRED_ID_LEN_LEN..];

            if rest.len() < cred_id_len {
                return Err(WebauthnError::parse_error(
                    "authenticatorData credentialId shorter than credentialIdLength",
                ));
            }
            let credential_id = rest[..cred_id_len].to_vec();
            rest = &rest[cred_id_len..];

            let (key_value, remainder) = cbor::decode_prefix(rest)?;
            let mut key_bytes = Vec::new();
            ciborium::into_writer(&key_value, &mut key_bytes).map_err(|e| {
                WebauthnError::parse_error(format!("failed to re-encode COSE key: {e}"))
            })?;
            let credential_public_key = CoseKey::from_cbor(&key_bytes)?;
            rest = remainder;

            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                credential_public_key,
            })
        } else {
            None
        };

        let extensions = if flags & FLAG_ED != 0 {
            let (ext_value, remainder) = cbor::decode_prefix(rest)?;
            let json: serde_json::Value = cbor_value_to_json(&ext_value)?;
            rest = remainder;
            Some(json)
        } else {
            None
        };

        if !rest.is_empty() {
            return Err(WebauthnError::parse_error(
                "authenticatorData has trailing bytes after extensions",
            ));
        }

        Ok(AuthenticatorData {
            raw,
            rp_id_hash,
            flags,
            counter,
            attested_credential_data,
            extensions,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    pub fn has_attested_credential_data(&self) -> bool {
        self.flags & FLAG_AT != 0
    }

    pub fn has_extensions(&self) -> bool {
        self.flags & FLAG_ED != 0
    }
}

fn cbor_value_to_json(value: &ciborium::Value) -> Result<serde_json::Value> {
    serde_json::to_value(CborAsSerde(value))
        .map_err(|e| WebauthnError::parse_error(format!("invalid CBOR extensions: {e}")))
}

/// Thin adapter so `ciborium::Value` can be run through `serde_json`'s
/// serializer; `ciborium::Value` already implements `serde::Serialize`.
struct CborAsSerde<'a>(&'a ciborium::Value);

impl serde::Serialize for CborAsSerde<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(flags: u8, counter: u32) -> Vec<u8> {
        let mut v = vec![0u8; 32];
        v.push(flags);
        v.extend_from_slice(&counter.to_be_bytes());
        v
    }

    #[test]
    fn rejects_too_short() {
        let err = AuthenticatorData::parse(vec![0u8; 10]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ParseError);
    }

    #[test]
    fn parses_minimal_no_at_no_ed() {
        let raw = header(FLAG_UP, 7);
        let ad = AuthenticatorData::parse(raw).unwrap();
        assert!(ad.user_present());
        assert!(!ad.user_verified());
        assert!(!ad.has_attested_credential_data());
        assert_eq!(ad.counter, 7);
    }

    #[test]
    fn parses_attested_credential_data() {
        let sk = p256::ecdsa::SigningKey::from_bytes(&[4u8; 32].into()).unwrap();
        let pk = p256::PublicKey::from(sk.verifying_key());
        let point = pk.to_encoded_point(false);
        let cose = coset::CoseKeyBuilder::new_ec2_pub_key(
            coset::iana::EllipticCurve::P_256,
            point.x().unwrap().to_vec(),
            point.y().unwrap().to_vec(),
        )
        .algorithm(coset::iana::Algorithm::ES256)
        .build();
        let key_bytes = {
            use coset::CborSerializable;
            cose.to_vec().unwrap()
        };

        let mut raw = header(FLAG_UP | FLAG_UV | FLAG_AT, 1);
        raw.extend_from_slice(&[0xAA; 16]); // aaguid
        let cred_id = vec![1, 2, 3, 4];
        raw.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
        raw.extend_from_slice(&cred_id);
        raw.extend_from_slice(&key_bytes);

        let ad = AuthenticatorData::parse(raw).unwrap();
        assert!(ad.user_verified());
        let cred = ad.attested_credential_data.unwrap();
        assert_eq!(cred.aaguid, [0xAA; 16]);
        assert_eq!(cred.credential_id, cred_id);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut raw = header(FLAG_UP, 1);
        raw.push(0xFF);
        let err = AuthenticatorData::parse(raw).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ParseError);
    }
}
