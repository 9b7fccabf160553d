//! COSE_Key (RFC 8152) decoding and conversion to JWK / PEM.
//!
//! Parsing is delegated to `coset`, covering the three key types the
//! attestation/assertion formats use: EC2 (P-256, P-384, P-521), RSA, and
//! OKP (Ed25519).

use coset::{iana, CborSerializable, Label};

use crate::error::{Result, WebauthnError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkpCurve {
    Ed25519,
}

/// The key material extracted from a COSE_Key, independent of its COSE
/// algorithm label.
#[derive(Debug, Clone)]
pub enum CoseKeyMaterial {
    Ec2 {
        curve: EcCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Rsa {
        n: Vec<u8>,
        e: Vec<u8>,
    },
    Okp {
        curve: OkpCurve,
        x: Vec<u8>,
    },
}

/// A decoded COSE_Key: algorithm label plus key material.
#[derive(Debug, Clone)]
pub struct CoseKey {
    pub alg: Option<i64>,
    pub material: CoseKeyMaterial,
}

fn label_int(label: &Label) -> Option<i64> {
    match label {
        Label::Int(i) => Some(*i),
        Label::Text(_) => None,
    }
}

impl CoseKey {
    /// Parses a COSE_Key from its CBOR encoding.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let key = coset::CoseKey::from_slice(bytes)
            .map_err(|e| WebauthnError::parse_error(format!("invalid COSE key: {e:?}")))?;

        // coset's `Algorithm` type only names a handful of values as enum
        // variants; re-derive the signed COSE algorithm identifier so
        // callers can compare against -7, -257, -8, etc. directly.
        let alg = cose_alg_as_i64(&key);

        let param = |wanted: i64| -> Option<&ciborium::Value> {
            key.params
                .iter()
                .find(|(l, _)| label_int(l) == Some(wanted))
                .map(|(_, v)| v)
        };

        match key.kty {
            coset::KeyType::Assigned(iana::KeyType::EC2) => {
                let crv = param(-1)
                    .and_then(|v| v.as_integer())
                    .ok_or_else(|| WebauthnError::parse_error("COSE EC2 key missing crv"))?;
                let crv: i64 = crv
                    .try_into()
                    .map_err(|_| WebauthnError::parse_error("invalid COSE crv value"))?;
                let curve = match crv {
                    1 => EcCurve::P256,
                    2 => EcCurve::P384,
                    3 => EcCurve::P521,
                    other => {
                        return Err(WebauthnError::Unsupported(format!(
                            "unsupported EC2 curve: {other}"
                        )))
                    }
                };
                let x = param(-2)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| WebauthnError::parse_error("COSE EC2 key missing x"))?
                    .clone();
                let y = param(-3)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| WebauthnError::parse_error("COSE EC2 key missing y"))?
                    .clone();
                Ok(CoseKey {
                    alg,
                    material: CoseKeyMaterial::Ec2 { curve, x, y },
                })
            }
            coset::KeyType::Assigned(iana::KeyType::RSA) => {
                let n = param(-1)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| WebauthnError::parse_error("COSE RSA key missing n"))?
                    .clone();
                let e = param(-2)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| WebauthnError::parse_error("COSE RSA key missing e"))?
                    .clone();
                Ok(CoseKey {
                    alg,
                    material: CoseKeyMaterial::Rsa { n, e },
                })
            }
            coset::KeyType::Assigned(iana::KeyType::OKP) => {
                let crv = param(-1)
                    .and_then(|v| v.as_integer())
                    .ok_or_else(|| WebauthnError::parse_error("COSE OKP key missing crv"))?;
                let crv: i64 = crv
                    .try_into()
                    .map_err(|_| WebauthnError::parse_error("invalid COSE crv value"))?;
                if crv != 6 {
                    return Err(WebauthnError::Unsupported(format!(
                        "unsupported OKP curve: {crv}"
                    )));
                }
                let x = param(-2)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| WebauthnError::parse_error("COSE OKP key missing x"))?
                    .clone();
                Ok(CoseKey {
                    alg,
                    material: CoseKeyMaterial::Okp {
                        curve: OkpCurve::Ed25519,
                        x,
                    },
                })
            }
            other => Err(WebauthnError::Unsupported(format!(
                "unsupported COSE key type: {other:?}"
            ))),
        }
    }

    /// Returns the uncompressed SEC1 EC point (`0x04 || x || y`), required
    /// by the `fido-u2f` format's `publicKey_U2F` construction. Only valid
    /// for EC2 keys.
    pub fn to_uncompressed_point(&self) -> Result<Vec<u8>> {
        match &self.material {
            CoseKeyMaterial::Ec2 { x, y, .. } => {
                let mut out = Vec::with_capacity(1 + x.len() + y.len());
                out.push(0x04);
                out.extend_from_slice(x);
                out.extend_from_slice(y);
                Ok(out)
            }
            _ => Err(WebauthnError::ArgType(
                "expected EC2 COSE key for uncompressed point conversion".into(),
            )),
        }
    }

    /// Converts to a JSON Web Key (RFC 7517) representation.
    pub fn to_jwk(&self) -> serde_json::Value {
        match &self.material {
            CoseKeyMaterial::Ec2 { curve, x, y } => {
                let crv = match curve {
                    EcCurve::P256 => "P-256",
                    EcCurve::P384 => "P-384",
                    EcCurve::P521 => "P-521",
                };
                serde_json::json!({
                    "kty": "EC",
                    "crv": crv,
                    "x": crate::b64::encode(x),
                    "y": crate::b64::encode(y),
                })
            }
            CoseKeyMaterial::Rsa { n, e } => serde_json::json!({
                "kty": "RSA",
                "n": crate::b64::encode(n),
                "e": crate::b64::encode(e),
            }),
            CoseKeyMaterial::Okp { x, .. } => serde_json::json!({
                "kty": "OKP",
                "crv": "Ed25519",
                "x": crate::b64::encode(x),
            }),
        }
    }

    /// Converts to a PEM-encoded SubjectPublicKeyInfo, usable as
    /// `expectations.publicKey` for assertion verification.
    pub fn to_pem(&self) -> Result<String> {
        use pkcs8::EncodePublicKey;
        use pkcs8::LineEnding;

        match &self.material {
            CoseKeyMaterial::Ec2 { curve, .. } => {
                let point = self.to_uncompressed_point()?;
                match curve {
                    EcCurve::P256 => {
                        let pk = p256::PublicKey::from_sec1_bytes(&point).map_err(|e| {
                            WebauthnError::parse_error(format!("invalid P-256 point: {e}"))
                        })?;
                        pk.to_public_key_pem(LineEnding::LF)
                            .map_err(|e| WebauthnError::parse_error(e.to_string()))
                    }
                    EcCurve::P384 => {
                        let pk = p384::PublicKey::from_sec1_bytes(&point).map_err(|e| {
                            WebauthnError::parse_error(format!("invalid P-384 point: {e}"))
                        })?;
                        pk.to_public_key_pem(LineEnding::LF)
                            .map_err(|e| WebauthnError::parse_error(e.to_string()))
                    }
                    EcCurve::P521 => Err(WebauthnError::Unsupported(
                        "P-521 PEM export is not supported".into(),
                    )),
                }
            }
            CoseKeyMaterial::Rsa { n, e } => {
                let n = rsa::BigUint::from_bytes_be(n);
                let e = rsa::BigUint::from_bytes_be(e);
                let pk = rsa::RsaPublicKey::new(n, e)
                    .map_err(|err| WebauthnError::parse_error(format!("invalid RSA key: {err}")))?;
                pk.to_public_key_pem(LineEnding::LF)
                    .map_err(|err| WebauthnError::parse_error(err.to_string()))
            }
            CoseKeyMaterial::Okp { x, .. } => {
                let bytes: [u8; 32] = x
                    .as_slice()
                    .try_into()
                    .map_err(|_| WebauthnError::parse_error("invalid Ed25519 key length"))?;
                let vk = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| WebauthnError::parse_error(format!("invalid Ed25519 key: {e}")))?;
                vk.to_public_key_pem(LineEnding::LF)
                    .map_err(|e| WebauthnError::parse_error(e.to_string()))
            }
        }
    }
}

/// `coset`'s `Algorithm` type does not expose the raw signed integer label
/// publicly for assigned values outside the small set it names as an enum
/// variant, so we re-derive it from the IANA table for the values this
/// crate cares about.
fn cose_alg_as_i64(key: &coset::CoseKey) -> Option<i64> {
    let alg = key.alg.as_ref()?;
    match alg {
        coset::Algorithm::Assigned(iana::Algorithm::ES256) => Some(-7),
        coset::Algorithm::Assigned(iana::Algorithm::ES384) => Some(-35),
        coset::Algorithm::Assigned(iana::Algorithm::ES512) => Some(-36),
        coset::Algorithm::Assigned(iana::Algorithm::RS256) => Some(-257),
        coset::Algorithm::Assigned(iana::Algorithm::EdDSA) => Some(-8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p256_cose_key() -> Vec<u8> {
        let sk = p256::ecdsa::SigningKey::from_bytes(&[7u8; 32].into()).unwrap();
        let pk = p256::PublicKey::from(sk.verifying_key());
        let point = pk.to_encoded_point(false);
        let x = point.x().unwrap().to_vec();
        let y = point.y().unwrap().to_vec();

        let key = coset::CoseKeyBuilder::new_ec2_pub_key(iana::EllipticCurve::P_256, x, y)
            .algorithm(iana::Algorithm::ES256)
            .build();
        key.to_vec().unwrap()
    }

    #[test]
    fn parses_ec2_p256_key() {
        let cbor = p256_cose_key();
        let key = CoseKey::from_cbor(&cbor).unwrap();
        assert!(matches!(key.material, CoseKeyMaterial::Ec2 { curve: EcCurve::P256, .. }));
        assert_eq!(key.alg, Some(-7));
        let point = key.to_uncompressed_point().unwrap();
        assert_eq!(point.len(), 65);
        assert_eq!(point[0], 0x04);
    }

    #[test]
    fn jwk_round_trips_ec2_fields() {
        let cbor = p256_cose_key();
        let key = CoseKey::from_cbor(&cbor).unwrap();
        let jwk = key.to_jwk();
        assert_eq!(jwk["kty"], "EC");
        assert_eq!(jwk["crv"], "P-256");
    }
}
