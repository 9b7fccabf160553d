//! Signature verification primitives.
//!
//! Built on the RustCrypto family (`ed25519-dalek`, `sha2`, `p256`, `p384`,
//! `rsa`) rather than `openssl` or `ring`, covering every algorithm the
//! attestation/assertion formats need: ECDSA over P-256/P-384, RSA
//! PKCS#1v1.5, and Ed25519.

use sha2::{Digest, Sha256};
use signature::Verifier;

use crate::cose::{CoseKey, CoseKeyMaterial, EcCurve};
use crate::error::{Result, WebauthnError};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Verifies a DER-encoded ECDSA or PKCS#1v1.5 RSA or raw Ed25519 signature
/// over `message`, dispatching on the key material's type. `sig` is in the
/// wire format the corresponding COSE algorithm/format specifies: DER for
/// ECDSA and RSA, raw 64 bytes for Ed25519.
pub fn verify(key: &CoseKey, message: &[u8], sig: &[u8]) -> Result<()> {
    match &key.material {
        CoseKeyMaterial::Ec2 { curve, x, y } => verify_ecdsa(*curve, x, y, message, sig),
        CoseKeyMaterial::Rsa { n, e } => verify_rsa_pkcs1v15_sha256(n, e, message, sig),
        CoseKeyMaterial::Okp { x, .. } => verify_ed25519(x, message, sig),
    }
}

fn verify_ecdsa(curve: EcCurve, x: &[u8], y: &[u8], message: &[u8], der_sig: &[u8]) -> Result<()> {
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);

    match curve {
        EcCurve::P256 => {
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| WebauthnError::SigInvalid(format!("invalid P-256 key: {e}")))?;
            let sig = p256::ecdsa::Signature::from_der(der_sig)
                .map_err(|e| WebauthnError::SigInvalid(format!("invalid DER signature: {e}")))?;
            vk.verify(message, &sig)
                .map_err(|e| WebauthnError::SigInvalid(e.to_string()))
        }
        EcCurve::P384 => {
            let vk = p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| WebauthnError::SigInvalid(format!("invalid P-384 key: {e}")))?;
            let sig = p384::ecdsa::Signature::from_der(der_sig)
                .map_err(|e| WebauthnError::SigInvalid(format!("invalid DER signature: {e}")))?;
            vk.verify(message, &sig)
                .map_err(|e| WebauthnError::SigInvalid(e.to_string()))
        }
        EcCurve::P521 => Err(WebauthnError::Unsupported(
            "P-521 signature verification is not supported".into(),
        )),
    }
}

fn verify_rsa_pkcs1v15_sha256(n: &[u8], e: &[u8], message: &[u8], sig: &[u8]) -> Result<()> {
    use rsa::pkcs1v15::VerifyingKey;
    use rsa::signature::Verifier as RsaVerifier;

    let n = rsa::BigUint::from_bytes_be(n);
    let e = rsa::BigUint::from_bytes_be(e);
    let pk = rsa::RsaPublicKey::new(n, e)
        .map_err(|err| WebauthnError::SigInvalid(format!("invalid RSA key: {err}")))?;
    let vk = VerifyingKey::<Sha256>::new(pk);
    let signature = rsa::pkcs1v15::Signature::try_from(sig)
        .map_err(|err| WebauthnError::SigInvalid(format!("invalid RSA signature: {err}")))?;
    vk.verify(message, &signature)
        .map_err(|err| WebauthnError::SigInvalid(err.to_string()))
}

fn verify_ed25519(x: &[u8], message: &[u8], sig: &[u8]) -> Result<()> {
    let key_bytes: [u8; 32] = x
        .try_into()
        .map_err(|_| WebauthnError::SigInvalid("invalid Ed25519 key length".into()))?;
    let sig_bytes: [u8; 64] = sig
        .try_into()
        .map_err(|_| WebauthnError::SigInvalid("invalid Ed25519 signature length".into()))?;
    let vk = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| WebauthnError::SigInvalid(format!("invalid Ed25519 key: {e}")))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    vk.verify(message, &signature)
        .map_err(|e| WebauthnError::SigInvalid(e.to_string()))
}

/// id-prime256v1 (P-256), secp384r1 (P-384) named-curve OIDs from the
/// SPKI `ECParameters`, per RFC 5480.
const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
const OID_SECP384R1: &str = "1.3.132.0.34";

/// Verifies a DER-encoded ECDSA or PKCS#1v1.5 RSA signature using an X.509
/// certificate's public key directly (used by `fido-u2f` and `packed`
/// Basic/AttCA attestation and `tpm`'s AIK cert, where the signer is a leaf
/// certificate rather than a COSE key). The EC curve is read from the
/// SPKI's `namedCurve` parameter rather than assumed, since `packed`
/// Basic/AttCA and `tpm` leaf certs may be P-256 or P-384.
pub fn verify_with_x509_public_key(
    cert: &x509_parser::certificate::X509Certificate,
    message: &[u8],
    der_sig: &[u8],
) -> Result<()> {
    use x509_parser::prelude::*;

    let spki = cert.public_key();
    match spki.algorithm.algorithm.to_string().as_str() {
        // id-ecPublicKey
        "1.2.840.10045.2.1" => {
            let point = spki.subject_public_key.as_ref();
            let curve_oid = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .map(|oid| oid.to_string())
                .ok_or_else(|| {
                    WebauthnError::TrustPath("certificate EC key missing namedCurve parameter".into())
                })?;

            match curve_oid.as_str() {
                OID_SECP256R1 => {
                    let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                        .map_err(|e| WebauthnError::SigInvalid(format!("invalid cert EC key: {e}")))?;
                    let sig = p256::ecdsa::Signature::from_der(der_sig)
                        .map_err(|e| WebauthnError::SigInvalid(format!("invalid DER signature: {e}")))?;
                    vk.verify(message, &sig)
                        .map_err(|e| WebauthnError::SigInvalid(e.to_string()))
                }
                OID_SECP384R1 => {
                    let vk = p384::ecdsa::VerifyingKey::from_sec1_bytes(point)
                        .map_err(|e| WebauthnError::SigInvalid(format!("invalid cert EC key: {e}")))?;
                    let sig = p384::ecdsa::Signature::from_der(der_sig)
                        .map_err(|e| WebauthnError::SigInvalid(format!("invalid DER signature: {e}")))?;
                    vk.verify(message, &sig)
                        .map_err(|e| WebauthnError::SigInvalid(e.to_string()))
                }
                other => Err(WebauthnError::Unsupported(format!(
                    "unsupported certificate EC curve: {other}"
                ))),
            }
        }
        // rsaEncryption
        "1.2.840.113549.1.1.1" => {
            let rsa_pk = spki
                .parsed()
                .map_err(|e| WebauthnError::TrustPath(format!("invalid RSA cert key: {e}")))?;
            let PublicKey::RSA(rsa_pk) = rsa_pk else {
                return Err(WebauthnError::TrustPath(
                    "certificate public key is not RSA despite rsaEncryption OID".into(),
                ));
            };
            verify_rsa_pkcs1v15_sha256(rsa_pk.modulus, rsa_pk.exponent, message, der_sig)
        }
        other => Err(WebauthnError::Unsupported(format!(
            "unsupported certificate public key algorithm: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdsa_p256_round_trip() {
        let sk = p256::ecdsa::SigningKey::from_bytes(&[9u8; 32].into()).unwrap();
        let vk = p256::ecdsa::VerifyingKey::from(&sk);
        let point = p256::EncodedPoint::from(vk);
        let (x, y) = (
            point.x().unwrap().to_vec(),
            point.y().unwrap().to_vec(),
        );
        let key = CoseKey {
            alg: Some(-7),
            material: CoseKeyMaterial::Ec2 {
                curve: EcCurve::P256,
                x,
                y,
            },
        };

        use signature::Signer;
        let message = b"attested data";
        let sig: p256::ecdsa::Signature = sk.sign(message);
        let der = sig.to_der();

        verify(&key, message, der.as_bytes()).unwrap();
        assert!(verify(&key, b"tampered", der.as_bytes()).is_err());
    }

    #[test]
    fn ed25519_round_trip() {
        use ed25519_dalek::Signer;
        let sk = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
        let vk = sk.verifying_key();
        let key = CoseKey {
            alg: Some(-8),
            material: CoseKeyMaterial::Okp {
                curve: crate::cose::OkpCurve::Ed25519,
                x: vk.to_bytes().to_vec(),
            },
        };
        let message = b"assertion bytes";
        let sig = sk.sign(message);
        verify(&key, message, &sig.to_bytes()).unwrap();
    }
}
