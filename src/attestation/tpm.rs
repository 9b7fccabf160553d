//! The `tpm` attestation format.
//!
//! `certInfo`/`pubArea` are TCG TPM 2.0 binary structures, not CBOR;
//! parsing them is a pure byte-cursor function in the same style the
//! teacher's `parse_authenticator_data` decodes its own fixed-then-variable
//! layout, generalized here to `TPMS_ATTEST` and `TPMT_PUBLIC`.

use ciborium::Value;
use der_parser::ber::BerObjectContent;
use x509_parser::prelude::*;

use super::{ParseFn, ValidateFn};
use crate::cbor;
use crate::crypto;
use crate::error::{Result, WebauthnError};

const TPM_GENERATED_VALUE: u32 = 0xFF54_4347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;
const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_ECC: u16 = 0x0023;
const TCG_KP_AIK_CERTIFICATE_OID: &str = "2.23.133.8.3";
const SUBJECT_ALT_NAME_OID: &str = "2.5.29.17";
/// `tcg-at-tpmManufacturer`; presence in the SAN's directoryName RDNs is
/// how a TPM AIK cert identifies itself per the TCG's EK Credential
/// Profile, reused here for AIK certs per the WebAuthn `tpm` format.
const TCG_AT_TPM_MANUFACTURER_OID: &str = "2.23.133.2.1";
/// GeneralName's `directoryName` is `[4]` in the `SubjectAltName` CHOICE.
const DIRECTORY_NAME_TAG: u8 = 4;

/// Parsed `TPMS_ATTEST` (the subset of fields this format checks).
#[derive(Debug, Clone)]
pub struct CertInfo {
    pub magic: u32,
    pub ty: u16,
    pub extra_data: Vec<u8>,
    pub attested_name: Vec<u8>,
}

/// `TPMU_PUBLIC_ID`, the algorithm-tagged `unique` field of `TPMT_PUBLIC`.
/// An ECC key's unique value is a `TPMS_ECC_POINT`, i.e. two separate
/// `TPM2B` fields (x then y), not one blob like RSA's modulus.
#[derive(Debug, Clone)]
pub enum PubAreaUnique {
    Rsa(Vec<u8>),
    Ecc { x: Vec<u8>, y: Vec<u8> },
}

/// Parsed `TPMT_PUBLIC` (the subset of fields this format checks).
#[derive(Debug, Clone)]
pub struct PubArea {
    pub name_alg: u16,
    pub unique: PubAreaUnique,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < self.pos + n {
            return Err(WebauthnError::parse_error("TPM structure truncated"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn take_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// TPM2B_* structures: a 2-byte big-endian length prefix followed by
    /// that many bytes.
    fn take_tpm2b(&mut self) -> Result<&'a [u8]> {
        let len = self.take_u16()? as usize;
        self.take(len)
    }
}

/// Parses a `TPMS_ATTEST` structure (TPM 2.0 Part 2, 10.12.8), reading
/// only the fields the `tpm` format's validation steps need.
pub fn parse_cert_info(bytes: &[u8]) -> Result<CertInfo> {
    let mut c = Cursor::new(bytes);
    let magic = c.take_u32()?;
    let ty = c.take_u16()?;
    let _qualified_signer = c.take_tpm2b()?;
    let extra_data = c.take_tpm2b()?.to_vec();
    let _clock_info = c.take(17)?; // TPMS_CLOCK_INFO: 8+8+1 bytes
    let _firmware_version = c.take(8)?;
    // TPMU_ATTEST (attested): for ATTEST_CERTIFY this is TPM2B_NAME
    // (length-prefixed) followed by TPM2B_NAME qualifiedName, also
    // length-prefixed.
    let attested_name = c.take_tpm2b()?.to_vec();
    let _qualified_name = c.take_tpm2b()?;

    Ok(CertInfo {
        magic,
        ty,
        extra_data,
        attested_name,
    })
}

/// Parses a `TPMT_PUBLIC` structure (TPM 2.0 Part 2, 12.2.4). `TPMU_PUBLIC_PARMS`
/// and `TPMU_PUBLIC_ID` are both tagged by `type`, so the parameter block
/// between `authPolicy` and `unique` has to be skipped field-by-field per
/// algorithm rather than skipped as an opaque run of bytes.
pub fn parse_pub_area(bytes: &[u8]) -> Result<PubArea> {
    let mut c = Cursor::new(bytes);
    let ty = c.take_u16()?;
    let name_alg = c.take_u16()?;
    let _object_attributes = c.take_u32()?;
    let _auth_policy = c.take_tpm2b()?;

    match ty {
        TPM_ALG_RSA => {
            // TPMS_RSA_PARMS: symmetric(2) + scheme(2) + keyBits(2) + exponent(4)
            let _symmetric = c.take_u16()?;
            let _scheme = c.take_u16()?;
            let _key_bits = c.take_u16()?;
            let _exponent = c.take_u32()?;
            let unique = c.take_tpm2b()?.to_vec();
            Ok(PubArea {
                name_alg,
                unique: PubAreaUnique::Rsa(unique),
            })
        }
        TPM_ALG_ECC => {
            // TPMS_ECC_PARMS: symmetric(2) + scheme(2) + curveId(2) + kdf(2)
            let _symmetric = c.take_u16()?;
            let _scheme = c.take_u16()?;
            let _curve_id = c.take_u16()?;
            let _kdf = c.take_u16()?;
            // TPMS_ECC_POINT: two TPM2B fields, x then y.
            let x = c.take_tpm2b()?.to_vec();
            let y = c.take_tpm2b()?.to_vec();
            Ok(PubArea {
                name_alg,
                unique: PubAreaUnique::Ecc { x, y },
            })
        }
        other => Err(WebauthnError::Unsupported(format!(
            "unsupported TPM public key type: {other:#06x}"
        ))),
    }
}

pub fn parse_fn() -> ParseFn {
    Box::new(|att_stmt| {
        let ver = cbor::require_text(att_stmt, "ver")?;
        if ver != "2.0" {
            return Err(WebauthnError::arg_invalid(format!(
                "tpm attStmt.ver must be '2.0', got: {ver}"
            )));
        }
        let alg = cbor::find_int(att_stmt, "alg")
            .ok_or_else(|| WebauthnError::arg_missing("attStmt.alg"))?;
        let alg: i64 = alg
            .try_into()
            .map_err(|_| WebauthnError::parse_error("alg out of range"))?;
        let sig = cbor::require_bytes(att_stmt, "sig")?.to_vec();
        let cert_info = cbor::require_bytes(att_stmt, "certInfo")?.to_vec();
        let pub_area = cbor::require_bytes(att_stmt, "pubArea")?.to_vec();
        let x5c = cbor::find_array(att_stmt, "x5c")
            .ok_or_else(|| WebauthnError::arg_missing("attStmt.x5c"))?
            .iter()
            .filter_map(|v| v.as_bytes().cloned())
            .collect::<Vec<_>>();

        Ok(Value::Map(vec![
            (Value::Text("alg".into()), Value::Integer(alg.into())),
            (Value::Text("sig".into()), Value::Bytes(sig)),
            (Value::Text("certInfo".into()), Value::Bytes(cert_info)),
            (Value::Text("pubArea".into()), Value::Bytes(pub_area)),
            (
                Value::Text("x5c".into()),
                Value::Array(x5c.into_iter().map(Value::Bytes).collect()),
            ),
        ]))
    })
}

pub fn validate_fn() -> ValidateFn {
    Box::new(|ctx, parsed| {
        let map = parsed
            .as_map()
            .ok_or_else(|| WebauthnError::parse_error("tpm parsed attStmt is not a Map"))?;
        let sig = cbor::require_bytes(map, "sig")?;
        let cert_info_bytes = cbor::require_bytes(map, "certInfo")?;
        let pub_area_bytes = cbor::require_bytes(map, "pubArea")?;
        let x5c = cbor::require_array_bytes(map, "x5c")?;

        let cred = ctx.authnr_data.attested_credential_data.as_ref().ok_or_else(|| {
            WebauthnError::protocol_error("tpm requires attested credential data")
        })?;

        let cert_info = parse_cert_info(cert_info_bytes)?;
        let pub_area = parse_pub_area(pub_area_bytes)?;

        // 1. pubArea.unique matches the credential public key.
        match (&pub_area.unique, &cred.credential_public_key.material) {
            (PubAreaUnique::Ecc { x, y }, crate::cose::CoseKeyMaterial::Ec2 { x: cose_x, y: cose_y, .. }) => {
                if x != cose_x || y != cose_y {
                    return Err(WebauthnError::protocol_error(
                        "tpm pubArea.unique does not match credential public key",
                    ));
                }
            }
            (PubAreaUnique::Rsa(n), crate::cose::CoseKeyMaterial::Rsa { n: cose_n, .. }) => {
                if n != cose_n {
                    return Err(WebauthnError::protocol_error(
                        "tpm pubArea.unique does not match credential public key",
                    ));
                }
            }
            _ => {
                return Err(WebauthnError::protocol_error(
                    "tpm pubArea key type does not match credential public key type",
                ))
            }
        }

        // 2. magic/type.
        if cert_info.magic != TPM_GENERATED_VALUE {
            return Err(WebauthnError::protocol_error(
                "tpm certInfo.magic is not TPM_GENERATED_VALUE",
            ));
        }
        if cert_info.ty != TPM_ST_ATTEST_CERTIFY {
            return Err(WebauthnError::protocol_error(
                "tpm certInfo.type is not TPM_ST_ATTEST_CERTIFY",
            ));
        }

        // 3. extraData == hash(authenticatorDataRaw || clientDataHash).
        let mut message = Vec::with_capacity(ctx.authnr_data.raw.len() + 32);
        message.extend_from_slice(&ctx.authnr_data.raw);
        message.extend_from_slice(&ctx.client_data_hash);
        let expected_extra_data = crypto::sha256(&message);
        if cert_info.extra_data != expected_extra_data {
            return Err(WebauthnError::protocol_error(
                "tpm certInfo.extraData does not match hash(authData || clientDataHash)",
            ));
        }

        // 4. attested.name equals name of pubArea under its own name alg.
        let name_hash = match pub_area.name_alg {
            0x000B => crypto::sha256(pub_area_bytes).to_vec(), // TPM_ALG_SHA256
            other => {
                return Err(WebauthnError::Unsupported(format!(
                    "unsupported TPM nameAlg: {other:#06x}"
                )))
            }
        };
        let mut expected_name = pub_area.name_alg.to_be_bytes().to_vec();
        expected_name.extend_from_slice(&name_hash);
        if cert_info.attested_name != expected_name {
            return Err(WebauthnError::protocol_error(
                "tpm certInfo.attested.name does not match pubArea name",
            ));
        }

        // 5. verify sig over certInfo with leaf of x5c.
        let leaf_der = x5c
            .first()
            .ok_or_else(|| WebauthnError::arg_missing("x5c[0]"))?;
        let (_, cert) = x509_parser::parse_x509_certificate(leaf_der)
            .map_err(|e| WebauthnError::TrustPath(format!("invalid tpm attestation cert: {e}")))?;
        crypto::verify_with_x509_public_key(&cert, cert_info_bytes, sig)?;

        // 6. leaf cert checks.
        validate_aik_cert(&cert, &cred.aaguid)?;

        Ok(true)
    })
}

/// Walks a `SubjectAltName` extension's raw DER looking for a
/// `directoryName` GeneralName whose RDNSequence names the TCG
/// `tpmManufacturer` attribute, walking nested SEQUENCEs with
/// `der_parser::parse_der` instead of a schema-typed decoder.
fn san_has_tcg_manufacturer(ext_value: &[u8]) -> bool {
    let Ok((_, general_names)) = der_parser::parse_der(ext_value) else {
        return false;
    };
    let BerObjectContent::Sequence(names) = &general_names.content else {
        return false;
    };
    for name in names {
        if name.header.tag.0 != u32::from(DIRECTORY_NAME_TAG) {
            continue;
        }
        if let BerObjectContent::Unknown(any) = &name.content {
            if rdn_sequence_has_oid(any.data, TCG_AT_TPM_MANUFACTURER_OID) {
                return true;
            }
        }
    }
    false
}

/// `directoryName` is implicitly tagged, so `any.data` holds the Name's
/// RDNSequence content directly: a run of DER SETs (RDNs), each a SET of
/// `AttributeTypeAndValue` SEQUENCEs.
fn rdn_sequence_has_oid(mut rest: &[u8], target_oid: &str) -> bool {
    while !rest.is_empty() {
        let Ok((remainder, rdn)) = der_parser::parse_der(rest) else {
            return false;
        };
        rest = remainder;
        let BerObjectContent::Set(atvs) = &rdn.content else {
            continue;
        };
        for atv in atvs {
            let BerObjectContent::Sequence(fields) = &atv.content else {
                continue;
            };
            let Some(oid_field) = fields.first() else {
                continue;
            };
            if let BerObjectContent::OID(oid) = &oid_field.content {
                if oid.to_string() == target_oid {
                    return true;
                }
            }
        }
    }
    false
}

fn validate_aik_cert(cert: &X509Certificate, aaguid: &[u8; 16]) -> Result<()> {
    if cert.version() != X509Version::V3 {
        return Err(WebauthnError::TrustPath("tpm AIK cert must be X.509 v3".into()));
    }
    if cert.subject().iter().next().is_some() {
        return Err(WebauthnError::TrustPath(
            "tpm AIK cert subject must be empty".into(),
        ));
    }

    let san_ok = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_string() == SUBJECT_ALT_NAME_OID)
        .is_some_and(|ext| san_has_tcg_manufacturer(ext.value));
    if !san_ok {
        return Err(WebauthnError::TrustPath(
            "tpm AIK cert missing subjectAltName with TPM manufacturer/model/version".into(),
        ));
    }

    let eku_ok = cert
        .extended_key_usage()
        .ok()
        .flatten()
        .map(|eku| eku.value.other.iter().any(|oid| oid.to_string() == TCG_KP_AIK_CERTIFICATE_OID))
        .unwrap_or(false);
    if !eku_ok {
        return Err(WebauthnError::TrustPath(
            "tpm AIK cert missing tcg-kp-AIKCertificate EKU".into(),
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
            "tpm AIK cert must have basicConstraints CA=false".into(),
        ));
    }

    if let Some(aaguid_ext) = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_string() == super::packed::AAGUID_EXTENSION_OID)
    {
        if !aaguid_ext.value.ends_with(aaguid) {
            return Err(WebauthnError::TrustPath(
                "tpm AIK cert AAGUID extension does not match authData AAGUID".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_truncated_cert_info() {
        let err = parse_cert_info(&[0u8; 3]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ParseError);
    }

    #[test]
    fn parses_cert_info_header_fields() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
        bytes.extend_from_slice(&TPM_ST_ATTEST_CERTIFY.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes()); // qualifiedSigner len=0
        let extra_data = vec![1u8; 32];
        bytes.extend_from_slice(&(extra_data.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&extra_data);
        bytes.extend_from_slice(&[0u8; 17]); // clockInfo
        bytes.extend_from_slice(&[0u8; 8]); // firmwareVersion
        let name = vec![0x00, 0x0B, 2, 3];
        bytes.extend_from_slice(&(name.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&name);
        bytes.extend_from_slice(&0u16.to_be_bytes()); // qualifiedName len=0

        let info = parse_cert_info(&bytes).unwrap();
        assert_eq!(info.magic, TPM_GENERATED_VALUE);
        assert_eq!(info.ty, TPM_ST_ATTEST_CERTIFY);
        assert_eq!(info.extra_data, extra_data);
        assert_eq!(info.attested_name, name);
    }
}
