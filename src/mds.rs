//! FIDO Metadata Service (MDS) collections.
//!
//! The full MDS table-of-contents model: a signed TOC naming expected
//! entry hashes, staged entries that only become queryable once their hash
//! matches a TOC descriptor, and a process-wide collection registry
//! mirroring the attestation-format registry's `OnceLock<RwLock<...>>`
//! discipline.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde::Deserialize;

use crate::crypto;
use crate::error::{Result, WebauthnError};

/// One status report entry from a TOC descriptor or canonicalized entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(rename = "effectiveDate")]
    pub effective_date: Option<String>,
    pub certificate: Option<String>,
    pub url: Option<String>,
}

/// A single descriptor from the TOC's `entries` array: what the TOC
/// promises about a metadata statement without yet containing it.
#[derive(Debug, Clone, Deserialize)]
pub struct TocDescriptor {
    pub aaid: Option<String>,
    pub aaguid: Option<String>,
    #[serde(rename = "attestationCertificateKeyIdentifiers")]
    pub attestation_certificate_key_identifiers: Option<Vec<String>>,
    pub hash: String,
    pub url: Option<String>,
    #[serde(rename = "statusReports")]
    pub status_reports: Vec<StatusReport>,
    #[serde(rename = "timeOfLastStatusChange")]
    pub time_of_last_status_change: Option<String>,
}

impl TocDescriptor {
    fn identifier(&self) -> Option<Identifier> {
        if let Some(aaid) = &self.aaid {
            return Some(Identifier::Aaid(aaid.clone()));
        }
        if let Some(aaguid) = &self.aaguid {
            return Some(Identifier::Aaguid(normalize_aaguid(aaguid)));
        }
        if let Some(kids) = &self.attestation_certificate_key_identifiers {
            return kids.first().map(|k| Identifier::CertKeyId(k.to_lowercase()));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identifier {
    Aaid(String),
    Aaguid(String),
    CertKeyId(String),
}

#[derive(Debug, Deserialize)]
struct TocPayload {
    #[serde(rename = "legalHeader")]
    legal_header: Option<String>,
    no: Option<i64>,
    #[serde(rename = "nextUpdate")]
    next_update: Option<String>,
    entries: Vec<TocDescriptor>,
}

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    x5c: Vec<String>,
}

/// The verified table of contents for a collection: every descriptor the
/// signed TOC named, keyed by identifier.
#[derive(Debug, Clone)]
pub struct Toc {
    pub legal_header: Option<String>,
    pub no: Option<i64>,
    pub next_update: Option<String>,
    descriptors: HashMap<Identifier, TocDescriptor>,
}

impl Toc {
    /// Whether `nextUpdate` names a date that has already passed, relative
    /// to `now`. A TOC with no `nextUpdate` is never considered stale.
    pub fn is_stale(&self, now: chrono::NaiveDate) -> bool {
        self.next_update
            .as_deref()
            .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .is_some_and(|next_update| now > next_update)
    }
}

/// Canonical cross-protocol view of a metadata statement, built by
/// [`MdsCollection::validate`] once a staged raw entry's hash matches a
/// TOC descriptor.
#[derive(Debug, Clone)]
pub struct MdsEntry {
    pub protocol_family: String,
    pub aaid: Option<String>,
    pub aaguid: Option<String>,
    pub attestation_certificate_key_identifiers: Vec<String>,
    pub description: Option<String>,
    pub status_reports: Vec<StatusReport>,
    pub attestation_root_certificates: Vec<Vec<u8>>,
    pub metadata_statement: serde_json::Value,
    /// Name of the [`MdsCollection`] this entry was validated into.
    pub collection_name: String,
    /// Present when the collection's legal header differs from a blank
    /// default — e.g. distinguishing an MDS2 entry from an MDS1 one when
    /// the same AAGUID shows up in both collections.
    pub legal_header: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMetadataStatement {
    #[serde(default)]
    aaid: Option<String>,
    #[serde(default)]
    aaguid: Option<String>,
    #[serde(default, rename = "attestationCertificateKeyIdentifiers")]
    attestation_certificate_key_identifiers: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "attestationRootCertificates")]
    attestation_root_certificates: Vec<String>,
}

struct StagedEntry {
    raw: Vec<u8>,
}

/// A named collection of MDS entries, verified against a signed TOC.
///
/// Entries added via [`MdsCollection::add_entry`] before [`validate`] are
/// staged; `validate` (invoked by [`add_collection`] when the collection
/// is registered) moves staged entries into the queryable set only if
/// their hash matches a TOC descriptor.
pub struct MdsCollection {
    pub name: String,
    toc: Option<Toc>,
    staged: Vec<StagedEntry>,
    entries: HashMap<Identifier, MdsEntry>,
}

impl MdsCollection {
    pub fn new(name: impl Into<String>) -> Self {
        MdsCollection {
            name: name.into(),
            toc: None,
            staged: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Verifies a signed TOC JWT against `root_cert_der` (the FIDO MDS
    /// root for this collection) and stores its entry descriptors.
    pub fn add_toc(&mut self, toc_jwt: &str, root_cert_der: &[u8]) -> Result<()> {
        let jws = crate::jws::split(toc_jwt)?;

        let header_bytes = jws.header_bytes()?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| WebauthnError::parse_error(format!("invalid TOC JWS header: {e}")))?;

        if header.x5c.is_empty() {
            return Err(WebauthnError::arg_missing("TOC JWS header.x5c"));
        }

        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let chain_der: Vec<Vec<u8>> = header
            .x5c
            .iter()
            .map(|b64| {
                STANDARD
                    .decode(b64)
                    .map_err(|e| WebauthnError::parse_error(format!("invalid TOC x5c entry: {e}")))
            })
            .collect::<Result<_>>()?;

        verify_chain_to_root(&chain_der, root_cert_der)?;

        let (_, leaf) = x509_parser::parse_x509_certificate(&chain_der[0])
            .map_err(|e| WebauthnError::TrustPath(format!("invalid TOC leaf cert: {e}")))?;

        match header.alg.as_str() {
            "RS256" | "ES256" => {}
            other => {
                return Err(WebauthnError::AlgMismatch(format!(
                    "unsupported TOC JWS alg: {other}"
                )))
            }
        }

        let sig = jws.signature_bytes()?;
        crypto::verify_with_x509_public_key(&leaf, jws.signed_input.as_bytes(), &sig)?;

        let payload_bytes = jws.payload_bytes()?;
        let payload: TocPayload = serde_json::from_slice(&payload_bytes)
            .map_err(|e| WebauthnError::parse_error(format!("invalid TOC payload: {e}")))?;

        if let Some(next_update) = &payload.next_update {
            chrono::NaiveDate::parse_from_str(next_update, "%Y-%m-%d").map_err(|e| {
                WebauthnError::parse_error(format!("TOC nextUpdate is not YYYY-MM-DD: {e}"))
            })?;
        }

        let mut descriptors = HashMap::new();
        for descriptor in payload.entries {
            if let Some(id) = descriptor.identifier() {
                descriptors.insert(id, descriptor);
            }
        }

        self.toc = Some(Toc {
            legal_header: payload.legal_header,
            no: payload.no,
            next_update: payload.next_update,
            descriptors,
        });
        Ok(())
    }

    /// Stages a base64url-encoded metadata statement. Not queryable until
    /// [`validate`] accepts it against a TOC descriptor's hash.
    pub fn add_entry(&mut self, raw_entry_b64: &str) -> Result<()> {
        let raw = crate::b64::decode(raw_entry_b64)?;
        self.staged.push(StagedEntry { raw });
        Ok(())
    }

    /// Moves every staged entry whose hash matches a TOC descriptor into
    /// the queryable set, canonicalizing it into an [`MdsEntry`].
    pub fn validate(&mut self) -> Result<()> {
        let toc = self
            .toc
            .as_ref()
            .ok_or_else(|| WebauthnError::protocol_error("MDS collection has no verified TOC"))?;

        let legal_header = toc.legal_header.clone();
        let staged = std::mem::take(&mut self.staged);
        for staged_entry in staged {
            let hash = crypto::sha256(&staged_entry.raw);
            let hash_b64 = crate::b64::encode(hash);

            let Some(descriptor) = toc
                .descriptors
                .values()
                .find(|d| d.hash == hash_b64)
            else {
                continue;
            };

            let statement: RawMetadataStatement = serde_json::from_slice(&staged_entry.raw)
                .map_err(|e| WebauthnError::parse_error(format!("invalid metadata statement: {e}")))?;
            let full_value: serde_json::Value = serde_json::from_slice(&staged_entry.raw)
                .map_err(|e| WebauthnError::parse_error(format!("invalid metadata statement: {e}")))?;

            let protocol_family = if statement.aaid.is_some() {
                "uaf".to_string()
            } else if statement.aaguid.is_some() {
                "fido2".to_string()
            } else {
                "u2f".to_string()
            };

            let attestation_root_certificates = statement
                .attestation_root_certificates
                .iter()
                .map(|b64| {
                    use base64::{engine::general_purpose::STANDARD, Engine as _};
                    STANDARD
                        .decode(b64)
                        .map_err(|e| WebauthnError::parse_error(format!("invalid root cert: {e}")))
                })
                .collect::<Result<Vec<_>>>()?;

            let entry = MdsEntry {
                protocol_family,
                aaid: statement.aaid.clone(),
                aaguid: statement.aaguid.as_deref().map(normalize_aaguid),
                attestation_certificate_key_identifiers: statement
                    .attestation_certificate_key_identifiers
                    .iter()
                    .map(|s| s.to_lowercase())
                    .collect(),
                description: statement.description,
                status_reports: descriptor.status_reports.clone(),
                attestation_root_certificates,
                metadata_statement: full_value,
                collection_name: self.name.clone(),
                legal_header: legal_header.clone(),
            };

            if let Some(id) = descriptor.identifier() {
                self.entries.insert(id, entry);
            }
        }
        Ok(())
    }

    /// Looks up an entry by AAID (`vvvv#mmmm`), AAGUID (with or without
    /// hyphens), or hex certificate-key-identifier.
    pub fn find_entry(&self, id: &str) -> Option<&MdsEntry> {
        if id.contains('#') {
            return self.entries.get(&Identifier::Aaid(id.to_string()));
        }
        let lowered = id.to_lowercase();
        if let Some(entry) = self.entries.get(&Identifier::Aaguid(normalize_aaguid(&lowered))) {
            return Some(entry);
        }
        self.entries.get(&Identifier::CertKeyId(lowered))
    }
}

fn normalize_aaguid(s: &str) -> String {
    s.chars().filter(|c| *c != '-').collect::<String>().to_lowercase()
}

/// Walks an x5c chain from leaf toward the trust root, verifying each
/// certificate's signature against its issuer's public key, and finally
/// verifying the chain terminates at (or is directly signed by) the
/// supplied root. Uses `x509-parser`'s `verify_signature` (the `verify`
/// feature) rather than the hand-rolled message-buffer verification the
/// attestation formats use, since this is whole-certificate (TBSCertificate)
/// verification rather than verification over an assembled byte buffer.
fn verify_chain_to_root(chain_der: &[Vec<u8>], root_cert_der: &[u8]) -> Result<()> {
    let certs: Vec<_> = chain_der
        .iter()
        .map(|der| {
            x509_parser::parse_x509_certificate(der)
                .map(|(_, cert)| cert)
                .map_err(|e| WebauthnError::TrustPath(format!("invalid chain certificate: {e}")))
        })
        .collect::<Result<_>>()?;

    let (_, root) = x509_parser::parse_x509_certificate(root_cert_der)
        .map_err(|e| WebauthnError::TrustPath(format!("invalid MDS root certificate: {e}")))?;

    for i in 0..certs.len() {
        let issuer_pubkey = if i + 1 < certs.len() {
            certs[i + 1].public_key()
        } else {
            root.public_key()
        };
        certs[i]
            .verify_signature(Some(issuer_pubkey))
            .map_err(|e| WebauthnError::TrustPath(format!("chain signature verification failed: {e}")))?;
    }

    Ok(())
}

/// Process-wide collection registry backing `add_collection`/
/// `find_mds_entry`. A `Vec` rather than a `HashMap` because
/// `find_mds_entry` must return cross-collection hits in registration
/// order; re-registering an existing name updates it in place rather than
/// moving it to the end.
static COLLECTIONS: OnceLock<RwLock<Vec<(String, Arc<MdsCollection>)>>> = OnceLock::new();

fn collections() -> &'static RwLock<Vec<(String, Arc<MdsCollection>)>> {
    COLLECTIONS.get_or_init(|| RwLock::new(Vec::new()))
}

/// Validates `collection` and registers it process-wide, indexed by name.
pub fn add_collection(mut collection: MdsCollection) -> Result<()> {
    collection.validate()?;
    let entry = Arc::new(collection);
    let mut reg = collections()
        .write()
        .expect("MDS collection registry lock poisoned");
    match reg.iter_mut().find(|(name, _)| *name == entry.name) {
        Some((_, slot)) => *slot = entry,
        None => reg.push((entry.name.clone(), entry)),
    }
    Ok(())
}

/// Empties the process-wide collection registry. Test-only.
#[doc(hidden)]
pub fn delete_all_collections() {
    collections()
        .write()
        .expect("MDS collection registry lock poisoned")
        .clear();
}

/// Returns every entry matching `id` across all registered collections, in
/// registration order. Fails with `NoMds` if no collection is registered.
pub fn find_mds_entry(id: &str) -> Result<Vec<MdsEntry>> {
    let reg = collections()
        .read()
        .expect("MDS collection registry lock poisoned");
    if reg.is_empty() {
        return Err(WebauthnError::NoMds(
            "no MDS collections are registered".into(),
        ));
    }
    Ok(reg
        .iter()
        .filter_map(|(_, c)| c.find_entry(id).cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_aaguid_strips_hyphens_and_lowercases() {
        assert_eq!(
            normalize_aaguid("4E4E2000-0000-0000-0000-000000000000"),
            "4e4e2000000000000000000000000000"
        );
    }

    #[test]
    fn toc_is_stale_compares_against_next_update() {
        let toc = Toc {
            legal_header: None,
            no: Some(1),
            next_update: Some("2020-01-01".into()),
            descriptors: HashMap::new(),
        };
        assert!(toc.is_stale(chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()));
        assert!(!toc.is_stale(chrono::NaiveDate::from_ymd_opt(2019, 12, 31).unwrap()));

        let no_expiry = Toc {
            legal_header: None,
            no: Some(1),
            next_update: None,
            descriptors: HashMap::new(),
        };
        assert!(!no_expiry.is_stale(chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()));
    }

    #[test]
    fn find_mds_entry_without_collections_fails_no_mds() {
        delete_all_collections();
        let err = find_mds_entry("4e4e#4005").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoMds);
    }

    #[test]
    fn collection_lookup_by_aaid() {
        let mut collection = MdsCollection::new("test-collection");
        collection.entries.insert(
            Identifier::Aaid("4e4e#4005".into()),
            MdsEntry {
                protocol_family: "uaf".into(),
                aaid: Some("4e4e#4005".into()),
                aaguid: None,
                attestation_certificate_key_identifiers: vec![],
                description: Some("test authenticator".into()),
                status_reports: vec![],
                attestation_root_certificates: vec![],
                metadata_statement: serde_json::json!({}),
                collection_name: "test-collection".into(),
                legal_header: None,
            },
        );
        assert!(collection.find_entry("4e4e#4005").is_some());
        assert!(collection.find_entry("no-such-id").is_none());
    }

    fn entry_with_aaguid(collection_name: &str, aaguid: &str) -> MdsEntry {
        MdsEntry {
            protocol_family: "fido2".into(),
            aaid: None,
            aaguid: Some(normalize_aaguid(aaguid)),
            attestation_certificate_key_identifiers: vec![],
            description: Some(format!("{collection_name} authenticator")),
            status_reports: vec![],
            attestation_root_certificates: vec![],
            metadata_statement: serde_json::json!({}),
            collection_name: collection_name.into(),
            legal_header: None,
        }
    }

    /// Two collections holding an entry for the same AAGUID (e.g. an MDS1
    /// and an MDS2 feed disagreeing about one authenticator) must both
    /// surface from a single lookup, in registration order.
    #[test]
    fn find_mds_entry_returns_hits_from_every_collection_in_registration_order() {
        delete_all_collections();

        let aaguid = "4e4e2000-0000-0000-0000-000000000000";
        let mut first = MdsCollection::new("mds1");
        first
            .entries
            .insert(Identifier::Aaguid(normalize_aaguid(aaguid)), entry_with_aaguid("mds1", aaguid));
        let mut second = MdsCollection::new("mds2");
        second
            .entries
            .insert(Identifier::Aaguid(normalize_aaguid(aaguid)), entry_with_aaguid("mds2", aaguid));

        {
            let mut reg = collections().write().unwrap();
            reg.push((first.name.clone(), Arc::new(first)));
            reg.push((second.name.clone(), Arc::new(second)));
        }

        let hits = find_mds_entry(aaguid).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].collection_name, "mds1");
        assert_eq!(hits[1].collection_name, "mds2");

        delete_all_collections();
    }
}
