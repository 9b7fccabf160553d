//! The relying-party facade: challenge issuance and the entry points into
//! attestation/assertion verification.
//!
//! A single `RelyingParty` owns a validated [`RelyingPartyConfig`] and
//! exposes the four public operations. Output field names are
//! lowerCamelCase via `serde(rename_all = "camelCase")`, matching WebAuthn
//! Level 1's `PublicKeyCredentialCreationOptions`/
//! `PublicKeyCredentialRequestOptions`; byte fields are left as raw buffers
//! (`Vec<u8>`) for the embedding application's own transport layer to
//! encode.

use serde::Serialize;

use crate::challenge;
use crate::config::RelyingPartyConfig;
use crate::error::Result;
use crate::result::{AssertionResponse, AssertionResult, AttestationResponse, AttestationResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpEntity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_resident_key: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<&'static str>,
}

/// Returned by [`RelyingParty::attestation_options`]: a
/// `PublicKeyCredentialCreationOptions`-shaped value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationOptions {
    pub rp: RpEntity,
    pub challenge: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_challenge: Option<Vec<u8>>,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelection>,
    pub attestation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Returned by [`RelyingParty::assertion_options`]: a
/// `PublicKeyCredentialRequestOptions`-shaped value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    pub challenge: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_challenge: Option<Vec<u8>>,
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Options that shape a single `attestationOptions`/`assertionOptions`
/// call — not part of the stored configuration.
#[derive(Debug, Clone, Default)]
pub struct OptionsRequest {
    pub extensions: Option<serde_json::Value>,
    pub extra_data: Option<Vec<u8>>,
}

/// A configured relying party: the entry point into challenge issuance and
/// response verification.
#[derive(Debug, Clone)]
pub struct RelyingParty {
    config: RelyingPartyConfig,
}

impl RelyingParty {
    pub fn new(config: RelyingPartyConfig) -> Self {
        RelyingParty { config }
    }

    pub fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    /// Builds registration (attestation) options, issuing a fresh
    /// challenge.
    pub fn attestation_options(&self, request: OptionsRequest) -> AttestationOptions {
        let c = challenge::generate(self.config.challenge_size, request.extra_data.as_deref());

        let authenticator_selection = if self.config.authenticator_attachment.is_some()
            || self.config.authenticator_require_resident_key.is_some()
            || self.config.authenticator_user_verification.is_some()
        {
            Some(AuthenticatorSelection {
                authenticator_attachment: self
                    .config
                    .authenticator_attachment
                    .map(|a| a.as_str()),
                require_resident_key: self.config.authenticator_require_resident_key,
                user_verification: self
                    .config
                    .authenticator_user_verification
                    .map(|u| u.as_str()),
            })
        } else {
            None
        };

        AttestationOptions {
            rp: RpEntity {
                id: self.config.rp_id.clone(),
                name: self.config.rp_name.clone(),
                icon: self.config.rp_icon.clone(),
            },
            challenge: c.challenge,
            raw_challenge: c.raw_challenge,
            pub_key_cred_params: self
                .config
                .crypto_params
                .iter()
                .map(|alg| PubKeyCredParam {
                    ty: "public-key",
                    alg: *alg,
                })
                .collect(),
            timeout: self.config.timeout_ms,
            authenticator_selection,
            attestation: self.config.attestation.as_str(),
            extensions: request.extensions,
        }
    }

    /// Verifies an attestation (registration) response against
    /// `expectations`.
    pub fn attestation_result(
        &self,
        response: AttestationResponse,
        expectations: &serde_json::Value,
    ) -> Result<AttestationResult> {
        AttestationResult::verify(response, expectations)
    }

    /// Builds authentication (assertion) options, issuing a fresh
    /// challenge.
    pub fn assertion_options(&self, request: OptionsRequest) -> AssertionOptions {
        let c = challenge::generate(self.config.challenge_size, request.extra_data.as_deref());

        AssertionOptions {
            rp_id: self.config.rp_id.clone(),
            challenge: c.challenge,
            raw_challenge: c.raw_challenge,
            timeout: self.config.timeout_ms,
            user_verification: self
                .config
                .authenticator_user_verification
                .map(|u| u.as_str()),
            extensions: request.extensions,
        }
    }

    /// Verifies an assertion (authentication) response against
    /// `expectations`.
    pub fn assertion_result(
        &self,
        response: AssertionResponse,
        expectations: &serde_json::Value,
    ) -> Result<AssertionResult> {
        AssertionResult::verify(response, expectations)
    }
}
