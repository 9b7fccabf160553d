//! Relying-party configuration.
//!
//! Loads typed defaults from the environment but validates every field at
//! `build()` time instead of accepting whatever `std::env` hands back,
//! since a misconfigured relying party must fail the same way a
//! misconfigured call site does.

use std::env;

use crate::error::{Result, WebauthnError};

/// `attestation` conveyance preference advertised to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationConveyance {
    Direct,
    Indirect,
    None,
}

impl AttestationConveyance {
    pub fn as_str(self) -> &'static str {
        match self {
            AttestationConveyance::Direct => "direct",
            AttestationConveyance::Indirect => "indirect",
            AttestationConveyance::None => "none",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "direct" => Ok(AttestationConveyance::Direct),
            "indirect" => Ok(AttestationConveyance::Indirect),
            "none" => Ok(AttestationConveyance::None),
            other => Err(WebauthnError::arg_type(
                "attestation to be one of 'direct', 'indirect', 'none'",
                other,
            )),
        }
    }
}

/// `authenticatorAttachment` preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

impl AuthenticatorAttachment {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthenticatorAttachment::Platform => "platform",
            AuthenticatorAttachment::CrossPlatform => "cross-platform",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "platform" => Ok(AuthenticatorAttachment::Platform),
            "cross-platform" => Ok(AuthenticatorAttachment::CrossPlatform),
            other => Err(WebauthnError::arg_type(
                "authenticatorAttachment to be one of 'platform', 'cross-platform'",
                other,
            )),
        }
    }
}

/// `authenticatorSelection.userVerification` preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

impl UserVerificationRequirement {
    pub fn as_str(self) -> &'static str {
        match self {
            UserVerificationRequirement::Required => "required",
            UserVerificationRequirement::Preferred => "preferred",
            UserVerificationRequirement::Discouraged => "discouraged",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "required" => Ok(UserVerificationRequirement::Required),
            "preferred" => Ok(UserVerificationRequirement::Preferred),
            "discouraged" => Ok(UserVerificationRequirement::Discouraged),
            other => Err(WebauthnError::arg_type(
                "authenticatorUserVerification to be one of 'required', 'preferred', 'discouraged'",
                other,
            )),
        }
    }
}

const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_RP_NAME: &str = "Anonymous Service";
const DEFAULT_CHALLENGE_SIZE: usize = 64;
const MIN_CHALLENGE_SIZE: usize = 32;
const DEFAULT_CRYPTO_PARAMS: &[i64] = &[-7, -257];

/// Validated configuration for a [`crate::facade::RelyingParty`].
///
/// Construct via [`RelyingPartyConfig::builder`] or
/// [`RelyingPartyConfig::from_env`]; both paths run the same validation so a
/// misconfigured environment variable fails exactly like a misconfigured
/// builder call.
#[derive(Debug, Clone)]
pub struct RelyingPartyConfig {
    pub timeout_ms: u64,
    pub rp_id: Option<String>,
    pub rp_name: String,
    pub rp_icon: Option<String>,
    pub challenge_size: usize,
    pub attestation: AttestationConveyance,
    pub crypto_params: Vec<i64>,
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub authenticator_require_resident_key: Option<bool>,
    pub authenticator_user_verification: Option<UserVerificationRequirement>,
}

impl Default for RelyingPartyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rp_id: None,
            rp_name: DEFAULT_RP_NAME.to_string(),
            rp_icon: None,
            challenge_size: DEFAULT_CHALLENGE_SIZE,
            attestation: AttestationConveyance::Direct,
            crypto_params: DEFAULT_CRYPTO_PARAMS.to_vec(),
            authenticator_attachment: None,
            authenticator_require_resident_key: None,
            authenticator_user_verification: None,
        }
    }
}

impl RelyingPartyConfig {
    /// Starts building a configuration from the documented defaults.
    pub fn builder() -> RelyingPartyConfigBuilder {
        RelyingPartyConfigBuilder::default()
    }

    /// Loads configuration from environment variables, falling back to the
    /// same defaults the builder uses. Runs the same validation as
    /// [`RelyingPartyConfigBuilder::build`].
    ///
    /// Recognized variables: `RP_ID`, `RP_NAME`, `RP_ICON`, `RP_TIMEOUT_MS`,
    /// `RP_CHALLENGE_SIZE`, `RP_ATTESTATION`, `RP_CRYPTO_PARAMS`
    /// (comma-separated COSE algorithm ids), `RP_AUTHENTICATOR_ATTACHMENT`,
    /// `RP_AUTHENTICATOR_REQUIRE_RESIDENT_KEY`,
    /// `RP_AUTHENTICATOR_USER_VERIFICATION`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = RelyingPartyConfigBuilder::default();

        if let Ok(v) = env::var("RP_ID") {
            builder = builder.rp_id(v);
        }
        if let Ok(v) = env::var("RP_NAME") {
            builder = builder.rp_name(v);
        }
        if let Ok(v) = env::var("RP_ICON") {
            builder = builder.rp_icon(v);
        }
        if let Ok(v) = env::var("RP_TIMEOUT_MS") {
            let parsed: u64 = v
                .parse()
                .map_err(|_| WebauthnError::arg_type("timeout to be number", &v))?;
            builder = builder.timeout_ms(parsed);
        }
        if let Ok(v) = env::var("RP_CHALLENGE_SIZE") {
            let parsed: usize = v
                .parse()
                .map_err(|_| WebauthnError::arg_type("challengeSize to be number", &v))?;
            builder = builder.challenge_size(parsed);
        }
        if let Ok(v) = env::var("RP_ATTESTATION") {
            builder = builder.attestation_str(&v)?;
        }
        if let Ok(v) = env::var("RP_CRYPTO_PARAMS") {
            let parsed: std::result::Result<Vec<i64>, _> =
                v.split(',').map(|s| s.trim().parse::<i64>()).collect();
            let parsed = parsed
                .map_err(|_| WebauthnError::arg_type("cryptoParams to be a list of integers", &v))?;
            builder = builder.crypto_params(parsed);
        }
        if let Ok(v) = env::var("RP_AUTHENTICATOR_ATTACHMENT") {
            builder = builder.authenticator_attachment_str(&v)?;
        }
        if let Ok(v) = env::var("RP_AUTHENTICATOR_REQUIRE_RESIDENT_KEY") {
            let parsed = v.to_lowercase() == "true" || v == "1";
            builder = builder.authenticator_require_resident_key(parsed);
        }
        if let Ok(v) = env::var("RP_AUTHENTICATOR_USER_VERIFICATION") {
            builder = builder.authenticator_user_verification_str(&v)?;
        }

        builder.build()
    }
}

/// Builder that validates every configuration field at `build()` time.
#[derive(Debug, Clone)]
pub struct RelyingPartyConfigBuilder {
    inner: RelyingPartyConfig,
}

impl Default for RelyingPartyConfigBuilder {
    fn default() -> Self {
        Self {
            inner: RelyingPartyConfig::default(),
        }
    }
}

impl RelyingPartyConfigBuilder {
    pub fn timeout_ms(mut self, v: u64) -> Self {
        self.inner.timeout_ms = v;
        self
    }

    pub fn rp_id(mut self, v: impl Into<String>) -> Self {
        self.inner.rp_id = Some(v.into());
        self
    }

    pub fn rp_name(mut self, v: impl Into<String>) -> Self {
        self.inner.rp_name = v.into();
        self
    }

    pub fn rp_icon(mut self, v: impl Into<String>) -> Self {
        self.inner.rp_icon = Some(v.into());
        self
    }

    pub fn challenge_size(mut self, v: usize) -> Self {
        self.inner.challenge_size = v;
        self
    }

    pub fn attestation(mut self, v: AttestationConveyance) -> Self {
        self.inner.attestation = v;
        self
    }

    fn attestation_str(mut self, v: &str) -> Result<Self> {
        self.inner.attestation = AttestationConveyance::parse(v)?;
        Ok(self)
    }

    pub fn crypto_params(mut self, v: Vec<i64>) -> Self {
        self.inner.crypto_params = v;
        self
    }

    pub fn authenticator_attachment(mut self, v: AuthenticatorAttachment) -> Self {
        self.inner.authenticator_attachment = Some(v);
        self
    }

    fn authenticator_attachment_str(mut self, v: &str) -> Result<Self> {
        self.inner.authenticator_attachment = Some(AuthenticatorAttachment::parse(v)?);
        Ok(self)
    }

    pub fn authenticator_require_resident_key(mut self, v: bool) -> Self {
        self.inner.authenticator_require_resident_key = Some(v);
        self
    }

    pub fn authenticator_user_verification(mut self, v: UserVerificationRequirement) -> Self {
        self.inner.authenticator_user_verification = Some(v);
        self
    }

    fn authenticator_user_verification_str(mut self, v: &str) -> Result<Self> {
        self.inner.authenticator_user_verification = Some(UserVerificationRequirement::parse(v)?);
        Ok(self)
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> Result<RelyingPartyConfig> {
        let cfg = self.inner;

        if cfg.challenge_size < MIN_CHALLENGE_SIZE {
            return Err(WebauthnError::arg_range(format!(
                "challengeSize must be >= {MIN_CHALLENGE_SIZE}, got: {}",
                cfg.challenge_size
            )));
        }

        if cfg.crypto_params.is_empty() {
            return Err(WebauthnError::arg_range(
                "cryptoParams must be a non-empty list of COSE algorithm identifiers",
            ));
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = RelyingPartyConfig::builder().build().unwrap();
        assert_eq!(cfg.timeout_ms, 60_000);
        assert_eq!(cfg.rp_name, "Anonymous Service");
        assert_eq!(cfg.challenge_size, 64);
        assert_eq!(cfg.attestation.as_str(), "direct");
        assert_eq!(cfg.crypto_params, vec![-7, -257]);
    }

    #[rstest]
    #[case::just_below_minimum(31)]
    #[case::zero(0)]
    #[case::far_below(4)]
    fn rejects_challenge_size_below_minimum(#[case] size: usize) {
        let err = RelyingPartyConfig::builder()
            .challenge_size(size)
            .build()
            .unwrap_err();
        assert_matches!(err.kind(), crate::error::ErrorKind::ArgRange);
    }

    #[rstest]
    #[case::exactly_minimum(32)]
    #[case::above_minimum(64)]
    #[case::well_above(256)]
    fn accepts_challenge_size_at_or_above_minimum(#[case] size: usize) {
        let cfg = RelyingPartyConfig::builder()
            .challenge_size(size)
            .build()
            .unwrap();
        assert_eq!(cfg.challenge_size, size);
    }

    #[test]
    fn rejects_empty_crypto_params() {
        let err = RelyingPartyConfig::builder()
            .crypto_params(vec![])
            .build()
            .unwrap_err();
        assert_matches!(err.kind(), crate::error::ErrorKind::ArgRange);
    }

    #[test]
    fn rejects_unknown_attestation_string() {
        let err = RelyingPartyConfigBuilder::default()
            .attestation_str("bogus")
            .unwrap_err();
        assert_matches!(err.kind(), crate::error::ErrorKind::ArgType);
    }
}
