//! Challenge generation.
//!
//! Draws challenge bytes from `rand::rngs::OsRng` via `RngCore::fill_bytes`,
//! at a configurable size, with an `extraData`-binding mode
//! (`challenge == SHA-256(rawChallenge || extraData)`, both values exposed
//! to the caller).

use rand::{rngs::OsRng, RngCore};

use crate::crypto;

/// The result of challenge generation: the (possibly hashed) `challenge`
/// value sent to the client, and — only in `extraData` mode — the
/// `rawChallenge` that was hashed to produce it.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub challenge: Vec<u8>,
    pub raw_challenge: Option<Vec<u8>>,
}

/// Generates a challenge of `size` random bytes. When `extra_data` is
/// supplied, the exposed `challenge` becomes `SHA-256(rawChallenge ||
/// extraData)` and the random bytes are retained as `raw_challenge` so the
/// caller can later reconstruct the binding.
pub fn generate(size: usize, extra_data: Option<&[u8]>) -> Challenge {
    let mut raw = vec![0u8; size];
    OsRng.fill_bytes(&mut raw);

    match extra_data {
        None => Challenge {
            challenge: raw,
            raw_challenge: None,
        },
        Some(extra) => {
            let mut buf = Vec::with_capacity(raw.len() + extra.len());
            buf.extend_from_slice(&raw);
            buf.extend_from_slice(extra);
            let hash = crypto::sha256(&buf).to_vec();
            Challenge {
                challenge: hash,
                raw_challenge: Some(raw),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_size_challenge_has_requested_length() {
        let c = generate(64, None);
        assert_eq!(c.challenge.len(), 64);
        assert!(c.raw_challenge.is_none());
    }

    #[test]
    fn extra_data_mode_exposes_both_values() {
        let c = generate(32, Some(b"extension-bytes"));
        assert_eq!(c.raw_challenge.as_ref().unwrap().len(), 32);
        let mut buf = c.raw_challenge.clone().unwrap();
        buf.extend_from_slice(b"extension-bytes");
        assert_eq!(c.challenge, crypto::sha256(&buf).to_vec());
    }

    #[test]
    fn two_calls_are_not_equal() {
        let a = generate(32, None);
        let b = generate(32, None);
        assert_ne!(a.challenge, b.challenge);
    }
}
