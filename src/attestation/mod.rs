//! Process-wide attestation-format registry.
//!
//! A pluggable `fmt -> (parseFn, validateFn)` table realized as a
//! process-wide `OnceLock<RwLock<...>>`, so registration completes before
//! the first request and readers always observe a consistent snapshot.

pub mod android_safetynet;
pub mod fido_u2f;
pub mod none;
pub mod packed;
pub mod tpm;

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use ciborium::Value;

use crate::audit::AuditContext;
use crate::error::{Result, WebauthnError};

/// A format's parse step: takes the raw `attStmt` CBOR map, returns a
/// parsed representation that must itself be a CBOR map (failing with
/// `PROTOCOL_ERROR: "<fmt> parseFn did not return a Map"` otherwise).
pub type ParseFn = Box<dyn Fn(&[(Value, Value)]) -> Result<Value> + Send + Sync>;

/// A format's validate step: runs with the in-progress audit context and
/// the parsed `attStmt`, returning `Ok(true)` (or failing) — never `Ok(false)`,
/// since a format that cannot validate must fail with a specific error
/// kind rather than a bare boolean.
pub type ValidateFn =
    Box<dyn Fn(&AuditContext<'_>, &Value) -> Result<bool> + Send + Sync>;

struct FormatEntry {
    parse: ParseFn,
    validate: ValidateFn,
}

static REGISTRY: OnceLock<RwLock<HashMap<String, FormatEntry>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, FormatEntry>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a format's parse/validate pair. Fails with `DUPLICATE` if
/// `fmt` is already registered.
pub fn add(fmt: impl Into<String>, parse: ParseFn, validate: ValidateFn) -> Result<()> {
    let fmt = fmt.into();
    if fmt.is_empty() {
        return Err(WebauthnError::arg_type("fmt to be a non-empty string", ""));
    }
    let mut reg = registry()
        .write()
        .expect("attestation format registry lock poisoned");
    if reg.contains_key(&fmt) {
        return Err(WebauthnError::Duplicate(format!(
            "attestation format already registered: {fmt}"
        )));
    }
    reg.insert(fmt, FormatEntry { parse, validate });
    Ok(())
}

/// Empties the registry. Used by tests and by callers that want to
/// re-register a custom set of formats from scratch.
pub fn delete_all() {
    registry()
        .write()
        .expect("attestation format registry lock poisoned")
        .clear();
}

/// Invokes the registered parser for `fmt`. Fails with `PROTOCOL_ERROR` if
/// `fmt` is unregistered or the parser's return value is not a CBOR map.
pub fn parse(fmt: &str, att_stmt: &[(Value, Value)]) -> Result<Value> {
    let reg = registry()
        .read()
        .expect("attestation format registry lock poisoned");
    let entry = reg
        .get(fmt)
        .ok_or_else(|| WebauthnError::protocol_error(format!("unknown attestation format: {fmt}")))?;
    let parsed = (entry.parse)(att_stmt)?;
    if parsed.as_map().is_none() {
        return Err(WebauthnError::protocol_error(format!(
            "{fmt} parseFn did not return a Map"
        )));
    }
    Ok(parsed)
}

/// Invokes the registered validator for `fmt` with the in-progress audit
/// context and the parsed `attStmt`. Fails with `PROTOCOL_ERROR` if `fmt`
/// is unregistered or the validator does not return `true`.
pub fn validate(fmt: &str, ctx: &AuditContext<'_>, parsed: &Value) -> Result<()> {
    let reg = registry()
        .read()
        .expect("attestation format registry lock poisoned");
    let entry = reg
        .get(fmt)
        .ok_or_else(|| WebauthnError::protocol_error(format!("unknown attestation format: {fmt}")))?;
    let ok = (entry.validate)(ctx, parsed)?;
    if !ok {
        return Err(WebauthnError::protocol_error(format!(
            "{fmt} validateFn did not return 'true'"
        )));
    }
    Ok(())
}

/// Registers the five built-in formats (`none`, `fido-u2f`, `packed`,
/// `tpm`, `android-safetynet`) if they are not already present. Idempotent:
/// unlike [`add`], repeated calls are not an error.
pub fn register_builtins() {
    let already = registry()
        .read()
        .expect("attestation format registry lock poisoned")
        .contains_key("none");
    if already {
        return;
    }
    // Ignore DUPLICATE races from concurrent callers; the loser's
    // registration is a no-op since the winner already installed the
    // same behavior.
    let _ = add("none", none::parse_fn(), none::validate_fn());
    let _ = add("fido-u2f", fido_u2f::parse_fn(), fido_u2f::validate_fn());
    let _ = add("packed", packed::parse_fn(), packed::validate_fn());
    let _ = add("tpm", tpm::parse_fn(), tpm::validate_fn());
    let _ = add(
        "android-safetynet",
        android_safetynet::parse_fn(),
        android_safetynet::validate_fn(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_with(fmt: &str) {
        delete_all();
        add(
            fmt,
            Box::new(|_| Ok(Value::Map(vec![]))),
            Box::new(|_, _| Ok(true)),
        )
        .unwrap();
    }

    #[test]
    fn registry_rejects_duplicate_fmt() {
        reset_with("test-fmt");
        let err = add(
            "test-fmt",
            Box::new(|_| Ok(Value::Map(vec![]))),
            Box::new(|_, _| Ok(true)),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Duplicate);
    }

    #[test]
    fn parse_reports_non_map_return() {
        delete_all();
        add(
            "bad-fmt",
            Box::new(|_| Ok(Value::Text("oops".into()))),
            Box::new(|_, _| Ok(true)),
        )
        .unwrap();
        let err = parse("bad-fmt", &[]).unwrap_err();
        match err {
            WebauthnError::ProtocolError(msg) => {
                assert_eq!(msg, "bad-fmt parseFn did not return a Map");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn delete_all_empties_registry() {
        reset_with("temp-fmt");
        delete_all();
        let err = parse("temp-fmt", &[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ProtocolError);
    }
}
