//! CBOR decoding helpers (RFC 7049 subset: map, array, byte string, text
//! string, unsigned, negative, simple) built on `ciborium`.
//!
//! The accessor functions below are small `find_*`/`require_*` helpers
//! that work over any CBOR map rather than being specialized to a single
//! attestation format's `attStmt` shape.

use ciborium::Value;

use crate::error::{Result, WebauthnError};

/// Decodes a byte slice as a single CBOR value.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    ciborium::from_reader(bytes)
        .map_err(|e| WebauthnError::parse_error(format!("invalid CBOR: {e}")))
}

/// Decodes a CBOR value from the front of `bytes`, returning the value and
/// the remaining unconsumed bytes. Used where a structure's trailing region
/// (e.g. the COSE public key embedded in authenticator data) is only
/// delimited by "however many bytes the CBOR decoder consumes".
pub fn decode_prefix(bytes: &[u8]) -> Result<(Value, &[u8])> {
    let mut cursor = std::io::Cursor::new(bytes);
    let value: Value = ciborium::from_reader(&mut cursor)
        .map_err(|e| WebauthnError::parse_error(format!("invalid CBOR: {e}")))?;
    let consumed = cursor.position() as usize;
    Ok((value, &bytes[consumed..]))
}

pub fn as_map(value: &Value) -> Result<&Vec<(Value, Value)>> {
    value
        .as_map()
        .ok_or_else(|| WebauthnError::parse_error("expected CBOR map"))
}

pub fn find<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

pub fn find_text<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a str> {
    find(map, key).and_then(Value::as_text)
}

pub fn find_bytes<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a [u8]> {
    find(map, key).and_then(Value::as_bytes).map(Vec::as_slice)
}

pub fn find_map<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Vec<(Value, Value)>> {
    find(map, key).and_then(Value::as_map)
}

pub fn find_array<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Vec<Value>> {
    find(map, key).and_then(Value::as_array)
}

pub fn find_int(map: &[(Value, Value)], key: &str) -> Option<i128> {
    find(map, key).and_then(Value::as_integer).map(i128::from)
}

pub fn require_text<'a>(map: &'a [(Value, Value)], key: &'static str) -> Result<&'a str> {
    find_text(map, key).ok_or_else(|| WebauthnError::arg_missing(key))
}

pub fn require_bytes<'a>(map: &'a [(Value, Value)], key: &'static str) -> Result<&'a [u8]> {
    find_bytes(map, key).ok_or_else(|| WebauthnError::arg_missing(key))
}

pub fn require_map<'a>(
    map: &'a [(Value, Value)],
    key: &'static str,
) -> Result<&'a Vec<(Value, Value)>> {
    find_map(map, key).ok_or_else(|| WebauthnError::arg_missing(key))
}

/// Reads `key` as an array of byte strings (e.g. an `x5c` certificate
/// chain), failing with `ArgMissing`/`ParseError` rather than silently
/// skipping non-byte-string entries.
pub fn require_array_bytes(map: &[(Value, Value)], key: &'static str) -> Result<Vec<Vec<u8>>> {
    find_array(map, key)
        .ok_or_else(|| WebauthnError::arg_missing(key))?
        .iter()
        .map(|v| {
            v.as_bytes()
                .cloned()
                .ok_or_else(|| WebauthnError::parse_error(format!("{key}[] entry is not a byte string")))
        })
        .collect()
}
