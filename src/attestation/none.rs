//! The `none` attestation format: no attestation statement, no signature,
//! no certificates. Used when the authenticator/platform declines to
//! provide attestation.

use ciborium::Value;

use super::{ParseFn, ValidateFn};

pub fn parse_fn() -> ParseFn {
    Box::new(|_att_stmt| Ok(Value::Map(vec![])))
}

pub fn validate_fn() -> ValidateFn {
    Box::new(|_ctx, _parsed| Ok(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation;

    #[test]
    fn parses_to_empty_map_and_validates_unconditionally() {
        attestation::delete_all();
        attestation::add("none", parse_fn(), validate_fn()).unwrap();
        let parsed = attestation::parse("none", &[]).unwrap();
        assert_eq!(parsed.as_map().unwrap().len(), 0);
    }
}
