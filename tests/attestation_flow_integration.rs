//! End-to-end registration/authentication flows through the public API.
//!
//! Builds real attestation/assertion responses with actual ECDSA P-256
//! signatures rather than stubbing out the crypto.

use ciborium::Value;
use p256::ecdsa::{signature::Signer, Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use pkcs8::EncodePublicKey;

use webauthn_rp::{AssertionResponse, AttestationResponse};

const FLAG_UP: u8 = 0b0000_0001;
const FLAG_UV: u8 = 0b0000_0100;
const FLAG_AT: u8 = 0b0100_0000;

fn authenticator_data_header(rp_id_hash: [u8; 32], flags: u8, counter: u32) -> Vec<u8> {
    let mut v = rp_id_hash.to_vec();
    v.push(flags);
    v.extend_from_slice(&counter.to_be_bytes());
    v
}

fn cose_key_bytes(vk: &VerifyingKey) -> Vec<u8> {
    let point = vk.to_encoded_point(false);
    let cose = coset::CoseKeyBuilder::new_ec2_pub_key(
        coset::iana::EllipticCurve::P_256,
        point.x().unwrap().to_vec(),
        point.y().unwrap().to_vec(),
    )
    .algorithm(coset::iana::Algorithm::ES256)
    .build();
    use coset::CborSerializable;
    cose.to_vec().unwrap()
}

fn client_data_json(ty: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    serde_json::json!({
        "type": ty,
        "challenge": webauthn_rp::b64::encode(challenge),
        "origin": origin,
    })
    .to_string()
    .into_bytes()
}

fn none_attestation_object(auth_data: &[u8]) -> Vec<u8> {
    let value = Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text("none".into())),
        (
            Value::Text("authData".into()),
            Value::Bytes(auth_data.to_vec()),
        ),
        (Value::Text("attStmt".into()), Value::Map(vec![])),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&value, &mut buf).unwrap();
    buf
}

/// A full registration followed by a full authentication against the
/// credential it produced, mirroring a real relying party's two-ceremony
/// flow rather than exercising each in isolation.
#[test]
fn registration_then_assertion_round_trip() {
    webauthn_rp::attestation::register_builtins();

    let rp = webauthn_rp::RelyingParty::new(
        webauthn_rp::RelyingPartyConfig::builder()
            .rp_id("example.com")
            .build()
            .unwrap(),
    );
    let origin = "https://example.com";
    let rp_id_hash = webauthn_rp::crypto::sha256(b"example.com");

    let sk = SigningKey::from_bytes(&[7u8; 32].into()).unwrap();
    let vk = VerifyingKey::from(&sk);
    let cred_id = vec![0xC0, 0xDE, 0xCA, 0xFE];

    // --- registration ---
    let reg_opts = rp.attestation_options(webauthn_rp::OptionsRequest::default());
    let reg_client_data = client_data_json("webauthn.create", &reg_opts.challenge, origin);

    let mut auth_data = authenticator_data_header(rp_id_hash, FLAG_UP | FLAG_UV | FLAG_AT, 1);
    auth_data.extend_from_slice(&[0x11; 16]); // aaguid
    auth_data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
    auth_data.extend_from_slice(&cred_id);
    auth_data.extend_from_slice(&cose_key_bytes(&vk));

    let attestation_response = AttestationResponse {
        raw_id: cred_id.clone(),
        client_data_json: reg_client_data.clone(),
        attestation_object: none_attestation_object(&auth_data),
    };
    let reg_client_data_parsed = webauthn_rp::client_data::ClientData::parse(reg_client_data).unwrap();
    let reg_expectations = serde_json::json!({
        "origin": origin,
        "challenge": reg_client_data_parsed.challenge,
        "factor": "either",
        "rpId": "example.com",
    });
    let attestation_result = rp
        .attestation_result(attestation_response, &reg_expectations)
        .unwrap();
    assert_eq!(attestation_result.fmt, "none");
    assert_eq!(attestation_result.raw_id, cred_id);

    // --- authentication ---
    let pem = p256::PublicKey::from(vk)
        .to_public_key_pem(pkcs8::LineEnding::LF)
        .unwrap();

    let assert_opts = rp.assertion_options(webauthn_rp::OptionsRequest::default());
    let assert_client_data = client_data_json("webauthn.get", &assert_opts.challenge, origin);
    let client_data_hash = webauthn_rp::crypto::sha256(&assert_client_data);

    let assert_auth_data = authenticator_data_header(rp_id_hash, FLAG_UP | FLAG_UV, 2);
    let mut signed_message = assert_auth_data.clone();
    signed_message.extend_from_slice(&client_data_hash);
    let sig: Signature = sk.sign(&signed_message);

    let assert_client_data_parsed =
        webauthn_rp::client_data::ClientData::parse(assert_client_data.clone()).unwrap();
    let assert_expectations = serde_json::json!({
        "origin": origin,
        "challenge": assert_client_data_parsed.challenge,
        "factor": "either",
        "rpId": "example.com",
        "publicKey": pem,
        "prevCounter": 1,
        "userHandle": null,
    });

    let assertion_response = AssertionResponse {
        raw_id: cred_id.clone(),
        client_data_json: assert_client_data,
        authenticator_data: assert_auth_data,
        signature: sig.to_der().as_bytes().to_vec(),
        user_handle: None,
    };

    let assertion_result = rp
        .assertion_result(assertion_response, &assert_expectations)
        .unwrap();
    assert_eq!(assertion_result.raw_id, cred_id);
    assert_eq!(assertion_result.authnr_data.counter, 2);
}

/// A stale signature counter (replay of an earlier assertion) must be
/// rejected rather than silently accepted.
#[test]
fn assertion_rejects_non_advancing_counter() {
    webauthn_rp::attestation::register_builtins();

    let origin = "https://example.com";
    let rp_id_hash = webauthn_rp::crypto::sha256(b"example.com");
    let sk = SigningKey::from_bytes(&[8u8; 32].into()).unwrap();
    let vk = VerifyingKey::from(&sk);
    let pem = p256::PublicKey::from(vk)
        .to_public_key_pem(pkcs8::LineEnding::LF)
        .unwrap();

    let client_data = client_data_json("webauthn.get", b"replayed-challenge-bytes-32-long", origin);
    let client_data_hash = webauthn_rp::crypto::sha256(&client_data);
    let auth_data = authenticator_data_header(rp_id_hash, FLAG_UP | FLAG_UV, 5);
    let mut signed_message = auth_data.clone();
    signed_message.extend_from_slice(&client_data_hash);
    let sig: Signature = sk.sign(&signed_message);

    let client_data_parsed = webauthn_rp::client_data::ClientData::parse(client_data.clone()).unwrap();
    let expectations = serde_json::json!({
        "origin": origin,
        "challenge": client_data_parsed.challenge,
        "factor": "either",
        "rpId": "example.com",
        "publicKey": pem,
        "prevCounter": 5,
        "userHandle": null,
    });

    let response = AssertionResponse {
        raw_id: vec![1],
        client_data_json: client_data,
        authenticator_data: auth_data,
        signature: sig.to_der().as_bytes().to_vec(),
        user_handle: None,
    };

    let err = webauthn_rp::AssertionResult::verify(response, &expectations).unwrap_err();
    assert_eq!(err.kind(), webauthn_rp::ErrorKind::ProtocolError);
}

/// A misbehaving format plugin that returns `Ok(false)` from its
/// `validateFn` surfaces as `PROTOCOL_ERROR`, per the registry contract.
#[test]
fn misbehaving_plugin_validate_fn_is_protocol_error() {
    webauthn_rp::attestation::delete_all();
    webauthn_rp::attestation::add(
        "broken-fmt",
        Box::new(|_| Ok(Value::Map(vec![]))),
        Box::new(|_, _| Ok(false)),
    )
    .unwrap();

    let origin = "https://example.com";
    let rp_id_hash = webauthn_rp::crypto::sha256(b"example.com");
    let auth_data = authenticator_data_header(rp_id_hash, FLAG_UP | FLAG_UV, 1);
    let client_data = client_data_json("webauthn.create", b"some-challenge-bytes-32-long!!!!", origin);
    let client_data_parsed = webauthn_rp::client_data::ClientData::parse(client_data.clone()).unwrap();

    let att_obj = {
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("broken-fmt".into())),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&value, &mut buf).unwrap();
        buf
    };

    let expectations = serde_json::json!({
        "origin": origin,
        "challenge": client_data_parsed.challenge,
        "factor": "either",
    });

    let response = AttestationResponse {
        raw_id: vec![],
        client_data_json: client_data,
        attestation_object: att_obj,
    };

    let err = webauthn_rp::AttestationResult::verify(response, &expectations).unwrap_err();
    assert_eq!(err.kind(), webauthn_rp::ErrorKind::ProtocolError);

    webauthn_rp::attestation::delete_all();
    webauthn_rp::attestation::register_builtins();
}
