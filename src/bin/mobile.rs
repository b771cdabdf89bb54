//! Demo mobile binary: drives the [`central`](intercom_engine::central) finite-state
//! machine through a full Variant A handshake against an in-process
//! [`PeripheralEngine`](intercom_engine::engine::PeripheralEngine), since the live BLE
//! transport is an external collaborator (spec §1). Useful for exercising the protocol
//! engine end to end without hardware.

use ed25519_dalek::{Signer, SigningKey};
use intercom_engine::actuator::FakeActuator;
use intercom_engine::central::{self, Action, CentralEvent, CentralState};
use intercom_engine::config::IntercomConfig;
use intercom_engine::credential::{AllowAll, CredentialA};
use intercom_engine::crypto;
use intercom_engine::engine::PeripheralEngine;
use intercom_engine::frame::VariantAAuthFrame;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

fn main() {
    env_logger::init();

    let signing_key = SigningKey::from_bytes(&[5u8; 32]);
    let signer_pub_key = signing_key.verifying_key().to_bytes();

    let config = IntercomConfig::from_toml_str(
        r#"
        door_id = "front-door"

        [variant_b_key_mode]
        type = "master_key"
        master_key_hex = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        "#,
    )
    .unwrap();

    let mut engine =
        PeripheralEngine::new(config, signer_pub_key, FakeActuator::default()).expect("engine init");

    let mut state = CentralState::Idle;
    let (next, actions) = central::transition(state, CentralEvent::Start);
    state = next;
    for action in &actions {
        log::info!("action: {:?}", action);
    }

    let (next, _) = central::transition(state, CentralEvent::Connected);
    state = next;
    engine.on_connect(1, 512, Instant::now()).expect("peripheral accepts connection");

    let (next, _) = central::transition(state, CentralEvent::ServiceDiscovered);
    state = next;

    let (next, _) = central::transition(state, CentralEvent::Subscribed);
    state = next;

    let nonce_c = engine.on_subscribe_or_read().expect("nonce published");
    let pub_i = engine.pub_i();

    let (next, actions) = central::transition(state, CentralEvent::Notification(nonce_c.to_vec()));
    state = next;
    assert!(matches!(state, CentralState::Authenticating));
    assert!(actions.iter().any(|a| matches!(a, Action::SendAuth { .. })));

    let (priv_m, pub_m) = crypto::ecdh_keygen().expect("mobile ECDH key");
    let shared = crypto::ecdh_p256(&priv_m, &pub_i).expect("ECDH agreement");
    let k_m2i = {
        let bytes = crypto::hkdf_sha256(&shared, &nonce_c, b"m2i-enc", 32).unwrap();
        let mut k = [0u8; 32];
        k.copy_from_slice(&bytes);
        k
    };
    let k_i2m = {
        let bytes = crypto::hkdf_sha256(&shared, &nonce_c, b"i2m-enc", 32).unwrap();
        let mut k = [0u8; 32];
        k.copy_from_slice(&bytes);
        k
    };

    let mut door_id = [0u8; 16];
    door_id[.."front-door".len()].copy_from_slice(b"front-door");
    let mut credential = CredentialA {
        credential_id: [1; 16],
        device_pub_key: pub_m,
        door_id,
        not_before: 0,
        not_after: SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 3600,
        grace_period: 30,
        revocation_ref: [0; 16],
        signature: [0; 64],
    };
    let sig = signing_key.sign(&credential.canonical_bytes());
    credential.signature = sig.to_bytes();
    let mut payload = credential.canonical_bytes().to_vec();
    payload.extend_from_slice(&credential.signature);

    let nonce_m = [0x10u8; 12];
    let sealed = crypto::aes_gcm_encrypt(&k_m2i, nonce_m, &[0x01], &payload).expect("seal credential");
    let tag_start = sealed.len() - 16;
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&sealed[tag_start..]);
    let auth_frame = VariantAAuthFrame {
        version: 1,
        pub_m,
        nonce_m,
        ciphertext: sealed[..tag_start].to_vec(),
        tag,
    };

    let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let (response, status) = engine
        .on_write_variant_a_auth(&auth_frame, &AllowAll, Instant::now(), now_unix)
        .expect("peripheral processes the auth frame");

    // Before advancing past authentication, verify the response actually decrypts under the
    // negotiated K_i2m rather than accepting it unconditionally (spec §4.6: "On any timeout
    // or mismatched nonce, disconnect and return an error").
    let mut response_ct_and_tag = response.ciphertext.clone();
    response_ct_and_tag.extend_from_slice(&response.tag);
    let response_verified =
        crypto::aes_gcm_decrypt(&k_i2m, response.nonce_i, &[0x01], &response_ct_and_tag).is_ok();

    let (next, _) = central::transition(state, CentralEvent::AuthResponseVerified(response_verified));
    state = next;
    if !response_verified {
        log::warn!("auth response failed to verify; disconnecting");
        println!("status=verification-failed");
        return;
    }
    let (next, actions) = central::transition(state, CentralEvent::IndicationAck);
    state = next;

    log::info!("final central state: {:?}", state);
    println!("status={:?}", status);
    for action in actions {
        log::info!("action: {:?}", action);
    }

    // Variant B and the Symmetric-Key Variant run over the same engine, demonstrated here
    // end to end rather than only in unit tests.
    let duid = [1, 2, 3, 4, 5, 6, 7, 8];
    let ra = [0x22u8; 16];
    let (ra_prime, rb) = engine.on_variant_b_auth_req(duid, ra).expect("variant B auth req");
    let master_key = [0xaau8; 16];
    let device_key = crypto::diversify_key(&master_key, &duid);
    assert_eq!(ra_prime, crypto::aes_ecb_encrypt(&device_key, &ra));
    let rb_prime = crypto::aes_ecb_encrypt(&device_key, &rb);
    engine.on_variant_b_auth_rsp(rb_prime).expect("variant B mutual auth");
    log::info!("variant B mutual authentication complete");

    let symmetric_device_key = [0x33u8; 16];
    let symmetric_nonce_m = [0x44u8; 16];
    let (echoed, _nonce_r) = engine
        .on_symmetric_round(&symmetric_device_key, &symmetric_nonce_m)
        .expect("symmetric round");
    let symmetric_verified = echoed == crypto::aes_ecb_encrypt(&symmetric_device_key, &symmetric_nonce_m);
    log::info!("symmetric-key nonce verification: {}", symmetric_verified);
}
