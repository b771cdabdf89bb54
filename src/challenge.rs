//! Challenge Engine (spec §4.4): orchestrates the authentication round-trip for all three
//! protocol flows. Dispatch follows the tagged-sum pattern from Design Notes §9 — a single
//! `Variant` enum, one `handle_auth` per concrete flow, matching the teacher's
//! `sm::responder::process_command` dispatch-by-command-type style.

use crate::credential::{self, PermissionPolicy, RevocationList};
use crate::crypto;
use crate::error::{DoorState, ErrorKind, Result, StatusCode};
use crate::frame::{VariantAAuthFrame, VariantAResponseFrame};
use crate::rate_limit::RateLimiter;
use crate::session::Session;
use std::collections::HashMap;
use std::time::Instant;

/// A tagged sum over the three protocol flows (Design Notes §9).
pub enum Variant<'a> {
    EcdhGcm {
        signer_pub_key: [u8; 32],
        configured_door_ids: &'a [&'a str],
        revocation_list: &'a RevocationList,
        policy: &'a dyn PermissionPolicy,
    },
    DiversifiedCbc {
        key_provider: &'a dyn VariantBKeyProvider,
    },
    SymmetricDemo {
        master_key: &'a [u8; 32],
    },
}

/// Supplies a device's diversified key for Variant B (Open Question in spec §9: reader-side
/// key architecture is a deployment decision).
pub trait VariantBKeyProvider {
    fn device_key(&self, duid: &[u8; 8]) -> Option<[u8; 16]>;
}

pub struct MasterKeyProvider {
    pub master_key: [u8; 16],
}

impl VariantBKeyProvider for MasterKeyProvider {
    fn device_key(&self, duid: &[u8; 8]) -> Option<[u8; 16]> {
        Some(crypto::diversify_key(&self.master_key, duid))
    }
}

pub struct PreProvisionedKeyProvider {
    pub keys: HashMap<[u8; 8], [u8; 16]>,
}

impl VariantBKeyProvider for PreProvisionedKeyProvider {
    fn device_key(&self, duid: &[u8; 8]) -> Option<[u8; 16]> {
        self.keys.get(duid).copied()
    }
}

/// Derives the Symmetric-Key Variant's per-device key via HKDF (spec §4.4: "derives DK from
/// DeviceID via HKDF-SHA-256").
pub fn derive_symmetric_device_key(master: &[u8; 32], device_id: &[u8]) -> Result<[u8; 16]> {
    let okm = crypto::hkdf_sha256(master, device_id, b"device-key", 16)?;
    let mut dk = [0u8; 16];
    dk.copy_from_slice(&okm);
    Ok(dk)
}

/// Outcome of handling a Variant A Auth write.
#[derive(Debug)]
pub struct VariantAOutcome {
    pub response: VariantAResponseFrame,
    pub status: StatusCode,
    pub grant: Option<credential::Grant>,
}

const AAD_VERSION: [u8; 1] = [0x01];

/// Seals a status/door-state pair under the session's `K_i2m` (spec §7: every Variant A
/// response, success or failure, rides the wire AEAD-sealed under the negotiated key).
/// Shared by the happy path above and by the engine's post-unlock Jammed override, since
/// both need to produce a fresh, independently nonced encrypted response.
pub fn seal_variant_a_response(
    k_i2m: &[u8; 32],
    status: StatusCode,
    door_state: DoorState,
) -> Result<VariantAResponseFrame> {
    let mut response_plain = vec![status.to_byte(), door_state.to_byte()];
    let mut nonce_i = [0u8; 12];
    crypto::random_bytes(&mut nonce_i)?;
    let sealed = crypto::aes_gcm_encrypt(k_i2m, nonce_i, &AAD_VERSION, &response_plain)?;
    crypto::zeroize(&mut response_plain);
    let tag_start = sealed.len() - 16;
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&sealed[tag_start..]);
    Ok(VariantAResponseFrame {
        nonce_i,
        ciphertext: sealed[..tag_start].to_vec(),
        tag,
    })
}

/// Handles a single Variant A Auth frame end to end (spec §4.4 steps 1-9).
#[allow(clippy::too_many_arguments)]
pub fn handle_variant_a_auth(
    session: &mut Session,
    identity_private: &p256::SecretKey,
    auth_frame: &VariantAAuthFrame,
    signer_pub_key: &[u8; 32],
    configured_door_ids: &[&str],
    revocation_list: &RevocationList,
    policy: &dyn PermissionPolicy,
    rate_limiter: &mut RateLimiter,
    now_instant: Instant,
    now_unix: u64,
) -> Result<VariantAOutcome> {
    // Step 1: preconditions.
    if session.phase != crate::session::Phase::NonceIssued {
        return Err(ErrorKind::InvalidState);
    }

    // Step 2: PubM must be a valid point before any crypto runs.
    if crypto::validate_pub_key(&auth_frame.pub_m).is_err() {
        return Err(ErrorKind::InvalidPoint);
    }

    // The nonce's 30s lifetime is enforced before any expensive work (§8 "Nonce lifetime
    // bound"; scenario 3, challenge timeout).
    let nonce_c = session.check_nonce_live(now_instant)?;

    // Step 3: rate limiting, before any expensive crypto. Pre-crypto rejections may
    // preserve the nonce (§4.4 step 3).
    if !rate_limiter.check(&auth_frame.pub_m, now_instant) {
        rate_limiter.record_attempt(&auth_frame.pub_m, now_instant);
        return Err(ErrorKind::RateLimited);
    }

    // From here on, every path is a "verified (tag-passed) or decrypted" attempt; record it
    // and invalidate the nonce regardless of outcome (§4.4 step 3, §7).
    let outcome = (|| -> Result<VariantAOutcome> {
        // Step 4: ECDH.
        session.take_ecdh_private()?;
        let shared = crypto::ecdh_p256(identity_private, &auth_frame.pub_m)?;

        // Step 5: HKDF key derivation, salted with N_c.
        let k_m2i_bytes = crypto::hkdf_sha256(&shared, &nonce_c, b"m2i-enc", 32)?;
        let k_i2m_bytes = crypto::hkdf_sha256(&shared, &nonce_c, b"i2m-enc", 32)?;
        let mut k_m2i = [0u8; 32];
        k_m2i.copy_from_slice(&k_m2i_bytes);
        let mut k_i2m = [0u8; 32];
        k_i2m.copy_from_slice(&k_i2m_bytes);

        // Step 6: decrypt the payload.
        let mut ciphertext_and_tag = auth_frame.ciphertext.clone();
        ciphertext_and_tag.extend_from_slice(&auth_frame.tag);
        let plaintext = crypto::aes_gcm_decrypt(
            &k_m2i,
            auth_frame.nonce_m,
            &AAD_VERSION,
            &ciphertext_and_tag,
        )?;

        session.peer_pubkey = Some(auth_frame.pub_m);
        session.negotiated_keys = Some(crate::session::NegotiatedKeys::EcdhGcm { k_m2i, k_i2m });

        // Step 7/8: validate the credential.
        let verdict = credential::verify(
            &plaintext,
            &auth_frame.pub_m,
            signer_pub_key,
            configured_door_ids,
            revocation_list,
            policy,
            now_unix,
        );

        let (status, door_state, grant) = match verdict {
            Ok(grant) => (StatusCode::Success, DoorState::Unlocked, Some(grant)),
            Err(kind) => (StatusCode::from(kind), DoorState::Unknown, None),
        };

        let response = seal_variant_a_response(&k_i2m, status, door_state)?;

        Ok(VariantAOutcome {
            response,
            status,
            grant,
        })
    })();

    rate_limiter.record_attempt(&auth_frame.pub_m, now_instant);
    session.invalidate_nonce();
    session.phase = crate::session::Phase::Done;

    outcome
}

/// Variant B's five peripheral-side states (spec §4.4): `central_challenge ->
/// authenticated -> mutual_auth -> transfer -> done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantBState {
    CentralChallenge,
    Authenticated,
    MutualAuth,
    Transfer,
    Done,
}

pub struct VariantBSession {
    pub state: VariantBState,
    pub duid: [u8; 8],
    pub device_key: [u8; 16],
    rb: Option<[u8; 16]>,
}

impl VariantBSession {
    /// Step 1: peer sends `DUID + AUTH_REQ(Ra)`.
    pub fn on_auth_req(
        duid: [u8; 8],
        ra: [u8; 16],
        key_provider: &dyn VariantBKeyProvider,
    ) -> Result<(Self, [u8; 16], [u8; 16])> {
        let device_key = key_provider.device_key(&duid).ok_or(ErrorKind::UnknownDevice)?;
        let ra_prime = crypto::aes_ecb_encrypt(&device_key, &ra);
        let mut rb = [0u8; 16];
        crypto::random_bytes(&mut rb)?;
        let session = VariantBSession {
            state: VariantBState::Authenticated,
            duid,
            device_key,
            rb: Some(rb),
        };
        Ok((session, ra_prime, rb))
    }

    /// Duplicate AUTH_REQUEST within the same session: `InvalidState`, close (§4.4 tie-break).
    pub fn reject_duplicate_auth_req(&self) -> Result<()> {
        if self.state != VariantBState::CentralChallenge {
            Err(ErrorKind::InvalidState)
        } else {
            Ok(())
        }
    }

    /// Step 4: verify `Rb' == AES-ECB(K, Rb)`, proving the mobile has K.
    pub fn on_auth_rsp(&mut self, rb_prime: [u8; 16]) -> Result<()> {
        let rb = self.rb.take().ok_or(ErrorKind::InvalidState)?;
        let expected = crypto::aes_ecb_encrypt(&self.device_key, &rb);
        if expected != rb_prime {
            self.state = VariantBState::Done;
            return Err(ErrorKind::AuthFailed);
        }
        self.state = VariantBState::Transfer;
        Ok(())
    }
}

/// The Symmetric-Key Variant's simpler single-round echo flow (spec §4.4).
pub fn handle_symmetric_round(
    device_key: &[u8; 16],
    nonce_m: &[u8; 16],
) -> Result<([u8; 16], [u8; 16])> {
    let echoed = crypto::aes_ecb_encrypt(device_key, nonce_m);
    let mut nonce_r = [0u8; 16];
    crypto::random_bytes(&mut nonce_r)?;
    Ok((echoed, nonce_r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;
    use ed25519_dalek::SigningKey;

    fn setup_session() -> (SessionManager, [u8; 65]) {
        let mut mgr = SessionManager::new(std::time::Duration::from_secs(30)).unwrap();
        let now = Instant::now();
        mgr.on_connect(1, 512, now).unwrap();
        let pub_i = mgr.pub_i();
        (mgr, pub_i)
    }

    fn signed_credential_bytes(
        signing_key: &SigningKey,
        pub_m: &[u8; 65],
        door_id: &str,
        not_before: u64,
        not_after: u64,
    ) -> Vec<u8> {
        use ed25519_dalek::Signer;
        let mut door_id_bytes = [0u8; 16];
        door_id_bytes[..door_id.len()].copy_from_slice(door_id.as_bytes());
        let mut credential = crate::credential::CredentialA {
            credential_id: [1; 16],
            device_pub_key: *pub_m,
            door_id: door_id_bytes,
            not_before,
            not_after,
            grace_period: 30,
            revocation_ref: [0; 16],
            signature: [0; 64],
        };
        let sig = signing_key.sign(&credential.canonical_bytes());
        credential.signature = sig.to_bytes();
        let mut out = credential.canonical_bytes().to_vec();
        out.extend_from_slice(&credential.signature);
        out
    }

    #[test]
    fn happy_path_variant_a_unlocks() {
        let (mut mgr, pub_i) = setup_session();
        let nonce_c = mgr.session().unwrap().current_nonce().unwrap();
        let signing_key = SigningKey::from_bytes(&[5u8; 32]);
        let signer_pub = signing_key.verifying_key().to_bytes();

        let (priv_m_holder, pub_m) = crypto::ecdh_keygen().unwrap();
        let shared = crypto::ecdh_p256(&priv_m_holder, &pub_i).unwrap();
        let k_m2i_bytes = crypto::hkdf_sha256(&shared, &nonce_c, b"m2i-enc", 32).unwrap();
        let mut k_m2i = [0u8; 32];
        k_m2i.copy_from_slice(&k_m2i_bytes);
        let credential_bytes = signed_credential_bytes(&signing_key, &pub_m, "front-door", 0, 10_000);
        let nonce_m = [0x10u8; 12];
        let sealed = crypto::aes_gcm_encrypt(&k_m2i, nonce_m, &AAD_VERSION, &credential_bytes).unwrap();
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

        let revocation_list = RevocationList::new();
        let mut rate_limiter = RateLimiter::new(5, std::time::Duration::from_secs(60), 100);
        let (session, identity_private) = mgr.session_mut_and_identity();
        let session = session.unwrap();
        let outcome = handle_variant_a_auth(
            session,
            identity_private,
            &auth_frame,
            &signer_pub,
            &["front-door"],
            &revocation_list,
            &crate::credential::AllowAll,
            &mut rate_limiter,
            Instant::now(),
            500,
        )
        .unwrap();
        assert_eq!(outcome.status, StatusCode::Success);
        assert!(outcome.grant.is_some());
        assert!(session.current_nonce().is_none());
    }

    #[test]
    fn tampered_pub_m_rejected_before_ecdh() {
        let (mut mgr, _pub_i) = setup_session();
        let signer_pub = [0u8; 32];
        let mut pub_m = [0u8; 65];
        pub_m[0] = 0x04;
        pub_m[1] = 0xFF;
        let auth_frame = VariantAAuthFrame {
            version: 1,
            pub_m,
            nonce_m: [0; 12],
            ciphertext: vec![0; 16],
            tag: [0; 16],
        };
        let revocation_list = RevocationList::new();
        let mut rate_limiter = RateLimiter::new(5, std::time::Duration::from_secs(60), 100);
        let (session, identity_private) = mgr.session_mut_and_identity();
        let session = session.unwrap();
        let err = handle_variant_a_auth(
            session,
            identity_private,
            &auth_frame,
            &signer_pub,
            &["front-door"],
            &revocation_list,
            &crate::credential::AllowAll,
            &mut rate_limiter,
            Instant::now(),
            500,
        )
        .unwrap_err();
        assert_eq!(err, ErrorKind::InvalidPoint);
        // `validate_pub_key` now does real curve-point validation (spec §4.4 step 2), so a
        // malformed point is rejected before the nonce is ever spent on a key agreement.
        assert!(session.current_nonce().is_some());
    }

    #[test]
    fn challenge_timeout_rejected() {
        let (mut mgr, pub_i) = setup_session();
        let signing_key = SigningKey::from_bytes(&[5u8; 32]);
        let signer_pub = signing_key.verifying_key().to_bytes();
        let nonce_c = mgr.session().unwrap().current_nonce().unwrap();
        let (priv_m, pub_m) = crypto::ecdh_keygen().unwrap();
        let shared = crypto::ecdh_p256(&priv_m, &pub_i).unwrap();
        let k_m2i_bytes = crypto::hkdf_sha256(&shared, &nonce_c, b"m2i-enc", 32).unwrap();
        let mut k_m2i = [0u8; 32];
        k_m2i.copy_from_slice(&k_m2i_bytes);
        let credential_bytes = signed_credential_bytes(&signing_key, &pub_m, "front-door", 0, 10_000);
        let nonce_m = [0x10u8; 12];
        let sealed = crypto::aes_gcm_encrypt(&k_m2i, nonce_m, &AAD_VERSION, &credential_bytes).unwrap();
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
        let revocation_list = RevocationList::new();
        let mut rate_limiter = RateLimiter::new(5, std::time::Duration::from_secs(60), 100);
        let (session, identity_private) = mgr.session_mut_and_identity();
        let session = session.unwrap();
        let later = Instant::now() + std::time::Duration::from_secs(31);
        let err = handle_variant_a_auth(
            session,
            identity_private,
            &auth_frame,
            &signer_pub,
            &["front-door"],
            &revocation_list,
            &crate::credential::AllowAll,
            &mut rate_limiter,
            later,
            500,
        )
        .unwrap_err();
        assert_eq!(err, ErrorKind::ChallengeExpired);
    }

    #[test]
    fn variant_b_mutual_auth_vector() {
        let duid = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let master_key = [0xAAu8; 16];
        let provider = MasterKeyProvider { master_key };
        let ra: [u8; 16] = (0u8..16).collect::<Vec<_>>().try_into().unwrap();
        let (mut session, ra_prime, rb) = VariantBSession::on_auth_req(duid, ra, &provider).unwrap();
        let k = crypto::diversify_key(&master_key, &duid);
        assert_eq!(ra_prime, crypto::aes_ecb_encrypt(&k, &ra));

        let rb_prime = crypto::aes_ecb_encrypt(&k, &rb);
        session.on_auth_rsp(rb_prime).unwrap();
        assert_eq!(session.state, VariantBState::Transfer);
    }

    #[test]
    fn variant_b_bit_flip_in_response_aborts() {
        let duid = [1, 2, 3, 4, 5, 6, 7, 8];
        let master_key = [0xAAu8; 16];
        let provider = MasterKeyProvider { master_key };
        let ra = [0u8; 16];
        let (mut session, _ra_prime, rb) = VariantBSession::on_auth_req(duid, ra, &provider).unwrap();
        let k = crypto::diversify_key(&master_key, &duid);
        let mut rb_prime = crypto::aes_ecb_encrypt(&k, &rb);
        rb_prime[0] ^= 0x01;
        assert_eq!(session.on_auth_rsp(rb_prime).unwrap_err(), ErrorKind::AuthFailed);
    }

    #[test]
    fn symmetric_variant_echoes_nonce() {
        let dk = [7u8; 16];
        let nonce_m = [9u8; 16];
        let (echoed, _nonce_r) = handle_symmetric_round(&dk, &nonce_m).unwrap();
        assert_eq!(echoed, crypto::aes_ecb_encrypt(&dk, &nonce_m));
    }
}
