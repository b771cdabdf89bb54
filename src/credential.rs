//! Credential Verifier (spec §4.5) and the two credential record shapes from the Data Model
//! (spec §3).

use crate::crypto;
use crate::error::{ErrorKind, Result};
use std::collections::HashSet;

/// Variant A's self-contained, backend-signed credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialA {
    pub credential_id: [u8; 16],
    pub device_pub_key: [u8; 65],
    pub door_id: [u8; 16],
    pub not_before: u64,
    pub not_after: u64,
    pub grace_period: u32,
    pub revocation_ref: [u8; 16],
    pub signature: [u8; 64],
}

const CREDENTIAL_A_CANONICAL_LEN: usize = 16 + 65 + 16 + 8 + 8 + 4 + 16;
const CREDENTIAL_A_LEN: usize = CREDENTIAL_A_CANONICAL_LEN + 64;

impl CredentialA {
    /// The canonical byte encoding signed by the backend (Open Question in spec §9, pinned
    /// down here — see DESIGN.md): `credential_id | device_pub_key | door_id(16, NUL-padded) |
    /// not_before(8 LE) | not_after(8 LE) | grace_period(4 LE) | revocation_ref(16)`.
    pub fn canonical_bytes(&self) -> [u8; CREDENTIAL_A_CANONICAL_LEN] {
        let mut out = [0u8; CREDENTIAL_A_CANONICAL_LEN];
        let mut o = 0;
        out[o..o + 16].copy_from_slice(&self.credential_id);
        o += 16;
        out[o..o + 65].copy_from_slice(&self.device_pub_key);
        o += 65;
        out[o..o + 16].copy_from_slice(&self.door_id);
        o += 16;
        out[o..o + 8].copy_from_slice(&self.not_before.to_le_bytes());
        o += 8;
        out[o..o + 8].copy_from_slice(&self.not_after.to_le_bytes());
        o += 8;
        out[o..o + 4].copy_from_slice(&self.grace_period.to_le_bytes());
        o += 4;
        out[o..o + 16].copy_from_slice(&self.revocation_ref);
        out
    }

    pub fn door_id_str(&self) -> String {
        let nul = self.door_id.iter().position(|&b| b == 0).unwrap_or(16);
        String::from_utf8_lossy(&self.door_id[..nul]).into_owned()
    }

    /// Parse the structural fields; step 1 of the verifier (§4.5): "on failure ->
    /// InvalidCredential". There is no dedicated wire status for this (§6's status byte set
    /// has none), so it is folded into `AuthFailed` like every other pre-decryption failure.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CREDENTIAL_A_LEN {
            return Err(ErrorKind::AuthFailed);
        }
        let mut credential_id = [0u8; 16];
        credential_id.copy_from_slice(&bytes[0..16]);
        let mut device_pub_key = [0u8; 65];
        device_pub_key.copy_from_slice(&bytes[16..81]);
        let mut door_id = [0u8; 16];
        door_id.copy_from_slice(&bytes[81..97]);
        let not_before = u64::from_le_bytes(bytes[97..105].try_into().unwrap());
        let not_after = u64::from_le_bytes(bytes[105..113].try_into().unwrap());
        let grace_period = u32::from_le_bytes(bytes[113..117].try_into().unwrap());
        let mut revocation_ref = [0u8; 16];
        revocation_ref.copy_from_slice(&bytes[117..133]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[133..197]);
        Ok(CredentialA {
            credential_id,
            device_pub_key,
            door_id,
            not_before,
            not_after,
            grace_period,
            revocation_ref,
            signature,
        })
    }
}

/// Variant B's 372-byte Transaction Certificate shape (spec §3): `length(2) | identifier(2) |
/// device_uid(8) | token(32) | value(330, encrypted with KCD)`. The `rfu[48]` tail inside
/// `value` is treated as opaque (Open Question — see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialB {
    pub length: u16,
    pub identifier: u16,
    pub device_uid: [u8; 8],
    pub token: [u8; 32],
    pub value: [u8; 330],
}

const CREDENTIAL_B_LEN: usize = 2 + 2 + 8 + 32 + 330;

impl CredentialB {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CREDENTIAL_B_LEN {
            return Err(ErrorKind::AuthFailed);
        }
        let length = u16::from_be_bytes([bytes[0], bytes[1]]);
        let identifier = u16::from_be_bytes([bytes[2], bytes[3]]);
        let mut device_uid = [0u8; 8];
        device_uid.copy_from_slice(&bytes[4..12]);
        let mut token = [0u8; 32];
        token.copy_from_slice(&bytes[12..44]);
        let mut value = [0u8; 330];
        value.copy_from_slice(&bytes[44..374]);
        Ok(CredentialB {
            length,
            identifier,
            device_uid,
            token,
            value,
        })
    }
}

/// Successful verification output with audit fields (§4.5).
#[derive(Debug, Clone)]
pub struct Grant {
    pub credential_id: [u8; 16],
    pub door_id: String,
    pub granted_at: u64,
}

/// Revocation list: a set of `revocation_ref` values the backend has marked revoked.
pub type RevocationList = HashSet<[u8; 16]>;

/// Whether a credential's holder may perform the unlock action (§4.5 step 8). Real
/// deployments plug in a richer policy; the default permits every structurally valid,
/// unrevoked credential.
pub trait PermissionPolicy {
    fn permits_unlock(&self, credential: &CredentialA) -> bool;
}

pub struct AllowAll;
impl PermissionPolicy for AllowAll {
    fn permits_unlock(&self, _credential: &CredentialA) -> bool {
        true
    }
}

/// Runs the §4.5 check pipeline in order, short-circuiting on the first failure.
pub fn verify(
    payload: &[u8],
    session_pub_m: &[u8; 65],
    authority_pub_key: &[u8; 32],
    configured_door_ids: &[&str],
    revocation_list: &RevocationList,
    policy: &dyn PermissionPolicy,
    now: u64,
) -> Result<Grant> {
    // 1. Structural parse.
    let credential = CredentialA::parse(payload)?;

    // 2. Signature over the canonical bytes.
    let canonical = credential.canonical_bytes();
    if !crypto::ed25519_verify(authority_pub_key, &canonical, &credential.signature) {
        return Err(ErrorKind::AuthFailed);
    }

    // 3. Not-yet-valid.
    if now < credential.not_before {
        return Err(ErrorKind::NotYetValid);
    }

    // 4. Expiry + grace.
    if now > credential.not_after.saturating_add(credential.grace_period as u64) {
        return Err(ErrorKind::Expired);
    }

    // 5. Door binding.
    let door_id = credential.door_id_str();
    if !configured_door_ids.iter().any(|&d| d == door_id) {
        return Err(ErrorKind::WrongDoor);
    }

    // 6. Credential bound to the authenticating session key.
    if credential.device_pub_key != *session_pub_m {
        return Err(ErrorKind::AuthFailed);
    }

    // 7. Revocation list (reaching this point already implies `now` is within the validity
    // window or its grace period).
    if revocation_list.contains(&credential.revocation_ref) {
        return Err(ErrorKind::Revoked);
    }

    // 8. Permission/action check.
    if !policy.permits_unlock(&credential) {
        return Err(ErrorKind::PermissionDenied);
    }

    Ok(Grant {
        credential_id: credential.credential_id,
        door_id,
        granted_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn make_signed_credential(
        signing_key: &SigningKey,
        door_id: &str,
        device_pub_key: [u8; 65],
        not_before: u64,
        not_after: u64,
        grace_period: u32,
    ) -> CredentialA {
        let mut door_id_bytes = [0u8; 16];
        door_id_bytes[..door_id.len()].copy_from_slice(door_id.as_bytes());
        let mut credential = CredentialA {
            credential_id: [1; 16],
            device_pub_key,
            door_id: door_id_bytes,
            not_before,
            not_after,
            grace_period,
            revocation_ref: [9; 16],
            signature: [0; 64],
        };
        let sig = signing_key.sign(&credential.canonical_bytes());
        credential.signature = sig.to_bytes();
        credential
    }

    fn to_bytes(c: &CredentialA) -> Vec<u8> {
        let mut out = c.canonical_bytes().to_vec();
        out.extend_from_slice(&c.signature);
        out
    }

    #[test]
    fn happy_path_grants() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying = signing_key.verifying_key().to_bytes();
        let mut pub_m = [0u8; 65];
        pub_m[0] = 0x04;
        let credential = make_signed_credential(&signing_key, "front-door", pub_m, 0, 1000, 30);
        let bytes = to_bytes(&credential);
        let grant = verify(
            &bytes,
            &pub_m,
            &verifying,
            &["front-door"],
            &RevocationList::new(),
            &AllowAll,
            500,
        )
        .unwrap();
        assert_eq!(grant.door_id, "front-door");
    }

    #[test]
    fn expired_credential_rejected() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying = signing_key.verifying_key().to_bytes();
        let mut pub_m = [0u8; 65];
        pub_m[0] = 0x04;
        let credential = make_signed_credential(&signing_key, "front-door", pub_m, 0, 100, 10);
        let bytes = to_bytes(&credential);
        let err = verify(
            &bytes,
            &pub_m,
            &verifying,
            &["front-door"],
            &RevocationList::new(),
            &AllowAll,
            1000,
        )
        .unwrap_err();
        assert_eq!(err, ErrorKind::Expired);
    }

    #[test]
    fn credential_bound_to_wrong_key_rejected() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying = signing_key.verifying_key().to_bytes();
        let mut pub_m = [0u8; 65];
        pub_m[0] = 0x04;
        let credential = make_signed_credential(&signing_key, "front-door", pub_m, 0, 1000, 30);
        let bytes = to_bytes(&credential);
        let mut other_pub_m = pub_m;
        other_pub_m[1] ^= 0xFF;
        let err = verify(
            &bytes,
            &other_pub_m,
            &verifying,
            &["front-door"],
            &RevocationList::new(),
            &AllowAll,
            500,
        )
        .unwrap_err();
        assert_eq!(err, ErrorKind::AuthFailed);
    }

    #[test]
    fn credential_b_round_trip() {
        let mut raw = vec![0u8; CREDENTIAL_B_LEN];
        raw[0..2].copy_from_slice(&362u16.to_be_bytes());
        raw[2..4].copy_from_slice(&1u16.to_be_bytes());
        raw[4..12].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let credential = CredentialB::parse(&raw).unwrap();
        assert_eq!(credential.identifier, 1);
        assert_eq!(credential.device_uid, [1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
