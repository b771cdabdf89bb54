//! Cryptographic Primitives Adapter (spec §4.2).
//!
//! A thin, algorithm-agnostic surface over `ring`, `aes`/`cbc`, and `ed25519-dalek` so that
//! every other module only ever sees [`crate::error::ErrorKind`] — never a `ring` or `aes`
//! error type. Modeled after the teacher's `sm::toolbox` module, which draws its ECDH and
//! AES primitives from the same crates.

use crate::error::{ErrorKind, Result};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cmac::{Cmac, Mac};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToSec1Point;
use p256::{PublicKey as P256PublicKey, SecretKey as P256SecretKey};
use ring::aead::{self, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use ring::hkdf;
use zeroize::Zeroize;

/// Length of an uncompressed P-256 public key point (`0x04 || X(32) || Y(32)`).
pub const PUB_KEY_LEN: usize = 65;

/// Fill `out` with bytes from the OS CSPRNG.
pub fn random_bytes(out: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(out)
        .map_err(|_| ErrorKind::Internal)
}

/// Generate a fresh P-256 key pair. Used both for the mobile's one-shot per-attempt key and
/// for the intercom's long-lived identity key (PrivI/PubI, spec §3) — the two differ only in
/// how long the caller holds onto the result, not in how they're produced. `ring`'s ECDH API
/// only exposes single-use `EphemeralPrivateKey`s, so the reusable static key comes from the
/// `p256` crate instead (see Cargo.toml).
pub fn ecdh_keygen() -> Result<(P256SecretKey, [u8; PUB_KEY_LEN])> {
    loop {
        let mut seed = [0u8; 32];
        random_bytes(&mut seed)?;
        if let Ok(secret) = P256SecretKey::from_bytes((&seed).into()) {
            let encoded = secret.public_key().to_sec1_point(false);
            let mut buf = [0u8; PUB_KEY_LEN];
            buf.copy_from_slice(encoded.as_bytes());
            return Ok((secret, buf));
        }
    }
}

/// Validate that `bytes` decodes to a point actually on the P-256 curve before any ECDH is
/// attempted (spec §4.1: "PubM must be rejected before any crypto if it is not a valid point").
pub fn validate_pub_key(bytes: &[u8]) -> Result<P256PublicKey> {
    P256PublicKey::from_sec1_bytes(bytes).map_err(|_| ErrorKind::InvalidPoint)
}

/// `ecdh_p256(priv, peer_pub) -> shared_secret(32B)`. `private` is borrowed, not consumed —
/// the intercom's identity key performs this for every session over its lifetime.
pub fn ecdh_p256(private: &P256SecretKey, peer_pub: &[u8]) -> Result<[u8; 32]> {
    let peer = validate_pub_key(peer_pub)?;
    let shared = diffie_hellman(private.to_nonzero_scalar(), peer.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(out)
}

struct HkdfLen(usize);

impl hkdf::KeyType for HkdfLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// `hkdf_sha256(ikm, salt, info, len) -> bytes`.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, salt);
    let prk = salt.extract(ikm);
    let info_slices = [info];
    let okm = prk
        .expand(&info_slices, HkdfLen(len))
        .map_err(|_| ErrorKind::Internal)?;
    let mut out = vec![0u8; len];
    okm.fill(&mut out).map_err(|_| ErrorKind::Internal)?;
    Ok(out)
}

/// A nonce sequence that yields exactly one fixed 12-byte nonce, then refuses further use.
/// AES-GCM nonces in this protocol are per-frame and supplied by the caller, never an
/// internal counter.
struct FixedNonce(Option<[u8; 12]>);

impl NonceSequence for FixedNonce {
    fn advance(&mut self) -> core::result::Result<Nonce, ring::error::Unspecified> {
        self.0.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// `aes_gcm_encrypt(key, nonce_12, aad, data) -> ciphertext || tag(16)`.
pub fn aes_gcm_encrypt(key: &[u8; 32], nonce: [u8; 12], aad: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| ErrorKind::Internal)?;
    let mut sealing = aead::SealingKey::new(unbound, FixedNonce(Some(nonce)));
    let mut in_out = data.to_vec();
    sealing
        .seal_in_place_append_tag(aead::Aad::from(aad), &mut in_out)
        .map_err(|_| ErrorKind::Internal)?;
    Ok(in_out)
}

/// `aes_gcm_decrypt(key, nonce_12, aad, data)`; fails with `TagInvalid` (constant-time, via
/// `ring`'s own tag comparison).
pub fn aes_gcm_decrypt(
    key: &[u8; 32],
    nonce: [u8; 12],
    aad: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| ErrorKind::Internal)?;
    let mut opening = aead::OpeningKey::new(unbound, FixedNonce(Some(nonce)));
    let mut in_out = data.to_vec();
    let plain = opening
        .open_in_place(aead::Aad::from(aad), &mut in_out)
        .map_err(|_| ErrorKind::TagInvalid)?;
    Ok(plain.to_vec())
}

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// `aes_cbc_encrypt(key, iv_16, data)` with PKCS#7 padding (Variant B's data-transfer
/// framing, §3/§4.4).
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(data)
}

/// `aes_cbc_decrypt`; fails with `BadPadding` on a malformed final block.
pub fn aes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(ErrorKind::BadPadding);
    }
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(data)
        .map_err(|_| ErrorKind::BadPadding)
}

/// `aes_ecb_encrypt(key, block_16) -> block_16`, used for the Variant B `AES(K, nonce)`
/// challenge response (spec §4.4 step 2).
pub fn aes_ecb_encrypt(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(key.into());
    let mut buf = *block;
    let generic = (&mut buf).into();
    cipher.encrypt_block(generic);
    buf
}

/// `ed25519_verify(pubkey, msg, sig) -> bool`, used by the Symmetric-Key demo variant.
pub fn ed25519_verify(pubkey: &[u8; 32], msg: &[u8], sig: &[u8; 64]) -> bool {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};
    let Ok(key) = VerifyingKey::from_bytes(pubkey) else {
        return false;
    };
    let signature = Signature::from_bytes(sig);
    key.verify(msg, &signature).is_ok()
}

/// `diversify_key(master_key_16, uid_8) -> dk_16`, AN10922-style key diversification:
/// `DK = AES-CMAC(MasterKey, UID)`. CMAC-AES128 already produces a 16-byte tag, so it is used
/// directly as `DK`. Deterministic: same `(master, uid)` always yields the same `dk`.
pub fn diversify_key(master_key: &[u8; 16], uid: &[u8; 8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(master_key).expect("16-byte key");
    mac.update(uid);
    let tag = mac.finalize().into_bytes();
    let mut dk = [0u8; 16];
    dk.copy_from_slice(&tag);
    dk
}

/// Decode a hex string (key material, config fields, backend DTOs) into bytes.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(ErrorKind::Internal);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ErrorKind::Internal))
        .collect()
}

/// Zero a byte buffer holding key material. Wraps [`zeroize::Zeroize`] so callers at the
/// session boundary have one obvious thing to call on teardown.
pub fn zeroize(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_is_symmetric() {
        let (priv_a, pub_a) = ecdh_keygen().unwrap();
        let (priv_b, pub_b) = ecdh_keygen().unwrap();
        let shared_a = ecdh_p256(&priv_a, &pub_b).unwrap();
        let shared_b = ecdh_p256(&priv_b, &pub_a).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn identity_key_agrees_across_repeated_sessions() {
        // The intercom's identity key is long-lived (spec §3): the same private key must
        // perform ECDH correctly against a fresh mobile key on every connection.
        let (identity_priv, identity_pub) = ecdh_keygen().unwrap();
        let (mobile_priv_1, mobile_pub_1) = ecdh_keygen().unwrap();
        let (mobile_priv_2, mobile_pub_2) = ecdh_keygen().unwrap();

        let shared_1 = ecdh_p256(&identity_priv, &mobile_pub_1).unwrap();
        let shared_1_mobile = ecdh_p256(&mobile_priv_1, &identity_pub).unwrap();
        assert_eq!(shared_1, shared_1_mobile);

        let shared_2 = ecdh_p256(&identity_priv, &mobile_pub_2).unwrap();
        let shared_2_mobile = ecdh_p256(&mobile_priv_2, &identity_pub).unwrap();
        assert_eq!(shared_2, shared_2_mobile);
        assert_ne!(shared_1, shared_2);
    }

    #[test]
    fn invalid_point_rejected_before_ecdh() {
        let (priv_a, _) = ecdh_keygen().unwrap();
        let mut bogus = [0u8; PUB_KEY_LEN];
        bogus[0] = 0x04;
        bogus[1] = 0xFF; // not on the curve
        assert_eq!(ecdh_p256(&priv_a, &bogus), Err(ErrorKind::InvalidPoint));
    }

    #[test]
    fn hkdf_matches_on_both_sides() {
        let ikm = [7u8; 32];
        let salt = [1u8; 16];
        let a = hkdf_sha256(&ikm, &salt, b"m2i-enc", 32).unwrap();
        let b = hkdf_sha256(&ikm, &salt, b"m2i-enc", 32).unwrap();
        assert_eq!(a, b);
        let c = hkdf_sha256(&ikm, &salt, b"i2m-enc", 32).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn gcm_round_trip() {
        let key = [9u8; 32];
        let nonce = [1u8; 12];
        let aad = [0x01u8];
        let pt = b"unlock door please";
        let ct = aes_gcm_encrypt(&key, nonce, &aad, pt).unwrap();
        let back = aes_gcm_decrypt(&key, nonce, &aad, &ct).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn gcm_tamper_fails_closed() {
        let key = [9u8; 32];
        let nonce = [1u8; 12];
        let aad = [0x01u8];
        let mut ct = aes_gcm_encrypt(&key, nonce, &aad, b"hello").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert_eq!(
            aes_gcm_decrypt(&key, nonce, &aad, &ct),
            Err(ErrorKind::TagInvalid)
        );
    }

    #[test]
    fn cbc_round_trip() {
        let key = [3u8; 16];
        let iv = [4u8; 16];
        let pt = b"door access frame payload";
        let ct = aes_cbc_encrypt(&key, &iv, pt);
        let back = aes_cbc_decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn diversify_key_is_deterministic() {
        let master = [0xAAu8; 16];
        let uid = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let dk1 = diversify_key(&master, &uid);
        let dk2 = diversify_key(&master, &uid);
        assert_eq!(dk1, dk2);
    }

    /// RFC 4493 AES-128-CMAC known-answer vectors, checked against the same `Cmac<Aes128>`
    /// construction `diversify_key` uses, per spec §4.2's "MUST verify it against known
    /// vectors before field use".
    #[test]
    fn cmac_matches_rfc4493_known_answer_vectors() {
        let key: [u8; 16] = [
            0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf,
            0x4f, 0x3c,
        ];

        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(&key).unwrap();
        mac.update(&[]);
        let expected: [u8; 16] = [
            0xbb, 0x1d, 0x69, 0x29, 0xe9, 0x59, 0x37, 0x28, 0x7f, 0xa3, 0x7d, 0x12, 0x9b, 0x75,
            0x67, 0x46,
        ];
        assert_eq!(mac.finalize().into_bytes().as_slice(), expected);

        let msg: [u8; 16] = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(&key).unwrap();
        mac.update(&msg);
        let expected: [u8; 16] = [
            0x07, 0x0a, 0x16, 0xb4, 0x6b, 0x4d, 0x41, 0x44, 0xf7, 0x9b, 0xdd, 0x9d, 0xd0, 0x4a,
            0x28, 0x7c,
        ];
        assert_eq!(mac.finalize().into_bytes().as_slice(), expected);
    }

    #[test]
    fn ecb_bit_flip_in_response_breaks_verification() {
        let key = [0xAAu8; 16];
        let ra = [0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
        let ra_prime = aes_ecb_encrypt(&key, &ra);
        let mut flipped = ra_prime;
        flipped[0] ^= 0x01;
        assert_ne!(ra_prime, flipped);
    }
}
