//! Session Manager (spec §4.3): per-connection lifecycle on the peripheral. Modeled after
//! the teacher's `sm::responder::SlaveSecurityManager`, which likewise owns one mutable
//! per-pairing-attempt record (`PairingData`) that is cleared wholesale on failure or
//! disconnect — here, cleared on any of the four nonce-invalidation events from spec §4.3.

use crate::error::{ErrorKind, Result};
use p256::SecretKey as P256SecretKey;
use std::time::{Duration, Instant};

/// Session phase (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    NonceIssued,
    AwaitAuth,
    AuthenticatedOrReject,
    CredentialAccepted,
    Done,
}

/// Negotiated per-session keys (Variant A's HKDF outputs, or Variant B's diversified key).
#[derive(Debug, Clone)]
pub enum NegotiatedKeys {
    EcdhGcm { k_m2i: [u8; 32], k_i2m: [u8; 32] },
    DiversifiedCbc { dk: [u8; 16] },
}

impl NegotiatedKeys {
    fn zeroize(&mut self) {
        match self {
            NegotiatedKeys::EcdhGcm { k_m2i, k_i2m } => {
                crate::crypto::zeroize(k_m2i);
                crate::crypto::zeroize(k_i2m);
            }
            NegotiatedKeys::DiversifiedCbc { dk } => crate::crypto::zeroize(dk),
        }
    }
}

/// An opaque connection handle, supplied by the (out-of-scope) BLE transport layer.
pub type PeerHandle = u64;

const NONCE_LEN: usize = 16;

pub struct Session {
    pub peer_handle: PeerHandle,
    pub mtu: usize,
    pub phase: Phase,
    current_nonce: Option<([u8; NONCE_LEN], Instant)>,
    pub negotiated_keys: Option<NegotiatedKeys>,
    pub peer_pubkey: Option<[u8; 65]>,
    pub last_seq: Option<u8>,
    nonce_lifetime: Duration,
    /// Whether this session has already spent its one authenticated key agreement (spec §3:
    /// "at most one authenticated key agreement per session"). The identity key itself lives
    /// on `SessionManager` and is borrowed, not consumed, so this flag is what enforces the
    /// one-shot rule now.
    ecdh_used: bool,
}

impl Session {
    fn new(peer_handle: PeerHandle, mtu: usize, nonce_lifetime: Duration, now: Instant) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        crate::crypto::random_bytes(&mut nonce)?;
        Ok(Session {
            peer_handle,
            mtu,
            phase: Phase::NonceIssued,
            current_nonce: Some((nonce, now)),
            negotiated_keys: None,
            peer_pubkey: None,
            last_seq: None,
            nonce_lifetime,
            ecdh_used: false,
        })
    }

    /// Mark this session's one-shot key agreement as spent. Returns
    /// `ErrorKind::InvalidState` if already spent (e.g. a duplicate Auth write).
    pub fn take_ecdh_private(&mut self) -> Result<()> {
        if self.ecdh_used {
            return Err(ErrorKind::InvalidState);
        }
        self.ecdh_used = true;
        Ok(())
    }

    /// The current nonce, re-sent as-is on repeated subscriptions/reads (§4.3: "Multiple
    /// subsequent subscriptions re-send the same nonce without regenerating it").
    pub fn current_nonce(&self) -> Option<[u8; NONCE_LEN]> {
        self.current_nonce.map(|(n, _)| n)
    }

    /// `on_timer()`: invalidate an unused nonce once its 30-second lifetime elapses.
    pub fn on_timer(&mut self, now: Instant) {
        if self.phase == Phase::NonceIssued {
            if let Some((_, issued_at)) = self.current_nonce {
                if now.duration_since(issued_at) >= self.nonce_lifetime {
                    self.invalidate_nonce();
                }
            }
        }
    }

    /// Reject an Auth write whose arrival exceeds the nonce's lifetime (§4.3, §8 "Nonce
    /// lifetime bound") before doing any crypto with it.
    pub fn check_nonce_live(&self, now: Instant) -> Result<[u8; NONCE_LEN]> {
        match self.current_nonce {
            Some((nonce, issued_at)) if now.duration_since(issued_at) < self.nonce_lifetime => {
                Ok(nonce)
            }
            _ => Err(ErrorKind::ChallengeExpired),
        }
    }

    /// Any of: success, failure, timeout, disconnect — erase the nonce (§4.3).
    pub fn invalidate_nonce(&mut self) {
        self.current_nonce = None;
    }

    pub fn is_nonce_live(&self, now: Instant) -> bool {
        self.check_nonce_live(now).is_ok()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(keys) = self.negotiated_keys.as_mut() {
            keys.zeroize();
        }
        if let Some((nonce, _)) = self.current_nonce.as_mut() {
            crate::crypto::zeroize(nonce);
        }
    }
}

/// At most one live session at a time (§3, §5, §8 "One live session").
pub struct SessionManager {
    session: Option<Session>,
    nonce_lifetime: Duration,
    /// The intercom's long-lived Variant A identity key pair (spec §3 Data Model:
    /// "Intercom identity. Long-lived key pair"), generated once and reused across every
    /// connection for the life of the `SessionManager` — not regenerated per session.
    identity_private: P256SecretKey,
    pub_i: [u8; 65],
}

impl SessionManager {
    pub fn new(nonce_lifetime: Duration) -> Result<Self> {
        let (identity_private, pub_i) = crate::crypto::ecdh_keygen()?;
        Ok(SessionManager {
            session: None,
            nonce_lifetime,
            identity_private,
            pub_i,
        })
    }

    /// `PubI`, the intercom's standing Variant A identity public key. Stable for the
    /// lifetime of the `SessionManager`, independent of any particular connection.
    pub fn pub_i(&self) -> [u8; 65] {
        self.pub_i
    }

    /// The intercom's standing identity private key, for Variant A ECDH. Borrowed, not
    /// consumed — callers must still go through `Session::take_ecdh_private` to enforce the
    /// one-agreement-per-session rule.
    pub fn identity_private(&self) -> &P256SecretKey {
        &self.identity_private
    }

    /// `on_connect(peer) -> SessionId`.
    pub fn on_connect(&mut self, peer_handle: PeerHandle, mtu: usize, now: Instant) -> Result<&mut Session> {
        if self.session.is_some() {
            return Err(ErrorKind::Busy);
        }
        self.session = Some(Session::new(peer_handle, mtu, self.nonce_lifetime, now)?);
        Ok(self.session.as_mut().unwrap())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Split borrow of the live session and the standing identity key, needed together by
    /// Variant A auth handling (`session` is mutated, `identity_private` is only read).
    pub fn session_mut_and_identity(&mut self) -> (Option<&mut Session>, &P256SecretKey) {
        (self.session.as_mut(), &self.identity_private)
    }

    /// `on_disconnect()`: invalidate all per-session state, zeroizing derived keys and the
    /// nonce (handled by `Session`'s `Drop`).
    pub fn on_disconnect(&mut self) {
        self.session = None;
    }

    pub fn on_timer(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.on_timer(now);
        }
    }
}
