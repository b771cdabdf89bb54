//! `PeripheralEngine` (Design Notes §9): an explicit value threaded through the I/O
//! boundary, replacing the ambient/global BLE-controller singleton pattern the source
//! material uses. No hidden process-wide state beyond what is passed in at construction:
//! the long-lived identity keys and the rate-limit table.

use crate::actuator::DoorActuator;
use crate::challenge::{MasterKeyProvider, PreProvisionedKeyProvider, VariantBKeyProvider, VariantBSession};
use crate::config::{IntercomConfig, VariantBKeyMode};
use crate::credential::{PermissionPolicy, RevocationList};
use crate::error::{DoorState, ErrorKind, Result, StatusCode};
use crate::frame::{VariantAAuthFrame, VariantAResponseFrame};
use crate::rate_limit::RateLimiter;
use crate::session::{PeerHandle, Phase, SessionManager};
use std::time::Instant;

/// Everything the peripheral needs to authenticate a Variant A session and actuate the
/// door, gathered into one value per Design Notes §9.
pub struct PeripheralEngine<A: DoorActuator> {
    pub sessions: SessionManager,
    pub rate_limiter: RateLimiter,
    pub signer_pub_key: [u8; 32],
    pub revocation_list: RevocationList,
    pub actuator: A,
    variant_b_key_provider: Box<dyn VariantBKeyProvider>,
    /// Live Variant B session, if the peer is running that flow instead of Variant A.
    variant_b_session: Option<VariantBSession>,
    config: IntercomConfig,
}

/// Builds the configured `VariantBKeyProvider` (master-key diversification, or a
/// pre-provisioned table), per spec §9's reader-side key architecture Open Question.
fn build_variant_b_key_provider(mode: &VariantBKeyMode) -> Result<Box<dyn VariantBKeyProvider>> {
    match mode {
        VariantBKeyMode::MasterKey { master_key_hex } => {
            let bytes = crate::crypto::decode_hex(master_key_hex)?;
            let master_key: [u8; 16] = bytes.try_into().map_err(|_| ErrorKind::Internal)?;
            Ok(Box::new(MasterKeyProvider { master_key }))
        }
        VariantBKeyMode::PreProvisioned { keys_hex } => {
            let mut keys = std::collections::HashMap::new();
            for (duid_hex, key_hex) in keys_hex {
                let duid: [u8; 8] = crate::crypto::decode_hex(duid_hex)?
                    .try_into()
                    .map_err(|_| ErrorKind::Internal)?;
                let key: [u8; 16] = crate::crypto::decode_hex(key_hex)?
                    .try_into()
                    .map_err(|_| ErrorKind::Internal)?;
                keys.insert(duid, key);
            }
            Ok(Box::new(PreProvisionedKeyProvider { keys }))
        }
    }
}

impl<A: DoorActuator> PeripheralEngine<A> {
    pub fn new(config: IntercomConfig, signer_pub_key: [u8; 32], actuator: A) -> Result<Self> {
        let sessions = SessionManager::new(config.nonce_lifetime())?;
        let rate_limiter = RateLimiter::new(
            config.rate_limit_capacity,
            config.rate_limit_window(),
            config.global_rate_limit_capacity,
        );
        let variant_b_key_provider = build_variant_b_key_provider(&config.variant_b_key_mode)?;
        Ok(PeripheralEngine {
            sessions,
            rate_limiter,
            signer_pub_key,
            revocation_list: RevocationList::new(),
            actuator,
            variant_b_key_provider,
            variant_b_session: None,
            config,
        })
    }

    /// `on_connect(peer) -> SessionId` (§4.3).
    pub fn on_connect(&mut self, peer: PeerHandle, mtu: usize, now: Instant) -> Result<()> {
        self.sessions.on_connect(peer, mtu, now)?;
        Ok(())
    }

    /// `on_subscribe(Challenge)` / `on_read(Challenge)`: returns the live nonce, re-sending
    /// the same value on repeated calls (§4.3).
    pub fn on_subscribe_or_read(&self) -> Result<[u8; 16]> {
        self.sessions
            .session()
            .and_then(|s| s.current_nonce())
            .ok_or(ErrorKind::InvalidState)
    }

    /// `on_timer()`: expire an unused nonce past its 30s lifetime.
    pub fn on_timer(&mut self, now: Instant) {
        self.sessions.on_timer(now);
    }

    /// `on_disconnect()`.
    pub fn on_disconnect(&mut self) {
        self.sessions.on_disconnect();
    }

    /// `on_write(AuthChar, bytes)` for Variant A: routes to the Challenge Engine, validates
    /// the credential, and actuates the door on success (§4.4 steps 8-9).
    pub fn on_write_variant_a_auth(
        &mut self,
        auth_frame: &VariantAAuthFrame,
        policy: &dyn PermissionPolicy,
        now_instant: Instant,
        now_unix: u64,
    ) -> Result<(VariantAResponseFrame, StatusCode)> {
        let door_ids: Vec<&str> = std::iter::once(self.config.door_id.as_str())
            .chain(self.config.door_id_aliases.iter().map(String::as_str))
            .collect();

        let (session, identity_private) = self.sessions.session_mut_and_identity();
        let session = session.ok_or(ErrorKind::InvalidState)?;

        let mut outcome = crate::challenge::handle_variant_a_auth(
            session,
            identity_private,
            auth_frame,
            &self.signer_pub_key,
            &door_ids,
            &self.revocation_list,
            policy,
            &mut self.rate_limiter,
            now_instant,
            now_unix,
        )?;

        // A credential grant only becomes a real unlock once the actuator agrees (§7): if it
        // reports Jammed, the wire must still carry an encrypted failure response rather than
        // a bare transport error, so the caller always gets a well-formed Variant A reply.
        if outcome.grant.is_some() {
            if let Err(actuator_err) = self.actuator.unlock() {
                let session = self.sessions.session().ok_or(ErrorKind::InvalidState)?;
                if let Some(crate::session::NegotiatedKeys::EcdhGcm { k_i2m, .. }) =
                    session.negotiated_keys.as_ref()
                {
                    let status = StatusCode::from(actuator_err);
                    outcome.response =
                        crate::challenge::seal_variant_a_response(k_i2m, status, DoorState::Unknown)?;
                    outcome.status = status;
                    outcome.grant = None;
                } else {
                    return Err(actuator_err);
                }
            }
        }

        Ok((outcome.response, outcome.status))
    }

    /// Variant B step 1: peer sends `DUID + AUTH_REQ(Ra)`, intercom replies `Ra' + Rb`
    /// (spec §4.4).
    pub fn on_variant_b_auth_req(&mut self, duid: [u8; 8], ra: [u8; 16]) -> Result<([u8; 16], [u8; 16])> {
        let (session, ra_prime, rb) =
            VariantBSession::on_auth_req(duid, ra, self.variant_b_key_provider.as_ref())?;
        self.variant_b_session = Some(session);
        Ok((ra_prime, rb))
    }

    /// Variant B step 4: peer proves possession of `K` by returning `Rb' == AES-ECB(K, Rb)`.
    pub fn on_variant_b_auth_rsp(&mut self, rb_prime: [u8; 16]) -> Result<()> {
        let session = self.variant_b_session.as_mut().ok_or(ErrorKind::InvalidState)?;
        session.on_auth_rsp(rb_prime)
    }

    pub fn variant_b_session(&self) -> Option<&VariantBSession> {
        self.variant_b_session.as_ref()
    }

    /// The Symmetric-Key Variant's single-round echo (spec §4.4): proves the intercom holds
    /// `device_key` by returning `AES-ECB(device_key, nonce_m)` alongside its own nonce.
    pub fn on_symmetric_round(&self, device_key: &[u8; 16], nonce_m: &[u8; 16]) -> Result<([u8; 16], [u8; 16])> {
        crate::challenge::handle_symmetric_round(device_key, nonce_m)
    }

    pub fn pub_i(&self) -> [u8; 65] {
        self.sessions.pub_i()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.sessions.session().map(|s| s.phase)
    }
}
