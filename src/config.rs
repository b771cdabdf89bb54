//! Intercom configuration (ambient stack §10.3): loaded from TOML, the same way the
//! teacher-pack's daemon configs in `clawde-io-apps` are loaded.

use crate::credential::CredentialA;
use crate::crypto;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How this intercom sources its Variant B symmetric key, per the Open Question in spec §9.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariantBKeyMode {
    /// Diversify per-device keys from a single master key at authentication time.
    MasterKey { master_key_hex: String },
    /// Look up a pre-provisioned per-device key; `keys_hex` maps device UID (hex) to device
    /// key (hex).
    PreProvisioned { keys_hex: std::collections::BTreeMap<String, String> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntercomConfig {
    /// This intercom's primary door identifier.
    pub door_id: String,
    /// Additional door identifiers this intercom also accepts (spec §4.5 step 5).
    #[serde(default)]
    pub door_id_aliases: Vec<String>,
    /// Nonce lifetime in seconds; spec §4.3 fixes this at 30s but allows override for testing.
    #[serde(default = "default_nonce_lifetime_secs")]
    pub nonce_lifetime_secs: u64,
    /// Auth attempts allowed per peer per rolling window.
    #[serde(default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Global auth-attempt cap across all peers.
    #[serde(default = "default_global_rate_limit_capacity")]
    pub global_rate_limit_capacity: u32,
    pub variant_b_key_mode: VariantBKeyMode,
}

fn default_nonce_lifetime_secs() -> u64 {
    30
}

fn default_rate_limit_capacity() -> u32 {
    5
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_global_rate_limit_capacity() -> u32 {
    100
}

impl IntercomConfig {
    pub fn from_toml_str(s: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn nonce_lifetime(&self) -> Duration {
        Duration::from_secs(self.nonce_lifetime_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn accepts_door_id(&self, door_id: &str) -> bool {
        self.door_id == door_id || self.door_id_aliases.iter().any(|a| a == door_id)
    }
}

/// Backend DTO for `POST /device/register` (spec §6) and `/device/refresh`. The endpoint
/// itself is out of scope; only the response shape the engine's credential cache consumes
/// is modeled.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialRecordDto {
    pub credential_id_hex: String,
    pub device_pub_key_hex: String,
    pub door_id: String,
    pub not_before: u64,
    pub not_after: u64,
    pub grace_period_secs: u32,
    pub revocation_ref_hex: String,
    pub signature_hex: String,
}

impl CredentialRecordDto {
    /// Decode the backend's hex/JSON record into the wire-ready [`CredentialA`] shape
    /// (spec §3/§4.5). A malformed field (wrong hex length, oversized door ID) is folded into
    /// `AuthFailed`, the same bucket `CredentialA::parse` uses for structural failures.
    pub fn into_credential_a(self) -> crate::error::Result<CredentialA> {
        let credential_id: [u8; 16] = crypto::decode_hex(&self.credential_id_hex)?
            .try_into()
            .map_err(|_| ErrorKind::AuthFailed)?;
        let device_pub_key: [u8; 65] = crypto::decode_hex(&self.device_pub_key_hex)?
            .try_into()
            .map_err(|_| ErrorKind::AuthFailed)?;
        let revocation_ref: [u8; 16] = crypto::decode_hex(&self.revocation_ref_hex)?
            .try_into()
            .map_err(|_| ErrorKind::AuthFailed)?;
        let signature: [u8; 64] = crypto::decode_hex(&self.signature_hex)?
            .try_into()
            .map_err(|_| ErrorKind::AuthFailed)?;
        if self.door_id.len() > 16 {
            return Err(ErrorKind::AuthFailed);
        }
        let mut door_id = [0u8; 16];
        door_id[..self.door_id.len()].copy_from_slice(self.door_id.as_bytes());
        Ok(CredentialA {
            credential_id,
            device_pub_key,
            door_id,
            not_before: self.not_before,
            not_after: self.not_after,
            grace_period: self.grace_period_secs,
            revocation_ref,
            signature,
        })
    }
}
