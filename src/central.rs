//! Central (Mobile) Protocol Driver (spec §4.6), re-architected per Design Notes §9: a
//! finite-state machine advanced by typed events, where each transition is a pure function
//! `(state, event) -> (state', actions)`. `Action` describes I/O the caller must perform;
//! this module itself touches no BLE transport, so it is testable without one — exactly the
//! property Design Notes §9 asks for.

use crate::error::ErrorKind;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralState {
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Subscribing,
    Authenticating,
    SendingCred,
    Complete,
    Failed,
}

#[derive(Debug, Clone)]
pub enum CentralEvent {
    Start,
    Connected,
    ServiceDiscovered,
    Subscribed,
    /// A notification/indication arrived on a characteristic, carrying its raw value.
    Notification(Vec<u8>),
    /// Result of checking the auth response against what the driver expected (the echoed
    /// nonce for Variant B/Symmetric, or successful AEAD decryption for Variant A) — computed
    /// by the caller, since the pure FSM has no access to key material (spec §4.6: "On any
    /// timeout or mismatched nonce, disconnect and return an error"; §4.4 Symmetric-Key: the
    /// mobile "verifies equality of Nonce_M before any credential write").
    AuthResponseVerified(bool),
    IndicationAck,
    Timeout,
    Disconnect,
}

#[derive(Debug, Clone)]
pub enum Action {
    StartScan,
    Connect,
    DiscoverServices,
    SubscribeChallenge,
    /// Compose and write the Auth frame, given the nonce just received in `Notification`.
    SendAuth { nonce: Vec<u8> },
    SendCredential,
    ArmTimeout(Duration),
    Disconnect,
    ReportError(ErrorKind),
    ReportSuccess,
}

/// Timeout budgets (spec §4.6).
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const AUTH_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);
pub const CREDENTIAL_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Requested ATT MTU: 247+ for Variant A, 512 where supported for the Symmetric variant.
pub const VARIANT_A_MTU_REQUEST: u16 = 247;
pub const SYMMETRIC_MTU_REQUEST: u16 = 512;

/// Advance the driver by one event. On any timeout or mismatched nonce, the caller is
/// expected to disconnect and surface an error — encoded here as a transition to `Failed`
/// plus a `Disconnect`/`ReportError` action pair.
pub fn transition(state: CentralState, event: CentralEvent) -> (CentralState, Vec<Action>) {
    use CentralEvent::*;
    use CentralState::*;

    match (state, event) {
        (Idle, Start) => (Scanning, vec![Action::StartScan, Action::ArmTimeout(SCAN_TIMEOUT)]),

        (Scanning, Connected) => (
            Connecting,
            vec![Action::Connect, Action::ArmTimeout(CONNECT_TIMEOUT)],
        ),
        (Scanning, Timeout) => (
            Failed,
            vec![Action::ReportError(ErrorKind::Internal)],
        ),

        (Connecting, ServiceDiscovered) => (
            Discovering,
            vec![Action::DiscoverServices, Action::ArmTimeout(DISCOVERY_TIMEOUT)],
        ),
        (Connecting, Timeout) => (
            Failed,
            vec![Action::Disconnect, Action::ReportError(ErrorKind::Internal)],
        ),

        (Discovering, Subscribed) => (
            Subscribing,
            vec![Action::SubscribeChallenge],
        ),
        (Discovering, Timeout) => (
            Failed,
            vec![Action::Disconnect, Action::ReportError(ErrorKind::Internal)],
        ),

        (Subscribing, Notification(nonce)) => (
            Authenticating,
            vec![
                Action::SendAuth { nonce },
                Action::ArmTimeout(AUTH_RESPONSE_TIMEOUT),
            ],
        ),
        (Subscribing, Timeout) => (
            Failed,
            vec![Action::Disconnect, Action::ReportError(ErrorKind::Internal)],
        ),

        (Authenticating, AuthResponseVerified(true)) => (
            SendingCred,
            vec![Action::SendCredential, Action::ArmTimeout(CREDENTIAL_RESPONSE_TIMEOUT)],
        ),
        (Authenticating, AuthResponseVerified(false)) => (
            Failed,
            vec![Action::Disconnect, Action::ReportError(ErrorKind::AuthFailed)],
        ),
        (Authenticating, Timeout) => (
            Failed,
            vec![Action::Disconnect, Action::ReportError(ErrorKind::ChallengeExpired)],
        ),

        (SendingCred, Notification(_) | IndicationAck) => (
            Complete,
            vec![Action::ReportSuccess],
        ),
        (SendingCred, Timeout) => (
            Failed,
            vec![Action::Disconnect, Action::ReportError(ErrorKind::Internal)],
        ),

        (_, Disconnect) => (
            Failed,
            vec![Action::Disconnect, Action::ReportError(ErrorKind::InvalidState)],
        ),

        (other, _) => (other, vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CentralEvent::*;
    use CentralState::*;

    #[test]
    fn happy_path_walks_every_state() {
        let (s, _) = transition(Idle, Start);
        assert_eq!(s, Scanning);
        let (s, _) = transition(s, Connected);
        assert_eq!(s, Connecting);
        let (s, _) = transition(s, ServiceDiscovered);
        assert_eq!(s, Discovering);
        let (s, _) = transition(s, Subscribed);
        assert_eq!(s, Subscribing);
        let (s, actions) = transition(s, Notification(vec![0u8; 16]));
        assert_eq!(s, Authenticating);
        assert!(matches!(actions[0], Action::SendAuth { .. }));
        let (s, _) = transition(s, AuthResponseVerified(true));
        assert_eq!(s, SendingCred);
        let (s, actions) = transition(s, IndicationAck);
        assert_eq!(s, Complete);
        assert!(matches!(actions[0], Action::ReportSuccess));
    }

    #[test]
    fn timeout_during_auth_reports_challenge_expired() {
        let (s, actions) = transition(Authenticating, Timeout);
        assert_eq!(s, Failed);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ReportError(ErrorKind::ChallengeExpired))));
    }

    #[test]
    fn mismatched_nonce_fails_before_credential_write() {
        let (s, actions) = transition(Authenticating, AuthResponseVerified(false));
        assert_eq!(s, Failed);
        assert!(actions.iter().any(|a| matches!(a, Action::Disconnect)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ReportError(ErrorKind::AuthFailed))));
    }

    #[test]
    fn disconnect_from_any_state_fails_cleanly() {
        let (s, actions) = transition(Authenticating, Disconnect);
        assert_eq!(s, Failed);
        assert!(actions.iter().any(|a| matches!(a, Action::Disconnect)));
    }
}
