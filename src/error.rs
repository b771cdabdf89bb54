//! Error taxonomy (§7) and the 1-byte wire status surface (§6).
//!
//! The engine never lets a foreign error type (`ring::error::Unspecified`, a padding
//! failure from `cbc`, ...) escape past the module that produced it; everything is folded
//! into [`ErrorKind`] at the boundary where it occurs, then mapped to a [`StatusCode`] for
//! the wire.

use thiserror::Error;

/// Internal failure taxonomy, grouped the way the protocol groups them: Transport, Crypto,
/// Policy, Runtime.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // --- Transport ---
    #[error("malformed frame")]
    MalformedFrame,
    #[error("frame exceeds negotiated MTU")]
    MtuExceeded,
    #[error("sequence number violation")]
    SequenceViolation,
    #[error("message not valid in current session state")]
    InvalidState,

    // --- Crypto ---
    #[error("peer public key is not a valid curve point")]
    InvalidPoint,
    #[error("AEAD tag did not verify")]
    TagInvalid,
    #[error("block cipher padding invalid")]
    BadPadding,
    #[error("signature did not verify")]
    SignatureInvalid,

    // --- Policy ---
    #[error("credential has expired")]
    Expired,
    #[error("credential not yet valid")]
    NotYetValid,
    #[error("credential has been revoked")]
    Revoked,
    #[error("credential is not valid for this door")]
    WrongDoor,
    #[error("action not permitted by credential")]
    PermissionDenied,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("device is not recognized")]
    UnknownDevice,
    #[error("credential failed structural/signature validation")]
    AuthFailed,

    // --- Runtime ---
    #[error("challenge has expired")]
    ChallengeExpired,
    #[error("peripheral already has a live session")]
    Busy,
    #[error("door actuator fault")]
    Jammed,
    #[error("internal error")]
    Internal,
}

/// The 1-byte response status enumerated in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0x00,
    AuthFailed = 0x01,
    Expired = 0x02,
    NotYetValid = 0x03,
    Revoked = 0x04,
    WrongDoor = 0x05,
    PermissionDenied = 0x06,
    RateLimited = 0x07,
    Jammed = 0x08,
    InternalError = 0x09,
    ChallengeExpired = 0x0A,
}

impl StatusCode {
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl From<ErrorKind> for StatusCode {
    /// Every error maps to exactly one status byte; transport and crypto failures that
    /// occur before a session key exists are surfaced as `AuthFailed` so the wire format
    /// never distinguishes "which field failed" (§7: "Transport errors never expose which
    /// credential field failed").
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::MalformedFrame
            | ErrorKind::MtuExceeded
            | ErrorKind::SequenceViolation
            | ErrorKind::InvalidState
            | ErrorKind::InvalidPoint
            | ErrorKind::TagInvalid
            | ErrorKind::BadPadding
            | ErrorKind::SignatureInvalid
            | ErrorKind::UnknownDevice
            | ErrorKind::AuthFailed => StatusCode::AuthFailed,
            ErrorKind::Expired => StatusCode::Expired,
            ErrorKind::NotYetValid => StatusCode::NotYetValid,
            ErrorKind::Revoked => StatusCode::Revoked,
            ErrorKind::WrongDoor => StatusCode::WrongDoor,
            ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
            ErrorKind::RateLimited => StatusCode::RateLimited,
            ErrorKind::ChallengeExpired => StatusCode::ChallengeExpired,
            ErrorKind::Jammed => StatusCode::Jammed,
            ErrorKind::Busy | ErrorKind::Internal => StatusCode::InternalError,
        }
    }
}

/// Door state byte (§6), carried in the response's `Extended` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DoorState {
    Unknown = 0x00,
    Locked = 0x01,
    Unlocked = 0x02,
    Ajar = 0x03,
    Forced = 0x04,
}

impl DoorState {
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

pub type Result<T> = core::result::Result<T, ErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_kind_has_exactly_one_status() {
        let cases = [
            (ErrorKind::MalformedFrame, StatusCode::AuthFailed),
            (ErrorKind::TagInvalid, StatusCode::AuthFailed),
            (ErrorKind::Expired, StatusCode::Expired),
            (ErrorKind::Revoked, StatusCode::Revoked),
            (ErrorKind::RateLimited, StatusCode::RateLimited),
            (ErrorKind::ChallengeExpired, StatusCode::ChallengeExpired),
            (ErrorKind::Busy, StatusCode::InternalError),
        ];
        for (kind, expected) in cases {
            assert_eq!(StatusCode::from(kind), expected);
        }
    }

    #[test]
    fn status_bytes_match_spec() {
        assert_eq!(StatusCode::Success.to_byte(), 0x00);
        assert_eq!(StatusCode::AuthFailed.to_byte(), 0x01);
        assert_eq!(StatusCode::ChallengeExpired.to_byte(), 0x0A);
        assert_eq!(DoorState::Unlocked.to_byte(), 0x02);
        assert_eq!(DoorState::Forced.to_byte(), 0x04);
    }
}
