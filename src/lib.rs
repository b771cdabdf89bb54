//! A cryptographic BLE protocol engine for a door-unlock intercom and its mobile central.
//!
//! The engine is transport-agnostic above ATT/GATT: it encodes/decodes the wire frames,
//! runs the nonce-challenge state machine, derives session keys, and validates credentials,
//! but never touches a radio. See [`engine::PeripheralEngine`] for the peripheral's entry
//! point and [`central`] for the mobile driver.

pub mod actuator;
pub mod central;
pub mod challenge;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gatt;
pub mod keystore;
pub mod rate_limit;
pub mod session;
