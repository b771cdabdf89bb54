//! Demo peripheral binary: reads hex-encoded Variant A Auth frames from stdin (standing in
//! for GATT `Auth` characteristic writes, since live BLE transport is out of scope) and
//! prints the hex-encoded Response frame to stdout. Logging follows the teacher's
//! `examples/bonding-slave.rs` style: initialize once in `main`, `log::info!`/`log::warn!`
//! for lifecycle and rejected attempts.

use intercom_engine::actuator::FakeActuator;
use intercom_engine::config::IntercomConfig;
use intercom_engine::credential::AllowAll;
use intercom_engine::engine::PeripheralEngine;
use std::io::BufRead;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn main() {
    env_logger::init();

    let config_path = std::env::args().nth(1);
    let config = match config_path {
        Some(path) => {
            let contents = std::fs::read_to_string(&path).expect("failed to read config file");
            IntercomConfig::from_toml_str(&contents).expect("failed to parse config")
        }
        None => {
            log::warn!("no config path given; using a built-in demo configuration");
            IntercomConfig::from_toml_str(
                r#"
                door_id = "front-door"

                [variant_b_key_mode]
                type = "master_key"
                master_key_hex = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
                "#,
            )
            .unwrap()
        }
    };

    let signer_pub_key = [0u8; 32]; // placeholder authority key for the demo binary

    let mut engine =
        PeripheralEngine::new(config, signer_pub_key, FakeActuator::default()).expect("engine init");

    log::info!("intercom engine ready; waiting for a connection");
    engine.on_connect(1, 512, Instant::now()).expect("connect");
    let nonce = engine.on_subscribe_or_read().expect("nonce");
    let pub_i = engine.pub_i();
    println!("nonce={}", hex::encode(nonce));
    println!("pub_i={}", hex::encode(pub_i));

    log::info!("paste a hex-encoded Auth frame, one per line, to simulate a write");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(bytes) = hex::decode(line) else {
            log::warn!("not valid hex, ignoring");
            continue;
        };
        let Ok(auth_frame) = intercom_engine::frame::decode_variant_a_auth(&bytes) else {
            log::warn!("malformed Auth frame");
            continue;
        };
        match engine.on_write_variant_a_auth(&auth_frame, &AllowAll, Instant::now(), now_unix()) {
            Ok((response, status)) => {
                log::info!("auth attempt resolved with status {:?}", status);
                let encoded = intercom_engine::frame::encode_variant_a_response(&response, 512)
                    .expect("encode response");
                println!("response={}", hex::encode(encoded));
            }
            Err(err) => log::warn!("auth attempt rejected: {:?}", err),
        }
    }
}

/// Tiny hex codec so the demo binaries don't pull in a dedicated crate for something this
/// small; kept private to the binaries, never used by the library itself.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.len() % 2 != 0 {
            return Err(());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
            .collect()
    }
}
