//! Rate-limit bucket (spec §3, §4.4, §5): a token bucket keyed by peer public key / DeviceID,
//! plus a global cap shared across all keys to bound DoS on the crypto path. Owned
//! explicitly by the engine's long-lived state rather than a global — see Design Notes §9.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One peer's bucket: `tokens` refill to `capacity` once per `window`.
#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Identifies a peer for rate-limiting purposes: a Variant A public key or a Variant B/
/// Symmetric-Key device identifier.
pub type PeerKey = Vec<u8>;

pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: HashMap<PeerKey, Bucket>,
    global_tokens: u32,
    global_capacity: u32,
    global_last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration, global_capacity: u32) -> Self {
        let now = Instant::now();
        RateLimiter {
            capacity,
            window,
            buckets: HashMap::new(),
            global_tokens: global_capacity,
            global_capacity,
            global_last_refill: now,
        }
    }

    fn refill(bucket: &mut Bucket, capacity: u32, window: Duration, now: Instant) {
        if now.duration_since(bucket.last_refill) >= window {
            bucket.tokens = capacity;
            bucket.last_refill = now;
        }
    }

    /// Consult the bucket for `peer` without consuming a token; `true` if an attempt is
    /// currently permitted.
    pub fn check(&mut self, peer: &[u8], now: Instant) -> bool {
        if now.duration_since(self.global_last_refill) >= self.window {
            self.global_tokens = self.global_capacity;
            self.global_last_refill = now;
        }
        if self.global_tokens == 0 {
            return false;
        }
        let capacity = self.capacity;
        let window = self.window;
        let bucket = self
            .buckets
            .entry(peer.to_vec())
            .or_insert_with(|| Bucket {
                tokens: capacity,
                last_refill: now,
            });
        Self::refill(bucket, capacity, window, now);
        bucket.tokens > 0
    }

    /// Record a finished auth attempt (success or failure) for `peer`, consuming one token
    /// from both the peer's bucket and the global bucket — spec §7: "The peripheral
    /// increments its rate bucket for every finished auth attempt regardless of outcome."
    pub fn record_attempt(&mut self, peer: &[u8], now: Instant) {
        if self.global_tokens > 0 {
            self.global_tokens -= 1;
        }
        let capacity = self.capacity;
        let window = self.window;
        let bucket = self
            .buckets
            .entry(peer.to_vec())
            .or_insert_with(|| Bucket {
                tokens: capacity,
                last_refill: now,
            });
        Self::refill(bucket, capacity, window, now);
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
        }
    }
}
