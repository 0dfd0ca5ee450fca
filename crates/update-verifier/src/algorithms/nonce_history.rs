//! # Bounded Nonce History
//!
//! Replay prevention for envelopes.
//!
//! - A nonce is forgotten once it is older than the TTL or its envelope expired
//! - At most `capacity` nonces are kept, newest first
//! - Empty nonces are never tracked

use crate::domain::NonceRecord;

/// Default capacity.
pub const DEFAULT_NONCE_CAPACITY: usize = 10_000;

/// Default TTL: 24 hours.
pub const DEFAULT_NONCE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Bounded, TTL'd set of seen nonces.
#[derive(Clone, Debug)]
pub struct NonceHistory {
    /// Newest first.
    records: Vec<NonceRecord>,
    capacity: usize,
    ttl_ms: u64,
}

impl NonceHistory {
    /// Empty history.
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        Self {
            records: Vec::new(),
            capacity: capacity.max(1),
            ttl_ms,
        }
    }

    /// History seeded from persisted records. Blank nonces are dropped.
    pub fn from_records(records: Vec<NonceRecord>, capacity: usize, ttl_ms: u64) -> Self {
        let mut history = Self::new(capacity, ttl_ms);
        history.records = records
            .into_iter()
            .filter_map(|mut r| {
                r.nonce = r.nonce.trim().to_string();
                (!r.nonce.is_empty()).then_some(r)
            })
            .collect();
        history.records.sort_by(|a, b| b.seen_at_ms.cmp(&a.seen_at_ms));
        history.records.truncate(history.capacity);
        history
    }

    /// Register a nonce. Returns `false` if it is already present and live.
    ///
    /// A blank nonce is accepted without being tracked.
    pub fn register(&mut self, nonce: &str, expires_at_ms: u64, now_ms: u64) -> bool {
        let nonce = nonce.trim();
        if nonce.is_empty() {
            return true;
        }
        self.prune(now_ms);
        if self.records.iter().any(|r| r.nonce == nonce) {
            return false;
        }
        self.records.push(NonceRecord {
            nonce: nonce.to_string(),
            seen_at_ms: now_ms,
            expires_at_ms,
        });
        self.records.sort_by(|a, b| b.seen_at_ms.cmp(&a.seen_at_ms));
        self.records.truncate(self.capacity);
        true
    }

    /// Drop records past their TTL or envelope expiry.
    pub fn prune(&mut self, now_ms: u64) {
        let ttl = self.ttl_ms;
        self.records.retain(|r| {
            now_ms.saturating_sub(r.seen_at_ms) <= ttl
                && !(r.expires_at_ms > 0 && now_ms > r.expires_at_ms)
        });
    }

    /// Nonce is tracked.
    pub fn contains(&self, nonce: &str) -> bool {
        let nonce = nonce.trim();
        self.records.iter().any(|r| r.nonce == nonce)
    }

    /// Records, newest first.
    pub fn records(&self) -> &[NonceRecord] {
        &self.records
    }

    /// Number of tracked nonces.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Nothing tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for NonceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_CAPACITY, DEFAULT_NONCE_TTL_MS)
    }
}
