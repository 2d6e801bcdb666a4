//! One-time receipt store
//!
//! In-memory storage for check-in receipts with TTL support. A receipt is
//! good for exactly one successful [`consume`](OneTimeTokenStore::consume)
//! per [`issue`](OneTimeTokenStore::issue). Receipts are never persisted and
//! are lost on restart.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::debug;

/// Stored receipt with remaining uses and expiry
#[derive(Debug, Clone)]
struct ReceiptEntry {
    /// Outstanding issues not yet consumed
    remaining: u32,
    /// When this entry expires (absolute time)
    expires_at: Instant,
}

/// Receipt store with concurrent access
pub struct OneTimeTokenStore {
    receipts: DashMap<String, ReceiptEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl OneTimeTokenStore {
    /// Create a new store
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            receipts: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Register a receipt for one later validation
    ///
    /// `max_entries` is a soft bound: the capacity check and the insert are
    /// separate map operations, so issuers racing on new tokens can each
    /// push the store one entry past it until the next full issue evicts.
    pub fn issue(&self, token: &str) {
        self.evict_expired();

        if !self.receipts.contains_key(token) && self.receipts.len() >= self.max_entries {
            self.evict_soonest();
        }

        let expires_at = Instant::now() + self.ttl;
        let mut entry = self
            .receipts
            .entry(token.to_string())
            .or_insert(ReceiptEntry {
                remaining: 0,
                expires_at,
            });
        entry.remaining += 1;
        entry.expires_at = expires_at;

        debug!(remaining = entry.remaining, "Receipt issued");
    }

    /// Validate and burn one use of a receipt
    pub fn consume(&self, token: &str) -> bool {
        let now = Instant::now();
        let mut accepted = false;

        self.receipts.remove_if_mut(token, |_, entry| {
            if entry.expires_at <= now {
                return true;
            }
            accepted = true;
            entry.remaining -= 1;
            entry.remaining == 0
        });

        accepted
    }

    /// Drop every expired receipt, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.receipts.len();
        self.receipts.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.receipts.len());
        if removed > 0 {
            debug!(removed, "Evicted expired receipts");
        }
        removed
    }

    /// Number of distinct outstanding receipts
    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    fn evict_soonest(&self) {
        let soonest = self
            .receipts
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());

        if let Some(token) = soonest {
            self.receipts.remove(&token);
            debug!("Receipt store full, evicted oldest receipt");
        }
    }
}

/// Receipt for a check-in: hex SHA-256 of the place id followed by the secret
pub fn receipt_hash(place_id: i64, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(place_id.to_string().as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn store() -> OneTimeTokenStore {
        OneTimeTokenStore::new(Duration::from_secs(60), 100)
    }

    #[test]
    fn test_consume_exactly_once() {
        let store = store();
        store.issue("abc");

        assert!(store.consume("abc"));
        assert!(!store.consume("abc"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_token_rejected() {
        let store = store();
        assert!(!store.consume("never-issued"));
    }

    #[test]
    fn test_repeated_issue_allows_repeated_consume() {
        let store = store();
        store.issue("same");
        store.issue("same");

        assert_eq!(store.len(), 1);
        assert!(store.consume("same"));
        assert!(store.consume("same"));
        assert!(!store.consume("same"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let store = OneTimeTokenStore::new(Duration::from_millis(0), 10);
        store.issue("late");
        assert!(!store.consume("late"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let store = OneTimeTokenStore::new(Duration::from_secs(60), 2);
        store.issue("a");
        store.issue("b");
        store.issue("c");

        assert_eq!(store.len(), 2);
        assert!(store.consume("c"));
    }

    #[test]
    fn test_concurrent_issue_and_consume() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let store = Arc::new(OneTimeTokenStore::new(Duration::from_secs(60), 2 * THREADS * PER_THREAD));

        let issuers: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        store.issue(&format!("receipt-{}-{}", t, i));
                    }
                })
            })
            .collect();
        for handle in issuers {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), THREADS * PER_THREAD);

        let accepted = Arc::new(AtomicUsize::new(0));
        let consumers: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = store.clone();
                let accepted = accepted.clone();
                thread::spawn(move || {
                    for t in 0..THREADS {
                        for i in 0..PER_THREAD {
                            if store.consume(&format!("receipt-{}-{}", t, i)) {
                                accepted.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in consumers {
            handle.join().unwrap();
        }

        assert_eq!(accepted.load(Ordering::SeqCst), THREADS * PER_THREAD);
        assert!(store.is_empty());
    }

    #[test]
    fn test_racing_consumers_accept_once() {
        let store = Arc::new(store());
        store.issue("contested");

        let barrier = Arc::new(Barrier::new(8));
        let winners: usize = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.consume("contested")
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_receipt_hash_format() {
        let hash = receipt_hash(12, "secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, receipt_hash(12, "secret"));
        assert_ne!(hash, receipt_hash(13, "secret"));
    }
}
