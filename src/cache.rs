//! Response cache
//!
//! Bounded map from a normalized query fingerprint to a previously generated
//! reply. Eviction is strict first-in-first-out: reads never refresh an
//! entry's position, and overwriting an existing key keeps its slot.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// Number of replies kept when no capacity is configured
pub const DEFAULT_CAPACITY: usize = 50;

/// Fingerprint of a query: SHA-256 of its trimmed, lowercased text
///
/// # Examples
///
/// ```
/// use threadkeep::cache::fingerprint;
///
/// assert_eq!(fingerprint("  What is Rust? "), fingerprint("what is rust?"));
/// assert_ne!(fingerprint("what is rust"), fingerprint("what is rust?"));
/// ```
pub fn fingerprint(query: &str) -> String {
    format!("{:x}", Sha256::digest(query.trim().to_lowercase().as_bytes()))
}

/// Hit/miss counters and occupancy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
    /// `hits / (hits + misses)`, 0.0 before any lookup
    pub hit_rate: f64,
}

/// FIFO-bounded reply cache
#[derive(Debug, Clone)]
pub struct ResponseCache {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ResponseCache {
    /// Creates an empty cache holding at most `capacity` replies
    ///
    /// A capacity of zero stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up the reply cached for `query`, counting a hit or a miss
    pub fn get(&mut self, query: &str) -> Option<String> {
        match self.entries.get(&fingerprint(query)) {
            Some(reply) => {
                self.hits += 1;
                metrics::increment_counter!("response_cache_hits_total");
                Some(reply.clone())
            }
            None => {
                self.misses += 1;
                metrics::increment_counter!("response_cache_misses_total");
                None
            }
        }
    }

    /// Stores `reply` for `query`, evicting the oldest entry when full
    pub fn put(&mut self, query: &str, reply: &str) {
        if self.capacity == 0 {
            return;
        }
        let key = fingerprint(query);
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = reply.to_string();
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    tracing::debug!("Evicted cached reply {}", &oldest[..12]);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, reply.to_string());
    }

    /// Whether a reply is cached for `query`; does not count as a lookup
    pub fn contains(&self, query: &str) -> bool {
        self.entries.contains_key(&fingerprint(query))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry; counters are kept
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            capacity: self.capacity,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}
