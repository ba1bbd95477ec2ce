//! Response cache with TTL, LRU eviction and single-flight fetches.
//!
//! Keys are SHA-256 digests of canonical JSON, so logically equal request
//! data always hashes the same regardless of object key order.
//!
//! Concurrent misses for one key share a single fetch: the first caller
//! becomes the leader and runs the fetch; later callers subscribe to a
//! `watch` channel and receive the leader's result, success or failure.
//! If the leader is dropped mid-fetch its followers receive
//! [`GatewayError::Abandoned`]. The in-flight marker is removed only after
//! the result has been published.
//!
//! Only successes are stored. Expiry is checked lazily on read.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::CachePolicy;
use crate::error::GatewayError;

/// Hex SHA-256 of canonicalized key data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_value(data: &Value) -> Self {
        let canonical = canonicalize(data).to_string();
        Self(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Key for one prediction: `{model, input, version}`.
    pub fn for_prediction(model_id: &str, input: &Value, version: Option<&str>) -> Self {
        Self::from_value(&serde_json::json!({
            "model": model_id,
            "input": input,
            "version": version,
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

type Settled<V> = Option<Result<V, GatewayError>>;

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub entries: usize,
}

pub struct ResponseCache<V> {
    label: String,
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<CacheKey, watch::Receiver<Settled<V>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl<V> fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("label", &self.label)
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync> ResponseCache<V> {
    /// `label` tags log lines and metrics (normally the model id).
    pub fn new(label: impl Into<String>, ttl: Duration, max_size: usize) -> Self {
        let cap = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            label: label.into(),
            ttl,
            entries: Mutex::new(LruCache::new(cap)),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn from_policy(label: impl Into<String>, policy: &CachePolicy) -> Self {
        Self::new(label, policy.ttl, policy.max_size)
    }

    /// Live entry for `key`, if any. Touches LRU order.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            trace!(cache = %self.label, key = %key, "Expired entry removed");
        }
        None
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = self.entries.lock().push(key.clone(), entry) {
            if evicted != key {
                trace!(cache = %self.label, key = %evicted, "Evicted least recently used entry");
            }
        }
    }

    /// Return the cached value for `key`, or run `fetch` once for all
    /// concurrent callers and cache a successful result.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<V, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, GatewayError>>,
    {
        if let Some(value) = self.get(key) {
            self.record("hit", &self.hits);
            return Ok(value);
        }

        let role = {
            let mut in_flight = self.in_flight.lock();
            // A leader stores before clearing its marker, so re-checking
            // here closes the gap between our miss and its publish.
            if let Some(value) = self.get(key) {
                self.record("hit", &self.hits);
                return Ok(value);
            }
            if let Some(rx) = in_flight.get(key) {
                Role::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                in_flight.insert(key.clone(), rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => {
                self.record("coalesced", &self.coalesced);
                debug!(cache = %self.label, key = %key, "Joining in-flight fetch");
                match rx.wait_for(Option::is_some).await {
                    Ok(settled) => (*settled).clone().unwrap_or(Err(GatewayError::Abandoned)),
                    Err(_) => Err(GatewayError::Abandoned),
                }
            }
            Role::Leader(tx) => {
                self.record("miss", &self.misses);
                let flight = InFlight {
                    markers: &self.in_flight,
                    key: key.clone(),
                    tx: Some(tx),
                };
                let result = fetch().await;
                if let Ok(value) = &result {
                    self.insert(key.clone(), value.clone());
                }
                flight.settle(result.clone());
                result
            }
        }
    }

    /// Remove the entry for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn record(&self, event: &'static str, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "infergate_cache_events_total",
            "model" => self.label.clone(),
            "event" => event
        )
        .increment(1);
    }
}

enum Role<V> {
    Leader(watch::Sender<Settled<V>>),
    Follower(watch::Receiver<Settled<V>>),
}

/// Owns the leader's sender. Dropping it, settled or not, closes the
/// channel and clears the marker.
struct InFlight<'a, V> {
    markers: &'a Mutex<HashMap<CacheKey, watch::Receiver<Settled<V>>>>,
    key: CacheKey,
    tx: Option<watch::Sender<Settled<V>>>,
}

impl<V> InFlight<'_, V> {
    fn settle(mut self, result: Result<V, GatewayError>) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(result));
        }
    }
}

impl<V> Drop for InFlight<'_, V> {
    fn drop(&mut self) {
        drop(self.tx.take());
        self.markers.lock().remove(&self.key);
    }
}
