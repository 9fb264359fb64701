//! Response cache keyed by a canonical request hash.
//!
//! Only non-streaming responses that completed with `FinishReason::Stop`
//! are cached. Expired entries are evicted lazily on read; when the entry
//! count exceeds the ceiling, the oldest ~10% by insertion time are
//! removed (recency-based, not frequency-based).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

use modelhub_types::chat::{FinishReason, ModelRequest, ModelResponse};

/// One cached response with its bookkeeping.
struct CacheEntry {
    response: ModelResponse,
    inserted_at: Instant,
    ttl: Duration,
    hits: u64,
    size_bytes: usize,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub total_size_bytes: usize,
}

/// In-memory response cache with TTL and recency-based eviction.
pub struct ResponseCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    max_entries: usize,
}

/// Deterministic cache key over the semantically relevant request fields:
/// messages, the explicit model (empty when the router will choose),
/// max_tokens, and temperature. Requests differing only in irrelevant
/// metadata hash identically.
pub fn cache_key(request: &ModelRequest) -> String {
    let canonical = serde_json::json!({
        "messages": request.messages,
        "model": request.model.as_deref().unwrap_or(""),
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
            ttl,
            max_entries,
        }
    }

    /// Look up a cached response. Returns a clone with `cached = true` and
    /// bumps the hit counter. An expired entry is evicted and reported as
    /// a miss.
    pub fn get(&self, key: &str) -> Option<ModelResponse> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<ModelResponse> {
        let mut state = self.state.lock().expect("cache lock poisoned");

        match state.entries.get(key).map(|entry| entry.expired(now)) {
            None => {
                state.misses += 1;
                None
            }
            Some(true) => {
                state.entries.remove(key);
                state.misses += 1;
                None
            }
            Some(false) => {
                state.hits += 1;
                let entry = state.entries.get_mut(key).expect("entry checked above");
                entry.hits += 1;
                let mut response = entry.response.clone();
                response.cached = true;
                Some(response)
            }
        }
    }

    /// Store a completed response. No-op for anything other than a
    /// non-cached response that finished with `Stop` -- partial, filtered,
    /// and tool-call responses are never served from cache.
    pub fn put(&self, key: String, response: &ModelResponse) {
        self.put_at(key, response, Instant::now());
    }

    fn put_at(&self, key: String, response: &ModelResponse, now: Instant) {
        if response.finish_reason != FinishReason::Stop || response.cached {
            return;
        }

        let size_bytes = serde_json::to_vec(response).map(|v| v.len()).unwrap_or(0);
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.entries.insert(
            key,
            CacheEntry {
                response: response.clone(),
                inserted_at: now,
                ttl: self.ttl,
                hits: 0,
                size_bytes,
            },
        );

        if state.entries.len() > self.max_entries {
            evict_oldest(&mut state.entries, self.max_entries);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().expect("cache lock poisoned");
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            total_size_bytes: state.entries.values().map(|e| e.size_bytes).sum(),
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.entries.clear();
    }
}

/// Remove the oldest ~10% of entries by insertion time.
fn evict_oldest(entries: &mut HashMap<String, CacheEntry>, max_entries: usize) {
    let evict_count = (max_entries / 10).max(1);
    let mut by_age: Vec<(String, Instant)> = entries
        .iter()
        .map(|(k, e)| (k.clone(), e.inserted_at))
        .collect();
    by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
    for (key, _) in by_age.into_iter().take(evict_count) {
        entries.remove(&key);
    }
}
