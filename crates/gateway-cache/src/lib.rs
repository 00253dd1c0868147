//! The response cache (C4, spec.md §4.4): two TTL-bound maps sharing one
//! key domain — a one-shot cache of final response bodies, and a
//! streaming-replay cache of ordered chunks with relative timestamps.
//!
//! Both are in-process (`dashmap`), matching spec.md's "acceptable:
//! external key/value store or in-process LRU" — a local, soft cache
//! with no cross-replica consistency guarantee, as specified.

pub mod key;

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use gateway_core::wire::{ChatCompletionResponse, FinishReason};

pub use key::fingerprint;

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// A TTL-bound in-process cache keyed by fingerprint string.
struct TtlStore<T> {
    entries: DashMap<String, Entry<T>>,
}

impl<T: Clone> TtlStore<T> {
    fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    fn get(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            let _ = self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn put(&self, key: String, value: T, ttl: Duration) {
        let _ = self.entries.insert(key, Entry { value, expires_at: Instant::now() + ttl });
    }
}

/// One recorded SSE frame in a replayed stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedChunk {
    pub data: String,
    pub event_id: Option<String>,
    pub event: Option<String>,
    /// Milliseconds from the start of the original stream.
    pub timestamp_ms: u64,
}

/// Metadata recorded alongside a cached stream's chunks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub finish_reason: Option<FinishReason>,
    pub total_chunks: usize,
    pub duration_ms: u64,
    pub completed: bool,
}

/// A complete cached streaming response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedStream {
    pub chunks: Vec<CachedChunk>,
    pub metadata: StreamMetadata,
}

/// The response cache: one-shot bodies plus streaming replays, sharing a
/// key domain via [`key::fingerprint`].
pub struct ResponseCache {
    one_shot: TtlStore<ChatCompletionResponse>,
    streaming: TtlStore<CachedStream>,
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            one_shot: TtlStore::new(),
            streaming: TtlStore::new(),
        }
    }

    #[must_use]
    pub fn get_one_shot(&self, key: &str) -> Option<ChatCompletionResponse> {
        let hit = self.one_shot.get(key);
        debug!(cache.key = key, cache.hit = hit.is_some(), "one-shot cache lookup");
        hit
    }

    /// `ttl_secs` should already be [`gateway_core::entities::Project::clamped_cache_duration`].
    pub fn put_one_shot(&self, key: String, response: ChatCompletionResponse, ttl_secs: i64) {
        let ttl = u64::try_from(ttl_secs).unwrap_or(0);
        self.one_shot.put(key, response, Duration::from_secs(ttl));
    }

    #[must_use]
    pub fn get_stream(&self, key: &str) -> Option<CachedStream> {
        let hit = self.streaming.get(key);
        debug!(cache.key = key, cache.hit = hit.is_some(), "streaming cache lookup");
        hit
    }

    pub fn put_stream(&self, key: String, stream: CachedStream, ttl_secs: i64) {
        let ttl = u64::try_from(ttl_secs).unwrap_or(0);
        self.streaming.put(key, stream, Duration::from_secs(ttl));
    }

    /// Pacing delay before replaying the chunk at `index`, per spec.md
    /// §4.4: `min(1000ms, nextTimestamp - prev)`.
    #[must_use]
    pub fn replay_delay_ms(chunks: &[CachedChunk], index: usize) -> u64 {
        if index == 0 {
            return 0;
        }
        let Some(current) = chunks.get(index) else { return 0 };
        let prev = chunks[index - 1].timestamp_ms;
        current.timestamp_ms.saturating_sub(prev).min(1000)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::wire::Usage;

    fn response() -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: "openai/gpt-5-nano".to_string(),
            choices: vec![],
            usage: Usage::default(),
        }
    }

    #[test]
    fn one_shot_round_trips_within_ttl() {
        let cache = ResponseCache::new();
        cache.put_one_shot("key1".to_string(), response(), 60);
        assert!(cache.get_one_shot("key1").is_some());
    }

    #[test]
    fn one_shot_misses_unknown_key() {
        let cache = ResponseCache::new();
        assert!(cache.get_one_shot("nope").is_none());
    }

    #[test]
    fn one_shot_expires_immediately_with_zero_ttl() {
        let cache = ResponseCache::new();
        cache.put_one_shot("key1".to_string(), response(), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_one_shot("key1").is_none());
    }

    #[test]
    fn streaming_round_trips_chunks_and_metadata() {
        let cache = ResponseCache::new();
        let stream = CachedStream {
            chunks: vec![
                CachedChunk { data: "a".to_string(), event_id: None, event: None, timestamp_ms: 0 },
                CachedChunk { data: "b".to_string(), event_id: None, event: None, timestamp_ms: 120 },
            ],
            metadata: StreamMetadata {
                finish_reason: Some(FinishReason::Stop),
                total_chunks: 2,
                duration_ms: 120,
                completed: true,
            },
        };
        cache.put_stream("key1".to_string(), stream, 60);
        let loaded = cache.get_stream("key1").unwrap();
        assert_eq!(loaded.chunks.len(), 2);
        assert!(loaded.metadata.completed);
    }

    #[test]
    fn replay_delay_caps_at_one_second() {
        let chunks = vec![
            CachedChunk { data: "a".to_string(), event_id: None, event: None, timestamp_ms: 0 },
            CachedChunk { data: "b".to_string(), event_id: None, event: None, timestamp_ms: 5000 },
        ];
        assert_eq!(ResponseCache::replay_delay_ms(&chunks, 1), 1000);
    }

    #[test]
    fn replay_delay_uses_actual_gap_when_small() {
        let chunks = vec![
            CachedChunk { data: "a".to_string(), event_id: None, event: None, timestamp_ms: 0 },
            CachedChunk { data: "b".to_string(), event_id: None, event: None, timestamp_ms: 40 },
        ];
        assert_eq!(ResponseCache::replay_delay_ms(&chunks, 1), 40);
    }

    #[test]
    fn replay_delay_is_zero_for_first_chunk() {
        let chunks = vec![CachedChunk { data: "a".to_string(), event_id: None, event: None, timestamp_ms: 0 }];
        assert_eq!(ResponseCache::replay_delay_ms(&chunks, 0), 0);
    }
}
