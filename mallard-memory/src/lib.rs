//! In-memory reference cache backend.
//!
//! Use this for single-process caching and in tests. Entries live in a
//! concurrent map; expiry is checked on read and expired entries are removed
//! lazily, so the backend never needs a sweeper task.
//!
//! Cloning is cheap — clones share the same underlying map.

#![warn(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use mallard_backend::{BackendResult, CacheBackend};
use mallard_core::CacheKey;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct StoredEntry {
    payload: Bytes,
    expires_at: DateTime<Utc>,
}

/// Concurrent-map cache backend with per-entry expiry.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    entries: Arc<DashMap<CacheKey, StoredEntry>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries currently held, expired ones included.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

fn expiry_for(ttl: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    Utc::now()
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn add(
        &self,
        key: &CacheKey,
        payload: Bytes,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> BackendResult<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let entry = StoredEntry {
            payload,
            expires_at: expiry_for(ttl),
        };
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn try_get(
        &self,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> BackendResult<Option<Bytes>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let now = Utc::now();
        if let Some(entry) = self.entries.get(key)
            && entry.expires_at > now
        {
            return Ok(Some(entry.payload.clone()));
        }
        // Lazy removal; re-checked under the shard lock so a concurrent
        // re-add with a fresh expiry is not evicted.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn clear(&self, _cancel: &CancellationToken) -> BackendResult<()> {
        self.entries.clear();
        Ok(())
    }
}
