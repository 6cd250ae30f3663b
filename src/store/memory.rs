//! In-process store implementations
//!
//! `MemoryFastStore` keeps every structure behind a single async mutex,
//! so each trait method is one critical section. TTLs are enforced
//! lazily against `Instant::now()`; a zero TTL is already expired.
//!
//! These back the test suites and single-node deployments that do not
//! run an external cache.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{DurableStore, FastStore};
use crate::error::Result;

struct FastEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct LogState {
    items: Vec<String>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct FastInner {
    entries: HashMap<String, FastEntry>,
    sets: HashMap<String, HashSet<String>>,
    logs: HashMap<String, LogState>,
}

fn expired(expires_at: &Option<Instant>) -> bool {
    matches!(expires_at, Some(at) if Instant::now() >= *at)
}

fn purge_expired(inner: &mut FastInner, key: &str) {
    if let Some(entry) = inner.entries.get(key) {
        if expired(&entry.expires_at) {
            inner.entries.remove(key);
        }
    }
}

/// Hot tier backed by process memory
#[derive(Default)]
pub struct MemoryFastStore {
    inner: Mutex<FastInner>,
}

impl MemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FastStore for MemoryFastStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        purge_expired(&mut inner, key);
        if inner.entries.contains_key(key) {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            FastEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        purge_expired(&mut inner, key);
        match inner.entries.get(key) {
            Some(entry) if entry.value == expected => {
                inner.entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        purge_expired(&mut inner, key);
        Ok(inner.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put_and_mark(
        &self,
        key: &str,
        value: &str,
        set_key: &str,
        member: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.insert(
            key.to_string(),
            FastEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        inner
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove_and_unmark(&self, key: &str, set_key: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        purge_expired(&mut inner, key);
        let existed = inner.entries.remove(key).is_some();
        if let Some(set) = inner.sets.get_mut(set_key) {
            set.remove(member);
            if set.is_empty() {
                inner.sets.remove(set_key);
            }
        }
        Ok(existed)
    }

    async fn drain_marked(
        &self,
        set_key: &str,
        key_prefix: &str,
        ttl: Duration,
    ) -> Result<Vec<(String, String)>> {
        let mut inner = self.inner.lock().await;
        let mut members: Vec<String> = inner
            .sets
            .remove(set_key)
            .unwrap_or_default()
            .into_iter()
            .collect();
        members.sort();

        let mut drained = Vec::new();
        for member in members {
            let key = format!("{}{}", key_prefix, member);
            purge_expired(&mut inner, &key);
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.expires_at = Some(Instant::now() + ttl);
                drained.push((member, entry.value.clone()));
            }
        }
        Ok(drained)
    }

    async fn snapshot_all(
        &self,
        key_prefix: &str,
        ttl: Duration,
    ) -> Result<Vec<(String, String)>> {
        let mut inner = self.inner.lock().await;
        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(key_prefix) && expired(&entry.expires_at))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            inner.entries.remove(&key);
        }

        let mut records: Vec<(String, String)> = Vec::new();
        for (key, entry) in inner.entries.iter_mut() {
            if key.starts_with(key_prefix) {
                entry.expires_at = Some(Instant::now() + ttl);
                records.push((key.clone(), entry.value.clone()));
            }
        }
        records.sort();
        Ok(records)
    }

    async fn persist_all(&self, key_prefix: &str) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut persisted = 0;
        for (key, entry) in inner.entries.iter_mut() {
            if key.starts_with(key_prefix)
                && !expired(&entry.expires_at)
                && entry.expires_at.take().is_some()
            {
                persisted += 1;
            }
        }
        Ok(persisted)
    }

    async fn key_count(&self, key_prefix: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        let count = inner
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(key_prefix) && !expired(&entry.expires_at))
            .count();
        Ok(count as u64)
    }

    async fn set_size(&self, set_key: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.sets.get(set_key).map(|set| set.len()).unwrap_or(0) as u64)
    }

    async fn log_append(
        &self,
        log_key: &str,
        entry: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let log = inner.logs.entry(log_key.to_string()).or_default();
        if expired(&log.expires_at) {
            log.items.clear();
        }
        log.items.push(entry.to_string());
        let excess = log.items.len().saturating_sub(max_len);
        if excess > 0 {
            log.items.drain(..excess);
        }
        log.expires_at = Some(Instant::now() + ttl);
        Ok(())
    }

    async fn log_entries(&self, log_key: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        match inner.logs.get(log_key) {
            Some(log) if expired(&log.expires_at) => {
                inner.logs.remove(log_key);
                Ok(Vec::new())
            }
            Some(log) => Ok(log.items.clone()),
            None => Ok(Vec::new()),
        }
    }
}

/// Cold tier backed by process memory
#[derive(Default)]
pub struct MemoryDurableStore {
    documents: Mutex<HashMap<String, Map<String, Value>>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted documents
    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl DurableStore for MemoryDurableStore {
    async fn upsert(&self, user_id: &str, state: &Map<String, Value>) -> Result<()> {
        self.documents
            .lock()
            .await
            .insert(user_id.to_string(), state.clone());
        Ok(())
    }

    async fn find(&self, user_id: &str) -> Result<Option<Map<String, Value>>> {
        Ok(self.documents.lock().await.get(user_id).cloned())
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.documents.lock().await.remove(user_id).is_some())
    }
}
