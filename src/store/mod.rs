//! Two-tier storage behind the user manager
//!
//! The fast store holds live session records as JSON strings with a
//! TTL, plus the small coordination structures around them: the lock
//! keys, the dirty set, and per-user command logs. The durable store
//! keeps one document per user and is only touched on cold reads and
//! background flushes.
//!
//! Every `FastStore` method is atomic with respect to the others. The
//! compound operations (`put_and_mark`, `drain_marked`, ...) exist so
//! callers never have to compose multi-step sequences themselves.

mod memory;
mod mongo;

pub use memory::{MemoryDurableStore, MemoryFastStore};
pub use mongo::MongoDurableStore;

use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::Result;

/// Hot tier: string records, sets, and logs with millisecond access
#[async_trait::async_trait]
pub trait FastStore: Send + Sync {
    /// Store `value` under `key` only when the key is absent, arming
    /// `ttl`. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only when it currently holds `expected`. Returns
    /// whether the delete happened.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Read a string record, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a record with no expiration, cancelling any it carried,
    /// and add `member` to `set_key` in one step. A record never
    /// expires between this write and the dump that persists it; only
    /// [`drain_marked`] and [`snapshot_all`] arm expirations.
    ///
    /// [`drain_marked`]: FastStore::drain_marked
    /// [`snapshot_all`]: FastStore::snapshot_all
    async fn put_and_mark(
        &self,
        key: &str,
        value: &str,
        set_key: &str,
        member: &str,
    ) -> Result<()>;

    /// Delete a record and drop `member` from `set_key` in one step.
    /// Returns whether the record existed.
    async fn remove_and_unmark(&self, key: &str, set_key: &str, member: &str) -> Result<bool>;

    /// Empty `set_key` and read the record at `key_prefix + member` for
    /// each taken member, re-arming `ttl` on it. Members whose record is
    /// gone are skipped. Returns `(member, value)` pairs.
    async fn drain_marked(
        &self,
        set_key: &str,
        key_prefix: &str,
        ttl: Duration,
    ) -> Result<Vec<(String, String)>>;

    /// Read every live record whose key starts with `key_prefix`,
    /// re-arming `ttl` on each. Records that had no expiration get one
    /// again, which is what ends the persistence window opened by
    /// [`persist_all`] on the last shutdown.
    /// Returns `(key, value)` pairs with the full key.
    ///
    /// [`persist_all`]: FastStore::persist_all
    async fn snapshot_all(&self, key_prefix: &str, ttl: Duration)
        -> Result<Vec<(String, String)>>;

    /// Remove the TTL from every record under `key_prefix`, returning
    /// how many were made persistent
    async fn persist_all(&self, key_prefix: &str) -> Result<u64>;

    /// Count live records under `key_prefix`
    async fn key_count(&self, key_prefix: &str) -> Result<u64>;

    /// Current cardinality of a set
    async fn set_size(&self, set_key: &str) -> Result<u64>;

    /// Append to a capped log: push `entry`, keep the newest `max_len`
    /// entries, re-arm `ttl` on the whole log
    async fn log_append(
        &self,
        log_key: &str,
        entry: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<()>;

    /// Read a log oldest-first
    async fn log_entries(&self, log_key: &str) -> Result<Vec<String>>;
}

/// Cold tier: one document per user
#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or fully replace the user's document
    async fn upsert(&self, user_id: &str, state: &Map<String, Value>) -> Result<()>;

    /// Load a user's document, `None` when the user was never persisted
    async fn find(&self, user_id: &str) -> Result<Option<Map<String, Value>>>;

    /// Delete a user's document, returning whether one existed
    async fn delete(&self, user_id: &str) -> Result<bool>;
}
