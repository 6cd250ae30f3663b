//! User state manager
//!
//! Owns the tiered access path for user state: reads fall through from
//! the fast store to the durable store, writes land hot and mark the
//! user dirty, and the dirty set is drained to the durable store by the
//! background flush. All mutation goes through [`transaction`], which
//! wraps a closure in the per-user lock so concurrent writers serialize
//! instead of clobbering each other.
//!
//! [`transaction`]: UserManager::transaction

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::WardenConfig;
use crate::error::{Result, WardenError};
use crate::keys;
use crate::lock::UserLock;
use crate::pipeline::{CommandLogEntry, CommandRequest, ResponseEvent};
use crate::rng::GameRng;
use crate::state::UserState;
use crate::store::{DurableStore, FastStore};

pub struct UserManager<F: FastStore, D: DurableStore> {
    fast: Arc<F>,
    durable: Arc<D>,
    config: WardenConfig,
    rng: GameRng,
}

impl<F: FastStore, D: DurableStore> UserManager<F, D> {
    pub fn new(fast: Arc<F>, durable: Arc<D>, config: WardenConfig) -> Self {
        let rng = GameRng::from_config(config.random_seed);
        Self {
            fast,
            durable,
            config,
            rng,
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// The manager-wide random source. New and decoded states draw from
    /// clones of it, so a seeded manager replays deterministically.
    pub fn rng(&self) -> GameRng {
        self.rng.clone()
    }

    /// Load a user's state, falling through hot to cold. A cold hit is
    /// rewarmed into the fast store. With `auto_create`, an unknown user
    /// is created from the configured starting state.
    pub async fn get(&self, user_id: &str, auto_create: bool) -> Result<Option<UserState>> {
        let user_key = keys::user_key(user_id);

        if let Some(raw) = self.fast.get(&user_key).await? {
            return Ok(Some(UserState::decode(&raw, self.rng.clone())?));
        }

        if let Some(document) = self.durable.find(user_id).await? {
            let state = UserState::from_document(document, self.rng.clone());
            self.save(&state).await?;
            return Ok(Some(state));
        }

        if !auto_create {
            return Ok(None);
        }

        debug!("Creating new user {}", user_id);
        let state = UserState::create(user_id, &self.config.starting_state, self.rng.clone());
        self.save(&state).await?;
        Ok(Some(state))
    }

    /// Write a state to the fast store and mark the user dirty, in one
    /// atomic step. A save proves liveness: any expiration the record
    /// carried is cancelled, so an unflushed write can never expire out
    /// of the hot tier. The session TTL comes back when a flush cycle
    /// reads the record.
    pub async fn save(&self, state: &UserState) -> Result<()> {
        let user_id = state.user_id();
        let raw = state.encode()?;
        self.fast
            .put_and_mark(&keys::user_key(user_id), &raw, keys::DIRTY_SET_KEY, user_id)
            .await
    }

    /// Remove a user from both tiers. Returns whether either tier held
    /// the user.
    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        let existed_hot = self
            .fast
            .remove_and_unmark(&keys::user_key(user_id), keys::DIRTY_SET_KEY, user_id)
            .await?;
        let existed_cold = self.durable.delete(user_id).await?;
        Ok(existed_hot || existed_cold)
    }

    /// Run `body` over the user's state under the per-user lock.
    ///
    /// The state is fetched only after the lock is held, and written
    /// back only if `body` succeeds and the lock is still inside its
    /// validity window. On any failure nothing is persisted. The lock
    /// is released on every path; a release failure after a successful
    /// body surfaces as the transaction error.
    pub async fn transaction<T, B>(&self, user_id: &str, body: B) -> Result<T>
    where
        B: FnOnce(&mut UserState) -> Result<T>,
    {
        let mut lock = UserLock::new(
            self.fast.as_ref(),
            keys::lock_key(user_id),
            self.config.lock_validity(),
        );
        lock.acquire(
            true,
            self.config.lock_timeout(),
            self.config.lock_poll_interval(),
        )
        .await?;

        let outcome = self.locked_body(user_id, body, &lock).await;

        match lock.release().await {
            Ok(()) => outcome,
            Err(release_err) => match outcome {
                // A successful body with a failed release means the
                // validity lapsed between the check and the delete;
                // the caller must not assume exclusive execution.
                Ok(_) => Err(release_err),
                Err(body_err) => {
                    warn!(
                        "Failed to release lock for user {} after error: {}",
                        user_id, release_err
                    );
                    Err(body_err)
                }
            },
        }
    }

    async fn locked_body<T, B>(
        &self,
        user_id: &str,
        body: B,
        lock: &UserLock<'_, F>,
    ) -> Result<T>
    where
        B: FnOnce(&mut UserState) -> Result<T>,
    {
        let mut state = self
            .get(user_id, true)
            .await?
            .ok_or_else(|| WardenError::UserNotFound(user_id.to_string()))?;
        let value = body(&mut state)?;
        lock.check_validity()?;
        self.save(&state).await?;
        Ok(value)
    }

    /// Push hot states down to the durable store. With `all` every live
    /// user record is written; otherwise only users taken from the
    /// dirty set. Either way the session TTL is re-armed on every record
    /// read, which is how records that survived a shutdown without one
    /// get theirs back. Returns how many states were persisted.
    pub async fn dump_users(&self, all: bool) -> Result<u64> {
        let records: Vec<(String, String)> = if all {
            self.fast
                .snapshot_all(keys::USER_KEY_PREFIX, self.config.session_ttl())
                .await?
                .into_iter()
                .filter_map(|(key, value)| {
                    keys::user_id_from_key(&key).map(|id| (id.to_string(), value))
                })
                .collect()
        } else {
            self.fast
                .drain_marked(
                    keys::DIRTY_SET_KEY,
                    keys::USER_KEY_PREFIX,
                    self.config.session_ttl(),
                )
                .await?
        };

        let mut persisted = 0;
        for (user_id, raw) in &records {
            let document: Map<String, Value> = match serde_json::from_str(raw) {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping undecodable state for user {}: {}", user_id, e);
                    continue;
                }
            };
            self.durable.upsert(user_id, &document).await?;
            persisted += 1;
        }

        if persisted > 0 {
            debug!("Persisted {} user states to durable storage", persisted);
        }
        Ok(persisted)
    }

    /// Strip the session TTL from every hot user record so nothing
    /// expires while the process is down. Run on shutdown, after the
    /// final dump.
    pub async fn remove_ttls(&self) -> Result<u64> {
        let persisted = self.fast.persist_all(keys::USER_KEY_PREFIX).await?;
        info!("Removed TTLs from {} user records", persisted);
        Ok(persisted)
    }

    /// Number of users with a live session record
    pub async fn online_users_count(&self) -> Result<u64> {
        self.fast.key_count(keys::USER_KEY_PREFIX).await
    }

    /// Number of users modified since the last flush
    pub async fn unsaved_users_count(&self) -> Result<u64> {
        self.fast.set_size(keys::DIRTY_SET_KEY).await
    }

    /// Append one batch to the user's command audit log. A no-op unless
    /// the audit log is enabled in config.
    pub async fn log_commands(
        &self,
        user_id: &str,
        commands: &[CommandRequest],
        response: &[ResponseEvent],
    ) -> Result<()> {
        if !self.config.audit_log_enabled {
            return Ok(());
        }
        let entry = CommandLogEntry {
            ts: Utc::now().timestamp(),
            commands: commands.to_vec(),
            response: response.to_vec(),
        };
        let encoded = serde_json::to_string(&entry)?;
        self.fast
            .log_append(
                &keys::commands_key(user_id),
                &encoded,
                self.config.audit_log_size,
                self.config.audit_log_ttl(),
            )
            .await
    }

    /// Read back the user's audit log, oldest first
    pub async fn commands_log(&self, user_id: &str) -> Result<Vec<CommandLogEntry>> {
        let raw_entries = self
            .fast
            .log_entries(&keys::commands_key(user_id))
            .await?;
        let mut entries = Vec::with_capacity(raw_entries.len());
        for raw in &raw_entries {
            entries.push(serde_json::from_str(raw)?);
        }
        Ok(entries)
    }
}
