//! Configuration for the state-management core
//!
//! Plain structs with defaults and environment overrides. The embedding
//! process owns CLI parsing and env loading; everything here reads
//! already-set variables.

use serde_json::{Map, Value};
use std::time::Duration;

/// Configuration for the user manager, lock, and flush cycle
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Hot-tier TTL re-armed on every flushed record (default: 2 days)
    pub session_ttl_secs: u64,
    /// How long a lock holder may assume exclusivity (default: 60s)
    pub lock_validity_secs: u64,
    /// Hard deadline for a blocking lock acquisition (default: 10s)
    pub lock_timeout_ms: u64,
    /// Pause between lock acquisition attempts (default: 5ms)
    pub lock_poll_interval_ms: u64,
    /// Pause between durable sync cycles (default: 30s)
    pub flush_interval_secs: u64,
    /// Whether command batches are appended to the per-user audit list
    pub audit_log_enabled: bool,
    /// Audit list length limit, oldest entries trimmed (default: 10)
    pub audit_log_size: usize,
    /// Audit list TTL (default: 1 hour)
    pub audit_log_ttl_secs: u64,
    /// Seed for the shared random source; a fixed default applies when unset
    pub random_seed: Option<u64>,
    /// Template deep-copied for every newly created user
    pub starting_state: Map<String, Value>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 2 * 24 * 60 * 60, // 2 days
            lock_validity_secs: 60,
            lock_timeout_ms: 10_000,
            lock_poll_interval_ms: 5,
            flush_interval_secs: 30,
            audit_log_enabled: false,
            audit_log_size: 10,
            audit_log_ttl_secs: 60 * 60, // 1 hour
            random_seed: None,
            starting_state: default_starting_state(),
        }
    }
}

impl WardenConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WARDEN_SESSION_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.session_ttl_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("WARDEN_LOCK_VALIDITY_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.lock_validity_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("WARDEN_LOCK_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.lock_timeout_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("WARDEN_LOCK_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.lock_poll_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("WARDEN_FLUSH_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.flush_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("WARDEN_AUDIT_LOG_ENABLED") {
            config.audit_log_enabled = val == "1" || val.eq_ignore_ascii_case("true");
        }

        if let Ok(val) = std::env::var("WARDEN_AUDIT_LOG_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.audit_log_size = size;
            }
        }

        if let Ok(val) = std::env::var("WARDEN_RANDOM_SEED") {
            if let Ok(seed) = val.parse::<u64>() {
                config.random_seed = Some(seed);
            }
        }

        config
    }

    /// Lock validity window as a duration
    pub fn lock_validity(&self) -> Duration {
        Duration::from_secs(self.lock_validity_secs)
    }

    /// Lock acquisition deadline as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Lock polling pause as a duration
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    /// Hot-tier record TTL as a duration
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Durable sync interval as a duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Audit list TTL as a duration
    pub fn audit_log_ttl(&self) -> Duration {
        Duration::from_secs(self.audit_log_ttl_secs)
    }
}

/// Minimal reserved-key skeleton for newly created users
fn default_starting_state() -> Map<String, Value> {
    let mut state = Map::new();
    state.insert("resources".to_string(), Value::Object(Map::new()));
    state.insert("map".to_string(), Value::Object(Map::new()));
    state.insert("active_processes".to_string(), Value::Object(Map::new()));
    state.insert("_id_counter".to_string(), Value::from(0));
    state
}

/// Configuration for the durable MongoDB tier
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// Connection URI (default: mongodb://localhost:27017)
    pub uri: String,
    /// Database name (default: game)
    pub database: String,
    /// Collection holding user documents (default: users)
    pub collection: String,
    /// Connect timeout in milliseconds (default: 3000)
    pub connect_timeout_ms: u64,
    /// Server selection timeout in milliseconds (default: 3000)
    pub server_selection_timeout_ms: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "game".to_string(),
            collection: "users".to_string(),
            connect_timeout_ms: 3000,
            server_selection_timeout_ms: 3000,
        }
    }
}

impl MongoConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WARDEN_MONGO_URI") {
            config.uri = val;
        }

        if let Ok(val) = std::env::var("WARDEN_MONGO_DATABASE") {
            config.database = val;
        }

        if let Ok(val) = std::env::var("WARDEN_MONGO_COLLECTION") {
            config.collection = val;
        }

        if let Ok(val) = std::env::var("WARDEN_MONGO_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.connect_timeout_ms = ms;
                config.server_selection_timeout_ms = ms;
            }
        }

        config
    }
}
