//! Fast-store key layout
//!
//! All user data shares one keyspace with fixed prefixes:
//! `user:{id}` for state records, `user_lock:{id}` for locks,
//! `user_commands:{id}` for audit lists, and a single `modified_users`
//! set tracking records that still need a durable sync.

/// Prefix for hot-tier user state records
pub const USER_KEY_PREFIX: &str = "user:";
/// Prefix for per-user lock keys
pub const LOCK_KEY_PREFIX: &str = "user_lock:";
/// Prefix for per-user command audit lists
pub const COMMANDS_KEY_PREFIX: &str = "user_commands:";
/// Set of user ids written since the last durable sync
pub const DIRTY_SET_KEY: &str = "modified_users";

/// Key of a user's hot-tier state record
pub fn user_key(user_id: &str) -> String {
    format!("{}{}", USER_KEY_PREFIX, user_id)
}

/// Key of a user's mutual-exclusion lock
pub fn lock_key(user_id: &str) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, user_id)
}

/// Key of a user's command audit list
pub fn commands_key(user_id: &str) -> String {
    format!("{}{}", COMMANDS_KEY_PREFIX, user_id)
}

/// Extract the user id from a state record key
pub fn user_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(USER_KEY_PREFIX)
}
