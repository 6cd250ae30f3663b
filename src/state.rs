//! Per-user game state
//!
//! A `UserState` is a JSON document plus the random source its stash
//! operations draw from. The document layout is open: commands read and
//! write whatever keys they need, while a handful of reserved keys
//! (`user_id`, `registration_time`, `new_user`, `resources`,
//! `_id_counter`) are managed through typed accessors.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::{Result, WardenError};
use crate::rng::GameRng;
use crate::stash::Stash;

pub const USER_ID_FIELD: &str = "user_id";
pub const REGISTRATION_TIME_FIELD: &str = "registration_time";
pub const NEW_USER_FIELD: &str = "new_user";
pub const RESOURCES_FIELD: &str = "resources";
pub const ID_COUNTER_FIELD: &str = "_id_counter";

/// One user's full game state
#[derive(Debug, Clone)]
pub struct UserState {
    data: Map<String, Value>,
    rng: GameRng,
}

impl UserState {
    /// Fresh state for a first-time user, built from the configured
    /// starting template
    pub fn create(user_id: &str, template: &Map<String, Value>, rng: GameRng) -> Self {
        let mut data = template.clone();
        data.insert(USER_ID_FIELD.to_string(), Value::from(user_id));
        data.insert(
            REGISTRATION_TIME_FIELD.to_string(),
            Value::from(Utc::now().timestamp()),
        );
        data.insert(NEW_USER_FIELD.to_string(), Value::from(true));
        data.entry(RESOURCES_FIELD.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        data.entry(ID_COUNTER_FIELD.to_string())
            .or_insert_with(|| Value::from(0));
        Self { data, rng }
    }

    /// Wrap a document already loaded from a store
    pub fn from_document(data: Map<String, Value>, rng: GameRng) -> Self {
        Self { data, rng }
    }

    /// Parse a state out of its stored JSON string form
    pub fn decode(raw: &str, rng: GameRng) -> Result<Self> {
        let data: Map<String, Value> = serde_json::from_str(raw)?;
        Ok(Self { data, rng })
    }

    /// Serialize to the JSON string form kept in the fast store
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }

    pub fn user_id(&self) -> &str {
        self.data
            .get(USER_ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn registration_time(&self) -> i64 {
        self.data
            .get(REGISTRATION_TIME_FIELD)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Set on creation, cleared once the client has seen the state
    pub fn is_new_user(&self) -> bool {
        self.data
            .get(NEW_USER_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_new_user(&mut self, new_user: bool) {
        self.data
            .insert(NEW_USER_FIELD.to_string(), Value::from(new_user));
    }

    /// The user's resources as a stash bound to this state's random
    /// source. Changes are written back with [`set_resources`].
    ///
    /// [`set_resources`]: UserState::set_resources
    pub fn resources(&self) -> Stash {
        match self.data.get(RESOURCES_FIELD).and_then(Value::as_object) {
            Some(map) => Stash::from_amounts(map, self.rng.clone()),
            None => Stash::empty(self.rng.clone()),
        }
    }

    pub fn set_resources(&mut self, resources: &Stash) {
        self.data.insert(
            RESOURCES_FIELD.to_string(),
            Value::Object(resources.to_map()),
        );
    }

    /// Next value of the per-user id counter. Used by commands that
    /// create keyed sub-objects (buildings, processes, orders).
    pub fn next_local_id(&mut self) -> Result<i64> {
        let next = self
            .data
            .get(ID_COUNTER_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                WardenError::CommandFailed(format!(
                    "state for {} has no usable {}",
                    self.user_id(),
                    ID_COUNTER_FIELD
                ))
            })?
            + 1;
        self.data
            .insert(ID_COUNTER_FIELD.to_string(), Value::from(next));
        Ok(next)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn rng(&self) -> &GameRng {
        &self.rng
    }

    /// Raw document view
    pub fn document(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_document(self) -> Map<String, Value> {
        self.data
    }
}
