//! Command pipeline
//!
//! Clients send batches of named commands. A batch resolves against the
//! registry up front, then executes in order inside a single user
//! transaction: every command sees the writes of the ones before it,
//! and either the whole batch commits or none of it does. The response
//! is the flattened event list from all commands.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, WardenError};
use crate::manager::UserManager;
use crate::state::UserState;
use crate::store::{DurableStore, FastStore};

// ============================================================================
// Wire types
// ============================================================================

/// One command as requested by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Value::Null,
        }
    }

    pub fn with_arguments(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// One event in a batch response. Serializes flat: the payload fields
/// sit next to `event_id` rather than nested under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub event_id: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ResponseEvent {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// One audit-log record: a batch and what it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub ts: i64,
    pub commands: Vec<CommandRequest>,
    pub response: Vec<ResponseEvent>,
}

// ============================================================================
// Commands
// ============================================================================

/// Static game-design data shared by every command: item definitions,
/// prices, recipes. Loaded once at startup and never written by the
/// pipeline.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Map<String, Value>,
}

impl Catalog {
    pub fn new(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }
}

/// A named game action. Implementations mutate the state in place and
/// describe what happened as response events; returning an error
/// discards every write the batch has made.
pub trait Command: Send + Sync {
    fn execute(
        &self,
        state: &mut UserState,
        catalog: &Catalog,
        arguments: &Value,
    ) -> Result<Vec<ResponseEvent>>;
}

/// Name-to-command table, fixed after startup
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: Command + 'static>(&mut self, name: impl Into<String>, command: C) {
        self.commands.insert(name.into(), Arc::new(command));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Command>> {
        self.commands
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::UnknownCommand(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct CommandPipeline<F: FastStore, D: DurableStore> {
    manager: Arc<UserManager<F, D>>,
    registry: Arc<CommandRegistry>,
    catalog: Arc<Catalog>,
}

impl<F: FastStore, D: DurableStore> CommandPipeline<F, D> {
    pub fn new(
        manager: Arc<UserManager<F, D>>,
        registry: Arc<CommandRegistry>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            manager,
            registry,
            catalog,
        }
    }

    pub fn manager(&self) -> &Arc<UserManager<F, D>> {
        &self.manager
    }

    /// Execute a batch for one user.
    ///
    /// Every name is resolved before the user lock is taken, so a batch
    /// with an unknown command fails without executing anything. An
    /// empty batch still commits the (possibly just created) state.
    pub async fn run(
        &self,
        user_id: &str,
        batch: &[CommandRequest],
    ) -> Result<Vec<ResponseEvent>> {
        let mut resolved = Vec::with_capacity(batch.len());
        for request in batch {
            resolved.push(self.registry.resolve(&request.name)?);
        }

        let catalog = Arc::clone(&self.catalog);
        let requests: Vec<CommandRequest> = batch.to_vec();
        let events = self
            .manager
            .transaction(user_id, move |state| {
                let mut events = Vec::new();
                for (command, request) in resolved.iter().zip(requests.iter()) {
                    events.extend(command.execute(state, &catalog, &request.arguments)?);
                }
                Ok(events)
            })
            .await?;

        info!(
            "Executed {} commands for user {}: [{}] -> {} events",
            batch.len(),
            user_id,
            batch
                .iter()
                .map(|request| request.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            events.len()
        );

        // The batch already committed; a logging failure is not worth
        // failing the response over
        if let Err(e) = self.manager.log_commands(user_id, batch, &events).await {
            warn!("Failed to record command log for user {}: {}", user_id, e);
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    impl Command for Noop {
        fn execute(
            &self,
            _state: &mut UserState,
            _catalog: &Catalog,
            _arguments: &Value,
        ) -> Result<Vec<ResponseEvent>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_request_arguments_default_to_null() {
        let request: CommandRequest =
            serde_json::from_value(json!({"name": "collect"})).expect("deserializes");
        assert_eq!(request.name, "collect");
        assert_eq!(request.arguments, Value::Null);
    }

    #[test]
    fn test_response_event_serializes_flat() {
        let event = ResponseEvent::new("resources_changed").with("gold", json!(5));
        let encoded = serde_json::to_value(&event).expect("serializes");
        assert_eq!(
            encoded,
            json!({"event_id": "resources_changed", "gold": 5})
        );

        let decoded: ResponseEvent = serde_json::from_value(encoded).expect("deserializes");
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_log_entry_round_trip() {
        let entry = CommandLogEntry {
            ts: 1_700_000_000,
            commands: vec![CommandRequest::with_arguments("build", json!({"what": "barn"}))],
            response: vec![ResponseEvent::new("built").with("what", json!("barn"))],
        };
        let raw = serde_json::to_string(&entry).expect("serializes");
        let decoded: CommandLogEntry = serde_json::from_str(&raw).expect("deserializes");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_registry_resolves_registered_names() {
        let mut registry = CommandRegistry::new();
        assert!(registry.is_empty());
        registry.register("noop", Noop);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["noop"]);
        assert!(registry.resolve("noop").is_ok());

        let err = registry
            .resolve("missing")
            .err()
            .expect("Should fail to resolve");
        assert!(matches!(err, WardenError::UnknownCommand(name) if name == "missing"));
    }

    #[test]
    fn test_catalog_lookup() {
        let mut entries = Map::new();
        entries.insert("barn".to_string(), json!({"cost": {"wood": 10}}));
        let catalog = Catalog::new(entries);

        assert_eq!(catalog.get("barn"), Some(&json!({"cost": {"wood": 10}})));
        assert_eq!(catalog.get("silo"), None);
        assert_eq!(catalog.entries().len(), 1);
    }
}
