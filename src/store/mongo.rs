//! MongoDB-backed durable store
//!
//! One document per user, keyed by `_id` = user id. The `_id` field is
//! owned by this store: it is injected on write and stripped on read,
//! so state documents never carry it.

use bson::{doc, Document};
use mongodb::{Client, Collection};
use serde_json::{Map, Value};
use tracing::info;

use super::DurableStore;
use crate::config::MongoConfig;
use crate::error::{Result, WardenError};

pub struct MongoDurableStore {
    collection: Collection<Document>,
}

impl MongoDurableStore {
    /// Connect, ping, and bind the users collection
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        info!("Connecting to MongoDB at {}", config.uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_params = format!(
            "serverSelectionTimeoutMS={}&connectTimeoutMS={}",
            config.server_selection_timeout_ms, config.connect_timeout_ms
        );
        let timeout_uri = if config.uri.contains('?') {
            format!("{}&{}", config.uri, timeout_params)
        } else {
            format!("{}?{}", config.uri, timeout_params)
        };

        let client = Client::with_uri_str(&timeout_uri).await.map_err(|e| {
            WardenError::DurableStore(format!("Failed to connect to MongoDB: {}", e))
        })?;

        client
            .database(&config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| WardenError::DurableStore(format!("MongoDB ping failed: {}", e)))?;

        info!(
            "Connected to MongoDB database '{}', collection '{}'",
            config.database, config.collection
        );

        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        Ok(Self { collection })
    }
}

#[async_trait::async_trait]
impl DurableStore for MongoDurableStore {
    async fn upsert(&self, user_id: &str, state: &Map<String, Value>) -> Result<()> {
        let mut document = bson::to_document(state).map_err(|e| {
            WardenError::Serialization(format!("Failed to encode state for {}: {}", user_id, e))
        })?;
        document.insert("_id", user_id);

        self.collection
            .replace_one(doc! { "_id": user_id }, document)
            .upsert(true)
            .await
            .map_err(|e| {
                WardenError::DurableStore(format!("Failed to upsert user {}: {}", user_id, e))
            })?;

        Ok(())
    }

    async fn find(&self, user_id: &str) -> Result<Option<Map<String, Value>>> {
        let found = self
            .collection
            .find_one(doc! { "_id": user_id })
            .await
            .map_err(|e| {
                WardenError::DurableStore(format!("Failed to load user {}: {}", user_id, e))
            })?;

        match found {
            Some(mut document) => {
                document.remove("_id");
                let state = bson::from_document(document).map_err(|e| {
                    WardenError::Serialization(format!(
                        "Failed to decode state for {}: {}",
                        user_id, e
                    ))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": user_id })
            .await
            .map_err(|e| {
                WardenError::DurableStore(format!("Failed to delete user {}: {}", user_id, e))
            })?;

        Ok(result.deleted_count > 0)
    }
}
