//! User manager integration tests
//!
//! Exercises the full tiered path over the in-memory stores:
//! - auto-creation and hot/cold fall-through on reads
//! - locked transactions, including failure and concurrency behavior
//! - dirty tracking, dumps, and the background flush worker
//! - deletion across both tiers

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use warden::{
    spawn_flush_task, DurableStore, MemoryDurableStore, MemoryFastStore, UserManager, WardenConfig,
    WardenError,
};

fn test_config() -> WardenConfig {
    WardenConfig {
        random_seed: Some(7),
        ..WardenConfig::default()
    }
}

fn build_manager() -> (
    Arc<UserManager<MemoryFastStore, MemoryDurableStore>>,
    Arc<MemoryDurableStore>,
) {
    build_manager_with(test_config())
}

fn build_manager_with(
    config: WardenConfig,
) -> (
    Arc<UserManager<MemoryFastStore, MemoryDurableStore>>,
    Arc<MemoryDurableStore>,
) {
    let fast = Arc::new(MemoryFastStore::new());
    let durable = Arc::new(MemoryDurableStore::new());
    let manager = Arc::new(UserManager::new(fast, Arc::clone(&durable), config));
    (manager, durable)
}

// =============================================================================
// Reads and Creation
// =============================================================================

#[tokio::test]
async fn test_get_auto_creates_once() {
    let (manager, _durable) = build_manager();

    let first = manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");
    assert_eq!(first.user_id(), "alice");
    assert!(first.is_new_user());
    assert!(first.registration_time() > 0);

    // Second read comes back from the hot tier, not a fresh create
    let second = manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should exist");
    assert_eq!(second.registration_time(), first.registration_time());
    assert_eq!(manager.online_users_count().await.expect("count"), 1);
}

#[tokio::test]
async fn test_get_without_auto_create() {
    let (manager, _durable) = build_manager();
    let missing = manager.get("nobody", false).await.expect("Should load");
    assert!(missing.is_none());
    assert_eq!(manager.online_users_count().await.expect("count"), 0);
}

#[tokio::test]
async fn test_created_state_uses_starting_template() {
    let mut config = test_config();
    config.starting_state = json!({"resources": {"gold": 5}, "map": {}})
        .as_object()
        .expect("object")
        .clone();
    let fast = Arc::new(MemoryFastStore::new());
    let durable = Arc::new(MemoryDurableStore::new());
    let manager = UserManager::new(fast, durable, config);

    let state = manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");
    assert_eq!(state.resources().get("gold"), 5);
    assert_eq!(state.get("map"), Some(&json!({})));
}

#[tokio::test]
async fn test_cold_read_rewarms_hot_tier() {
    let (manager, durable) = build_manager();
    let seeded = json!({"user_id": "bob", "gold": 12, "_id_counter": 3})
        .as_object()
        .expect("object")
        .clone();
    assert_ok!(durable.upsert("bob", &seeded).await);

    let state = manager
        .get("bob", false)
        .await
        .expect("Should load")
        .expect("Should find persisted user");
    assert_eq!(state.get("gold"), Some(&json!(12)));

    // The cold hit is now live and marked for the next flush
    assert_eq!(manager.online_users_count().await.expect("count"), 1);
    assert_eq!(manager.unsaved_users_count().await.expect("count"), 1);
}

#[tokio::test]
async fn test_save_round_trips_unknown_keys() {
    let (manager, _durable) = build_manager();
    let mut state = manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");

    state.set("quests", json!([{"id": 1, "done": false}]));
    assert_ok!(manager.save(&state).await);

    let reread = manager
        .get("alice", false)
        .await
        .expect("Should load")
        .expect("Should exist");
    assert_eq!(reread.get("quests"), Some(&json!([{"id": 1, "done": false}])));
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn test_transaction_persists_changes() {
    let (manager, _durable) = build_manager();

    let wood = manager
        .transaction("alice", |state| {
            let mut resources = state.resources();
            resources.add(("wood", 10))?;
            state.set_resources(&resources);
            Ok(state.resources().get("wood"))
        })
        .await
        .expect("Should run transaction");
    assert_eq!(wood, 10);

    let state = manager
        .get("alice", false)
        .await
        .expect("Should load")
        .expect("Should exist");
    assert_eq!(state.resources().get("wood"), 10);
    assert_eq!(manager.unsaved_users_count().await.expect("count"), 1);
}

#[tokio::test]
async fn test_failed_transaction_discards_changes_and_frees_lock() {
    let (manager, _durable) = build_manager();
    manager
        .transaction("alice", |state| {
            state.set("gold", json!(1));
            Ok(())
        })
        .await
        .expect("Should run transaction");

    let err = manager
        .transaction("alice", |state| {
            state.set("gold", json!(999));
            Err::<(), _>(WardenError::CommandFailed("not enough wood".to_string()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::CommandFailed(_)));

    // Nothing persisted from the failed body
    let state = manager
        .get("alice", false)
        .await
        .expect("Should load")
        .expect("Should exist");
    assert_eq!(state.get("gold"), Some(&json!(1)));

    // And the lock is available again
    manager
        .transaction("alice", |state| {
            state.set("gold", json!(2));
            Ok(())
        })
        .await
        .expect("Should run after failed transaction");
}

#[tokio::test]
async fn test_concurrent_transactions_serialize() {
    let (manager, _durable) = build_manager();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                manager
                    .transaction("alice", |state| {
                        let current = state.get("counter").and_then(Value::as_i64).unwrap_or(0);
                        state.set("counter", json!(current + 1));
                        Ok(())
                    })
                    .await
                    .expect("Should run transaction");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("Should join");
    }

    let state = manager
        .get("alice", false)
        .await
        .expect("Should load")
        .expect("Should exist");
    assert_eq!(state.get("counter").and_then(Value::as_i64), Some(100));
}

// =============================================================================
// Dumps and Dirty Tracking
// =============================================================================

#[tokio::test]
async fn test_dump_dirty_then_nothing() {
    let (manager, durable) = build_manager();
    manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");
    manager
        .get("bob", true)
        .await
        .expect("Should load")
        .expect("Should create");
    assert_eq!(manager.unsaved_users_count().await.expect("count"), 2);

    assert_eq!(manager.dump_users(false).await.expect("dump"), 2);
    assert_eq!(durable.len().await, 2);
    assert_eq!(manager.unsaved_users_count().await.expect("count"), 0);

    // Nothing dirty left
    assert_eq!(manager.dump_users(false).await.expect("dump"), 0);
}

#[tokio::test]
async fn test_dump_picks_up_new_modifications() {
    let (manager, durable) = build_manager();
    manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");
    manager.dump_users(false).await.expect("dump");

    manager
        .transaction("alice", |state| {
            state.set("gold", json!(77));
            Ok(())
        })
        .await
        .expect("Should run transaction");

    assert_eq!(manager.dump_users(false).await.expect("dump"), 1);
    let doc = durable
        .find("alice")
        .await
        .expect("find")
        .expect("persisted");
    assert_eq!(doc.get("gold"), Some(&json!(77)));
}

#[tokio::test]
async fn test_dump_all_ignores_dirty_set() {
    let (manager, durable) = build_manager();
    manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");
    manager
        .get("bob", true)
        .await
        .expect("Should load")
        .expect("Should create");

    manager.dump_users(false).await.expect("dump");
    assert_eq!(manager.unsaved_users_count().await.expect("count"), 0);

    // Full dump rewrites every live record even with an empty dirty set
    assert_eq!(manager.dump_users(true).await.expect("dump"), 2);
    assert_eq!(durable.len().await, 2);
}

#[tokio::test]
async fn test_unflushed_save_survives_session_expiry() {
    // Zero session TTL: if a save armed an expiration, the record would
    // be gone before the flush could persist it
    let mut config = test_config();
    config.session_ttl_secs = 0;
    let (manager, durable) = build_manager_with(config);

    manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");

    assert_eq!(manager.online_users_count().await.expect("count"), 1);
    assert_eq!(
        manager.dump_users(false).await.expect("Should dump"),
        1,
        "the unflushed write reaches the durable tier"
    );
    assert!(durable.find("alice").await.expect("find").is_some());
}

#[tokio::test]
async fn test_remove_ttls_reports_count() {
    let (manager, _durable) = build_manager();
    manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");
    manager
        .get("bob", true)
        .await
        .expect("Should load")
        .expect("Should create");

    // Fresh saves carry no expiration; the flush pass arms it
    assert_eq!(manager.dump_users(false).await.expect("Should dump"), 2);
    assert_eq!(manager.remove_ttls().await.expect("remove ttls"), 2);
    assert_eq!(manager.remove_ttls().await.expect("remove ttls"), 0);
}

// =============================================================================
// Deletion
// =============================================================================

#[tokio::test]
async fn test_delete_clears_both_tiers() {
    let (manager, durable) = build_manager();
    manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");
    manager.dump_users(false).await.expect("dump");
    assert_eq!(durable.len().await, 1);

    assert!(manager.delete("alice").await.expect("delete"));
    assert!(manager
        .get("alice", false)
        .await
        .expect("Should load")
        .is_none());
    assert!(durable.is_empty().await);
    assert_eq!(manager.unsaved_users_count().await.expect("count"), 0);

    assert!(!manager.delete("alice").await.expect("delete"));
}

// =============================================================================
// Flush Worker
// =============================================================================

#[tokio::test]
async fn test_flush_worker_cycles_and_final_dump() {
    let (manager, durable) = build_manager();
    manager
        .get("alice", true)
        .await
        .expect("Should load")
        .expect("Should create");

    let handle = spawn_flush_task(Arc::clone(&manager), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(durable.len().await, 1, "first cycle persists the user");

    manager
        .transaction("alice", |state| {
            state.set("gold", json!(99));
            Ok(())
        })
        .await
        .expect("Should run transaction");

    // Shutdown runs one final dump before returning
    handle.shutdown().await;
    let doc = durable
        .find("alice")
        .await
        .expect("find")
        .expect("persisted");
    assert_eq!(doc.get("gold"), Some(&json!(99)));
}
