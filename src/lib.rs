//! Warden - state management core for multiplayer game backends
//!
//! Warden keeps per-user game state consistent across a hot cache tier
//! and a durable document store, and runs client command batches as
//! atomic transactions over that state.
//!
//! ## Pieces
//!
//! - **Lock**: per-user distributed lock with token ownership and TTL takeover
//! - **Store**: `FastStore` / `DurableStore` tiers, in-memory and MongoDB backed
//! - **Manager**: tiered reads, dirty tracking, locked transactions
//! - **Pipeline**: named command batches with all-or-nothing commit
//! - **Stash**: declarative randomized resource bundles
//! - **Flush**: background persistence worker

pub mod config;
pub mod error;
pub mod flush;
pub mod keys;
pub mod lock;
pub mod manager;
pub mod pipeline;
pub mod rng;
pub mod stash;
pub mod state;
pub mod store;

pub use config::{MongoConfig, WardenConfig};
pub use error::{LockFailure, Result, WardenError};
pub use flush::{spawn_flush_task, FlushHandle};
pub use lock::UserLock;
pub use manager::UserManager;
pub use pipeline::{
    Catalog, Command, CommandLogEntry, CommandPipeline, CommandRegistry, CommandRequest,
    ResponseEvent,
};
pub use rng::GameRng;
pub use stash::{Stash, StashOperand, StashValue};
pub use state::UserState;
pub use store::{DurableStore, FastStore, MemoryDurableStore, MemoryFastStore, MongoDurableStore};
