//! threadkeep - session and response store for chat assistants
//!
//! This library keeps per-user conversation sessions durable across restarts
//! and short-circuits repeated questions with a bounded response cache.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session and message types, title derivation, timestamps
//! - `storage`: Storage backend contract with SQLite and JSON file variants
//! - `store`: Session store with the bounded in-memory working set
//! - `cache`: FIFO-bounded response cache keyed by query fingerprint
//! - `registry`: Per-owner store and cache contexts
//! - `dispatcher`: One user turn through store, cache and reply generator
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use threadkeep::{Config, Role, SessionStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/threadkeep.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let mut store = SessionStore::open(&config, Some("alice"))?;
//!     let id = store.create_session(None)?;
//!     store.append_message(&id, Role::User, "What is a B-tree?")?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod session;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheStats, ResponseCache};
pub use config::Config;
pub use dispatcher::{Dispatcher, GenerationRequest, Reply, ReplyGenerator};
pub use error::{Result, ThreadkeepError};
pub use registry::{OwnerContext, StoreRegistry};
pub use session::{ChatMessage, Role, Session};
pub use storage::{BackendKind, SessionSummary, StorageBackend};
pub use store::{SessionListing, SessionStore, StoreStats};

#[cfg(test)]
pub mod test_utils;
