//! SplitSync - a client-side ledger cache for shared group expenses.
//!
//! The crate keeps a local mirror of a group-expense backend: groups, their
//! members and expenses, per-group and per-member balances, and the approval
//! state of settlement votes. All server traffic goes through the
//! [`api::LedgerGateway`] trait so the sync engine can be driven against a
//! real HTTP backend or an in-memory test double.
//!
//! Typical use:
//!
//! ```no_run
//! use splitsync::{Config, LedgerClient, SyncEngine};
//! use splitsync::models::User;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load().unwrap_or_default();
//! let client = LedgerClient::from_config(&config)?;
//! let engine = SyncEngine::new(client, User { id: 1, name: "Andy".into() });
//! engine.load_initial_data().await;
//! for group in engine.groups(splitsync::models::GroupStatus::Active) {
//!     println!("{}", group.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod consensus;
pub mod models;
pub mod summary;
pub mod sync;
pub mod utils;

pub use api::{ApiError, ApiResult, LedgerClient, LedgerGateway};
pub use cache::LedgerCache;
pub use config::Config;
pub use sync::SyncEngine;
