//! Synchronization engine.
//!
//! This module provides the `SyncEngine`, the sole writer of the ledger
//! cache: it sequences fetches against the remote ledger service, merges
//! responses, and publishes a shared loading flag and last-error slot for
//! presentation code to observe.

pub mod engine;

pub use engine::SyncEngine;
