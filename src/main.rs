//! SplitSync CLI - a diagnostic front end for the ledger cache.
//!
//! Connects to the expense backend, performs a full initial sync for the
//! configured user, and prints the cached groups and balances. Useful for
//! verifying connectivity and inspecting what the cache holds.

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use splitsync::models::GroupStatus;
use splitsync::summary::{self, BalanceFilter};
use splitsync::utils::format::{describe_balance, format_amount};
use splitsync::{Config, LedgerClient, LedgerGateway, SyncEngine};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("SplitSync starting");

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    let client = LedgerClient::from_config(&config).context("failed to build API client")?;

    // Resolve the current user: the configured id if it still exists on the
    // server, otherwise the first known user.
    let users = client.list_users().await.context("failed to list users")?;
    let current_user = config
        .last_user_id
        .and_then(|id| users.iter().find(|u| u.id == id))
        .or_else(|| users.first())
        .cloned()
        .context("server has no users")?;

    info!("Syncing as {} (id {})", current_user.name, current_user.id);
    let engine = SyncEngine::new(client, current_user.clone());
    engine.load_initial_data().await;

    if let Some(err) = engine.last_error() {
        warn!("Initial sync completed with errors: {}", err);
    }

    let lines = engine.balance_lines();
    println!("User: {}", current_user.name);
    println!(
        "Overall: {}",
        describe_balance(summary::total_for(&lines, BalanceFilter::All))
    );
    println!();

    let active = engine.groups(GroupStatus::Active);
    println!("Active groups ({}):", active.len());
    for group in &active {
        let net = engine
            .group_balance(group.id)
            .map(|b| b.net)
            .unwrap_or(0.0);
        println!("  {:<24} {}", group.name, format_amount(net));
    }

    engine.load_settled_groups().await;
    let settled = engine.groups(GroupStatus::Settled);
    if !settled.is_empty() {
        println!();
        println!("Settled groups ({}):", settled.len());
        for group in &settled {
            println!("  {}", group.name);
        }
    }

    Ok(())
}
