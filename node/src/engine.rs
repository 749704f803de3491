//! Wires a [`ValidatedConfig`] into an engine over the SQLite ledger.

use crate::ValidatedConfig;
use anyhow::{Context, Result};
use mora_execution::{Engine, LogListener, RngSource, StaticPremium};
use mora_ledger::SqliteLedger;
use std::sync::Arc;
use tracing::info;

pub type NodeEngine = Engine<SqliteLedger>;

/// Open the ledger and build the engine.
pub fn build(config: &ValidatedConfig) -> Result<NodeEngine> {
    let ledger = SqliteLedger::open(&config.database, config.busy_timeout)
        .with_context(|| format!("Could not open ledger {}", config.database.display()))?;
    build_with_ledger(config, ledger)
}

pub fn build_with_ledger(config: &ValidatedConfig, ledger: SqliteLedger) -> Result<NodeEngine> {
    let rng = match config.seed {
        Some(seed) => RngSource::seeded(seed),
        None => RngSource::from_entropy(),
    };
    let premium = StaticPremium::new(
        config.premium_users.iter().copied(),
        config.admin_users.iter().copied(),
    );
    let engine = Engine::builder(Arc::new(ledger))
        .config(config.engine.clone())
        .rng(rng)
        .premium(Arc::new(premium))
        .listener(Arc::new(LogListener))
        .build()
        .context("Invalid engine configuration")?;
    info!(
        games = engine.registry().active_games().len(),
        seeded = config.seed.is_some(),
        "engine ready"
    );
    Ok(engine)
}
