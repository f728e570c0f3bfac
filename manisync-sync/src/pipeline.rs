//! Blocking sync entrypoints used by the CLI.
//!
//! Each call opens the configured store, wires an [`HttpTransport`], and
//! drives the coordinator on a single-threaded runtime.

use std::future::Future;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::coordinator::{SyncCoordinator, SyncPlan, SyncReport};
use crate::error::SyncError;
use crate::store::SqliteStore;
use crate::transport::HttpTransport;

/// Run one full sync cycle for `manifest_url`.
pub fn run(config: &SyncConfig, manifest_url: &str) -> Result<SyncReport, SyncError> {
    let coordinator = coordinator_for(config)?;
    block_on(coordinator.start_sync(manifest_url))?
}

/// Compute what [`run`] would fetch without fetching or writing anything.
pub fn plan(config: &SyncConfig, manifest_url: &str) -> Result<SyncPlan, SyncError> {
    let coordinator = coordinator_for(config)?;
    block_on(coordinator.plan(manifest_url))?
}

/// Open the store named by `config`.
pub fn open_store(config: &SyncConfig) -> Result<SqliteStore, SyncError> {
    SqliteStore::open(&config.db_path)
}

fn coordinator_for(config: &SyncConfig) -> Result<SyncCoordinator, SyncError> {
    let store = Arc::new(open_store(config)?);
    let transport = Arc::new(HttpTransport::new(config));
    Ok(SyncCoordinator::new(store, transport.clone(), transport).with_prune(config.prune))
}

fn block_on<F: Future>(future: F) -> Result<F::Output, SyncError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SyncError::Runtime)?;
    Ok(runtime.block_on(future))
}
