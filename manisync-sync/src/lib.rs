//! # manisync-sync
//!
//! Incremental resource sync against a server-declared manifest.
//!
//! Call [`pipeline::run`] for a one-shot blocking sync, or build a
//! [`SyncCoordinator`] from your own store and transport collaborators and
//! drive [`SyncCoordinator::start_sync`] on your runtime.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod transport;

pub use config::SyncConfig;
pub use coordinator::{CycleState, SyncCoordinator, SyncPlan, SyncReport};
pub use error::SyncError;
pub use store::{PersistOutcome, ResourceStore, SqliteStore, StoredResource};
pub use transport::{HttpTransport, ManifestSource, MemoryTransport, ResourceFetcher};
