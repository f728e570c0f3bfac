//! Sync cycle orchestration.
//!
//! ## Cycle — 5 chained steps
//!
//! 1. `load_current` (async) — read the stored manifest record.
//! 2. `diff` (sync) — compare the new manifest against it.
//! 3. `fetch` (async) — fetch changed resources one at a time, in order.
//! 4. `persist` (async) — upsert resources + replace the manifest record in
//!    one transaction.
//! 5. `complete` (sync) — hand the [`SyncReport`] back to the caller.
//!
//! Any failure ends the chain; nothing after the failing step runs. Store and
//! transport calls are blocking and run on the blocking pool; the step
//! resumes the chain when they finish.
//!
//! Step bodies run on spawned tasks. Dropping the cycle future stops the
//! fetch loop before its next request, but cancellation does not reach
//! blocking work already on the pool. The cycle guard is shared with those
//! tasks, so a new cycle cannot start until they have all finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use manisync_core::{diff, Manifest, ResourceDescriptor};
use manisync_seq::{Continuation, SequenceRunner};

use crate::error::SyncError;
use crate::store::{PersistOutcome, ResourceStore};
use crate::transport::{ManifestSource, ResourceFetcher};

type Next = Continuation<CycleState, SyncError>;

// ---------------------------------------------------------------------------
// Cycle state and results
// ---------------------------------------------------------------------------

/// Value threaded through every step of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    pub manifest_url: String,
    pub started_at: DateTime<Utc>,
    /// Supplied at cycle start; never reloaded.
    pub new_manifest: Manifest,
    pub current: Option<Manifest>,
    /// Diff result, in manifest order, without content.
    pub changed: Vec<ResourceDescriptor>,
    /// Changed resources with content attached, in fetch order.
    pub fetched: Vec<ResourceDescriptor>,
    pub persisted: Option<PersistOutcome>,
}

/// Outcome of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub manifest_url: String,
    /// Paths fetched and written, in order.
    pub fetched: Vec<String>,
    /// Declared resources that were already current.
    pub unchanged: usize,
    pub pruned: usize,
    /// `false` when nothing at all was written to the store.
    pub store_written: bool,
    pub first_sync: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.fetched.is_empty() && self.pruned == 0
    }
}

/// What a cycle would do, computed without fetching resources or writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub manifest_url: String,
    pub changed: Vec<ResourceDescriptor>,
    pub declared: usize,
    pub first_sync: bool,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Drives sync cycles for one store. Only one cycle may run at a time.
pub struct SyncCoordinator {
    store: Arc<dyn ResourceStore>,
    source: Arc<dyn ManifestSource>,
    fetcher: Arc<dyn ResourceFetcher>,
    prune: bool,
    in_flight: Arc<AtomicBool>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        source: Arc<dyn ManifestSource>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Self {
        Self {
            store,
            source,
            fetcher,
            prune: false,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Delete cached resources the new manifest no longer declares.
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Fetch the manifest at `manifest_url` and run a full cycle against it.
    pub async fn start_sync(&self, manifest_url: &str) -> Result<SyncReport, SyncError> {
        let manifest = self.fetch_manifest(manifest_url).await?;
        self.sync_manifest(manifest_url, manifest).await
    }

    /// Callback flavour of [`SyncCoordinator::start_sync`]: exactly one of
    /// `on_complete` / `on_error` is called.
    pub async fn start_sync_with<C, F>(&self, manifest_url: &str, on_complete: C, on_error: F)
    where
        C: FnOnce(),
        F: FnOnce(SyncError),
    {
        match self.start_sync(manifest_url).await {
            Ok(_) => on_complete(),
            Err(err) => on_error(err),
        }
    }

    /// Diff only: what a cycle for `manifest_url` would fetch.
    pub async fn plan(&self, manifest_url: &str) -> Result<SyncPlan, SyncError> {
        let manifest = self.fetch_manifest(manifest_url).await?;
        let store = Arc::clone(&self.store);
        let current = blocking(move || store.load_manifest()).await?;
        let changed = diff(&manifest, current.as_ref())?;
        Ok(SyncPlan {
            manifest_url: manifest_url.to_string(),
            changed,
            declared: manifest.len(),
            first_sync: current.is_none(),
        })
    }

    /// Run a full cycle for an already retrieved manifest.
    pub async fn sync_manifest(
        &self,
        manifest_url: &str,
        manifest: Manifest,
    ) -> Result<SyncReport, SyncError> {
        let guard = Arc::new(CycleGuard::acquire(&self.in_flight)?);
        tracing::info!(
            "sync {manifest_url}: {} declared resource(s)",
            manifest.len()
        );

        let (done_tx, done_rx) = oneshot::channel();
        let runner = self.build_cycle(done_tx, &guard);
        let state = CycleState {
            manifest_url: manifest_url.to_string(),
            started_at: Utc::now(),
            new_manifest: manifest,
            ..CycleState::default()
        };

        let steps = runner.start([state]).await?;
        tracing::debug!("sync cycle ran {steps} step(s)");
        done_rx
            .await
            .map_err(|_| SyncError::Join("sync cycle ended without completing".to_string()))
    }

    fn build_cycle(
        &self,
        done: oneshot::Sender<SyncReport>,
        guard: &Arc<CycleGuard>,
    ) -> SequenceRunner<CycleState, SyncError> {
        let mut seq = SequenceRunner::<CycleState, SyncError>::new();

        let store = Arc::clone(&self.store);
        let held = Arc::clone(guard);
        seq.add_async(move |args, next| {
            let state = args.into_single()?;
            load_current(store, state, next, held);
            Ok(())
        });

        seq.add_sync(|args| {
            let mut state = args.into_single()?;
            state.changed = diff(&state.new_manifest, state.current.as_ref())?;
            tracing::info!(
                "{} of {} resource(s) need fetching",
                state.changed.len(),
                state.new_manifest.len()
            );
            Ok(state)
        });

        let fetcher = Arc::clone(&self.fetcher);
        let held = Arc::clone(guard);
        seq.add_async(move |args, next| {
            let state = args.into_single()?;
            if state.changed.is_empty() {
                next.resume_with(state);
            } else {
                fetch_changed(fetcher, state, next, held);
            }
            Ok(())
        });

        let store = Arc::clone(&self.store);
        let prune = self.prune;
        let held = Arc::clone(guard);
        seq.add_async(move |args, next| {
            let state = args.into_single()?;
            let unchanged_manifest = state.current.as_ref() == Some(&state.new_manifest);
            if state.fetched.is_empty() && unchanged_manifest && !prune {
                tracing::debug!("manifest unchanged; nothing to persist");
                next.resume_with(state);
            } else {
                persist(store, state, prune, next, held);
            }
            Ok(())
        });

        seq.add_sync(move |args| {
            let state = args.into_single()?;
            let report = SyncReport {
                manifest_url: state.manifest_url,
                fetched: state.fetched.iter().map(|r| r.path.clone()).collect(),
                unchanged: state.new_manifest.len() - state.changed.len(),
                pruned: state.persisted.map_or(0, |p| p.pruned),
                store_written: state.persisted.is_some(),
                first_sync: state.current.is_none(),
                started_at: state.started_at,
                finished_at: Utc::now(),
            };
            tracing::info!(
                "sync {} complete: {} fetched, {} unchanged",
                report.manifest_url,
                report.fetched.len(),
                report.unchanged
            );
            if done.send(report).is_err() {
                tracing::warn!("sync caller went away before completion");
            }
            Ok(CycleState::default())
        });

        seq
    }

    async fn fetch_manifest(&self, manifest_url: &str) -> Result<Manifest, SyncError> {
        let source = Arc::clone(&self.source);
        let url = manifest_url.to_string();
        let text = blocking(move || source.fetch_manifest(&url)).await?;
        Ok(Manifest::from_json(&text)?)
    }
}

// ---------------------------------------------------------------------------
// Step bodies
// ---------------------------------------------------------------------------

fn load_current(
    store: Arc<dyn ResourceStore>,
    mut state: CycleState,
    next: Next,
    guard: Arc<CycleGuard>,
) {
    tokio::spawn(async move {
        let result = blocking(move || store.load_manifest())
            .await
            .map(|current| {
                state.current = current;
                state
            });
        hand_back(&next, guard, result);
    });
}

fn fetch_changed(
    fetcher: Arc<dyn ResourceFetcher>,
    state: CycleState,
    next: Next,
    guard: Arc<CycleGuard>,
) {
    tokio::spawn(async move {
        if let Some(result) = fetch_all(fetcher, state, &next).await {
            hand_back(&next, guard, result);
        }
    });
}

/// Fetch every changed resource in order. `None` once the chain is gone.
async fn fetch_all(
    fetcher: Arc<dyn ResourceFetcher>,
    mut state: CycleState,
    next: &Next,
) -> Option<Result<CycleState, SyncError>> {
    let changed = std::mem::take(&mut state.changed);
    let mut fetched = Vec::with_capacity(changed.len());
    for resource in &changed {
        if next.is_closed() {
            tracing::debug!(
                "sync cycle abandoned; {} of {} fetch(es) skipped",
                changed.len() - fetched.len(),
                changed.len()
            );
            return None;
        }
        let fetcher = Arc::clone(&fetcher);
        let url = state.manifest_url.clone();
        let path = resource.path.clone();
        match blocking(move || fetcher.fetch_resource(&url, &path)).await {
            Ok(content) => {
                tracing::debug!("fetched: {}", resource.path);
                fetched.push(ResourceDescriptor {
                    content: Some(content),
                    ..resource.clone()
                });
            }
            Err(err) => {
                tracing::warn!("fetch failed for {}: {err}", resource.path);
                return Some(Err(err));
            }
        }
    }
    state.changed = changed;
    state.fetched = fetched;
    Some(Ok(state))
}

fn persist(
    store: Arc<dyn ResourceStore>,
    mut state: CycleState,
    prune: bool,
    next: Next,
    guard: Arc<CycleGuard>,
) {
    tokio::spawn(async move {
        let resources = std::mem::take(&mut state.fetched);
        let manifest = state.new_manifest.clone();
        let result = blocking(move || {
            let outcome = store.persist(&resources, &manifest, prune)?;
            Ok((outcome, resources))
        })
        .await
        .map(|(outcome, resources)| {
            state.fetched = resources;
            state.persisted = Some(outcome);
            state
        });
        hand_back(&next, guard, result);
    });
}

/// Release the task's share of the cycle guard, then resume or fail the
/// chain. The guard must be gone before the caller can observe completion.
fn hand_back(next: &Next, guard: Arc<CycleGuard>, result: Result<CycleState, SyncError>) {
    drop(guard);
    match result {
        Ok(state) => next.resume_with(state),
        Err(err) => next.fail(err),
    }
}

async fn blocking<T, W>(work: W) -> Result<T, SyncError>
where
    T: Send + 'static,
    W: FnOnce() -> Result<T, SyncError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SyncError::Join(e.to_string()))?
}

/// Marks a cycle as running for as long as it is held. Shared by the cycle
/// future and every task it spawns.
struct CycleGuard {
    flag: Arc<AtomicBool>,
}

impl CycleGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, SyncError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::CycleInProgress)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
