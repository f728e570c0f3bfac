//! End-to-end sync cycles against an in-memory SQLite store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use manisync_core::{Manifest, ResourceDescriptor};
use manisync_sync::{
    MemoryTransport, PersistOutcome, ResourceFetcher, ResourceStore, SqliteStore,
    StoredResource, SyncCoordinator, SyncError,
};

const URL: &str = "http://host/manifest.json";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn manifest_json(entries: &[(&str, &str)]) -> String {
    let resources: Vec<String> = entries
        .iter()
        .map(|(path, md5)| format!(r#"{{"path":"{path}","md5":"{md5}","time":"2014"}}"#))
        .collect();
    format!(r#"{{"js":{{"resources":[{}]}}}}"#, resources.join(","))
}

/// Store wrapper counting `persist` calls.
struct CountingStore {
    inner: SqliteStore,
    persists: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().expect("store"),
            persists: AtomicUsize::new(0),
        }
    }
}

impl ResourceStore for CountingStore {
    fn load_manifest(&self) -> Result<Option<Manifest>, SyncError> {
        self.inner.load_manifest()
    }

    fn persist(
        &self,
        resources: &[ResourceDescriptor],
        manifest: &Manifest,
        prune: bool,
    ) -> Result<PersistOutcome, SyncError> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        self.inner.persist(resources, manifest, prune)
    }

    fn load_resource(&self, path: &str) -> Result<Option<ResourceDescriptor>, SyncError> {
        self.inner.load_resource(path)
    }

    fn list_resources(&self) -> Result<Vec<StoredResource>, SyncError> {
        self.inner.list_resources()
    }
}

/// Fetcher that records start/finish events and flags overlapping fetches.
#[derive(Default)]
struct RecordingFetcher {
    events: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ResourceFetcher for RecordingFetcher {
    fn fetch_resource(&self, _manifest_url: &str, path: &str) -> Result<String, SyncError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("start {path}"));
        std::thread::sleep(Duration::from_millis(5));
        self.events.lock().unwrap().push(format!("done {path}"));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("body of {path}"))
    }
}

/// Fetcher that blocks each request for `delay` and counts started requests.
struct SlowFetcher {
    delay: Duration,
    started: AtomicUsize,
}

impl SlowFetcher {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }
}

impl ResourceFetcher for SlowFetcher {
    fn fetch_resource(&self, _manifest_url: &str, path: &str) -> Result<String, SyncError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(format!("body of {path}"))
    }
}

fn site(entries: &[(&str, &str)]) -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert(URL, manifest_json(entries));
    for (path, md5) in entries {
        transport.insert(format!("http://host/{path}"), format!("{path}@{md5}"));
    }
    transport
}

// ---------------------------------------------------------------------------
// 1. First sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_sync_fetches_persists_and_completes_once() {
    init_logging();
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let transport = site(&[("a.js", "1"), ("b.css", "2")]);
    let sync = SyncCoordinator::new(store.clone(), transport.clone(), transport.clone());

    let completions = AtomicUsize::new(0);
    let mut failure = None;
    sync.start_sync_with(
        URL,
        || {
            completions.fetch_add(1, Ordering::SeqCst);
        },
        |err| failure = Some(err),
    )
    .await;

    assert!(failure.is_none(), "unexpected failure: {failure:?}");
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(
        transport.requests(),
        [URL, "http://host/a.js", "http://host/b.css"]
    );
    let a = store.load_resource("a.js").unwrap().expect("a.js row");
    assert_eq!(a.content.as_deref(), Some("a.js@1"));
    let stored = store.load_manifest().unwrap().expect("manifest record");
    let expected = Manifest::from_json(&manifest_json(&[("a.js", "1"), ("b.css", "2")])).unwrap();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn report_describes_first_sync() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let transport = site(&[("a.js", "1"), ("b.css", "2")]);
    let sync = SyncCoordinator::new(store, transport.clone(), transport);

    let report = sync.start_sync(URL).await.expect("sync");
    assert!(report.first_sync);
    assert!(report.store_written);
    assert_eq!(report.fetched, ["a.js", "b.css"]);
    assert_eq!(report.unchanged, 0);
    assert!(report.finished_at >= report.started_at);
}

// ---------------------------------------------------------------------------
// 2. Incremental sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_manifest_fetches_and_writes_nothing() {
    let store = Arc::new(CountingStore::new());
    let transport = site(&[("a.js", "1"), ("b.css", "2")]);
    let sync = SyncCoordinator::new(store.clone(), transport.clone(), transport.clone());

    sync.start_sync(URL).await.expect("first sync");
    assert_eq!(store.persists.load(Ordering::SeqCst), 1);

    transport.clear_requests();
    let report = sync.start_sync(URL).await.expect("second sync");
    assert!(report.is_noop());
    assert!(!report.store_written);
    assert_eq!(report.unchanged, 2);
    assert_eq!(transport.requests(), [URL]);
    assert_eq!(store.persists.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn only_changed_and_new_resources_are_fetched() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let transport = site(&[("a", "1"), ("b", "2")]);
    let sync = SyncCoordinator::new(store.clone(), transport.clone(), transport.clone());
    sync.start_sync(URL).await.expect("first sync");

    transport.insert(URL, manifest_json(&[("a", "1"), ("b", "9"), ("c", "5")]));
    transport.insert("http://host/b", "b@9");
    transport.insert("http://host/c", "c@5");
    transport.clear_requests();

    let report = sync.start_sync(URL).await.expect("second sync");
    assert_eq!(report.fetched, ["b", "c"]);
    assert_eq!(report.unchanged, 1);
    assert_eq!(
        transport.requests(),
        [URL, "http://host/b", "http://host/c"]
    );
    assert_eq!(
        store.load_resource("b").unwrap().unwrap().content.as_deref(),
        Some("b@9")
    );
    assert_eq!(
        store.load_resource("a").unwrap().unwrap().content.as_deref(),
        Some("a@1")
    );
}

#[tokio::test]
async fn removed_resources_stay_cached_unless_pruning() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let transport = site(&[("a", "1"), ("b", "2")]);
    let sync = SyncCoordinator::new(store.clone(), transport.clone(), transport.clone());
    sync.start_sync(URL).await.expect("first sync");

    transport.insert(URL, manifest_json(&[("a", "1")]));
    let report = sync.start_sync(URL).await.expect("second sync");
    assert!(report.fetched.is_empty());
    assert_eq!(report.pruned, 0);
    assert!(store.load_resource("b").unwrap().is_some());
    assert_eq!(store.load_manifest().unwrap().unwrap().len(), 1);

    let pruning = SyncCoordinator::new(store.clone(), transport.clone(), transport).with_prune(true);
    let report = pruning.start_sync(URL).await.expect("pruning sync");
    assert_eq!(report.pruned, 1);
    assert!(store.load_resource("b").unwrap().is_none());
}

// ---------------------------------------------------------------------------
// 3. Ordering
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetches_are_strictly_serial_in_diff_order() {
    init_logging();
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let source = site(&[("r1", "1"), ("r2", "1"), ("r3", "1")]);
    let fetcher = Arc::new(RecordingFetcher::default());
    let sync = SyncCoordinator::new(store.clone(), source, fetcher.clone());

    sync.start_sync(URL).await.expect("sync");

    assert_eq!(
        *fetcher.events.lock().unwrap(),
        ["start r1", "done r1", "start r2", "done r2", "start r3", "done r3"]
    );
    assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
    let paths: Vec<String> = store
        .list_resources()
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(paths, ["r1", "r2", "r3"]);
}

// ---------------------------------------------------------------------------
// 4. Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_failure_discards_everything_fetched() {
    init_logging();
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let transport = site(&[("a", "1"), ("b", "2"), ("c", "3")]);
    transport.remove("http://host/b");
    let sync = SyncCoordinator::new(store.clone(), transport.clone(), transport.clone());

    let mut completed = false;
    let mut failure = None;
    sync.start_sync_with(URL, || completed = true, |err| failure = Some(err))
        .await;

    assert!(!completed);
    assert!(matches!(failure, Some(SyncError::Transport { .. })), "got: {failure:?}");
    assert_eq!(
        transport.requests(),
        [URL, "http://host/a", "http://host/b"],
        "fetching must stop at the first failure"
    );
    assert_eq!(store.resource_count().unwrap(), 0);
    assert_eq!(store.load_manifest().unwrap(), None);
}

#[tokio::test]
async fn malformed_manifest_aborts_before_touching_store() {
    let store = Arc::new(CountingStore::new());
    let transport = Arc::new(MemoryTransport::new());
    transport.insert(URL, r#"{"js":{"resorces":[]}}"#);
    let sync = SyncCoordinator::new(store.clone(), transport.clone(), transport);

    let err = sync.start_sync(URL).await.unwrap_err();
    assert!(matches!(err, SyncError::Manifest(_)), "got: {err}");
    assert_eq!(store.persists.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn plan_reports_without_fetching_resources() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let transport = site(&[("a", "1"), ("b", "2")]);
    let sync = SyncCoordinator::new(store.clone(), transport.clone(), transport.clone());

    let plan = sync.plan(URL).await.expect("plan");
    assert!(plan.first_sync);
    assert_eq!(plan.declared, 2);
    assert_eq!(plan.changed.len(), 2);
    assert_eq!(transport.requests(), [URL]);
    assert_eq!(store.load_manifest().unwrap(), None);
}

// ---------------------------------------------------------------------------
// 5. Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropped_cycle_stops_fetching_and_frees_the_coordinator() {
    init_logging();
    let paths: Vec<String> = (0..10).map(|i| format!("r{i}")).collect();
    let entries: Vec<(&str, &str)> = paths.iter().map(|p| (p.as_str(), "1")).collect();
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let source = site(&entries);
    let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(40)));
    let sync = SyncCoordinator::new(store.clone(), source, fetcher.clone());

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), sync.start_sync(URL)).await;
    assert!(abandoned.is_err(), "cycle should still be fetching");
    let at_cancel = fetcher.started.load(Ordering::SeqCst);
    assert!(at_cancel < entries.len());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let later = fetcher.started.load(Ordering::SeqCst);
    assert!(
        later <= at_cancel + 1,
        "fetching continued after the cycle was dropped: {at_cancel} -> {later}"
    );
    assert_eq!(store.resource_count().unwrap(), 0);
    assert_eq!(store.load_manifest().unwrap(), None);

    let report = sync.start_sync(URL).await.expect("fresh cycle");
    assert_eq!(report.fetched.len(), entries.len());
}
