//! Fetch collaborators: where manifests and resource bodies come from.
//!
//! [`HttpTransport`] serves `http(s)://` locations with `ureq` and `file://`
//! locations or bare paths from disk. [`MemoryTransport`] serves a fixed map
//! and records every request, for tests and offline fixtures.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use url::Url;

use crate::config::SyncConfig;
use crate::error::{io_err, transport_err, SyncError};

/// Retrieves the manifest document.
pub trait ManifestSource: Send + Sync {
    fn fetch_manifest(&self, url: &str) -> Result<String, SyncError>;
}

/// Retrieves one resource body. `path` is resolved against `manifest_url`
/// with [`resolve_locator`].
pub trait ResourceFetcher: Send + Sync {
    fn fetch_resource(&self, manifest_url: &str, path: &str) -> Result<String, SyncError>;
}

/// Resolve a resource `path` against the manifest's location.
///
/// URL manifests resolve with [`Url::join`]: absolute URLs win, `//host/…`
/// switches host, `/rooted` keeps the origin, and `.`/`..` segments are
/// normalized. A manifest given as a bare filesystem path resolves `path`
/// against its parent directory.
pub fn resolve_locator(manifest_url: &str, path: &str) -> Result<String, SyncError> {
    match Url::parse(manifest_url) {
        Ok(base) => base
            .join(path)
            .map(String::from)
            .map_err(|e| transport_err(manifest_url, format!("cannot resolve '{path}': {e}"))),
        Err(_) => {
            if let Ok(absolute) = Url::parse(path) {
                return Ok(absolute.into());
            }
            let dir = Path::new(manifest_url).parent().unwrap_or(Path::new(""));
            Ok(dir.join(path).display().to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP / file transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build();
        Self { agent }
    }

    /// GET `location` and return the body as text.
    pub fn get(&self, location: &str) -> Result<String, SyncError> {
        let Ok(url) = Url::parse(location) else {
            return read_file(Path::new(location));
        };
        match url.scheme() {
            "http" | "https" => self.get_http(location),
            "file" => read_file(&file_path(&url)?),
            other => Err(transport_err(location, format!("unsupported scheme '{other}'"))),
        }
    }

    fn get_http(&self, url: &str) -> Result<String, SyncError> {
        tracing::debug!("GET {url}");
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(transport_err(url, format!("HTTP status {code}")))
            }
            Err(err) => return Err(transport_err(url, err)),
        };
        // `into_string` caps bodies at 10 MB; resources have no size limit.
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| transport_err(url, e))?;
        Ok(body)
    }
}

fn file_path(url: &Url) -> Result<PathBuf, SyncError> {
    url.to_file_path()
        .map_err(|()| transport_err(url.as_str(), "not a local file path"))
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

fn read_file(path: &Path) -> Result<String, SyncError> {
    tracing::debug!("read {}", path.display());
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(transport_err(
            path.display().to_string(),
            "file not found",
        )),
        Err(err) => Err(io_err(path, err)),
    }
}

impl ManifestSource for HttpTransport {
    fn fetch_manifest(&self, url: &str) -> Result<String, SyncError> {
        self.get(url)
    }
}

impl ResourceFetcher for HttpTransport {
    fn fetch_resource(&self, manifest_url: &str, path: &str) -> Result<String, SyncError> {
        self.get(&resolve_locator(manifest_url, path)?)
    }
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

/// Serves bodies from a map keyed by resolved location.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    bodies: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `location`, replacing any previous body.
    pub fn insert(&self, location: impl Into<String>, body: impl Into<String>) {
        self.bodies.lock().insert(location.into(), body.into());
    }

    /// Stop serving `location`; later requests fail with a transport error.
    pub fn remove(&self, location: &str) {
        self.bodies.lock().remove(location);
    }

    /// Every location requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn get(&self, location: &str) -> Result<String, SyncError> {
        self.requests.lock().push(location.to_string());
        self.bodies
            .lock()
            .get(location)
            .cloned()
            .ok_or_else(|| transport_err(location, "HTTP status 404"))
    }
}

impl ManifestSource for MemoryTransport {
    fn fetch_manifest(&self, url: &str) -> Result<String, SyncError> {
        self.get(url)
    }
}

impl ResourceFetcher for MemoryTransport {
    fn fetch_resource(&self, manifest_url: &str, path: &str) -> Result<String, SyncError> {
        self.get(&resolve_locator(manifest_url, path)?)
    }
}
