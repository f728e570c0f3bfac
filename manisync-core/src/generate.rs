//! Build a manifest from a directory tree.
//!
//! Paths are relative to the root, `/`-separated and sorted so the same tree
//! always yields the same manifest. The `md5` wire field carries a SHA-256
//! hex digest; it is only ever compared for equality.

use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{io_err, ManifestError};
use crate::types::{Manifest, ResourceDescriptor};

/// Manifest for every regular file under `root`.
pub fn from_dir(root: &Path) -> Result<Manifest, ManifestError> {
    from_dir_filtered(root, |_| true)
}

/// Like [`from_dir`], keeping only files whose relative path passes `keep`.
pub fn from_dir_filtered(
    root: &Path,
    keep: impl Fn(&str) -> bool,
) -> Result<Manifest, ManifestError> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort();

    let mut resources = Vec::with_capacity(files.len());
    for relative in files.into_iter().filter(|rel| keep(rel)) {
        let path = root.join(&relative);
        let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(&path, e))?;
        resources.push(ResourceDescriptor::new(
            relative,
            content_digest(&bytes),
            DateTime::<Utc>::from(modified).to_rfc3339(),
        ));
    }
    Manifest::new(resources)
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), ManifestError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}
