//! Manifest differ: which resources of a new manifest must be (re)fetched.
//!
//! Rules, applied to each descriptor of the new manifest in order:
//! 1. No previous manifest at all → fetch (full install).
//! 2. Path unknown to the previous manifest → fetch (new resource).
//! 3. Path known but `content_hash` differs → fetch (changed resource).
//! 4. Otherwise → skip.
//!
//! Resources that only exist in the previous manifest are never reported;
//! removal policy belongs to the caller.

use std::collections::HashMap;

use crate::error::ManifestError;
use crate::types::{Manifest, ResourceDescriptor};

/// Compute the ordered list of descriptors from `new` that need fetching.
///
/// Neither input is mutated; returned descriptors are fresh clones with no
/// content attached.
pub fn diff(
    new: &Manifest,
    current: Option<&Manifest>,
) -> Result<Vec<ResourceDescriptor>, ManifestError> {
    let known = match current {
        Some(current) => Some(index_by_path(current)?),
        None => None,
    };

    let mut changed = Vec::new();
    for (index, resource) in new.resources.iter().enumerate() {
        if resource.path.is_empty() {
            return Err(ManifestError::malformed(format!(
                "new manifest resource #{index} has no path"
            )));
        }
        let needs_fetch = match &known {
            None => true,
            Some(known) => known
                .get(resource.path.as_str())
                .map_or(true, |hash| *hash != resource.content_hash),
        };
        if needs_fetch {
            changed.push(ResourceDescriptor {
                content: None,
                ..resource.clone()
            });
        }
    }
    Ok(changed)
}

fn index_by_path(manifest: &Manifest) -> Result<HashMap<&str, &str>, ManifestError> {
    let mut index = HashMap::with_capacity(manifest.resources.len());
    for (i, resource) in manifest.resources.iter().enumerate() {
        if resource.path.is_empty() {
            return Err(ManifestError::malformed(format!(
                "current manifest resource #{i} has no path"
            )));
        }
        index.insert(resource.path.as_str(), resource.content_hash.as_str());
    }
    Ok(index)
}
