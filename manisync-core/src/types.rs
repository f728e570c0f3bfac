//! Domain types for manifests and the resources they declare.
//!
//! The wire format is the manifest document served next to the resources:
//!
//! ```text
//! { "js": { "resources": [ { "path": "...", "md5": "...", "time": "..." } ] } }
//! ```
//!
//! `md5` maps to [`ResourceDescriptor::content_hash`] and `time` to
//! [`ResourceDescriptor::timestamp`]. The same document is what gets stored
//! as the last-synced manifest record, so parsing and serializing go through
//! one codec.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A single installable resource declared by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Stable identifier and fetch locator.
    pub path: String,
    /// Change-detection token. Not an integrity check.
    pub content_hash: String,
    /// Informational only; never compared.
    pub timestamp: String,
    /// Absent until the resource has been fetched.
    pub content: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(
        path: impl Into<String>,
        content_hash: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            timestamp: timestamp.into(),
            content: None,
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.content.is_some()
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.content_hash)
    }
}

/// A declared set of resources at a point in time. Order is significant: it
/// is the fetch and persistence order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub resources: Vec<ResourceDescriptor>,
}

impl Manifest {
    /// Build a manifest, rejecting empty or repeated paths.
    pub fn new(resources: Vec<ResourceDescriptor>) -> Result<Self, ManifestError> {
        let manifest = Self { resources };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse the wire document.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        let doc: ManifestDocument =
            serde_json::from_str(text).map_err(|e| ManifestError::malformed(e.to_string()))?;
        let resources = doc
            .js
            .resources
            .into_iter()
            .map(ResourceDescriptor::from)
            .collect();
        Self::new(resources)
    }

    /// Serialize to the wire document. Fetched content is never included.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        let doc = ManifestDocument {
            js: ManifestBody {
                resources: self.resources.iter().map(WireResource::from).collect(),
            },
        };
        Ok(serde_json::to_string(&doc)?)
    }

    /// Pretty-printed variant of [`Manifest::to_json`], used for files meant
    /// to be read by humans.
    pub fn to_json_pretty(&self) -> Result<String, ManifestError> {
        let doc = ManifestDocument {
            js: ManifestBody {
                resources: self.resources.iter().map(WireResource::from).collect(),
            },
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn get(&self, path: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.path == path)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every descriptor must carry a non-empty path, and paths are unique.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::with_capacity(self.resources.len());
        for (index, resource) in self.resources.iter().enumerate() {
            if resource.path.is_empty() {
                return Err(ManifestError::malformed(format!(
                    "resource #{index} has no path"
                )));
            }
            if !seen.insert(resource.path.as_str()) {
                return Err(ManifestError::malformed(format!(
                    "duplicate resource path '{}'",
                    resource.path
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ManifestDocument {
    js: ManifestBody,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestBody {
    resources: Vec<WireResource>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireResource {
    path: String,
    md5: String,
    #[serde(default, deserialize_with = "deserialize_time")]
    time: String,
}

/// `time` is opaque: older manifests emit epoch numbers, newer ones strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeCompat {
    Text(String),
    Number(serde_json::Number),
}

fn deserialize_time<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match TimeCompat::deserialize(deserializer)? {
        TimeCompat::Text(text) => text,
        TimeCompat::Number(number) => number.to_string(),
    })
}

impl From<WireResource> for ResourceDescriptor {
    fn from(wire: WireResource) -> Self {
        Self::new(wire.path, wire.md5, wire.time)
    }
}

impl From<&ResourceDescriptor> for WireResource {
    fn from(resource: &ResourceDescriptor) -> Self {
        Self {
            path: resource.path.clone(),
            md5: resource.content_hash.clone(),
            time: resource.timestamp.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
