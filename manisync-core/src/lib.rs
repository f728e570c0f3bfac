//! manisync core library — manifest types, wire codec, differ, errors.
//!
//! - [`types`] — [`Manifest`] and [`ResourceDescriptor`]
//! - [`diff`] — which resources of a new manifest need fetching
//! - [`generate`] — build a manifest from a directory tree
//! - [`error`] — [`ManifestError`]

pub mod diff;
pub mod error;
pub mod generate;
pub mod types;

pub use diff::diff;
pub use error::ManifestError;
pub use types::{Manifest, ResourceDescriptor};
