//! `manisync diff <manifest-url>` — list what sync would fetch.

use anyhow::{Context, Result};
use clap::Args;

use manisync_sync::pipeline;

use crate::StoreArgs;

/// Arguments for `manisync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// URL or path of the manifest document.
    pub manifest_url: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let config = self.store.config()?;
        let plan = pipeline::plan(&config, &self.manifest_url)
            .with_context(|| format!("diff failed for '{}'", self.manifest_url))?;

        if plan.changed.is_empty() {
            println!("No differences for '{}'.", plan.manifest_url);
            return Ok(());
        }

        let note = if plan.first_sync { " (first sync)" } else { "" };
        println!(
            "{} of {} resource(s) would be fetched{note}",
            plan.changed.len(),
            plan.declared
        );
        for resource in &plan.changed {
            println!("  ~  {}  {}", resource.path, resource.content_hash);
        }
        Ok(())
    }
}
