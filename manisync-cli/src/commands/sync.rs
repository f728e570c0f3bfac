//! `manisync sync` — fetch changed resources into the local cache.

use anyhow::{Context, Result};
use clap::Args;
use manisync_sync::{pipeline, SyncReport};

use crate::StoreArgs;

/// Arguments for `manisync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// URL (http://, https://, file://) or path of the manifest document.
    pub manifest_url: String,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Delete cached resources the manifest no longer declares.
    #[arg(long)]
    pub prune: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let mut config = self.store.config()?;
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        config.prune |= self.prune;

        let report = pipeline::run(&config, &self.manifest_url)
            .with_context(|| format!("sync failed for '{}'", self.manifest_url))?;
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    if report.is_noop() {
        println!(
            "✓ '{}' — up to date ({} unchanged)",
            report.manifest_url, report.unchanged
        );
        return;
    }

    let elapsed = report.finished_at - report.started_at;
    println!(
        "✓ '{}' synced ({} fetched, {} unchanged, {} pruned) in {}ms",
        report.manifest_url,
        report.fetched.len(),
        report.unchanged,
        report.pruned,
        elapsed.num_milliseconds()
    );
    for path in &report.fetched {
        println!("  ✎  {path}");
    }
}
