//! `manisync status` — what the local cache holds.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use manisync_core::Manifest;
use manisync_sync::{pipeline, ResourceStore, StoredResource};

use crate::StoreArgs;

/// Arguments for `manisync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let config = self.store.config()?;
        let store = pipeline::open_store(&config)
            .with_context(|| format!("failed to open '{}'", config.db_path.display()))?;
        let manifest = store.load_manifest().context("failed to load manifest record")?;
        let rows = store.list_resources().context("failed to list resources")?;

        let report = build_report(manifest.as_ref(), rows);
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&config.db_path.display().to_string(), &report);
        Ok(())
    }
}

/// How a resource relates to the stored manifest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
enum ResourceState {
    /// Row matches the manifest's hash.
    Cached,
    /// Row hash differs from the manifest's.
    Mismatch,
    /// Declared by the manifest, no row.
    Missing,
    /// Row not declared by the manifest.
    Orphan,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    synced: bool,
    declared: usize,
    cached: usize,
    resources: Vec<ResourceStatus>,
}

#[derive(Debug, Serialize)]
struct ResourceStatus {
    path: String,
    state: ResourceState,
    content_hash: String,
    time: String,
    size: Option<usize>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "hash")]
    hash: String,
    #[tabled(rename = "time")]
    time: String,
    #[tabled(rename = "size")]
    size: String,
}

fn build_report(manifest: Option<&Manifest>, rows: Vec<StoredResource>) -> StatusReport {
    let cached = rows.len();
    let mut by_path: BTreeMap<String, ResourceStatus> = BTreeMap::new();
    let declared: HashMap<&str, &str> = manifest
        .map(|m| {
            m.resources
                .iter()
                .map(|r| (r.path.as_str(), r.content_hash.as_str()))
                .collect()
        })
        .unwrap_or_default();

    for row in rows {
        let state = match declared.get(row.path.as_str()) {
            Some(hash) if *hash == row.content_hash => ResourceState::Cached,
            Some(_) => ResourceState::Mismatch,
            None => ResourceState::Orphan,
        };
        by_path.insert(
            row.path.clone(),
            ResourceStatus {
                path: row.path,
                state,
                content_hash: row.content_hash,
                time: row.timestamp,
                size: row.size,
            },
        );
    }

    if let Some(manifest) = manifest {
        for resource in &manifest.resources {
            by_path
                .entry(resource.path.clone())
                .or_insert_with(|| ResourceStatus {
                    path: resource.path.clone(),
                    state: ResourceState::Missing,
                    content_hash: resource.content_hash.clone(),
                    time: resource.timestamp.clone(),
                    size: None,
                });
        }
    }

    StatusReport {
        synced: manifest.is_some(),
        declared: declared.len(),
        cached,
        resources: by_path.into_values().collect(),
    }
}

fn print_table(db: &str, report: &StatusReport) {
    println!(
        "manisync v{} | {} | {} declared | {} cached",
        env!("CARGO_PKG_VERSION"),
        db,
        report.declared,
        report.cached,
    );

    if !report.synced {
        println!("Never synced. Run `manisync sync <manifest-url>` first.");
        if report.resources.is_empty() {
            return;
        }
    }

    let rows: Vec<StatusTableRow> = report
        .resources
        .iter()
        .map(|r| StatusTableRow {
            path: r.path.clone(),
            state: state_label(r.state),
            hash: short_hash(&r.content_hash),
            time: r.time.clone(),
            size: r.size.map_or_else(|| "-".to_string(), |s| s.to_string()),
        })
        .collect();
    if rows.is_empty() {
        println!("No resources cached.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let attention = report
        .resources
        .iter()
        .filter(|r| matches!(r.state, ResourceState::Missing | ResourceState::Mismatch))
        .count();
    if attention > 0 {
        println!("{attention} resource(s) out of step with the manifest record.");
    }
}

fn state_label(state: ResourceState) -> String {
    match state {
        ResourceState::Cached => "CACHED".green().bold().to_string(),
        ResourceState::Mismatch => "MISMATCH".red().bold().to_string(),
        ResourceState::Missing => "MISSING".yellow().bold().to_string(),
        ResourceState::Orphan => "ORPHAN".magenta().bold().to_string(),
    }
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}
