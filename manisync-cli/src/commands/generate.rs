//! `manisync generate <dir>` — describe a directory tree as a manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use manisync_core::generate;

/// Arguments for `manisync generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory whose files become the manifest's resources.
    pub dir: PathBuf,

    /// Write the manifest here instead of stdout. Excluded from the scan.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl GenerateArgs {
    pub fn run(self) -> Result<()> {
        let root = self
            .dir
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.dir.display()))?;

        let excluded = self
            .output
            .as_ref()
            .and_then(|out| absolute(out).strip_prefix(&root).ok().map(to_manifest_path));
        let manifest = generate::from_dir_filtered(&root, |rel| Some(rel) != excluded.as_deref())
            .with_context(|| format!("failed to scan '{}'", root.display()))?;
        let json = manifest.to_json_pretty()?;

        match self.output {
            Some(out) => {
                std::fs::write(&out, format!("{json}\n"))
                    .with_context(|| format!("failed to write '{}'", out.display()))?;
                println!(
                    "✓ Wrote {} resource(s) to {}",
                    manifest.len(),
                    out.display()
                );
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

fn absolute(path: &std::path::Path) -> PathBuf {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let (Ok(parent), Some(name)) = (parent.canonicalize(), path.file_name()) {
            return parent.join(name);
        }
    }
    std::env::current_dir()
        .and_then(|cwd| cwd.canonicalize())
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn to_manifest_path(relative: &std::path::Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
