use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

use crate::config::Plan;

/// Writes the built-in prices plan to `path` as a starting point for edits.
pub async fn handle_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let yaml = Plan::builtin().to_yaml()?;
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} Wrote plan to {}", "✓".green(), path.display());
    Ok(())
}
