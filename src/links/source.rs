use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

/// Read the full ordered list of hotel detail-page URLs from a text file,
/// one URL per line. Blank lines are skipped; ordering is preserved because
/// sharding and global index assignment depend on it.
pub async fn read_links(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .await
        .context(format!("Failed to read link file: {}", path.display()))?;

    let links: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    info!("Read {} hotel links from {}", links.len(), path.display());

    Ok(links)
}
