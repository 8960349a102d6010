//! `autoupdate` - retag live deployments.

use super::GlobalOptions;
use crate::docker::DockerBackend;
use crate::printer::PrintProgress;
use anyhow::{Context, Result};
use kdeploy_core::Orchestrator;
use kdeploy_registry::GcrRegistry;
use std::path::Path;

/// Move the project's auto-updated containers to `tag`, or to their newest registry tag.
pub async fn run(options: &GlobalOptions, path: &Path, tag: Option<&str>) -> Result<()> {
    let project = options.load_project(path)?;
    let cluster = options.connect().await?;
    let registry = GcrRegistry::new().context("Failed to create registry client")?;
    let images = DockerBackend::default();

    Orchestrator::new(&cluster, &images)
        .with_progress(&PrintProgress)
        .auto_update(&project, &registry, tag)
        .await
        .context("autoupdate failed")
}
