//! `up`, `down`, `down-services` and `update`.

use super::GlobalOptions;
use crate::docker::DockerBackend;
use crate::printer::PrintProgress;
use anyhow::{Context, Result};
use kdeploy_core::Orchestrator;
use std::path::Path;

/// Which lifecycle operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create everything.
    Up,
    /// Destroy everything.
    Down,
    /// Destroy the services only.
    DownServices,
    /// Replace update-capable assets.
    Update,
}

impl Action {
    fn name(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::DownServices => "down-services",
            Self::Update => "update",
        }
    }
}

/// Run `action` against the project at `path`.
pub async fn run(options: &GlobalOptions, path: &Path, action: Action) -> Result<()> {
    let project = options.load_project(path)?;
    let cluster = options.connect().await?;
    let images = DockerBackend::default();
    let orchestrator = Orchestrator::new(&cluster, &images).with_progress(&PrintProgress);

    tracing::info!(
        action = action.name(),
        namespace = %project.namespace(),
        assets = project.assets().count(),
        "Starting"
    );
    let result = match action {
        Action::Up => orchestrator.up(&project).await,
        Action::Down => orchestrator.down(&project).await,
        Action::DownServices => orchestrator.down_services(&project).await,
        Action::Update => orchestrator.update(&project).await,
    };
    result.with_context(|| format!("{} failed", action.name()))?;

    println!("====> {} complete in namespace {:?}", action.name(), project.namespace());
    Ok(())
}
