//! `log <pod>` - follow a pod's output until it finishes.

use super::{EXIT_FAILED, GlobalOptions};
use anyhow::{Context, Result};
use kdeploy_core::{FollowConfig, LogFollower, PodOutcome};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Copy `pod`'s log to stdout; a failed pod exits with [`EXIT_FAILED`].
pub async fn run(options: &GlobalOptions, pod: &str) -> Result<ExitCode> {
    let cluster = options.connect().await?;
    let namespace = options.target_namespace();
    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));

    let outcome = LogFollower::new(&cluster, FollowConfig::default())
        .follow(pod, namespace, stdout)
        .await
        .with_context(|| format!("Following pod {pod:?} failed"))?;

    match outcome {
        PodOutcome::Succeeded => Ok(ExitCode::SUCCESS),
        PodOutcome::Failed { reason, exit_code } => {
            eprintln!(
                "====> Pod {pod:?} failed (reason: {}, exit code: {})",
                reason.as_deref().unwrap_or("unknown"),
                exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
            );
            Ok(ExitCode::from(EXIT_FAILED))
        }
        PodOutcome::Unknown => {
            eprintln!("====> Pod {pod:?} finished without a container status");
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}
