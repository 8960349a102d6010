//! `wait <job>` - block until a job finishes.

use super::{EXIT_FAILED, EXIT_TIMEOUT, GlobalOptions};
use anyhow::Result;
use kdeploy_core::{JobOutcome, JobWaiter, WaitConfig};
use std::process::ExitCode;

/// Wait for `job`; the exit code tells success, failure and timeout apart.
pub async fn run(options: &GlobalOptions, job: &str) -> Result<ExitCode> {
    let cluster = options.connect().await?;
    let namespace = options.target_namespace();
    let config = WaitConfig {
        timeout: options.timeout,
        ..WaitConfig::default()
    };

    println!("====> Waiting for job {job:?} in {namespace:?}");
    match JobWaiter::new(&cluster, config).wait(job, namespace).await {
        Ok(JobOutcome::Succeeded) => {
            println!("====> Job {job:?} completed");
            Ok(ExitCode::SUCCESS)
        }
        Ok(JobOutcome::Failed { message }) => {
            eprintln!("====> Job {job:?} failed: {message}");
            Ok(ExitCode::from(EXIT_FAILED))
        }
        Err(err) if err.is_timeout() => {
            eprintln!("====> {err}");
            Ok(ExitCode::from(EXIT_TIMEOUT))
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("Waiting for job {job:?} failed"))),
    }
}
