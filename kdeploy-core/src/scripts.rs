//! Lifecycle scripts (`init_up`, `finalize_down`, ...).

use crate::error::{DeployError, Result};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Boxed future returned by [`ScriptRunner::run`].
pub type ScriptFuture<'a> = Pin<Box<dyn Future<Output = Result<ScriptOutput>> + Send + 'a>>;

/// How a script exited and what it printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Whether the script exited zero.
    pub success: bool,
    /// Exit status as reported by the runner.
    pub status: String,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ScriptOutput {
    /// A zero exit with no output.
    pub fn succeeded() -> Self {
        Self {
            success: true,
            status: "exit status: 0".to_string(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Whether anything was printed.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// Runs one shell command line in a working directory.
pub trait ScriptRunner: Send + Sync {
    /// Run `script` in `dir`. Only a script that cannot be started is an error;
    /// a non-zero exit is reported in the output.
    fn run<'a>(&'a self, script: &'a str, dir: &'a Path) -> ScriptFuture<'a>;
}

/// Runs scripts through `sh -c`, capturing their output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellScriptRunner;

impl ScriptRunner for ShellScriptRunner {
    fn run<'a>(&'a self, script: &'a str, dir: &'a Path) -> ScriptFuture<'a> {
        Box::pin(async move {
            tracing::info!(script = %script, dir = %dir.display(), "Running script");
            let output = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(script)
                .current_dir(dir)
                .output()
                .await
                .map_err(|e| DeployError::Script {
                    script: script.to_string(),
                    message: e.to_string(),
                })?;

            Ok(ScriptOutput {
                success: output.status.success(),
                status: output.status.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
