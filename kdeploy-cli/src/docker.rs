//! [`ImageBackend`] over the `docker` command line.

use kdeploy_core::build::{BuildError, BuildFuture, BuildResult, ImageBackend};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs `docker` subcommands, capturing their output for diagnostics.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    program: String,
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerBackend {
    /// Use `program` instead of `docker`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `args`, optionally feeding `stdin`, and fail with the captured output.
    async fn run(
        &self,
        operation: &str,
        target: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> BuildResult<()> {
        tracing::debug!(program = %self.program, ?args, "Running image tool");
        let spawn_error = |e: std::io::Error| BuildError::Spawn {
            operation: operation.to_string(),
            message: e.to_string(),
        };

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes()).await.map_err(spawn_error)?;
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if output.status.success() {
            return Ok(());
        }
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(BuildError::from_output(operation, target, &captured))
    }
}

impl ImageBackend for DockerBackend {
    fn build<'a>(&'a self, context: &'a Path, tag: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move {
            let context = context.to_string_lossy();
            self.run("build", tag, &["build", "-t", tag, context.as_ref()], None)
                .await
        })
    }

    fn push<'a>(&'a self, tag: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move { self.run("push", tag, &["push", tag], None).await })
    }

    fn tag<'a>(&'a self, source: &'a str, target: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move { self.run("tag", target, &["tag", source, target], None).await })
    }

    fn remove<'a>(&'a self, tag: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move { self.run("remove", tag, &["rmi", tag], None).await })
    }

    fn login<'a>(
        &'a self,
        host: &'a str,
        username: &'a str,
        password: &'a str,
    ) -> BuildFuture<'a, ()> {
        Box::pin(async move {
            let args = ["login", host, "-u", username, "--password-stdin"];
            self.run("login", host, &args, Some(password)).await
        })
    }

    fn pull<'a>(&'a self, image: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move { self.run("pull", image, &["pull", image], None).await })
    }
}
