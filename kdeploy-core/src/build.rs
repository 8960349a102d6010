//! Image builds and their teardown.
//!
//! [`ImageBackend`] is the black-box container tool; [`BuildPipeline`]
//! sequences it for the builds a project declares.

use crate::project::ProjectBuild;
use crate::project::paths::translate;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by an [`ImageBackend`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The tool ran and reported failure.
    #[error("{operation} {target:?} failed: {output}")]
    Failed {
        /// Operation name (`build`, `push`, ...).
        operation: String,
        /// Image or host the operation targeted.
        target: String,
        /// Captured diagnostic output.
        output: String,
    },

    /// The image is still referenced by a container.
    #[error("image {image:?} is in use: {output}")]
    ImageInUse {
        /// Image being removed.
        image: String,
        /// Captured diagnostic output.
        output: String,
    },

    /// The tool could not be started.
    #[error("failed to run {operation}: {message}")]
    Spawn {
        /// Operation name.
        operation: String,
        /// OS error.
        message: String,
    },
}

impl BuildError {
    /// Classify a failed invocation from its captured output.
    pub fn from_output(operation: &str, target: &str, output: &str) -> Self {
        if operation == "remove"
            && (output.contains("must force") || output.contains("is being used"))
        {
            return Self::ImageInUse {
                image: target.to_string(),
                output: output.trim().to_string(),
            };
        }
        Self::Failed {
            operation: operation.to_string(),
            target: target.to_string(),
            output: output.trim().to_string(),
        }
    }

    /// Whether retrying after a delay may succeed.
    pub fn is_image_in_use(&self) -> bool {
        matches!(self, Self::ImageInUse { .. })
    }
}

/// Result type for image backend calls.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Boxed future returned by image backend calls.
pub type BuildFuture<'a, T> = Pin<Box<dyn Future<Output = BuildResult<T>> + Send + 'a>>;

/// The container build tool.
pub trait ImageBackend: Send + Sync {
    /// Build `context` tagged `tag`.
    fn build<'a>(&'a self, context: &'a Path, tag: &'a str) -> BuildFuture<'a, ()>;

    /// Push `tag`.
    fn push<'a>(&'a self, tag: &'a str) -> BuildFuture<'a, ()>;

    /// Tag `source` as `target`.
    fn tag<'a>(&'a self, source: &'a str, target: &'a str) -> BuildFuture<'a, ()>;

    /// Remove the local image `tag`.
    fn remove<'a>(&'a self, tag: &'a str) -> BuildFuture<'a, ()>;

    /// Log in to a registry.
    fn login<'a>(
        &'a self,
        host: &'a str,
        username: &'a str,
        password: &'a str,
    ) -> BuildFuture<'a, ()>;

    /// Pull `image`.
    fn pull<'a>(&'a self, image: &'a str) -> BuildFuture<'a, ()>;
}

/// Bounded fixed-delay retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Sleep between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy of `attempts` tries `delay` apart.
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Runs declared builds against an [`ImageBackend`].
pub struct BuildPipeline<'a> {
    backend: &'a dyn ImageBackend,
    root: &'a Path,
    removal: RetryPolicy,
}

impl<'a> BuildPipeline<'a> {
    /// Create a pipeline resolving build contexts against `root`.
    pub fn new(backend: &'a dyn ImageBackend, root: &'a Path, removal: RetryPolicy) -> Self {
        Self {
            backend,
            root,
            removal,
        }
    }

    /// Build one image and push it when requested.
    pub async fn build(&self, spec: &ProjectBuild) -> BuildResult<()> {
        let context = translate(self.root, &spec.from);
        let image = spec.image();
        tracing::info!(image = %image, context = %context.display(), "Building image");
        self.backend.build(&context, &image).await?;

        if !spec.push {
            return Ok(());
        }
        tracing::info!(image = %image, "Pushing image");
        self.backend.push(&image).await?;

        if spec.push_latest {
            let latest = spec.latest_image();
            tracing::info!(image = %latest, "Pushing latest alias");
            self.backend.tag(&image, &latest).await?;
            self.backend.push(&latest).await?;
        }
        Ok(())
    }

    /// Remove the images of an auto-clean build. Failures are logged only.
    pub async fn clean(&self, spec: &ProjectBuild) {
        if !spec.auto_clean {
            return;
        }
        self.remove_logged(&spec.image()).await;
        if spec.push && spec.push_latest {
            self.remove_logged(&spec.latest_image()).await;
        }
    }

    async fn remove_logged(&self, image: &str) {
        if let Err(e) = self.remove_with_retry(image).await {
            tracing::warn!(image = %image, error = %e, "Failed to remove image");
        }
    }

    async fn remove_with_retry(&self, image: &str) -> BuildResult<()> {
        let mut attempt = 1;
        loop {
            match self.backend.remove(image).await {
                Ok(()) => {
                    tracing::info!(image = %image, "Removed image");
                    return Ok(());
                }
                Err(e) if e.is_image_in_use() && attempt < self.removal.attempts => {
                    tracing::debug!(image = %image, attempt, "Image still in use, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.removal.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendCall, RecordingBackend};

    fn spec(push: bool, push_latest: bool, auto_clean: bool) -> ProjectBuild {
        ProjectBuild {
            name: "gcr.io/acme/web".into(),
            tag: "7".into(),
            from: "web".into(),
            push,
            push_latest,
            auto_clean,
            ..Default::default()
        }
    }

    const REMOVAL: RetryPolicy = RetryPolicy::new(5, Duration::from_secs(3));

    #[test]
    fn classifies_in_use_output() {
        let err = BuildError::from_output(
            "remove",
            "web:1",
            "conflict: unable to remove repository reference (must force)",
        );
        assert!(err.is_image_in_use());
        assert!(!BuildError::from_output("build", "web:1", "must force").is_image_in_use());
    }

    #[tokio::test]
    async fn push_latest_tags_and_pushes_alias() {
        let backend = RecordingBackend::new();
        let pipeline = BuildPipeline::new(&backend, Path::new("/srv/app"), REMOVAL);
        pipeline.build(&spec(true, true, false)).await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Build {
                    context: "/srv/app/web".into(),
                    tag: "gcr.io/acme/web:7".into()
                },
                BackendCall::Push("gcr.io/acme/web:7".into()),
                BackendCall::Tag {
                    source: "gcr.io/acme/web:7".into(),
                    target: "gcr.io/acme/web:latest".into()
                },
                BackendCall::Push("gcr.io/acme/web:latest".into()),
            ]
        );
    }

    #[tokio::test]
    async fn build_without_push_stops_after_build() {
        let backend = RecordingBackend::new();
        let pipeline = BuildPipeline::new(&backend, Path::new("/srv/app"), REMOVAL);
        pipeline.build(&spec(false, true, false)).await.unwrap();
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn build_failure_propagates() {
        let backend = RecordingBackend::new();
        backend.fail_next("build", "no Dockerfile");
        let pipeline = BuildPipeline::new(&backend, Path::new("/srv/app"), REMOVAL);
        let err = pipeline.build(&spec(true, false, false)).await.unwrap_err();
        assert!(matches!(err, BuildError::Failed { .. }));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_retries_in_use_for_both_images() {
        let backend = RecordingBackend::new();
        backend.fail_next("remove", "image is being used by stopped container");
        backend.fail_next("remove", "image is being used by stopped container");
        let pipeline = BuildPipeline::new(&backend, Path::new("/srv/app"), REMOVAL);
        pipeline.clean(&spec(true, true, true)).await;

        let removals: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, BackendCall::Remove(_)))
            .collect();
        assert_eq!(
            removals,
            vec![
                BackendCall::Remove("gcr.io/acme/web:7".into()),
                BackendCall::Remove("gcr.io/acme/web:7".into()),
                BackendCall::Remove("gcr.io/acme/web:7".into()),
                BackendCall::Remove("gcr.io/acme/web:latest".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clean_swallows_persistent_failure() {
        let backend = RecordingBackend::new();
        for _ in 0..10 {
            backend.fail_next("remove", "must force");
        }
        let pipeline = BuildPipeline::new(&backend, Path::new("/srv/app"), REMOVAL);
        pipeline.clean(&spec(false, false, true)).await;
        assert_eq!(backend.calls().len(), 5);
    }

    #[tokio::test]
    async fn clean_skips_builds_without_auto_clean() {
        let backend = RecordingBackend::new();
        let pipeline = BuildPipeline::new(&backend, Path::new("/srv/app"), REMOVAL);
        pipeline.clean(&spec(true, true, false)).await;
        assert!(backend.calls().is_empty());
    }
}
