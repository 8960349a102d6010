//! Resource lifecycle orchestration.
//!
//! Each operation is a strictly sequential pipeline that stops at the first
//! failing step. Side effects of completed steps are left in place.

mod assets;
mod autoupdate;

pub use assets::AssetOutcome;

use crate::build::{BuildPipeline, ImageBackend, RetryPolicy};
use crate::cluster::ControlPlane;
use crate::error::{DeployError, Result};
use crate::manifest::Asset;
use crate::progress::{Outcome, ProgressEvent, ProgressSink, Stage, TracingProgress};
use crate::project::Project;
use crate::project::paths::read_password;
use crate::registry::ImageRef;
use crate::scripts::{ScriptRunner, ShellScriptRunner};
use std::collections::HashSet;
use std::time::Duration;

/// Retry budgets for the control plane and image store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Creating into a terminating namespace. The default allows ten retries
    /// after the first attempt.
    pub create_retry: RetryPolicy,
    /// Deleting a busy namespace.
    pub namespace_delete_retry: RetryPolicy,
    /// Removing an image still held by a container.
    pub image_removal_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            create_retry: RetryPolicy::new(11, Duration::from_secs(5)),
            namespace_delete_retry: RetryPolicy::new(10, Duration::from_secs(5)),
            image_removal_retry: RetryPolicy::new(5, Duration::from_secs(3)),
        }
    }
}

/// Drives a [`Project`] against a control plane and image backend.
pub struct Orchestrator<'a> {
    cluster: &'a dyn ControlPlane,
    images: &'a dyn ImageBackend,
    scripts: &'a dyn ScriptRunner,
    progress: &'a dyn ProgressSink,
    config: OrchestratorConfig,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator with shell scripts, tracing progress and default retries.
    pub fn new(cluster: &'a dyn ControlPlane, images: &'a dyn ImageBackend) -> Self {
        Self {
            cluster,
            images,
            scripts: &ShellScriptRunner,
            progress: &TracingProgress,
            config: OrchestratorConfig::default(),
        }
    }

    /// Use a different script runner.
    pub fn with_scripts(mut self, scripts: &'a dyn ScriptRunner) -> Self {
        self.scripts = scripts;
        self
    }

    /// Use a different progress sink.
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Use different retry budgets.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Bring the cluster to the state the project describes.
    pub async fn up(&self, project: &Project) -> Result<()> {
        self.prologue(project).await?;
        let ns = project.namespace();
        for asset in project.assets() {
            self.create_asset(asset, ns).await?;
        }
        self.run_scripts(&project.config().finalize_up, project).await
    }

    /// Tear down everything the project describes.
    pub async fn down(&self, project: &Project) -> Result<()> {
        let config = project.config();
        self.run_scripts(&config.init_down, project).await?;

        let ns = project.namespace();
        for asset in teardown_order(project) {
            self.destroy_asset(asset, ns).await?;
        }

        if config.delete_namespace {
            self.delete_namespace(ns).await?;
        }

        let pipeline = self.build_pipeline(project);
        for build in config.build.iter().filter(|b| b.auto_clean) {
            self.progress.emit(ProgressEvent::new(Stage::Clean, build.image(), ns, Outcome::Started));
            pipeline.clean(build).await;
        }

        self.run_scripts(&config.finalize_down, project).await
    }

    /// Destroy the services collection only.
    pub async fn down_services(&self, project: &Project) -> Result<()> {
        let ns = project.namespace();
        for asset in project.services() {
            self.destroy_asset(asset, ns).await?;
        }
        Ok(())
    }

    /// Replace update-capable assets in place.
    pub async fn update(&self, project: &Project) -> Result<()> {
        self.prologue(project).await?;
        let ns = project.namespace();
        for asset in project.assets() {
            self.update_asset(asset, ns).await?;
        }
        self.run_scripts(&project.config().finalize_up, project).await
    }

    /// Pulls, init scripts, logins, builds and the namespace.
    async fn prologue(&self, project: &Project) -> Result<()> {
        let config = project.config();
        if !config.pulls.is_empty() {
            self.pull_images(project).await?;
        }
        self.run_scripts(&config.init_up, project).await?;
        self.login(project).await?;

        let ns = project.namespace();
        let pipeline = self.build_pipeline(project);
        for build in &config.build {
            self.progress.emit(ProgressEvent::new(Stage::Build, build.image(), ns, Outcome::Started));
            pipeline.build(build).await?;
            self.progress.emit(ProgressEvent::new(Stage::Build, build.image(), ns, Outcome::Succeeded));
        }

        self.ensure_namespace(ns).await
    }

    async fn pull_images(&self, project: &Project) -> Result<()> {
        let wanted: HashSet<&str> = project.config().pulls.iter().map(String::as_str).collect();
        let mut pulled = HashSet::new();
        for image in project.assets().flat_map(Asset::images) {
            let name = match ImageRef::parse(image) {
                Ok(reference) => reference.name(),
                Err(_) => image.to_string(),
            };
            if !wanted.contains(name.as_str()) || !pulled.insert(image.to_string()) {
                continue;
            }
            self.progress
                .emit(ProgressEvent::new(Stage::Pull, image, project.namespace(), Outcome::Started));
            self.images.pull(image).await?;
        }
        Ok(())
    }

    async fn login(&self, project: &Project) -> Result<()> {
        for credential in &project.config().credentials {
            let password = read_password(
                project.root(),
                &credential.host,
                credential.password.as_deref(),
                credential.password_file.as_deref(),
            )?;
            self.progress.emit(ProgressEvent::new(
                Stage::Login,
                &credential.host,
                project.namespace(),
                Outcome::Started,
            ));
            self.images
                .login(&credential.host, &credential.username, &password)
                .await?;
        }
        Ok(())
    }

    async fn run_scripts(&self, scripts: &[String], project: &Project) -> Result<()> {
        for script in scripts {
            self.progress.emit(ProgressEvent::new(
                Stage::Script,
                script,
                project.namespace(),
                Outcome::Started,
            ));
            let output = self.scripts.run(script, project.root()).await?;
            if !output.is_empty() {
                self.progress.emit(ProgressEvent::new(
                    Stage::Script,
                    script,
                    project.namespace(),
                    Outcome::Output {
                        stdout: output.stdout,
                        stderr: output.stderr,
                    },
                ));
            }
            if !output.success {
                return Err(DeployError::Script {
                    script: script.clone(),
                    message: output.status,
                });
            }
        }
        Ok(())
    }

    fn build_pipeline<'p>(&'p self, project: &'p Project) -> BuildPipeline<'p> {
        BuildPipeline::new(self.images, project.root(), self.config.image_removal_retry)
    }
}

/// Services, then jobs, then resources.
fn teardown_order(project: &Project) -> impl Iterator<Item = &Asset> {
    project
        .services()
        .iter()
        .chain(project.jobs().iter())
        .chain(project.resources().iter())
}
