//! Project resolution.
//!
//! A [`Project`] is loaded once per invocation from a descriptor (or the
//! defaults when there is none) and holds the three ordered asset
//! collections the orchestrator walks.

pub mod config;
mod loader;
pub mod paths;

pub use config::{
    AutoUpdate, AutoUpdateContainer, AutoUpdateCredential, Credential, DEFAULT_NAMESPACE,
    DESCRIPTOR_FILE, ProjectBuild, ProjectConfig,
};
pub use loader::{LoadOptions, load};

use crate::manifest::Asset;
use crate::variables::VariableScope;
use std::path::{Path, PathBuf};

/// A loaded project.
#[derive(Debug, Clone)]
pub struct Project {
    config: ProjectConfig,
    namespace: String,
    root: PathBuf,
    variables: VariableScope,
    resources: Vec<Asset>,
    jobs: Vec<Asset>,
    services: Vec<Asset>,
}

impl Project {
    /// Load the project at `path`. See [`load`].
    pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> crate::Result<Self> {
        load(path.as_ref(), options)
    }

    /// Assemble a project from already decoded parts.
    pub fn from_parts(
        config: ProjectConfig,
        namespace: impl Into<String>,
        root: impl Into<PathBuf>,
        resources: Vec<Asset>,
        jobs: Vec<Asset>,
        services: Vec<Asset>,
    ) -> Self {
        Self {
            config,
            namespace: namespace.into(),
            root: root.into(),
            variables: VariableScope::new(),
            resources,
            jobs,
            services,
        }
    }

    /// The decoded descriptor.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Resolved target namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolved root folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The full variable scope manifests were rendered with.
    pub fn variables(&self) -> &VariableScope {
        &self.variables
    }

    /// Resources, in load order.
    pub fn resources(&self) -> &[Asset] {
        &self.resources
    }

    /// Jobs, in load order.
    pub fn jobs(&self) -> &[Asset] {
        &self.jobs
    }

    /// Services, in load order.
    pub fn services(&self) -> &[Asset] {
        &self.services
    }

    /// Every asset: resources, then jobs, then services.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.resources
            .iter()
            .chain(self.jobs.iter())
            .chain(self.services.iter())
    }
}
