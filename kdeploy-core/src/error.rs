//! Error types for kdeploy.
//!
//! [`DeployError`] is the top-level error returned by project loading and by
//! every orchestrated operation. The control-plane, image-backend and registry
//! seams each have their own error type so adapters can classify failures
//! without knowing about the rest of the crate.

use crate::build::BuildError;
use crate::cluster::ClusterError;
use crate::registry::RegistryError;
use crate::template::TemplateError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for kdeploy operations.
#[derive(Error, Debug)]
pub enum DeployError {
    /// A manifest declared a `kind` outside the supported set.
    #[error("unsupported resource kind {kind:?} in {}", path.display())]
    UnsupportedResourceKind {
        /// Lower-cased kind as declared.
        kind: String,
        /// Manifest the kind came from.
        path: PathBuf,
    },

    /// A manifest declared an `apiVersion` the decoder cannot map.
    #[error("unsupported apiVersion {api_version:?} for {kind} in {}", path.display())]
    UnsupportedApiVersion {
        /// Resource kind.
        kind: String,
        /// Declared apiVersion.
        api_version: String,
        /// Manifest path.
        path: PathBuf,
    },

    /// A manifest failed to parse into its typed resource.
    #[error("unable to parse asset {}: {message}", path.display())]
    ManifestParse {
        /// Manifest path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Template rendering failed.
    #[error("failed to render {}: {source}", path.display())]
    Template {
        /// Template source file.
        path: PathBuf,
        /// Underlying render error.
        #[source]
        source: TemplateError,
    },

    /// The project descriptor could not be decoded.
    #[error("invalid project descriptor {}: {message}", path.display())]
    Descriptor {
        /// Descriptor path.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// The project path does not exist.
    #[error("project path not found: {}", path.display())]
    ProjectNotFound {
        /// Path given by the caller.
        path: PathBuf,
    },

    /// A glob pattern was invalid or could not be expanded.
    #[error("invalid glob {pattern:?}: {message}")]
    Glob {
        /// Pattern after path translation.
        pattern: String,
        /// Reason.
        message: String,
    },

    /// Filesystem access failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid project configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A lifecycle script exited unsuccessfully.
    #[error("script {script:?} failed: {message}")]
    Script {
        /// The script command line.
        script: String,
        /// Exit status or spawn failure.
        message: String,
    },

    /// Control-plane failure.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Image backend failure.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Registry lookup failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A watched resource was deleted while waiting on it.
    #[error("{kind} {name:?} was deleted")]
    Deleted {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// A pod reported the `Unknown` phase.
    #[error("pod {name:?} is in unknown phase")]
    UnknownPodPhase {
        /// Pod name.
        name: String,
    },

    /// A watch stream delivered something unusable or ended early.
    #[error("watch stream error: {0}")]
    WatchStream(String),

    /// The deadline elapsed while waiting for a job.
    #[error("timeout after {after:?} while waiting for job {name:?}")]
    Timeout {
        /// Job name.
        name: String,
        /// Configured deadline.
        after: Duration,
    },

    /// Writing followed output to the sink failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Result type for kdeploy operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Build an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
