//! Structured progress reporting.
//!
//! The orchestrator never prints. It emits [`ProgressEvent`]s into a
//! [`ProgressSink`] and the presentation layer decides how they look.

use std::fmt;

/// The pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Pulling declared images.
    Pull,
    /// Running a lifecycle script.
    Script,
    /// Logging in to a registry.
    Login,
    /// Building or pushing an image.
    Build,
    /// Ensuring or deleting the namespace.
    Namespace,
    /// Creating an asset.
    Create,
    /// Destroying an asset.
    Destroy,
    /// Updating an asset in place.
    Update,
    /// Retagging a deployment's containers.
    AutoUpdate,
    /// Removing built images.
    Clean,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pull => "pull",
            Self::Script => "script",
            Self::Login => "login",
            Self::Build => "build",
            Self::Namespace => "namespace",
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::Update => "update",
            Self::AutoUpdate => "autoupdate",
            Self::Clean => "clean",
        })
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The step began.
    Started,
    /// The step completed.
    Succeeded,
    /// Create found the object already present.
    AlreadyExists,
    /// Destroy or update found the object absent.
    NotExisted,
    /// The step was skipped.
    Skipped(String),
    /// The step changed something worth reporting.
    Changed(String),
    /// A script printed something.
    Output {
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// One progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Stage.
    pub stage: Stage,
    /// Asset kind, when the event concerns an asset.
    pub kind: Option<String>,
    /// Subject name (asset, image, script or namespace).
    pub name: String,
    /// Target namespace.
    pub namespace: String,
    /// What happened.
    pub outcome: Outcome,
}

impl ProgressEvent {
    /// An event about a non-asset subject.
    pub fn new(stage: Stage, name: impl Into<String>, namespace: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            stage,
            kind: None,
            name: name.into(),
            namespace: namespace.into(),
            outcome,
        }
    }

    /// An event about an asset.
    pub fn asset(
        stage: Stage,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            stage,
            kind: Some(kind.into()),
            name: name.into(),
            namespace: namespace.into(),
            outcome,
        }
    }
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: ProgressEvent);
}

/// Emits progress as tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        let kind = event.kind.as_deref().unwrap_or("-");
        match &event.outcome {
            Outcome::Skipped(reason) => tracing::warn!(
                stage = %event.stage,
                kind,
                name = %event.name,
                namespace = %event.namespace,
                reason = %reason,
                "Skipped"
            ),
            Outcome::Output { stdout, stderr } => tracing::info!(
                stage = %event.stage,
                name = %event.name,
                namespace = %event.namespace,
                stdout = %stdout,
                stderr = %stderr,
                "Script output"
            ),
            outcome => tracing::info!(
                stage = %event.stage,
                kind,
                name = %event.name,
                namespace = %event.namespace,
                outcome = ?outcome,
                "Progress"
            ),
        }
    }
}
