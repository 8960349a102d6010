//! kdeploy core library
//!
//! Loads a deployment project from disk and drives its resources through a
//! Kubernetes control plane.
//!
//! # Overview
//!
//! A project is a directory of templated manifests grouped into three
//! ordered collections (resources, jobs and services), optionally described
//! by a `project.yml` descriptor. Every manifest is rendered with a layered
//! variable scope, decoded into a typed resource and rewritten into the
//! target namespace.
//!
//! # Key Components
//!
//! - **Project**: descriptor parsing, variable precedence and asset loading
//! - **Orchestrator**: up, down, update and auto-update pipelines
//! - **JobWaiter**: waits for a job through a watch, polls and a deadline
//! - **LogFollower**: streams a pod's log across container restarts
//! - **Seams**: [`ControlPlane`], [`ImageBackend`], [`ScriptRunner`] and
//!   [`RegistryClient`] keep every external system behind a trait
//!
//! # Example
//!
//! ```ignore
//! use kdeploy_core::prelude::*;
//!
//! let project = Project::load("./deploy", &LoadOptions::default())?;
//! Orchestrator::new(&cluster, &docker).up(&project).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod build;
pub mod cluster;
pub mod error;
pub mod follow;
pub mod manifest;
pub mod orchestrator;
pub mod prelude;
pub mod progress;
pub mod project;
pub mod registry;
pub mod scripts;
pub mod template;
pub mod testing;
pub mod variables;
pub mod wait;

pub use build::{BuildError, ImageBackend, RetryPolicy};
pub use cluster::{ClusterError, ControlPlane, PodPhase, WatchEvent};
pub use error::{DeployError, Result};
pub use follow::{FollowConfig, LogFollower, PodOutcome};
pub use manifest::{Asset, Resource, ResourceKind, ResourceMeta};
pub use orchestrator::{AssetOutcome, Orchestrator, OrchestratorConfig};
pub use progress::{Outcome, ProgressEvent, ProgressSink, Stage};
pub use project::{LoadOptions, Project, ProjectConfig};
pub use registry::{ImageRef, RegistryClient, RegistryError};
pub use scripts::{ScriptOutput, ScriptRunner, ShellScriptRunner};
pub use variables::VariableScope;
pub use wait::{JobOutcome, JobWaiter, WaitConfig};
