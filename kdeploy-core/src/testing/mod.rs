//! In-memory collaborators for exercising the orchestrator without a cluster.
//!
//! Every fake records the calls it receives so tests can assert on the exact
//! sequence of side effects, and accepts scripted failures so retry and
//! error paths can be driven deterministically.
//!
//! # Example
//!
//! ```ignore
//! use kdeploy_core::testing::{FakeCluster, RecordingBackend};
//! use kdeploy_core::Orchestrator;
//!
//! let cluster = FakeCluster::new().with_namespace("shop");
//! let images = RecordingBackend::new();
//! Orchestrator::new(&cluster, &images).up(&project).await?;
//! assert_eq!(cluster.created(), vec!["deployment/web"]);
//! ```

mod cluster;
mod recording;

pub use cluster::{ClusterCall, FakeCluster};
pub use recording::{
    BackendCall, RecordingBackend, RecordingProgress, RecordingScripts, StaticRegistry,
};
