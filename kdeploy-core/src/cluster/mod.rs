//! The control-plane seam.
//!
//! [`ControlPlane`] is the set of calls the orchestrator, waiter and
//! follower make against a cluster. The production implementation lives in
//! `kdeploy-kube`; [`crate::testing::FakeCluster`] records calls in memory.

mod error;

pub use error::{ClusterError, ClusterResult};

use crate::manifest::{Resource, ResourceKind};
use bytes::Bytes;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by control-plane calls.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = ClusterResult<T>> + Send + 'a>>;

/// A stream of watch events for one object.
pub type WatchStream<T> = BoxStream<'static, ClusterResult<WatchEvent<T>>>;

/// A stream of log chunks.
pub type LogStream = BoxStream<'static, ClusterResult<Bytes>>;

/// A change notification for a watched object.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    /// The object was created or modified.
    Applied(T),
    /// The object was deleted.
    Deleted(T),
}

/// Objects owned by a workload that cascading destroy sweeps up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentKind {
    /// Replica sets owned by a deployment.
    ReplicaSet,
    /// Pods owned by a workload.
    Pod,
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReplicaSet => "replicaset",
            Self::Pod => "pod",
        })
    }
}

/// Calls against a cluster control plane.
///
/// Absent objects are reported as [`ClusterError::NotFound`] by the mutating
/// calls and as `None`/`false` by the lookups. Deletes use a zero grace
/// period.
pub trait ControlPlane: Send + Sync {
    /// Whether an object of `kind` named `name` exists.
    fn exists<'a>(
        &'a self,
        kind: ResourceKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, bool>;

    /// Create `resource` in `namespace`.
    fn create<'a>(&'a self, resource: &'a Resource, namespace: &'a str) -> ClusterFuture<'a, ()>;

    /// Replace the live object with `resource`.
    fn update<'a>(&'a self, resource: &'a Resource, namespace: &'a str) -> ClusterFuture<'a, ()>;

    /// Delete one object.
    fn delete<'a>(
        &'a self,
        kind: ResourceKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, ()>;

    /// Names of dependents matching a label selector.
    fn list_dependents<'a>(
        &'a self,
        kind: DependentKind,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<String>>;

    /// Delete one dependent.
    fn delete_dependent<'a>(
        &'a self,
        kind: DependentKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, ()>;

    /// Delete every dependent matching a label selector.
    fn delete_dependents<'a>(
        &'a self,
        kind: DependentKind,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, ()>;

    /// Whether the namespace exists.
    fn namespace_exists<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, bool>;

    /// Create the namespace.
    fn create_namespace<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, ()>;

    /// Delete the namespace.
    fn delete_namespace<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, ()>;

    /// Fetch a live deployment.
    fn get_deployment<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, Option<Deployment>>;

    /// Replace a live deployment.
    fn update_deployment<'a>(
        &'a self,
        deployment: &'a Deployment,
        namespace: &'a str,
    ) -> ClusterFuture<'a, ()>;

    /// Fetch a job's current state.
    fn get_job<'a>(&'a self, name: &'a str, namespace: &'a str) -> ClusterFuture<'a, Option<Job>>;

    /// Watch one job by name.
    fn watch_job<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, WatchStream<Job>>;

    /// Fetch a pod's current state.
    fn get_pod<'a>(&'a self, name: &'a str, namespace: &'a str) -> ClusterFuture<'a, Option<Pod>>;

    /// Watch one pod by name.
    fn watch_pod<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, WatchStream<Pod>>;

    /// Follow a pod's log, optionally starting from the last `tail_lines` lines.
    fn pod_logs<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
        tail_lines: Option<i64>,
    ) -> ClusterFuture<'a, LogStream>;
}

/// Pod phases the orchestrator and follower act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    /// Scheduled but containers not yet started.
    Pending,
    /// At least one container running.
    Running,
    /// All containers exited successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// The node lost contact.
    Unknown,
}

impl PodPhase {
    /// The phase reported in a pod's status; a missing status is pending.
    pub fn of(pod: &Pod) -> Self {
        match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            Some("Unknown") => Self::Unknown,
            _ => Self::Pending,
        }
    }

    /// Whether the pod has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        })
    }
}
