//! Per-asset create, destroy and update, plus namespace handling.

use super::Orchestrator;
use crate::cluster::{ClusterError, ClusterResult, DependentKind, PodPhase};
use crate::error::{DeployError, Result};
use crate::manifest::{Asset, Resource, ResourceKind, ResourceMeta};
use crate::progress::{Outcome, ProgressEvent, Stage};
use crate::project::DEFAULT_NAMESPACE;

/// The result of one per-asset step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOutcome {
    /// The object was created.
    Created,
    /// Create found the object already present.
    AlreadyExists,
    /// The object was deleted.
    Destroyed,
    /// Destroy or update found the object absent.
    NotExisted,
    /// The object was replaced in place.
    Updated,
    /// Nothing needed to change.
    Unchanged,
    /// The kind does not support the step.
    Unsupported,
}

impl Orchestrator<'_> {
    /// Create `asset` unless it already exists.
    pub async fn create_asset(&self, asset: &Asset, namespace: &str) -> Result<AssetOutcome> {
        let kind = asset.kind();
        let name = asset.name();
        self.emit_asset(Stage::Create, asset, namespace, Outcome::Started);

        if self.asset_exists(kind, name, namespace).await? {
            self.emit_asset(Stage::Create, asset, namespace, Outcome::AlreadyExists);
            return Ok(AssetOutcome::AlreadyExists);
        }

        if kind == ResourceKind::Pod {
            // Replaces a completed pod of the same name.
            ignore_not_found(self.cluster.delete(kind, name, namespace).await)?;
        }
        self.create_with_retry(asset.resource(), namespace).await?;

        tracing::info!(kind = %kind, name = %name, namespace = %namespace, "Created");
        self.emit_asset(Stage::Create, asset, namespace, Outcome::Succeeded);
        Ok(AssetOutcome::Created)
    }

    /// Destroy `asset` and its dependents.
    ///
    /// Absent objects are left alone, except pods, which always get a delete.
    pub async fn destroy_asset(&self, asset: &Asset, namespace: &str) -> Result<AssetOutcome> {
        let kind = asset.kind();
        let name = asset.name();
        self.emit_asset(Stage::Destroy, asset, namespace, Outcome::Started);

        let exists = self.asset_exists(kind, name, namespace).await?;
        if !exists && kind != ResourceKind::Pod {
            self.emit_asset(Stage::Destroy, asset, namespace, Outcome::NotExisted);
            return Ok(AssetOutcome::NotExisted);
        }

        self.destroy_resource(kind, name, namespace).await?;

        tracing::info!(kind = %kind, name = %name, namespace = %namespace, "Destroyed");
        self.emit_asset(Stage::Destroy, asset, namespace, Outcome::Succeeded);
        Ok(AssetOutcome::Destroyed)
    }

    /// Replace `asset` in place if its kind allows it and it exists.
    pub async fn update_asset(&self, asset: &Asset, namespace: &str) -> Result<AssetOutcome> {
        let kind = asset.kind();
        if !kind.supports_update() {
            return Ok(AssetOutcome::Unsupported);
        }
        let name = asset.name();
        self.emit_asset(Stage::Update, asset, namespace, Outcome::Started);

        if !self.asset_exists(kind, name, namespace).await? {
            self.emit_asset(Stage::Update, asset, namespace, Outcome::NotExisted);
            return Ok(AssetOutcome::NotExisted);
        }

        self.cluster.update(asset.resource(), namespace).await?;
        self.emit_asset(Stage::Update, asset, namespace, Outcome::Succeeded);
        Ok(AssetOutcome::Updated)
    }

    /// Existence as the lifecycle sees it: finished pods count as absent.
    pub(super) async fn asset_exists(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> Result<bool> {
        if kind != ResourceKind::Pod {
            return Ok(self.cluster.exists(kind, name, namespace).await?);
        }
        let Some(pod) = self.cluster.get_pod(name, namespace).await? else {
            return Ok(false);
        };
        match PodPhase::of(&pod) {
            PodPhase::Unknown => Err(DeployError::UnknownPodPhase {
                name: name.to_string(),
            }),
            phase => Ok(!phase.is_terminal()),
        }
    }

    async fn create_with_retry(&self, resource: &Resource, namespace: &str) -> Result<()> {
        let policy = self.config.create_retry;
        let mut attempt = 1;
        let mut created_namespace = false;
        loop {
            match self.cluster.create(resource, namespace).await {
                Ok(()) => return Ok(()),
                Err(ClusterError::NamespaceTerminating { .. }) if attempt < policy.attempts => {
                    tracing::warn!(
                        name = %resource.name(),
                        namespace = %namespace,
                        attempt,
                        "Namespace is terminating, retrying create"
                    );
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                }
                Err(ClusterError::NamespaceMissing { .. }) if !created_namespace => {
                    tracing::info!(namespace = %namespace, "Namespace missing, creating it");
                    self.create_namespace(namespace).await?;
                    created_namespace = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn destroy_resource(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<()> {
        ignore_not_found(self.cluster.delete(kind, name, namespace).await)?;

        let name_selector = format!("name={name}");
        match kind {
            ResourceKind::Deployment => {
                let replica_sets = self
                    .cluster
                    .list_dependents(DependentKind::ReplicaSet, namespace, &name_selector)
                    .await?;
                for rs in &replica_sets {
                    tracing::debug!(replicaset = %rs, namespace = %namespace, "Deleting replica set");
                    ignore_not_found(
                        self.cluster
                            .delete_dependent(DependentKind::ReplicaSet, rs, namespace)
                            .await,
                    )?;
                }
                self.delete_pods(namespace, &name_selector).await
            }
            ResourceKind::Job => self.delete_pods(namespace, &format!("job-name={name}")).await,
            ResourceKind::DaemonSet | ResourceKind::StatefulSet => {
                self.delete_pods(namespace, &name_selector).await
            }
            _ => Ok(()),
        }
    }

    async fn delete_pods(&self, namespace: &str, selector: &str) -> Result<()> {
        tracing::debug!(selector = %selector, namespace = %namespace, "Deleting pods");
        ignore_not_found(
            self.cluster
                .delete_dependents(DependentKind::Pod, namespace, selector)
                .await,
        )
    }

    /// Create the namespace if it does not exist.
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        if self.cluster.namespace_exists(namespace).await? {
            return Ok(());
        }
        self.create_namespace(namespace).await
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        match self.cluster.create_namespace(namespace).await {
            Ok(()) | Err(ClusterError::Conflict { .. }) => {
                self.progress.emit(ProgressEvent::new(
                    Stage::Namespace,
                    namespace,
                    namespace,
                    Outcome::Succeeded,
                ));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the namespace, retrying while the control plane reports it busy.
    ///
    /// The `default` namespace is never deleted.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        if namespace == DEFAULT_NAMESPACE {
            self.progress.emit(ProgressEvent::new(
                Stage::Namespace,
                namespace,
                namespace,
                Outcome::Skipped("default namespace is never deleted".to_string()),
            ));
            return Ok(());
        }
        if !self.cluster.namespace_exists(namespace).await? {
            return Ok(());
        }

        let policy = self.config.namespace_delete_retry;
        let mut attempt = 1;
        loop {
            match self.cluster.delete_namespace(namespace).await {
                Ok(())
                | Err(ClusterError::NotFound { .. } | ClusterError::NamespaceMissing { .. }) => {
                    break;
                }
                Err(ClusterError::Conflict { .. } | ClusterError::NamespaceTerminating { .. })
                    if attempt < policy.attempts =>
                {
                    tracing::warn!(namespace = %namespace, attempt, "Namespace busy, retrying delete");
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(namespace = %namespace, "Namespace deleted");
        self.progress.emit(ProgressEvent::new(
            Stage::Namespace,
            namespace,
            namespace,
            Outcome::Changed("deleted".to_string()),
        ));
        Ok(())
    }

    fn emit_asset(&self, stage: Stage, asset: &Asset, namespace: &str, outcome: Outcome) {
        self.progress.emit(ProgressEvent::asset(
            stage,
            asset.kind().as_str(),
            asset.name(),
            namespace,
            outcome,
        ));
    }
}

fn ignore_not_found(result: ClusterResult<()>) -> Result<()> {
    match result {
        Err(ClusterError::NotFound { .. } | ClusterError::NamespaceMissing { .. }) => Ok(()),
        other => Ok(other?),
    }
}
