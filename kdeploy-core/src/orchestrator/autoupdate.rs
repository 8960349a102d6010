//! Retagging live deployments.

use super::Orchestrator;
use super::assets::AssetOutcome;
use crate::error::{DeployError, Result};
use crate::manifest::{Asset, ResourceKind, ResourceMeta};
use crate::progress::{Outcome, ProgressEvent, Stage};
use crate::project::paths::read_password;
use crate::project::{AutoUpdate, Project};
use crate::registry::{ImageRef, RegistryClient, RegistryCredentials, discover_latest_tag};
use std::collections::BTreeMap;

impl Orchestrator<'_> {
    /// Move every auto-updated deployment's containers to a new tag.
    ///
    /// With `tag` set every listed container is moved to it; otherwise each
    /// container's newest tag is discovered through `registry`.
    pub async fn auto_update(
        &self,
        project: &Project,
        registry: &dyn RegistryClient,
        tag: Option<&str>,
    ) -> Result<()> {
        match tag {
            Some(tag) => tracing::info!(tag = %tag, "Auto-updating to explicit tag"),
            None => tracing::info!("Auto-updating to latest registry tags"),
        }
        let entries: BTreeMap<&str, &AutoUpdate> = project
            .config()
            .auto_updates
            .iter()
            .map(|u| (u.name.as_str(), u))
            .collect();

        for asset in project.assets() {
            if asset.kind() != ResourceKind::Deployment {
                continue;
            }
            if let Some(entry) = entries.get(asset.name()) {
                self.auto_update_deployment(project, asset, entry, registry, tag)
                    .await?;
            }
        }
        Ok(())
    }

    async fn auto_update_deployment(
        &self,
        project: &Project,
        asset: &Asset,
        entry: &AutoUpdate,
        registry: &dyn RegistryClient,
        explicit_tag: Option<&str>,
    ) -> Result<AssetOutcome> {
        let ns = project.namespace();
        let name = asset.name();
        let emit = |outcome| {
            self.progress.emit(ProgressEvent::asset(
                Stage::AutoUpdate,
                ResourceKind::Deployment.as_str(),
                name,
                ns,
                outcome,
            ))
        };
        emit(Outcome::Started);

        if !self.asset_exists(ResourceKind::Deployment, name, ns).await? {
            emit(Outcome::NotExisted);
            return Ok(AssetOutcome::NotExisted);
        }
        let Some(mut deployment) = self.cluster.get_deployment(name, ns).await? else {
            emit(Outcome::NotExisted);
            return Ok(AssetOutcome::NotExisted);
        };

        let current: BTreeMap<String, String> = deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|spec| {
                spec.containers
                    .iter()
                    .filter_map(|c| c.image.clone().map(|image| (c.name.clone(), image)))
                    .collect()
            })
            .unwrap_or_default();

        let mut replacements = BTreeMap::new();
        for container in &entry.containers {
            let Some(image) = current.get(&container.name) else {
                emit(Outcome::Skipped(format!("container {:?} not found", container.name)));
                continue;
            };
            let reference = ImageRef::parse(image)?;

            let new_tag = match explicit_tag {
                Some(tag) => tag.to_string(),
                None if !registry.supports(&reference) => {
                    tracing::warn!(
                        container = %container.name,
                        image = %image,
                        "Registry not supported for tag discovery, skipping container"
                    );
                    emit(Outcome::Skipped(format!(
                        "unsupported registry for container {:?} ({image})",
                        container.name
                    )));
                    continue;
                }
                None => {
                    let credentials = self.credentials_for(project, container.credential.as_deref())?;
                    discover_latest_tag(registry, &reference, credentials.as_ref()).await?
                }
            };

            if reference.tag.as_deref() == Some(new_tag.as_str()) {
                emit(Outcome::Skipped(format!(
                    "container {:?} already at {new_tag}",
                    container.name
                )));
                continue;
            }
            replacements.insert(container.name.clone(), reference.with_tag(&new_tag));
        }

        if replacements.is_empty() {
            emit(Outcome::Skipped("no new container image".to_string()));
            return Ok(AssetOutcome::Unchanged);
        }

        if let Some(spec) = deployment
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
        {
            for container in &mut spec.containers {
                if let Some(image) = replacements.get(&container.name) {
                    container.image = Some(image.clone());
                }
            }
        }
        self.cluster.update_deployment(&deployment, ns).await?;

        for (container, image) in &replacements {
            tracing::info!(deployment = %name, container = %container, image = %image, "Updated container image");
            emit(Outcome::Changed(format!("{container} -> {image}")));
        }
        Ok(AssetOutcome::Updated)
    }

    fn credentials_for(
        &self,
        project: &Project,
        credential: Option<&str>,
    ) -> Result<Option<RegistryCredentials>> {
        let Some(name) = credential.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let entry = project
            .config()
            .auto_update_credentials
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DeployError::InvalidConfig(format!("unknown auto-update credential {name:?}")))?;
        let password = read_password(
            project.root(),
            name,
            entry.password.as_deref(),
            entry.password_file.as_deref(),
        )?;
        Ok(Some(RegistryCredentials {
            username: entry.username.clone(),
            password,
        }))
    }
}
