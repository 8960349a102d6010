//! Manifest decoding.
//!
//! A manifest is one rendered YAML (or JSON) document carrying a `kind`.
//! [`decode`] turns it into a typed [`Resource`] and [`Asset`] pairs the
//! resource with its source path and rendered bytes.

mod kinds;

pub use kinds::{Resource, ResourceKind, ResourceMeta};

use crate::error::{DeployError, Result};
use k8s_openapi::api::core::v1::PodSpec;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// One decoded, namespace-rewritten manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    resource: Resource,
    source: PathBuf,
    raw: Vec<u8>,
}

impl Asset {
    /// Decode the rendered bytes of `source`.
    pub fn parse(source: impl Into<PathBuf>, raw: Vec<u8>) -> Result<Self> {
        let source = source.into();
        let resource = decode(&source, &raw)?;
        Ok(Self {
            resource,
            source,
            raw,
        })
    }

    /// Lower-cased kind.
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// The typed resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Mutable access to the typed resource.
    pub fn resource_mut(&mut self) -> &mut Resource {
        &mut self.resource
    }

    /// The file this asset was rendered from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The rendered manifest bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Every container image the resource references, init containers first.
    pub fn images(&self) -> Vec<&str> {
        pod_spec(&self.resource)
            .map(|spec| {
                spec.init_containers
                    .iter()
                    .flatten()
                    .chain(spec.containers.iter())
                    .filter_map(|c| c.image.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ResourceMeta for Asset {
    fn name(&self) -> &str {
        self.resource.name()
    }

    fn namespace(&self) -> &str {
        self.resource.namespace()
    }

    fn set_namespace(&mut self, namespace: &str) {
        self.resource.set_namespace(namespace);
    }
}

/// The pod spec of a pod or the pod template of a workload.
pub fn pod_spec(resource: &Resource) -> Option<&PodSpec> {
    match resource {
        Resource::Pod(pod) => pod.spec.as_ref(),
        Resource::Deployment(d) => d.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
        Resource::Job(j) => j.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
        Resource::DaemonSet(d) => d.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
        Resource::StatefulSet(s) => s.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
        _ => None,
    }
}

/// Decode one rendered manifest.
///
/// The `kind` field selects the variant; the `apiVersion` is checked against
/// the served version for that kind and its legacy aliases, then both fields
/// are rewritten to their canonical form before the typed decode.
pub fn decode(path: &Path, raw: &[u8]) -> Result<Resource> {
    let parse_error = |message: String| DeployError::ManifestParse {
        path: path.to_path_buf(),
        message,
    };

    let mut value: Value = serde_yaml::from_slice(raw).map_err(|e| parse_error(e.to_string()))?;
    let mapping = value
        .as_mapping_mut()
        .ok_or_else(|| parse_error("manifest is not a mapping".to_string()))?;

    let declared = mapping
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error("missing `kind`".to_string()))?
        .to_lowercase();
    let kind = ResourceKind::parse(&declared).ok_or_else(|| DeployError::UnsupportedResourceKind {
        kind: declared.clone(),
        path: path.to_path_buf(),
    })?;

    normalize(mapping, kind, path)?;

    Resource::from_value(kind, value).map_err(|e| parse_error(e.to_string()))
}

fn normalize(mapping: &mut Mapping, kind: ResourceKind, path: &Path) -> Result<()> {
    let served = kind.api_version();
    match mapping.get("apiVersion") {
        None | Some(Value::Null) => {}
        Some(Value::String(v)) if v == served || kind.legacy_api_versions().contains(&v.as_str()) => {
            if v != served {
                tracing::debug!(kind = %kind, from = %v, to = served, "Rewriting legacy apiVersion");
            }
        }
        Some(other) => {
            let api_version = match other {
                Value::String(s) => s.clone(),
                v => serde_yaml::to_string(v).unwrap_or_default().trim().to_string(),
            };
            return Err(DeployError::UnsupportedApiVersion {
                kind: kind.as_str().to_string(),
                api_version,
                path: path.to_path_buf(),
            });
        }
    }
    mapping.insert("apiVersion".into(), served.into());
    mapping.insert("kind".into(), kind.canonical_kind().into());
    Ok(())
}
