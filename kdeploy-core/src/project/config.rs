//! The project descriptor (`project.yml`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the descriptor looked up inside a project directory.
pub const DESCRIPTOR_FILE: &str = "project.yml";

/// Namespace used when neither the caller nor the descriptor names one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Globs used for a collection the descriptor leaves empty.
pub const DEFAULT_RESOURCES_GLOB: &str = "resources/*";
/// See [`DEFAULT_RESOURCES_GLOB`].
pub const DEFAULT_JOBS_GLOB: &str = "jobs/*";
/// See [`DEFAULT_RESOURCES_GLOB`].
pub const DEFAULT_SERVICES_GLOB: &str = "services/*";

/// Decoded project descriptor.
///
/// Every key is optional. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Root of the manifest tree, relative to the descriptor.
    pub root_folder: Option<String>,
    /// Image names (without tag) to pull before deploying.
    pub pulls: Vec<String>,
    /// Scripts run before `up` / `update`.
    pub init_up: Vec<String>,
    /// Scripts run before `down`.
    pub init_down: Vec<String>,
    /// Scripts run after `up` / `update`.
    pub finalize_up: Vec<String>,
    /// Scripts run after `down`.
    pub finalize_down: Vec<String>,
    /// Resource globs.
    pub resources: Vec<String>,
    /// Job globs.
    pub jobs: Vec<String>,
    /// Service globs.
    pub services: Vec<String>,
    /// Globs of files never loaded.
    pub excludes: Vec<String>,
    /// Target namespace.
    pub namespace: Option<String>,
    /// Project-level variables.
    pub variables: BTreeMap<String, String>,
    /// Image builds, in order.
    pub build: Vec<ProjectBuild>,
    /// Registry logins performed before building.
    pub credentials: Vec<Credential>,
    /// Delete the namespace on `down`.
    pub delete_namespace: bool,
    /// Deployments eligible for `autoupdate`.
    pub auto_updates: Vec<AutoUpdate>,
    /// Registry credentials referenced by auto-update containers.
    pub auto_update_credentials: Vec<AutoUpdateCredential>,
}

impl ProjectConfig {
    /// Decode a rendered descriptor.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
        // An empty descriptor decodes as `null`.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(bytes)
    }
}

/// One declared image build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectBuild {
    /// Image name, e.g. `gcr.io/acme/web`.
    pub name: String,
    /// Variable key bound to `name:tag`; derived from `name` when empty.
    pub var_name: Option<String>,
    /// Image tag.
    pub tag: String,
    /// Build context directory, relative to the root folder.
    pub from: String,
    /// Push after building.
    pub push: bool,
    /// Also tag and push `name:latest`.
    pub push_latest: bool,
    /// Remove the image on `down`.
    pub auto_clean: bool,
}

impl ProjectBuild {
    /// `name:tag`.
    pub fn image(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// `name:latest`.
    pub fn latest_image(&self) -> String {
        format!("{}:latest", self.name)
    }

    /// The variable key this build binds.
    pub fn variable_key(&self) -> String {
        match self.var_name.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => crate::variables::build_var_name(&self.name),
        }
    }
}

/// A registry login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Credential {
    /// Registry host.
    pub host: String,
    /// User name.
    pub username: String,
    /// Inline password.
    pub password: Option<String>,
    /// File holding the password, relative to the root folder.
    pub password_file: Option<String>,
}

/// Auto-update entry for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoUpdate {
    /// Deployment name.
    pub name: String,
    /// Containers to retag.
    pub containers: Vec<AutoUpdateContainer>,
}

/// A container inside an auto-updated deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoUpdateContainer {
    /// Container name.
    pub name: String,
    /// Name of an [`AutoUpdateCredential`], if the registry needs one.
    pub credential: Option<String>,
}

/// Registry credentials for tag discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoUpdateCredential {
    /// Name referenced from [`AutoUpdateContainer::credential`].
    pub name: String,
    /// User name.
    pub username: String,
    /// Inline password.
    pub password: Option<String>,
    /// File holding the password, relative to the root folder.
    pub password_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_descriptor() {
        let yaml = r#"
root_folder: k8s
namespace: staging
pulls: [redis]
init_up: ["make assets"]
resources: ["resources/*.yml"]
excludes: ["resources/local.yml"]
variables:
  replicas: "3"
build:
  - name: gcr.io/acme/web
    tag: "1.2"
    from: ./web
    push: true
    push_latest: true
    auto_clean: true
credentials:
  - host: gcr.io
    username: _json_key
    password_file: key.json
delete_namespace: true
auto_updates:
  - name: web
    containers:
      - name: web
        credential: gcr
auto_update_credentials:
  - name: gcr
    username: _json_key
    password: secret
"#;
        let config = ProjectConfig::from_yaml(yaml.as_bytes()).unwrap();
        assert_eq!(config.root_folder.as_deref(), Some("k8s"));
        assert_eq!(config.namespace.as_deref(), Some("staging"));
        assert_eq!(config.variables.get("replicas").map(String::as_str), Some("3"));
        assert_eq!(config.build[0].image(), "gcr.io/acme/web:1.2");
        assert_eq!(config.build[0].variable_key(), "build_var_gcr_io_acme_web");
        assert!(config.delete_namespace);
        assert_eq!(config.auto_updates[0].containers[0].credential.as_deref(), Some("gcr"));
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn explicit_var_name_wins() {
        let build = ProjectBuild {
            name: "anduin/test".into(),
            var_name: Some("web_image".into()),
            tag: "7".into(),
            ..Default::default()
        };
        assert_eq!(build.variable_key(), "web_image");
    }

    #[test]
    fn empty_descriptor_is_default() {
        assert_eq!(ProjectConfig::from_yaml(b"\n  \n").unwrap(), ProjectConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ProjectConfig::from_yaml(b"namespaces: prod\n").is_err());
        assert!(ProjectConfig::from_yaml(b"build:\n  - name: a\n    tags: x\n").is_err());
    }
}
