//! Project resolution: descriptor, variables, globs and assets.

use super::config::{
    DEFAULT_JOBS_GLOB, DEFAULT_NAMESPACE, DEFAULT_RESOURCES_GLOB, DEFAULT_SERVICES_GLOB,
    DESCRIPTOR_FILE, ProjectConfig,
};
use super::paths::translate;
use super::Project;
use crate::error::{DeployError, Result};
use crate::manifest::{Asset, ResourceMeta};
use crate::template;
use crate::variables::{Builtins, VariableScope};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Caller-supplied inputs to project loading.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Namespace override, taking precedence over the descriptor.
    pub namespace: Option<String>,
    /// Variable overrides, taking precedence over every other source.
    pub variables: VariableScope,
}

impl LoadOptions {
    /// Options with only variable overrides.
    pub fn with_variables(variables: VariableScope) -> Self {
        Self {
            namespace: None,
            variables,
        }
    }
}

/// Load the project at `path`.
///
/// Any failure aborts the load; a partially loaded project is never returned.
pub fn load(path: &Path, options: &LoadOptions) -> Result<Project> {
    let (descriptor, project_dir) = locate_descriptor(path)?;

    let config = match &descriptor {
        Some(file) => read_descriptor(file, &options.variables)?,
        None => ProjectConfig::default(),
    };

    let namespace = options
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .or_else(|| config.namespace.clone().filter(|ns| !ns.is_empty()))
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let root = match config.root_folder.as_deref() {
        Some(folder) if !folder.is_empty() => translate(&project_dir, folder),
        _ => project_dir.clone(),
    };

    let variables = build_scope(&config, &namespace, &root, &options.variables);

    let excludes = expand_excludes(&root, &config.excludes)?;
    let loader = AssetLoader {
        root: &root,
        namespace: &namespace,
        variables: &variables,
        excludes: &excludes,
    };
    let resources = loader.load_collection(&config.resources, DEFAULT_RESOURCES_GLOB)?;
    let jobs = loader.load_collection(&config.jobs, DEFAULT_JOBS_GLOB)?;
    let services = loader.load_collection(&config.services, DEFAULT_SERVICES_GLOB)?;

    tracing::info!(
        namespace = %namespace,
        root = %root.display(),
        resources = resources.len(),
        jobs = jobs.len(),
        services = services.len(),
        "Project loaded"
    );

    Ok(Project {
        config,
        namespace,
        root,
        variables,
        resources,
        jobs,
        services,
    })
}

/// Find the descriptor for `path` and the directory the project lives in.
fn locate_descriptor(path: &Path) -> Result<(Option<PathBuf>, PathBuf)> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DeployError::ProjectNotFound {
            path: path.to_path_buf(),
        },
        _ => DeployError::io(path, e),
    })?;

    if metadata.is_dir() {
        let candidate = path.join(DESCRIPTOR_FILE);
        let descriptor = candidate.is_file().then_some(candidate);
        return Ok((descriptor, path.to_path_buf()));
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((Some(path.to_path_buf()), dir))
}

/// Render the descriptor through the override-only scope and decode it.
fn read_descriptor(file: &Path, overrides: &VariableScope) -> Result<ProjectConfig> {
    let raw = std::fs::read(file).map_err(|e| DeployError::io(file, e))?;
    let rendered =
        template::render_bytes(&raw, overrides).map_err(|source| DeployError::Template {
            path: file.to_path_buf(),
            source,
        })?;
    ProjectConfig::from_yaml(&rendered).map_err(|e| DeployError::Descriptor {
        path: file.to_path_buf(),
        message: e.to_string(),
    })
}

/// Built-ins < descriptor variables < build bindings < overrides.
fn build_scope(
    config: &ProjectConfig,
    namespace: &str,
    root: &Path,
    overrides: &VariableScope,
) -> VariableScope {
    let builtins = Builtins::detect(namespace, root).scope();
    let descriptor: VariableScope = config.variables.clone().into_iter().collect();
    let builds: VariableScope = config
        .build
        .iter()
        .map(|b| (b.variable_key(), b.image()))
        .collect();
    VariableScope::merge([&builtins, &descriptor, &builds, overrides])
}

fn expand_excludes(root: &Path, globs: &[String]) -> Result<HashSet<PathBuf>> {
    let mut excludes = HashSet::new();
    for pattern in globs {
        excludes.extend(expand_glob(&translate(root, pattern))?);
    }
    Ok(excludes)
}

fn expand_glob(pattern: &Path) -> Result<Vec<PathBuf>> {
    let glob_error = |message: String| DeployError::Glob {
        pattern: pattern.display().to_string(),
        message,
    };
    let pattern_str = pattern
        .to_str()
        .ok_or_else(|| glob_error("pattern is not valid UTF-8".to_string()))?;
    let paths = glob::glob(pattern_str).map_err(|e| glob_error(e.to_string()))?;
    paths
        .map(|entry| entry.map_err(|e| glob_error(e.to_string())))
        .collect()
}

struct AssetLoader<'a> {
    root: &'a Path,
    namespace: &'a str,
    variables: &'a VariableScope,
    excludes: &'a HashSet<PathBuf>,
}

impl AssetLoader<'_> {
    fn load_collection(&self, globs: &[String], default_glob: &str) -> Result<Vec<Asset>> {
        let defaults = [default_glob.to_string()];
        let globs = if globs.is_empty() { &defaults[..] } else { globs };

        let mut files = Vec::new();
        for pattern in globs {
            files.extend(expand_glob(&translate(self.root, pattern))?);
        }

        let mut assets = Vec::with_capacity(files.len());
        for file in files {
            if self.excludes.contains(&file) || file.is_dir() {
                continue;
            }
            assets.push(self.load_asset(&file)?);
        }
        Ok(assets)
    }

    fn load_asset(&self, file: &Path) -> Result<Asset> {
        let raw = std::fs::read(file).map_err(|e| DeployError::io(file, e))?;
        let rendered =
            template::render_bytes(&raw, self.variables).map_err(|source| DeployError::Template {
                path: file.to_path_buf(),
                source,
            })?;
        let mut asset = Asset::parse(file, rendered)?;
        asset.set_namespace(self.namespace);
        tracing::debug!(
            kind = %asset.kind(),
            name = %asset.name(),
            file = %file.display(),
            "Loaded asset"
        );
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_is_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.yml");
        std::fs::write(&file, "namespace: x\n").unwrap();
        let (descriptor, project_dir) = locate_descriptor(&file).unwrap();
        assert_eq!(descriptor, Some(file));
        assert_eq!(project_dir, dir.path());
    }

    #[test]
    fn directory_without_descriptor_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (descriptor, project_dir) = locate_descriptor(dir.path()).unwrap();
        assert_eq!(descriptor, None);
        assert_eq!(project_dir, dir.path());
    }

    #[test]
    fn missing_path_is_reported() {
        let err = locate_descriptor(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, DeployError::ProjectNotFound { .. }));
    }

    #[test]
    fn build_bindings_sit_between_descriptor_and_overrides() {
        let mut config = ProjectConfig::default();
        config.variables.insert("app_var_namespace".into(), "from-descriptor".into());
        config.variables.insert("build_var_web".into(), "stale".into());
        config.build.push(super::super::config::ProjectBuild {
            name: "web".into(),
            tag: "2".into(),
            ..Default::default()
        });
        let overrides = VariableScope::new();
        let scope = build_scope(&config, "prod", Path::new("/srv"), &overrides);
        assert_eq!(scope.get("app_var_namespace"), Some("from-descriptor"));
        assert_eq!(scope.get("build_var_web"), Some("web:2"));

        let overrides: VariableScope = [("build_var_web", "pinned:1")].into_iter().collect();
        let scope = build_scope(&config, "prod", Path::new("/srv"), &overrides);
        assert_eq!(scope.get("build_var_web"), Some("pinned:1"));
    }
}
