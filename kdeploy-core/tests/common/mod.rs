//! Shared fixtures for kdeploy-core integration tests.

#![allow(dead_code)]

use kdeploy_core::manifest::Asset;
use kdeploy_core::project::{LoadOptions, Project, ProjectConfig};
use std::path::Path;
use tempfile::TempDir;

/// A project tree in a temporary directory.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn file(&self, relative: &str, contents: &str) -> &Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn load(&self) -> kdeploy_core::Result<Project> {
        Project::load(self.path(), &LoadOptions::default())
    }
}

pub fn config_map(name: &str) -> String {
    format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\ndata:\n  key: value\n")
}

pub fn service(name: &str) -> String {
    format!(
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: {name}\nspec:\n  ports:\n  - port: 80\n"
    )
}

pub fn deployment(name: &str, image: &str) -> String {
    format!(
        "apiVersion: apps/v1
kind: Deployment
metadata:
  name: {name}
spec:
  selector:
    matchLabels:
      name: {name}
  template:
    metadata:
      labels:
        name: {name}
    spec:
      containers:
      - name: {name}
        image: {image}
"
    )
}

pub fn job(name: &str, image: &str) -> String {
    format!(
        "apiVersion: batch/v1
kind: Job
metadata:
  name: {name}
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
      - name: {name}
        image: {image}
"
    )
}

pub fn pod(name: &str, image: &str) -> String {
    format!(
        "apiVersion: v1
kind: Pod
metadata:
  name: {name}
spec:
  containers:
  - name: {name}
    image: {image}
"
    )
}

/// Decode one manifest as an in-memory asset.
pub fn asset(file: &str, manifest: &str) -> Asset {
    Asset::parse(file, manifest.as_bytes().to_vec()).unwrap()
}

/// A project assembled in memory, rooted at `/srv/app`.
pub fn project(
    config: ProjectConfig,
    namespace: &str,
    resources: Vec<Asset>,
    jobs: Vec<Asset>,
    services: Vec<Asset>,
) -> Project {
    Project::from_parts(config, namespace, "/srv/app", resources, jobs, services)
}
