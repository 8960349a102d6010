//! CLI command implementations.

pub mod autoupdate;
pub mod debug;
pub mod lifecycle;
pub mod log;
pub mod version;
pub mod wait;

use anyhow::{Context, Result};
use kdeploy_core::{LoadOptions, Project, VariableScope};
use kdeploy_kube::KubeControlPlane;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit code for a job or pod that finished unsuccessfully.
pub const EXIT_FAILED: u8 = 1;
/// Exit code for a wait that ran out of time.
pub const EXIT_TIMEOUT: u8 = 2;

/// Flags shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Explicit kubeconfig file.
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context.
    pub context: Option<String>,
    /// Namespace override.
    pub namespace: Option<String>,
    /// Deadline for waits.
    pub timeout: Duration,
    /// Raw `key=value` overrides.
    pub variables: Vec<String>,
}

impl GlobalOptions {
    /// Connect to the configured cluster.
    pub async fn connect(&self) -> Result<KubeControlPlane> {
        let kubeconfig = self.kubeconfig.clone().or_else(default_kubeconfig);
        KubeControlPlane::connect(kubeconfig, self.context.clone())
            .await
            .context("Failed to connect to the cluster")
    }

    /// Load the project at `path` with the namespace and variable overrides.
    pub fn load_project(&self, path: &Path) -> Result<Project> {
        let options = LoadOptions {
            namespace: self.namespace.clone(),
            variables: VariableScope::from_pairs(&self.variables),
        };
        Project::load(path, &options)
            .with_context(|| format!("Failed to load project {}", path.display()))
    }

    /// Namespace for commands that act on a single object.
    pub fn target_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }
}

/// `~/.kube/config` when it exists; otherwise the client infers its configuration.
fn default_kubeconfig() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .filter(|path| path.is_file())
}

/// Parse a duration such as `15m`, `30s`, `1h` or `1h30m`. A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            other => return Err(format!("unknown duration unit {other:?} in {input:?}")),
        };
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before {c:?} in {input:?}"))?;
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration {input:?} is too large"))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after {digits:?} in {input:?}"));
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2m5s"), Ok(Duration::from_secs(125)));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("5m3").is_err());
    }

    #[test]
    fn namespace_defaults_for_single_objects() {
        let options = GlobalOptions {
            kubeconfig: None,
            context: None,
            namespace: None,
            timeout: Duration::from_secs(900),
            variables: vec![],
        };
        assert_eq!(options.target_namespace(), "default");
    }
}
