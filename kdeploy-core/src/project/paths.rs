//! Descriptor-relative path handling.

use crate::error::{DeployError, Result};
use std::path::{Path, PathBuf};

/// Resolve `file` against `base`.
///
/// Absolute paths are kept and a leading `~/` expands to the home directory;
/// anything else is joined onto `base`.
pub fn translate(base: &Path, file: &str) -> PathBuf {
    if let Some(rest) = file.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Resolve a credential's password from its inline value or password file.
///
/// The file is read relative to `root` with trailing whitespace trimmed.
pub fn read_password(
    root: &Path,
    owner: &str,
    password: Option<&str>,
    password_file: Option<&str>,
) -> Result<String> {
    match (password, password_file) {
        (Some(password), _) if !password.is_empty() => Ok(password.to_string()),
        (_, Some(file)) if !file.is_empty() => {
            let path = translate(root, file);
            let contents =
                std::fs::read_to_string(&path).map_err(|e| DeployError::io(&path, e))?;
            Ok(contents.trim_end().to_string())
        }
        _ => Err(DeployError::InvalidConfig(format!(
            "credential {owner:?} has neither password nor password_file"
        ))),
    }
}
