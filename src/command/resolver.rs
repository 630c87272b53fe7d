//! Binary name → executable path resolution.
//!
//! Allow-list entries are resolved once at startup. A request name that is
//! not on the list (or whose target could not be found) falls back to a
//! PATH lookup when `path_lookup` is enabled.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::BinariesConfig;

/// Requested binary could not be turned into an executable path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Binary not found for {0}")]
    NotFound(String),

    #[error("Invalid binary name '{0}'")]
    InvalidName(String),
}

/// Resolves request binary names against the allow-list and PATH.
#[derive(Debug, Clone)]
pub struct BinaryResolver {
    resolved: BTreeMap<String, PathBuf>,
    path_lookup: bool,
}

impl BinaryResolver {
    /// Pre-resolve every allow-list entry. Entries whose target cannot be
    /// found are logged and left out.
    pub fn from_config(config: &BinariesConfig) -> Self {
        let mut resolved = BTreeMap::new();
        for (alias, target) in &config.allow {
            match find_executable(target) {
                Some(path) => {
                    tracing::info!(alias = %alias, path = %path.display(), "Binary resolved");
                    resolved.insert(alias.clone(), path);
                }
                None => {
                    tracing::warn!(alias = %alias, target = %target, "Allow-listed binary not found");
                }
            }
        }
        Self {
            resolved,
            path_lookup: config.path_lookup,
        }
    }

    /// Resolve a request name to an executable path.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ResolveError> {
        if !is_valid_binary_name(name) {
            return Err(ResolveError::InvalidName(name.to_string()));
        }
        if let Some(path) = self.resolved.get(name) {
            return Ok(path.clone());
        }
        if self.path_lookup {
            if let Some(path) = search_path(name) {
                return Ok(path);
            }
        }
        Err(ResolveError::NotFound(name.to_string()))
    }

    /// Names that resolved at startup.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.resolved.keys().map(String::as_str)
    }
}

fn is_valid_binary_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Absolute/relative paths are checked directly, bare names go through PATH.
fn find_executable(target: &str) -> Option<PathBuf> {
    let candidate = Path::new(target);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    search_path(target)
}

fn search_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
