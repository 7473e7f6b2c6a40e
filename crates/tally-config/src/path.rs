//! Path handling for roots that cross process boundaries.
//!
//! Roots given on the command line are relative to the caller's working
//! directory, which the daemon does not share. They are made absolute here
//! before a request is sent.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Expand a leading `~` to the home directory
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Resolve a root for sending to another process.
///
/// Resolves symlinks and returns an absolute path. Fails if the root does
/// not exist.
pub fn normalize_for_request(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = expand_home(path);
    path.canonicalize()
        .with_context(|| format!("Failed to resolve root: {}", path.display()))
}

/// Normalize a root, keeping it (made absolute) if it cannot be resolved.
///
/// A missing root is not an error for a word count request, it simply
/// yields an empty table, so it is passed along instead of rejected.
pub fn normalize_or_original(path: impl AsRef<Path>) -> PathBuf {
    let path = expand_home(path);
    match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(_) if path.is_relative() => std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path),
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_for_request_existing() {
        let temp = TempDir::new().unwrap();
        let result = normalize_for_request(temp.path()).unwrap();
        assert!(result.is_absolute());
        assert!(result.exists());
    }

    #[test]
    fn test_normalize_for_request_missing() {
        assert!(normalize_for_request("/nonexistent/tally/root").is_err());
    }

    #[test]
    fn test_normalize_or_original_missing_absolute() {
        let path = PathBuf::from("/nonexistent/tally/root");
        assert_eq!(normalize_or_original(&path), path);
    }

    #[test]
    fn test_normalize_or_original_missing_relative() {
        let result = normalize_or_original("no-such-dir-for-tally");
        assert!(result.is_absolute());
        assert!(result.ends_with("no-such-dir-for-tally"));
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/docs"), home.join("docs"));
        }
        assert_eq!(expand_home("/abs/~/x"), PathBuf::from("/abs/~/x"));
    }
}
