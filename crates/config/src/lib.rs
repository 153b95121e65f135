//! Configuration and JSON file helpers for gmailpush
//!
//! Provides utilities for loading configuration files from the shared
//! gmailpush config directory (~/.config/gmailpush/), plus the small set of
//! JSON file primitives the cursor store is built on.
//!
//! Call [`init`] at application startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the config directory under the platform config root
const APP_DIR: &str = "gmailpush";

/// Initialize the gmailpush config directory.
///
/// Creates ~/.config/gmailpush/ if it doesn't exist.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the gmailpush config directory (~/.config/gmailpush/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Get the path to a config file within the gmailpush config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON config file from the gmailpush config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load a JSON file, treating a missing or blank file as `T::default()`
///
/// A file that exists but holds malformed JSON is still an error.
pub fn load_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read file: {}", path.display()));
        }
    };

    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse file: {}", path.display()))
}

/// Write a value as compact JSON, replacing the file atomically
///
/// The value is written to a sibling temp file and renamed over the target,
/// so readers see either the old or the new content.
pub fn write_json_file_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content = serde_json::to_vec(value)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content)
        .with_context(|| format!("Failed to write file: {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to replace file: {}", path.display()))?;
    Ok(())
}

/// Check if a config file exists in the gmailpush config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the gmailpush config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_path() {
        let path = config_path("test.json");
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("gmailpush/test.json"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let value: Vec<u32> = load_json_file_or_default(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn test_blank_file_is_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.json");
        fs::write(&path, "  \n").unwrap();
        let value: Vec<u32> = load_json_file_or_default(&path).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(load_json_file_or_default::<Vec<u32>>(&path).is_err());
    }

    #[test]
    fn test_atomic_write_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        write_json_file_atomic(&path, &vec![1u32, 2, 3]).unwrap();
        let value: Vec<u32> = load_json_file(&path).unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
