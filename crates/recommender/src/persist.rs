//! Atomic file persistence
//!
//! Every artifact and store file is replaced whole: the new contents are
//! written to a sibling temp file, fsynced, and renamed over the target.
//! Readers therefore see either the previous file or the new one.

use crate::error::{RecommenderError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Make the rename itself durable.
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => File::open(parent)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Replace `path` with `bytes` atomically
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let start = Instant::now();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    // Rename is done; a failed directory sync is not fatal
    if let Err(e) = sync_parent(path) {
        tracing::warn!("Failed to sync directory of {}: {}", path.display(), e);
    }

    tracing::debug!(
        "Persisted {} ({} bytes) in {:?}",
        path.display(),
        bytes.len(),
        start.elapsed()
    );
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` with it
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| RecommenderError::Persistence(format!("serialize {}: {e}", path.display())))?;
    write_atomic(path, &bytes)
}

/// Read `path`, returning `None` when it does not exist.
///
/// A leftover temp file from an interrupted write is removed; the target
/// itself is never touched.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    let tmp = temp_path(path);
    if tmp.exists() {
        tracing::warn!("Removing stale temp file {}", tmp.display());
        if let Err(e) = fs::remove_file(&tmp) {
            tracing::warn!("Failed to remove stale temp file {}: {}", tmp.display(), e);
        }
    }

    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RecommenderError::corrupt(path, e)),
    }
}

/// Load JSON from `path`; absent is `None`, unparseable is `CorruptState`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_optional(path)? {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RecommenderError::corrupt(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1u32);
        write_json(&path, &value).unwrap();

        let loaded: Option<BTreeMap<String, u32>> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(value));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<BTreeMap<String, u32>> =
            read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_garbage_is_corrupt_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = read_json::<BTreeMap<String, u32>>(&path).unwrap_err();
        assert!(matches!(err, RecommenderError::CorruptState { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_parent_sync_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sync_parent(&dir.path().join("state.json")).is_ok());
        assert!(sync_parent(Path::new("state.json")).is_ok());

        let missing = dir.path().join("gone").join("state.json");
        assert!(sync_parent(&missing).is_err());
    }

    #[test]
    fn test_stale_temp_file_is_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(temp_path(&path), b"partial").unwrap();

        assert!(read_optional(&path).unwrap().is_none());
        assert!(!temp_path(&path).exists());
    }
}
