//! File helpers: atomic JSON snapshots and append-only line files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::error::{StoreError, StoreResult};

const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Write `bytes` to a sibling temp file, sync it, then rename it over `path`.
///
/// Readers see either the old or the new contents, never a torn write, and
/// the new contents are on disk once this returns.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(StoreError::io(parent))?;
    }

    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(StoreError::io(&tmp))?;
    file.write_all(bytes).await.map_err(StoreError::io(&tmp))?;
    file.sync_all().await.map_err(StoreError::io(&tmp))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(StoreError::io(path))?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_FILE_SUFFIX);
    PathBuf::from(name)
}

/// Read a JSON document. A missing file is `Ok(None)`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(StoreError::json(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path)(e)),
    }
}

/// Serialize `value` and write it atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(StoreError::json(path))?;
    write_atomic(path, &bytes).await
}

/// Read non-empty lines. A missing file yields no lines.
pub async fn read_lines(path: &Path) -> StoreResult<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::io(path)(e)),
    }
}

/// Append one line; embedded newlines are flattened to spaces.
pub async fn append_line(path: &Path, line: &str) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(StoreError::io(parent))?;
    }

    let mut flat = line.replace(['\r', '\n'], " ");
    flat.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(StoreError::io(path))?;
    file.write_all(flat.as_bytes())
        .await
        .map_err(StoreError::io(path))?;
    file.sync_all().await.map_err(StoreError::io(path))?;

    Ok(())
}
