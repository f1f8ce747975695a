//! Moving imported files into the year-partitioned archive.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::config::StoragePaths;
use crate::core::ImportError;

/// `file_name` if free in `dir`, else `stem_1.ext`, `stem_2.ext`, ...
pub fn unique_file_name(dir: &Path, file_name: &str) -> String {
    if !dir.join(file_name).exists() {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let mut n = 1u32;
    loop {
        let candidate = match &ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move `source` into `<archive_base>/<year>/` and return the new path.
pub fn archive_file(
    paths: &dyn StoragePaths,
    source: &Path,
    year: i32,
) -> Result<PathBuf, ImportError> {
    let dir = paths.archive_path_for_year(year);
    fs::create_dir_all(&dir)
        .map_err(|e| ImportError::Storage(format!("create {}: {e}", dir.display())))?;

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ImportError::Storage(format!("{} has no file name", source.display())))?;
    let target = dir.join(paths.unique_file_name(&dir, &file_name));

    if fs::rename(source, &target).is_err() {
        // rename fails across filesystems
        fs::copy(source, &target).map_err(|e| {
            ImportError::Storage(format!("archive {} -> {}: {e}", source.display(), target.display()))
        })?;
        fs::remove_file(source)
            .map_err(|e| ImportError::Storage(format!("remove {}: {e}", source.display())))?;
    }
    debug!(from = %source.display(), to = %target.display(), "archived");
    Ok(target)
}

/// Write an uploaded payload under `<storage_base>/<year>/`. Returns `None`
/// when no storage base is configured.
pub fn store_upload(
    paths: &dyn StoragePaths,
    file_name: &str,
    bytes: &[u8],
    year: i32,
) -> Result<Option<PathBuf>, ImportError> {
    let Some(dir) = paths.storage_path_for_year(year) else {
        return Ok(None);
    };
    fs::create_dir_all(&dir)
        .map_err(|e| ImportError::Storage(format!("create {}: {e}", dir.display())))?;
    let target = dir.join(paths.unique_file_name(&dir, file_name));
    fs::write(&target, bytes)
        .map_err(|e| ImportError::Storage(format!("write {}: {e}", target.display())))?;
    Ok(Some(target))
}
