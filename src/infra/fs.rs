//! Filesystem helpers for writing and purging exported files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::application::translator::decode_link_id;

/// Write `body` to `path`, creating missing parent folders.
///
/// The content goes to a temporary sibling first and is renamed into place,
/// so readers never observe a half-written file.
pub async fn write_file(path: &Path, body: &[u8]) -> Result<(), std::io::Error> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let mut file = fs::File::create(&temp).await?;
    if let Err(err) = file.write_all(body).await {
        drop(file);
        let _ = fs::remove_file(&temp).await;
        return Err(err);
    }
    file.flush().await?;
    drop(file);

    if let Err(err) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(err);
    }
    Ok(())
}

/// Remove a single file. Returns `false` when there was nothing to remove.
pub async fn remove_file(path: &Path) -> Result<bool, std::io::Error> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Remove a folder and everything below it.
pub async fn remove_tree(path: &Path) -> Result<bool, std::io::Error> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Remove `dir` if it is empty and writable. `stop_at` itself is never removed.
pub async fn remove_if_empty(dir: &Path, stop_at: &Path) -> Result<bool, std::io::Error> {
    if dir == stop_at || !dir.starts_with(stop_at) {
        return Ok(false);
    }
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if entries.next_entry().await?.is_some() {
        return Ok(false);
    }
    if fs::metadata(dir).await?.permissions().readonly() {
        return Ok(false);
    }
    match fs::remove_dir(dir).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Files next to `file` that are parameter variants of it (`name_<id>.ext`).
pub async fn parameter_variants(file: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let (Some(dir), Some(name)) = (file.parent(), file.file_name()) else {
        return Ok(Vec::new());
    };
    let name = name.to_string_lossy();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut variants = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let candidate = entry.file_name().to_string_lossy().into_owned();
        if decode_link_id(&candidate).is_some_and(|(base, _)| base == name)
            && entry.file_type().await?.is_file()
        {
            variants.push(entry.path());
        }
    }
    variants.sort();
    Ok(variants)
}

/// Every file below `dir` whose name ends with `suffix`.
pub async fn files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if entry.file_name().to_string_lossy().ends_with(suffix) {
                found.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}

pub async fn modified(path: &Path) -> Result<Option<SystemTime>, std::io::Error> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata.modified()?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

pub async fn exists(path: &Path) -> Result<bool, std::io::Error> {
    fs::try_exists(path).await
}

/// Name of the `index`-th backup of `export_path` (`<export_path>.backup<index>`).
pub fn backup_path(export_path: &Path, index: u32) -> PathBuf {
    let mut name = export_path.as_os_str().to_os_string();
    name.push(format!(".backup{index}"));
    PathBuf::from(name)
}

/// Shift existing backups of `export_path` up by one, dropping the oldest,
/// then move the current export folder into the first backup slot.
///
/// With `keep == 0` the current export folder is simply removed.
pub async fn rotate_backups(export_path: &Path, keep: u32) -> Result<(), std::io::Error> {
    if keep == 0 {
        remove_tree(export_path).await?;
        return Ok(());
    }
    remove_tree(&backup_path(export_path, keep)).await?;
    for index in (1..keep).rev() {
        let from = backup_path(export_path, index);
        if exists(&from).await? {
            fs::rename(&from, backup_path(export_path, index + 1)).await?;
        }
    }
    if exists(export_path).await? {
        fs::rename(export_path, backup_path(export_path, 1)).await?;
    }
    Ok(())
}

/// Replace `target` with `staged`. Parent folders of `target` are created.
pub async fn promote(staged: &Path, target: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    remove_tree(target).await?;
    fs::rename(staged, target).await
}
