//! Storage operations
//!
//! Filesystem side of MKD, RMD, DELE and LIST. Every function takes an
//! already confined `ResolvedPath`.

use chrono::{DateTime, Local};
use log::{debug, info};
use std::io::ErrorKind;
use std::time::SystemTime;
use tokio::fs;

use crate::error::{PathError, StorageError};
use crate::navigate::ResolvedPath;

/// Creates a directory, including missing parents.
pub async fn make_directory(target: &ResolvedPath) -> Result<(), StorageError> {
    if fs::try_exists(&target.absolute).await? {
        return Err(StorageError::AlreadyExists(target.display()));
    }

    fs::create_dir_all(&target.absolute).await?;
    info!("Created directory {}", target.absolute.display());
    Ok(())
}

/// Removes an existing, empty directory other than the root.
pub async fn remove_directory(target: &ResolvedPath) -> Result<(), StorageError> {
    if target.is_root() {
        return Err(StorageError::IsRoot);
    }

    let metadata = metadata_of(target).await?;
    if !metadata.is_dir() {
        return Err(PathError::NotADirectory(target.display()).into());
    }

    let mut entries = fs::read_dir(&target.absolute).await?;
    if entries.next_entry().await?.is_some() {
        return Err(StorageError::NotEmpty(target.display()));
    }

    fs::remove_dir(&target.absolute).await?;
    info!("Removed directory {}", target.absolute.display());
    Ok(())
}

/// Deletes a regular file.
pub async fn delete_file(target: &ResolvedPath) -> Result<(), StorageError> {
    let metadata = metadata_of(target).await?;
    if metadata.is_dir() {
        return Err(StorageError::NotAFile(target.display()));
    }

    fs::remove_file(&target.absolute).await?;
    info!("Deleted file {}", target.absolute.display());
    Ok(())
}

/// Checks that `target` is an existing regular file, for RETR.
pub async fn require_file(target: &ResolvedPath) -> Result<(), StorageError> {
    let metadata = metadata_of(target).await?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(target.display()));
    }
    Ok(())
}

/// Checks that a STOR target can be created: its parent directory exists
/// and the target itself is not a directory.
pub async fn prepare_upload(target: &ResolvedPath) -> Result<(), StorageError> {
    if target.is_root() {
        return Err(StorageError::NotAFile(target.display()));
    }
    if let Ok(metadata) = fs::metadata(&target.absolute).await {
        if metadata.is_dir() {
            return Err(StorageError::NotAFile(target.display()));
        }
    }
    let parent = match target.absolute.parent() {
        Some(parent) => parent,
        None => return Err(StorageError::IsRoot),
    };
    match fs::metadata(parent).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(PathError::NotADirectory(target.display()).into()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(PathError::NotFound(target.display()).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Builds the LIST payload for a directory: files first, then directories,
/// each group in the order the filesystem enumerates them.
pub async fn list_directory(target: &ResolvedPath) -> Result<String, StorageError> {
    let metadata = metadata_of(target).await?;
    if !metadata.is_dir() {
        return Err(PathError::NotADirectory(target.display()).into());
    }

    let mut files = String::new();
    let mut directories = String::new();
    let mut entries = fs::read_dir(&target.absolute).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        // Follow symlinks; dangling ones are left out.
        let metadata = match fs::metadata(entry.path()).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping {} in listing: {}", entry.path().display(), e);
                continue;
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if metadata.is_dir() {
            directories.push_str(&format_entry(&name, true, 0, modified));
        } else {
            files.push_str(&format_entry(&name, false, metadata.len(), modified));
        }
    }

    files.push_str(&directories);
    Ok(files)
}

/// One listing line: permissions, link count, owner, group, size,
/// modification time and name.
pub fn format_entry(name: &str, is_dir: bool, size: u64, modified: SystemTime) -> String {
    let modified: DateTime<Local> = modified.into();
    let permissions = if is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
    format!(
        "{} 1 owner group {} {} {}\r\n",
        permissions,
        size,
        modified.format("%b %d %H:%M"),
        name
    )
}

async fn metadata_of(target: &ResolvedPath) -> Result<std::fs::Metadata, StorageError> {
    match fs::metadata(&target.absolute).await {
        Ok(metadata) => Ok(metadata),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(PathError::NotFound(target.display()).into())
        }
        Err(e) => Err(e.into()),
    }
}
