//! File system listing
//!
//! Enumerates the immediate children of a resolved directory.

use std::cmp::Ordering;
use std::fs;
use std::io;

use log::{debug, info, warn};

use crate::error::RepoError;
use crate::storage::results::Entry;
use crate::storage::validation::ResolvedPath;

/// List the immediate children of `dir`.
///
/// Only regular files and directories are reported; symlinks and special
/// files are skipped. Children removed while the listing runs are skipped.
/// Directories come first, then files, each ordered case-insensitively.
pub fn list_entries(dir: &ResolvedPath) -> Result<Vec<Entry>, RepoError> {
    match fs::metadata(dir.as_path()) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Err(RepoError::NotFound(dir.to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RepoError::NotFound(dir.to_string()));
        }
        Err(e) => return Err(RepoError::Io(e)),
    }

    let mut entries = Vec::new();
    for child in fs::read_dir(dir.as_path())? {
        let child = child?;
        let name = child.file_name().to_string_lossy().into_owned();

        let file_type = child.file_type()?;
        if !file_type.is_dir() && !file_type.is_file() {
            debug!("Skipping non-regular entry {name} in {dir}");
            continue;
        }

        let metadata = match child.metadata() {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Entry {name} in {dir} vanished during listing");
                continue;
            }
            Err(e) => return Err(RepoError::Io(e)),
        };

        let is_directory = file_type.is_dir();
        entries.push(Entry {
            name,
            is_directory,
            size: if is_directory { None } else { Some(metadata.len()) },
            last_modified: metadata.modified()?,
        });
    }

    entries.sort_by(|a, b| match (a.is_directory, b.is_directory) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });

    info!("Listed {dir} - {} entries", entries.len());
    Ok(entries)
}
