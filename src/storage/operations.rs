//! Storage operations
//!
//! Folder creation and deletion on resolved paths. Deletion is permanent.

use std::fs;
use std::io;

use log::info;

use crate::error::RepoError;
use crate::storage::validation::ResolvedPath;

/// Create `name` below `parent`, including any missing intermediate directories.
///
/// `name` may contain separators but no `..` segments. Fails with
/// `AlreadyExists` when anything already occupies the final path.
pub fn create_folder(parent: &ResolvedPath, name: &str) -> Result<ResolvedPath, RepoError> {
    let target = parent.join_confined(name)?;

    match fs::symlink_metadata(target.as_path()) {
        Ok(_) => return Err(RepoError::AlreadyExists(target.to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(RepoError::Io(e)),
    }

    fs::create_dir_all(target.as_path())?;
    info!("Created folder {target} (real: {})", target.as_path().display());
    Ok(target)
}

/// Remove a file, or a directory with everything below it.
///
/// The storage root itself cannot be deleted.
pub fn delete_path(target: &ResolvedPath) -> Result<(), RepoError> {
    if target.is_root() {
        return Err(RepoError::AccessDenied(
            "the storage root cannot be deleted".into(),
        ));
    }

    let metadata = match fs::symlink_metadata(target.as_path()) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RepoError::NotFound(target.to_string()));
        }
        Err(e) => return Err(RepoError::Io(e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(target.as_path())
    } else {
        fs::remove_file(target.as_path())
    };

    match result {
        Ok(()) => {
            info!(
                "Deleted {} {target} (real: {})",
                if metadata.is_dir() { "directory" } else { "file" },
                target.as_path().display()
            );
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(RepoError::NotFound(target.to_string()))
        }
        Err(e) => Err(RepoError::Io(e)),
    }
}
