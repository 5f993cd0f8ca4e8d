//! Path validation
//!
//! The sandbox resolver: every client-supplied path is turned into a
//! [`ResolvedPath`] here, and nowhere else. Containment is decided on the
//! canonical form of the path, never on the raw string.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};

use crate::error::RepoError;
use crate::utils::validation::is_valid_path_input;

/// The canonical directory that bounds every repository operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    path: PathBuf,
}

impl StorageRoot {
    /// Create the directory if absent and canonicalize it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let canonical = fs::canonicalize(path)?;
        if !canonical.is_dir() {
            return Err(RepoError::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {}", canonical.display()),
            )));
        }
        debug!("Storage root opened at {}", canonical.display());
        Ok(Self { path: canonical })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve an untrusted relative path against the root.
    ///
    /// Leading `/` and `\` are stripped and `\` is treated as a separator. The
    /// result may name something that does not exist yet; operations report
    /// `NotFound` themselves.
    pub fn resolve(&self, relative: &str) -> Result<ResolvedPath, RepoError> {
        let (absolute, components) = confine(&self.path, relative)?;
        Ok(ResolvedPath {
            absolute,
            relative: components.join("/"),
        })
    }
}

/// An absolute path proven to lie at or beneath the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// Path relative to the storage root, `/`-separated, empty for the root.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Final path segment, if any.
    pub fn file_name(&self) -> Option<String> {
        self.absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Relative path of the parent directory, `None` for the root.
    pub fn parent_relative(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(
            self.relative
                .rsplit_once('/')
                .map(|(parent, _)| parent)
                .unwrap_or(""),
        )
    }

    /// True when `other` is this path or lies beneath it.
    pub fn contains(&self, other: &ResolvedPath) -> bool {
        relative_components(&self.absolute, &other.absolute).is_some()
    }

    /// Join a sanitized name below this path, keeping the result confined to it.
    ///
    /// The name is pre-filtered with [`sanitize_relative_name`]; the authority
    /// is the canonical containment check that follows.
    pub fn join_confined(&self, name: &str) -> Result<ResolvedPath, RepoError> {
        let sanitized = sanitize_relative_name(name)
            .ok_or_else(|| RepoError::AccessDenied(format!("invalid name: {name}")))?;
        let (absolute, components) = confine(&self.absolute, &sanitized)?;
        let relative = if self.relative.is_empty() {
            components.join("/")
        } else {
            let mut joined = self.relative.clone();
            for component in &components {
                joined.push('/');
                joined.push_str(component);
            }
            joined
        };
        Ok(ResolvedPath { absolute, relative })
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.absolute
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.relative)
    }
}

/// Normalize a declared name to `/`-separated segments.
///
/// Returns `None` for names that are empty after normalization or that carry
/// a `..` segment or a NUL byte. Empty and `.` segments are dropped.
pub fn sanitize_relative_name(name: &str) -> Option<String> {
    if name.contains('\0') {
        return None;
    }
    let normalized = name.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Resolve `relative` below `bound` and prove the result stays inside it.
///
/// Symlinks below `bound` are refused outright. The longest existing prefix
/// is then canonicalized and the non-existent tail may only contain plain
/// names.
fn confine(bound: &Path, relative: &str) -> Result<(PathBuf, Vec<String>), RepoError> {
    if !is_valid_path_input(relative) {
        warn!("Rejected malformed path input ({} bytes)", relative.len());
        return Err(RepoError::AccessDenied(
            "path contains forbidden characters".into(),
        ));
    }

    let trimmed = relative.trim_start_matches(['/', '\\']).replace('\\', "/");
    let joined = bound.join(&trimmed);
    reject_symlinks(bound, &trimmed, relative)?;

    let (mut canonical, tail) = canonicalize_existing(&joined)?;
    for component in tail.components() {
        match component {
            Component::Normal(name) => canonical.push(name),
            Component::CurDir => {}
            _ => {
                warn!("Rejected path with parent segment in missing tail: {relative}");
                return Err(RepoError::AccessDenied(relative.to_string()));
            }
        }
    }

    match relative_components(bound, &canonical) {
        Some(components) => Ok((canonical, components)),
        None => {
            warn!(
                "Rejected path escaping sandbox: {relative} -> {}",
                canonical.display()
            );
            Err(RepoError::AccessDenied(relative.to_string()))
        }
    }
}

/// Refuse any existing component of `bound/trimmed` that is a symlink.
///
/// Listings and archive walks never show links, so no operation may reach
/// through one either.
fn reject_symlinks(bound: &Path, trimmed: &str, relative: &str) -> Result<(), RepoError> {
    let mut current = bound.to_path_buf();
    for component in Path::new(trimmed).components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                warn!("Rejected path through symlink: {relative}");
                return Err(RepoError::AccessDenied(relative.to_string()));
            }
            Ok(_) => {}
            // Nothing below a missing component exists.
            Err(_) => break,
        }
    }
    Ok(())
}

/// Canonicalize the longest existing ancestor of `path`.
///
/// Returns that canonical ancestor and the remaining lexical tail.
fn canonicalize_existing(path: &Path) -> Result<(PathBuf, PathBuf), RepoError> {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        match fs::canonicalize(ancestor) {
            Ok(canonical) => {
                let tail = path
                    .strip_prefix(ancestor)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                return Ok((canonical, tail));
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                continue;
            }
            Err(e) => return Err(RepoError::Io(e)),
        }
    }
    Err(RepoError::AccessDenied(path.display().to_string()))
}

/// Components of `candidate` below `bound`, or `None` if it lies outside.
fn relative_components(bound: &Path, candidate: &Path) -> Option<Vec<String>> {
    let mut rest = candidate.components();
    for expected in bound.components() {
        let actual = rest.next()?;
        if !same_component(expected, actual) {
            return None;
        }
    }
    Some(
        rest.map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect(),
    )
}

// Case-insensitive filesystems by default.
#[cfg(any(windows, target_os = "macos"))]
fn same_component(a: Component<'_>, b: Component<'_>) -> bool {
    a.as_os_str().to_string_lossy().to_lowercase() == b.as_os_str().to_string_lossy().to_lowercase()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn same_component(a: Component<'_>, b: Component<'_>) -> bool {
    a == b
}
