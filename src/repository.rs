//! Repository operations
//!
//! The entry points a transport calls with untrusted path strings. Each one
//! resolves its inputs through the sandbox and hands the result to the
//! storage or transfer layer.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use log::info;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

use crate::config::RepositoryConfig;
use crate::error::{RepoError, ServerError, log_failure};
use crate::storage::{self, Entry, ResolvedPath, StorageRoot};
use crate::transfer::{
    self, ArchiveEngine, ArchiveJob, ArchiveOptions, ArchiveSummary, DownloadSummary,
    IngestReport, UploadItem,
};
use crate::utils::validation::sanitize_input;

/// Archive name used when a batch has no common parent to name it after.
pub const BATCH_ARCHIVE_NAME: &str = "download.zip";

/// Stem used for the storage root when its directory has no name (e.g. `/`).
const ROOT_ARCHIVE_STEM: &str = "storage";

/// A file repository bound to one storage root.
#[derive(Debug, Clone)]
pub struct Repository {
    root: StorageRoot,
    engine: ArchiveEngine,
    stream_capacity: usize,
}

impl Repository {
    pub fn new(root: StorageRoot, options: ArchiveOptions) -> Self {
        Self {
            root,
            engine: ArchiveEngine::new(options),
            stream_capacity: options.buffer_size,
        }
    }

    /// Open (and create if needed) the configured storage root.
    pub fn from_config(config: &RepositoryConfig) -> Result<Self, ServerError> {
        let root = StorageRoot::open(config.storage_root_path())?;
        info!("Storage root: {}", root.path().display());
        Ok(Self::new(root, config.archive_options()))
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Metadata for the immediate children of a directory.
    pub fn list(&self, relative: &str) -> Result<Vec<Entry>, RepoError> {
        self.root
            .resolve(relative)
            .and_then(|dir| storage::list_entries(&dir))
            .inspect_err(|e| log_failure("list", e))
    }

    /// Write an archive of the requested paths to `sink`.
    pub fn stream_archive<S, W>(&self, paths: &[S], sink: W) -> Result<ArchiveSummary, RepoError>
    where
        S: AsRef<str>,
        W: Write,
    {
        self.archive_jobs(paths)
            .and_then(|jobs| self.engine.stream(&jobs, sink))
            .inspect_err(|e| log_failure("archive", e))
    }

    /// Start archiving the requested paths in the background.
    ///
    /// Path problems are reported before anything is spawned. Must be called
    /// from within a Tokio runtime.
    pub fn spawn_archive<S: AsRef<str>>(
        &self,
        paths: &[S],
    ) -> Result<(DuplexStream, JoinHandle<Result<ArchiveSummary, RepoError>>), RepoError> {
        let jobs = self
            .archive_jobs(paths)
            .inspect_err(|e| log_failure("archive", e))?;
        Ok(transfer::spawn_archive_stream(
            self.engine,
            jobs,
            self.stream_capacity,
        ))
    }

    /// Send a single file as-is, or anything else as an archive.
    pub fn download<S, W>(&self, paths: &[S], mut sink: W) -> Result<DownloadSummary, RepoError>
    where
        S: AsRef<str>,
        W: Write,
    {
        if let [single] = paths {
            let resolved = self
                .root
                .resolve(single.as_ref())
                .inspect_err(|e| log_failure("download", e))?;
            if fs::metadata(resolved.as_path()).is_ok_and(|m| m.is_file()) {
                return copy_file(&resolved, &mut sink)
                    .map(|bytes_written| DownloadSummary::File { bytes_written })
                    .inspect_err(|e| log_failure("download", e));
            }
        }
        self.stream_archive(paths, sink).map(DownloadSummary::Archive)
    }

    /// Suggested file name for an archive of `paths`.
    pub fn archive_name<S: AsRef<str>>(&self, paths: &[S]) -> Result<String, RepoError> {
        let resolved = self.resolve_all(paths)?;
        let name = match resolved.as_slice() {
            [single] => single.file_name().or_else(|| self.root_name()),
            [first, rest @ ..] => {
                let parent = first.parent_relative();
                if rest.iter().all(|p| p.parent_relative() == parent) {
                    match parent {
                        Some("") => self.root_name(),
                        Some(parent) => parent.rsplit('/').next().map(str::to_string),
                        None => None,
                    }
                } else {
                    None
                }
            }
            [] => None,
        };
        Ok(name
            .map(|name| format!("{name}.zip"))
            .unwrap_or_else(|| BATCH_ARCHIVE_NAME.to_string()))
    }

    /// Resolve and plan an archive request.
    ///
    /// A single item gets no prefix. In a batch each item is prefixed with
    /// its parent's repository path, so entries mirror repository paths and
    /// cannot collide. Duplicates and items inside another selected
    /// directory are dropped.
    pub fn archive_jobs<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<ArchiveJob>, RepoError> {
        let resolved = self.resolve_all(paths)?;
        if resolved.is_empty() {
            return Err(RepoError::NotFound("no paths requested".into()));
        }

        for path in &resolved {
            require_present(path.as_path(), &path.to_string())?;
        }

        let mut selected: Vec<ResolvedPath> = Vec::with_capacity(resolved.len());
        for (i, path) in resolved.iter().enumerate() {
            let covered = resolved.iter().enumerate().any(|(j, other)| {
                if other == path {
                    j < i
                } else {
                    other.contains(path)
                }
            });
            if !covered {
                selected.push(path.clone());
            }
        }

        if selected.len() == 1 {
            return Ok(selected
                .into_iter()
                .map(|path| ArchiveJob::new(path, ""))
                .collect());
        }

        Ok(selected
            .into_iter()
            .map(|path| {
                let prefix = path.parent_relative().unwrap_or("").to_string();
                ArchiveJob::new(path, prefix)
            })
            .collect())
    }

    /// Store uploaded streams below `target`.
    pub fn ingest<I, R>(&self, target: &str, items: I) -> Result<IngestReport, RepoError>
    where
        I: IntoIterator<Item = UploadItem<R>>,
        R: Read,
    {
        self.root
            .resolve(target)
            .and_then(|dir| transfer::ingest(&dir, items))
            .inspect_err(|e| log_failure("ingest", e))
    }

    /// Create a folder (and missing intermediates) below `parent`.
    pub fn create_folder(&self, parent: &str, name: &str) -> Result<ResolvedPath, RepoError> {
        let name = sanitize_input(name);
        self.root
            .resolve(parent)
            .and_then(|dir| storage::create_folder(&dir, &name))
            .inspect_err(|e| log_failure("create folder", e))
    }

    /// Permanently remove a file or directory tree.
    pub fn delete(&self, relative: &str) -> Result<(), RepoError> {
        self.root
            .resolve(relative)
            .and_then(|target| storage::delete_path(&target))
            .inspect_err(|e| log_failure("delete", e))
    }

    fn resolve_all<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<ResolvedPath>, RepoError> {
        paths
            .iter()
            .map(|path| self.root.resolve(path.as_ref()))
            .collect()
    }

    fn root_name(&self) -> Option<String> {
        let name = self
            .root
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        name.or_else(|| Some(ROOT_ARCHIVE_STEM.to_string()))
    }
}

/// `NotFound` only when nothing is there; any other lookup failure is `Io`.
fn require_present(path: &Path, shown: &str) -> Result<(), RepoError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(RepoError::NotFound(shown.to_string()))
        }
        Err(e) => Err(RepoError::Io(e)),
    }
}

fn copy_file<W: Write>(path: &ResolvedPath, sink: &mut W) -> Result<u64, RepoError> {
    let mut file = match File::open(path.as_path()) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RepoError::NotFound(path.to_string()));
        }
        Err(e) => return Err(RepoError::Io(e)),
    };
    let copied = io::copy(&mut file, sink)?;
    sink.flush()?;
    info!("Downloaded {path} ({copied} bytes)");
    Ok(copied)
}
