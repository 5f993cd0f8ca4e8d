//! Ingestion handler
//!
//! Stores uploaded byte streams below a target directory. Each item is written
//! to a temporary file beside its destination and renamed over it once
//! complete, so the last writer wins and a failed item leaves no partial file.
//!
//! Items with unacceptable names are skipped and reported; an I/O failure
//! aborts the rest of the batch. Items stored before the failure stay.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};

use crate::error::RepoError;
use crate::storage::validation::ResolvedPath;
use crate::transfer::results::{IngestReport, SkippedUpload};

const BUFFER_SIZE: usize = 64 * 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One named byte stream to store.
#[derive(Debug)]
pub struct UploadItem<R> {
    /// Untrusted relative name; may contain `/` or `\`.
    pub name: String,
    pub content: R,
    /// Byte count the sender announced, checked after copying.
    pub declared_len: Option<u64>,
}

impl<R: Read> UploadItem<R> {
    pub fn new(name: impl Into<String>, content: R) -> Self {
        Self {
            name: name.into(),
            content,
            declared_len: None,
        }
    }

    pub fn with_declared_len(mut self, len: u64) -> Self {
        self.declared_len = Some(len);
        self
    }
}

/// Store every item below `target`, creating it and intermediate directories as needed.
pub fn ingest<I, R>(target: &ResolvedPath, items: I) -> Result<IngestReport, RepoError>
where
    I: IntoIterator<Item = UploadItem<R>>,
    R: Read,
{
    fs::create_dir_all(target.as_path())?;

    let mut report = IngestReport::default();
    for item in items {
        let destination = match target.join_confined(&item.name) {
            Ok(destination) => destination,
            Err(RepoError::AccessDenied(reason)) => {
                warn!("Skipping upload {:?} into {target}: {reason}", item.name);
                report.skipped.push(SkippedUpload {
                    name: item.name,
                    reason,
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        match store_item(target, &destination, item.content, item.declared_len) {
            Ok(Stored::Written(written)) => {
                debug!("Stored {destination} ({written} bytes)");
                report.bytes_written += written;
                report.stored.push(destination.relative().to_string());
            }
            Ok(Stored::Conflict(reason)) => {
                warn!("Skipping upload {destination}: {reason}");
                report.skipped.push(SkippedUpload {
                    name: item.name,
                    reason: reason.into(),
                });
            }
            Err(RepoError::AccessDenied(reason)) => {
                warn!("Skipping upload {destination}: parent escapes {target}");
                report.skipped.push(SkippedUpload {
                    name: item.name,
                    reason,
                });
            }
            Err(e) => {
                error!("Upload of {destination} failed: {e}");
                return Err(e);
            }
        }
    }

    info!(
        "Ingested {} items into {target} ({} bytes, {} skipped)",
        report.stored.len(),
        report.bytes_written,
        report.skipped.len()
    );
    Ok(report)
}

enum Stored {
    Written(u64),
    /// The name collides with something that is not a regular file.
    Conflict(&'static str),
}

fn store_item<R: Read>(
    target: &ResolvedPath,
    destination: &ResolvedPath,
    mut content: R,
    declared_len: Option<u64>,
) -> Result<Stored, RepoError> {
    let path = destination.as_path();
    let parent = path
        .parent()
        .ok_or_else(|| RepoError::AccessDenied(destination.to_string()))?;

    if blocked_by_file(target.as_path(), parent) {
        return Ok(Stored::Conflict("a parent of the destination is a file"));
    }
    fs::create_dir_all(parent)?;
    // Re-check after creation: an intermediate component may have been swapped.
    let parent_canonical = fs::canonicalize(parent)?;
    if !parent_canonical.starts_with(target.as_path()) {
        return Err(RepoError::AccessDenied(destination.to_string()));
    }

    match fs::symlink_metadata(path) {
        Ok(metadata) if !metadata.is_file() => {
            return Ok(Stored::Conflict("destination is not a regular file"));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(RepoError::Io(e)),
    }

    let temp_path = temp_path_for(path);
    let written = match write_temp(&temp_path, &mut content) {
        Ok(written) => written,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(RepoError::Io(e));
        }
    };

    if let Some(expected) = declared_len {
        if expected != written {
            let _ = fs::remove_file(&temp_path);
            return Err(RepoError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {expected} bytes for {destination}, received {written}"),
            )));
        }
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(RepoError::Io(e));
    }
    Ok(Stored::Written(written))
}

/// True when an existing path between `target` and `dir` is not a directory.
fn blocked_by_file(target: &Path, dir: &Path) -> bool {
    dir.ancestors()
        .take_while(|ancestor| ancestor.starts_with(target))
        .any(|ancestor| fs::symlink_metadata(ancestor).is_ok_and(|m| !m.is_dir()))
}

fn write_temp<R: Read>(temp_path: &Path, content: &mut R) -> io::Result<u64> {
    let mut file = File::create(temp_path)?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match content.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        file.write_all(&buffer[..n])?;
        total += n as u64;
    }
    file.flush()?;
    file.sync_all()?;
    Ok(total)
}

/// Hidden, unique sibling of `path` for staging an upload.
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let sequence = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(
        ".{file_name}.{}-{nanos:x}-{sequence}.upload",
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::validation::StorageRoot;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_test_root() -> (TempDir, StorageRoot) {
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::open(temp_dir.path().join("root")).unwrap();
        fs::create_dir_all(root.path().join("uploads")).unwrap();
        (temp_dir, root)
    }

    fn item(name: &str, content: &[u8]) -> UploadItem<Cursor<Vec<u8>>> {
        UploadItem::new(name, Cursor::new(content.to_vec()))
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".upload"))
            .count()
    }

    #[test]
    fn test_ingest_writes_files() {
        let (_temp, root) = create_test_root();
        let target = root.resolve("uploads").unwrap();

        let report = ingest(&target, vec![item("a.txt", b"alpha"), item("b.txt", b"beta")]).unwrap();

        assert_eq!(report.bytes_written, 9);
        assert_eq!(report.stored, vec!["uploads/a.txt", "uploads/b.txt"]);
        assert!(report.skipped.is_empty());
        assert_eq!(fs::read(root.path().join("uploads/a.txt")).unwrap(), b"alpha");
        assert_eq!(leftover_temp_files(&root.path().join("uploads")), 0);
    }

    #[test]
    fn test_ingest_creates_intermediate_directories() {
        let (_temp, root) = create_test_root();
        let target = root.resolve("new/target").unwrap();

        ingest(&target, vec![item("deep\\er/file.txt", b"x")]).unwrap();
        assert!(root.path().join("new/target/deep/er/file.txt").is_file());
    }

    #[test]
    fn test_ingest_skips_traversal() {
        let (temp, root) = create_test_root();
        let target = root.resolve("uploads").unwrap();

        let report = ingest(
            &target,
            vec![item("../../evil.txt", b"evil"), item("fine.txt", b"fine")],
        )
        .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "../../evil.txt");
        assert_eq!(report.stored, vec!["uploads/fine.txt"]);
        assert!(!temp.path().join("evil.txt").exists());
        assert!(!root.path().join("evil.txt").exists());
    }

    #[test]
    fn test_ingest_overwrites_existing() {
        let (_temp, root) = create_test_root();
        fs::write(root.path().join("uploads/a.txt"), "old content").unwrap();
        let target = root.resolve("uploads").unwrap();

        ingest(&target, vec![item("a.txt", b"new")]).unwrap();
        assert_eq!(fs::read(root.path().join("uploads/a.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_ingest_skips_directory_destination() {
        let (_temp, root) = create_test_root();
        fs::create_dir_all(root.path().join("uploads/taken")).unwrap();
        let target = root.resolve("uploads").unwrap();

        let report = ingest(&target, vec![item("taken", b"x")]).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert!(root.path().join("uploads/taken").is_dir());
    }

    #[test]
    fn test_file_in_parent_position_skipped() {
        let (_temp, root) = create_test_root();
        fs::write(root.path().join("uploads/plain.txt"), "keep").unwrap();
        let target = root.resolve("uploads").unwrap();

        let report = ingest(
            &target,
            vec![item("plain.txt/inner.txt", b"x"), item("after.txt", b"after")],
        )
        .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "plain.txt/inner.txt");
        assert_eq!(report.stored, vec!["uploads/after.txt"]);
        assert_eq!(fs::read(root.path().join("uploads/plain.txt")).unwrap(), b"keep");
    }

    #[test]
    fn test_declared_length_mismatch_fails() {
        let (_temp, root) = create_test_root();
        let target = root.resolve("uploads").unwrap();

        let short = item("short.bin", b"abc").with_declared_len(10);
        let result = ingest(&target, vec![short]);

        assert!(matches!(result, Err(RepoError::Io(_))));
        assert!(!root.path().join("uploads/short.bin").exists());
        assert_eq!(leftover_temp_files(&root.path().join("uploads")), 0);
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away"))
        }
    }

    #[test]
    fn test_read_failure_aborts_batch() {
        let (_temp, root) = create_test_root();
        let target = root.resolve("uploads").unwrap();

        let items: Vec<UploadItem<Box<dyn Read>>> = vec![
            UploadItem::new("first.txt", Box::new(Cursor::new(b"kept".to_vec()))),
            UploadItem::new("broken.txt", Box::new(BrokenReader)),
            UploadItem::new("never.txt", Box::new(Cursor::new(b"x".to_vec()))),
        ];
        let result = ingest(&target, items);

        assert!(matches!(result, Err(RepoError::Io(_))));
        assert!(root.path().join("uploads/first.txt").exists());
        assert!(!root.path().join("uploads/broken.txt").exists());
        assert!(!root.path().join("uploads/never.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_destination_skipped() {
        let (temp, root) = create_test_root();
        fs::write(temp.path().join("victim.txt"), "original").unwrap();
        std::os::unix::fs::symlink(
            temp.path().join("victim.txt"),
            root.path().join("uploads/link.txt"),
        )
        .unwrap();
        let target = root.resolve("uploads").unwrap();

        let report = ingest(&target, vec![item("link.txt", b"overwrite")]).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(fs::read(temp.path().join("victim.txt")).unwrap(), b"original");
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let temp = temp_path_for(Path::new("/data/uploads/report.pdf"));
        assert_eq!(temp.parent(), Some(Path::new("/data/uploads")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".report.pdf."));
        assert!(name.ends_with(".upload"));
    }
}
