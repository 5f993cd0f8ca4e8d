//! Streaming archive engine
//!
//! Writes files and directory trees as a zip archive directly into a caller's
//! sink. Nothing is buffered beyond one read buffer and the compressor state;
//! the only per-entry memory kept until the end is the zip central directory
//! record. Directories are walked with an explicit work stack.
//!
//! Empty directories produce no entries. On failure the sink holds a
//! truncated, invalid archive; already-written bytes are not recalled.

use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::RepoError;
use crate::storage::validation::ResolvedPath;
use crate::transfer::results::ArchiveSummary;

/// Default deflate level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default read buffer and pipe capacity (64KB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Entries at or above this size are written with zip64 headers.
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

/// Tuning for archive generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Deflate level 0-9; 0 stores entries uncompressed.
    pub compression_level: u32,
    /// Read buffer size per source file.
    pub buffer_size: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// One top-level item of an archive and the namespace its entries live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub path: ResolvedPath,
    /// Prepended to every entry name of this job; empty for none.
    pub prefix: String,
}

impl ArchiveJob {
    pub fn new(path: ResolvedPath, prefix: impl Into<String>) -> Self {
        Self {
            path,
            prefix: prefix.into(),
        }
    }
}

/// Streams [`ArchiveJob`]s into zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveEngine {
    options: ArchiveOptions,
}

impl ArchiveEngine {
    pub fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ArchiveOptions {
        self.options
    }

    /// Write every job into one archive on `sink`.
    ///
    /// A missing top-level item fails with `NotFound` before anything is
    /// written for it. Any read or write failure aborts with `Io`.
    pub fn stream<W: Write>(&self, jobs: &[ArchiveJob], sink: W) -> Result<ArchiveSummary, RepoError> {
        let aborted = Cell::new(false);
        let mut counter = CountingWriter::new(sink, &aborted);
        let mut entries = 0usize;
        let mut content_bytes = 0u64;

        {
            let mut zip = ZipWriter::new_stream(&mut counter);
            for job in jobs {
                match self.append_job(&mut zip, job) {
                    Ok((job_entries, job_bytes)) => {
                        entries += job_entries;
                        content_bytes += job_bytes;
                    }
                    Err(e) => {
                        // The writer finalizes on drop; refuse those bytes so the
                        // output never parses as a complete archive.
                        aborted.set(true);
                        return Err(e);
                    }
                }
            }
            zip.finish()?;
        }
        counter.flush()?;

        let summary = ArchiveSummary {
            entries,
            content_bytes,
            bytes_written: counter.bytes_written(),
        };
        info!(
            "Archive complete: {} jobs, {} entries, {} bytes in, {} bytes out",
            jobs.len(),
            summary.entries,
            summary.content_bytes,
            summary.bytes_written
        );
        Ok(summary)
    }

    fn append_job<W: Write + io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        job: &ArchiveJob,
    ) -> Result<(usize, u64), RepoError> {
        let metadata = match fs::symlink_metadata(job.path.as_path()) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RepoError::NotFound(job.path.to_string()));
            }
            Err(e) => return Err(RepoError::Io(e)),
        };

        // The storage root has no usable basename of its own on some platforms.
        let base_name = job.path.file_name().unwrap_or_else(|| "storage".to_string());
        let root_name = join_entry_name(&job.prefix, &base_name);

        if metadata.is_file() {
            let written = self.append_file(zip, job.path.as_path(), &root_name)?;
            Ok((usize::from(written.is_some()), written.unwrap_or(0)))
        } else if metadata.is_dir() {
            self.append_tree(zip, job.path.as_path(), root_name)
        } else {
            warn!("Skipping non-regular archive item {}", job.path);
            Ok((0, 0))
        }
    }

    /// Depth-first walk of `root`; files of a directory are written before
    /// its subdirectories are entered, each in name order.
    fn append_tree<W: Write + io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        root: &Path,
        root_name: String,
    ) -> Result<(usize, u64), RepoError> {
        let mut entries = 0usize;
        let mut bytes = 0u64;
        let mut pending: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), root_name)];

        while let Some((dir, dir_name)) = pending.pop() {
            let children = match read_children(&dir) {
                Ok(children) => children,
                Err(e) if e.kind() == io::ErrorKind::NotFound && dir != root => {
                    warn!("Directory {} vanished during archiving", dir.display());
                    continue;
                }
                Err(e) => return Err(RepoError::Io(e)),
            };

            let mut subdirs = Vec::new();
            for child in children {
                let entry_name = join_entry_name(&dir_name, &child.name);
                if child.is_dir {
                    subdirs.push((child.path, entry_name));
                } else if let Some(written) = self.append_file(zip, &child.path, &entry_name)? {
                    entries += 1;
                    bytes += written;
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }

        Ok((entries, bytes))
    }

    /// Copy one file into a new entry. Returns `None` when the file vanished
    /// before it could be opened.
    fn append_file<W: Write + io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        path: &Path,
        entry_name: &str,
    ) -> Result<Option<u64>, RepoError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("File {} vanished during archiving", path.display());
                return Ok(None);
            }
            Err(e) => return Err(RepoError::Io(e)),
        };
        let size = file.metadata()?.len();

        zip.start_file(entry_name, self.entry_options(size))?;
        let mut reader = BufReader::with_capacity(self.options.buffer_size, file);
        let copied = io::copy(&mut reader, zip)?;

        debug!("Archived {entry_name} ({copied} bytes)");
        Ok(Some(copied))
    }

    fn entry_options(&self, size: u64) -> SimpleFileOptions {
        let options = if self.options.compression_level == 0 {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(i64::from(self.options.compression_level)))
        };
        options.large_file(size >= LARGE_FILE_THRESHOLD)
    }
}

struct Child {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

/// Regular files and directories directly inside `dir`, sorted by name.
fn read_children(dir: &Path) -> io::Result<Vec<Child>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if !file_type.is_file() && !file_type.is_dir() {
            debug!("Skipping non-regular entry {}", entry.path().display());
            continue;
        }
        children.push(Child {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            is_dir: file_type.is_dir(),
        });
    }
    children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(children)
}

fn join_entry_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Counts bytes handed to the wrapped sink.
///
/// Once `aborted` is set, or the sink has failed once, every further write
/// fails without reaching the sink.
struct CountingWriter<'a, W> {
    inner: W,
    written: u64,
    aborted: &'a Cell<bool>,
}

impl<'a, W: Write> CountingWriter<'a, W> {
    fn new(inner: W, aborted: &'a Cell<bool>) -> Self {
        Self {
            inner,
            written: 0,
            aborted,
        }
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn check_open(&self) -> io::Result<()> {
        if self.aborted.get() {
            Err(io::Error::other("archive aborted"))
        } else {
            Ok(())
        }
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        match self.inner.write(buf) {
            Ok(n) => {
                self.written += n as u64;
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.aborted.set(true);
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.inner.flush().inspect_err(|_| self.aborted.set(true))
    }
}
