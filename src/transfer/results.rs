//! Transfer result types
//!
//! Defines result structures returned by archive, download, and upload operations.

/// Outcome of one archive generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveSummary {
    /// Archive entries written (one per source file).
    pub entries: usize,
    /// Uncompressed bytes read from source files.
    pub content_bytes: u64,
    /// Bytes handed to the sink, headers included.
    pub bytes_written: u64,
}

/// Outcome of a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSummary {
    /// A single regular file was sent as-is.
    File { bytes_written: u64 },
    /// A directory or a batch was sent as an archive.
    Archive(ArchiveSummary),
}

/// An upload item refused before anything was written for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUpload {
    pub name: String,
    pub reason: String,
}

/// Outcome of an ingestion batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Total bytes written across all stored items.
    pub bytes_written: u64,
    /// Repository-relative paths of stored items, in input order.
    pub stored: Vec<String>,
    pub skipped: Vec<SkippedUpload>,
}
