//! Transfer module
//!
//! Handles archive generation, async archive streaming, and upload ingestion.

pub mod archive;
pub mod results;
pub mod stream;
pub mod upload;

pub use archive::{ArchiveEngine, ArchiveJob, ArchiveOptions};
pub use results::{ArchiveSummary, DownloadSummary, IngestReport, SkippedUpload};
pub use stream::spawn_archive_stream;
pub use upload::{UploadItem, ingest};
