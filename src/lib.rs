//! RAX file repository
//!
//! A sandboxed file repository: directory listings, streaming zip downloads,
//! uploads, and folder/delete mutations, all confined to one storage root.

pub mod config;
pub mod error;
pub mod repository;
pub mod storage;
pub mod transfer;
pub mod utils;

pub use config::RepositoryConfig;
pub use error::{FailureKind, RepoError, ServerError};
pub use repository::Repository;
pub use storage::{Entry, ResolvedPath, StorageRoot};
pub use transfer::{
    ArchiveEngine, ArchiveJob, ArchiveOptions, ArchiveSummary, DownloadSummary, IngestReport,
    SkippedUpload, UploadItem,
};
