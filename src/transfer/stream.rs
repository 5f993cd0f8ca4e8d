//! Async archive streaming
//!
//! Bridges the synchronous archive engine to async consumers such as a
//! network response body. The engine runs on the blocking pool and writes
//! into a bounded in-memory pipe; the consumer reads the other end. A full
//! pipe blocks the engine, and a dropped reader makes the next write fail,
//! which ends the walk and closes any open source file.

use log::debug;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;

use crate::error::RepoError;
use crate::transfer::archive::{ArchiveEngine, ArchiveJob};
use crate::transfer::results::ArchiveSummary;

/// Start archiving `jobs` in the background.
///
/// Returns the readable end of a pipe holding at most `capacity` bytes and a
/// handle resolving to the engine's result. Must be called from within a
/// Tokio runtime.
pub fn spawn_archive_stream(
    engine: ArchiveEngine,
    jobs: Vec<ArchiveJob>,
    capacity: usize,
) -> (DuplexStream, JoinHandle<Result<ArchiveSummary, RepoError>>) {
    let (reader, writer) = tokio::io::duplex(capacity.max(1));
    let sink = SyncIoBridge::new(writer);

    let handle = tokio::task::spawn_blocking(move || {
        debug!("Archive stream started ({} jobs)", jobs.len());
        // The sink is dropped on return, which signals end-of-stream to the reader.
        engine.stream(&jobs, sink)
    });

    (reader, handle)
}
