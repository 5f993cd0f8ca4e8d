//! Storage result types
//!
//! Defines values returned by storage operations.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

/// Metadata for one immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Final path segment only.
    pub name: String,
    pub is_directory: bool,
    /// Byte length, present only for files.
    pub size: Option<u64>,
    #[serde(serialize_with = "serialize_unix_millis")]
    pub last_modified: SystemTime,
}

impl Entry {
    /// Milliseconds since the Unix epoch, zero for pre-epoch timestamps.
    pub fn last_modified_millis(&self) -> u64 {
        unix_millis(self.last_modified)
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn serialize_unix_millis<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(unix_millis(*time))
}
