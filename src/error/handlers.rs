//! Error handlers
//!
//! Reports repository failures to the log at a level matching their cause.

use crate::error::types::RepoError;
use log::{error, warn};

/// Log a failed operation.
///
/// Client-caused failures are warnings; medium failures are errors.
pub fn log_failure(operation: &str, err: &RepoError) {
    if err.is_client_error() {
        warn!("{operation} rejected ({}): {err}", err.kind().as_str());
    } else {
        error!("{operation} failed: {err}");
    }
}
