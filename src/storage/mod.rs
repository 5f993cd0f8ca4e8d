//! File system storage management
//!
//! Handles the sandboxed path resolver, directory listing, and mutations.

pub mod filesystem;
pub mod operations;
pub mod results;
pub mod validation;

pub use filesystem::list_entries;
pub use operations::{create_folder, delete_path};
pub use results::Entry;
pub use validation::{ResolvedPath, StorageRoot, sanitize_relative_name};
