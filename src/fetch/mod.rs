// src/fetch/mod.rs

use anyhow::Result;
use std::path::PathBuf;

pub mod hub;
pub mod local;

pub use hub::HubSource;
pub use local::LocalSource;

/// Where dataset files come from: a remote repository or a local snapshot.
pub trait DatasetSource {
    /// Short human-readable label for logs.
    fn describe(&self) -> String;

    /// Every file path in the repository, relative to its root.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Make `file` available on local disk and return its path.
    fn fetch(&self, file: &str) -> Result<PathBuf>;
}
