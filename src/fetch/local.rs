// src/fetch/local.rs

use anyhow::{bail, Context, Result};
use glob::glob;
use std::path::PathBuf;
use tracing::warn;

use super::DatasetSource;

/// A dataset snapshot already on disk.
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DatasetSource for LocalSource {
    fn describe(&self) -> String {
        format!("local snapshot {}", self.root.display())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            bail!(
                "local dir `{}` does not exist or is not a directory",
                self.root.display()
            );
        }
        let pattern = format!("{}/**/*", self.root.display());
        let mut files = Vec::new();
        for entry in glob(&pattern).context("invalid glob pattern for local snapshot")? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("cannot read glob entry: {:?}", e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(&self.root) {
                // repository paths always use '/'
                let parts: Vec<_> = rel.iter().map(|p| p.to_string_lossy()).collect();
                files.push(parts.join("/"));
            }
        }
        files.sort();
        Ok(files)
    }

    fn fetch(&self, file: &str) -> Result<PathBuf> {
        let path = self.root.join(file);
        if !path.is_file() {
            bail!("{} not found in {}", file, self.root.display());
        }
        Ok(path)
    }
}
