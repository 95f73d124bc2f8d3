// src/discover.rs

use regex::Regex;
use tracing::{info, instrument, warn};

use crate::fetch::DatasetSource;

/// The file names observed in the repository before loading anything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Discovery {
    /// Everything the source listed; empty when listing failed.
    pub listed: Vec<String>,
    /// The files the loader will attempt, in listing order.
    pub csv_files: Vec<String>,
    /// Set when listing failed and the static list was used instead.
    pub fallback_reason: Option<String>,
}

impl Discovery {
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// List the repository and keep the files matching `pattern`. An unreachable
/// repository is not an error: `fallback` is used as the file list.
#[instrument(level = "info", skip_all, fields(source = %source.describe()))]
pub fn discover(source: &dyn DatasetSource, pattern: &Regex, fallback: &[String]) -> Discovery {
    match source.list_files() {
        Ok(listed) => {
            let csv_files: Vec<String> = listed
                .iter()
                .filter(|f| pattern.is_match(f))
                .cloned()
                .collect();
            info!(
                listed = listed.len(),
                matched = csv_files.len(),
                "listed repository"
            );
            Discovery {
                listed,
                csv_files,
                fallback_reason: None,
            }
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "error listing files; falling back to static file list");
            Discovery {
                listed: Vec::new(),
                csv_files: fallback.to_vec(),
                fallback_reason: Some(format!("{:#}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use std::path::PathBuf;

    struct Listed(Vec<&'static str>);

    impl DatasetSource for Listed {
        fn describe(&self) -> String {
            "fixed".into()
        }
        fn list_files(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
        fn fetch(&self, _file: &str) -> Result<PathBuf> {
            bail!("not used")
        }
    }

    struct Unreachable;

    impl DatasetSource for Unreachable {
        fn describe(&self) -> String {
            "unreachable".into()
        }
        fn list_files(&self) -> Result<Vec<String>> {
            bail!("connection refused")
        }
        fn fetch(&self, _file: &str) -> Result<PathBuf> {
            bail!("connection refused")
        }
    }

    fn csv_pattern() -> Regex {
        Regex::new(r"(?i)\.csv$").unwrap()
    }

    #[test]
    fn keeps_only_csv_files_in_listing_order() {
        let source = Listed(vec![
            ".gitattributes",
            "track2_train_ovmerd.csv",
            "README.md",
            "subtitle_chieng.CSV",
            "video.tar.gz",
        ]);
        let found = discover(&source, &csv_pattern(), &[]);
        assert_eq!(found.listed.len(), 5);
        assert_eq!(
            found.csv_files,
            vec!["track2_train_ovmerd.csv", "subtitle_chieng.CSV"]
        );
        assert!(!found.used_fallback());
    }

    #[test]
    fn unreachable_source_uses_fallback() {
        let fallback = vec!["a.csv".to_string(), "b.csv".to_string()];
        let found = discover(&Unreachable, &csv_pattern(), &fallback);
        assert!(found.used_fallback());
        assert!(found.listed.is_empty());
        assert_eq!(found.csv_files, fallback);
        assert!(found
            .fallback_reason
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }
}
