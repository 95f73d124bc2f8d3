// src/config.rs

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, path::PathBuf, time::Duration};

use crate::{
    enrich::SubtitleSpec,
    merge::MergeSpec,
    table::{DecodingPolicy, LoadOptions},
};

pub const DEFAULT_REPO: &str = "MERChallenge/MER2025";
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Used when the repository cannot be listed.
pub const FALLBACK_FILES: &[&str] = &[
    "subtitle_chieng.csv",
    "track1_train_disdim.csv",
    "track2_train_mercaptionplus.csv",
    "track2_train_ovmerd.csv",
    "track3_train_mercaptionplus.csv",
    "track3_train_ovmerd.csv",
];

/// Everything the pipeline needs. Every field has a default, so an empty
/// (or absent) config file describes the standard MER2025 run.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub repo_id: String,
    pub revision: String,
    pub endpoint: String,
    /// Bearer token for gated repositories. Never logged.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub cache_dir: PathBuf,
    /// Read from this snapshot directory instead of the network.
    pub local_dir: Option<PathBuf>,
    /// Regex a listed file must match to be loaded.
    pub file_pattern: String,
    pub fallback_files: Vec<String>,
    pub decoding: DecodingPolicy,
    pub load: LoadOptions,
    pub merge: MergeSpec,
    pub subtitles: SubtitleSpec,
    /// `.jsonl` or `.parquet`; nothing is written when unset.
    pub output: Option<PathBuf>,
    /// Entries shown per sample block in the console report.
    pub sample_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repo_id: DEFAULT_REPO.into(),
            revision: "main".into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            token: None,
            timeout_secs: 60,
            cache_dir: default_cache_dir(),
            local_dir: None,
            file_pattern: r"(?i)\.csv$".into(),
            fallback_files: FALLBACK_FILES.iter().map(|s| s.to_string()).collect(),
            decoding: DecodingPolicy::default(),
            load: LoadOptions::default(),
            merge: MergeSpec::default(),
            subtitles: SubtitleSpec::default(),
            output: None,
            sample_rows: 3,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("repo_id", &self.repo_id)
            .field("revision", &self.revision)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("cache_dir", &self.cache_dir)
            .field("local_dir", &self.local_dir)
            .field("file_pattern", &self.file_pattern)
            .field("fallback_files", &self.fallback_files)
            .field("decoding", &self.decoding)
            .field("load", &self.load)
            .field("merge", &self.merge)
            .field("subtitles", &self.subtitles)
            .field("output", &self.output)
            .field("sample_rows", &self.sample_rows)
            .finish()
    }
}

/// `<user cache dir>/merprep`, or `./.merprep_cache` when there is none.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("merprep"))
        .unwrap_or_else(|| PathBuf::from(".merprep_cache"))
}

impl PipelineConfig {
    /// Read a YAML file, or start from defaults when `path` is `None`, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        Ok(config.with_env(|k| std::env::var(k).ok()))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {:?}", path))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Overlay `HF_ENDPOINT`, `HF_TOKEN` and the `MERPREP_*` variables.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| var(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("HF_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = non_empty("HF_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = non_empty("MERPREP_REPO") {
            self.repo_id = v;
        }
        if let Some(v) = non_empty("MERPREP_REVISION") {
            self.revision = v;
        }
        if let Some(v) = non_empty("MERPREP_CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("MERPREP_LOCAL_DIR") {
            self.local_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("MERPREP_OUTPUT") {
            self.output = Some(PathBuf::from(v));
        }
        self
    }

    pub fn file_regex(&self) -> Result<Regex> {
        Regex::new(&self.file_pattern)
            .with_context(|| format!("invalid file_pattern `{}`", self.file_pattern))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
