// src/pipeline.rs

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::{
    config::PipelineConfig,
    discover::{discover, Discovery},
    enrich::{subtitle_step, EnrichSkip, SubtitleOutcome},
    fetch::{DatasetSource, HubSource, LocalSource},
    load::{load_all, LoadReport},
    merge::{merge_step, MergeSkip},
    record::MergedStore,
    report,
    write::{write_json, write_records},
};

/// How many enriched entries are scanned for subtitle-bearing samples.
const ENRICHED_SAMPLE_WINDOW: usize = 5;

/// Everything each stage produced. Skipped stages keep their reason.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub discovery: Discovery,
    pub load: LoadReport,
    pub merged: Result<MergedStore, MergeSkip>,
    pub subtitles: Result<SubtitleOutcome, EnrichSkip>,
}

impl PipelineOutcome {
    pub fn merged(&self) -> Option<&MergedStore> {
        self.merged.as_ref().ok()
    }

    pub fn subtitles(&self) -> Option<&SubtitleOutcome> {
        self.subtitles.as_ref().ok()
    }

    pub fn summary(&self, source: &str) -> RunSummary {
        let enriched = self.subtitles().and_then(SubtitleOutcome::records);
        let common = match self.subtitles() {
            Some(SubtitleOutcome::Enriched { common, .. }) => Some(*common),
            _ => None,
        };
        RunSummary {
            generated_at: Utc::now(),
            source: source.to_string(),
            used_fallback: self.discovery.used_fallback(),
            files_attempted: self.discovery.csv_files.len(),
            loaded: self.load.tables.names().map(str::to_string).collect(),
            failed: self
                .load
                .failures
                .iter()
                .map(|f| FailedFile {
                    file: f.file.clone(),
                    error: f.error.clone(),
                })
                .collect(),
            merged_records: self.merged().map(MergedStore::len),
            merge_skipped: self.merged.as_ref().err().map(ToString::to_string),
            subtitle_entries: self.subtitles().map(|s| s.subtitles().len()),
            enriched_records: enriched.map(|e| e.len()),
            common_names: common,
            enrich_skipped: self.subtitles.as_ref().err().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

/// Machine-readable account of one run, written next to the export.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub used_fallback: bool,
    pub files_attempted: usize,
    pub loaded: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub merged_records: Option<usize>,
    pub merge_skipped: Option<String>,
    pub subtitle_entries: Option<usize>,
    pub enriched_records: Option<usize>,
    pub common_names: Option<usize>,
    pub enrich_skipped: Option<String>,
}

/// A local snapshot when `local_dir` is set, the hub otherwise.
pub fn source_for(config: &PipelineConfig) -> Result<Box<dyn DatasetSource>> {
    if let Some(dir) = &config.local_dir {
        return Ok(Box::new(LocalSource::new(dir)));
    }
    let hub = HubSource::new(
        &config.endpoint,
        config.repo_id.clone(),
        config.revision.clone(),
        config.token.clone(),
        config.cache_dir.clone(),
        config.timeout(),
    )?;
    Ok(Box::new(hub))
}

/// Discover → load → merge → enrich. Only an invalid configuration is an
/// error; every data problem is reported in the outcome instead.
#[instrument(level = "info", skip_all, fields(source = %source.describe()))]
pub fn run(config: &PipelineConfig, source: &dyn DatasetSource) -> Result<PipelineOutcome> {
    let pattern = config.file_regex()?;
    let samples = config.sample_rows;

    // ─── 1) discover ─────────────────────────────────────────────────
    let discovery = discover(source, &pattern, &config.fallback_files);
    report::discovery(&discovery);

    // ─── 2) load ─────────────────────────────────────────────────────
    let load = load_all(source, &discovery.csv_files, &config.decoding, &config.load);
    report::loading(&load);
    report::summary(&load.tables);

    // ─── 3) merge annotation tracks ──────────────────────────────────
    info!(
        "MERGING {} AND {}",
        config.merge.left, config.merge.right
    );
    let merged = merge_step(&load.tables, &config.merge);
    match &merged {
        Ok(store) => report::merged(store, samples),
        Err(skip) => warn!("❌ cannot merge: {}", skip),
    }

    // ─── 4) subtitles ────────────────────────────────────────────────
    info!("PROCESSING SUBTITLE DATA (CHINESE + ENGLISH)");
    let subtitles = subtitle_step(
        &load.tables,
        merged.as_ref().ok(),
        &config.subtitles,
        &config.load,
    );
    match &subtitles {
        Ok(outcome) => {
            report::subtitles(outcome.subtitles(), samples);
            if let Some(records) = outcome.records() {
                report::enriched(records, ENRICHED_SAMPLE_WINDOW, samples.min(2));
            }
        }
        Err(skip) => warn!("❌ {}", skip),
    }

    Ok(PipelineOutcome {
        discovery,
        load,
        merged,
        subtitles,
    })
}

/// Write the most complete record set available: enriched records, else
/// merged records. Also drops `summary.json` beside the export.
pub fn export(outcome: &PipelineOutcome, source: &str, path: &Path) -> Result<Option<PathBuf>> {
    let rows = match (outcome.subtitles().and_then(SubtitleOutcome::records), outcome.merged()) {
        (Some(enriched), _) => write_records(enriched, path)?,
        (None, Some(merged)) => write_records(merged, path)?,
        (None, None) => {
            warn!("nothing to export: no merged records were produced");
            return Ok(None);
        }
    };
    let summary_path = path.with_file_name("summary.json");
    write_json(&outcome.summary(source), &summary_path)?;
    info!(rows, summary = %summary_path.display(), "export finished");
    Ok(Some(summary_path))
}
