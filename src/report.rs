// src/report.rs
//
// Human-oriented progress output. Everything goes through `tracing` so the
// subscriber decides where and how it is shown.

use tracing::{info, warn};

use crate::{
    discover::Discovery,
    load::{LoadReport, LoadedTables},
    record::{EnrichedStore, MergedStore, SubtitleIndex, Value},
    table::DatasetDict,
};

const RULE: &str = "==================================================";

/// Longest reason shown in an enriched sample before it is cut.
const REASON_PREVIEW_CHARS: usize = 100;

fn banner(title: &str) {
    info!("{}", RULE);
    info!("{}", title);
    info!("{}", RULE);
}

pub fn discovery(found: &Discovery) {
    banner("DISCOVERING FILES IN THE DATASET");
    match &found.fallback_reason {
        None => {
            info!("all files in the dataset:");
            for file in &found.listed {
                info!("  - {}", file);
            }
            info!("found {} CSV files:", found.csv_files.len());
        }
        Some(reason) => {
            warn!("error listing files: {}", reason);
            info!("falling back to static file list:");
        }
    }
    for file in &found.csv_files {
        info!("  - {}", file);
    }
}

fn row_preview(row: &[(String, Value)]) -> String {
    let inner = row
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", inner)
}

/// Splits, sizes, schema and first example of one loaded dataset.
pub fn dataset(name: &str, dict: &DatasetDict, show_first: bool) {
    info!("{}:", name);
    info!("  available splits: {:?}", dict.split_names());
    for (split, table) in &dict.splits {
        info!("  {} split:", split);
        info!("    - examples: {}", table.num_rows());
        info!("    - features: {}", table.features());
        info!("    - column names: {:?}", table.column_names());
        if show_first && !table.is_empty() {
            info!("    - first example: {}", row_preview(&table.row(0)));
        }
    }
}

pub fn loading(report: &LoadReport) {
    banner("LOADING INDIVIDUAL CSV FILES");
    for (name, dict) in report.tables.iter() {
        dataset(name, dict, true);
    }
    for failure in &report.failures {
        warn!("✗ failed to load {}: {}", failure.file, failure.error);
    }
    info!("successfully loaded {} datasets", report.tables.len());
}

pub fn summary(tables: &LoadedTables) {
    if tables.is_empty() {
        return;
    }
    banner("SUMMARY OF ALL DATASETS AND SPLITS");
    for (name, dict) in tables.iter() {
        dataset(name, dict, false);
    }
}

pub fn merged(store: &MergedStore, samples: usize) {
    info!("✓ created merged data structure with {} entries", store.len());
    info!("sample of merged data (first {} entries):", samples);
    for (i, rec) in store.iter().take(samples).enumerate() {
        info!("  entry {}:", i + 1);
        info!("    name: {}", rec.name);
        info!("    openset: {}", rec.openset);
        info!("    reason: {}", rec.reason);
        info!("    all keys: {:?}", rec.keys());
    }
    info!("example of accessing merged data by name:");
    for name in store.names().take(2) {
        let Some(rec) = store.get(name) else { continue };
        info!("  name: {}", name);
        info!("    openset: {}", rec.openset);
        info!("    reason: {}", rec.reason);
    }
}

pub fn subtitles(index: &SubtitleIndex, samples: usize) {
    info!("sample of subtitle data (first {} entries):", samples);
    for (i, entry) in index.iter().take(samples).enumerate() {
        info!("  entry {}:", i + 1);
        info!("    name: {}", entry.name);
        info!("    chinese: {}", entry.chinese.as_deref().unwrap_or("N/A"));
        info!("    english: {}", entry.english.as_deref().unwrap_or("N/A"));
    }
}

/// Cut `text` to `max` characters, marking the cut with `...`.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// A few enriched records that actually carry subtitles, looked for among
/// the first `window` entries.
pub fn enriched(records: &EnrichedStore, window: usize, samples: usize) {
    info!("sample of enriched data with subtitles:");
    for rec in records
        .iter()
        .take(window)
        .filter(|r| r.has_subtitle())
        .take(samples)
    {
        let reason = match &rec.record.reason {
            Value::Text(s) => preview(s, REASON_PREVIEW_CHARS),
            other => other.to_string(),
        };
        info!("  name: {}", rec.record.name);
        info!("    openset: {}", rec.record.openset);
        info!("    reason: {}", reason);
        info!(
            "    chinese_subtitle: {}",
            rec.chinese_subtitle.as_deref().unwrap_or("None")
        );
        info!(
            "    english_subtitle: {}",
            rec.english_subtitle.as_deref().unwrap_or("None")
        );
    }
}
