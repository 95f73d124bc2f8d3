// src/enrich.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

use crate::{
    load::LoadedTables,
    record::{EnrichedRecord, EnrichedStore, MergedStore, SubtitleEntry, SubtitleIndex, Value},
    table::{LoadOptions, Table},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleSpec {
    pub table: String,
    pub key: String,
    pub chinese_column: String,
    pub english_column: String,
}

impl Default for SubtitleSpec {
    fn default() -> Self {
        Self {
            table: "subtitle_chieng".into(),
            key: "name".into(),
            chinese_column: "chinese".into(),
            english_column: "english".into(),
        }
    }
}

/// Why the subtitle stage produced nothing. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichSkip {
    MissingTable(String),
    MissingColumn { table: String, column: String },
}

impl fmt::Display for EnrichSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichSkip::MissingTable(name) => {
                write!(f, "subtitle dataset `{}` not found or failed to load", name)
            }
            EnrichSkip::MissingColumn { table, column } => {
                write!(f, "`{}` has no `{}` column", table, column)
            }
        }
    }
}

impl std::error::Error for EnrichSkip {}

/// What the subtitle stage produced, depending on whether a merge happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SubtitleOutcome {
    /// No merged records to enrich; only the lookup exists.
    Standalone(SubtitleIndex),
    Enriched {
        subtitles: SubtitleIndex,
        records: EnrichedStore,
        /// Merged names that found a subtitle row.
        common: usize,
    },
}

impl SubtitleOutcome {
    pub fn subtitles(&self) -> &SubtitleIndex {
        match self {
            SubtitleOutcome::Standalone(s) => s,
            SubtitleOutcome::Enriched { subtitles, .. } => subtitles,
        }
    }

    pub fn records(&self) -> Option<&EnrichedStore> {
        match self {
            SubtitleOutcome::Standalone(_) => None,
            SubtitleOutcome::Enriched { records, .. } => Some(records),
        }
    }
}

/// Null, a sentinel token, or blank text all mean "no subtitle".
fn normalize_text(value: Value, options: &LoadOptions) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(s) if options.is_na(s.trim()) => None,
        Value::Text(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Name-indexed subtitle lookup. Last row wins for a repeated name.
#[instrument(level = "info", skip_all, fields(table = table.name()))]
pub fn index_subtitles(
    table: &Table,
    spec: &SubtitleSpec,
    options: &LoadOptions,
) -> Result<SubtitleIndex, EnrichSkip> {
    let column = |name: &str| {
        table
            .column_index(name)
            .ok_or_else(|| EnrichSkip::MissingColumn {
                table: table.name().to_string(),
                column: name.to_string(),
            })
    };
    let key = column(&spec.key)?;
    let chinese = column(&spec.chinese_column)?;
    let english = column(&spec.english_column)?;

    let mut index = SubtitleIndex::new();
    for row in 0..table.num_rows() {
        let Some(name) = table.value(row, key).as_key().map(|k| k.into_owned()) else {
            continue;
        };
        index.insert(SubtitleEntry {
            name,
            chinese: normalize_text(table.value(row, chinese), options),
            english: normalize_text(table.value(row, english), options),
        });
    }

    if index.duplicates() > 0 {
        warn!(
            duplicates = index.duplicates(),
            "duplicate subtitle names, last row wins"
        );
    }
    info!(entries = index.len(), "✓ subtitle index built");
    Ok(index)
}

/// Left join: every merged record comes back, with subtitles when its name
/// has them and explicit `None`s otherwise.
pub fn enrich(merged: &MergedStore, subtitles: &SubtitleIndex) -> EnrichedStore {
    merged
        .iter()
        .map(|record| {
            let sub = subtitles.get(&record.name);
            EnrichedRecord {
                record: record.clone(),
                chinese_subtitle: sub.and_then(|s| s.chinese.clone()),
                english_subtitle: sub.and_then(|s| s.english.clone()),
            }
        })
        .collect()
}

/// Build the subtitle lookup and, when a merged store exists, enrich it.
pub fn subtitle_step(
    tables: &LoadedTables,
    merged: Option<&MergedStore>,
    spec: &SubtitleSpec,
    options: &LoadOptions,
) -> Result<SubtitleOutcome, EnrichSkip> {
    let table = tables
        .train(&spec.table)
        .ok_or_else(|| EnrichSkip::MissingTable(spec.table.clone()))?;
    info!(rows = table.num_rows(), columns = ?table.column_names(), "subtitle dataset");

    let subtitles = index_subtitles(table, spec, options)?;

    let Some(merged) = merged else {
        info!("no merged data; subtitle data available separately");
        return Ok(SubtitleOutcome::Standalone(subtitles));
    };

    let common = merged.names().filter(|n| subtitles.contains(n)).count();
    info!(
        merged = merged.len(),
        subtitles = subtitles.len(),
        common,
        "integrating subtitles with merged data"
    );
    let records = enrich(merged, &subtitles);
    Ok(SubtitleOutcome::Enriched {
        subtitles,
        records,
        common,
    })
}
