// src/load.rs

use anyhow::{Context, Result};
use std::{fs, time::Instant};
use tracing::{error, info, instrument};

use crate::{
    fetch::DatasetSource,
    table::{parse_table, DatasetDict, DecodingPolicy, LoadOptions, Table},
};

/// `track2_train_ovmerd.csv` → `track2_train_ovmerd`
pub fn dataset_name(file: &str) -> String {
    file.strip_suffix(".csv")
        .or_else(|| file.strip_suffix(".CSV"))
        .unwrap_or(file)
        .to_string()
}

/// Loaded datasets keyed by name, in load order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadedTables {
    entries: Vec<(String, DatasetDict)>,
}

impl LoadedTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later dataset with the same name replaces the earlier one.
    pub fn insert(&mut self, name: impl Into<String>, dict: DatasetDict) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = dict,
            None => self.entries.push((name, dict)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DatasetDict> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// The `train` split of dataset `name`.
    pub fn train(&self, name: &str) -> Option<&Table> {
        self.get(name).and_then(DatasetDict::train)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatasetDict)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }
}

impl FromIterator<(String, DatasetDict)> for LoadedTables {
    fn from_iter<I: IntoIterator<Item = (String, DatasetDict)>>(iter: I) -> Self {
        let mut tables = LoadedTables::new();
        for (name, dict) in iter {
            tables.insert(name, dict);
        }
        tables
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub file: String,
    pub error: String,
}

/// Outcome of a whole batch: what loaded and what did not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadReport {
    pub tables: LoadedTables,
    pub failures: Vec<LoadFailure>,
}

/// Fetch, decode and parse a single file into its `train` split.
#[instrument(level = "info", skip(source, policy, options))]
pub fn load_file(
    source: &dyn DatasetSource,
    file: &str,
    policy: &DecodingPolicy,
    options: &LoadOptions,
) -> Result<DatasetDict> {
    let path = source
        .fetch(file)
        .with_context(|| format!("fetching {}", file))?;
    let bytes = fs::read(&path).with_context(|| format!("reading {:?}", path))?;

    let decoding = policy.for_file(file);
    let text = decoding
        .decode(&bytes)
        .with_context(|| format!("decoding {} as {}", file, decoding))?;

    let table = parse_table(&dataset_name(file), &text, options)
        .with_context(|| format!("parsing {}", file))?;
    Ok(DatasetDict::single(table))
}

/// Load every file in order. A failing file is recorded and skipped; it never
/// stops the files after it.
#[instrument(level = "info", skip_all, fields(files = files.len()))]
pub fn load_all(
    source: &dyn DatasetSource,
    files: &[String],
    policy: &DecodingPolicy,
    options: &LoadOptions,
) -> LoadReport {
    let mut report = LoadReport::default();

    for file in files {
        let start = Instant::now();
        info!(file = %file, decoding = %policy.for_file(file), "loading");
        match load_file(source, file, policy, options) {
            Ok(dict) => {
                info!(file = %file, elapsed = ?start.elapsed(), "✓ loaded");
                report.tables.insert(dataset_name(file), dict);
            }
            Err(e) => {
                let error = format!("{:#}", e);
                error!(file = %file, error = %error, "✗ failed to load");
                report.failures.push(LoadFailure {
                    file: file.clone(),
                    error,
                });
            }
        }
    }

    info!(
        loaded = report.tables.len(),
        failed = report.failures.len(),
        "load batch finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fetch::LocalSource, table::Decoding};
    use tempfile::tempdir;

    #[test]
    fn strips_csv_suffix_only() {
        assert_eq!(dataset_name("subtitle_chieng.csv"), "subtitle_chieng");
        assert_eq!(dataset_name("dir/track1.csv"), "dir/track1");
        assert_eq!(dataset_name("README.md"), "README.md");
    }

    #[test]
    fn one_bad_file_does_not_stop_the_batch() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.csv"), "name,openset\nv1,happy\n")?;
        fs::write(dir.path().join("ragged.csv"), "name\nv1,extra\n")?;
        fs::write(dir.path().join("c.csv"), "name,reason\nv1,tone\nv2,pitch\n")?;

        let source = LocalSource::new(dir.path());
        let files: Vec<String> = ["a.csv", "missing.csv", "ragged.csv", "c.csv"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = load_all(
            &source,
            &files,
            &DecodingPolicy::uniform(Decoding::Strict),
            &LoadOptions::default(),
        );

        assert_eq!(report.tables.names().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(report.tables.train("c").map(Table::num_rows), Some(2));
        let failed: Vec<_> = report.failures.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(failed, vec!["missing.csv", "ragged.csv"]);
        Ok(())
    }

    #[test]
    fn decoding_override_rescues_one_file() -> Result<()> {
        let dir = tempdir()?;
        let mut bytes = b"name,chinese,english\nv1,".to_vec();
        bytes.extend_from_slice(&[0xC4, 0xE3, 0xBA, 0xC3]); // GBK "你好"
        bytes.extend_from_slice(b",hello\n");
        fs::write(dir.path().join("subtitle_chieng.csv"), &bytes)?;

        let source = LocalSource::new(dir.path());
        let files = vec!["subtitle_chieng.csv".to_string()];
        let options = LoadOptions::default();

        let strict = DecodingPolicy::uniform(Decoding::Strict);
        let report = load_all(&source, &files, &strict, &options);
        assert!(report.tables.is_empty());
        assert!(report.failures[0].error.contains("decoding subtitle_chieng.csv"));

        let policy = strict.with_override("subtitle_chieng.csv", Decoding::Label("gbk".into()));
        let report = load_all(&source, &files, &policy, &options);
        let table = report.tables.train("subtitle_chieng").expect("loaded");
        assert_eq!(table.value(0, 1).as_text(), Some("你好"));
        Ok(())
    }
}
