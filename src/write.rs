// src/write.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder},
    datatypes::{Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};
use tracing::info;

use crate::{
    record::{EnrichedRecord, MergedRecord, Named, RecordStore, Value},
    table::ColumnType,
};

/// A record that can be laid out as named cells.
pub trait Row: Named + Serialize {
    fn cells(&self) -> Vec<(String, Value)>;
}

impl Row for MergedRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        let mut cells = vec![
            ("name".to_string(), Value::Text(self.name.clone())),
            ("openset".to_string(), self.openset.clone()),
            ("reason".to_string(), self.reason.clone()),
        ];
        cells.extend(self.fields.iter().cloned());
        cells
    }
}

impl Row for EnrichedRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        let text = |s: &Option<String>| s.clone().map_or(Value::Null, Value::Text);
        let mut cells = self.record.cells();
        cells.push(("chinese_subtitle".to_string(), text(&self.chinese_subtitle)));
        cells.push(("english_subtitle".to_string(), text(&self.english_subtitle)));
        cells
    }
}

/// Export formats, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    JsonLines,
    Parquet,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jsonl") | Some("ndjson") => Ok(ExportFormat::JsonLines),
            Some("parquet") => Ok(ExportFormat::Parquet),
            _ => bail!(
                "unsupported output extension for {:?} (use .jsonl or .parquet)",
                path
            ),
        }
    }
}

/// Write every record of `store` to `path`. Returns the number of rows written.
pub fn write_records<R: Row>(store: &RecordStore<R>, path: &Path) -> Result<usize> {
    let format = ExportFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    match format {
        ExportFormat::JsonLines => write_jsonl(store, path)?,
        ExportFormat::Parquet => write_parquet(store, path)?,
    }
    info!(rows = store.len(), path = %path.display(), ?format, "wrote records");
    Ok(store.len())
}

fn write_jsonl<R: Row>(store: &RecordStore<R>, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let mut out = BufWriter::new(file);
    for record in store.iter() {
        serde_json::to_writer(&mut out, record)
            .with_context(|| format!("serializing record {}", record.name()))?;
        out.write_all(b"\n")?;
    }
    out.flush().with_context(|| format!("flushing {:?}", path))?;
    Ok(())
}

/// Int only → int64; ints and floats → float64; bools → bool; anything else → string.
fn column_type<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut ty: Option<ColumnType> = None;
    for v in values {
        let this = match v {
            Value::Null => continue,
            Value::Int(_) => ColumnType::Int64,
            Value::Float(_) => ColumnType::Float64,
            Value::Bool(_) => ColumnType::Bool,
            Value::Text(_) => return ColumnType::Utf8,
        };
        ty = Some(match (ty, this) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(ColumnType::Int64), ColumnType::Float64)
            | (Some(ColumnType::Float64), ColumnType::Int64) => ColumnType::Float64,
            _ => return ColumnType::Utf8,
        });
    }
    ty.unwrap_or(ColumnType::Utf8)
}

fn build_array(values: &[Value], ty: ColumnType) -> ArrayRef {
    match ty {
        ColumnType::Int64 => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in values {
                b.append_option(match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        ColumnType::Float64 => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in values {
                b.append_option(match v {
                    Value::Float(x) => Some(*x),
                    Value::Int(i) => Some(*i as f64),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        ColumnType::Bool => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in values {
                b.append_option(match v {
                    Value::Bool(x) => Some(*x),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        ColumnType::Utf8 => {
            let mut b = StringBuilder::new();
            for v in values {
                match v {
                    Value::Null => b.append_null(),
                    other => b.append_value(other.to_string()),
                }
            }
            Arc::new(b.finish())
        }
    }
}

/// Column-major view of the store: union of all cell names, first-seen order.
/// `name` is always present, so an empty store still has a schema.
pub fn to_record_batch<R: Row>(store: &RecordStore<R>) -> Result<RecordBatch> {
    let rows: Vec<Vec<(String, Value)>> = store.iter().map(Row::cells).collect();

    let mut names: Vec<String> = vec!["name".to_string()];
    for row in &rows {
        for (name, _) in row {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        let values: Vec<Value> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null)
            })
            .collect();
        let ty = column_type(values.iter());
        fields.push(Field::new(name, ty.arrow_type(), true));
        columns.push(build_array(&values, ty));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building export record batch")
}

fn write_parquet<R: Row>(store: &RecordStore<R>, path: &Path) -> Result<()> {
    let batch = to_record_batch(store)?;
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating Arrow writer for export")?;
    writer.write(&batch).context("writing export batch")?;
    writer.close().context("closing export writer")?;
    Ok(())
}

/// Pretty JSON of any serializable value, e.g. the run summary.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}
