// src/table/parse.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder},
    datatypes::{Field, Schema},
    record_batch::RecordBatch,
};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

use super::{ColumnType, Table};

/// Tokens read as a missing value.
pub const DEFAULT_NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub na_values: Vec<String>,
    /// Columns always kept as text, whatever their cells look like.
    pub text_columns: Vec<String>,
    pub delimiter: char,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            na_values: DEFAULT_NA_VALUES.iter().map(|s| s.to_string()).collect(),
            text_columns: vec!["name".to_string()],
            delimiter: ',',
        }
    }
}

impl LoadOptions {
    pub fn is_na(&self, cell: &str) -> bool {
        self.na_values.iter().any(|na| na == cell)
    }
}

/// A CSV file as read: the header row and each data row as strings.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read header + rows. Rows with a different field count than the header
/// are an error, as is a file with no header row.
pub fn read_raw(text: &str, delimiter: char) -> Result<RawTable> {
    if !delimiter.is_ascii() {
        bail!("delimiter `{}` is not a single byte", delimiter);
    }
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter as u8)
        .from_reader(text.as_bytes());

    let header_record = rdr.headers().context("reading CSV header")?.clone();
    if header_record.is_empty() {
        bail!("CSV has no header row");
    }
    let headers = clean_headers(header_record.iter());

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}

/// Trim names, name blank headers `Unnamed: <idx>` and suffix repeats `.1`, `.2`, ...
fn clean_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (idx, h) in raw.enumerate() {
        let trimmed = h.trim();
        let base = if trimmed.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            trimmed.to_string()
        };
        let mut name = base.clone();
        let mut n = 1;
        while !seen.insert(name.clone()) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        out.push(name);
    }
    out
}

/// Look at every non-missing cell of a column:
///  - all parse as i64 → int64
///  - else all parse as f64 → float64
///  - else all are true/false → bool
///  - otherwise, or with no samples at all → string
pub fn infer_column_type<'a>(
    cells: impl Iterator<Item = &'a str>,
    options: &LoadOptions,
) -> ColumnType {
    let (mut int, mut float, mut boolean) = (true, true, true);
    let mut sampled = false;

    for cell in cells {
        if options.is_na(cell) {
            continue;
        }
        sampled = true;
        let v = cell.trim();
        int = int && v.parse::<i64>().is_ok();
        float = float && v.parse::<f64>().is_ok();
        boolean = boolean && parse_bool(v).is_some();
        if !int && !float && !boolean {
            return ColumnType::Utf8;
        }
    }

    match (sampled, int, float, boolean) {
        (false, ..) => ColumnType::Utf8,
        (true, true, _, _) => ColumnType::Int64,
        (true, false, true, _) => ColumnType::Float64,
        (true, false, false, true) => ColumnType::Bool,
        _ => ColumnType::Utf8,
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    if v.eq_ignore_ascii_case("true") {
        Some(true)
    } else if v.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn build_column(raw: &RawTable, idx: usize, ty: ColumnType, options: &LoadOptions) -> ArrayRef {
    let cells = raw.rows.iter().map(|r| {
        let c = r.get(idx).map(String::as_str).unwrap_or("");
        if options.is_na(c) {
            None
        } else {
            Some(c)
        }
    });

    match ty {
        ColumnType::Int64 => {
            let mut b = Int64Builder::with_capacity(raw.rows.len());
            for c in cells {
                b.append_option(c.and_then(|v| v.trim().parse().ok()));
            }
            Arc::new(b.finish())
        }
        ColumnType::Float64 => {
            let mut b = Float64Builder::with_capacity(raw.rows.len());
            for c in cells {
                b.append_option(c.and_then(|v| v.trim().parse().ok()));
            }
            Arc::new(b.finish())
        }
        ColumnType::Bool => {
            let mut b = BooleanBuilder::with_capacity(raw.rows.len());
            for c in cells {
                b.append_option(c.and_then(|v| parse_bool(v.trim())));
            }
            Arc::new(b.finish())
        }
        ColumnType::Utf8 => {
            let mut b = StringBuilder::new();
            for c in cells {
                b.append_option(c);
            }
            Arc::new(b.finish())
        }
    }
}

/// Infer a type for each column and build the Arrow batch.
pub fn build_table(name: &str, raw: &RawTable, options: &LoadOptions) -> Result<Table> {
    let mut fields = Vec::with_capacity(raw.headers.len());
    let mut columns = Vec::with_capacity(raw.headers.len());

    for (idx, header) in raw.headers.iter().enumerate() {
        let ty = if options.text_columns.iter().any(|c| c == header) {
            ColumnType::Utf8
        } else {
            infer_column_type(
                raw.rows
                    .iter()
                    .map(|r| r.get(idx).map(String::as_str).unwrap_or("")),
                options,
            )
        };
        debug!(table = name, column = %header, %ty, "inferred column type");
        fields.push(Field::new(header, ty.arrow_type(), true));
        columns.push(build_column(raw, idx, ty, options));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .with_context(|| format!("building record batch for `{}`", name))?;
    Ok(Table::new(name, batch))
}

/// Text of a whole CSV file → typed [`Table`].
pub fn parse_table(name: &str, text: &str, options: &LoadOptions) -> Result<Table> {
    let raw = read_raw(text, options.delimiter)?;
    build_table(name, &raw, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    #[test]
    fn infers_each_column_type() {
        let opts = LoadOptions::default();
        let t = |cells: &[&str]| infer_column_type(cells.iter().copied(), &opts);

        assert_eq!(t(&["1", "2", "", "-4"]), ColumnType::Int64);
        assert_eq!(t(&["1", "2.5", "NaN"]), ColumnType::Float64);
        assert_eq!(t(&["True", "false"]), ColumnType::Bool);
        assert_eq!(t(&["1", "happy"]), ColumnType::Utf8);
        assert_eq!(t(&["", "N/A"]), ColumnType::Utf8);
    }

    #[test]
    fn name_column_stays_text() -> Result<()> {
        let table = parse_table("t", "name,n\n0001,1\n0002,2\n", &LoadOptions::default())?;
        assert_eq!(table.value(0, 0), Value::from("0001"));
        assert_eq!(table.value(1, 1), Value::Int(2));
        Ok(())
    }

    #[test]
    fn na_tokens_become_nulls() -> Result<()> {
        let table = parse_table(
            "subs",
            "name,chinese,english\nv1,N/A,hello\nv2,你好,nan\n",
            &LoadOptions::default(),
        )?;
        assert_eq!(table.value(0, 1), Value::Null);
        assert_eq!(table.value(0, 2), Value::from("hello"));
        assert_eq!(table.value(1, 1), Value::from("你好"));
        assert_eq!(table.value(1, 2), Value::Null);
        Ok(())
    }

    #[test]
    fn quoted_fields_keep_commas_and_newlines() -> Result<()> {
        let text = "name,reason\nv1,\"tone of voice, pitch\"\nv2,\"line one\nline two\"\n";
        let table = parse_table("t", text, &LoadOptions::default())?;
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value(0, 1), Value::from("tone of voice, pitch"));
        assert_eq!(table.value(1, 1), Value::from("line one\nline two"));
        Ok(())
    }

    #[test]
    fn ragged_rows_fail_the_file() {
        let err = parse_table("t", "name,a\nv1,1,extra\n", &LoadOptions::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("record 0"));
    }

    #[test]
    fn headers_are_cleaned() -> Result<()> {
        let raw = read_raw(" name ,,x,x\n1,2,3,4\n", ',')?;
        assert_eq!(raw.headers, vec!["name", "Unnamed: 1", "x", "x.1"]);
        Ok(())
    }

    #[test]
    fn header_only_file_is_an_empty_table() -> Result<()> {
        let table = parse_table("t", "name,openset\n", &LoadOptions::default())?;
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["name", "openset"]);
        Ok(())
    }
}
