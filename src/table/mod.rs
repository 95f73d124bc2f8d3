// src/table/mod.rs

pub mod decode;
pub mod parse;

pub use decode::{Decoding, DecodingPolicy};
pub use parse::{parse_table, LoadOptions, RawTable};

use arrow::{
    array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray},
    datatypes::DataType,
    record_batch::RecordBatch,
};
use std::{collections::BTreeMap, fmt};

use crate::record::Value;

/// Name of the only split a CSV export produces.
pub const TRAIN_SPLIT: &str = "train";

/// Column types a CSV cell can be inferred as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    Bool,
    Utf8,
}

impl ColumnType {
    pub fn arrow_type(self) -> DataType {
        match self {
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Bool => DataType::Boolean,
            ColumnType::Utf8 => DataType::Utf8,
        }
    }

    pub fn from_arrow(dt: &DataType) -> Self {
        match dt {
            DataType::Int64 => ColumnType::Int64,
            DataType::Float64 => ColumnType::Float64,
            DataType::Boolean => ColumnType::Bool,
            _ => ColumnType::Utf8,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Utf8 => "string",
        };
        f.write_str(s)
    }
}

/// A named, column-typed table backed by a single Arrow batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    batch: RecordBatch,
}

impl Table {
    pub fn new(name: impl Into<String>, batch: RecordBatch) -> Self {
        Self {
            name: name.into(),
            batch,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.batch.schema().index_of(column).ok()
    }

    pub fn column_types(&self) -> Vec<(String, ColumnType)> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), ColumnType::from_arrow(f.data_type())))
            .collect()
    }

    /// `{name: string, openset: string, ...}`, in the style of dataset features.
    pub fn features(&self) -> String {
        let inner = self
            .column_types()
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{}}}", inner)
    }

    pub fn value(&self, row: usize, col: usize) -> Value {
        cell(self.batch.column(col), row)
    }

    /// Column name → value for one row, in column order.
    pub fn row(&self, row: usize) -> Vec<(String, Value)> {
        self.batch
            .schema()
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().clone(), self.value(row, i)))
            .collect()
    }
}

fn cell(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    let any = array.as_any();
    let value = match array.data_type() {
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| Value::Int(a.value(row))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| Value::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| Value::Bool(a.value(row))),
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|a| Value::Text(a.value(row).to_string())),
        _ => None,
    };
    value.unwrap_or(Value::Null)
}

/// The splits loaded from one file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetDict {
    pub splits: BTreeMap<String, Table>,
}

impl DatasetDict {
    /// A dict holding `table` as its only (`train`) split.
    pub fn single(table: Table) -> Self {
        let mut splits = BTreeMap::new();
        splits.insert(TRAIN_SPLIT.to_string(), table);
        Self { splits }
    }

    pub fn split(&self, name: &str) -> Option<&Table> {
        self.splits.get(name)
    }

    pub fn train(&self) -> Option<&Table> {
        self.split(TRAIN_SPLIT)
    }

    pub fn split_names(&self) -> Vec<&str> {
        self.splits.keys().map(String::as_str).collect()
    }
}
