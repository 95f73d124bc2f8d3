// src/merge.rs

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use tracing::{debug, info, instrument, warn};

use crate::{
    load::LoadedTables,
    record::{MergedRecord, MergedStore, Value},
    table::Table,
};

/// Output field holding the join key.
pub const NAME: &str = "name";
/// Label column hoisted from the first table.
pub const OPENSET: &str = "openset";
/// Rationale column hoisted from the second table.
pub const REASON: &str = "reason";

/// Which two datasets to join, on what, and how to rename collisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSpec {
    pub left: String,
    pub right: String,
    pub key: String,
    pub left_suffix: String,
    pub right_suffix: String,
}

impl Default for MergeSpec {
    fn default() -> Self {
        Self {
            left: "track2_train_mercaptionplus".into(),
            right: "track3_train_mercaptionplus".into(),
            key: "name".into(),
            left_suffix: "_track2".into(),
            right_suffix: "_track3".into(),
        }
    }
}

/// Why the merge stage produced nothing. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeSkip {
    MissingTables(Vec<String>),
    MissingKey { table: String, key: String },
}

impl fmt::Display for MergeSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeSkip::MissingTables(names) => {
                write!(f, "required datasets not loaded: {}", names.join(", "))
            }
            MergeSkip::MissingKey { table, key } => {
                write!(f, "`{}` has no `{}` column", table, key)
            }
        }
    }
}

impl std::error::Error for MergeSkip {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// One output column: its merged name and where its value comes from.
#[derive(Debug, Clone)]
struct OutputColumn {
    name: String,
    side: Side,
    index: usize,
}

/// Left columns in order, then right columns minus the key. Non-key columns
/// present on both sides get the side's suffix, as does a non-key `name`
/// column, which would otherwise shadow the key field.
fn plan_columns(left: &Table, right: &Table, spec: &MergeSpec) -> Vec<OutputColumn> {
    let left_cols = left.column_names();
    let right_cols = right.column_names();
    let clashes = |col: &String, other: &[String]| {
        *col != spec.key && (other.contains(col) || col == NAME)
    };
    let mut plan = Vec::with_capacity(left_cols.len() + right_cols.len());

    for (index, col) in left_cols.iter().enumerate() {
        let name = if clashes(col, &right_cols) {
            format!("{}{}", col, spec.left_suffix)
        } else {
            col.clone()
        };
        plan.push(OutputColumn {
            name,
            side: Side::Left,
            index,
        });
    }
    for (index, col) in right_cols.iter().enumerate() {
        if *col == spec.key {
            continue;
        }
        let name = if clashes(col, &left_cols) {
            format!("{}{}", col, spec.right_suffix)
        } else {
            col.clone()
        };
        plan.push(OutputColumn {
            name,
            side: Side::Right,
            index,
        });
    }
    plan
}

/// Where a hoisted field is read from: the unsuffixed column of that name,
/// whichever side it is on, else the preferred side's copy of a collision.
fn hoist_source(
    plan: &[OutputColumn],
    column: &str,
    preferred: &Table,
    side: Side,
) -> Option<(Side, usize)> {
    plan.iter()
        .find(|c| c.name == column)
        .map(|c| (c.side, c.index))
        .or_else(|| preferred.column_index(column).map(|i| (side, i)))
}

/// Inner join of `left` and `right` on `spec.key`.
///
/// Keys missing from either side are dropped. Records follow left-table
/// order; a key repeated on either side yields one record per pairing, and
/// the name index then keeps the last of them.
#[instrument(level = "info", skip_all, fields(left = left.name(), right = right.name()))]
pub fn merge_annotations(
    left: &Table,
    right: &Table,
    spec: &MergeSpec,
) -> Result<MergedStore, MergeSkip> {
    let missing_key = |t: &Table| MergeSkip::MissingKey {
        table: t.name().to_string(),
        key: spec.key.clone(),
    };
    let left_key = left.column_index(&spec.key).ok_or_else(|| missing_key(left))?;
    let right_key = right
        .column_index(&spec.key)
        .ok_or_else(|| missing_key(right))?;

    let plan = plan_columns(left, right, spec);
    debug!(
        columns = ?plan.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "merged columns"
    );
    // an unsuffixed openset/reason column is the hoisted one; suffixed copies stay
    let carried: Vec<&OutputColumn> = plan
        .iter()
        .filter(|c| c.name != spec.key && c.name != OPENSET && c.name != REASON)
        .collect();
    let openset_src = hoist_source(&plan, OPENSET, left, Side::Left);
    let reason_src = hoist_source(&plan, REASON, right, Side::Right);

    let mut right_rows: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..right.num_rows() {
        if let Some(key) = right.value(row, right_key).as_key() {
            right_rows.entry(key.into_owned()).or_default().push(row);
        }
    }

    let mut store = MergedStore::new();
    let mut null_keys = 0usize;
    for lrow in 0..left.num_rows() {
        let key_value = left.value(lrow, left_key);
        let Some(key) = key_value.as_key() else {
            null_keys += 1;
            continue;
        };
        let Some(matches) = right_rows.get(key.as_ref()) else {
            continue;
        };

        for &rrow in matches {
            let cell = |side: Side, index: usize| match side {
                Side::Left => left.value(lrow, index),
                Side::Right => right.value(rrow, index),
            };
            let hoisted =
                |src: Option<(Side, usize)>| src.map_or(Value::Null, |(side, i)| cell(side, i));
            let fields = carried
                .iter()
                .map(|c| (c.name.clone(), cell(c.side, c.index)))
                .collect();
            store.insert(MergedRecord {
                name: key.to_string(),
                openset: hoisted(openset_src),
                reason: hoisted(reason_src),
                fields,
            });
        }
    }

    if null_keys > 0 {
        warn!(rows = null_keys, table = left.name(), "rows without a key were dropped");
    }
    if store.duplicates() > 0 {
        warn!(
            duplicates = store.duplicates(),
            "duplicate names collapsed, last write wins"
        );
    }
    info!(rows = store.len(), "✓ merged");
    Ok(store)
}

/// Check that both datasets are present, then merge their `train` splits.
pub fn merge_step(tables: &LoadedTables, spec: &MergeSpec) -> Result<MergedStore, MergeSkip> {
    let left = tables.train(&spec.left);
    let right = tables.train(&spec.right);

    match (left, right) {
        (Some(left), Some(right)) => {
            info!(
                left = %spec.left,
                left_rows = left.num_rows(),
                right = %spec.right,
                right_rows = right.num_rows(),
                "merging"
            );
            info!(columns = ?left.column_names(), "{} columns", spec.left);
            info!(columns = ?right.column_names(), "{} columns", spec.right);
            merge_annotations(left, right, spec)
        }
        _ => {
            let missing = [(&spec.left, left), (&spec.right, right)]
                .iter()
                .filter(|(_, t)| t.is_none())
                .map(|(name, _)| name.to_string())
                .collect();
            Err(MergeSkip::MissingTables(missing))
        }
    }
}
