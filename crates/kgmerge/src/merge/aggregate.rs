use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, StringArray, StringBuilder};

use crate::error::{MergeError, Result};
use crate::table::UnifiedTable;

use super::policy::{AggregationPlan, ColumnPolicy};

/// Handle of one unified-table row: (batch index, row index). Sorting and
/// grouping shuffle handles, never cell values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowRef {
    pub batch: u32,
    pub row: u32,
}

/// Every column of every batch downcast to `StringArray` once.
pub(crate) struct TableView<'a> {
    batches: Vec<Vec<&'a StringArray>>,
}

impl<'a> TableView<'a> {
    pub fn new(table: &'a UnifiedTable) -> Result<Self> {
        let mut batches = Vec::with_capacity(table.batches().len());
        for batch in table.batches() {
            let mut columns = Vec::with_capacity(batch.num_columns());
            for (col_idx, column) in batch.columns().iter().enumerate() {
                let array = column
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| {
                        MergeError::Aggregation(format!(
                            "column '{}' is not text",
                            table.schema().field(col_idx).name()
                        ))
                    })?;
                columns.push(array);
            }
            batches.push(columns);
        }
        Ok(TableView { batches })
    }

    /// Cell value, with null and empty text both treated as absent. The
    /// source format writes missing values as empty fields, so the two are
    /// indistinguishable on disk.
    pub fn cell(&self, row: RowRef, col: usize) -> Option<&'a str> {
        let array = self.batches[row.batch as usize][col];
        let row = row.row as usize;
        if array.is_null(row) {
            return None;
        }
        let value = array.value(row);
        if value.is_empty() { None } else { Some(value) }
    }
}

/// All rows sorted by grouping key, with the start offset of every distinct
/// key's run. A run never spans a window boundary.
#[derive(Debug)]
pub(crate) struct SortedRuns {
    pub rows: Vec<RowRef>,
    starts: Vec<usize>,
}

impl SortedRuns {
    pub fn distinct_keys(&self) -> usize {
        self.starts.len()
    }

    pub fn run_range(&self, key_idx: usize) -> Range<usize> {
        let start = self.starts[key_idx];
        let end = if key_idx + 1 < self.starts.len() {
            self.starts[key_idx + 1]
        } else {
            self.rows.len()
        };
        start..end
    }
}

pub(crate) fn compare_keys(
    view: &TableView<'_>,
    key_indices: &[usize],
    a: RowRef,
    b: RowRef,
) -> Ordering {
    for &key in key_indices {
        let va = view.cell(a, key).unwrap_or("");
        let vb = view.cell(b, key).unwrap_or("");
        match va.cmp(vb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Collect every row handle, reject null identities, sort by key and locate
/// the distinct-key runs.
pub(crate) fn sort_into_runs(
    table: &UnifiedTable,
    view: &TableView<'_>,
    plan: &AggregationPlan,
) -> Result<SortedRuns> {
    let mut rows = Vec::with_capacity(table.num_rows());
    for (batch_idx, batch) in table.batches().iter().enumerate() {
        for row_idx in 0..batch.num_rows() {
            let row = RowRef {
                batch: batch_idx as u32,
                row: row_idx as u32,
            };
            for &key in &plan.key_indices {
                if view.cell(row, key).is_none() {
                    return Err(MergeError::Aggregation(format!(
                        "grouping key column '{}' has a null value in {}",
                        table.schema().field(key).name(),
                        table.batch_path(batch_idx).display()
                    )));
                }
            }
            rows.push(row);
        }
    }

    rows.sort_unstable_by(|a, b| compare_keys(view, &plan.key_indices, *a, *b));

    let mut starts = Vec::new();
    for idx in 0..rows.len() {
        if idx == 0
            || compare_keys(view, &plan.key_indices, rows[idx - 1], rows[idx]) != Ordering::Equal
        {
            starts.push(idx);
        }
    }

    Ok(SortedRuns { rows, starts })
}

/// Aggregate one window of distinct keys into an output batch, one merged
/// row per key. The same group always yields the same bytes: distinct values
/// are totally ordered before joining, and the preferred-value tie-break is
/// the lexicographically smallest candidate.
pub(crate) fn aggregate_window(
    view: &TableView<'_>,
    plan: &AggregationPlan,
    runs: &SortedRuns,
    window: Range<usize>,
) -> Result<RecordBatch> {
    let mut builders: Vec<StringBuilder> =
        plan.output.iter().map(|_| StringBuilder::new()).collect();

    for key_idx in window {
        let rows = &runs.rows[runs.run_range(key_idx)];
        for (builder, column) in builders.iter_mut().zip(&plan.output) {
            match column.policy {
                ColumnPolicy::PassThrough => {
                    // Keys were validated non-null before sorting.
                    builder.append_value(view.cell(rows[0], column.source_index).unwrap_or(""));
                }
                ColumnPolicy::PriorityResolve => {
                    match resolve_preferred(view, plan, rows, column.source_index) {
                        Some(value) => builder.append_value(value),
                        None => builder.append_null(),
                    }
                }
                ColumnPolicy::DistinctJoin => {
                    let mut values: BTreeSet<&str> = BTreeSet::new();
                    for &row in rows {
                        if let Some(value) = view.cell(row, column.source_index) {
                            values.insert(value);
                        }
                    }
                    // An empty set still yields a value: the empty string.
                    let joined: Vec<&str> = values.into_iter().collect();
                    builder.append_value(joined.join("|"));
                }
            }
        }
    }

    let columns: Vec<ArrayRef> = builders
        .into_iter()
        .map(|mut b| Arc::new(b.finish()) as ArrayRef)
        .collect();
    RecordBatch::try_new(plan.output_schema().clone(), columns)
        .map_err(|e| MergeError::Aggregation(format!("output batch error: {}", e)))
}

fn resolve_preferred<'a>(
    view: &TableView<'a>,
    plan: &AggregationPlan,
    rows: &[RowRef],
    col: usize,
) -> Option<&'a str> {
    let mut best_prioritized: Option<&str> = None;
    let mut best_any: Option<&str> = None;

    for &row in rows {
        let Some(value) = view.cell(row, col) else {
            continue;
        };
        best_any = smaller(best_any, value);
        if is_prioritized(view, plan, row) {
            best_prioritized = smaller(best_prioritized, value);
        }
    }

    best_prioritized.or(best_any)
}

fn smaller<'a>(current: Option<&'a str>, candidate: &'a str) -> Option<&'a str> {
    match current {
        Some(value) if value <= candidate => Some(value),
        _ => Some(candidate),
    }
}

fn is_prioritized(view: &TableView<'_>, plan: &AggregationPlan, row: RowRef) -> bool {
    let Some(tag_index) = plan.tag_index else {
        return false;
    };
    match view.cell(row, tag_index) {
        Some(tag) => plan.priority.contains(tag),
        None => false,
    }
}
