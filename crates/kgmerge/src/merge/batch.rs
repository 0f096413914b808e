use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use arrow::array::RecordBatch;
use arrow::csv::WriterBuilder;
use tracing::info;

use crate::error::{MergeError, Result};
use crate::table::UnifiedTable;

use super::aggregate::{TableView, aggregate_window, sort_into_runs};
use super::policy::AggregationPlan;

#[derive(Debug, Clone, Copy)]
pub(crate) struct BatchRunStats {
    pub distinct_keys: u64,
    pub output_rows: u64,
    pub windows: u64,
}

/// Drive the aggregator over fixed-size windows of distinct keys and stream
/// the merged rows to `out_path`.
///
/// The distinct sorted key set is computed once; each window is a contiguous
/// slice of it, selected through precomputed run offsets rather than offset
/// pagination, so no window rescans the table and no window ever splits one
/// key's row group. Windows run in ascending key order: the first writes the
/// header, the rest append, and the finished file is globally key-sorted.
pub(crate) fn run_batched_merge(
    table: &UnifiedTable,
    plan: &AggregationPlan,
    batch_size: usize,
    out_path: &Path,
) -> Result<BatchRunStats> {
    if batch_size == 0 {
        return Err(MergeError::BatchWrite(
            "batch size must be at least 1".to_string(),
        ));
    }

    let view = TableView::new(table)?;
    let runs = sort_into_runs(table, &view, plan)?;
    let total = runs.distinct_keys();

    let file = File::create(out_path).map_err(|e| {
        MergeError::BatchWrite(format!("cannot create {}: {}", out_path.display(), e))
    })?;
    let mut writer = WriterBuilder::new()
        .with_delimiter(b'\t')
        .with_header(true)
        .build(BufWriter::new(file));

    let mut stats = BatchRunStats {
        distinct_keys: total as u64,
        output_rows: 0,
        windows: 0,
    };

    if total == 0 {
        // Header-only output for an input with no rows.
        let empty = RecordBatch::new_empty(plan.output_schema().clone());
        writer.write(&empty).map_err(|e| {
            MergeError::BatchWrite(format!("{}: {}", out_path.display(), e))
        })?;
    }

    let mut start = 0;
    while start < total {
        let end = (start + batch_size).min(total);
        let merged = aggregate_window(&view, plan, &runs, start..end)?;
        writer.write(&merged).map_err(|e| {
            MergeError::BatchWrite(format!(
                "{}: windowed write of keys {}..{} failed: {}",
                out_path.display(),
                start,
                end,
                e
            ))
        })?;
        stats.output_rows += merged.num_rows() as u64;
        stats.windows += 1;
        info!(processed = end, total, out = %out_path.display(), "merged key window");
        start = end;
    }

    let mut inner = writer.into_inner();
    inner.flush().map_err(|e| {
        MergeError::BatchWrite(format!("cannot flush {}: {}", out_path.display(), e))
    })?;

    Ok(stats)
}
