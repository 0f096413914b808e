use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use arrow::array::{ArrayRef, RecordBatch, StringBuilder};
use tracing::info;

use crate::error::{MergeError, Result};
use crate::schema::UnifiedSchema;
use crate::table::{LoadOptions, ProvenanceTags, UnifiedTable, write_tsv};

use super::aggregate::{RowRef, TableView, sort_into_runs};
use super::policy::AggregationPlan;

/// Column stamped onto every row to tell the two sides apart.
const SOURCE_TABLE_COLUMN: &str = "source_table";
const BASE_TAG: &str = "base";
const SUBSET_TAG: &str = "subset";

#[derive(Debug, Clone, Copy)]
pub struct PairwiseStats {
    pub merged_rows: u64,
    pub duplicate_rows: u64,
}

/// Two-source overlay merge: keep exactly one row per key, base rows winning
/// over subset rows, and emit every losing row to a separate duplicates
/// table. No attribute aggregation happens on this path; the winning row is
/// copied verbatim.
pub fn merge_pair(
    base: &Path,
    subset: &Path,
    key_columns: &[&str],
    exclude: &[&str],
    merged_out: &Path,
    duplicates_out: &Path,
) -> Result<PairwiseStats> {
    let paths = vec![base.to_path_buf(), subset.to_path_buf()];
    let unified = UnifiedSchema::from_sources(&paths)?.without(exclude);

    let mut by_path = AHashMap::new();
    by_path.insert(base.to_path_buf(), BASE_TAG.to_string());
    by_path.insert(subset.to_path_buf(), SUBSET_TAG.to_string());
    let options = LoadOptions {
        tags: Some(ProvenanceTags {
            column: SOURCE_TABLE_COLUMN.to_string(),
            by_path,
        }),
    };
    let table = UnifiedTable::load(&paths, &unified, &options)?;

    // The plan supplies key indices and the output layout; its per-column
    // policies are not exercised on this path.
    let plan = AggregationPlan::new(
        table.schema(),
        key_columns,
        None,
        Some(SOURCE_TABLE_COLUMN),
        &[],
        &[SOURCE_TABLE_COLUMN],
    )?;
    let tag_index = plan.tag_index.ok_or_else(|| {
        MergeError::Aggregation(format!("stamped column '{}' not found", SOURCE_TABLE_COLUMN))
    })?;

    let view = TableView::new(&table)?;
    let runs = sort_into_runs(&table, &view, &plan)?;

    let mut winners: Vec<RowRef> = Vec::with_capacity(runs.distinct_keys());
    let mut losers: Vec<RowRef> = Vec::new();
    for key_idx in 0..runs.distinct_keys() {
        let mut rows: Vec<RowRef> = runs.rows[runs.run_range(key_idx)].to_vec();
        // Base rows first; input order breaks ties within one side.
        rows.sort_by_key(|r| (view.cell(*r, tag_index) != Some(BASE_TAG), r.batch, r.row));
        winners.push(rows[0]);
        losers.extend_from_slice(&rows[1..]);
    }

    let merged = copy_rows(&view, &plan, &winners)?;
    let duplicates = copy_rows(&view, &plan, &losers)?;
    write_tsv(merged_out, &merged)?;
    write_tsv(duplicates_out, &duplicates)?;

    let stats = PairwiseStats {
        merged_rows: winners.len() as u64,
        duplicate_rows: losers.len() as u64,
    };
    info!(
        merged = stats.merged_rows,
        duplicates = stats.duplicate_rows,
        out = %merged_out.display(),
        "pairwise merge complete"
    );
    Ok(stats)
}

fn copy_rows(
    view: &TableView<'_>,
    plan: &AggregationPlan,
    rows: &[RowRef],
) -> Result<RecordBatch> {
    let mut builders: Vec<StringBuilder> =
        plan.output.iter().map(|_| StringBuilder::new()).collect();
    for &row in rows {
        for (builder, column) in builders.iter_mut().zip(&plan.output) {
            match view.cell(row, column.source_index) {
                Some(value) => builder.append_value(value),
                None => builder.append_null(),
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

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn base_row_wins_and_loser_is_reported() {
        let dir = TempDir::new().unwrap();
        let base = write_file(&dir, "base.tsv", "id\tname\nX\tBaseName\nY\tOnlyBase\n");
        let subset = write_file(&dir, "subset.tsv", "id\tname\nX\tSubsetName\nZ\tOnlySubset\n");
        let merged_out = dir.path().join("merged.tsv");
        let duplicates_out = dir.path().join("duplicates.tsv");

        let stats = merge_pair(&base, &subset, &["id"], &[], &merged_out, &duplicates_out).unwrap();
        assert_eq!(stats.merged_rows, 3);
        assert_eq!(stats.duplicate_rows, 1);

        let merged = std::fs::read_to_string(&merged_out).unwrap();
        let lines: Vec<&str> = merged.lines().collect();
        assert_eq!(
            lines,
            ["id\tname", "X\tBaseName", "Y\tOnlyBase", "Z\tOnlySubset"]
        );

        let duplicates = std::fs::read_to_string(&duplicates_out).unwrap();
        let lines: Vec<&str> = duplicates.lines().collect();
        assert_eq!(lines, ["id\tname", "X\tSubsetName"]);
    }

    #[test]
    fn triple_keys_and_id_exclusion() {
        let dir = TempDir::new().unwrap();
        let base = write_file(
            &dir,
            "base.tsv",
            "id\tsubject\tpredicate\tobject\trelation\ne1\tA\trel\tB\tr1\n",
        );
        let subset = write_file(
            &dir,
            "subset.tsv",
            "id\tsubject\tpredicate\tobject\trelation\ne9\tA\trel\tB\tr2\n",
        );
        let merged_out = dir.path().join("merged.tsv");
        let duplicates_out = dir.path().join("duplicates.tsv");

        let stats = merge_pair(
            &base,
            &subset,
            &["subject", "predicate", "object"],
            &["id"],
            &merged_out,
            &duplicates_out,
        )
        .unwrap();
        assert_eq!(stats.merged_rows, 1);
        assert_eq!(stats.duplicate_rows, 1);

        let merged = std::fs::read_to_string(&merged_out).unwrap();
        let lines: Vec<&str> = merged.lines().collect();
        assert_eq!(
            lines,
            ["subject\tpredicate\tobject\trelation", "A\trel\tB\tr1"]
        );
    }
}
