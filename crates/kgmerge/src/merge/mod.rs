use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::report::{SourceCount, TableStats};
use crate::schema::UnifiedSchema;
use crate::table::{LoadOptions, UnifiedTable};

pub(crate) mod aggregate;
pub(crate) mod batch;
pub mod pairwise;
pub mod policy;

pub use self::pairwise::{PairwiseStats, merge_pair};
pub use self::policy::{AggregationPlan, ColumnPolicy};

use self::batch::run_batched_merge;

/// Distinct node ids aggregated per output window.
pub const DEFAULT_NODES_BATCH_SIZE: usize = 100_000;
/// Distinct edge triples aggregated per output window.
pub const DEFAULT_EDGES_BATCH_SIZE: usize = 2_000_000;

pub const NODE_KEY_COLUMNS: &[&str] = &["id"];
pub const EDGE_KEY_COLUMNS: &[&str] = &["subject", "predicate", "object"];

/// Edges have no identifier of their own; identity is the triple, and a
/// leftover `id` column from an export is dropped before merging.
pub const EDGE_EXCLUDED_COLUMNS: &[&str] = &["id"];

/// Node column resolved by Priority List instead of value concatenation.
pub const NODE_PREFERRED_COLUMN: &str = "name";
/// Node column consulted for Priority List membership.
pub const NODE_PROVENANCE_COLUMN: &str = "provided_by";

#[derive(Debug, Clone)]
pub struct NodeMergeOptions {
    /// Source tags treated as authoritative for the node `name` column.
    pub priority_sources: Vec<String>,
    pub batch_size: usize,
}

impl Default for NodeMergeOptions {
    fn default() -> Self {
        NodeMergeOptions {
            priority_sources: Vec::new(),
            batch_size: DEFAULT_NODES_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdgeMergeOptions {
    pub batch_size: usize,
}

impl Default for EdgeMergeOptions {
    fn default() -> Self {
        EdgeMergeOptions {
            batch_size: DEFAULT_EDGES_BATCH_SIZE,
        }
    }
}

/// Merge any number of node tables into one deduplicated table keyed by
/// `id`, streaming the result to `out_path`.
pub fn merge_node_files(
    paths: &[PathBuf],
    out_path: &Path,
    options: &NodeMergeOptions,
) -> Result<TableStats> {
    let unified = UnifiedSchema::from_sources(paths)?;
    let table = UnifiedTable::load(paths, &unified, &LoadOptions::default())?;

    let plan = AggregationPlan::new(
        table.schema(),
        NODE_KEY_COLUMNS,
        Some(NODE_PREFERRED_COLUMN),
        Some(NODE_PROVENANCE_COLUMN),
        &options.priority_sources,
        &[],
    )?;
    debug!(
        columns = plan.output.len(),
        priority = options.priority_sources.len(),
        "node aggregation plan ready"
    );

    let run = run_batched_merge(&table, &plan, options.batch_size, out_path)?;
    Ok(table_stats(&table, run.distinct_keys, run.output_rows))
}

/// Merge any number of edge tables into one deduplicated table keyed by
/// `(subject, predicate, object)`, streaming the result to `out_path`.
pub fn merge_edge_files(
    paths: &[PathBuf],
    out_path: &Path,
    options: &EdgeMergeOptions,
) -> Result<TableStats> {
    let unified = UnifiedSchema::from_sources(paths)?.without(EDGE_EXCLUDED_COLUMNS);
    let table = UnifiedTable::load(paths, &unified, &LoadOptions::default())?;

    let plan = AggregationPlan::new(table.schema(), EDGE_KEY_COLUMNS, None, None, &[], &[])?;
    debug!(columns = plan.output.len(), "edge aggregation plan ready");

    let run = run_batched_merge(&table, &plan, options.batch_size, out_path)?;
    Ok(table_stats(&table, run.distinct_keys, run.output_rows))
}

/// Two-source node overlay: base rows win, losers go to the duplicates file.
pub fn merge_node_pair(
    base: &Path,
    subset: &Path,
    merged_out: &Path,
    duplicates_out: &Path,
) -> Result<PairwiseStats> {
    merge_pair(base, subset, NODE_KEY_COLUMNS, &[], merged_out, duplicates_out)
}

/// Two-source edge overlay keyed by the triple, with the export `id` dropped.
pub fn merge_edge_pair(
    base: &Path,
    subset: &Path,
    merged_out: &Path,
    duplicates_out: &Path,
) -> Result<PairwiseStats> {
    merge_pair(
        base,
        subset,
        EDGE_KEY_COLUMNS,
        EDGE_EXCLUDED_COLUMNS,
        merged_out,
        duplicates_out,
    )
}

fn table_stats(table: &UnifiedTable, distinct_keys: u64, output_rows: u64) -> TableStats {
    TableStats {
        sources: table
            .sources()
            .iter()
            .map(|(path, rows)| SourceCount {
                path: path.display().to_string(),
                rows: *rows,
            })
            .collect(),
        unified_rows: table.num_rows() as u64,
        distinct_keys,
        output_rows,
    }
}
