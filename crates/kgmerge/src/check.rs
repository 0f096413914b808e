use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use ahash::AHashSet;
use arrow::array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};

use crate::error::{MergeError, Result};
use crate::table::{open_source_reader, write_tsv};

/// Result of checking a merged edge table against a merged node table.
#[derive(Debug, Clone)]
pub struct EndpointCheck {
    pub node_rows: u64,
    pub edge_rows: u64,
    /// Subject/object identifiers with no matching node id, sorted.
    pub missing: Vec<String>,
}

impl EndpointCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Verify that every `subject` and `object` of the edge table appears as a
/// node `id` in the node table.
pub fn check_edge_endpoints(nodes_path: &Path, edges_path: &Path) -> Result<EndpointCheck> {
    let mut node_ids: AHashSet<String> = AHashSet::new();
    let node_rows = scan_column(nodes_path, "id", |value| {
        node_ids.insert(value.to_string());
    })?;

    let mut missing: BTreeSet<String> = BTreeSet::new();
    let mut note_endpoint = |value: &str| {
        if !node_ids.contains(value) {
            missing.insert(value.to_string());
        }
    };
    let edge_rows = scan_column(edges_path, "subject", &mut note_endpoint)?;
    scan_column(edges_path, "object", &mut note_endpoint)?;

    Ok(EndpointCheck {
        node_rows,
        edge_rows,
        missing: missing.into_iter().collect(),
    })
}

/// Write the missing identifiers as a one-column TSV report.
pub fn write_missing_ids(check: &EndpointCheck, out_path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Utf8, true)]));
    let ids: StringArray = check.missing.iter().map(|id| Some(id.as_str())).collect();
    let batch = RecordBatch::try_new(schema, vec![Arc::new(ids) as ArrayRef])
        .map_err(|e| MergeError::BatchWrite(format!("missing-id batch error: {}", e)))?;
    write_tsv(out_path, &batch)
}

/// Stream one column of a table, invoking the callback for every non-empty
/// value. Returns the table's row count.
fn scan_column<F: FnMut(&str)>(path: &Path, column: &str, mut f: F) -> Result<u64> {
    let (columns, reader) = open_source_reader(path)?;
    let column_idx = columns.iter().position(|c| c == column).ok_or_else(|| {
        MergeError::Load(format!(
            "{}: missing required column '{}'",
            path.display(),
            column
        ))
    })?;

    let mut rows = 0;
    for batch in reader {
        let batch = batch.map_err(|e| MergeError::Load(format!("{}: {}", path.display(), e)))?;
        let values = batch
            .column(column_idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                MergeError::Load(format!("{}: column '{}' is not text", path.display(), column))
            })?;
        for row in 0..batch.num_rows() {
            rows += 1;
            if !values.is_null(row) && !values.value(row).is_empty() {
                f(values.value(row));
            }
        }
    }
    Ok(rows)
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
    fn finds_dangling_endpoints() {
        let dir = TempDir::new().unwrap();
        let nodes = write_file(&dir, "nodes.tsv", "id\tname\nA\ta\nB\tb\n");
        let edges = write_file(
            &dir,
            "edges.tsv",
            "subject\tpredicate\tobject\nA\trel\tB\nA\trel\tC\nD\trel\tB\n",
        );

        let check = check_edge_endpoints(&nodes, &edges).unwrap();
        assert_eq!(check.node_rows, 2);
        assert_eq!(check.edge_rows, 3);
        assert_eq!(check.missing, ["C", "D"]);
        assert!(!check.is_complete());
    }

    #[test]
    fn complete_graph_has_no_missing_ids() {
        let dir = TempDir::new().unwrap();
        let nodes = write_file(&dir, "nodes.tsv", "id\nA\nB\n");
        let edges = write_file(&dir, "edges.tsv", "subject\tpredicate\tobject\nA\trel\tB\n");

        let check = check_edge_endpoints(&nodes, &edges).unwrap();
        assert!(check.is_complete());
    }

    #[test]
    fn writes_missing_id_report() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("missing_nodes.tsv");
        let check = EndpointCheck {
            node_rows: 0,
            edge_rows: 0,
            missing: vec!["C".to_string(), "D".to_string()],
        };

        write_missing_ids(&check, &out).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), ["id", "C", "D"]);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let dir = TempDir::new().unwrap();
        let nodes = write_file(&dir, "nodes.tsv", "name\na\n");
        let edges = write_file(&dir, "edges.tsv", "subject\tpredicate\tobject\nA\trel\tB\n");

        let err = check_edge_endpoints(&nodes, &edges).unwrap_err();
        assert!(err.to_string().contains("missing required column 'id'"));
    }
}
