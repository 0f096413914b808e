use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::error::{MergeError, Result};

/// Read a source file's column names without materializing any row data.
///
/// The header is the first line of the file; values are tab-separated.
pub fn probe_header(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| {
        MergeError::SchemaProbe(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| {
        MergeError::SchemaProbe(format!("cannot read header of {}: {}", path.display(), e))
    })?;
    if read == 0 {
        return Err(MergeError::SchemaProbe(format!(
            "{}: file is empty, missing header",
            path.display()
        )));
    }

    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return Err(MergeError::SchemaProbe(format!(
            "{}: header line is empty",
            path.display()
        )));
    }

    let columns: Vec<String> = line.split('\t').map(str::to_string).collect();

    // A lone column whose name embeds commas is almost always a file written
    // with the wrong delimiter.
    if columns.len() == 1 && columns[0].contains(',') {
        return Err(MergeError::SchemaProbe(format!(
            "{}: header has a single tab-separated column containing commas; wrong delimiter?",
            path.display()
        )));
    }

    let mut seen = BTreeSet::new();
    for column in &columns {
        if column.is_empty() {
            return Err(MergeError::SchemaProbe(format!(
                "{}: header contains an empty column name",
                path.display()
            )));
        }
        if !seen.insert(column.as_str()) {
            return Err(MergeError::SchemaProbe(format!(
                "{}: duplicate column '{}' in header",
                path.display(),
                column
            )));
        }
    }

    Ok(columns)
}

/// The sorted union of the column names of a set of source tables.
///
/// Sorting makes the unified layout reproducible regardless of the order the
/// sources are listed in or the order their headers declare columns.
#[derive(Debug, Clone)]
pub struct UnifiedSchema {
    columns: Vec<String>,
}

impl UnifiedSchema {
    pub fn from_sources(paths: &[PathBuf]) -> Result<Self> {
        let mut union: BTreeSet<String> = BTreeSet::new();
        for path in paths {
            for column in probe_header(path)? {
                union.insert(column);
            }
        }
        Ok(UnifiedSchema {
            columns: union.into_iter().collect(),
        })
    }

    /// Drop columns from the unified layout entirely (e.g. an edge `id`
    /// column that is meaningless once edges are merged).
    pub fn without(mut self, exclude: &[&str]) -> Self {
        self.columns.retain(|c| !exclude.contains(&c.as_str()));
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Arrow layout of the unified table: every column text, every column
    /// nullable. No type inference ever happens; identifiers that look
    /// numeric stay text.
    pub fn arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c, DataType::Utf8, true))
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// Projection plan for one source: for every unified column, the index
    /// of that column in the source's own header, or `None` when the source
    /// lacks it and null must be supplied.
    pub fn projection(&self, source_columns: &[String]) -> Vec<Option<usize>> {
        self.columns
            .iter()
            .map(|c| source_columns.iter().position(|s| s == c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn probe_reads_header_only() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "n.tsv", "id\tname\tprovided_by\nX\tFoo\tsrc1\n");
        assert_eq!(probe_header(&path).unwrap(), vec!["id", "name", "provided_by"]);
    }

    #[test]
    fn probe_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.tsv", "");
        let err = probe_header(&path).unwrap_err();
        assert!(err.to_string().contains("missing header"));
    }

    #[test]
    fn probe_rejects_comma_delimited_header() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.tsv", "id,name,provided_by\nX,Foo,src1\n");
        let err = probe_header(&path).unwrap_err();
        assert!(err.to_string().contains("wrong delimiter"));
    }

    #[test]
    fn probe_rejects_duplicate_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "dup.tsv", "id\tname\tid\n");
        let err = probe_header(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate column 'id'"));
    }

    #[test]
    fn union_is_sorted_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.tsv", "id\tname\tsynonym\nX\tFoo\ts\n");
        let b = write_file(&dir, "b.tsv", "id\tcategory\tname\nY\tc\tBar\n");
        let unified = UnifiedSchema::from_sources(&[a, b]).unwrap();
        assert_eq!(unified.columns(), ["category", "id", "name", "synonym"]);
    }

    #[test]
    fn exclusion_removes_columns() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.tsv", "subject\tid\tobject\tpredicate\n");
        let unified = UnifiedSchema::from_sources(&[a]).unwrap().without(&["id"]);
        assert_eq!(unified.columns(), ["object", "predicate", "subject"]);
    }

    #[test]
    fn projection_marks_missing_columns() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.tsv", "id\tname\n");
        let b = write_file(&dir, "b.tsv", "id\tcategory\n");
        let unified = UnifiedSchema::from_sources(&[a, b]).unwrap();
        // unified order: category, id, name
        let plan = unified.projection(&["id".to_string(), "name".to_string()]);
        assert_eq!(plan, vec![None, Some(0), Some(1)]);
    }
}
