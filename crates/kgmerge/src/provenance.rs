use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MergeError, Result};
use crate::schema::probe_header;

/// Directory name marking node files whose provenance is authoritative.
const ONTOLOGY_DIR: &str = "ontologies";

/// Discover the Priority List from the node files that came from ontology
/// transforms: each such file contributes the `provided_by` value of its
/// first data row that has one.
///
/// Files without a `provided_by` column, or with no tagged row at all, are
/// skipped rather than rejected; a priority list is an optimization of name
/// resolution, not a load requirement.
pub fn discover_priority_sources(node_paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut sources = Vec::new();
    for path in node_paths {
        if !is_ontology_table(path) {
            continue;
        }
        if let Some(tag) = first_provided_by(path)? {
            if !sources.contains(&tag) {
                sources.push(tag);
            }
        }
    }
    debug!(count = sources.len(), "discovered priority sources");
    Ok(sources)
}

fn is_ontology_table(path: &Path) -> bool {
    let in_ontology_dir = path
        .components()
        .any(|c| c.as_os_str() == ONTOLOGY_DIR);
    in_ontology_dir && path.extension().is_some_and(|ext| ext == "tsv")
}

/// First non-empty `provided_by` value in the file, probing rows in order
/// without loading the table.
fn first_provided_by(path: &Path) -> Result<Option<String>> {
    let columns = probe_header(path)?;
    let Some(column_idx) = columns.iter().position(|c| c == "provided_by") else {
        return Ok(None);
    };

    let file = File::open(path).map_err(|e| {
        MergeError::SchemaProbe(format!("cannot open {}: {}", path.display(), e))
    })?;
    let reader = BufReader::new(file);

    for line in reader.lines().skip(1) {
        let line = line.map_err(|e| {
            MergeError::SchemaProbe(format!("cannot read {}: {}", path.display(), e))
        })?;
        let value = line
            .trim_end_matches(['\n', '\r'])
            .split('\t')
            .nth(column_idx)
            .unwrap_or("");
        if !value.is_empty() {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn takes_first_tagged_row_of_ontology_files_only() {
        let dir = TempDir::new().unwrap();
        let ontologies = dir.path().join("ontologies");
        std::fs::create_dir(&ontologies).unwrap();

        let a = write_file(
            &ontologies,
            "chebi_nodes.tsv",
            "id\tname\tprovided_by\nC:1\tx\t\nC:2\ty\tchebi.json\n",
        );
        let b = write_file(
            dir.path(),
            "literature_nodes.tsv",
            "id\tname\tprovided_by\nL:1\tz\tpubmed.json\n",
        );

        let sources = discover_priority_sources(&[a, b]).unwrap();
        assert_eq!(sources, ["chebi.json"]);
    }

    #[test]
    fn skips_files_without_provided_by() {
        let dir = TempDir::new().unwrap();
        let ontologies = dir.path().join("ontologies");
        std::fs::create_dir(&ontologies).unwrap();

        let a = write_file(&ontologies, "bare_nodes.tsv", "id\tname\nX\tx\n");
        let sources = discover_priority_sources(&[a]).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn deduplicates_repeated_tags() {
        let dir = TempDir::new().unwrap();
        let ontologies = dir.path().join("ontologies");
        std::fs::create_dir(&ontologies).unwrap();

        let a = write_file(
            &ontologies,
            "go_a_nodes.tsv",
            "id\tprovided_by\nG:1\tgo.json\n",
        );
        let b = write_file(
            &ontologies,
            "go_b_nodes.tsv",
            "id\tprovided_by\nG:2\tgo.json\n",
        );

        let sources = discover_priority_sources(&[a, b]).unwrap();
        assert_eq!(sources, ["go.json"]);
    }
}
