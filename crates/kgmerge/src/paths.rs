use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{MergeError, Result};

const NODES_SUFFIX: &str = "nodes.tsv";
const EDGES_SUFFIX: &str = "edges.tsv";

/// Node and edge table paths collected for one merge run, sorted.
#[derive(Debug, Clone, Default)]
pub struct KgPaths {
    pub nodes: Vec<PathBuf>,
    pub edges: Vec<PathBuf>,
}

impl KgPaths {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    fn extend_from_dir(&mut self, dir: &Path) -> Result<()> {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.ends_with(NODES_SUFFIX) {
                self.nodes.push(entry.into_path());
            } else if name.ends_with(EDGES_SUFFIX) {
                self.edges.push(entry.into_path());
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Self {
        self.nodes.sort();
        self.edges.sort();
        self
    }
}

/// Collect every node/edge table below the data directory.
pub fn collect_all_paths(data_dir: &Path) -> Result<KgPaths> {
    let mut paths = KgPaths::default();
    paths.extend_from_dir(data_dir)?;
    let paths = paths.finish();
    debug!(
        nodes = paths.nodes.len(),
        edges = paths.edges.len(),
        dir = %data_dir.display(),
        "collected graph tables"
    );
    Ok(paths)
}

/// Collect the node/edge tables of the selected transforms only. Each
/// transform is a directory directly below the data directory.
pub fn collect_transform_paths(data_dir: &Path, transforms: &[String]) -> Result<KgPaths> {
    let mut paths = KgPaths::default();
    for transform in transforms {
        let dir = data_dir.join(transform);
        if !dir.is_dir() {
            return Err(MergeError::Load(format!(
                "transform directory not found: {}",
                dir.display()
            )));
        }
        paths.extend_from_dir(&dir)?;
    }
    Ok(paths.finish())
}
