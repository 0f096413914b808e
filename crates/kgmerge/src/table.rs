use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use arrow::array::{ArrayRef, RecordBatch, StringArray, new_null_array};
use arrow::csv::{Reader, ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tracing::info;

use crate::error::{MergeError, Result};
use crate::schema::{UnifiedSchema, probe_header};

/// Rows read from disk in chunks of this many at a time.
const READ_BATCH_ROWS: usize = 8192;

/// Open a source table with its own header-derived all-text schema.
///
/// Returns the source's column names and a batch reader over its rows.
pub(crate) fn open_source_reader(path: &Path) -> Result<(Vec<String>, Reader<File>)> {
    let source_columns = probe_header(path)?;

    let file_fields: Vec<Field> = source_columns
        .iter()
        .map(|c| Field::new(c, DataType::Utf8, true))
        .collect();
    let file_schema = Arc::new(Schema::new(file_fields));

    let file = File::open(path)
        .map_err(|e| MergeError::Load(format!("cannot open {}: {}", path.display(), e)))?;
    let reader = ReaderBuilder::new(file_schema)
        .with_header(true)
        .with_delimiter(b'\t')
        .with_truncated_rows(true)
        .with_batch_size(READ_BATCH_ROWS)
        .build(file)
        .map_err(|e| MergeError::Load(format!("cannot read {}: {}", path.display(), e)))?;

    Ok((source_columns, reader))
}

/// Write one batch as a TSV file with a header, flushed before returning.
pub(crate) fn write_tsv(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        MergeError::BatchWrite(format!("cannot create {}: {}", path.display(), e))
    })?;
    let mut writer = WriterBuilder::new()
        .with_delimiter(b'\t')
        .with_header(true)
        .build(BufWriter::new(file));
    writer
        .write(batch)
        .map_err(|e| MergeError::BatchWrite(format!("{}: {}", path.display(), e)))?;
    let mut inner = writer.into_inner();
    inner
        .flush()
        .map_err(|e| MergeError::BatchWrite(format!("cannot flush {}: {}", path.display(), e)))?;
    Ok(())
}

/// Per-source provenance stamping: every row from a source receives that
/// source's tag in an extra text column appended after the unified columns.
#[derive(Debug, Clone)]
pub struct ProvenanceTags {
    pub column: String,
    pub by_path: AHashMap<PathBuf, String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub tags: Option<ProvenanceTags>,
}

/// All rows of all sources for one entity type, re-projected onto the
/// unified column layout. Columns a source lacks are null-filled; every
/// value is text.
#[derive(Debug)]
pub struct UnifiedTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    batch_source: Vec<usize>,
    sources: Vec<(PathBuf, u64)>,
    tag_index: Option<usize>,
}

impl UnifiedTable {
    /// Load every source into one logical table.
    ///
    /// Guarantee: the unified row count equals the sum of the source row
    /// counts. No row is dropped, none is duplicated.
    pub fn load(
        paths: &[PathBuf],
        unified: &UnifiedSchema,
        options: &LoadOptions,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(MergeError::Load("no source files to load".to_string()));
        }
        if unified.is_empty() {
            return Err(MergeError::Load(
                "unified schema has no columns left to load".to_string(),
            ));
        }

        let mut fields: Vec<Field> = unified
            .arrow_schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        let mut tag_index = None;
        if let Some(tags) = &options.tags {
            if unified.columns().contains(&tags.column) {
                return Err(MergeError::Load(format!(
                    "provenance column '{}' collides with a source column",
                    tags.column
                )));
            }
            tag_index = Some(fields.len());
            fields.push(Field::new(&tags.column, DataType::Utf8, true));
        }
        let schema: SchemaRef = Arc::new(Schema::new(fields));

        let mut batches = Vec::new();
        let mut batch_source = Vec::new();
        let mut sources = Vec::with_capacity(paths.len());

        for (source_idx, path) in paths.iter().enumerate() {
            let tag = match &options.tags {
                Some(tags) => Some(tags.by_path.get(path).cloned().ok_or_else(|| {
                    MergeError::Load(format!("no provenance tag for source {}", path.display()))
                })?),
                None => None,
            };

            let rows = load_source(
                path,
                unified,
                &schema,
                tag.as_deref(),
                &mut batches,
                &mut batch_source,
                source_idx,
            )?;
            info!(source = %path.display(), rows, "loaded source table");
            sources.push((path.clone(), rows));
        }

        let total: u64 = sources.iter().map(|(_, n)| *n).sum();
        info!(sources = sources.len(), rows = total, "unified table ready");

        Ok(UnifiedTable {
            schema,
            batches,
            batch_source,
            sources,
            tag_index,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Index of the stamped provenance column, when one was requested.
    pub fn tag_index(&self) -> Option<usize> {
        self.tag_index
    }

    /// Per-source row counts, in load order.
    pub fn sources(&self) -> &[(PathBuf, u64)] {
        &self.sources
    }

    /// Source file a batch was read from, for error context.
    pub(crate) fn batch_path(&self, batch_idx: usize) -> &Path {
        &self.sources[self.batch_source[batch_idx]].0
    }

    #[cfg(test)]
    pub(crate) fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let batch_source = vec![0; batches.len()];
        let rows = batches.iter().map(|b| b.num_rows() as u64).sum();
        UnifiedTable {
            schema,
            batches,
            batch_source,
            sources: vec![(PathBuf::from("<test>"), rows)],
            tag_index: None,
        }
    }
}

fn load_source(
    path: &Path,
    unified: &UnifiedSchema,
    table_schema: &SchemaRef,
    tag: Option<&str>,
    batches: &mut Vec<RecordBatch>,
    batch_source: &mut Vec<usize>,
    source_idx: usize,
) -> Result<u64> {
    let (source_columns, reader) = open_source_reader(path)?;
    let projection = unified.projection(&source_columns);

    let mut rows: u64 = 0;
    for batch in reader {
        let batch =
            batch.map_err(|e| MergeError::Load(format!("{}: {}", path.display(), e)))?;
        let n = batch.num_rows();
        if n == 0 {
            continue;
        }

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(table_schema.fields().len());
        for slot in &projection {
            match slot {
                Some(idx) => columns.push(batch.column(*idx).clone()),
                None => columns.push(new_null_array(&DataType::Utf8, n)),
            }
        }
        if let Some(tag) = tag {
            let stamped: StringArray = std::iter::repeat(Some(tag)).take(n).collect();
            columns.push(Arc::new(stamped) as ArrayRef);
        }

        let projected = RecordBatch::try_new(table_schema.clone(), columns)
            .map_err(|e| MergeError::Load(format!("{}: projection error: {}", path.display(), e)))?;
        batches.push(projected);
        batch_source.push(source_idx);
        rows += n as u64;
    }

    Ok(rows)
}
