use std::sync::Arc;

use ahash::AHashSet;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tracing::warn;

use crate::error::{MergeError, Result};

/// How one output column is produced from a group of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPolicy {
    /// Grouping key: equal across the group, copied from the first row.
    PassThrough,
    /// Conflicting values resolved in favor of rows whose source tag is in
    /// the Priority List; lexicographically smallest non-null value wins
    /// within the chosen tier.
    PriorityResolve,
    /// Distinct non-null values, sorted lexicographically, joined with `|`.
    DistinctJoin,
}

#[derive(Debug, Clone)]
pub struct OutputColumn {
    pub name: String,
    /// Column index in the unified table.
    pub source_index: usize,
    pub policy: ColumnPolicy,
}

/// Per-merge aggregation plan: the column-policy table, built once from the
/// unified schema and applied uniformly to every group.
#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub key_indices: Vec<usize>,
    pub output: Vec<OutputColumn>,
    /// Unified-table column consulted for Priority List membership.
    pub tag_index: Option<usize>,
    pub priority: AHashSet<String>,
    output_schema: SchemaRef,
}

impl AggregationPlan {
    /// Build the plan against a unified table schema.
    ///
    /// Output layout is the key columns first, then the remaining columns in
    /// name order. `internal` columns (e.g. a stamped provenance column) are
    /// kept out of the output entirely.
    pub fn new(
        table_schema: &SchemaRef,
        key_columns: &[&str],
        preferred_column: Option<&str>,
        tag_column: Option<&str>,
        priority: &[String],
        internal: &[&str],
    ) -> Result<Self> {
        let mut key_indices = Vec::with_capacity(key_columns.len());
        for key in key_columns {
            let idx = table_schema.index_of(key).map_err(|_| {
                MergeError::Aggregation(format!("grouping key column '{}' is missing", key))
            })?;
            key_indices.push(idx);
        }

        let preferred_index = match preferred_column {
            Some(name) => Some(table_schema.index_of(name).map_err(|_| {
                MergeError::Aggregation(format!(
                    "preferred-value column '{}' is missing from the unified schema",
                    name
                ))
            })?),
            None => None,
        };

        let tag_index = match tag_column {
            Some(name) => match table_schema.index_of(name) {
                Ok(idx) => Some(idx),
                Err(_) => {
                    if !priority.is_empty() {
                        warn!(
                            column = name,
                            "tag column missing; no row will be treated as prioritized"
                        );
                    }
                    None
                }
            },
            None => None,
        };

        let mut output = Vec::with_capacity(table_schema.fields().len());
        for (&idx, &name) in key_indices.iter().zip(key_columns) {
            output.push(OutputColumn {
                name: name.to_string(),
                source_index: idx,
                policy: ColumnPolicy::PassThrough,
            });
        }

        let mut rest: Vec<(String, usize)> = table_schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(idx, field)| {
                !key_indices.contains(idx) && !internal.contains(&field.name().as_str())
            })
            .map(|(idx, field)| (field.name().clone(), idx))
            .collect();
        rest.sort();
        for (name, idx) in rest {
            let policy = if preferred_index == Some(idx) {
                ColumnPolicy::PriorityResolve
            } else {
                ColumnPolicy::DistinctJoin
            };
            output.push(OutputColumn {
                name,
                source_index: idx,
                policy,
            });
        }

        let fields: Vec<Field> = output
            .iter()
            .map(|c| Field::new(&c.name, DataType::Utf8, true))
            .collect();
        let output_schema = Arc::new(Schema::new(fields));

        Ok(AggregationPlan {
            key_indices,
            output,
            tag_index,
            priority: priority.iter().cloned().collect(),
            output_schema,
        })
    }

    pub fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }
}
