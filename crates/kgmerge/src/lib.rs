pub mod check;
pub mod error;
pub mod merge;
pub mod paths;
pub mod provenance;
pub mod report;
pub mod schema;
pub mod table;

pub use check::{EndpointCheck, check_edge_endpoints, write_missing_ids};
pub use error::{MergeError, Result};
pub use merge::{
    DEFAULT_EDGES_BATCH_SIZE, DEFAULT_NODES_BATCH_SIZE, EdgeMergeOptions, NodeMergeOptions,
    merge_edge_files, merge_edge_pair, merge_node_files, merge_node_pair,
};
pub use paths::{KgPaths, collect_all_paths, collect_transform_paths};
pub use provenance::discover_priority_sources;
pub use report::{MergeReport, SourceCount, TableStats};
pub use schema::UnifiedSchema;
pub use table::{LoadOptions, ProvenanceTags, UnifiedTable};
