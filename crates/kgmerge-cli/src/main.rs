use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

use kgmerge::{
    DEFAULT_EDGES_BATCH_SIZE, DEFAULT_NODES_BATCH_SIZE, EdgeMergeOptions, MergeReport,
    NodeMergeOptions, check_edge_endpoints, collect_all_paths, collect_transform_paths,
    discover_priority_sources, merge_edge_files, merge_edge_pair, merge_node_files,
    merge_node_pair, write_missing_ids,
};

#[derive(Parser)]
#[command(
    name = "kgmerge",
    about = "kgmerge — merge knowledge-graph TSV exports into one deduplicated graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge every selected sub-graph into one node table and one edge table
    Merge {
        /// Directory containing the per-transform TSV exports
        #[arg(long, default_value = "data/raw")]
        data_dir: PathBuf,
        /// Restrict the merge to these transform directories (repeatable)
        #[arg(long = "subset-transform")]
        subset_transforms: Vec<String>,
        /// Subdirectory of the output directory to write into
        #[arg(long, default_value = "merged-kg")]
        merge_label: String,
        #[arg(long, default_value = "data/merged")]
        out_dir: PathBuf,
        /// Source tags authoritative for node names (repeatable); discovered
        /// from ontology transforms when omitted
        #[arg(long = "priority-source")]
        priority_sources: Vec<String>,
        /// Distinct node ids merged per output window
        #[arg(long, default_value_t = DEFAULT_NODES_BATCH_SIZE)]
        nodes_batch_size: usize,
        /// Distinct edge triples merged per output window
        #[arg(long, default_value_t = DEFAULT_EDGES_BATCH_SIZE)]
        edges_batch_size: usize,
    },
    /// Overlay a subset graph onto a base graph, reporting displaced rows
    MergePair {
        #[arg(long)]
        base_nodes: PathBuf,
        #[arg(long)]
        subset_nodes: PathBuf,
        #[arg(long)]
        base_edges: PathBuf,
        #[arg(long)]
        subset_edges: PathBuf,
        #[arg(long, default_value = "data/merged")]
        out_dir: PathBuf,
    },
    /// Verify that every edge endpoint exists as a node id
    Check {
        /// Merged nodes TSV file
        #[arg(long, default_value = "data/merged/merged-kg/nodes.tsv")]
        nodes: PathBuf,
        /// Merged edges TSV file
        #[arg(long, default_value = "data/merged/merged-kg/edges.tsv")]
        edges: PathBuf,
        /// Report file for identifiers missing from the node table
        #[arg(long, default_value = "missing_nodes.tsv")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            data_dir,
            subset_transforms,
            merge_label,
            out_dir,
            priority_sources,
            nodes_batch_size,
            edges_batch_size,
        } => cmd_merge(
            &data_dir,
            &subset_transforms,
            &merge_label,
            &out_dir,
            priority_sources,
            nodes_batch_size,
            edges_batch_size,
        ),
        Commands::MergePair {
            base_nodes,
            subset_nodes,
            base_edges,
            subset_edges,
            out_dir,
        } => cmd_merge_pair(&base_nodes, &subset_nodes, &base_edges, &subset_edges, &out_dir),
        Commands::Check { nodes, edges, out } => cmd_check(&nodes, &edges, &out),
    }?;

    Ok(())
}

#[instrument(skip_all, fields(data_dir = %data_dir.display(), label = merge_label))]
#[allow(clippy::too_many_arguments)]
fn cmd_merge(
    data_dir: &Path,
    subset_transforms: &[String],
    merge_label: &str,
    out_dir: &Path,
    priority_sources: Vec<String>,
    nodes_batch_size: usize,
    edges_batch_size: usize,
) -> Result<()> {
    let paths = if subset_transforms.is_empty() {
        collect_all_paths(data_dir)?
    } else {
        collect_transform_paths(data_dir, subset_transforms)?
    };
    if paths.nodes.is_empty() {
        return Err(eyre!("no node tables found under {}", data_dir.display()));
    }
    if paths.edges.is_empty() {
        return Err(eyre!("no edge tables found under {}", data_dir.display()));
    }

    let priority_sources = if priority_sources.is_empty() {
        discover_priority_sources(&paths.nodes)?
    } else {
        priority_sources
    };
    info!(
        nodes = paths.nodes.len(),
        edges = paths.edges.len(),
        priority = priority_sources.len(),
        "merge inputs collected"
    );

    let merge_dir = out_dir.join(merge_label);
    std::fs::create_dir_all(&merge_dir)
        .wrap_err_with(|| format!("cannot create output directory {}", merge_dir.display()))?;
    let nodes_out = merge_dir.join("nodes.tsv");
    let edges_out = merge_dir.join("edges.tsv");

    let node_options = NodeMergeOptions {
        priority_sources,
        batch_size: nodes_batch_size,
    };
    let nodes = merge_node_files(&paths.nodes, &nodes_out, &node_options)?;
    println!(
        "Merged {} node rows into {} ({})",
        nodes.unified_rows,
        nodes.output_rows,
        nodes_out.display()
    );

    let edge_options = EdgeMergeOptions {
        batch_size: edges_batch_size,
    };
    let edges = merge_edge_files(&paths.edges, &edges_out, &edge_options)?;
    println!(
        "Merged {} edge rows into {} ({})",
        edges.unified_rows,
        edges.output_rows,
        edges_out.display()
    );

    let report = MergeReport { nodes, edges };
    let report_path = merge_dir.join("merge_stats.json");
    report.write_atomic(&report_path)?;
    println!("Wrote merge report to {}", report_path.display());

    Ok(())
}

#[instrument(skip_all, fields(out_dir = %out_dir.display()))]
fn cmd_merge_pair(
    base_nodes: &Path,
    subset_nodes: &Path,
    base_edges: &Path,
    subset_edges: &Path,
    out_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .wrap_err_with(|| format!("cannot create output directory {}", out_dir.display()))?;

    let nodes = merge_node_pair(
        base_nodes,
        subset_nodes,
        &out_dir.join("merged_kg_nodes.tsv"),
        &out_dir.join("duplicate_kg_nodes.tsv"),
    )?;
    println!(
        "Nodes: kept {} rows, displaced {}",
        nodes.merged_rows, nodes.duplicate_rows
    );

    let edges = merge_edge_pair(
        base_edges,
        subset_edges,
        &out_dir.join("merged_kg_edges.tsv"),
        &out_dir.join("duplicate_kg_edges.tsv"),
    )?;
    println!(
        "Edges: kept {} rows, displaced {}",
        edges.merged_rows, edges.duplicate_rows
    );

    Ok(())
}

#[instrument(skip_all, fields(nodes = %nodes.display(), edges = %edges.display()))]
fn cmd_check(nodes: &Path, edges: &Path, out: &Path) -> Result<()> {
    let check = check_edge_endpoints(nodes, edges)?;
    write_missing_ids(&check, out)?;

    if check.is_complete() {
        println!(
            "All edge endpoints of {} edge rows are present among {} nodes",
            check.edge_rows, check.node_rows
        );
    } else {
        println!(
            "{} endpoint identifier(s) missing from the node table; see {}",
            check.missing.len(),
            out.display()
        );
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
