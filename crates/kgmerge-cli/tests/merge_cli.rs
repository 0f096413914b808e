use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn run_kgmerge(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new(env!("CARGO_BIN_EXE_kgmerge"))
        .current_dir(cwd)
        .args(args)
        .output()
        .unwrap();
    if !output.status.success() {
        panic!(
            "kgmerge command failed\nargs: {:?}\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
            args,
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
    String::from_utf8(output.stdout).unwrap()
}

fn seed_raw_data(root: &Path) {
    let raw = root.join("data/raw");
    write_file(
        &raw.join("ontologies/chebi_nodes.tsv"),
        "id\tname\tprovided_by\nCHEBI:1\tWater\tchebi.json\nSHARED:1\tGoodName\tchebi.json\n",
    );
    write_file(
        &raw.join("ontologies/chebi_edges.tsv"),
        "subject\tpredicate\tobject\tprimary_knowledge_source\n\
         SHARED:1\trelated_to\tCHEBI:1\tchebi\n",
    );
    write_file(
        &raw.join("traits/traits_nodes.tsv"),
        "id\tname\tprovided_by\nSHARED:1\tABadName\ttraits.json\nT:1\tTrait\ttraits.json\n",
    );
    write_file(
        &raw.join("traits/traits_edges.tsv"),
        "subject\tpredicate\tobject\tprimary_knowledge_source\n\
         SHARED:1\trelated_to\tCHEBI:1\ttraits\n\
         T:1\trelated_to\tCHEBI:1\ttraits\n",
    );
}

#[test]
fn merge_discovers_priority_and_writes_outputs() {
    let dir = TempDir::new().unwrap();
    seed_raw_data(dir.path());

    let stdout = run_kgmerge(dir.path(), &["merge"]);
    assert!(stdout.contains("Merged 4 node rows into 3"));
    assert!(stdout.contains("Merged 3 edge rows into 2"));

    let nodes = std::fs::read_to_string(dir.path().join("data/merged/merged-kg/nodes.tsv")).unwrap();
    // chebi.json is discovered from the ontologies transform, so the shared
    // node keeps the ontology name even though the other name sorts first.
    let shared_row: Vec<&str> = nodes
        .lines()
        .find(|l| l.starts_with("SHARED:1"))
        .unwrap()
        .split('\t')
        .collect();
    assert_eq!(shared_row, ["SHARED:1", "GoodName", "chebi.json|traits.json"]);

    let edges = std::fs::read_to_string(dir.path().join("data/merged/merged-kg/edges.tsv")).unwrap();
    assert!(edges.lines().any(|l| l == "SHARED:1\trelated_to\tCHEBI:1\tchebi|traits"));

    let report = std::fs::read_to_string(dir.path().join("data/merged/merged-kg/merge_stats.json"))
        .unwrap();
    assert!(report.contains("\"unified_rows\": 4"));
}

#[test]
fn check_reports_missing_endpoints() {
    let dir = TempDir::new().unwrap();
    write_file(
        &dir.path().join("nodes.tsv"),
        "id\tname\nA\ta\nB\tb\n",
    );
    write_file(
        &dir.path().join("edges.tsv"),
        "subject\tpredicate\tobject\nA\trel\tB\nA\trel\tMISSING:9\n",
    );

    let stdout = run_kgmerge(
        dir.path(),
        &[
            "check",
            "--nodes",
            "nodes.tsv",
            "--edges",
            "edges.tsv",
            "--out",
            "missing.tsv",
        ],
    );
    assert!(stdout.contains("1 endpoint identifier(s) missing"));

    let missing = std::fs::read_to_string(dir.path().join("missing.tsv")).unwrap();
    assert_eq!(missing.lines().collect::<Vec<_>>(), ["id", "MISSING:9"]);
}

#[test]
fn merge_pair_routes_displaced_rows() {
    let dir = TempDir::new().unwrap();
    write_file(
        &dir.path().join("base_nodes.tsv"),
        "id\tname\nX\tBaseName\n",
    );
    write_file(
        &dir.path().join("subset_nodes.tsv"),
        "id\tname\nX\tSubsetName\nY\tOnlySubset\n",
    );
    write_file(
        &dir.path().join("base_edges.tsv"),
        "subject\tpredicate\tobject\nX\trel\tY\n",
    );
    write_file(
        &dir.path().join("subset_edges.tsv"),
        "subject\tpredicate\tobject\nX\trel\tY\n",
    );

    let stdout = run_kgmerge(
        dir.path(),
        &[
            "merge-pair",
            "--base-nodes",
            "base_nodes.tsv",
            "--subset-nodes",
            "subset_nodes.tsv",
            "--base-edges",
            "base_edges.tsv",
            "--subset-edges",
            "subset_edges.tsv",
            "--out-dir",
            "out",
        ],
    );
    assert!(stdout.contains("Nodes: kept 2 rows, displaced 1"));
    assert!(stdout.contains("Edges: kept 1 rows, displaced 1"));

    let merged = std::fs::read_to_string(dir.path().join("out/merged_kg_nodes.tsv")).unwrap();
    assert!(merged.lines().any(|l| l == "X\tBaseName"));
    let duplicates =
        std::fs::read_to_string(dir.path().join("out/duplicate_kg_nodes.tsv")).unwrap();
    assert!(duplicates.lines().any(|l| l == "X\tSubsetName"));
}
