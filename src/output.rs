use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use scraper::Html;

use crate::graph::KnowledgeGraph;
use crate::outline::{build_outline, iter_outline, OutlineNode};

/// Serialize the graph and write it to `output` (bare filenames land under
/// `out_dir`), or to stdout when no path was given. The generation timestamp
/// is stamped here, at the edge, so the parse and merge stages stay
/// byte-deterministic.
pub fn write_graph(
    graph: &mut KnowledgeGraph,
    output: Option<&Path>,
    out_dir: &Path,
    pretty: bool,
) -> anyhow::Result<()> {
    graph.meta.generated_at = Some(chrono::Utc::now().to_rfc3339());
    let text = if pretty {
        serde_json::to_string_pretty(graph)?
    } else {
        serde_json::to_string(graph)?
    };

    match output {
        Some(path) => {
            let path = resolve_output_path(path, out_dir);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(&path, &text).with_context(|| format!("writing {}", path.display()))?;
            println!("Knowledge graph saved to: {}", path.display());
            if let Some(parser) = &graph.meta.parser {
                println!("Parser used: {parser}");
            }
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// A bare filename (no directory component) is placed under `out_dir`;
/// anything with a path stays where the user pointed it.
fn resolve_output_path(path: &Path, out_dir: &Path) -> PathBuf {
    if path.is_absolute() || path.parent().is_some_and(|p| p != Path::new("")) {
        path.to_path_buf()
    } else {
        out_dir.join(path)
    }
}

pub fn read_graph(path: &Path) -> anyhow::Result<KnowledgeGraph> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Print the parent/children structure of a document, one parent per line.
pub fn print_outline_summary(html: &str) {
    let doc = Html::parse_document(html);
    let roots = build_outline(&doc);
    let mut flat: Vec<&OutlineNode> = Vec::new();
    iter_outline(&roots, &mut flat);

    for p in flat.into_iter().filter(|n| n.child_count() > 0) {
        let anchor = p
            .anchor_id
            .as_deref()
            .map(|a| format!(" #{a}"))
            .unwrap_or_default();
        println!(
            "Parent: {} (h{}, children={}){}",
            compact(&p.title),
            p.heading_level,
            p.child_count(),
            anchor
        );
        for c in &p.children {
            let canchor = c
                .anchor_id
                .as_deref()
                .map(|a| format!(" #{a}"))
                .unwrap_or_default();
            println!("  - Child: {} (h{}){}", compact(&c.title), c.heading_level, canchor);
        }
    }
}

pub fn print_stats(graph: &KnowledgeGraph) {
    let mut node_counts: BTreeMap<String, usize> = BTreeMap::new();
    for n in &graph.nodes {
        *node_counts.entry(format!("{:?}", n.node_type)).or_default() += 1;
    }
    let mut edge_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for e in &graph.edges {
        let name = match e.edge_type {
            crate::graph::EdgeType::HasSection => "HAS_SECTION",
            crate::graph::EdgeType::HasLevel => "HAS_LEVEL",
            crate::graph::EdgeType::Has => "HAS",
            crate::graph::EdgeType::Requires => "REQUIRES",
        };
        *edge_counts.entry(name).or_default() += 1;
    }

    println!("Nodes: {}", graph.nodes.len());
    for (t, n) in &node_counts {
        println!("  {:<12} {}", t, n);
    }
    println!("Edges: {}", graph.edges.len());
    for (t, n) in &edge_counts {
        println!("  {:<12} {}", t, n);
    }
    if !graph.meta.stats.failed_sources.is_empty() {
        println!("Failed sources: {}", graph.meta.stats.failed_sources.len());
        for f in &graph.meta.stats.failed_sources {
            println!("  {}: {}", f.source, f.error);
        }
    }
    if !graph.meta.stats.warnings.is_empty() {
        println!("Warnings: {}", graph.meta.stats.warnings.len());
        for w in &graph.meta.stats.warnings {
            println!("  {w}");
        }
    }
    if let Some(ts) = &graph.meta.generated_at {
        println!("Generated at: {ts}");
    }
}

fn compact(text: &str) -> String {
    const MAX: usize = 120;
    let t = text.trim();
    if t.chars().count() <= MAX {
        t.to_string()
    } else {
        let cut: String = t.chars().take(MAX - 1).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphMeta, GraphStats};

    fn empty_graph() -> KnowledgeGraph {
        KnowledgeGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            meta: GraphMeta {
                parser: Some("generic-outline".into()),
                outline_summary: Vec::new(),
                stats: GraphStats::default(),
                generated_at: None,
            },
        }
    }

    #[test]
    fn bare_filenames_land_in_out_dir() {
        assert_eq!(
            resolve_output_path(Path::new("kg.json"), Path::new("output")),
            PathBuf::from("output/kg.json")
        );
        assert_eq!(
            resolve_output_path(Path::new("custom/kg.json"), Path::new("output")),
            PathBuf::from("custom/kg.json")
        );
    }

    #[test]
    fn write_stamps_generated_at_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kg.json");
        let mut g = empty_graph();
        write_graph(&mut g, Some(&path), dir.path(), true).unwrap();
        assert!(g.meta.generated_at.is_some());

        let back = read_graph(&path).unwrap();
        assert_eq!(back.meta.generated_at, g.meta.generated_at);
        assert_eq!(back.meta.parser.as_deref(), Some("generic-outline"));
    }

    #[test]
    fn nested_output_directories_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/kg.json");
        let mut g = empty_graph();
        write_graph(&mut g, Some(&path), dir.path(), false).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn long_titles_truncated() {
        let long = "x".repeat(200);
        let c = compact(&long);
        assert_eq!(c.chars().count(), 120);
        assert!(c.ends_with('…'));
    }
}
