use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tracing::warn;

use crate::graph::{
    props_of, EdgeType, FailedSource, GraphEdge, GraphFragment, GraphMeta, GraphNode,
    GraphStats, KnowledgeGraph, NodeType,
};

/// Merge per-document fragments into one knowledge graph. Fragment order is
/// the caller's contract: it decides which properties win on id collisions,
/// so it must be stable across runs.
pub fn merge(fragments: Vec<GraphFragment>) -> KnowledgeGraph {
    merge_with_failures(fragments, Vec::new())
}

/// Like [`merge`], recording documents that failed upstream. Failed sources
/// contribute nothing to the graph but stay visible in `meta.stats` so a
/// partial multi-document run is distinguishable from a complete one.
pub fn merge_with_failures(
    fragments: Vec<GraphFragment>,
    failed_sources: Vec<FailedSource>,
) -> KnowledgeGraph {
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    let mut edge_keys: HashSet<(String, String, EdgeType)> = HashSet::new();
    let mut parser: Option<String> = None;
    let mut outline_summary = Vec::new();

    for frag in fragments {
        for node in frag.nodes {
            match index.get(&node.id) {
                Some(&i) => merge_properties(&mut nodes[i], node.properties),
                None => {
                    index.insert(node.id.clone(), nodes.len());
                    nodes.push(node);
                }
            }
        }
        for edge in frag.edges {
            let key = (edge.from.clone(), edge.to.clone(), edge.edge_type);
            if edge_keys.insert(key) {
                edges.push(edge);
            }
        }
        if parser.is_none() && !frag.meta.parser.is_empty() {
            parser = Some(frag.meta.parser);
        }
        outline_summary.extend(frag.meta.outline_summary);
    }

    // Prerequisite targets are routinely parsed before (or without) their own
    // page; they become stub Course nodes so REQUIRES edges always resolve.
    let mut warnings = Vec::new();
    for edge in &edges {
        if edge.edge_type == EdgeType::Requires && !index.contains_key(&edge.to) {
            let course_id = edge.to.strip_prefix("course:").unwrap_or(&edge.to);
            index.insert(edge.to.clone(), nodes.len());
            nodes.push(GraphNode {
                id: edge.to.clone(),
                node_type: NodeType::Course,
                properties: props_of(json!({ "courseId": course_id, "stub": true })),
            });
        }
    }
    for edge in &edges {
        for endpoint in [&edge.from, &edge.to] {
            if !index.contains_key(endpoint.as_str()) {
                let msg = format!(
                    "edge {} -[{}]-> {} references missing node {}",
                    edge.from,
                    edge_wire_name(edge.edge_type),
                    edge.to,
                    endpoint
                );
                warn!("{msg}");
                warnings.push(msg);
            }
        }
    }

    let stats = GraphStats {
        node_count: nodes.len(),
        edge_count: edges.len(),
        failed_sources,
        warnings,
    };
    KnowledgeGraph {
        nodes,
        edges,
        meta: GraphMeta {
            parser,
            outline_summary,
            stats,
            generated_at: None,
        },
    }
}

fn merge_properties(existing: &mut GraphNode, incoming: serde_json::Map<String, Value>) {
    for (k, v) in incoming {
        if v.is_null() && existing.properties.contains_key(&k) {
            continue;
        }
        existing.properties.insert(k, v);
    }
}

fn edge_wire_name(t: EdgeType) -> &'static str {
    match t {
        EdgeType::HasSection => "HAS_SECTION",
        EdgeType::HasLevel => "HAS_LEVEL",
        EdgeType::Has => "HAS",
        EdgeType::Requires => "REQUIRES",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FragmentMeta;
    use serde_json::Map;

    fn node(id: &str, t: NodeType, props: Value) -> GraphNode {
        GraphNode {
            id: id.into(),
            node_type: t,
            properties: props_of(props),
        }
    }

    fn edge(from: &str, to: &str, t: EdgeType) -> GraphEdge {
        GraphEdge {
            from: from.into(),
            to: to.into(),
            edge_type: t,
            properties: Map::new(),
        }
    }

    fn frag(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>, parser: &str) -> GraphFragment {
        GraphFragment {
            nodes,
            edges,
            meta: FragmentMeta {
                parser: parser.into(),
                outline_summary: Vec::new(),
            },
        }
    }

    #[test]
    fn colliding_ids_union_their_properties() {
        let a = frag(
            vec![node("course:BSDA1001", NodeType::Course, json!({"title": "Stats"}))],
            vec![],
            "program-structure",
        );
        let b = frag(
            vec![node("course:BSDA1001", NodeType::Course, json!({"credits": 4}))],
            vec![],
            "single-course",
        );
        let g = merge(vec![a, b]);
        assert_eq!(g.nodes.len(), 1);
        assert_eq!(g.nodes[0].properties["title"], "Stats");
        assert_eq!(g.nodes[0].properties["credits"], 4);
        assert_eq!(g.meta.parser.as_deref(), Some("program-structure"));
    }

    #[test]
    fn null_never_overwrites() {
        let a = frag(
            vec![node("course:X", NodeType::Course, json!({"title": "Kept"}))],
            vec![],
            "",
        );
        let b = frag(
            vec![node("course:X", NodeType::Course, json!({"title": null, "extra": "new"}))],
            vec![],
            "",
        );
        let g = merge(vec![a, b]);
        assert_eq!(g.nodes[0].properties["title"], "Kept");
        assert_eq!(g.nodes[0].properties["extra"], "new");
    }

    #[test]
    fn later_non_null_overwrites() {
        let a = frag(vec![node("course:X", NodeType::Course, json!({"title": "Old"}))], vec![], "");
        let b = frag(vec![node("course:X", NodeType::Course, json!({"title": "New"}))], vec![], "");
        let g = merge(vec![a, b]);
        assert_eq!(g.nodes[0].properties["title"], "New");
    }

    #[test]
    fn edges_deduplicated_by_endpoints_and_type() {
        let a = frag(
            vec![
                node("p", NodeType::Program, json!({})),
                node("s", NodeType::Section, json!({})),
            ],
            vec![edge("p", "s", EdgeType::HasSection)],
            "",
        );
        let b = frag(vec![], vec![edge("p", "s", EdgeType::HasSection)], "");
        let g = merge(vec![a, b]);
        assert_eq!(g.edges.len(), 1);
    }

    #[test]
    fn requires_targets_get_stub_nodes() {
        let a = frag(
            vec![node("course:BSCS2004", NodeType::Course, json!({}))],
            vec![edge("course:BSCS2004", "course:BSMA1001", EdgeType::Requires)],
            "single-course",
        );
        let g = merge(vec![a]);
        let stub = g.nodes.iter().find(|n| n.id == "course:BSMA1001").unwrap();
        assert_eq!(stub.node_type, NodeType::Course);
        assert_eq!(stub.properties["courseId"], "BSMA1001");
        assert_eq!(stub.properties["stub"], true);
        assert!(g.meta.stats.warnings.is_empty());
    }

    #[test]
    fn stub_reconciles_with_the_real_node_when_it_arrives() {
        let program = frag(
            vec![node("course:BSCS2004", NodeType::Course, json!({}))],
            vec![edge("course:BSCS2004", "course:BSMA1001", EdgeType::Requires)],
            "",
        );
        let course_page = frag(
            vec![node(
                "course:BSMA1001",
                NodeType::Course,
                json!({"title": "Mathematics I"}),
            )],
            vec![],
            "",
        );
        let g = merge(vec![program, course_page]);
        let n = g.nodes.iter().find(|n| n.id == "course:BSMA1001").unwrap();
        // Real node was present before the stub pass ran; no stub marker.
        assert_eq!(n.properties["title"], "Mathematics I");
        assert!(n.properties.get("stub").is_none());
        assert_eq!(
            g.nodes.iter().filter(|n| n.id == "course:BSMA1001").count(),
            1
        );
    }

    #[test]
    fn dangling_non_requires_edge_warns_but_is_kept() {
        let a = frag(
            vec![node("p", NodeType::Program, json!({}))],
            vec![edge("p", "section:ghost", EdgeType::HasSection)],
            "",
        );
        let g = merge(vec![a]);
        assert_eq!(g.edges.len(), 1);
        assert_eq!(g.meta.stats.warnings.len(), 1);
        assert!(g.meta.stats.warnings[0].contains("section:ghost"));
    }

    #[test]
    fn failed_sources_recorded() {
        let g = merge_with_failures(
            vec![],
            vec![FailedSource {
                source: "broken.html".into(),
                error: "document is empty".into(),
            }],
        );
        assert_eq!(g.meta.stats.failed_sources.len(), 1);
        assert_eq!(g.meta.stats.node_count, 0);
    }

    #[test]
    fn merge_is_idempotent() {
        let a = frag(
            vec![
                node("p", NodeType::Program, json!({"name": "BS"})),
                node("course:BSCS2004", NodeType::Course, json!({})),
            ],
            vec![edge("course:BSCS2004", "course:BSMA1001", EdgeType::Requires)],
            "program-structure",
        );
        let once = merge(vec![a]);
        let twice = merge(vec![once.clone().into_fragment()]);
        assert_eq!(once.nodes, twice.nodes);
        assert_eq!(once.edges, twice.edges);
    }

    #[test]
    fn stats_count_merged_graph() {
        let a = frag(
            vec![
                node("p", NodeType::Program, json!({})),
                node("s", NodeType::Section, json!({})),
            ],
            vec![edge("p", "s", EdgeType::HasSection)],
            "",
        );
        let g = merge(vec![a]);
        assert_eq!(g.meta.stats.node_count, 2);
        assert_eq!(g.meta.stats.edge_count, 1);
    }
}
