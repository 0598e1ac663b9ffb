use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of entity kinds exported by the parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Program,
    Level,
    Section,
    Course,
    Collection,
    Document,
}

/// Closed set of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    #[serde(rename = "HAS_SECTION")]
    HasSection,
    #[serde(rename = "HAS_LEVEL")]
    HasLevel,
    #[serde(rename = "HAS")]
    Has,
    #[serde(rename = "REQUIRES")]
    Requires,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub properties: Map<String, Value>,
}

/// One entry of the outline summary: a parent section and its direct children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSummaryEntry {
    pub parent: OutlineRef,
    pub children: Vec<OutlineRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineRef {
    pub title: String,
    pub level: u8,
    #[serde(rename = "anchorId", skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
    #[serde(rename = "sectionId")]
    pub section_id: String,
}

/// Per-document parse result, prior to merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFragment {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub meta: FragmentMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentMeta {
    pub parser: String,
    #[serde(rename = "outlineSummary", default, skip_serializing_if = "Vec::is_empty")]
    pub outline_summary: Vec<OutlineSummaryEntry>,
}

/// The merged, durable output handed to persistence and visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub meta: GraphMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser: Option<String>,
    #[serde(rename = "outlineSummary", default, skip_serializing_if = "Vec::is_empty")]
    pub outline_summary: Vec<OutlineSummaryEntry>,
    pub stats: GraphStats,
    /// Stamped by the output layer at write time, never by the parse core.
    #[serde(rename = "generatedAt", default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    #[serde(rename = "nodeCount")]
    pub node_count: usize,
    #[serde(rename = "edgeCount")]
    pub edge_count: usize,
    #[serde(rename = "failedSources", default, skip_serializing_if = "Vec::is_empty")]
    pub failed_sources: Vec<FailedSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSource {
    pub source: String,
    pub error: String,
}

/// Property map from a `json!({...})` literal.
pub fn props_of(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

impl KnowledgeGraph {
    /// View an already-merged graph as a fragment so it can be merged again.
    pub fn into_fragment(self) -> GraphFragment {
        GraphFragment {
            nodes: self.nodes,
            edges: self.edges,
            meta: FragmentMeta {
                parser: self.meta.parser.unwrap_or_default(),
                outline_summary: self.meta.outline_summary,
            },
        }
    }
}

/// Accumulates nodes and edges for one document. Nodes keep discovery order;
/// re-registering an id updates its properties instead of duplicating it.
pub struct FragmentBuilder {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
}

impl FragmentBuilder {
    pub fn new() -> Self {
        FragmentBuilder {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn ensure_node(
        &mut self,
        id: &str,
        node_type: NodeType,
        props: Map<String, Value>,
    ) -> String {
        match self.index.get(id) {
            Some(&i) => {
                let node = &mut self.nodes[i];
                for (k, v) in props {
                    node.properties.insert(k, v);
                }
            }
            None => {
                self.index.insert(id.to_string(), self.nodes.len());
                self.nodes.push(GraphNode {
                    id: id.to_string(),
                    node_type,
                    properties: props,
                });
            }
        }
        id.to_string()
    }

    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        edge_type: EdgeType,
        properties: Map<String, Value>,
    ) {
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            edge_type,
            properties,
        });
    }

    pub fn build(self, meta: FragmentMeta) -> GraphFragment {
        GraphFragment {
            nodes: self.nodes,
            edges: self.edges,
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn ensure_node_updates_instead_of_duplicating() {
        let mut b = FragmentBuilder::new();
        b.ensure_node("course:BSDA1001", NodeType::Course, props(&[("a", json!(1))]));
        b.ensure_node("course:BSDA1001", NodeType::Course, props(&[("b", json!(2))]));
        let frag = b.build(FragmentMeta::default());
        assert_eq!(frag.nodes.len(), 1);
        assert_eq!(frag.nodes[0].properties["a"], json!(1));
        assert_eq!(frag.nodes[0].properties["b"], json!(2));
    }

    #[test]
    fn edge_type_wire_names() {
        let e = GraphEdge {
            from: "a".into(),
            to: "b".into(),
            edge_type: EdgeType::HasSection,
            properties: Map::new(),
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "HAS_SECTION");
        assert_eq!(v["from"], "a");
        assert_eq!(v["to"], "b");
    }

    #[test]
    fn graph_round_trips_losslessly() {
        let g = KnowledgeGraph {
            nodes: vec![GraphNode {
                id: "program:IITM_BS".into(),
                node_type: NodeType::Program,
                properties: props(&[("name", json!("BS Program"))]),
            }],
            edges: vec![GraphEdge {
                from: "program:IITM_BS".into(),
                to: "level:foundation".into(),
                edge_type: EdgeType::HasLevel,
                properties: Map::new(),
            }],
            meta: GraphMeta {
                parser: Some("program-structure".into()),
                stats: GraphStats {
                    node_count: 1,
                    edge_count: 1,
                    ..Default::default()
                },
                ..Default::default()
            },
        };
        let text = serde_json::to_string_pretty(&g).unwrap();
        let back: KnowledgeGraph = serde_json::from_str(&text).unwrap();
        assert_eq!(back, g);
    }
}
