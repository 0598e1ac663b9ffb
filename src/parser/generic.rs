use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::json;

use crate::content::{extract_records, extract_tables, section_region};
use crate::graph::{props_of, FragmentBuilder, FragmentMeta, GraphFragment, NodeType};
use crate::outline::{build_outline, iter_outline};
use crate::text::text_of;

use super::{element_by_id, outline_summary, register_outline, section_id_for, ParserKind};

pub const DOC_ROOT_ID: &str = "doc:ROOT";

static DOC_TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

/// Structural fallback for documents that match neither specialized shape:
/// the outline tree is mirrored one-to-one as Section nodes under a Document
/// root, with no level or category classification.
pub fn parse_generic(doc: &Html, source: Option<&str>) -> GraphFragment {
    let roots = build_outline(doc);
    let mut builder = FragmentBuilder::new();

    let mut title = doc
        .select(&DOC_TITLE_SEL)
        .next()
        .map(text_of)
        .unwrap_or_default();
    if title.is_empty() {
        title = "Document".to_string();
    }
    let mut props = props_of(json!({ "title": title }));
    if let Some(path) = source {
        props.insert("source".to_string(), json!(path));
    }
    builder.ensure_node(DOC_ROOT_ID, NodeType::Document, props);

    for root in &roots {
        register_outline(root, DOC_ROOT_ID, &mut builder);
    }

    // Content is only reattachable through an in-page anchor; sections
    // without one stay structural.
    let mut flat = Vec::new();
    iter_outline(&roots, &mut flat);
    for node in flat {
        let Some(anchor) = &node.anchor_id else { continue };
        let Some(start) = element_by_id(doc, anchor) else { continue };
        let region = section_region(start);
        let mut props = serde_json::Map::new();
        let tables = extract_tables(&region);
        if !tables.is_empty() {
            props.insert("tables".to_string(), json!(tables));
        }
        let records = extract_records(&region);
        if !records.is_empty() {
            props.insert("content".to_string(), json!(records));
        }
        if !props.is_empty() {
            builder.ensure_node(&section_id_for(node), NodeType::Section, props);
        }
    }

    builder.build(FragmentMeta {
        parser: ParserKind::Generic.to_string(),
        outline_summary: outline_summary(&roots),
    })
}
