pub mod course;
pub mod generic;
pub mod program;

use std::fmt;

use scraper::Html;

use crate::error::ParseError;
use crate::graph::GraphFragment;

/// The three document shapes this pipeline understands. Selection happens at
/// the routing layer from the URL/path shape; each variant maps to one parser
/// entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// Program overview page: levels, sections, course listings.
    Program,
    /// Individual course detail page.
    Course,
    /// Anything else: structural outline parse, no domain classification.
    Generic,
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParserKind::Program => "program-structure",
            ParserKind::Course => "single-course",
            ParserKind::Generic => "generic-outline",
        })
    }
}

/// Pick a parser from a URL or file path. Program overview pages carry
/// "academics" in their path, course pages live under a course_pages
/// directory or are named by their course code; everything else gets the
/// generic structural parse.
pub fn detect_parser(url_or_path: &str) -> ParserKind {
    let p = url_or_path.to_lowercase().replace('\\', "/");
    if p.contains("academics") {
        return ParserKind::Program;
    }
    if p.contains("course_pages/") || p.contains("course-pages/") {
        return ParserKind::Course;
    }
    let stem = p
        .rsplit('/')
        .next()
        .unwrap_or(&p)
        .trim_end_matches(".html")
        .trim_end_matches(".htm");
    if crate::courses::validate_code(stem).is_some() {
        return ParserKind::Course;
    }
    ParserKind::Generic
}

/// Parse one already-fetched document into a graph fragment. A failure here
/// concerns this document only; sibling documents in a multi-document run are
/// unaffected.
pub fn parse_document(
    html: &str,
    kind: ParserKind,
    source: Option<&str>,
    base_url: Option<&str>,
) -> Result<GraphFragment, ParseError> {
    let doc = parse_html(html)?;
    Ok(match kind {
        ParserKind::Program => program::parse_program(&doc, base_url),
        ParserKind::Course => course::parse_course(&doc, source),
        ParserKind::Generic => generic::parse_generic(&doc, source),
    })
}

/// Stable node id for an outline position: slug of the title, falling back to
/// the in-page anchor for untitleable headings.
pub(crate) fn section_id_for(node: &crate::outline::OutlineNode) -> String {
    let slug = crate::text::slugify(&node.title);
    let tail = if !slug.is_empty() {
        slug
    } else {
        node.anchor_id.clone().unwrap_or_else(|| "untitled".to_string())
    };
    format!("section:{tail}")
}

/// Register an outline subtree as Section nodes with hierarchical
/// HAS_SECTION edges mirroring the tree.
pub(crate) fn register_outline(
    node: &crate::outline::OutlineNode,
    parent_id: &str,
    builder: &mut crate::graph::FragmentBuilder,
) {
    use crate::graph::{props_of, EdgeType, NodeType};
    use serde_json::json;

    let sec_id = section_id_for(node);
    let mut props = props_of(json!({
        "title": node.title,
        "level": node.heading_level,
        "childCount": node.child_count(),
        "depth": node.depth,
        "isParent": node.child_count() > 0,
    }));
    if let Some(anchor) = &node.anchor_id {
        props.insert("anchorId".to_string(), json!(anchor));
    }
    builder.ensure_node(&sec_id, NodeType::Section, props);
    builder.add_edge(
        parent_id,
        &sec_id,
        EdgeType::HasSection,
        props_of(json!({ "hierarchical": true })),
    );
    for child in &node.children {
        register_outline(child, &sec_id, builder);
    }
}

/// Each parent section with its immediate children, for `meta.outlineSummary`.
pub(crate) fn outline_summary(
    roots: &[crate::outline::OutlineNode],
) -> Vec<crate::graph::OutlineSummaryEntry> {
    use crate::graph::{OutlineRef, OutlineSummaryEntry};

    fn pack(n: &crate::outline::OutlineNode) -> OutlineRef {
        OutlineRef {
            title: n.title.clone(),
            level: n.heading_level,
            anchor_id: n.anchor_id.clone(),
            section_id: section_id_for(n),
        }
    }

    let mut flat = Vec::new();
    crate::outline::iter_outline(roots, &mut flat);
    flat.iter()
        .filter(|n| n.child_count() > 0)
        .map(|p| OutlineSummaryEntry {
            parent: pack(p),
            children: p.children.iter().map(pack).collect(),
        })
        .collect()
}

pub(crate) fn element_by_id<'a>(doc: &'a Html, id: &str) -> Option<scraper::ElementRef<'a>> {
    doc.root_element()
        .descendants()
        .filter_map(scraper::ElementRef::wrap)
        .find(|el| el.value().attr("id") == Some(id))
}

/// Attach table data to outline sections that expose an in-page anchor; the
/// anchor is the only reliable way back from an outline position to its DOM
/// region.
pub(crate) fn attach_anchor_tables(
    doc: &Html,
    roots: &[crate::outline::OutlineNode],
    builder: &mut crate::graph::FragmentBuilder,
) {
    use crate::content::{extract_tables, section_region};
    use crate::graph::{props_of, NodeType};
    use serde_json::json;

    let mut flat = Vec::new();
    crate::outline::iter_outline(roots, &mut flat);
    for node in flat {
        let Some(anchor) = &node.anchor_id else { continue };
        let Some(start) = element_by_id(doc, anchor) else { continue };
        let tables = extract_tables(&section_region(start));
        if !tables.is_empty() {
            builder.ensure_node(
                &section_id_for(node),
                NodeType::Section,
                props_of(json!({ "tables": tables })),
            );
        }
    }
}

fn parse_html(html: &str) -> Result<Html, ParseError> {
    let trimmed = html.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    if !trimmed.contains('<') {
        return Err(ParseError::NotHtml);
    }
    Ok(Html::parse_document(html))
}
