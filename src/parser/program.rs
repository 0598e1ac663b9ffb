use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html};
use serde_json::json;
use tracing::debug;

use crate::classify::{
    classify_level, fuzzy_find_sections, LevelDef, SECTION_MIN_SCORE, SECTION_TARGETS,
};
use crate::content::{
    extract_bullets, extract_labeled_fields, extract_paragraphs, section_region,
};
use crate::courses::extract_course_refs;
use crate::graph::{props_of, EdgeType, FragmentBuilder, FragmentMeta, GraphFragment, NodeType};
use crate::outline::{build_outline, heading_level_of};
use crate::text::{slugify, text_of};

use super::{attach_anchor_tables, outline_summary, register_outline, ParserKind};

pub const PROGRAM_ID: &str = "program:IITM_BS";
pub const PROGRAM_NAME: &str = "IIT Madras BS Degree Program";

/// Course-bearing elements discovered between two level boundaries,
/// attributed to the level that was current when they appeared. `None` means
/// "before the first level heading"; those attach directly under the program
/// root.
struct LevelBucket<'d> {
    level: Option<&'static LevelDef>,
    elements: Vec<ElementRef<'d>>,
}

/// Parse a program overview page: the full outline becomes Section nodes,
/// canonical sections get their extracted content, and course references are
/// grouped into per-level Collections.
pub fn parse_program(doc: &Html, base_url: Option<&str>) -> GraphFragment {
    let roots = build_outline(doc);
    let mut builder = FragmentBuilder::new();

    builder.ensure_node(
        PROGRAM_ID,
        NodeType::Program,
        props_of(json!({ "name": PROGRAM_NAME })),
    );

    for root in &roots {
        register_outline(root, PROGRAM_ID, &mut builder);
    }
    attach_anchor_tables(doc, &roots, &mut builder);

    // One pass over the document: every heading records the level that was
    // current when it appeared (its own classification takes effect after
    // it), and tables/anchors land in the current level's bucket. Each
    // bucket is resolved as one region, so the table-before-anchor priority
    // of the resolver applies per level.
    let mut heading_ctx = HashMap::new();
    let mut buckets: Vec<LevelBucket> = Vec::new();
    let mut current: Option<&'static LevelDef> = None;

    for node in doc.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else { continue };
        if heading_level_of(el).is_some() {
            heading_ctx.insert(node.id(), current);
            if let Some(def) = classify_level(&text_of(el)) {
                debug!(heading = %text_of(el), level = def.id, "level boundary");
                current = Some(def);
            }
            continue;
        }
        if matches!(el.value().name(), "table" | "a") {
            push_element(&mut buckets, current, el);
        }
    }

    // Canonical sections: extracted content attaches to the section node,
    // which hangs off the level in effect at its heading, or off the root.
    let mut levels_linked: HashSet<&'static str> = HashSet::new();
    for (label, header) in fuzzy_find_sections(doc, SECTION_TARGETS, SECTION_MIN_SCORE) {
        let region = section_region(header);
        let bullets = extract_bullets(&region);
        let paragraphs = extract_paragraphs(&region);
        let fields: serde_json::Map<String, serde_json::Value> = extract_labeled_fields(&region)
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();

        let sec_id = format!("section:{}", slugify(label));
        builder.ensure_node(
            &sec_id,
            NodeType::Section,
            props_of(json!({
                "title": label,
                "bullets": bullets,
                "paragraphs": paragraphs,
                "fields": fields,
            })),
        );
        let ctx = heading_ctx.get(&header.id()).copied().flatten();
        match ctx {
            Some(def) => {
                ensure_level(&mut builder, def, &mut levels_linked);
                builder.add_edge(def.id, &sec_id, EdgeType::HasSection, Default::default());
            }
            None => {
                builder.add_edge(PROGRAM_ID, &sec_id, EdgeType::HasSection, Default::default());
            }
        }
    }

    for bucket in &buckets {
        let refs = extract_course_refs(&bucket.elements, base_url);
        if refs.is_empty() {
            continue;
        }
        let list_id = match bucket.level {
            Some(def) => {
                ensure_level(&mut builder, def, &mut levels_linked);
                let list_id = format!("list:courses:{}", def.id);
                builder.ensure_node(
                    &list_id,
                    NodeType::Collection,
                    props_of(json!({ "title": format!("Courses - {}", def.title) })),
                );
                builder.add_edge(
                    def.id,
                    &list_id,
                    EdgeType::Has,
                    props_of(json!({ "what": "courses" })),
                );
                list_id
            }
            None => {
                let list_id = "list:courses".to_string();
                builder.ensure_node(
                    &list_id,
                    NodeType::Collection,
                    props_of(json!({ "title": "Courses" })),
                );
                builder.add_edge(
                    PROGRAM_ID,
                    &list_id,
                    EdgeType::Has,
                    props_of(json!({ "what": "courses" })),
                );
                list_id
            }
        };
        for r in &refs {
            let course_id = format!("course:{}", r.course_id);
            let mut props = props_of(json!({
                "courseId": r.course_id,
                "title": r.label,
            }));
            if let Some(href) = &r.href {
                props.insert("href".to_string(), json!(href));
            }
            builder.ensure_node(&course_id, NodeType::Course, props);
            builder.add_edge(
                &list_id,
                &course_id,
                EdgeType::Has,
                props_of(json!({ "what": "course" })),
            );
        }
    }

    builder.build(FragmentMeta {
        parser: ParserKind::Program.to_string(),
        outline_summary: outline_summary(&roots),
    })
}

fn ensure_level(
    builder: &mut FragmentBuilder,
    def: &'static LevelDef,
    linked: &mut HashSet<&'static str>,
) {
    builder.ensure_node(def.id, NodeType::Level, props_of(json!({ "title": def.title })));
    if linked.insert(def.id) {
        builder.add_edge(PROGRAM_ID, def.id, EdgeType::HasLevel, Default::default());
    }
}

fn push_element<'d>(
    buckets: &mut Vec<LevelBucket<'d>>,
    level: Option<&'static LevelDef>,
    el: ElementRef<'d>,
) {
    let key = level.map(|d| d.id);
    match buckets.iter_mut().find(|b| b.level.map(|d| d.id) == key) {
        Some(bucket) => bucket.elements.push(el),
        None => buckets.push(LevelBucket {
            level,
            elements: vec![el],
        }),
    }
}
