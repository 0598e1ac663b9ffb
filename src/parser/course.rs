use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::classify::{classify, fuzzy_find_sections};
use crate::content::{
    extract_bullets, extract_labeled_fields, extract_paragraphs, section_region, table_rows,
};
use crate::courses::{course_codes_in_text, course_id_from_text};
use crate::graph::{props_of, EdgeType, FragmentBuilder, FragmentMeta, GraphFragment, NodeType};
use crate::text::{normalize_whitespace, text_of};

use super::ParserKind;

/// Field labels a course page is probed for, in priority order.
const COURSE_FIELDS: &[&str] = &[
    "Title",
    "Course Title",
    "Course Code",
    "Credits",
    "Course Credits",
    "Course Type",
    "Duration",
    "Evaluation Method",
    "Assessment Method",
    "Prerequisites",
    "Pre-requisites",
    "Corequisites",
    "Co-requisites",
    "Description",
    "Syllabus",
    "Learning Outcomes",
    "Topics",
    "Assessment",
    "Grading Policy",
    "Instructors",
    "Level",
    "Term",
    "Course Duration",
    "Course Evaluation",
    "Course Assessment",
    "Course Structure",
    "Course Structure & Assessments",
    "Structure",
    "Structure & Assessments",
];

const COURSE_FIELD_MIN_SCORE: u8 = 65;

/// Class-based containers that carry course metadata as "Label: value" text.
const META_SELECTORS: &[&str] = &[
    "div.course-info",
    "div.course-meta",
    "div.course-details",
    "div.course-header",
    "div.course-summary",
    "div.course-overview",
    "section.course-info",
    "section.course-meta",
    "section.course-details",
];

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, .course-title").unwrap());
static DOC_TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static BRIEF_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.briefDetails").unwrap());
static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static HX_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3, h4").unwrap());
static BRIEF_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Course [A-Z][a-z]+:|Credits:|Type:|Pre-requisites:").unwrap());

/// Parse a course detail page into a single Course node whose `attributes`
/// property carries every recognized field section, plus REQUIRES edges to
/// any course codes named in the prerequisite text.
pub fn parse_course(doc: &Html, source: Option<&str>) -> GraphFragment {
    let mut title = doc.select(&TITLE_SEL).next().map(text_of).unwrap_or_default();
    if title.is_empty() {
        title = doc
            .select(&DOC_TITLE_SEL)
            .next()
            .map(text_of)
            .unwrap_or_default();
    }
    if title.is_empty() {
        if let Some(path) = source {
            let stem = path
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(path)
                .trim_end_matches(".html")
                .trim_end_matches(".htm");
            title = stem.replace('_', " ");
        }
    }

    let mut code = course_id_from_text(&title);
    if code.is_none() {
        code = code_from_field_sections(doc);
    }

    let mut attr: Map<String, Value> = Map::new();

    if let Some(brief) = doc.select(&BRIEF_SEL).next() {
        let fields = parse_brief_details(&text_of(brief));
        if !fields.is_empty() {
            attr.insert("Course Details".into(), json!({ "fields": fields }));
        }
    }

    for selector in META_SELECTORS {
        let sel = match Selector::parse(selector) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let Some(el) = doc.select(&sel).next() else { continue };
        let fields = colon_fields_from_lines(el);
        if !fields.is_empty() {
            attr.insert(meta_section_name(selector), json!({ "fields": fields }));
        }
    }

    for (label, header) in fuzzy_find_sections(doc, COURSE_FIELDS, COURSE_FIELD_MIN_SCORE) {
        let composite = section_composite(&section_region(header));
        if !composite.is_empty() {
            attr.insert(label.to_string(), Value::Object(composite));
        }
    }

    // Headings the canonical list missed still become attribute sections,
    // under their canonical name when one matches.
    for h in doc.select(&HX_SEL) {
        let label = text_of(h);
        if label.is_empty() {
            continue;
        }
        let key = classify(&label, COURSE_FIELDS, COURSE_FIELD_MIN_SCORE)
            .map(str::to_string)
            .unwrap_or(label);
        if attr.contains_key(&key) {
            continue;
        }
        let composite = section_composite(&section_region(h));
        if !composite.is_empty() {
            attr.insert(key, Value::Object(composite));
        }
    }

    let table_fields = two_column_table_fields(doc);
    if !table_fields.is_empty() {
        let details = attr
            .entry("Details".to_string())
            .or_insert_with(|| json!({ "fields": {} }));
        if let Some(fields) = details
            .as_object_mut()
            .and_then(|d| d.get_mut("fields"))
            .and_then(Value::as_object_mut)
        {
            for (k, v) in table_fields {
                fields.entry(k).or_insert(Value::String(v));
            }
        }
    }

    let course_id = code
        .or_else(|| course_id_from_text(&title))
        .unwrap_or_else(|| format!("COURSE:{:08X}", fnv1a32(&title)))
        .to_uppercase();
    let node_id = format!("course:{course_id}");
    debug!(course = %course_id, "parsed course page");

    let mut props = props_of(json!({
        "courseId": course_id,
        "title": title,
    }));
    if let Some(path) = source {
        props.insert("source".into(), json!(path));
    }
    props.insert("attributes".into(), Value::Object(attr.clone()));

    let mut builder = FragmentBuilder::new();
    builder.ensure_node(&node_id, NodeType::Course, props);

    for code in prerequisite_codes(&attr) {
        if code == course_id {
            continue;
        }
        builder.add_edge(
            &node_id,
            &format!("course:{code}"),
            EdgeType::Requires,
            Map::new(),
        );
    }

    builder.build(FragmentMeta {
        parser: ParserKind::Course.to_string(),
        outline_summary: Vec::new(),
    })
}

/// When the title carries no code, probe progressively fuzzier "Code"-like
/// sections and scan their labeled fields for one.
fn code_from_field_sections(doc: &Html) -> Option<String> {
    for (target, min_score) in [("Code", 80), ("Course Code", 75), ("ID", 70)] {
        for (_, header) in fuzzy_find_sections(doc, &[target], min_score) {
            for (k, v) in extract_labeled_fields(&section_region(header)) {
                if let Some(code) = course_id_from_text(&format!("{k} {v}")) {
                    return Some(code);
                }
            }
        }
    }
    None
}

/// Split a briefDetails text blob at field-marker boundaries and keep the
/// single-colon parts as label/value pairs. Markers are split points, not
/// captures, so a part runs from one marker to the next.
fn parse_brief_details(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    let mut starts: Vec<usize> = BRIEF_MARKER_RE.find_iter(text).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts.push(text.len());
    for pair in starts.windows(2) {
        let part = text[pair[0]..pair[1]].trim();
        if part.matches(':').count() != 1 {
            continue;
        }
        if let Some((key, value)) = part.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                fields.insert(key.to_string(), json!(value));
            }
        }
    }
    fields
}

/// "Label: value" pairs from an element whose text nodes each hold one line.
fn colon_fields_from_lines(el: ElementRef) -> Map<String, Value> {
    let mut fields = Map::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let line = normalize_whitespace(text);
        if line.matches(':').count() != 1 {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() && value.len() > 1 && !fields.contains_key(key) {
                fields.insert(key.to_string(), json!(value));
            }
        }
    }
    fields
}

/// "div.course-info" becomes "Course Info".
fn meta_section_name(selector: &str) -> String {
    let name = selector
        .trim_start_matches("div.")
        .trim_start_matches("section.");
    name.split('-')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn section_composite(region: &[ElementRef]) -> Map<String, Value> {
    let mut composite = Map::new();
    let fields = extract_labeled_fields(region);
    if !fields.is_empty() {
        let map: Map<String, Value> = fields.into_iter().map(|(k, v)| (k, json!(v))).collect();
        composite.insert("fields".into(), Value::Object(map));
    }
    let bullets = extract_bullets(region);
    if !bullets.is_empty() {
        composite.insert("bullets".into(), json!(bullets));
    }
    let paras = extract_paragraphs(region);
    if !paras.is_empty() {
        composite.insert("paragraphs".into(), json!(paras));
    }
    composite
}

/// Two-column table rows anywhere in the document, folded into one field map.
/// First occurrence of a key wins.
fn two_column_table_fields(doc: &Html) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for table in doc.select(&TABLE_SEL) {
        for row in table_rows(table) {
            if row.len() != 2 {
                continue;
            }
            let (k, v) = (&row[0], &row[1]);
            if !k.is_empty() && !v.is_empty() && !fields.iter().any(|(key, _)| key == k) {
                fields.push((k.clone(), v.clone()));
            }
        }
    }
    fields
}

/// Course codes named anywhere in the prerequisite sections: bullets, field
/// values, and paragraphs. Sorted and deduplicated.
fn prerequisite_codes(attr: &Map<String, Value>) -> Vec<String> {
    let mut texts: Vec<&str> = Vec::new();
    for key in ["Prerequisites", "Pre-requisites"] {
        let Some(composite) = attr.get(key).and_then(Value::as_object) else { continue };
        if let Some(bullets) = composite.get("bullets").and_then(Value::as_array) {
            texts.extend(bullets.iter().filter_map(Value::as_str));
        }
        if let Some(fields) = composite.get("fields").and_then(Value::as_object) {
            texts.extend(fields.values().filter_map(Value::as_str));
        }
        if let Some(paras) = composite.get("paragraphs").and_then(Value::as_array) {
            texts.extend(paras.iter().filter_map(Value::as_str));
        }
    }
    let codes: BTreeSet<String> = texts
        .iter()
        .flat_map(|t| course_codes_in_text(t))
        .collect();
    codes.into_iter().collect()
}

fn fnv1a32(s: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for b in s.as_bytes() {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
