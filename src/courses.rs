use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

use crate::text::text_of;

static CODE_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,4}\s?-?\d{3,4}\b").unwrap());
static CODE_IN_TEXT_CI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[A-Z]{2,4}\s?-?\d{3,4}\b").unwrap());
static HREF_ID_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&#]id=([A-Za-z0-9_-]+)").unwrap());
static HREF_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([A-Za-z]{2,4}\d{3,4})(?:\.|/|$)").unwrap());
static HREF_ANYWHERE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]{2,4}\d{3,4})").unwrap());
static CODE_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,4}\d{3,4}$").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());

/// A resolved course mention: validated identifier, display label, and the
/// (absolutized) link it came from, when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRef {
    #[serde(rename = "courseId")]
    pub course_id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Normalize a candidate and accept it only if it has the institutional
/// course-code shape (2-4 letter prefix, 3-4 digit suffix). Anything else is
/// discarded, never guessed at.
pub fn validate_code(raw: &str) -> Option<String> {
    let code: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();
    CODE_SHAPE_RE.is_match(&code).then_some(code)
}

/// Course code embedded in visible text, e.g. "BSMA1001" or "CS - 2001".
pub fn course_id_from_text(text: &str) -> Option<String> {
    CODE_IN_TEXT_RE
        .find(text)
        .and_then(|m| validate_code(m.as_str()))
}

/// Course code derived from a link target, trying in order: an `id=` query
/// parameter, a path segment, and finally the code pattern anywhere.
pub fn course_id_from_href(href: &str) -> Option<String> {
    if let Some(caps) = HREF_ID_PARAM_RE.captures(href) {
        if let Some(code) = validate_code(&caps[1]) {
            return Some(code);
        }
    }
    if let Some(caps) = HREF_SEGMENT_RE.captures(href) {
        if let Some(code) = validate_code(&caps[1]) {
            return Some(code);
        }
    }
    HREF_ANYWHERE_RE
        .captures(href)
        .and_then(|caps| validate_code(&caps[1]))
}

/// Every validated course code mentioned in a run of free text, in order of
/// appearance, case-insensitive.
pub fn course_codes_in_text(text: &str) -> Vec<String> {
    CODE_IN_TEXT_CI_RE
        .find_iter(text)
        .filter_map(|m| validate_code(m.as_str()))
        .collect()
}

/// Resolve `href` against the source document's base URL. Absolute targets
/// pass through; protocol-relative, root-relative, and relative forms are
/// joined. Without a base the raw href is kept.
pub fn resolve_href(base_url: Option<&str>, href: &str) -> String {
    let href = href.trim();
    let Some(base) = base_url else {
        return href.to_string();
    };
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    let scheme = &base[..scheme_end];
    if let Some(rest) = href.strip_prefix("//") {
        return format!("{}{}", if scheme.is_empty() { "https://" } else { scheme }, rest);
    }
    let origin_end = base[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i)
        .unwrap_or(base.len());
    if href.starts_with('/') {
        return format!("{}{}", &base[..origin_end], href);
    }
    let dir_end = base.rfind('/').map(|i| i + 1).unwrap_or(base.len());
    let dir = if dir_end > scheme_end {
        &base[..dir_end]
    } else {
        // Base has no path, e.g. "https://host": treat it as the root.
        return format!("{}/{}", &base[..origin_end], href);
    };
    format!("{}{}", dir, href)
}

/// Course references from one table: a cell matching the code shape supplies
/// the id, the longest remaining cell the label, the row's first link the
/// href. Tables are the high-precision source and are tried before anchors.
pub fn refs_from_table(table: ElementRef, base_url: Option<&str>) -> Vec<CourseRef> {
    let mut refs = Vec::new();
    for tr in table.select(&TR_SEL) {
        let cells: Vec<String> = tr.select(&CELL_SEL).map(text_of).collect();
        let row_code = cells.iter().enumerate().find_map(|(i, c)| {
            CODE_IN_TEXT_CI_RE
                .find(c)
                .and_then(|m| validate_code(m.as_str()))
                .map(|code| (i, code))
        });
        let Some((idx, code)) = row_code else { continue };
        let label = cells
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != idx && !c.is_empty())
            .max_by_key(|(_, c)| c.len())
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| cells[idx].clone());
        let href = tr
            .select(&ANCHOR_SEL)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|h| resolve_href(base_url, h));
        refs.push(CourseRef {
            course_id: code,
            label,
            href,
        });
    }
    refs
}

/// Course reference from one anchor: the visible text is tried first, the
/// link target second. Anchors whose candidates fail code validation yield
/// nothing.
pub fn ref_from_anchor(anchor: ElementRef, base_url: Option<&str>) -> Option<CourseRef> {
    let href = anchor.value().attr("href")?;
    let label = text_of(anchor);
    let code = course_id_from_text(&label).or_else(|| course_id_from_href(href))?;
    Some(CourseRef {
        course_id: code,
        label,
        href: Some(resolve_href(base_url, href)),
    })
}

/// All course references in a region, deduplicated by course id (first
/// occurrence wins, later labels are ignored). A region with no valid
/// references is an ordinary empty result, not an error.
pub fn extract_course_refs(region: &[ElementRef], base_url: Option<&str>) -> Vec<CourseRef> {
    let mut refs: Vec<CourseRef> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut add = |r: CourseRef, refs: &mut Vec<CourseRef>| {
        if seen.insert(r.course_id.clone()) {
            refs.push(r);
        }
    };

    for el in region {
        for table in el.select(&TABLE_SEL) {
            for r in refs_from_table(table, base_url) {
                add(r, &mut refs);
            }
        }
        if el.value().name() == "table" {
            for r in refs_from_table(*el, base_url) {
                add(r, &mut refs);
            }
        }
    }
    for el in region {
        if el.value().name() == "a" {
            if let Some(r) = ref_from_anchor(*el, base_url) {
                add(r, &mut refs);
            }
        }
        for anchor in el.select(&ANCHOR_SEL) {
            if let Some(r) = ref_from_anchor(anchor, base_url) {
                add(r, &mut refs);
            }
        }
    }
    refs
}
