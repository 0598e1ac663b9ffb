use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::text::{normalize_whitespace, text_of};

static CLASS_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bh([1-6])\b").unwrap());
static ANCHOR_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^AC\d+").unwrap());
static HAS_LETTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]").unwrap());
static CURRENCY_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[₹$€\d\s,\-–—\*]+$").unwrap());
static METRIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[₹$€]?[\d,]+(?:\s*[\-–—]\s*[₹$€]?[\d,]+)?)(?:\s*(?:credits?|courses?|projects?|years?))?(?:\s*\*?)\s*$",
    )
    .unwrap()
});
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

/// One heading of the reconstructed document hierarchy. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub title: String,
    pub heading_level: u8,
    /// Position in the reconstructed hierarchy. Independent of `heading_level`
    /// because raw levels can skip or repeat; always less than any descendant's.
    pub depth: usize,
    pub anchor_id: Option<String>,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// Heading level of an element, if it is heading-like: native h1-h6, an
/// `h1`..`h6` utility class, or the styled/anchored conventions this document
/// family uses for visual headers (treated as level 2).
pub fn heading_level_of(el: ElementRef) -> Option<u8> {
    let name = el.value().name();
    if name.len() == 2 && name.starts_with('h') {
        if let Some(d) = name[1..].parse::<u8>().ok().filter(|d| (1..=6).contains(d)) {
            return Some(d);
        }
    }
    let classes = el.value().classes().collect::<Vec<_>>().join(" ");
    if let Some(caps) = CLASS_HEADING_RE.captures(&classes) {
        return caps[1].parse::<u8>().ok();
    }
    if matches!(name, "p" | "div" | "span") {
        let styled = classes.contains("font-weight-600")
            && (classes.contains("text-dark") || classes.contains("text-secondary"));
        let anchored = el
            .value()
            .attr("id")
            .is_some_and(|id| ANCHOR_ID_RE.is_match(id));
        if styled || anchored {
            return Some(2);
        }
    }
    None
}

/// All heading-like elements in document order, unfiltered.
pub fn collect_headings(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| heading_level_of(*el).is_some())
        .collect()
}

/// Drops low-signal titles: no letters, currency/price strings, bare metrics
/// ("4 credits", "₹32,500"), and short single tokens. These are typically
/// table captions or fee figures styled like headings.
fn is_valid_heading_title(title: &str) -> bool {
    let t = title.trim();
    if t.is_empty() || !HAS_LETTER_RE.is_match(t) {
        return false;
    }
    if CURRENCY_ONLY_RE.is_match(t) || METRIC_RE.is_match(t) {
        return false;
    }
    if t.len() < 4 && !t.contains(' ') {
        return false;
    }
    true
}

/// Reconstruct the heading hierarchy of a document in one top-to-bottom scan.
///
/// Depth comes from a stack of open levels: pop while the stack top's raw
/// level is >= the incoming heading's, then push. This yields a consistent
/// tree even when raw levels repeat or jump. A heading whose title equals the
/// last accepted title at the same level is collapsed (templated markup emits
/// the same header twice); the first occurrence keeps its anchor.
///
/// A document with zero qualifying headings yields a single synthetic root
/// wrapping the whole body so downstream code never sees an empty outline.
pub fn build_outline(doc: &Html) -> Vec<OutlineNode> {
    let mut roots: Vec<OutlineNode> = Vec::new();
    let mut stack: Vec<OutlineNode> = Vec::new();
    let mut prev_title_by_level: HashMap<u8, String> = HashMap::new();

    fn attach(node: OutlineNode, stack: &mut Vec<OutlineNode>, roots: &mut Vec<OutlineNode>) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    for h in collect_headings(doc) {
        let level = heading_level_of(h).unwrap_or(6);
        let title = text_of(h);
        if !is_valid_heading_title(&title) {
            debug!(%title, "skipping low-signal heading");
            continue;
        }
        if prev_title_by_level.get(&level) == Some(&title) {
            continue;
        }
        prev_title_by_level.insert(level, title.clone());

        while stack.last().is_some_and(|top| top.heading_level >= level) {
            if let Some(done) = stack.pop() {
                attach(done, &mut stack, &mut roots);
            }
        }
        stack.push(OutlineNode {
            title,
            heading_level: level,
            depth: stack.len(),
            anchor_id: h.value().attr("id").map(str::to_string),
            children: Vec::new(),
        });
    }
    while let Some(done) = stack.pop() {
        attach(done, &mut stack, &mut roots);
    }

    if roots.is_empty() {
        let title = doc
            .select(&TITLE_SEL)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Document".to_string());
        roots.push(OutlineNode {
            title: normalize_whitespace(&title),
            heading_level: 1,
            depth: 0,
            anchor_id: None,
            children: Vec::new(),
        });
    }
    roots
}

/// Depth-first iteration over an outline tree.
pub fn iter_outline<'a>(nodes: &'a [OutlineNode], out: &mut Vec<&'a OutlineNode>) {
    for n in nodes {
        out.push(n);
        iter_outline(&n.children, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(html: &str) -> Vec<OutlineNode> {
        build_outline(&Html::parse_document(html))
    }

    #[test]
    fn nested_native_headings() {
        let roots = outline(
            "<h1>Program</h1><h2>Foundation Level</h2><h3>Courses</h3><h2>Diploma Level</h2>",
        );
        assert_eq!(roots.len(), 1);
        let program = &roots[0];
        assert_eq!(program.title, "Program");
        assert_eq!(program.depth, 0);
        assert_eq!(program.child_count(), 2);
        assert_eq!(program.children[0].children[0].title, "Courses");
        assert_eq!(program.children[0].children[0].depth, 2);
    }

    #[test]
    fn depth_monotonic_on_messy_levels() {
        // Raw levels jump and repeat; depth must still grow along every path.
        let roots = outline(
            "<h3>Alpha</h3><h1>Bravo</h1><h4>Charlie</h4><h4>Delta</h4><h2>Echo</h2>",
        );
        let mut flat = Vec::new();
        iter_outline(&roots, &mut flat);
        fn check(node: &OutlineNode) {
            for c in &node.children {
                assert!(c.depth > node.depth, "{} not deeper than {}", c.title, node.title);
                check(c);
            }
        }
        for r in &roots {
            check(r);
        }
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn styled_and_anchored_headings_recognized() {
        let roots = outline(
            r#"<div class="font-weight-600 text-dark">Fee Structure</div>
               <p id="AC12">Assessments Overview</p>
               <span class="h3">Term Structure</span>"#,
        );
        let mut flat = Vec::new();
        iter_outline(&roots, &mut flat);
        let titles: Vec<&str> = flat.iter().map(|n| n.title.as_str()).collect();
        assert!(titles.contains(&"Fee Structure"));
        assert!(titles.contains(&"Assessments Overview"));
        assert!(titles.contains(&"Term Structure"));
        let anchored = flat.iter().find(|n| n.title == "Assessments Overview").unwrap();
        assert_eq!(anchored.anchor_id.as_deref(), Some("AC12"));
        assert_eq!(anchored.heading_level, 2);
    }

    #[test]
    fn low_signal_headings_dropped() {
        let roots = outline(
            "<h2>Fee Structure</h2><h3>₹ 32,500</h3><h3>4 credits</h3><h3>12</h3><h3>FAQ</h3>",
        );
        let mut flat = Vec::new();
        iter_outline(&roots, &mut flat);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].title, "Fee Structure");
    }

    #[test]
    fn consecutive_duplicates_collapsed() {
        let roots = outline(
            r#"<h2 id="first">Program Structure</h2><h2>Program Structure</h2><h2>Assessments</h2>"#,
        );
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].title, "Program Structure");
        assert_eq!(roots[0].anchor_id.as_deref(), Some("first"));
    }

    #[test]
    fn empty_document_gets_synthetic_root() {
        let roots = outline("<html><head><title>Course Catalog</title></head><body><p>text</p></body></html>");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].title, "Course Catalog");
        assert_eq!(roots[0].depth, 0);
        assert_eq!(roots[0].child_count(), 0);
    }
}
