use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use serde::Serialize;

use crate::outline::heading_level_of;
use crate::text::{normalize_whitespace, text_of};

static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static DT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dt").unwrap());

/// One piece of section content, in document order. Owned by the section it
/// was extracted under; records carry no identity beyond their position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContentRecord {
    Bullet(String),
    Paragraph(String),
    LabeledField { label: String, value: String },
    Table(Vec<Vec<String>>),
}

/// The DOM region a heading owns: every following sibling up to (excluding)
/// the next heading-like element at the same or a shallower raw level.
/// Content must never leak into a sibling section.
pub fn section_region(header: ElementRef) -> Vec<ElementRef> {
    let level = heading_level_of(header).unwrap_or(7);
    let mut region = Vec::new();
    let mut cur = header.next_sibling();
    while let Some(node) = cur {
        if let Some(el) = ElementRef::wrap(node) {
            if heading_level_of(el).is_some_and(|l| l <= level) {
                break;
            }
            region.push(el);
        }
        cur = node.next_sibling();
    }
    region
}

/// All list items in the region, nested ones included.
pub fn extract_bullets(region: &[ElementRef]) -> Vec<String> {
    let mut items = Vec::new();
    for el in region {
        for node in el.descendants() {
            if let Some(li) = ElementRef::wrap(node) {
                if li.value().name() == "li" {
                    let t = text_of(li);
                    if !t.is_empty() {
                        items.push(t);
                    }
                }
            }
        }
    }
    items
}

pub fn extract_paragraphs(region: &[ElementRef]) -> Vec<String> {
    let mut paras = Vec::new();
    for el in region {
        for node in el.descendants() {
            if let Some(p) = ElementRef::wrap(node) {
                if p.value().name() == "p" {
                    let t = text_of(p);
                    if !t.is_empty() {
                        paras.push(t);
                    }
                }
            }
        }
    }
    paras
}

/// Label/value pairs from definition lists and from inline "<strong>Label:</strong>
/// value" patterns. First occurrence of a label wins.
pub fn extract_labeled_fields(region: &[ElementRef]) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |key: String, value: String, fields: &mut Vec<(String, String)>| {
        if !key.is_empty() && !value.is_empty() && seen.insert(key.clone()) {
            fields.push((key, value));
        }
    };

    for el in region {
        for node in el.descendants() {
            let Some(inner) = ElementRef::wrap(node) else { continue };
            match inner.value().name() {
                "dl" => {
                    for dt in inner.select(&DT_SEL) {
                        let key = text_of(dt);
                        let dd = dt
                            .next_siblings()
                            .filter_map(ElementRef::wrap)
                            .find(|s| s.value().name() == "dd");
                        if let Some(dd) = dd {
                            push(key, text_of(dd), &mut fields);
                        }
                    }
                }
                "strong" | "b" => {
                    let key = text_of(inner).trim_end_matches(':').trim().to_string();
                    let value = inline_field_value(inner);
                    push(key, value, &mut fields);
                }
                _ => {}
            }
        }
    }
    fields
}

/// Text following an inline label element, up to the next heading sibling.
fn inline_field_value(label_el: ElementRef) -> String {
    let mut parts: Vec<String> = Vec::new();
    for sib in label_el.next_siblings() {
        if let Some(el) = ElementRef::wrap(sib) {
            if heading_level_of(el).is_some() {
                break;
            }
            let t = text_of(el);
            if !t.is_empty() {
                parts.push(t);
            }
        } else if let Some(text) = sib.value().as_text() {
            let t = normalize_whitespace(text);
            if !t.is_empty() {
                parts.push(t);
            }
        }
    }
    normalize_whitespace(&parts.join(" "))
}

/// Tables as ordered rows of ordered cell strings (header row included);
/// rows with no non-empty cell are dropped.
pub fn extract_tables(region: &[ElementRef]) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    for el in region {
        for node in el.descendants() {
            if let Some(table) = ElementRef::wrap(node) {
                if table.value().name() == "table" {
                    let rows = table_rows(table);
                    if !rows.is_empty() {
                        tables.push(rows);
                    }
                }
            }
        }
    }
    tables
}

pub fn table_rows(table: ElementRef) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for tr in table.select(&TR_SEL) {
        let cells: Vec<String> = tr.select(&CELL_SEL).map(text_of).collect();
        if cells.iter().any(|c| !c.is_empty()) {
            rows.push(cells);
        }
    }
    rows
}

/// Single-pass extraction preserving document order across record kinds.
/// Elements nested inside an already-consumed table or definition list are
/// not re-emitted; unrecognized elements are skipped silently.
pub fn extract_records(region: &[ElementRef]) -> Vec<ContentRecord> {
    let mut records = Vec::new();
    let mut covered: HashSet<_> = HashSet::new();
    for el in region {
        for node in el.descendants() {
            if covered.contains(&node.id()) {
                continue;
            }
            let Some(inner) = ElementRef::wrap(node) else { continue };
            match inner.value().name() {
                "li" => {
                    let t = text_of(inner);
                    if !t.is_empty() {
                        records.push(ContentRecord::Bullet(t));
                    }
                }
                "p" => {
                    let t = text_of(inner);
                    if !t.is_empty() {
                        records.push(ContentRecord::Paragraph(t));
                    }
                }
                "dl" => {
                    for (label, value) in extract_labeled_fields(&[inner]) {
                        records.push(ContentRecord::LabeledField { label, value });
                    }
                    for d in inner.descendants() {
                        covered.insert(d.id());
                    }
                }
                "strong" | "b" => {
                    let label = text_of(inner).trim_end_matches(':').trim().to_string();
                    let value = inline_field_value(inner);
                    if !label.is_empty() && !value.is_empty() {
                        records.push(ContentRecord::LabeledField { label, value });
                    }
                }
                "table" => {
                    let rows = table_rows(inner);
                    if !rows.is_empty() {
                        records.push(ContentRecord::Table(rows));
                    }
                    for d in inner.descendants() {
                        covered.insert(d.id());
                    }
                }
                _ => {}
            }
        }
    }
    records
}
