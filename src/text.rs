use scraper::ElementRef;

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element, whitespace-normalized.
pub fn text_of(el: ElementRef) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Lowercase, non-alphanumerics to underscores: "Fee Structure" -> "fee_structure".
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_sep = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_collapsed() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Fee Structure"), "fee_structure");
        assert_eq!(slugify("Rules & Policies!"), "rules_policies");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn text_of_nested() {
        let doc = scraper::Html::parse_fragment("<div><b>Foundation</b>  Level </div>");
        let sel = scraper::Selector::parse("div").unwrap();
        let el = doc.select(&sel).next().unwrap();
        assert_eq!(text_of(el), "Foundation Level");
    }
}
