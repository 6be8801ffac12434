//! Small text helpers shared by the feed normalizer and the copy generator.
//!
//! All lengths are counted in `char`s, which is how the platforms count.

use scraper::{Html, Selector};

/// Ellipsis appended to shortened text.
pub const ELLIPSIS: char = '…';

/// Number of characters in `s`.
#[must_use]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Shorten `s` to at most `max` characters, ending in an ellipsis.
///
/// Cuts at the last whitespace when one falls in the final fifth of the
/// allowed length, so words are not split in the common case.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }

    let keep = max - 1;
    let head: String = s.chars().take(keep).collect();
    let min_cut = keep - keep / 5;

    let cut = head
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .filter(|&i| head[..i].chars().count() >= min_cut)
        .last()
        .unwrap_or(head.len());

    let mut out = head[..cut].trim_end().to_string();
    out.push(ELLIPSIS);
    out
}

/// Collapse runs of whitespace into single spaces and trim the ends.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an HTML fragment.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return collapse_whitespace(html);
    }
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

/// `src` of the first image in an HTML fragment.
#[must_use]
pub fn first_image_src(html: &str) -> Option<String> {
    if !html.contains("<img") {
        return None;
    }
    let selector = Selector::parse("img[src]").ok()?;
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| src.starts_with("http://") || src.starts_with("https://"))
        .map(str::to_string)
}
