//! Page-level metadata extraction from captured HTML
//!
//! The session captures the rendered page source once the settle wait
//! elapses; links, meta description, and document language are pulled out
//! of that snapshot here rather than through extra protocol round trips.

use crate::devtools::PageLink;
use scraper::{Html, Selector};
use url::Url;

/// Extracts all anchors from the page, resolving relative hrefs against
/// the final page URL. Anchors without an href, or with one that does not
/// resolve, are skipped.
pub fn extract_links(source: &str, base_url: &str) -> Vec<PageLink> {
    let document = Html::parse_document(source);
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let base = Url::parse(base_url).ok();

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.is_empty() {
            continue;
        }

        let resolved = match (Url::parse(href), &base) {
            (Ok(absolute), _) => absolute.to_string(),
            (Err(_), Some(base)) => match base.join(href) {
                Ok(joined) => joined.to_string(),
                Err(_) => continue,
            },
            (Err(_), None) => continue,
        };

        let text = element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        links.push(PageLink {
            text,
            href: resolved,
        });
    }
    links
}

/// Reads `<meta name="description" content="...">`, if present.
pub fn extract_meta_description(source: &str) -> Option<String> {
    let document = Html::parse_document(source);
    let selector = Selector::parse(r#"meta[name="description"]"#).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.to_string())
}

/// Reads the `lang` attribute of the root `<html>` element, if present
/// and non-empty.
pub fn extract_language(source: &str) -> Option<String> {
    let document = Html::parse_document(source);
    let selector = Selector::parse("html").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .filter(|lang| !lang.is_empty())
        .map(|s| s.to_string())
}
