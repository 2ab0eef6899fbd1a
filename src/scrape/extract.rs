//! Metadata and readable-text extraction from fetched HTML.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

/// Elements whose text never counts as page content.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside",
];

const SKIPPED_CLASSES: &[&str] = &[
    "sidebar",
    "navigation",
    "menu",
    "ads",
    "advertisement",
    "social",
    "share",
    "comments",
    "popup",
    "modal",
];

/// Tried in order; the first hit is treated as the main content.
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    ".content",
    ".main-content",
    ".post-content",
    ".entry-content",
    ".article-content",
    "#content",
    "#main",
];

const ICON_RELS: &[&str] = &[
    "icon",
    "shortcut icon",
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageData {
    pub title: String,
    pub description: String,
    pub favicon_url: String,
    pub clean_text: String,
}

fn select_first<'a>(root: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    root.select(&selector).next()
}

/// Content of the first `<meta>` whose `name` or `property` equals `key`.
fn meta_content(document: &Html, key: &str) -> Option<String> {
    let selector = Selector::parse("meta").ok()?;
    document
        .select(&selector)
        .filter(|el| {
            let name = el.value().attr("name").or(el.value().attr("property"));
            name.is_some_and(|n| n.eq_ignore_ascii_case(key))
        })
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn extract_title(document: &Html) -> String {
    if let Some(title) = ["og:title", "twitter:title"]
        .into_iter()
        .find_map(|key| meta_content(document, key))
    {
        return title;
    }

    let root = document.root_element();
    ["title", "h1"]
        .into_iter()
        .filter_map(|css| select_first(root, css))
        .map(element_text)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn extract_description(document: &Html) -> String {
    ["og:description", "twitter:description", "description"]
        .into_iter()
        .find_map(|key| meta_content(document, key))
        .unwrap_or_default()
}

/// Icon link resolved against the page URL, falling back to
/// `/favicon.ico` on the page's host. Inline `data:` icons are skipped.
fn extract_favicon(document: &Html, page_url: &str) -> String {
    let Ok(base) = url::Url::parse(page_url) else {
        return String::new();
    };
    let Ok(selector) = Selector::parse("link[rel][href]") else {
        return String::new();
    };

    let links: Vec<(String, &str)> = document
        .select(&selector)
        .filter_map(|el| {
            let rel = el.value().attr("rel")?.trim().to_lowercase();
            let href = el.value().attr("href")?.trim();
            Some((rel, href))
        })
        .filter(|(_, href)| !href.is_empty() && !href.starts_with("data:"))
        .collect();

    for rel in ICON_RELS {
        if let Some((_, href)) = links.iter().find(|(r, _)| r == rel) {
            if let Ok(resolved) = base.join(href) {
                return resolved.to_string();
            }
        }
    }

    base.join("/favicon.ico")
        .map(|u| u.to_string())
        .unwrap_or_default()
}

fn is_skipped(el: ElementRef) -> bool {
    let value = el.value();
    SKIPPED_TAGS.contains(&value.name())
        || value.classes().any(|c| SKIPPED_CLASSES.contains(&c))
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if !is_skipped(child_el) {
                collect_text(child_el, out);
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

/// Whitespace-collapsed text of the main content area (or the whole body),
/// without scripts, styles and navigation chrome.
fn extract_clean_text(document: &Html) -> String {
    let root = document.root_element();

    let main = MAIN_SELECTORS
        .iter()
        .filter_map(|css| select_first(root, css))
        .find(|el| !is_skipped(*el));

    let Some(container) = main.or_else(|| select_first(root, "body")) else {
        return String::new();
    };

    let mut text = String::new();
    collect_text(container, &mut text);
    collapse_whitespace(&text)
}

/// Falls back to JSON-LD `name`/`headline` and `description` for whatever
/// the meta tags left empty.
fn fill_from_json_ld(document: &Html, data: &mut PageData) {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return;
    };
    for element in document.select(&selector) {
        let json_text = element.text().collect::<String>();
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&json_text) {
            fill_from_json_value(&json, data);
        }
    }
}

fn fill_from_json_value(json: &serde_json::Value, data: &mut PageData) {
    if let Some(graph) = json.get("@graph").and_then(|g| g.as_array()) {
        graph.iter().for_each(|item| fill_from_json_value(item, data));
        return;
    }
    if let Some(arr) = json.as_array() {
        arr.iter().for_each(|item| fill_from_json_value(item, data));
        return;
    }

    if data.title.is_empty() {
        if let Some(name) = json
            .get("name")
            .or_else(|| json.get("headline"))
            .and_then(|v| v.as_str())
        {
            data.title = name.trim().to_string();
        }
    }
    if data.description.is_empty() {
        if let Some(desc) = json.get("description").and_then(|v| v.as_str()) {
            data.description = desc.trim().to_string();
        }
    }
}

pub fn get_data_from_page(html: &str, page_url: &str) -> PageData {
    let document = Html::parse_document(html);

    let mut data = PageData {
        title: extract_title(&document),
        description: extract_description(&document),
        favicon_url: extract_favicon(&document, page_url),
        clean_text: extract_clean_text(&document),
    };

    if data.title.is_empty() || data.description.is_empty() {
        fill_from_json_ld(&document, &mut data);
    }

    data
}
