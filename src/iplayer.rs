/// Readers for BBC iPlayer HTML pages.
///
/// Every iPlayer page embeds its client-side Redux store as
/// `window.__IPLAYER_REDUX_STATE__ = {...};` inside a known script element.
/// Everything the catalogue needs is read from that blob, plus the page
/// count from the listing pagination control. All functions here are pure.
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::models::ReduxState;

const REDUX_SCRIPT_SELECTOR: &str = "#tvip-script-app-store";

/// Result of looking for the embedded state in a page.
#[derive(Debug)]
pub enum Extraction {
    Found(ReduxState),
    /// The page carries no embedded state. Pages legitimately vary, so this
    /// is not an error by itself.
    Missing,
    /// The state is there but could not be read. Usually means the site
    /// changed shape.
    Malformed(String),
}

/// Pull the Redux state out of an iPlayer page.
pub fn extract_redux_state(html: &str) -> Extraction {
    static SCRIPT: Lazy<Selector> =
        Lazy::new(|| Selector::parse(REDUX_SCRIPT_SELECTOR).unwrap());

    let doc = Html::parse_document(html);
    let Some(script) = doc.select(&SCRIPT).next() else {
        tracing::debug!("No Redux script element in page");
        return Extraction::Missing;
    };
    let text = script.text().collect::<String>();

    let Some(json) = assignment_object(&text) else {
        return Extraction::Malformed("no Redux state assignment in script".to_string());
    };

    match serde_json::from_str::<ReduxState>(json) {
        Ok(state) => Extraction::Found(state),
        Err(e) => Extraction::Malformed(format!("Redux state is not valid JSON: {e}")),
    }
}

/// Find `window.__IPLAYER_REDUX_STATE__ = {...};` and return the object text.
///
/// Walks the bytes after the prefix counting braces (ignoring any inside
/// JSON strings) so the result is the first balanced object, and requires the
/// statement to end with `;`.
fn assignment_object(script: &str) -> Option<&str> {
    static PREFIX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"window\.__IPLAYER_REDUX_STATE__\s*=\s*").unwrap());

    let start = PREFIX.find(script)?.end();
    let tail = &script[start..];
    if !tail.starts_with('{') {
        return None;
    }

    let mut depth = 0i32;
    let mut end = 0;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in tail.as_bytes().iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        match b {
            b'\\' if in_string => escape = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    end = i + 1;
                    break;
                }
            }
            _ => {}
        }
    }
    if end == 0 {
        return None;
    }

    tail[end..].trim_start().starts_with(';').then(|| &tail[..end])
}

/// Read the number of listing pages from an a-z category page.
///
/// The last pagination item reads e.g. `<span>Page</span><span>12</span>`;
/// the second span holds the count. Falls back to the last number in the
/// item's text.
pub fn parse_total_pages(html: &str) -> Option<u32> {
    static LIST: Lazy<Selector> = Lazy::new(|| Selector::parse(".pagination__list").unwrap());
    static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li").unwrap());
    static SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span").unwrap());
    static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

    let doc = Html::parse_document(html);
    let list = doc.select(&LIST).next()?;
    let last = list.select(&ITEM).last()?;

    let from_span = last
        .select(&SPAN)
        .nth(1)
        .and_then(|span| span.text().collect::<String>().trim().parse::<u32>().ok());
    if from_span.is_some() {
        return from_span;
    }

    let text = last.text().collect::<String>();
    NUMBER
        .find_iter(&text)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

// ── URLs ───────────────────────────────────────────────────────────────────────

pub fn category_url(base: &str, category_id: &str) -> String {
    format!("{base}/categories/{category_id}/a-z")
}

pub fn episodes_url(base: &str, programme_id: &str) -> String {
    format!("{base}/episodes/{programme_id}")
}

pub fn episode_url(base: &str, episode_id: &str) -> String {
    format!("{base}/episode/{episode_id}")
}

pub fn media_selector_url(template: &str, version: &str, vid: &str) -> String {
    template.replace("{version}", version).replace("{vid}", vid)
}

#[cfg(test)]
pub(crate) fn redux_page(state: &serde_json::Value) -> String {
    format!(
        "<html><head></head><body><div id=\"main\"></div>\
         <script id=\"tvip-script-app-store\">\
         window.__IPLAYER_REDUX_STATE__ = {state};\
         window.__IPLAYER_OTHER__ = {{\"x\": 1}};\
         </script></body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_state_from_script_element() {
        let html = redux_page(&json!({
            "navigation": {"items": [{"id": "categories", "subItems": [{"id": "news"}]}]}
        }));

        let Extraction::Found(state) = extract_redux_state(&html) else {
            panic!("expected embedded state");
        };
        let nav = state.navigation.expect("navigation");
        assert_eq!(nav.items[0].id, "categories");
        assert_eq!(nav.items[0].sub_items[0].id, "news");
    }

    #[test]
    fn page_without_script_is_missing_not_malformed() {
        let html = "<html><body><script>window.__IPLAYER_REDUX_STATE__ = {};</script></body></html>";
        assert!(matches!(extract_redux_state(html), Extraction::Missing));
    }

    #[test]
    fn broken_json_is_malformed() {
        let html = "<html><body><script id=\"tvip-script-app-store\">\
                    window.__IPLAYER_REDUX_STATE__ = {\"a\": tru};</script></body></html>";
        assert!(matches!(extract_redux_state(html), Extraction::Malformed(_)));
    }

    #[test]
    fn script_without_assignment_is_malformed() {
        let html = "<html><body><script id=\"tvip-script-app-store\">var x = 1;</script></body></html>";
        assert!(matches!(extract_redux_state(html), Extraction::Malformed(_)));
    }

    #[test]
    fn braces_and_terminators_inside_strings_do_not_end_the_object() {
        let script = r#"window.__IPLAYER_REDUX_STATE__ = {"a": "x}; y", "b": {"c": "\"}"}}; next();"#;
        assert_eq!(
            assignment_object(script),
            Some(r#"{"a": "x}; y", "b": {"c": "\"}"}}"#)
        );
    }

    #[test]
    fn unterminated_assignment_is_rejected() {
        assert_eq!(
            assignment_object(r#"window.__IPLAYER_REDUX_STATE__ = {"a": 1} next"#),
            None
        );
        assert_eq!(
            assignment_object(r#"window.__IPLAYER_REDUX_STATE__ = {"a": 1"#),
            None
        );
    }

    #[test]
    fn reads_page_count_from_second_span_of_last_item() {
        let html = r#"<nav><ol class="pagination__list">
            <li><a><span>Page</span><span>1</span></a></li>
            <li><a><span>Page</span><span>2</span></a></li>
            <li><a><span>Page</span><span>7</span></a></li>
        </ol></nav>"#;
        assert_eq!(parse_total_pages(html), Some(7));
    }

    #[test]
    fn falls_back_to_last_number_in_item_text() {
        let html = r#"<ol class="pagination__list"><li>1</li><li>Last page 4</li></ol>"#;
        assert_eq!(parse_total_pages(html), Some(4));
    }

    #[test]
    fn missing_pagination_yields_none() {
        assert_eq!(parse_total_pages("<html><body><p>hi</p></body></html>"), None);
    }

    #[test]
    fn builds_media_selector_url_from_template() {
        assert_eq!(
            media_selector_url("http://ms.test/v/{version}/vpid/{vid}/json", "3.0", "p0abc"),
            "http://ms.test/v/3.0/vpid/p0abc/json"
        );
    }
}
