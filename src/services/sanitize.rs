//! HTML sanitising for post bodies
//!
//! An allowlist filter: only `img` and `code` survive, carrying at most the
//! `class`, `style`, `height` and `width` attributes. Other tags are removed
//! but their text is kept, except for elements whose content is never shown
//! as text (`script`, `style`, ...), which are removed whole.

use once_cell::sync::Lazy;
use regex::Regex;

const ALLOWED_TAGS: &[&str] = &["img", "code"];

const ALLOWED_ATTRIBUTES: &[&str] = &["class", "style", "height", "width"];

/// Dropped together with everything between their open and close tags
const DISCARDED_ELEMENTS: &[&str] = &["script", "style", "textarea", "option", "noscript"];

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?(-->|$)").expect("valid regex"));

static DISCARDED: Lazy<Vec<Regex>> = Lazy::new(|| {
    DISCARDED_ELEMENTS
        .iter()
        .map(|name| {
            Regex::new(&format!(r"(?is)<{0}\b[^>]*>.*?(</{0}\s*>|$)", name)).expect("valid regex")
        })
        .collect()
});

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").expect("valid regex"));

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid regex")
});

/// Sanitise untrusted HTML
pub fn sanitize_html(input: &str) -> String {
    let mut html = COMMENT.replace_all(input, "").into_owned();
    for element in DISCARDED.iter() {
        html = element.replace_all(&html, "").into_owned();
    }

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for caps in TAG.captures_iter(&html) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&escape_text(&html[last..whole.start()]));
        last = whole.end();

        let name = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            continue;
        }
        if &caps[1] == "/" {
            out.push_str(&format!("</{}>", name));
            continue;
        }

        let raw_attributes = caps.get(3).map_or("", |m| m.as_str());
        out.push('<');
        out.push_str(&name);
        out.push_str(&clean_attributes(raw_attributes));
        if raw_attributes.trim_end().ends_with('/') {
            out.push_str(" /");
        }
        out.push('>');
    }
    out.push_str(&escape_text(&html[last..]));
    out
}

fn clean_attributes(raw: &str) -> String {
    let mut out = String::new();
    for caps in ATTRIBUTE.captures_iter(raw) {
        let name = caps[1].to_ascii_lowercase();
        if !ALLOWED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        out.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value)));
    }
    out
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Entities already in the text are left alone
fn escape_text(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}
