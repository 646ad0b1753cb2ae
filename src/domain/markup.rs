//! Allow-list pass applied to model markup before it is rendered.
//!
//! Independent of response cleanup: this removes executable content, not
//! model chatter.

use crate::domain::html::{decode_entities, is_void, tokenize, Attribute, Token};

/// Elements dropped together with everything inside them.
const BLOCKED_ELEMENTS: [&str; 9] = [
    "script", "style", "iframe", "object", "embed", "frame", "frameset", "link", "meta",
];

/// Attributes that carry a URL.
const URL_ATTRIBUTES: [&str; 5] = ["href", "src", "action", "formaction", "xlink:href"];

/// Schemes a URL attribute may name. Scheme-less values are relative.
const ALLOWED_SCHEMES: [&str; 5] = ["http", "https", "mailto", "tel", "ftp"];

/// Strip scripts, styles, embedded frames, event-handler attributes and
/// script URLs. Comments are dropped; everything else is re-emitted.
pub fn make_safe(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    // Name and nesting depth of the blocked element being skipped.
    let mut skipping: Option<(String, usize)> = None;

    for token in tokenize(markup) {
        if let Some((blocked, depth)) = skipping.as_mut() {
            match &token {
                Token::StartTag {
                    name, self_closing, ..
                } if name.as_str() == blocked.as_str() && !self_closing => *depth += 1,
                Token::EndTag { name } if name.as_str() == blocked.as_str() => {
                    *depth -= 1;
                    if *depth == 0 {
                        skipping = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match token {
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                if BLOCKED_ELEMENTS.contains(&name.as_str()) {
                    if !self_closing && !is_void(&name) {
                        skipping = Some((name, 1));
                    }
                    continue;
                }
                write_start_tag(&mut out, &name, &attrs, self_closing);
            }
            Token::EndTag { name } => {
                if !BLOCKED_ELEMENTS.contains(&name.as_str()) {
                    out.push_str("</");
                    out.push_str(&name);
                    out.push('>');
                }
            }
            Token::Text(text) => out.push_str(text),
            Token::Comment(_) => {}
        }
    }

    out
}

fn write_start_tag(out: &mut String, name: &str, attrs: &[Attribute], self_closing: bool) {
    out.push('<');
    out.push_str(name);
    for attr in attrs.iter().filter(|a| is_allowed_attribute(a)) {
        out.push(' ');
        out.push_str(&attr.name);
        if let Some(value) = &attr.value {
            out.push_str("=\"");
            out.push_str(&value.replace('"', "&quot;"));
            out.push('"');
        }
    }
    if self_closing {
        out.push_str(" /");
    }
    out.push('>');
}

fn is_allowed_attribute(attr: &Attribute) -> bool {
    if attr.name.starts_with("on") {
        return false;
    }
    if !URL_ATTRIBUTES.contains(&attr.name.as_str()) {
        return true;
    }
    let Some(value) = &attr.value else {
        return true;
    };
    let normalized: String = decode_entities(value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    match url_scheme(&normalized) {
        Some(scheme) => ALLOWED_SCHEMES.contains(&scheme),
        None => true,
    }
}

/// The scheme of `url`, if a `:` comes before any path, query or fragment.
fn url_scheme(url: &str) -> Option<&str> {
    let end = url.find([':', '/', '?', '#'])?;
    url[end..].starts_with(':').then(|| &url[..end])
}
