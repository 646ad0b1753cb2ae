//! Tolerant HTML scanning.
//!
//! Model output and fetched pages are frequently malformed, so this is a
//! forgiving tokenizer plus a small tree builder: unknown end tags are
//! ignored, unclosed elements are closed by their ancestors, and `<` that
//! does not start a tag stays as text.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*?)(/?)>"#)
        .expect("tag pattern is valid")
});

static COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?s:<!--.*?-->|<![^>]*>|<\?[^>]*>)").expect("comment pattern is valid")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

/// Elements that never have children.
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content is not markup.
const RAW_TEXT_ELEMENTS: [&str; 3] = ["script", "style", "textarea"];

/// Elements that end a line of readable text.
const BLOCK_ELEMENTS: [&str; 30] = [
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
    "main", "nav", "ol", "p", "pre", "section", "table", "tr",
];

/// Tags removed before looking for a page's readable text.
pub const NON_CONTENT_TAGS: [&str; 10] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "object",
    "embed",
];

/// Selectors tried, in order, for a page's main content.
pub const MAIN_CONTENT_SELECTORS: [&str; 8] = [
    "main",
    "article",
    "[role=main]",
    ".content",
    "#content",
    ".post",
    ".article",
    ".entry-content",
];

/// Below this many characters the main-content match is not trusted and the
/// whole document text is used instead.
pub const MIN_MAIN_CONTENT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Raw value as written in the source (entities not decoded).
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    StartTag {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(&'a str),
    /// Comments, doctypes and processing instructions.
    Comment(&'a str),
}

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

/// Split `input` into tokens. Tag and attribute names are lowercased.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while let Some(offset) = input[pos..].find('<') {
        let lt = pos + offset;
        let rest = &input[lt..];

        if let Some(m) = COMMENT.find(rest) {
            push_text(&mut tokens, &input[text_start..lt]);
            tokens.push(Token::Comment(m.as_str()));
            pos = lt + m.end();
            text_start = pos;
            continue;
        }

        let Some(caps) = TAG.captures(rest) else {
            pos = lt + 1;
            continue;
        };

        push_text(&mut tokens, &input[text_start..lt]);
        let tag_len = caps.get(0).map_or(1, |m| m.end());
        let name = caps[2].to_ascii_lowercase();
        pos = lt + tag_len;
        text_start = pos;

        if &caps[1] == "/" {
            tokens.push(Token::EndTag { name });
            continue;
        }

        let self_closing = !caps[4].is_empty();
        let raw_text = RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing;
        tokens.push(Token::StartTag {
            name: name.clone(),
            attrs: parse_attributes(&caps[3]),
            self_closing,
        });

        if raw_text {
            let closing = format!("</{}", name);
            let body_end = input[pos..]
                .to_ascii_lowercase()
                .find(&closing)
                .map_or(input.len(), |i| pos + i);
            push_text(&mut tokens, &input[pos..body_end]);
            tokens.push(Token::EndTag { name });
            pos = input[body_end..]
                .find('>')
                .map_or(input.len(), |i| body_end + i + 1);
            text_start = pos;
        }
    }

    push_text(&mut tokens, &input[text_start..]);
    tokens
}

fn push_text<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str) {
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
}

fn parse_attributes(raw: &str) -> Vec<Attribute> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps| Attribute {
            name: caps[1].to_ascii_lowercase(),
            value: caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string()),
        })
        .collect()
}

/// Decode character references the way browsers do for numeric forms
/// (optional `;`, any number of leading zeros) plus the common named ones.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match decode_reference(after) {
            Some((c, used)) => {
                out.push(c);
                rest = &after[used..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the reference that follows an `&`, returning the character and
/// the number of bytes it used.
fn decode_reference(after: &str) -> Option<(char, usize)> {
    if let Some(num) = after.strip_prefix('#') {
        let (radix, prefix_len) = match num.strip_prefix(['x', 'X']) {
            Some(_) => (16, 2),
            None => (10, 1),
        };
        let body = &after[prefix_len..];
        let len = body
            .find(|c: char| !c.is_digit(radix))
            .unwrap_or(body.len());
        if len == 0 {
            return None;
        }
        let digits = body[..len].trim_start_matches('0');
        let code = match digits.len() {
            0 => 0,
            1..=8 => u32::from_str_radix(digits, radix).ok()?,
            _ => u32::MAX,
        };
        let c = match code {
            0 => '\u{fffd}',
            code => char::from_u32(code).unwrap_or('\u{fffd}'),
        };
        let terminated = body[len..].starts_with(';');
        return Some((c, prefix_len + len + usize::from(terminated)));
    }

    let semi = after.find(';').filter(|&semi| semi > 0 && semi <= 10)?;
    decode_named(&after[..semi]).map(|c| (c, semi + 1))
}

fn decode_named(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "colon" => ':',
        "Tab" => '\t',
        "NewLine" => '\n',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "copy" => '\u{a9}',
        _ => return None,
    };
    Some(c)
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element { name: String, attrs: Vec<Attribute> },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    children: Vec<NodeId>,
}

/// A simple selector: `tag`, `.class`, `#id` or `[attr=value]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Tag(String),
    Class(String),
    Id(String),
    Attribute { name: String, value: String },
}

impl Selector {
    pub fn parse(selector: &str) -> Option<Self> {
        let s = selector.trim();
        if let Some(class) = s.strip_prefix('.') {
            return (!class.is_empty()).then(|| Selector::Class(class.to_string()));
        }
        if let Some(id) = s.strip_prefix('#') {
            return (!id.is_empty()).then(|| Selector::Id(id.to_string()));
        }
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let (name, value) = inner.split_once('=')?;
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            return Some(Selector::Attribute {
                name: name.trim().to_ascii_lowercase(),
                value: value.to_string(),
            });
        }
        (!s.is_empty()).then(|| Selector::Tag(s.to_ascii_lowercase()))
    }

    fn matches(&self, name: &str, attrs: &[Attribute]) -> bool {
        let attr = |key: &str| {
            attrs
                .iter()
                .find(|a| a.name == key)
                .and_then(|a| a.value.as_deref())
        };
        match self {
            Selector::Tag(tag) => name == tag,
            Selector::Class(class) => attr("class")
                .is_some_and(|v| v.split_whitespace().any(|c| c == class)),
            Selector::Id(id) => attr("id") == Some(id.as_str()),
            Selector::Attribute { name, value } => attr(name) == Some(value.as_str()),
        }
    }
}

/// Parsed document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                data: NodeData::Document,
                children: Vec::new(),
            }],
        };
        let mut open: Vec<NodeId> = vec![doc.root()];

        for token in tokenize(html) {
            let parent = open.last().copied().unwrap_or(0);
            match token {
                Token::StartTag {
                    name,
                    attrs,
                    self_closing,
                } => {
                    // A new list item or paragraph closes an unterminated sibling.
                    if (name == "li" || name == "p") && doc.element_name(parent) == Some(name.as_str()) {
                        open.pop();
                    }
                    let parent = open.last().copied().unwrap_or(0);
                    let leaf = self_closing || is_void(&name);
                    let id = doc.append(parent, NodeData::Element { name, attrs });
                    if !leaf {
                        open.push(id);
                    }
                }
                Token::EndTag { name } => {
                    if let Some(depth) = open
                        .iter()
                        .rposition(|&id| doc.element_name(id) == Some(name.as_str()))
                    {
                        open.truncate(depth);
                    }
                }
                Token::Text(text) => {
                    doc.append(parent, NodeData::Text(decode_entities(text)));
                }
                Token::Comment(_) => {}
            }
        }

        doc
    }

    pub fn root(&self) -> NodeId {
        0
    }

    fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            data,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Detach every element named in `names`, with its subtree.
    pub fn remove_elements(&mut self, names: &[&str]) {
        for idx in 0..self.nodes.len() {
            let children = std::mem::take(&mut self.nodes[idx].children);
            let kept = children
                .into_iter()
                .filter(|&child| {
                    self.element_name(child)
                        .map_or(true, |name| !names.contains(&name))
                })
                .collect();
            self.nodes[idx].children = kept;
        }
    }

    /// First element in document order matching `selector`.
    pub fn select_first(&self, selector: &Selector) -> Option<NodeId> {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if let NodeData::Element { name, attrs } = &self.nodes[id].data {
                if selector.matches(name, attrs) {
                    return Some(id);
                }
            }
            stack.extend(self.nodes[id].children.iter().rev());
        }
        None
    }

    /// Text of `id` with a line break at every block-level boundary.
    pub fn block_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        let block = match &node.data {
            NodeData::Text(text) => {
                out.push_str(text);
                return;
            }
            NodeData::Element { name, .. } => is_block(name),
            NodeData::Document => false,
        };

        if block {
            out.push('\n');
        }
        for &child in &node.children {
            self.collect_text(child, out);
        }
        if block {
            out.push('\n');
        }
    }
}

/// Readable text of a fetched page.
///
/// Drops non-content elements, then takes the longest of the main-content
/// selector matches, falling back to the whole document when nothing
/// matches or the best match is shorter than [`MIN_MAIN_CONTENT_CHARS`].
pub fn extract_readable_text(html: &str) -> String {
    let mut doc = Document::parse(html);
    doc.remove_elements(&NON_CONTENT_TAGS);

    let mut best = String::new();
    let mut best_len = 0;
    for selector in MAIN_CONTENT_SELECTORS.iter().filter_map(|s| Selector::parse(s)) {
        if let Some(id) = doc.select_first(&selector) {
            let text = collapse_whitespace(&doc.block_text(id));
            let len = text.chars().count();
            if len > best_len {
                best = text;
                best_len = len;
            }
        }
    }

    if best_len < MIN_MAIN_CONTENT_CHARS {
        best = collapse_whitespace(&doc.block_text(doc.root()));
    }
    best
}
