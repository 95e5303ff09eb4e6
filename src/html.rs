//! Position-exact HTML fragment tree builder.
//!
//! Builds the generic markup tree (elements, text, comments) that
//! [`crate::parse`] refines into virtual elements and bindings. Every node and
//! attribute keeps its UTF-8 byte range in the original source, which is what
//! the renderer edits against. Tree construction follows the fragment parsing
//! rules closely enough for templates: void and raw-text elements, implied end
//! tags for the optional-end-tag elements, and lowercase tag and attribute
//! names. Malformed markup is reported through a callback and never aborts.

use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::location::{LineIndex, Range};
use crate::syntax_tree::{Attribute, Comment, Element, Node, Scope, Text};

/// A recoverable markup error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkupError {
    pub code: &'static str,
    pub message: String,
    pub range: Range,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT CLASSES
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref VOID_ELEMENTS: HashSet<&'static str> = [
        "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img",
        "input", "keygen", "link", "meta", "param", "source", "track", "wbr",
    ]
    .into_iter()
    .collect();

    static ref RAW_TEXT_ELEMENTS: HashSet<&'static str> = [
        "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes",
    ]
    .into_iter()
    .collect();

    /// Elements whose end tag may be omitted.
    static ref OPTIONAL_END_TAG: HashSet<&'static str> = [
        "p", "li", "dt", "dd", "option", "optgroup", "tr", "td", "th", "tbody", "thead",
        "tfoot", "rb", "rt", "rp", "colgroup", "caption", "html", "head", "body",
    ]
    .into_iter()
    .collect();

    /// Start tags that close an open `<p>`.
    static ref CLOSES_P: HashSet<&'static str> = [
        "address", "article", "aside", "blockquote", "center", "details", "dialog", "dir",
        "div", "dl", "dd", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1",
        "h2", "h3", "h4", "h5", "h6", "header", "hgroup", "hr", "li", "main", "menu", "nav",
        "ol", "p", "pre", "section", "summary", "table", "ul",
    ]
    .into_iter()
    .collect();

    static ref SCOPE_BOUNDARIES: HashSet<&'static str> = [
        "applet", "caption", "html", "table", "td", "th", "marquee", "object", "template",
    ]
    .into_iter()
    .collect();

    static ref NAMED_ENTITIES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("amp", "&");
        m.insert("lt", "<");
        m.insert("gt", ">");
        m.insert("quot", "\"");
        m.insert("apos", "'");
        m.insert("nbsp", "\u{a0}");
        m.insert("copy", "\u{a9}");
        m.insert("reg", "\u{ae}");
        m.insert("trade", "\u{2122}");
        m.insert("hellip", "\u{2026}");
        m.insert("mdash", "\u{2014}");
        m.insert("ndash", "\u{2013}");
        m.insert("laquo", "\u{ab}");
        m.insert("raquo", "\u{bb}");
        m.insert("lsquo", "\u{2018}");
        m.insert("rsquo", "\u{2019}");
        m.insert("ldquo", "\u{201c}");
        m.insert("rdquo", "\u{201d}");
        m.insert("bull", "\u{2022}");
        m.insert("middot", "\u{b7}");
        m.insert("times", "\u{d7}");
        m.insert("divide", "\u{f7}");
        m.insert("deg", "\u{b0}");
        m.insert("euro", "\u{20ac}");
        m
    };
}

pub fn is_void_element(tag_name: &str) -> bool {
    VOID_ELEMENTS.contains(tag_name)
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0c)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHARACTER REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Decodes character references in `raw`.
///
/// Returns the decoded text and an offset map with one entry per decoded byte
/// plus a trailing entry for the end: `map[i]` is the offset in `raw` where
/// the character containing decoded byte `i` started.
pub fn decode_entities(raw: &str) -> (String, Vec<usize>) {
    let mut decoded = String::with_capacity(raw.len());
    let mut map = Vec::with_capacity(raw.len() + 1);
    let mut i = 0;

    while i < raw.len() {
        let rest = &raw[i..];
        if rest.starts_with('&') {
            if let Some((text, consumed)) = decode_reference(rest) {
                for _ in 0..text.len() {
                    map.push(i);
                }
                decoded.push_str(&text);
                i += consumed;
                continue;
            }
        }
        let ch = rest.chars().next().unwrap_or('\u{fffd}');
        for _ in 0..ch.len_utf8() {
            map.push(i);
        }
        decoded.push(ch);
        i += ch.len_utf8();
    }

    map.push(raw.len());
    (decoded, map)
}

fn decode_reference(rest: &str) -> Option<(String, usize)> {
    let semicolon = rest[1..].find(';')? + 1;
    let body = &rest[1..semicolon];
    if body.is_empty() || body.len() > 10 {
        return None;
    }
    let text = if let Some(numeric) = body.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        char::from_u32(code).unwrap_or('\u{fffd}').to_string()
    } else {
        NAMED_ENTITIES.get(body)?.to_string()
    };
    Some((text, semicolon + 1))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Parses `source` as an HTML fragment.
///
/// Elements come back with empty `bindings`; binding extraction happens in
/// [`crate::parse`].
pub fn parse_fragment(source: &str, on_error: &mut dyn FnMut(MarkupError)) -> Vec<Node> {
    let mut builder = TreeBuilder {
        source,
        bytes: source.as_bytes(),
        index: LineIndex::new(source),
        pos: 0,
        stack: Vec::new(),
        root: Vec::new(),
        on_error,
    };
    builder.run();
    builder.finish()
}

struct OpenElement {
    tag_name: String,
    attributes: Vec<Attribute>,
    start_tag: Range,
    children: Vec<Node>,
    foreign: bool,
}

struct TreeBuilder<'s, 'e> {
    source: &'s str,
    bytes: &'s [u8],
    index: LineIndex,
    pos: usize,
    stack: Vec<OpenElement>,
    root: Vec<Node>,
    on_error: &'e mut dyn FnMut(MarkupError),
}

impl<'s, 'e> TreeBuilder<'s, 'e> {
    fn run(&mut self) {
        while self.pos < self.source.len() {
            match self.source[self.pos..].find('<') {
                None => {
                    self.push_text(self.pos, self.source.len());
                    self.pos = self.source.len();
                }
                Some(0) => self.markup(),
                Some(distance) => {
                    self.push_text(self.pos, self.pos + distance);
                    self.pos += distance;
                }
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(top) = self.stack.last() {
            if !OPTIONAL_END_TAG.contains(top.tag_name.as_str()) {
                let range = top.start_tag;
                let message = format!("Open elements left after EOF: <{}>", top.tag_name);
                self.error("open-elements-left-after-eof", message, range);
            }
            self.pop_element(None);
        }
        self.root
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, range: Range) {
        (self.on_error)(MarkupError {
            code,
            message: message.into(),
            range,
        });
    }

    fn range(&self, start: usize, end: usize) -> Range {
        self.index.range(start, end)
    }

    fn children_mut(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(open) => &mut open.children,
            None => &mut self.root,
        }
    }

    fn push_node(&mut self, node: Node) {
        self.children_mut().push(node);
    }

    fn push_text(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let source = self.source;
        let range = self.range(start, end);

        // Adjacent runs (e.g. a stray `<`) collapse into a single node.
        if let Some(Node::Text(previous)) = self.children_mut().last_mut() {
            if previous.range.end.offset() == start {
                let merged_start = previous.range.start.offset();
                previous.range = Range::new(previous.range.start, range.end);
                previous.content = decode_entities(&source[merged_start..end]).0;
                return;
            }
        }

        let content = decode_entities(&source[start..end]).0;
        self.push_node(Node::Text(Text { content, range }));
    }

    fn markup(&mut self) {
        let rest = &self.source[self.pos..];
        let next = self.bytes.get(self.pos + 1).copied();

        if rest.starts_with("<!--") {
            self.comment();
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            self.bogus_comment();
        } else if rest.starts_with("</") {
            match self.bytes.get(self.pos + 2) {
                Some(byte) if byte.is_ascii_alphabetic() => self.end_tag(),
                Some(b'>') => {
                    let range = self.range(self.pos, self.pos + 3);
                    self.error("missing-end-tag-name", "Missing end tag name", range);
                    self.pos += 3;
                }
                _ => self.bogus_comment(),
            }
        } else if next.is_some_and(|byte| byte.is_ascii_alphabetic()) {
            self.start_tag();
        } else {
            self.push_text(self.pos, self.pos + 1);
            self.pos += 1;
        }
    }

    fn comment(&mut self) {
        let start = self.pos;
        let content_start = start + 4;
        let rest = &self.source[content_start..];

        let (content_end, end) = if rest.starts_with('>') {
            (content_start, content_start + 1)
        } else if rest.starts_with("->") {
            (content_start, content_start + 2)
        } else {
            match rest.find("-->") {
                Some(close) => (content_start + close, content_start + close + 3),
                None => {
                    let range = self.range(start, self.source.len());
                    self.error("eof-in-comment", "Unexpected end of file in comment", range);
                    (self.source.len(), self.source.len())
                }
            }
        };

        let content = self.source[content_start..content_end].to_string();
        let range = self.range(start, end);
        self.push_node(Node::Comment(Comment { content, range }));
        self.pos = end;
    }

    fn bogus_comment(&mut self) {
        let start = self.pos;
        let end = self.source[start..]
            .find('>')
            .map(|close| start + close + 1)
            .unwrap_or(self.source.len());
        let raw = &self.source[start..end];

        if raw.len() > 9 && raw[2..9].eq_ignore_ascii_case("doctype") {
            // Left in place as text; the renderer never touches it.
            self.push_text(start, end);
        } else {
            let body_start = if raw.starts_with("</") { 2 } else { 1 };
            let body_end = if raw.ends_with('>') { raw.len() - 1 } else { raw.len() };
            let content = raw[body_start..body_end.max(body_start)].to_string();
            let range = self.range(start, end);
            self.error(
                "incorrectly-opened-comment",
                "Incorrectly opened comment",
                range,
            );
            self.push_node(Node::Comment(Comment { content, range }));
        }
        self.pos = end;
    }

    fn scan_name(&self, from: usize) -> usize {
        let mut i = from;
        while i < self.bytes.len() && !is_whitespace(self.bytes[i]) && !matches!(self.bytes[i], b'/' | b'>') {
            i += 1;
        }
        i
    }

    fn skip_whitespace(&self, from: usize) -> usize {
        let mut i = from;
        while i < self.bytes.len() && is_whitespace(self.bytes[i]) {
            i += 1;
        }
        i
    }

    fn start_tag(&mut self) {
        let start = self.pos;
        let name_end = self.scan_name(start + 1);
        let tag_name = self.source[start + 1..name_end].to_ascii_lowercase();

        let mut attributes: Vec<Attribute> = Vec::new();
        let mut self_closing = false;
        let mut closed = false;
        let mut i = name_end;

        loop {
            i = self.skip_whitespace(i);
            if i >= self.bytes.len() {
                break;
            }
            match self.bytes[i] {
                b'>' => {
                    i += 1;
                    closed = true;
                    break;
                }
                b'/' => {
                    if self.bytes.get(i + 1) == Some(&b'>') {
                        self_closing = true;
                        closed = true;
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                _ => {
                    let (attribute, next) = self.attribute(i);
                    i = next;
                    if attributes.iter().any(|a| a.name.text == attribute.name.text) {
                        let message = format!("Duplicate attribute: {}", attribute.name.text);
                        self.error("duplicate-attribute", message, attribute.range);
                    } else {
                        attributes.push(attribute);
                    }
                }
            }
        }

        if !closed {
            let range = self.range(start, self.source.len());
            self.error("eof-in-tag", "Unexpected end of file in tag", range);
            self.pos = self.source.len();
            return;
        }

        self.pos = i;
        let start_tag = self.range(start, i);
        self.insert_element(tag_name, attributes, start_tag, self_closing);
    }

    /// Parses one attribute starting at `start`, returning it with the offset
    /// right after it.
    fn attribute(&mut self, start: usize) -> (Attribute, usize) {
        // The first character may be `=`; it is part of the name then.
        let mut i = start + 1;
        while i < self.bytes.len()
            && !is_whitespace(self.bytes[i])
            && !matches!(self.bytes[i], b'/' | b'>' | b'=')
        {
            i += 1;
        }
        let name_end = i;
        let name_text = self.source[start..name_end].to_ascii_lowercase();

        let mut value_start = name_end;
        let mut value_end = name_end;
        let mut end = name_end;
        let mut quote = None;

        let after_name = self.skip_whitespace(name_end);
        if self.bytes.get(after_name) == Some(&b'=') {
            let j = self.skip_whitespace(after_name + 1);
            match self.bytes.get(j) {
                Some(&q @ (b'"' | b'\'')) => {
                    quote = Some(q as char);
                    value_start = j + 1;
                    match self.source[value_start..].find(q as char) {
                        Some(close) => {
                            value_end = value_start + close;
                            end = value_end + 1;
                        }
                        None => {
                            value_end = self.source.len();
                            end = value_end;
                        }
                    }
                }
                _ => {
                    let mut k = j;
                    while k < self.bytes.len() && !is_whitespace(self.bytes[k]) && self.bytes[k] != b'>' {
                        k += 1;
                    }
                    value_start = j;
                    value_end = k;
                    end = k;
                }
            }
        }

        let (prefix, namespace) = match name_text.split_once(':') {
            Some(("xlink", _)) => (Some("xlink"), Some("http://www.w3.org/1999/xlink")),
            Some(("xml", _)) => (Some("xml"), Some("http://www.w3.org/XML/1998/namespace")),
            Some(("xmlns", _)) => (Some("xmlns"), Some("http://www.w3.org/2000/xmlns/")),
            _ => (None, None),
        };

        let attribute = Attribute {
            name: Scope::new(name_text, self.range(start, name_end)),
            value: Scope::new(
                &self.source[value_start..value_end],
                self.range(value_start, value_end),
            ),
            namespace: namespace.map(str::to_string),
            prefix: prefix.map(str::to_string),
            quote,
            range: self.range(start, end),
        };
        (attribute, end)
    }

    fn insert_element(
        &mut self,
        tag_name: String,
        attributes: Vec<Attribute>,
        start_tag: Range,
        self_closing: bool,
    ) {
        self.close_implied(&tag_name);

        let parent_foreign = self.stack.last().is_some_and(|open| open.foreign);
        let foreign = parent_foreign || tag_name == "svg" || tag_name == "math";

        if is_void_element(&tag_name) || (self_closing && foreign) {
            self.push_node(Node::Element(Element {
                tag_name,
                attributes,
                bindings: Vec::new(),
                binding_error: None,
                children: Vec::new(),
                range: start_tag,
                start_tag,
                end_tag: None,
            }));
            return;
        }

        if self_closing {
            self.error(
                "non-void-html-element-start-tag-with-trailing-solidus",
                format!("Self-closing syntax on non-void element <{}>", tag_name),
                start_tag,
            );
        }

        if !foreign && RAW_TEXT_ELEMENTS.contains(tag_name.as_str()) {
            self.raw_text_element(tag_name, attributes, start_tag);
            return;
        }

        self.stack.push(OpenElement {
            tag_name,
            attributes,
            start_tag,
            children: Vec::new(),
            foreign,
        });
    }

    fn raw_text_element(&mut self, tag_name: String, attributes: Vec<Attribute>, start_tag: Range) {
        let content_start = self.pos;
        let needle = format!("</{}", tag_name);
        let lower = self.source[content_start..].to_ascii_lowercase();

        let close = lower.match_indices(&needle).map(|(at, _)| content_start + at).find(|&at| {
            self.bytes
                .get(at + needle.len())
                .map_or(true, |&byte| is_whitespace(byte) || matches!(byte, b'/' | b'>'))
        });

        let mut children = Vec::new();
        let (content_end, end_tag) = match close {
            Some(at) => {
                let end = self.source[at..]
                    .find('>')
                    .map(|gt| at + gt + 1)
                    .unwrap_or(self.source.len());
                (at, Some(self.range(at, end)))
            }
            None => {
                let range = self.range(start_tag.start.offset(), self.source.len());
                let message = format!("Unexpected end of file in <{}>", tag_name);
                self.error("eof-in-element-that-can-contain-only-text", message, range);
                (self.source.len(), None)
            }
        };

        if content_end > content_start {
            let raw = &self.source[content_start..content_end];
            children.push(Node::Text(Text {
                content: raw.to_string(),
                range: self.range(content_start, content_end),
            }));
        }

        let end = end_tag.map(|range| range.end).unwrap_or_else(|| {
            children.last().map(|node| node.range().end).unwrap_or(start_tag.end)
        });
        self.pos = end.offset();
        self.push_node(Node::Element(Element {
            tag_name,
            attributes,
            bindings: Vec::new(),
            binding_error: None,
            children,
            range: Range::new(start_tag.start, end),
            start_tag,
            end_tag,
        }));
    }

    fn end_tag(&mut self) {
        let start = self.pos;
        let name_end = self.scan_name(start + 2);
        let tag_name = self.source[start + 2..name_end].to_ascii_lowercase();

        let end = match self.source[name_end..].find('>') {
            Some(gt) => name_end + gt + 1,
            None => {
                let range = self.range(start, self.source.len());
                self.error("eof-in-tag", "Unexpected end of file in tag", range);
                self.pos = self.source.len();
                return;
            }
        };
        self.pos = end;
        let range = self.range(start, end);

        let Some(index) = self.stack.iter().rposition(|open| open.tag_name == tag_name) else {
            self.error(
                "end-tag-without-matching-open-element",
                format!("End tag without matching open element: </{}>", tag_name),
                range,
            );
            return;
        };

        while self.stack.len() > index + 1 {
            if let Some(top) = self.stack.last() {
                if !OPTIONAL_END_TAG.contains(top.tag_name.as_str()) {
                    let message = format!(
                        "Closing </{}> while <{}> is still open",
                        tag_name, top.tag_name
                    );
                    self.error("closing-of-element-with-open-child-elements", message, range);
                }
            }
            self.pop_element(None);
        }
        self.pop_element(Some(range));
    }

    /// Closes the nearest open element named in `targets`, unless a scope
    /// boundary or one of `boundaries` comes first.
    fn close_in_scope(&mut self, targets: &[&str], boundaries: &[&str]) {
        let mut found = None;
        for (index, open) in self.stack.iter().enumerate().rev() {
            let name = open.tag_name.as_str();
            if targets.contains(&name) {
                found = Some(index);
                break;
            }
            if boundaries.contains(&name) || SCOPE_BOUNDARIES.contains(name) {
                break;
            }
        }
        if let Some(index) = found {
            while self.stack.len() > index {
                self.pop_element(None);
            }
        }
    }

    fn close_implied(&mut self, tag_name: &str) {
        match tag_name {
            "li" => self.close_in_scope(&["li"], &["ul", "ol", "menu"]),
            "dt" | "dd" => self.close_in_scope(&["dt", "dd"], &["dl"]),
            "option" => self.close_in_scope(&["option"], &["select", "datalist", "optgroup"]),
            "optgroup" => self.close_in_scope(&["option", "optgroup"], &["select"]),
            "tr" => self.close_in_scope(&["tr"], &["tbody", "thead", "tfoot"]),
            "td" | "th" => self.close_in_scope(&["td", "th"], &["tr"]),
            "tbody" | "thead" | "tfoot" => self.close_in_scope(&["tbody", "thead", "tfoot"], &[]),
            _ => {}
        }
        if CLOSES_P.contains(tag_name) {
            self.close_in_scope(&["p"], &["button"]);
        }
    }

    fn pop_element(&mut self, end_tag: Option<Range>) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        let end = match (&end_tag, open.children.last()) {
            (Some(range), _) => range.end,
            (None, Some(last)) => last.range().end,
            (None, None) => open.start_tag.end,
        };
        let element = Element {
            tag_name: open.tag_name,
            attributes: open.attributes,
            bindings: Vec::new(),
            binding_error: None,
            children: open.children,
            range: Range::new(open.start_tag.start, end),
            start_tag: open.start_tag,
            end_tag,
        };
        self.push_node(Node::Element(element));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Node> {
        let mut errors = Vec::new();
        let nodes = parse_fragment(source, &mut |error| errors.push(error));
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        nodes
    }

    fn element(node: &Node) -> &Element {
        match node {
            Node::Element(element) => element,
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_element_ranges() {
        let source = "<div class=\"a\"><span>hi</span></div>";
        let nodes = parse_ok(source);
        assert_eq!(nodes.len(), 1);
        let div = element(&nodes[0]);
        assert_eq!(div.tag_name, "div");
        assert_eq!(div.range.slice(source), source);
        assert_eq!(div.start_tag.slice(source), "<div class=\"a\">");
        assert_eq!(div.end_tag.unwrap().slice(source), "</div>");
        assert_eq!(div.inner_range().slice(source), "<span>hi</span>");

        let attr = &div.attributes[0];
        assert_eq!(attr.name.text, "class");
        assert_eq!(attr.value.text, "a");
        assert_eq!(attr.value.range.slice(source), "a");
        assert_eq!(attr.range.slice(source), "class=\"a\"");
        assert_eq!(attr.quote, Some('"'));
    }

    #[test]
    fn test_unquoted_and_valueless_attributes() {
        let source = "<input type=text disabled>";
        let nodes = parse_ok(source);
        let input = element(&nodes[0]);
        assert_eq!(input.attributes.len(), 2);
        assert_eq!(input.attributes[0].value.text, "text");
        assert_eq!(input.attributes[0].quote, None);
        assert_eq!(input.attributes[1].name.text, "disabled");
        assert!(input.attributes[1].value.range.is_empty());
        assert!(input.end_tag.is_none());
    }

    #[test]
    fn test_void_element_inner_range_is_empty() {
        let source = "<br><p>x</p>";
        let nodes = parse_ok(source);
        let br = element(&nodes[0]);
        let inner = br.inner_range();
        assert!(inner.is_empty());
        assert_eq!(inner.start.offset(), 4);
    }

    #[test]
    fn test_empty_element_inner_range_follows_start_tag() {
        let source = "<div data-bind=\"text: x\"></div>";
        let nodes = parse_ok(source);
        let div = element(&nodes[0]);
        assert!(div.inner_range().is_empty());
        assert_eq!(div.inner_range().start.offset(), source.find("></").unwrap() + 1);
    }

    #[test]
    fn test_implied_list_item_end() {
        let nodes = parse_ok("<ul><li>a<li>b</ul>");
        let ul = element(&nodes[0]);
        assert_eq!(ul.children.len(), 2);
        assert!(ul.children.iter().all(|child| element(child).tag_name == "li"));
    }

    #[test]
    fn test_raw_text_content_is_not_parsed() {
        let source = "<script type=\"text/html\"><div data-bind=\"text: x\"></div></script>";
        let nodes = parse_ok(source);
        let script = element(&nodes[0]);
        assert_eq!(script.children.len(), 1);
        assert!(matches!(script.children[0], Node::Text(_)));
    }

    #[test]
    fn test_comments() {
        let source = "a<!-- ko text: x --><!---->b";
        let nodes = parse_ok(source);
        assert_eq!(nodes.len(), 4);
        match &nodes[1] {
            Node::Comment(comment) => {
                assert_eq!(comment.content, " ko text: x ");
                assert_eq!(comment.range.slice(source), "<!-- ko text: x -->");
            }
            other => panic!("expected comment, got {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_end_tag_reports_error() {
        let mut errors = Vec::new();
        let nodes = parse_fragment("<div></span></div>", &mut |error| errors.push(error));
        assert_eq!(nodes.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "end-tag-without-matching-open-element");
    }

    #[test]
    fn test_unclosed_element_reports_error() {
        let mut errors = Vec::new();
        let nodes = parse_fragment("<div><span>x", &mut |error| errors.push(error));
        assert_eq!(nodes.len(), 1);
        assert_eq!(errors.len(), 2);
        let div = element(&nodes[0]);
        assert!(div.end_tag.is_none());
        assert_eq!(div.range.end.offset(), 12);
    }

    #[test]
    fn test_decode_entities_offset_map() {
        let (decoded, map) = decode_entities("a &amp; b");
        assert_eq!(decoded, "a & b");
        assert_eq!(map.len(), decoded.len() + 1);
        assert_eq!(map[2], 2);
        assert_eq!(map[3], 7);
        assert_eq!(*map.last().unwrap(), 9);
    }

    #[test]
    fn test_decode_numeric_and_unknown_references() {
        assert_eq!(decode_entities("&#65;&#x42;").0, "AB");
        assert_eq!(decode_entities("&bogus; &").0, "&bogus; &");
        assert_eq!(decode_entities("&quot;x&quot;").0, "\"x\"");
    }
}
