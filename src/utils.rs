//! Helpers shared by the renderer and plugins: escaping, ids and start-tag
//! editing.
//!
//! Attribute helpers read the element's start tag *as currently edited*, so
//! several plugins can touch the same attribute one after another.

use std::cell::Cell;
use std::rc::Rc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cssparser::{Delimiter, ParseError, Parser, ParserInput};
use sha2::{Digest, Sha256};

use crate::html::parse_fragment;
use crate::magic_string::{EditError, MagicString};
use crate::syntax_tree::{BoundNode, Element, Node};

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes `s` for a JavaScript string literal delimited by `quote`. Both
/// quote characters are escaped when `quote` is `None`.
pub fn escape_js(s: &str, quote: Option<char>) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' if quote != Some('\'') => out.push_str("\\\""),
            '\'' if quote != Some('"') => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out
}

/// Short content hash used for template ids.
pub fn random_id(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)[..8].to_string()
}

/// Template ids for one render. A sequence number is hashed along with the
/// whitespace-normalized content, so the same markup extracted twice still
/// gets two ids.
#[derive(Debug, Clone, Default)]
pub struct TemplateIds {
    issued: Rc<Cell<usize>>,
}

impl TemplateIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&self, content: &str) -> String {
        let sequence = self.issued.get();
        self.issued.set(sequence + 1);
        let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
        random_id(&format!("{}:{}", sequence, normalized))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// START TAG EDITING
// ═══════════════════════════════════════════════════════════════════════════════

fn current_start_tag(generated: &MagicString, element: &Element) -> Result<Option<Element>, EditError> {
    let (start, end) = element.start_tag.offsets();
    let text = generated.slice(start, end)?;
    let nodes = parse_fragment(&text, &mut |_| {});
    Ok(nodes.into_iter().find_map(|node| match node {
        Node::Element(element) => Some(element),
        _ => None,
    }))
}

pub fn get_attribute(generated: &MagicString, element: &Element, name: &str) -> Result<Option<String>, EditError> {
    Ok(current_start_tag(generated, element)?
        .and_then(|current| current.attribute(name).map(|attr| attr.decoded_value())))
}

/// Sets or (with `None`) removes an attribute. The value is HTML-escaped.
pub fn set_attribute(
    generated: &mut MagicString,
    element: &Element,
    name: &str,
    value: Option<&str>,
) -> Result<(), EditError> {
    if let Some(original) = element.attribute(name) {
        let (start, end) = original.range.offsets();
        return match value {
            Some(value) => generated
                .update(start, end, &format!("{}=\"{}\"", original.name.text, escape_html(value)))
                .map(|_| ()),
            None => generated.remove(start, end).map(|_| ()),
        };
    }

    let (tag_start, tag_end) = element.start_tag.offsets();
    let source = &generated.original()[tag_start..tag_end];
    let delimiter = if source.ends_with("/>") {
        "/>"
    } else if source.ends_with('>') {
        ">"
    } else {
        tracing::debug!(tag = %element.tag_name, "start tag is not terminated, skipping attribute {}", name);
        return Ok(());
    };

    // Attributes added by earlier edits live in front of the delimiter and
    // are rewritten together.
    let mut added = String::new();
    if let Some(current) = current_start_tag(generated, element)? {
        for attr in &current.attributes {
            let attr_name = &attr.name.text;
            if element.attribute(attr_name).is_none() && !attr_name.eq_ignore_ascii_case(name) {
                added.push_str(&format!(" {}=\"{}\"", attr_name, escape_html(&attr.decoded_value())));
            }
        }
    }
    if let Some(value) = value {
        added.push_str(&format!(" {}=\"{}\"", name, escape_html(value)));
    }
    added.push_str(delimiter);

    generated.update(tag_end - delimiter.len(), tag_end, &added)?;
    Ok(())
}

fn class_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

pub fn has_class(generated: &MagicString, element: &Element, class_name: &str) -> Result<bool, EditError> {
    Ok(get_attribute(generated, element, "class")?
        .is_some_and(|value| class_list(&value).iter().any(|c| c == class_name)))
}

pub fn add_class(generated: &mut MagicString, element: &Element, class_name: &str) -> Result<(), EditError> {
    match get_attribute(generated, element, "class")? {
        None => set_attribute(generated, element, "class", Some(class_name)),
        Some(value) => {
            let mut classes = class_list(&value);
            if classes.iter().any(|c| c == class_name) {
                return Ok(());
            }
            classes.push(class_name.to_string());
            set_attribute(generated, element, "class", Some(&classes.join(" ")))
        }
    }
}

pub fn remove_class(generated: &mut MagicString, element: &Element, class_name: &str) -> Result<(), EditError> {
    let Some(value) = get_attribute(generated, element, "class")? else {
        return Ok(());
    };
    let mut classes = class_list(&value);
    let before = classes.len();
    classes.retain(|c| c != class_name);
    if classes.len() == before {
        return Ok(());
    }
    set_attribute(generated, element, "class", Some(&classes.join(" ")))
}

/// Sets (or with `None` removes) one inline style declaration. New
/// declarations go first.
pub fn set_style(
    generated: &mut MagicString,
    element: &Element,
    property: &str,
    value: Option<&str>,
) -> Result<(), EditError> {
    let current = get_attribute(generated, element, "style")?.unwrap_or_default();
    let mut declarations = style_declarations(&current);
    let before = declarations.len();
    declarations.retain(|(name, _)| !name.as_deref().is_some_and(|name| name.eq_ignore_ascii_case(property)));

    match value {
        Some(value) => declarations.insert(0, (Some(property.to_string()), format!("{}: {}", property, value))),
        None if declarations.len() == before => return Ok(()),
        None => {}
    }

    if declarations.is_empty() {
        return set_attribute(generated, element, "style", None);
    }
    let style = declarations
        .iter()
        .map(|(_, declaration)| format!("{};", declaration))
        .collect::<Vec<_>>()
        .join(" ");
    set_attribute(generated, element, "style", Some(&style))
}

/// Splits an inline style at its top-level semicolons. Each entry is the
/// property name, if the declaration starts with one, and the declaration
/// text as written. Strings and blocks such as `url(..)` are never split.
fn style_declarations(style: &str) -> Vec<(Option<String>, String)> {
    let mut input = ParserInput::new(style);
    let mut parser = Parser::new(&mut input);
    let mut declarations = Vec::new();
    loop {
        let start = parser.position();
        let name = parser.parse_until_before(Delimiter::Semicolon, declaration_name).ok();
        let declaration = parser.slice_from(start).trim();
        if !declaration.is_empty() {
            declarations.push((name, declaration.to_string()));
        }
        if parser.next().is_err() {
            return declarations;
        }
    }
}

fn declaration_name<'i>(parser: &mut Parser<'i, '_>) -> Result<String, ParseError<'i, ()>> {
    let name = parser.expect_ident()?.to_string();
    parser.expect_colon()?;
    while parser.next().is_ok() {}
    Ok(name)
}

/// Moves the node's current inner markup into a `<template>` placed right
/// before the node and returns the template id.
pub fn extract_into_template(
    generated: &mut MagicString,
    node: BoundNode<'_>,
    ids: &TemplateIds,
) -> Result<String, EditError> {
    let (start, end) = node.inner_range().offsets();
    let inner_html = generated.slice(start, end)?;
    let id = ids.generate(&inner_html);

    generated.remove(start, end)?;
    insert_template(generated, node, &id, &inner_html)?;
    Ok(id)
}

/// Places `<template id="..">content</template>` right before the node,
/// attached to the node so it travels with fragments rendered from a parent.
pub fn insert_template(
    generated: &mut MagicString,
    node: BoundNode<'_>,
    id: &str,
    content: &str,
) -> Result<(), EditError> {
    generated.append_right(
        node.range().start.offset(),
        &format!("<template id=\"{}\">{}</template>", escape_html(id), content),
    )?;
    Ok(())
}

/// Writes `content` as the node's inner markup, replacing what an earlier
/// call wrote.
pub fn set_inner(generated: &mut MagicString, node: BoundNode<'_>, content: &str) -> Result<(), EditError> {
    let (start, end) = node.inner_range().offsets();
    if start == end {
        generated.overwrite_left(start, content)?;
    } else {
        generated.update(start, end, content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};
    use crate::syntax_tree::Document;

    fn first_element(document: &Document) -> &Element {
        document
            .children
            .iter()
            .find_map(|node| match node {
                Node::Element(element) => Some(element),
                _ => None,
            })
            .expect("element")
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/a&gt;");
    }

    #[test]
    fn test_escape_js() {
        assert_eq!(escape_js("a'b\"c\n", Some('\'')), "a\\'b\"c\\n");
        assert_eq!(escape_js("a'b\"c", Some('"')), "a'b\\\"c");
        assert_eq!(escape_js("a'b\"c\\", None), "a\\'b\\\"c\\\\");
    }

    #[test]
    fn test_random_id_is_stable() {
        let id = random_id("<p>hello</p>");
        assert_eq!(id.len(), 8);
        assert_eq!(id, random_id("<p>hello</p>"));
        assert_ne!(id, random_id("<p>world</p>"));
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_template_ids_are_unique_per_render() {
        let ids = TemplateIds::new();
        let first = ids.generate("<p>same</p>");
        let second = ids.clone().generate("<p>same</p>");
        assert_ne!(first, second);
        assert_eq!(first, TemplateIds::new().generate("<p>  same</p>"));
    }

    #[test]
    fn test_set_new_attributes_repeatedly() {
        let source = "<div id=\"a\"></div>";
        let document = parse(source, ParseOptions::default()).unwrap();
        let element = first_element(&document);
        let mut generated = MagicString::new(source);

        set_attribute(&mut generated, element, "title", Some("x & y")).unwrap();
        set_attribute(&mut generated, element, "lang", Some("fr")).unwrap();
        set_attribute(&mut generated, element, "title", Some("z")).unwrap();
        assert_eq!(generated.to_string(), "<div id=\"a\" lang=\"fr\" title=\"z\"></div>");

        set_attribute(&mut generated, element, "lang", None).unwrap();
        assert_eq!(generated.to_string(), "<div id=\"a\" title=\"z\"></div>");
        assert_eq!(get_attribute(&generated, element, "title").unwrap().as_deref(), Some("z"));
    }

    #[test]
    fn test_set_existing_attribute() {
        let source = "<input value='old' disabled>";
        let document = parse(source, ParseOptions::default()).unwrap();
        let element = first_element(&document);
        let mut generated = MagicString::new(source);

        set_attribute(&mut generated, element, "value", Some("new")).unwrap();
        set_attribute(&mut generated, element, "disabled", None).unwrap();
        assert_eq!(generated.to_string(), "<input value=\"new\" >");
    }

    #[test]
    fn test_classes() {
        let source = "<p class=\"a b\"></p>";
        let document = parse(source, ParseOptions::default()).unwrap();
        let element = first_element(&document);
        let mut generated = MagicString::new(source);

        add_class(&mut generated, element, "c").unwrap();
        add_class(&mut generated, element, "a").unwrap();
        remove_class(&mut generated, element, "b").unwrap();
        assert!(has_class(&generated, element, "c").unwrap());
        assert!(!has_class(&generated, element, "b").unwrap());
        assert_eq!(generated.to_string(), "<p class=\"a c\"></p>");
    }

    #[test]
    fn test_set_style() {
        let source = "<p style=\"color: red\"></p><br/>";
        let document = parse(source, ParseOptions::default()).unwrap();
        let element = first_element(&document);
        let mut generated = MagicString::new(source);

        set_style(&mut generated, element, "display", Some("none")).unwrap();
        assert_eq!(generated.to_string(), "<p style=\"display: none; color: red;\"></p><br/>");
        set_style(&mut generated, element, "display", None).unwrap();
        assert_eq!(generated.to_string(), "<p style=\"color: red;\"></p><br/>");
    }

    #[test]
    fn test_style_declarations_keep_strings_and_blocks() {
        let declarations = style_declarations("background: url('a;b.png') ; content: \"x;y\"; color:red;;");
        assert_eq!(
            declarations,
            vec![
                (Some("background".to_string()), "background: url('a;b.png')".to_string()),
                (Some("content".to_string()), "content: \"x;y\"".to_string()),
                (Some("color".to_string()), "color:red".to_string()),
            ]
        );
        assert!(style_declarations("  ").is_empty());
    }

    #[test]
    fn test_extract_into_template() {
        let source = "<div><b>x</b></div>";
        let document = parse(source, ParseOptions::default()).unwrap();
        let element = first_element(&document);
        let mut generated = MagicString::new(source);

        let id = extract_into_template(&mut generated, BoundNode::Element(element), &TemplateIds::new()).unwrap();
        assert_eq!(
            generated.to_string(),
            format!("<template id=\"{}\"><b>x</b></template><div></div>", id)
        );
    }

    #[test]
    fn test_set_inner() {
        let source = "<p></p><i>old</i>";
        let document = parse(source, ParseOptions::default()).unwrap();
        let elements: Vec<&Element> = document
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Element(element) => Some(element),
                _ => None,
            })
            .collect();
        let mut generated = MagicString::new(source);
        set_inner(&mut generated, BoundNode::Element(elements[0]), "a").unwrap();
        set_inner(&mut generated, BoundNode::Element(elements[1]), "b").unwrap();
        assert_eq!(generated.to_string(), "<p>a</p><i>b</i>");

        set_inner(&mut generated, BoundNode::Element(elements[0]), "c").unwrap();
        set_inner(&mut generated, BoundNode::Element(elements[1]), "d").unwrap();
        assert_eq!(generated.to_string(), "<p>c</p><i>d</i>");
    }
}
