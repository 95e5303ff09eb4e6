//! Immutable document tree produced by [`crate::parse::parse`].
//!
//! Every node keeps the exact source range it was parsed from. Text held by
//! [`Scope`] values is always the raw slice of the original source.

use serde::Serialize;

use crate::location::Range;
use crate::parse::BindingParseError;

/// A piece of source text together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub text: String,
    pub range: Range,
}

impl Scope {
    pub fn new(text: impl Into<String>, range: Range) -> Self {
        Scope {
            text: text.into(),
            range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text {
    pub content: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub content: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: Scope,
    /// Raw (not entity-decoded) value, excluding quotes.
    pub value: Scope,
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub quote: Option<char>,
    /// Covers `name="value"` including the quotes.
    pub range: Range,
}

impl Attribute {
    /// Attribute value with character references decoded.
    pub fn decoded_value(&self) -> String {
        crate::html::decode_entities(&self.value.text).0
    }
}

/// Where a binding was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BindingOwner {
    /// Index into the owning element's `attributes`.
    Attribute { index: usize },
    VirtualElement,
}

/// A `name: param` pair as written in the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingNode {
    pub name: Scope,
    pub param: Scope,
    pub owner: BindingOwner,
    /// Quote character of the owning attribute, if any.
    pub quote: Option<char>,
    /// From the start of the name to the end of the parameter.
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub tag_name: String,
    pub attributes: Vec<Attribute>,
    pub bindings: Vec<BindingNode>,
    /// Set when a binding attribute could not be parsed. `bindings` is
    /// empty in that case.
    pub binding_error: Option<BindingParseError>,
    pub children: Vec<Node>,
    pub range: Range,
    pub start_tag: Range,
    pub end_tag: Option<Range>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attr| attr.name.text.eq_ignore_ascii_case(name))
    }

    /// Range between the start and end tag. Zero-width right after the
    /// start tag's `>` when the element has no content.
    pub fn inner_range(&self) -> Range {
        let start = self.start_tag.end;
        let end = match (&self.end_tag, self.children.last()) {
            (Some(end_tag), _) => end_tag.start,
            (None, Some(last)) => last.range().end,
            (None, None) => start,
        };
        Range::new(start, end)
    }

    pub fn is_void(&self) -> bool {
        crate::html::is_void_element(&self.tag_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualElement {
    pub binding: BindingNode,
    /// Written as `<!-- #ko ... -->`; ignored by the client runtime.
    pub hidden: bool,
    pub children: Vec<Node>,
    pub start_comment: Comment,
    pub end_comment: Comment,
    pub range: Range,
}

impl VirtualElement {
    pub fn inner_range(&self) -> Range {
        Range::new(self.start_comment.range.end, self.end_comment.range.start)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub children: Vec<Node>,
    pub range: Range,
}

/// Any node that can appear as a child.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Node {
    Text(Text),
    Comment(Comment),
    Element(Element),
    VirtualElement(VirtualElement),
}

impl Node {
    pub fn range(&self) -> Range {
        match self {
            Node::Text(text) => text.range,
            Node::Comment(comment) => comment.range,
            Node::Element(element) => element.range,
            Node::VirtualElement(virtual_element) => virtual_element.range,
        }
    }

    pub fn as_parent(&self) -> Option<ParentNode<'_>> {
        match self {
            Node::Element(element) => Some(ParentNode::Element(element)),
            Node::VirtualElement(virtual_element) => {
                Some(ParentNode::VirtualElement(virtual_element))
            }
            Node::Text(_) | Node::Comment(_) => None,
        }
    }
}

/// Any node that can have children.
#[derive(Debug, Clone, Copy)]
pub enum ParentNode<'a> {
    Document(&'a Document),
    Element(&'a Element),
    VirtualElement(&'a VirtualElement),
}

impl<'a> ParentNode<'a> {
    pub fn children(&self) -> &'a [Node] {
        match self {
            ParentNode::Document(document) => &document.children,
            ParentNode::Element(element) => &element.children,
            ParentNode::VirtualElement(virtual_element) => &virtual_element.children,
        }
    }

    pub fn range(&self) -> Range {
        match self {
            ParentNode::Document(document) => document.range,
            ParentNode::Element(element) => element.range,
            ParentNode::VirtualElement(virtual_element) => virtual_element.range,
        }
    }
}

/// An element or virtual element, the two node kinds that carry bindings.
#[derive(Debug, Clone, Copy)]
pub enum BoundNode<'a> {
    Element(&'a Element),
    VirtualElement(&'a VirtualElement),
}

impl<'a> BoundNode<'a> {
    pub fn range(&self) -> Range {
        match self {
            BoundNode::Element(element) => element.range,
            BoundNode::VirtualElement(virtual_element) => virtual_element.range,
        }
    }

    pub fn inner_range(&self) -> Range {
        match self {
            BoundNode::Element(element) => element.inner_range(),
            BoundNode::VirtualElement(virtual_element) => virtual_element.inner_range(),
        }
    }

    pub fn children(&self) -> &'a [Node] {
        match self {
            BoundNode::Element(element) => &element.children,
            BoundNode::VirtualElement(virtual_element) => &virtual_element.children,
        }
    }

    pub fn as_element(&self) -> Option<&'a Element> {
        match self {
            BoundNode::Element(element) => Some(element),
            BoundNode::VirtualElement(_) => None,
        }
    }

    pub fn as_parent(&self) -> ParentNode<'a> {
        match *self {
            BoundNode::Element(element) => ParentNode::Element(element),
            BoundNode::VirtualElement(virtual_element) => {
                ParentNode::VirtualElement(virtual_element)
            }
        }
    }
}
