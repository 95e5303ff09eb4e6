//! Document parser.
//!
//! Builds on [`crate::html`]: groups `<!-- ko name: param -->` ...
//! `<!-- /ko -->` comment pairs into virtual elements and extracts the
//! bindings of every binding attribute (`data-bind` by default) with exact
//! source ranges for each binding name and parameter.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, ObjectPropertyKind, PropertyKey, PropertyKind};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use regex::Regex;
use serde::Serialize;

use crate::html::{self, MarkupError};
use crate::location::{LineIndex, Range};
use crate::syntax_tree::{
    Attribute, BindingNode, BindingOwner, Comment, Document, Element, Node, Scope, VirtualElement,
};

lazy_static! {
    static ref VIRTUAL_ELEMENT_START: Regex =
        Regex::new(r"^(?s)(\s*(#?)ko\s+)(\S+)(\s*:\s*)(.*?)(\s*)$").unwrap();
    static ref VIRTUAL_ELEMENT_END: Regex = Regex::new(r"^(?s)\s*/ko\s.*$").unwrap();
}

pub const DEFAULT_BINDING_ATTRIBUTE: &str = "data-bind";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Unbalanced virtual element (knockout comment) at {range}")]
    UnbalancedVirtualElement { range: Range },
}

impl ParseError {
    pub fn range(&self) -> Range {
        match self {
            ParseError::UnbalancedVirtualElement { range } => *range,
        }
    }
}

/// A binding attribute whose value is not a valid binding list.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct BindingParseError {
    pub message: String,
    pub range: Range,
}

pub struct ParseOptions<'a> {
    /// Attribute names whose values hold bindings.
    pub binding_attributes: Vec<String>,
    /// Receives recoverable markup errors.
    pub on_error: Option<&'a mut dyn FnMut(MarkupError)>,
}

impl Default for ParseOptions<'_> {
    fn default() -> Self {
        ParseOptions {
            binding_attributes: vec![DEFAULT_BINDING_ATTRIBUTE.to_string()],
            on_error: None,
        }
    }
}

impl<'a> ParseOptions<'a> {
    pub fn with_binding_attributes(mut self, attributes: Vec<String>) -> Self {
        self.binding_attributes = attributes;
        self
    }

    pub fn with_on_error(mut self, on_error: &'a mut dyn FnMut(MarkupError)) -> Self {
        self.on_error = Some(on_error);
        self
    }
}

/// Parses `source` into a [`Document`].
///
/// Markup errors never fail the parse; they go to `options.on_error`. A
/// binding attribute that fails to parse leaves its element without
/// bindings and records the failure in [`Element::binding_error`]. Only an
/// opened but never closed virtual element is fatal.
pub fn parse(source: &str, options: ParseOptions<'_>) -> Result<Document, ParseError> {
    let ParseOptions {
        binding_attributes,
        on_error,
    } = options;

    let nodes = match on_error {
        Some(on_error) => html::parse_fragment(source, on_error),
        None => html::parse_fragment(source, &mut |error| {
            tracing::debug!(code = error.code, range = %error.range, "{}", error.message);
        }),
    };

    let parser = DocumentParser {
        source,
        index: LineIndex::new(source),
        binding_attributes,
    };
    let children = parser.refine(nodes)?;

    Ok(Document {
        children,
        range: parser.index.range(0, source.len()),
    })
}

struct DocumentParser<'s> {
    source: &'s str,
    index: LineIndex,
    binding_attributes: Vec<String>,
}

impl DocumentParser<'_> {
    fn refine(&self, nodes: Vec<Node>) -> Result<Vec<Node>, ParseError> {
        let mut refined = Vec::with_capacity(nodes.len());
        let mut iter = nodes.into_iter();
        while let Some(node) = iter.next() {
            refined.push(self.refine_node(node, &mut iter)?);
        }
        Ok(refined)
    }

    fn refine_node(
        &self,
        node: Node,
        siblings: &mut impl Iterator<Item = Node>,
    ) -> Result<Node, ParseError> {
        match node {
            Node::Comment(comment) if VIRTUAL_ELEMENT_START.is_match(&comment.content) => {
                self.virtual_element(comment, siblings)
            }
            Node::Element(mut element) => {
                let children = std::mem::take(&mut element.children);
                element.children = self.refine(children)?;
                self.extract_bindings(&mut element);
                Ok(Node::Element(element))
            }
            other => Ok(other),
        }
    }

    fn virtual_element(
        &self,
        start_comment: Comment,
        siblings: &mut impl Iterator<Item = Node>,
    ) -> Result<Node, ParseError> {
        let mut balance = 1usize;
        let mut children = Vec::new();
        let mut end_comment = None;

        for sibling in siblings.by_ref() {
            if let Node::Comment(comment) = &sibling {
                if VIRTUAL_ELEMENT_START.is_match(&comment.content) {
                    balance += 1;
                } else if VIRTUAL_ELEMENT_END.is_match(&comment.content) {
                    balance -= 1;
                    if balance == 0 {
                        if let Node::Comment(comment) = sibling {
                            end_comment = Some(comment);
                        }
                        break;
                    }
                }
            }
            children.push(sibling);
        }

        let Some(end_comment) = end_comment else {
            return Err(ParseError::UnbalancedVirtualElement {
                range: start_comment.range,
            });
        };

        let children = self.refine(children)?;
        let (binding, hidden) = self.virtual_element_binding(&start_comment);

        Ok(Node::VirtualElement(VirtualElement {
            binding,
            hidden,
            children,
            range: Range::new(start_comment.range.start, end_comment.range.end),
            start_comment,
            end_comment,
        }))
    }

    fn virtual_element_binding(&self, comment: &Comment) -> (BindingNode, bool) {
        // `<!--` precedes the comment content.
        let content_start = comment.range.start.offset() + 4;
        let captures = VIRTUAL_ELEMENT_START.captures(&comment.content);

        let group = |index: usize| {
            captures
                .as_ref()
                .and_then(|captures| captures.get(index))
                .map(|m| (m.as_str(), content_start + m.start(), content_start + m.end()))
                .unwrap_or(("", content_start, content_start))
        };

        let hidden = group(2).0 == "#";
        let (name, name_start, name_end) = group(3);
        let (param, param_start, param_end) = group(5);

        let binding = BindingNode {
            name: Scope::new(name, self.index.range(name_start, name_end)),
            param: Scope::new(param, self.index.range(param_start, param_end)),
            owner: BindingOwner::VirtualElement,
            quote: None,
            range: self.index.range(name_start, param_end),
        };
        (binding, hidden)
    }

    fn is_binding_attribute(&self, attribute: &Attribute) -> bool {
        self.binding_attributes
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&attribute.name.text))
    }

    fn extract_bindings(&self, element: &mut Element) {
        for (index, attribute) in element.attributes.iter().enumerate() {
            if !self.is_binding_attribute(attribute) {
                continue;
            }
            match parse_binding_attribute(self.source, &self.index, index, attribute) {
                Ok(bindings) => element.bindings.extend(bindings),
                Err(error) => {
                    element.bindings.clear();
                    element.binding_error = Some(error);
                    return;
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

/// Parses the value of a binding attribute as the body of an object literal.
///
/// Each top-level property becomes one binding in source order. The value is
/// entity-decoded before parsing; every reported range is translated back to
/// the raw attribute text in `source`.
pub fn parse_binding_attribute(
    source: &str,
    index: &LineIndex,
    attribute_index: usize,
    attribute: &Attribute,
) -> Result<Vec<BindingNode>, BindingParseError> {
    let (decoded, offset_map) = html::decode_entities(&attribute.value.text);
    let wrapped = format!("({{{}}})", decoded);
    let value_start = attribute.value.range.start.offset();

    // Offsets inside `wrapped` are shifted by the leading `({`.
    let translate = |offset: u32| {
        let decoded_offset = (offset as usize).saturating_sub(2).min(decoded.len());
        value_start + offset_map[decoded_offset]
    };
    let range_of = |span: Span| index.range(translate(span.start), translate(span.end));
    let text_of = |span: Span| {
        let start = (span.start as usize).clamp(2, wrapped.len());
        let end = (span.end as usize).clamp(start, wrapped.len());
        wrapped[start..end].to_string()
    };

    let allocator = Allocator::default();
    let expression = Parser::new(&allocator, &wrapped, SourceType::default())
        .parse_expression()
        .map_err(|errors| BindingParseError {
            message: errors
                .first()
                .map(|error| format!("Invalid binding expression: {}", error))
                .unwrap_or_else(|| "Invalid binding expression.".to_string()),
            range: attribute.value.range,
        })?;

    let expression = match expression {
        Expression::ParenthesizedExpression(parenthesized) => parenthesized.unbox().expression,
        other => other,
    };
    let Expression::ObjectExpression(object) = expression else {
        return Err(BindingParseError {
            message: "Expected ObjectExpression.".to_string(),
            range: attribute.value.range,
        });
    };

    let mut bindings = Vec::with_capacity(object.properties.len());
    for property in &object.properties {
        let property = match property {
            ObjectPropertyKind::ObjectProperty(property) => property,
            ObjectPropertyKind::SpreadProperty(spread) => {
                return Err(BindingParseError {
                    message: "Spread syntax is not supported in bindings.".to_string(),
                    range: range_of(spread.span),
                });
            }
        };

        if property.computed {
            return Err(BindingParseError {
                message: "Computed property as binding is not supported.".to_string(),
                range: range_of(property.span),
            });
        }
        if property.method || property.kind != PropertyKind::Init {
            return Err(BindingParseError {
                message: "Methods and accessors are not supported as bindings.".to_string(),
                range: range_of(property.span),
            });
        }

        let name = match &property.key {
            PropertyKey::StaticIdentifier(identifier) => identifier.name.to_string(),
            PropertyKey::StringLiteral(literal) => literal.value.to_string(),
            PropertyKey::NumericLiteral(literal) => text_of(literal.span),
            _ => {
                return Err(BindingParseError {
                    message: "Unsupported property key in binding.".to_string(),
                    range: range_of(property.key.span()),
                });
            }
        };

        let value_span = property.value.span();
        bindings.push(BindingNode {
            name: Scope::new(name, range_of(property.key.span())),
            param: Scope::new(text_of(value_span), range_of(value_span)),
            owner: BindingOwner::Attribute {
                index: attribute_index,
            },
            quote: attribute.quote,
            range: range_of(property.span),
        });
    }

    debug_assert!(bindings
        .iter()
        .all(|binding| binding.range.end.offset() <= source.len()));
    Ok(bindings)
}

#[cfg(feature = "napi")]
#[napi_derive::napi]
pub fn parse_native(
    source: String,
    binding_attributes: Option<Vec<String>>,
) -> napi::Result<serde_json::Value> {
    let mut options = ParseOptions::default();
    if let Some(attributes) = binding_attributes {
        options.binding_attributes = attributes;
    }
    let document = parse(&source, options)
        .map_err(|error| napi::Error::from_reason(error.to_string()))?;
    serde_json::to_value(&document).map_err(|error| napi::Error::from_reason(error.to_string()))
}
