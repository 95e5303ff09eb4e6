//! Render-time view of the bindings on one node.
//!
//! Values are evaluated lazily and memoized per binding, so a plugin that
//! never reads a value never triggers its evaluation (or its errors).

use std::cell::OnceCell;

use crate::binding_context::BindingContext;
use crate::diagnostic::{codes, Diagnostic};
use crate::eval::{evaluate_binding, EvalError};
use crate::location::Range;
use crate::plugin::PluginError;
use crate::syntax_tree::{BindingNode, BindingOwner, BoundNode, Element};
use crate::transform::{transform, DEFAULT_QUOTE};
use crate::value::Value;

/// A binding as seen by plugins.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    pub node: &'a BindingNode,
    /// The element or virtual element the binding is written on.
    pub parent: BoundNode<'a>,
    /// Quote to use for strings generated into the binding's source.
    pub quote: char,
}

impl<'a> Binding<'a> {
    pub fn name(&self) -> &'a str {
        &self.node.name.text
    }

    pub fn param(&self) -> &'a str {
        &self.node.param.text
    }

    pub fn range(&self) -> Range {
        self.node.range
    }

    pub fn element(&self) -> Option<&'a Element> {
        self.parent.as_element()
    }

    pub fn is_element(&self) -> bool {
        self.element().is_some()
    }

    /// The parameter rewritten into scope-aware lookups.
    pub fn expression(&self) -> Result<String, EvalError> {
        transform(self.param(), self.quote)
    }
}

fn opposite_quote(quote: char) -> char {
    if quote == '"' {
        '\''
    } else {
        '"'
    }
}

/// Bindings written on `node`, in source order.
pub fn bindings_of(node: BoundNode<'_>) -> Vec<Binding<'_>> {
    match node {
        BoundNode::Element(element) => element
            .bindings
            .iter()
            .map(|binding| Binding {
                node: binding,
                parent: node,
                quote: match binding.owner {
                    BindingOwner::Attribute { .. } => binding.quote.map_or(DEFAULT_QUOTE, opposite_quote),
                    BindingOwner::VirtualElement => DEFAULT_QUOTE,
                },
            })
            .collect(),
        BoundNode::VirtualElement(virtual_element) => vec![Binding {
            node: &virtual_element.binding,
            parent: node,
            quote: DEFAULT_QUOTE,
        }],
    }
}

/// The bindings of one node together with their shared context.
pub struct BindingSet<'a> {
    node: BoundNode<'a>,
    bindings: Vec<Binding<'a>>,
    context: BindingContext,
    raw: Vec<OnceCell<Result<Value, Diagnostic>>>,
}

impl<'a> BindingSet<'a> {
    pub fn new(node: BoundNode<'a>, bindings: Vec<Binding<'a>>, context: BindingContext) -> Self {
        let raw = bindings.iter().map(|_| OnceCell::new()).collect();
        BindingSet {
            node,
            bindings,
            context,
            raw,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, index: usize) -> BindingRef<'_, 'a> {
        BindingRef { set: self, index }
    }

    pub fn iter(&self) -> impl Iterator<Item = BindingRef<'_, 'a>> {
        (0..self.len()).map(move |index| self.get(index))
    }
}

/// One binding of a [`BindingSet`], with access to its siblings.
#[derive(Clone, Copy)]
pub struct BindingRef<'s, 'a> {
    set: &'s BindingSet<'a>,
    index: usize,
}

impl<'s, 'a> BindingRef<'s, 'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn binding(&self) -> &'s Binding<'a> {
        &self.set.bindings[self.index]
    }

    pub fn node(&self) -> BoundNode<'a> {
        self.set.node
    }

    pub fn context(&self) -> &'s BindingContext {
        &self.set.context
    }

    /// The evaluated value, possibly an observable.
    pub fn raw_value(&self) -> Result<Value, PluginError> {
        let binding = self.binding();
        self.set.raw[self.index]
            .get_or_init(|| {
                evaluate_binding(binding.param(), binding.quote, &self.set.context).map_err(|error| {
                    Diagnostic::error(codes::BINDING_EVALUATION_ERROR, error.to_string())
                        .with_range(binding.range())
                        .with_cause(&error)
                })
            })
            .clone()
            .map_err(PluginError::Diagnostic)
    }

    /// The evaluated value with observables unwrapped.
    pub fn value(&self) -> Result<Value, PluginError> {
        Ok(self.raw_value()?.unwrap_observable())
    }

    /// Every binding on the same node, this one included.
    pub fn siblings(&self) -> impl Iterator<Item = BindingRef<'s, 'a>> {
        self.set.iter()
    }

    pub fn sibling(&self, name: &str) -> Option<BindingRef<'s, 'a>> {
        self.siblings().find(|sibling| sibling.binding().name() == name)
    }
}
