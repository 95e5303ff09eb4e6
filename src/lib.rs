//! # Knockout Server-Side Renderer
//!
//! Statically renders HTML templates that carry Knockout-style bindings
//! (`data-bind` attributes and `<!-- ko ... -->` virtual elements) into the
//! HTML the binding runtime would produce, together with a source map back
//! to the template.
//!
//! ## Pipeline
//!
//! 1. **Parse**: [`parse`] builds an immutable [`Document`] with exact ranges
//!    for every node, attribute and binding. Only an unbalanced virtual
//!    element is fatal.
//! 2. **Render**: [`render`] finds every `<!-- ko ssr: ... -->` root, loads
//!    its view model and walks the subtree. Each binding goes to the first
//!    [`Plugin`] whose filter accepts it.
//! 3. **Patch**: plugins edit a [`MagicString`] addressed by original
//!    offsets, which finally yields the document and its [`SourceMap`].
//!
//! Binding expressions are never compiled. [`transform`] rewrites free
//! identifiers into `$context`/`$data` lookups and a small tree-walking
//! interpreter evaluates the result against the [`BindingContext`].
//!
//! ## Failure model
//!
//! Non-fatal problems become [`Diagnostic`]s in the `errors` / `warnings`
//! lists of a [`RenderResult`]; the affected node keeps whatever edits were
//! already applied. Fatal problems are returned as [`RenderError`].

mod binding;
mod binding_context;
mod builtins;
mod cache;
mod diagnostic;
mod discovery;
mod eval;
mod expression;
mod html;
mod hydration;
mod location;
mod magic_string;
mod module;
mod parse;
mod plugin;
mod renderer;
mod source_map;
mod syntax_tree;
mod transform;
pub mod utils;
mod value;

#[cfg(test)]
mod parse_tests;
#[cfg(test)]
mod transform_tests;

pub use binding::{Binding, BindingRef, BindingSet};
pub use binding_context::{BindingContext, ChildContextOptions};
pub use builtins::builtins;
pub use cache::DocumentCache;
pub use diagnostic::{codes, Diagnostic, DiagnosticType};
pub use discovery::{find_templates, render_file, render_files, RenderedFile, DEFAULT_EXTENSIONS};
pub use eval::{evaluate, evaluate_binding, evaluate_inline_data, EvalError};
pub use html::MarkupError;
pub use hydration::{hydration_table, HydrationHandler, HydrationTable};
pub use location::{LineIndex, Position, Range};
pub use magic_string::{EditError, MagicString};
pub use parse::{parse, BindingParseError, ParseError, ParseOptions, DEFAULT_BINDING_ATTRIBUTE};
pub use plugin::{Plugin, PluginError, Propagate, SsrArgs};
pub use renderer::{render, RenderConfig, RenderError, RenderOptions, RenderResult, Renderer};
pub use source_map::SourceMap;
pub use syntax_tree::{
    Attribute, BindingNode, BindingOwner, BoundNode, Comment, Document, Element, Node, ParentNode, Scope, Text,
    VirtualElement,
};
pub use transform::{transform, DEFAULT_QUOTE};
pub use value::Value;

#[cfg(feature = "napi")]
pub use discovery::render_directory_native;
#[cfg(feature = "napi")]
pub use parse::parse_native;
#[cfg(feature = "napi")]
pub use renderer::render_native;
#[cfg(feature = "napi")]
pub use transform::transform_native;
