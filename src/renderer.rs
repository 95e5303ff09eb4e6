//! Server-side renderer.
//!
//! The renderer scans a parsed document for `<!-- ko ssr: ... -->` roots,
//! loads their data and walks each subtree depth-first. Every binding is
//! dispatched to the first plugin whose filter accepts it; plugins patch the
//! output through a [`MagicString`] addressed by original offsets, so edits
//! made earlier in the walk never shift the ranges later plugins use.
//!
//! Per bound node the phases run in this order: alter, propagate,
//! ssr (capture), child context creation and descendants, bubble.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use crate::binding::{bindings_of, BindingSet};
use crate::binding_context::BindingContext;
use crate::builtins::builtins;
use crate::diagnostic::{codes, Diagnostic};
use crate::eval::{evaluate_inline_data, EvalError};
use crate::location::Range;
use crate::magic_string::{EditError, MagicString};
use crate::module::{default_interop, load_json, resolve_module};
use crate::parse::{parse, ParseError, ParseOptions, DEFAULT_BINDING_ATTRIBUTE};
use crate::plugin::{Bubble, Plugin, PluginError, Propagate, SsrArgs};
use crate::source_map::SourceMap;
use crate::syntax_tree::{BoundNode, Node, ParentNode, VirtualElement};
use crate::utils::TemplateIds;
use crate::value::Value;

const ROOT_BINDING: &str = "ssr";

/// Failures that abort a whole render call.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Renderer has already been consumed.")]
    AlreadyConsumed,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Multiple plugins are providing {0} hook.")]
    MultipleProviders(&'static str),
    /// A failure that strict mode refuses to downgrade to a diagnostic.
    #[error("Unable to render document: {0}")]
    Strict(Diagnostic),
    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Serializable render settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    /// Attributes scanned for bindings.
    pub attributes: Vec<String>,
    /// Escalate unexpected plugin failures and evaluation errors.
    pub strict: bool,
    /// Register the standard binding plugins before custom ones.
    pub use_builtins: bool,
    /// Path of the document. Relative module specifiers resolve against it.
    pub filename: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            attributes: vec![DEFAULT_BINDING_ATTRIBUTE.to_string()],
            strict: false,
            use_builtins: true,
            filename: None,
        }
    }
}

pub type Resolver = Box<dyn Fn(&str) -> Option<PathBuf>>;

#[derive(Default)]
pub struct RenderOptions {
    pub config: RenderConfig,
    pub plugins: Vec<Plugin>,
    /// Replaces the default module resolution.
    pub resolve: Option<Resolver>,
}

impl RenderOptions {
    pub fn new() -> Self {
        RenderOptions::default()
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.config.filename = Some(filename.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.config.attributes = attributes;
        self
    }

    pub fn without_builtins(mut self) -> Self {
        self.config.use_builtins = false;
        self
    }

    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_resolve(mut self, resolve: impl Fn(&str) -> Option<PathBuf> + 'static) -> Self {
        self.resolve = Some(Box::new(resolve));
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub document: String,
    pub source_map: SourceMap,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Renders `source` with a fresh renderer.
pub fn render(source: &str, options: RenderOptions) -> Result<RenderResult, RenderError> {
    Renderer::new(source, options).render()
}

/// Why a node stopped rendering.
enum Interrupt {
    /// Recorded, then rendering continues with the next sibling.
    Diagnostic(Diagnostic),
    Fatal(RenderError),
}

impl From<Diagnostic> for Interrupt {
    fn from(diagnostic: Diagnostic) -> Self {
        Interrupt::Diagnostic(diagnostic)
    }
}

impl From<RenderError> for Interrupt {
    fn from(error: RenderError) -> Self {
        Interrupt::Fatal(error)
    }
}

impl From<EditError> for Interrupt {
    fn from(error: EditError) -> Self {
        Interrupt::Fatal(RenderError::Edit(error))
    }
}

/// A single-use renderer for one document.
pub struct Renderer {
    source: String,
    plugins: Vec<Plugin>,
    config: RenderConfig,
    resolve: Option<Resolver>,
    diagnostics: RefCell<Vec<Diagnostic>>,
    consumed: Cell<bool>,
    /// Fatal error raised while rendering a fragment for a plugin.
    pending: RefCell<Option<RenderError>>,
    template_ids: TemplateIds,
}

impl Renderer {
    pub fn new(source: impl Into<String>, options: RenderOptions) -> Self {
        let RenderOptions {
            config,
            plugins: custom,
            resolve,
        } = options;
        let mut plugins = if config.use_builtins { builtins() } else { Vec::new() };
        plugins.extend(custom);

        Renderer {
            source: source.into(),
            plugins,
            config,
            resolve,
            diagnostics: RefCell::new(Vec::new()),
            consumed: Cell::new(false),
            pending: RefCell::new(None),
            template_ids: TemplateIds::new(),
        }
    }

    pub fn render(&self) -> Result<RenderResult, RenderError> {
        if self.consumed.replace(true) {
            return Err(RenderError::AlreadyConsumed);
        }

        let mut on_error = |error: crate::html::MarkupError| {
            self.emit(Diagnostic::error(error.code, error.message).with_range(error.range));
        };
        let document = parse(
            &self.source,
            ParseOptions::default()
                .with_binding_attributes(self.config.attributes.clone())
                .with_on_error(&mut on_error),
        )?;

        let mut generated = MagicString::new(&self.source);
        self.scan(ParentNode::Document(&document), &mut generated)?;

        let source_name = self.config.filename.as_deref().unwrap_or("unknown");
        let source_map = generated.generate_map(source_name, self.config.filename.as_deref());

        let (errors, warnings): (Vec<_>, Vec<_>) =
            self.diagnostics.take().into_iter().partition(Diagnostic::is_error);
        tracing::debug!(source = source_name, "rendered document");

        Ok(RenderResult {
            document: generated.to_string(),
            source_map,
            errors,
            warnings,
        })
    }

    fn emit(&self, diagnostic: Diagnostic) {
        let diagnostic = if diagnostic.filename.is_none() {
            diagnostic.with_filename(self.config.filename.as_deref())
        } else {
            diagnostic
        };
        tracing::debug!(code = ?diagnostic.code, "{}", diagnostic.message);
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Records a non-fatal interrupt and passes fatal ones on.
    fn settle(&self, result: Result<(), Interrupt>, range: Range) -> Result<(), RenderError> {
        match result {
            Ok(()) => Ok(()),
            Err(Interrupt::Diagnostic(diagnostic)) => {
                self.emit(diagnostic.or_range(range));
                Ok(())
            }
            Err(Interrupt::Fatal(error)) => Err(error),
        }
    }

    /// Maps a hook failure to an interrupt. Unstructured failures get `code`.
    fn hook_failure(&self, error: PluginError, code: &str, range: Range) -> Interrupt {
        let diagnostic = match error {
            PluginError::Diagnostic(diagnostic) => {
                let diagnostic = diagnostic.or_range(range);
                if self.config.strict && diagnostic.has_code(codes::BINDING_EVALUATION_ERROR) {
                    return Interrupt::Fatal(RenderError::Strict(diagnostic));
                }
                return Interrupt::Diagnostic(diagnostic);
            }
            PluginError::Message(message) => Diagnostic::error(code, message).with_range(range),
        };
        if self.config.strict {
            Interrupt::Fatal(RenderError::Strict(diagnostic))
        } else {
            Interrupt::Diagnostic(diagnostic)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ROOTS
    // ═══════════════════════════════════════════════════════════════════════════════

    fn scan(&self, node: ParentNode<'_>, generated: &mut MagicString) -> Result<(), RenderError> {
        for child in node.children() {
            match child {
                Node::VirtualElement(root) if is_root(root) => self.render_root(root, generated)?,
                other => {
                    if let Some(parent) = other.as_parent() {
                        self.scan(parent, generated)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn render_root(&self, root: &VirtualElement, generated: &mut MagicString) -> Result<(), RenderError> {
        tracing::debug!(range = %root.range, "rendering ssr root");
        let result = self.root_context(root).and_then(|context| {
            let (start, end) = root.start_comment.range.offsets();
            generated.remove(start, end)?;
            let (start, end) = root.end_comment.range.offsets();
            generated.remove(start, end)?;
            self.render_descendants(ParentNode::VirtualElement(root), &context, generated)?;
            Ok(())
        });
        self.settle(result, root.range)
    }

    fn root_context(&self, root: &VirtualElement) -> Result<BindingContext, Interrupt> {
        let param = root.binding.param.text.trim();
        let data = if param.starts_with('{') {
            evaluate_inline_data(param).map_err(|error| {
                Diagnostic::error(codes::INVALID_INLINE_DATA, format!("Invalid inline data: {}", error))
                    .with_range(root.binding.param.range)
                    .with_cause(&error)
            })?
        } else {
            self.load_module(param)
                .map_err(|interrupt| match interrupt {
                    Interrupt::Diagnostic(diagnostic) => {
                        Interrupt::Diagnostic(diagnostic.or_range(root.binding.param.range))
                    }
                    fatal => fatal,
                })?
        };
        BindingContext::root(data).map_err(|error| self.evaluation_failure(error, root.binding.param.range))
    }

    fn evaluation_failure(&self, error: EvalError, range: Range) -> Interrupt {
        let diagnostic = Diagnostic::error(codes::BINDING_EVALUATION_ERROR, error.to_string())
            .with_range(range)
            .with_cause(&error);
        self.hook_failure(PluginError::Diagnostic(diagnostic), codes::BINDING_EVALUATION_ERROR, range)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // MODULES
    // ═══════════════════════════════════════════════════════════════════════════════

    fn load_module(&self, specifier: &str) -> Result<Value, Interrupt> {
        let filename = self.config.filename.as_deref();
        let path = match &self.resolve {
            Some(resolve) => resolve(specifier).ok_or_else(|| match filename {
                Some(filename) => format!("Cannot resolve {} from {}.", specifier, filename),
                None => format!("Cannot resolve {}.", specifier),
            }),
            None => resolve_module(specifier, filename),
        }
        .map_err(|message| Diagnostic::error(codes::CANNOT_FIND_MODULE, message))?;

        tracing::debug!(path = %path.display(), "loading ssr data");
        let exports = self.load(&path)?;
        self.interop(exports)
    }

    fn single_provider(&self, hook: &'static str, provides: fn(&Plugin) -> bool) -> Result<Option<&Plugin>, Interrupt> {
        let mut providers = self.plugins.iter().filter(|plugin| provides(plugin));
        let first = providers.next();
        if providers.next().is_some() {
            return Err(Interrupt::Fatal(RenderError::MultipleProviders(hook)));
        }
        Ok(first)
    }

    fn load(&self, path: &std::path::Path) -> Result<Value, Interrupt> {
        let loaded = match self.single_provider("load", Plugin::provides_load)? {
            Some(Plugin { load: Some(load), .. }) => load(&path.to_string_lossy()),
            _ => load_json(path).map_err(PluginError::Message),
        };
        loaded.map_err(|error| as_diagnostic(error, codes::CANNOT_LOAD_MODULE).into())
    }

    fn interop(&self, exports: Value) -> Result<Value, Interrupt> {
        let value = match self.single_provider("interop", Plugin::provides_interop)? {
            Some(Plugin {
                interop: Some(interop), ..
            }) => interop(exports),
            _ => default_interop(exports).map_err(PluginError::from),
        };
        value.map_err(|error| as_diagnostic(error, codes::INTEROP_ERROR).into())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // TREE WALK
    // ═══════════════════════════════════════════════════════════════════════════════

    fn render_descendants(
        &self,
        node: ParentNode<'_>,
        context: &BindingContext,
        generated: &mut MagicString,
    ) -> Result<(), RenderError> {
        for child in node.children() {
            match child {
                Node::VirtualElement(root) if is_root(root) => self.render_root(root, generated)?,
                Node::VirtualElement(virtual_element) => {
                    self.render_element(BoundNode::VirtualElement(virtual_element), context, generated)?
                }
                // Template content is inert until the client instantiates it.
                Node::Element(element) if element.tag_name.eq_ignore_ascii_case("template") => {}
                Node::Element(element) => self.render_element(BoundNode::Element(element), context, generated)?,
                Node::Text(_) | Node::Comment(_) => {}
            }
        }
        Ok(())
    }

    fn render_element(
        &self,
        node: BoundNode<'_>,
        context: &BindingContext,
        generated: &mut MagicString,
    ) -> Result<(), RenderError> {
        if let Some(error) = node.as_element().and_then(|element| element.binding_error.as_ref()) {
            self.emit(
                Diagnostic::error(codes::BINDING_PARSE_ERROR, error.message.clone())
                    .with_range(error.range)
                    .with_cause(error),
            );
            return Ok(());
        }

        let result = self.render_bindings(node, context, generated);
        self.settle(result, node.range())
    }

    fn render_bindings(
        &self,
        node: BoundNode<'_>,
        context: &BindingContext,
        generated: &mut MagicString,
    ) -> Result<(), Interrupt> {
        let bindings = bindings_of(node);
        let plugins: Vec<Option<&Plugin>> = bindings
            .iter()
            .map(|binding| self.plugins.iter().find(|plugin| plugin.matches(binding)))
            .collect();

        // Alter
        for (binding, plugin) in bindings.iter().zip(&plugins) {
            if let Some(alter) = plugin.and_then(|plugin| plugin.alter.as_ref()) {
                alter(binding, context).map_err(|error| self.hook_failure(error, codes::ALTER_ERROR, binding.range()))?;
            }
        }

        let set = BindingSet::new(node, bindings, context.clone());

        // Propagate
        let mut propagate = Propagate::Bool(true);
        for (index, plugin) in plugins.iter().enumerate() {
            if let Some(plugin) = plugin {
                let binding = set.get(index);
                let decision = plugin
                    .propagate(binding)
                    .map_err(|error| self.hook_failure(error, codes::RENDER_ERROR, binding.binding().range()))?;
                propagate = propagate.and(decision);
            }
        }

        // Capture
        let fragment = |mut clone: MagicString, child: &BindingContext| -> Result<String, PluginError> {
            if let Err(error) = self.render_descendants(node.as_parent(), child, &mut clone) {
                let message = error.to_string();
                self.pending.borrow_mut().get_or_insert(error);
                return Err(PluginError::Message(message));
            }
            let (start, end) = node.inner_range().offsets();
            Ok(clone.slice(start, end)?)
        };
        let mut bubbles: Vec<(usize, Bubble)> = Vec::new();
        for (index, plugin) in plugins.iter().enumerate() {
            let Some(ssr) = plugin.and_then(|plugin| plugin.ssr.as_ref()) else {
                continue;
            };
            let binding = set.get(index);
            let result = ssr(&mut SsrArgs {
                binding,
                generated: &mut *generated,
                propagate,
                bubbles: &mut bubbles,
                fragment: &fragment,
                template_ids: &self.template_ids,
            });
            if let Some(error) = self.pending.take() {
                return Err(Interrupt::Fatal(error));
            }
            result.map_err(|error| self.hook_failure(error, codes::RENDER_ERROR, binding.binding().range()))?;
        }

        // Descendants
        if propagate.is_true() {
            let child = self.child_context(node, context, &set, &plugins)?;
            self.render_descendants(node.as_parent(), &child, generated)?;
        }

        // Bubble
        for (index, bubble) in bubbles {
            let binding = set.get(index);
            bubble(generated, binding)
                .map_err(|error| self.hook_failure(error, codes::RENDER_ERROR, binding.binding().range()))?;
        }

        Ok(())
    }

    /// Context for the descendants of a propagating node. Several extenders
    /// are merged in binding order, each extending the previous result, so a
    /// later extender does not replace an earlier one.
    fn child_context(
        &self,
        node: BoundNode<'_>,
        context: &BindingContext,
        set: &BindingSet<'_>,
        plugins: &[Option<&Plugin>],
    ) -> Result<BindingContext, Interrupt> {
        let extenders: Vec<_> = plugins
            .iter()
            .enumerate()
            .filter_map(|(index, plugin)| plugin.and_then(|plugin| plugin.extend.as_ref()).map(|extend| (index, extend)))
            .collect();

        if extenders.len() > 1 {
            tracing::warn!(range = %node.range(), "multiple plugins are extending the binding context");
            self.emit(
                Diagnostic::warning(
                    codes::MULTIPLE_EXTENDERS,
                    "Multiple plugins are extending the binding context.",
                )
                .with_range(node.range()),
            );
        }

        let mut merged: Option<BindingContext> = None;
        for (index, extend) in extenders {
            let binding = set.get(index);
            let extended = extend(binding)
                .map_err(|error| self.hook_failure(error, codes::EXTEND_ERROR, binding.binding().range()))?;
            merged = Some(match merged {
                Some(merged) => merged.extend(extended.entries()),
                None => extended,
            });
        }
        match merged {
            Some(merged) => Ok(merged),
            None => context
                .child(context.raw_data())
                .map_err(|error| self.evaluation_failure(error, node.range())),
        }
    }
}

fn is_root(virtual_element: &VirtualElement) -> bool {
    virtual_element.binding.name.text == ROOT_BINDING
}

fn as_diagnostic(error: PluginError, code: &str) -> Diagnostic {
    match error {
        PluginError::Diagnostic(diagnostic) => diagnostic,
        PluginError::Message(message) => Diagnostic::error(code, message),
    }
}

#[cfg(feature = "napi")]
#[napi_derive::napi]
pub fn render_native(source: String, config: Option<serde_json::Value>) -> napi::Result<serde_json::Value> {
    let config: RenderConfig = match config {
        Some(config) => serde_json::from_value(config).map_err(|error| napi::Error::from_reason(error.to_string()))?,
        None => RenderConfig::default(),
    };
    let result = render(&source, RenderOptions::new().with_config(config))
        .map_err(|error| napi::Error::from_reason(error.to_string()))?;
    serde_json::to_value(&result).map_err(|error| napi::Error::from_reason(error.to_string()))
}
