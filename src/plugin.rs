//! Plugin protocol.
//!
//! A [`Plugin`] is an ordered capability record: a filter plus optional
//! hooks. Each binding is handled by the first registered plugin whose
//! filter accepts it; later matching plugins are not consulted.

use std::fmt;

use crate::binding::{Binding, BindingRef};
use crate::binding_context::BindingContext;
use crate::diagnostic::Diagnostic;
use crate::eval::EvalError;
use crate::magic_string::{EditError, MagicString};
use crate::utils::TemplateIds;
use crate::value::Value;

/// Failure raised by a plugin hook.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    /// A structured diagnostic. It is recorded and the node's rendering
    /// stops.
    #[error("{0}")]
    Diagnostic(Diagnostic),
    /// An unexpected failure. Wrapped into a diagnostic, or fatal in strict
    /// mode.
    #[error("{0}")]
    Message(String),
}

impl PluginError {
    pub fn message(message: impl fmt::Display) -> Self {
        PluginError::Message(message.to_string())
    }
}

impl From<Diagnostic> for PluginError {
    fn from(diagnostic: Diagnostic) -> Self {
        PluginError::Diagnostic(diagnostic)
    }
}

impl From<EditError> for PluginError {
    fn from(error: EditError) -> Self {
        PluginError::message(error)
    }
}

impl From<EvalError> for PluginError {
    fn from(error: EvalError) -> Self {
        PluginError::message(error)
    }
}

/// Whether descendants of a node are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagate {
    Bool(bool),
    /// The plugin renders descendants itself, e.g. through
    /// [`SsrArgs::render_fragment`].
    Custom,
}

impl Propagate {
    /// Combines two decisions. `Custom` dominates, otherwise both must agree
    /// to propagate.
    pub fn and(self, other: Propagate) -> Propagate {
        match (self, other) {
            (Propagate::Custom, _) | (_, Propagate::Custom) => Propagate::Custom,
            (Propagate::Bool(a), Propagate::Bool(b)) => Propagate::Bool(a && b),
        }
    }

    pub fn is_true(self) -> bool {
        self == Propagate::Bool(true)
    }
}

impl From<bool> for Propagate {
    fn from(value: bool) -> Self {
        Propagate::Bool(value)
    }
}

pub type Filter = Box<dyn Fn(&Binding<'_>) -> bool>;
pub type SsrHook = Box<dyn Fn(&mut SsrArgs<'_, '_>) -> Result<(), PluginError>>;
pub type AlterHook = Box<dyn Fn(&Binding<'_>, &BindingContext) -> Result<(), PluginError>>;
pub type ExtendHook = Box<dyn Fn(BindingRef<'_, '_>) -> Result<BindingContext, PluginError>>;
pub type LoadHook = Box<dyn Fn(&str) -> Result<Value, PluginError>>;
pub type InteropHook = Box<dyn Fn(Value) -> Result<Value, PluginError>>;

/// Deferred work queued during the ssr hook; runs after descendants have
/// been rendered.
pub type Bubble = Box<dyn FnOnce(&mut MagicString, BindingRef<'_, '_>) -> Result<(), PluginError>>;

pub enum PropagateHook {
    Fixed(Propagate),
    Dynamic(Box<dyn Fn(BindingRef<'_, '_>) -> Result<Propagate, PluginError>>),
}

/// Renders the current node's descendants into a copy of the output and
/// returns the node's inner markup from that copy.
pub type FragmentRenderer<'r> = dyn Fn(MagicString, &BindingContext) -> Result<String, PluginError> + 'r;

/// Arguments of the ssr hook.
pub struct SsrArgs<'r, 'a> {
    pub binding: BindingRef<'r, 'a>,
    /// The output document, edited through original offsets.
    pub generated: &'r mut MagicString,
    /// Combined propagate decision of every binding on the node.
    pub propagate: Propagate,
    pub(crate) bubbles: &'r mut Vec<(usize, Bubble)>,
    pub(crate) fragment: &'r FragmentRenderer<'r>,
    pub(crate) template_ids: &'r TemplateIds,
}

impl SsrArgs<'_, '_> {
    /// Queues `callback` for the bubble phase.
    pub fn bubble(
        &mut self,
        callback: impl FnOnce(&mut MagicString, BindingRef<'_, '_>) -> Result<(), PluginError> + 'static,
    ) {
        self.bubbles.push((self.binding.index(), Box::new(callback)));
    }

    pub fn render_fragment(&self, context: &BindingContext) -> Result<String, PluginError> {
        (self.fragment)(self.generated.clone(), context)
    }

    pub fn context(&self) -> &BindingContext {
        self.binding.context()
    }

    /// Id source shared by every node of the current render.
    pub fn template_ids(&self) -> TemplateIds {
        self.template_ids.clone()
    }

    pub fn value(&self) -> Result<Value, PluginError> {
        self.binding.value()
    }

    pub fn raw_value(&self) -> Result<Value, PluginError> {
        self.binding.raw_value()
    }
}

pub struct Plugin {
    pub name: String,
    pub(crate) filter: Filter,
    pub(crate) ssr: Option<SsrHook>,
    pub(crate) alter: Option<AlterHook>,
    pub(crate) extend: Option<ExtendHook>,
    pub(crate) propagate: Option<PropagateHook>,
    pub(crate) load: Option<LoadHook>,
    pub(crate) interop: Option<InteropHook>,
}

impl Plugin {
    pub fn new(name: impl Into<String>, filter: impl Fn(&Binding<'_>) -> bool + 'static) -> Self {
        Plugin {
            name: name.into(),
            filter: Box::new(filter),
            ssr: None,
            alter: None,
            extend: None,
            propagate: None,
            load: None,
            interop: None,
        }
    }

    /// Handles bindings called `name`.
    pub fn for_binding(name: &'static str) -> Self {
        Plugin::new(name, move |binding| binding.name() == name)
    }

    /// Handles bindings called `name` written on real elements.
    pub fn for_element_binding(name: &'static str) -> Self {
        Plugin::new(name, move |binding| binding.name() == name && binding.is_element())
    }

    /// A plugin that never matches a binding, for load or interop hooks.
    pub fn provider(name: impl Into<String>) -> Self {
        Plugin::new(name, |_| false)
    }

    pub fn with_ssr(mut self, hook: impl Fn(&mut SsrArgs<'_, '_>) -> Result<(), PluginError> + 'static) -> Self {
        self.ssr = Some(Box::new(hook));
        self
    }

    pub fn with_alter(
        mut self,
        hook: impl Fn(&Binding<'_>, &BindingContext) -> Result<(), PluginError> + 'static,
    ) -> Self {
        self.alter = Some(Box::new(hook));
        self
    }

    pub fn with_extend(
        mut self,
        hook: impl Fn(BindingRef<'_, '_>) -> Result<BindingContext, PluginError> + 'static,
    ) -> Self {
        self.extend = Some(Box::new(hook));
        self
    }

    pub fn with_propagate(mut self, propagate: impl Into<Propagate>) -> Self {
        self.propagate = Some(PropagateHook::Fixed(propagate.into()));
        self
    }

    pub fn with_propagate_fn(
        mut self,
        hook: impl Fn(BindingRef<'_, '_>) -> Result<Propagate, PluginError> + 'static,
    ) -> Self {
        self.propagate = Some(PropagateHook::Dynamic(Box::new(hook)));
        self
    }

    pub fn with_load(mut self, hook: impl Fn(&str) -> Result<Value, PluginError> + 'static) -> Self {
        self.load = Some(Box::new(hook));
        self
    }

    pub fn with_interop(mut self, hook: impl Fn(Value) -> Result<Value, PluginError> + 'static) -> Self {
        self.interop = Some(Box::new(hook));
        self
    }

    pub fn matches(&self, binding: &Binding<'_>) -> bool {
        (self.filter)(binding)
    }

    pub fn provides_load(&self) -> bool {
        self.load.is_some()
    }

    pub fn provides_interop(&self) -> bool {
        self.interop.is_some()
    }

    /// The propagate decision for `binding`. Plugins without a propagate
    /// hook always propagate.
    pub fn propagate(&self, binding: BindingRef<'_, '_>) -> Result<Propagate, PluginError> {
        match &self.propagate {
            None => Ok(Propagate::Bool(true)),
            Some(PropagateHook::Fixed(propagate)) => Ok(*propagate),
            Some(PropagateHook::Dynamic(hook)) => hook(binding),
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("ssr", &self.ssr.is_some())
            .field("alter", &self.alter.is_some())
            .field("extend", &self.extend.is_some())
            .field("propagate", &self.propagate.is_some())
            .field("load", &self.load.is_some())
            .field("interop", &self.interop.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagate_combination() {
        let t = Propagate::Bool(true);
        let f = Propagate::Bool(false);
        assert_eq!(t.and(t), t);
        assert_eq!(t.and(f), f);
        assert_eq!(f.and(Propagate::Custom), Propagate::Custom);
        assert_eq!(Propagate::Custom.and(t), Propagate::Custom);
        assert!(t.is_true());
        assert!(!Propagate::Custom.is_true());
    }

    #[test]
    fn test_builders() {
        let plugin = Plugin::for_binding("i18n")
            .with_propagate(false)
            .with_interop(Ok);
        assert!(plugin.provides_interop());
        assert!(!plugin.provides_load());
        assert_eq!(plugin.name, "i18n");
        assert!(matches!(plugin.propagate, Some(PropagateHook::Fixed(Propagate::Bool(false)))));
    }
}
