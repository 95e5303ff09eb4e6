//! Client-side hydration handlers.
//!
//! Control-flow bindings are rewritten during rendering into `_ssr_*`
//! bindings that know where the server put the original markup. The client
//! needs a handler for each of them; this module describes those handlers as
//! a plain table and can emit the script that registers them on a `ko`
//! instance.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationHandler {
    /// Binding name written by the renderer.
    pub key: &'static str,
    /// Knockout binding the handler delegates to after hydration.
    pub delegate: &'static str,
    /// The template id is always present, not only for unrendered content.
    pub requires_template: bool,
    pub allow_virtual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HydrationTable {
    handlers: Vec<HydrationHandler>,
}

/// The handlers for `if`, `with` and `foreach`.
pub fn hydration_table() -> HydrationTable {
    HydrationTable {
        handlers: vec![
            HydrationHandler {
                key: "_ssr_if",
                delegate: "if",
                requires_template: false,
                allow_virtual: true,
            },
            HydrationHandler {
                key: "_ssr_with",
                delegate: "with",
                requires_template: false,
                allow_virtual: true,
            },
            HydrationHandler {
                key: "_ssr_foreach",
                delegate: "foreach",
                requires_template: true,
                allow_virtual: true,
            },
        ],
    }
}

impl HydrationTable {
    pub fn handlers(&self) -> &[HydrationHandler] {
        &self.handlers
    }

    pub fn get(&self, delegate: &str) -> Option<&HydrationHandler> {
        self.handlers.iter().find(|handler| handler.delegate == delegate)
    }

    /// Binding name the renderer writes in place of `delegate`.
    pub fn key_for(&self, delegate: &str) -> Option<&'static str> {
        self.get(delegate).map(|handler| handler.key)
    }

    /// Source of a `registerSsrBindings(ko)` function registering every
    /// handler of the table.
    pub fn registration_script(&self) -> String {
        let mut script = String::from(REGISTRATION_PRELUDE);
        for handler in &self.handlers {
            script.push_str(&format!(
                "  register({}, {}, {}, {});\n",
                quote(handler.key),
                quote(handler.delegate),
                handler.requires_template,
                handler.allow_virtual
            ));
        }
        script.push_str("}\n");
        script
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

const REGISTRATION_PRELUDE: &str = r#"export function registerSsrBindings(ko) {
  function hydrate(element, id, required) {
    if (!id) {
      if (required) throw new Error("Missing server-side rendered template id");
      return;
    }
    const owner = element.ownerDocument || document;
    const template = owner.getElementById(id);
    if (!template || !(template instanceof HTMLTemplateElement)) {
      throw new Error(`Cannot find server-side rendered template with id "${id}"`);
    }
    const nodes = Array.from(template.content.cloneNode(true).childNodes);
    ko.virtualElements.setDomNodeChildren(element, nodes);
    template.remove();
  }
  function register(key, delegate, required, allowVirtual) {
    const target = ko.bindingHandlers[delegate];
    ko.bindingHandlers[key] = {
      ...target,
      init(element, valueAccessor, allBindings, viewModel, bindingContext) {
        hydrate(element, valueAccessor().template, required);
        return target.init(element, () => valueAccessor().value, allBindings, viewModel, bindingContext);
      },
    };
    ko.expressionRewriting.bindingRewriteValidators[key] = false;
    if (allowVirtual) ko.virtualElements.allowedBindings[key] = true;
  }
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_keys() {
        let table = hydration_table();
        assert_eq!(table.key_for("if"), Some("_ssr_if"));
        assert_eq!(table.key_for("with"), Some("_ssr_with"));
        assert_eq!(table.key_for("foreach"), Some("_ssr_foreach"));
        assert_eq!(table.key_for("text"), None);
        assert!(table.handlers().iter().all(|handler| handler.allow_virtual));
    }

    #[test]
    fn test_registration_script() {
        let script = hydration_table().registration_script();
        assert!(script.starts_with("export function registerSsrBindings(ko) {"));
        assert!(script.contains(r#"register("_ssr_if", "if", false, true);"#));
        assert!(script.contains(r#"register("_ssr_foreach", "foreach", true, true);"#));
        assert!(script.trim_end().ends_with('}'));
    }
}
