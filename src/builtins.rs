//! Plugins for the standard Knockout bindings.
//!
//! Attribute-like bindings patch the start tag, content bindings replace the
//! inner markup, and control-flow bindings decide whether descendants render.
//! `if`, `ifnot`, `with` and `foreach` also rewrite themselves into the
//! `_ssr_*` bindings of [`crate::hydration`] so the client can pick up the
//! server-rendered markup.

use crate::binding::BindingRef;
use crate::binding_context::{BindingContext, ChildContextOptions};
use crate::hydration::hydration_table;
use crate::magic_string::MagicString;
use crate::plugin::{Plugin, PluginError, Propagate};
use crate::utils::{
    add_class, escape_html, escape_js, extract_into_template, insert_template, remove_class,
    set_attribute, set_inner, set_style,
};
use crate::value::Value;

/// Built-in plugins in registration order.
pub fn builtins() -> Vec<Plugin> {
    vec![
        attr(),
        checked(),
        class(),
        component(),
        css(),
        enable("enable"),
        enable("enabled"),
        disable("disable"),
        disable("disabled"),
        html(),
        if_plugin("if", true),
        if_plugin("ifnot", false),
        let_plugin(),
        no_ssr(),
        style(),
        value_plugin("textInput"),
        text(),
        using(),
        value_plugin("value"),
        visible("visible", false),
        visible("hidden", true),
        with(),
        foreach(),
    ]
}

/// Attribute value for a binding value: nullish and `false` remove it.
fn attribute_value(value: &Value) -> Option<String> {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

fn attr() -> Plugin {
    Plugin::for_element_binding("attr").with_ssr(|args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let value = args.value()?;
        if !value.is_truthy() {
            return Ok(());
        }
        for (name, item) in value.entries() {
            let item = item.unwrap_observable();
            set_attribute(args.generated, element, &name, attribute_value(&item).as_deref())?;
        }
        Ok(())
    })
}

fn checked() -> Plugin {
    Plugin::for_element_binding("checked").with_ssr(|args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let checked = args.value()?.is_truthy();
        set_attribute(args.generated, element, "checked", checked.then_some(""))?;
        Ok(())
    })
}

fn enable(name: &'static str) -> Plugin {
    toggle_disabled(name, true)
}

fn disable(name: &'static str) -> Plugin {
    toggle_disabled(name, false)
}

/// `enabled_when` is the truthiness that leaves the element enabled.
fn toggle_disabled(name: &'static str, enabled_when: bool) -> Plugin {
    Plugin::for_element_binding(name).with_ssr(move |args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let enabled = args.value()?.is_truthy() == enabled_when;
        set_attribute(args.generated, element, "disabled", (!enabled).then_some(""))?;
        Ok(())
    })
}

fn value_plugin(name: &'static str) -> Plugin {
    Plugin::for_element_binding(name).with_ssr(|args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let value = args.value()?;
        let value = (!value.is_nullish()).then(|| value.to_string());
        set_attribute(args.generated, element, "value", value.as_deref())?;
        Ok(())
    })
}

fn class() -> Plugin {
    Plugin::for_element_binding("class").with_ssr(|args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let value = args.value()?;
        if !value.is_truthy() {
            return Ok(());
        }
        for class_name in value.to_string().split_whitespace() {
            add_class(args.generated, element, class_name)?;
        }
        Ok(())
    })
}

fn css() -> Plugin {
    Plugin::for_element_binding("css").with_ssr(|args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let value = args.value()?;
        if !value.is_object_like() {
            return Ok(());
        }
        for (class_names, enabled) in value.entries() {
            let enabled = enabled.unwrap_observable().is_truthy();
            for class_name in class_names.split_whitespace() {
                if enabled {
                    add_class(args.generated, element, class_name)?;
                } else {
                    remove_class(args.generated, element, class_name)?;
                }
            }
        }
        Ok(())
    })
}

fn style() -> Plugin {
    Plugin::for_element_binding("style").with_ssr(|args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let value = args.value()?;
        if !value.is_truthy() {
            return Ok(());
        }
        for (property, item) in value.entries() {
            let item = item.unwrap_observable();
            let item = attribute_value(&item).filter(|item| !item.is_empty());
            set_style(args.generated, element, &property, item.as_deref())?;
        }
        Ok(())
    })
}

/// `hide_when` is the truthiness that hides the element.
fn visible(name: &'static str, hide_when: bool) -> Plugin {
    Plugin::for_element_binding(name).with_ssr(move |args| {
        let Some(element) = args.binding.binding().element() else {
            return Ok(());
        };
        let hidden = args.value()?.is_truthy() == hide_when;
        set_style(args.generated, element, "display", hidden.then_some("none"))?;
        Ok(())
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTENT
// ═══════════════════════════════════════════════════════════════════════════════

fn text() -> Plugin {
    Plugin::for_binding("text").with_propagate(false).with_ssr(|args| {
        let content = escape_html(&args.value()?.to_string());
        set_inner(args.generated, args.binding.node(), &content)?;
        Ok(())
    })
}

fn html() -> Plugin {
    Plugin::for_binding("html").with_propagate(false).with_ssr(|args| {
        let value = args.value()?;
        let content = if value.is_nullish() { String::new() } else { value.to_string() };
        set_inner(args.generated, args.binding.node(), &content)?;
        Ok(())
    })
}

fn component() -> Plugin {
    Plugin::for_binding("component").with_propagate(false)
}

fn no_ssr() -> Plugin {
    Plugin::new("noSsr", |binding| matches!(binding.name(), "noSsr" | "noSSR")).with_propagate(false)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

fn let_plugin() -> Plugin {
    Plugin::for_binding("let").with_extend(|binding| {
        Ok(binding.context().extend(binding.value()?.entries()))
    })
}

/// Child context over the raw value. With a sibling `as` binding only the
/// alias is added and `$data` stays the same.
fn child_context_with_alias(binding: BindingRef<'_, '_>) -> Result<BindingContext, PluginError> {
    let alias = match binding.sibling("as") {
        Some(alias) => Some(alias.value()?.to_string()),
        None => None,
    };
    let child = binding.context().create_child_context(
        binding.raw_value()?,
        ChildContextOptions {
            alias: alias.as_deref(),
            no_child_context: alias.is_some(),
            ..Default::default()
        },
    )?;
    Ok(child)
}

fn using() -> Plugin {
    Plugin::for_binding("using").with_extend(child_context_with_alias)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL FLOW
// ═══════════════════════════════════════════════════════════════════════════════

/// Replaces the binding with `key: { template: '<id>', value: <expression> }`.
fn rewrite_binding(
    generated: &mut MagicString,
    binding: BindingRef<'_, '_>,
    key: &str,
    template: Option<&str>,
    expression: &str,
) -> Result<(), PluginError> {
    let quote = binding.binding().quote;
    let mut rewritten = format!("{}: {{ ", key);
    if let Some(id) = template {
        rewritten.push_str(&format!("template: {q}{}{q}, ", escape_js(id, Some(quote)), q = quote));
    }
    rewritten.push_str(&format!("value: {} }}", expression));

    let (start, end) = binding.binding().range().offsets();
    generated.overwrite(start, end, &rewritten)?;
    Ok(())
}

fn hydration_key(delegate: &'static str) -> &'static str {
    hydration_table().key_for(delegate).unwrap_or(delegate)
}

/// Renders descendants only when the value's truthiness equals `test`. The
/// client-side `if` receives a negated expression for `ifnot`.
fn if_plugin(name: &'static str, test: bool) -> Plugin {
    let key = hydration_key("if");
    Plugin::for_binding(name)
        .with_propagate_fn(move |binding| Ok(Propagate::Bool(binding.value()?.is_truthy() == test)))
        .with_ssr(move |args| {
            let param = args.binding.binding().param().trim();
            let expression = if test { param.to_string() } else { format!("!({})", param) };
            let ids = args.template_ids();
            args.bubble(move |generated, binding| {
                let rendered = binding.value()?.is_truthy() == test;
                let template = if rendered {
                    None
                } else {
                    Some(extract_into_template(generated, binding.node(), &ids)?)
                };
                rewrite_binding(generated, binding, key, template.as_deref(), &expression)
            });
            Ok(())
        })
}

fn with() -> Plugin {
    let key = hydration_key("with");
    Plugin::for_binding("with")
        .with_propagate_fn(|binding| Ok(Propagate::Bool(binding.value()?.is_truthy())))
        .with_extend(child_context_with_alias)
        .with_ssr(move |args| {
            let expression = args.binding.binding().param().trim().to_string();
            let ids = args.template_ids();
            args.bubble(move |generated, binding| {
                let template = if binding.value()?.is_truthy() {
                    None
                } else {
                    Some(extract_into_template(generated, binding.node(), &ids)?)
                };
                rewrite_binding(generated, binding, key, template.as_deref(), &expression)
            });
            Ok(())
        })
}

/// Items and alias of a `foreach` value: an array, or `{ data, as }`.
fn foreach_items(value: &Value) -> (Vec<Value>, Option<String>) {
    if let Some(items) = value.to_items() {
        return (items, None);
    }
    if value.is_object_like() {
        let items = value
            .get_property("data")
            .and_then(|data| data.unwrap_observable().to_items())
            .unwrap_or_default();
        let alias = value
            .get_property("as")
            .map(|alias| alias.unwrap_observable())
            .filter(|alias| !alias.is_nullish())
            .map(|alias| alias.to_string());
        return (items, alias);
    }
    (Vec::new(), None)
}

fn foreach() -> Plugin {
    let key = hydration_key("foreach");
    Plugin::for_binding("foreach")
        .with_propagate(Propagate::Custom)
        .with_ssr(move |args| {
            if args.propagate == Propagate::Bool(false) {
                return Ok(());
            }
            let value = args.value()?;
            let (items, alias) = foreach_items(&value);
            let node = args.binding.node();
            let (start, end) = node.inner_range().offsets();
            let original = args.generated.slice(start, end)?;

            let mut fragments = String::new();
            for (index, item) in items.into_iter().enumerate() {
                let set_index = move |context: &BindingContext| context.set("$index", Value::Number(index as f64));
                let child = args.context().create_child_context(
                    item,
                    ChildContextOptions {
                        alias: alias.as_deref(),
                        extend: Some(&set_index),
                        ..Default::default()
                    },
                )?;
                fragments.push_str(&args.render_fragment(&child)?);
            }

            if start == end {
                args.generated.append_left(start, &fragments)?;
            } else {
                args.generated.overwrite(start, end, &fragments)?;
            }

            let id = args.template_ids().generate(&original);
            insert_template(args.generated, node, &id, &original)?;
            rewrite_binding(
                args.generated,
                args.binding,
                key,
                Some(&id),
                args.binding.binding().param().trim(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order() {
        let names: Vec<String> = builtins().into_iter().map(|plugin| plugin.name).collect();
        assert_eq!(names.first().map(String::as_str), Some("attr"));
        assert_eq!(names.last().map(String::as_str), Some("foreach"));
        let position = |name: &str| names.iter().position(|n| n == name).unwrap();
        assert!(position("if") < position("ifnot"));
        assert!(position("textInput") < position("text"));
        assert!(position("visible") < position("hidden"));
    }

    #[test]
    fn test_attribute_values() {
        assert_eq!(attribute_value(&Value::Null), None);
        assert_eq!(attribute_value(&Value::Bool(false)), None);
        assert_eq!(attribute_value(&Value::Bool(true)).as_deref(), Some("true"));
        assert_eq!(attribute_value(&Value::Number(0.0)).as_deref(), Some("0"));
    }

    #[test]
    fn test_foreach_items() {
        let array = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(foreach_items(&array).0.len(), 2);

        let options = Value::from_pairs([
            ("data", Value::observable(array)),
            ("as", Value::string("item")),
        ]);
        let (items, alias) = foreach_items(&options);
        assert_eq!(items.len(), 2);
        assert_eq!(alias.as_deref(), Some("item"));

        assert!(foreach_items(&Value::Null).0.is_empty());
    }
}
