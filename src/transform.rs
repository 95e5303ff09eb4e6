//! Binding expression transform.
//!
//! Rewrites every free identifier of a binding parameter into a lookup that
//! first checks `$context`, then `$data`, and finally falls back to the bare
//! identifier so globals keep working:
//!
//! ```text
//! name  =>  ('name' in $context ? $context['name'] : $data !== null &&
//!            typeof $data === 'object' && 'name' in $data ? $data['name'] : name)
//! ```
//!
//! Unary and update operators applied directly to an identifier are moved
//! into each branch so they keep operating on the resolved reference
//! (`typeof x`, `++x`, `x--`).

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, BindingIdentifier, Expression, Function, IdentifierReference,
    ObjectProperty, PropertyKey, SimpleAssignmentTarget, UnaryExpression, UpdateExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{SourceType, Span};
use oxc_syntax::scope::ScopeFlags;
use std::collections::HashSet;

use crate::eval::EvalError;
use crate::utils::escape_js;

pub const DEFAULT_QUOTE: char = '"';

/// Rewrites `expression` into scope-aware lookups, quoting generated
/// property names with `quote`.
pub fn transform(expression: &str, quote: char) -> Result<String, EvalError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, expression, SourceType::default())
        .parse_expression()
        .map_err(|errors| EvalError::Syntax {
            expression: expression.to_string(),
            message: errors
                .first()
                .map(|error| error.to_string())
                .unwrap_or_else(|| "invalid expression".to_string()),
        })?;

    let mut rewriter = AccessRewriter {
        source: expression,
        quote,
        locals: Vec::new(),
        replacements: Vec::new(),
    };
    rewriter.visit_expression(&parsed);

    // Sort reverse to apply safely
    let mut replacements = rewriter.replacements;
    replacements.sort_by(|a, b| b.0.cmp(&a.0));

    let mut result = expression.to_string();
    for (start, end, replacement) in replacements {
        result.replace_range((start as usize)..(end as usize), &replacement);
    }
    Ok(result)
}

/// The three-way lookup for `name`, with `prefix`/`suffix` operator text
/// applied inside every branch.
pub fn to_access(name: &str, quote: char, prefix: &str, suffix: &str) -> String {
    let q = |s: &str| format!("{quote}{}{quote}", escape_js(s, None));
    let key = q(name);
    format!(
        "({key} in $context ? {prefix}$context[{key}]{suffix} : $data !== null && typeof $data === {object} && {key} in $data ? {prefix}$data[{key}]{suffix} : {prefix}{name}{suffix})",
        object = q("object"),
    )
}

struct AccessRewriter<'s> {
    source: &'s str,
    quote: char,
    /// Names bound by enclosing functions, innermost last.
    locals: Vec<HashSet<String>>,
    replacements: Vec<(u32, u32, String)>,
}

impl AccessRewriter<'_> {
    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|scope| scope.contains(name))
    }

    fn slice(&self, start: u32, end: u32) -> &str {
        self.source.get(start as usize..end as usize).unwrap_or("")
    }

    fn rewrite(&mut self, span: Span, name: &str, prefix: &str, suffix: &str) {
        let access = to_access(name, self.quote, prefix, suffix);
        self.replacements.push((span.start, span.end, access));
    }
}

/// Collects every name bound inside a function, nested ones included.
struct LocalCollector {
    names: HashSet<String>,
}

impl<'a> Visit<'a> for LocalCollector {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names.insert(ident.name.to_string());
    }
}

impl<'a> Visit<'a> for AccessRewriter<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if !self.is_local(&ident.name) {
            self.rewrite(ident.span, &ident.name, "", "");
        }
    }

    fn visit_unary_expression(&mut self, expr: &UnaryExpression<'a>) {
        if let Expression::Identifier(ident) = &expr.argument {
            if !self.is_local(&ident.name) {
                let prefix = self.slice(expr.span.start, ident.span.start).to_string();
                self.rewrite(expr.span, &ident.name, &prefix, "");
                return;
            }
        }
        walk::walk_unary_expression(self, expr);
    }

    fn visit_update_expression(&mut self, expr: &UpdateExpression<'a>) {
        if let SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) = &expr.argument {
            if !self.is_local(&ident.name) {
                let (prefix, suffix) = if expr.prefix {
                    (self.slice(expr.span.start, ident.span.start).to_string(), String::new())
                } else {
                    (String::new(), self.slice(ident.span.end, expr.span.end).to_string())
                };
                self.rewrite(expr.span, &ident.name, &prefix, &suffix);
                return;
            }
        }
        walk::walk_update_expression(self, expr);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let PropertyKey::StaticIdentifier(key) = &prop.key {
                if !self.is_local(&key.name) {
                    let access = to_access(&key.name, self.quote, "", "");
                    let replacement = format!("{}: {}", key.name, access);
                    self.replacements.push((prop.span.start, prop.span.end, replacement));
                }
                return;
            }
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        let mut collector = LocalCollector {
            names: HashSet::new(),
        };
        walk::walk_arrow_function_expression(&mut collector, func);
        self.locals.push(collector.names);
        walk::walk_arrow_function_expression(self, func);
        self.locals.pop();
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let mut collector = LocalCollector {
            names: HashSet::new(),
        };
        walk::walk_function(&mut collector, func, flags);
        self.locals.push(collector.names);
        walk::walk_function(self, func, flags);
        self.locals.pop();
    }
}

#[cfg(feature = "napi")]
#[napi_derive::napi]
pub fn transform_native(expression: String, quote: Option<String>) -> napi::Result<String> {
    let quote = quote
        .and_then(|quote| quote.chars().next())
        .unwrap_or(DEFAULT_QUOTE);
    transform(&expression, quote).map_err(|error| napi::Error::from_reason(error.to_string()))
}
