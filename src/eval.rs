//! Tree-walking interpreter for binding expressions.
//!
//! A binding parameter is first rewritten by [`crate::transform`] into
//! scope-aware lookups, lowered into an [`Expr`], and then evaluated against
//! a scope made of `$context` plus every field of the binding context.
//! Identifiers that resolve nowhere else fall back to a small set of globals
//! (`Math`, `JSON`, `String`, `ko`, ...).

use indexmap::IndexMap;
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use std::cell::Cell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::binding_context::BindingContext;
use crate::expression::{
    parse_expression, ArrayItem, Expr, FunctionBodyExpr, FunctionDef, Literal, MemberProperty,
    ObjectItem, PropertyName,
};
use crate::transform::{transform, DEFAULT_QUOTE};
use crate::value::{number_to_string, Function, Value};

const MAX_CALL_DEPTH: usize = 200;
/// Longest string a binding may build, in bytes.
const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Failed to parse expression `{expression}`: {message}")]
    Syntax { expression: String, message: String },
    #[error("{0} is not defined")]
    Reference(String),
    #[error("{0}")]
    Type(String),
    #[error("{0} is not supported in binding expressions")]
    Unsupported(&'static str),
    #[error("Maximum call stack size exceeded")]
    StackOverflow,
    /// Raised by a host function.
    #[error("{0}")]
    Host(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Transforms and evaluates a binding parameter against `context`.
pub fn evaluate_binding(param: &str, quote: char, context: &BindingContext) -> Result<Value, EvalError> {
    let transformed = transform(param, quote)?;
    let expr = parse_expression(&transformed)?;
    Interpreter::new().evaluate(&expr, &Env::context(context.clone()), &context.data())
}

pub fn evaluate(expression: &str, context: &BindingContext) -> Result<Value, EvalError> {
    evaluate_binding(expression, DEFAULT_QUOTE, context)
}

/// Evaluates inline `ssr` data. Only literals are accepted: objects, arrays,
/// strings, numbers, booleans, `null` and `undefined`.
pub fn evaluate_inline_data(source: &str) -> Result<Value, EvalError> {
    literal_value(&parse_expression(source)?)
}

fn literal_value(expr: &Expr) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(literal) => Ok(literal_to_value(literal)),
        Expr::Template { quasis, expressions } if expressions.is_empty() => {
            Ok(Value::string(quasis.concat()))
        }
        Expr::Identifier(name) => match name.as_str() {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(EvalError::Type(format!("`{}` is not a literal", name))),
        },
        Expr::Unary {
            operator: operator @ (UnaryOperator::UnaryNegation | UnaryOperator::UnaryPlus),
            argument,
        } => {
            let Value::Number(n) = literal_value(argument)? else {
                return Err(EvalError::Type("Expected a number literal".to_string()));
            };
            Ok(Value::Number(if *operator == UnaryOperator::UnaryNegation { -n } else { n }))
        }
        Expr::Array(items) => items
            .iter()
            .map(|item| match item {
                ArrayItem::Item(expr) => literal_value(expr),
                ArrayItem::Hole => Ok(Value::Undefined),
                ArrayItem::Spread(_) => Err(EvalError::Type("Spread is not allowed in inline data".to_string())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::array),
        Expr::Object(items) => {
            let mut properties = IndexMap::new();
            for item in items {
                match item {
                    ObjectItem::Property {
                        key: PropertyName::Static(key),
                        value,
                    } => {
                        properties.insert(key.clone(), literal_value(value)?);
                    }
                    _ => {
                        return Err(EvalError::Type(
                            "Only static keys are allowed in inline data".to_string(),
                        ))
                    }
                }
            }
            Ok(Value::object(properties))
        }
        _ => Err(EvalError::Type("Inline data must be a literal".to_string())),
    }
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::string(s),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Lexical environment of an expression.
pub struct Env {
    scope: Scope,
    parent: Option<Rc<Env>>,
}

enum Scope {
    /// `$context` and every field of the binding context.
    Context(BindingContext),
    Locals(IndexMap<String, Value>),
}

impl Env {
    pub fn context(context: BindingContext) -> Rc<Env> {
        Rc::new(Env {
            scope: Scope::Context(context),
            parent: None,
        })
    }

    pub fn empty() -> Rc<Env> {
        Rc::new(Env {
            scope: Scope::Locals(IndexMap::new()),
            parent: None,
        })
    }

    fn child(parent: &Rc<Env>, locals: IndexMap<String, Value>) -> Rc<Env> {
        Rc::new(Env {
            scope: Scope::Locals(locals),
            parent: Some(parent.clone()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let found = match &self.scope {
            Scope::Context(context) if name == "$context" => Some(Value::Context(context.clone())),
            Scope::Context(context) => context.get(name),
            Scope::Locals(locals) => locals.get(name).cloned(),
        };
        found.or_else(|| self.parent.as_ref().and_then(|parent| parent.lookup(name)))
    }
}

/// A function value created by an arrow or function expression.
pub struct Closure {
    def: Rc<FunctionDef>,
    env: Rc<Env>,
    /// Lexical `this` for arrow functions.
    this: Value,
}

impl Closure {
    pub fn source(&self) -> &str {
        &self.def.source
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct Interpreter {
    depth: Cell<usize>,
}

struct DepthGuard<'i>(&'i Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(name) => name.clone(),
        Expr::Member {
            object,
            property: MemberProperty::Static(name),
            ..
        } => format!("{}.{}", describe(object), name),
        Expr::Member { object, .. } => format!("{}[...]", describe(object)),
        Expr::This => "this".to_string(),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::default()
    }

    pub fn evaluate(&self, expr: &Expr, env: &Rc<Env>, this: &Value) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(literal) => Ok(literal_to_value(literal)),
            Expr::Identifier(name) => env
                .lookup(name)
                .or_else(|| global(name))
                .ok_or_else(|| EvalError::Reference(name.clone())),
            Expr::This => Ok(this.clone()),
            Expr::Template {
                quasis,
                expressions,
            } => {
                let mut result = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    result.push_str(quasi);
                    if let Some(expr) = expressions.get(i) {
                        result.push_str(&self.evaluate(expr, env, this)?.to_string());
                    }
                }
                Ok(Value::string(result))
            }
            Expr::Array(items) => Ok(Value::array(self.items(items, env, this)?)),
            Expr::Object(items) => {
                let mut properties = IndexMap::new();
                for item in items {
                    match item {
                        ObjectItem::Property { key, value } => {
                            let key = match key {
                                PropertyName::Static(key) => key.clone(),
                                PropertyName::Computed(expr) => {
                                    self.evaluate(expr, env, this)?.to_string()
                                }
                            };
                            let value = self.evaluate(value, env, this)?;
                            properties.insert(key, value);
                        }
                        ObjectItem::Spread(expr) => {
                            let source = self.evaluate(expr, env, this)?.unwrap_observable();
                            properties.extend(source.entries());
                        }
                    }
                }
                Ok(Value::object(properties))
            }
            Expr::Member { .. } | Expr::Call { .. } | Expr::Chain(_) => {
                Ok(self.chain(expr, env, this)?.unwrap_or_default())
            }
            Expr::Unary { operator, argument } => self.unary(*operator, argument, env, this),
            Expr::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left, env, this)?;
                let right = self.evaluate(right, env, this)?;
                binary(*operator, &left, &right)
            }
            Expr::Logical {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left, env, this)?;
                let short_circuit = match operator {
                    LogicalOperator::And => !left.is_truthy(),
                    LogicalOperator::Or => left.is_truthy(),
                    LogicalOperator::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right, env, this)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test, env, this)?.is_truthy() {
                    self.evaluate(consequent, env, this)
                } else {
                    self.evaluate(alternate, env, this)
                }
            }
            Expr::Sequence(expressions) => {
                let mut last = Value::Undefined;
                for expr in expressions {
                    last = self.evaluate(expr, env, this)?;
                }
                Ok(last)
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Function::Closure(Closure {
                def: def.clone(),
                env: env.clone(),
                this: this.clone(),
            })))),
            Expr::Unsupported(what) => Err(EvalError::Unsupported(what)),
        }
    }

    fn items(&self, items: &[ArrayItem], env: &Rc<Env>, this: &Value) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => values.push(self.evaluate(expr, env, this)?),
                ArrayItem::Hole => values.push(Value::Undefined),
                ArrayItem::Spread(expr) => {
                    let spread = self.evaluate(expr, env, this)?;
                    let Some(items) = spread.to_items() else {
                        return Err(EvalError::Type(format!("{} is not iterable", describe(expr))));
                    };
                    values.extend(items);
                }
            }
        }
        Ok(values)
    }

    fn property_key(&self, property: &MemberProperty, env: &Rc<Env>, this: &Value) -> Result<String, EvalError> {
        match property {
            MemberProperty::Static(name) => Ok(name.clone()),
            MemberProperty::Computed(expr) => Ok(self.evaluate(expr, env, this)?.to_string()),
        }
    }

    /// Evaluates member and call expressions. `None` means an optional
    /// chain short-circuited.
    fn chain(&self, expr: &Expr, env: &Rc<Env>, this: &Value) -> Result<Option<Value>, EvalError> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.chain(object, env, this)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property, env, this)?;
                get_member(&target, &key).map(Some)
            }
            Expr::Call {
                callee,
                arguments,
                optional,
            } => {
                let (function, receiver) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let Some(target) = self.chain(object, env, this)? else {
                            return Ok(None);
                        };
                        if *member_optional && target.is_nullish() {
                            return Ok(None);
                        }
                        let key = self.property_key(property, env, this)?;
                        (get_member(&target, &key)?, target)
                    }
                    other => match self.chain(other, env, this)? {
                        Some(function) => (function, Value::Undefined),
                        None => return Ok(None),
                    },
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                if !function.is_callable() {
                    return Err(EvalError::Type(format!("{} is not a function", describe(callee))));
                }
                let args = self.items(arguments, env, this)?;
                self.call(&function, &receiver, &args).map(Some)
            }
            Expr::Chain(inner) => Ok(Some(self.chain(inner, env, this)?.unwrap_or_default())),
            other => self.evaluate(other, env, this).map(Some),
        }
    }

    fn unary(&self, operator: UnaryOperator, argument: &Expr, env: &Rc<Env>, this: &Value) -> Result<Value, EvalError> {
        if operator == UnaryOperator::Typeof {
            if let Expr::Identifier(name) = argument {
                // typeof never throws on undeclared identifiers.
                let value = env.lookup(name).or_else(|| global(name)).unwrap_or_default();
                return Ok(Value::string(value.type_of()));
            }
        }
        if operator == UnaryOperator::Delete {
            return Err(EvalError::Unsupported("`delete`"));
        }

        let value = self.evaluate(argument, env, this)?;
        Ok(match operator {
            UnaryOperator::LogicalNot => Value::Bool(!value.is_truthy()),
            UnaryOperator::UnaryNegation => Value::Number(-value.to_number()),
            UnaryOperator::UnaryPlus => Value::Number(value.to_number()),
            UnaryOperator::BitwiseNot => Value::Number(f64::from(!value.to_int32())),
            UnaryOperator::Typeof => Value::string(value.type_of()),
            UnaryOperator::Void | UnaryOperator::Delete => Value::Undefined,
        })
    }

    /// Calls `callee` with `this` bound to `receiver`.
    pub fn call(&self, callee: &Value, receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
        match callee {
            Value::Function(function) => match function.as_ref() {
                Function::Closure(closure) => self.call_closure(callee, closure, receiver, args),
                Function::Native(native) => (native.call)(self, args),
                Function::Method { receiver, name } => self.call_method(receiver, name, args),
                Function::Host { call, .. } => call(args),
            },
            Value::Observable(observable) => match args.first() {
                None => Ok(observable.get()),
                Some(value) => {
                    observable.set(value.clone());
                    Ok(Value::Undefined)
                }
            },
            other => Err(EvalError::Type(format!("{} is not a function", other.type_of()))),
        }
    }

    fn call_closure(&self, callee: &Value, closure: &Closure, receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
        let depth = self.depth.get() + 1;
        if depth > MAX_CALL_DEPTH {
            return Err(EvalError::StackOverflow);
        }
        self.depth.set(depth);
        let _guard = DepthGuard(&self.depth);

        let def = &closure.def;
        let body = match &def.body {
            FunctionBodyExpr::Opaque(what) => return Err(EvalError::Unsupported(what)),
            FunctionBodyExpr::Return(None) => return Ok(Value::Undefined),
            FunctionBodyExpr::Return(Some(body)) => body,
        };

        let mut locals = IndexMap::new();
        if let Some(name) = &def.name {
            locals.insert(name.clone(), callee.clone());
        }
        for (i, param) in def.params.iter().enumerate() {
            locals.insert(param.clone(), arg(args, i));
        }
        let env = Env::child(&closure.env, locals);
        let this = if def.is_arrow { &closure.this } else { receiver };
        self.evaluate(body, &env, this)
    }

    fn callback(&self, callback: &Value, args: &[Value]) -> Result<Value, EvalError> {
        if !callback.is_callable() {
            return Err(EvalError::Type(format!("{} is not a function", callback)));
        }
        self.call(callback, &Value::Undefined, args)
    }

    fn call_method(&self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match receiver {
            Value::String(s) => string_method(s, name, args),
            Value::Array(_) => self.array_method(receiver, name, args),
            Value::Number(n) => number_method(*n, name, args),
            Value::Observable(observable) => match name {
                "peek" => Ok(observable.get()),
                _ => self.call_method(&observable.get(), name, args),
            },
            Value::Object(object) => match name {
                "hasOwnProperty" => Ok(Value::Bool(object.borrow().contains_key(&arg(args, 0).to_string()))),
                _ => Ok(Value::string(receiver.to_string())),
            },
            other => match name {
                "toString" => Ok(Value::string(other.to_string())),
                _ => Err(EvalError::Type(format!("{}.{} is not a function", other.type_of(), name))),
            },
        }
    }

    fn array_method(&self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let Value::Array(array) = receiver else {
            return Err(EvalError::Type(format!("{} is not an array", receiver)));
        };
        let items = array.borrow().clone();
        let callback = arg(args, 0);
        let call = |item: &Value, i: usize| {
            self.callback(&callback, &[item.clone(), Value::Number(i as f64), receiver.clone()])
        };

        Ok(match name {
            "map" => Value::array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| call(item, i))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            "filter" => {
                let mut kept = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if call(item, i)?.is_truthy() {
                        kept.push(item.clone());
                    }
                }
                Value::array(kept)
            }
            "find" | "findIndex" => {
                for (i, item) in items.iter().enumerate() {
                    if call(item, i)?.is_truthy() {
                        return Ok(if name == "find" { item.clone() } else { Value::Number(i as f64) });
                    }
                }
                if name == "find" { Value::Undefined } else { Value::Number(-1.0) }
            }
            "some" => {
                for (i, item) in items.iter().enumerate() {
                    if call(item, i)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Value::Bool(false)
            }
            "every" => {
                for (i, item) in items.iter().enumerate() {
                    if !call(item, i)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Value::Bool(true)
            }
            "forEach" => {
                for (i, item) in items.iter().enumerate() {
                    call(item, i)?;
                }
                Value::Undefined
            }
            "reduce" => {
                let mut iter = items.iter().enumerate();
                let mut accumulator = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(EvalError::Type(
                                "Reduce of empty array with no initial value".to_string(),
                            ))
                        }
                    },
                };
                for (i, item) in iter {
                    accumulator = self.callback(
                        &callback,
                        &[accumulator, item.clone(), Value::Number(i as f64), receiver.clone()],
                    )?;
                }
                accumulator
            }
            "join" | "toString" => {
                let separator = match args.first() {
                    Some(sep) if name == "join" && !sep.is_undefined() => sep.to_string(),
                    _ => ",".to_string(),
                };
                Value::string(
                    items
                        .iter()
                        .map(|item| if item.is_nullish() { String::new() } else { item.to_string() })
                        .collect::<Vec<_>>()
                        .join(&separator),
                )
            }
            "indexOf" => Value::Number(
                items
                    .iter()
                    .position(|item| item.strict_equals(&callback))
                    .map_or(-1.0, |i| i as f64),
            ),
            "includes" => Value::Bool(items.iter().any(|item| {
                item.strict_equals(&callback)
                    || matches!((item, &callback), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            })),
            "slice" => {
                let (start, end) = slice_bounds(items.len(), args);
                Value::array(items[start..end].to_vec())
            }
            "concat" => {
                let mut joined = items;
                for value in args {
                    match value {
                        Value::Array(other) => joined.extend(other.borrow().iter().cloned()),
                        other => joined.push(other.clone()),
                    }
                }
                Value::array(joined)
            }
            "at" => relative_index(items.len(), &callback)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
            "reverse" => {
                array.borrow_mut().reverse();
                receiver.clone()
            }
            _ => return Err(EvalError::Type(format!("array.{} is not a function", name))),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMBERS & METHODS
// ═══════════════════════════════════════════════════════════════════════════════

const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "trim", "trimStart", "trimEnd", "includes", "startsWith",
    "endsWith", "indexOf", "lastIndexOf", "slice", "substring", "split", "replace", "replaceAll",
    "padStart", "padEnd", "repeat", "charAt", "at", "concat", "toString",
];

const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "find", "findIndex", "some", "every", "forEach", "reduce", "join", "indexOf",
    "includes", "slice", "concat", "at", "reverse", "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

fn has_method(target: &Value, key: &str) -> bool {
    match target {
        Value::String(_) => STRING_METHODS.contains(&key),
        Value::Array(_) => ARRAY_METHODS.contains(&key),
        Value::Number(_) => NUMBER_METHODS.contains(&key),
        Value::Bool(_) => key == "toString",
        Value::Object(_) => key == "hasOwnProperty" || key == "toString",
        Value::Observable(observable) => key == "peek" || has_method(&observable.get(), key),
        _ => false,
    }
}

/// `target[key]`, resolving built-in methods.
pub fn get_member(target: &Value, key: &str) -> Result<Value, EvalError> {
    if target.is_nullish() {
        return Err(EvalError::Type(format!(
            "Cannot read properties of {} (reading '{}')",
            target, key
        )));
    }
    if let Some(value) = target.get_property(key) {
        return Ok(value);
    }
    if has_method(target, key) {
        return Ok(Value::Function(Rc::new(Function::Method {
            receiver: target.clone(),
            name: Rc::from(key),
        })));
    }
    Ok(Value::Undefined)
}

fn string_length(len: usize) -> Result<usize, EvalError> {
    if len > MAX_STRING_LENGTH {
        return Err(EvalError::Type("Invalid string length".to_string()));
    }
    Ok(len)
}

fn relative_index(len: usize, index: &Value) -> Option<usize> {
    let n = index.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let i = if n < 0.0 { len as f64 + n } else { n };
    (i >= 0.0 && i < len as f64).then_some(i as usize)
}

/// Resolves `slice(start, end)` arguments against a length.
fn slice_bounds(len: usize, args: &[Value]) -> (usize, usize) {
    let resolve = |value: Option<&Value>, default: usize| match value {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    };
    let start = resolve(args.first(), 0);
    let end = resolve(args.get(1), len);
    (start, end.max(start))
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let chars: Vec<char> = s.chars().collect();
    let text = |i: usize| arg(args, i).to_string();

    Ok(match name {
        "toUpperCase" => Value::string(s.to_uppercase()),
        "toLowerCase" => Value::string(s.to_lowercase()),
        "trim" => Value::string(s.trim()),
        "trimStart" => Value::string(s.trim_start()),
        "trimEnd" => Value::string(s.trim_end()),
        "includes" => Value::Bool(s.contains(text(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text(0).as_str())),
        "indexOf" | "lastIndexOf" => {
            let needle = text(0);
            let found = if name == "indexOf" { s.find(&needle) } else { s.rfind(&needle) };
            Value::Number(found.map_or(-1.0, |byte| s[..byte].chars().count() as f64))
        }
        "slice" => {
            let (start, end) = slice_bounds(chars.len(), args);
            Value::string(chars[start..end].iter().collect::<String>())
        }
        "substring" => {
            let clamp = |value: Option<&Value>, default: usize| match value {
                None | Some(Value::Undefined) => default,
                Some(value) => {
                    let n = value.to_number();
                    if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(chars.len()) }
                }
            };
            let a = clamp(args.first(), 0);
            let b = clamp(args.get(1), chars.len());
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Value::string(chars[start..end].iter().collect::<String>())
        }
        "split" => match args.first() {
            None | Some(Value::Undefined) => Value::array(vec![Value::string(s)]),
            Some(separator) => {
                let separator = separator.to_string();
                let parts: Vec<Value> = if separator.is_empty() {
                    chars.iter().map(|c| Value::string(c.to_string())).collect()
                } else {
                    s.split(separator.as_str()).map(Value::string).collect()
                };
                let limit = match args.get(1) {
                    None | Some(Value::Undefined) => parts.len(),
                    Some(limit) => limit.to_number().max(0.0) as usize,
                };
                Value::array(parts.into_iter().take(limit).collect())
            }
        },
        "replace" => Value::string(s.replacen(text(0).as_str(), &text(1), 1)),
        "replaceAll" => Value::string(s.replace(text(0).as_str(), &text(1))),
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number().max(0.0) as usize;
            let fill = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(fill) => fill.to_string(),
            };
            if target <= chars.len() || fill.is_empty() {
                Value::string(s)
            } else {
                string_length(target)?;
                let padding: String = fill.chars().cycle().take(target - chars.len()).collect();
                if name == "padStart" {
                    Value::string(format!("{}{}", padding, s))
                } else {
                    Value::string(format!("{}{}", s, padding))
                }
            }
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(EvalError::Type(format!("Invalid count value: {}", number_to_string(count))));
            }
            let count = count as usize;
            string_length(s.len().checked_mul(count).unwrap_or(usize::MAX))?;
            Value::string(s.repeat(count))
        }
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0 } else { i as usize };
            Value::string(chars.get(i).map(|c| c.to_string()).unwrap_or_default())
        }
        "at" => relative_index(chars.len(), &arg(args, 0))
            .map(|i| Value::string(chars[i].to_string()))
            .unwrap_or_default(),
        "concat" => {
            let mut result = s.to_string();
            for value in args {
                result.push_str(&value.to_string());
            }
            Value::string(result)
        }
        "toString" => Value::string(s),
        _ => return Err(EvalError::Type(format!("string.{} is not a function", name))),
    })
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits as usize };
            if digits > 100 {
                return Err(EvalError::Type("toFixed() digits argument must be between 0 and 100".to_string()));
            }
            if !n.is_finite() {
                return Ok(Value::string(number_to_string(n)));
            }
            Ok(Value::string(format!("{:.*}", digits, n)))
        }
        "toString" => match args.first() {
            None | Some(Value::Undefined) => Ok(Value::string(number_to_string(n))),
            Some(radix) => {
                let radix = radix.to_number() as u32;
                if !(2..=36).contains(&radix) {
                    return Err(EvalError::Type("toString() radix must be between 2 and 36".to_string()));
                }
                if radix == 10 || n.fract() != 0.0 || !n.is_finite() {
                    return Ok(Value::string(number_to_string(n)));
                }
                let mut value = n.abs() as u64;
                let mut digits = Vec::new();
                loop {
                    let digit = (value % radix as u64) as u32;
                    digits.push(char::from_digit(digit, radix).unwrap_or('0'));
                    value /= radix as u64;
                    if value == 0 {
                        break;
                    }
                }
                if n < 0.0 {
                    digits.push('-');
                }
                Ok(Value::string(digits.iter().rev().collect::<String>()))
            }
        },
        _ => Err(EvalError::Type(format!("number.{} is not a function", name))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn add(left: &Value, right: &Value) -> Value {
    let stringy = |value: &Value| matches!(value, Value::String(_)) || value.is_object_like();
    if stringy(left) || stringy(right) {
        Value::string(format!("{}{}", left, right))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn binary(operator: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let number = |n: f64| Ok(Value::Number(n));
    let shift = || (right.to_int32() as u32) & 31;
    match operator {
        BinaryOperator::Addition => Ok(add(left, right)),
        BinaryOperator::Subtraction => number(left.to_number() - right.to_number()),
        BinaryOperator::Multiplication => number(left.to_number() * right.to_number()),
        BinaryOperator::Division => number(left.to_number() / right.to_number()),
        BinaryOperator::Remainder => number(left.to_number() % right.to_number()),
        BinaryOperator::Exponential => number(left.to_number().powf(right.to_number())),
        BinaryOperator::Equality => Ok(Value::Bool(left.loose_equals(right))),
        BinaryOperator::Inequality => Ok(Value::Bool(!left.loose_equals(right))),
        BinaryOperator::StrictEquality => Ok(Value::Bool(left.strict_equals(right))),
        BinaryOperator::StrictInequality => Ok(Value::Bool(!left.strict_equals(right))),
        BinaryOperator::LessThan => Ok(Value::Bool(compare(left, right) == Some(Ordering::Less))),
        BinaryOperator::LessEqualThan => Ok(Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        BinaryOperator::GreaterThan => Ok(Value::Bool(compare(left, right) == Some(Ordering::Greater))),
        BinaryOperator::GreaterEqualThan => Ok(Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        BinaryOperator::ShiftLeft => number(f64::from(left.to_int32().wrapping_shl(shift()))),
        BinaryOperator::ShiftRight => number(f64::from(left.to_int32().wrapping_shr(shift()))),
        BinaryOperator::ShiftRightZeroFill => {
            number(f64::from((left.to_int32() as u32).wrapping_shr(shift())))
        }
        BinaryOperator::BitwiseOR => number(f64::from(left.to_int32() | right.to_int32())),
        BinaryOperator::BitwiseXOR => number(f64::from(left.to_int32() ^ right.to_int32())),
        BinaryOperator::BitwiseAnd => number(f64::from(left.to_int32() & right.to_int32())),
        BinaryOperator::In => {
            if !right.is_object_like() {
                return Err(EvalError::Type(format!(
                    "Cannot use 'in' operator to search for '{}' in {}",
                    left, right
                )));
            }
            Ok(Value::Bool(right.has_property(&left.to_string())))
        }
        BinaryOperator::Instanceof => Err(EvalError::Unsupported("`instanceof`")),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GLOBALS
// ═══════════════════════════════════════════════════════════════════════════════

fn math_fn(args: &[Value], f: fn(f64) -> f64) -> Result<Value, EvalError> {
    Ok(Value::Number(f(arg(args, 0).to_number())))
}

fn parse_int(args: &[Value]) -> f64 {
    let text = arg(args, 0).to_string();
    let mut s = text.trim();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let mut radix = match args.get(1) {
        None | Some(Value::Undefined) => 10,
        Some(radix) => radix.to_number() as u32,
    };
    if radix == 0 {
        radix = 10;
    }
    if (radix == 16 || args.get(1).map_or(true, Value::is_undefined))
        && (s.starts_with("0x") || s.starts_with("0X"))
    {
        s = &s[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .fold(0.0, |acc, c| acc * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64);
    if negative { -value } else { value }
}

fn parse_float(args: &[Value]) -> f64 {
    let text = arg(args, 0).to_string();
    let s = text.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if s.starts_with(prefix) {
            return f64::INFINITY;
        }
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    while end < bytes.len() {
        let c = bytes[end];
        let ok = c.is_ascii_digit()
            || ((c == b'+' || c == b'-') && (end == 0 || matches!(bytes[end - 1], b'e' | b'E')))
            || (c == b'.' && !seen_dot && !seen_exp)
            || ((c == b'e' || c == b'E') && !seen_exp && end > 0);
        if !ok {
            break;
        }
        seen_dot |= c == b'.';
        seen_exp |= c == b'e' || c == b'E';
        end += 1;
    }
    let mut candidate = &s[..end];
    while !candidate.is_empty() {
        if let Ok(value) = candidate.parse::<f64>() {
            return value;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    f64::NAN
}

fn unwrap_deep(value: &Value) -> Value {
    match value.unwrap_observable() {
        Value::Array(items) => Value::array(items.borrow().iter().map(unwrap_deep).collect()),
        Value::Object(object) => Value::object(
            object
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), unwrap_deep(v)))
                .collect(),
        ),
        other => other,
    }
}

fn stringify(args: &[Value]) -> Result<Value, EvalError> {
    let value = arg(args, 0).unwrap_observable();
    if value.is_undefined() || matches!(value, Value::Function(_)) {
        return Ok(Value::Undefined);
    }
    let json = unwrap_deep(&value).to_json();
    let indent = args.get(2).map(Value::to_number).unwrap_or(0.0);
    let text = if indent > 0.0 {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Value::string).map_err(|error| EvalError::Type(error.to_string()))
}

fn object_keys(args: &[Value]) -> Result<Value, EvalError> {
    let target = arg(args, 0);
    if target.is_nullish() {
        return Err(EvalError::Type("Cannot convert undefined or null to object".to_string()));
    }
    Ok(Value::array(target.entries().into_iter().map(|(k, _)| Value::string(k)).collect()))
}

fn object_values(args: &[Value]) -> Result<Value, EvalError> {
    let target = arg(args, 0);
    if target.is_nullish() {
        return Err(EvalError::Type("Cannot convert undefined or null to object".to_string()));
    }
    Ok(Value::array(target.entries().into_iter().map(|(_, v)| v).collect()))
}

fn object_entries(args: &[Value]) -> Result<Value, EvalError> {
    let target = arg(args, 0);
    if target.is_nullish() {
        return Err(EvalError::Type("Cannot convert undefined or null to object".to_string()));
    }
    Ok(Value::array(
        target
            .entries()
            .into_iter()
            .map(|(k, v)| Value::array(vec![Value::string(k), v]))
            .collect(),
    ))
}

/// Resolves a global identifier.
pub fn global(name: &str) -> Option<Value> {
    Some(match name {
        "undefined" => Value::Undefined,
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        "window" | "globalThis" => Value::empty_object(),
        "String" => Value::native("String", |_, args| {
            Ok(Value::string(args.first().map(Value::to_string).unwrap_or_default()))
        }),
        "Number" => Value::native("Number", |_, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
        }),
        "Boolean" => Value::native("Boolean", |_, args| Ok(Value::Bool(arg(args, 0).is_truthy()))),
        "parseInt" => Value::native("parseInt", |_, args| Ok(Value::Number(parse_int(args)))),
        "parseFloat" => Value::native("parseFloat", |_, args| Ok(Value::Number(parse_float(args)))),
        "isNaN" => Value::native("isNaN", |_, args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
        "isFinite" => Value::native("isFinite", |_, args| {
            Ok(Value::Bool(arg(args, 0).to_number().is_finite()))
        }),
        "Math" => Value::from_pairs([
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
            ("abs", Value::native("abs", |_, args| math_fn(args, f64::abs))),
            ("ceil", Value::native("ceil", |_, args| math_fn(args, f64::ceil))),
            ("floor", Value::native("floor", |_, args| math_fn(args, f64::floor))),
            ("round", Value::native("round", |_, args| math_fn(args, |n| (n + 0.5).floor()))),
            ("trunc", Value::native("trunc", |_, args| math_fn(args, f64::trunc))),
            ("sign", Value::native("sign", |_, args| {
                math_fn(args, |n| if n == 0.0 || n.is_nan() { n } else { n.signum() })
            })),
            ("sqrt", Value::native("sqrt", |_, args| math_fn(args, f64::sqrt))),
            ("pow", Value::native("pow", |_, args| {
                Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
            })),
            ("max", Value::native("max", |_, args| {
                Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |a, b| {
                    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
                })))
            })),
            ("min", Value::native("min", |_, args| {
                Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |a, b| {
                    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
                })))
            })),
        ]),
        "JSON" => Value::from_pairs([
            ("stringify", Value::native("stringify", |_, args| stringify(args))),
            ("parse", Value::native("parse", |_, args| {
                serde_json::from_str::<serde_json::Value>(&arg(args, 0).to_string())
                    .map(|json| Value::from_json(&json))
                    .map_err(|error| EvalError::Type(format!("JSON.parse: {}", error)))
            })),
        ]),
        "Array" => Value::from_pairs([(
            "isArray",
            Value::native("isArray", |_, args| Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))),
        )]),
        "Object" => Value::from_pairs([
            ("keys", Value::native("keys", |_, args| object_keys(args))),
            ("values", Value::native("values", |_, args| object_values(args))),
            ("entries", Value::native("entries", |_, args| object_entries(args))),
        ]),
        "ko" => Value::from_pairs([
            ("unwrap", Value::native("unwrap", |_, args| Ok(arg(args, 0).unwrap_observable()))),
            ("observable", Value::native("observable", |_, args| Ok(Value::observable(arg(args, 0))))),
            ("observableArray", Value::native("observableArray", |_, args| {
                let initial = match arg(args, 0) {
                    Value::Undefined => Value::array(Vec::new()),
                    other => other,
                };
                Ok(Value::observable(initial))
            })),
            ("isObservable", Value::native("isObservable", |_, args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Observable(_))))
            })),
            ("toJS", Value::native("toJS", |_, args| Ok(unwrap_deep(&arg(args, 0))))),
        ]),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_with(expression: &str, data: serde_json::Value) -> Result<Value, EvalError> {
        let context = BindingContext::root(Value::from_json(&data)).unwrap();
        evaluate(expression, &context)
    }

    fn eval(expression: &str) -> Value {
        eval_with(expression, serde_json::json!({})).expect("evaluation succeeds")
    }

    #[test]
    fn test_data_lookup() {
        let value = eval_with("'Hello ' + name", serde_json::json!({ "name": "SSR" })).unwrap();
        assert_eq!(value.to_string(), "Hello SSR");
    }

    #[test]
    fn test_context_and_data_references() {
        let value = eval_with(
            "$context && $data.exists ? 'yes' : 'no'",
            serde_json::json!({ "exists": true }),
        )
        .unwrap();
        assert_eq!(value.to_string(), "yes");
    }

    #[test]
    fn test_typeof_unknown_identifier() {
        assert_eq!(eval("typeof missing").to_string(), "undefined");
        assert_eq!(eval("typeof Math.max").to_string(), "function");
    }

    #[test]
    fn test_unknown_identifier_is_reference_error() {
        let error = eval_with("missing + 1", serde_json::json!({})).unwrap_err();
        assert_eq!(error, EvalError::Reference("missing".to_string()));
    }

    #[test]
    fn test_reading_through_undefined_fails() {
        let error = eval_with("window.foo.bar.baz", serde_json::json!({})).unwrap_err();
        assert!(matches!(error, EvalError::Type(_)));
    }

    #[test]
    fn test_arrow_functions_and_array_methods() {
        let value = eval_with(
            "items.filter(x => x > 1).map(x => x * 2).join('-')",
            serde_json::json!({ "items": [1, 2, 3] }),
        )
        .unwrap();
        assert_eq!(value.to_string(), "4-6");
    }

    #[test]
    fn test_closures_capture_parameters() {
        let value = eval_with(
            "items.map(function (item) { return prefix + item.name; })[1]",
            serde_json::json!({ "prefix": "#", "items": [{ "name": "a" }, { "name": "b" }] }),
        )
        .unwrap();
        assert_eq!(value.to_string(), "#b");
    }

    #[test]
    fn test_optional_chaining_short_circuits() {
        assert!(eval("window.missing?.deep.value").is_undefined());
        assert!(eval("window.missing?.()").is_undefined());
    }

    #[test]
    fn test_operators() {
        assert_eq!(eval("1 + 2 * 3").to_number(), 7.0);
        assert_eq!(eval("'a' + 1").to_string(), "a1");
        assert_eq!(eval("null ?? 'x'").to_string(), "x");
        assert_eq!(eval("7 % 4").to_number(), 3.0);
        assert_eq!(eval("2 ** 10").to_number(), 1024.0);
        assert_eq!(eval("-1 >>> 28").to_number(), 15.0);
        assert!(eval("'b' > 'a'").is_truthy());
        assert!(eval("'2' == 2").is_truthy());
        assert!(!eval("'2' === 2").is_truthy());
    }

    #[test]
    fn test_template_literals_and_globals() {
        let value = eval_with("`${count} items, max ${Math.max(1, count)}`", serde_json::json!({ "count": 3 })).unwrap();
        assert_eq!(value.to_string(), "3 items, max 3");
        assert_eq!(eval("JSON.stringify({ a: [1, 'b'] })").to_string(), r#"{"a":[1,"b"]}"#);
        assert_eq!(eval("parseInt('42px')").to_number(), 42.0);
        assert_eq!(eval("(3.14159).toFixed(2)").to_string(), "3.14");
        assert_eq!(eval("Object.keys({ b: 1, a: 2 }).join()").to_string(), "b,a");
    }

    #[test]
    fn test_observables() {
        assert_eq!(eval("ko.observable(5)()").to_number(), 5.0);
        assert_eq!(eval("ko.unwrap(ko.observable('x'))").to_string(), "x");
        assert!(eval("ko.isObservable(ko.observableArray())").is_truthy());
    }

    #[test]
    fn test_unsupported_syntax_errors() {
        let error = eval_with("x = 1", serde_json::json!({ "x": 0 })).unwrap_err();
        assert!(matches!(error, EvalError::Syntax { .. } | EvalError::Unsupported(_)));
        let error = eval_with("new Date()", serde_json::json!({})).unwrap_err();
        assert!(matches!(error, EvalError::Unsupported(_)));
    }

    #[test]
    fn test_this_is_data() {
        let value = eval_with("this.name", serde_json::json!({ "name": "me" })).unwrap();
        assert_eq!(value.to_string(), "me");
    }

    #[test]
    fn test_inline_data_accepts_literals_only() {
        let value = evaluate_inline_data("{ name: 'SSR', list: [1, -2], nested: { ok: true } }").unwrap();
        assert_eq!(
            value.to_json(),
            serde_json::json!({ "name": "SSR", "list": [1, -2], "nested": { "ok": true } })
        );
        assert!(evaluate_inline_data("{ a: foo }").is_err());
        assert!(evaluate_inline_data("{ a: 1 + 1 }").is_err());
    }
}
