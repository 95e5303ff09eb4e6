//! Runtime values produced by binding evaluation.
//!
//! Values follow JavaScript semantics closely enough for binding
//! expressions: reference types share state through `Rc<RefCell<_>>`, and
//! the coercion helpers (`to_number`, `Display`, equality) mirror the
//! language's rules.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::binding_context::BindingContext;
use crate::eval::{Closure, EvalError, Interpreter};

pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Host function callable from binding expressions.
pub type HostFn = dyn Fn(&[Value]) -> Result<Value, EvalError>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Function>),
    Observable(Observable),
    Context(BindingContext),
}

pub enum Function {
    /// Arrow or function expression written in a binding.
    Closure(Closure),
    /// Built-in global such as `Math.max`.
    Native(NativeFunction),
    /// A built-in method looked up on a value, e.g. `items.map`.
    Method { receiver: Value, name: Rc<str> },
    /// Function supplied by the embedding application.
    Host { name: String, call: Rc<HostFn> },
}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub call: fn(&Interpreter, &[Value]) -> Result<Value, EvalError>,
}

/// A subscribable cell. Reading returns the current value.
#[derive(Clone, Default)]
pub struct Observable(Rc<RefCell<Value>>);

impl Observable {
    pub fn new(value: Value) -> Self {
        Observable(Rc::new(RefCell::new(value)))
    }

    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }

    pub fn ptr_eq(&self, other: &Observable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Value {
    pub fn string(value: impl AsRef<str>) -> Value {
        Value::String(Rc::from(value.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(properties: IndexMap<String, Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(properties)))
    }

    pub fn empty_object() -> Value {
        Value::object(IndexMap::new())
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn host_function(
        name: impl Into<String>,
        call: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Value {
        Value::Function(Rc::new(Function::Host {
            name: name.into(),
            call: Rc::new(call),
        }))
    }

    pub fn native(name: &'static str, call: fn(&Interpreter, &[Value]) -> Result<Value, EvalError>) -> Value {
        Value::Function(Rc::new(Function::Native(NativeFunction { name, call })))
    }

    pub fn observable(value: Value) -> Value {
        Value::Observable(Observable::new(value))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Observable(_))
    }

    /// Object-like values that can hold properties.
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Observable(_) | Value::Context(_)
        )
    }

    /// Current value of an observable, or the value itself.
    pub fn unwrap_observable(&self) -> Value {
        match self {
            Value::Observable(observable) => observable.get(),
            other => other.clone(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::Observable(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Context(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_string()),
            _ => f64::NAN,
        }
    }

    /// ToInt32 as used by the bitwise operators.
    pub fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        (n.trunc() as i64 as u64 & 0xffff_ffff) as u32 as i32
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Observable(a), Value::Observable(b)) => a.ptr_eq(b),
            (Value::Context(a), Value::Context(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (a, b) if a.is_object_like() && !b.is_object_like() => {
                Value::string(a.to_string()).loose_equals(b)
            }
            (a, b) if !a.is_object_like() && b.is_object_like() => {
                a.loose_equals(&Value::string(b.to_string()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// Own property lookup without method resolution.
    pub fn get_property(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(object) => object.borrow().get(key).cloned(),
            Value::Context(context) => context.get(key),
            Value::Array(items) => {
                let items = items.borrow();
                if key == "length" {
                    return Some(Value::Number(items.len() as f64));
                }
                key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
            }
            Value::String(s) => {
                if key == "length" {
                    return Some(Value::Number(s.encode_utf16().count() as f64));
                }
                let index = key.parse::<usize>().ok()?;
                s.chars().nth(index).map(|c| Value::string(c.to_string()))
            }
            _ => None,
        }
    }

    /// The `in` operator's view of a value.
    pub fn has_property(&self, key: &str) -> bool {
        match self {
            Value::Object(object) => object.borrow().contains_key(key),
            Value::Context(context) => context.has(key),
            Value::Array(items) => {
                key == "length"
                    || key
                        .parse::<usize>()
                        .is_ok_and(|i| i < items.borrow().len())
            }
            _ => false,
        }
    }

    /// Enumerable own `(key, value)` pairs.
    pub fn entries(&self) -> Vec<(String, Value)> {
        match self {
            Value::Object(object) => object
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            Value::String(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (i.to_string(), Value::string(c.to_string())))
                .collect(),
            Value::Context(context) => context.entries(),
            _ => Vec::new(),
        }
    }

    /// Items of an array-like value (arrays, observable arrays and strings).
    pub fn to_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.borrow().clone()),
            Value::Observable(observable) => observable.get().to_items(),
            Value::String(s) => Some(s.chars().map(|c| Value::string(c.to_string())).collect()),
            _ => None,
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON view of the value. Functions and `undefined` become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => {
                serde_json::Value::Array(items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(object) => serde_json::Value::Object(
                object
                    .borrow()
                    .iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Function(_)))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Observable(observable) => observable.get().to_json(),
            Value::Context(context) => context.data().to_json(),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 {
        let formatted = format!("{:e}", n);
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        }
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                let items = items.borrow();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            Value::Object(_) | Value::Context(_) => write!(f, "[object Object]"),
            Value::Function(function) => match function.as_ref() {
                Function::Closure(closure) => write!(f, "{}", closure.source()),
                Function::Native(native) => write!(f, "function {}() {{ [native code] }}", native.name),
                Function::Method { name, .. } => write!(f, "function {}() {{ [native code] }}", name),
                Function::Host { name, .. } => write!(f, "function {}() {{ [native code] }}", name),
            },
            Value::Observable(_) => write!(f, "function observable() {{ [native code] }}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(object) => f.debug_map().entries(object.borrow().iter()).finish(),
            Value::Observable(observable) => write!(f, "Observable({:?})", observable.get()),
            Value::Context(context) => write!(f, "Context({:?})", context.data()),
            Value::Function(_) => write!(f, "[Function]"),
            other => write!(f, "{}", other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.strict_equals(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("0").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(Value::empty_object().is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("abc").is_nan());
        assert!(string_to_number("inf").is_nan());
        let list = Value::array(vec![Value::from(1), Value::Null, Value::from("a")]);
        assert_eq!(list.to_string(), "1,,a");
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from(1).loose_equals(&Value::from("1")));
        assert!(Value::Bool(true).loose_equals(&Value::from(1)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        let object = Value::empty_object();
        assert!(object.strict_equals(&object.clone()));
        assert!(!object.strict_equals(&Value::empty_object()));
    }

    #[test]
    fn test_json_round_trip_keeps_order() {
        let json = serde_json::json!({ "b": 1, "a": [true, null, "x"] });
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
        let keys: Vec<String> = value.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
