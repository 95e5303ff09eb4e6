//! Chained binding scope exposing `$data`, `$parent`, `$parents` and `$root`.
//!
//! A context is a shared, ordered property map. Child contexts copy their
//! parent's properties and then override the well-known fields, so any
//! extension added higher up (`$index`, `as` aliases, `let` values) stays
//! visible to descendants.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::eval::{EvalError, Interpreter};
use crate::value::Value;

pub const DATA: &str = "$data";
pub const RAW_DATA: &str = "$rawData";
pub const ROOT: &str = "$root";
pub const PARENT: &str = "$parent";
pub const PARENTS: &str = "$parents";
pub const PARENT_CONTEXT: &str = "$parentContext";
/// Always `true` while rendering on the server.
pub const SSR: &str = "$ssr";

#[derive(Clone)]
pub struct BindingContext(Rc<RefCell<IndexMap<String, Value>>>);

/// Options for [`BindingContext::create_child_context`].
#[derive(Default)]
pub struct ChildContextOptions<'a> {
    /// Name under which the child's data is also exposed.
    pub alias: Option<&'a str>,
    /// Keep the parent's `$data` and only add the alias.
    pub no_child_context: bool,
    /// Runs on the new context before it is handed out.
    pub extend: Option<&'a dyn Fn(&BindingContext)>,
}

impl BindingContext {
    /// Root context: `$root` is `$data` and `$parents` is empty. Function
    /// data is called first, like every other accessor.
    pub fn root(data: Value) -> Result<Self, EvalError> {
        let data = read_accessor(data)?;
        let mut fields = IndexMap::new();
        fields.insert(SSR.to_string(), Value::Bool(true));
        fields.insert(PARENTS.to_string(), Value::array(Vec::new()));
        fields.insert(RAW_DATA.to_string(), data.clone());
        let data = data.unwrap_observable();
        fields.insert(ROOT.to_string(), data.clone());
        fields.insert(DATA.to_string(), data);
        Ok(BindingContext(Rc::new(RefCell::new(fields))))
    }

    fn from_fields(fields: IndexMap<String, Value>) -> Self {
        BindingContext(Rc::new(RefCell::new(fields)))
    }

    /// Fails only when `data` is an accessor function that fails.
    pub fn create_child_context(
        &self,
        data: Value,
        options: ChildContextOptions<'_>,
    ) -> Result<BindingContext, EvalError> {
        let data = read_accessor(data)?;
        let mut fields = self.0.borrow().clone();

        if options.no_child_context {
            if let Some(alias) = options.alias {
                fields.insert(alias.to_string(), data);
            }
        } else {
            let parent_data = self.data();
            let mut parents = vec![parent_data.clone()];
            parents.extend(self.parents());

            fields.insert(PARENT_CONTEXT.to_string(), Value::Context(self.clone()));
            fields.insert(PARENTS.to_string(), Value::array(parents));
            fields.insert(PARENT.to_string(), parent_data);
            fields.insert(RAW_DATA.to_string(), data.clone());
            let data = data.unwrap_observable();
            if let Some(alias) = options.alias {
                fields.insert(alias.to_string(), data.clone());
            }
            fields.insert(DATA.to_string(), data);
        }

        let child = BindingContext::from_fields(fields);
        if let Some(extend) = options.extend {
            extend(&child);
        }
        Ok(child)
    }

    /// Default child context over `data`.
    pub fn child(&self, data: Value) -> Result<BindingContext, EvalError> {
        self.create_child_context(data, ChildContextOptions::default())
    }

    /// Same `$data`, with `properties` merged on top.
    pub fn extend(&self, properties: impl IntoIterator<Item = (String, Value)>) -> BindingContext {
        let mut fields = self.0.borrow().clone();
        fields.extend(properties);
        BindingContext::from_fields(fields)
    }

    /// Sets a property in place. Only alter hooks use this.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn data(&self) -> Value {
        self.get(DATA).unwrap_or_default()
    }

    pub fn raw_data(&self) -> Value {
        self.get(RAW_DATA).unwrap_or_default()
    }

    pub fn root_data(&self) -> Value {
        self.get(ROOT).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<Value> {
        self.get(PARENT)
    }

    pub fn parents(&self) -> Vec<Value> {
        self.get(PARENTS).and_then(|parents| parents.to_items()).unwrap_or_default()
    }

    pub fn parent_context(&self) -> Option<BindingContext> {
        match self.get(PARENT_CONTEXT) {
            Some(Value::Context(context)) => Some(context),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &BindingContext) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Calls a plain function to get the data it stands for. Observables are
/// kept as they are so `$rawData` still holds them.
fn read_accessor(data: Value) -> Result<Value, EvalError> {
    match &data {
        Value::Function(_) => Interpreter::new().call(&data, &Value::Undefined, &[]),
        _ => Ok(data),
    }
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext")
            .field("$data", &self.data())
            .field("depth", &self.parents().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(name: &str) -> Value {
        Value::from_pairs([("name", Value::string(name))])
    }

    #[test]
    fn test_root_context() {
        let root = BindingContext::root(data("root")).unwrap();
        assert!(root.data().strict_equals(&root.root_data()));
        assert!(root.parents().is_empty());
        assert!(root.parent().is_none());
        assert!(root.parent_context().is_none());
        assert!(!root.has("$context"));
        assert!(root.get(SSR).unwrap().is_truthy());
    }

    #[test]
    fn test_child_context_parents() {
        let root_data = data("root");
        let root = BindingContext::root(root_data.clone()).unwrap();
        let child = root.child(data("child")).unwrap();
        let grandchild = child.child(data("grandchild")).unwrap();

        assert!(child.parent().unwrap().strict_equals(&root_data));
        assert!(child.parents()[0].strict_equals(&root_data));
        assert!(child.parent_context().unwrap().ptr_eq(&root));

        let parents = grandchild.parents();
        assert_eq!(parents.len(), 2);
        assert!(parents[0].strict_equals(&child.data()));
        assert!(parents[1].strict_equals(&root_data));
        assert!(grandchild.root_data().strict_equals(&root_data));
    }

    #[test]
    fn test_child_does_not_mutate_parent() {
        let root = BindingContext::root(data("root")).unwrap();
        let _child = root.create_child_context(
            data("child"),
            ChildContextOptions {
                alias: Some("item"),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!root.has("item"));
        assert!(root.parents().is_empty());
    }

    #[test]
    fn test_observable_data_is_unwrapped() {
        let observable = Value::observable(data("inner"));
        let child = BindingContext::root(Value::Null).unwrap().child(observable.clone()).unwrap();
        assert!(matches!(child.raw_data(), Value::Observable(_)));
        assert_eq!(child.data().get_property("name").unwrap().to_string(), "inner");
    }

    #[test]
    fn test_no_child_context_keeps_data() {
        let root = BindingContext::root(data("root")).unwrap();
        let aliased = root.create_child_context(
            data("other"),
            ChildContextOptions {
                alias: Some("other"),
                no_child_context: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(aliased.data().strict_equals(&root.data()));
        assert_eq!(aliased.get("other").unwrap().get_property("name").unwrap().to_string(), "other");
        assert!(aliased.parents().is_empty());
    }

    #[test]
    fn test_extensions_are_inherited() {
        let root = BindingContext::root(data("root")).unwrap();
        let extended = root.extend([("$index".to_string(), Value::Number(3.0))]);
        assert!(extended.data().strict_equals(&root.data()));
        let child = extended.child(data("child")).unwrap();
        assert_eq!(child.get("$index").unwrap().to_number(), 3.0);
    }

    #[test]
    fn test_extend_hook_runs_on_child() {
        let root = BindingContext::root(data("root")).unwrap();
        let hook = |context: &BindingContext| context.set("$extra", Value::Bool(true));
        let child = root.create_child_context(
            data("child"),
            ChildContextOptions {
                extend: Some(&hook),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(child.get("$extra").unwrap().is_truthy());
    }

    #[test]
    fn test_function_data_is_called() {
        let accessor = Value::host_function("accessor", |_| Ok(data("called")));
        let root = BindingContext::root(Value::Null).unwrap();
        let child = root.child(accessor.clone()).unwrap();
        assert_eq!(child.data().type_of(), "object");
        assert_eq!(child.data().get_property("name").unwrap().to_string(), "called");
        assert_eq!(child.raw_data().type_of(), "object");

        let root = BindingContext::root(accessor).unwrap();
        assert_eq!(root.data().get_property("name").unwrap().to_string(), "called");
    }

    #[test]
    fn test_failing_accessor_is_an_error() {
        let failing = Value::host_function("failing", |_| Err(EvalError::Host("broken".to_string())));
        let root = BindingContext::root(Value::Null).unwrap();
        assert!(root.child(failing).is_err());
    }
}
