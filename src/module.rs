//! Default module resolution, loading and interop for `ssr` data.

use std::fs;
use std::path::{Path, PathBuf};

use crate::eval::{EvalError, Interpreter};
use crate::value::Value;

/// Resolves `specifier` relative to the directory of `filename`. Tries the
/// path itself first, then the same path with a `.json` extension.
pub fn resolve_module(specifier: &str, filename: Option<&str>) -> Result<PathBuf, String> {
    let candidate = Path::new(specifier);
    let base = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        let filename = filename.ok_or_else(|| "Filename is required to resolve imports.".to_string())?;
        Path::new(filename)
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(candidate)
    };

    if base.is_file() {
        return Ok(base);
    }
    let with_extension = PathBuf::from(format!("{}.json", base.display()));
    if with_extension.is_file() {
        return Ok(with_extension);
    }

    Err(match filename {
        Some(filename) => format!("Cannot resolve {} from {}.", specifier, filename),
        None => format!("Cannot resolve {}.", specifier),
    })
}

/// Reads a resolved module as JSON.
pub fn load_json(path: &Path) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("Cannot parse {}: {}", path.display(), e))?;
    Ok(Value::from_json(&json))
}

/// Unwraps a `default` export (calling it when it is a function), or calls a
/// bare function export. Anything else is returned unchanged.
pub fn default_interop(exports: Value) -> Result<Value, EvalError> {
    let interpreter = Interpreter::new();
    if exports.is_object_like() && exports.has_property("default") {
        let default = exports.get_property("default").unwrap_or_default();
        if default.is_callable() {
            return interpreter.call(&default, &exports, &[]);
        }
        return Ok(default);
    }
    if exports.is_callable() {
        return interpreter.call(&exports, &Value::Undefined, &[]);
    }
    Ok(exports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_filename() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.json");
        fs::write(&data, r#"{"name": "SSR"}"#).unwrap();
        let filename = dir.path().join("page.html");
        let filename = filename.to_str();

        assert_eq!(resolve_module("data.json", filename).unwrap(), data);
        assert!(resolve_module("./data", filename).unwrap().ends_with("data.json"));
        assert!(resolve_module("./missing", filename).unwrap_err().contains("Cannot resolve ./missing"));
    }

    #[test]
    fn test_resolve_requires_filename() {
        assert_eq!(
            resolve_module("./data.json", None).unwrap_err(),
            "Filename is required to resolve imports."
        );
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"items": [1, 2]}"#).unwrap();
        let value = load_json(&path).unwrap();
        assert_eq!(value.get_property("items").unwrap().to_items().unwrap().len(), 2);

        fs::write(&path, "{").unwrap();
        assert!(load_json(&path).unwrap_err().starts_with("Cannot parse"));
    }

    #[test]
    fn test_default_interop() {
        let module = Value::from_pairs([("default", Value::string("value"))]);
        assert_eq!(default_interop(module).unwrap().to_string(), "value");

        let factory = Value::host_function("factory", |_| Ok(Value::Number(1.0)));
        let module = Value::from_pairs([("default", factory.clone())]);
        assert_eq!(default_interop(module).unwrap().to_number(), 1.0);
        assert_eq!(default_interop(factory).unwrap().to_number(), 1.0);

        let plain = Value::from_pairs([("name", Value::string("x"))]);
        assert!(default_interop(plain.clone()).unwrap().strict_equals(&plain));
    }
}
