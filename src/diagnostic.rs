use serde::{Deserialize, Serialize};
use std::fmt;

use crate::location::Range;

/// Diagnostic codes emitted by the parser and renderer.
pub mod codes {
    pub const PARSE_ERROR: &str = "parse-error";
    pub const UNBALANCED_VIRTUAL_ELEMENT: &str = "unbalanced-virtual-element";
    pub const BINDING_PARSE_ERROR: &str = "binding-parse-error";
    pub const BINDING_EVALUATION_ERROR: &str = "binding-evaluation-error";
    pub const BINDING_ERROR: &str = "binding-error";
    pub const CANNOT_FIND_MODULE: &str = "cannot-find-module";
    pub const CANNOT_LOAD_MODULE: &str = "cannot-load-module";
    pub const INVALID_INLINE_DATA: &str = "invalid-inline-data";
    pub const INTEROP_ERROR: &str = "interop-error";
    pub const ALTER_ERROR: &str = "alter-error";
    pub const EXTEND_ERROR: &str = "extend-error";
    pub const RENDER_ERROR: &str = "render-error";
    pub const MULTIPLE_EXTENDERS: &str = "multiple-extenders";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticType {
    Error,
    Warning,
}

/// A non-fatal problem found while parsing or rendering a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: DiagnosticType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Message of the underlying failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticType, code: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            code: Some(code.to_string()),
            message: message.into(),
            range: None,
            filename: None,
            cause: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticType::Error, code, message)
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticType::Warning, code, message)
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    /// Sets the range unless one is already present.
    pub fn or_range(mut self, range: Range) -> Self {
        self.range.get_or_insert(range);
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_filename(mut self, filename: Option<&str>) -> Self {
        if self.filename.is_none() {
            self.filename = filename.map(str::to_string);
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticType::Error
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(filename) = &self.filename {
            write!(f, "{}", filename)?;
            if let Some(range) = &self.range {
                write!(f, ":{}", range.start)?;
            }
            write!(f, ": ")?;
        } else if let Some(range) = &self.range {
            write!(f, "{}: ", range.start)?;
        }
        match &self.code {
            Some(code) => write!(f, "{} [{}]", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}
