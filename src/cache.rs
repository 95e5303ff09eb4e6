use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::parse::{parse, ParseError, ParseOptions};
use crate::syntax_tree::Document;

struct CacheEntry {
    version: String,
    document: Arc<Document>,
}

/// Parsed documents keyed by a stable document identifier (usually the
/// filename). An entry is reused only while the source hashes to the same
/// version.
#[derive(Default)]
pub struct DocumentCache {
    entries: HashMap<String, CacheEntry>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_version(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The cached document for `id` if its version matches `source`.
    pub fn get(&self, id: &str, source: &str) -> Option<Arc<Document>> {
        let entry = self.entries.get(id)?;
        if entry.version == Self::compute_version(source) {
            Some(entry.document.clone())
        } else {
            None
        }
    }

    pub fn get_or_parse(
        &mut self,
        id: &str,
        source: &str,
        options: ParseOptions<'_>,
    ) -> Result<Arc<Document>, ParseError> {
        let version = Self::compute_version(source);
        if let Some(entry) = self.entries.get(id) {
            if entry.version == version {
                tracing::debug!(id, "document cache hit");
                return Ok(entry.document.clone());
            }
        }

        let document = Arc::new(parse(source, options)?);
        self.entries.insert(
            id.to_string(),
            CacheEntry {
                version,
                document: document.clone(),
            },
        );
        Ok(document)
    }

    pub fn invalidate(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_matching_version() {
        let mut cache = DocumentCache::new();
        let source = r#"<p data-bind="text: name"></p>"#;
        let first = cache.get_or_parse("page.html", source, ParseOptions::default()).unwrap();
        let second = cache.get_or_parse("page.html", source, ParseOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_version_change_reparses() {
        let mut cache = DocumentCache::new();
        let first = cache.get_or_parse("page.html", "<p></p>", ParseOptions::default()).unwrap();
        assert!(cache.get("page.html", "<i></i>").is_none());
        let second = cache.get_or_parse("page.html", "<i></i>", ParseOptions::default()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.get("page.html", "<i></i>").is_some());

        assert!(cache.invalidate("page.html"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let mut cache = DocumentCache::new();
        let result = cache.get_or_parse("page.html", "<!-- ko if: x -->", ParseOptions::default());
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
