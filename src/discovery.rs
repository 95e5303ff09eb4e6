//! Template discovery and batch rendering.
//!
//! Recursively scans directories for template files and renders many files
//! in parallel. Each file gets its own renderer, so nothing is shared
//! between threads except the configuration.

use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::renderer::{render, RenderConfig, RenderOptions, RenderResult};

pub const DEFAULT_EXTENSIONS: &[&str] = &["html", "htm"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedFile {
    pub path: PathBuf,
    /// The render result, or the message of the failure that aborted it.
    pub result: Result<RenderResult, String>,
}

/// Recursively find every file under `dir` whose extension is one of
/// `extensions`, in a stable order.
pub fn find_templates(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)))
        })
        .collect();
    files.sort();
    files
}

/// Renders one file with the built-in plugins. `config.filename` is
/// replaced by the file's path.
pub fn render_file(path: &Path, config: &RenderConfig) -> Result<RenderResult, String> {
    let source = fs::read_to_string(path).map_err(|e| format!("Failed to read file: {}", e))?;
    let config = RenderConfig {
        filename: Some(path.to_string_lossy().to_string()),
        ..config.clone()
    };
    render(&source, RenderOptions::new().with_config(config)).map_err(|e| e.to_string())
}

/// Renders `paths` in parallel. Results keep the order of `paths`.
pub fn render_files(paths: &[PathBuf], config: &RenderConfig) -> Vec<RenderedFile> {
    paths
        .par_iter()
        .map(|path| {
            let result = render_file(path, config);
            if let Err(error) = &result {
                tracing::warn!(path = %path.display(), "failed to render: {}", error);
            }
            RenderedFile {
                path: path.clone(),
                result,
            }
        })
        .collect()
}

#[cfg(feature = "napi")]
#[napi_derive::napi]
pub fn render_directory_native(dir: String, config: Option<serde_json::Value>) -> napi::Result<serde_json::Value> {
    let config: RenderConfig = match config {
        Some(config) => serde_json::from_value(config).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => RenderConfig::default(),
    };
    let files = find_templates(Path::new(&dir), DEFAULT_EXTENSIONS);
    let rendered = render_files(&files, &config);
    serde_json::to_value(&rendered).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_templates() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.html"), "").unwrap();
        fs::write(dir.path().join("nested/a.HTML"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = find_templates(dir.path(), DEFAULT_EXTENSIONS);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|file| file.extension().is_some()));
        assert!(!files.iter().any(|file| file.ends_with("notes.txt")));
    }

    #[test]
    fn test_render_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.json"), r#"{"name": "SSR"}"#).unwrap();
        fs::write(
            dir.path().join("page.html"),
            r#"<!-- ko ssr: ./data.json --><p data-bind="text: 'Hello ' + name"></p><!-- /ko -->"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.html"), "<!-- ko if: x -->").unwrap();

        let files = find_templates(dir.path(), DEFAULT_EXTENSIONS);
        let rendered = render_files(&files, &RenderConfig::default());
        assert_eq!(rendered.len(), 2);

        let page = rendered.iter().find(|file| file.path.ends_with("page.html")).unwrap();
        let result = page.result.as_ref().unwrap();
        assert!(result.document.contains(">Hello SSR<"));
        assert!(!result.document.contains("<!-- ko"));
        assert!(result.errors.is_empty());

        let broken = rendered.iter().find(|file| file.path.ends_with("broken.html")).unwrap();
        assert!(broken.result.is_err());
    }
}
