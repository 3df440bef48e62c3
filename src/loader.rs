//! Specification loading from various sources.
//!
//! Handles loading Swagger documents (JSON or YAML) from files, strings, and
//! HTTP URLs, and keeps every loaded document in a [`DocumentSet`] keyed by
//! its normalized URL so `$ref` values can be resolved across files.

use std::collections::VecDeque;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::error::LoadError;
use crate::types::unescape_pointer_segment;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a document from a file path. `.yaml`/`.yml` files are parsed as YAML,
/// everything else as JSON.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist, or a parse
/// error if the content is malformed.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    if is_yaml_path(&path.to_string_lossy()) {
        parse_yaml(&content)
    } else {
        serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
    }
}

/// Load a document from a string. Content starting with `{` or `[` is parsed
/// as JSON, anything else as YAML.
pub fn load_document_str(content: &str) -> Result<Value, LoadError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
    } else {
        parse_yaml(content)
    }
}

fn parse_yaml(content: &str) -> Result<Value, LoadError> {
    serde_yaml::from_str(content).map_err(|source| LoadError::InvalidYaml { source })
}

fn is_yaml_path(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.ends_with(".yaml") || path.ends_with(".yml")
}

/// Load a document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Value, LoadError> {
    let network = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    // Check for HTTP errors before parsing
    let response = client
        .get(url)
        .send()
        .map_err(network)?
        .error_for_status()
        .map_err(network)?;

    let body = response.text().map_err(network)?;
    if is_yaml_path(url) {
        parse_yaml(&body)
    } else {
        load_document_str(&body)
    }
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a document from a file path or URL.
pub fn load_document_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

/// Navigate a JSON Pointer fragment (e.g. "#/definitions/Pet" or "/paths/~1pets").
pub fn navigate_fragment<'a>(document: &'a Value, fragment: &str) -> Result<&'a Value, LoadError> {
    let path = fragment.trim_start_matches('#');
    if path.is_empty() || path == "/" {
        return Ok(document);
    }

    let mut current = document;
    for part in path.trim_start_matches('/').split('/') {
        let key = unescape_pointer_segment(part);
        let next = match current {
            Value::Object(map) => map.get(&key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| LoadError::FragmentNotFound {
            fragment: fragment.to_string(),
        })?;
    }
    Ok(current)
}

/// Split a reference into its document part and pointer part.
///
/// `"other.json#/definitions/A"` → `("other.json", "/definitions/A")`.
pub fn split_ref(reference: &str) -> (&str, &str) {
    match reference.find('#') {
        Some(idx) => (&reference[..idx], &reference[idx + 1..]),
        None => (reference, ""),
    }
}

/// Resolve a document reference relative to the document that contains it.
pub fn join_ref(base_url: &str, reference: &str) -> String {
    if reference.is_empty() {
        return base_url.to_string();
    }
    if is_url(reference) || reference.starts_with('/') {
        return normalize(reference);
    }
    let dir = match base_url.rfind('/') {
        Some(idx) => &base_url[..=idx],
        None => "",
    };
    normalize(&format!("{dir}{reference}"))
}

/// Lexically normalize `.` and `..` segments of a file path or URL.
pub fn normalize(path: &str) -> String {
    let (prefix, rest) = if let Some(idx) = path.find("://") {
        let after = idx + 3;
        match path[after..].find('/') {
            Some(slash) => path.split_at(after + slash + 1),
            None => return path.to_string(),
        }
    } else if let Some(rest) = path.strip_prefix('/') {
        ("/", rest)
    } else {
        ("", path)
    };

    let mut segments: Vec<&str> = Vec::new();
    for seg in rest.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if prefix.is_empty() {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    format!("{prefix}{}", segments.join("/"))
}

/// All loaded documents, keyed by normalized URL.
///
/// Root documents are the ones the caller asked for; referenced documents
/// were pulled in only because a root (transitively) points at them.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    documents: IndexMap<String, Value>,
    roots: IndexSet<String>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document requested by the caller. Returns its normalized URL.
    pub fn insert_root(&mut self, url: &str, document: Value) -> String {
        let url = normalize(url);
        self.roots.insert(url.clone());
        self.documents.insert(url.clone(), document);
        url
    }

    /// Add a document reached only through `$ref`.
    pub fn insert_referenced(&mut self, url: &str, document: Value) -> String {
        let url = normalize(url);
        self.documents.entry(url.clone()).or_insert(document);
        url
    }

    pub fn get(&self, url: &str) -> Option<&Value> {
        self.documents.get(url)
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut Value> {
        self.documents.get_mut(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.documents.contains_key(url)
    }

    pub fn is_root(&self, url: &str) -> bool {
        self.roots.contains(url)
    }

    /// Document URLs in load order.
    pub fn urls(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Resolve `reference` as written inside the document at `base_url`.
    ///
    /// Returns the canonical location (`url#pointer`) and the target value,
    /// or `None` when the document or fragment is missing.
    pub fn resolve_ref(&self, base_url: &str, reference: &str) -> Option<(String, &Value)> {
        let (file, pointer) = split_ref(reference);
        let url = join_ref(base_url, file);
        let document = self.documents.get(&url)?;
        let target = navigate_fragment(document, pointer).ok()?;
        Some((format!("{url}#{pointer}"), target))
    }

    /// Load every external document referenced from the loaded set, transitively.
    pub fn load_external_refs(&mut self) -> Result<(), LoadError> {
        self.load_external_refs_with(load_document_auto)
    }

    /// Like [`DocumentSet::load_external_refs`], with a caller-provided fetcher.
    ///
    /// Documents that fail to load are skipped with a warning; references into
    /// them surface later as unresolvable-reference compile errors.
    pub fn load_external_refs_with<F>(&mut self, mut fetch: F) -> Result<(), LoadError>
    where
        F: FnMut(&str) -> Result<Value, LoadError>,
    {
        let mut queue: VecDeque<String> = self.documents.keys().cloned().collect();
        let mut attempted: IndexSet<String> = IndexSet::new();

        while let Some(url) = queue.pop_front() {
            let Some(document) = self.documents.get(&url) else {
                continue;
            };
            let mut refs = Vec::new();
            collect_external_refs(document, &mut refs);

            for reference in refs {
                let target = join_ref(&url, split_ref(&reference).0);
                if self.documents.contains_key(&target) || !attempted.insert(target.clone()) {
                    continue;
                }
                match fetch(&target) {
                    Ok(loaded) => {
                        tracing::debug!(url = %target, "loaded referenced document");
                        self.insert_referenced(&target, loaded);
                        queue.push_back(target);
                    }
                    Err(e) => {
                        tracing::warn!(url = %target, error = %e, "cannot load referenced document");
                    }
                }
            }
        }
        Ok(())
    }
}

fn collect_external_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if !split_ref(reference).0.is_empty() {
                    out.push(reference.to_string());
                }
            }
            for v in map.values() {
                collect_external_refs(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_external_refs(item, out);
            }
        }
        _ => {}
    }
}
