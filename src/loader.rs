//! Swagger document loading.
//!
//! Handles loading documents from files and HTTP URLs, memoizing them by
//! locator, and normalizing `$ref` values to one canonical
//! `locator#fragment` form so that the same target reached from different
//! documents compares equal.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::LoadError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Where raw documents come from.
///
/// The default source reads local files and, with the `remote` feature,
/// HTTP(S) URLs. Tests and embedders can substitute their own.
pub trait DocumentSource: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<Value, LoadError>;
}

/// Reads files, or URLs when `remote` is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSource;

impl DocumentSource for DefaultSource {
    fn fetch(&self, locator: &str) -> Result<Value, LoadError> {
        load_document_auto(locator)
    }
}

/// In-memory documents keyed by exact locator.
impl DocumentSource for HashMap<String, Value> {
    fn fetch(&self, locator: &str) -> Result<Value, LoadError> {
        self.get(locator)
            .cloned()
            .ok_or_else(|| LoadError::FileNotFound {
                path: PathBuf::from(locator),
            })
    }
}

/// Memoizing document loader.
///
/// Each locator is fetched at most once; later calls share the parsed
/// document. Safe to call concurrently and redundantly.
pub struct DocumentLoader {
    source: Box<dyn DocumentSource>,
    documents: Mutex<HashMap<String, Arc<Value>>>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let documents = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DocumentLoader")
            .field("documents", &documents.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self::with_source(DefaultSource)
    }

    pub fn with_source(source: impl DocumentSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Load the document at `locator`, fetching it on first use.
    pub fn load(&self, locator: &str) -> Result<Arc<Value>, LoadError> {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(doc) = documents.get(locator) {
            return Ok(Arc::clone(doc));
        }

        tracing::debug!(%locator, "loading swagger document");
        let doc = Arc::new(self.source.fetch(locator)?);
        documents.insert(locator.to_string(), Arc::clone(&doc));
        Ok(doc)
    }

    /// Resolve a normalized reference (`locator#fragment`) to its target.
    pub fn resolve(&self, normalized_ref: &str) -> Result<Value, LoadError> {
        let (locator, fragment) = split_ref(normalized_ref);
        let doc = self.load(locator)?;
        navigate_fragment(&doc, fragment).map_err(|_| LoadError::FragmentNotFound {
            locator: locator.to_string(),
            fragment: fragment.to_string(),
        })
    }
}

/// Load a document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
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

    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson {
        locator: path.display().to_string(),
        source,
    })
}

/// Load a document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the response
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Value, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    // Check for HTTP errors before parsing
    let response = response
        .error_for_status()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    response.json().map_err(|source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    })
}

/// Load a document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_document_auto(locator: &str) -> Result<Value, LoadError> {
    if is_url(locator) {
        #[cfg(feature = "remote")]
        {
            load_document_url(locator)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::RemoteDisabled {
                url: locator.to_string(),
            })
        }
    } else {
        load_document(Path::new(locator))
    }
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Join a base directory (path or URL) and a relative document path.
///
/// The result is in canonical form, so `./specs` and `specs/.` name the same
/// documents as `specs`.
pub fn join_locator(base: &str, rel_path: &str) -> String {
    if base.is_empty() {
        return canonical_locator(rel_path);
    }
    canonical_locator(&format!("{}/{}", base.trim_end_matches('/'), rel_path))
}

/// Fold `.` and `..` out of a document locator (path or URL).
///
/// Every locator that reaches a resolved-ref set or the document memo goes
/// through here, so one document has one spelling.
pub fn canonical_locator(locator: &str) -> String {
    if is_url(locator) {
        let (authority, path) = split_url(locator);
        if path.is_empty() {
            return locator.to_string();
        }
        format!("{authority}/{}", fold_segments(path.split('/')).join("/"))
    } else {
        clean_path(Path::new(locator)).display().to_string()
    }
}

/// Split a normalized reference into document locator and fragment (`#...`).
pub fn split_ref(reference: &str) -> (&str, &str) {
    match reference.find('#') {
        Some(idx) => (&reference[..idx], &reference[idx..]),
        None => (reference, "#"),
    }
}

/// Navigate a JSON Pointer fragment (e.g., "#/definitions/foo").
///
/// Returns the value at the given JSON Pointer path within the document.
/// An empty fragment or bare "#" yields the whole document.
pub fn navigate_fragment(doc: &Value, fragment: &str) -> Result<Value, LoadError> {
    // Remove leading # and split by /
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Ok(doc.clone());
    }

    let mut current = doc;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            other => other.get(&key),
        };
        current = next.ok_or_else(|| LoadError::FragmentNotFound {
            locator: String::new(),
            fragment: fragment.to_string(),
        })?;
    }
    Ok(current.clone())
}

/// Normalize a `$ref` found in the document at `base` to `locator#fragment`.
///
/// - In-document refs (`#/definitions/x`) take the base document's locator.
/// - Absolute URLs and absolute paths are kept.
/// - Relative paths are joined to the base document's directory.
///
/// The locator always comes out in [`canonical_locator`] form.
pub fn normalize_ref(reference: &str, base: &str) -> String {
    let (base_locator, _) = split_ref(base);
    let (file_part, fragment) = match reference.find('#') {
        Some(idx) => (&reference[..idx], &reference[idx + 1..]),
        None => (reference, ""),
    };

    let locator = if file_part.is_empty() {
        canonical_locator(base_locator)
    } else if is_url(file_part) || file_part.starts_with('/') {
        canonical_locator(file_part)
    } else if is_url(base_locator) {
        join_url(base_locator, file_part)
    } else {
        let dir = Path::new(base_locator).parent().unwrap_or(Path::new(""));
        clean_path(&dir.join(file_part)).display().to_string()
    };

    format!("{locator}#{fragment}")
}

/// Resolve `rel` against the directory of URL `base`.
fn join_url(base: &str, rel: &str) -> String {
    let (authority, path) = split_url(base);
    let dir = match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    };
    let parts = fold_segments(dir.split('/').chain(rel.split('/')));
    format!("{authority}/{}", parts.join("/"))
}

/// Split a URL into `scheme://authority` and the path after it.
fn split_url(url: &str) -> (&str, &str) {
    // Everything up to the first '/' after "scheme://" is the authority.
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = url[scheme_end..]
        .find('/')
        .map(|i| i + scheme_end)
        .unwrap_or(url.len());
    url.split_at(path_start)
}

fn fold_segments<'a>(segments: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut parts: Vec<&str> = Vec::new();
    for part in segments {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts
}

/// All `.json` files under `dir`, recursively, in path order.
pub fn collect_json_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files_recursive(dir, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}

/// `path` relative to `base`, with `/` separators.
pub fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

/// Lexically fold `.` and `..` components.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
